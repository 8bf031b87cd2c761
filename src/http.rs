//! HTTP surface: `GET /v1/mvt/{table}/{z}/{x}/{y}`.

use std::time::Instant;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info, Instrument};

use crate::coordinator::{TileCoordinator, TileOutcome};
use crate::error::Error;
use crate::tile::{TileKey, TileQuerySpec};

pub const MVT_CONTENT_TYPE: &str = "application/x-protobuf";

/// Builds the tile router around `coordinator`.
pub fn build_router(coordinator: TileCoordinator) -> Router {
    Router::new()
        .route("/v1/mvt/{table}/{z}/{x}/{y}", get(mvt))
        .with_state(coordinator)
        .layer(middleware::from_fn(log_requests))
}

async fn mvt(
    State(coordinator): State<TileCoordinator>,
    path: Result<Path<(String, u8, u32, u32)>, PathRejection>,
    query: Result<Query<TileQuerySpec>, QueryRejection>,
) -> Response {
    let Path((table, z, x, y)) = match path {
        Ok(path) => path,
        Err(rejection) => return ErrorBody::bad_request(rejection.body_text()).into_response(),
    };
    let Query(spec) = match query {
        Ok(query) => query,
        Err(rejection) => return ErrorBody::bad_request(rejection.body_text()).into_response(),
    };

    let key = TileKey::new(table, z, x, y);
    match coordinator.fetch(&key, &spec).await {
        Ok(TileOutcome::Empty) => StatusCode::NO_CONTENT.into_response(),
        Ok(outcome) => (
            [(CONTENT_TYPE, HeaderValue::from_static(MVT_CONTENT_TYPE))],
            outcome.into_bytes(),
        )
            .into_response(),
        Err(err @ Error::OutOfGrid(_)) => ErrorBody::bad_request(err.to_string()).into_response(),
        Err(err) => {
            error!(tile = %key, error = %err, "tile request failed");
            ErrorBody::internal(&err).into_response()
        }
    }
}

/// Error payload, shaped `{statusCode, error, message}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub error: &'static str,
    pub message: String,
}

impl ErrorBody {
    fn new(status: StatusCode, message: String) -> Self {
        ErrorBody {
            status_code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown"),
            message,
        }
    }

    fn bad_request(message: String) -> Self {
        ErrorBody::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(err: &Error) -> Self {
        ErrorBody::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ErrorBody {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let span = tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        let started = Instant::now();
        let response = next.run(request).await;
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "served"
        );
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::query::TileQuery;
    use crate::store::{DiskTileStore, TileStore};
    use crate::TileSource;

    /// Echoes the rendered SQL back as the tile, or fails when asked to.
    struct EchoSource {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TileSource for EchoSource {
        async fn render_mvt(&self, query: &TileQuery) -> Result<Vec<u8>, sqlx::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(sqlx::Error::Protocol(String::from("syntax error")));
            }
            if query.sql.contains("FROM empty_table") {
                return Ok(Vec::new());
            }
            Ok(query.sql.clone().into_bytes())
        }
    }

    fn app(fail: bool) -> (TempDir, Arc<DiskTileStore>, Arc<EchoSource>, Router) {
        let dir = TempDir::new().expect("Unable to create a temp dir.");
        let store = Arc::new(DiskTileStore::new(dir.path()));
        let source = Arc::new(EchoSource {
            fail,
            calls: AtomicUsize::new(0),
        });
        let router = build_router(TileCoordinator::new(store.clone(), source.clone()));
        (dir, store, source, router)
    }

    async fn get(router: &Router, uri: &str) -> Response {
        router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_serves_and_caches_tile() {
        let (_dir, store, source, router) = app(false);

        let response = get(&router, "/v1/mvt/parcels/10/512/340").await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(MVT_CONTENT_TYPE, response.headers()[CONTENT_TYPE]);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("FROM parcels"));

        let key = TileKey::new("parcels", 10, 512, 340);
        assert_eq!(body.to_vec(), store.read(&key).await.unwrap());

        let response = get(&router, "/v1/mvt/parcels/10/512/340").await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(body, to_bytes(response.into_body(), usize::MAX).await.unwrap());
        assert_eq!(1, source.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_query_parameters_reach_the_query() {
        let (_dir, _store, _source, router) = app(false);

        let response = get(
            &router,
            "/v1/mvt/parcels/1/0/0?geom_column=wkb_geometry&columns=owner&id_column=gid&filter=area%20%3E%2010",
        )
        .await;
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let sql = String::from_utf8_lossy(&body);

        assert!(sql.contains("ST_Transform(wkb_geometry, 3857)"));
        assert!(sql.contains(", owner, gid FROM parcels"));
        assert!(sql.contains(" AND area > 10)"));
        assert!(sql.contains("'parcels', 4096, 'geom', 'gid')"));
    }

    #[tokio::test]
    async fn test_empty_tile_is_no_content() {
        let (_dir, store, _source, router) = app(false);

        let response = get(&router, "/v1/mvt/empty_table/3/1/1").await;
        assert_eq!(StatusCode::NO_CONTENT, response.status());
        assert!(to_bytes(response.into_body(), usize::MAX).await.unwrap().is_empty());
        assert!(!store.exists(&TileKey::new("empty_table", 3, 1, 1)).await);
    }

    #[tokio::test]
    async fn test_source_error_is_internal_error() {
        let (_dir, _store, _source, router) = app(true);

        let response = get(&router, "/v1/mvt/parcels/10/512/340").await;
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, response.status());

        let body = json_body(response).await;
        assert_eq!(500, body["statusCode"]);
        assert_eq!("Internal Server Error", body["error"]);
        assert_eq!(
            "encountered unexpected or invalid data: syntax error",
            body["message"]
        );
    }

    #[tokio::test]
    async fn test_invalid_coordinates_are_rejected() {
        let (_dir, _store, source, router) = app(false);

        for uri in [
            "/v1/mvt/parcels/ten/512/340",
            "/v1/mvt/parcels/10/-1/340",
            "/v1/mvt/parcels/300/0/0",
        ] {
            let response = get(&router, uri).await;
            assert_eq!(StatusCode::BAD_REQUEST, response.status(), "{}", uri);

            let body = json_body(response).await;
            assert_eq!(400, body["statusCode"]);
            assert_eq!("Bad Request", body["error"]);
        }
        assert_eq!(0, source.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_out_of_grid_tile_is_rejected() {
        let (_dir, _store, source, router) = app(false);

        let response = get(&router, "/v1/mvt/parcels/0/1/0").await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());

        let body = json_body(response).await;
        assert_eq!(400, body["statusCode"]);
        assert_eq!("Tile parcels/0/1/0 is outside the tile grid.", body["message"]);
        assert_eq!(0, source.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_blank_query_parameters_are_ignored() {
        let (_dir, _store, _source, router) = app(false);

        let response = get(&router, "/v1/mvt/parcels/1/0/0?columns=&id_column=&filter=").await;
        assert_eq!(StatusCode::OK, response.status());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let sql = String::from_utf8_lossy(&body);

        assert!(sql.contains("AS geom FROM parcels,"));
        assert!(!sql.contains(" AND "));
        assert!(sql.contains("'parcels', 4096, 'geom') AS mvt"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (_dir, _store, _source, router) = app(false);

        let response = get(&router, "/v1/mvt/parcels/10/512").await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());
    }
}
