//! HTTP surface of the telemetry store.
//!
//! | Method | Path              | Success                        |
//! |--------|-------------------|--------------------------------|
//! | POST   | `/telemetry`      | stored record                  |
//! | GET    | `/telemetry`      | `{total, limit, offset, data}` |
//! | GET    | `/telemetry/{id}` | bare record                    |
//! | DELETE | `/telemetry/{id}` | `{"message": ...}`             |

use std::convert::Infallible;
use std::sync::Arc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::error::{FieldError, TelemetryError};
use crate::model::TelemetrySample;
use crate::query::ListParams;
use crate::validate;
use crate::TelemetryStore;

/// Largest accepted request body.
const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Request headers a cross-origin caller may send.
pub const CORS_ALLOWED_HEADERS: &[&str] = &[
    "accept",
    "accept-language",
    "authorization",
    "cache-control",
    "content-language",
    "content-type",
    "if-match",
    "if-none-match",
    "origin",
    "pragma",
    "range",
    "x-requested-with",
];

pub struct TelemetryServer {
    store: Arc<TelemetryStore>,
    cors_origins: Vec<String>,
}

impl TelemetryServer {
    pub fn new(store: Arc<TelemetryStore>, cors_origins: Vec<String>) -> Self {
        Self { store, cors_origins }
    }

    /// Serves until `shutdown` resolves. Fails only if `addr` cannot be bound.
    pub async fn run<S>(&self, addr: std::net::SocketAddr, shutdown: S) -> Result<(), warp::Error>
    where S: std::future::Future<Output = ()> + Send + 'static {
        let api = routes(self.store.clone(), &self.cors_origins);
        let (bound, server) = warp::serve(api).try_bind_with_graceful_shutdown(addr, shutdown)?;
        info!(%bound, "telemetry API listening");
        server.await;
        info!("telemetry API stopped");
        Ok(())
    }
}

/// Checks an origin has the `scheme://host[:port]` shape the CORS layer
/// expects.
pub fn check_origin(origin: &str) -> Result<(), String> {
    let (scheme, rest) = origin
    .split_once("://")
    .ok_or_else(|| format!("origin '{}' is missing a scheme", origin))?;
    if scheme != "http" && scheme != "https" {
        return Err(format!("origin '{}' must use http or https", origin));
    }
    if rest.is_empty() || rest.contains('/') {
        return Err(format!("origin '{}' must be scheme://host[:port] with no path", origin));
    }
    Ok(())
}

/// All API routes with CORS and rejection handling applied.
pub fn routes(
    store: Arc<TelemetryStore>,
    cors_origins: &[String],
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let create = warp::post()
    .and(warp::path("telemetry"))
    .and(warp::path::end())
    .and(warp::body::content_length_limit(MAX_BODY_BYTES))
    .and(warp::body::json())
    .and(with_store(store.clone()))
    .and_then(handle_create);

    let list = warp::get()
    .and(warp::path("telemetry"))
    .and(warp::path::end())
    .and(warp::query::<ListParams>())
    .and(with_store(store.clone()))
    .and_then(handle_list);

    let get = warp::get()
    .and(warp::path!("telemetry" / String))
    .and(with_store(store.clone()))
    .and_then(handle_get);

    let delete = warp::delete()
    .and(warp::path!("telemetry" / String))
    .and(with_store(store))
    .and_then(handle_delete);

    let cors = warp::cors()
    .allow_origins(cors_origins.iter().map(String::as_str))
    .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
    .allow_headers(CORS_ALLOWED_HEADERS.iter().copied())
    .allow_credentials(true);

    // Inner recover keeps error replies under CORS; the outer one sees CORS refusals
    create
    .or(list)
    .or(get)
    .or(delete)
    .recover(handle_rejection)
    .with(cors)
    .with(warp::trace::request())
    .recover(handle_rejection)
}

fn with_store(store: Arc<TelemetryStore>) -> impl Filter<Extract = (Arc<TelemetryStore>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

// --- HANDLERS ---

async fn handle_create(sample: TelemetrySample, store: Arc<TelemetryStore>) -> Result<Response, Infallible> {
    // Strict durability fsyncs inside create
    let res = tokio::task::spawn_blocking(move || store.create(&sample)).await;

    Ok(match res {
        Ok(Ok(record)) => json_reply(&record, StatusCode::OK),
        Ok(Err(e)) => error_reply(e),
        Err(e) => task_failed(e),
    })
}

async fn handle_list(params: ListParams, store: Arc<TelemetryStore>) -> Result<Response, Infallible> {
    let (filter, page) = match params.into_query() {
        Ok(q) => q,
        Err(e) => return Ok(error_reply(e.into())),
    };

    Ok(match store.query(&filter, page) {
        Ok(result) => json_reply(&result, StatusCode::OK),
        Err(e) => error_reply(e),
    })
}

async fn handle_get(raw_id: String, store: Arc<TelemetryStore>) -> Result<Response, Infallible> {
    let result = validate::parse_id(&raw_id)
    .map_err(TelemetryError::from)
    .and_then(|id| store.get(id));

    Ok(match result {
        Ok(record) => json_reply(&record, StatusCode::OK),
        Err(e) => error_reply(e),
    })
}

async fn handle_delete(raw_id: String, store: Arc<TelemetryStore>) -> Result<Response, Infallible> {
    let id = match validate::parse_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return Ok(error_reply(e.into())),
    };

    let res = tokio::task::spawn_blocking(move || store.delete(id)).await;

    Ok(match res {
        Ok(Ok(())) => json_reply(&json!({ "message": "Telemetry deleted" }), StatusCode::OK),
        Ok(Err(e)) => error_reply(e),
        Err(e) => task_failed(e),
    })
}

// --- RESPONSES ---

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn validation_reply(errors: &[FieldError]) -> Response {
    json_reply(&json!({ "detail": errors }), StatusCode::UNPROCESSABLE_ENTITY)
}

fn error_reply(err: TelemetryError) -> Response {
    match err {
        TelemetryError::Validation(e) => validation_reply(&e.errors),
        TelemetryError::NotFound { .. } => {
            json_reply(&json!({ "detail": "Telemetry not found" }), StatusCode::NOT_FOUND)
        }
        TelemetryError::Store(e) => {
            error!(error = %e, "store failure");
            json_reply(&json!({ "detail": e.to_string() }), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn task_failed(err: tokio::task::JoinError) -> Response {
    error!(error = %err, "store task failed");
    json_reply(&json!({ "detail": "internal error" }), StatusCode::INTERNAL_SERVER_ERROR)
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let reply = if err.is_not_found() {
        json_reply(&json!({ "detail": "Not Found" }), StatusCode::NOT_FOUND)
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        validation_reply(&[FieldError { field: "body", message: e.to_string() }])
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        validation_reply(&[FieldError { field: "query", message: e.to_string() }])
    } else if let Some(e) = err.find::<warp::filters::cors::CorsForbidden>() {
        warn!(reason = %e, "CORS request refused");
        json_reply(&json!({ "detail": e.to_string() }), StatusCode::FORBIDDEN)
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        json_reply(&json!({ "detail": "Payload too large" }), StatusCode::PAYLOAD_TOO_LARGE)
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        json_reply(&json!({ "detail": "Unsupported media type" }), StatusCode::UNSUPPORTED_MEDIA_TYPE)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        json_reply(&json!({ "detail": "Method Not Allowed" }), StatusCode::METHOD_NOT_ALLOWED)
    } else {
        error!(rejection = ?err, "unhandled rejection");
        json_reply(&json!({ "detail": "internal error" }), StatusCode::INTERNAL_SERVER_ERROR)
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_shapes() {
        assert!(check_origin("http://localhost:5173").is_ok());
        assert!(check_origin("https://ground.example.org").is_ok());
        assert!(check_origin("localhost:5173").is_err());
        assert!(check_origin("ftp://host").is_err());
        assert!(check_origin("http://host/path").is_err());
        assert!(check_origin("http://").is_err());
    }
}
