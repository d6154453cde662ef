//! HTTP server side of the delegation protocol
//!
//! Serves an [`EngineAdapter`] on `POST /v1/backup`, `POST /v1/update` and
//! `POST /v1/restore`, plus `GET /healthz`.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Result;

use super::{BackupRequest, EngineAdapter, RestoreRequest, UpdateRequest};

pub const BACKUP_PATH: &str = "/v1/backup";
pub const UPDATE_PATH: &str = "/v1/update";
pub const RESTORE_PATH: &str = "/v1/restore";
pub const HEALTH_PATH: &str = "/healthz";

/// Error payload of a failed call
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Bind `port` on all interfaces and serve `adapter`
pub async fn serve(port: u16, adapter: Arc<dyn EngineAdapter>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Delegation server listening on {}", addr);
    serve_listener(listener, adapter).await
}

/// Serve `adapter` on an already bound listener
pub async fn serve_listener(
    listener: TcpListener,
    adapter: Arc<dyn EngineAdapter>,
) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let adapter = adapter.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(adapter.clone(), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving delegation connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    adapter: Arc<dyn EngineAdapter>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let body = req.into_body().collect().await?.to_bytes();
    Ok(dispatch(adapter.as_ref(), &method, &path, &body).await)
}

/// Route one call to the adapter
pub async fn dispatch(
    adapter: &dyn EngineAdapter,
    method: &Method,
    path: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, HEALTH_PATH) => text_response(StatusCode::OK, "ok"),
        (&Method::POST, BACKUP_PATH) => match decode::<BackupRequest>(body) {
            Ok(request) => {
                info!(db = %request.db_name, engine = %request.engine_type, "Backup call");
                respond(path, adapter.backup(&request).await)
            }
            Err(response) => response,
        },
        (&Method::POST, UPDATE_PATH) => match decode::<UpdateRequest>(body) {
            Ok(request) => {
                info!(unit = %request.handle(), "Update call");
                respond(path, adapter.update(&request).await)
            }
            Err(response) => response,
        },
        (&Method::POST, RESTORE_PATH) => match decode::<RestoreRequest>(body) {
            Ok(request) => {
                info!(db = %request.db_name, revision = %request.revision, "Restore call");
                respond(path, adapter.restore(&request).await)
            }
            Err(response) => response,
        },
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> std::result::Result<T, Response<Full<Bytes>>> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Rejecting malformed delegation call");
        error_response(StatusCode::BAD_REQUEST, e.to_string())
    })
}

fn respond<T: Serialize>(path: &str, result: Result<T>) -> Response<Full<Bytes>> {
    match result.and_then(|value| Ok(serde_json::to_vec(&value)?)) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => {
            warn!(path = %path, error = %e, "Delegation call failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response<Full<Bytes>> {
    match serde_json::to_vec(&ErrorBody { error: message }) {
        Ok(body) => json_response(status, body),
        Err(_) => text_response(status, "error"),
    }
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
