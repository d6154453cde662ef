//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

lazy_static::lazy_static! {
    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "db_backup_operator_reconciliations_total",
        "Total number of reconciliations",
        &["kind"]
    ).unwrap();

    /// Total number of reconciliation errors
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "db_backup_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
        &["kind"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "db_backup_operator_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Adapter calls by method and outcome
    pub static ref DELEGATIONS_TOTAL: CounterVec = register_counter_vec!(
        "db_backup_operator_delegations_total",
        "Total number of adapter calls by method and outcome",
        &["method", "outcome"]
    ).unwrap();

    /// Adapter call duration histogram
    pub static ref DELEGATION_DURATION: HistogramVec = register_histogram_vec!(
        "db_backup_operator_delegation_duration_seconds",
        "Duration of adapter calls in seconds",
        &["method"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Reports received from backup workloads
    pub static ref BACKUP_REPORTS_TOTAL: CounterVec = register_counter_vec!(
        "db_backup_operator_backup_reports_total",
        "Total number of backup runs reported by workloads, by outcome",
        &["outcome", "name"]
    ).unwrap();

    /// Unix time of the last successful backup run
    pub static ref LAST_BACKUP_TIMESTAMP: GaugeVec = register_gauge_vec!(
        "db_backup_operator_last_backup_timestamp_seconds",
        "Unix timestamp of the last successful backup run",
        &["name"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "db_backup_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Outcome of one backup run, posted by the backuper to `/report`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReport {
    pub backup_name: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Record a workload report
pub fn record_report(report: &BackupReport) {
    let outcome = if report.success { "success" } else { "failure" };
    BACKUP_REPORTS_TOTAL
        .with_label_values(&[outcome, &report.backup_name])
        .inc();
    if report.success {
        LAST_BACKUP_TIMESTAMP
            .with_label_values(&[&report.backup_name])
            .set(report.timestamp.timestamp() as f64);
    }
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    // Set initial health
    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (&method, path.as_str()) {
        (_, "/metrics") => metrics_response(),
        (_, "/healthz" | "/health") => health_response(),
        (_, "/readyz" | "/ready") => ready_response(),
        (&Method::POST, "/report") => {
            let body = req.into_body().collect().await?.to_bytes();
            report_response(&body)
        }
        _ => not_found_response(),
    };

    Ok(response)
}

fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Generate metrics response
fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut ok = response(StatusCode::OK, buffer);
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        ok.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    ok
}

/// Record a workload report
fn report_response(body: &[u8]) -> Response<Full<Bytes>> {
    match serde_json::from_slice::<BackupReport>(body) {
        Ok(report) => {
            info!(
                backup = %report.backup_name,
                success = report.success,
                "Received backup report"
            );
            record_report(&report);
            response(StatusCode::ACCEPTED, "accepted")
        }
        Err(e) => {
            warn!(error = %e, "Rejecting malformed backup report");
            response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

/// Health check response
fn health_response() -> Response<Full<Bytes>> {
    response(StatusCode::OK, "ok")
}

/// Readiness check response
fn ready_response() -> Response<Full<Bytes>> {
    response(StatusCode::OK, "ok")
}

/// Not found response
fn not_found_response() -> Response<Full<Bytes>> {
    response(StatusCode::NOT_FOUND, "Not Found")
}
