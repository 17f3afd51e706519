use std::{net::SocketAddr, sync::Arc};

use action_capture::metrics as capture_metrics;
use axum::{
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use cdp_adapter::metrics as cdp_metrics;
use lazy_static::lazy_static;
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{Encoder, IntCounterVec, Registry, TextEncoder};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info};

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();

lazy_static! {
    static ref MODE_TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "workflow_mode_transitions_total",
            "Mode controller transitions by target and outcome"
        ),
        &["transition", "outcome"]
    )
    .unwrap();
}

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        cdp_metrics::register_metrics(registry);
        capture_metrics::register_metrics(registry);
        if let Err(err) = registry.register(Box::new(MODE_TRANSITIONS_TOTAL.clone())) {
            error!(?err, "failed to register mode transition metric");
        }
    });
}

pub fn record_transition(transition: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    MODE_TRANSITIONS_TOTAL
        .with_label_values(&[transition, outcome])
        .inc();
}

pub fn spawn_metrics_server(port: u16) -> Option<JoinHandle<()>> {
    if port == 0 {
        return None;
    }

    register_metrics();
    let registry = Arc::new(global_registry().clone());
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(%addr, "metrics server listening");
    Some(tokio::spawn(async move {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(err) = axum::serve(listener, app.into_make_service()).await {
                    error!(?err, "metrics server exited with error");
                }
            }
            Err(err) => {
                error!(?err, "failed to bind metrics listener");
            }
        }
    }))
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!(?err, "failed to encode prometheus metrics");
        return encode_error();
    }

    let content_type = match HeaderValue::from_str(encoder.format_type()) {
        Ok(value) => value,
        Err(err) => {
            error!(?err, "failed to build content-type header");
            return encode_error();
        }
    };
    match String::from_utf8(buffer) {
        Ok(body) => ([(axum::http::header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(err) => {
            error!(?err, "failed to convert prometheus metrics to utf8");
            encode_error()
        }
    }
}

fn encode_error() -> Response {
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        "metric encode error",
    )
        .into_response()
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_all_layers() {
        register_metrics();
        record_transition("manual", true);
        capture_metrics::record_malformed();
        cdp_metrics::record_event();
        let names: Vec<String> = global_registry()
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "workflow_mode_transitions_total"));
        assert!(names.iter().any(|n| n == "workflow_capture_malformed_lines_total"));
        assert!(names.iter().any(|n| n == "workflow_cdp_events_total"));
    }
}
