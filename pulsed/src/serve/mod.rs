/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! The collector's HTTP surface. Handlers translate the wire contract
//! onto the storage seam and respond with specific 400 reasons for
//! malformed requests and 500 for storage failures; when a shared key is
//! configured, response bodies carry their own integrity tag.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use slog::{Logger, error};

use pulse_codec::digest::TagSigner;
use pulse_codec::seal::Opener;
use pulse_types::{Metric, MetricKind};

use crate::store::{MetricStore, StoreError};

mod body;
use body::decode_body;

pub(crate) const HASH_HEADER: HeaderName = HeaderName::from_static("hashsha256");
pub(crate) const ENCRYPTION_HEADER: HeaderName = HeaderName::from_static("x-encrypted");

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn MetricStore>,
    signer: Option<Arc<TagSigner>>,
    opener: Option<Arc<Opener>>,
    logger: Logger,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MetricStore>,
        signer: Option<Arc<TagSigner>>,
        opener: Option<Arc<Opener>>,
        logger: Logger,
    ) -> Self {
        AppState {
            store,
            signer,
            opener,
            logger,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/update", post(update_json))
        .route("/update/", post(update_json))
        .route("/update/{type}/{name}/{value}", post(update_text))
        .route("/updates", post(updates_batch))
        .route("/updates/", post(updates_batch))
        .route("/value", post(value_json))
        .route("/value/", post(value_json))
        .route("/value/{type}/{name}", get(value_text))
        .with_state(state)
}

/// Build a response, tagging the body when a shared key is configured.
fn respond(
    state: &AppState,
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Some(signer) = &state.signer {
        if !body.is_empty() {
            if let Ok(tag) = signer.tag(&body) {
                if let Ok(value) = HeaderValue::from_str(&tag) {
                    headers.insert(HASH_HEADER, value);
                }
            }
        }
    }
    (status, headers, body).into_response()
}

fn respond_json<T: serde::Serialize>(state: &AppState, status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => respond(state, status, APPLICATION_JSON, body),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn bad_request(state: &AppState, reason: &str) -> Response {
    respond(
        state,
        StatusCode::BAD_REQUEST,
        TEXT_PLAIN,
        reason.as_bytes().to_vec(),
    )
}

fn storage_failure(state: &AppState, endpoint: &'static str, err: &StoreError) -> Response {
    error!(state.logger, "storage failure"; "endpoint" => endpoint, "reason" => %err);
    respond(
        state,
        StatusCode::INTERNAL_SERVER_ERROR,
        TEXT_PLAIN,
        b"store error".to_vec(),
    )
}

async fn apply_metric(state: &AppState, metric: &Metric) -> Result<(), StoreError> {
    match metric.kind {
        MetricKind::Gauge => {
            state
                .store
                .upsert_gauge(&metric.id, metric.value.unwrap_or_default())
                .await
        }
        MetricKind::Counter => {
            state
                .store
                .upsert_counter(&metric.id, metric.delta.unwrap_or_default())
                .await
        }
    }
}

async fn update_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    raw: Bytes,
) -> Response {
    let payload = match decode_body(&state, &headers, &raw) {
        Ok(p) => p,
        Err(rsp) => return rsp,
    };
    let metric: Metric = match serde_json::from_slice(&payload) {
        Ok(m) => m,
        Err(_) => return bad_request(&state, "malformed metric json"),
    };
    if let Err(e) = metric.validate() {
        return bad_request(&state, &e.to_string());
    }
    match apply_metric(&state, &metric).await {
        Ok(()) => respond_json(&state, StatusCode::OK, &json!({"status": "OK"})),
        Err(e) => storage_failure(&state, "/update", &e),
    }
}

async fn update_text(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return bad_request(&state, &format!("unknown metric type: {kind}"));
    };
    let metric = match kind {
        MetricKind::Gauge => match value.parse::<f64>() {
            Ok(v) => Metric::gauge(name, v),
            Err(_) => return bad_request(&state, "bad gauge value"),
        },
        MetricKind::Counter => match value.parse::<i64>() {
            Ok(d) => Metric::counter(name, d),
            Err(_) => return bad_request(&state, "bad counter value"),
        },
    };
    if let Err(e) = metric.validate() {
        return bad_request(&state, &e.to_string());
    }
    match apply_metric(&state, &metric).await {
        Ok(()) => respond(&state, StatusCode::OK, TEXT_PLAIN, b"OK".to_vec()),
        Err(e) => storage_failure(&state, "/update/{type}/{name}/{value}", &e),
    }
}

async fn updates_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    raw: Bytes,
) -> Response {
    let payload = match decode_body(&state, &headers, &raw) {
        Ok(p) => p,
        Err(rsp) => return rsp,
    };
    let metrics: Vec<Metric> = match serde_json::from_slice(&payload) {
        Ok(m) => m,
        Err(_) => {
            return respond_json(
                &state,
                StatusCode::BAD_REQUEST,
                &json!({"error": "invalid JSON format"}),
            );
        }
    };
    if metrics.is_empty() {
        return respond_json(
            &state,
            StatusCode::BAD_REQUEST,
            &json!({"error": "empty batch"}),
        );
    }

    let details: Vec<String> = metrics
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.validate().err().map(|e| format!("metric[{i}]: {e}")))
        .collect();
    if !details.is_empty() {
        return respond_json(
            &state,
            StatusCode::BAD_REQUEST,
            &json!({"error": "validation failed", "details": details}),
        );
    }

    match state.store.update_batch(&metrics).await {
        Ok(()) => respond_json(&state, StatusCode::OK, &json!({"status": "OK"})),
        Err(e) => {
            error!(state.logger, "storage failure"; "endpoint" => "/updates", "reason" => %e);
            respond_json(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({"error": format!("failed to apply batch: {e}")}),
            )
        }
    }
}

async fn value_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    raw: Bytes,
) -> Response {
    let payload = match decode_body(&state, &headers, &raw) {
        Ok(p) => p,
        Err(rsp) => return rsp,
    };
    let mut metric: Metric = match serde_json::from_slice(&payload) {
        Ok(m) => m,
        Err(_) => return bad_request(&state, "malformed metric json"),
    };
    if metric.id.is_empty() {
        return bad_request(&state, "metric id is empty");
    }

    match metric.kind {
        MetricKind::Gauge => match state.store.get_gauge(&metric.id).await {
            Ok(Some(value)) => {
                metric.value = Some(value);
                metric.delta = None;
            }
            Ok(None) => return StatusCode::NOT_FOUND.into_response(),
            Err(e) => return storage_failure(&state, "/value", &e),
        },
        MetricKind::Counter => match state.store.get_counter(&metric.id).await {
            Ok(Some(delta)) => {
                metric.delta = Some(delta);
                metric.value = None;
            }
            Ok(None) => return StatusCode::NOT_FOUND.into_response(),
            Err(e) => return storage_failure(&state, "/value", &e),
        },
    }
    respond_json(&state, StatusCode::OK, &metric)
}

async fn value_text(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return bad_request(&state, "bad metric type");
    };
    let rendered = match kind {
        MetricKind::Gauge => match state.store.get_gauge(&name).await {
            Ok(Some(value)) => format_gauge(value),
            Ok(None) => return StatusCode::NOT_FOUND.into_response(),
            Err(e) => return storage_failure(&state, "/value/{type}/{name}", &e),
        },
        MetricKind::Counter => match state.store.get_counter(&name).await {
            Ok(Some(delta)) => itoa::Buffer::new().format(delta).to_string(),
            Ok(None) => return StatusCode::NOT_FOUND.into_response(),
            Err(e) => return storage_failure(&state, "/value/{type}/{name}", &e),
        },
    };
    respond(&state, StatusCode::OK, TEXT_PLAIN, rendered.into_bytes())
}

async fn index(State(state): State<AppState>) -> Response {
    let snapshot = match state.store.get_all().await {
        Ok(s) => s,
        Err(e) => return storage_failure(&state, "/", &e),
    };

    let mut entries: Vec<String> = snapshot
        .gauges
        .iter()
        .map(|(id, value)| format!("gauge.{id}: {value}"))
        .chain(
            snapshot
                .counters
                .iter()
                .map(|(id, delta)| format!("counter.{id}: {delta}")),
        )
        .collect();
    entries.sort();

    let mut page = String::with_capacity(256);
    page.push_str("<html><head><title>pulsed metrics</title></head><body><h1>Metrics</h1><ul>");
    for entry in &entries {
        let _ = write!(&mut page, "<li>{entry}</li>");
    }
    page.push_str("</ul></body></html>");

    respond(&state, StatusCode::OK, TEXT_HTML, page.into_bytes())
}

async fn ping(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => respond(&state, StatusCode::OK, TEXT_PLAIN, b"OK".to_vec()),
        Err(e) => {
            error!(state.logger, "storage ping failed"; "reason" => %e);
            respond(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                TEXT_PLAIN,
                b"database connection failed".to_vec(),
            )
        }
    }
}

/// Gauge read-back rendering: three decimals with trailing zeros (and a
/// bare trailing dot) trimmed.
fn format_gauge(value: f64) -> String {
    let s = format!("{value:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
