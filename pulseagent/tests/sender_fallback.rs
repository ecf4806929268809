/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use tokio_util::sync::CancellationToken;

use pulse_retry::RetryPolicy;
use pulse_types::Metric;
use pulseagent::config::AgentConfig;
use pulseagent::send::{HttpSender, MetricSender};

struct CollectorDouble {
    batch_status: StatusCode,
    single_status: StatusCode,
    batch_hits: AtomicUsize,
    single_hits: AtomicUsize,
    text_hits: AtomicUsize,
    batch_items: AtomicUsize,
    tagged_requests: AtomicUsize,
}

impl CollectorDouble {
    fn new(batch_status: StatusCode, single_status: StatusCode) -> Arc<Self> {
        Arc::new(CollectorDouble {
            batch_status,
            single_status,
            batch_hits: AtomicUsize::new(0),
            single_hits: AtomicUsize::new(0),
            text_hits: AtomicUsize::new(0),
            batch_items: AtomicUsize::new(0),
            tagged_requests: AtomicUsize::new(0),
        })
    }
}

async fn batch_handler(
    State(state): State<Arc<CollectorDouble>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.batch_hits.fetch_add(1, Ordering::SeqCst);
    if headers.contains_key("HashSHA256") {
        state.tagged_requests.fetch_add(1, Ordering::SeqCst);
    }
    let plain = pulse_codec::compress::gunzip(&body).expect("batch body must be gzip");
    let metrics: Vec<Metric> = serde_json::from_slice(&plain).expect("batch body must be json");
    state.batch_items.store(metrics.len(), Ordering::SeqCst);
    state.batch_status
}

async fn single_handler(State(state): State<Arc<CollectorDouble>>, body: Bytes) -> StatusCode {
    state.single_hits.fetch_add(1, Ordering::SeqCst);
    let plain = pulse_codec::compress::gunzip(&body).expect("single body must be gzip");
    let _: Metric = serde_json::from_slice(&plain).expect("single body must be json");
    state.single_status
}

async fn text_handler(State(state): State<Arc<CollectorDouble>>) -> StatusCode {
    state.text_hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn spawn_collector(state: Arc<CollectorDouble>) -> SocketAddr {
    let app = Router::new()
        .route("/updates/", post(batch_handler))
        .route("/update/", post(single_handler))
        .route("/update/{kind}/{id}/{value}", post(text_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn test_sender(addr: SocketAddr, hash_key: Option<&str>) -> HttpSender {
    let config = AgentConfig {
        server_url: format!("http://{addr}"),
        hash_key: hash_key.map(str::to_string),
        ..AgentConfig::default()
    };
    let logger = slog::Logger::root(slog::Discard, slog::o!());
    HttpSender::new(&config, logger)
        .unwrap()
        .with_retry_policy(RetryPolicy::new(1, Vec::new()))
}

fn two_metrics() -> Vec<Metric> {
    vec![Metric::gauge("Alloc", 10.0), Metric::counter("PollCount", 2)]
}

#[tokio::test]
async fn healthy_batch_endpoint_needs_one_call() {
    let state = CollectorDouble::new(StatusCode::OK, StatusCode::OK);
    let addr = spawn_collector(state.clone()).await;

    test_sender(addr, None)
        .send(&CancellationToken::new(), &two_metrics())
        .await
        .unwrap();

    assert_eq!(state.batch_hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.single_hits.load(Ordering::SeqCst), 0);
    assert_eq!(state.text_hits.load(Ordering::SeqCst), 0);
    assert_eq!(state.batch_items.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn batch_5xx_fans_out_to_per_metric_sends() {
    let state = CollectorDouble::new(StatusCode::INTERNAL_SERVER_ERROR, StatusCode::OK);
    let addr = spawn_collector(state.clone()).await;

    test_sender(addr, None)
        .send(&CancellationToken::new(), &two_metrics())
        .await
        .unwrap();

    assert_eq!(state.batch_hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.single_hits.load(Ordering::SeqCst), 2);
    assert_eq!(state.text_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_json_single_falls_back_to_text() {
    let state = CollectorDouble::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::BAD_REQUEST,
    );
    let addr = spawn_collector(state.clone()).await;

    test_sender(addr, None)
        .send(&CancellationToken::new(), &two_metrics())
        .await
        .unwrap();

    assert_eq!(state.single_hits.load(Ordering::SeqCst), 2);
    assert_eq!(state.text_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalid_metrics_are_dropped_before_the_wire() {
    let state = CollectorDouble::new(StatusCode::OK, StatusCode::OK);
    let addr = spawn_collector(state.clone()).await;

    let mut metrics = two_metrics();
    metrics.push(Metric::counter("Broken", -5));
    metrics.push(Metric {
        id: String::new(),
        kind: pulse_types::MetricKind::Gauge,
        delta: None,
        value: Some(1.0),
        hash: None,
    });

    test_sender(addr, None)
        .send(&CancellationToken::new(), &metrics)
        .await
        .unwrap();

    assert_eq!(state.batch_items.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn configured_key_tags_every_batch() {
    let state = CollectorDouble::new(StatusCode::OK, StatusCode::OK);
    let addr = spawn_collector(state.clone()).await;

    test_sender(addr, Some("shared-secret"))
        .send(&CancellationToken::new(), &two_metrics())
        .await
        .unwrap();

    assert_eq!(state.tagged_requests.load(Ordering::SeqCst), 1);
}
