/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! HTTP transport with a degrading fallback chain: batched gzip+JSON
//! first, then per-metric sends under a concurrency bound, each falling
//! back from the JSON endpoint to the legacy text endpoint on permanent
//! rejection. Every path runs inside the shared retry engine.

use async_trait::async_trait;
use futures_util::StreamExt;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use slog::{Logger, debug, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use pulse_codec::digest::TagSigner;
use pulse_codec::seal::Sealer;
use pulse_codec::{CodecError, compress};
use pulse_retry::{ErrorClassifier, RetryError, RetryPolicy, retry};
use pulse_types::{Metric, MetricError};

use crate::config::AgentConfig;

mod classify;
use classify::NetErrorClassifier;

pub(crate) const HASH_HEADER: &str = "HashSHA256";
pub(crate) const ENCRYPTION_HEADER: &str = "X-Encrypted";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Error)]
pub enum SendError {
    #[error("http transport error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server responded {0}")]
    Status(StatusCode),
    #[error("payload encoding failed: {0}")]
    Codec(#[from] CodecError),
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("metric failed validation: {0}")]
    Invalid(#[from] MetricError),
    #[error("all {attempts} attempts failed")]
    Exhausted {
        attempts: usize,
        #[source]
        source: Box<SendError>,
    },
    #[error("send cancelled")]
    Cancelled,
}

impl SendError {
    fn from_retry(err: RetryError<SendError>) -> SendError {
        match err {
            RetryError::Cancelled => SendError::Cancelled,
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { attempts, last } => SendError::Exhausted {
                attempts,
                source: Box::new(last),
            },
        }
    }
}

/// The one delivery operation the dispatch loop knows about. Retry and
/// fallback behavior live behind this seam; there is no bare,
/// non-retrying send to probe for.
#[async_trait]
pub trait MetricSender: Send + Sync {
    async fn send(&self, cancel: &CancellationToken, metrics: &[Metric]) -> Result<(), SendError>;
}

pub struct HttpSender {
    client: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
    classifier: NetErrorClassifier,
    signer: Option<TagSigner>,
    sealer: Option<Sealer>,
    max_concurrency: usize,
    logger: Logger,
}

impl HttpSender {
    pub fn new(config: &AgentConfig, logger: Logger) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build http client")?;
        let signer = config
            .hash_key
            .as_ref()
            .map(|k| TagSigner::new(k.as_bytes()))
            .transpose()
            .context("invalid hash key")?;
        let sealer = config
            .crypto_key
            .as_ref()
            .map(Sealer::from_pem_file)
            .transpose()
            .context("failed to load public encryption key")?;

        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);

        Ok(HttpSender {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            policy: RetryPolicy::default(),
            classifier: NetErrorClassifier,
            signer,
            sealer,
            max_concurrency: (parallelism / 2).max(2),
            logger,
        })
    }

    /// Replace the default 1s/3s/5s schedule, used by tests.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Encrypt (when configured), compress, tag and POST one JSON payload.
    async fn post_payload(&self, path: &str, plain: &[u8]) -> Result<(), SendError> {
        let sealed;
        let (payload, encrypted) = match &self.sealer {
            Some(sealer) => {
                sealed = sealer.seal(plain)?;
                (sealed.as_slice(), true)
            }
            None => (plain, false),
        };
        let packed = compress::gzip(payload)?;

        let mut req = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip");
        if let Some(signer) = &self.signer {
            req = req.header(HASH_HEADER, signer.tag(&packed)?);
        }
        if encrypted {
            req = req.header(ENCRYPTION_HEADER, "hybrid");
        }

        let rsp = req.body(packed).send().await?;
        let status = rsp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SendError::Status(status))
        }
    }

    async fn post_batch(&self, metrics: &[Metric]) -> Result<(), SendError> {
        let body = serde_json::to_vec(metrics)?;
        self.post_payload("/updates/", &body).await
    }

    async fn post_single_json(&self, metric: &Metric) -> Result<(), SendError> {
        let body = serde_json::to_vec(metric)?;
        self.post_payload("/update/", &body).await
    }

    /// Legacy plain-text endpoint; the value travels in the URL path and
    /// the integrity tag covers the literal `type:id:value` string.
    async fn post_single_text(&self, metric: &Metric) -> Result<(), SendError> {
        let value = metric.text_value()?;
        let url = format!(
            "{}/update/{}/{}/{}",
            self.base_url,
            metric.kind,
            utf8_percent_encode(&metric.id, PATH_SEGMENT),
            utf8_percent_encode(&value, PATH_SEGMENT),
        );

        let mut req = self.client.post(url).header(CONTENT_TYPE, "text/plain");
        if let Some(signer) = &self.signer {
            let signing = format!("{}:{}:{}", metric.kind, metric.id, value);
            req = req.header(HASH_HEADER, signer.tag(signing.as_bytes())?);
        }

        let rsp = req.send().await?;
        let status = rsp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SendError::Status(status))
        }
    }

    /// One attempt for one metric: JSON endpoint first, legacy text only
    /// when JSON was rejected permanently. A transient JSON failure is
    /// surfaced so the retry engine re-runs the whole attempt.
    async fn send_one(&self, metric: &Metric) -> Result<(), SendError> {
        match self.post_single_json(metric).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if self.classifier.classify(&e) == pulse_retry::ErrorClassification::Retriable {
                    return Err(e);
                }
                debug!(self.logger, "json endpoint rejected metric, using legacy text endpoint";
                    "metric" => %metric.id, "reason" => %e);
                self.post_single_text(metric).await
            }
        }
    }
}

#[async_trait]
impl MetricSender for HttpSender {
    async fn send(&self, cancel: &CancellationToken, metrics: &[Metric]) -> Result<(), SendError> {
        let mut valid = Vec::with_capacity(metrics.len());
        for metric in metrics {
            match metric.validate() {
                Ok(()) => valid.push(metric.clone()),
                Err(e) => {
                    warn!(self.logger, "dropping invalid metric"; "reason" => %e);
                }
            }
        }
        if valid.is_empty() {
            return Ok(());
        }

        let this = self;
        let valid_slice = valid.as_slice();
        match retry(&self.policy, cancel, &self.classifier, move || {
            this.post_batch(valid_slice)
        })
        .await
        {
            Ok(()) => return Ok(()),
            Err(RetryError::Cancelled) => return Err(SendError::Cancelled),
            Err(e) => {
                warn!(self.logger, "batch send failed, falling back to per-metric sends";
                    "count" => valid.len(), "reason" => %e);
            }
        }

        // Best-effort fan-out: each metric retries on its own, one
        // exhausted metric never aborts its siblings.
        futures_util::stream::iter(valid)
            .for_each_concurrent(self.max_concurrency, |metric| async move {
                let this = self;
                let m = &metric;
                let r = retry(&this.policy, cancel, &this.classifier, move || {
                    this.send_one(m)
                })
                .await;
                if let Err(e) = r.map_err(SendError::from_retry) {
                    warn!(self.logger, "failed to deliver metric";
                        "metric" => %metric.id, "reason" => %e);
                }
            })
            .await;

        if cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }
        Ok(())
    }
}
