/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(MetricError::UnknownKind(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("metric id is empty")]
    EmptyId,
    #[error("unknown metric type {0}")]
    UnknownKind(String),
    #[error("gauge {0} carries no value")]
    MissingValue(String),
    #[error("counter {0} carries no delta")]
    MissingDelta(String),
    #[error("counter {0} carries negative delta {1}")]
    NegativeDelta(String, i64),
}

/// A single metric record in the wire form shared by the agent and the
/// collector. Exactly one of `value`/`delta` is set, selected by `kind`;
/// [`Metric::validate`] reports a violation as an error, never a panic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Metric {
    pub fn gauge<T: Into<String>>(id: T, value: f64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            hash: None,
        }
    }

    pub fn counter<T: Into<String>>(id: T, delta: i64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            hash: None,
        }
    }

    pub fn validate(&self) -> Result<(), MetricError> {
        if self.id.is_empty() {
            return Err(MetricError::EmptyId);
        }
        match self.kind {
            MetricKind::Gauge => {
                if self.value.is_none() {
                    return Err(MetricError::MissingValue(self.id.clone()));
                }
            }
            MetricKind::Counter => {
                let Some(d) = self.delta else {
                    return Err(MetricError::MissingDelta(self.id.clone()));
                };
                if d < 0 {
                    return Err(MetricError::NegativeDelta(self.id.clone(), d));
                }
            }
        }
        Ok(())
    }

    /// Render the metric value the way the legacy text endpoints expect it:
    /// counters as base-10 integers, gauges as the shortest decimal that
    /// round-trips back to the same f64.
    pub fn text_value(&self) -> Result<String, MetricError> {
        match self.kind {
            MetricKind::Counter => {
                let d = self.delta.ok_or_else(|| MetricError::MissingDelta(self.id.clone()))?;
                Ok(itoa::Buffer::new().format(d).to_string())
            }
            MetricKind::Gauge => {
                let v = self.value.ok_or_else(|| MetricError::MissingValue(self.id.clone()))?;
                Ok(format!("{v}"))
            }
        }
    }
}
