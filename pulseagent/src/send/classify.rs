/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use pulse_retry::{ErrorClassification, ErrorClassifier};

use super::SendError;

/// Transient network conditions worth another attempt, matched against
/// the lowercased error chain text.
const TRANSIENT_TEXT: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connection closed",
    "network is unreachable",
    "host is unreachable",
    "no such host",
    "dns error",
    "failed to lookup address",
    "temporary failure",
    "unexpected eof",
    "broken pipe",
];

pub(crate) struct NetErrorClassifier;

impl ErrorClassifier<SendError> for NetErrorClassifier {
    fn classify(&self, err: &SendError) -> ErrorClassification {
        match err {
            SendError::Status(code) => {
                if *code == reqwest::StatusCode::REQUEST_TIMEOUT
                    || *code == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || code.is_server_error()
                {
                    ErrorClassification::Retriable
                } else {
                    ErrorClassification::NonRetriable
                }
            }
            SendError::Network(e) => {
                if e.is_timeout() || e.is_connect() {
                    return ErrorClassification::Retriable;
                }
                let text = error_chain_text(e);
                if TRANSIENT_TEXT.iter().any(|pattern| text.contains(pattern)) {
                    ErrorClassification::Retriable
                } else {
                    ErrorClassification::NonRetriable
                }
            }
            _ => ErrorClassification::NonRetriable,
        }
    }
}

fn error_chain_text(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        text.push_str(": ");
        text.push_str(&e.to_string());
        source = e.source();
    }
    text.make_ascii_lowercase();
    text
}
