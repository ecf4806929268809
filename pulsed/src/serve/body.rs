/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Ingest body pipeline, in wire order: the integrity tag covers the raw
//! received bytes, gzip is the outermost framing, the sealed envelope
//! sits under it. Every failure is a specific 400 and never retried.

use axum::http::HeaderMap;
use axum::http::header::CONTENT_ENCODING;
use axum::response::Response;
use slog::warn;

use pulse_codec::compress;

use super::{AppState, ENCRYPTION_HEADER, HASH_HEADER, bad_request};

pub(super) fn decode_body(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Vec<u8>, Response> {
    if let (Some(signer), Some(tag)) = (&state.signer, headers.get(&HASH_HEADER)) {
        let verified = tag
            .to_str()
            .ok()
            .and_then(|t| signer.verify(body, t).ok())
            .unwrap_or(false);
        if !verified {
            warn!(state.logger, "rejecting payload with invalid integrity tag");
            return Err(bad_request(state, "invalid payload hash"));
        }
    }

    let mut payload = body.to_vec();

    let gzipped = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));
    if gzipped {
        payload = match compress::gunzip(&payload) {
            Ok(plain) => plain,
            Err(e) => {
                warn!(state.logger, "rejecting malformed gzip body"; "reason" => %e);
                return Err(bad_request(state, "malformed gzip body"));
            }
        };
    }

    if let Some(mode) = headers.get(&ENCRYPTION_HEADER) {
        let Some(opener) = &state.opener else {
            return Err(bad_request(state, "encrypted payload not supported"));
        };
        let opened = match mode.to_str().unwrap_or_default() {
            "rsa" => opener.open_rsa(&payload),
            "hybrid" => opener.open_hybrid(&payload),
            _ => return Err(bad_request(state, "unsupported encryption type")),
        };
        payload = match opened {
            Ok(plain) => plain,
            Err(e) => {
                warn!(state.logger, "failed to decrypt payload"; "reason" => %e);
                return Err(bad_request(state, "failed to decrypt payload"));
            }
        };
    }

    Ok(payload)
}
