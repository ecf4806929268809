/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Byte-level payload handling shared by the agent and the collector:
//! gzip framing, HMAC-SHA256 integrity tags, and the hybrid sealed
//! envelope used when a key pair is configured.

use std::io;

use thiserror::Error;

pub mod compress;
pub mod digest;
pub mod seal;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io failure: {0}")]
    Io(#[from] io::Error),
    #[error("crypto failure: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
    #[error("invalid base64 in sealed envelope: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid sealed envelope: {0}")]
    Envelope(&'static str),
}
