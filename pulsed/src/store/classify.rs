/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use rusqlite::ErrorCode;

use pulse_retry::{ErrorClassification, ErrorClassifier};

/// Database error classification by SQLite primary result code. Busy and
/// locked databases clear up on their own, as do connection-level i/o
/// conditions; constraint violations, type mismatches and API misuse do
/// not. Anything that is not a structured database error is permanent.
pub(crate) struct DbErrorClassifier;

impl ErrorClassifier<rusqlite::Error> for DbErrorClassifier {
    fn classify(&self, err: &rusqlite::Error) -> ErrorClassification {
        match err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull => ErrorClassification::Retriable,
                _ => ErrorClassification::NonRetriable,
            },
            _ => ErrorClassification::NonRetriable,
        }
    }
}
