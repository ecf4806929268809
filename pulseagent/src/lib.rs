/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

pub mod accumulate;
pub mod collect;
pub mod config;
pub mod dispatch;
pub mod opts;
pub mod send;
pub mod signal;
