/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Root logger construction. The logger is built exactly once in `main`
//! and handed down to each component; components derive children via
//! `logger.new(o!(...))` and never touch process-wide state.

use std::fmt::Write as _;
use std::io::{self, Write};

use chrono::Local;
use slog::{Drain, KV, Level, Logger, OwnedKVList, Record, o};

pub fn new_logger(process: &'static str, debug: bool) -> Logger {
    let level = if debug { Level::Debug } else { Level::Info };
    Logger::root(StderrDrain { level }, o!("process" => process))
}

struct StderrDrain {
    level: Level,
}

impl Drain for StderrDrain {
    type Ok = ();
    type Err = slog::Never;

    fn log(&self, record: &Record, values: &OwnedKVList) -> Result<(), Self::Err> {
        if !record.level().is_at_least(self.level) {
            return Ok(());
        }

        let mut kv_buf = String::with_capacity(64);
        let mut formatter = KvFormatter { buf: &mut kv_buf };
        let _ = values.serialize(record, &mut formatter);
        let _ = record.kv().serialize(record, &mut formatter);

        let datetime = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
        let stderr = io::stderr();
        let mut io = stderr.lock();
        let _ = writeln!(
            io,
            "{datetime} {}{kv_buf} {}",
            record.level().as_short_str(),
            record.msg()
        );
        Ok(())
    }
}

struct KvFormatter<'a> {
    buf: &'a mut String,
}

impl slog::Serializer for KvFormatter<'_> {
    fn emit_arguments(&mut self, key: slog::Key, val: &std::fmt::Arguments) -> slog::Result {
        let _ = write!(self.buf, " {key}={val}");
        Ok(())
    }
}
