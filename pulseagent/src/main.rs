/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use anyhow::Context;
use slog::{info, o};
use tokio_util::sync::CancellationToken;

use pulseagent::collect::HostCollector;
use pulseagent::config::AgentConfig;
use pulseagent::dispatch::Dispatcher;
use pulseagent::send::HttpSender;

fn main() -> anyhow::Result<()> {
    let args = pulseagent::opts::parse_clap();
    let config =
        AgentConfig::assemble(&args).context("failed to assemble agent configuration")?;
    let logger = pulse_log::new_logger("pulseagent", config.debug);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    rt.block_on(run(config, logger))
}

async fn run(config: AgentConfig, logger: slog::Logger) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    pulseagent::signal::register(cancel.clone(), logger.new(o!("component" => "signal")));

    let collector = Arc::new(HostCollector::new(logger.new(o!("component" => "collect"))));
    let sender = Arc::new(
        HttpSender::new(&config, logger.new(o!("component" => "send")))
            .context("failed to build http sender")?,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        collector,
        sender,
        logger.new(o!("component" => "dispatch")),
    ));

    info!(logger, "agent started";
        "server" => %config.server_url,
        "poll_interval" => ?config.poll_interval,
        "report_interval" => ?config.report_interval,
        "workers" => config.rate_limit);

    dispatcher.run(&cancel).await;
    info!(logger, "agent stopped");
    Ok(())
}
