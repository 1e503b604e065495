// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use clap::Parser;
use ecr_proxy::application::Application;
use ecr_proxy::configuration::ProxyOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("[proxy] init");

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        // this needs to be set to remove duplicated information in the log.
        .with_current_span(false)
        // this needs to be set to false, otherwise ANSI color codes will
        // show up in a confusing manner in CloudWatch logs.
        .with_ansi(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time()
        // remove the name of the function from every log entry
        .with_target(false)
        .init();

    // get configuration options from environment variables
    let options = ProxyOptions::parse();

    tracing::info!("[proxy] {:?}", &options);

    let application = Application::build(options).await.inspect_err(|e| {
        tracing::error!("[proxy] startup failed: {:#}", e);
    })?;

    application.run_until_stopped().await?;

    Ok(())
}
