// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use loggregator_stream::{
    constants::DEFAULT_LOG_LEVEL, stream_logs, ChannelSink, ConfigError, LogEndpoint, SinkEvent,
    StreamConfig,
};

/// Filter directives for the configured level, falling back to the default
/// when the configuration is invalid.
fn log_filter(config: &Result<StreamConfig, ConfigError>) -> String {
    let log_level = config
        .as_ref()
        .map_or(DEFAULT_LOG_LEVEL, |c| c.log_level.as_str());
    format!(
        "tungstenite=off,tokio_tungstenite=off,rustls=off,{}",
        log_level
    )
}

#[tokio::main]
pub async fn main() {
    let config = StreamConfig::from_env();
    let env_filter = log_filter(&config);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        debug!("TLS crypto provider already installed");
    }

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            error!("Error loading config: {e}");
            return;
        }
    };

    let Ok(base_url) = env::var("LOGGREGATOR_URL") else {
        error!("LOGGREGATOR_URL is not set. Shutting down.");
        return;
    };
    let Ok(app_id) = env::var("LOGGREGATOR_APP_ID") else {
        error!("LOGGREGATOR_APP_ID is not set. Shutting down.");
        return;
    };

    let mut endpoint = LogEndpoint::tail(&base_url, &app_id);
    if let Ok(token) = env::var("LOGGREGATOR_AUTH_TOKEN") {
        endpoint = endpoint.with_auth_token(token);
    }

    let (sink, mut events) = ChannelSink::new();
    let stream = match stream_logs(&endpoint, &config, Arc::new(sink)).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to open log stream for {app_id}: {e}");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing log stream");
                stream.cancel();
                break;
            }
            event = events.recv() => match event {
                Some(SinkEvent::Message(record)) => println!("{record}"),
                Some(SinkEvent::Error(e)) if e.is_terminal() => {
                    error!("Log stream failed: {e}");
                    break;
                }
                Some(SinkEvent::Error(e)) => warn!("Skipping log frame: {e}"),
                Some(SinkEvent::Complete) | None => {
                    info!("Log stream ended");
                    break;
                }
            }
        }
    }

    let stats = stream.coordinator().buffer().stats();
    debug!(
        received = stats.received,
        emitted = stats.emitted,
        late_dropped = stats.late_dropped,
        post_terminal_dropped = stats.post_terminal_dropped,
        "Log stream statistics"
    );
}
