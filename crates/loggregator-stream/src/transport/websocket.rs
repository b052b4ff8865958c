// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Websocket transport for Loggregator log streams.
//!
//! The connection is split in two halves. Outbound messages (keep-alive
//! pings, pongs, the closing handshake) are queued to a writer task so that
//! senders never wait on the network. The read half is driven by a
//! [`FrameReader`] that forwards every frame to a [`StreamCoordinator`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::StreamConfig;
use crate::coordinator::StreamCoordinator;
use crate::errors::TransportError;
use crate::scheduler::TokioScheduler;
use crate::session::Connection;
use crate::sink::LogSink;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MAX_LOG_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Where to open a log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEndpoint {
    pub url: String,
    /// Pre-acquired token, sent verbatim as the `Authorization` header.
    pub auth_token: Option<String>,
}

impl LogEndpoint {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
        }
    }

    /// Tail endpoint for one application, e.g. `wss://loggregator.example.com/tail/?app=<guid>`.
    #[must_use]
    pub fn tail(base_url: &str, app_id: &str) -> Self {
        Self::new(format!(
            "{}/tail/?app={}",
            base_url.trim_end_matches('/'),
            app_id
        ))
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn request(&self) -> Result<Request, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(token)
                .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// Sending half of a websocket log connection.
#[derive(Debug)]
pub struct WebSocketConnection {
    outbound: mpsc::UnboundedSender<WsMessage>,
    open: Arc<AtomicBool>,
}

impl Connection for WebSocketConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    fn send_text(&self, payload: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(WsMessage::Text(payload.to_string()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(WsMessage::Close(None))
            .map_err(|_| TransportError::Closed)
    }
}

/// Receiving half of a websocket log connection.
pub struct FrameReader {
    stream: SplitStream<WsStream>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    open: Arc<AtomicBool>,
}

impl FrameReader {
    /// Forwards frames to `coordinator` until the peer closes, the transport
    /// fails, or `cancel` fires.
    pub async fn run(mut self, coordinator: Arc<StreamCoordinator>, cancel: CancellationToken) {
        loop {
            let frame = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Log stream reader cancelled");
                    break;
                }
                frame = self.stream.next() => frame,
            };

            match frame {
                Some(Ok(WsMessage::Binary(bytes))) => coordinator.on_frame(&bytes),
                Some(Ok(WsMessage::Text(text))) => coordinator.on_text_frame(&text),
                Some(Ok(WsMessage::Ping(payload))) => {
                    if self.outbound.send(WsMessage::Pong(payload)).is_err() {
                        trace!("Writer gone, dropping pong");
                    }
                }
                Some(Ok(WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("Log stream closed by peer");
                    self.open.store(false, Ordering::Release);
                    coordinator.on_complete();
                    break;
                }
                Some(Err(err)) => {
                    debug!("Log stream transport failed: {err}");
                    self.open.store(false, Ordering::Release);
                    coordinator.on_error(err.into());
                    break;
                }
            }
        }
    }
}

/// Opens a websocket to `endpoint` and spawns its writer task.
pub async fn connect(
    endpoint: &LogEndpoint,
) -> Result<(WebSocketConnection, FrameReader), TransportError> {
    let request = endpoint.request()?;

    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_LOG_MESSAGE_SIZE);
    config.max_frame_size = Some(MAX_LOG_MESSAGE_SIZE);

    let (stream, _) = connect_async_with_config(request, Some(config), false).await?;
    let (sink, stream) = stream.split();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(true));

    tokio::spawn(write_loop(sink, outbound_rx, Arc::clone(&open)));

    let connection = WebSocketConnection {
        outbound: outbound.clone(),
        open: Arc::clone(&open),
    };
    let reader = FrameReader {
        stream,
        outbound,
        open,
    };
    Ok((connection, reader))
}

async fn write_loop(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    open: Arc<AtomicBool>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, WsMessage::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!("Failed to write to log stream: {e}");
            break;
        }
        if closing {
            break;
        }
    }
    open.store(false, Ordering::Release);
    if let Err(e) = sink.close().await {
        trace!("Error closing websocket sink: {e}");
    }
}

/// A running log stream.
#[derive(Debug)]
pub struct LogStream {
    coordinator: Arc<StreamCoordinator>,
    scheduler: TokioScheduler,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

impl LogStream {
    /// Stops the stream: closes the connection and discards buffered records.
    /// The sink receives nothing further, including no terminal event.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.coordinator.cancel();
        self.scheduler.shutdown();
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<StreamCoordinator> {
        &self.coordinator
    }

    /// Waits until the transport stops delivering frames.
    ///
    /// The terminal event reaches the sink later, once the buffer has drained.
    pub async fn wait(self) {
        if let Err(e) = self.reader.await {
            debug!("Log stream reader task failed: {e}");
        }
    }
}

/// Connects to `endpoint` and streams ordered log records into `sink`.
pub async fn stream_logs(
    endpoint: &LogEndpoint,
    config: &StreamConfig,
    sink: Arc<dyn LogSink>,
) -> Result<LogStream, TransportError> {
    let (connection, reader) = connect(endpoint).await?;

    let scheduler = TokioScheduler::new();
    let coordinator = Arc::new(StreamCoordinator::new(
        config,
        Arc::new(connection),
        sink,
        Arc::new(scheduler.clone()),
    ));

    let cancel = CancellationToken::new();
    let reader = tokio::spawn(reader.run(Arc::clone(&coordinator), cancel.clone()));
    info!(url = %endpoint.url, "Streaming logs");

    Ok(LogStream {
        coordinator,
        scheduler,
        cancel,
        reader,
    })
}
