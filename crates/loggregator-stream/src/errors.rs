// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// A single frame could not be turned into a log record.
///
/// Decode failures are reported to the sink's error channel as they happen and
/// never end the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Malformed text frame: {0}")]
    MalformedText(String),

    #[error("Frame is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Unknown message type {0}")]
    UnknownMessageType(i32),

    #[error("Text schema unavailable: {0}")]
    Schema(String),
}

impl From<prost::DecodeError> for DecodeError {
    fn from(err: prost::DecodeError) -> Self {
        DecodeError::Malformed(err.to_string())
    }
}

impl From<prost_reflect::text_format::ParseError> for DecodeError {
    fn from(err: prost_reflect::text_format::ParseError) -> Self {
        DecodeError::MalformedText(err.to_string())
    }
}

/// Failures raised by the log transport or the connection it hands out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid log endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Websocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        match err {
            tokio_tungstenite::tungstenite::Error::ConnectionClosed
            | tokio_tungstenite::tungstenite::Error::AlreadyClosed => TransportError::Closed,
            other => TransportError::WebSocket(other.to_string()),
        }
    }
}

/// Errors delivered to a [`crate::LogSink`].
///
/// `Decode` errors may occur many times per stream and are delivered
/// immediately. `Transport` is the stream's terminal failure and only reaches
/// the sink after every buffered record has drained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl StreamError {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamError::Transport(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
