// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted websocket server standing in for a Loggregator endpoint

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// One step the server performs after the handshake.
#[derive(Debug, Clone)]
pub enum Step {
    Send(WsMessage),
    Pause(Duration),
    Close,
    /// Drop the TCP connection without a closing handshake.
    Abort,
}

#[derive(Clone, Debug)]
pub struct MockLogServer {
    pub addr: SocketAddr,
    /// Messages received from the client, in arrival order.
    pub received: Arc<Mutex<Vec<WsMessage>>>,
    pub authorization: Arc<Mutex<Option<String>>>,
    pub path: Arc<Mutex<Option<String>>>,
}

impl MockLogServer {
    /// Start a server on a random port that plays `script` to the first client.
    ///
    /// Without a trailing [`Step::Close`] the connection stays open until the
    /// client closes it.
    pub async fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock log server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let server = Self {
            addr,
            received: Arc::new(Mutex::new(Vec::new())),
            authorization: Arc::new(Mutex::new(None)),
            path: Arc::new(Mutex::new(None)),
        };

        let handle = server.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let authorization = Arc::clone(&handle.authorization);
            let path = Arc::clone(&handle.path);
            let callback = move |request: &Request,
                                 response: Response|
                  -> Result<Response, ErrorResponse> {
                *path.lock().unwrap() = request.uri().path_and_query().map(|p| p.to_string());
                *authorization.lock().unwrap() = request
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok(response)
            };
            let Ok(ws) = accept_hdr_async(stream, callback).await else {
                return;
            };
            let (mut sink, mut stream) = ws.split();

            let received = Arc::clone(&handle.received);
            let reader = tokio::spawn(async move {
                while let Some(Ok(message)) = stream.next().await {
                    received.lock().unwrap().push(message);
                }
            });

            for step in script {
                let result = match step {
                    Step::Send(message) => sink.send(message).await,
                    Step::Pause(duration) => {
                        tokio::time::sleep(duration).await;
                        Ok(())
                    }
                    Step::Close => sink.send(WsMessage::Close(None)).await,
                    Step::Abort => {
                        reader.abort();
                        break;
                    }
                };
                if result.is_err() {
                    break;
                }
            }
        });

        server
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn keep_alives(&self) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|m| matches!(m, WsMessage::Text(text) if text == "keep alive"))
            .count()
    }

    pub fn saw_close(&self) -> bool {
        self.received
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, WsMessage::Close(_)))
    }
}
