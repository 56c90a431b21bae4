// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

//! Scripted AppSync Events realtime server for integration tests.
//!
//! Accepts one WebSocket connection, records the offered subprotocols,
//! forwards every client frame as JSON and replays the frames a test queues.

#![allow(dead_code)]

use std::time::Duration;

use appsync_events_realtime::{CredentialProvider, Endpoint, SessionBuilder};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_websockets::{Message, ServerBuilder, WebSocketStream};

pub const HTTP_DOMAIN: &str = "example123.appsync-api.us-east-1.amazonaws.com";

/// Frame the server writes next
pub enum Action {
    Send(Value),
    SendText(String),
    Close(u16, String),
}

pub struct MockServer {
    pub url: String,
    protocols: Option<oneshot::Receiver<Vec<String>>>,
    received: mpsc::Receiver<Value>,
    actions: mpsc::Sender<Action>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (protocols_tx, protocols_rx) = oneshot::channel();
        let (received_tx, received_rx) = mpsc::channel(32);
        let (actions_tx, actions_rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, protocols_tx, received_tx, actions_rx).await;
        });

        Self {
            url: format!("ws://{addr}/event/realtime"),
            protocols: Some(protocols_rx),
            received: received_rx,
            actions: actions_tx,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(HTTP_DOMAIN).with_realtime_url(self.url.clone())
    }

    /// Session builder signing with static test credentials
    pub fn session(&self) -> SessionBuilder {
        SessionBuilder::new(self.endpoint())
            .with_iam_auth(CredentialProvider::from_keys(
                "AKIDEXAMPLE",
                "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
                None,
            ))
            .unwrap()
    }

    /// Subprotocols offered in the handshake
    pub async fn protocols(&mut self) -> Vec<String> {
        self.protocols
            .take()
            .expect("protocols already taken")
            .await
            .unwrap()
    }

    /// Next frame written by the client
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("connection ended")
    }

    /// Next frame of the given type, skipping others
    pub async fn recv_type(&mut self, message_type: &str) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["type"] == message_type {
                return frame;
            }
        }
    }

    pub async fn send(&self, frame: Value) {
        self.actions.send(Action::Send(frame)).await.unwrap();
    }

    pub async fn send_text(&self, text: &str) {
        self.actions
            .send(Action::SendText(text.to_string()))
            .await
            .unwrap();
    }

    pub async fn close(&self, code: u16, reason: &str) {
        self.actions
            .send(Action::Close(code, reason.to_string()))
            .await
            .unwrap();
    }
}

async fn serve(
    stream: TcpStream,
    protocols_tx: oneshot::Sender<Vec<String>>,
    received_tx: mpsc::Sender<Value>,
    mut actions_rx: mpsc::Receiver<Action>,
) {
    let (request, mut ws_stream) = ServerBuilder::new().accept(stream).await.unwrap();

    let protocols = request
        .headers()
        .get("Sec-WebSocket-Protocol")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    let _ = protocols_tx.send(protocols);

    loop {
        tokio::select! {
            message = ws_stream.next() => match message {
                Some(Ok(message)) => {
                    if message.is_close() {
                        break;
                    }
                    if let Some(text) = message.as_text() {
                        if let Ok(value) = serde_json::from_str(text) {
                            let _ = received_tx.send(value).await;
                        }
                    }
                }
                Some(Err(_)) | None => break,
            },
            action = actions_rx.recv() => match action {
                Some(Action::Send(frame)) => {
                    if send(&mut ws_stream, frame.to_string()).await.is_err() {
                        break;
                    }
                }
                Some(Action::SendText(text)) => {
                    if send(&mut ws_stream, text).await.is_err() {
                        break;
                    }
                }
                Some(Action::Close(code, reason)) => {
                    let code = code.try_into().unwrap();
                    let _ = ws_stream.send(Message::close(Some(code), &reason)).await;
                    break;
                }
                None => break,
            },
        }
    }
}

async fn send(
    ws_stream: &mut WebSocketStream<TcpStream>,
    text: String,
) -> Result<(), tokio_websockets::Error> {
    ws_stream.send(Message::text(text)).await
}
