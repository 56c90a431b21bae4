// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

//! Realtime session over the AppSync Events WebSocket.
//!
//! A session owns one WebSocket. A background task holds the socket and the
//! subscription table; [`Session`] handles send it commands and
//! [`SessionEvents`] yields every inbound event in arrival order.

mod config;
mod state;

use std::collections::VecDeque;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::sink::SinkExt;
use futures_util::stream::Stream;
use http::{HeaderName, HeaderValue, Uri};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_websockets::{ClientBuilder, MaybeTlsStream, Message, WebSocketStream};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::channel::Channel;
use crate::credentials::CredentialProvider;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::frame::{Frame, OutboundMessage};
use crate::signer::{AuthType, DEFAULT_HEADERS, SignedRequest};

pub use config::{SessionConfig, SubscribeErrorPolicy};
pub use state::{ConnectionState, KeepAliveStatus, SessionEvent, SubscriptionState};
use state::SessionState;

/// Default WebSocket protocol for AppSync Events API
pub const WS_PROTOCOL_NAME: &str = "aws-appsync-event-ws";

/// Capacity of the command channel
const COMMAND_BUFFER: usize = 32;

/// WebSocket client type
type ClientSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Command sent to the session task
enum SessionCommand {
    Subscribe {
        id: Uuid,
        channel: Channel,
        authorization: SignedRequest,
        result_sender: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        id: Uuid,
        result_sender: oneshot::Sender<Result<()>>,
    },
    SubscriptionState {
        id: Uuid,
        result_sender: oneshot::Sender<Option<SubscriptionState>>,
    },
    Close {
        result_sender: oneshot::Sender<Result<()>>,
    },
}

/// Ordered stream of [`SessionEvent`]s; ends when the session closes
pub struct SessionEvents {
    receiver: ReceiverStream<SessionEvent>,
}

impl SessionEvents {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.receiver.next().await
    }
}

impl Stream for SessionEvents {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.receiver.size_hint()
    }
}

/// Builder for a realtime session
pub struct SessionBuilder {
    endpoint: Endpoint,
    auth_type: Option<AuthType>,
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            auth_type: None,
            config: SessionConfig::default(),
        }
    }

    /// Sign with IAM credentials. Fails when the region cannot be resolved.
    pub fn with_iam_auth(mut self, credentials: impl Into<CredentialProvider>) -> Result<Self> {
        self.auth_type = Some(AuthType::new_iam(&self.endpoint, credentials)?);
        Ok(self)
    }

    /// Authorize with an API key
    pub fn with_api_key_auth(mut self, key: impl Into<String>) -> Self {
        self.auth_type = Some(AuthType::new_api_key(&self.endpoint, key));
        self
    }

    pub fn with_auth(mut self, auth_type: AuthType) -> Self {
        self.auth_type = Some(auth_type);
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// `None` leaves unacknowledged subscriptions pending forever
    pub fn subscribe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.subscribe_timeout = timeout;
        self
    }

    pub fn subscribe_error_policy(mut self, policy: SubscribeErrorPolicy) -> Self {
        self.config.subscribe_error_policy = policy;
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.config.event_buffer = capacity;
        self
    }

    /// Open the session
    pub async fn connect(self) -> Result<(Session, SessionEvents)> {
        let auth_type = self.auth_type.ok_or_else(|| {
            Error::Configuration("an authentication type is required".to_string())
        })?;
        Session::connect(&self.endpoint, auth_type, self.config).await
    }
}

/// Handle to a realtime session; clones share the same WebSocket
#[derive(Clone)]
pub struct Session {
    auth_type: AuthType,
    cmd_sender: mpsc::Sender<SessionCommand>,
    connection: watch::Receiver<ConnectionState>,
    keep_alive: watch::Receiver<KeepAliveStatus>,
}

impl Session {
    /// Open the WebSocket and send `connection_init`.
    ///
    /// Returns as soon as the init message is written; `connection_ack`
    /// arrives later as a [`SessionEvent::Protocol`]. Subscriptions may be
    /// sent before it.
    pub async fn connect(
        endpoint: &Endpoint,
        auth_type: AuthType,
        config: SessionConfig,
    ) -> Result<(Session, SessionEvents)> {
        let protocol_token = auth_type.protocol_token().await?;
        debug!(token = %protocol_token, "auth protocol token");

        let event_buffer = config.event_buffer.max(1);
        let (mut state, connection, keep_alive) = SessionState::new(config, Instant::now());

        let realtime_url = endpoint.realtime_url();
        debug!(url = %realtime_url, "opening websocket");
        let mut socket = open_socket(&realtime_url, &protocol_token).await?;

        send_message(&mut socket, &OutboundMessage::ConnectionInit).await?;
        state.init_sent(Instant::now());

        let (cmd_sender, cmd_receiver) = mpsc::channel(COMMAND_BUFFER);
        let (event_sender, event_receiver) = mpsc::channel(event_buffer);

        tokio::spawn(session_loop(socket, state, cmd_receiver, event_sender));

        let session = Session {
            auth_type,
            cmd_sender,
            connection,
            keep_alive,
        };
        let events = SessionEvents {
            receiver: ReceiverStream::new(event_receiver),
        };

        Ok((session, events))
    }

    /// Subscribe to a channel and return the subscription id.
    ///
    /// The authorization is signed for `{"channel": <channel>}` right before
    /// sending. The acknowledgement arrives later as a protocol event; a
    /// rejection arrives as [`SessionEvent::SubscriptionFailed`].
    pub async fn subscribe(&self, channel: &str) -> Result<Uuid> {
        let channel = Channel::new(channel)?;
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let id = Uuid::new_v4();
        let body = json!({ "channel": channel.as_str() }).to_string();
        let authorization = self.auth_type.authorization(&body).await?;
        debug!(subscription_id = %id, ?authorization, "signed subscribe request");

        let (result_sender, result_receiver) = oneshot::channel();
        self.cmd_sender
            .send(SessionCommand::Subscribe {
                id,
                channel,
                authorization,
                result_sender,
            })
            .await
            .map_err(|_| Error::SessionClosed)?;

        result_receiver.await.map_err(|_| Error::SessionClosed)??;
        Ok(id)
    }

    /// Stop a subscription
    pub async fn unsubscribe(&self, id: Uuid) -> Result<()> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.cmd_sender
            .send(SessionCommand::Unsubscribe { id, result_sender })
            .await
            .map_err(|_| Error::SessionClosed)?;
        result_receiver.await.map_err(|_| Error::SessionClosed)?
    }

    /// Current state of a subscription, `None` if unknown
    pub async fn subscription_state(&self, id: Uuid) -> Result<Option<SubscriptionState>> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.cmd_sender
            .send(SessionCommand::SubscriptionState { id, result_sender })
            .await
            .map_err(|_| Error::SessionClosed)?;
        result_receiver.await.map_err(|_| Error::SessionClosed)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.connection_state() == ConnectionState::Closed
    }

    /// Keep-alive indicator; consecutive keep-alives update it in place.
    pub fn keep_alive(&self) -> watch::Receiver<KeepAliveStatus> {
        self.keep_alive.clone()
    }

    /// Close the WebSocket. Closing an already closed session is a no-op.
    pub async fn close(&self) -> Result<()> {
        let (result_sender, result_receiver) = oneshot::channel();
        if self
            .cmd_sender
            .send(SessionCommand::Close { result_sender })
            .await
            .is_err()
        {
            return Ok(());
        }
        result_receiver.await.unwrap_or(Ok(()))
    }
}

/// Open the WebSocket offering the event protocol and the auth token
async fn open_socket(url: &str, protocol_token: &str) -> Result<ClientSocket> {
    let protocols = format!("{}, {}", WS_PROTOCOL_NAME, protocol_token);

    let mut builder = ClientBuilder::from_uri(Uri::from_str(url)?).add_header(
        HeaderName::from_static("sec-websocket-protocol"),
        HeaderValue::from_str(&protocols)?,
    )?;
    for (name, value) in DEFAULT_HEADERS {
        builder = builder.add_header(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        )?;
    }

    let (socket, _response) = builder.connect().await?;
    Ok(socket)
}

async fn send_message(socket: &mut ClientSocket, message: &OutboundMessage<'_>) -> Result<()> {
    let json = message.to_json()?;
    trace!(message = %json, "sending");
    socket.send(Message::text(json)).await?;
    Ok(())
}

/// Wait for the next deadline, forever if there is none
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Session task: the only owner of the socket and the session state.
///
/// Events wait in `pending` until the consumer has room, so a slow reader
/// never stalls commands, frames or deadlines.
async fn session_loop(
    mut socket: ClientSocket,
    mut state: SessionState,
    mut cmd_receiver: mpsc::Receiver<SessionCommand>,
    event_sender: mpsc::Sender<SessionEvent>,
) {
    let mut pending: VecDeque<SessionEvent> = VecDeque::new();
    let mut receiver_open = true;

    loop {
        let deadline = state.next_deadline();

        let events = tokio::select! {
            message = socket.next() => match message {
                Some(Ok(message)) => handle_websocket_message(&message, &mut state),
                Some(Err(e)) => vec![state.fail(Error::WebSocket(e))],
                None => vec![state.fail(Error::ConnectionClosed {
                    code: None,
                    reason: "connection closed by peer".to_string(),
                })],
            },
            command = cmd_receiver.recv() => match command {
                Some(command) => handle_command(command, &mut socket, &mut state).await,
                None => {
                    debug!("all session handles dropped, closing");
                    state.close();
                    Vec::new()
                }
            },
            () = wait_until(deadline) => state.expire(Instant::now()),
            permit = event_sender.reserve(), if receiver_open && !pending.is_empty() => {
                match permit {
                    Ok(permit) => {
                        if let Some(event) = pending.pop_front() {
                            permit.send(event);
                        }
                    }
                    Err(_) => {
                        trace!(dropped = pending.len(), "event receiver dropped");
                        receiver_open = false;
                        pending.clear();
                    }
                }
                Vec::new()
            },
        };

        if receiver_open {
            pending.extend(events);
        }

        if state.is_closed() {
            let _ = socket.close().await;
            debug!(pending = pending.len(), "session closed");
            if receiver_open {
                for event in pending {
                    if event_sender.send(event).await.is_err() {
                        break;
                    }
                }
            }
            return;
        }
    }
}

fn handle_websocket_message(message: &Message, state: &mut SessionState) -> Vec<SessionEvent> {
    if let Some((code, reason)) = message.as_close() {
        return vec![state.fail(Error::ConnectionClosed {
            code: Some(u16::from(code)),
            reason: reason.to_string(),
        })];
    }

    let Some(text) = message.as_text() else {
        trace!("ignoring non-text message");
        return Vec::new();
    };
    trace!(frame = text, "received");

    match Frame::decode(text) {
        Ok(frame) => state.handle_frame(frame, Instant::now()),
        Err(error) => vec![state.malformed(text, &error)],
    }
}

async fn handle_command(
    command: SessionCommand,
    socket: &mut ClientSocket,
    state: &mut SessionState,
) -> Vec<SessionEvent> {
    match command {
        SessionCommand::Subscribe {
            id,
            channel,
            authorization,
            result_sender,
        } => {
            if let Err(e) = state.register(id, channel.as_str(), Instant::now()) {
                let _ = result_sender.send(Err(e));
                return Vec::new();
            }

            let message = OutboundMessage::Subscribe {
                id,
                channel: channel.as_str(),
                authorization: &authorization,
            };
            match send_message(socket, &message).await {
                Ok(()) => {
                    debug!(subscription_id = %id, channel = %channel, "subscribe sent");
                    let _ = result_sender.send(Ok(()));
                    Vec::new()
                }
                Err(Error::WebSocket(e)) => {
                    state.forget(&id);
                    let _ = result_sender.send(Err(Error::SessionClosed));
                    vec![state.fail(Error::WebSocket(e))]
                }
                Err(e) => {
                    state.forget(&id);
                    let _ = result_sender.send(Err(e));
                    Vec::new()
                }
            }
        }
        SessionCommand::Unsubscribe { id, result_sender } => {
            if !state.unsubscribe(&id) {
                let _ = result_sender.send(Err(Error::Configuration(format!(
                    "unknown subscription {id}"
                ))));
                return Vec::new();
            }
            match send_message(socket, &OutboundMessage::Unsubscribe { id }).await {
                Ok(()) => {
                    debug!(subscription_id = %id, "unsubscribe sent");
                    let _ = result_sender.send(Ok(()));
                    Vec::new()
                }
                Err(Error::WebSocket(e)) => {
                    let _ = result_sender.send(Err(Error::SessionClosed));
                    vec![state.fail(Error::WebSocket(e))]
                }
                Err(e) => {
                    let _ = result_sender.send(Err(e));
                    Vec::new()
                }
            }
        }
        SessionCommand::SubscriptionState { id, result_sender } => {
            let _ = result_sender.send(state.subscription(&id));
            Vec::new()
        }
        SessionCommand::Close { result_sender } => {
            debug!(connection = ?state.connection(), "closing session");
            state.close();
            let result = socket.close().await.map_err(Error::from);
            let _ = result_sender.send(result);
            Vec::new()
        }
    }
}
