// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{Error, ProtocolError, Result, describe};
use crate::frame::Frame;
use crate::session::config::{SessionConfig, SubscribeErrorPolicy};

/// Ended subscriptions remembered for state queries
const RETIRED_SUBSCRIPTIONS: usize = 64;

/// Connection state of the WebSocket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport
    Closed,

    /// Opening the WebSocket
    Connecting,

    /// `connection_init` sent, waiting for `connection_ack`
    AwaitingInit,

    /// Handshake complete
    Open,
}

/// Lifecycle of a single subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Subscribe sent, no acknowledgement yet
    Pending,

    /// Acknowledged by the server
    Active,

    /// Rejected or never acknowledged
    Failed,

    /// Unsubscribed or the session ended
    Closed,
}

/// Keep-alive counters, published as a single updating indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepAliveStatus {
    /// Consecutive keep-alives since the last other frame
    pub streak: u64,

    /// Keep-alives received over the session lifetime
    pub total: u64,
}

/// Event delivered to the caller, in transport arrival order
#[derive(Debug)]
pub enum SessionEvent {
    /// Event published on a subscribed channel
    Data { subscription_id: Uuid, event: Value },

    /// The server rejected a subscription
    SubscriptionFailed(ProtocolError),

    /// No acknowledgement arrived for a subscription in time
    SubscriptionTimedOut { subscription_id: Uuid },

    /// Any other protocol message (acknowledgements, ...), verbatim
    Protocol { message_type: String, payload: Value },

    /// An inbound frame could not be decoded
    Malformed { raw: String, reason: String },

    /// The session ended because of a transport failure; always the last event
    Failed(Error),
}

impl SessionEvent {
    /// Deserialize the payload of a `Data` event.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Option<Result<T>> {
        match self {
            SessionEvent::Data { event, .. } => {
                Some(T::deserialize(event).map_err(Error::from))
            }
            _ => None,
        }
    }
}

struct SubscriptionEntry {
    channel: String,
    state: SubscriptionState,
    deadline: Option<Instant>,
}

/// Connection and subscription bookkeeping of one session.
///
/// Owned by the session task; callers observe it through the watch channels.
pub(crate) struct SessionState {
    config: SessionConfig,
    connection: ConnectionState,
    init_deadline: Option<Instant>,
    keep_alive_timeout: Duration,
    last_activity: Instant,
    keep_alive: KeepAliveStatus,
    subscriptions: HashMap<Uuid, SubscriptionEntry>,
    retired: VecDeque<(Uuid, SubscriptionState)>,
    connection_tx: watch::Sender<ConnectionState>,
    keep_alive_tx: watch::Sender<KeepAliveStatus>,
}

impl SessionState {
    pub(crate) fn new(
        config: SessionConfig,
        now: Instant,
    ) -> (
        Self,
        watch::Receiver<ConnectionState>,
        watch::Receiver<KeepAliveStatus>,
    ) {
        let (connection_tx, connection_rx) = watch::channel(ConnectionState::Connecting);
        let (keep_alive_tx, keep_alive_rx) = watch::channel(KeepAliveStatus::default());
        let keep_alive_timeout = config.keep_alive_timeout;
        let state = Self {
            config,
            connection: ConnectionState::Connecting,
            init_deadline: None,
            keep_alive_timeout,
            last_activity: now,
            keep_alive: KeepAliveStatus::default(),
            subscriptions: HashMap::new(),
            retired: VecDeque::new(),
            connection_tx,
            keep_alive_tx,
        };
        (state, connection_rx, keep_alive_rx)
    }

    pub(crate) fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.connection == ConnectionState::Closed
    }

    fn set_connection(&mut self, state: ConnectionState) {
        self.connection = state;
        self.connection_tx.send_replace(state);
    }

    /// `connection_init` has been written to the socket.
    pub(crate) fn init_sent(&mut self, now: Instant) {
        self.init_deadline = Some(now + self.config.init_timeout);
        self.set_connection(ConnectionState::AwaitingInit);
    }

    /// Track a subscribe request; pipelining before `connection_ack` is allowed.
    pub(crate) fn register(&mut self, id: Uuid, channel: &str, now: Instant) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let deadline = self.config.subscribe_timeout.map(|t| now + t);
        self.subscriptions.insert(
            id,
            SubscriptionEntry {
                channel: channel.to_string(),
                state: SubscriptionState::Pending,
                deadline,
            },
        );
        Ok(())
    }

    pub(crate) fn forget(&mut self, id: &Uuid) {
        self.subscriptions.remove(id);
    }

    pub(crate) fn unsubscribe(&mut self, id: &Uuid) -> bool {
        if self.subscriptions.contains_key(id) {
            self.retire(id, SubscriptionState::Closed);
            true
        } else {
            false
        }
    }

    /// Drop a live subscription, keeping only its final state.
    fn retire(&mut self, id: &Uuid, state: SubscriptionState) {
        if self.subscriptions.remove(id).is_none() {
            return;
        }
        if self.retired.len() == RETIRED_SUBSCRIPTIONS {
            self.retired.pop_front();
        }
        self.retired.push_back((*id, state));
    }

    pub(crate) fn subscription(&self, id: &Uuid) -> Option<SubscriptionState> {
        match self.subscriptions.get(id) {
            Some(entry) => Some(entry.state),
            None => self
                .retired
                .iter()
                .rev()
                .find(|(retired, _)| retired == id)
                .map(|(_, state)| *state),
        }
    }

    pub(crate) fn channel(&self, id: &Uuid) -> Option<&str> {
        self.subscriptions.get(id).map(|s| s.channel.as_str())
    }

    fn reset_streak(&mut self) {
        if self.keep_alive.streak > 0 {
            self.keep_alive.streak = 0;
            self.keep_alive_tx.send_replace(self.keep_alive);
        }
    }

    fn settle(&mut self, id: &Uuid, state: SubscriptionState) {
        if state != SubscriptionState::Active {
            self.retire(id, state);
        } else if let Some(entry) = self.subscriptions.get_mut(id) {
            entry.state = state;
            entry.deadline = None;
        }
    }

    /// Apply one inbound frame and return the events to deliver.
    pub(crate) fn handle_frame(&mut self, frame: Frame, now: Instant) -> Vec<SessionEvent> {
        self.last_activity = now;

        if let Frame::KeepAlive = frame {
            self.keep_alive.streak += 1;
            self.keep_alive.total += 1;
            self.keep_alive_tx.send_replace(self.keep_alive);
            trace!(streak = self.keep_alive.streak, "keep-alive");
            return Vec::new();
        }

        self.reset_streak();

        match frame {
            Frame::KeepAlive => Vec::new(),
            Frame::ConnectionAck {
                connection_timeout,
                payload,
            } => {
                if let Some(timeout) = connection_timeout {
                    self.keep_alive_timeout = timeout;
                }
                self.init_deadline = None;
                if self.connection == ConnectionState::AwaitingInit {
                    self.set_connection(ConnectionState::Open);
                }
                debug!(timeout = ?self.keep_alive_timeout, "connection acknowledged");
                vec![SessionEvent::Protocol {
                    message_type: "connection_ack".to_string(),
                    payload,
                }]
            }
            Frame::ConnectionError { errors } => {
                vec![self.fail(Error::Handshake(describe(&errors)))]
            }
            Frame::Data { id, event } => match self.subscription(&id) {
                Some(SubscriptionState::Closed | SubscriptionState::Failed) => {
                    debug!(subscription_id = %id, "dropping data for inactive subscription");
                    Vec::new()
                }
                _ => vec![SessionEvent::Data {
                    subscription_id: id,
                    event,
                }],
            },
            Frame::SubscribeSuccess { id, payload } => {
                if self.subscription(&id) == Some(SubscriptionState::Pending) {
                    self.settle(&id, SubscriptionState::Active);
                }
                debug!(subscription_id = %id, channel = ?self.channel(&id), "subscribed");
                vec![SessionEvent::Protocol {
                    message_type: "subscribe_success".to_string(),
                    payload,
                }]
            }
            Frame::SubscribeError { id, errors } => {
                self.settle(&id, SubscriptionState::Failed);
                let error = ProtocolError { id, errors };
                warn!(error = %error, "subscription rejected");
                if self.config.subscribe_error_policy == SubscribeErrorPolicy::CloseSession {
                    self.close();
                }
                vec![SessionEvent::SubscriptionFailed(error)]
            }
            Frame::Other {
                message_type,
                payload,
            } => vec![SessionEvent::Protocol {
                message_type,
                payload,
            }],
        }
    }

    /// Record an undecodable frame.
    pub(crate) fn malformed(&mut self, raw: &str, error: &Error) -> SessionEvent {
        self.reset_streak();
        warn!(error = %error, "malformed frame");
        SessionEvent::Malformed {
            raw: raw.to_string(),
            reason: error.to_string(),
        }
    }

    /// Earliest instant at which [`SessionState::expire`] has work to do.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        let connection = match self.connection {
            ConnectionState::AwaitingInit => self.init_deadline,
            ConnectionState::Open => Some(self.last_activity + self.keep_alive_timeout),
            ConnectionState::Closed | ConnectionState::Connecting => return None,
        };
        self.subscriptions
            .values()
            .filter_map(|s| s.deadline)
            .chain(connection)
            .min()
    }

    /// Apply every timeout that elapsed at `now`.
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.is_closed() {
            return events;
        }

        let mut expired: Vec<Uuid> = self
            .subscriptions
            .iter()
            .filter(|(_, s)| s.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();
        expired.sort();
        for id in expired {
            self.settle(&id, SubscriptionState::Failed);
            warn!(subscription_id = %id, "subscription not acknowledged in time");
            events.push(SessionEvent::SubscriptionTimedOut {
                subscription_id: id,
            });
        }

        match self.connection {
            ConnectionState::AwaitingInit if self.init_deadline.is_some_and(|d| d <= now) => {
                events.push(self.fail(Error::ConnectionTimeout));
            }
            ConnectionState::Open if self.last_activity + self.keep_alive_timeout <= now => {
                events.push(self.fail(Error::KeepAliveTimeout));
            }
            _ => {}
        }

        events
    }

    /// End the session because of `error`.
    pub(crate) fn fail(&mut self, error: Error) -> SessionEvent {
        warn!(error = %error, "session failed");
        self.close();
        SessionEvent::Failed(error)
    }

    /// Close every live subscription and the connection.
    pub(crate) fn close(&mut self) {
        // Only pending and active subscriptions are still live
        for entry in self.subscriptions.values_mut() {
            entry.state = SubscriptionState::Closed;
            entry.deadline = None;
        }
        self.init_deadline = None;
        self.set_connection(ConnectionState::Closed);
    }
}
