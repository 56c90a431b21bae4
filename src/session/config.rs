// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

const MINUTES: u64 = 60;

/// Connection init timeout
const CONNECTION_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Subscribe acknowledgement timeout
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep alive timeout until the server announces its own
const DEFAULT_KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(5 * MINUTES);

/// Capacity of the event channel
const DEFAULT_EVENT_BUFFER: usize = 32;

/// What a `subscribe_error` ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubscribeErrorPolicy {
    /// Fail the subscription and close the whole session
    #[default]
    CloseSession,

    /// Fail only the rejected subscription
    FailSubscription,
}

/// Tunables of a realtime session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time allowed between `connection_init` and `connection_ack`
    pub init_timeout: Duration,

    /// Time allowed for a subscribe acknowledgement; `None` waits forever
    pub subscribe_timeout: Option<Duration>,

    /// Keep-alive timeout used until `connection_ack` carries one
    pub keep_alive_timeout: Duration,

    pub subscribe_error_policy: SubscribeErrorPolicy,

    /// Capacity of the event channel; further events queue inside the session task
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            init_timeout: CONNECTION_INIT_TIMEOUT,
            subscribe_timeout: Some(SUBSCRIBE_TIMEOUT),
            keep_alive_timeout: DEFAULT_KEEP_ALIVE_TIMEOUT,
            subscribe_error_policy: SubscribeErrorPolicy::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}
