// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

//! SigV4 signing and realtime sessions for AWS AppSync Events
//!
//! The [`signer`] produces the SigV4 header bundles AppSync Events expects,
//! both for the WebSocket auth subprotocol and for each subscribe message.
//! A [`Session`] drives one realtime WebSocket: it performs the
//! `connection_init` handshake, tracks subscriptions, coalesces keep-alives
//! and enforces the init, subscribe and keep-alive timeouts. A [`Publisher`]
//! sends events through the signed HTTP endpoint.
//!
//! Supports IAM and API key authorization.

pub mod channel;
pub mod credentials;
pub mod endpoint;
mod error;
pub mod frame;
mod publish;
pub mod session;
pub mod signer;

pub use channel::Channel;
pub use credentials::CredentialProvider;
pub use endpoint::Endpoint;
pub use error::{Error, ErrorDetail, ProtocolError, Result};
pub use frame::{Frame, OutboundMessage};
pub use publish::{
    FailedEvent, MAX_EVENTS_PER_PUBLISH, PublishResponse, PublishedEvent, Publisher,
};
pub use session::{
    ConnectionState, KeepAliveStatus, Session, SessionBuilder, SessionConfig, SessionEvent,
    SessionEvents, SubscribeErrorPolicy, SubscriptionState, WS_PROTOCOL_NAME,
};
pub use signer::{
    AuthType, SignedRequest, Signer, auth_protocol_token, decode_protocol_token,
    encode_protocol_token, sign_request, sign_request_at,
};
