// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

//! Messages of the AppSync Events WebSocket protocol.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, ErrorDetail, Result};
use crate::signer::SignedRequest;

/// Message sent by the client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage<'a> {
    /// Starts the connection handshake
    ConnectionInit,

    /// Subscribe to a channel
    Subscribe {
        id: Uuid,
        channel: &'a str,
        authorization: &'a SignedRequest,
    },

    /// Stop a subscription
    Unsubscribe { id: Uuid },
}

impl OutboundMessage<'_> {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Message received from the server, decoded once at the socket boundary
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Connection handshake success
    ConnectionAck {
        connection_timeout: Option<Duration>,
        payload: Value,
    },

    /// Connection handshake failure
    ConnectionError { errors: Vec<ErrorDetail> },

    /// Connection keep alive
    KeepAlive,

    /// Event for a subscription, with the nested `event` string already parsed
    Data { id: Uuid, event: Value },

    /// Subscription success
    SubscribeSuccess { id: Uuid, payload: Value },

    /// Subscription rejected
    SubscribeError { id: Uuid, errors: Vec<ErrorDetail> },

    /// Any other message, kept verbatim
    Other { message_type: String, payload: Value },
}

#[derive(Deserialize)]
struct ConnectionAckBody {
    #[serde(rename = "connectionTimeoutMs")]
    connection_timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorsBody {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct IdErrorsBody {
    id: Uuid,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct IdBody {
    id: Uuid,
}

#[derive(Deserialize)]
struct DataBody {
    id: Uuid,
    event: Value,
}

fn body<T: DeserializeOwned>(payload: &Value) -> Result<T> {
    T::deserialize(payload).map_err(Error::from)
}

impl Frame {
    /// Decode a text frame. Invalid JSON, a missing `type` or an undecodable
    /// `event` string are reported as errors rather than dropped.
    pub fn decode(text: &str) -> Result<Self> {
        let payload: Value = serde_json::from_str(text)?;
        let message_type = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedFrame("missing 'type' field".to_string()))?
            .to_string();

        let frame = match message_type.as_str() {
            "ka" => Frame::KeepAlive,
            "connection_ack" => {
                let ack: ConnectionAckBody = body(&payload)?;
                Frame::ConnectionAck {
                    connection_timeout: ack.connection_timeout_ms.map(Duration::from_millis),
                    payload,
                }
            }
            "connection_error" => {
                let ErrorsBody { errors } = body(&payload)?;
                Frame::ConnectionError { errors }
            }
            "data" => {
                let DataBody { id, event } = body(&payload)?;
                // The service encodes each event as a JSON string
                let event = match event {
                    Value::String(encoded) => serde_json::from_str(&encoded).map_err(|e| {
                        Error::MalformedFrame(format!("event is not valid JSON: {}", e))
                    })?,
                    other => other,
                };
                Frame::Data { id, event }
            }
            "subscribe_success" => {
                let IdBody { id } = body(&payload)?;
                Frame::SubscribeSuccess { id, payload }
            }
            "subscribe_error" => {
                let IdErrorsBody { id, errors } = body(&payload)?;
                Frame::SubscribeError { id, errors }
            }
            _ => Frame::Other {
                message_type,
                payload,
            },
        };

        Ok(frame)
    }

    /// Wire `type` of the frame
    pub fn message_type(&self) -> &str {
        match self {
            Frame::ConnectionAck { .. } => "connection_ack",
            Frame::ConnectionError { .. } => "connection_error",
            Frame::KeepAlive => "ka",
            Frame::Data { .. } => "data",
            Frame::SubscribeSuccess { .. } => "subscribe_success",
            Frame::SubscribeError { .. } => "subscribe_error",
            Frame::Other { message_type, .. } => message_type,
        }
    }
}
