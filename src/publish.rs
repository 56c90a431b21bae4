// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

//! Publishing over the signed HTTP endpoint.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::channel::Channel;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::signer::{AuthType, DEFAULT_HEADERS};

/// Maximum number of events accepted by one publish request
pub const MAX_EVENTS_PER_PUBLISH: usize = 5;

/// Event accepted by the service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishedEvent {
    pub identifier: String,
    pub index: usize,
}

/// Event rejected by the service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FailedEvent {
    #[serde(default)]
    pub identifier: Option<String>,
    pub index: usize,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Per-event outcome of a publish request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PublishResponse {
    #[serde(default)]
    pub successful: Vec<PublishedEvent>,
    #[serde(default)]
    pub failed: Vec<FailedEvent>,
}

/// Publishes events to channels with a signed `POST /event`
#[derive(Clone, Debug)]
pub struct Publisher {
    http: reqwest::Client,
    endpoint: Endpoint,
    auth_type: AuthType,
}

impl Publisher {
    pub fn new(endpoint: Endpoint, auth_type: AuthType) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint, auth_type)
    }

    pub fn with_client(http: reqwest::Client, endpoint: Endpoint, auth_type: AuthType) -> Self {
        Self {
            http,
            endpoint,
            auth_type,
        }
    }

    /// Serialize the request body: each event is itself a JSON string.
    pub fn encode_body<T: Serialize>(channel: &Channel, events: &[T]) -> Result<String> {
        if events.is_empty() || events.len() > MAX_EVENTS_PER_PUBLISH {
            return Err(Error::Configuration(format!(
                "a publish carries 1 to {} events, got {}",
                MAX_EVENTS_PER_PUBLISH,
                events.len()
            )));
        }

        let events = events
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(json!({
            "channel": channel.as_str(),
            "events": events,
        })
        .to_string())
    }

    /// Build the signed request. The signed body is the body sent.
    pub async fn build_request<T: Serialize>(
        &self,
        channel: &Channel,
        events: &[T],
    ) -> Result<reqwest::Request> {
        let body = Self::encode_body(channel, events)?;
        let authorization = self.auth_type.authorization(&body).await?;
        debug!(channel = %channel, ?authorization, "signed publish request");

        let mut builder = self.http.post(self.endpoint.events_url());
        // API key bundles carry no content headers of their own
        for (name, value) in DEFAULT_HEADERS {
            if authorization.get(name).is_none() {
                builder = builder.header(name, value);
            }
        }
        for (name, value) in authorization.iter() {
            builder = builder.header(name, value);
        }
        Ok(builder.body(body).build()?)
    }

    /// Publish up to five events to `channel`.
    pub async fn publish<T: Serialize>(
        &self,
        channel: &Channel,
        events: &[T],
    ) -> Result<PublishResponse> {
        let request = self.build_request(channel, events).await?;
        debug!(channel = %channel, events = events.len(), "publishing");

        let response = self.http.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::PublishRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
