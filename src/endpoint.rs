// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static REGION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\w+\.appsync-api\.([\w-]+)\.amazonaws\.com").expect("region pattern is valid")
});

pub fn events(http_domain: &str) -> String {
    format!("https://{}/event", http_domain)
}

pub fn events_realtime(realtime_domain: &str) -> String {
    format!("wss://{}/event/realtime", realtime_domain)
}

/// Realtime domain paired with an HTTP domain. Custom domains serve both.
pub fn realtime_host(http_domain: &str) -> String {
    http_domain.replace(".appsync-api.", ".appsync-realtime-api.")
}

/// Resolve the signing region: the explicit value wins, otherwise it is
/// extracted from an `<id>.appsync-api.<region>.amazonaws.com` domain.
pub fn resolve_region(http_domain: &str, region: Option<&str>) -> Result<String> {
    if let Some(region) = region.filter(|r| !r.is_empty()) {
        return Ok(region.to_string());
    }
    REGION_PATTERN
        .captures(http_domain)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "region not provided and not derivable from domain '{}'",
                http_domain
            ))
        })
}

/// Location of an AppSync Events API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    http_domain: String,
    realtime_domain: String,
    region: Option<String>,
    realtime_url: Option<String>,
}

impl Endpoint {
    /// Endpoint for an HTTP domain; the realtime domain is derived from it.
    pub fn new(http_domain: impl Into<String>) -> Self {
        let http_domain = http_domain.into();
        Self {
            realtime_domain: realtime_host(&http_domain),
            http_domain,
            region: None,
            realtime_url: None,
        }
    }

    /// Endpoint of the default domains assigned to an API id.
    ///
    /// The domains follow the `<id>.appsync-api.<region>.amazonaws.com`
    /// naming pattern instead of the DNS names AppSync reports for the API
    /// (`GetApi` `dns`). APIs served only from a custom domain need
    /// [`Endpoint::new`] with that domain.
    pub fn from_api_id(api_id: &str, region: &str) -> Result<Self> {
        if api_id.is_empty() || region.is_empty() {
            return Err(Error::Configuration(
                "API id and region must not be empty".to_string(),
            ));
        }
        Ok(Self::new(format!("{api_id}.appsync-api.{region}.amazonaws.com")).with_region(region))
    }

    /// Build an endpoint from the CLI-style configuration surface: exactly one
    /// of `api_id` and `domain`, and a region unless it can be derived.
    pub fn from_options(
        api_id: Option<&str>,
        domain: Option<&str>,
        region: Option<&str>,
    ) -> Result<Self> {
        let endpoint = match (api_id, domain) {
            (Some(_), Some(_)) => {
                return Err(Error::Configuration(
                    "cannot specify API id and domain name at the same time".to_string(),
                ));
            }
            (None, None) => {
                return Err(Error::Configuration(
                    "either an API id or a domain name is required".to_string(),
                ));
            }
            (Some(api_id), None) => {
                let region = region.ok_or_else(|| {
                    Error::Configuration("a region is required with an API id".to_string())
                })?;
                Self::from_api_id(api_id, region)?
            }
            (None, Some(domain)) => match region {
                Some(region) => Self::new(domain).with_region(region),
                None => Self::new(domain),
            },
        };

        // Surface an unresolvable region now rather than at first signing.
        endpoint.region()?;
        Ok(endpoint)
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_realtime_domain(mut self, domain: impl Into<String>) -> Self {
        self.realtime_domain = domain.into();
        self
    }

    /// Override the WebSocket URL, for example to reach a local server.
    pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = Some(url.into());
        self
    }

    pub fn http_domain(&self) -> &str {
        &self.http_domain
    }

    pub fn realtime_domain(&self) -> &str {
        &self.realtime_domain
    }

    pub fn region(&self) -> Result<String> {
        resolve_region(&self.http_domain, self.region.as_deref())
    }

    pub fn events_url(&self) -> String {
        events(&self.http_domain)
    }

    pub fn realtime_url(&self) -> String {
        self.realtime_url
            .clone()
            .unwrap_or_else(|| events_realtime(&self.realtime_domain))
    }
}
