// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// Channel subscribed to when none is given
pub const DEFAULT_SUBSCRIBE_CHANNEL: &str = "/default/*";

/// Channel published to when none is given
pub const DEFAULT_PUBLISH_CHANNEL: &str = "/default";

const WILDCARD: &str = "*";

/// A slash-delimited channel path such as `/default/*`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let trimmed = path.strip_prefix('/').unwrap_or(&path);
        if trimmed.is_empty() {
            return Err(Error::Configuration("channel must not be empty".to_string()));
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(Error::Configuration(format!(
                    "channel '{}' contains an empty segment",
                    path
                )));
            }
            if segment.contains('*') && (i != last || *segment != WILDCARD) {
                return Err(Error::Configuration(format!(
                    "channel '{}' may only use '*' as its last segment",
                    path
                )));
            }
        }

        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.ends_with(WILDCARD)
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Channel {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for Channel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
