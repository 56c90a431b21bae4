// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

//! Credential acquisition, kept behind [`CredentialProvider`] so signing never
//! depends on how credentials are obtained.

use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::Credentials;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};

use crate::error::{Error, Result};

/// Source of the credentials used for SigV4 signing
#[derive(Clone, Debug)]
pub enum CredentialProvider {
    /// Credentials supplied by the caller
    Static(Credentials),
    /// Credentials resolved on demand (environment, profile, instance role, STS, ...)
    Chain(SharedCredentialsProvider),
}

impl CredentialProvider {
    /// Static credentials from an access key pair and optional session token.
    pub fn from_keys(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self::Static(Credentials::new(
            access_key_id,
            secret_access_key,
            session_token,
            None,
            "appsync-events-static",
        ))
    }

    /// Use the credentials provider of an already loaded SDK configuration.
    pub fn from_sdk_config(config: &SdkConfig) -> Result<Self> {
        config
            .credentials_provider()
            .map(Self::Chain)
            .ok_or(Error::Signing(
                "credentials are required to sign AppSync Events requests".to_string(),
            ))
    }

    /// Load the default AWS provider chain.
    pub async fn from_env() -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::from_sdk_config(&config)
    }

    /// Resolve the credentials to sign with.
    pub async fn resolve(&self) -> Result<Credentials> {
        match self {
            Self::Static(credentials) => Ok(credentials.clone()),
            Self::Chain(provider) => provider
                .provide_credentials()
                .await
                .map_err(|e| Error::Signing(e.to_string())),
        }
    }
}

impl From<Credentials> for CredentialProvider {
    fn from(credentials: Credentials) -> Self {
        Self::Static(credentials)
    }
}
