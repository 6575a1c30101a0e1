//! Social identity lookup used by FARCASTER rules.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::AttestationError;

/// Linked social profile of an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub fid: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Resolves an address to its linked profile, if any.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_by_address(&self, address: &str) -> Result<Option<Profile>, AttestationError>;
}

/// Resolver reached over HTTP: `GET {base}/profiles/by-address/{address}`.
///
/// A 404 means the address has no linked profile.
#[derive(Debug, Clone)]
pub struct HttpIdentityResolver {
    client: reqwest::Client,
    base: reqwest::Url,
}

impl HttpIdentityResolver {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AttestationError> {
        let base = reqwest::Url::parse(base_url)
            .map_err(|e| AttestationError::Transport(format!("invalid resolver URL: {e}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base })
    }

    fn profile_url(&self, address: &str) -> Result<reqwest::Url, AttestationError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| AttestationError::Transport("resolver URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["profiles", "by-address", address]);
        Ok(url)
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve_by_address(&self, address: &str) -> Result<Option<Profile>, AttestationError> {
        let response = self.client.get(self.profile_url(address)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let profile = response.error_for_status()?.json::<Profile>().await?;
        Ok(Some(profile))
    }
}
