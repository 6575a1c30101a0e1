//! Callback verification for API rules.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{ssrf, AttestationError};

#[derive(Debug, Deserialize)]
struct CallbackResponse {
    success: bool,
}

/// Calls `GET {uri}?address=<addr>` and expects `{"success": true}`.
///
/// Unless private targets are allowed, the callback host is resolved and
/// screened first and the request is pinned to the screened address.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    client: reqwest::Client,
    timeout: Duration,
    allow_private: bool,
}

impl WebhookVerifier {
    pub fn new(timeout: Duration, allow_private: bool) -> Result<Self, AttestationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            timeout,
            allow_private,
        })
    }

    #[must_use]
    pub const fn allows_private(&self) -> bool {
        self.allow_private
    }

    /// Ask the callback whether `address` qualifies.
    ///
    /// A non-2xx status or a body without a boolean `success` is an error.
    pub async fn verify(&self, uri: &str, address: &str) -> Result<bool, AttestationError> {
        let mut url = reqwest::Url::parse(uri)
            .map_err(|e| AttestationError::Malformed(format!("invalid callback URI: {e}")))?;
        url.query_pairs_mut().append_pair("address", address);

        let client = if self.allow_private {
            self.client.clone()
        } else {
            let target = ssrf::verify_callback(&url).await?;
            debug!(host = %target.host, addr = %target.addr, "Callback target screened");
            reqwest::Client::builder()
                .resolve(&target.host, target.addr)
                .timeout(self.timeout)
                .build()?
        };

        let response: CallbackResponse = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_private_target_refused_by_default() {
        let verifier = WebhookVerifier::new(Duration::from_secs(1), false).unwrap();
        let err = verifier
            .verify("http://127.0.0.1:9/check", "0xabc")
            .await
            .unwrap_err();
        assert!(matches!(err, AttestationError::Blocked(_)));
    }

    #[tokio::test]
    async fn test_invalid_uri_is_malformed() {
        let verifier = WebhookVerifier::new(Duration::from_secs(1), true).unwrap();
        let err = verifier.verify("::not a uri", "0xabc").await.unwrap_err();
        assert!(matches!(err, AttestationError::Malformed(_)));
    }
}
