//! Token-ownership oracle.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::AttestationError;

/// Answers whether an address holds tokens of a contract.
#[async_trait]
pub trait TokenOracle: Send + Sync {
    async fn is_holder(
        &self,
        address: &str,
        contract_address: &str,
        chain_id: i64,
    ) -> Result<bool, AttestationError>;
}

#[derive(Debug, Deserialize)]
struct HoldersResponse {
    balance: u64,
}

/// Oracle reached over HTTP.
///
/// `GET {base}/holders?address=..&contract=..&chain=..` answering
/// `{"balance": <count>}`.
#[derive(Debug, Clone)]
pub struct HttpTokenOracle {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpTokenOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AttestationError> {
        let mut base = reqwest::Url::parse(base_url)
            .map_err(|e| AttestationError::Transport(format!("invalid oracle URL: {e}")))?;
        // Url::join replaces the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("holders")
            .map_err(|e| AttestationError::Transport(format!("invalid oracle URL: {e}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl TokenOracle for HttpTokenOracle {
    async fn is_holder(
        &self,
        address: &str,
        contract_address: &str,
        chain_id: i64,
    ) -> Result<bool, AttestationError> {
        let chain = chain_id.to_string();
        let response: HoldersResponse = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("address", address),
                ("contract", contract_address),
                ("chain", chain.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.balance >= 1)
    }
}
