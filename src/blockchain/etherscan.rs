//! Etherscan API client
//!
//! Answers "is this contract's source verified?" via `contract/getsourcecode`.
//! Every failure mode (transport, HTTP status, `status != "1"`, rate limit)
//! collapses into [`Verification::Unknown`].

use async_trait::async_trait;
use ethers::types::Address;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{Verification, VerificationSource};
use crate::ice_phishing::errors::{DetectorError, Result};

/// Etherscan API client
pub struct EtherscanClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

/// Etherscan API response
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: SourceCodeResult,
}

/// `result` is an array on success and a bare string on errors/rate limits
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceCodeResult {
    Entries(Vec<SourceCodeEntry>),
    Message(String),
}

#[derive(Debug, Deserialize)]
struct SourceCodeEntry {
    #[serde(rename = "SourceCode", default)]
    source_code: String,

    #[serde(rename = "ContractName", default)]
    contract_name: String,
}

impl EtherscanClient {
    /// Create a client for a named network
    ///
    /// # Arguments
    /// * `api_key` - Etherscan API key
    /// * `network` - network name ("mainnet", "sepolia", ...)
    pub fn new(api_key: String, network: &str) -> Self {
        let base_url = match network {
            "mainnet" | "eth" | "ethereum" => "https://api.etherscan.io",
            "sepolia" => "https://api-sepolia.etherscan.io",
            "holesky" => "https://api-holesky.etherscan.io",
            _ => "https://api.etherscan.io",
        };
        Self::with_base_url(api_key, base_url)
    }

    /// Create a client against an explicit API root (self-hosted explorers, tests)
    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the verification status of `address`
    pub async fn get_verification(&self, address: Address) -> Result<Verification> {
        let url = format!("{}/api", self.base_url);
        let address = format!("{:?}", address);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("module", "contract"),
                ("action", "getsourcecode"),
                ("address", address.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DetectorError::collaborator("verification", e.to_string()))?;

        let body: EtherscanResponse = response
            .json()
            .await
            .map_err(|e| {
                DetectorError::collaborator("verification", format!("Invalid response body: {}", e))
            })?;

        if body.status != "1" {
            let detail = match &body.result {
                SourceCodeResult::Message(message) => message.clone(),
                SourceCodeResult::Entries(_) => String::new(),
            };
            return Err(DetectorError::collaborator(
                "verification",
                format!("Etherscan API error: {} {}", body.message, detail),
            ));
        }

        match body.result {
            SourceCodeResult::Entries(entries) => match entries.first() {
                Some(entry) if !entry.source_code.trim().is_empty() => {
                    debug!(
                        address = %address,
                        contract = %entry.contract_name,
                        "Contract source verified"
                    );
                    Ok(Verification::Verified)
                }
                Some(_) => Ok(Verification::Unverified),
                None => Err(DetectorError::collaborator("verification", "Empty result set")),
            },
            SourceCodeResult::Message(message) => {
                Err(DetectorError::collaborator("verification", message))
            }
        }
    }
}

#[async_trait]
impl VerificationSource for EtherscanClient {
    async fn is_contract_verified(&self, address: Address) -> Verification {
        match self.get_verification(address).await {
            Ok(verification) => verification,
            Err(e) => {
                warn!(address = ?address, error = %e, "Verification lookup failed");
                Verification::Unknown
            }
        }
    }
}

/// Create an Etherscan client from environment variables
pub fn create_etherscan_client(network: &str) -> EtherscanClient {
    let api_key = std::env::var("ETHERSCAN_API_KEY").unwrap_or_else(|_| {
        warn!("ETHERSCAN_API_KEY not set, using the free tier");
        "YourApiKeyToken".to_string()
    });
    EtherscanClient::new(api_key, network)
}
