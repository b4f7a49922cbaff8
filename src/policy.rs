//! Network-policy collaborator — egress firewall rule lookup.
//!
//! The dry run's first check asks the Cirrus firewall API whether an egress
//! rule exists for the target LPAR's resolved IP. Credentials come from the
//! environment (`CIRRUS_USER` / `CIRRUS_PASSWORD`); endpoints and the
//! project/cluster pair come from the engine config.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use crate::config;
use crate::config::defaults::POLICY_HTTP_TIMEOUT_SECS;

/// Policy lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("missing environment variable {0}")]
    MissingCredentials(&'static str),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed policy response: {0}")]
    Malformed(String),
}

/// Egress rule check, keyed by resolved IP.
#[async_trait]
pub trait NetworkPolicy: Send + Sync {
    async fn has_egress_rule(&self, ip: IpAddr) -> Result<bool, PolicyError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct EgressRule {
    destination_ip: String,
}

#[derive(Deserialize)]
struct FlowsResponse {
    egress: Vec<EgressRule>,
}

/// Cirrus firewall API client.
pub struct CirrusClient {
    http: reqwest::Client,
    token_url: String,
    flows_url: String,
    api_key: String,
}

impl CirrusClient {
    /// Build a client from config endpoints and environment credentials.
    pub fn from_env() -> Result<Self, PolicyError> {
        let user = std::env::var("CIRRUS_USER")
            .map_err(|_| PolicyError::MissingCredentials("CIRRUS_USER"))?;
        let password = std::env::var("CIRRUS_PASSWORD")
            .map_err(|_| PolicyError::MissingCredentials("CIRRUS_PASSWORD"))?;

        let policy = &config::get().policy;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLICY_HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            token_url: policy.token_url.clone(),
            flows_url: format!(
                "{}/{}/{}",
                policy.egress_url.trim_end_matches('/'),
                policy.project_id,
                policy.cluster_id
            ),
            api_key: base64::engine::general_purpose::STANDARD
                .encode(format!("{user}:{password}")),
        })
    }
}

#[async_trait]
impl NetworkPolicy for CirrusClient {
    async fn has_egress_rule(&self, ip: IpAddr) -> Result<bool, PolicyError> {
        let token: TokenResponse = self
            .http
            .post(&self.token_url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| PolicyError::Malformed(e.to_string()))?;

        let flows: FlowsResponse = self
            .http
            .get(&self.flows_url)
            .bearer_auth(token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| PolicyError::Malformed(e.to_string()))?;

        let needle = ip.to_string();
        Ok(flows.egress.iter().any(|rule| rule.destination_ip == needle))
    }
}

/// Placeholder used when Cirrus credentials are not configured. Every lookup
/// fails, which surfaces as a firewall-check error in the dry run rather
/// than a false pass.
pub struct UnconfiguredPolicy;

#[async_trait]
impl NetworkPolicy for UnconfiguredPolicy {
    async fn has_egress_rule(&self, _ip: IpAddr) -> Result<bool, PolicyError> {
        Err(PolicyError::MissingCredentials("CIRRUS_USER"))
    }
}
