use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::config::PrivacyConfig;
use crate::domain::DomainError;
use crate::ports::HttpClient;

/// HTTP client that enforces the privacy settings on every request.
///
/// In local-only mode every request is refused before it leaves the process.
/// Otherwise only hosts in the allow-list (or their subdomains) are reachable.
pub struct GuardedHttpClient {
    client: Client,
    local_only: AtomicBool,
    allowed_domains: RwLock<Vec<String>>,
}

impl GuardedHttpClient {
    pub fn new(privacy: &PrivacyConfig) -> Result<Self, DomainError> {
        let client = Client::builder()
            .use_rustls_tls()
            .user_agent(format!("speech-orchestrator/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::HttpRequest(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            local_only = privacy.local_only,
            allowed_domains = ?privacy.allowed_domains,
            "HTTP client initialized"
        );

        Ok(Self {
            client,
            local_only: AtomicBool::new(privacy.local_only),
            allowed_domains: RwLock::new(privacy.allowed_domains.clone()),
        })
    }

    pub fn set_local_only(&self, local_only: bool) {
        let previous = self.local_only.swap(local_only, Ordering::SeqCst);
        if previous != local_only {
            info!(local_only = local_only, "Local-only mode changed");
        }
    }

    pub fn set_allowed_domains(&self, domains: Vec<String>) {
        let mut guard = self.allowed_domains.write();
        *guard = domains;
        info!(allowed_domains = ?*guard, "Allowed domains updated");
    }

    fn check_url(&self, url: &str) -> Result<(), DomainError> {
        if self.local_only.load(Ordering::SeqCst) {
            warn!(url = url, "Network request blocked: local-only mode enabled");
            return Err(DomainError::NetworkBlocked {
                reason: "Local-only mode is enabled. All network requests are blocked.".to_string(),
            });
        }

        let parsed = Url::parse(url).map_err(|e| DomainError::HttpRequest(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| DomainError::HttpRequest("Invalid URL: no host".to_string()))?;

        let allowed = self.allowed_domains.read();
        if !allowed.iter().any(|d| host == d || host.ends_with(&format!(".{}", d))) {
            warn!(url = url, host = host, "Network request blocked: domain not in allow-list");
            return Err(DomainError::NetworkBlocked {
                reason: format!("Domain '{}' is not in the allowed list", host),
            });
        }

        debug!(url = url, "Network request allowed");
        Ok(())
    }

    async fn send(
        &self,
        request: RequestBuilder,
        url: &str,
        timeout: Duration,
    ) -> Result<Response, DomainError> {
        let response = request.timeout(timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                DomainError::HttpTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                DomainError::HttpRequest(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::HttpRequest(format!("HTTP {} for {}", status, url)));
        }
        Ok(response)
    }
}

#[async_trait]
impl HttpClient for GuardedHttpClient {
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<T, DomainError> {
        self.check_url(url)?;
        let response = self.send(self.client.get(url), url, timeout).await?;
        response
            .json()
            .await
            .map_err(|e| DomainError::Serialization(e.to_string()))
    }

    async fn post_json_bytes<T: Serialize + Send + Sync>(
        &self,
        url: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        self.check_url(url)?;
        let response = self
            .send(self.client.post(url).json(body), url, timeout)
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DomainError::HttpRequest(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn is_network_blocked(&self) -> bool {
        self.local_only.load(Ordering::SeqCst)
    }

    fn allowed_domains(&self) -> Vec<String> {
        self.allowed_domains.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(local_only: bool, domains: &[&str]) -> GuardedHttpClient {
        GuardedHttpClient::new(&PrivacyConfig {
            local_only,
            allowed_domains: domains.iter().map(|d| d.to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn test_local_only_blocks_everything() {
        let http = client(true, &["localhost"]);
        assert!(http.is_network_blocked());
        assert!(matches!(
            http.check_url("http://localhost:3001/api/tts/health"),
            Err(DomainError::NetworkBlocked { .. })
        ));
    }

    #[test]
    fn test_allow_list_and_subdomains() {
        let http = client(false, &["localhost", "tts.example.org"]);
        assert!(http.check_url("http://localhost:3001/api/tts/synthesize").is_ok());
        assert!(http.check_url("https://eu.tts.example.org/synthesize").is_ok());
        assert!(http.check_url("https://tracker.example.com/collect").is_err());
    }

    #[test]
    fn test_switching_modes() {
        let http = client(false, &["localhost"]);
        http.set_local_only(true);
        assert!(http.check_url("http://localhost/health").is_err());
        http.set_local_only(false);
        http.set_allowed_domains(vec!["tts".to_string()]);
        assert!(http.check_url("http://localhost/health").is_err());
        assert!(http.check_url("http://tts:8080/health").is_ok());
        assert_eq!(http.allowed_domains(), vec!["tts".to_string()]);
    }

    #[tokio::test]
    async fn test_blocked_request_never_sent() {
        let http = client(true, &["localhost"]);
        let result: Result<serde_json::Value, _> = http
            .get_json("http://localhost:1/health", Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(DomainError::NetworkBlocked { .. })));
    }
}
