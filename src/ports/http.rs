use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::DomainError;

/// HTTP client port for all network requests.
/// All network traffic must go through this interface.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET request and deserialize the response as JSON.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<T, DomainError>;

    /// Perform a POST request with a JSON body and return the raw response bytes.
    async fn post_json_bytes<T: Serialize + Send + Sync>(
        &self,
        url: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError>;

    /// Check if network requests are currently blocked.
    fn is_network_blocked(&self) -> bool;

    /// Get the list of allowed domains (when not in local-only mode).
    fn allowed_domains(&self) -> Vec<String>;
}
