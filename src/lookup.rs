use crate::config::MetadataConfig;
use crate::error::LookupError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Record served by `GET /api/qrcode/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: i64,
    pub data: String,
}

/// Decoded values are looked up only when they are a plain integer
pub fn parse_identifier(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

/// Thin HTTP client for the metadata endpoint
#[derive(Clone, Debug)]
pub struct MetadataClient {
    inner: Client,
    base_url: Url,
    request_timeout: Option<Duration>,
}

impl MetadataClient {
    pub fn new(base_url: &str, request_timeout: Option<Duration>) -> Result<Self, LookupError> {
        let mut base_url = Url::parse(base_url).map_err(|e| LookupError::InvalidUrl {
            details: format!("{}: {}", base_url, e),
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let inner = Client::builder().build().map_err(LookupError::from)?;

        Ok(Self {
            inner,
            base_url,
            request_timeout,
        })
    }

    pub fn from_config(config: &MetadataConfig) -> Result<Self, LookupError> {
        Self::new(&config.base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn record_url(&self, id: i64) -> Result<Url, LookupError> {
        self.base_url
            .join(&format!("api/qrcode/{}", id))
            .map_err(|e| LookupError::InvalidUrl {
                details: e.to_string(),
            })
    }

    /// Fetch one record. Any non-2xx status is an error; no retries.
    pub async fn get_record(&self, id: i64) -> Result<MetadataRecord, LookupError> {
        let url = self.record_url(id)?;
        debug!("Requesting metadata from {}", url);

        let mut request = self.inner.get(url);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(LookupError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(LookupError::from)?;
        serde_json::from_slice(&body).map_err(|e| LookupError::InvalidBody {
            details: e.to_string(),
        })
    }
}

/// Callback bridge over [`MetadataClient`]
#[derive(Clone, Debug)]
pub struct MetadataLookup {
    client: MetadataClient,
}

impl MetadataLookup {
    pub fn new(client: MetadataClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &MetadataClient {
        &self.client
    }

    /// Issue one request in the background and invoke exactly one of the callbacks.
    pub fn fetch<S, E>(&self, id: i64, on_success: S, on_error: E) -> JoinHandle<()>
    where
        S: FnOnce(MetadataRecord) + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.get_record(id).await {
                Ok(record) => {
                    info!("Metadata for {} received", id);
                    on_success(record);
                }
                Err(e) => {
                    warn!("Metadata lookup for {} failed: {}", id, e);
                    on_error(e.to_string());
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifier() {
        assert_eq!(parse_identifier("42"), Some(42));
        assert_eq!(parse_identifier(" 7 \n"), Some(7));
        assert_eq!(parse_identifier("https://example.com/42"), None);
        assert_eq!(parse_identifier(""), None);
    }

    #[test]
    fn test_record_url_adds_trailing_slash() {
        let client = MetadataClient::new("http://localhost:8080/v1", None).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8080/v1/");
        assert_eq!(
            client.record_url(42).unwrap().as_str(),
            "http://localhost:8080/v1/api/qrcode/42"
        );

        let root = MetadataClient::new("https://your-api-server.com/", None).unwrap();
        assert_eq!(
            root.record_url(7).unwrap().as_str(),
            "https://your-api-server.com/api/qrcode/7"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            MetadataClient::new("not a url", None),
            Err(LookupError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_record_deserialization() {
        let record: MetadataRecord = serde_json::from_str(r#"{"id":42,"data":"abc"}"#).unwrap();
        assert_eq!(
            record,
            MetadataRecord {
                id: 42,
                data: "abc".to_string()
            }
        );
    }
}
