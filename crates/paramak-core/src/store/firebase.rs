//! Firebase Realtime Database backend over the REST API.
//!
//! Conditional creates use the RTDB ETag protocol: a `GET` with
//! `X-Firebase-ETag: true` returns the ETag of the current value (the
//! ETag of `null` when absent), and a `PUT` with `if-match` only applies
//! if that ETag still matches, otherwise it answers `412` with the
//! current value. `replace_if_equal` uses the same protocol against the
//! ETag of the expected value.

use async_trait::async_trait;
use reqwest::{header::HeaderValue, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CreateOutcome, WalletStore};
use crate::error::StoreError;

const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";
const MAX_CONDITIONAL_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct FirebaseStoreConfig {
    /// e.g. `https://my-project-default-rtdb.asia-southeast1.firebasedatabase.app`
    pub database_url: String,
    /// Database secret or ID token appended as `?auth=`
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FirebaseStore {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl FirebaseStore {
    pub fn new(config: FirebaseStoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.database_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token,
        })
    }

    fn url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        let mut url = format!("{}/{}.json", self.base_url, encoded.join("/"));
        if let Some(token) = &self.auth_token {
            url.push_str("?auth=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    /// Read the value and its ETag
    async fn get_with_etag(&self, path: &str) -> Result<(Option<Value>, String), StoreError> {
        let response = self
            .http
            .get(self.url(path))
            .header(ETAG_REQUEST_HEADER, "true")
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, path).await?;

        let etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Malformed {
                path: path.to_string(),
                message: "response carried no ETag".to_string(),
            })?;
        let value = read_value(response, path).await?;
        Ok((value, etag))
    }
}

#[async_trait]
impl WalletStore for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, path).await?;
        read_value(response, path).await
    }

    async fn create_if_absent(&self, path: &str, value: Value) -> Result<CreateOutcome, StoreError> {
        for attempt in 1..=MAX_CONDITIONAL_ATTEMPTS {
            let (current, etag) = self.get_with_etag(path).await?;
            if let Some(existing) = current {
                return Ok(CreateOutcome::Existing(existing));
            }

            let if_match = HeaderValue::from_str(&etag).map_err(|e| StoreError::Malformed {
                path: path.to_string(),
                message: format!("unusable ETag: {}", e),
            })?;
            let response = self
                .http
                .put(self.url(path))
                .header("if-match", if_match)
                .json(&value)
                .send()
                .await
                .map_err(transport_error)?;

            if response.status() == StatusCode::PRECONDITION_FAILED {
                // Someone wrote between our read and write; the body is their value
                let current = read_value(response, path).await?;
                if let Some(existing) = current {
                    return Ok(CreateOutcome::Existing(existing));
                }
                debug!(path, attempt, "conditional create raced with a delete, retrying");
                continue;
            }

            check_status(response, path).await?;
            return Ok(CreateOutcome::Created);
        }

        warn!(path, "conditional create gave up after {} attempts", MAX_CONDITIONAL_ATTEMPTS);
        Err(StoreError::Contention(path.to_string()))
    }

    async fn replace_if_equal(
        &self,
        path: &str,
        expected: &Value,
        value: Value,
    ) -> Result<bool, StoreError> {
        let (current, etag) = self.get_with_etag(path).await?;
        if current.as_ref() != Some(expected) {
            return Ok(false);
        }

        let if_match = HeaderValue::from_str(&etag).map_err(|e| StoreError::Malformed {
            path: path.to_string(),
            message: format!("unusable ETag: {}", e),
        })?;
        let response = self
            .http
            .put(self.url(path))
            .header("if-match", if_match)
            .json(&value)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            debug!(path, "conditional replace lost to a concurrent write");
            return Ok(false);
        }
        check_status(response, path).await?;
        Ok(true)
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let response = self
            .http
            .put(self.url(path))
            .json(&value)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, path).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let response = self
            .http
            .delete(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, path).await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

async fn check_status(response: Response, path: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(StoreError::Unavailable(format!("{} on {}: {}", status, path, message)))
    } else {
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

async fn read_value(response: Response, path: &str) -> Result<Option<Value>, StoreError> {
    let value: Value = response.json().await.map_err(|e| StoreError::Malformed {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    Ok(match value {
        Value::Null => None,
        other => Some(other),
    })
}
