use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{header, Client, StatusCode};

use crate::{
    errors::StoreError,
    store::{ObjectHead, ObjectStore, RangeBody},
};

/// Object store reachable over plain HTTP(S), addressing objects as
/// `<base_url>/<bucket>/<key>` (path-style public buckets, static mirrors).
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpStore { client, base_url }
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{base}/{bucket}/{key}",
            base = self.base_url,
            key = key.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError> {
        let response = self
            .client
            .head(self.object_url(bucket, key))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(StoreError::NotFound),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(StoreError::Inaccessible(status_reason(response.status())))
            }
            status if !status.is_success() => {
                return Err(StoreError::Transport(status_reason(status)))
            }
            _ => {}
        }

        // HEAD responses have no body, so read the header rather than
        // `Response::content_length`.
        let content_length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(0);

        let supports_byte_ranges = response
            .headers()
            .get(header::ACCEPT_RANGES)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase().contains("bytes"))
            .unwrap_or(false);

        Ok(ObjectHead {
            content_length,
            supports_byte_ranges,
        })
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<RangeBody, StoreError> {
        let response = self
            .client
            .get(self.object_url(bucket, key))
            .header(header::RANGE, format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            // A full response only answers a range covering the whole object.
            StatusCode::OK if start == 0 && response.content_length() == Some(end + 1) => {}
            StatusCode::OK => {
                return Err(StoreError::Transport(
                    "Server ignored the requested byte range".to_string(),
                ))
            }
            StatusCode::NOT_FOUND => return Err(StoreError::NotFound),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(StoreError::Inaccessible(status_reason(response.status())))
            }
            status => return Err(StoreError::Transport(status_reason(status))),
        }

        if let Some(content_type) = response.headers().get(header::CONTENT_TYPE) {
            if content_type.to_str().unwrap_or("").contains("text/html") {
                return Err(StoreError::Transport(
                    "Download link expired or link doesn't point to a file".to_string(),
                ));
            }
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| StoreError::Transport(e.to_string()))
            .boxed())
    }
}

fn status_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Error fetching object from server")
        .to_string()
}
