use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, SdkError},
    Client,
};
use futures::{stream, StreamExt};

use crate::{
    errors::StoreError,
    store::{ObjectHead, ObjectStore, RangeBody},
};

/// Connection settings for an S3 compatible endpoint.
///
/// Credentials are optional: when either half of the key pair is missing the
/// default AWS provider chain (environment, profile, instance metadata) is used.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub async fn connect(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                config.session_token.clone(),
                None,
                "s3resume",
            ));
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);

        if let Some(endpoint_url) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        S3Store {
            client: Client::from_conf(builder.build()),
        }
    }

    pub fn from_client(client: Client) -> Self {
        S3Store { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match http_status(&e) {
                Some(404) => StoreError::NotFound,
                Some(401) | Some(403) => {
                    StoreError::Inaccessible(DisplayErrorContext(&e).to_string())
                }
                _ => StoreError::Transport(DisplayErrorContext(&e).to_string()),
            })?;

        let content_length = head
            .content_length()
            .and_then(|length| u64::try_from(length).ok())
            .unwrap_or(0);
        let supports_byte_ranges = head
            .accept_ranges()
            .map(|ranges| ranges.to_ascii_lowercase().contains("bytes"))
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
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(|e| {
                let no_such_key = e.as_service_error().map(|s| s.is_no_such_key()).unwrap_or(false);
                match http_status(&e) {
                    _ if no_such_key => StoreError::NotFound,
                    Some(404) => StoreError::NotFound,
                    Some(401) | Some(403) => {
                        StoreError::Inaccessible(DisplayErrorContext(&e).to_string())
                    }
                    _ => StoreError::Transport(DisplayErrorContext(&e).to_string()),
                }
            })?;

        let body = stream::unfold(output.body, |mut body| async move {
            body.next().await.map(|chunk| {
                (
                    chunk.map_err(|e| StoreError::Transport(e.to_string())),
                    body,
                )
            })
        });

        Ok(body.boxed())
    }
}

fn http_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}
