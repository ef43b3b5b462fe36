//! S3 REST backend
//!
//! Path-style requests (`{endpoint}/{bucket}/{key}`) signed with SigV4, so
//! the same client works against AWS and S3-compatible servers. Requests are
//! anonymous when no credentials are configured.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, Response, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use super::sigv4::{self, Credentials, SigningRequest};
use super::{DEFAULT_TIMEOUT, ObjectStore, PutOptions};
use crate::error::{RepoError, Result};
use crate::metadata::ObjectMetadata;

const META_HEADER_PREFIX: &str = "x-amz-meta-";
const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for [`S3Store`]
#[derive(Debug, Clone)]
pub struct S3Options {
    pub region: String,

    /// Endpoint override for S3-compatible servers
    pub endpoint: Option<String>,

    pub credentials: Option<Credentials>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl S3Options {
    /// Read region, endpoint and credentials from the standard AWS variables
    pub fn from_env(timeout: Duration) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let credentials = match (var("AWS_ACCESS_KEY_ID"), var("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                access_key_id,
                secret_access_key,
                session_token: var("AWS_SESSION_TOKEN"),
            }),
            _ => None,
        };

        Self {
            region: var("AWS_REGION")
                .or_else(|| var("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: var("AWS_ENDPOINT_URL_S3").or_else(|| var("AWS_ENDPOINT_URL")),
            credentials,
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

/// Object store speaking the S3 REST API
pub struct S3Store {
    client: reqwest::Client,
    options: S3Options,
}

impl S3Store {
    pub fn new(options: S3Options) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("s3pack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepoError::RemoteUnavailable {
                location: options.endpoint(),
                message: e.to_string(),
            })?;

        Ok(Self { client, options })
    }

    /// Split `s3://bucket/key` into bucket and key
    pub fn parse_location(location: &str) -> Result<(&str, &str)> {
        let invalid = |reason: &str| RepoError::InvalidRepositoryUrl {
            url: location.to_string(),
            reason: reason.to_string(),
        };

        let rest = location
            .strip_prefix("s3://")
            .ok_or_else(|| invalid("expected an s3:// URL"))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing object key"))?;

        if bucket.is_empty() {
            return Err(invalid("missing bucket name"));
        }
        if key.is_empty() {
            return Err(invalid("missing object key"));
        }
        Ok((bucket, key))
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let raw = format!(
            "{}/{}/{}",
            self.options.endpoint(),
            bucket,
            sigv4::uri_encode(key, false)
        );
        Url::parse(&raw).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: raw,
            reason: e.to_string(),
        })
    }

    async fn send(
        &self,
        method: Method,
        location: &str,
        body: Vec<u8>,
        mut headers: BTreeMap<String, String>,
        content_type: Option<&str>,
    ) -> Result<Response> {
        let (bucket, key) = Self::parse_location(location)?;
        let url = self.object_url(bucket, key)?;

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(RepoError::InvalidRepositoryUrl {
                    url: url.to_string(),
                    reason: "endpoint has no host".to_string(),
                });
            }
        };

        let now = Utc::now();
        let payload_hash = s3pack_core::compute_digest(&body);
        headers.insert("host".to_string(), host);
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), sigv4::amz_date(now));

        if let Some(credentials) = &self.options.credentials {
            if let Some(token) = &credentials.session_token {
                headers.insert("x-amz-security-token".to_string(), token.clone());
            }
            let signing = SigningRequest {
                method: method.as_str(),
                path: url.path(),
                query: url.query().unwrap_or(""),
                headers: &headers,
                payload_hash: &payload_hash,
                region: &self.options.region,
                service: "s3",
                time: now,
            };
            let authorization = sigv4::authorization(&signing, credentials)?;
            headers.insert("authorization".to_string(), authorization);
        }

        tracing::debug!("{} {} ({} bytes)", method, url, body.len());

        let mut request = self.client.request(method, url.clone());
        for (name, value) in &headers {
            // reqwest derives Host from the URL
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        let response = request.body(body).send().await.map_err(|e| {
            let mut err = RepoError::from(e);
            if let RepoError::RemoteUnavailable { location: loc, .. } = &mut err {
                *loc = location.to_string();
            }
            err
        })?;

        check_status(location, response).await
    }
}

async fn check_status(location: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(RepoError::ObjectNotFound {
            location: location.to_string(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    let detail = extract_error_code(&body).unwrap_or_else(|| body.trim().to_string());
    Err(RepoError::RemoteUnavailable {
        location: location.to_string(),
        message: if detail.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, detail)
        },
    })
}

/// Pull `<Code>` and `<Message>` out of an S3 XML error body
fn extract_error_code(body: &str) -> Option<String> {
    let tag = |name: &str| {
        let open = format!("<{}>", name);
        let close = format!("</{}>", name);
        let start = body.find(&open)? + open.len();
        let end = body[start..].find(&close)? + start;
        Some(body[start..end].to_string())
    };

    match (tag("Code"), tag("Message")) {
        (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
        (Some(code), None) => Some(code),
        _ => None,
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let response = self
            .send(Method::GET, location, Vec::new(), BTreeMap::new(), None)
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RepoError::RemoteUnavailable {
                location: location.to_string(),
                message: e.to_string(),
            })?;
        Ok(bytes.to_vec())
    }

    async fn get_metadata(&self, location: &str) -> Result<ObjectMetadata> {
        let response = self
            .send(Method::HEAD, location, Vec::new(), BTreeMap::new(), None)
            .await?;

        let entries = response.headers().iter().filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(META_HEADER_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        });
        Ok(ObjectMetadata::from_map(entries))
    }

    async fn put(&self, location: &str, content: Vec<u8>, options: &PutOptions) -> Result<()> {
        let mut headers: BTreeMap<String, String> = options
            .metadata
            .to_map()
            .into_iter()
            .map(|(k, v)| (format!("{}{}", META_HEADER_PREFIX, k), v))
            .collect();
        if let Some(acl) = options.acl {
            headers.insert("x-amz-acl".to_string(), acl.to_string());
        }

        self.send(
            Method::PUT,
            location,
            content,
            headers,
            options.content_type.as_deref(),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, location: &str) -> Result<()> {
        match self
            .send(Method::DELETE, location, Vec::new(), BTreeMap::new(), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
