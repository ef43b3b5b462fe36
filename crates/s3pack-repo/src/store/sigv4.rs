//! AWS Signature Version 4 request signing

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::{RepoError, Result};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Static AWS credentials
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Everything that goes into a signature
pub(crate) struct SigningRequest<'a> {
    pub method: &'a str,
    /// URI-encoded absolute path
    pub path: &'a str,
    /// Canonical query string (empty when there is none)
    pub query: &'a str,
    /// Lowercased header names to values; all of them are signed
    pub headers: &'a BTreeMap<String, String>,
    pub payload_hash: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

/// `x-amz-date` format
pub(crate) fn amz_date(time: DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Compute the `Authorization` header value
pub(crate) fn authorization(
    request: &SigningRequest<'_>,
    credentials: &Credentials,
) -> Result<String> {
    let date = request.time.format("%Y%m%d").to_string();
    let scope = format!(
        "{}/{}/{}/aws4_request",
        date, request.region, request.service
    );

    let signed_headers = request
        .headers
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = request
        .headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        request.query,
        canonical_headers,
        signed_headers,
        request.payload_hash
    );

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date(request.time),
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let secret = format!("AWS4{}", credentials.secret_access_key);
    let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, request.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, request.service.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
    ))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| RepoError::Other(format!("request signing failed: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode per the SigV4 rules; `/` is kept when encoding a path
pub(crate) fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'.' | b'_' | b'~')
            || (byte == b'/' && !encode_slash)
        {
            result.push(byte as char);
        } else {
            result.push_str(&format!("%{byte:02X}"));
        }
    }
    result
}
