//! AWS Signature Version 4
//!
//! Signs agent runtime requests with static credentials taken from the
//! standard `AWS_*` environment variables. Only header-based signing is
//! supported; presigned URLs are never needed here.
//!
//! # Steps
//!
//! 1. Canonical request: method, URI, query, headers, signed headers, payload hash
//! 2. String to sign: algorithm, timestamp, credential scope, canonical request hash
//! 3. Signing key: HMAC chain over date, region, service and `aws4_request`
//! 4. `Authorization` header carrying the hex signature

use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::error::TransportError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const TERMINATOR: &str = "aws4_request";

// ============================================================================
// Credentials
// ============================================================================

/// Static AWS credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key identifier
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Session token for temporary credentials
    pub session_token: Option<String>,
}

impl Credentials {
    /// Create credentials without a session token
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Credentials`] if the key pair is missing.
    pub fn from_env() -> Result<Self, TransportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Credentials::from_env`] with a custom variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Credentials`] if the key pair is missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TransportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let access_key_id = non_empty("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| TransportError::Credentials("AWS_ACCESS_KEY_ID is not set".into()))?;
        let secret_access_key = non_empty("AWS_SECRET_ACCESS_KEY").ok_or_else(|| {
            TransportError::Credentials("AWS_SECRET_ACCESS_KEY is not set".into())
        })?;

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: non_empty("AWS_SESSION_TOKEN"),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// Signer
// ============================================================================

/// SigV4 signer bound to one region and service
#[derive(Clone, Debug)]
pub struct SigV4Signer {
    credentials: Credentials,
    region: String,
    service: String,
}

impl SigV4Signer {
    /// Create a signer
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    /// Region requests are scoped to
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Compute the headers to add to a request
    ///
    /// `headers` are extra headers that must be covered by the signature
    /// (`host` and `x-amz-date` are always signed). Returns the
    /// `x-amz-date`, optional `x-amz-security-token` and `authorization`
    /// headers, in that order.
    #[must_use]
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(&str, &str)],
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let mut signed: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), normalize_header_value(value)))
            .collect();
        signed.push(("host".to_string(), host_header(url)));
        signed.push(("x-amz-date".to_string(), amz_date.clone()));
        if let Some(token) = &self.credentials.session_token {
            signed.push(("x-amz-security-token".to_string(), token.clone()));
        }
        signed.sort();

        let canonical = canonical_request(method, url, &signed, payload);
        let scope = format!("{date}/{}/{}/{TERMINATOR}", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let key = self.signing_key(&date);
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));
        let signed_names = signed_header_names(&signed);

        tracing::trace!(service = %self.service, region = %self.region, signed_headers = %signed_names, "Signed request");

        let mut out = vec![("x-amz-date".to_string(), amz_date)];
        if let Some(token) = &self.credentials.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        out.push((
            "authorization".to_string(),
            format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_names}, Signature={signature}",
                self.credentials.access_key_id
            ),
        ));
        out
    }

    fn signing_key(&self, date: &str) -> Vec<u8> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, TERMINATOR.as_bytes())
    }
}

// ============================================================================
// Canonicalization
// ============================================================================

fn canonical_request(method: &str, url: &Url, headers: &[(String, String)], payload: &[u8]) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();

    format!(
        "{method}\n{}\n{}\n{canonical_headers}\n{}\n{}",
        canonical_uri(url),
        canonical_query(url),
        signed_header_names(headers),
        hex::encode(Sha256::digest(payload))
    )
}

/// Path segments are encoded a second time, as every service except S3 expects
fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn signed_header_names(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
