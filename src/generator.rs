//! Cache key generator.
//!
//! Coordinates operation extraction, the eligibility check, body
//! normalization and hashing for each inbound request.

use crate::config::SettingsConfig;
use crate::digest::{EnvelopeDigest, Sha256Base64};
use crate::error::CacheKeyError;
use crate::matcher::ActionMatcher;
use crate::parser::{extract_operation_id, parse_soap_action};
use crate::request::{ReadMode, SoapRequest};
use http::header::HeaderName;
use http::Method;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Composite key identifying a cacheable SOAP response:
/// `SOAPAction=<operation>:SOAPEnvelope=<digest>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    operation_len: usize,
}

impl CacheKey {
    const ACTION_PREFIX: &'static str = "SOAPAction=";
    const ENVELOPE_PREFIX: &'static str = ":SOAPEnvelope=";

    /// Compose a key from the raw operation identifier and body digest.
    pub fn new(operation: &str, digest: &str) -> Self {
        Self {
            key: format!(
                "{}{}{}{}",
                Self::ACTION_PREFIX,
                operation,
                Self::ENVELOPE_PREFIX,
                digest
            ),
            operation_len: operation.len(),
        }
    }

    /// The operation identifier as it appears in the key.
    pub fn operation(&self) -> &str {
        let start = Self::ACTION_PREFIX.len();
        &self.key[start..start + self.operation_len]
    }

    /// The base64 body digest.
    pub fn digest(&self) -> &str {
        let start = Self::ACTION_PREFIX.len() + self.operation_len + Self::ENVELOPE_PREFIX.len();
        &self.key[start..]
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn into_string(self) -> String {
        self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.key
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub requests_seen: u64,
    pub keys_generated: u64,
    pub requests_declined: u64,
}

/// Derives cache keys for SOAP requests.
pub struct CacheKeyGenerator {
    matcher: Arc<dyn ActionMatcher>,
    action_header: HeaderName,
    digest: Arc<dyn EnvelopeDigest>,
    requests_seen: AtomicU64,
    keys_generated: AtomicU64,
    requests_declined: AtomicU64,
}

impl CacheKeyGenerator {
    /// Generator reading the operation from the `SOAPAction` header.
    pub fn new(matcher: Arc<dyn ActionMatcher>) -> Self {
        Self::with_action_header(matcher, HeaderName::from_static("soapaction"))
    }

    /// Generator configured from settings.
    pub fn from_settings(
        matcher: Arc<dyn ActionMatcher>,
        settings: &SettingsConfig,
    ) -> Result<Self, CacheKeyError> {
        let header = HeaderName::from_bytes(settings.action_header.as_bytes()).map_err(|e| {
            CacheKeyError::Config(format!(
                "invalid action header '{}': {}",
                settings.action_header, e
            ))
        })?;
        Ok(Self::with_action_header(matcher, header))
    }

    pub fn with_action_header(matcher: Arc<dyn ActionMatcher>, action_header: HeaderName) -> Self {
        Self {
            matcher,
            action_header,
            digest: Arc::new(Sha256Base64),
            requests_seen: AtomicU64::new(0),
            keys_generated: AtomicU64::new(0),
            requests_declined: AtomicU64::new(0),
        }
    }

    /// Replace the SHA-256 envelope digest.
    pub fn with_digest(mut self, digest: Arc<dyn EnvelopeDigest>) -> Self {
        self.digest = digest;
        self
    }

    /// Derive the cache key for `request`.
    ///
    /// `Ok(None)` means the response must be neither looked up nor stored.
    /// A body read failure is returned as [`CacheKeyError::BodyRead`]. On
    /// success the request body is buffered and still readable by the handler.
    pub async fn derive_key(
        &self,
        request: &mut SoapRequest,
    ) -> Result<Option<CacheKey>, CacheKeyError> {
        self.requests_seen.fetch_add(1, Ordering::Relaxed);

        let Some(operation) = self.eligible_operation(request) else {
            self.requests_declined.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        request
            .normalize_body()
            .await
            .map_err(CacheKeyError::BodyRead)?;
        let body = request
            .read_body(ReadMode::KeyGeneration)
            .await
            .map_err(CacheKeyError::BodyRead)?;

        let digest = self.digest.digest(&body);
        trace!(digest = %digest, "Created hash of SOAP envelope");

        let key = CacheKey::new(&operation, &digest);
        self.keys_generated.fetch_add(1, Ordering::Relaxed);
        debug!(
            operation = %operation,
            body_length = body.len(),
            key = %key,
            "Cache key derived"
        );
        Ok(Some(key))
    }

    /// The raw operation identifier, if the request may be cached.
    fn eligible_operation(&self, request: &SoapRequest) -> Option<String> {
        if request.method() != Method::POST {
            trace!(method = %request.method(), "Method is not cacheable");
            return None;
        }

        let Some(operation) = extract_operation_id(request.headers(), &self.action_header) else {
            debug!(
                content_type = ?request.content_type(),
                "No operation identifier, not caching"
            );
            return None;
        };

        if !self.matcher.is_eligible(&parse_soap_action(&operation)) {
            debug!(operation = %operation, "Operation not eligible for caching");
            return None;
        }

        Some(operation)
    }

    pub fn action_header(&self) -> &HeaderName {
        &self.action_header
    }

    pub fn stats(&self) -> GeneratorStats {
        GeneratorStats {
            requests_seen: self.requests_seen.load(Ordering::Relaxed),
            keys_generated: self.keys_generated.load(Ordering::Relaxed),
            requests_declined: self.requests_declined.load(Ordering::Relaxed),
        }
    }
}
