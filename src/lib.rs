//! SOAP response cache keys for Zentinel
//!
//! Decides per request whether a SOAP-over-HTTP response may be cached and,
//! if so, derives the key it is cached under:
//! `SOAPAction=<operation>:SOAPEnvelope=<base64 sha256 of body>`.
//!
//! # Features
//!
//! - Operation extraction from the `SOAPAction` header or the Content-Type `action=` parameter
//! - Allow/deny rules with exact and wildcard entries, hot-reloaded from a properties file
//! - Buffering of chunked bodies so the handler can still read them
//! - SHA-256 envelope digest
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zentinel_soap_cache_key::{CacheKeyConfig, CacheKeyGenerator, RuleStore};
//!
//! let config = CacheKeyConfig::default();
//! let store = Arc::new(RuleStore::new(config.rules.clone()));
//! store.start();
//! let generator = CacheKeyGenerator::from_settings(store.clone(), &config.settings)?;
//!
//! if let Some(key) = generator.derive_key(&mut request).await? {
//!     cache.lookup_or_store(key.as_str(), ..);
//! }
//! ```

pub mod config;
pub mod digest;
pub mod error;
pub mod generator;
pub mod matcher;
pub mod parser;
pub mod request;
pub mod rules;
pub mod store;

pub use config::CacheKeyConfig;
pub use digest::{EnvelopeDigest, Sha256Base64};
pub use error::{CacheKeyError, RuleError};
pub use generator::{CacheKey, CacheKeyGenerator};
pub use matcher::ActionMatcher;
pub use request::{BodySource, ReadMode, SoapRequest};
pub use store::RuleStore;
