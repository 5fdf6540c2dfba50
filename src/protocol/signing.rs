//! Shared-key request signing.
//!
//! The string to sign is
//!
//! ```text
//! METHOD \n Content-MD5 \n Content-Type \n x-ms-date \n /{account}{path}
//! ```
//!
//! hashed with HMAC-SHA256 under the base64-decoded account key. A fresh HMAC context is
//! built for every call, so a signer can be shared across tasks without a lock.

use crate::error::{Result, ValidationError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::hmac;
use std::fmt;

/// Signs requests for one storage account.
#[derive(Clone)]
pub struct RequestSigner {
    account: String,
    key: hmac::Key,
}

impl RequestSigner {
    /// Create a signer from an account name and its base64 secret.
    pub fn new(account: impl Into<String>, secret: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(secret.trim())
            .map_err(|e| ValidationError::InvalidAccountKey(e.to_string()))?;

        Ok(Self {
            account: account.into(),
            key: hmac::Key::new(hmac::HMAC_SHA256, &key_bytes),
        })
    }

    /// Account this signer belongs to.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Base64 signature of one request.
    ///
    /// `path` is the absolute, already-encoded URL path (e.g. `/Orders` or `/$batch`).
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        ms_date: &str,
        content_md5: &str,
        content_type: &str,
    ) -> String {
        let canonical = format!(
            "{}\n{}\n{}\n{}\n/{}{}",
            method, content_md5, content_type, ms_date, self.account, path
        );
        let tag = hmac::sign(&self.key, canonical.as_bytes());
        BASE64.encode(tag.as_ref())
    }

    /// Full `Authorization` header value.
    pub fn authorization(
        &self,
        method: &str,
        path: &str,
        ms_date: &str,
        content_md5: &str,
        content_type: &str,
    ) -> String {
        format!(
            "SharedKey {}:{}",
            self.account,
            self.sign(method, path, ms_date, content_md5, content_type)
        )
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}
