//! Caller identity used as the permission key.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PayloadError;

/// Normalized host of the requesting caller.
///
/// Accepts a bare host (`example.com`, `localhost:8080`) or a full URL and
/// keeps only the lower-cased host plus any non-default port, so
/// `https://Example.com/pay` and `example.com` share one permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let trimmed = raw.trim();
        let invalid = |reason: &str| PayloadError::InvalidOrigin {
            origin: raw.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("origin is empty"));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        let url = Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("origin has no host"))?
            .to_ascii_lowercase();

        Ok(match url.port() {
            Some(port) => Self(format!("{host}:{port}")),
            None => Self(host),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}
