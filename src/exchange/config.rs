//! Exchange configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config:
//!
//! ```
//! use commwire::exchange::ExchangeConfig;
//!
//! let config = ExchangeConfig::from_json(r#"{ "tags": { "symmetric": 7 } }"#).unwrap();
//! assert_eq!(config.tags.symmetric, 7);
//! assert_eq!(config.tags.negotiated, 10242);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::tags;
use crate::error::{CommError, Result};
use crate::transport::Tag;

/// Message tag for every exchange call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSet {
    pub negotiated: Tag,
    pub offsets: Tag,
    pub symmetric: Tag,
    pub size_round: Tag,
    pub known_partners: Tag,
    pub callbacks: Tag,
    pub resolver: Tag,
    pub broadcast: Tag,
    pub broadcast_setup: Tag,
}

impl Default for TagSet {
    fn default() -> Self {
        Self {
            negotiated: tags::NEGOTIATED,
            offsets: tags::OFFSETS,
            symmetric: tags::SYMMETRIC,
            size_round: tags::SIZE_ROUND,
            known_partners: tags::KNOWN_PARTNERS,
            callbacks: tags::CALLBACKS,
            resolver: tags::RESOLVER,
            broadcast: tags::BROADCAST,
            broadcast_setup: tags::BROADCAST_SETUP,
        }
    }
}

impl TagSet {
    fn named(&self) -> [(&'static str, Tag); 9] {
        [
            ("negotiated", self.negotiated),
            ("offsets", self.offsets),
            ("symmetric", self.symmetric),
            ("size_round", self.size_round),
            ("known_partners", self.known_partners),
            ("callbacks", self.callbacks),
            ("resolver", self.resolver),
            ("broadcast", self.broadcast),
            ("broadcast_setup", self.broadcast_setup),
        ]
    }

    /// Fail if two call sites share a tag.
    pub fn validate(&self) -> Result<()> {
        let named = self.named();
        for (i, (name, tag)) in named.iter().enumerate() {
            if let Some((other, _)) = named[i + 1..].iter().find(|(_, t)| t == tag) {
                return Err(CommError::InvalidConfig(format!(
                    "tags `{}` and `{}` are both {}",
                    name, other, tag
                )));
            }
        }
        Ok(())
    }
}

/// Settings shared by every exchange of an [`Exchanger`](super::Exchanger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Tags per call site.
    pub tags: TagSet,
    /// Check every received length against the plan and fail with
    /// [`CommError::PlanMismatch`] on disagreement.
    ///
    /// Default: on in debug builds, off in release builds.
    pub verify_sizes: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            tags: TagSet::default(),
            verify_sizes: cfg!(debug_assertions),
        }
    }
}

impl ExchangeConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check the config for internal consistency.
    pub fn validate(&self) -> Result<()> {
        self.tags.validate()
    }
}
