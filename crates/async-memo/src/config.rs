use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ConfigError;
use crate::store::StoreLimits;

/// Configuration of a [`Memoizer`](crate::Memoizer).
///
/// Options that are not plain data, like the weigher, the canonicalizer or a shared store, are
/// set on the [`MemoizerBuilder`](crate::MemoizerBuilder) instead. Unknown fields are rejected.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MemoizeConfig {
    /// A name for this memoizer, used in logs and metrics.
    pub name: Option<String>,

    /// Maximum number of entries kept in the store.
    pub max_entries: Option<usize>,

    /// Maximum aggregated weight of all entries, as computed by the weigher.
    pub max_weight: Option<u64>,

    /// Age after which an entry is expired and has to be recomputed.
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,

    /// Age after which an entry is served stale while it is refreshed in the background.
    ///
    /// This can be changed later on with [`Memoizer::set_refresh_age`](crate::Memoizer::set_refresh_age).
    #[serde(with = "humantime_serde")]
    pub refresh_age: Option<Duration>,

    /// Whether errors are stored like any other result.
    pub cache_errors: bool,

    /// The prefix of all keys of this memoizer.
    ///
    /// Defaults to a prefix allocated from the global [`KeyPrefixes`](crate::KeyPrefixes).
    pub key_prefix: Option<String>,
}

impl MemoizeConfig {
    /// Parses a YAML configuration.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config")?;
        // check for empty documents explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config is empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }

    /// The name used in logs and metrics.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }

    /// Whether any capacity option of the default store is set.
    pub fn has_store_limits(&self) -> bool {
        self.max_entries.is_some() || self.max_weight.is_some() || self.max_age.is_some()
    }

    /// The limits of the default store.
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_entries: self.max_entries,
            max_weight: self.max_weight,
            max_age: self.max_age,
        }
    }

    /// Validates the options that do not depend on the builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        if let (Some(refresh_age), Some(max_age)) = (self.refresh_age, self.max_age) {
            validate_refresh_age(refresh_age, Some(max_age))?;
        }
        Ok(())
    }
}

/// Checks that entries can become stale before they expire.
pub(crate) fn validate_refresh_age(
    refresh_age: Duration,
    max_age: Option<Duration>,
) -> Result<(), ConfigError> {
    match max_age {
        None => Err(ConfigError::RefreshAgeWithoutMaxAge),
        Some(max_age) if refresh_age > max_age => Err(ConfigError::RefreshAgeExceedsMaxAge {
            refresh_age,
            max_age,
        }),
        Some(_) => Ok(()),
    }
}
