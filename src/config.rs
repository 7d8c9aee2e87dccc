//! On-disk/TOML-serializable options for opening a [crate::db::Database].
//!
//! Mirrors the teacher's `robt::Config` pattern: a plain serde struct with a
//! `Default` impl, loadable from TOML and mutable via small builder methods.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const DEFAULT_BACKGROUND_INTERVAL_MS: i64 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Disallow `ReadWrite` transactions entirely.
    pub read_only: bool,

    /// Skip the persistence log: nothing is written to or loaded from disk.
    pub in_memory: bool,

    /// Disable the TTL background sweeper; expired items are still treated
    /// as absent on lookup, they just aren't proactively deleted.
    pub disable_expiration: bool,

    /// Tolerate malformed lines in the persistence log at load time instead
    /// of failing the whole `open` with [crate::Error::IncorrectDatabaseFileFormat].
    /// A malformed `+` line with no `v~` is simply skipped; `skip_database_file_errors`
    /// does not relax any other part of the wire grammar.
    pub skip_database_file_errors: bool,

    /// How often the background sweeper looks for expired items, in
    /// milliseconds. Negative disables the sweeper entirely; zero falls
    /// back to [DEFAULT_BACKGROUND_INTERVAL_MS].
    pub background_interval_ms: i64,

    /// Where the append-only log lives. Ignored when `in_memory` is set.
    pub data_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            read_only: false,
            in_memory: false,
            disable_expiration: false,
            skip_database_file_errors: false,
            background_interval_ms: DEFAULT_BACKGROUND_INTERVAL_MS,
            data_file: Some(PathBuf::from("xisdb.data")),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn read_only(mut self, read_only: bool) -> Config {
        self.read_only = read_only;
        self
    }

    pub fn in_memory(mut self, in_memory: bool) -> Config {
        self.in_memory = in_memory;
        self
    }

    pub fn disable_expiration(mut self, disable: bool) -> Config {
        self.disable_expiration = disable;
        self
    }

    pub fn skip_database_file_errors(mut self, skip: bool) -> Config {
        self.skip_database_file_errors = skip;
        self
    }

    /// Mirrors the source's tri-state: negative disables the sweeper, zero
    /// falls back to the default interval, anything else is used as-is.
    pub fn background_interval_ms(mut self, ms: i64) -> Config {
        self.background_interval_ms = if ms == 0 { DEFAULT_BACKGROUND_INTERVAL_MS } else { ms };
        self
    }

    /// `true` once `background_interval_ms` resolves to an active sweeper
    /// cadence (i.e. is non-negative); a negative value disables the sweeper.
    pub fn sweeper_enabled(&self) -> bool {
        self.background_interval_ms >= 0
    }

    pub fn data_file(mut self, path: impl Into<PathBuf>) -> Config {
        self.data_file = Some(path.into());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn builder_methods_chain() {
        let config = Config::default().read_only(true).in_memory(true).skip_database_file_errors(true);
        assert!(config.read_only);
        assert!(config.in_memory);
        assert!(config.skip_database_file_errors);
    }

    #[test]
    fn zero_interval_falls_back_to_default() {
        let config = Config::default().background_interval_ms(0);
        assert_eq!(config.background_interval_ms, DEFAULT_BACKGROUND_INTERVAL_MS);
    }

    #[test]
    fn negative_interval_disables_the_sweeper() {
        let config = Config::default().background_interval_ms(-1);
        assert_eq!(config.background_interval_ms, -1);
        assert!(!config.sweeper_enabled());
    }
}
