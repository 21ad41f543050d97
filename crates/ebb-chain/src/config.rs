//! Ledger configuration.
//!
//! Provides [`LedgerConfig`] with defaults for the data directory and
//! logging. The configuration is customized programmatically; embedders
//! decide where chain data lives.

use std::path::PathBuf;

/// Configuration for a ledger instance.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "debug", "ebb_chain=trace").
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ebb");

        Self {
            data_dir,
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Path to the RocksDB chain data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chaindata")
    }

    /// Path to the append-only block file.
    pub fn block_file_path(&self) -> PathBuf {
        self.data_dir.join("blocks.dat")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_level_is_info() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn default_data_dir_ends_with_ebb() {
        let cfg = LedgerConfig::default();
        assert!(
            cfg.data_dir.ends_with("ebb"),
            "data_dir should end with 'ebb': {:?}",
            cfg.data_dir
        );
    }

    #[test]
    fn db_path_appends_chaindata() {
        let cfg = LedgerConfig {
            data_dir: PathBuf::from("/tmp/ebb-test"),
            ..LedgerConfig::default()
        };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/ebb-test/chaindata"));
    }

    #[test]
    fn block_file_path_appends_blocks_dat() {
        let cfg = LedgerConfig {
            data_dir: PathBuf::from("/tmp/ebb-test"),
            ..LedgerConfig::default()
        };
        assert_eq!(cfg.block_file_path(), PathBuf::from("/tmp/ebb-test/blocks.dat"));
    }

    #[test]
    fn config_is_clone_and_debug() {
        let cfg = LedgerConfig::default();
        let cfg2 = cfg.clone();
        let debug = format!("{cfg2:?}");
        assert!(debug.contains("LedgerConfig"));
    }
}
