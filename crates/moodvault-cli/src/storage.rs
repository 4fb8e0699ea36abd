use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use moodvault_storage::{csv_store::EncryptedCsvStore, key_provider::FileKeyProvider};
use tracing::debug;

const CORPUS_FILE: &str = "results.csv";
const KEY_FILE: &str = "secret.key";

/// Resolve the default data directory for Moodvault.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("moodvault"))
}

/// Where the corpus and the key live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub corpus: PathBuf,
    pub key: PathBuf,
}

/// Apply config overrides: explicit file paths win over `data_dir`, which
/// wins over the platform data directory.
pub fn paths_from_config(config: &Config) -> Result<StorePaths> {
    let root = match &config.data_dir {
        Some(dir) => dir.clone(),
        None if config.corpus_file.is_some() && config.key_file.is_some() => PathBuf::new(),
        None => default_data_dir()?,
    };
    Ok(StorePaths {
        corpus: config
            .corpus_file
            .clone()
            .unwrap_or_else(|| root.join(CORPUS_FILE)),
        key: config.key_file.clone().unwrap_or_else(|| root.join(KEY_FILE)),
    })
}

pub fn key_provider_from_config(config: &Config) -> Result<FileKeyProvider> {
    Ok(FileKeyProvider::new(paths_from_config(config)?.key))
}

/// Build the encrypted store, creating the key file on first run.
pub async fn store_from_config(config: &Config) -> Result<EncryptedCsvStore> {
    let paths = paths_from_config(config)?;
    debug!(corpus = ?paths.corpus, key = ?paths.key, "initializing encrypted store");
    let keys = FileKeyProvider::new(paths.key);
    EncryptedCsvStore::open(paths.corpus, &keys)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))
}

/// Helper for tests to construct a store rooted at a temp dir with a key file beside it.
#[cfg(test)]
pub async fn test_store(root: &std::path::Path) -> EncryptedCsvStore {
    let config = Config {
        data_dir: Some(root.to_path_buf()),
        ..Config::default()
    };
    store_from_config(&config).await.expect("test store")
}
