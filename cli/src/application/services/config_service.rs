//! Application service — configuration use-cases.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::ThrowboxConfig;

/// Load configuration.
///
/// # Errors
///
/// Returns an error if the store cannot be read or parsed.
pub fn load_config(store: &impl ConfigStore) -> Result<ThrowboxConfig> {
    store.load()
}

/// Save configuration.
///
/// # Errors
///
/// Returns an error if the store cannot be written.
pub fn save_config(store: &impl ConfigStore, config: &ThrowboxConfig) -> Result<()> {
    store.save(config)
}

/// Read one setting.
///
/// # Errors
///
/// Returns an error if the key is unknown or the store cannot be read.
pub fn get_value(store: &impl ConfigStore, key: &str) -> Result<String> {
    store.load()?.get(key)
}

/// Validate, apply and persist one setting. Returns the updated config.
///
/// # Errors
///
/// Returns an error if the key or value is invalid, or the store fails.
pub fn set_value(store: &impl ConfigStore, key: &str, value: &str) -> Result<ThrowboxConfig> {
    let mut config = store.load()?;
    config.set(key, value)?;
    store.save(&config)?;
    Ok(config)
}
