//! Resolve settings, store and active profile from global flags.

use lidarctl_config::{ConfigPaths, ConfigProfile, ConfigStore, Settings};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a command needs from disk.
pub struct Loaded {
    pub settings: Settings,
    pub store: ConfigStore,
    pub profile: ConfigProfile,
}

pub fn paths(global: &GlobalOpts) -> ConfigPaths {
    ConfigPaths::resolve(global.config_dir.clone())
}

pub fn store(global: &GlobalOpts) -> ConfigStore {
    ConfigStore::new(paths(global))
}

/// The profile named by `--profile`, which must exist, or else the
/// default profile.
pub fn active_profile(global: &GlobalOpts, store: &ConfigStore) -> Result<ConfigProfile, CliError> {
    match &global.profile {
        Some(name) => Ok(store.load(name)?),
        None => Ok(store.load_default()),
    }
}

pub fn load(global: &GlobalOpts) -> Result<Loaded, CliError> {
    let paths = paths(global);
    let settings = Settings::load(&paths)?;
    let store = ConfigStore::new(paths);
    let profile = active_profile(global, &store)?;
    tracing::debug!(profile = %profile.profile_name, root = %store.paths().root().display(), "configuration loaded");
    Ok(Loaded {
        settings,
        store,
        profile,
    })
}
