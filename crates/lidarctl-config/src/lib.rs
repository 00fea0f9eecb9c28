//! Configuration for lidarctl.
//!
//! Two layers: global [`Settings`] (figment: defaults, then
//! `config.toml`, then `LIDARCTL_*` environment) and named
//! [`ConfigProfile`]s persisted one TOML file each by [`ConfigStore`],
//! with a single-line pointer naming the default profile.

use std::fs;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use lidarctl_core::network::{DEFAULT_PROBE_PORT, DEFAULT_PROBE_TIMEOUT};
use lidarctl_core::orchestrator::{DEFAULT_CLIENT_PROGRAM, DEFAULT_CONTAINER_NAME};
use lidarctl_core::process::DEFAULT_GRACE_PERIOD;
use lidarctl_core::{CommandSettings, DEFAULT_LIDAR_IP, Device, OrchestratorConfig, StatusModel};

/// Environment variable prefix for settings overrides.
pub const ENV_PREFIX: &str = "LIDARCTL_";

/// Name of the profile used when nothing else is configured.
pub const BUILTIN_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize profile: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse {}: {source}", path.display())]
    Deserialization {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Global, profile-independent settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// TCP port probed to decide whether the device answers.
    pub probe_port: u16,
    pub probe_timeout_ms: u64,
    /// Time a subsystem gets to exit after `SIGTERM`.
    pub grace_period_ms: u64,
    /// Interface name prefixes tagged as likely device links.
    pub ethernet_prefixes: Vec<String>,
    /// Program run inside the container for the device-side menu.
    pub client_program: String,
    /// Where subsystem output goes. Defaults to the state directory.
    pub log_dir: Option<PathBuf>,
    pub commands: CommandSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            probe_port: DEFAULT_PROBE_PORT,
            probe_timeout_ms: millis(DEFAULT_PROBE_TIMEOUT),
            grace_period_ms: millis(DEFAULT_GRACE_PERIOD),
            ethernet_prefixes: vec!["eth".into(), "en".into()],
            client_program: DEFAULT_CLIENT_PROGRAM.into(),
            log_dir: None,
            commands: CommandSettings::default(),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Settings {
    /// Load defaults, then `config.toml`, then `LIDARCTL_*` variables.
    /// Nested keys use a double underscore: `LIDARCTL_COMMANDS__SUBNET_CIDR`.
    pub fn load(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        let settings: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(paths.config_file()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.commands
            .validate_subnet()
            .map_err(|reason| ConfigError::Validation {
                field: "commands.subnet_cidr".into(),
                reason,
            })?;
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                field: "probe_timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Write these settings as `config.toml`.
    pub fn save(&self, paths: &ConfigPaths) -> Result<(), ConfigError> {
        write_atomic(paths.config_file(), &toml::to_string_pretty(self)?)
    }
}

// ── Profiles ────────────────────────────────────────────────────────

/// Device identity and container name, saved under a name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigProfile {
    pub profile_name: String,
    pub container_name: String,
    /// `"unset"` until an interface is chosen.
    pub network_interface: String,
    pub lidar_ip_address: Ipv4Addr,
}

impl ConfigProfile {
    /// The profile used when nothing is saved.
    pub fn builtin() -> Self {
        Self {
            profile_name: BUILTIN_PROFILE.into(),
            container_name: DEFAULT_CONTAINER_NAME.into(),
            network_interface: lidarctl_core::model::UNSET_INTERFACE.into(),
            lidar_ip_address: DEFAULT_LIDAR_IP,
        }
    }

    /// Capture the identity currently held by `model`.
    pub fn from_model(name: impl Into<String>, model: &StatusModel) -> Self {
        let device = model.device();
        Self {
            profile_name: name.into(),
            container_name: model.container_name().to_owned(),
            network_interface: device.interface_name().to_owned(),
            lidar_ip_address: device.ip_address,
        }
    }

    pub fn device(&self) -> Device {
        Device::new(self.lidar_ip_address, Some(self.network_interface.clone()))
    }
}

impl Default for ConfigProfile {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Profile names become file names, so they are kept to a single plain
/// path component.
pub fn validate_profile_name(name: &str) -> Result<(), ConfigError> {
    let reason = if name.trim().is_empty() {
        Some("must not be empty")
    } else if name.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if name.starts_with('.') {
        Some("must not start with a dot")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ConfigError::Validation {
            field: "profile name".into(),
            reason: reason.into(),
        }),
        None => Ok(()),
    }
}

// ── Paths ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    root: PathBuf,
    state: PathBuf,
}

impl ConfigPaths {
    /// Resolve via platform conventions, unless `root` overrides it. An
    /// override keeps the state directory under the same root.
    pub fn resolve(root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            return Self::at(root);
        }
        ProjectDirs::from("com", "lidarctl", "lidarctl").map_or_else(
            || Self::at(dirs_fallback()),
            |dirs| Self {
                root: dirs.config_dir().to_path_buf(),
                state: dirs
                    .state_dir()
                    .unwrap_or_else(|| dirs.data_local_dir())
                    .to_path_buf(),
            },
        )
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            state: root.join("state"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    pub fn profile_file(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(format!("{name}.toml"))
    }

    pub fn default_pointer(&self) -> PathBuf {
        self.root.join("default_profile")
    }

    pub fn state_dir(&self) -> &Path {
        &self.state
    }

    /// Per-subsystem output logs.
    pub fn subsystem_log_dir(&self) -> PathBuf {
        self.state.join("subsystems")
    }
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("lidarctl");
    p
}

// ── Store ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: ConfigPaths,
}

impl ConfigStore {
    pub fn new(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Read a saved profile.
    pub fn load(&self, name: &str) -> Result<ConfigProfile, ConfigError> {
        validate_profile_name(name)?;
        let path = self.paths.profile_file(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::ProfileNotFound {
                    name: name.into(),
                    available: self.list().unwrap_or_default(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text).map_err(|source| ConfigError::Deserialization { path, source })
    }

    /// Write the whole profile. The file is replaced in one rename, so a
    /// reader never sees half a profile.
    pub fn save(&self, profile: &ConfigProfile) -> Result<(), ConfigError> {
        validate_profile_name(&profile.profile_name)?;
        let path = self.paths.profile_file(&profile.profile_name);
        write_atomic(path, &toml::to_string_pretty(profile)?)?;
        info!(profile = %profile.profile_name, "profile saved");
        Ok(())
    }

    /// Saved profile names, sorted.
    pub fn list(&self) -> Result<Vec<String>, ConfigError> {
        let entries = match fs::read_dir(self.paths.profiles_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if validate_profile_name(stem).is_ok() {
                        names.push(stem.to_owned());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Name held by the default-profile pointer, if any.
    pub fn default_name(&self) -> Option<String> {
        let text = fs::read_to_string(self.paths.default_pointer()).ok()?;
        let name = text.trim();
        (!name.is_empty()).then(|| name.to_owned())
    }

    /// Point the default at an existing profile.
    pub fn set_default(&self, name: &str) -> Result<(), ConfigError> {
        if !self.paths.profile_file(name).exists() {
            validate_profile_name(name)?;
            return Err(ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.list()?,
            });
        }
        write_atomic(self.paths.default_pointer(), &format!("{name}\n"))?;
        info!(profile = name, "default profile set");
        Ok(())
    }

    /// The default profile, or the built-in one when the pointer or the
    /// profile it names is missing or unreadable. Never fails.
    pub fn load_default(&self) -> ConfigProfile {
        let Some(name) = self.default_name() else {
            debug!("no default profile pointer, using built-in profile");
            return ConfigProfile::builtin();
        };
        self.load(&name).unwrap_or_else(|e| {
            debug!(profile = %name, error = %e, "default profile unusable, using built-in profile");
            ConfigProfile::builtin()
        })
    }
}

fn write_atomic(path: impl AsRef<Path>, contents: &str) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build an `OrchestratorConfig` from settings and a profile.
pub fn orchestrator_config(
    settings: &Settings,
    profile: &ConfigProfile,
    paths: &ConfigPaths,
) -> OrchestratorConfig {
    OrchestratorConfig {
        device: profile.device(),
        container_name: profile.container_name.clone(),
        commands: settings.commands.clone(),
        grace_period: settings.grace_period(),
        probe_port: settings.probe_port,
        probe_timeout: settings.probe_timeout(),
        log_dir: Some(
            settings
                .log_dir
                .clone()
                .unwrap_or_else(|| paths.subsystem_log_dir()),
        ),
        ethernet_prefixes: settings.ethernet_prefixes.clone(),
        workspace_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        client_program: settings.client_program.clone(),
    }
}
