//! Config subcommand handlers.

use std::net::Ipv4Addr;

use serde::Serialize;
use tabled::Tabled;

use lidarctl_config::{ConfigProfile, ConfigStore, Settings};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Profile keys `config set` accepts.
const SETTABLE_KEYS: [&str; 3] = ["container_name", "network_interface", "lidar_ip_address"];

// ── Views ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ConfigView {
    config_dir: String,
    default_profile: Option<String>,
    profile: ConfigProfile,
    settings: Settings,
}

#[derive(Debug, Serialize)]
struct ProfileEntry {
    default: bool,
    #[serde(flatten)]
    profile: ConfigProfile,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Default")]
    default: &'static str,
    #[tabled(rename = "Interface")]
    interface: String,
    #[tabled(rename = "Device IP")]
    ip: String,
    #[tabled(rename = "Container")]
    container: String,
}

fn profile_row(e: &ProfileEntry) -> ProfileRow {
    ProfileRow {
        name: e.profile.profile_name.clone(),
        default: if e.default { "*" } else { "" },
        interface: e.profile.network_interface.clone(),
        ip: e.profile.lidar_ip_address.to_string(),
        container: e.profile.container_name.clone(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let loaded = config::load(global)?;
            let view = ConfigView {
                config_dir: loaded.store.paths().root().display().to_string(),
                default_profile: loaded.store.default_name(),
                profile: loaded.profile,
                settings: loaded.settings,
            };
            let out = output::render_single(&global.output, &view, show_detail, |v| {
                v.profile.profile_name.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let store = config::store(global);
            let default = store.default_name();
            let entries = store
                .list()?
                .into_iter()
                .map(|name| -> Result<ProfileEntry, CliError> {
                    Ok(ProfileEntry {
                        default: default.as_deref() == Some(name.as_str()),
                        profile: store.load(&name)?,
                    })
                })
                .collect::<Result<Vec<_>, CliError>>()?;
            let out = output::render_list(&global.output, &entries, profile_row, |e| {
                e.profile.profile_name.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Save {
            name,
            interface,
            container,
            lidar_ip,
        } => {
            let store = config::store(global);
            let mut profile = config::active_profile(global, &store)?;
            profile.profile_name = name;
            if let Some(interface) = interface {
                profile.network_interface = interface;
            }
            if let Some(container) = container {
                profile.container_name = container;
            }
            if let Some(ip) = lidar_ip {
                profile.lidar_ip_address = ip;
            }
            persist(&store, &profile, global.quiet)
        }

        ConfigCommand::Use { name } => {
            let store = config::store(global);
            store.set_default(&name)?;
            if !global.quiet {
                eprintln!("Default profile is now '{name}'");
            }
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let store = config::store(global);
            let mut profile = config::active_profile(global, &store)?;
            set_field(&mut profile, &key, &value)?;
            persist(&store, &profile, global.quiet)
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Save the profile; the first profile saved becomes the default.
fn persist(store: &ConfigStore, profile: &ConfigProfile, quiet: bool) -> Result<(), CliError> {
    store.save(profile)?;
    if store.default_name().is_none() {
        store.set_default(&profile.profile_name)?;
    }
    if !quiet {
        eprintln!("Saved profile '{}'", profile.profile_name);
    }
    Ok(())
}

fn set_field(profile: &mut ConfigProfile, key: &str, value: &str) -> Result<(), CliError> {
    let non_empty = || {
        let v = value.trim();
        if v.is_empty() {
            Err(CliError::Validation {
                field: key.into(),
                reason: "must not be empty".into(),
            })
        } else {
            Ok(v.to_owned())
        }
    };
    match key {
        "container_name" => profile.container_name = non_empty()?,
        "network_interface" => profile.network_interface = non_empty()?,
        "lidar_ip_address" => {
            profile.lidar_ip_address =
                value
                    .parse::<Ipv4Addr>()
                    .map_err(|e| CliError::Validation {
                        field: key.into(),
                        reason: e.to_string(),
                    })?;
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!("unknown key, expected one of: {}", SETTABLE_KEYS.join(", ")),
            });
        }
    }
    Ok(())
}

fn show_detail(view: &ConfigView) -> String {
    let s = &view.settings;
    let p = &view.profile;
    [
        format!("Config dir:       {}", view.config_dir),
        format!(
            "Default profile:  {}",
            view.default_profile.as_deref().unwrap_or("(built-in)")
        ),
        String::new(),
        format!("Profile:          {}", p.profile_name),
        format!("  container:      {}", p.container_name),
        format!("  interface:      {}", p.network_interface),
        format!("  device ip:      {}", p.lidar_ip_address),
        String::new(),
        format!("Probe:            port {}, {} ms", s.probe_port, s.probe_timeout_ms),
        format!("Grace period:     {} ms", s.grace_period_ms),
        format!("Subnet:           {}", s.commands.subnet_cidr),
        format!("Client program:   {}", s.client_program),
    ]
    .join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_field_updates_known_keys() {
        let mut profile = ConfigProfile::builtin();
        set_field(&mut profile, "lidar_ip_address", "10.1.2.3").unwrap();
        set_field(&mut profile, "network_interface", " eth1 ").unwrap();
        assert_eq!(profile.lidar_ip_address, Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(profile.network_interface, "eth1");
    }

    #[test]
    fn set_field_rejects_unknown_keys_and_bad_addresses() {
        let mut profile = ConfigProfile::builtin();
        let err = set_field(&mut profile, "grace_period_ms", "10").unwrap_err();
        assert!(err.to_string().contains("grace_period_ms"));
        assert!(set_field(&mut profile, "lidar_ip_address", "300.1.1.1").is_err());
        assert!(set_field(&mut profile, "container_name", "  ").is_err());
    }
}
