//! `lidarctl client`: subsystem control, normally run inside the container.

use lidarctl_config::{ConfigProfile, orchestrator_config};

use crate::cli::{ClientArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::interactive::Mode;

pub async fn handle(args: ClientArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let loaded = config::load(global)?;
    let profile = with_overrides(loaded.profile, args)?;
    let orch_config = orchestrator_config(&loaded.settings, &profile, loaded.store.paths());
    tracing::debug!(device = %orch_config.device, container = %orch_config.container_name, "client configuration");
    super::run_session(
        Mode::Client,
        orch_config,
        loaded.store,
        profile.profile_name,
        global,
    )
    .await
}

/// Command-line flags win over the stored profile.
fn with_overrides(mut profile: ConfigProfile, args: ClientArgs) -> Result<ConfigProfile, CliError> {
    let interface = args.lidar_network_interface.trim();
    if interface.is_empty() {
        return Err(CliError::Validation {
            field: "--lidar-network-interface".into(),
            reason: "must not be empty".into(),
        });
    }
    profile.network_interface = interface.to_owned();
    if let Some(container) = args.container_name {
        profile.container_name = container;
    }
    if let Some(ip) = args.lidar_ip {
        profile.lidar_ip_address = ip;
    }
    Ok(profile)
}
