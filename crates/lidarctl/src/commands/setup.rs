//! `lidarctl setup`: host-side preparation menu.

use lidarctl_config::orchestrator_config;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::interactive::Mode;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let loaded = config::load(global)?;
    let orch_config = orchestrator_config(&loaded.settings, &loaded.profile, loaded.store.paths());
    super::run_session(
        Mode::Setup,
        orch_config,
        loaded.store,
        loaded.profile.profile_name,
        global,
    )
    .await
}
