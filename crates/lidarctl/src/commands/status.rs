//! `lidarctl status`: device identity, environment flags, subsystem
//! states and the menu that would be offered.

use serde::Serialize;
use tabled::Tabled;

use lidarctl_config::orchestrator_config;
use lidarctl_core::{Menu, MenuProjector, Orchestrator, StatusSnapshot, SubsystemSnapshot};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, paint_flag, paint_severity, paint_state};

#[derive(Debug, Serialize)]
struct StatusView {
    profile: String,
    #[serde(flatten)]
    status: StatusSnapshot,
    menu: Menu,
}

#[derive(Tabled)]
struct SubsystemRow {
    #[tabled(rename = "Subsystem")]
    name: &'static str,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "PID")]
    pid: String,
}

fn to_row(s: &SubsystemSnapshot, color: bool) -> SubsystemRow {
    SubsystemRow {
        name: s.subsystem.label(),
        state: paint_state(s.state, color),
        pid: s.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
    }
}

pub fn handle(args: &StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let loaded = config::load(global)?;
    let orch_config = orchestrator_config(&loaded.settings, &loaded.profile, loaded.store.paths());
    let mut orch = Orchestrator::new(orch_config);
    if args.probe {
        orch.refresh_environment();
    }

    let projector = MenuProjector::default();
    let menu = if args.setup {
        projector.project_setup(orch.model())
    } else {
        projector.project(orch.model())
    };
    let view = StatusView {
        profile: loaded.profile.profile_name,
        status: orch.model().snapshot(),
        menu,
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &view,
        |v| detail(v, color),
        |v| {
            v.status
                .subsystems
                .iter()
                .map(|s| format!("{} {}", s.subsystem.slug(), s.state))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(view: &StatusView, color: bool) -> String {
    let status = &view.status;
    let mut lines = vec![
        format!("Profile:      {}", view.profile),
        format!("Device IP:    {}", status.lidar_ip_address),
        format!("Interface:    {}", status.network_interface),
        format!("Container:    {}", status.container_name),
        format!(
            "Image built:  {}",
            paint_flag(status.environment.docker_image_built, color)
        ),
        format!(
            "Linked up:    {}",
            paint_flag(status.environment.linked_up, color)
        ),
        String::new(),
    ];
    let rows: Vec<SubsystemRow> = status.subsystems.iter().map(|s| to_row(s, color)).collect();
    lines.push(output::render_table(&rows));

    lines.push(String::new());
    lines.push(format!("{}:", view.menu.title));
    for notice in &view.menu.notices {
        lines.push(paint_severity(notice.severity, &notice.message, color));
    }
    for action in &view.menu.actions {
        let mut line = format!("  {}", action.label);
        for a in &action.annotations {
            line.push_str(" | ");
            line.push_str(&paint_severity(a.severity, &a.message, color));
        }
        lines.push(line);
    }
    lines.join("\n")
}
