// ── Command-line templates ──
//
// Fixed argument templates for every external program the orchestrator
// launches. Each program is configured as an argv prefix, so a wrapper
// (`sudo`, `docker exec <c>`, a test shim) can be put in front of it.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{Device, Subsystem};

/// Subnet address the host takes on the device link.
pub const DEFAULT_SUBNET_CIDR: &str = "192.168.20.100/24";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerOptions {
    /// Restart the device even when it is already on.
    pub force_restart: bool,
    /// Do not enable the laser on start.
    pub skip_enable: bool,
    /// Do not disable the laser on stop.
    pub skip_disable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingOptions {
    pub output: String,
    pub duration_per_file: Option<u64>,
    pub frames_per_file: Option<u64>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            output: "my_first_recording.bin".into(),
            duration_per_file: None,
            frames_per_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    pub input: String,
    pub loopback: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            input: "my_first_recording.bin".into(),
            loopback: true,
        }
    }
}

/// Programs and parameters substituted into the templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    pub power_program: Vec<String>,
    pub bridge_program: Vec<String>,
    pub logger_program: Vec<String>,
    pub playback_program: Vec<String>,
    pub docker_program: Vec<String>,
    pub ip_program: Vec<String>,

    /// Local socket address the telemetry consumers bind.
    pub bind_addr: String,
    /// Multicast group the device publishes on.
    pub group_addr: String,
    /// Address assigned to the host side of the device link.
    pub subnet_cidr: String,
    /// Keep invalid points instead of filtering them out.
    pub keep_invalid_points: bool,

    pub dockerfile: String,

    pub power: PowerOptions,
    pub recording: RecordingOptions,
    pub playback: PlaybackOptions,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            power_program: vec!["voyant_lidar_client".into()],
            bridge_program: vec!["voyant_foxglove_bridge".into()],
            logger_program: vec!["voyant_logger_binary".into()],
            playback_program: vec!["voyant_playback".into()],
            docker_program: vec!["docker".into()],
            ip_program: vec!["ip".into()],
            bind_addr: "0.0.0.0:4444".into(),
            group_addr: "224.0.0.0".into(),
            subnet_cidr: DEFAULT_SUBNET_CIDR.into(),
            keep_invalid_points: false,
            dockerfile: "docker/Dockerfile".into(),
            power: PowerOptions::default(),
            recording: RecordingOptions::default(),
            playback: PlaybackOptions::default(),
        }
    }
}

impl CommandSettings {
    /// Host part of `subnet_cidr`, used as the multicast interface address.
    pub fn interface_addr(&self) -> &str {
        self.subnet_cidr
            .split_once('/')
            .map_or(self.subnet_cidr.as_str(), |(addr, _)| addr)
    }

    /// Check the subnet is a usable `a.b.c.d/nn`.
    pub fn validate_subnet(&self) -> Result<(), String> {
        let (addr, prefix) = self
            .subnet_cidr
            .split_once('/')
            .ok_or_else(|| format!("'{}' has no prefix length", self.subnet_cidr))?;
        addr.parse::<Ipv4Addr>()
            .map_err(|_| format!("'{addr}' is not an IPv4 address"))?;
        match prefix.parse::<u8>() {
            Ok(p) if p <= 32 => Ok(()),
            _ => Err(format!("'{prefix}' is not a prefix length")),
        }
    }
}

/// Builds argv vectors from [`CommandSettings`].
#[derive(Debug, Clone, Default)]
pub struct CommandTemplates {
    settings: CommandSettings,
}

impl CommandTemplates {
    pub fn new(settings: CommandSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CommandSettings {
        &self.settings
    }

    // ── Subsystems ───────────────────────────────────────────────────

    /// Device power endpoint call.
    pub fn power(&self, on: bool) -> Vec<String> {
        let mut argv = self.settings.power_program.clone();
        argv.push("--endpoint".into());
        let opts = &self.settings.power;
        if on {
            argv.push("start".into());
            if opts.force_restart {
                argv.push("--force-restart".into());
            }
            if opts.skip_enable {
                argv.push("--skip-enable".into());
            }
        } else {
            argv.push("stop".into());
            if opts.skip_disable {
                argv.push("--skip-disable".into());
            }
        }
        argv
    }

    /// Telemetry bridge.
    pub fn bridge(&self) -> Vec<String> {
        let mut argv = self.settings.bridge_program.clone();
        self.push_network_args(&mut argv);
        argv
    }

    /// Binary logger.
    pub fn logger(&self) -> Vec<String> {
        let mut argv = self.settings.logger_program.clone();
        let rec = &self.settings.recording;
        argv.extend(["--output".into(), rec.output.clone()]);
        self.push_network_args(&mut argv);
        if let Some(secs) = rec.duration_per_file {
            argv.extend(["--duration-per-file".into(), secs.to_string()]);
        }
        if let Some(frames) = rec.frames_per_file {
            argv.extend(["--frames-per-file".into(), frames.to_string()]);
        }
        argv
    }

    /// Recording playback.
    pub fn playback(&self) -> Vec<String> {
        let mut argv = self.settings.playback_program.clone();
        let pb = &self.settings.playback;
        argv.extend(["--input".into(), pb.input.clone()]);
        if pb.loopback {
            argv.push("--loopback".into());
        }
        if self.settings.keep_invalid_points {
            argv.push("--keep-invalid-points".into());
        }
        argv
    }

    /// Long-running command for a process-backed subsystem.
    pub fn for_subsystem(&self, subsystem: Subsystem) -> Option<Vec<String>> {
        match subsystem {
            Subsystem::Power => None,
            Subsystem::Streaming => Some(self.bridge()),
            Subsystem::Recording => Some(self.logger()),
            Subsystem::Playback => Some(self.playback()),
        }
    }

    fn push_network_args(&self, argv: &mut Vec<String>) {
        argv.extend([
            "--bind-addr".into(),
            self.settings.bind_addr.clone(),
            "--group-addr".into(),
            self.settings.group_addr.clone(),
            "--interface-addr".into(),
            self.settings.interface_addr().to_owned(),
        ]);
        if self.settings.keep_invalid_points {
            argv.push("--keep-invalid-points".into());
        }
    }

    // ── Link ─────────────────────────────────────────────────────────

    pub fn ip_addr_show(&self, interface: Option<&str>) -> Vec<String> {
        let mut argv = self.settings.ip_program.clone();
        argv.extend(["addr".into(), "show".into()]);
        if let Some(name) = interface {
            argv.push(name.into());
        }
        argv
    }

    pub fn ip_addr_add(&self, interface: &str, cidr: &str) -> Vec<String> {
        let mut argv = self.settings.ip_program.clone();
        argv.extend([
            "addr".into(),
            "add".into(),
            cidr.into(),
            "dev".into(),
            interface.into(),
        ]);
        argv
    }

    pub fn ip_link_up(&self, interface: &str) -> Vec<String> {
        let mut argv = self.settings.ip_program.clone();
        argv.extend([
            "link".into(),
            "set".into(),
            interface.into(),
            "up".into(),
        ]);
        argv
    }

    // ── Container ────────────────────────────────────────────────────

    pub fn docker_images(&self) -> Vec<String> {
        let mut argv = self.settings.docker_program.clone();
        argv.extend([
            "images".into(),
            "--format".into(),
            "{{.Repository}}:{{.Tag}}".into(),
        ]);
        argv
    }

    pub fn docker_build(&self, image: &str) -> Vec<String> {
        let mut argv = self.settings.docker_program.clone();
        argv.extend([
            "build".into(),
            "--no-cache".into(),
            "-t".into(),
            image.into(),
            "-f".into(),
            self.settings.dockerfile.clone(),
            ".".into(),
        ]);
        argv
    }

    /// Start the device-side client inside the container, sharing the host
    /// network so the multicast group is reachable.
    pub fn docker_run_client(
        &self,
        container: &str,
        workspace: &Path,
        client_program: &str,
        device: &Device,
    ) -> Vec<String> {
        let mut argv = self.settings.docker_program.clone();
        argv.extend([
            "run".into(),
            "--rm".into(),
            "-it".into(),
            "--name".into(),
            container.into(),
            "--network".into(),
            "host".into(),
            "-v".into(),
            format!("{}:/workspace", workspace.display()),
            container.into(),
            client_program.into(),
            "client".into(),
            "--lidar-network-interface".into(),
            device.interface_name().into(),
            "--container-name".into(),
            container.into(),
            "--lidar-ip".into(),
            device.ip_address.to_string(),
        ]);
        argv
    }

    pub fn docker_stop(&self, container: &str) -> Vec<String> {
        let mut argv = self.settings.docker_program.clone();
        argv.extend(["stop".into(), container.into()]);
        argv
    }

    pub fn docker_rm(&self, container: &str) -> Vec<String> {
        let mut argv = self.settings.docker_program.clone();
        argv.extend(["rm".into(), container.into()]);
        argv
    }
}
