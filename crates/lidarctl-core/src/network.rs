// ── Network link management ──
//
// Interface discovery, host address assignment on the device link, and
// the reachability probe. The OS side sits behind `LinkControl` so the
// idempotence of address assignment can be checked without root.

use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::commands::CommandTemplates;
use crate::error::CoreError;
use crate::process::ProcessSupervisor;

/// Interface name prefixes that usually mean a wired ethernet port.
pub const DEFAULT_ETHERNET_PREFIXES: [&str; 2] = ["eth", "en"];

/// Default TCP port probed to decide whether the device answers.
pub const DEFAULT_PROBE_PORT: u16 = 22;

/// Default bound on a reachability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A network interface as offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    /// Heuristic hint that the device is cabled here. Never authoritative.
    pub likely_device: bool,
}

/// Whether `ensure_address_assigned` had to change anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressChange {
    AlreadyPresent,
    Assigned,
}

// ── OS seam ─────────────────────────────────────────────────────────

/// Host-side link operations.
pub trait LinkControl {
    /// Names of every interface on the host, in OS order.
    fn interfaces(&self) -> Result<Vec<String>, CoreError>;

    /// `address/prefix` entries currently on `interface`.
    fn addresses(&self, interface: &str) -> Result<Vec<String>, CoreError>;

    fn add_address(&mut self, interface: &str, cidr: &str) -> Result<(), CoreError>;

    /// Bring `interface` administratively up.
    fn set_up(&mut self, interface: &str) -> Result<(), CoreError>;
}

/// `LinkControl` backed by the `ip` tool.
#[derive(Debug, Clone, Default)]
pub struct IpCommand {
    supervisor: ProcessSupervisor,
    templates: CommandTemplates,
}

impl IpCommand {
    pub fn new(supervisor: ProcessSupervisor, templates: CommandTemplates) -> Self {
        Self {
            supervisor,
            templates,
        }
    }
}

impl LinkControl for IpCommand {
    fn interfaces(&self) -> Result<Vec<String>, CoreError> {
        let out = self.supervisor.run_once(&self.templates.ip_addr_show(None))?;
        Ok(parse_interface_names(&out.stdout))
    }

    fn addresses(&self, interface: &str) -> Result<Vec<String>, CoreError> {
        let out = self
            .supervisor
            .run_once(&self.templates.ip_addr_show(Some(interface)))?;
        Ok(parse_inet_addresses(&out.stdout))
    }

    fn add_address(&mut self, interface: &str, cidr: &str) -> Result<(), CoreError> {
        self.supervisor
            .run_once(&self.templates.ip_addr_add(interface, cidr))?;
        Ok(())
    }

    fn set_up(&mut self, interface: &str) -> Result<(), CoreError> {
        self.supervisor
            .run_once(&self.templates.ip_link_up(interface))?;
        Ok(())
    }
}

// ── Manager ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NetworkLinkManager<L = IpCommand> {
    control: L,
    ethernet_prefixes: Vec<String>,
}

impl<L: LinkControl> NetworkLinkManager<L> {
    pub fn new(control: L) -> Self {
        Self {
            control,
            ethernet_prefixes: DEFAULT_ETHERNET_PREFIXES
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
        }
    }

    #[must_use]
    pub fn with_ethernet_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.ethernet_prefixes = prefixes;
        self
    }

    pub fn control(&self) -> &L {
        &self.control
    }

    /// Every interface, with likely device links tagged.
    pub fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>, CoreError> {
        Ok(self
            .control
            .interfaces()?
            .into_iter()
            .map(|name| InterfaceInfo {
                likely_device: self.is_likely_device(&name),
                name,
            })
            .collect())
    }

    pub fn is_likely_device(&self, name: &str) -> bool {
        self.ethernet_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Make sure `cidr` is on `interface`, then bring the interface up.
    /// The interface is brought up even when no assignment was needed.
    pub fn ensure_address_assigned(
        &mut self,
        interface: &str,
        cidr: &str,
    ) -> Result<AddressChange, CoreError> {
        let present = self
            .control
            .addresses(interface)?
            .iter()
            .any(|addr| addr == cidr);

        let change = if present {
            debug!(interface, cidr, "address already assigned");
            AddressChange::AlreadyPresent
        } else {
            self.control.add_address(interface, cidr)?;
            info!(interface, cidr, "address assigned");
            AddressChange::Assigned
        };

        self.control.set_up(interface)?;
        Ok(change)
    }

    pub fn addresses(&self, interface: &str) -> Result<Vec<String>, CoreError> {
        self.control.addresses(interface)
    }

    pub fn is_reachable(&self, ip: IpAddr, port: u16, timeout: Duration) -> bool {
        is_reachable(ip, port, timeout)
    }
}

/// Bounded TCP connect. Every failure (refused, timed out, unroutable)
/// collapses to `false`.
pub fn is_reachable(ip: IpAddr, port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::new(ip, port);
    match TcpStream::connect_timeout(&addr, timeout) {
        Ok(_) => true,
        Err(e) => {
            debug!(%addr, error = %e, "device not reachable");
            false
        }
    }
}

// ── `ip addr` parsing ───────────────────────────────────────────────

/// Interface names from `ip addr` output: header lines look like
/// `2: eth0: <BROADCAST,...>` and may carry an `@parent` suffix.
pub fn parse_interface_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with(|c: char| c.is_ascii_digit()))
        .filter_map(|line| line.split(':').nth(1))
        .map(|name| name.trim())
        .map(|name| name.split_once('@').map_or(name, |(base, _)| base))
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `a.b.c.d/nn` entries from the `inet` lines of `ip addr show <if>`.
pub fn parse_inet_addresses(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            match words.next() {
                Some("inet") => words.next().map(str::to_owned),
                _ => None,
            }
        })
        .collect()
}
