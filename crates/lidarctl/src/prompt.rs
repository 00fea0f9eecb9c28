//! Terminal prompting behind a trait, so the interactive loop can be driven
//! by a script in tests.

use std::time::Duration;

use dialoguer::{Input, Select, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use lidarctl_core::{Menu, StatusSnapshot};

use crate::error::CliError;
use crate::output::{paint_flag, paint_severity, paint_state};

pub trait Prompter {
    /// Show the status header and menu; return the chosen action index,
    /// or `None` when the user backs out.
    fn choose(&mut self, status: &StatusSnapshot, menu: &Menu) -> Result<Option<usize>, CliError>;

    /// Pick one of `items`; `None` means go back.
    fn pick(&mut self, title: &str, items: &[String]) -> Result<Option<usize>, CliError>;

    fn input(&mut self, prompt: &str, default: &str) -> Result<String, CliError>;

    /// Report the outcome of an action.
    fn notify(&mut self, message: &str);

    /// Mark the start of a blocking operation.
    fn begin(&mut self, message: &str);

    /// Mark its end.
    fn finish(&mut self);
}

// ── dialoguer implementation ─────────────────────────────────────────

pub struct DialoguerPrompter {
    theme: ColorfulTheme,
    color: bool,
    spinner: Option<ProgressBar>,
}

impl DialoguerPrompter {
    pub fn new(color: bool) -> Self {
        Self {
            theme: ColorfulTheme::default(),
            color,
            spinner: None,
        }
    }

    fn print_status(&self, status: &StatusSnapshot) {
        let heading = |s: &str| {
            if self.color {
                s.bold().to_string()
            } else {
                s.to_owned()
            }
        };
        eprintln!();
        eprintln!("{}", heading("Device"));
        eprintln!("  ip address   {}", status.lidar_ip_address);
        eprintln!("  interface    {}", status.network_interface);
        eprintln!("  container    {}", status.container_name);
        eprintln!(
            "  image built  {}",
            paint_flag(status.environment.docker_image_built, self.color)
        );
        eprintln!(
            "  linked up    {}",
            paint_flag(status.environment.linked_up, self.color)
        );
        eprintln!("{}", heading("Subsystems"));
        for s in &status.subsystems {
            let pid = s.pid.map(|p| format!(" (pid {p})")).unwrap_or_default();
            eprintln!(
                "  {:<12} {}{pid}",
                s.subsystem.label(),
                paint_state(s.state, self.color)
            );
        }
        eprintln!();
    }
}

impl Prompter for DialoguerPrompter {
    fn choose(&mut self, status: &StatusSnapshot, menu: &Menu) -> Result<Option<usize>, CliError> {
        self.print_status(status);
        for notice in &menu.notices {
            eprintln!("{}", paint_severity(notice.severity, &notice.message, self.color));
        }

        let items: Vec<String> = menu
            .actions
            .iter()
            .map(|action| {
                let mut line = action.label.clone();
                for a in &action.annotations {
                    line.push_str(" | ");
                    line.push_str(&paint_severity(a.severity, &a.message, self.color));
                }
                line
            })
            .collect();

        Select::with_theme(&self.theme)
            .with_prompt(menu.title)
            .items(&items)
            .default(0)
            .interact_opt()
            .map_err(CliError::from_prompt)
    }

    fn pick(&mut self, title: &str, items: &[String]) -> Result<Option<usize>, CliError> {
        Select::with_theme(&self.theme)
            .with_prompt(title)
            .items(items)
            .default(0)
            .interact_opt()
            .map_err(CliError::from_prompt)
    }

    fn input(&mut self, prompt: &str, default: &str) -> Result<String, CliError> {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default.to_owned())
            .interact_text()
            .map_err(CliError::from_prompt)
    }

    fn notify(&mut self, message: &str) {
        eprintln!("{message}");
    }

    fn begin(&mut self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_owned());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn finish(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}
