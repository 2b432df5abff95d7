//! Capture service control through systemd

use anyhow::{bail, Context, Result};
use phonescan_discovery::{AlwaysAvailable, CaptureService};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::CaptureServiceConfig;

/// Status checks after a start request before giving up
const START_CHECKS: u32 = 3;
const START_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Runs `systemctl` subcommands against a unit
pub trait Systemctl: Send + Sync {
    /// Run `systemctl <args>`, returning whether it exited successfully
    fn run(&self, args: &[&str]) -> Result<bool>;
}

/// The host's `systemctl`
#[derive(Debug, Default, Clone, Copy)]
pub struct HostSystemctl;

impl Systemctl for HostSystemctl {
    fn run(&self, args: &[&str]) -> Result<bool> {
        let output = Command::new("systemctl")
            .args(args)
            .output()
            .with_context(|| format!("failed to run `systemctl {}`", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                args = %args.join(" "),
                status = %output.status,
                stderr = %stderr.trim(),
                "systemctl reported failure"
            );
        }
        Ok(output.status.success())
    }
}

/// Starts a systemd unit before a scan and optionally stops it afterwards
pub struct SystemdCaptureService<S = HostSystemctl> {
    unit: String,
    stop_after_scan: bool,
    check_interval: Duration,
    systemctl: S,
}

impl SystemdCaptureService {
    pub fn new(unit: impl Into<String>, stop_after_scan: bool) -> Self {
        Self::with_systemctl(unit, stop_after_scan, HostSystemctl)
    }
}

impl<S: Systemctl> SystemdCaptureService<S> {
    pub fn with_systemctl(unit: impl Into<String>, stop_after_scan: bool, systemctl: S) -> Self {
        Self {
            unit: unit.into(),
            stop_after_scan,
            check_interval: START_CHECK_INTERVAL,
            systemctl,
        }
    }

    fn is_active(&self) -> Result<bool> {
        self.systemctl.run(&["is-active", "--quiet", &self.unit])
    }
}

impl<S: Systemctl> CaptureService for SystemdCaptureService<S> {
    fn ensure_running(&self) -> Result<()> {
        if self.is_active()? {
            debug!(unit = %self.unit, "Capture service already running");
            return Ok(());
        }

        info!(unit = %self.unit, "Starting capture service");
        if !self.systemctl.run(&["start", &self.unit])? {
            warn!(unit = %self.unit, "systemctl start failed, checking status");
        }

        for attempt in 1..=START_CHECKS {
            if self.is_active()? {
                info!(unit = %self.unit, attempt, "Capture service running");
                return Ok(());
            }
            if attempt < START_CHECKS {
                std::thread::sleep(self.check_interval);
            }
        }

        bail!(
            "capture service {} is not running after {} checks",
            self.unit,
            START_CHECKS
        )
    }

    fn release(&self) {
        if !self.stop_after_scan {
            return;
        }

        info!(unit = %self.unit, "Stopping capture service");
        match self.systemctl.run(&["stop", &self.unit]) {
            Ok(true) => {}
            Ok(false) => warn!(unit = %self.unit, "systemctl stop failed"),
            Err(e) => warn!(unit = %self.unit, error = %e, "Failed to stop capture service"),
        }
    }
}

/// Capture service for the configured unit, or none when no unit is set
pub fn from_config(config: &CaptureServiceConfig) -> Arc<dyn CaptureService> {
    match config.unit.as_deref().map(str::trim) {
        Some(unit) if !unit.is_empty() => {
            Arc::new(SystemdCaptureService::new(unit, config.stop_after_scan))
        }
        _ => Arc::new(AlwaysAvailable),
    }
}
