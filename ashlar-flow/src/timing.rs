//! External static-timing-analysis invocation. The tool is a separate
//! process; this shim generates its argument list, runs it and scans the
//! report for the verdict and the worst slack.

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::Path;
use std::process::Command;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimingReport {
    pub ok: bool,
    /// Worst slack, nanoseconds, when the tool reports one.
    pub worst_slack_ns: Option<f64>,
    pub log: String,
}

pub struct TimingRunner {
    command: String,
}

impl TimingRunner {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_owned(),
        }
    }

    /// Run the external tool against a netlist, an optional constraint
    /// file and optional parasitics. A missing executable is a resource
    /// error; a completed run with violations is a normal report.
    pub fn run(
        &self,
        netlist: &Path,
        sdc: Option<&Path>,
        spef: Option<&Path>,
    ) -> Result<TimingReport> {
        let mut command = Command::new(&self.command);
        command.arg(netlist);
        if let Some(sdc) = sdc {
            command.arg("-sdc").arg(sdc);
        }
        if let Some(spef) = spef {
            command.arg("-spef").arg(spef);
        }

        info!("running timing tool: {:?}", command);
        let output = command
            .output()
            .with_context(|| format!("launching timing tool {:?}", self.command))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let report = parse_report(&stdout);
        if !output.status.success() {
            warn!("timing tool exited with {}", output.status);
        }
        if !report.ok {
            warn!("timing check reported violations");
        }
        Ok(report)
    }
}

/// Scan a report for `slack ... <value>` lines and `VIOLATED` markers.
/// The last slack line wins; a report without violations passes.
pub fn parse_report(stdout: &str) -> TimingReport {
    let mut ok = true;
    let mut worst_slack_ns = None;

    for line in stdout.lines() {
        let lower = line.to_ascii_lowercase();
        if lower.contains("violated") {
            ok = false;
        }
        if let Some(idx) = lower.find("slack") {
            // Take the last number on the line after the keyword.
            let tail = &line[idx..];
            if let Some(value) = tail
                .split_whitespace()
                .filter_map(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '-' && c != '.').parse::<f64>().ok())
                .last()
            {
                worst_slack_ns = Some(value);
                if value < 0.0 {
                    ok = false;
                }
            }
        }
    }

    TimingReport {
        ok,
        worst_slack_ns,
        log: stdout.to_owned(),
    }
}
