//! Probe module for network monitoring.
//!
//! Supports ping (reachability), DNS (resolution time), HTTP throughput and
//! traceroute probes. Every probe absorbs its own failures into "no data"
//! results so a cycle always completes.

mod dns;
mod ping;
mod speed;
mod traceroute;

pub use dns::*;
pub use ping::*;
pub use speed::*;
pub use traceroute::*;

use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{0} not available")]
    Unavailable(String),
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("command failed: {0}")]
    Command(String),
    #[error("unexpected output: {0}")]
    Parse(String),
    #[error("network error: {0}")]
    Network(String),
}

/// A utility invocation: program name plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: &'static str,
    pub args: Vec<String>,
}

/// Builds OS-specific command lines for the external network utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    pub fn ping_command(&self, target: &str) -> CommandLine {
        let count_flag = match self {
            Platform::Unix => "-c",
            Platform::Windows => "-n",
        };
        CommandLine {
            program: "ping",
            args: vec![count_flag.to_string(), PING_COUNT.to_string(), target.to_string()],
        }
    }

    pub fn dns_command(&self, domain: &str) -> CommandLine {
        CommandLine {
            program: "nslookup",
            args: vec![domain.to_string()],
        }
    }

    /// Numeric-only output so hop addresses are never reverse-resolved.
    pub fn traceroute_command(&self, target: &str) -> CommandLine {
        match self {
            Platform::Unix => CommandLine {
                program: "traceroute",
                args: vec!["-n".to_string(), target.to_string()],
            },
            Platform::Windows => CommandLine {
                program: "tracert",
                args: vec!["-d".to_string(), target.to_string()],
            },
        }
    }
}

/// Run a command to completion, killing it if `timeout` elapses first.
pub(crate) async fn run_command(cmd: &CommandLine, timeout: Duration) -> Result<Output, ProbeError> {
    let output = Command::new(cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Err(_) => Err(ProbeError::Timeout(timeout)),
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            Err(ProbeError::Unavailable(cmd.program.to_string()))
        }
        Ok(Err(e)) => Err(ProbeError::Command(format!(
            "failed to execute {}: {}",
            cmd.program, e
        ))),
        Ok(Ok(output)) => Ok(output),
    }
}

/// The set of probes a monitoring cycle runs.
///
/// Implementations never fail: each method returns its "no data" value
/// when the underlying measurement cannot be taken.
pub trait Prober {
    async fn reachability(&self, target: &str) -> Reachability;
    async fn resolution(&self, domain: &str) -> Option<f64>;
    async fn throughput(&self) -> Throughput;
    async fn trace(&self, target: &str) -> TracerouteSummary;
}

/// Prober backed by the host's network utilities and an HTTP speed test.
pub struct SystemProber {
    platform: Platform,
    speed: SpeedTester,
}

impl SystemProber {
    pub fn new(platform: Platform, speed: SpeedTester) -> Self {
        Self { platform, speed }
    }
}

impl Prober for SystemProber {
    async fn reachability(&self, target: &str) -> Reachability {
        run_ping_probe(self.platform, target).await
    }

    async fn resolution(&self, domain: &str) -> Option<f64> {
        run_dns_probe(self.platform, domain).await
    }

    async fn throughput(&self) -> Throughput {
        self.speed.run().await
    }

    async fn trace(&self, target: &str) -> TracerouteSummary {
        run_traceroute(self.platform, target).await
    }
}
