//! Runs the external measurement tool as a subprocess

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, trace};

use super::{MeasurementSource, RawMeasurement};
use crate::error::MeasurementError;

/// Default bound for one measurement
pub const DEFAULT_MEASUREMENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest stderr/stdout excerpt carried in a process error
const OUTPUT_EXCERPT_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct CommandMeasurementClient {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandMeasurementClient {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Human-readable command line for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl MeasurementSource for CommandMeasurementClient {
    #[instrument(skip(self), fields(command = %self.command_line()))]
    async fn measure(&self) -> Result<RawMeasurement, MeasurementError> {
        info!("running measurement tool");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MeasurementError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // dropping the wait future on timeout kills the child (kill_on_drop)
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| MeasurementError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => return Err(MeasurementError::Timeout(self.timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        trace!("measurement stdout: {stdout}");

        if !output.status.success() {
            let diagnostics = if stderr.trim().is_empty() {
                &stdout
            } else {
                &stderr
            };
            return Err(MeasurementError::Process {
                code: output.status.code(),
                output: excerpt(diagnostics.trim()),
            });
        }

        if !stderr.trim().is_empty() {
            debug!("measurement tool wrote to stderr: {}", stderr.trim());
        }

        RawMeasurement::parse(&stdout)
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= OUTPUT_EXCERPT_LEN {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(OUTPUT_EXCERPT_LEN).collect();
    cut.push('…');
    cut
}
