// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Payload that runs an external program.
//!
//! The program comes from the process definition's `payload` object:
//!
//! ```json
//! { "program": "/opt/geo/interpolate", "args": ["--grid", "5km"], "env": {"GRID": "eu"} }
//! ```
//!
//! The child also receives `GEOPROC_PROCESS_ID`, `GEOPROC_REGISTRATION_ID` and
//! `GEOPROC_TRIGGER_TIME` (RFC 3339) in its environment.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ExecutionContext, Payload, PayloadError, Result};

/// Default execution timeout (1 hour).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Per-process command description.
#[derive(Debug, Clone, Deserialize)]
struct CommandSpec {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    /// Overrides the payload-wide timeout for this process.
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Runs the program named in each process's payload parameters.
#[derive(Debug, Clone)]
pub struct CommandPayload {
    timeout: Duration,
}

impl Default for CommandPayload {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl CommandPayload {
    /// Create a command payload with a default timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Default timeout applied when a process does not set `timeout_secs`.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn spec(ctx: &ExecutionContext) -> Result<CommandSpec> {
        if ctx.params.payload.is_null() {
            return Err(PayloadError::InvalidParams(format!(
                "process {} has no payload parameters",
                ctx.process_id()
            )));
        }
        let spec: CommandSpec = serde_json::from_value(ctx.params.payload.clone())
            .map_err(|e| PayloadError::InvalidParams(e.to_string()))?;
        if spec.program.trim().is_empty() {
            return Err(PayloadError::InvalidParams("empty program".to_string()));
        }
        Ok(spec)
    }
}

#[async_trait]
impl Payload for CommandPayload {
    fn kind(&self) -> &'static str {
        "command"
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<()> {
        let spec = Self::spec(&ctx)?;
        let timeout = spec
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.timeout);

        debug!(
            process_id = %ctx.process_id(),
            registration_id = %ctx.registration_id(),
            program = %spec.program,
            "Spawning payload command"
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .env("GEOPROC_PROCESS_ID", ctx.process_id().to_string())
            .env("GEOPROC_REGISTRATION_ID", ctx.registration_id().to_string())
            .env("GEOPROC_TRIGGER_TIME", ctx.trigger_time().to_rfc3339())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    process_id = %ctx.process_id(),
                    program = %spec.program,
                    timeout_secs = timeout.as_secs(),
                    "Payload command timed out, killed"
                );
                return Err(PayloadError::Timeout(timeout));
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(exit_code) => Err(PayloadError::ExitCode { exit_code, stderr }),
            None => Err(PayloadError::Failed(format!(
                "{} terminated by signal",
                spec.program
            ))),
        }
    }
}
