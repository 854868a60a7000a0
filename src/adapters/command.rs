//! Flow driver backed by an external program.
//!
//! The program is invoked once per lifecycle call with a subcommand
//! (`run`, `monitor-run`, `monitor-transfer`, `get-data`). The run's
//! `FlowConfig` is piped to stdin as JSON; once the flow has started, its
//! remote run id is passed in `LIVEPUB_REMOTE_RUN_ID`. The monitor
//! subcommands are expected to block until their condition holds.

use std::io::ErrorKind;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{FlowDriver, FlowDriverFactory};
use crate::domain::{FlowConfig, FlowDescriptor, OrchestrationData};

/// Environment variable carrying the remote run id
pub const REMOTE_RUN_ID_ENV: &str = "LIVEPUB_REMOTE_RUN_ID";

/// Output of the `run` subcommand
#[derive(Debug, Deserialize)]
struct RunStarted {
    run_id: String,
}

/// Creates a `CommandFlowDriver` per run
#[derive(Debug, Clone)]
pub struct CommandFlowFactory {
    program: String,
    args: Vec<String>,
}

impl CommandFlowFactory {
    /// Create from a command line (program followed by leading arguments)
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("No flow driver configured (flow.driver is empty)")?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl FlowDriverFactory for CommandFlowFactory {
    fn create(&self, config: &FlowConfig) -> Result<Box<dyn FlowDriver>> {
        Ok(Box::new(CommandFlowDriver {
            program: self.program.clone(),
            args: self.args.clone(),
            config: config.clone(),
            remote_run_id: None,
        }))
    }
}

/// Flow driver using subprocess calls
pub struct CommandFlowDriver {
    program: String,
    args: Vec<String>,
    config: FlowConfig,
    remote_run_id: Option<String>,
}

impl CommandFlowDriver {
    /// Invoke the driver program with `subcommand`, returning its stdout
    async fn invoke(&self, subcommand: &str) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(subcommand)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref run_id) = self.remote_run_id {
            command.env(REMOTE_RUN_ID_ENV, run_id);
        }

        let mut child = command.spawn().with_context(|| {
            format!("Failed to spawn flow driver '{}' for {}", self.program, subcommand)
        })?;

        let input = serde_json::to_vec(&self.config).context("Failed to serialize flow config")?;
        if let Some(mut stdin) = child.stdin.take() {
            // A driver that ignores its input may exit before reading it
            if let Err(e) = stdin.write_all(&input).await {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(e).context("Failed to write flow config to driver stdin");
                }
            }
            // Drop stdin to signal EOF
        }

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for flow driver ({})", subcommand))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "Flow driver '{}' failed with exit code {}: {}",
                subcommand,
                exit_code,
                stderr.trim()
            );
        }

        debug!(subcommand, bytes = output.stdout.len(), "Flow driver call finished");
        Ok(output.stdout)
    }

    fn require_started(&self, call: &str) -> Result<()> {
        if self.remote_run_id.is_none() {
            anyhow::bail!("Cannot {} before the flow has been started", call);
        }
        Ok(())
    }
}

#[async_trait]
impl FlowDriver for CommandFlowDriver {
    fn descriptor(&self) -> FlowDescriptor {
        FlowDescriptor {
            name: self.program.clone(),
            remote_run_id: self.remote_run_id.clone(),
        }
    }

    async fn run(&mut self) -> Result<()> {
        let stdout = self.invoke("run").await?;
        let started: RunStarted =
            serde_json::from_slice(&stdout).context("Flow driver 'run' printed no run id")?;
        self.remote_run_id = Some(started.run_id);
        Ok(())
    }

    async fn monitor_run(&mut self) -> Result<()> {
        self.require_started("monitor the run")?;
        self.invoke("monitor-run").await.map(|_| ())
    }

    async fn monitor_transfer(&mut self) -> Result<()> {
        self.require_started("monitor transfers")?;
        self.invoke("monitor-transfer").await.map(|_| ())
    }

    async fn get_data(&mut self) -> Result<OrchestrationData> {
        self.require_started("fetch data")?;
        let stdout = self.invoke("get-data").await?;
        let payload: serde_json::Value = serde_json::from_slice(&stdout)
            .context("Flow driver 'get-data' did not print JSON")?;
        Ok(OrchestrationData::new(payload))
    }
}
