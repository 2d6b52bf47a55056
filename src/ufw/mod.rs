pub mod error;
pub mod memory;
pub mod parser;
pub mod rule;


use crate::ufw::error::UfwError;
use crate::ufw::parser::UfwStatus;
use crate::ufw::rule::{FirewallRule, Placement, RuleSpec};
use async_trait::async_trait;
use bon::bon;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use memory::MemoryRuleStore;

/// Result of deleting a rule by its index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The rule disappeared between snapshot and delete
    AlreadyGone,
}

/// Access to the host firewall rule list
///
/// Indices returned by `list_rules` are only valid until the next mutation.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn status(&self) -> Result<UfwStatus, UfwError>;

    /// Fresh snapshot of the numbered rule list
    async fn list_rules(&self) -> Result<Vec<FirewallRule>, UfwError>;

    async fn delete_by_index(&self, index: usize) -> Result<DeleteOutcome, UfwError>;

    async fn insert(&self, spec: &RuleSpec, placement: Placement) -> Result<(), UfwError>;

    /// `ufw status numbered` text, for backups and dry-run seeding
    async fn raw_listing(&self) -> Result<String, UfwError>;

    /// `ufw status verbose` text
    async fn raw_status(&self) -> Result<String, UfwError>;
}

struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

/// Drives the `ufw` binary
pub struct UfwClient {
    binary: PathBuf,
    timeout_duration: Duration,
}

#[bon]
impl UfwClient {
    #[builder]
    pub fn new(
        #[builder(into, default = PathBuf::from("ufw"))] binary: PathBuf,
        #[builder(default = Duration::from_secs(30))] timeout_duration: Duration,
    ) -> Self {
        Self {
            binary,
            timeout_duration,
        }
    }

    async fn run(&self, args: &[String]) -> Result<CommandOutput, UfwError> {
        let command_line = self.command_line(args);
        debug!(command = %command_line, "Running ufw");

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout_duration, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UfwError::NotInstalled);
            }
            Ok(Err(e)) => {
                return Err(UfwError::Spawn {
                    command: command_line,
                    source: e,
                });
            }
            Err(_) => {
                return Err(UfwError::command_failed(
                    command_line,
                    None,
                    "",
                    format!("timed out after {:?}", self.timeout_duration),
                ));
            }
        };

        let output = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !output.success && (needs_root(&output.stdout) || needs_root(&output.stderr)) {
            return Err(UfwError::NotRoot {
                command: command_line,
            });
        }
        Ok(output)
    }

    /// Run and require a zero exit status
    async fn run_checked(&self, args: &[String]) -> Result<String, UfwError> {
        let output = self.run(args).await?;
        if !output.success {
            return Err(UfwError::command_failed(
                self.command_line(args),
                output.code,
                output.stdout,
                output.stderr.trim(),
            ));
        }
        Ok(output.stdout)
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// ufw refuses every command, read-only ones included, without root
fn needs_root(output: &str) -> bool {
    output.contains("You need to be root")
}

/// ufw reports an index past the end of the list with one of these
fn is_already_gone(output: &str) -> bool {
    output.contains("Could not find rule") || output.contains("Invalid position")
}

#[async_trait]
impl RuleStore for UfwClient {
    async fn status(&self) -> Result<UfwStatus, UfwError> {
        Ok(parser::parse_status(&self.raw_status().await?))
    }

    async fn list_rules(&self) -> Result<Vec<FirewallRule>, UfwError> {
        let listing = self.raw_listing().await?;
        let rules = parser::parse_numbered(&listing)?;
        debug!(count = rules.len(), "Read firewall rules");
        Ok(rules)
    }

    async fn delete_by_index(&self, index: usize) -> Result<DeleteOutcome, UfwError> {
        let delete = args(&["--force", "delete", &index.to_string()]);
        let output = self.run(&delete).await?;

        if output.success {
            return Ok(DeleteOutcome::Deleted);
        }
        if is_already_gone(&output.stdout) || is_already_gone(&output.stderr) {
            warn!(index, "Rule already gone when deleting");
            return Ok(DeleteOutcome::AlreadyGone);
        }

        Err(UfwError::command_failed(
            self.command_line(&delete),
            output.code,
            output.stdout,
            output.stderr.trim(),
        ))
    }

    async fn insert(&self, spec: &RuleSpec, placement: Placement) -> Result<(), UfwError> {
        let has_v4_rules = if placement == Placement::Top && !spec.v6() {
            self.list_rules().await?.iter().any(|r| !r.v6)
        } else {
            false
        };

        let stdout = self
            .run_checked(&spec.to_ufw_args(placement, has_v4_rules))
            .await?;
        if stdout.contains("Skipping") {
            warn!(rule = %spec, output = %stdout.trim(), "ufw skipped the rule");
        }
        Ok(())
    }

    async fn raw_listing(&self) -> Result<String, UfwError> {
        self.run_checked(&args(&["status", "numbered"])).await
    }

    async fn raw_status(&self) -> Result<String, UfwError> {
        self.run_checked(&args(&["status", "verbose"])).await
    }
}
