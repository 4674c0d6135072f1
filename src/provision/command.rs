//! External installer backend.
//!
//! Shells out to a configured installer program. Argument templates may use
//! these placeholders:
//!
//! | placeholder     | expands to                          |
//! |-----------------|-------------------------------------|
//! | `{requirement}` | compact requirement, `name>=1,<2`   |
//! | `{name}`        | normalized package name             |
//! | `{target}`      | environment root being assembled    |
//! | `{packages}`    | `<target>/packages`                 |
//! | `{cache}`       | download cache directory            |

use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use semver::VersionReq;

use crate::config::CommandBackendConfig;
use crate::provision::{InstallContext, InstallError, InstalledPackage, PackageManager, Requirement};

pub struct CommandPackageManager {
    program: String,
    upgrade_args: Vec<String>,
    install_args: Vec<String>,
    timeout: Duration,
}

impl CommandPackageManager {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            upgrade_args: Vec::new(),
            install_args: vec!["{requirement}".to_string()],
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(config: &CommandBackendConfig) -> Self {
        Self {
            program: config.program.clone(),
            upgrade_args: config.upgrade_args.clone(),
            install_args: config.install_args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_upgrade_args(mut self, args: Vec<String>) -> Self {
        self.upgrade_args = args;
        self
    }

    pub fn with_install_args(mut self, args: Vec<String>) -> Self {
        self.install_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the installer, killing it if it outlives the timeout.
    async fn run(&self, args: &[String]) -> Result<Output, String> {
        let child = tokio::process::Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {e}", self.program))?;

        // Dropping the future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("waiting for {}: {e}", self.program)),
            Err(_) => Err(format!(
                "{} timed out after {}s",
                self.program,
                self.timeout.as_secs()
            )),
        }
    }
}

#[async_trait]
impl PackageManager for CommandPackageManager {
    fn name(&self) -> &str {
        &self.program
    }

    async fn self_upgrade(&self) -> Result<(), InstallError> {
        if self.upgrade_args.is_empty() {
            tracing::warn!(program = %self.program, "No upgrade command configured, installer not upgraded");
            return Ok(());
        }

        let output = self.run(&self.upgrade_args).await.map_err(|reason| InstallError::Upgrade {
            manager: self.program.clone(),
            reason,
        })?;

        if !output.status.success() {
            return Err(InstallError::Upgrade {
                manager: self.program.clone(),
                reason: failure_reason(&output),
            });
        }
        Ok(())
    }

    async fn install(
        &self,
        requirement: &Requirement,
        ctx: &InstallContext,
    ) -> Result<InstalledPackage, InstallError> {
        let args: Vec<String> = self
            .install_args
            .iter()
            .map(|arg| expand(arg, requirement, ctx))
            .collect();

        tracing::debug!(program = %self.program, args = ?args, "Running installer");

        let output = self.run(&args).await.map_err(|reason| InstallError::Package {
            requirement: requirement.to_string(),
            reason,
        })?;

        if !output.status.success() {
            return Err(InstallError::Package {
                requirement: requirement.to_string(),
                reason: failure_reason(&output),
            });
        }

        // The external tool does not report what it resolved; record the
        // constraint it was asked to satisfy.
        Ok(InstalledPackage {
            name: requirement.name.to_string(),
            version: requirement.constraint.to_string(),
        })
    }
}

fn expand(template: &str, requirement: &Requirement, ctx: &InstallContext) -> String {
    template
        .replace("{requirement}", &compact(requirement))
        .replace("{name}", requirement.name.as_str())
        .replace("{packages}", &ctx.packages_dir.to_string_lossy())
        .replace("{target}", &ctx.root.to_string_lossy())
        .replace("{cache}", &ctx.cache_dir.to_string_lossy())
}

/// `name` followed by the constraint with whitespace removed; exact pins are
/// written `==` as in the manifest.
fn compact(requirement: &Requirement) -> String {
    if requirement.constraint == VersionReq::STAR {
        return requirement.name.to_string();
    }
    let constraint: String = requirement
        .constraint
        .to_string()
        .split(',')
        .map(|part| {
            let part = part.trim();
            match part.strip_prefix('=') {
                Some(exact) => format!("=={exact}"),
                None => part.replace(' ', ""),
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{}", requirement.name, constraint)
}

fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    format!("exit status {}: {}", output.status, last.trim())
}
