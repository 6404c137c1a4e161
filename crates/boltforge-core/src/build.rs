// ABOUTME: Build service behind the `build` and `buildContract` actions.
// ABOUTME: ShellBuildService runs configured commands and checks contract project files.

use crate::error::{ActionCommandError, ActionError, ContractValidationError};
use crate::fs::FileSystem;
use crate::shell::{CommandOutput, ShellFacade};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait BuildService: Send + Sync {
    async fn build(&self, cancel: CancellationToken) -> Result<CommandOutput, ActionError>;

    /// Check that the project has what a contract build needs.
    async fn validate_contract_project(&self) -> Result<(), ContractValidationError>;

    async fn build_contract(&self, cancel: CancellationToken)
        -> Result<CommandOutput, ActionError>;
}

/// Commands and required files used by [`ShellBuildService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommands {
    pub build: String,
    pub contract: String,
    pub contract_required_files: Vec<String>,
}

impl Default for BuildCommands {
    fn default() -> Self {
        Self {
            build: "npm run build".to_string(),
            contract: "npm run build:contract".to_string(),
            contract_required_files: vec!["package.json".to_string()],
        }
    }
}

pub struct ShellBuildService {
    shell: Arc<dyn ShellFacade>,
    fs: Arc<dyn FileSystem>,
    commands: BuildCommands,
}

impl ShellBuildService {
    pub fn new(
        shell: Arc<dyn ShellFacade>,
        fs: Arc<dyn FileSystem>,
        commands: BuildCommands,
    ) -> Self {
        Self {
            shell,
            fs,
            commands,
        }
    }

    async fn run(
        &self,
        header: &str,
        command: &str,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, ActionError> {
        let output = self.shell.execute_command(command, cancel).await?;
        if !output.success() {
            return Err(ActionCommandError::new(header, output.output).into());
        }
        Ok(output)
    }
}

#[async_trait]
impl BuildService for ShellBuildService {
    async fn build(&self, cancel: CancellationToken) -> Result<CommandOutput, ActionError> {
        tracing::info!(command = %self.commands.build, "Running build");
        self.run("Build Failed", &self.commands.build, cancel).await
    }

    async fn validate_contract_project(&self) -> Result<(), ContractValidationError> {
        let workdir = self.fs.workdir();
        let mut missing = Vec::new();
        for file in &self.commands.contract_required_files {
            if !self.fs.exists(&workdir.join(file)).await {
                missing.push(file.as_str());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ContractValidationError {
                message: format!("missing required files: {}", missing.join(", ")),
            })
        }
    }

    async fn build_contract(
        &self,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, ActionError> {
        tracing::info!(command = %self.commands.contract, "Running contract build");
        self.run("Contract Build Failed", &self.commands.contract, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::shell::DryRunShell;

    #[tokio::test]
    async fn validation_lists_missing_files() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let shell = Arc::new(DryRunShell::new());
        let service = ShellBuildService::new(
            shell,
            fs.clone(),
            BuildCommands {
                contract_required_files: vec!["package.json".into(), "contract/lib.rs".into()],
                ..BuildCommands::default()
            },
        );

        let err = service.validate_contract_project().await.unwrap_err();
        assert!(err.message.contains("package.json"));
        assert!(err.message.contains("contract/lib.rs"));

        fs.insert("package.json", "{}");
        fs.insert("contract/lib.rs", "");
        assert!(service.validate_contract_project().await.is_ok());
    }

    #[tokio::test]
    async fn build_runs_configured_command() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let shell = Arc::new(DryRunShell::new());
        let service = ShellBuildService::new(shell.clone(), fs, BuildCommands::default());

        service.build(CancellationToken::new()).await.unwrap();
        service.build_contract(CancellationToken::new()).await.unwrap();
        assert_eq!(
            shell.commands(),
            vec!["npm run build".to_string(), "npm run build:contract".to_string()]
        );
    }
}
