// ABOUTME: Core library for boltforge - artifact/action parsing and execution
// ABOUTME: Shared by the boltforge CLI and anything embedding the workbench

pub mod action;
pub mod alert;
pub mod artifact;
pub mod build;
pub mod config;
pub mod error;
pub mod fs;
pub mod parser;
pub mod runner;
pub mod scanner;
pub mod shell;
pub mod workbench;

pub use action::{
    ActionCallbackData, ActionStatus, ActionType, ArtifactCallbackData, BoltAction, Occurrences,
};
pub use alert::{AlertSink, ChannelAlertSink, NoopAlertSink};
pub use artifact::{ArtifactRecord, ArtifactStore};
pub use build::{BuildCommands, BuildService, ShellBuildService};
pub use config::Config;
pub use error::{ActionCommandError, ActionError, ContractValidationError, FsError, ShellError};
pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
pub use parser::{ParseOutput, ParserCallbacks, ParserEvent, StreamingMessageParser};
pub use runner::{ActionRunner, ActionState, RunnerConfig};
pub use shell::{CommandOutput, DryRunShell, LocalShell, ShellFacade};
pub use workbench::Workbench;
