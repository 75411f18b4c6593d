use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::Colorize;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::RuntimeConfig;
use crate::cli::{Cli, Command, ModeArg};
use crate::config::{DefaultMode, SETTINGS_FILE_NAME, Settings, SettingsError};
use crate::coordinator::{
    AccessPolicy, ActionCoordinator, ActionError, ActionKind, ActionReport, OutcomeStatus,
};
use crate::executor::{WorkerPool, WorkerPoolCreationError};
use crate::paths::{PathSource, PathSourceError};
use crate::render::TreeRenderer;
use crate::session::{LockSession, RefreshError};
use crate::tool::{GitLfsTool, LockTool, ToolInvocationError};
use crate::tree::{ViewFilter, ViewMode, apply_filter, apply_view};

pub struct Application;

impl Application {
    pub async fn run(cli: Cli) -> Result<(), ApplicationError> {
        configure_colors();

        let settings_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE_NAME));
        let settings = Settings::read(&settings_path)
            .await
            .context(SettingsReadSnafu)?;
        let settings_dir = settings_path.parent().unwrap_or(Path::new(""));
        let config = RuntimeConfig::new(settings, settings_dir, cli.root.as_deref());
        debug!("Runtime config: {:?}", config);

        let executable = GitLfsTool::resolve_executable(
            config.git_lfs_executable.as_deref(),
            &config.project_root,
        )
        .context(ToolSetupSnafu)?;
        let tool = GitLfsTool::new(executable, &config.project_root);

        let current_user = match &config.current_user {
            Some(user) => user.clone(),
            None => tool.current_user().await.context(CurrentUserSnafu)?,
        };
        info!("Acting as '{}'", current_user);

        let paths = PathSource::new(
            config.path_source,
            &config.project_root,
            config.tracked_file_filter.as_deref(),
        )
        .context(PathSourceSetupSnafu)?;
        let session = Arc::new(LockSession::new(tool, paths));

        let cancellation = CancellationToken::new();
        cancel_on_interrupt(&cancellation);

        let output = execute(&cli.command, &config, session, &current_user, &cancellation).await?;
        for warning in &output.warnings {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }
        for line in &output.lines {
            println!("{line}");
        }

        ensure!(
            output.failed == 0,
            ActionsFailedSnafu {
                failed: output.failed,
                attempted: output.attempted,
            }
        );
        Ok(())
    }
}

/// What a command printed and how many of its lock calls went wrong.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
    pub warnings: Vec<String>,
    pub attempted: usize,
    pub failed: usize,
}

/// Refreshes the lock tree and runs one command against it.
pub async fn execute<T: LockTool + Clone + Send + 'static>(
    command: &Command,
    config: &RuntimeConfig,
    session: Arc<LockSession<T>>,
    current_user: &str,
    cancellation: &CancellationToken,
) -> Result<CommandOutput, ApplicationError> {
    let summary = session.refresh().await.context(InitialRefreshSnafu)?;
    let mut output = CommandOutput {
        warnings: summary.warnings.iter().map(ToString::to_string).collect(),
        ..CommandOutput::default()
    };

    let (kind, paths) = match command {
        Command::Tree {
            filter,
            mode,
            owner,
            depth,
        } => {
            let snapshot = session.snapshot();
            let mut root = snapshot.root().clone();
            let query = filter.as_deref().unwrap_or_default();
            match view_mode(*mode, owner.clone(), config.default_mode, current_user) {
                ViewMode::All => apply_filter(&mut root, query),
                mode => apply_view(&mut root, &ViewFilter::new(query, mode)),
            }
            output.lines = TreeRenderer::new(depth.unwrap_or(config.expansion_depth))
                .highlighting(current_user)
                .render(&root);
            return Ok(output);
        }
        Command::Owners => {
            output.lines = session.snapshot().owners();
            return Ok(output);
        }
        Command::Lock { paths } => (ActionKind::Lock, paths),
        Command::Unlock { paths } => (ActionKind::Unlock, paths),
        Command::ForceUnlock { paths } => (ActionKind::ForceUnlock, paths),
    };

    let pool = WorkerPool::new().context(WorkerPoolSnafu)?;
    let coordinator = ActionCoordinator::new(
        session,
        pool,
        AccessPolicy::new(config.admin_users.iter().cloned()),
        config.command_timeout,
    );
    let report = coordinator
        .perform_action(kind, paths, current_user, cancellation)
        .await
        .context(ActionSnafu)?;

    report_action(&report, &mut output);
    Ok(output)
}

fn report_action(report: &ActionReport, output: &mut CommandOutput) {
    for outcome in &report.outcomes {
        let status = match &outcome.status {
            OutcomeStatus::Succeeded => outcome.status.to_string().green(),
            OutcomeStatus::Skipped { .. } => outcome.status.to_string().dimmed(),
            OutcomeStatus::Failed { .. } | OutcomeStatus::TimedOut => {
                outcome.status.to_string().red()
            }
        };
        output.lines.push(format!("{}: {}", outcome.path, status));
    }
    output
        .warnings
        .extend(report.notices.iter().map(ToString::to_string));
    if let Some(error) = &report.refresh_error {
        warn!("Lock tree refresh after {} failed: {}", report.kind, error);
        output
            .warnings
            .push(format!("could not refresh locks afterwards: {error}"));
    }

    output.attempted = report
        .outcomes
        .iter()
        .filter(|outcome| outcome.status.was_attempted())
        .count();
    output.failed = report.failures().count();
}

/// An explicit owner always narrows to that owner's locks. Without a mode the
/// settings decide: `lock` shows lockable files and `unlock` shows the
/// current user's locks.
pub fn view_mode(
    mode: Option<ModeArg>,
    owner: Option<String>,
    default_mode: DefaultMode,
    current_user: &str,
) -> ViewMode {
    if let Some(owner) = owner {
        return ViewMode::Locked { owner: Some(owner) };
    }
    match mode {
        Some(ModeArg::All) => ViewMode::All,
        Some(ModeArg::Lockable) => ViewMode::Lockable,
        Some(ModeArg::Locked) => ViewMode::Locked { owner: None },
        None => match default_mode {
            DefaultMode::Lock => ViewMode::Lockable,
            DefaultMode::Unlock => ViewMode::Locked {
                owner: Some(current_user.to_string()),
            },
        },
    }
}

fn configure_colors() {
    if supports_color::on(supports_color::Stream::Stdout).is_none() {
        colored::control::set_override(false);
    }
}

fn cancel_on_interrupt(cancellation: &CancellationToken) {
    let cancellation = cancellation.clone();
    compio::runtime::spawn(async move {
        match compio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, abandoning pending lock calls");
                cancellation.cancel();
            }
            Err(e) => debug!("Not listening for interrupts: {}", e),
        }
    })
    .detach();
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Failed to load settings"))]
    SettingsReadError { source: SettingsError },
    #[snafu(display("Failed to set up the lock tool"))]
    ToolSetupError { source: ToolInvocationError },
    #[snafu(display("Failed to determine the current user; set 'currentUser' in the settings"))]
    CurrentUserError { source: ToolInvocationError },
    #[snafu(display("Invalid tracked file filter"))]
    PathSourceSetupError { source: PathSourceError },
    #[snafu(display("Failed to load the lock tree"))]
    InitialRefreshError { source: RefreshError },
    #[snafu(display("Failed to start worker threads"))]
    WorkerPoolError { source: WorkerPoolCreationError },
    #[snafu(display("Lock action was not carried out"))]
    ActionError { source: ActionError },
    #[snafu(display("{} of {} lock calls failed", failed, attempted))]
    ActionsFailedError { failed: usize, attempted: usize },
}
