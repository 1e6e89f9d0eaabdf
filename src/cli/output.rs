//! CLI output formatting

use crate::core::{Artifact, ErrorKind, PipelineRun, RunState, StageOutcome};
use crate::execution::{EventKind, ReleaseEvent};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "# ");

/// Spinner shown while a run waits on the approval gate
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.yellow} [{elapsed}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a run state for display
pub fn format_state(state: RunState) -> String {
    match state {
        RunState::Idle => style("IDLE").dim().to_string(),
        RunState::Matched => style("MATCHED").dim().to_string(),
        RunState::EnvironmentBound => style("ENVIRONMENT BOUND").yellow().to_string(),
        RunState::Built => style("BUILT").yellow().to_string(),
        RunState::Authorized => style("AUTHORIZED").yellow().to_string(),
        RunState::Published => style("PUBLISHED").green().to_string(),
        RunState::Failed => style("FAILED").red().to_string(),
    }
}

pub fn format_error_kind(kind: ErrorKind) -> String {
    style(kind).red().bold().to_string()
}

fn short_id(run: &uuid::Uuid) -> String {
    run.to_string()[..8].to_string()
}

/// Format a release event for display; `None` for events not worth a line
pub fn format_event(event: &ReleaseEvent) -> Option<String> {
    let label = format!(
        "[{} {}]",
        style(&event.pipeline).bold(),
        style(short_id(&event.run_id)).dim()
    );
    let line = match &event.kind {
        EventKind::RunStarted { trigger_ref } => format!(
            "{} {} {} -> {}",
            ROCKET,
            label,
            style(trigger_ref).cyan(),
            style(event.environment).cyan()
        ),
        EventKind::StageStarted { .. } => return None,
        EventKind::StageCompleted { stage, state } => {
            format!("{} {} {} -> {}", CHECK, label, stage, format_state(*state))
        }
        EventKind::ApprovalRequired => format!(
            "{} {} approval required for {}",
            SPINNER,
            label,
            style(event.environment).yellow()
        ),
        EventKind::ArtifactHash { file_name, sha256 } => format!(
            "{} {} {} sha256:{}",
            INFO,
            label,
            file_name,
            style(sha256).dim()
        ),
        EventKind::ArtifactPublished { file_name, registry } => format!(
            "{} {} {} uploaded to {}",
            PACKAGE,
            label,
            style(file_name).green(),
            registry
        ),
        EventKind::ArtifactSkipped { file_name, registry } => format!(
            "{} {} {} already on {}, skipped",
            WARN,
            label,
            style(file_name).yellow(),
            registry
        ),
        EventKind::RunFailed {
            stage,
            kind,
            message,
        } => format!(
            "{} {} failed at {} ({}): {}",
            CROSS,
            label,
            style(stage).red(),
            format_error_kind(*kind),
            style(message).dim()
        ),
        EventKind::RunCompleted { state } => {
            format!("{} {} {}", CHECK, label, format_state(*state))
        }
    };
    Some(line)
}

/// One-paragraph report for a finished run
pub fn format_run_summary(run: &PipelineRun) -> String {
    let icon = if run.is_published() { CHECK } else { CROSS };
    let mut lines = vec![format!(
        "{} {} ({}) {} -> {}: {}",
        icon,
        style(&run.pipeline).bold(),
        style(short_id(&run.run_id)).dim(),
        style(run.trigger_ref()).cyan(),
        style(run.environment).cyan(),
        format_state(run.state())
    )];

    for result in run.stages() {
        let elapsed = (result.finished_at - result.started_at)
            .to_std()
            .map(format_duration)
            .unwrap_or_default();
        let line = match &result.outcome {
            StageOutcome::Succeeded { detail } => format!(
                "    {} {:<12} {} {}",
                style("ok").green(),
                result.stage,
                detail.as_deref().unwrap_or(""),
                style(elapsed).dim()
            ),
            StageOutcome::Failed { kind, message } => format!(
                "    {} {:<12} {}: {}",
                style("failed").red(),
                result.stage,
                format_error_kind(*kind),
                message
            ),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Format an artifact hash line
pub fn format_artifact(artifact: &Artifact) -> String {
    format!(
        "{}  {} ({} bytes)",
        artifact.content_hash,
        style(artifact.file_name()).bold(),
        artifact.size
    )
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
