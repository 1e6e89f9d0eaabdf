use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tagship::build::{Builder, CommandBuilder, GitCheckout, SourceProvider, WorkingTree};
use tagship::cli::commands::{HashCommand, MatchCommand, RunCommand, ValidateCommand};
use tagship::cli::output::*;
use tagship::cli::{Cli, Command};
use tagship::core::config::{IdentityProviderKind, ReleaseConfig};
use tagship::core::{
    collect_artifacts, EnvironmentName, RefEvent, RefType, ReleaseError, TriggerMatcher,
};
use tagship::execution::{
    ApprovalGate, Collaborators, CredentialBroker, Dispatcher, EngineSettings, EventKind,
    PendingApproval, PresetApproval, PromptApproval, ReleaseEngine,
};
use tagship::identity::{
    EnvAssertion, GithubActionsIdentity, IdentityProvider, LocalTrustIssuer, StaticIdentity,
    TokenIssuer, TrustedPublisherIssuer,
};
use tagship::registry::{CommandRegistry, RecordingRegistry, Registry};
use tracing::{error, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_release(&cli, cmd).await?,
        Command::Match(cmd) => match_ref(&cli, cmd)?,
        Command::Validate(cmd) => validate_config(&cli, cmd)?,
        Command::Hash(cmd) => hash_artifacts(cmd).await?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ReleaseConfig> {
    let path = ReleaseConfig::discover(cli.config.as_deref())?;
    ReleaseConfig::from_file(&path)
        .with_context(|| format!("Failed to load release config from {}", path.display()))
}

fn matcher_for(config: &ReleaseConfig, only: Option<EnvironmentName>) -> Result<TriggerMatcher> {
    let definitions = config
        .pipeline_definitions()?
        .into_iter()
        .filter(|d| only.map_or(true, |env| d.environment == env))
        .collect();
    Ok(TriggerMatcher::new(definitions))
}

fn source_provider(config: &ReleaseConfig) -> Arc<dyn SourceProvider> {
    match &config.build.clone_url {
        Some(url) => Arc::new(GitCheckout::new(url.clone())),
        None => Arc::new(WorkingTree::new(config.build.source_dir.clone())),
    }
}

/// Identity for dry runs: the runner's own, else the first configured trust
/// relationship so the local issuer accepts it
fn local_identity(config: &ReleaseConfig) -> StaticIdentity {
    StaticIdentity::from_github_env().unwrap_or_else(|| {
        config
            .environments
            .values()
            .find_map(|env| env.trust.as_ref())
            .map(|trust| StaticIdentity::new(trust.repository.clone(), trust.workflow.clone()))
            .unwrap_or_else(|| StaticIdentity::new("local/unknown", "release.yml"))
    })
}

fn approval_gate(cmd: &RunCommand) -> (Arc<dyn ApprovalGate>, bool) {
    if cmd.approve {
        (Arc::new(PresetApproval::approve()), false)
    } else if cmd.deny {
        (Arc::new(PresetApproval::deny("denied with --deny")), false)
    } else if console::Term::stderr().is_term() {
        (Arc::new(PromptApproval::new()), false)
    } else {
        (Arc::new(PendingApproval), true)
    }
}

async fn run_release(cli: &Cli, cmd: &RunCommand) -> Result<()> {
    let config = load_config(cli)?;
    println!("{} Loaded release: {}", INFO, style(&config.name).bold());

    let event = match &cmd.reference {
        Some(reference) => RefEvent::parse(reference),
        None => RefEvent::from_github_env()
            .context("No --ref given and GITHUB_REF is not set")?,
    };
    if event.ref_type != RefType::Tag {
        println!("{} {} is not a tag; nothing to release", INFO, style(&event.name).dim());
        return Ok(());
    }

    let matcher = matcher_for(&config, cmd.environment.map(EnvironmentName::from))?;

    let (identity, issuer, registry): (Arc<dyn IdentityProvider>, Arc<dyn TokenIssuer>, Arc<dyn Registry>) =
        if cmd.dry_run {
            println!("{} Dry run: local trust registry, in-memory package registry", WARN);
            (
                Arc::new(local_identity(&config)),
                Arc::new(LocalTrustIssuer::new()),
                Arc::new(RecordingRegistry::new()),
            )
        } else {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("Failed to create HTTP client")?;
            let identity: Arc<dyn IdentityProvider> = match config.identity.provider {
                IdentityProviderKind::GithubActions => {
                    Arc::new(GithubActionsIdentity::from_env(client.clone()))
                }
                IdentityProviderKind::Env => {
                    Arc::new(EnvAssertion::new(config.identity.assertion_env.clone()))
                }
            };
            (
                identity,
                Arc::new(TrustedPublisherIssuer::new(client)),
                Arc::new(CommandRegistry::from_config(&config.publish)),
            )
        };

    let (approval, show_spinner) = approval_gate(cmd);
    let builder: Arc<dyn Builder> = Arc::new(CommandBuilder::from_config(&config.build));
    let collaborators = Collaborators {
        source: source_provider(&config),
        builder,
        broker: CredentialBroker::new(identity, issuer),
        registry,
        approval,
    };

    let settings = EngineSettings {
        verify_hashes: config.publish.verify_hashes,
        skip_existing: config.publish.skip_existing,
        approval_timeout: cmd.approval_timeout.map(Duration::from_secs),
        scratch_root: config.scratch_root(),
        keep_scratch: cmd.keep_scratch,
    };

    let mut engine = ReleaseEngine::new(config.environment_binder(), collaborators)
        .with_settings(settings);

    // Set up event handler for console output
    if !cmd.json {
        let spinners: Arc<Mutex<HashMap<Uuid, indicatif::ProgressBar>>> = Arc::default();
        engine = engine.with_event_handler(move |event| {
            let Ok(mut active) = spinners.lock() else {
                return;
            };
            if let Some(spinner) = active.remove(&event.run_id) {
                spinner.finish_and_clear();
            }
            if let Some(line) = format_event(event) {
                println!("{}", line);
            }
            if show_spinner && matches!(event.kind, EventKind::ApprovalRequired) {
                let message = format!("{} waiting for approval", event.pipeline);
                active.insert(event.run_id, create_spinner(message));
            }
        });
    }

    let cancel = engine.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling runs at the next stage boundary");
            cancel.cancel();
        }
    });

    let dispatcher = Dispatcher::new(matcher, Arc::new(engine));
    let runs = dispatcher.dispatch(&event).await;

    if runs.is_empty() {
        print_trigger_mismatch(&event);
        return Ok(());
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
    } else {
        println!();
        for run in &runs {
            println!("{}", format_run_summary(run));
        }
    }

    let failed: Vec<_> = runs.iter().filter(|r| !r.is_published()).collect();
    if failed.is_empty() {
        println!(
            "\n{} {} published {}",
            CHECK,
            style(&event.name).bold(),
            style("successfully").green()
        );
        return Ok(());
    }

    for run in &failed {
        if let Some(failure) = run.failure() {
            error!(
                "{} failed at {} stage ({})",
                run.pipeline, failure.stage, failure.kind
            );
        }
    }
    println!(
        "\n{} {} of {} run(s) {}",
        CROSS,
        failed.len(),
        runs.len(),
        style("failed").red()
    );
    std::process::exit(1);
}

/// A ref that starts no runs is reported, never treated as a failure
fn print_trigger_mismatch(event: &RefEvent) {
    let mismatch = ReleaseError::TriggerMismatch(event.name.clone());
    println!("{} {} ({})", INFO, mismatch, format_error_kind(mismatch.kind()));
}

fn match_ref(cli: &Cli, cmd: &MatchCommand) -> Result<()> {
    let config = load_config(cli)?;
    let matcher = config.trigger_matcher()?;
    let event = RefEvent::parse(&cmd.reference);
    let requests = matcher.match_event(&event);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&requests)?);
        return Ok(());
    }

    if requests.is_empty() {
        print_trigger_mismatch(&event);
        return Ok(());
    }

    println!("{} {} starts:", ROCKET, style(&event.name).cyan());
    for request in &requests {
        let note = if config.environments.contains_key(&request.environment) {
            String::new()
        } else {
            format!(" {}", style("(environment not configured)").yellow())
        };
        println!(
            "  {} -> {}{}",
            style(&request.pipeline).bold(),
            style(request.environment).cyan(),
            note
        );
    }
    Ok(())
}

fn validate_config(cli: &Cli, cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating release configuration...", INFO);

    let result = ReleaseConfig::discover(cli.config.as_deref()).and_then(ReleaseConfig::from_file);

    match result {
        Ok(config) => {
            println!("{} Release configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Environments: {}", style(config.environments.len()).cyan());
            let definitions = config.pipeline_definitions()?;
            println!("  Pipelines: {}", style(definitions.len()).cyan());
            for definition in &definitions {
                println!(
                    "    {} {} -> {}",
                    style(&definition.name).bold(),
                    style(definition.pattern.as_str()).dim(),
                    definition.environment
                );
            }

            for pipeline in config.unconfigured_pipelines()? {
                println!(
                    "{} Pipeline '{}' targets unconfigured environment '{}'; its runs will fail at binding",
                    WARN, pipeline.name, pipeline.environment
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn hash_artifacts(cmd: &HashCommand) -> Result<()> {
    let artifacts = collect_artifacts(&cmd.dir)
        .await
        .with_context(|| format!("Failed to read artifacts from {}", cmd.dir.display()))?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }

    if artifacts.is_empty() {
        println!("{} No artifacts in {}", WARN, cmd.dir.display());
        return Ok(());
    }
    for artifact in &artifacts {
        println!("{}", format_artifact(artifact));
    }
    Ok(())
}
