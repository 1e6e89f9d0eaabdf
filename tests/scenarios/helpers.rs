//! Test utilities for release scenarios

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tagship::build::{Builder, SourceProvider, SourceTree};
use tagship::core::config::ReleaseConfig;
use tagship::core::{
    Artifact, ArtifactKind, BrokerError, BuildError, Environment, EnvironmentName, MintedToken,
    PipelineRun, RefEvent, RunContext,
};
use tagship::execution::{
    ApprovalGate, CancellationFlag, Collaborators, CredentialBroker, Dispatcher, EngineSettings,
    EventKind, PresetApproval, ReleaseEngine, ReleaseEvent,
};
use tagship::identity::{IdentityAssertion, LocalTrustIssuer, StaticIdentity, TokenIssuer};
use tagship::registry::RecordingRegistry;
use tempfile::TempDir;

/// Staging publishes freely; production sits behind approval
pub const FIXTURE: &str = r#"
name: "demo"
build:
  command: ["python", "-m", "build", "--outdir", "{{ out_dir }}"]
publish:
  command: ["twine", "upload", "--repository-url", "{{ registry_url }}", "{{ artifact }}"]
environments:
  staging:
    registry_url: "staging-registry"
    requires_approval: false
    credential_scope: "project:demo"
    trust: { repository: "acme/demo", workflow: "release.yml", environment: "staging" }
  production:
    registry_url: "production-registry"
    requires_approval: true
    credential_scope: "project:demo"
    trust: { repository: "acme/demo", workflow: "release.yml", environment: "production" }
pipelines:
  - { name: "publish-staging", environment: staging, tag_pattern: "v*" }
  - { name: "publish-production", environment: production, tag_pattern: "v*" }
"#;

pub const ARTIFACT_HASH: &str = "H1";

pub fn fixture_config() -> ReleaseConfig {
    ReleaseConfig::from_yaml(FIXTURE).expect("fixture parses")
}

/// Source provider that hands back the run's scratch directory
#[derive(Default)]
pub struct MockSource {
    calls: AtomicUsize,
}

impl MockSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for MockSource {
    async fn checkout(&self, tag: &str, scratch: &Path) -> Result<SourceTree, BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SourceTree {
            root: scratch.to_path_buf(),
            tag: tag.to_string(),
        })
    }
}

/// Builder that produces one source distribution with hash `H1`, or fails
/// for the chosen environments
#[derive(Default)]
pub struct MockBuilder {
    fail_for: Vec<EnvironmentName>,
    calls: AtomicUsize,
}

impl MockBuilder {
    pub fn failing_for(environments: &[EnvironmentName]) -> Self {
        Self {
            fail_for: environments.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Builder for MockBuilder {
    async fn build(
        &self,
        _source: &SourceTree,
        out_dir: &Path,
        context: &RunContext,
    ) -> Result<Vec<Artifact>, BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let environment = context.get_variable("environment").cloned().unwrap_or_default();
        if self.fail_for.iter().any(|e| e.as_str() == environment) {
            return Err(BuildError::CommandFailed {
                step: "build command".to_string(),
                code: 1,
                stderr: "error: invalid pyproject.toml".to_string(),
            });
        }

        let version = context.get_variable("version").cloned().unwrap_or_default();
        Ok(vec![Artifact {
            kind: ArtifactKind::SourceDist,
            path: out_dir.join(format!("demo-{}.tar.gz", version)),
            content_hash: ARTIFACT_HASH.to_string(),
            size: 2048,
        }])
    }
}

/// Token issuer that counts exchanges and can be told to fail
pub struct CountingIssuer {
    inner: LocalTrustIssuer,
    failure: Option<BrokerError>,
    calls: AtomicUsize,
    registries: Mutex<Vec<String>>,
}

impl CountingIssuer {
    pub fn new() -> Self {
        Self {
            inner: LocalTrustIssuer::new(),
            failure: None,
            calls: AtomicUsize::new(0),
            registries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: BrokerError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Registry URLs of the environments tokens were requested for
    pub fn registries(&self) -> Vec<String> {
        self.registries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenIssuer for CountingIssuer {
    async fn audience(&self, environment: &Environment) -> Result<String, BrokerError> {
        self.inner.audience(environment).await
    }

    async fn mint_token(
        &self,
        assertion: &IdentityAssertion,
        environment: &Environment,
    ) -> Result<MintedToken, BrokerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.registries
            .lock()
            .unwrap()
            .push(environment.registry_url.clone());
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.inner.mint_token(assertion, environment).await
    }
}

/// Everything a scenario needs, with every collaborator observable
pub struct Harness {
    pub config: ReleaseConfig,
    pub source: Arc<MockSource>,
    pub builder: Arc<MockBuilder>,
    pub issuer: Arc<CountingIssuer>,
    pub registry: Arc<RecordingRegistry>,
    pub approval: Arc<dyn ApprovalGate>,
    pub settings: EngineSettings,
    pub cancel: CancellationFlag,
    pub events: Arc<Mutex<Vec<ReleaseEvent>>>,
    _scratch: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let scratch = tempfile::tempdir().expect("scratch dir");
        Self {
            config: fixture_config(),
            source: Arc::new(MockSource::default()),
            builder: Arc::new(MockBuilder::default()),
            issuer: Arc::new(CountingIssuer::new()),
            registry: Arc::new(RecordingRegistry::new()),
            approval: Arc::new(PresetApproval::approve()),
            settings: EngineSettings {
                scratch_root: scratch.path().to_path_buf(),
                ..EngineSettings::default()
            },
            cancel: CancellationFlag::new(),
            events: Arc::new(Mutex::new(Vec::new())),
            _scratch: scratch,
        }
    }

    pub fn with_builder(mut self, builder: MockBuilder) -> Self {
        self.builder = Arc::new(builder);
        self
    }

    pub fn with_issuer(mut self, issuer: CountingIssuer) -> Self {
        self.issuer = Arc::new(issuer);
        self
    }

    pub fn with_approval(mut self, approval: impl ApprovalGate + 'static) -> Self {
        self.approval = Arc::new(approval);
        self
    }

    pub fn engine(&self) -> ReleaseEngine {
        let collaborators = Collaborators {
            source: self.source.clone(),
            builder: self.builder.clone(),
            broker: CredentialBroker::new(
                Arc::new(StaticIdentity::new("acme/demo", "release.yml")),
                self.issuer.clone(),
            ),
            registry: self.registry.clone(),
            approval: self.approval.clone(),
        };
        let sink = self.events.clone();
        ReleaseEngine::new(self.config.environment_binder(), collaborators)
            .with_settings(self.settings.clone())
            .with_cancellation(self.cancel.clone())
            .with_event_handler(move |event| sink.lock().unwrap().push(event.clone()))
    }

    /// Dispatch `reference` through the configured pipelines
    pub async fn dispatch(&self, reference: &str) -> Vec<PipelineRun> {
        let matcher = self.config.trigger_matcher().expect("valid pipelines");
        let dispatcher = Dispatcher::new(matcher, Arc::new(self.engine()));
        dispatcher.dispatch(&RefEvent::parse(reference)).await
    }

    pub fn events(&self) -> Vec<ReleaseEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events of one kind for one pipeline
    pub fn events_for(&self, pipeline: &str, filter: impl Fn(&EventKind) -> bool) -> Vec<EventKind> {
        self.events()
            .into_iter()
            .filter(|e| e.pipeline == pipeline && filter(&e.kind))
            .map(|e| e.kind)
            .collect()
    }
}

/// Find a run by environment
pub fn run_for(runs: &[PipelineRun], environment: EnvironmentName) -> &PipelineRun {
    runs.iter()
        .find(|r| r.environment == environment)
        .unwrap_or_else(|| panic!("no run for {}", environment))
}
