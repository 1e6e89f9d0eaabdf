//! Fan a ref event out to one concurrent run per matching pipeline

use crate::core::{PipelineRun, RefEvent, ReleaseError, Stage, TriggerMatcher};
use crate::execution::engine::ReleaseEngine;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Runs every pipeline whose trigger matches an event
///
/// Runs are independent: one failing never stops or rolls back another.
pub struct Dispatcher {
    matcher: TriggerMatcher,
    engine: Arc<ReleaseEngine>,
}

impl Dispatcher {
    pub fn new(matcher: TriggerMatcher, engine: Arc<ReleaseEngine>) -> Self {
        Self { matcher, engine }
    }

    /// Start one run per match and wait for all of them; results come back
    /// in pipeline definition order
    ///
    /// A run whose task panics or is aborted comes back `Failed` with an
    /// `Internal` error, so every triggered run is accounted for.
    pub async fn dispatch(&self, event: &RefEvent) -> Vec<PipelineRun> {
        let requests = self.matcher.match_event(event);
        if requests.is_empty() {
            info!("Ref {} matched no release pipeline", event.name);
            return Vec::new();
        }
        info!("Ref {} started {} run(s)", event.name, requests.len());

        let mut set = JoinSet::new();
        let mut snapshots = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let engine = self.engine.clone();
            let run = PipelineRun::matched(request);
            snapshots.push(run.clone());
            set.spawn(async move { (index, engine.execute(run).await) });
        }

        let mut finished: Vec<Option<PipelineRun>> = vec![None; snapshots.len()];
        let mut last_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, run)) => finished[index] = Some(run),
                Err(e) => {
                    error!("Release run task aborted: {}", e);
                    last_error = Some(e.to_string());
                }
            }
        }

        snapshots
            .into_iter()
            .zip(finished)
            .map(|(mut snapshot, run)| {
                run.unwrap_or_else(|| {
                    let reason = last_error.clone().unwrap_or_else(|| "task aborted".to_string());
                    let started_at = snapshot.created_at;
                    // The snapshot never left Matched; binding is the next stage
                    snapshot.fail(Stage::Environment, started_at, &ReleaseError::Aborted(reason));
                    snapshot
                })
            })
            .collect()
    }
}
