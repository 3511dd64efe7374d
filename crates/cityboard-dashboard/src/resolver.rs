//! Two-stage dashboard resolution.
//!
//! Stage 1 fetches the index for a city and decodes the component list.
//! Stage 2 fetches every component's chart data concurrently; each slot
//! resolves on its own and a failed slot never affects its siblings.
//!
//! Every `build` advances the generation counter and replaces the snapshot
//! wholesale. Tasks belonging to an older build keep running, but every write
//! they attempt is checked against the counter under the state lock and
//! dropped when stale.

use std::sync::{Arc, Mutex, MutexGuard};

use cityboard_core::generation::{Generation, GenerationToken};
use cityboard_core::types::{ComponentRef, DashboardQuery, FetchState};
use cityboard_gateway::{trim_base_url, HttpGateway};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::decode::{component_url, index_url, resolve_components};
use crate::error::DashboardError;

/// Stage 1 state: the resolved component list.
pub type IndexState = FetchState<Vec<ComponentRef>, DashboardError>;

/// Stage 2 state for one component: its chart payload.
pub type ComponentState = FetchState<Value, DashboardError>;

/// One entry of the resolved component list and its fetch state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSlot {
    pub component: ComponentRef,
    pub state: ComponentState,
}

/// Everything a renderer needs to draw the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// The query being resolved, `None` before the first build.
    pub query: Option<DashboardQuery>,
    pub generation: GenerationToken,
    pub index: IndexState,
    /// Payload order, one slot per resolved component.
    pub components: Vec<ComponentSlot>,
}

impl DashboardSnapshot {
    fn empty(generation: GenerationToken) -> Self {
        Self {
            query: None,
            generation,
            index: FetchState::Idle,
            components: Vec::new(),
        }
    }

    /// Whether the index or any component has not reached a terminal state.
    pub fn is_loading(&self) -> bool {
        self.index.is_loading() || self.components.iter().any(|s| !s.state.is_terminal())
    }

    /// The index resolved to zero components.
    pub fn is_empty(&self) -> bool {
        self.index.data().is_some_and(|components| components.is_empty())
    }

    /// First slot holding `id`.
    pub fn component(&self, id: u64) -> Option<&ComponentSlot> {
        self.components.iter().find(|slot| slot.component.id == id)
    }
}

/// How a build ended, as seen by the caller that started it.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every component fetch finished.
    Completed { succeeded: usize, failed: usize },
    /// Stage 1 failed; no component was requested.
    IndexFailed(DashboardError),
    /// A newer build started before this one finished.
    Superseded,
    /// The build task panicked or was cancelled before producing an outcome.
    Aborted(String),
}

/// Handle to one build.
#[derive(Debug)]
pub struct DashboardRun {
    token: GenerationToken,
    handle: JoinHandle<RunOutcome>,
}

impl DashboardRun {
    pub fn token(&self) -> GenerationToken {
        self.token
    }

    /// Wait until the build finishes or is superseded.
    pub async fn wait(self) -> RunOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(generation = %self.token, error = %e, "Dashboard task aborted");
                RunOutcome::Aborted(e.to_string())
            }
        }
    }
}

struct Shared {
    generation: Generation,
    state: Mutex<DashboardSnapshot>,
    updates: watch::Sender<DashboardSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DashboardSnapshot> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &DashboardSnapshot) {
        self.updates.send_replace(state.clone());
    }

    /// Commit the stage 1 result. `None` when the build is stale.
    fn commit_index(
        &self,
        token: GenerationToken,
        result: Result<Vec<ComponentRef>, DashboardError>,
    ) -> Option<Result<Vec<ComponentRef>, DashboardError>> {
        let mut state = self.lock();
        if !self.generation.is_current(token) {
            tracing::debug!(generation = %token, "Dropping index result for superseded build");
            return None;
        }

        match &result {
            Ok(components) => {
                tracing::info!(
                    generation = %token,
                    components = components.len(),
                    "Dashboard index resolved"
                );
                state.components = components
                    .iter()
                    .map(|&component| ComponentSlot {
                        component,
                        state: FetchState::Idle,
                    })
                    .collect();
            }
            Err(err) => {
                tracing::warn!(generation = %token, error = %err, "Dashboard index failed");
            }
        }
        state.index = FetchState::from_result(result.clone());
        self.publish(&state);
        Some(result)
    }

    /// Move the slot at `position` to `Loading`. False when the build is stale.
    fn mark_loading(&self, token: GenerationToken, position: usize) -> bool {
        let mut state = self.lock();
        if !self.generation.is_current(token) {
            return false;
        }
        let Some(slot) = state.components.get_mut(position) else {
            return false;
        };
        slot.state = FetchState::Loading;
        self.publish(&state);
        true
    }

    /// Commit one component result. Returns whether it succeeded, or `None`
    /// when the build is stale.
    fn commit_component(
        &self,
        token: GenerationToken,
        position: usize,
        result: Result<Value, DashboardError>,
    ) -> Option<bool> {
        let mut state = self.lock();
        if !self.generation.is_current(token) {
            tracing::debug!(
                generation = %token,
                position,
                "Dropping component result for superseded build"
            );
            return None;
        }
        let slot = state.components.get_mut(position)?;

        let succeeded = result.is_ok();
        if let Err(err) = &result {
            tracing::warn!(
                generation = %token,
                component = %slot.component,
                error = %err,
                "Component fetch failed"
            );
        }
        slot.state = FetchState::from_result(result);
        self.publish(&state);
        Some(succeeded)
    }
}

/// Resolves dashboard queries against one backend.
///
/// Cheap to clone; clones share the same snapshot.
#[derive(Clone)]
pub struct DashboardResolver {
    gateway: Arc<dyn HttpGateway>,
    base_url: String,
    shared: Arc<Shared>,
}

impl DashboardResolver {
    pub fn new(gateway: Arc<dyn HttpGateway>, base_url: &str) -> Self {
        let generation = Generation::new();
        let initial = DashboardSnapshot::empty(generation.current());
        let (updates, _) = watch::channel(initial.clone());
        Self {
            gateway,
            base_url: trim_base_url(base_url).to_string(),
            shared: Arc::new(Shared {
                generation,
                state: Mutex::new(initial),
                updates,
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start resolving `query`, invalidating any previous build.
    ///
    /// Building the same query again is a valid rebuild. Must be called from
    /// within a Tokio runtime.
    pub fn build(&self, query: DashboardQuery) -> DashboardRun {
        let mut state = self.shared.lock();
        let token = self.shared.generation.advance();
        *state = DashboardSnapshot {
            query: Some(query.clone()),
            generation: token,
            index: FetchState::Loading,
            components: Vec::new(),
        };
        tracing::info!(generation = %token, query = %query, "Building dashboard");
        self.shared.publish(&state);
        drop(state);

        let handle = tokio::spawn(run_pipeline(
            Arc::clone(&self.shared),
            Arc::clone(&self.gateway),
            self.base_url.clone(),
            query,
            token,
        ));
        DashboardRun { token, handle }
    }

    /// Re-issue the current query. `None` before the first build.
    pub fn rebuild(&self) -> Option<DashboardRun> {
        let query = self.shared.lock().query.clone()?;
        Some(self.build(query))
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.shared.lock().clone()
    }

    /// Receive a new snapshot after every committed change.
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.shared.updates.subscribe()
    }
}

async fn run_pipeline(
    shared: Arc<Shared>,
    gateway: Arc<dyn HttpGateway>,
    base_url: String,
    query: DashboardQuery,
    token: GenerationToken,
) -> RunOutcome {
    let url = index_url(&base_url, &query.city);
    let result = match gateway.get(&url).await {
        Ok(payload) => resolve_components(&payload, &query),
        Err(err) => Err(err.into()),
    };

    let components = match shared.commit_index(token, result) {
        Some(Ok(components)) => components,
        Some(Err(err)) => return RunOutcome::IndexFailed(err),
        None => return RunOutcome::Superseded,
    };

    let mut tasks = JoinSet::new();
    for (position, component) in components.into_iter().enumerate() {
        let shared = Arc::clone(&shared);
        let gateway = Arc::clone(&gateway);
        let url = component_url(&base_url, component, &query.city);
        tasks.spawn(async move {
            if !shared.mark_loading(token, position) {
                return None;
            }
            let result = gateway.get(&url).await.map_err(DashboardError::from);
            shared.commit_component(token, position, result)
        });
    }

    let (mut succeeded, mut failed) = (0, 0);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(true)) => succeeded += 1,
            Ok(Some(false)) => failed += 1,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(generation = %token, error = %e, "Component task panicked");
                failed += 1;
            }
        }
    }

    if !shared.generation.is_current(token) {
        return RunOutcome::Superseded;
    }
    tracing::info!(generation = %token, succeeded, failed, "Dashboard build finished");
    RunOutcome::Completed { succeeded, failed }
}
