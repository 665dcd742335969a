//! Start/stop phase execution with nested deadlines and a guaranteed exit.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::key::Key;
use crate::lifecycle::{layer_keys, Phase};
use crate::wrapper::ServiceWrapper;

/// Budgets for the lifecycle phases.
///
/// Every hook runs under `min(per-service override, default per-hook
/// deadline, remaining phase budget)`; time a hook does not use stays in
/// the phase budget. `grace` is the countdown between the stop phase
/// overrunning its budget and the hard process exit.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Global budget for the whole start phase.
    pub start_timeout: Duration,
    /// Global budget for the whole stop phase.
    pub stop_timeout: Duration,
    /// Default per-hook deadline, overridable per registration with
    /// `Binding::hook_timeout`.
    pub hook_timeout: Duration,
    /// Hard-exit countdown armed when the stop phase exceeds its budget.
    pub grace: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(15),
            stop_timeout: Duration::from_secs(15),
            hook_timeout: Duration::from_secs(10),
            grace: Duration::from_secs(1),
        }
    }
}

/// One hook that outlived its deadline, by key.
#[derive(Debug, Clone)]
pub struct BlameEntry {
    pub key: Key,
    pub phase: Phase,
    /// The deadline the hook was given.
    pub budget: Duration,
}

type ExitHandler = Arc<dyn Fn(i32) + Send + Sync>;

/// Executes ordered startup and shutdown over the captured dependency
/// graph.
///
/// Built by [`Container::lifecycle`](crate::Container::lifecycle). Startup
/// walks the topological layers in order, starting every member of a layer
/// in parallel; the first failure cancels the rest of the layer, rolls the
/// already-started services back in reverse with stop semantics, and fails
/// the phase. Shutdown walks the layers in strict reverse and gives every
/// service its slot regardless of earlier failures. Each phase runs at most
/// once per engine; after a failed start has rolled back, a later `stop()`
/// call is a no-op, so the started services are stopped exactly once either
/// way.
///
/// # Examples
///
/// ```rust,no_run
/// use keel::{Container, LifecycleOptions};
///
/// # async fn run(c: Container) -> keel::Result<()> {
/// c.build()?;
/// let engine = c.lifecycle(LifecycleOptions::default())?;
/// engine.start().await?;
/// // ... serve until a termination signal ...
/// engine.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct LifecycleEngine {
    wrappers: HashMap<Key, Arc<ServiceWrapper>>,
    layers: Vec<Vec<Key>>,
    options: LifecycleOptions,
    started: Mutex<HashSet<Key>>,
    blame: Arc<Mutex<Vec<BlameEntry>>>,
    start_ran: AtomicBool,
    stop_ran: AtomicBool,
    exit: Mutex<ExitHandler>,
}

impl LifecycleEngine {
    pub(crate) fn new(
        participants: Vec<Arc<ServiceWrapper>>,
        graph: HashMap<Key, Vec<Key>>,
        options: LifecycleOptions,
    ) -> Result<Self> {
        let keys: Vec<Key> = participants.iter().map(|w| w.key).collect();
        let layers = layer_keys(&keys, &graph)?;
        Ok(Self {
            wrappers: participants.into_iter().map(|w| (w.key, w)).collect(),
            layers,
            options,
            started: Mutex::new(HashSet::new()),
            blame: Arc::new(Mutex::new(Vec::new())),
            start_ran: AtomicBool::new(false),
            stop_ran: AtomicBool::new(false),
            exit: Mutex::new(Arc::new(|code| std::process::exit(code))),
        })
    }

    /// The computed startup layers. Members of one layer start in
    /// parallel; their relative order is unobservable.
    pub fn layers(&self) -> &[Vec<Key>] {
        &self.layers
    }

    /// Hooks that outlived their deadline so far.
    pub fn blame(&self) -> Vec<BlameEntry> {
        self.blame.lock().clone()
    }

    /// Replaces the process-exit primitive. For tests and embedders that
    /// must observe the hard exit instead of dying.
    pub fn set_exit_handler<F>(&self, f: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        *self.exit.lock() = Arc::new(f);
    }

    /// Runs the start phase.
    ///
    /// On failure the returned error is the first hook failure; services
    /// started before it have already been stopped again, in reverse.
    pub async fn start(&self) -> Result<()> {
        if self.start_ran.swap(true, Ordering::SeqCst) {
            tracing::warn!("start phase already ran; ignoring");
            return Ok(());
        }
        let deadline = Instant::now() + self.options.start_timeout;
        tracing::info!(layers = self.layers.len(), "phase: start");

        for (depth, layer) in self.layers.iter().enumerate() {
            let token = CancellationToken::new();
            let mut set: JoinSet<(Key, Result<()>)> = JoinSet::new();
            for key in layer {
                let Some(wrapper) = self.wrappers.get(key) else {
                    continue;
                };
                let wrapper = wrapper.clone();
                let hook_token = token.child_token();
                let blame = self.blame.clone();
                let budgets = (self.options.hook_timeout, self.options.start_timeout);
                set.spawn(async move {
                    let key = wrapper.key;
                    let out =
                        run_hook(wrapper, Phase::Start, hook_token, deadline, budgets, blame)
                            .await;
                    (key, out)
                });
            }

            let mut failure: Option<Error> = None;
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((key, Ok(()))) => {
                        tracing::info!(key = %key, layer = depth, "started");
                        self.started.lock().insert(key);
                    }
                    Ok((key, Err(err))) => {
                        tracing::error!(key = %key, layer = depth, error = %err, "start hook failed");
                        if failure.is_none() {
                            token.cancel();
                            failure = Some(err);
                        }
                    }
                    Err(join_err) => {
                        tracing::error!(layer = depth, error = %join_err, "start hook panicked");
                        if failure.is_none() {
                            token.cancel();
                            failure = Some(Error::HookFailure {
                                key: "<panicked hook>".to_string(),
                                phase: Phase::Start,
                                source: anyhow::anyhow!(join_err),
                            });
                        }
                    }
                }
            }

            if let Some(err) = failure {
                self.rollback().await;
                return Err(err);
            }
        }
        tracing::info!("phase: start complete");
        Ok(())
    }

    /// Runs the stop phase over the reversed layers.
    ///
    /// Hook failures are collected, attributed by key, and returned as an
    /// aggregate; they never deny another service its stop slot. Should the
    /// phase outlive its global budget, a watchdog records the event and —
    /// after `grace` — invokes the exit primitive with a nonzero status, so
    /// a stuck hook can never produce a zombie process.
    pub async fn stop(&self) -> Result<()> {
        if self.stop_ran.swap(true, Ordering::SeqCst) {
            tracing::warn!("stop phase already ran; ignoring");
            return Ok(());
        }
        let deadline = Instant::now() + self.options.stop_timeout;
        tracing::info!(layers = self.layers.len(), "phase: stop");

        let done = CancellationToken::new();
        {
            let done = done.clone();
            let exit = self.exit.lock().clone();
            let budget = self.options.stop_timeout;
            let grace = self.options.grace;
            tokio::spawn(async move {
                tokio::select! {
                    _ = done.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        tracing::error!(budget = ?budget, grace = ?grace, "stop phase exceeded its global budget; hard exit armed");
                        tokio::select! {
                            _ = done.cancelled() => {}
                            _ = tokio::time::sleep(grace) => exit(1),
                        }
                    }
                }
            });
        }

        let reversed: Vec<Vec<Key>> = self.layers.iter().rev().cloned().collect();
        let mut errors = self.run_stop_layers(&reversed, deadline).await;
        done.cancel();

        match errors.len() {
            0 => {
                tracing::info!("phase: stop complete");
                Ok(())
            }
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate { errors }),
        }
    }

    /// Reverses partial progress after a start failure: stops the services
    /// that made it, newest layer first. Stop errors here are logged, not
    /// returned — the caller gets the original start failure.
    async fn rollback(&self) {
        self.stop_ran.store(true, Ordering::SeqCst);
        let started = self.started.lock().clone();
        if started.is_empty() {
            return;
        }
        tracing::warn!(count = started.len(), "start failed; stopping started services in reverse");

        let layers: Vec<Vec<Key>> = self
            .layers
            .iter()
            .rev()
            .map(|layer| {
                layer
                    .iter()
                    .filter(|k| started.contains(k))
                    .copied()
                    .collect::<Vec<Key>>()
            })
            .filter(|layer| !layer.is_empty())
            .collect();

        let deadline = Instant::now() + self.options.stop_timeout;
        for err in self.run_stop_layers(&layers, deadline).await {
            tracing::warn!(error = %err, "rollback stop failed");
        }
    }

    async fn run_stop_layers(&self, layers: &[Vec<Key>], deadline: Instant) -> Vec<Error> {
        let mut errors = Vec::new();
        for layer in layers {
            let token = CancellationToken::new();
            let mut set: JoinSet<(Key, Result<()>)> = JoinSet::new();
            for key in layer {
                let Some(wrapper) = self.wrappers.get(key) else {
                    continue;
                };
                let wrapper = wrapper.clone();
                let hook_token = token.child_token();
                let blame = self.blame.clone();
                let budgets = (self.options.hook_timeout, self.options.stop_timeout);
                set.spawn(async move {
                    let key = wrapper.key;
                    let out =
                        run_hook(wrapper, Phase::Stop, hook_token, deadline, budgets, blame).await;
                    (key, out)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((key, Ok(()))) => tracing::info!(key = %key, "stopped"),
                    Ok((key, Err(err))) => {
                        tracing::error!(key = %key, error = %err, "stop hook failed");
                        errors.push(err);
                    }
                    Err(join_err) => {
                        tracing::error!(error = %join_err, "stop hook panicked");
                        errors.push(Error::HookFailure {
                            key: "<panicked hook>".to_string(),
                            phase: Phase::Stop,
                            source: anyhow::anyhow!(join_err),
                        });
                    }
                }
            }
        }
        errors
    }
}

/// Runs one hook under `min(override | default, remaining phase budget)`.
///
/// The token is cancelled when the deadline fires so work the abandoned
/// future handed off elsewhere can observe the cancellation. A deadline
/// overrun is blamed on the key; it surfaces as `PhaseTimeout` when the
/// phase budget itself is spent, `HookFailure` otherwise.
async fn run_hook(
    wrapper: Arc<ServiceWrapper>,
    phase: Phase,
    token: CancellationToken,
    phase_deadline: Instant,
    (default_hook, phase_budget): (Duration, Duration),
    blame: Arc<Mutex<Vec<BlameEntry>>>,
) -> Result<()> {
    let key = wrapper.key;
    let now = Instant::now();
    if now >= phase_deadline {
        return Err(Error::PhaseTimeout {
            phase,
            budget: phase_budget,
        });
    }
    let budget = wrapper
        .hook_timeout
        .unwrap_or(default_hook)
        .min(phase_deadline - now);

    let hook = {
        let token = token.clone();
        async move {
            match phase {
                Phase::Start => wrapper.start(token).await,
                Phase::Stop => wrapper.stop(token).await,
            }
        }
    };

    match tokio::time::timeout(budget, hook).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(Error::HookFailure {
            key: key.display_name().to_string(),
            phase,
            source,
        }),
        Err(_) => {
            token.cancel();
            blame.lock().push(BlameEntry { key, phase, budget });
            tracing::warn!(key = %key, phase = %phase, timeout = ?budget, "hook exceeded its deadline");
            if Instant::now() >= phase_deadline {
                Err(Error::PhaseTimeout {
                    phase,
                    budget: phase_budget,
                })
            } else {
                Err(Error::HookFailure {
                    key: key.display_name().to_string(),
                    phase,
                    source: anyhow::anyhow!("hook did not return within {budget:?}"),
                })
            }
        }
    }
}
