//! Per-request module event coordination.
//!
//! One coordinator exists per request. It owns the lifecycle record of every
//! module in the request's snapshot and releases dependency gates: a module
//! waiting on siblings suspends on a watch channel and is re-checked each
//! time any module reaches a terminal state, bounded by the configured
//! timeout. Nothing here blocks a thread.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::domain::module::ModuleName;
use crate::util::lock::mutex_lock;

use super::progress::{AbandonReason, ModuleProgress, ProgressError};

const SOURCE: &str = "dispatch::coordinator";

/// Lifecycle event vocabulary exposed to collaborators.
pub mod events {
    pub const ROUTE_START: &str = "route_start";
    pub const ROUTE_FINISH: &str = "route_finish";
    pub const INIT_START: &str = "init_start";
    pub const INIT_FINISH: &str = "init_finish";
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("module `{name}` is not part of this request")]
    NotAMember { name: ModuleName },
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// Why a dependency gate failed to release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateFailure {
    Unsatisfiable {
        module: ModuleName,
        dependency: ModuleName,
    },
    Timeout {
        module: ModuleName,
        waited: Duration,
    },
}

impl GateFailure {
    pub fn reason(&self) -> AbandonReason {
        match self {
            GateFailure::Unsatisfiable { dependency, .. } => AbandonReason::Unsatisfiable {
                dependency: dependency.clone(),
            },
            GateFailure::Timeout { waited, .. } => AbandonReason::Timeout { waited: *waited },
        }
    }
}

impl std::fmt::Display for GateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateFailure::Unsatisfiable { module, dependency } => write!(
                f,
                "module `{module}` waits on `{dependency}`, which can never route in this request"
            ),
            GateFailure::Timeout { module, waited } => write!(
                f,
                "module `{module}` dependency gate timed out after {}ms",
                waited.as_millis()
            ),
        }
    }
}

/// Read-only view of one module's progress.
#[derive(Debug, Clone)]
pub struct ProgressView {
    pub routed: bool,
    pub abandoned: bool,
    pub started: Option<Instant>,
    pub finished: Option<Instant>,
}

enum GateCheck {
    Satisfied,
    Waiting,
    Unsatisfiable { dependency: ModuleName },
}

/// Per-request lifecycle tracker and dependency gate.
pub struct Coordinator {
    request_id: Uuid,
    timeout: Duration,
    members: HashMap<ModuleName, BTreeSet<ModuleName>>,
    states: Mutex<HashMap<ModuleName, ModuleProgress>>,
    // Generation counter bumped on every terminal transition; gate waiters
    // subscribe and re-check on change.
    notify: watch::Sender<u64>,
}

impl Coordinator {
    pub fn new(
        request_id: Uuid,
        members: Vec<(ModuleName, BTreeSet<ModuleName>)>,
        timeout: Duration,
    ) -> Self {
        let states = members
            .iter()
            .map(|(name, _)| (name.clone(), ModuleProgress::new()))
            .collect();
        let (notify, _) = watch::channel(0);
        Self {
            request_id,
            timeout,
            members: members.into_iter().collect(),
            states: Mutex::new(states),
            notify,
        }
    }

    /// Suspend until every declared dependency of `name` is routed.
    ///
    /// Resolves immediately as unsatisfiable when a dependency is outside the
    /// request snapshot or already abandoned; otherwise awaits terminal
    /// transitions under the configured timeout.
    pub async fn wait_for_dependencies(&self, name: &ModuleName) -> Result<(), GateFailure> {
        let Some(dependencies) = self.members.get(name) else {
            // Not part of this request; nothing will ever route it.
            return Err(GateFailure::Unsatisfiable {
                module: name.clone(),
                dependency: name.clone(),
            });
        };
        if dependencies.is_empty() {
            return Ok(());
        }

        let started_waiting = Instant::now();
        let mut changes = self.notify.subscribe();

        let wait = async {
            loop {
                match self.check_gate(dependencies) {
                    GateCheck::Satisfied => return Ok(()),
                    GateCheck::Unsatisfiable { dependency } => {
                        return Err(GateFailure::Unsatisfiable {
                            module: name.clone(),
                            dependency,
                        });
                    }
                    GateCheck::Waiting => {}
                }
                if changes.changed().await.is_err() {
                    // Sender dropped with the coordinator; treat as timeout.
                    return Err(GateFailure::Timeout {
                        module: name.clone(),
                        waited: started_waiting.elapsed(),
                    });
                }
            }
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(GateFailure::Timeout {
                module: name.clone(),
                waited: started_waiting.elapsed(),
            }),
        }
    }

    fn check_gate(&self, dependencies: &BTreeSet<ModuleName>) -> GateCheck {
        let states = mutex_lock(&self.states, SOURCE, "check_gate");
        for dependency in dependencies {
            match states.get(dependency) {
                None => {
                    return GateCheck::Unsatisfiable {
                        dependency: dependency.clone(),
                    };
                }
                Some(progress) if progress.is_abandoned() => {
                    return GateCheck::Unsatisfiable {
                        dependency: dependency.clone(),
                    };
                }
                Some(progress) if progress.is_routed() => {}
                Some(_) => return GateCheck::Waiting,
            }
        }
        GateCheck::Satisfied
    }

    /// Record the `route_start` transition for `name`.
    pub fn route_start(&self, name: &ModuleName) -> Result<Instant, CoordinatorError> {
        let mut states = mutex_lock(&self.states, SOURCE, "route_start");
        let progress = states
            .get_mut(name)
            .ok_or_else(|| CoordinatorError::NotAMember { name: name.clone() })?;
        let started = progress.start()?;
        debug!(
            request_id = %self.request_id,
            module = %name,
            event = events::ROUTE_START,
            "Module routing started"
        );
        Ok(started)
    }

    /// Record the `route_finish` transition; wakes gate waiters.
    pub fn route_finish(&self, name: &ModuleName) -> Result<Duration, CoordinatorError> {
        let duration = {
            let mut states = mutex_lock(&self.states, SOURCE, "route_finish");
            let progress = states
                .get_mut(name)
                .ok_or_else(|| CoordinatorError::NotAMember { name: name.clone() })?;
            progress.finish()?
        };
        debug!(
            request_id = %self.request_id,
            module = %name,
            event = events::ROUTE_FINISH,
            duration_ms = duration.as_millis() as u64,
            "Module routing finished"
        );
        self.notify.send_modify(|generation| *generation += 1);
        Ok(duration)
    }

    /// Abandon `name` for this request; wakes gate waiters so dependents
    /// fail fast instead of burning their own timeout.
    pub fn abandon(&self, name: &ModuleName, reason: AbandonReason) -> Result<(), CoordinatorError> {
        {
            let mut states = mutex_lock(&self.states, SOURCE, "abandon");
            let progress = states
                .get_mut(name)
                .ok_or_else(|| CoordinatorError::NotAMember { name: name.clone() })?;
            progress.abandon(reason)?;
        }
        self.notify.send_modify(|generation| *generation += 1);
        Ok(())
    }

    pub fn view(&self, name: &ModuleName) -> Option<ProgressView> {
        let states = mutex_lock(&self.states, SOURCE, "view");
        states.get(name).map(|progress| ProgressView {
            routed: progress.is_routed(),
            abandoned: progress.is_abandoned(),
            started: progress.started(),
            finished: progress.finished(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn name(raw: &str) -> ModuleName {
        ModuleName::new(raw).expect("name")
    }

    fn coordinator(members: &[(&str, &[&str])], timeout: Duration) -> Coordinator {
        let members = members
            .iter()
            .map(|(module, deps)| {
                (
                    name(module),
                    deps.iter().map(|dep| name(dep)).collect::<BTreeSet<_>>(),
                )
            })
            .collect();
        Coordinator::new(Uuid::new_v4(), members, timeout)
    }

    #[tokio::test]
    async fn empty_dependencies_release_immediately() {
        let coordinator = coordinator(&[("base", &[])], Duration::from_millis(50));
        coordinator
            .wait_for_dependencies(&name("base"))
            .await
            .expect("gate open");
    }

    #[tokio::test]
    async fn gate_releases_when_dependency_routes() {
        let coordinator = Arc::new(coordinator(
            &[("base", &[]), ("dependent", &["base"])],
            Duration::from_secs(1),
        ));

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_for_dependencies(&name("dependent")).await })
        };

        tokio::task::yield_now().await;
        coordinator.route_start(&name("base")).expect("start");
        coordinator.route_finish(&name("base")).expect("finish");

        waiter.await.expect("join").expect("gate released");
    }

    #[tokio::test]
    async fn unknown_dependency_is_unsatisfiable_without_waiting() {
        let coordinator = coordinator(
            &[("dependent", &["missing"])],
            Duration::from_secs(30),
        );

        let before = Instant::now();
        let failure = coordinator
            .wait_for_dependencies(&name("dependent"))
            .await
            .expect_err("unsatisfiable");

        assert!(before.elapsed() < Duration::from_secs(1));
        assert!(matches!(
            failure,
            GateFailure::Unsatisfiable { dependency, .. } if dependency.as_str() == "missing"
        ));
    }

    #[tokio::test]
    async fn abandoned_dependency_fails_dependents_fast() {
        let coordinator = Arc::new(coordinator(
            &[("base", &["missing"]), ("dependent", &["base"])],
            Duration::from_secs(30),
        ));

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_for_dependencies(&name("dependent")).await })
        };
        tokio::task::yield_now().await;

        coordinator
            .abandon(
                &name("base"),
                AbandonReason::Unsatisfiable {
                    dependency: name("missing"),
                },
            )
            .expect("abandon");

        let view = coordinator.view(&name("base")).expect("view");
        assert!(view.abandoned);
        assert!(!view.routed);

        let failure = waiter.await.expect("join").expect_err("unsatisfiable");
        assert!(matches!(
            failure,
            GateFailure::Unsatisfiable { dependency, .. } if dependency.as_str() == "base"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn gate_times_out_when_dependency_never_finishes() {
        let coordinator = coordinator(
            &[("base", &[]), ("dependent", &["base"])],
            Duration::from_millis(200),
        );

        let failure = coordinator
            .wait_for_dependencies(&name("dependent"))
            .await
            .expect_err("timeout");
        assert!(matches!(failure, GateFailure::Timeout { .. }));
    }

    #[test]
    fn transitions_reject_double_finish() {
        let coordinator = coordinator(&[("base", &[])], Duration::from_millis(50));
        coordinator.route_start(&name("base")).expect("start");
        coordinator.route_finish(&name("base")).expect("finish");
        assert!(coordinator.route_finish(&name("base")).is_err());
    }

    #[test]
    fn view_exposes_timestamps() {
        let coordinator = coordinator(&[("base", &[])], Duration::from_millis(50));
        coordinator.route_start(&name("base")).expect("start");
        coordinator.route_finish(&name("base")).expect("finish");

        let view = coordinator.view(&name("base")).expect("view");
        assert!(view.routed);
        assert!(view.finished.expect("finished") >= view.started.expect("started"));
    }
}
