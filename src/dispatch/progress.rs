//! Per-request module lifecycle state machine.
//!
//! One record per `(request, module)` pair, owned by that request's
//! coordinator. Transitions are explicit functions over the state so the
//! dependency-gate logic is testable without any scheduler involved:
//! `Pending -> Routing -> Routed`, with `Abandoned` as the failure terminal
//! when the gate can never release.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::domain::module::ModuleName;

/// Why a module was abandoned for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    /// A dependency can never reach `Routed` in this request: it is not part
    /// of the snapshot (disabled or unknown) or was itself abandoned.
    Unsatisfiable { dependency: ModuleName },
    /// The dependency gate did not release within the configured timeout.
    Timeout { waited: Duration },
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbandonReason::Unsatisfiable { dependency } => {
                write!(f, "dependency `{dependency}` can never be satisfied")
            }
            AbandonReason::Timeout { waited } => {
                write!(f, "dependency gate timed out after {}ms", waited.as_millis())
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition: {event} while {state}")]
pub struct ProgressError {
    pub state: &'static str,
    pub event: &'static str,
}

/// Routing lifecycle of one module within one request.
#[derive(Debug, Clone)]
pub enum ModuleProgress {
    Pending,
    Routing {
        started: Instant,
    },
    Routed {
        started: Instant,
        finished: Instant,
    },
    Abandoned {
        reason: AbandonReason,
    },
}

impl ModuleProgress {
    pub fn new() -> Self {
        Self::Pending
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            ModuleProgress::Pending => "pending",
            ModuleProgress::Routing { .. } => "routing",
            ModuleProgress::Routed { .. } => "routed",
            ModuleProgress::Abandoned { .. } => "abandoned",
        }
    }

    /// `Pending -> Routing`.
    pub fn start(&mut self) -> Result<Instant, ProgressError> {
        match self {
            ModuleProgress::Pending => {
                let started = Instant::now();
                *self = ModuleProgress::Routing { started };
                Ok(started)
            }
            other => Err(ProgressError {
                state: other.state_name(),
                event: "start",
            }),
        }
    }

    /// `Routing -> Routed`; returns the routing duration.
    pub fn finish(&mut self) -> Result<Duration, ProgressError> {
        match *self {
            ModuleProgress::Routing { started } => {
                let finished = Instant::now();
                *self = ModuleProgress::Routed { started, finished };
                Ok(finished.duration_since(started))
            }
            ref other => Err(ProgressError {
                state: other.state_name(),
                event: "finish",
            }),
        }
    }

    /// `Pending -> Abandoned`. A module that already started routing runs to
    /// completion; only an unreleased gate abandons it.
    pub fn abandon(&mut self, reason: AbandonReason) -> Result<(), ProgressError> {
        match self {
            ModuleProgress::Pending => {
                *self = ModuleProgress::Abandoned { reason };
                Ok(())
            }
            other => Err(ProgressError {
                state: other.state_name(),
                event: "abandon",
            }),
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self, ModuleProgress::Routed { .. })
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, ModuleProgress::Abandoned { .. })
    }

    pub fn started(&self) -> Option<Instant> {
        match *self {
            ModuleProgress::Routing { started } | ModuleProgress::Routed { started, .. } => {
                Some(started)
            }
            _ => None,
        }
    }

    pub fn finished(&self) -> Option<Instant> {
        match *self {
            ModuleProgress::Routed { finished, .. } => Some(finished),
            _ => None,
        }
    }
}

impl Default for ModuleProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dependency() -> ModuleName {
        ModuleName::new("base").expect("name")
    }

    #[test]
    fn happy_path_transitions() {
        let mut progress = ModuleProgress::new();
        assert_eq!(progress.state_name(), "pending");

        progress.start().expect("start");
        assert_eq!(progress.state_name(), "routing");
        assert!(progress.started().is_some());

        let duration = progress.finish().expect("finish");
        assert!(progress.is_routed());
        assert!(progress.finished().expect("finished") >= progress.started().expect("started"));
        assert!(duration >= Duration::ZERO);
    }

    #[test]
    fn routed_is_terminal() {
        let mut progress = ModuleProgress::new();
        progress.start().expect("start");
        progress.finish().expect("finish");

        assert!(progress.start().is_err());
        assert!(progress.finish().is_err());
        assert!(
            progress
                .abandon(AbandonReason::Unsatisfiable {
                    dependency: dependency(),
                })
                .is_err()
        );
    }

    #[test]
    fn finish_requires_start() {
        let mut progress = ModuleProgress::new();
        let error = progress.finish().expect_err("must reject");
        assert_eq!(error.state, "pending");
        assert_eq!(error.event, "finish");
    }

    #[test]
    fn abandon_only_from_pending() {
        let mut progress = ModuleProgress::new();
        progress
            .abandon(AbandonReason::Timeout {
                waited: Duration::from_millis(50),
            })
            .expect("abandon");
        assert!(progress.is_abandoned());

        let mut routing = ModuleProgress::new();
        routing.start().expect("start");
        assert!(
            routing
                .abandon(AbandonReason::Unsatisfiable {
                    dependency: dependency(),
                })
                .is_err()
        );
    }
}
