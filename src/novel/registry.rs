//! In-process registry of running projects
//!
//! One entry per project currently generating, holding its stop signal.
//! Runs of different projects share nothing else.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use super::types::ControlRequest;
use crate::types::{NovelError, ProjectId, Result};

/// Cooperative stop flag polled between stages
#[derive(Debug, Default)]
pub struct StopSignal(AtomicU8);

impl StopSignal {
    const NONE: u8 = 0;
    const PAUSE: u8 = 1;
    const CANCEL: u8 = 2;

    pub fn request(&self, request: ControlRequest) {
        let value = match request {
            ControlRequest::Pause => Self::PAUSE,
            ControlRequest::Cancel => Self::CANCEL,
        };
        // cancel is never downgraded to pause
        self.0.fetch_max(value, Ordering::SeqCst);
    }

    pub fn requested(&self) -> Option<ControlRequest> {
        match self.0.load(Ordering::SeqCst) {
            Self::PAUSE => Some(ControlRequest::Pause),
            Self::CANCEL => Some(ControlRequest::Cancel),
            _ => None,
        }
    }

    pub fn clear(&self) {
        self.0.store(Self::NONE, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    runs: Arc<DashMap<ProjectId, Arc<StopSignal>>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a project for a run; fails if it is already running here
    pub fn register(&self, id: &ProjectId) -> Result<RunGuard> {
        match self.runs.entry(id.clone()) {
            Entry::Occupied(_) => Err(NovelError::invalid_transition("generating", "start")),
            Entry::Vacant(v) => {
                let signal = Arc::new(StopSignal::default());
                v.insert(Arc::clone(&signal));
                Ok(RunGuard {
                    id: id.clone(),
                    signal,
                    runs: Arc::clone(&self.runs),
                })
            }
        }
    }

    /// Signal a running project; false when it is not running in this process
    pub fn signal(&self, id: &ProjectId, request: ControlRequest) -> bool {
        match self.runs.get(id) {
            Some(signal) => {
                signal.request(request);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: &ProjectId) -> bool {
        self.runs.contains_key(id)
    }

    pub fn running_count(&self) -> usize {
        self.runs.len()
    }
}

/// Unregisters the project when the run ends, however it ends
#[derive(Debug)]
pub struct RunGuard {
    id: ProjectId,
    signal: Arc<StopSignal>,
    runs: Arc<DashMap<ProjectId, Arc<StopSignal>>>,
}

impl RunGuard {
    pub fn signal(&self) -> &StopSignal {
        &self.signal
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_start_rejected() {
        let registry = ProjectRegistry::new();
        let id = ProjectId::new("p1");
        let guard = registry.register(&id).unwrap();
        assert!(matches!(
            registry.register(&id),
            Err(NovelError::InvalidTransition { .. })
        ));
        drop(guard);
        assert!(!registry.is_running(&id));
        assert!(registry.register(&id).is_ok());
    }

    #[test]
    fn test_signal_reaches_guard() {
        let registry = ProjectRegistry::new();
        let id = ProjectId::new("p1");
        let guard = registry.register(&id).unwrap();
        assert!(guard.signal().requested().is_none());
        assert!(registry.signal(&id, ControlRequest::Cancel));
        assert!(registry.signal(&id, ControlRequest::Pause));
        assert_eq!(guard.signal().requested(), Some(ControlRequest::Cancel));
        let other = ProjectId::new("other");
        assert!(!registry.signal(&other, ControlRequest::Pause));
    }

    #[test]
    fn test_projects_are_independent() {
        let registry = ProjectRegistry::new();
        let a = registry.register(&ProjectId::new("a")).unwrap();
        let b = registry.register(&ProjectId::new("b")).unwrap();
        registry.signal(&ProjectId::new("a"), ControlRequest::Pause);
        assert_eq!(a.signal().requested(), Some(ControlRequest::Pause));
        assert!(b.signal().requested().is_none());
        assert_eq!(registry.running_count(), 2);
    }
}
