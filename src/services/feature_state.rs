//! Explicit lifecycle, lock and version state per feature identifier.

use chrono::DateTime;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{ConformanceError, ConformanceResult};
use crate::xml::QName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Present before the run; never touched by the engine
    Unmanaged,
    Inserted,
    Updated,
    Replaced,
    Deleted,
}

impl Lifecycle {
    /// Allowed transitions. Pre-existing features may be modified directly.
    pub fn can_become(&self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        match (self, next) {
            (Deleted, _) | (_, Unmanaged) => false,
            (Inserted | Updated | Replaced, Inserted) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked { lock_id: String, expires_at: Instant },
}

/// Opaque version label with the ordering services commonly use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLabel(pub String);

impl VersionLabel {
    /// Whether `self` is a valid successor of `previous`: integers and
    /// timestamps must increase; other labels must merely differ. Reuse of
    /// an older label is caught by [`FeatureStateTable::record_version`].
    pub fn succeeds(&self, previous: &VersionLabel) -> bool {
        let (current, previous) = (self.0.trim(), previous.0.trim());
        if let (Ok(a), Ok(b)) = (current.parse::<u64>(), previous.parse::<u64>()) {
            return a > b;
        }
        if let (Ok(a), Ok(b)) = (
            DateTime::parse_from_rfc3339(current),
            DateTime::parse_from_rfc3339(previous),
        ) {
            return a > b;
        }
        current != previous
    }
}

#[derive(Debug, Clone)]
pub struct FeatureState {
    pub type_name: QName,
    pub lifecycle: Lifecycle,
    pub lock: LockState,
    /// Every version label observed, oldest first
    pub versions: Vec<VersionLabel>,
    /// Inserted by this run, so removed again at teardown
    pub created: bool,
}

impl FeatureState {
    fn new(type_name: QName, lifecycle: Lifecycle) -> Self {
        Self {
            type_name,
            lifecycle,
            lock: LockState::Unlocked,
            versions: Vec::new(),
            created: false,
        }
    }

    pub fn current_version(&self) -> Option<&VersionLabel> {
        self.versions.last()
    }
}

/// Identifier to state, shared by every test in the run.
#[derive(Debug, Default)]
pub struct FeatureStateTable {
    states: Mutex<HashMap<String, FeatureState>>,
}

impl FeatureStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HashMap<String, FeatureState>) -> R) -> R {
        let mut states = self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut states)
    }

    pub fn get(&self, id: &str) -> Option<FeatureState> {
        self.with(|states| states.get(id).cloned())
    }

    pub fn lifecycle(&self, id: &str) -> Lifecycle {
        self.get(id).map_or(Lifecycle::Unmanaged, |s| s.lifecycle)
    }

    /// Move `id` to `next`, registering unknown ids as pre-existing features.
    pub fn transition(&self, id: &str, type_name: &QName, next: Lifecycle) -> ConformanceResult<()> {
        self.with(|states| {
            let state = states
                .entry(id.to_string())
                .or_insert_with(|| FeatureState::new(type_name.clone(), Lifecycle::Unmanaged));
            if !state.lifecycle.can_become(next) {
                return Err(ConformanceError::business_rule(format!(
                    "Feature {} cannot go from {:?} to {:?}",
                    id, state.lifecycle, next
                )));
            }
            state.lifecycle = next;
            if next == Lifecycle::Inserted {
                state.created = true;
            }
            if next == Lifecycle::Deleted {
                state.lock = LockState::Unlocked;
            }
            Ok(())
        })
    }

    /// Record a version label, asserting it advances on the previous one
    /// and was never seen before for this feature.
    pub fn record_version(&self, id: &str, type_name: &QName, label: VersionLabel) -> ConformanceResult<()> {
        self.with(|states| {
            let state = states
                .entry(id.to_string())
                .or_insert_with(|| FeatureState::new(type_name.clone(), Lifecycle::Unmanaged));
            if state.versions.iter().any(|seen| seen.0.trim() == label.0.trim()) {
                return Err(ConformanceError::business_rule(format!(
                    "Version label {} of {} was reused",
                    label.0, id
                )));
            }
            if let Some(previous) = state.current_version()
                && !label.succeeds(previous)
            {
                return Err(ConformanceError::business_rule(format!(
                    "Version of {} did not advance: {} after {}",
                    id, label.0, previous.0
                )));
            }
            state.versions.push(label);
            Ok(())
        })
    }

    pub fn lock(&self, ids: &[String], type_name: &QName, lock_id: &str, expiry: Duration) {
        let expires_at = Instant::now() + expiry;
        self.with(|states| {
            for id in ids {
                let state = states
                    .entry(id.clone())
                    .or_insert_with(|| FeatureState::new(type_name.clone(), Lifecycle::Unmanaged));
                state.lock = LockState::Locked {
                    lock_id: lock_id.to_string(),
                    expires_at,
                };
            }
        })
    }

    pub fn unlock(&self, lock_id: &str) -> Vec<String> {
        self.with(|states| {
            let mut released = Vec::new();
            for (id, state) in states.iter_mut() {
                if matches!(&state.lock, LockState::Locked { lock_id: held, .. } if held == lock_id) {
                    state.lock = LockState::Unlocked;
                    released.push(id.clone());
                }
            }
            released
        })
    }

    /// Lock currently held on `id`, ignoring expired ones.
    pub fn lock_of(&self, id: &str) -> Option<String> {
        self.get(id).and_then(|s| match s.lock {
            LockState::Locked {
                lock_id,
                expires_at,
            } if expires_at > Instant::now() => Some(lock_id),
            _ => None,
        })
    }

    /// Drop everything known about `id`, e.g. after it was re-inserted.
    pub fn forget(&self, id: &str) {
        self.with(|states| states.remove(id));
    }

    /// Identifiers inserted during the run and not yet deleted.
    pub fn live_inserted(&self) -> Vec<(String, QName)> {
        self.with(|states| {
            let mut found: Vec<(String, QName)> = states
                .iter()
                .filter(|(_, s)| s.created && s.lifecycle != Lifecycle::Deleted)
                .map(|(id, s)| (id.clone(), s.type_name.clone()))
                .collect();
            found.sort_by(|a, b| a.0.cmp(&b.0));
            found
        })
    }
}
