//! Guarded-set cache.
//!
//! Holds the active guarded apps in memory so the foreground-event path never
//! touches storage for a lookup. Configuration surfaces invalidate the cache
//! through an [`InvalidationChannel`], a shared version counter; the cache
//! only acknowledges the version it actually observed before a successful
//! load, so a `mark_dirty` racing a refresh is never lost.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::storage::Store;
use crate::types::GuardedApp;

/// Versioned invalidation signal shared between the configuration side and
/// the guard engine.
#[derive(Debug, Clone, Default)]
pub struct InvalidationChannel {
    version: Arc<AtomicU64>,
}

impl InvalidationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that the guarded set or settings changed in storage.
    pub fn mark_dirty(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Current invalidation version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

/// In-memory map from app identifier to its guard record.
pub struct GuardedSetCache {
    store: Arc<dyn Store>,
    apps: HashMap<String, GuardedApp>,
    invalidation: InvalidationChannel,
    /// Version observed at the start of the last successful refresh.
    refreshed_version: Option<u64>,
    /// Version the cache is known to reflect. `None` until first cleared.
    acknowledged: Option<u64>,
}

impl GuardedSetCache {
    /// A new cache starts dirty: nothing has been loaded yet.
    pub fn new(store: Arc<dyn Store>, invalidation: InvalidationChannel) -> Self {
        Self {
            store,
            apps: HashMap::new(),
            invalidation,
            refreshed_version: None,
            acknowledged: None,
        }
    }

    /// Reload active apps from storage and swap the map in one step.
    ///
    /// Returns `false` on failure; the previous snapshot is kept.
    pub fn refresh(&mut self) -> bool {
        let observed = self.invalidation.version();
        match self.store.active_guarded_apps() {
            Ok(apps) => {
                self.apps = apps
                    .into_iter()
                    .filter(|app| app.is_active)
                    .map(|app| (app.identifier.clone(), app))
                    .collect();
                self.refreshed_version = Some(observed);
                debug!(count = self.apps.len(), version = observed, "guarded set refreshed");
                true
            }
            Err(e) => {
                self.refreshed_version = None;
                warn!(error = %e, kept = self.apps.len(), "guarded set refresh failed, keeping last snapshot");
                false
            }
        }
    }

    /// O(1) lookup; never performs I/O.
    pub fn lookup(&self, identifier: &str) -> Option<&GuardedApp> {
        self.apps.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.apps.contains_key(identifier)
    }

    pub fn is_dirty(&self) -> bool {
        self.acknowledged != Some(self.invalidation.version())
    }

    /// Acknowledge the version loaded by the last successful refresh.
    ///
    /// No-op when the last refresh failed or nothing was refreshed since the
    /// previous clear.
    pub fn clear_dirty(&mut self) {
        if let Some(version) = self.refreshed_version.take() {
            self.acknowledged = Some(self.acknowledged.map_or(version, |v| v.max(version)));
        }
    }

    pub fn invalidation(&self) -> &InvalidationChannel {
        &self.invalidation
    }

    /// Current snapshot, for reporting and tests.
    pub fn snapshot(&self) -> &HashMap<String, GuardedApp> {
        &self.apps
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
