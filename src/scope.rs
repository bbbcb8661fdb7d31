//! Carriers and scope caches
//!
//! A [`Carrier`] travels with a [`Container`](crate::container::Container)
//! and holds its cancellation token plus, inside a scope, the cache shared by
//! every `Scoped` slot resolved through it.

use crate::slot::SlotId;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Type-erased service instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Per-scope instance cache keyed by slot identity.
///
/// A cell stays empty until its provider succeeds, so a failed resolution can
/// be retried within the same scope.
#[derive(Default)]
pub struct ScopeCache {
    cells: DashMap<SlotId, Arc<OnceCell<Instance>>>,
}

impl ScopeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cell(&self, id: SlotId) -> Arc<OnceCell<Instance>> {
        // clone out so the shard lock is released before the provider runs
        Arc::clone(self.cells.entry(id).or_default().value())
    }

    /// Whether an instance is cached for `id`
    pub fn contains(&self, id: SlotId) -> bool {
        self.cells
            .get(&id)
            .map(|cell| cell.value().get().is_some())
            .unwrap_or(false)
    }

    /// Number of cached instances
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|cell| cell.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ScopeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeCache")
            .field("cached", &self.len())
            .finish()
    }
}

/// Cancellation signal plus optional scope cache
#[derive(Debug, Clone)]
pub struct Carrier {
    cancel: CancellationToken,
    scope: Option<Arc<ScopeCache>>,
}

impl Default for Carrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Carrier {
    /// Root carrier: never cancelled unless asked, no scope
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel, scope: None }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn scope(&self) -> Option<&Arc<ScopeCache>> {
        self.scope.as_ref()
    }

    pub fn has_scope(&self) -> bool {
        self.scope.is_some()
    }
}

/// Derive a carrier with a fresh, empty scope cache.
///
/// The new carrier is cancelled whenever `parent` is, but cancelling it does
/// not affect `parent`.
pub fn new_scope(parent: &Carrier) -> Carrier {
    debug!(nested = parent.has_scope(), "Created scope");
    Carrier {
        cancel: parent.cancel.child_token(),
        scope: Some(Arc::new(ScopeCache::new())),
    }
}
