//! Slot-based service container
//!
//! Services are registered against a typed [`Slot`] with a provider closure
//! and a [`Strategy`], then resolved by slot:
//!
//! ```
//! use std::sync::Arc;
//! use svckit::container::{Container, Strategy};
//! use svckit::slot::Slot;
//!
//! struct Database { url: String }
//! struct Repo { db: Arc<Database> }
//!
//! let db: Slot<Arc<Database>> = Slot::new(&["db"]);
//! let repo: Slot<Arc<Repo>> = Slot::new(&["repo"]);
//!
//! let container = Container::new();
//! container.bind(db, Strategy::Singleton, |_| {
//!     Ok(Arc::new(Database { url: "postgres://localhost".into() }))
//! });
//! container.bind(repo, Strategy::Transient, move |c| {
//!     Ok(Arc::new(Repo { db: c.resolve(db)? }))
//! });
//!
//! let resolved = container.required(repo);
//! assert_eq!(resolved.db.url, "postgres://localhost");
//! ```
//!
//! Providers receive a container that remembers the resolution path, so a
//! dependency cycle is reported as an error instead of recursing forever.
//! Cycles that span threads (two threads each initialising one end of a
//! cyclic pair of cached slots) are caught by a wait graph of in-flight
//! initialisations and reported the same way.

use crate::error::{AlreadyBound, ProviderFailure, ResolveError};
use crate::scope::{new_scope, Carrier, Instance};
use crate::slot::{Slot, SlotId};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Condvar, Mutex, RwLock};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, trace, warn};

/// Lifetime of the instances a provider produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// One instance for the container; the provider runs at most once
    Singleton,
    /// A new instance per resolution
    Transient,
    /// One instance per scope (see [`new_scope`])
    Scoped,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Singleton => write!(f, "singleton"),
            Strategy::Transient => write!(f, "transient"),
            Strategy::Scoped => write!(f, "scoped"),
        }
    }
}

type ErasedProvider = Arc<dyn Fn(&Container) -> anyhow::Result<Instance> + Send + Sync>;

struct Binding {
    provider: ErasedProvider,
    strategy: Strategy,
    singleton: OnceCell<Result<Instance, ResolveError>>,
}

impl Binding {
    fn new(provider: ErasedProvider, strategy: Strategy) -> Self {
        Self {
            provider,
            strategy,
            singleton: OnceCell::new(),
        }
    }
}

static IN_FLIGHT: Lazy<InFlight> = Lazy::new(InFlight::default);

/// Cached cells currently being initialised, and which thread waits on which.
///
/// Cells are keyed by address; an entry only lives while its owner holds the
/// [`OwnerGuard`], which keeps the cell alive.
#[derive(Default)]
struct InFlight {
    state: Mutex<WaitGraph>,
    released: Condvar,
}

#[derive(Default)]
struct WaitGraph {
    owners: HashMap<usize, ThreadId>,
    waiting: HashMap<ThreadId, usize>,
}

impl WaitGraph {
    /// Whether following owner -> awaited cell -> its owner from `owner`
    /// reaches `me`
    fn reaches(&self, mut owner: ThreadId, me: ThreadId) -> bool {
        for _ in 0..=self.owners.len() {
            if owner == me {
                return true;
            }
            match self.waiting.get(&owner).and_then(|key| self.owners.get(key)) {
                Some(next) => owner = *next,
                None => return false,
            }
        }
        false
    }
}

/// Released when the owning thread is done with a cell
struct OwnerGuard {
    key: usize,
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        IN_FLIGHT.state.lock().owners.remove(&self.key);
        IN_FLIGHT.released.notify_all();
    }
}

impl InFlight {
    /// Wait until the cell at `key` is ready or free to initialise.
    ///
    /// Returns a guard when the caller must initialise it, `None` when
    /// `ready` reports a stored value, and `Err` when waiting would close a
    /// cycle through other threads.
    fn claim(&self, key: usize, ready: impl Fn() -> bool) -> Result<Option<OwnerGuard>, ()> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            if ready() {
                return Ok(None);
            }
            let owner = match state.owners.get(&key) {
                None => {
                    state.owners.insert(key, me);
                    return Ok(Some(OwnerGuard { key }));
                }
                Some(owner) => *owner,
            };
            if state.reaches(owner, me) {
                return Err(());
            }
            state.waiting.insert(me, key);
            self.released.wait(&mut state);
            state.waiting.remove(&me);
        }
    }
}

fn cell_key<T>(cell: &OnceCell<T>) -> usize {
    cell as *const OnceCell<T> as usize
}

/// Node of the persistent resolution path (innermost slot first)
struct PathNode {
    id: SlotId,
    parent: Option<Arc<PathNode>>,
}

/// Values that may be "nil" for [`Container::required`].
///
/// Only `Option::None` is nil. Scalars, strings, smart pointers and the std
/// collections are never nil; for your own types use
/// [`impl_never_nil!`](crate::impl_never_nil):
///
/// ```
/// struct Settings { retries: u32 }
/// svckit::impl_never_nil!(Settings);
/// ```
pub trait Nullable {
    fn is_nil(&self) -> bool;
}

impl<T> Nullable for Option<T> {
    fn is_nil(&self) -> bool {
        self.is_none()
    }
}

/// Implement [`Nullable`] for types that can never be nil
#[macro_export]
macro_rules! impl_never_nil {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::container::Nullable for $ty {
            fn is_nil(&self) -> bool {
                false
            }
        }
    )+};
}

impl_never_nil! {
    (), bool, char,
    i8, i16, i32, i64, i128, isize,
    u8, u16, u32, u64, u128, usize,
    f32, f64,
    String, &'static str,
    std::path::PathBuf,
    std::time::Duration,
    std::net::IpAddr,
    std::net::SocketAddr,
    url::Url,
}

macro_rules! never_nil_generic {
    ($(<$($param:ident $(: ?$unsized:ident)?),+> $ty:ty),+ $(,)?) => {$(
        impl<$($param $(: ?$unsized)?),+> Nullable for $ty {
            fn is_nil(&self) -> bool {
                false
            }
        }
    )+};
}

never_nil_generic! {
    <T: ?Sized> Arc<T>,
    <T: ?Sized> Box<T>,
    <T> Vec<T>,
    <T> std::collections::VecDeque<T>,
    <T> std::collections::BTreeSet<T>,
    <K, V> std::collections::BTreeMap<K, V>,
    <T, S> std::collections::HashSet<T, S>,
    <K, V, S> HashMap<K, V, S>,
}

/// Registry of slot bindings.
///
/// Cloning is cheap and shares the binding map. Bindings are expected to be
/// registered at startup; resolution may then happen from any thread.
#[derive(Clone, Default)]
pub struct Container {
    bindings: Arc<RwLock<HashMap<SlotId, Arc<Binding>>>>,
    carrier: Carrier,
    path: Option<Arc<PathNode>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same bindings, resolved through `carrier`
    pub fn with_carrier(&self, carrier: Carrier) -> Self {
        Self {
            bindings: Arc::clone(&self.bindings),
            carrier,
            path: self.path.clone(),
        }
    }

    /// Same bindings inside a fresh scope
    pub fn scoped(&self) -> Self {
        self.with_carrier(new_scope(&self.carrier))
    }

    pub fn carrier(&self) -> &Carrier {
        &self.carrier
    }

    /// Fail if the carrier has been cancelled.
    ///
    /// Meant to be called by providers before doing expensive work.
    pub fn ensure_active(&self) -> Result<(), ResolveError> {
        if self.carrier.is_cancelled() {
            let slot = match &self.path {
                Some(node) => node.id.to_string(),
                None => "<root>".to_string(),
            };
            return Err(ResolveError::Cancelled { slot });
        }
        Ok(())
    }

    /// Register `provider` for `slot`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already bound; use [`Container::try_bind`] to
    /// get an error instead.
    pub fn bind<T, F>(&self, slot: Slot<T>, strategy: Strategy, provider: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        if let Err(err) = self.try_bind(slot, strategy, provider) {
            panic!("{}", err);
        }
    }

    pub fn try_bind<T, F>(&self, slot: Slot<T>, strategy: Strategy, provider: F) -> Result<(), AlreadyBound>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert(slot.id(), strategy, erase(provider), false)
    }

    /// Register `provider` for `slot`, replacing any existing binding
    pub fn override_binding<T, F>(&self, slot: Slot<T>, strategy: Strategy, provider: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        // replacement never conflicts
        let _ = self.insert(slot.id(), strategy, erase(provider), true);
    }

    pub fn is_bound<T>(&self, slot: Slot<T>) -> bool {
        self.bindings.read().contains_key(&slot.id())
    }

    fn insert(
        &self,
        id: SlotId,
        strategy: Strategy,
        provider: ErasedProvider,
        replace: bool,
    ) -> Result<(), AlreadyBound> {
        let mut bindings = self.bindings.write();
        if !replace && bindings.contains_key(&id) {
            return Err(AlreadyBound {
                slot: id.to_string(),
            });
        }
        let previous = bindings.insert(id, Arc::new(Binding::new(provider, strategy)));
        debug!(slot = %id, strategy = %strategy, replaced = previous.is_some(), "Bound slot");
        Ok(())
    }

    /// Resolve `slot`, returning any failure as an error.
    ///
    /// # Panics
    ///
    /// Panics if the stored instance is not a `T`. Typed [`Container::bind`]
    /// rules this out; it only happens when bindings are registered untyped.
    pub fn resolve<T>(&self, slot: Slot<T>) -> Result<T, ResolveError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let instance = self.resolve_erased(slot.id())?;
        match instance.downcast_ref::<T>() {
            Some(value) => Ok(value.clone()),
            None => panic!("type mismatch for slot {}: expected {}", slot.tag(), type_name::<T>()),
        }
    }

    /// Resolve `slot`; a nil result is allowed.
    ///
    /// # Panics
    ///
    /// Panics on any resolution error.
    pub fn optional<T>(&self, slot: Slot<T>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.resolve(slot) {
            Ok(value) => value,
            Err(err) => panic!("{}", err),
        }
    }

    /// Resolve `slot` and insist on a non-nil result.
    ///
    /// # Panics
    ///
    /// Panics on any resolution error or when the value is nil.
    pub fn required<T>(&self, slot: Slot<T>) -> T
    where
        T: Nullable + Clone + Send + Sync + 'static,
    {
        let value = self.optional(slot);
        if value.is_nil() {
            panic!("required slot {} resolved to a nil value", slot.tag());
        }
        value
    }

    fn resolve_erased(&self, id: SlotId) -> Result<Instance, ResolveError> {
        let binding = self
            .bindings
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| ResolveError::Unbound {
                slot: id.to_string(),
            })?;

        if self.in_path(id) {
            return Err(ResolveError::Cycle {
                slot: id.to_string(),
                path: self.describe_path(id),
            });
        }

        trace!(slot = %id, strategy = %binding.strategy, "Resolving slot");

        // providers see the path extended by this slot; it is popped when
        // `proxy` goes out of scope
        let proxy = Container {
            bindings: Arc::clone(&self.bindings),
            carrier: self.carrier.clone(),
            path: Some(Arc::new(PathNode {
                id,
                parent: self.path.clone(),
            })),
        };

        match binding.strategy {
            Strategy::Transient => proxy.invoke(id, &binding),
            Strategy::Singleton => {
                let cell = &binding.singleton;
                if let Some(done) = cell.get() {
                    return done.clone();
                }
                let _owner = self.claim(id, cell)?;
                cell.get_or_init(|| proxy.invoke(id, &binding)).clone()
            }
            Strategy::Scoped => {
                let scope = self.carrier.scope().ok_or_else(|| ResolveError::ScopeMissing {
                    slot: id.to_string(),
                })?;
                let cell = scope.cell(id);
                if let Some(done) = cell.get() {
                    return Ok(done.clone());
                }
                let _owner = self.claim(id, &*cell)?;
                cell.get_or_try_init(|| proxy.invoke(id, &binding)).cloned()
            }
        }
    }

    /// Become the initialiser of `cell`, or wait for the thread that already is
    fn claim<T>(&self, id: SlotId, cell: &OnceCell<T>) -> Result<Option<OwnerGuard>, ResolveError> {
        IN_FLIGHT
            .claim(cell_key(cell), || cell.get().is_some())
            .map_err(|()| {
                warn!(slot = %id, "Cross-thread dependency cycle detected");
                ResolveError::Cycle {
                    slot: id.to_string(),
                    path: format!("{} (in progress on another thread)", self.describe_path(id)),
                }
            })
    }

    fn invoke(&self, id: SlotId, binding: &Binding) -> Result<Instance, ResolveError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (binding.provider)(self))) {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(err)) => Err(ResolveError::Provider {
                slot: id.to_string(),
                source: into_failure(err),
            }),
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                warn!(slot = %id, panic = %detail, "Provider panicked");
                Err(ResolveError::ProviderPanic {
                    slot: id.to_string(),
                    detail,
                })
            }
        }
    }

    fn in_path(&self, id: SlotId) -> bool {
        let mut node = self.path.as_deref();
        while let Some(current) = node {
            if current.id == id {
                return true;
            }
            node = current.parent.as_deref();
        }
        false
    }

    /// Render the current path (outermost first) followed by `next`
    fn describe_path(&self, next: SlotId) -> String {
        let mut ids = vec![next];
        let mut node = self.path.as_deref();
        while let Some(current) = node {
            ids.push(current.id);
            node = current.parent.as_deref();
        }
        ids.iter()
            .rev()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.bindings.read().len())
            .field("carrier", &self.carrier)
            .finish_non_exhaustive()
    }
}

fn erase<T, F>(provider: F) -> ErasedProvider
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Arc::new(move |container: &Container| {
        provider(container).map(|value| Arc::new(value) as Instance)
    })
}

/// Keep nested resolution errors typed so callers can inspect them
fn into_failure(err: anyhow::Error) -> ProviderFailure {
    match err.downcast::<ResolveError>() {
        Ok(resolve) => Arc::new(resolve),
        Err(other) => Arc::from(Box::<dyn std::error::Error + Send + Sync>::from(other)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Leaf {
        id: u32,
    }

    #[test]
    fn test_transient_runs_every_time() {
        let container = Container::new();
        let slot: Slot<u32> = Slot::new(&["counter"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        container.bind(slot, Strategy::Transient, move |_| {
            Ok(counter.fetch_add(1, Ordering::SeqCst) as u32)
        });

        for expected in 0..5 {
            assert_eq!(container.resolve(slot).unwrap(), expected);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_singleton_concurrent_single_call() {
        let container = Container::new();
        let slot: Slot<Arc<Leaf>> = Slot::new(&["leaf"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        container.bind(slot, Strategy::Singleton, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(Leaf { id: 7 }))
        });

        let results: Vec<Arc<Leaf>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| container.resolve(slot).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|leaf| Arc::ptr_eq(leaf, &results[0])));
    }

    #[test]
    fn test_singleton_caches_failure() {
        let container = Container::new();
        let slot: Slot<u32> = Slot::new(&["flaky"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        container.bind(slot, Strategy::Singleton, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("backend unavailable")
        });

        let first = container.resolve(slot).unwrap_err();
        let second = container.resolve(slot).unwrap_err();
        assert!(first.to_string().contains("backend unavailable"));
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_partition() {
        let container = Container::new();
        let slot: Slot<Arc<Leaf>> = Slot::new(&["request"]);
        let next = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&next);
        container.bind(slot, Strategy::Scoped, move |_| {
            Ok(Arc::new(Leaf {
                id: counter.fetch_add(1, Ordering::SeqCst) as u32,
            }))
        });

        let first = container.scoped();
        let second = container.scoped();
        let a1 = first.resolve(slot).unwrap();
        let a2 = first.resolve(slot).unwrap();
        let b = second.resolve(slot).unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(next.load(Ordering::SeqCst), 2);
        assert!(first.carrier().scope().unwrap().contains(slot.id()));
    }

    #[test]
    fn test_scoped_without_scope() {
        let container = Container::new();
        let slot: Slot<u8> = Slot::new(&["session"]);
        container.bind(slot, Strategy::Scoped, |_| Ok(1));

        let err = container.resolve(slot).unwrap_err();
        assert!(matches!(err, ResolveError::ScopeMissing { .. }));
        assert_eq!(err.to_string(), "no scope available for slot session@u8");
    }

    #[test]
    fn test_scoped_failure_is_retried() {
        let container = Container::new();
        let slot: Slot<u32> = Slot::new(&["retry"]);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        container.bind(slot, Strategy::Scoped, move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("first attempt fails");
            }
            Ok(99)
        });

        let scope = container.scoped();
        assert!(scope.resolve(slot).is_err());
        assert!(!scope.carrier().scope().unwrap().contains(slot.id()));
        assert_eq!(scope.resolve(slot).unwrap(), 99);
        assert_eq!(scope.resolve(slot).unwrap(), 99);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unbound_names_slot() {
        let container = Container::new();
        let slot: Slot<Leaf> = Slot::new(&["missing"]);
        let err = container.resolve(slot).unwrap_err();
        assert!(matches!(err, ResolveError::Unbound { .. }));
        assert!(err.to_string().contains("missing@"));
    }

    #[test]
    fn test_cycle_detected() {
        let container = Container::new();
        let x: Slot<u32> = Slot::new(&["x"]);
        let y: Slot<u32> = Slot::new(&["y"]);
        let completed = Arc::new(AtomicUsize::new(0));

        let done = Arc::clone(&completed);
        container.bind(x, Strategy::Transient, move |c| {
            let value = c.resolve(y)?;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        });
        let done = Arc::clone(&completed);
        container.bind(y, Strategy::Transient, move |c| {
            let value = c.resolve(x)?;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        });

        let err = container.resolve(x).unwrap_err();
        let message = err.to_string();
        assert!(err.is_cycle());
        assert!(message.contains("circular"));
        assert!(message.contains("x@u32"));
        assert!(message.contains("x@u32 -> y@u32 -> x@u32"));
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_self_cycle_singleton_does_not_deadlock() {
        let container = Container::new();
        let slot: Slot<u32> = Slot::new(&["selfish"]);
        container.bind(slot, Strategy::Singleton, move |c| Ok(c.resolve(slot)? + 1));

        assert!(container.resolve(slot).unwrap_err().is_cycle());
    }

    #[test]
    fn test_panic_is_isolated() {
        let container = Container::new();
        let bad: Slot<u32> = Slot::new(&["bad"]);
        let good: Slot<u32> = Slot::new(&["good"]);
        container.bind(bad, Strategy::Transient, |_| -> anyhow::Result<u32> {
            panic!("boom at startup")
        });
        container.bind(good, Strategy::Transient, |_| Ok(5));

        let err = container.resolve(bad).unwrap_err();
        match &err {
            ResolveError::ProviderPanic { detail, .. } => assert_eq!(detail, "boom at startup"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err
            .to_string()
            .starts_with("panic during provider call for slot bad@u32"));
        assert_eq!(container.resolve(good).unwrap(), 5);
    }

    #[test]
    fn test_override_replaces_provider() {
        let container = Container::new();
        let slot: Slot<&'static str> = Slot::new(&["greeting"]);
        container.bind(slot, Strategy::Transient, |_| Ok("hello"));
        assert_eq!(container.resolve(slot).unwrap(), "hello");

        container.override_binding(slot, Strategy::Transient, |_| Ok("bonjour"));
        assert_eq!(container.resolve(slot).unwrap(), "bonjour");
    }

    #[test]
    fn test_try_bind_twice() {
        let container = Container::new();
        let slot: Slot<u8> = Slot::new(&["twice"]);
        container.try_bind(slot, Strategy::Transient, |_| Ok(1)).unwrap();
        let err = container.try_bind(slot, Strategy::Transient, |_| Ok(2)).unwrap_err();
        assert_eq!(err.slot, "twice@u8");
        assert!(container.is_bound(slot));
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn test_bind_twice_panics() {
        let container = Container::new();
        let slot: Slot<u8> = Slot::new(&["dup"]);
        container.bind(slot, Strategy::Transient, |_| Ok(1));
        container.bind(slot, Strategy::Transient, |_| Ok(2));
    }

    #[test]
    fn test_optional_allows_nil() {
        let container = Container::new();
        let slot: Slot<Option<Arc<Leaf>>> = Slot::new(&["maybe"]);
        container.bind(slot, Strategy::Transient, |_| Ok(None));
        assert_eq!(container.optional(slot), None);
    }

    #[test]
    #[should_panic(expected = "nil value")]
    fn test_required_rejects_nil() {
        let container = Container::new();
        let slot: Slot<Option<Arc<Leaf>>> = Slot::new(&["maybe"]);
        container.bind(slot, Strategy::Transient, |_| Ok(None));
        container.required(slot);
    }

    #[test]
    #[should_panic(expected = "no provider bound")]
    fn test_optional_panics_on_error() {
        let container = Container::new();
        let slot: Slot<u8> = Slot::new(&["absent"]);
        container.optional(slot);
    }

    #[test]
    #[should_panic(expected = "type mismatch for slot mismatch@u32: expected u32")]
    fn test_type_mismatch_is_fatal() {
        let container = Container::new();
        let slot: Slot<u32> = Slot::new(&["mismatch"]);
        let provider: ErasedProvider = Arc::new(|_: &Container| -> anyhow::Result<Instance> {
            Ok(Arc::new("text".to_string()) as Instance)
        });
        container
            .insert(slot.id(), Strategy::Transient, provider, false)
            .unwrap();

        let _ = container.resolve(slot);
    }

    #[test]
    fn test_cancelled_carrier_fails_early() {
        let container = Container::new();
        let slot: Slot<u32> = Slot::new(&["expensive"]);
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        container.bind(slot, Strategy::Scoped, move |c| {
            c.ensure_active()?;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });

        let scope = container.scoped();
        scope.carrier().cancel();
        let err = scope.resolve(slot).unwrap_err();
        match err {
            ResolveError::Provider { source, .. } => {
                let inner = source.downcast_ref::<ResolveError>().unwrap();
                assert!(matches!(inner, ResolveError::Cancelled { slot } if slot == "expensive@u32"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(container.ensure_active().is_ok());
    }

    #[derive(Debug, Clone)]
    struct Settings {
        retries: u32,
    }

    crate::impl_never_nil!(Settings);

    #[test]
    fn test_required_accepts_never_nil_types() {
        let container = Container::new();
        let count: Slot<u32> = Slot::new(&["count"]);
        let names: Slot<HashMap<String, u16>> = Slot::new(&["names"]);
        let settings: Slot<Settings> = Slot::new(&["settings"]);
        container.bind(count, Strategy::Transient, |_| Ok(0));
        container.bind(names, Strategy::Transient, |_| Ok(HashMap::new()));
        container.bind(settings, Strategy::Singleton, |_| Ok(Settings { retries: 3 }));

        assert_eq!(container.required(count), 0);
        assert!(container.required(names).is_empty());
        assert_eq!(container.required(settings).retries, 3);
    }

    #[test]
    fn test_scoped_cycle_across_threads() {
        let container = Container::new();
        let x: Slot<u32> = Slot::new(&["scoped-cycle", "x"]);
        let y: Slot<u32> = Slot::new(&["scoped-cycle", "y"]);
        // both providers must be running before either reaches for the other;
        // a retried provider passes straight through
        let arrived = Arc::new(AtomicUsize::new(0));
        let rendezvous = |arrived: &AtomicUsize| {
            arrived.fetch_add(1, Ordering::SeqCst);
            while arrived.load(Ordering::SeqCst) < 2 {
                std::thread::yield_now();
            }
        };

        let gate = Arc::clone(&arrived);
        container.bind(x, Strategy::Scoped, move |c| {
            rendezvous(&gate);
            Ok(c.resolve(y)? + 1)
        });
        let gate = Arc::clone(&arrived);
        container.bind(y, Strategy::Scoped, move |c| {
            rendezvous(&gate);
            Ok(c.resolve(x)? + 1)
        });

        let scope = container.scoped();
        let (tx, rx) = std::sync::mpsc::channel();
        for slot in [x, y] {
            let scope = scope.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                let _ = tx.send(scope.resolve(slot));
            });
        }

        for _ in 0..2 {
            let outcome = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("resolution never returned");
            assert!(outcome.unwrap_err().is_cycle());
        }
        // failures are not cached in a scope
        assert!(!scope.carrier().scope().unwrap().contains(x.id()));
    }

    #[test]
    fn test_wait_graph_reaches() {
        let me = thread::current().id();
        let other = std::thread::spawn(|| thread::current().id()).join().unwrap();
        let mut graph = WaitGraph::default();
        graph.owners.insert(1, me);
        graph.owners.insert(2, other);
        assert!(!graph.reaches(other, me));

        graph.waiting.insert(other, 1);
        assert!(graph.reaches(other, me));
        assert!(graph.reaches(me, me));
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::Singleton.to_string(), "singleton");
        assert_eq!(Strategy::Scoped.to_string(), "scoped");
    }
}
