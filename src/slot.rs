//! Typed slot identities
//!
//! A [`Slot<T>`] names a service of type `T` in a
//! [`Container`](crate::container::Container). Slots are cheap `Copy`
//! handles; their human readable tag lives in a process-wide registry and is
//! only used for diagnostics.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::type_name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static TAGS: Lazy<DashMap<SlotId, String>> = Lazy::new(DashMap::new);

/// Untyped identity of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl SlotId {
    fn next() -> Self {
        SlotId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Registered tag, if any
    pub fn tag(self) -> Option<String> {
        TAGS.get(&self).map(|tag| tag.value().clone())
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match TAGS.get(self) {
            Some(tag) => f.write_str(tag.value()),
            None => write!(f, "slot#{:x}", self.0),
        }
    }
}

/// Identity of a service of type `T`
pub struct Slot<T> {
    id: SlotId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Slot<T> {
    /// Mint a new slot tagged `"a.b@<type>"` (or `"@<type>"` with no segments).
    ///
    /// Slots are `Copy`, so their tags are never freed automatically: the
    /// registry grows by one entry per call. Mint slots once at startup;
    /// code that mints them per request should use
    /// [`Slot::unregistered`] or call [`Slot::forget_tag`] when done.
    pub fn new(segments: &[&str]) -> Self {
        let id = SlotId::next();
        TAGS.insert(id, format!("{}@{}", segments.join("."), type_name::<T>()));
        Self::from_id(id)
    }

    /// Mint a slot without registering a tag; diagnostics show its raw id
    pub fn unregistered() -> Self {
        Self::from_id(SlotId::next())
    }
}

impl<T> Slot<T> {
    fn from_id(id: SlotId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Diagnostic name of this slot
    pub fn tag(&self) -> String {
        self.id.to_string()
    }

    /// Drop this slot's registered tag; it shows as `slot#<id>` afterwards,
    /// for every copy
    pub fn forget_tag(&self) {
        TAGS.remove(&self.id);
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Slot<T> {}

impl<T> Hash for Slot<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&self.tag()).finish()
    }
}

impl<T> fmt::Display for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

/// Shorthand for [`Slot::new`]
pub fn new_slot<T: 'static>(segments: &[&str]) -> Slot<T> {
    Slot::new(segments)
}
