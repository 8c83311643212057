//! Token-addressed object tables.
//!
//! Every native object lives in a [`Registry`] and is reachable only through
//! its [`RawRef`]. Token values come from one process-wide counter and are
//! never reused, so a token that outlived its object is a guaranteed miss
//! rather than a dangling reference to something else.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque reference to a native object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawRef(NonZeroU64);

impl RawRef {
    fn next() -> Self {
        let id = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        // Starts at 1 and only grows; u64 does not wrap in practice.
        RawRef(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawRef({:#x})", self.0.get())
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Registry<T> {
    kind: &'static str,
    objects: Mutex<HashMap<RawRef, Arc<Mutex<T>>>>,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, value: T) -> RawRef {
        let raw = RawRef::next();
        lock(&self.objects).insert(raw, Arc::new(Mutex::new(value)));
        tracing::debug!(kind = self.kind, token = raw.get(), "native alloc");
        raw
    }

    /// Remove an object from the table. The table lock is released before
    /// the caller drops the returned object.
    pub fn remove(&self, raw: RawRef) -> Option<Arc<Mutex<T>>> {
        let removed = lock(&self.objects).remove(&raw);
        if removed.is_some() {
            tracing::debug!(kind = self.kind, token = raw.get(), "native free");
        }
        removed
    }

    pub fn get(&self, raw: RawRef) -> Option<Arc<Mutex<T>>> {
        lock(&self.objects).get(&raw).cloned()
    }

    pub fn contains(&self, raw: RawRef) -> bool {
        lock(&self.objects).contains_key(&raw)
    }

    /// Run `f` on the object. Only the object's own lock is held while `f`
    /// runs, so `f` may reach into other registries.
    pub fn with<R>(&self, raw: RawRef, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let object = self.get(raw)?;
        let mut guard = lock(&object);
        Some(f(&mut guard))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_never_reused() {
        let reg = Registry::new("test");
        let a = reg.insert(1u32);
        assert!(reg.remove(a).is_some());
        let b = reg.insert(2u32);
        assert_ne!(a, b);
        assert!(reg.with(a, |v| *v).is_none());
        assert_eq!(reg.with(b, |v| *v), Some(2));
    }

    #[test]
    fn remove_twice_misses() {
        let reg = Registry::new("test");
        let a = reg.insert(());
        assert!(reg.remove(a).is_some());
        assert!(reg.remove(a).is_none());
        assert_eq!(reg.len(), 0);
    }
}
