//! Owned and borrowed references to native objects.
//!
//! A [`Handle`] is the only thing a wrapper holds. It pairs the opaque
//! [`RawRef`] with an ownership mode:
//!
//! | Mode | `release()` / `Drop` |
//! |------|----------------------|
//! | `Owned` | calls the kind's native destructor, then forgets the token |
//! | `Borrowed` | forgets the token; the native object belongs to someone else |
//!
//! Release goes through `Option::take`, so the second call finds nothing to
//! free. Explicit release and the `Drop` safety net share that path.

use crate::error::{Error, Result};
use crate::native::RawRef;
use std::fmt;
use std::marker::PhantomData;

/// Per-kind native entry points a handle needs.
pub(crate) trait NativeKind {
    const NAME: &'static str;

    fn free(raw: RawRef);

    /// Return and clear the object's pending error message.
    fn geterror(raw: RawRef) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ownership {
    Owned,
    Borrowed,
}

pub(crate) struct Handle<K: NativeKind> {
    raw: Option<RawRef>,
    ownership: Ownership,
    _kind: PhantomData<K>,
}

impl<K: NativeKind> Handle<K> {
    pub(crate) fn owned(raw: RawRef) -> Self {
        Self {
            raw: Some(raw),
            ownership: Ownership::Owned,
            _kind: PhantomData,
        }
    }

    pub(crate) fn borrowed(raw: RawRef) -> Self {
        Self {
            raw: Some(raw),
            ownership: Ownership::Borrowed,
            _kind: PhantomData,
        }
    }

    /// A handle that starts out released.
    pub(crate) fn released() -> Self {
        Self {
            raw: None,
            ownership: Ownership::Borrowed,
            _kind: PhantomData,
        }
    }

    pub(crate) fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// The live token, or `Error::Released`.
    pub(crate) fn raw(&self) -> Result<RawRef> {
        self.raw.ok_or(Error::Released)
    }

    /// The live token for infallible getters.
    pub(crate) fn get(&self) -> Option<RawRef> {
        self.raw
    }

    pub(crate) fn is_released(&self) -> bool {
        self.raw.is_none()
    }

    /// Turn a native success flag into a `Result`, polling the error only
    /// when the call failed.
    pub(crate) fn check(&self, ok: bool) -> Result<()> {
        if ok {
            return Ok(());
        }
        let raw = self.raw()?;
        Err(Error::NativeOperationFailed(K::geterror(raw)))
    }

    pub(crate) fn last_error(&self) -> Option<Error> {
        let Some(raw) = self.raw else {
            return Some(Error::Released);
        };
        let message = K::geterror(raw);
        (!message.is_empty()).then_some(Error::NativeOperationFailed(message))
    }

    pub(crate) fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            tracing::debug!(kind = K::NAME, token = raw.get(), ownership = ?self.ownership, "release");
            if self.ownership == Ownership::Owned {
                K::free(raw);
            }
        }
    }

    /// Exchange the referenced objects of two handles.
    pub(crate) fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.raw, &mut other.raw);
        std::mem::swap(&mut self.ownership, &mut other.ownership);
    }
}

impl<K: NativeKind> Drop for Handle<K> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw {
            tracing::trace!(kind = K::NAME, token = raw.get(), "finalizer release");
        }
        self.release();
    }
}

impl<K: NativeKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::NAME)
            .field("raw", &self.raw)
            .field("ownership", &self.ownership)
            .finish()
    }
}
