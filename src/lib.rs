//! # imageio-bind
//!
//! Handle-based bindings for an image I/O object model: image buffers,
//! image specs, image caches and output files. Every wrapper holds an opaque
//! token for an object that lives in the native library; the binding's job is
//! to get three things right on top of it:
//!
//! - **Lifetimes.** Each handle is owned or borrowed. Owned handles free
//!   their object on [`release`](ImageBuf::release) or on `Drop`, whichever
//!   comes first, and exactly once. Borrowed handles (the spec of a buffer)
//!   never free anything and cannot outlive their owner.
//! - **Errors.** Native calls report success as a flag and park a message on
//!   the object. Fallible wrappers poll that message only on failure and
//!   return it verbatim as [`Error::NativeOperationFailed`].
//! - **Attributes.** Metadata is a list of named values restricted to text,
//!   `i32` and `f32` ([`AttrValue`]), with case-insensitive typed getters and
//!   type-filtered lookup and erase.
//!
//! ```text
//!   ImageBuf ──owns──► spec, native spec
//!      │
//!      └──reads through──► ImageCache (shared or private)
//!      └──writes into────► ImageOutput / file
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imagebuf`] | [`ImageBuf`]: lazily read images, pixel access, copy, write |
//! | [`imagespec`] | [`ImageSpec`] and the borrowed [`SpecRef`] / [`SpecMut`] views |
//! | [`imagecache`] | [`ImageCache`]: shared or private header and pixel cache |
//! | [`imageoutput`] | [`ImageOutput`]: an open output file |
//! | [`attribute`] | [`AttrValue`], [`Attribute`], [`ParamList`] |
//! | [`typedesc`] | [`TypeDesc`] data types and buffer [`Storage`] kinds |
//! | [`progress`] | [`ProgressCallback`] for reporting and aborting long I/O |
//! | [`error`] | [`Error`] and [`Result`] |
//! | [`config`] | `config.toml` loading and validation for the CLI |
//! | [`native`] | The in-process native library the handles point into |
//!
//! # Threads
//!
//! [`ImageBuf`], [`ImageSpec`] and [`ImageOutput`] are `Send` but not
//! `Sync`: move them between threads, don't share them. [`ImageCache`] is
//! `Send + Sync`, and many buffers on many threads may read through one
//! cache at once.
//!
//! # Progress Callbacks
//!
//! A callback runs while the buffer being read or written is locked. It must
//! not call back into that buffer; doing so deadlocks. Caches are not locked
//! while they decode, so a callback may query them.

pub mod attribute;
pub mod config;
pub mod error;
mod handle;
pub mod imagebuf;
pub mod imagecache;
pub mod imageoutput;
pub mod imagespec;
pub mod native;
pub mod progress;
pub mod typedesc;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use attribute::{AttrValue, Attribute, ParamList};
pub use error::{Error, Result};
pub use imagebuf::ImageBuf;
pub use imagecache::ImageCache;
pub use imageoutput::ImageOutput;
pub use imagespec::{ImageSpec, SpecMut, SpecRef};
pub use progress::ProgressCallback;
pub use typedesc::{Storage, TypeDesc};
