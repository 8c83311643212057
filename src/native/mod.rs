//! The native image library the handles bind to.
//!
//! Objects live in per-kind token tables ([`registry`]) and are only ever
//! named by [`RawRef`]. Calls report success as a flag and leave a message
//! on the object for the caller to poll, so nothing in here panics across
//! the boundary or returns a Rust error type to the binding layer.
//!
//! | Module | Objects |
//! |--------|---------|
//! | [`spec`] | image descriptions |
//! | [`buf`] | image buffers, owning two specs each |
//! | [`cache`] | header and pixel caches, one of them process-wide |
//! | [`output`] | open output files |
//! | [`codec`] | file decode/encode on top of the `image` crate |
//! | [`metadata`] | attributes stored in PNG text chunks and TIFF tags |
//!
//! Lock order is buffer before spec, cache or output. Copies between two
//! buffers snapshot the source before locking the destination.

pub(crate) mod buf;
pub(crate) mod cache;
pub(crate) mod codec;
pub(crate) mod metadata;
pub(crate) mod output;
pub mod registry;
pub(crate) mod spec;

pub use registry::RawRef;
