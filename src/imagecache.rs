//! Image caches: shared headers and pixels for many buffers.
//!
//! There is one process-wide cache, handed out by `ImageCache::create(true)`
//! to every caller that asks, and any number of private caches. Destroying a
//! wrapper of the shared cache normally only lets go of it; pass `teardown`
//! to free the shared instance itself.
//!
//! `ImageCache` is `Send + Sync`: every operation takes the native object's
//! own lock, so one cache can be read through from many threads at once.

use crate::attribute::AttrValue;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::handle::{Handle, NativeKind};
use crate::imagespec::ImageSpec;
use crate::native::RawRef;
use crate::native::cache;
use std::path::Path;

pub(crate) struct CacheKind;

impl NativeKind for CacheKind {
    const NAME: &'static str = "ImageCache";

    fn free(raw: RawRef) {
        cache::destroy(raw, false);
    }

    fn geterror(raw: RawRef) -> String {
        cache::geterror(raw)
    }
}

#[derive(Debug)]
pub struct ImageCache {
    handle: Handle<CacheKind>,
}

impl ImageCache {
    /// The shared cache when `shared`, otherwise a new private one.
    pub fn create(shared: bool) -> Self {
        Self {
            handle: Handle::owned(cache::create(shared)),
        }
    }

    /// Create a cache and apply the configured attributes to it.
    pub fn with_config(config: &CacheConfig) -> Self {
        let cache = Self::create(config.shared);
        if let Ok(raw) = cache.handle.raw() {
            cache::set_option(raw, "max_memory_MB", AttrValue::Float(config.max_memory_mb));
            cache::set_option(raw, "max_open_files", AttrValue::Int(config.max_open_files));
            cache::set_option(raw, "autotile", AttrValue::Int(config.autotile));
        }
        cache
    }

    /// Let go of the cache. With `teardown`, the shared cache itself is
    /// freed too; private caches are freed either way. Idempotent.
    pub fn destroy(&mut self, teardown: bool) {
        if teardown && let Some(raw) = self.handle.get() {
            cache::destroy(raw, true);
        }
        self.handle.release();
    }

    pub fn is_shared(&self) -> bool {
        self.handle.get().is_some_and(cache::is_shared)
    }

    pub fn last_error(&self) -> Option<Error> {
        self.handle.last_error()
    }

    pub(crate) fn raw(&self) -> Result<RawRef> {
        self.handle.raw()
    }

    /// Forget every cached file and reset the statistics.
    pub fn clear(&self) -> Result<()> {
        cache::clear(self.handle.raw()?);
        Ok(())
    }

    /// Statistics report. Level 0 is a one-line summary, level 1 adds the
    /// counters, level 2 and up list every cached file.
    pub fn get_stats(&self, level: i32) -> String {
        self.handle
            .get()
            .map(|raw| cache::getstats(raw, level))
            .unwrap_or_default()
    }

    pub fn reset_stats(&self) -> Result<()> {
        cache::reset_stats(self.handle.raw()?);
        Ok(())
    }

    /// Drop whatever is cached for `path`.
    pub fn invalidate(&self, path: impl AsRef<Path>) -> Result<()> {
        cache::invalidate(self.handle.raw()?, path.as_ref());
        Ok(())
    }

    /// Drop cached files that changed on disk, or all of them with `force`.
    pub fn invalidate_all(&self, force: bool) -> Result<()> {
        cache::invalidate_all(self.handle.raw()?, force);
        Ok(())
    }

    /// Set a cache option such as `max_memory_MB` or `autotile`.
    pub fn set_attribute(&self, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        cache::set_option(self.handle.raw()?, name, value.into());
        Ok(())
    }

    pub fn get_int_attribute(&self, name: &str, default: i32) -> i32 {
        self.handle
            .get()
            .map_or(default, |raw| cache::options(raw).get_int(name, default))
    }

    pub fn get_float_attribute(&self, name: &str, default: f32) -> f32 {
        self.handle
            .get()
            .map_or(default, |raw| cache::options(raw).get_float(name, default))
    }

    pub fn get_string_attribute(&self, name: &str, default: &str) -> String {
        match self.handle.get() {
            Some(raw) => cache::options(raw).get_string(name, default),
            None => default.to_string(),
        }
    }

    /// Header of `path` as an owned spec, read through the cache.
    pub fn get_imagespec(&self, path: impl AsRef<Path>) -> Result<ImageSpec> {
        let raw = self.handle.raw()?;
        match cache::get_imagespec(raw, path.as_ref()) {
            Some(data) => Ok(ImageSpec::from_data(data)),
            None => Err(Error::NativeOperationFailed(cache::geterror(raw))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_test_png;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn cache_is_send_and_sync() {
        assert_send_sync::<ImageCache>();
    }

    #[test]
    fn private_cache_is_freed_by_destroy() {
        let mut cache = ImageCache::create(false);
        let raw = cache.raw().unwrap();
        assert!(!cache.is_shared());
        cache.destroy(false);
        cache.destroy(false);
        assert!(!cache::CACHES.contains(raw));
        assert_eq!(cache.last_error(), Some(Error::Released));
        assert_eq!(cache.clear(), Err(Error::Released));
        assert_eq!(cache.get_stats(1), "");
    }

    #[test]
    fn with_config_sets_options() {
        let config = CacheConfig {
            shared: false,
            max_memory_mb: 64.0,
            max_open_files: 8,
            autotile: 32,
        };
        let cache = ImageCache::with_config(&config);
        assert_eq!(cache.get_float_attribute("max_memory_MB", 0.0), 64.0);
        assert_eq!(cache.get_int_attribute("max_open_files", 0), 8);
        assert_eq!(cache.get_int_attribute("autotile", -1), 32);
        assert_eq!(cache.get_string_attribute("missing", "none"), "none");
    }

    #[test]
    fn get_imagespec_reads_header() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("head.png");
        write_test_png(&path, 7, 5);
        let cache = ImageCache::create(false);
        let spec = cache.get_imagespec(&path).unwrap();
        assert_eq!((spec.width(), spec.height(), spec.nchannels()), (7, 5, 3));
        assert!(cache.get_stats(0).contains("1 files"));
    }

    #[test]
    fn get_imagespec_failure_carries_native_message() {
        let cache = ImageCache::create(false);
        let err = cache.get_imagespec("/nonexistent/none.png").unwrap_err();
        let Error::NativeOperationFailed(message) = err else {
            panic!("unexpected error {err:?}");
        };
        assert!(message.contains("none.png"));
        assert_eq!(cache.last_error(), None);
    }
}
