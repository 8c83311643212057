//! Native image cache objects.
//!
//! A cache remembers file headers and decoded pixels by path so that many
//! buffers reading the same file share one decode. There is one process-wide
//! shared instance, created on first request, plus any number of private
//! ones. Destroying the shared instance without `teardown` leaves it alive
//! for its other holders.

use super::codec::{self, Header};
use super::registry::{RawRef, Registry, lock};
use crate::attribute::{AttrValue, ParamList};
use crate::progress::ProgressCallback;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::SystemTime;

pub(crate) static CACHES: LazyLock<Registry<NativeCache>> =
    LazyLock::new(|| Registry::new("cache"));

static SHARED: Mutex<Option<RawRef>> = Mutex::new(None);

/// Message reported by buffers whose cache no longer exists.
pub(crate) const DESTROYED: &str = "ImageCache has been destroyed";

#[derive(Debug, Default, Clone, Copy)]
struct CacheStats {
    find_file_calls: u64,
    hits: u64,
    misses: u64,
    files_opened: u64,
    bytes_read: u64,
    invalidations: u64,
}

#[derive(Debug)]
struct CachedFile {
    header: Header,
    pixels: Option<Arc<Vec<f32>>>,
    modified: Option<SystemTime>,
}

/// One in-flight decode. Readers of the same path queue on its lock, so a
/// file is decoded once while the cache itself stays unlocked.
type PixelSlot = Arc<Mutex<Option<(Header, Arc<Vec<f32>>)>>>;

enum PixelLookup {
    Hit(Header, Arc<Vec<f32>>),
    Load(PixelSlot),
}

#[derive(Debug)]
pub(crate) struct NativeCache {
    shared: bool,
    options: ParamList,
    files: HashMap<PathBuf, CachedFile>,
    loading: HashMap<PathBuf, PixelSlot>,
    stats: CacheStats,
    attached: usize,
    error: String,
}

impl NativeCache {
    fn new(shared: bool) -> Self {
        let mut options = ParamList::new();
        options.set("max_memory_MB", AttrValue::Float(2048.0));
        options.set("max_open_files", AttrValue::Int(100));
        options.set("autotile", AttrValue::Int(0));
        Self {
            shared,
            options,
            files: HashMap::new(),
            loading: HashMap::new(),
            stats: CacheStats::default(),
            attached: 0,
            error: String::new(),
        }
    }

    fn header(&mut self, path: &Path) -> Result<Header, String> {
        self.stats.find_file_calls += 1;
        if let Some(file) = self.files.get(path) {
            self.stats.hits += 1;
            return Ok(file.header.clone());
        }
        self.stats.misses += 1;
        let header = codec::probe(path).map_err(|e| e.to_string())?;
        self.stats.files_opened += 1;
        self.files.insert(
            path.to_path_buf(),
            CachedFile {
                header: header.clone(),
                pixels: None,
                modified: modified(path),
            },
        );
        Ok(header)
    }

    fn lookup_pixels(&mut self, path: &Path) -> PixelLookup {
        self.stats.find_file_calls += 1;
        if let Some(file) = self.files.get(path)
            && let Some(pixels) = &file.pixels
        {
            self.stats.hits += 1;
            return PixelLookup::Hit(file.header.clone(), Arc::clone(pixels));
        }
        let slot = self.loading.entry(path.to_path_buf()).or_default();
        PixelLookup::Load(Arc::clone(slot))
    }

    /// Record the outcome of a decode started from `slot`. Pixels are only
    /// kept if the path was not invalidated while decoding.
    fn finish_pixels(
        &mut self,
        path: &Path,
        slot: &PixelSlot,
        decoded: Option<&(Header, Arc<Vec<f32>>)>,
    ) {
        self.stats.misses += 1;
        let current = self
            .loading
            .get(path)
            .is_some_and(|pending| Arc::ptr_eq(pending, slot));
        if !current {
            return;
        }
        self.loading.remove(path);
        let Some((header, pixels)) = decoded else {
            return;
        };
        self.stats.files_opened += 1;
        self.stats.bytes_read += (pixels.len() * header.spec.format.size()) as u64;
        self.files.insert(
            path.to_path_buf(),
            CachedFile {
                header: header.clone(),
                pixels: Some(Arc::clone(pixels)),
                modified: modified(path),
            },
        );
    }

    fn stats_report(&self, level: i32) -> String {
        let kind = if self.shared { "shared" } else { "private" };
        let s = &self.stats;
        let mut out = String::new();
        if level <= 0 {
            let _ = writeln!(
                out,
                "ImageCache ({kind}): {} files, {} hits, {} misses",
                self.files.len(),
                s.hits,
                s.misses
            );
            return out;
        }
        let _ = writeln!(out, "ImageCache ({kind}) statistics");
        let options: Vec<String> = self
            .options
            .iter()
            .map(|a| format!("{}={}", a.name, a.value))
            .collect();
        let _ = writeln!(out, "  Options:  {}", options.join(" "));
        let _ = writeln!(out, "  Images : {} unique", self.files.len());
        let _ = writeln!(out, "  Files opened: {}", s.files_opened);
        let _ = writeln!(
            out,
            "  Find-file calls: {} (hits {}, misses {})",
            s.find_file_calls, s.hits, s.misses
        );
        let _ = writeln!(
            out,
            "  Pixel data read: {:.1} MB",
            s.bytes_read as f64 / (1024.0 * 1024.0)
        );
        let _ = writeln!(out, "  Invalidations: {}", s.invalidations);
        let _ = writeln!(out, "  Attached buffers: {}", self.attached);
        if level >= 2 {
            let _ = writeln!(out, "  Image file list:");
            let mut paths: Vec<&PathBuf> = self.files.keys().collect();
            paths.sort();
            for (i, path) in paths.into_iter().enumerate() {
                let file = &self.files[path];
                let spec = &file.header.spec;
                let _ = writeln!(
                    out,
                    "    {:>3} {:>4}x{:<4} {}.{} {} {}{}",
                    i + 1,
                    spec.width,
                    spec.height,
                    spec.nchannels,
                    spec.format,
                    codec::format_name(file.header.format),
                    path.display(),
                    if file.pixels.is_some() { "" } else { " (header only)" }
                );
            }
        }
        out
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

pub(crate) fn create(shared: bool) -> RawRef {
    if !shared {
        return CACHES.insert(NativeCache::new(false));
    }
    let mut slot = lock(&SHARED);
    if let Some(raw) = *slot
        && CACHES.contains(raw)
    {
        return raw;
    }
    let raw = CACHES.insert(NativeCache::new(true));
    *slot = Some(raw);
    raw
}

/// Free a cache. The shared instance survives unless `teardown` is set.
pub(crate) fn destroy(raw: RawRef, teardown: bool) {
    let Some((shared, attached)) = CACHES.with(raw, |c| (c.shared, c.attached)) else {
        return;
    };
    if shared && !teardown {
        tracing::debug!(token = raw.get(), "shared cache kept alive");
        return;
    }
    if attached > 0 {
        tracing::warn!(
            token = raw.get(),
            attached,
            "image cache destroyed while buffers still reference it"
        );
    }
    if shared {
        let mut slot = lock(&SHARED);
        if *slot == Some(raw) {
            *slot = None;
        }
    }
    CACHES.remove(raw);
}

pub(crate) fn is_shared(raw: RawRef) -> bool {
    CACHES.with(raw, |c| c.shared).unwrap_or(false)
}

pub(crate) fn geterror(raw: RawRef) -> String {
    CACHES
        .with(raw, |c| std::mem::take(&mut c.error))
        .unwrap_or_default()
}

pub(crate) fn attach(raw: RawRef) -> bool {
    CACHES.with(raw, |c| c.attached += 1).is_some()
}

pub(crate) fn detach(raw: RawRef) {
    CACHES.with(raw, |c| c.attached = c.attached.saturating_sub(1));
}

pub(crate) fn header(raw: RawRef, path: &Path) -> Result<Header, String> {
    CACHES
        .with(raw, |c| c.header(path))
        .unwrap_or_else(|| Err(DESTROYED.to_string()))
}

/// Decoded pixels of `path`. The decode runs without the cache locked, so
/// other files can be read through the same cache meanwhile.
pub(crate) fn pixels(
    raw: RawRef,
    path: &Path,
    progress: Option<&mut dyn ProgressCallback>,
) -> Result<(Header, Arc<Vec<f32>>), String> {
    let slot = match CACHES.with(raw, |c| c.lookup_pixels(path)) {
        None => return Err(DESTROYED.to_string()),
        Some(PixelLookup::Hit(header, pixels)) => return Ok((header, pixels)),
        Some(PixelLookup::Load(slot)) => slot,
    };
    let mut pending = lock(&slot);
    if let Some((header, pixels)) = pending.as_ref() {
        // Another reader finished this file while we waited.
        CACHES.with(raw, |c| c.stats.hits += 1);
        return Ok((header.clone(), Arc::clone(pixels)));
    }
    let decoded = codec::decode(path, progress)
        .map(|(header, pixels)| (header, Arc::new(pixels)))
        .map_err(|e| e.to_string());
    *pending = decoded.as_ref().ok().cloned();
    drop(pending);
    CACHES.with(raw, |c| c.finish_pixels(path, &slot, decoded.as_ref().ok()));
    decoded
}

/// Header lookup that records failures on the cache itself.
pub(crate) fn get_imagespec(raw: RawRef, path: &Path) -> Option<super::spec::SpecData> {
    CACHES
        .with(raw, |c| match c.header(path) {
            Ok(header) => Some(header.spec),
            Err(message) => {
                c.error = message;
                None
            }
        })
        .flatten()
}

pub(crate) fn clear(raw: RawRef) {
    CACHES.with(raw, |c| {
        c.files.clear();
        c.loading.clear();
        c.stats = CacheStats::default();
    });
}

pub(crate) fn getstats(raw: RawRef, level: i32) -> String {
    CACHES
        .with(raw, |c| c.stats_report(level))
        .unwrap_or_default()
}

pub(crate) fn reset_stats(raw: RawRef) {
    CACHES.with(raw, |c| c.stats = CacheStats::default());
}

pub(crate) fn invalidate(raw: RawRef, path: &Path) {
    CACHES.with(raw, |c| {
        c.loading.remove(path);
        if c.files.remove(path).is_some() {
            c.stats.invalidations += 1;
        }
    });
}

/// Drop cached files. Without `force`, only files changed on disk since
/// they were cached are dropped.
pub(crate) fn invalidate_all(raw: RawRef, force: bool) {
    CACHES.with(raw, |c| {
        let before = c.files.len();
        if force {
            c.files.clear();
            c.loading.clear();
        } else {
            c.files
                .retain(|path, file| file.modified.is_some() && modified(path) == file.modified);
        }
        c.stats.invalidations += (before - c.files.len()) as u64;
    });
}

pub(crate) fn set_option(raw: RawRef, name: &str, value: AttrValue) {
    CACHES.with(raw, |c| c.options.set(name, value));
}

pub(crate) fn options(raw: RawRef) -> ParamList {
    CACHES.with(raw, |c| c.options.clone()).unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn cached_files(raw: RawRef) -> usize {
    CACHES.with(raw, |c| c.files.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_test_png;

    #[test]
    fn private_caches_are_distinct_and_freed() {
        let a = create(false);
        let b = create(false);
        assert_ne!(a, b);
        destroy(a, false);
        assert!(!CACHES.contains(a));
        destroy(b, true);
        assert!(!CACHES.contains(b));
    }

    #[test]
    fn header_then_pixels_counts_hits_and_misses() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cached.png");
        write_test_png(&path, 5, 5);
        let raw = create(false);

        header(raw, &path).unwrap();
        header(raw, &path).unwrap();
        let (_, first) = pixels(raw, &path, None).unwrap();
        let (_, second) = pixels(raw, &path, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let report = getstats(raw, 1);
        assert!(report.contains("Find-file calls: 4 (hits 2, misses 2)"), "{report}");
        destroy(raw, false);
    }

    #[test]
    fn invalidate_all_without_force_keeps_unchanged_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("stable.png");
        write_test_png(&path, 3, 3);
        let raw = create(false);
        header(raw, &path).unwrap();

        invalidate_all(raw, false);
        assert_eq!(cached_files(raw), 1);
        invalidate_all(raw, true);
        assert_eq!(cached_files(raw), 0);
        destroy(raw, false);
    }

    #[test]
    fn destroyed_cache_reports_deterministic_error() {
        let raw = create(false);
        destroy(raw, false);
        let err = header(raw, Path::new("whatever.png")).unwrap_err();
        assert_eq!(err, DESTROYED);
    }

    #[test]
    fn get_imagespec_records_error_on_cache() {
        let raw = create(false);
        assert!(get_imagespec(raw, Path::new("/nonexistent/x.png")).is_none());
        assert!(geterror(raw).contains("/nonexistent/x.png"));
        assert_eq!(geterror(raw), "");
        destroy(raw, false);
    }

    #[test]
    fn level_two_lists_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("listed.png");
        write_test_png(&path, 6, 4);
        let raw = create(false);
        header(raw, &path).unwrap();
        let report = getstats(raw, 2);
        assert!(report.contains("listed.png (header only)"), "{report}");
        assert!(getstats(raw, 0).lines().count() == 1);
        destroy(raw, false);
    }

    #[test]
    fn progress_callback_may_query_the_cache_during_decode() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("busy.png");
        write_test_png(&path, 4, 40);
        let raw = create(false);

        let mut seen = Vec::new();
        let mut query = |_: f32| {
            seen.push(getstats(raw, 0));
            false
        };
        pixels(raw, &path, Some(&mut query)).unwrap();
        assert!(!seen.is_empty());
        destroy(raw, false);
    }

    #[test]
    fn concurrent_readers_share_one_decode() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("shared.png");
        write_test_png(&path, 64, 64);
        let raw = create(false);

        let results: Vec<Arc<Vec<f32>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| pixels(raw, &path, None).unwrap().1))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(|p| Arc::ptr_eq(p, &results[0])));

        let report = getstats(raw, 1);
        assert!(report.contains("Files opened: 1"), "{report}");
        assert!(report.contains("(hits 3, misses 1)"), "{report}");
        destroy(raw, false);
    }

    #[test]
    fn invalidation_during_decode_drops_the_result() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("moving.png");
        write_test_png(&path, 4, 40);
        let raw = create(false);

        let mut invalidated = false;
        let mut invalidate_once = |_: f32| {
            if !invalidated {
                invalidate(raw, &path);
                invalidated = true;
            }
            false
        };
        pixels(raw, &path, Some(&mut invalidate_once)).unwrap();
        assert_eq!(cached_files(raw), 0);
        pixels(raw, &path, None).unwrap();
        assert_eq!(cached_files(raw), 1);
        destroy(raw, false);
    }
}
