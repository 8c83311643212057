//! Image buffers.
//!
//! An [`ImageBuf`] is an image in memory, or the promise of one: a buffer
//! opened from a path reads only the header until pixels are needed, and
//! then reads through an [`ImageCache`] (the shared one unless told
//! otherwise).
//!
//! Construction never fails. A buffer whose file could not be opened comes
//! back uninitialized with its error pending; [`ImageBuf::open`] is the
//! `Result`-returning shortcut that polls it straight away.
//!
//! The spec of a buffer is owned by the buffer. [`ImageBuf::spec`] and
//! [`ImageBuf::spec_mut`] hand out borrowed views that cannot outlive it.

use crate::error::{Error, Result};
use crate::handle::{Handle, NativeKind};
use crate::imagecache::ImageCache;
use crate::imageoutput::ImageOutput;
use crate::imagespec::{ImageSpec, SpecMut, SpecRef};
use crate::native::RawRef;
use crate::native::buf;
use crate::progress::ProgressCallback;
use crate::typedesc::{Storage, TypeDesc};
use std::cell::Cell;
use std::marker::PhantomData;
use std::path::Path;

pub(crate) struct BufKind;

impl NativeKind for BufKind {
    const NAME: &'static str = "ImageBuf";

    fn free(raw: RawRef) {
        buf::free(raw);
    }

    fn geterror(raw: RawRef) -> String {
        buf::geterror(raw)
    }
}

#[derive(Debug)]
pub struct ImageBuf {
    handle: Handle<BufKind>,
    _not_sync: PhantomData<Cell<()>>,
}

impl ImageBuf {
    fn from_raw(raw: RawRef) -> Self {
        Self {
            handle: Handle::owned(raw),
            _not_sync: PhantomData,
        }
    }

    /// An empty, uninitialized buffer.
    pub fn new() -> Self {
        Self::from_raw(buf::new_empty())
    }

    /// A buffer for the file at `path`, read through the shared cache.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::from_path_with_cache(path, None)
    }

    /// A buffer for the file at `path`, read through `cache`, or through the
    /// shared cache when `cache` is `None` or already destroyed.
    pub fn from_path_with_cache(path: impl AsRef<Path>, cache: Option<&ImageCache>) -> Self {
        let cache = cache.and_then(|c| c.raw().ok());
        Self::from_raw(buf::new_from_path(path.as_ref(), cache))
    }

    /// A buffer with zeroed local pixels laid out as `spec` describes.
    pub fn from_spec(spec: &ImageSpec) -> Self {
        match spec.snapshot() {
            Some(data) => Self::from_raw(buf::new_from_spec(data)),
            None => Self::new(),
        }
    }

    /// Open `path` through the shared cache, failing if the header cannot
    /// be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path(path).into_result()
    }

    pub fn open_with_cache(path: impl AsRef<Path>, cache: &ImageCache) -> Result<Self> {
        cache.raw()?;
        Self::from_path_with_cache(path, Some(cache)).into_result()
    }

    fn into_result(self) -> Result<Self> {
        match self.last_error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Free the native buffer and its specs now. Later calls do nothing.
    pub fn release(&mut self) {
        self.handle.release();
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }

    /// The pending native error, if any. Reading it clears it.
    pub fn last_error(&self) -> Option<Error> {
        self.handle.last_error()
    }

    pub fn initialized(&self) -> bool {
        self.handle.get().is_some_and(buf::initialized)
    }

    /// Return to the uninitialized state, dropping pixels and cache link.
    pub fn clear(&mut self) -> Result<()> {
        buf::clear(self.handle.raw()?);
        Ok(())
    }

    pub fn storage(&self) -> Storage {
        self.handle.get().map(buf::storage).unwrap_or_default()
    }

    /// Read only the header of one subimage and MIP level of `path`.
    pub fn init_spec(&mut self, path: impl AsRef<Path>, subimage: i32, miplevel: i32) -> Result<()> {
        let raw = self.handle.raw()?;
        let ok = buf::init_spec(raw, path.as_ref(), subimage, miplevel);
        self.handle.check(ok)
    }

    /// Make the pixels resident. With `force`, bypass the cache and read
    /// into a local buffer.
    pub fn read(&mut self, force: bool) -> Result<()> {
        self.read_with(force, TypeDesc::Unknown, None)
    }

    /// [`read`](Self::read) with a data format conversion (`Unknown` keeps
    /// the file's) and an optional progress callback that may abort.
    pub fn read_with(
        &mut self,
        force: bool,
        convert: TypeDesc,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<()> {
        let raw = self.handle.raw()?;
        tracing::debug!(token = raw.get(), force, %convert, "read");
        let ok = buf::read(raw, force, convert, progress);
        self.handle.check(ok)
    }

    /// Write the image to `path`. An empty `format` picks one from the
    /// extension.
    pub fn write_file(&self, path: impl AsRef<Path>, format: &str) -> Result<()> {
        self.write_file_inner(path.as_ref(), format, None)
    }

    pub fn write_file_with_progress(
        &self,
        path: impl AsRef<Path>,
        format: &str,
        progress: &mut dyn ProgressCallback,
    ) -> Result<()> {
        self.write_file_inner(path.as_ref(), format, Some(progress))
    }

    fn write_file_inner(
        &self,
        path: &Path,
        format: &str,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<()> {
        let raw = self.handle.raw()?;
        tracing::debug!(token = raw.get(), path = %path.display(), "write");
        let ok = buf::write_file(raw, path, format, progress);
        self.handle.check(ok)
    }

    /// Write the image into an already opened output.
    pub fn write_output(&self, out: &mut ImageOutput) -> Result<()> {
        self.write_output_inner(out, None)
    }

    pub fn write_output_with_progress(
        &self,
        out: &mut ImageOutput,
        progress: &mut dyn ProgressCallback,
    ) -> Result<()> {
        self.write_output_inner(out, Some(progress))
    }

    fn write_output_inner(
        &self,
        out: &mut ImageOutput,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<()> {
        let raw = self.handle.raw()?;
        let ok = buf::write_output(raw, out.raw()?, progress);
        self.handle.check(ok)
    }

    /// Data format used by later writes; `Unknown` keeps the buffer's.
    pub fn set_write_format(&mut self, format: TypeDesc) -> Result<()> {
        buf::set_write_format(self.handle.raw()?, format);
        Ok(())
    }

    /// Tile size requested by later writes; zero means scanlines.
    pub fn set_write_tiles(&mut self, width: i32, height: i32, depth: i32) -> Result<()> {
        buf::set_write_tiles(self.handle.raw()?, width, height, depth);
        Ok(())
    }

    /// Copy `src`'s metadata (display window, tiling, attributes) but not
    /// its resolution, channels or pixels.
    pub fn copy_metadata(&mut self, src: &ImageBuf) -> Result<()> {
        let ok = buf::copy_metadata(self.handle.raw()?, src.handle.raw()?);
        self.handle.check(ok)
    }

    /// Copy the pixels of the overlapping region of `src`. Destination
    /// pixels or channels `src` lacks become zero. An uninitialized
    /// destination becomes a full copy of `src`.
    pub fn copy_pixels(&mut self, src: &ImageBuf) -> Result<()> {
        let ok = buf::copy_pixels(self.handle.raw()?, src.handle.raw()?);
        self.handle.check(ok)
    }

    /// Make this buffer a full, locally stored copy of `src`.
    pub fn copy(&mut self, src: &ImageBuf) -> Result<()> {
        let ok = buf::copy(self.handle.raw()?, src.handle.raw()?);
        self.handle.check(ok)
    }

    /// Exchange the contents of two buffers.
    pub fn swap(&mut self, other: &mut ImageBuf) {
        self.handle.swap(&mut other.handle);
    }

    /// The working spec. Edits through [`spec_mut`](Self::spec_mut) show here.
    pub fn spec(&self) -> SpecRef<'_> {
        SpecRef::new(self.handle.get().and_then(buf::spec_ref))
    }

    /// The spec as the file described it, before any conversion.
    pub fn native_spec(&self) -> SpecRef<'_> {
        SpecRef::new(self.handle.get().and_then(buf::nativespec_ref))
    }

    pub fn spec_mut(&mut self) -> SpecMut<'_> {
        SpecMut::new(self.handle.get().and_then(buf::spec_ref))
    }

    pub fn name(&self) -> String {
        self.handle.get().map(buf::name).unwrap_or_default()
    }

    pub fn file_format_name(&self) -> String {
        self.handle.get().map(buf::file_format_name).unwrap_or_default()
    }

    pub fn subimage(&self) -> i32 {
        self.handle.get().map_or(0, buf::subimage)
    }

    pub fn nsubimages(&self) -> i32 {
        self.handle.get().map_or(0, buf::nsubimages)
    }

    pub fn miplevel(&self) -> i32 {
        self.handle.get().map_or(0, buf::miplevel)
    }

    pub fn nmiplevels(&self) -> i32 {
        self.handle.get().map_or(0, buf::nmiplevels)
    }

    pub fn nchannels(&self) -> i32 {
        self.spec().nchannels()
    }

    /// EXIF-style orientation code, 1 (upright) when unset.
    pub fn orientation(&self) -> i32 {
        let spec = self.spec();
        if spec.is_released() { 1 } else { spec.orientation() }
    }

    pub fn oriented_width(&self) -> i32 {
        self.spec().oriented_width()
    }

    pub fn oriented_height(&self) -> i32 {
        self.spec().oriented_height()
    }

    pub fn oriented_x(&self) -> i32 {
        self.spec().oriented_x()
    }

    pub fn oriented_y(&self) -> i32 {
        self.spec().oriented_y()
    }

    pub fn oriented_full_width(&self) -> i32 {
        self.spec().oriented_full_width()
    }

    pub fn oriented_full_height(&self) -> i32 {
        self.spec().oriented_full_height()
    }

    pub fn oriented_full_x(&self) -> i32 {
        self.spec().oriented_full_x()
    }

    pub fn oriented_full_y(&self) -> i32 {
        self.spec().oriented_full_y()
    }

    pub fn xbegin(&self) -> i32 {
        self.spec().x()
    }

    pub fn xend(&self) -> i32 {
        let spec = self.spec();
        spec.x() + spec.width()
    }

    pub fn ybegin(&self) -> i32 {
        self.spec().y()
    }

    pub fn yend(&self) -> i32 {
        let spec = self.spec();
        spec.y() + spec.height()
    }

    pub fn zbegin(&self) -> i32 {
        self.spec().z()
    }

    pub fn zend(&self) -> i32 {
        let spec = self.spec();
        spec.z() + spec.depth().max(1)
    }

    pub fn xmin(&self) -> i32 {
        self.xbegin()
    }

    pub fn xmax(&self) -> i32 {
        self.xend() - 1
    }

    pub fn ymin(&self) -> i32 {
        self.ybegin()
    }

    pub fn ymax(&self) -> i32 {
        self.yend() - 1
    }

    pub fn zmin(&self) -> i32 {
        self.zbegin()
    }

    pub fn zmax(&self) -> i32 {
        self.zend() - 1
    }

    /// Channel values of one pixel, normalized to `[0, 1]` for integer data.
    pub fn get_pixel(&self, x: i32, y: i32, z: i32) -> Result<Vec<f32>> {
        let raw = self.handle.raw()?;
        match buf::get_pixel(raw, x, y, z) {
            Some(values) => Ok(values),
            None => self.handle.check(false).map(|()| Vec::new()),
        }
    }

    /// Overwrite one pixel. Extra values are ignored; missing channels keep
    /// their value.
    pub fn set_pixel(&mut self, x: i32, y: i32, z: i32, values: &[f32]) -> Result<()> {
        let ok = buf::set_pixel(self.handle.raw()?, x, y, z, values);
        self.handle.check(ok)
    }
}

impl Default for ImageBuf {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_test_png;

    fn assert_send<T: Send>() {}

    #[test]
    fn buffer_is_send() {
        assert_send::<ImageBuf>();
    }

    #[test]
    fn new_buffer_is_uninitialized() {
        let buf = ImageBuf::new();
        assert!(!buf.initialized());
        assert_eq!(buf.storage(), Storage::Uninitialized);
        assert_eq!(buf.last_error(), None);
        assert_eq!(buf.name(), "");
    }

    #[test]
    fn opening_missing_file_reports_error() {
        let buf = ImageBuf::from_path("/nonexistent/missing.png");
        assert!(!buf.initialized());
        let err = buf.last_error().unwrap();
        assert!(err.to_string().contains("missing.png"), "{err}");
        assert_eq!(buf.last_error(), None);
        assert!(ImageBuf::open("/nonexistent/missing.png").is_err());
    }

    #[test]
    fn failed_construction_rereads_on_demand() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("late.png");
        let cache = ImageCache::create(false);
        let mut buf = ImageBuf::from_path_with_cache(&path, Some(&cache));
        assert!(buf.last_error().is_some());
        assert!(buf.read(false).is_err());

        write_test_png(&path, 3, 2);
        buf.init_spec(&path, 0, 0).unwrap();
        buf.read(false).unwrap();
        assert_eq!(buf.spec().width(), 3);
    }

    #[test]
    fn from_spec_allocates_local_pixels() {
        let spec = ImageSpec::with_size(4, 3, 2, TypeDesc::Float);
        let buf = ImageBuf::from_spec(&spec);
        assert_eq!(buf.storage(), Storage::LocalBuffer);
        assert_eq!(buf.get_pixel(3, 2, 0).unwrap(), vec![0.0, 0.0]);
        assert_eq!((buf.xend(), buf.yend(), buf.zend()), (4, 3, 1));
        assert_eq!((buf.xmax(), buf.ymax(), buf.zmax()), (3, 2, 0));
    }

    #[test]
    fn spec_mut_edits_are_visible() {
        let mut buf = ImageBuf::from_spec(&ImageSpec::with_size(8, 6, 3, TypeDesc::UInt8));
        assert_eq!(buf.orientation(), 1);
        buf.spec_mut().set_attribute("Orientation", 8).unwrap();
        assert_eq!(buf.orientation(), 8);
        assert_eq!((buf.oriented_width(), buf.oriented_height()), (6, 8));
        assert_eq!(buf.native_spec().get_int_attribute("Orientation", 1), 1);
    }

    #[test]
    fn released_buffer_is_inert() {
        let mut buf = ImageBuf::from_spec(&ImageSpec::with_size(2, 2, 1, TypeDesc::UInt8));
        buf.release();
        buf.release();
        assert!(!buf.initialized());
        assert_eq!(buf.storage(), Storage::Uninitialized);
        assert_eq!(buf.read(false), Err(Error::Released));
        assert_eq!(buf.get_pixel(0, 0, 0), Err(Error::Released));
        assert_eq!(buf.last_error(), Some(Error::Released));
        assert_eq!(buf.spec().width(), 0);
        assert_eq!(buf.orientation(), 1);
        assert_eq!(buf.xend(), 0);
    }

    #[test]
    fn progress_abort_fails_read() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("abort.png");
        write_test_png(&path, 16, 64);
        let cache = ImageCache::create(false);
        let mut buf = ImageBuf::from_path_with_cache(&path, Some(&cache));

        let mut abort = |_: f32| true;
        let err = buf
            .read_with(true, TypeDesc::Unknown, Some(&mut abort))
            .unwrap_err();
        assert!(matches!(err, Error::NativeOperationFailed(_)));
        assert!(buf.read_with(true, TypeDesc::Unknown, None).is_ok());
    }

    #[test]
    fn read_with_conversion_stores_locally() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("convert.png");
        write_test_png(&path, 4, 4);
        let cache = ImageCache::create(false);
        let mut buf = ImageBuf::from_path_with_cache(&path, Some(&cache));

        buf.read(false).unwrap();
        assert_eq!(buf.storage(), Storage::ImageCache);
        buf.read_with(false, TypeDesc::Float, None).unwrap();
        assert_eq!(buf.storage(), Storage::LocalBuffer);
        assert_eq!(buf.spec().format(), TypeDesc::Float);
        assert_eq!(buf.native_spec().format(), TypeDesc::UInt8);
    }

    #[test]
    fn swap_exchanges_contents() {
        let mut a = ImageBuf::from_spec(&ImageSpec::with_size(1, 1, 1, TypeDesc::UInt8));
        let mut b = ImageBuf::new();
        a.swap(&mut b);
        assert!(!a.initialized());
        assert!(b.initialized());
        assert_eq!(b.spec().width(), 1);
    }
}
