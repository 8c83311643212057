//! Native image buffer objects.
//!
//! A buffer owns two spec objects (its working spec and the file's native
//! spec) and frees them with itself. Pixels are loaded lazily: a buffer
//! built from a path only reads the header until pixels are needed. Pixels
//! served by a cache are shared with it until the buffer modifies them.

use super::cache;
use super::codec;
use super::output;
use super::registry::{RawRef, Registry};
use super::spec::{self, SpecData};
use crate::progress::ProgressCallback;
use crate::typedesc::{Storage, TypeDesc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

pub(crate) static BUFS: LazyLock<Registry<NativeBuf>> = LazyLock::new(|| Registry::new("buf"));

#[derive(Debug)]
pub(crate) struct NativeBuf {
    name: String,
    file_format: String,
    storage: Storage,
    spec: RawRef,
    nativespec: RawRef,
    pixels: Option<Arc<Vec<f32>>>,
    subimage: i32,
    miplevel: i32,
    nsubimages: i32,
    nmiplevels: i32,
    write_format: TypeDesc,
    write_tiles: [i32; 3],
    cache: Option<RawRef>,
    error: String,
}

/// Everything another buffer needs to copy from this one.
struct Snapshot {
    initialized: bool,
    name: String,
    file_format: String,
    spec: SpecData,
    nativespec: SpecData,
    pixels: Option<Arc<Vec<f32>>>,
}

impl NativeBuf {
    fn empty() -> Self {
        Self {
            name: String::new(),
            file_format: String::new(),
            storage: Storage::Uninitialized,
            spec: spec::new(SpecData::new(TypeDesc::Unknown)),
            nativespec: spec::new(SpecData::new(TypeDesc::Unknown)),
            pixels: None,
            subimage: 0,
            miplevel: 0,
            nsubimages: 0,
            nmiplevels: 0,
            write_format: TypeDesc::Unknown,
            write_tiles: [0, 0, 0],
            cache: None,
            error: String::new(),
        }
    }

    fn record(&mut self, result: Result<(), String>) -> bool {
        match result {
            Ok(()) => true,
            Err(message) => {
                if !self.error.is_empty() {
                    self.error.push('\n');
                }
                self.error.push_str(&message);
                false
            }
        }
    }

    fn initialized(&self) -> bool {
        self.storage != Storage::Uninitialized
    }

    fn spec_data(&self) -> SpecData {
        spec::snapshot(self.spec).unwrap_or_else(|| SpecData::new(TypeDesc::Unknown))
    }

    fn set_specs(&mut self, working: SpecData, native: SpecData) {
        spec::write(self.spec, |s| *s = working);
        spec::write(self.nativespec, |s| *s = native);
    }

    fn attach_cache(&mut self, raw: Option<RawRef>) {
        if let Some(old) = self.cache.take() {
            cache::detach(old);
        }
        if let Some(raw) = raw
            && cache::attach(raw)
        {
            self.cache = Some(raw);
        }
    }

    fn reset(&mut self) {
        self.attach_cache(None);
        self.name.clear();
        self.file_format.clear();
        self.storage = Storage::Uninitialized;
        self.pixels = None;
        self.subimage = 0;
        self.miplevel = 0;
        self.nsubimages = 0;
        self.nmiplevels = 0;
        let blank = SpecData::new(TypeDesc::Unknown);
        self.set_specs(blank.clone(), blank);
    }

    fn init_spec(&mut self, path: &Path, subimage: i32, miplevel: i32) -> Result<(), String> {
        let filename = path.display().to_string();
        self.name = filename.clone();
        self.pixels = None;
        self.storage = Storage::Uninitialized;
        let header = match self.cache {
            Some(raw) => cache::header(raw, path)?,
            None => codec::probe(path).map_err(|e| e.to_string())?,
        };
        if subimage != 0 {
            return Err(format!(
                "{filename}: Invalid subimage {subimage} (file has 1 subimage)"
            ));
        }
        if miplevel != 0 {
            return Err(format!(
                "{filename}: Invalid MIP level {miplevel} (subimage 0 has 1 level)"
            ));
        }
        self.file_format = codec::format_name(header.format).to_string();
        self.subimage = 0;
        self.miplevel = 0;
        self.nsubimages = 1;
        self.nmiplevels = 1;
        self.storage = if self.cache.is_some() {
            Storage::ImageCache
        } else {
            Storage::LocalBuffer
        };
        self.set_specs(header.spec.clone(), header.spec);
        Ok(())
    }

    fn read(
        &mut self,
        force: bool,
        convert: TypeDesc,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<(), String> {
        let current = self.spec_data();
        let wants_conversion = !convert.is_unknown() && convert != current.format;
        if self.pixels.is_some() && !force && !wants_conversion {
            return Ok(());
        }
        if self.name.is_empty() {
            if self.pixels.is_some() {
                return self.convert_in_place(convert, progress);
            }
            return Err("ImageBuf has no filename to read from".to_string());
        }
        let path = PathBuf::from(&self.name);
        let (header, pixels) = match self.cache {
            Some(raw) if !force => cache::pixels(raw, &path, progress)?,
            _ => {
                let (header, pixels) = codec::decode(&path, progress).map_err(|e| e.to_string())?;
                (header, Arc::new(pixels))
            }
        };
        self.file_format = codec::format_name(header.format).to_string();
        self.nsubimages = 1;
        self.nmiplevels = 1;

        let mut working = header.spec.clone();
        if wants_conversion {
            working.set_format(convert);
            let converted = pixels.iter().map(|&v| codec::quantize(v, convert)).collect();
            self.pixels = Some(Arc::new(converted));
            self.storage = Storage::LocalBuffer;
        } else {
            self.pixels = Some(pixels);
            self.storage = match self.cache {
                Some(_) if !force => Storage::ImageCache,
                _ => Storage::LocalBuffer,
            };
        }
        // Attribute edits made before the pixels arrived survive the read.
        working.extra_attribs = current.extra_attribs;
        if current.nchannels == 0 {
            working.extra_attribs = header.spec.extra_attribs.clone();
        }
        self.set_specs(working, header.spec);
        Ok(())
    }

    fn convert_in_place(
        &mut self,
        convert: TypeDesc,
        mut progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<(), String> {
        let mut working = self.spec_data();
        let Some(pixels) = self.pixels.as_ref().filter(|_| !convert.is_unknown()) else {
            return Ok(());
        };
        let converted = codec::transfer_rows(pixels, &working, convert, &mut progress, "read")
            .map_err(|e| e.to_string())?;
        working.set_format(convert);
        self.pixels = Some(Arc::new(converted));
        self.storage = Storage::LocalBuffer;
        spec::write(self.spec, |s| *s = working);
        Ok(())
    }

    /// Make sure pixels are resident, reading them lazily if needed.
    fn ensure_pixels(&mut self) -> Result<Arc<Vec<f32>>, String> {
        if self.pixels.is_none() {
            if !self.initialized() {
                return Err("ImageBuf is uninitialized".to_string());
            }
            self.read(false, TypeDesc::Unknown, None)?;
        }
        self.pixels
            .clone()
            .ok_or_else(|| "ImageBuf has no pixels".to_string())
    }

    fn snapshot(&mut self) -> Result<Snapshot, String> {
        let pixels = if self.initialized() {
            Some(self.ensure_pixels()?)
        } else {
            None
        };
        Ok(Snapshot {
            initialized: self.initialized(),
            name: self.name.clone(),
            file_format: self.file_format.clone(),
            spec: self.spec_data(),
            nativespec: spec::snapshot(self.nativespec)
                .unwrap_or_else(|| SpecData::new(TypeDesc::Unknown)),
            pixels,
        })
    }

    fn copy_from(&mut self, src: Snapshot) {
        if !src.initialized {
            self.reset();
            return;
        }
        self.attach_cache(None);
        self.name = src.name;
        self.file_format = src.file_format;
        self.storage = Storage::LocalBuffer;
        self.pixels = src.pixels.map(|p| Arc::new(p.as_ref().clone()));
        self.subimage = 0;
        self.miplevel = 0;
        self.nsubimages = 1;
        self.nmiplevels = 1;
        self.set_specs(src.spec, src.nativespec);
    }

    fn copy_pixels_from(&mut self, src: Snapshot) -> Result<(), String> {
        if !self.initialized() {
            self.copy_from(src);
            return Ok(());
        }
        let (Some(src_pixels), true) = (src.pixels.as_ref(), src.initialized) else {
            return Err("copy_pixels: source ImageBuf is uninitialized".to_string());
        };
        let dst = self.spec_data();
        let mut pixels = self.ensure_pixels()?.as_ref().clone();
        let s = &src.spec;
        check_layout(&dst, &pixels)?;
        check_layout(s, src_pixels)?;
        let dst_ch = usize::try_from(dst.nchannels).unwrap_or(0);
        let src_ch = usize::try_from(s.nchannels).unwrap_or(0);
        for z in dst.z..dst.z + dst.depth.max(1) {
            for y in dst.y..dst.y + dst.height {
                for x in dst.x..dst.x + dst.width {
                    let Some(d) = pixel_index(&dst, x, y, z) else {
                        continue;
                    };
                    let from = pixel_index(s, x, y, z);
                    for c in 0..dst_ch {
                        let value = match from {
                            Some(i) if c < src_ch => src_pixels[i + c],
                            _ => 0.0,
                        };
                        pixels[d + c] = codec::quantize(value, dst.channel_format(c as i32));
                    }
                }
            }
        }
        self.pixels = Some(Arc::new(pixels));
        self.storage = Storage::LocalBuffer;
        Ok(())
    }

    fn get_pixel(&mut self, x: i32, y: i32, z: i32) -> Result<Vec<f32>, String> {
        let pixels = self.ensure_pixels()?;
        let spec = self.spec_data();
        let range = pixel_range(&spec, &pixels, x, y, z)?;
        Ok(pixels[range].to_vec())
    }

    fn set_pixel(&mut self, x: i32, y: i32, z: i32, values: &[f32]) -> Result<(), String> {
        let mut pixels = self.ensure_pixels()?;
        let spec = self.spec_data();
        let range = pixel_range(&spec, &pixels, x, y, z)?;
        let data = Arc::make_mut(&mut pixels);
        for (c, (slot, value)) in data[range].iter_mut().zip(values).enumerate() {
            *slot = codec::quantize(*value, spec.channel_format(c as i32));
        }
        self.pixels = Some(pixels);
        self.storage = Storage::LocalBuffer;
        Ok(())
    }

    /// Spec and pixels as they should be written out.
    fn write_payload(&mut self) -> Result<(SpecData, Arc<Vec<f32>>), String> {
        let pixels = self.ensure_pixels()?;
        let mut out = self.spec_data();
        if !self.write_format.is_unknown() {
            out.set_format(self.write_format);
        }
        let [tw, th, td] = self.write_tiles;
        out.tile_width = tw;
        out.tile_height = th;
        out.tile_depth = td.max(1);
        Ok((out, pixels))
    }

    fn write_file(
        &mut self,
        path: &Path,
        format: &str,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<(), String> {
        let (spec, pixels) = self.write_payload()?;
        let file_format = codec::output_format(path, format).map_err(|e| e.to_string())?;
        codec::encode(path, file_format, &spec, spec.format, &pixels, progress)
            .map_err(|e| e.to_string())
    }
}

/// Fails when `pixels` was laid out for different dimensions or channel
/// count than `spec` now describes, e.g. after the spec was edited in place.
fn check_layout(spec: &SpecData, pixels: &[f32]) -> Result<(), String> {
    let expected = spec
        .image_pixels()
        .checked_mul(usize::try_from(spec.nchannels).unwrap_or(0));
    if expected == Some(pixels.len()) {
        Ok(())
    } else {
        Err(format!(
            "pixel storage does not match spec ({} values held, {}x{}x{} with {} channels described)",
            pixels.len(),
            spec.width,
            spec.height,
            spec.depth.max(1),
            spec.nchannels
        ))
    }
}

/// Values of pixel (x, y, z) within `pixels`.
fn pixel_range(
    spec: &SpecData,
    pixels: &[f32],
    x: i32,
    y: i32,
    z: i32,
) -> Result<std::ops::Range<usize>, String> {
    check_layout(spec, pixels)?;
    let i = pixel_index(spec, x, y, z)
        .ok_or_else(|| format!("pixel ({x}, {y}, {z}) is outside the data window"))?;
    Ok(i..i + usize::try_from(spec.nchannels).unwrap_or(0))
}

/// Offset of pixel (x, y, z) in interleaved storage, if inside the window.
/// Only meaningful once [`check_layout`] has accepted the storage.
fn pixel_index(spec: &SpecData, x: i32, y: i32, z: i32) -> Option<usize> {
    let depth = spec.depth.max(1);
    if x < spec.x
        || x >= spec.x + spec.width
        || y < spec.y
        || y >= spec.y + spec.height
        || z < spec.z
        || z >= spec.z + depth
    {
        return None;
    }
    let (w, h) = (spec.width as usize, spec.height as usize);
    let (dx, dy, dz) = (
        (x - spec.x) as usize,
        (y - spec.y) as usize,
        (z - spec.z) as usize,
    );
    Some(((dz * h + dy) * w + dx) * usize::try_from(spec.nchannels).unwrap_or(0))
}

fn with<R: Default>(raw: RawRef, f: impl FnOnce(&mut NativeBuf) -> R) -> R {
    BUFS.with(raw, f).unwrap_or_default()
}

pub(crate) fn new_empty() -> RawRef {
    BUFS.insert(NativeBuf::empty())
}

/// Open `path` through `cache` (the shared cache when `None`). A failed
/// header read is recorded as the buffer's error.
pub(crate) fn new_from_path(path: &Path, cache: Option<RawRef>) -> RawRef {
    let raw = new_empty();
    let cache = cache.unwrap_or_else(|| cache::create(true));
    with(raw, |b| {
        b.attach_cache(Some(cache));
        if b.cache.is_none() {
            b.name = path.display().to_string();
            return b.record(Err(cache::DESTROYED.to_string()));
        }
        let result = b.init_spec(path, 0, 0);
        b.record(result)
    });
    raw
}

/// Allocate zeroed local pixels for `spec`. A spec too large to allocate
/// leaves the buffer uninitialized with the failure recorded.
pub(crate) fn new_from_spec(data: SpecData) -> RawRef {
    let raw = new_empty();
    with(raw, |b| {
        let result = zeroed_pixels(&data).map(|pixels| {
            b.pixels = Some(Arc::new(pixels));
            b.storage = Storage::LocalBuffer;
            b.nsubimages = 1;
            b.nmiplevels = 1;
            b.set_specs(data.clone(), data);
        });
        b.record(result)
    });
    raw
}

fn zeroed_pixels(data: &SpecData) -> Result<Vec<f32>, String> {
    let count = data
        .image_pixels()
        .checked_mul(usize::try_from(data.nchannels).unwrap_or(0))
        .filter(|_| data.size_safe())
        .ok_or_else(|| {
            format!(
                "ImageBuf: image of {}x{}x{} with {} channels is too large",
                data.width,
                data.height,
                data.depth.max(1),
                data.nchannels
            )
        })?;
    let mut pixels = Vec::new();
    pixels.try_reserve_exact(count).map_err(|e| {
        format!("ImageBuf: could not allocate {count} pixel values: {e}")
    })?;
    pixels.resize(count, 0.0);
    Ok(pixels)
}

pub(crate) fn free(raw: RawRef) {
    if let Some(object) = BUFS.remove(raw) {
        let mut buf = super::registry::lock(&object);
        buf.attach_cache(None);
        spec::free(buf.spec);
        spec::free(buf.nativespec);
    }
}

pub(crate) fn geterror(raw: RawRef) -> String {
    with(raw, |b| std::mem::take(&mut b.error))
}

pub(crate) fn initialized(raw: RawRef) -> bool {
    with(raw, |b| b.initialized())
}

pub(crate) fn clear(raw: RawRef) {
    with(raw, |b| b.reset());
}

pub(crate) fn storage(raw: RawRef) -> Storage {
    with(raw, |b| b.storage)
}

pub(crate) fn spec_ref(raw: RawRef) -> Option<RawRef> {
    BUFS.with(raw, |b| b.spec)
}

pub(crate) fn nativespec_ref(raw: RawRef) -> Option<RawRef> {
    BUFS.with(raw, |b| b.nativespec)
}

pub(crate) fn name(raw: RawRef) -> String {
    with(raw, |b| b.name.clone())
}

pub(crate) fn file_format_name(raw: RawRef) -> String {
    with(raw, |b| b.file_format.clone())
}

pub(crate) fn subimage(raw: RawRef) -> i32 {
    with(raw, |b| b.subimage)
}

pub(crate) fn nsubimages(raw: RawRef) -> i32 {
    with(raw, |b| b.nsubimages)
}

pub(crate) fn miplevel(raw: RawRef) -> i32 {
    with(raw, |b| b.miplevel)
}

pub(crate) fn nmiplevels(raw: RawRef) -> i32 {
    with(raw, |b| b.nmiplevels)
}

pub(crate) fn init_spec(raw: RawRef, path: &Path, subimage: i32, miplevel: i32) -> bool {
    with(raw, |b| {
        let result = b.init_spec(path, subimage, miplevel);
        b.record(result)
    })
}

pub(crate) fn read(
    raw: RawRef,
    force: bool,
    convert: TypeDesc,
    progress: Option<&mut dyn ProgressCallback>,
) -> bool {
    with(raw, |b| {
        let result = b.read(force, convert, progress);
        b.record(result)
    })
}

pub(crate) fn write_file(
    raw: RawRef,
    path: &Path,
    format: &str,
    progress: Option<&mut dyn ProgressCallback>,
) -> bool {
    with(raw, |b| {
        let result = b.write_file(path, format, progress);
        b.record(result)
    })
}

pub(crate) fn write_output(
    raw: RawRef,
    out: RawRef,
    progress: Option<&mut dyn ProgressCallback>,
) -> bool {
    with(raw, |b| {
        let result = b
            .ensure_pixels()
            .and_then(|pixels| output::write_image(out, &b.spec_data(), &pixels, progress));
        b.record(result)
    })
}

pub(crate) fn set_write_format(raw: RawRef, format: TypeDesc) {
    with(raw, |b| b.write_format = format);
}

pub(crate) fn set_write_tiles(raw: RawRef, width: i32, height: i32, depth: i32) {
    with(raw, |b| b.write_tiles = [width, height, depth]);
}

fn snapshot_of(src: RawRef) -> Result<Snapshot, String> {
    BUFS.with(src, |b| {
        let snap = b.snapshot();
        if let Err(message) = &snap {
            b.record(Err(message.clone()));
        }
        snap
    })
    .unwrap_or_else(|| Err("source ImageBuf has been released".to_string()))
}

pub(crate) fn copy_metadata(dst: RawRef, src: RawRef) -> bool {
    let Some(src_spec) = spec_ref(src).and_then(spec::snapshot) else {
        return with(dst, |b| b.record(Err("source ImageBuf has been released".into())));
    };
    with(dst, |b| {
        spec::write(b.spec, |s| s.copy_metadata_from(&src_spec));
        true
    })
}

pub(crate) fn copy_pixels(dst: RawRef, src: RawRef) -> bool {
    if dst == src {
        return true;
    }
    let snap = snapshot_of(src);
    with(dst, |b| {
        let result = snap.and_then(|s| b.copy_pixels_from(s));
        b.record(result)
    })
}

pub(crate) fn copy(dst: RawRef, src: RawRef) -> bool {
    if dst == src {
        return true;
    }
    let snap = snapshot_of(src);
    with(dst, |b| {
        let result = snap.map(|s| b.copy_from(s));
        b.record(result)
    })
}

pub(crate) fn get_pixel(raw: RawRef, x: i32, y: i32, z: i32) -> Option<Vec<f32>> {
    with(raw, |b| {
        let result = b.get_pixel(x, y, z);
        match result {
            Ok(values) => Some(values),
            Err(message) => {
                b.record(Err(message));
                None
            }
        }
    })
}

pub(crate) fn set_pixel(raw: RawRef, x: i32, y: i32, z: i32, values: &[f32]) -> bool {
    with(raw, |b| {
        let result = b.set_pixel(x, y, z, values);
        b.record(result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_test_png;

    #[test]
    fn free_releases_owned_specs() {
        let raw = new_empty();
        let spec = spec_ref(raw).unwrap();
        assert!(spec::SPECS.contains(spec));
        free(raw);
        assert!(!spec::SPECS.contains(spec));
        assert!(!BUFS.contains(raw));
    }

    #[test]
    fn path_buffer_reads_lazily() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("lazy.png");
        write_test_png(&path, 4, 3);
        let cache = cache::create(false);

        let raw = new_from_path(&path, Some(cache));
        assert_eq!(storage(raw), Storage::ImageCache);
        assert!(BUFS.with(raw, |b| b.pixels.is_none()).unwrap());

        let px = get_pixel(raw, 1, 2, 0).unwrap();
        assert_eq!(px.len(), 3);
        assert!((px[0] - 1.0 / 255.0).abs() < 1e-6);
        assert!((px[1] - 2.0 / 255.0).abs() < 1e-6);

        free(raw);
        cache::destroy(cache, false);
    }

    #[test]
    fn set_pixel_detaches_from_cache_pixels() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cow.png");
        write_test_png(&path, 2, 2);
        let cache = cache::create(false);
        let a = new_from_path(&path, Some(cache));
        let b = new_from_path(&path, Some(cache));

        assert!(set_pixel(a, 0, 0, 0, &[1.0, 1.0, 1.0]));
        assert_eq!(storage(a), Storage::LocalBuffer);
        assert_eq!(get_pixel(a, 0, 0, 0).unwrap(), vec![1.0, 1.0, 1.0]);
        assert_ne!(get_pixel(b, 0, 0, 0).unwrap(), vec![1.0, 1.0, 1.0]);

        free(a);
        free(b);
        cache::destroy(cache, false);
    }

    #[test]
    fn pixel_outside_window_is_an_error() {
        let raw = new_from_spec(SpecData::with_size(2, 2, 1, TypeDesc::UInt8));
        assert!(get_pixel(raw, 2, 0, 0).is_none());
        assert!(geterror(raw).contains("outside the data window"));
        free(raw);
    }

    #[test]
    fn read_after_cache_teardown_fails_deterministically() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("orphan.png");
        write_test_png(&path, 2, 2);
        let cache = cache::create(false);
        let raw = new_from_path(&path, Some(cache));
        cache::destroy(cache, true);

        assert!(!read(raw, false, TypeDesc::Unknown, None));
        assert_eq!(geterror(raw), cache::DESTROYED);
        free(raw);
    }

    #[test]
    fn copy_pixels_zero_fills_outside_source() {
        let src = new_from_spec(SpecData::with_size(2, 2, 1, TypeDesc::Float));
        assert!(set_pixel(src, 1, 1, 0, &[0.75]));
        let dst = new_from_spec(SpecData::with_size(3, 3, 2, TypeDesc::Float));
        assert!(set_pixel(dst, 2, 2, 0, &[0.5, 0.5]));

        assert!(copy_pixels(dst, src));
        assert_eq!(get_pixel(dst, 1, 1, 0).unwrap(), vec![0.75, 0.0]);
        assert_eq!(get_pixel(dst, 2, 2, 0).unwrap(), vec![0.0, 0.0]);
        free(src);
        free(dst);
    }

    #[test]
    fn pixel_access_after_spec_resize_is_an_error() {
        let raw = new_from_spec(SpecData::with_size(2, 2, 3, TypeDesc::UInt8));
        let working = spec_ref(raw).unwrap();

        spec::write(working, |s| s.width = 100);
        assert!(get_pixel(raw, 50, 1, 0).is_none());
        assert!(geterror(raw).contains("pixel storage does not match spec"));

        spec::write(working, |s| {
            s.width = 2;
            s.nchannels = 4;
        });
        assert!(!set_pixel(raw, 1, 1, 0, &[1.0; 4]));
        assert!(geterror(raw).contains("pixel storage does not match spec"));

        let src = new_from_spec(SpecData::with_size(2, 2, 3, TypeDesc::UInt8));
        assert!(!copy_pixels(raw, src));
        assert!(geterror(raw).contains("pixel storage does not match spec"));

        spec::write(working, |s| s.nchannels = 3);
        assert_eq!(get_pixel(raw, 1, 1, 0).unwrap(), vec![0.0; 3]);
        free(raw);
        free(src);
    }

    #[test]
    fn oversized_spec_leaves_buffer_uninitialized() {
        let raw = new_from_spec(SpecData::with_size(i32::MAX, i32::MAX, 4, TypeDesc::Float));
        assert!(!initialized(raw));
        assert!(geterror(raw).contains("too large"));
        free(raw);
    }
}
