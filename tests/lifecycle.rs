//! End-to-end handle lifecycle tests through the public API.
//!
//! Fixtures are written into a fresh `TempDir` per test. Every test that
//! reads files uses a private cache so tests stay independent when run in
//! parallel.

use image::{ImageBuffer, Rgb, Rgba};
use imageio_bind::{Error, ImageBuf, ImageCache, ImageOutput, ImageSpec, Storage, TypeDesc};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_rgb_png(path: &Path, width: u32, height: u32) {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 200]));
    img.save(path).unwrap();
}

fn fixture(tmp: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
    let path = tmp.path().join(name);
    write_rgb_png(&path, width, height);
    path
}

// =========================================================================
// Release
// =========================================================================

#[test]
fn every_handle_type_releases_idempotently() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "a.png", 4, 4);
    let mut cache = ImageCache::create(false);

    let mut buf = ImageBuf::open_with_cache(&path, &cache).unwrap();
    buf.release();
    buf.release();
    assert_eq!(buf.last_error(), Some(Error::Released));
    assert_eq!(buf.read(false), Err(Error::Released));
    assert_eq!(buf.spec().width(), 0);

    let mut spec = ImageSpec::with_size(4, 4, 3, TypeDesc::UInt8);
    spec.release();
    spec.release();
    assert_eq!(spec.last_error(), Some(Error::Released));
    assert_eq!(spec.nchannels(), 0);

    let mut out = ImageOutput::create(tmp.path().join("o.png")).unwrap();
    out.close();
    out.close();
    assert_eq!(out.last_error(), Some(Error::Released));

    cache.destroy(false);
    cache.destroy(true);
    assert_eq!(cache.last_error(), Some(Error::Released));
    assert_eq!(cache.invalidate_all(true), Err(Error::Released));
}

#[test]
fn dropping_without_release_is_fine() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "drop.png", 2, 2);
    let cache = ImageCache::create(false);
    for _ in 0..8 {
        let mut buf = ImageBuf::from_path_with_cache(&path, Some(&cache));
        buf.read(false).unwrap();
    }
    assert!(cache.get_stats(1).contains("Attached buffers: 0"));
}

// =========================================================================
// Errors
// =========================================================================

#[test]
fn fresh_handles_have_no_error() {
    let cache = ImageCache::create(false);
    assert_eq!(cache.last_error(), None);
    assert_eq!(ImageBuf::new().last_error(), None);
    assert_eq!(ImageSpec::default().last_error(), None);
}

#[test]
fn nonexistent_path_yields_native_message() {
    let cache = ImageCache::create(false);
    let buf = ImageBuf::from_path_with_cache("/definitely/not/here.png", Some(&cache));
    match buf.last_error() {
        Some(Error::NativeOperationFailed(message)) => {
            assert!(!message.is_empty());
            assert!(message.contains("here.png"), "{message}");
        }
        other => panic!("expected a native error, got {other:?}"),
    }
}

// =========================================================================
// Spec
// =========================================================================

#[test]
fn default_four_by_four_rgb_spec() {
    let spec = ImageSpec::with_size(4, 4, 3, TypeDesc::Unknown);
    assert_eq!(spec.channel_names(), ["R", "G", "B"]);
    assert_eq!(spec.channel_bytes() * 3, spec.pixel_bytes(false));
    assert_eq!(spec.pixel_bytes(false), 3);
    assert_eq!(spec.image_bytes(false), 48);
    assert!(spec.size_safe());
}

#[test]
fn spec_views_follow_the_buffer() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "view.png", 6, 2);
    let cache = ImageCache::create(false);
    let mut buf = ImageBuf::open_with_cache(&path, &cache).unwrap();

    assert_eq!(buf.spec().width(), 6);
    buf.spec_mut().set_attribute("Artist", "tester").unwrap();
    assert_eq!(buf.spec().get_string_attribute("artist", ""), "tester");

    // An owned copy does not see later edits.
    let copy = buf.spec().clone();
    buf.spec_mut().set_attribute("Artist", "changed").unwrap();
    assert_eq!(copy.get_string_attribute("Artist", ""), "tester");
}

// =========================================================================
// Buffers and caches
// =========================================================================

#[test]
fn cached_read_then_local_modification() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "px.png", 5, 5);
    let cache = ImageCache::create(false);
    let mut buf = ImageBuf::open_with_cache(&path, &cache).unwrap();

    buf.read(false).unwrap();
    assert_eq!(buf.storage(), Storage::ImageCache);
    assert_eq!(buf.file_format_name(), "png");
    assert_eq!((buf.nsubimages(), buf.nmiplevels()), (1, 1));

    buf.set_pixel(0, 0, 0, &[0.0, 0.0, 0.0]).unwrap();
    assert_eq!(buf.storage(), Storage::LocalBuffer);
    assert_eq!(buf.get_pixel(0, 0, 0).unwrap(), vec![0.0, 0.0, 0.0]);
    assert!(buf.get_pixel(5, 0, 0).is_err());
}

#[test]
fn pixel_access_after_spec_edit_reports_mismatch() {
    let mut buf = ImageBuf::from_spec(&ImageSpec::with_size(2, 2, 3, TypeDesc::UInt8));

    buf.spec_mut().set_width(100).unwrap();
    let err = buf.get_pixel(50, 1, 0).unwrap_err();
    assert!(err.to_string().contains("pixel storage does not match spec"), "{err}");

    buf.spec_mut().set_width(2).unwrap();
    buf.spec_mut().set_nchannels(4).unwrap();
    let err = buf.set_pixel(1, 1, 0, &[1.0; 4]).unwrap_err();
    assert!(err.to_string().contains("pixel storage does not match spec"), "{err}");
}

#[test]
fn oversized_spec_gives_uninitialized_buffer() {
    let spec = ImageSpec::with_size(i32::MAX, i32::MAX, 4, TypeDesc::Float);
    let buf = ImageBuf::from_spec(&spec);
    assert!(!buf.initialized());
    assert_eq!(buf.storage(), Storage::Uninitialized);
    match buf.last_error() {
        Some(Error::NativeOperationFailed(message)) => assert!(message.contains("too large")),
        other => panic!("expected a native error, got {other:?}"),
    }
}

#[test]
fn subimage_out_of_range_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "sub.png", 2, 2);
    let mut buf = ImageBuf::new();
    let err = buf.init_spec(&path, 1, 0).unwrap_err();
    assert!(err.to_string().contains("Invalid subimage"), "{err}");
}

#[test]
fn copy_makes_an_independent_local_buffer() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "src.png", 3, 3);
    let cache = ImageCache::create(false);
    let src = ImageBuf::open_with_cache(&path, &cache).unwrap();

    let mut dst = ImageBuf::new();
    dst.copy(&src).unwrap();
    assert_eq!(dst.storage(), Storage::LocalBuffer);
    assert_eq!(dst.spec().width(), 3);
    assert_eq!(dst.get_pixel(2, 1, 0).unwrap(), src.get_pixel(2, 1, 0).unwrap());

    let mut meta = ImageBuf::from_spec(&ImageSpec::with_size(1, 1, 1, TypeDesc::Float));
    let mut src_spec_owner = ImageBuf::from_spec(&ImageSpec::with_size(9, 9, 3, TypeDesc::UInt8));
    src_spec_owner.spec_mut().set_attribute("Copyright", "me").unwrap();
    meta.copy_metadata(&src_spec_owner).unwrap();
    assert_eq!(meta.spec().get_string_attribute("Copyright", ""), "me");
    assert_eq!(meta.spec().width(), 1);
}

#[test]
fn invalidate_all_respects_modification_times() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "inv.png", 2, 2);
    let cache = ImageCache::create(false);
    cache.get_imagespec(&path).unwrap();

    cache.invalidate_all(false).unwrap();
    assert!(cache.get_stats(2).contains("inv.png"));
    cache.invalidate(&path).unwrap();
    assert!(!cache.get_stats(2).contains("inv.png"));
}

#[test]
fn buffer_outlives_torn_down_private_cache() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "orphan.png", 2, 2);
    let mut cache = ImageCache::create(false);
    let mut buf = ImageBuf::open_with_cache(&path, &cache).unwrap();
    cache.destroy(true);

    let err = buf.read(false).unwrap_err();
    assert_eq!(
        err,
        Error::NativeOperationFailed("ImageCache has been destroyed".into())
    );
    // A forced read bypasses the cache entirely.
    buf.read(true).unwrap();
    assert_eq!(buf.storage(), Storage::LocalBuffer);
}

// =========================================================================
// Writing
// =========================================================================

#[test]
fn write_file_with_data_format_and_reread() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "in.png", 8, 4);
    let out = tmp.path().join("out.tif");
    let cache = ImageCache::create(false);

    let mut buf = ImageBuf::open_with_cache(&path, &cache).unwrap();
    buf.set_write_format(TypeDesc::UInt16).unwrap();
    let mut reports = Vec::new();
    let mut record = |f: f32| {
        reports.push(f);
        false
    };
    buf.write_file_with_progress(&out, "", &mut record).unwrap();
    assert!(!reports.is_empty());

    let back = ImageBuf::open_with_cache(&out, &cache).unwrap();
    assert_eq!(back.file_format_name(), "tiff");
    assert_eq!(back.spec().format(), TypeDesc::UInt16);
    assert_eq!((back.spec().width(), back.spec().height()), (8, 4));
}

#[test]
fn written_attributes_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = fixture(&tmp, "meta.png", 3, 3);
    let cache = ImageCache::create(false);
    let mut buf = ImageBuf::open_with_cache(&path, &cache).unwrap();
    buf.spec_mut().set_attribute("Software", "imageio").unwrap();
    buf.spec_mut().set_attribute("Orientation", 8).unwrap();
    buf.spec_mut().set_attribute("Comment", "made in a test").unwrap();

    let tif = tmp.path().join("meta.tif");
    buf.write_file(&tif, "").unwrap();
    let back = ImageBuf::open_with_cache(&tif, &cache).unwrap();
    assert_eq!(back.spec().get_string_attribute("Software", ""), "imageio");
    assert_eq!(back.orientation(), 8);
    // Not a TIFF baseline tag.
    assert_eq!(back.spec().get_string_attribute("Comment", "none"), "none");

    let png = tmp.path().join("meta_out.png");
    buf.write_file(&png, "").unwrap();
    let back = ImageBuf::open_with_cache(&png, &cache).unwrap();
    assert_eq!(back.spec().get_string_attribute("Software", ""), "imageio");
    assert_eq!(back.spec().get_string_attribute("Comment", ""), "made in a test");
}

#[test]
fn aborting_a_write_fails_it() {
    let tmp = TempDir::new().unwrap();
    let buf = ImageBuf::from_spec(&ImageSpec::with_size(4, 40, 3, TypeDesc::UInt8));
    let mut abort = |_: f32| true;
    let err = buf
        .write_file_with_progress(tmp.path().join("never.png"), "", &mut abort)
        .unwrap_err();
    assert!(err.to_string().contains("aborted"), "{err}");
}

#[test]
fn rgba_round_trip_keeps_alpha_channel() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("alpha.png");
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_fn(2, 2, |_, _| Rgba([10, 20, 30, 255]));
    img.save(&path).unwrap();
    let cache = ImageCache::create(false);
    let buf = ImageBuf::open_with_cache(&path, &cache).unwrap();
    assert_eq!(buf.nchannels(), 4);
    assert_eq!(buf.spec().alpha_channel(), 3);
    assert_eq!(buf.spec().channel_names(), ["R", "G", "B", "A"]);
}
