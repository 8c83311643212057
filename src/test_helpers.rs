//! Shared test utilities.
//!
//! Fixtures are written on the fly with the `image` crate's encoders, so no
//! binary test data lives in the repository.
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = tmp.path().join("gradient.png");
//! write_test_png(&path, 4, 3);
//! ```

use image::{ImageBuffer, Rgb, RgbImage};
use std::path::Path;

/// Write an RGB8 PNG whose pixel (x, y) is `(x % 256, y % 256, 128)`.
pub fn write_test_png(path: &Path, width: u32, height: u32) {
    let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save(path).unwrap();
}
