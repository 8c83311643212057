//! File decode/encode for the native layer, built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Header probe | `ImageReader::into_decoder` + `ImageDecoder::{dimensions, color_type, orientation}` |
//! | Decode (JPEG, PNG, TIFF, WebP) | `DynamicImage::from_decoder`, then `to_*32f` |
//! | Encode PNG | `png::Encoder`, attributes as text chunks (see [`super::metadata`]) |
//! | Encode TIFF | `tiff::encoder::TiffEncoder`, attributes as tags |
//! | Encode JPEG, WebP | `DynamicImage::save_with_format` after quantizing to the write format |
//!
//! Pixels are held as interleaved `f32`, normalized to `[0, 1]` for
//! integer formats, one row after another.

use super::metadata;
use super::spec::SpecData;
use crate::progress::{self, ProgressCallback};
use crate::typedesc::TypeDesc;
use image::{DynamicImage, ImageBuffer, ImageDecoder, ImageFormat, ImageReader};
use std::path::Path;
use thiserror::Error;

/// Rows transferred between two progress reports.
const ROWS_PER_REPORT: usize = 16;

#[derive(Error, Debug)]
pub(crate) enum CodecError {
    #[error("Could not open file \"{path}\": {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("\"{0}\": could not determine the file format")]
    UnknownFormat(String),
    #[error("{format} error reading \"{path}\": {message}")]
    Decode {
        format: String,
        path: String,
        message: String,
    },
    #[error("{format} error writing \"{path}\": {message}")]
    Encode {
        format: String,
        path: String,
        message: String,
    },
    #[error("Could not find a format writer for \"{0}\"")]
    NoWriter(String),
    #[error("{format} does not support {channels}-channel images")]
    Channels { format: String, channels: i32 },
    #[error("pixel data holds {actual} values, expected {expected}")]
    PixelCount { expected: usize, actual: usize },
    #[error("{0} aborted by progress callback")]
    Aborted(&'static str),
}

/// Header-only view of a file: its format and spec.
#[derive(Debug, Clone)]
pub(crate) struct Header {
    pub format: ImageFormat,
    pub spec: SpecData,
}

/// Short lowercase name of a file format ("png", "jpeg", ...).
pub(crate) fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Tiff => "tiff",
        ImageFormat::WebP => "webp",
        other => other.extensions_str().first().copied().unwrap_or("unknown"),
    }
}

/// Resolve an explicit format name, or infer it from the path when empty.
pub(crate) fn output_format(path: &Path, name: &str) -> Result<ImageFormat, CodecError> {
    let format = if name.is_empty() {
        ImageFormat::from_path(path).ok()
    } else {
        match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            other => ImageFormat::from_extension(other),
        }
    };
    format
        .filter(|f| f.writing_enabled())
        .ok_or_else(|| CodecError::NoWriter(path.display().to_string()))
}

/// Whether a format writer supports an optional feature.
pub(crate) fn supports(format: ImageFormat, feature: &str) -> bool {
    // None of the writers handle multiimage, tiles, mipmap or deepdata.
    feature == "alpha" && !matches!(format, ImageFormat::Jpeg)
}

fn spec_for(width: u32, height: u32, color: image::ColorType, orientation: u8) -> SpecData {
    let channels = color.channel_count();
    let bytes_per_channel = color.bytes_per_pixel() / channels.max(1);
    let format = match bytes_per_channel {
        1 => TypeDesc::UInt8,
        2 => TypeDesc::UInt16,
        _ => TypeDesc::Float,
    };
    let mut spec = SpecData::with_size(
        i32::try_from(width).unwrap_or(i32::MAX),
        i32::try_from(height).unwrap_or(i32::MAX),
        i32::from(channels),
        format,
    );
    if channels == 2 {
        spec.channelnames = vec!["Y".to_string(), "A".to_string()];
        spec.alpha_channel = 1;
    }
    if orientation != 1 {
        spec.extra_attribs.set("Orientation", i32::from(orientation).into());
    }
    spec
}

type FileReader = ImageReader<std::io::BufReader<std::fs::File>>;

fn open_reader(path: &Path) -> Result<(ImageFormat, FileReader), CodecError> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|source| CodecError::Open {
            path: path.display().to_string(),
            source,
        })?;
    let format = reader
        .format()
        .ok_or_else(|| CodecError::UnknownFormat(path.display().to_string()))?;
    Ok((format, reader))
}

fn decode_error(format: ImageFormat, path: &Path, err: image::ImageError) -> CodecError {
    CodecError::Decode {
        format: format_name(format).to_string(),
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Read just enough of the file to fill out its spec.
pub(crate) fn probe(path: &Path) -> Result<Header, CodecError> {
    let (format, reader) = open_reader(path)?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| decode_error(format, path, e))?;
    let (width, height) = decoder.dimensions();
    let orientation = decoder.orientation().map(|o| o.to_exif()).unwrap_or(1);
    let mut spec = spec_for(width, height, decoder.color_type(), orientation);
    metadata::read_attributes(path, format, &mut spec.extra_attribs);
    Ok(Header { format, spec })
}

/// Decode the whole file into normalized float pixels.
pub(crate) fn decode(
    path: &Path,
    mut progress: Option<&mut dyn ProgressCallback>,
) -> Result<(Header, Vec<f32>), CodecError> {
    if progress::report(&mut progress, 0.0) {
        return Err(CodecError::Aborted("read"));
    }
    let (format, reader) = open_reader(path)?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| decode_error(format, path, e))?;
    let orientation = decoder.orientation().map(|o| o.to_exif()).unwrap_or(1);
    let image = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(format, path, e))?;
    let mut spec = spec_for(image.width(), image.height(), image.color(), orientation);
    metadata::read_attributes(path, format, &mut spec.extra_attribs);

    let decoded = match spec.nchannels {
        1 => image.to_luma32f().into_raw(),
        2 => image.to_luma_alpha32f().into_raw(),
        3 => image.to_rgb32f().into_raw(),
        _ => image.to_rgba32f().into_raw(),
    };
    let pixels = transfer_rows(&decoded, &spec, spec.format, &mut progress, "read")?;
    Ok((Header { format, spec }, pixels))
}

/// Copy rows into fresh storage, quantizing to `format` and checking for
/// an abort request between row blocks.
pub(crate) fn transfer_rows(
    src: &[f32],
    spec: &SpecData,
    format: TypeDesc,
    progress: &mut Option<&mut dyn ProgressCallback>,
    what: &'static str,
) -> Result<Vec<f32>, CodecError> {
    let row_len = usize::try_from(spec.width).unwrap_or(0)
        * usize::try_from(spec.nchannels).unwrap_or(0);
    let rows = usize::try_from(spec.height).unwrap_or(0)
        * usize::try_from(spec.depth.max(1)).unwrap_or(1);
    if src.len() != row_len * rows {
        return Err(CodecError::PixelCount {
            expected: row_len * rows,
            actual: src.len(),
        });
    }
    let mut out = Vec::with_capacity(src.len());
    for (i, row) in src.chunks(row_len.max(1)).enumerate() {
        if i % ROWS_PER_REPORT == 0 && progress::report(progress, i as f32 / rows.max(1) as f32) {
            tracing::warn!(what, row = i, "aborted by progress callback");
            return Err(CodecError::Aborted(what));
        }
        out.extend(row.iter().map(|&v| quantize(v, format)));
    }
    progress::report(progress, 1.0);
    Ok(out)
}

/// Round a normalized value to what `format` can represent.
pub(crate) fn quantize(value: f32, format: TypeDesc) -> f32 {
    let levels = match format {
        TypeDesc::UInt8 | TypeDesc::Int8 => 255.0,
        TypeDesc::UInt16 | TypeDesc::Int16 => 65535.0,
        _ => return value,
    };
    (value.clamp(0.0, 1.0) * levels).round() / levels
}

pub(super) fn to_u8(pixels: &[f32]) -> Vec<u8> {
    pixels
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}

pub(super) fn to_u16(pixels: &[f32]) -> Vec<u16> {
    pixels
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
        .collect()
}

/// Width of the samples actually written for a requested data format.
#[derive(Clone, Copy, PartialEq)]
pub(super) enum Depth {
    Eight,
    Sixteen,
    Float,
}

fn build_image(
    width: u32,
    height: u32,
    channels: i32,
    depth: Depth,
    pixels: Vec<f32>,
) -> Option<DynamicImage> {
    use image::{Luma, LumaA, Rgb, Rgba};
    let image = match (depth, channels) {
        (Depth::Float, 3) => {
            DynamicImage::ImageRgb32F(ImageBuffer::<Rgb<f32>, _>::from_raw(width, height, pixels)?)
        }
        (Depth::Float, 4) => DynamicImage::ImageRgba32F(ImageBuffer::<Rgba<f32>, _>::from_raw(
            width, height, pixels,
        )?),
        (Depth::Float, _) => return build_image(width, height, channels, Depth::Sixteen, pixels),
        (Depth::Sixteen, 1) => {
            DynamicImage::ImageLuma16(ImageBuffer::from_raw(width, height, to_u16(&pixels))?)
        }
        (Depth::Sixteen, 2) => DynamicImage::ImageLumaA16(ImageBuffer::<LumaA<u16>, _>::from_raw(
            width,
            height,
            to_u16(&pixels),
        )?),
        (Depth::Sixteen, 3) => {
            DynamicImage::ImageRgb16(ImageBuffer::from_raw(width, height, to_u16(&pixels))?)
        }
        (Depth::Sixteen, 4) => {
            DynamicImage::ImageRgba16(ImageBuffer::from_raw(width, height, to_u16(&pixels))?)
        }
        (Depth::Eight, 1) => {
            DynamicImage::ImageLuma8(ImageBuffer::<Luma<u8>, _>::from_raw(width, height, to_u8(&pixels))?)
        }
        (Depth::Eight, 2) => {
            DynamicImage::ImageLumaA8(ImageBuffer::from_raw(width, height, to_u8(&pixels))?)
        }
        (Depth::Eight, 3) => {
            DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, to_u8(&pixels))?)
        }
        (Depth::Eight, 4) => {
            DynamicImage::ImageRgba8(ImageBuffer::from_raw(width, height, to_u8(&pixels))?)
        }
        _ => return None,
    };
    Some(image)
}

/// Encode pixels described by `spec` to `path`.
///
/// `data_format` selects the sample width written; formats that cannot hold
/// it are narrowed (JPEG and WebP to 8 bits, PNG to 16 bits).
pub(crate) fn encode(
    path: &Path,
    format: ImageFormat,
    spec: &SpecData,
    data_format: TypeDesc,
    pixels: &[f32],
    mut progress: Option<&mut dyn ProgressCallback>,
) -> Result<(), CodecError> {
    let name = format_name(format);
    if !(1..=4).contains(&spec.nchannels) {
        return Err(CodecError::Channels {
            format: name.to_string(),
            channels: spec.nchannels,
        });
    }
    let staged = transfer_rows(pixels, spec, data_format, &mut progress, "write")?;

    let mut depth = match data_format {
        TypeDesc::UInt8 | TypeDesc::Int8 | TypeDesc::Unknown => Depth::Eight,
        t if t.is_floating_point() => Depth::Float,
        _ => Depth::Sixteen,
    };
    match format {
        ImageFormat::Jpeg | ImageFormat::WebP => depth = Depth::Eight,
        ImageFormat::Png if depth == Depth::Float => depth = Depth::Sixteen,
        _ => {}
    }

    let width = u32::try_from(spec.width).unwrap_or(0);
    let height = u32::try_from(spec.height).unwrap_or(0);
    let encode_error = |message: String| CodecError::Encode {
        format: name.to_string(),
        path: path.display().to_string(),
        message,
    };
    match format {
        ImageFormat::Png => {
            return metadata::write_png(
                path,
                width,
                height,
                spec.nchannels,
                depth,
                &staged,
                &spec.extra_attribs,
            )
            .map_err(encode_error);
        }
        ImageFormat::Tiff if spec.nchannels == 2 => {
            return Err(CodecError::Channels {
                format: name.to_string(),
                channels: 2,
            });
        }
        ImageFormat::Tiff => {
            return metadata::write_tiff(
                path,
                width,
                height,
                spec.nchannels,
                depth,
                &staged,
                &spec.extra_attribs,
            )
            .map_err(encode_error);
        }
        _ => {}
    }

    if !spec.extra_attribs.is_empty() {
        tracing::debug!(
            format = name,
            count = spec.extra_attribs.len(),
            "attributes not stored by this format"
        );
    }
    let actual = staged.len();
    let mut image = build_image(width, height, spec.nchannels, depth, staged).ok_or(
        CodecError::PixelCount {
            expected: spec.image_pixels() * usize::try_from(spec.nchannels).unwrap_or(0),
            actual,
        },
    )?;
    if format == ImageFormat::Jpeg {
        image = match spec.nchannels {
            1 | 2 => DynamicImage::ImageLuma8(image.to_luma8()),
            _ => DynamicImage::ImageRgb8(image.to_rgb8()),
        };
    }

    image
        .save_with_format(path, format)
        .map_err(|e| encode_error(e.to_string()))
}
