//! Attributes embedded in image files.
//!
//! | Format | Written | Read back |
//! |---|---|---|
//! | PNG | every attribute except `Orientation` as an `iTXt` chunk | `tEXt`, `zTXt` and `iTXt` chunks, as text |
//! | TIFF | the baseline ASCII tags below, plus `Orientation` | the same tags |
//! | JPEG, WebP | nothing | EXIF orientation only (through `image`) |
//!
//! PNG text chunks carry no type, so numeric attributes come back as their
//! decimal text. PNG orientation belongs in an `eXIf` block, which is not
//! written.

use super::codec::{Depth, to_u8, to_u16};
use crate::attribute::{Attribute, ParamList};
use crate::typedesc::TypeDesc;
use image::ImageFormat;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;
use tiff::encoder::{TiffEncoder, TiffValue, colortype};
use tiff::tags::Tag;

/// Attribute names stored as TIFF ASCII tags.
const TIFF_TEXT_TAGS: &[(&str, Tag)] = &[
    ("Artist", Tag::Artist),
    ("Copyright", Tag::Copyright),
    ("DateTime", Tag::DateTime),
    ("HostComputer", Tag::HostComputer),
    ("ImageDescription", Tag::ImageDescription),
    ("Make", Tag::Make),
    ("Model", Tag::Model),
    ("Software", Tag::Software),
];

/// Which attributes a writer for `format` would store.
fn persisted<'a>(format: ImageFormat, attribs: &'a ParamList) -> Vec<&'a Attribute> {
    attribs
        .iter()
        .filter(|a| match format {
            ImageFormat::Png => {
                !a.name.eq_ignore_ascii_case("Orientation") && valid_png_keyword(&a.name)
            }
            ImageFormat::Tiff => {
                (tiff_text_tag(&a.name).is_some() && a.value.type_desc() == TypeDesc::String)
                    || (a.name.eq_ignore_ascii_case("Orientation") && a.value.as_int().is_some())
            }
            _ => false,
        })
        .collect()
}

fn tiff_text_tag(name: &str) -> Option<Tag> {
    TIFF_TEXT_TAGS
        .iter()
        .find(|(tag_name, _)| tag_name.eq_ignore_ascii_case(name))
        .map(|(_, tag)| *tag)
}

/// PNG keywords are 1-79 printable Latin-1 characters without leading,
/// trailing or doubled spaces.
fn valid_png_keyword(name: &str) -> bool {
    (1..=79).contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_graphic() || b == b' ')
        && !name.starts_with(' ')
        && !name.ends_with(' ')
        && !name.contains("  ")
}

/// Text written for an attribute value. Unlike `Display`, strings are not
/// quoted.
fn text_of(attr: &Attribute) -> String {
    match attr.value.as_str() {
        Some(s) => s.to_string(),
        None => attr.value.to_string(),
    }
}

pub(super) fn write_png(
    path: &Path,
    width: u32,
    height: u32,
    channels: i32,
    depth: Depth,
    pixels: &[f32],
    attribs: &ParamList,
) -> Result<(), String> {
    let color = match channels {
        1 => png::ColorType::Grayscale,
        2 => png::ColorType::GrayscaleAlpha,
        3 => png::ColorType::Rgb,
        _ => png::ColorType::Rgba,
    };
    let (bit_depth, data) = match depth {
        Depth::Eight => (png::BitDepth::Eight, to_u8(pixels)),
        _ => (
            png::BitDepth::Sixteen,
            to_u16(pixels)
                .into_iter()
                .flat_map(u16::to_be_bytes)
                .collect(),
        ),
    };

    let file = File::create(path).map_err(|e| e.to_string())?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(color);
    encoder.set_depth(bit_depth);
    for attr in persisted(ImageFormat::Png, attribs) {
        encoder
            .add_itxt_chunk(attr.name.clone(), text_of(attr))
            .map_err(|e| e.to_string())?;
    }
    let mut writer = encoder.write_header().map_err(|e| e.to_string())?;
    writer.write_image_data(&data).map_err(|e| e.to_string())?;
    writer.finish().map_err(|e| e.to_string())
}

pub(super) fn write_tiff(
    path: &Path,
    width: u32,
    height: u32,
    channels: i32,
    depth: Depth,
    pixels: &[f32],
    attribs: &ParamList,
) -> Result<(), String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    let mut tiff = TiffEncoder::new(BufWriter::new(file)).map_err(|e| e.to_string())?;
    let result = match (depth, channels) {
        (Depth::Eight, 1) => tiff_image::<colortype::Gray8, _>(&mut tiff, width, height, &to_u8(pixels), attribs),
        (Depth::Eight, 3) => tiff_image::<colortype::RGB8, _>(&mut tiff, width, height, &to_u8(pixels), attribs),
        (Depth::Eight, 4) => tiff_image::<colortype::RGBA8, _>(&mut tiff, width, height, &to_u8(pixels), attribs),
        (Depth::Sixteen, 1) => tiff_image::<colortype::Gray16, _>(&mut tiff, width, height, &to_u16(pixels), attribs),
        (Depth::Sixteen, 3) => tiff_image::<colortype::RGB16, _>(&mut tiff, width, height, &to_u16(pixels), attribs),
        (Depth::Sixteen, 4) => tiff_image::<colortype::RGBA16, _>(&mut tiff, width, height, &to_u16(pixels), attribs),
        (Depth::Float, 1) => tiff_image::<colortype::Gray32Float, _>(&mut tiff, width, height, pixels, attribs),
        (Depth::Float, 3) => tiff_image::<colortype::RGB32Float, _>(&mut tiff, width, height, pixels, attribs),
        (Depth::Float, 4) => tiff_image::<colortype::RGBA32Float, _>(&mut tiff, width, height, pixels, attribs),
        _ => return Err(format!("no TIFF layout for {channels}-channel images")),
    };
    result.map_err(|e| e.to_string())
}

fn tiff_image<C, W>(
    tiff: &mut TiffEncoder<W>,
    width: u32,
    height: u32,
    data: &[C::Inner],
    attribs: &ParamList,
) -> tiff::TiffResult<()>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
    W: Write + Seek,
{
    let mut image = tiff.new_image::<C>(width, height)?;
    for attr in persisted(ImageFormat::Tiff, attribs) {
        if let Some(tag) = tiff_text_tag(&attr.name)
            && let Some(text) = attr.value.as_str()
        {
            image.encoder().write_tag(tag, text)?;
        } else if let Some(orientation) = attr.value.as_int()
            && let Ok(orientation) = u16::try_from(orientation)
            && (1..=8).contains(&orientation)
        {
            image.encoder().write_tag(Tag::Orientation, orientation)?;
        }
    }
    image.write_data(data)
}

/// Merge attributes embedded in `path` into `attribs`. Unreadable metadata
/// is not an error; the pixels may still decode.
pub(super) fn read_attributes(path: &Path, format: ImageFormat, attribs: &mut ParamList) {
    let result = match format {
        ImageFormat::Png => read_png_text(path, attribs),
        ImageFormat::Tiff => read_tiff_tags(path, attribs),
        _ => Ok(()),
    };
    if let Err(message) = result {
        tracing::debug!(path = %path.display(), %message, "embedded attributes skipped");
    }
}

fn read_png_text(path: &Path, attribs: &mut ParamList) -> Result<(), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let reader = png::Decoder::new(BufReader::new(file))
        .read_info()
        .map_err(|e| e.to_string())?;
    let info = reader.info();
    for chunk in &info.uncompressed_latin1_text {
        attribs.set(&chunk.keyword, chunk.text.clone().into());
    }
    for chunk in &info.compressed_latin1_text {
        if let Ok(text) = chunk.get_text() {
            attribs.set(&chunk.keyword, text.into());
        }
    }
    for chunk in &info.utf8_text {
        if let Ok(text) = chunk.get_text() {
            attribs.set(&chunk.keyword, text.into());
        }
    }
    Ok(())
}

fn read_tiff_tags(path: &Path, attribs: &mut ParamList) -> Result<(), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut decoder = tiff::decoder::Decoder::new(BufReader::new(file)).map_err(|e| e.to_string())?;
    for (name, tag) in TIFF_TEXT_TAGS {
        if let Ok(text) = decoder.get_tag_ascii_string(*tag) {
            let text = text.trim_end_matches('\0');
            if !text.is_empty() {
                attribs.set(name, text.into());
            }
        }
    }
    if let Ok(orientation) = decoder.get_tag_u32(Tag::Orientation)
        && let Ok(orientation) = i32::try_from(orientation)
        && orientation != 1
    {
        attribs.set("Orientation", orientation.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParamList {
        let mut attribs = ParamList::new();
        attribs.set("Software", "imageio".into());
        attribs.set("Artist", "someone".into());
        attribs.set("Orientation", 6.into());
        attribs.set("Quality", 90.into());
        attribs.set("bad  keyword", "x".into());
        attribs
    }

    #[test]
    fn png_stores_text_chunks_but_not_orientation() {
        let attribs = sample();
        let names: Vec<&str> = persisted(ImageFormat::Png, &attribs)
            .into_iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, ["Software", "Artist", "Quality"]);
    }

    #[test]
    fn tiff_stores_known_tags_only() {
        let attribs = sample();
        let names: Vec<&str> = persisted(ImageFormat::Tiff, &attribs)
            .into_iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, ["Software", "Artist", "Orientation"]);
        assert!(persisted(ImageFormat::Jpeg, &sample()).is_empty());
    }

    #[test]
    fn png_text_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("text.png");
        write_png(&path, 2, 1, 1, Depth::Eight, &[0.0, 1.0], &sample()).unwrap();

        let mut back = ParamList::new();
        read_attributes(&path, ImageFormat::Png, &mut back);
        assert_eq!(back.get_string("Software", ""), "imageio");
        assert_eq!(back.get_string("Quality", ""), "90");
        assert!(back.find("Orientation", TypeDesc::Unknown, false).is_none());
    }

    #[test]
    fn tiff_tag_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tags.tif");
        write_tiff(&path, 1, 2, 3, Depth::Sixteen, &[0.5; 6], &sample()).unwrap();

        let mut back = ParamList::new();
        read_attributes(&path, ImageFormat::Tiff, &mut back);
        assert_eq!(back.get_string("Artist", ""), "someone");
        assert_eq!(back.get_string("Software", ""), "imageio");
        assert_eq!(back.get_int("Orientation", 1), 6);
        assert!(back.find("Quality", TypeDesc::Unknown, false).is_none());
    }
}
