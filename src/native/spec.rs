//! Native image spec objects.
//!
//! A spec is plain data: the data window, the display ("full") window,
//! tiling, channel layout and the extra attribute list. Every size helper
//! saturates at `usize::MAX` instead of overflowing.

use super::registry::{RawRef, Registry};
use crate::attribute::ParamList;
use crate::typedesc::TypeDesc;
use std::fmt::Write as _;
use std::sync::LazyLock;

pub(crate) static SPECS: LazyLock<Registry<SpecData>> = LazyLock::new(|| Registry::new("spec"));

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpecData {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub width: i32,
    pub height: i32,
    pub depth: i32,
    pub full_x: i32,
    pub full_y: i32,
    pub full_z: i32,
    pub full_width: i32,
    pub full_height: i32,
    pub full_depth: i32,
    pub tile_width: i32,
    pub tile_height: i32,
    pub tile_depth: i32,
    pub nchannels: i32,
    pub format: TypeDesc,
    pub channelformats: Vec<TypeDesc>,
    pub channelnames: Vec<String>,
    pub alpha_channel: i32,
    pub z_channel: i32,
    pub deep: bool,
    pub extra_attribs: ParamList,
}

impl SpecData {
    pub fn new(format: TypeDesc) -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            width: 0,
            height: 0,
            depth: 1,
            full_x: 0,
            full_y: 0,
            full_z: 0,
            full_width: 0,
            full_height: 0,
            full_depth: 1,
            tile_width: 0,
            tile_height: 0,
            tile_depth: 1,
            nchannels: 0,
            format: format.or_default_pixel(),
            channelformats: Vec::new(),
            channelnames: Vec::new(),
            alpha_channel: -1,
            z_channel: -1,
            deep: false,
            extra_attribs: ParamList::new(),
        }
    }

    pub fn with_size(width: i32, height: i32, nchannels: i32, format: TypeDesc) -> Self {
        let mut spec = Self {
            width,
            height,
            full_width: width,
            full_height: height,
            nchannels,
            ..Self::new(format)
        };
        spec.default_channel_names();
        spec
    }

    fn channels(&self) -> usize {
        usize::try_from(self.nchannels).unwrap_or(0)
    }

    /// "Y" for one channel, otherwise R, G, B, A, channel4, channel5, ...
    pub fn default_channel_names(&mut self) {
        self.channelnames.clear();
        self.alpha_channel = -1;
        self.z_channel = -1;
        let n = self.channels();
        if n == 1 {
            self.channelnames.push("Y".to_string());
            return;
        }
        for c in 0..n {
            let name = match c {
                0 => "R".to_string(),
                1 => "G".to_string(),
                2 => "B".to_string(),
                3 => "A".to_string(),
                _ => format!("channel{c}"),
            };
            self.channelnames.push(name);
        }
        if n >= 4 {
            self.alpha_channel = 3;
        }
    }

    pub fn set_format(&mut self, format: TypeDesc) {
        self.format = format.or_default_pixel();
        self.channelformats.clear();
    }

    pub fn channel_format(&self, chan: i32) -> TypeDesc {
        usize::try_from(chan)
            .ok()
            .and_then(|c| self.channelformats.get(c))
            .copied()
            .unwrap_or(self.format)
    }

    /// One entry per channel, falling back to `format` for each.
    pub fn channel_formats(&self) -> Vec<TypeDesc> {
        (0..self.nchannels).map(|c| self.channel_format(c)).collect()
    }

    pub fn channel_bytes(&self) -> usize {
        self.format.size()
    }

    pub fn channel_bytes_chan(&self, chan: i32, native: bool) -> usize {
        if chan < 0 || chan >= self.nchannels {
            return 0;
        }
        if native {
            self.channel_format(chan).size()
        } else {
            self.format.size()
        }
    }

    pub fn pixel_bytes(&self, native: bool) -> usize {
        self.pixel_bytes_chans(0, self.nchannels, native)
    }

    pub fn pixel_bytes_chans(&self, begin: i32, end: i32, native: bool) -> usize {
        let begin = begin.max(0);
        let end = end.min(self.nchannels);
        if end <= begin {
            return 0;
        }
        if native && !self.channelformats.is_empty() {
            (begin..end)
                .map(|c| self.channel_format(c).size())
                .fold(0usize, usize::saturating_add)
        } else {
            ((end - begin) as usize).saturating_mul(self.format.size())
        }
    }

    pub fn scanline_bytes(&self, native: bool) -> usize {
        dim(self.width).saturating_mul(self.pixel_bytes(native))
    }

    pub fn tile_pixels(&self) -> usize {
        if self.tile_width <= 0 || self.tile_height <= 0 {
            return 0;
        }
        dim(self.tile_width)
            .saturating_mul(dim(self.tile_height))
            .saturating_mul(dim(self.tile_depth.max(1)))
    }

    pub fn tile_bytes(&self, native: bool) -> usize {
        self.tile_pixels().saturating_mul(self.pixel_bytes(native))
    }

    pub fn image_pixels(&self) -> usize {
        dim(self.width)
            .saturating_mul(dim(self.height))
            .saturating_mul(dim(self.depth.max(1)))
    }

    pub fn image_bytes(&self, native: bool) -> usize {
        self.image_pixels().saturating_mul(self.pixel_bytes(native))
    }

    /// True when scanline, tile and image byte counts all fit in `usize`.
    pub fn size_safe(&self) -> bool {
        let pixel = self.pixel_bytes(true).max(self.pixel_bytes(false));
        let image = dim(self.width)
            .checked_mul(dim(self.height))
            .and_then(|p| p.checked_mul(dim(self.depth.max(1))))
            .and_then(|p| p.checked_mul(pixel));
        let tile = dim(self.tile_width)
            .checked_mul(dim(self.tile_height))
            .and_then(|p| p.checked_mul(dim(self.tile_depth.max(1))))
            .and_then(|p| p.checked_mul(pixel));
        image.is_some() && tile.is_some()
    }

    pub fn orientation(&self) -> i32 {
        self.extra_attribs.get_int("Orientation", 1)
    }

    /// Orientation codes 5-8 rotate by 90 degrees and swap the axes.
    fn axes_swapped(&self) -> bool {
        (5..=8).contains(&self.orientation())
    }

    pub fn oriented_width(&self) -> i32 {
        if self.axes_swapped() { self.height } else { self.width }
    }

    pub fn oriented_height(&self) -> i32 {
        if self.axes_swapped() { self.width } else { self.height }
    }

    /// Gaps between the data window and the full window, as
    /// (left, right, top, bottom) in file orientation.
    fn window_margins(&self) -> (i32, i32, i32, i32) {
        (
            self.x - self.full_x,
            (self.full_x + self.full_width) - (self.x + self.width),
            self.y - self.full_y,
            (self.full_y + self.full_height) - (self.y + self.height),
        )
    }

    /// Data window origin once the image is shown upright. Flips and
    /// rotations move the window within the full window, whose origin only
    /// swaps axes.
    fn oriented_origin(&self) -> (i32, i32) {
        let (left, right, top, bottom) = self.window_margins();
        let (dx, dy) = match self.orientation() {
            2 => (right, top),
            3 => (right, bottom),
            4 => (left, bottom),
            5 => (top, left),
            6 => (bottom, left),
            7 => (bottom, right),
            8 => (top, right),
            _ => (left, top),
        };
        (self.oriented_full_x() + dx, self.oriented_full_y() + dy)
    }

    pub fn oriented_x(&self) -> i32 {
        self.oriented_origin().0
    }

    pub fn oriented_y(&self) -> i32 {
        self.oriented_origin().1
    }

    pub fn oriented_full_width(&self) -> i32 {
        if self.axes_swapped() { self.full_height } else { self.full_width }
    }

    pub fn oriented_full_height(&self) -> i32 {
        if self.axes_swapped() { self.full_width } else { self.full_height }
    }

    pub fn oriented_full_x(&self) -> i32 {
        if self.axes_swapped() { self.full_y } else { self.full_x }
    }

    pub fn oriented_full_y(&self) -> i32 {
        if self.axes_swapped() { self.full_x } else { self.full_y }
    }

    /// Copy everything except resolution, channel layout and data format.
    pub fn copy_metadata_from(&mut self, src: &SpecData) {
        self.full_x = src.full_x;
        self.full_y = src.full_y;
        self.full_z = src.full_z;
        self.full_width = src.full_width;
        self.full_height = src.full_height;
        self.full_depth = src.full_depth;
        self.tile_width = src.tile_width;
        self.tile_height = src.tile_height;
        self.tile_depth = src.tile_depth;
        self.extra_attribs = src.extra_attribs.clone();
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<ImageSpec version=\"1\">\n");
        let mut field = |name: &str, value: String| {
            let _ = writeln!(xml, "<{name}>{}</{name}>", escape(&value));
        };
        field("x", self.x.to_string());
        field("y", self.y.to_string());
        field("z", self.z.to_string());
        field("width", self.width.to_string());
        field("height", self.height.to_string());
        field("depth", self.depth.to_string());
        field("full_x", self.full_x.to_string());
        field("full_y", self.full_y.to_string());
        field("full_z", self.full_z.to_string());
        field("full_width", self.full_width.to_string());
        field("full_height", self.full_height.to_string());
        field("full_depth", self.full_depth.to_string());
        field("tile_width", self.tile_width.to_string());
        field("tile_height", self.tile_height.to_string());
        field("tile_depth", self.tile_depth.to_string());
        field("format", self.format.name().to_string());
        field("nchannels", self.nchannels.to_string());
        field("alpha_channel", self.alpha_channel.to_string());
        field("z_channel", self.z_channel.to_string());
        field("deep", u8::from(self.deep).to_string());
        xml.push_str("<channelnames>\n");
        for name in &self.channelnames {
            let _ = writeln!(xml, "<channelname>{}</channelname>", escape(name));
        }
        xml.push_str("</channelnames>\n");
        for attr in self.extra_attribs.iter() {
            let text = match &attr.value {
                crate::attribute::AttrValue::Str(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = writeln!(
                xml,
                "<attrib name=\"{}\" type=\"{}\">{}</attrib>",
                escape(&attr.name),
                attr.value.type_desc(),
                escape(&text)
            );
        }
        xml.push_str("</ImageSpec>\n");
        xml
    }
}

fn dim(v: i32) -> usize {
    usize::try_from(v).unwrap_or(0)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub(crate) fn new(data: SpecData) -> RawRef {
    SPECS.insert(data)
}

pub(crate) fn free(raw: RawRef) {
    SPECS.remove(raw);
}

pub(crate) fn read<R>(raw: RawRef, f: impl FnOnce(&SpecData) -> R) -> Option<R> {
    SPECS.with(raw, |spec| f(spec))
}

pub(crate) fn write<R>(raw: RawRef, f: impl FnOnce(&mut SpecData) -> R) -> Option<R> {
    SPECS.with(raw, f)
}

pub(crate) fn snapshot(raw: RawRef) -> Option<SpecData> {
    read(raw, SpecData::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_names_for_rgba_set_alpha() {
        let spec = SpecData::with_size(2, 2, 4, TypeDesc::UInt8);
        assert_eq!(spec.channelnames, ["R", "G", "B", "A"]);
        assert_eq!(spec.alpha_channel, 3);
    }

    #[test]
    fn default_names_single_channel_is_y() {
        let spec = SpecData::with_size(2, 2, 1, TypeDesc::UInt8);
        assert_eq!(spec.channelnames, ["Y"]);
        assert_eq!(spec.alpha_channel, -1);
    }

    #[test]
    fn default_names_extra_channels_are_numbered() {
        let spec = SpecData::with_size(1, 1, 6, TypeDesc::Half);
        assert_eq!(spec.channelnames[4], "channel4");
        assert_eq!(spec.channelnames[5], "channel5");
    }

    #[test]
    fn native_pixel_bytes_use_per_channel_formats() {
        let mut spec = SpecData::with_size(10, 10, 3, TypeDesc::Half);
        spec.channelformats = vec![TypeDesc::Half, TypeDesc::Half, TypeDesc::Float];
        assert_eq!(spec.pixel_bytes(false), 6);
        assert_eq!(spec.pixel_bytes(true), 8);
        assert_eq!(spec.pixel_bytes_chans(1, 3, true), 6);
        assert_eq!(spec.scanline_bytes(true), 80);
        assert_eq!(spec.image_bytes(false), 600);
    }

    #[test]
    fn tile_sizes_zero_when_untiled() {
        let mut spec = SpecData::with_size(64, 64, 4, TypeDesc::UInt8);
        assert_eq!(spec.tile_pixels(), 0);
        spec.tile_width = 16;
        spec.tile_height = 8;
        assert_eq!(spec.tile_pixels(), 128);
        assert_eq!(spec.tile_bytes(false), 512);
    }

    #[test]
    fn huge_images_saturate_and_are_not_size_safe() {
        let spec = SpecData::with_size(i32::MAX, i32::MAX, 4, TypeDesc::Double);
        assert_eq!(spec.image_bytes(false), usize::MAX);
        assert!(!spec.size_safe());
        let small = SpecData::with_size(640, 480, 3, TypeDesc::UInt8);
        assert!(small.size_safe());
    }

    #[test]
    fn orientation_six_swaps_axes() {
        let mut spec = SpecData::with_size(40, 30, 3, TypeDesc::UInt8);
        spec.full_x = 2;
        spec.full_y = 5;
        spec.x = 2;
        spec.y = 5;
        assert_eq!(spec.oriented_width(), 40);
        spec.extra_attribs.set("Orientation", 6.into());
        assert_eq!(spec.oriented_width(), 30);
        assert_eq!(spec.oriented_height(), 40);
        assert_eq!((spec.oriented_x(), spec.oriented_y()), (5, 2));
        assert_eq!((spec.oriented_full_x(), spec.oriented_full_y()), (5, 2));
        assert_eq!(spec.oriented_full_width(), 30);
    }

    #[test]
    fn cropped_window_moves_with_orientation() {
        // 30x40 crop at (10, 5) inside a 100x80 full window:
        // margins left 10, right 60, top 5, bottom 35.
        let mut spec = SpecData::with_size(30, 40, 3, TypeDesc::UInt8);
        spec.x = 10;
        spec.y = 5;
        spec.full_width = 100;
        spec.full_height = 80;
        for (code, origin) in [
            (1, (10, 5)),
            (2, (60, 5)),
            (3, (60, 35)),
            (4, (10, 35)),
            (5, (5, 10)),
            (6, (35, 10)),
            (7, (35, 60)),
            (8, (5, 60)),
        ] {
            spec.extra_attribs.set("Orientation", code.into());
            assert_eq!((spec.oriented_x(), spec.oriented_y()), origin, "orientation {code}");
        }
    }

    #[test]
    fn xml_escapes_attribute_text() {
        let mut spec = SpecData::with_size(1, 1, 1, TypeDesc::UInt8);
        spec.extra_attribs.set("Artist", "A & B <c>".into());
        let xml = spec.to_xml();
        assert!(xml.starts_with("<ImageSpec"));
        assert!(xml.contains("A &amp; B &lt;c&gt;"));
        assert!(xml.contains("<channelname>Y</channelname>"));
    }
}
