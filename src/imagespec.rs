//! Image descriptions: resolution, data window, channel layout, metadata.
//!
//! An [`ImageSpec`] either owns its native object (created here or cloned)
//! or borrows one that belongs to an image buffer. Borrowed specs are only
//! handed out as [`SpecRef`] and [`SpecMut`], whose lifetimes keep the
//! owning buffer borrowed for as long as the view exists.
//!
//! Properties are plain reads and writes of native fields. Once a spec is
//! released, getters return zero or empty values and setters return
//! [`Error::Released`].

use crate::attribute::{AttrValue, Attribute};
use crate::error::{Error, Result};
use crate::handle::{Handle, NativeKind, Ownership};
use crate::native::RawRef;
use crate::native::spec::{self, SpecData};
use crate::typedesc::TypeDesc;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

pub(crate) struct SpecKind;

impl NativeKind for SpecKind {
    const NAME: &'static str = "ImageSpec";

    fn free(raw: RawRef) {
        spec::free(raw);
    }

    // Spec objects have no failure modes natively.
    fn geterror(_: RawRef) -> String {
        String::new()
    }
}

macro_rules! i32_properties {
    ($($field:ident / $setter:ident),* $(,)?) => {
        $(
            pub fn $field(&self) -> i32 {
                self.read(|s| s.$field)
            }

            pub fn $setter(&mut self, value: i32) -> Result<()> {
                self.write(|s| s.$field = value)
            }
        )*
    };
}

macro_rules! derived {
    ($($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty),* $(,)?) => {
        $(
            pub fn $name(&self, $($arg: $ty),*) -> $ret {
                self.read(|s| s.$name($($arg),*))
            }
        )*
    };
}

pub struct ImageSpec {
    handle: Handle<SpecKind>,
    _not_sync: PhantomData<Cell<()>>,
}

impl ImageSpec {
    fn from_handle(handle: Handle<SpecKind>) -> Self {
        Self {
            handle,
            _not_sync: PhantomData,
        }
    }

    pub(crate) fn from_data(data: SpecData) -> Self {
        Self::from_handle(Handle::owned(spec::new(data)))
    }

    pub(crate) fn borrowed(raw: Option<RawRef>) -> Self {
        Self::from_handle(raw.map_or_else(Handle::released, Handle::borrowed))
    }

    /// An empty spec (no resolution, no channels) of the given data format.
    /// `Unknown` means `UInt8`.
    pub fn new(format: TypeDesc) -> Self {
        Self::from_data(SpecData::new(format))
    }

    /// A spec with the data and display windows set to `width` x `height`
    /// and default channel names.
    pub fn with_size(width: i32, height: i32, nchannels: i32, format: TypeDesc) -> Self {
        Self::from_data(SpecData::with_size(width, height, nchannels, format))
    }

    /// Free the native object now. Later calls do nothing.
    pub fn release(&mut self) {
        self.handle.release();
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }

    /// Always `None` while live; specs cannot fail natively.
    pub fn last_error(&self) -> Option<Error> {
        self.handle.last_error()
    }

    pub(crate) fn raw(&self) -> Result<RawRef> {
        self.handle.raw()
    }

    pub(crate) fn snapshot(&self) -> Option<SpecData> {
        self.handle.get().and_then(spec::snapshot)
    }

    fn read<R: Default>(&self, f: impl FnOnce(&SpecData) -> R) -> R {
        self.handle
            .get()
            .and_then(|raw| spec::read(raw, f))
            .unwrap_or_default()
    }

    fn write<R>(&mut self, f: impl FnOnce(&mut SpecData) -> R) -> Result<R> {
        spec::write(self.handle.raw()?, f).ok_or(Error::Released)
    }

    i32_properties! {
        x / set_x,
        y / set_y,
        z / set_z,
        width / set_width,
        height / set_height,
        depth / set_depth,
        full_x / set_full_x,
        full_y / set_full_y,
        full_z / set_full_z,
        full_width / set_full_width,
        full_height / set_full_height,
        full_depth / set_full_depth,
        tile_width / set_tile_width,
        tile_height / set_tile_height,
        tile_depth / set_tile_depth,
        nchannels / set_nchannels,
        alpha_channel / set_alpha_channel,
        z_channel / set_z_channel,
    }

    pub fn format(&self) -> TypeDesc {
        self.read(|s| s.format)
    }

    /// Set the data format for all channels, dropping per-channel formats.
    pub fn set_format(&mut self, format: TypeDesc) -> Result<()> {
        self.write(|s| s.set_format(format))
    }

    pub fn deep(&self) -> bool {
        self.read(|s| s.deep)
    }

    pub fn set_deep(&mut self, deep: bool) -> Result<()> {
        self.write(|s| s.deep = deep)
    }

    derived! {
        channel_bytes() -> usize,
        channel_bytes_chan(chan: i32, native: bool) -> usize,
        pixel_bytes(native: bool) -> usize,
        pixel_bytes_chans(begin: i32, end: i32, native: bool) -> usize,
        scanline_bytes(native: bool) -> usize,
        tile_pixels() -> usize,
        tile_bytes(native: bool) -> usize,
        image_pixels() -> usize,
        image_bytes(native: bool) -> usize,
        size_safe() -> bool,
        channel_format(chan: i32) -> TypeDesc,
        orientation() -> i32,
        oriented_width() -> i32,
        oriented_height() -> i32,
        oriented_x() -> i32,
        oriented_y() -> i32,
        oriented_full_width() -> i32,
        oriented_full_height() -> i32,
        oriented_full_x() -> i32,
        oriented_full_y() -> i32,
        to_xml() -> String,
    }

    /// Reset channel names to R, G, B, A, channel4, ... ("Y" for one channel).
    pub fn default_channel_names(&mut self) -> Result<()> {
        self.write(SpecData::default_channel_names)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.read(|s| s.channelnames.clone())
    }

    pub fn set_channel_names<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        self.check_channel_count(names.len())?;
        let names = names.iter().map(|n| n.as_ref().to_string()).collect();
        self.write(|s| s.channelnames = names)
    }

    /// One format per channel; channels without their own format report
    /// the spec's [`format`](Self::format).
    pub fn channel_formats(&self) -> Vec<TypeDesc> {
        self.read(SpecData::channel_formats)
    }

    pub fn set_channel_formats(&mut self, formats: &[TypeDesc]) -> Result<()> {
        self.check_channel_count(formats.len())?;
        self.write(|s| s.channelformats = formats.to_vec())
    }

    fn check_channel_count(&self, actual: usize) -> Result<()> {
        self.handle.raw()?;
        let expected = usize::try_from(self.nchannels()).unwrap_or(0);
        if actual != expected {
            return Err(Error::LengthMismatch { expected, actual });
        }
        Ok(())
    }

    /// Set or replace the attribute with exactly this name.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        let value = value.into();
        self.write(|s| s.extra_attribs.set(name, value))
    }

    /// Set an attribute from a JSON value. Only strings and numbers that fit
    /// an `i32` or `f32` are accepted; anything else leaves the spec as is.
    pub fn set_attribute_json(&mut self, name: &str, value: &serde_json::Value) -> Result<()> {
        let value = AttrValue::try_from(value)?;
        self.set_attribute(name, value)
    }

    /// TOML counterpart of [`set_attribute_json`](Self::set_attribute_json).
    pub fn set_attribute_toml(&mut self, name: &str, value: &toml::Value) -> Result<()> {
        let value = AttrValue::try_from(value)?;
        self.set_attribute(name, value)
    }

    pub fn get_string_attribute(&self, name: &str, default: &str) -> String {
        match self.handle.get() {
            Some(raw) => spec::read(raw, |s| s.extra_attribs.get_string(name, default))
                .unwrap_or_else(|| default.to_string()),
            None => default.to_string(),
        }
    }

    pub fn get_int_attribute(&self, name: &str, default: i32) -> i32 {
        self.handle
            .get()
            .and_then(|raw| spec::read(raw, |s| s.extra_attribs.get_int(name, default)))
            .unwrap_or(default)
    }

    pub fn get_float_attribute(&self, name: &str, default: f32) -> f32 {
        self.handle
            .get()
            .and_then(|raw| spec::read(raw, |s| s.extra_attribs.get_float(name, default)))
            .unwrap_or(default)
    }

    /// Look up an attribute. `TypeDesc::Unknown` matches any type.
    pub fn find_attribute(
        &self,
        name: &str,
        ty: TypeDesc,
        case_sensitive: bool,
    ) -> Option<Attribute> {
        self.read(|s| s.extra_attribs.find(name, ty, case_sensitive).cloned())
    }

    pub fn attributes(&self) -> Vec<Attribute> {
        self.read(|s| s.extra_attribs.iter().cloned().collect())
    }

    /// Remove every attribute with this name, whatever its type.
    pub fn erase_attribute(&mut self, name: &str, case_sensitive: bool) -> Result<()> {
        self.erase_attribute_type(name, TypeDesc::Unknown, case_sensitive)
    }

    pub fn erase_attribute_type(
        &mut self,
        name: &str,
        ty: TypeDesc,
        case_sensitive: bool,
    ) -> Result<()> {
        self.write(|s| {
            s.extra_attribs.erase(name, ty, case_sensitive);
        })
    }
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self::new(TypeDesc::Unknown)
    }
}

/// Copies the native object into a new, owned spec.
impl Clone for ImageSpec {
    fn clone(&self) -> Self {
        match self.snapshot() {
            Some(data) => Self::from_data(data),
            None => Self::from_handle(Handle::released()),
        }
    }
}

impl fmt::Debug for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ImageSpec");
        d.field("raw", &self.handle.get());
        d.field("owned", &(self.handle.ownership() == Ownership::Owned));
        if let Some(s) = self.snapshot() {
            d.field("size", &format_args!("{}x{}x{}", s.width, s.height, s.depth))
                .field("nchannels", &s.nchannels)
                .field("format", &s.format)
                .field("channelnames", &s.channelnames);
        }
        d.finish()
    }
}

/// Read-only view of a spec that belongs to a buffer.
pub struct SpecRef<'a> {
    spec: ImageSpec,
    _owner: PhantomData<&'a ()>,
}

impl SpecRef<'_> {
    pub(crate) fn new(raw: Option<RawRef>) -> Self {
        Self {
            spec: ImageSpec::borrowed(raw),
            _owner: PhantomData,
        }
    }
}

impl Deref for SpecRef<'_> {
    type Target = ImageSpec;

    fn deref(&self) -> &ImageSpec {
        &self.spec
    }
}

impl fmt::Debug for SpecRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.spec.fmt(f)
    }
}

/// Mutable view of a spec that belongs to a buffer.
pub struct SpecMut<'a> {
    spec: ImageSpec,
    _owner: PhantomData<&'a mut ()>,
}

impl SpecMut<'_> {
    pub(crate) fn new(raw: Option<RawRef>) -> Self {
        Self {
            spec: ImageSpec::borrowed(raw),
            _owner: PhantomData,
        }
    }
}

impl Deref for SpecMut<'_> {
    type Target = ImageSpec;

    fn deref(&self) -> &ImageSpec {
        &self.spec
    }
}

impl DerefMut for SpecMut<'_> {
    fn deref_mut(&mut self) -> &mut ImageSpec {
        &mut self.spec
    }
}

impl fmt::Debug for SpecMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.spec.fmt(f)
    }
}
