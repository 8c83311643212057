//! Data-type descriptors shared by specs, attributes and buffers.
//!
//! [`TypeDesc`] names the storage type of a pixel channel or an attribute
//! value. [`TypeDesc::Unknown`] is the "infer it" sentinel: as a read
//! conversion it means "keep the file's format", as an erase filter it means
//! "any type", and as a spec format it falls back to 8-bit unsigned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage type of a channel datum or attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeDesc {
    #[default]
    Unknown,
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Half,
    Float,
    Double,
    String,
}

impl TypeDesc {
    /// Size in bytes of a single value of this type. `Unknown` is 0;
    /// `String` is the size of a pointer, as stored in native attribute lists.
    pub fn size(self) -> usize {
        match self {
            TypeDesc::Unknown => 0,
            TypeDesc::UInt8 | TypeDesc::Int8 => 1,
            TypeDesc::UInt16 | TypeDesc::Int16 | TypeDesc::Half => 2,
            TypeDesc::UInt32 | TypeDesc::Int32 | TypeDesc::Float => 4,
            TypeDesc::Double => 8,
            TypeDesc::String => std::mem::size_of::<usize>(),
        }
    }

    pub fn is_unknown(self) -> bool {
        self == TypeDesc::Unknown
    }

    pub fn is_floating_point(self) -> bool {
        matches!(self, TypeDesc::Half | TypeDesc::Float | TypeDesc::Double)
    }

    /// Canonical lowercase name (`"uint8"`, `"float"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            TypeDesc::Unknown => "unknown",
            TypeDesc::UInt8 => "uint8",
            TypeDesc::Int8 => "int8",
            TypeDesc::UInt16 => "uint16",
            TypeDesc::Int16 => "int16",
            TypeDesc::UInt32 => "uint32",
            TypeDesc::Int32 => "int",
            TypeDesc::Half => "half",
            TypeDesc::Float => "float",
            TypeDesc::Double => "double",
            TypeDesc::String => "string",
        }
    }

    /// Resolve the `Unknown` sentinel to the default pixel format.
    pub(crate) fn or_default_pixel(self) -> TypeDesc {
        if self.is_unknown() {
            TypeDesc::UInt8
        } else {
            self
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TypeDesc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.to_ascii_lowercase().as_str() {
            "" | "unknown" => TypeDesc::Unknown,
            "uint8" | "u8" => TypeDesc::UInt8,
            "int8" | "i8" => TypeDesc::Int8,
            "uint16" | "u16" => TypeDesc::UInt16,
            "int16" | "i16" => TypeDesc::Int16,
            "uint32" | "uint" | "u32" => TypeDesc::UInt32,
            "int32" | "int" | "i32" => TypeDesc::Int32,
            "half" | "f16" => TypeDesc::Half,
            "float" | "f32" => TypeDesc::Float,
            "double" | "f64" => TypeDesc::Double,
            "string" => TypeDesc::String,
            other => return Err(format!("unknown data type '{other}'")),
        };
        Ok(ty)
    }
}

/// Where the pixels of an image buffer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    /// No spec and no pixels.
    #[default]
    Uninitialized,
    /// Pixels owned by the buffer itself.
    LocalBuffer,
    /// Pixels served on demand by an image cache.
    ImageCache,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_storage_widths() {
        assert_eq!(TypeDesc::UInt8.size(), 1);
        assert_eq!(TypeDesc::Half.size(), 2);
        assert_eq!(TypeDesc::Float.size(), 4);
        assert_eq!(TypeDesc::Double.size(), 8);
        assert_eq!(TypeDesc::Unknown.size(), 0);
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("uint16".parse::<TypeDesc>().unwrap(), TypeDesc::UInt16);
        assert_eq!("F32".parse::<TypeDesc>().unwrap(), TypeDesc::Float);
        assert_eq!("".parse::<TypeDesc>().unwrap(), TypeDesc::Unknown);
        assert!("rgb".parse::<TypeDesc>().is_err());
    }

    #[test]
    fn unknown_resolves_to_uint8_pixels() {
        assert_eq!(TypeDesc::Unknown.or_default_pixel(), TypeDesc::UInt8);
        assert_eq!(TypeDesc::Float.or_default_pixel(), TypeDesc::Float);
    }

    #[test]
    fn storage_kinds_serialize_lowercase() {
        let names: Vec<String> = [Storage::Uninitialized, Storage::LocalBuffer, Storage::ImageCache]
            .iter()
            .map(|s| serde_json::to_string(s).unwrap())
            .collect();
        assert_eq!(names, ["\"uninitialized\"", "\"localbuffer\"", "\"imagecache\""]);
        assert_eq!(Storage::default(), Storage::Uninitialized);
    }
}
