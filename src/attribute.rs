//! Typed metadata attributes.
//!
//! Natively an attribute list is dynamically typed and open-ended. The
//! binding narrows it to three value types, expressed as the tagged variant
//! [`AttrValue`]: text, 32-bit integer, 32-bit float. Typed code builds values
//! through the `From` impls; dynamic sources (JSON from the command line,
//! TOML from config files) go through `TryFrom`, which rejects every other
//! shape with [`Error::UnsupportedAttributeType`].
//!
//! [`ParamList`] is the ordered list that backs a spec's extra attributes and
//! a cache's options.

use crate::error::Error;
use crate::typedesc::TypeDesc;
use serde::Serialize;
use std::fmt;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Int(i32),
    Float(f32),
}

impl AttrValue {
    /// The declared type of this value.
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            AttrValue::Str(_) => TypeDesc::String,
            AttrValue::Int(_) => TypeDesc::Int32,
            AttrValue::Float(_) => TypeDesc::Float,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "\"{s}\""),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f32> for AttrValue {
    fn from(value: f32) -> Self {
        AttrValue::Float(value)
    }
}

fn int_from_i64(value: i64) -> Result<AttrValue, Error> {
    i32::try_from(value)
        .map(AttrValue::Int)
        .map_err(|_| Error::UnsupportedAttributeType("int64".into()))
}

impl TryFrom<&serde_json::Value> for AttrValue {
    type Error = Error;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;
        match value {
            Value::String(s) => Ok(AttrValue::Str(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    int_from_i64(i)
                } else if n.is_u64() {
                    Err(Error::UnsupportedAttributeType("uint64".into()))
                } else {
                    Ok(AttrValue::Float(n.as_f64().unwrap_or_default() as f32))
                }
            }
            Value::Bool(_) => Err(Error::UnsupportedAttributeType("boolean".into())),
            Value::Null => Err(Error::UnsupportedAttributeType("null".into())),
            Value::Array(_) => Err(Error::UnsupportedAttributeType("array".into())),
            Value::Object(_) => Err(Error::UnsupportedAttributeType("object".into())),
        }
    }
}

impl TryFrom<&toml::Value> for AttrValue {
    type Error = Error;

    fn try_from(value: &toml::Value) -> Result<Self, Self::Error> {
        use toml::Value;
        match value {
            Value::String(s) => Ok(AttrValue::Str(s.clone())),
            Value::Integer(i) => int_from_i64(*i),
            Value::Float(f) => Ok(AttrValue::Float(*f as f32)),
            Value::Boolean(_) => Err(Error::UnsupportedAttributeType("boolean".into())),
            Value::Datetime(_) => Err(Error::UnsupportedAttributeType("datetime".into())),
            Value::Array(_) => Err(Error::UnsupportedAttributeType("array".into())),
            Value::Table(_) => Err(Error::UnsupportedAttributeType("table".into())),
        }
    }
}

/// A named, typed metadata slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

impl Attribute {
    fn matches(&self, name: &str, ty: TypeDesc, case_sensitive: bool) -> bool {
        let name_matches = if case_sensitive {
            self.name == name
        } else {
            self.name.eq_ignore_ascii_case(name)
        };
        name_matches && (ty.is_unknown() || self.value.type_desc() == ty)
    }
}

/// Ordered attribute list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamList {
    entries: Vec<Attribute>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter()
    }

    /// Replace the entry whose name matches ignoring case, or append a new
    /// one. The replacement takes the new spelling and type.
    pub fn set(&mut self, name: &str, value: AttrValue) {
        let entry = Attribute {
            name: name.to_string(),
            value,
        };
        match self
            .entries
            .iter_mut()
            .find(|a| a.matches(name, TypeDesc::Unknown, false))
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// First entry matching `name` (and `ty`, unless `Unknown`).
    pub fn find(&self, name: &str, ty: TypeDesc, case_sensitive: bool) -> Option<&Attribute> {
        self.entries
            .iter()
            .find(|a| a.matches(name, ty, case_sensitive))
    }

    pub fn get_string(&self, name: &str, default: &str) -> String {
        self.find(name, TypeDesc::String, false)
            .and_then(|a| a.value.as_str())
            .unwrap_or(default)
            .to_string()
    }

    pub fn get_int(&self, name: &str, default: i32) -> i32 {
        self.find(name, TypeDesc::Int32, false)
            .and_then(|a| a.value.as_int())
            .unwrap_or(default)
    }

    pub fn get_float(&self, name: &str, default: f32) -> f32 {
        self.find(name, TypeDesc::Float, false)
            .and_then(|a| a.value.as_float())
            .unwrap_or(default)
    }

    /// Remove every matching entry. Returns how many were removed.
    pub fn erase(&mut self, name: &str, ty: TypeDesc, case_sensitive: bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|a| !a.matches(name, ty, case_sensitive));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
