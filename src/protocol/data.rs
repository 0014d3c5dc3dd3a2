//! Data values produced by output slots.
//!
//! A [`Data`] value is a payload plus a metadata side channel. Metadata
//! (sampling rate, channel names, frequency axis, ...) is never implicit:
//! every processing step copies or merges it explicitly.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata attached to a data value.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Label for the kind of payload a slot accepts.
///
/// The runtime treats this purely as a validation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Array,
    String,
    Table,
}

impl DataType {
    pub fn all() -> &'static [DataType] {
        &[DataType::Array, DataType::String, DataType::Table]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Array => "ARRAY",
            DataType::String => "STRING",
            DataType::Table => "TABLE",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Float sequences whose non-finite entries survive JSON: NaN and the
/// infinities are written as the strings `"NaN"`, `"inf"` and `"-inf"`.
mod float_values {
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    #[serde(untagged)]
    enum Out {
        Number(f64),
        Tag(&'static str),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum In {
        Number(f64),
        Tag(String),
    }

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| {
            if v.is_finite() {
                Out::Number(v)
            } else if v.is_nan() {
                Out::Tag("NaN")
            } else if v > 0.0 {
                Out::Tag("inf")
            } else {
                Out::Tag("-inf")
            }
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<In>::deserialize(deserializer)?
            .into_iter()
            .map(|v| match v {
                In::Number(n) => Ok(n),
                In::Tag(tag) => match tag.as_str() {
                    "NaN" => Ok(f64::NAN),
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    other => Err(de::Error::custom(format!("invalid array value `{other}`"))),
                },
            })
            .collect()
    }
}

/// Dense row-major array of one or two dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArrayRepr")]
pub struct Array {
    shape: Vec<usize>,
    #[serde(serialize_with = "float_values::serialize")]
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct ArrayRepr {
    shape: Vec<usize>,
    #[serde(deserialize_with = "float_values::deserialize")]
    values: Vec<f64>,
}

impl TryFrom<ArrayRepr> for Array {
    type Error = ValidationError;

    fn try_from(repr: ArrayRepr) -> Result<Self, Self::Error> {
        Array::with_shape(repr.shape, repr.values)
    }
}

impl Array {
    /// One-dimensional array.
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    /// Two-dimensional array with `rows` rows (channels).
    pub fn matrix(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self, ValidationError> {
        Self::with_shape(vec![rows, cols], values)
    }

    pub fn with_shape(shape: Vec<usize>, values: Vec<f64>) -> Result<Self, ValidationError> {
        if shape.is_empty() || shape.len() > 2 {
            return Err(ValidationError::Array(format!(
                "expected 1 or 2 dimensions, got {}",
                shape.len()
            )));
        }
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(ValidationError::Array(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Iterate over rows. A vector yields itself as a single row.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        let cols = self.shape.last().copied().unwrap_or(0).max(1);
        self.values.chunks(cols)
    }

    /// Apply `f` elementwise, keeping the shape.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }
}

/// Payload variants carried by [`Data`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Array(Array),
    String(String),
    Table(BTreeMap<String, Data>),
}

impl Payload {
    pub fn dtype(&self) -> DataType {
        match self {
            Payload::Array(_) => DataType::Array,
            Payload::String(_) => DataType::String,
            Payload::Table(_) => DataType::Table,
        }
    }
}

impl From<Array> for Payload {
    fn from(a: Array) -> Self {
        Payload::Array(a)
    }
}

/// A value produced by a node's output slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub payload: Payload,
    #[serde(default)]
    pub meta: Metadata,
}

impl Data {
    pub fn new(payload: Payload, meta: Metadata) -> Self {
        Self { payload, meta }
    }

    pub fn array(values: Vec<f64>) -> Self {
        Self::new(Payload::Array(Array::vector(values)), Metadata::new())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Payload::String(value.into()), Metadata::new())
    }

    pub fn table(entries: BTreeMap<String, Data>) -> Self {
        Self::new(Payload::Table(entries), Metadata::new())
    }

    /// Builder-style metadata insert.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Replace metadata wholesale, typically with the upstream value's.
    pub fn with_meta_from(mut self, meta: &Metadata) -> Self {
        self.meta = meta.clone();
        self
    }

    /// Merge `other` into this value's metadata; keys in `other` win.
    pub fn merge_meta(&mut self, other: &Metadata) {
        for (k, v) in other {
            self.meta.insert(k.clone(), v.clone());
        }
    }

    pub fn dtype(&self) -> DataType {
        self.payload.dtype()
    }

    pub fn as_array(&self) -> Option<&Array> {
        match &self.payload {
            Payload::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&BTreeMap<String, Data>> {
        match &self.payload {
            Payload::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Sampling rate from metadata, if present.
    pub fn sfreq(&self) -> Option<f64> {
        self.meta.get("sfreq").and_then(|v| v.as_f64())
    }
}
