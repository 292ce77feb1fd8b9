//! Attribute collections and weight blobs handed over by the host engine

use crate::dtype::DType;
use crate::error::{Error, Result};

/// Typed payload of one plugin attribute
#[derive(Clone, Debug, PartialEq)]
pub enum PluginFieldData {
    /// 32-bit floats
    F32(Vec<f32>),
    /// 16-bit floats
    #[cfg(feature = "f16")]
    F16(Vec<half::f16>),
    /// 32-bit integers
    I32(Vec<i32>),
}

impl PluginFieldData {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            #[cfg(feature = "f16")]
            Self::F16(v) => v.len(),
            Self::I32(v) => v.len(),
        }
    }

    /// Whether the payload holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type tag of the payload
    pub fn kind(&self) -> PluginFieldType {
        match self {
            Self::F32(_) => PluginFieldType::F32,
            #[cfg(feature = "f16")]
            Self::F16(_) => PluginFieldType::F16,
            Self::I32(_) => PluginFieldType::I32,
        }
    }
}

/// Element type of a declared attribute
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PluginFieldType {
    /// 32-bit float
    F32,
    /// 16-bit float
    F16,
    /// 32-bit integer
    I32,
}

/// Named attribute
#[derive(Clone, Debug, PartialEq)]
pub struct PluginField {
    /// Attribute name
    pub name: String,
    /// Attribute values
    pub data: PluginFieldData,
}

impl PluginField {
    /// Create a field
    pub fn new(name: impl Into<String>, data: PluginFieldData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Read the payload as f32 values, widening f16
    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        match &self.data {
            PluginFieldData::F32(v) => Some(v.clone()),
            #[cfg(feature = "f16")]
            PluginFieldData::F16(v) => Some(v.iter().map(|x| x.to_f32()).collect()),
            PluginFieldData::I32(_) => None,
        }
    }
}

/// Attribute declared by a creator: name, element type and expected length
///
/// A `len` of `None` means the length depends on the operator (one value per
/// channel).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    /// Attribute name
    pub name: &'static str,
    /// Element type
    pub kind: PluginFieldType,
    /// Fixed element count, if any
    pub len: Option<usize>,
}

/// Ordered set of attributes passed to a creator
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PluginFieldCollection {
    fields: Vec<PluginField>,
}

impl PluginFieldCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field
    pub fn push(&mut self, field: PluginField) {
        self.fields.push(field);
    }

    /// Builder form of [`push`](Self::push)
    pub fn with(mut self, name: impl Into<String>, data: PluginFieldData) -> Self {
        self.push(PluginField::new(name, data));
        self
    }

    /// First field named `name`
    pub fn get(&self, name: &str) -> Option<&PluginField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterate over all fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PluginField> {
        self.fields.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<PluginField> for PluginFieldCollection {
    fn from_iter<I: IntoIterator<Item = PluginField>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Host weight blob: element type plus little-endian packed values
#[derive(Clone, Debug, PartialEq)]
pub struct Weights {
    /// Element type of `bytes`
    pub dtype: DType,
    /// Packed values
    pub bytes: Vec<u8>,
}

impl Weights {
    /// Wrap f32 values
    pub fn from_f32(values: &[f32]) -> Self {
        Self {
            dtype: DType::F32,
            bytes: bytemuck::cast_slice(values).to_vec(),
        }
    }

    /// Wrap f16 values
    #[cfg(feature = "f16")]
    pub fn from_f16(values: &[half::f16]) -> Self {
        Self {
            dtype: DType::F16,
            bytes: bytemuck::cast_slice(values).to_vec(),
        }
    }

    /// Number of values
    pub fn count(&self) -> usize {
        self.bytes.len() / self.dtype.size_in_bytes()
    }

    /// Decode as f32 host values
    ///
    /// Only float weights are accepted; float16 requires the `f16` feature.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        let elem = self.dtype.size_in_bytes();
        if self.bytes.len() % elem != 0 {
            return Err(Error::invalid_argument(
                "weights",
                format!(
                    "{} bytes is not a whole number of {} values",
                    self.bytes.len(),
                    self.dtype
                ),
            ));
        }
        match self.dtype {
            DType::F32 => Ok(self
                .bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()),
            #[cfg(feature = "f16")]
            DType::F16 => Ok(self
                .bytes
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect()),
            dtype => Err(Error::unsupported_dtype(dtype, "weights")),
        }
    }
}
