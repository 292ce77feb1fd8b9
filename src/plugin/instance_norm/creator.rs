//! Creator that builds the operator from attributes or serialized state

use super::{INSTANCE_NORM_PLUGIN_NAME, INSTANCE_NORM_PLUGIN_VERSION, InstanceNormalizationPlugin};
use crate::error::{Error, Result};
use crate::ops::InstanceNormOps;
use crate::plugin::fields::{
    FieldSpec, PluginField, PluginFieldCollection, PluginFieldData, PluginFieldType,
};
use crate::plugin::{DynamicPlugin, PluginCreator};
use crate::runtime::Runtime;
use std::marker::PhantomData;

const FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        name: "epsilon",
        kind: PluginFieldType::F32,
        len: Some(1),
    },
    FieldSpec {
        name: "scales",
        kind: PluginFieldType::F32,
        len: None,
    },
    FieldSpec {
        name: "bias",
        kind: PluginFieldType::F32,
        len: None,
    },
    FieldSpec {
        name: "relu",
        kind: PluginFieldType::I32,
        len: Some(1),
    },
    FieldSpec {
        name: "alpha",
        kind: PluginFieldType::F32,
        len: Some(1),
    },
];

/// Creator for [`InstanceNormalizationPlugin`]
///
/// Attributes: `epsilon` (f32), `scales` (f32 per channel), `bias` (f32 per
/// channel), `relu` (i32, optional, default 0), `alpha` (f32, optional,
/// default 0). Unknown attributes are ignored.
pub struct InstanceNormalizationPluginCreator<R: Runtime> {
    namespace: String,
    _runtime: PhantomData<fn() -> R>,
}

impl<R: Runtime> InstanceNormalizationPluginCreator<R> {
    /// Creator in the empty namespace
    pub fn new() -> Self {
        Self {
            namespace: String::new(),
            _runtime: PhantomData,
        }
    }
}

impl<R: Runtime> Default for InstanceNormalizationPluginCreator<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn floats(field: &PluginField) -> Result<Vec<f32>> {
    field.to_f32_vec().ok_or_else(|| {
        Error::invalid_argument("fields", format!("'{}' must hold floats", field.name))
    })
}

fn scalar_f32(field: &PluginField) -> Result<f32> {
    match floats(field)?.as_slice() {
        [v] => Ok(*v),
        other => Err(Error::invalid_argument(
            "fields",
            format!("'{}' must hold one value, got {}", field.name, other.len()),
        )),
    }
}

fn scalar_i32(field: &PluginField) -> Result<i32> {
    match &field.data {
        PluginFieldData::I32(v) if v.len() == 1 => Ok(v[0]),
        _ => Err(Error::invalid_argument(
            "fields",
            format!("'{}' must hold one i32", field.name),
        )),
    }
}

fn required<'a>(fields: &'a PluginFieldCollection, name: &str) -> Result<&'a PluginField> {
    fields.get(name).ok_or_else(|| {
        Error::invalid_argument("fields", format!("missing required attribute '{name}'"))
    })
}

impl<R: Runtime> PluginCreator<R> for InstanceNormalizationPluginCreator<R>
where
    R::Client: InstanceNormOps<R>,
{
    fn plugin_name(&self) -> &str {
        INSTANCE_NORM_PLUGIN_NAME
    }

    fn plugin_version(&self) -> &str {
        INSTANCE_NORM_PLUGIN_VERSION
    }

    fn field_names(&self) -> &[FieldSpec] {
        &FIELDS
    }

    fn create_plugin(
        &self,
        name: &str,
        fields: &PluginFieldCollection,
    ) -> Result<Box<dyn DynamicPlugin<R>>> {
        let epsilon = scalar_f32(required(fields, "epsilon")?)?;
        let scale = floats(required(fields, "scales")?)?;
        let bias = floats(required(fields, "bias")?)?;
        let relu = fields.get("relu").map(scalar_i32).transpose()?.unwrap_or(0);
        let alpha = fields.get("alpha").map(scalar_f32).transpose()?.unwrap_or(0.0);

        let mut plugin =
            InstanceNormalizationPlugin::<R>::new(epsilon, scale, bias, relu != 0, alpha)?;
        plugin.set_plugin_namespace(&self.namespace);
        tracing::debug!(
            name,
            channels = plugin.config().channels(),
            relu = relu != 0,
            "created instance norm from attributes"
        );
        Ok(Box::new(plugin))
    }

    fn deserialize_plugin(&self, name: &str, serial: &[u8]) -> Result<Box<dyn DynamicPlugin<R>>> {
        let mut plugin = InstanceNormalizationPlugin::<R>::deserialize(serial)?;
        plugin.set_plugin_namespace(&self.namespace);
        tracing::debug!(name, bytes = serial.len(), "deserialized instance norm");
        Ok(Box::new(plugin))
    }

    fn set_plugin_namespace(&mut self, namespace: &str) {
        self.namespace = namespace.to_string();
    }

    fn plugin_namespace(&self) -> &str {
        &self.namespace
    }
}
