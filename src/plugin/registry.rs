//! Creator registry keyed by (namespace, name, version)

use super::fields::{FieldSpec, PluginFieldCollection};
use super::{DynamicPlugin, InstanceNormalizationPluginCreator};
use crate::error::{Error, Result};
use crate::ops::InstanceNormOps;
use crate::runtime::Runtime;
use parking_lot::RwLock;
use std::sync::Arc;

/// Factory for one operator type
pub trait PluginCreator<R: Runtime>: Send + Sync {
    /// Operator type name
    fn plugin_name(&self) -> &str;

    /// Operator version
    fn plugin_version(&self) -> &str;

    /// Attributes `create_plugin` understands
    fn field_names(&self) -> &[FieldSpec];

    /// Build an operator from attributes
    fn create_plugin(
        &self,
        name: &str,
        fields: &PluginFieldCollection,
    ) -> Result<Box<dyn DynamicPlugin<R>>>;

    /// Rebuild an operator from its serialized state
    fn deserialize_plugin(&self, name: &str, serial: &[u8]) -> Result<Box<dyn DynamicPlugin<R>>>;

    /// Set the namespace stamped on created operators
    fn set_plugin_namespace(&mut self, namespace: &str);

    /// Current namespace
    fn plugin_namespace(&self) -> &str;
}

/// Registration table shared by everything that builds operators
///
/// Lookups take a read lock; registration and teardown take a write lock.
pub struct PluginRegistry<R: Runtime> {
    creators: RwLock<Vec<Arc<dyn PluginCreator<R>>>>,
}

fn same_key<R: Runtime>(
    c: &Arc<dyn PluginCreator<R>>,
    namespace: &str,
    name: &str,
    version: &str,
) -> bool {
    c.plugin_namespace() == namespace && c.plugin_name() == name && c.plugin_version() == version
}

impl<R: Runtime> PluginRegistry<R> {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            creators: RwLock::new(Vec::new()),
        }
    }

    /// Add a creator; its (namespace, name, version) must be unused
    pub fn register_creator(&self, creator: Box<dyn PluginCreator<R>>) -> Result<()> {
        let mut creators = self.creators.write();
        let (namespace, name, version) = (
            creator.plugin_namespace(),
            creator.plugin_name(),
            creator.plugin_version(),
        );
        if creators
            .iter()
            .any(|c| same_key(c, namespace, name, version))
        {
            return Err(Error::invalid_argument(
                "creator",
                format!("{namespace}::{name} version {version} is already registered"),
            ));
        }
        tracing::debug!(namespace, name, version, "registered plugin creator");
        creators.push(Arc::from(creator));
        Ok(())
    }

    /// Creator registered under (namespace, name, version)
    pub fn get_creator(
        &self,
        name: &str,
        version: &str,
        namespace: &str,
    ) -> Option<Arc<dyn PluginCreator<R>>> {
        self.creators
            .read()
            .iter()
            .find(|c| same_key(c, namespace, name, version))
            .cloned()
    }

    /// Remove a creator; returns whether one was registered
    pub fn deregister_creator(&self, name: &str, version: &str, namespace: &str) -> bool {
        let mut creators = self.creators.write();
        let before = creators.len();
        creators.retain(|c| !same_key(c, namespace, name, version));
        let removed = creators.len() != before;
        if removed {
            tracing::debug!(namespace, name, version, "deregistered plugin creator");
        }
        removed
    }

    /// Snapshot of all registered creators in registration order
    pub fn creators(&self) -> Vec<Arc<dyn PluginCreator<R>>> {
        self.creators.read().clone()
    }

    /// Number of registered creators
    pub fn len(&self) -> usize {
        self.creators.read().len()
    }

    /// Whether no creator is registered
    pub fn is_empty(&self) -> bool {
        self.creators.read().is_empty()
    }

    /// Remove every creator
    pub fn clear(&self) {
        let mut creators = self.creators.write();
        tracing::debug!(count = creators.len(), "clearing plugin registry");
        creators.clear();
    }
}

impl<R: Runtime> Default for PluginRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Register every operator this crate provides under `namespace`
pub fn register_builtin_plugins<R: Runtime>(
    registry: &PluginRegistry<R>,
    namespace: &str,
) -> Result<()>
where
    R::Client: InstanceNormOps<R>,
{
    let mut creator = InstanceNormalizationPluginCreator::<R>::new();
    creator.set_plugin_namespace(namespace);
    registry.register_creator(Box::new(creator))
}
