//! Plugin Registry
//! 
//! [`RegistryBuilder`] validates and deduplicates freshly loaded instances during
//! a load pass; [`PluginRegistry`] is the frozen result. Keys are unique by
//! construction and the earliest accepted instance for a key wins.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::linker::{Resident, UnitHandle};
use crate::plugin::loader::RawInstance;
use crate::plugin::traits::{CapabilityFamily, Plugin};

/// An accepted plugin with its validated metadata
pub struct LoadedPlugin<F: CapabilityFamily> {
    instance: Resident<Box<F::Plugin>>,
    key: String,
    display_name: String,
    version: String,
    implementation: String,
    package: PathBuf,
}

impl<F: CapabilityFamily> LoadedPlugin<F> {
    /// The plugin itself
    pub fn plugin(&self) -> &F::Plugin {
        &**self.instance
    }
    
    /// Handle of the unit the plugin came from
    pub fn unit_handle(&self) -> Option<&UnitHandle> {
        self.instance.handle()
    }
    
    /// Wrap a product built by this plugin so it keeps the plugin's unit loaded
    pub fn resident<T>(&self, product: T) -> Resident<T> {
        self.instance.sibling(product)
    }
    
    pub fn key(&self) -> &str {
        &self.key
    }
    
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
    
    pub fn version(&self) -> &str {
        &self.version
    }
    
    /// Declared implementation name
    pub fn implementation(&self) -> &str {
        &self.implementation
    }
    
    /// Package the plugin was loaded from
    pub fn package(&self) -> &Path {
        &self.package
    }
}

impl<F: CapabilityFamily> fmt::Debug for LoadedPlugin<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("version", &self.version)
            .field("implementation", &self.implementation)
            .field("package", &self.package)
            .finish()
    }
}

/// Where in the pipeline a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStage {
    /// Package failed descriptor validation
    Validation,
    /// Package could not be linked
    Load,
    /// A declared implementation could not be constructed
    Instantiation,
    /// Instance metadata missing or unreadable
    Metadata,
    /// Instance key already owned by an earlier plugin
    DuplicateKey,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureStage::Validation => "validation",
            FailureStage::Load => "load",
            FailureStage::Instantiation => "instantiation",
            FailureStage::Metadata => "metadata",
            FailureStage::DuplicateKey => "duplicate-key",
        };
        f.write_str(label)
    }
}

/// One rejected package or instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub package: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
    pub stage: FailureStage,
    pub reason: String,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.implementation {
            Some(implementation) => write!(
                f,
                "[{}] {} ({}): {}",
                self.stage,
                self.package.display(),
                implementation,
                self.reason
            ),
            None => write!(f, "[{}] {}: {}", self.stage, self.package.display(), self.reason),
        }
    }
}

/// Counters and failure reasons for one load pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub packages_scanned: usize,
    pub packages_rejected: usize,
    pub instances_accepted: usize,
    pub instances_rejected: usize,
    pub failures: Vec<LoadFailure>,
}

impl LoadOutcome {
    /// Record a package that contributed nothing
    pub fn reject_package<S: Into<String>>(&mut self, package: &Path, stage: FailureStage, reason: S) {
        let failure = LoadFailure {
            package: package.to_path_buf(),
            implementation: None,
            stage,
            reason: reason.into(),
        };
        warn!("Rejected package {}", failure);
        self.packages_rejected += 1;
        self.failures.push(failure);
    }
    
    /// Record a single discarded instance
    pub fn reject_instance<S: Into<String>>(
        &mut self,
        package: &Path,
        implementation: &str,
        stage: FailureStage,
        reason: S,
    ) {
        let failure = LoadFailure {
            package: package.to_path_buf(),
            implementation: Some(implementation.to_string()),
            stage,
            reason: reason.into(),
        };
        warn!("Rejected plugin {}", failure);
        self.instances_rejected += 1;
        self.failures.push(failure);
    }
    
    /// Failures recorded at a given stage
    pub fn failures_at(&self, stage: FailureStage) -> impl Iterator<Item = &LoadFailure> {
        self.failures.iter().filter(move |failure| failure.stage == stage)
    }
    
    /// Whether any failure mentions `package`'s file name
    pub fn mentions_package(&self, file_name: &str) -> bool {
        self.failures.iter().any(|failure| {
            failure.package.file_name().and_then(|name| name.to_str()) == Some(file_name)
        })
    }
    
    pub fn summary(&self) -> String {
        format!(
            "Packages: {} scanned, {} rejected | Plugins: {} accepted, {} rejected",
            self.packages_scanned,
            self.packages_rejected,
            self.instances_accepted,
            self.instances_rejected
        )
    }
}

/// Call one metadata accessor, treating blanks and panics as invalid
fn read_metadata<F, A>(plugin: &F::Plugin, field: &str, accessor: A) -> Result<String, String>
where
    F: CapabilityFamily,
    A: FnOnce(&F::Plugin) -> String,
{
    match panic::catch_unwind(AssertUnwindSafe(|| accessor(plugin))) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(format!("{} is blank", field)),
        Err(_) => Err(format!("{} accessor panicked", field)),
    }
}

/// Accumulates accepted plugins during a load pass
pub struct RegistryBuilder<F: CapabilityFamily> {
    plugins: Vec<Arc<LoadedPlugin<F>>>,
    index: HashMap<String, usize>,
    outcome: LoadOutcome,
}

impl<F: CapabilityFamily> fmt::Debug for RegistryBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("family", &F::NAME)
            .field("plugins", &self.plugins)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl<F: CapabilityFamily> RegistryBuilder<F> {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            index: HashMap::new(),
            outcome: LoadOutcome::default(),
        }
    }
    
    pub fn outcome_mut(&mut self) -> &mut LoadOutcome {
        &mut self.outcome
    }
    
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }
    
    /// Validate an instance and register it if its key is free
    /// 
    /// Returns false, leaving the registry untouched, when any metadata field is
    /// blank or unreadable, the plugin reports itself invalid, or the key is
    /// already owned.
    pub fn accept(&mut self, raw: RawInstance<F>) -> bool {
        let RawInstance { instance, implementation, package } = raw;
        let plugin: &F::Plugin = &**instance;
        
        let metadata = read_metadata::<F, _>(plugin, "key", |p| p.key())
            .and_then(|key| {
                read_metadata::<F, _>(plugin, "display name", |p| p.display_name())
                    .map(|name| (key, name))
            })
            .and_then(|(key, name)| {
                read_metadata::<F, _>(plugin, "version", |p| p.version())
                    .map(|version| (key, name, version))
            });
        
        let (key, display_name, version) = match metadata {
            Ok(metadata) => metadata,
            Err(reason) => {
                self.outcome.reject_instance(&package, &implementation, FailureStage::Metadata, reason);
                return false;
            }
        };
        
        match panic::catch_unwind(AssertUnwindSafe(|| plugin.is_valid())) {
            Ok(true) => {}
            Ok(false) => {
                self.outcome.reject_instance(
                    &package,
                    &implementation,
                    FailureStage::Metadata,
                    format!("plugin '{}' reports itself invalid", key),
                );
                return false;
            }
            Err(_) => {
                self.outcome.reject_instance(
                    &package,
                    &implementation,
                    FailureStage::Metadata,
                    "validity check panicked",
                );
                return false;
            }
        }
        
        if let Some(&owner) = self.index.get(&key) {
            let owner = &self.plugins[owner];
            let reason = format!(
                "key '{}' is already owned by {} from {}",
                key,
                owner.implementation,
                owner.package.display()
            );
            self.outcome.reject_instance(&package, &implementation, FailureStage::DuplicateKey, reason);
            return false;
        }
        
        info!(
            "Accepted {} plugin '{}' ({} {}) from {}",
            F::NAME,
            key,
            display_name,
            version,
            package.display()
        );
        
        self.index.insert(key.clone(), self.plugins.len());
        self.plugins.push(Arc::new(LoadedPlugin {
            instance,
            key,
            display_name,
            version,
            implementation,
            package,
        }));
        self.outcome.instances_accepted += 1;
        true
    }
    
    /// Freeze into a registry
    pub fn finish(self) -> PluginRegistry<F> {
        PluginRegistry {
            plugins: self.plugins,
            index: self.index,
            outcome: self.outcome,
        }
    }
}

impl<F: CapabilityFamily> Default for RegistryBuilder<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable collection of accepted plugins
pub struct PluginRegistry<F: CapabilityFamily> {
    plugins: Vec<Arc<LoadedPlugin<F>>>,
    index: HashMap<String, usize>,
    outcome: LoadOutcome,
}

impl<F: CapabilityFamily> fmt::Debug for PluginRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("family", &F::NAME)
            .field("plugins", &self.plugins)
            .finish()
    }
}

impl<F: CapabilityFamily> PluginRegistry<F> {
    /// Registry with nothing loaded
    pub fn empty() -> Self {
        RegistryBuilder::new().finish()
    }
    
    /// Look up a plugin by key
    /// 
    /// A blank key is a caller bug and returns [`PluginError::InvalidArgument`].
    pub fn find_by_key(&self, key: &str) -> PluginResult<Option<Arc<LoadedPlugin<F>>>> {
        if key.trim().is_empty() {
            return Err(PluginError::invalid_argument("plugin key must not be blank"));
        }
        Ok(self.index.get(key).map(|&position| Arc::clone(&self.plugins[position])))
    }
    
    /// Accepted plugins in acceptance order
    pub fn all(&self) -> &[Arc<LoadedPlugin<F>>] {
        &self.plugins
    }
    
    /// Accepted keys in acceptance order
    pub fn keys(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.key()).collect()
    }
    
    pub fn count(&self) -> usize {
        self.plugins.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
    
    /// Counters and failures from the pass that built this registry
    pub fn outcome(&self) -> &LoadOutcome {
        &self.outcome
    }
    
    /// One line per plugin: key, name, version, implementation, package
    pub fn diagnostic_dump(&self) -> String {
        let mut dump = format!("{} plugins: {}\n", F::NAME, self.plugins.len());
        for plugin in &self.plugins {
            let _ = writeln!(
                dump,
                "  {} | {} | {} | {} | {}",
                plugin.key,
                plugin.display_name,
                plugin.version,
                plugin.implementation,
                plugin.package.display()
            );
        }
        dump
    }
}
