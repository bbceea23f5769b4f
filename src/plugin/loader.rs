//! Isolated Plugin Loader
//! 
//! Each validated package gets its own [`ResolutionContext`]: a private scratch
//! directory and a table of the implementations its units provide. Declared
//! implementations are instantiated from that table only, so packages never see
//! each other's names. The context is released before the next package is
//! processed.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, warn};
use tempfile::TempDir;
use crate::plugin::compatibility::VersionCompatibilityChecker;
use crate::plugin::descriptor::DiscoveryDescriptor;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::linker::{Constructor, Linker, Resident, UnitHandle, UnitRegistrar, UnitSource};
use crate::plugin::package::PackageArchive;
use crate::plugin::traits::CapabilityFamily;

/// A freshly constructed, not yet validated plugin
pub struct RawInstance<F: CapabilityFamily> {
    pub instance: Resident<Box<F::Plugin>>,
    /// Declared implementation name
    pub implementation: String,
    /// Package the instance came from
    pub package: PathBuf,
}

impl<F: CapabilityFamily> fmt::Debug for RawInstance<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawInstance")
            .field("implementation", &self.implementation)
            .field("package", &self.package)
            .finish()
    }
}

/// Everything one package produced
pub struct PackageLoad<F: CapabilityFamily> {
    pub instances: Vec<RawInstance<F>>,
    /// Declared implementations that could not be instantiated
    pub failures: Vec<(String, PluginError)>,
}

impl<F: CapabilityFamily> fmt::Debug for PackageLoad<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageLoad")
            .field("instances", &self.instances)
            .field("failures", &self.failures)
            .finish()
    }
}

struct ContextEntry<P: ?Sized + 'static> {
    unit: String,
    constructor: Constructor<P>,
    handle: Option<UnitHandle>,
}

/// Name resolution scope for a single package
pub struct ResolutionContext<F: CapabilityFamily> {
    package: PathBuf,
    entries: HashMap<String, ContextEntry<F::Plugin>>,
    scratch: TempDir,
}

impl<F: CapabilityFamily> fmt::Debug for ResolutionContext<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("ResolutionContext")
            .field("package", &self.package)
            .field("names", &names)
            .field("scratch", &self.scratch.path())
            .finish()
    }
}

impl<F: CapabilityFamily> ResolutionContext<F> {
    /// Link every unit of `archive` into a fresh context
    /// 
    /// Any failure here rejects the whole package.
    pub fn open(
        archive: &mut PackageArchive,
        linker: &dyn Linker<F>,
        checker: &VersionCompatibilityChecker,
        scratch_root: Option<&Path>,
    ) -> PluginResult<Self> {
        let package = archive.path().to_path_buf();
        let mut builder = tempfile::Builder::new();
        builder.prefix(".learnhost-");
        let scratch = match scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| PluginError::loading_failed(format!("cannot create scratch directory: {}", e)))?;
        
        let mut entries: HashMap<String, ContextEntry<F::Plugin>> = HashMap::new();
        
        for (ordinal, unit_name) in archive.unit_names().into_iter().enumerate() {
            let bytes = archive.read_entry(&unit_name)?.ok_or_else(|| {
                PluginError::loading_failed(format!("unit {} vanished from package", unit_name))
            })?;
            let source = UnitSource {
                name: &unit_name,
                ordinal,
                bytes: &bytes,
            };
            
            let linked = linker.link(&source, scratch.path())?;
            checker.check_unit(&unit_name, linked.declaration.api_version)?;
            
            let mut registrar = UnitRegistrar::new();
            let register = linked.declaration.register;
            panic::catch_unwind(AssertUnwindSafe(|| register(&mut registrar))).map_err(|_| {
                PluginError::loading_failed(format!("unit {} panicked while registering", unit_name))
            })?;
            
            for (name, constructor) in registrar.into_entries() {
                if let Some(existing) = entries.get(&name) {
                    return Err(PluginError::loading_failed(format!(
                        "implementation {} is provided by both {} and {}",
                        name,
                        existing.unit,
                        unit_name
                    )));
                }
                entries.insert(name, ContextEntry {
                    unit: unit_name.clone(),
                    constructor,
                    handle: linked.handle.clone(),
                });
            }
            
            debug!("Linked unit {} of {}", unit_name, package.display());
        }
        
        Ok(Self { package, entries, scratch })
    }
    
    /// Whether any unit in this package provides `name`
    pub fn provides(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
    
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }
    
    /// Construct one declared implementation
    pub fn instantiate(&self, name: &str) -> PluginResult<RawInstance<F>> {
        let entry = self.entries.get(name).ok_or_else(|| {
            PluginError::instantiation_failed(format!(
                "{} is not provided by any unit in {}",
                name,
                self.package.display()
            ))
        })?;
        
        let constructor = entry.constructor;
        let instance = panic::catch_unwind(constructor).map_err(|_| {
            PluginError::instantiation_failed(format!("constructor for {} panicked", name))
        })?;
        
        Ok(RawInstance {
            instance: Resident::new(instance, entry.handle.clone()),
            implementation: name.to_string(),
            package: self.package.clone(),
        })
    }
}

/// Loads validated packages, one isolated context at a time
pub struct IsolatedLoader<F: CapabilityFamily> {
    linker: Arc<dyn Linker<F>>,
    checker: VersionCompatibilityChecker,
    scratch_root: Option<PathBuf>,
}

impl<F: CapabilityFamily> fmt::Debug for IsolatedLoader<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedLoader")
            .field("family", &F::NAME)
            .field("api_version", &self.checker.api_version())
            .field("scratch_root", &self.scratch_root)
            .finish()
    }
}

impl<F: CapabilityFamily> IsolatedLoader<F> {
    pub fn new(linker: Arc<dyn Linker<F>>) -> Self {
        Self {
            linker,
            checker: VersionCompatibilityChecker::current(),
            scratch_root: None,
        }
    }
    
    pub fn with_checker(mut self, checker: VersionCompatibilityChecker) -> Self {
        self.checker = checker;
        self
    }
    
    /// Extract units below `root` instead of the system temp directory
    pub fn with_scratch_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.scratch_root = Some(root.into());
        self
    }
    
    /// Instantiate every implementation `descriptor` declares
    /// 
    /// An error means the whole package failed. Individual implementations that
    /// cannot be built are reported in [`PackageLoad::failures`] and do not stop
    /// the others.
    pub fn load(&self, package: &Path, descriptor: &DiscoveryDescriptor) -> PluginResult<PackageLoad<F>> {
        let mut archive = PackageArchive::open(package)?;
        let context = ResolutionContext::<F>::open(
            &mut archive,
            self.linker.as_ref(),
            &self.checker,
            self.scratch_root.as_deref(),
        )?;
        
        let mut instances = Vec::new();
        let mut failures = Vec::new();
        
        for name in descriptor.implementations() {
            match context.instantiate(name) {
                Ok(raw) => instances.push(raw),
                Err(e) => {
                    warn!("{}: {}", package.display(), e);
                    failures.push((name.clone(), e));
                }
            }
        }
        
        drop(context);
        Ok(PackageLoad { instances, failures })
    }
}
