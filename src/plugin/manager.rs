//! Plugin Manager
//! 
//! Owns the scan → validate → load → register pipeline for one capability family,
//! runs it exactly once on first access, and exposes the frozen registry's query
//! surface. Construct one per family at application wiring time and pass it by
//! reference; see [`PluginHost`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use crate::plugin::compatibility::VersionCompatibilityChecker;
use crate::plugin::discovery::{DescriptorValidator, PackageScanner};
use crate::plugin::error::PluginResult;
use crate::plugin::families::{LearningStrategies, QuestionModules};
use crate::plugin::linker::{Linker, NativeLinker, Resident};
use crate::plugin::loader::IsolatedLoader;
use crate::plugin::registry::{FailureStage, LoadOutcome, LoadedPlugin, PluginRegistry, RegistryBuilder};
use crate::plugin::traits::CapabilityFamily;

/// Where one family's packages live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Scan directory
    pub directory: PathBuf,
    /// Parent for per-package scratch directories (system temp when unset)
    pub scratch_root: Option<PathBuf>,
}

impl PluginConfig {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            scratch_root: None,
        }
    }
    
    /// Family default directory below an application root
    pub fn for_family<F: CapabilityFamily>(root: &Path) -> Self {
        Self::new(root.join(F::DEFAULT_DIR))
    }
    
    pub fn with_scratch_root<P: Into<PathBuf>>(mut self, scratch_root: P) -> Self {
        self.scratch_root = Some(scratch_root.into());
        self
    }
}

/// Lifecycle of a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Loading,
    Ready,
    /// Scan directory unusable; terminal
    Failed,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ManagerState::Uninitialized => "uninitialized",
            ManagerState::Loading => "loading",
            ManagerState::Ready => "ready",
            ManagerState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Run one full load pass over `config.directory`
/// 
/// Only configuration errors are returned; every package and instance failure is
/// recorded in the registry's [`LoadOutcome`].
pub fn run_load_pass<F: CapabilityFamily>(
    config: &PluginConfig,
    linker: Arc<dyn Linker<F>>,
    checker: VersionCompatibilityChecker,
) -> PluginResult<PluginRegistry<F>> {
    info!("Loading {} plugins from {}", F::NAME, config.directory.display());
    
    let candidates = PackageScanner::new(&config.directory).scan()?;
    let validator = DescriptorValidator::<F>::new();
    let mut loader = IsolatedLoader::new(linker).with_checker(checker);
    if let Some(root) = &config.scratch_root {
        loader = loader.with_scratch_root(root);
    }
    let mut builder = RegistryBuilder::<F>::new();
    
    for package in &candidates {
        builder.outcome_mut().packages_scanned += 1;
        debug!("Processing package {}", package.display());
        
        let validation = validator.validate(package);
        let descriptor = match (validation.ok, validation.descriptor) {
            (true, Some(descriptor)) => descriptor,
            _ => {
                let reason = validation.reason.unwrap_or_else(|| "validation failed".to_string());
                builder.outcome_mut().reject_package(package, FailureStage::Validation, reason);
                continue;
            }
        };
        
        let load = match loader.load(package, &descriptor) {
            Ok(load) => load,
            Err(e) => {
                builder.outcome_mut().reject_package(package, FailureStage::Load, e.to_string());
                continue;
            }
        };
        
        for (implementation, e) in load.failures {
            builder.outcome_mut().reject_instance(package, &implementation, FailureStage::Instantiation, e.to_string());
        }
        for raw in load.instances {
            builder.accept(raw);
        }
    }
    
    let registry = builder.finish();
    if registry.is_empty() {
        warn!("No {} plugins loaded from {}", F::NAME, config.directory.display());
    }
    info!("{} load pass complete. {}", F::NAME, registry.outcome().summary());
    Ok(registry)
}

/// Clears the loading flag if a load pass unwinds, leaving the cell empty
struct LoadingFlag<'a>(&'a AtomicBool);

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.store(false, Ordering::Release);
        }
    }
}

/// Lazily loaded, read-only view of one family's plugins
pub struct PluginManager<F: CapabilityFamily> {
    config: PluginConfig,
    linker: Arc<dyn Linker<F>>,
    checker: VersionCompatibilityChecker,
    loading: AtomicBool,
    registry: OnceCell<PluginResult<PluginRegistry<F>>>,
}

impl<F: CapabilityFamily> fmt::Debug for PluginManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("family", &F::NAME)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl<F: CapabilityFamily> PluginManager<F> {
    /// Manager loading native units
    pub fn new(config: PluginConfig) -> Self {
        Self::with_linker(config, Arc::new(NativeLinker::<F>::new()))
    }
    
    pub fn with_linker(config: PluginConfig, linker: Arc<dyn Linker<F>>) -> Self {
        Self {
            config,
            linker,
            checker: VersionCompatibilityChecker::current(),
            loading: AtomicBool::new(false),
            registry: OnceCell::new(),
        }
    }
    
    pub fn with_checker(mut self, checker: VersionCompatibilityChecker) -> Self {
        self.checker = checker;
        self
    }
    
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }
    
    pub fn state(&self) -> ManagerState {
        match self.registry.get() {
            Some(Ok(_)) => ManagerState::Ready,
            Some(Err(_)) => ManagerState::Failed,
            None if self.loading.load(Ordering::Acquire) => ManagerState::Loading,
            None => ManagerState::Uninitialized,
        }
    }
    
    /// The registry, loading it on first call
    /// 
    /// Concurrent first callers wait for a single load pass. A configuration
    /// error is kept and returned to every caller.
    pub fn registry(&self) -> PluginResult<&PluginRegistry<F>> {
        self.registry
            .get_or_init(|| {
                self.loading.store(true, Ordering::Release);
                let _unwinding = LoadingFlag(&self.loading);
                let result = run_load_pass(&self.config, Arc::clone(&self.linker), self.checker);
                if let Err(e) = &result {
                    error!("{} plugin manager cannot start: {}", F::NAME, e);
                }
                result
            })
            .as_ref()
            .map_err(Clone::clone)
    }
    
    /// Force the load pass
    pub fn initialize(&self) -> PluginResult<()> {
        self.registry().map(|_| ())
    }
    
    pub fn find_by_key(&self, key: &str) -> PluginResult<Option<Arc<LoadedPlugin<F>>>> {
        self.registry()?.find_by_key(key)
    }
    
    pub fn all(&self) -> PluginResult<&[Arc<LoadedPlugin<F>>]> {
        Ok(self.registry()?.all())
    }
    
    pub fn count(&self) -> PluginResult<usize> {
        Ok(self.registry()?.count())
    }
    
    pub fn is_empty(&self) -> PluginResult<bool> {
        Ok(self.registry()?.is_empty())
    }
    
    pub fn outcome(&self) -> PluginResult<&LoadOutcome> {
        Ok(self.registry()?.outcome())
    }
    
    pub fn diagnostic_dump(&self) -> PluginResult<String> {
        Ok(self.registry()?.diagnostic_dump())
    }
    
    /// Build a product with the plugin registered under `key`
    /// 
    /// `Ok(None)` when no plugin owns the key or its factory fails or panics;
    /// the failure is logged. Only a blank key or an unusable scan directory
    /// produce an error. The product keeps the plugin's unit loaded, so it may
    /// outlive this manager.
    pub fn create(&self, key: &str, args: F::Args) -> PluginResult<Option<Resident<F::Product>>> {
        let plugin = match self.find_by_key(key)? {
            Some(plugin) => plugin,
            None => {
                debug!("No {} plugin registered for key '{}'", F::NAME, key);
                return Ok(None);
            }
        };
        
        match panic::catch_unwind(AssertUnwindSafe(|| F::construct(plugin.plugin(), args))) {
            Ok(Ok(product)) => Ok(Some(plugin.resident(product))),
            Ok(Err(e)) => {
                warn!("{} plugin '{}' failed to construct: {}", F::NAME, key, e);
                Ok(None)
            }
            Err(_) => {
                warn!("{} plugin '{}' panicked while constructing", F::NAME, key);
                Ok(None)
            }
        }
    }
}

/// Both family managers, built once when the application is wired together
#[derive(Debug)]
pub struct PluginHost {
    question_modules: PluginManager<QuestionModules>,
    learning_strategies: PluginManager<LearningStrategies>,
}

impl PluginHost {
    pub fn new(
        question_modules: PluginManager<QuestionModules>,
        learning_strategies: PluginManager<LearningStrategies>,
    ) -> Self {
        Self {
            question_modules,
            learning_strategies,
        }
    }
    
    /// Native-loading managers with family default directories below `root`
    pub fn from_root(root: &Path) -> Self {
        Self::new(
            PluginManager::new(PluginConfig::for_family::<QuestionModules>(root)),
            PluginManager::new(PluginConfig::for_family::<LearningStrategies>(root)),
        )
    }
    
    pub fn question_modules(&self) -> &PluginManager<QuestionModules> {
        &self.question_modules
    }
    
    pub fn learning_strategies(&self) -> &PluginManager<LearningStrategies> {
        &self.learning_strategies
    }
    
    /// Load both families
    pub fn initialize(&self) -> PluginResult<()> {
        self.question_modules.initialize()?;
        self.learning_strategies.initialize()
    }
    
    /// Dump of both families
    pub fn diagnostic_dump(&self) -> PluginResult<String> {
        let mut dump = self.question_modules.diagnostic_dump()?;
        dump.push_str(&self.learning_strategies.diagnostic_dump()?);
        Ok(dump)
    }
}
