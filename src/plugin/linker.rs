//! Unit Linking
//! 
//! An executable unit exports one [`UnitDeclaration`] under its family's symbol.
//! The declaration records the plugin API version the unit was built against and
//! a `register` function that lists the implementations the unit can construct.
//! A [`Linker`] turns a unit's bytes into that declaration.
//! 
//! # Unit Entry Point Convention
//! 
//! ```rust,ignore
//! fn register(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
//!     registrar.register("org.example.Leitner", leitner);
//! }
//! 
//! learnhost::declare_plugin_unit!(learning_strategies: register);
//! ```
//! 
//! Units must be compiled with the same toolchain as the host; the API version
//! check only catches contract changes.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use libloading::Library;
use log::debug;
use crate::plugin::compatibility::PLUGIN_API_VERSION;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::package::{entry_file_name, entry_stem};
use crate::plugin::traits::CapabilityFamily;

/// No-argument constructor for one declared implementation
pub type Constructor<P> = fn() -> Box<P>;

/// Keeps a linked unit's code mapped while it is alive
pub type UnitHandle = Arc<dyn Any + Send + Sync>;

/// A value built by unit code, together with the handle keeping that code mapped
/// 
/// The value is dropped before the handle, so its destructor and vtable are
/// still loaded when it goes. Plugin instances and the products their factories
/// build are both carried this way.
pub struct Resident<T> {
    value: T,
    handle: Option<UnitHandle>,
}

impl<T> Resident<T> {
    pub fn new(value: T, handle: Option<UnitHandle>) -> Self {
        Self { value, handle }
    }
    
    /// Handle of the unit that built the value, `None` for in-process units
    pub fn handle(&self) -> Option<&UnitHandle> {
        self.handle.as_ref()
    }
    
    /// Wrap `value`, built by the same unit as `self`
    pub fn sibling<U>(&self, value: U) -> Resident<U> {
        Resident::new(value, self.handle.clone())
    }
}

impl<T> Deref for Resident<T> {
    type Target = T;
    
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Resident<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> fmt::Debug for Resident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resident")
            .field("native", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

/// Exported by every executable unit
pub struct UnitDeclaration<P: ?Sized + 'static> {
    pub api_version: u32,
    pub register: fn(&mut UnitRegistrar<P>),
}

impl<P: ?Sized + 'static> UnitDeclaration<P> {
    /// Declaration stamped with the host's API version
    pub const fn new(register: fn(&mut UnitRegistrar<P>)) -> Self {
        Self {
            api_version: PLUGIN_API_VERSION,
            register,
        }
    }
    
    /// Declaration with an explicit API version
    pub const fn with_api_version(api_version: u32, register: fn(&mut UnitRegistrar<P>)) -> Self {
        Self { api_version, register }
    }
}

impl<P: ?Sized + 'static> Clone for UnitDeclaration<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: ?Sized + 'static> Copy for UnitDeclaration<P> {}

impl<P: ?Sized + 'static> fmt::Debug for UnitDeclaration<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDeclaration")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Collects the implementations a unit provides
pub struct UnitRegistrar<P: ?Sized + 'static> {
    entries: Vec<(String, Constructor<P>)>,
}

impl<P: ?Sized + 'static> UnitRegistrar<P> {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }
    
    /// Make `name` constructible from this unit
    pub fn register(&mut self, name: &str, constructor: Constructor<P>) {
        self.entries.push((name.to_string(), constructor));
    }
    
    pub(crate) fn into_entries(self) -> Vec<(String, Constructor<P>)> {
        self.entries
    }
}

impl<P: ?Sized + 'static> fmt::Debug for UnitRegistrar<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.entries.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("UnitRegistrar").field("entries", &names).finish()
    }
}

/// One executable unit read out of a package
#[derive(Debug, Clone, Copy)]
pub struct UnitSource<'a> {
    /// Archive entry name
    pub name: &'a str,
    /// Position of the unit within its package
    pub ordinal: usize,
    pub bytes: &'a [u8],
}

impl<'a> UnitSource<'a> {
    /// Entry file name without directories
    pub fn file_name(&self) -> &'a str {
        entry_file_name(self.name)
    }
    
    /// Entry file name without extension
    pub fn stem(&self) -> &'a str {
        entry_stem(self.name)
    }
}

/// A unit whose declaration has been resolved
pub struct LinkedUnit<P: ?Sized + 'static> {
    pub declaration: UnitDeclaration<P>,
    /// Library backing the unit's code, kept alive by every instance it builds
    pub handle: Option<UnitHandle>,
}

impl<P: ?Sized + 'static> fmt::Debug for LinkedUnit<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedUnit")
            .field("declaration", &self.declaration)
            .field("native", &self.handle.is_some())
            .finish()
    }
}

/// Resolves executable units for one capability family
pub trait Linker<F: CapabilityFamily>: Send + Sync {
    /// Resolve `unit`, using `scratch` for any files that must exist on disk
    /// 
    /// `scratch` belongs to the package being loaded and is removed once the
    /// package's resolution context is released.
    fn link(&self, unit: &UnitSource<'_>, scratch: &Path) -> PluginResult<LinkedUnit<F::Plugin>>;
}

/// Loads units as native shared libraries
pub struct NativeLinker<F: CapabilityFamily> {
    _family: PhantomData<fn() -> F>,
}

impl<F: CapabilityFamily> NativeLinker<F> {
    pub fn new() -> Self {
        Self { _family: PhantomData }
    }
}

impl<F: CapabilityFamily> Default for NativeLinker<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: CapabilityFamily> fmt::Debug for NativeLinker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLinker").field("family", &F::NAME).finish()
    }
}

impl<F: CapabilityFamily> Linker<F> for NativeLinker<F> {
    fn link(&self, unit: &UnitSource<'_>, scratch: &Path) -> PluginResult<LinkedUnit<F::Plugin>> {
        let target = scratch.join(format!("{:03}-{}", unit.ordinal, unit.file_name()));
        fs::write(&target, unit.bytes).map_err(|e| {
            PluginError::loading_failed(format!("cannot extract unit {}: {}", unit.name, e))
        })?;
        
        debug!("Opening native unit {} from {}", unit.name, target.display());
        
        // Local symbol scope: nothing this unit exports is visible to other packages.
        let library = unsafe { Library::new(&target) }.map_err(|e| {
            PluginError::loading_failed(format!("cannot load unit {}: {}", unit.name, e))
        })?;
        
        let declaration = {
            let symbol = unsafe { library.get::<*const UnitDeclaration<F::Plugin>>(F::UNIT_SYMBOL.as_bytes()) }
                .map_err(|e| {
                    PluginError::loading_failed(format!(
                        "unit {} does not export {}: {}",
                        unit.name,
                        F::UNIT_SYMBOL,
                        e
                    ))
                })?;
            if symbol.is_null() {
                return Err(PluginError::loading_failed(format!(
                    "unit {} exports a null {}",
                    unit.name,
                    F::UNIT_SYMBOL
                )));
            }
            unsafe { symbol.read() }
        };
        
        Ok(LinkedUnit {
            declaration,
            handle: Some(Arc::new(library)),
        })
    }
}

/// Resolves units against declarations compiled into the host
/// 
/// Units are matched by file stem, so `lib/leitner.so` resolves to the
/// declaration registered as `leitner`. Used for plugins bundled with the host
/// binary and in tests.
pub struct InProcessLinker<F: CapabilityFamily> {
    units: HashMap<String, UnitDeclaration<F::Plugin>>,
}

impl<F: CapabilityFamily> InProcessLinker<F> {
    pub fn new() -> Self {
        Self { units: HashMap::new() }
    }
    
    /// Make a unit stem resolvable
    pub fn with_unit<S: Into<String>>(mut self, stem: S, declaration: UnitDeclaration<F::Plugin>) -> Self {
        self.units.insert(stem.into(), declaration);
        self
    }
    
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

impl<F: CapabilityFamily> Default for InProcessLinker<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: CapabilityFamily> fmt::Debug for InProcessLinker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stems: Vec<&String> = self.units.keys().collect();
        stems.sort();
        f.debug_struct("InProcessLinker")
            .field("family", &F::NAME)
            .field("units", &stems)
            .finish()
    }
}

impl<F: CapabilityFamily> Linker<F> for InProcessLinker<F> {
    fn link(&self, unit: &UnitSource<'_>, _scratch: &Path) -> PluginResult<LinkedUnit<F::Plugin>> {
        let declaration = self.units.get(unit.stem()).copied().ok_or_else(|| {
            PluginError::loading_failed(format!("no in-process unit named '{}'", unit.stem()))
        })?;
        
        Ok(LinkedUnit {
            declaration,
            handle: None,
        })
    }
}

/// Export a unit declaration from a plugin library
/// 
/// The argument is the unit's `register` function.
#[macro_export]
macro_rules! declare_plugin_unit {
    (question_modules: $register:path) => {
        #[no_mangle]
        pub static LEARNHOST_QUESTION_MODULE_UNIT:
            $crate::plugin::UnitDeclaration<dyn $crate::plugin::QuestionModule> =
            $crate::plugin::UnitDeclaration::new($register);
    };
    (learning_strategies: $register:path) => {
        #[no_mangle]
        pub static LEARNHOST_LEARNING_STRATEGY_UNIT:
            $crate::plugin::UnitDeclaration<dyn $crate::plugin::LearningStrategy> =
            $crate::plugin::UnitDeclaration::new($register);
    };
}
