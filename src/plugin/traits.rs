//! Capability Contracts
//! 
//! Every plugin, whatever family it belongs to, exposes the same metadata surface.
//! A [`CapabilityFamily`] ties a family-specific contract trait to the package
//! layout and entry-point symbol used to find it, and to the factory operation the
//! host consumes.

use crate::plugin::error::PluginResult;

/// Metadata surface shared by every capability contract
pub trait Plugin: Send + Sync {
    /// Stable identifier of the capability (question-type tag, strategy name, ...)
    fn key(&self) -> String;
    
    /// Human readable name
    fn display_name(&self) -> String;
    
    /// Plugin version
    fn version(&self) -> String;
    
    /// Plugin's own check that its declared metadata is usable
    fn is_valid(&self) -> bool {
        true
    }
}

/// A family of plugins sharing one contract, one descriptor path and one factory
pub trait CapabilityFamily: Send + Sync + 'static {
    /// Contract trait object implemented by the family's plugins
    type Plugin: ?Sized + Plugin + 'static;
    
    /// Arguments accepted by the family factory
    type Args;
    
    /// Object produced by the family factory
    type Product;
    
    /// Family identifier used in logs, diagnostics and on the command line
    const NAME: &'static str;
    
    /// Fixed path of the discovery descriptor inside a package
    const DESCRIPTOR_PATH: &'static str;
    
    /// Symbol under which each executable unit exports its declaration
    const UNIT_SYMBOL: &'static str;
    
    /// Scan directory, relative to the application root, when not configured
    const DEFAULT_DIR: &'static str;
    
    /// Delegate construction to the plugin's own factory
    fn construct(plugin: &Self::Plugin, args: Self::Args) -> PluginResult<Self::Product>;
}
