//! Version Compatibility Checker
//! 
//! Validates the plugin API version an executable unit was built against.

use crate::plugin::error::{PluginError, PluginResult};

include!(concat!(env!("OUT_DIR"), "/version_api.rs"));

/// Checker for unit API compatibility
#[derive(Debug, Clone, Copy)]
pub struct VersionCompatibilityChecker {
    /// Host API version
    api_version: u32,
}

impl VersionCompatibilityChecker {
    pub fn new(api_version: u32) -> Self {
        Self { api_version }
    }
    
    /// Checker for the API version this host was built with
    pub fn current() -> Self {
        Self::new(PLUGIN_API_VERSION)
    }
    
    pub fn api_version(&self) -> u32 {
        self.api_version
    }
    
    /// Same major version (year), and not newer than the host
    pub fn is_api_compatible(&self, unit_api_version: u32) -> bool {
        self.get_major_version(self.api_version) == self.get_major_version(unit_api_version)
            && unit_api_version <= self.api_version
    }
    
    /// Get major version (year) from API version
    pub fn get_major_version(&self, api_version: u32) -> u32 {
        api_version / 10000
    }
    
    /// Check a unit's declared API version
    pub fn check_unit(&self, unit: &str, unit_api_version: u32) -> PluginResult<()> {
        if !self.is_api_compatible(unit_api_version) {
            return Err(PluginError::version_incompatible(format!(
                "unit '{}' was built for API version {} but host provides {}",
                unit,
                unit_api_version,
                self.api_version
            )));
        }
        Ok(())
    }
}

impl Default for VersionCompatibilityChecker {
    fn default() -> Self {
        Self::current()
    }
}
