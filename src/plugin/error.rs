//! Plugin Error Types
//! 
//! Error handling for the plugin loading pipeline. Only configuration errors and
//! caller misuse ever reach callers of the query surface; everything else is
//! recorded in the load outcome and logged.

use thiserror::Error;

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Error types for plugin operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// Scan directory is unusable
    #[error("Plugin configuration error: {message}")]
    ConfigurationError { message: String },
    
    /// Caller passed an argument that violates the contract (e.g. blank key)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
    
    /// Package failed structural or descriptor validation
    #[error("Package validation failed: {message}")]
    ValidationFailed { message: String },
    
    /// Discovery descriptor could not be parsed
    #[error("Descriptor parse error: {message}")]
    DescriptorParseError { message: String },
    
    /// Package or unit could not be loaded
    #[error("Plugin loading error: {message}")]
    LoadingFailed { message: String },
    
    /// Unit was built against an incompatible plugin API
    #[error("Version compatibility error: {message}")]
    VersionIncompatible { message: String },
    
    /// Declared implementation could not be instantiated
    #[error("Plugin instantiation failed: {message}")]
    InstantiationFailed { message: String },
    
    /// Plugin factory failed to build a product
    #[error("Plugin execution error: {message}")]
    ExecutionFailed { message: String },
    
    /// Package archive could not be read or written
    #[error("Package archive error: {message}")]
    ArchiveError { message: String },
}

impl PluginError {
    /// Create a configuration error
    pub fn configuration_error<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError { message: message.into() }
    }
    
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument { message: message.into() }
    }
    
    /// Create a validation error
    pub fn validation_failed<S: Into<String>>(message: S) -> Self {
        Self::ValidationFailed { message: message.into() }
    }
    
    /// Create a descriptor parse error
    pub fn descriptor_parse_error<S: Into<String>>(message: S) -> Self {
        Self::DescriptorParseError { message: message.into() }
    }
    
    /// Create a loading failed error
    pub fn loading_failed<S: Into<String>>(message: S) -> Self {
        Self::LoadingFailed { message: message.into() }
    }
    
    /// Create a version incompatible error
    pub fn version_incompatible<S: Into<String>>(message: S) -> Self {
        Self::VersionIncompatible { message: message.into() }
    }
    
    /// Create an instantiation error
    pub fn instantiation_failed<S: Into<String>>(message: S) -> Self {
        Self::InstantiationFailed { message: message.into() }
    }
    
    /// Create an execution error
    pub fn execution_failed<S: Into<String>>(message: S) -> Self {
        Self::ExecutionFailed { message: message.into() }
    }
    
    /// Create an archive error
    pub fn archive_error<S: Into<String>>(message: S) -> Self {
        Self::ArchiveError { message: message.into() }
    }
    
    /// Check if the load pass can continue past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self,
            PluginError::ValidationFailed { .. } |
            PluginError::DescriptorParseError { .. } |
            PluginError::LoadingFailed { .. } |
            PluginError::VersionIncompatible { .. } |
            PluginError::InstantiationFailed { .. } |
            PluginError::ExecutionFailed { .. } |
            PluginError::ArchiveError { .. }
        )
    }
    
    /// Check if error is a configuration issue
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, PluginError::ConfigurationError { .. })
    }
    
    /// Check if error is a caller bug
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, PluginError::InvalidArgument { .. })
    }
}

impl From<zip::result::ZipError> for PluginError {
    fn from(err: zip::result::ZipError) -> Self {
        PluginError::archive_error(err.to_string())
    }
}

impl From<libloading::Error> for PluginError {
    fn from(err: libloading::Error) -> Self {
        PluginError::loading_failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = PluginError::instantiation_failed("constructor panicked");
        assert!(matches!(error, PluginError::InstantiationFailed { .. }));
        assert!(error.to_string().contains("constructor panicked"));
    }
    
    #[test]
    fn test_error_classification() {
        let config_error = PluginError::configuration_error("not a directory");
        assert!(config_error.is_configuration_error());
        assert!(!config_error.is_recoverable());
        
        let load_error = PluginError::loading_failed("missing symbol");
        assert!(load_error.is_recoverable());
        assert!(!load_error.is_configuration_error());
        
        let misuse = PluginError::invalid_argument("blank key");
        assert!(misuse.is_contract_violation());
        assert!(!misuse.is_recoverable());
    }
    
    #[test]
    fn test_error_display() {
        let error = PluginError::invalid_argument("key must not be blank");
        assert_eq!(error.to_string(), "Invalid argument: key must not be blank");
    }
    
    #[test]
    fn test_zip_error_conversion() {
        let error: PluginError = zip::result::ZipError::FileNotFound.into();
        assert!(matches!(error, PluginError::ArchiveError { .. }));
    }
}
