//! Plugin Discovery
//! 
//! Finds candidate packages in a scan directory and validates each one before any
//! of its code is touched.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::plugin::descriptor::DiscoveryDescriptor;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::package::{PackageArchive, PACKAGE_EXTENSION};
use crate::plugin::traits::CapabilityFamily;

/// Enumerates candidate package files in one scan directory
#[derive(Debug, Clone)]
pub struct PackageScanner {
    directory: PathBuf,
}

impl PackageScanner {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }
    
    pub fn directory(&self) -> &Path {
        &self.directory
    }
    
    /// List candidate packages in lexical file-name order
    /// 
    /// A missing directory is created and yields no candidates. A path that is
    /// not a directory, or cannot be listed, is a configuration error.
    pub fn scan(&self) -> PluginResult<Vec<PathBuf>> {
        match fs::metadata(&self.directory) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(PluginError::configuration_error(format!(
                    "Plugin path is not a directory: {}",
                    self.directory.display()
                )));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Creating missing plugin directory: {}", self.directory.display());
                fs::create_dir_all(&self.directory).map_err(|e| {
                    PluginError::configuration_error(format!(
                        "Failed to create plugin directory {}: {}",
                        self.directory.display(),
                        e
                    ))
                })?;
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(PluginError::configuration_error(format!(
                    "Failed to inspect plugin directory {}: {}",
                    self.directory.display(),
                    e
                )));
            }
        }
        
        let entries = fs::read_dir(&self.directory).map_err(|e| {
            PluginError::configuration_error(format!(
                "Failed to read plugin directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;
        
        let mut candidates = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", self.directory.display(), e);
                    continue;
                }
            };
            
            let path = entry.path();
            if path.is_file() && has_package_extension(&path) {
                candidates.push(path);
            } else {
                debug!("Ignoring non-package entry: {}", path.display());
            }
        }
        
        candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        debug!("Found {} candidate package(s) in {}", candidates.len(), self.directory.display());
        Ok(candidates)
    }
}

/// Whether a path carries the package extension
pub fn has_package_extension(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(PACKAGE_EXTENSION)
}

/// Outcome of validating one candidate package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub ok: bool,
    pub reason: Option<String>,
    /// Parsed descriptor, present when `ok`
    pub descriptor: Option<DiscoveryDescriptor>,
    /// Executable unit entries, present when `ok`
    pub units: Vec<String>,
}

impl ValidationResult {
    fn accepted(descriptor: DiscoveryDescriptor, units: Vec<String>) -> Self {
        Self {
            ok: true,
            reason: None,
            descriptor: Some(descriptor),
            units,
        }
    }
    
    fn rejected<S: Into<String>>(reason: S) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            descriptor: None,
            units: Vec::new(),
        }
    }
}

/// Structural and descriptor checks for one capability family
#[derive(Debug)]
pub struct DescriptorValidator<F: CapabilityFamily> {
    _family: PhantomData<F>,
}

impl<F: CapabilityFamily> DescriptorValidator<F> {
    pub fn new() -> Self {
        Self { _family: PhantomData }
    }
    
    /// Validate a candidate package
    /// 
    /// Checks run in order and stop at the first failure: the file exists and
    /// is readable, it carries the family descriptor, the descriptor is well
    /// formed, and at least one executable unit is present.
    pub fn validate(&self, package: &Path) -> ValidationResult {
        match fs::metadata(package) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return ValidationResult::rejected(format!("{} is not a regular file", package.display())),
            Err(e) => return ValidationResult::rejected(format!("{} does not exist: {}", package.display(), e)),
        }
        
        if let Err(e) = File::open(package) {
            return ValidationResult::rejected(format!("{} is not readable: {}", package.display(), e));
        }
        
        let mut archive = match PackageArchive::open(package) {
            Ok(archive) => archive,
            Err(e) => return ValidationResult::rejected(e.to_string()),
        };
        
        let content = match archive.read_text(F::DESCRIPTOR_PATH) {
            Ok(Some(content)) => content,
            Ok(None) => {
                return ValidationResult::rejected(format!(
                    "missing discovery descriptor {}",
                    F::DESCRIPTOR_PATH
                ));
            }
            Err(e) => return ValidationResult::rejected(e.to_string()),
        };
        
        let descriptor = match DiscoveryDescriptor::parse(&content) {
            Ok(descriptor) => descriptor,
            Err(e) => return ValidationResult::rejected(format!("invalid discovery descriptor: {}", e)),
        };
        
        let units = archive.unit_names();
        if units.is_empty() {
            return ValidationResult::rejected("package contains no executable units");
        }
        
        debug!(
            "Validated {}: {} implementation(s), {} unit(s)",
            package.display(),
            descriptor.len(),
            units.len()
        );
        ValidationResult::accepted(descriptor, units)
    }
}

impl<F: CapabilityFamily> Default for DescriptorValidator<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_missing_directory_is_created() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("strategies");
        
        let candidates = PackageScanner::new(&dir).scan().unwrap();
        assert!(candidates.is_empty());
        assert!(dir.is_dir());
    }

    #[test]
    fn test_scan_file_instead_of_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("modules");
        fs::write(&path, b"oops").unwrap();
        
        let result = PackageScanner::new(&path).scan();
        assert!(matches!(result, Err(PluginError::ConfigurationError { .. })));
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let temp_dir = tempfile::tempdir().unwrap();
        for name in ["c.pkg", "a.pkg", "notes.txt", "b.pkg", "b.pkg.bak"] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(temp_dir.path().join("dir.pkg")).unwrap();
        
        let candidates = PackageScanner::new(temp_dir.path()).scan().unwrap();
        let names: Vec<_> = candidates
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pkg", "b.pkg", "c.pkg"]);
    }
}
