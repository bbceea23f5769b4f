//! Package Archives
//! 
//! A package is a zip archive carrying a discovery descriptor and one or more
//! executable units (native libraries). [`PackageArchive`] reads them,
//! [`PackageBuilder`] writes them.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};
use crate::plugin::descriptor::DiscoveryDescriptor;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::traits::CapabilityFamily;

/// File extension of candidate packages
pub const PACKAGE_EXTENSION: &str = "pkg";

/// Entry extensions recognised as executable units
pub const UNIT_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

/// Read access to a package archive
pub struct PackageArchive {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl std::fmt::Debug for PackageArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageArchive")
            .field("path", &self.path)
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl PackageArchive {
    /// Open a package for reading
    pub fn open<P: AsRef<Path>>(path: P) -> PluginResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| PluginError::archive_error(format!("cannot open {}: {}", path.display(), e)))?;
        let archive = ZipArchive::new(file)
            .map_err(|e| PluginError::archive_error(format!("{} is not a valid package archive: {}", path.display(), e)))?;
        
        Ok(Self { path, archive })
    }
    
    pub fn path(&self) -> &Path {
        &self.path
    }
    
    /// Read an entry, or `None` if the package has no such entry
    pub fn read_entry(&mut self, name: &str) -> PluginResult<Option<Vec<u8>>> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        
        let mut buffer = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buffer)
            .map_err(|e| PluginError::archive_error(format!("cannot read entry {}: {}", name, e)))?;
        Ok(Some(buffer))
    }
    
    /// Read a UTF-8 entry, or `None` if the package has no such entry
    pub fn read_text(&mut self, name: &str) -> PluginResult<Option<String>> {
        match self.read_entry(name)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| PluginError::archive_error(format!("entry {} is not valid UTF-8", name))),
            None => Ok(None),
        }
    }
    
    /// Names of the executable units, sorted
    pub fn unit_names(&self) -> Vec<String> {
        let mut units: Vec<String> = self.archive
            .file_names()
            .filter(|name| is_unit_entry(name))
            .map(str::to_string)
            .collect();
        units.sort();
        units
    }
}

/// Whether an archive entry is an executable unit
/// 
/// Directory entries, AppleDouble `._*` sidecars and anything under
/// `__MACOSX/` are synthetic and never count.
pub fn is_unit_entry(name: &str) -> bool {
    if name.ends_with('/') || name.split('/').any(|segment| segment == "__MACOSX") {
        return false;
    }
    
    let file_name = entry_file_name(name);
    if file_name.starts_with("._") {
        return false;
    }
    
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| UNIT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Last path segment of an archive entry name
pub fn entry_file_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// File name of an entry without its extension
pub fn entry_stem(name: &str) -> &str {
    let file_name = entry_file_name(name);
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    }
}

/// Builder for package archives
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    descriptor_path: String,
    implementations: Vec<String>,
    raw_descriptor: Option<String>,
    entries: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    /// Create a builder writing its descriptor at `descriptor_path`
    pub fn new<S: Into<String>>(descriptor_path: S) -> Self {
        Self {
            descriptor_path: descriptor_path.into(),
            implementations: Vec::new(),
            raw_descriptor: None,
            entries: Vec::new(),
        }
    }
    
    /// Create a builder for a capability family
    pub fn for_family<F: CapabilityFamily>() -> Self {
        Self::new(F::DESCRIPTOR_PATH)
    }
    
    /// Declare an implementation in the descriptor
    pub fn implementation<S: Into<String>>(mut self, name: S) -> Self {
        self.implementations.push(name.into());
        self
    }
    
    /// Use literal descriptor text instead of the declared implementations
    pub fn raw_descriptor<S: Into<String>>(mut self, text: S) -> Self {
        self.raw_descriptor = Some(text.into());
        self
    }
    
    /// Add an executable unit under `lib/`
    pub fn unit<S: AsRef<str>>(self, file_name: S, bytes: impl Into<Vec<u8>>) -> Self {
        let name = format!("lib/{}", file_name.as_ref());
        self.entry(name, bytes)
    }
    
    /// Add an arbitrary entry
    pub fn entry<S: Into<String>>(mut self, name: S, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.into(), bytes.into()));
        self
    }
    
    fn descriptor_text(&self) -> Option<String> {
        if let Some(raw) = &self.raw_descriptor {
            return Some(raw.clone());
        }
        if self.implementations.is_empty() {
            return None;
        }
        let mut text = self.implementations.join("\n");
        text.push('\n');
        Some(text)
    }
    
    /// Check that the builder would produce a package the validator accepts
    pub fn check(&self) -> PluginResult<()> {
        let text = self.descriptor_text()
            .ok_or_else(|| PluginError::validation_failed("no implementations declared"))?;
        DiscoveryDescriptor::parse(&text)?;
        if !self.entries.iter().any(|(name, _)| is_unit_entry(name)) {
            return Err(PluginError::validation_failed("package contains no executable units"));
        }
        Ok(())
    }
    
    /// Write the archive to `path`
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> PluginResult<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| PluginError::archive_error(format!("cannot create {}: {}", path.display(), e)))?;
        let mut writer = ZipWriter::new(file);
        
        if let Some(text) = self.descriptor_text() {
            writer.start_file(self.descriptor_path.as_str(), SimpleFileOptions::default())?;
            writer.write_all(text.as_bytes())
                .map_err(|e| PluginError::archive_error(e.to_string()))?;
        }
        
        for (name, bytes) in &self.entries {
            writer.start_file(name.as_str(), SimpleFileOptions::default())?;
            writer.write_all(bytes)
                .map_err(|e| PluginError::archive_error(e.to_string()))?;
        }
        
        writer.finish()?;
        Ok(())
    }
}
