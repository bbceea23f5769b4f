//! Discovery Descriptor
//! 
//! Parses the newline-delimited list of implementation names a package declares.

use once_cell::sync::Lazy;
use regex::Regex;
use crate::plugin::error::{PluginError, PluginResult};

static QUALIFIED_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+(\.[A-Za-z0-9_]+)*$").expect("qualified name pattern is valid")
});

/// Implementation names declared by one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryDescriptor {
    implementations: Vec<String>,
}

impl DiscoveryDescriptor {
    /// Parse descriptor text
    /// 
    /// Blank lines and `#` comments are skipped. Every other line must be a
    /// dot-separated qualified name. Repeated names keep their first position.
    pub fn parse(content: &str) -> PluginResult<Self> {
        let mut implementations: Vec<String> = Vec::new();
        
        for (index, raw_line) in content.lines().enumerate() {
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            }
            .trim();
            
            if line.is_empty() {
                continue;
            }
            
            if !is_qualified_name(line) {
                return Err(PluginError::descriptor_parse_error(format!(
                    "line {}: '{}' is not a qualified implementation name",
                    index + 1,
                    line
                )));
            }
            
            if !implementations.iter().any(|existing| existing == line) {
                implementations.push(line.to_string());
            }
        }
        
        if implementations.is_empty() {
            return Err(PluginError::descriptor_parse_error("descriptor declares no implementations"));
        }
        
        Ok(Self { implementations })
    }
    
    /// Declared implementation names in declaration order
    pub fn implementations(&self) -> &[String] {
        &self.implementations
    }
    
    pub fn len(&self) -> usize {
        self.implementations.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.implementations.is_empty()
    }
    
    /// Render back to descriptor text
    pub fn to_text(&self) -> String {
        let mut text = self.implementations.join("\n");
        text.push('\n');
        text
    }
}

/// Check a single name against the qualified-identifier syntax
pub fn is_qualified_name(name: &str) -> bool {
    QUALIFIED_NAME.is_match(name)
}
