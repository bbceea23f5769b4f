use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use toml::Value;
use log::{debug, info};
use crate::plugin::{CapabilityFamily, LearningStrategies, PluginConfig, QuestionModules};

/// Configuration storage - section_name -> key -> value
pub type Configuration = HashMap<String, HashMap<String, String>>;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "LEARNHOST_CONFIG";

/// Environment variable naming the application root
pub const HOME_ENV: &str = "LEARNHOST_HOME";

/// Configuration manager
pub struct ConfigManager {
    config: Configuration,
    config_file_path: Option<PathBuf>,
}

/// Where plugin packages are looked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettings {
    /// Application root; family directories are resolved against it
    pub root: PathBuf,
    pub question_modules_dir: PathBuf,
    pub learning_strategies_dir: PathBuf,
    /// Parent for per-package scratch directories
    pub scratch_dir: Option<PathBuf>,
}

impl PluginSettings {
    /// Scan configuration for one family directory
    fn family_config(&self, directory: &Path) -> PluginConfig {
        let config = PluginConfig::new(self.root.join(directory));
        match &self.scratch_dir {
            Some(scratch) => config.with_scratch_root(self.root.join(scratch)),
            None => config,
        }
    }

    pub fn question_modules(&self) -> PluginConfig {
        self.family_config(&self.question_modules_dir)
    }

    pub fn learning_strategies(&self) -> PluginConfig {
        self.family_config(&self.learning_strategies_dir)
    }
}

impl ConfigManager {
    /// Create a new ConfigManager from a Configuration (primarily for testing)
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            config_file_path: None,
        }
    }

    /// Load configuration using discovery hierarchy
    pub fn load() -> Result<Self> {
        debug!("Starting configuration discovery");

        let config_paths = discover_config_files()?;

        for path in config_paths {
            debug!("Attempting to load config from: {}", path.display());
            if path.exists() {
                info!("Loading configuration from: {}", path.display());
                return Self::load_from_file(path);
            }
        }

        info!("No configuration file found, using empty configuration");
        Ok(Self::from_config(Configuration::new()))
    }

    /// Load configuration from explicit file path
    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        debug!("Loading configuration from file: {}", path.display());

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = parse_toml_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Successfully loaded configuration from: {}", path.display());
        Ok(Self {
            config,
            config_file_path: Some(path),
        })
    }

    /// File the configuration was read from, if any
    pub fn config_file_path(&self) -> Option<&Path> {
        self.config_file_path.as_deref()
    }

    /// Get value from configuration with fallback to `base`
    pub fn get_value(&self, section: &str, key: &str) -> Option<&String> {
        if let Some(value) = self.config.get(section).and_then(|s| s.get(key)) {
            return Some(value);
        }

        self.config.get("base").and_then(|s| s.get(key))
    }

    /// Get boolean value with type conversion
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get_value(section, key) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(anyhow::anyhow!("Invalid boolean value for {}.{}: {}", section, key, value)),
            },
            None => Ok(None),
        }
    }

    /// Get log level value with type conversion
    pub fn get_log_level(&self, section: &str, key: &str) -> Result<Option<log::LevelFilter>> {
        match self.get_value(section, key) {
            Some(value) => Ok(Some(crate::logging::parse_log_level(value)?)),
            None => Ok(None),
        }
    }

    /// Get path value with type conversion
    pub fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.get_value(section, key).map(|value| expand_tilde(value))
    }

    /// Resolve plugin directories
    ///
    /// The root comes from `cli_root`, then `plugins.root`, then `$LEARNHOST_HOME`,
    /// then the directory holding the running executable.
    pub fn get_plugin_settings(&self, cli_root: Option<&Path>) -> Result<PluginSettings> {
        let root = match cli_root {
            Some(root) => {
                debug!("Using application root from command line: {}", root.display());
                root.to_path_buf()
            }
            None => match self.get_path("plugins", "root") {
                Some(root) => {
                    debug!("Using application root from config: {}", root.display());
                    root
                }
                None => default_root()?,
            },
        };

        let question_modules_dir = self.get_path("plugins", "question-modules-dir")
            .unwrap_or_else(|| PathBuf::from(QuestionModules::DEFAULT_DIR));
        let learning_strategies_dir = self.get_path("plugins", "learning-strategies-dir")
            .unwrap_or_else(|| PathBuf::from(LearningStrategies::DEFAULT_DIR));
        let scratch_dir = self.get_path("plugins", "scratch-dir");

        Ok(PluginSettings {
            root,
            question_modules_dir,
            learning_strategies_dir,
            scratch_dir,
        })
    }
}

/// Root when neither the command line nor the config file names one
fn default_root() -> Result<PathBuf> {
    if let Ok(home) = env::var(HOME_ENV) {
        if !home.trim().is_empty() {
            debug!("Using application root from ${}: {}", HOME_ENV, home);
            return Ok(expand_tilde(&home));
        }
    }

    let exe = env::current_exe().context("Failed to locate the running executable")?;
    let root = exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("Executable path has no parent: {}", exe.display()))?;
    debug!("Using executable directory as application root: {}", root.display());
    Ok(root)
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(path.trim_start_matches('~').trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

/// Discover configuration files in order of precedence
fn discover_config_files() -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    // 1. Environment variable $LEARNHOST_CONFIG
    if let Ok(env_path) = env::var(CONFIG_ENV) {
        paths.push(PathBuf::from(env_path));
    }

    // 2. XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("learnhost").join("config.toml"));
    }

    // 3. Home directory
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".learnhost.toml"));
    }

    // 4. Working directory
    paths.push(PathBuf::from("./.learnhost.toml"));

    debug!("Config discovery paths: {:?}", paths);
    Ok(paths)
}

/// Parse TOML content to string-based configuration
fn parse_toml_config(content: &str) -> Result<Configuration> {
    let toml_value: Value = content.parse()
        .context("Failed to parse TOML content")?;

    let mut config = Configuration::new();

    if let Value::Table(table) = toml_value {
        flatten_toml_table(&table, String::new(), &mut config);
    }

    debug!("Parsed configuration: {:?}", config);
    Ok(config)
}

/// Recursively flatten TOML tables into section.subsection format
fn flatten_toml_table(table: &toml::Table, prefix: String, config: &mut Configuration) {
    for (key, value) in table {
        let section_name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Table(subtable) => {
                if subtable.values().all(|v| !matches!(v, Value::Table(_))) {
                    // Leaf table
                    let mut section_map = HashMap::new();
                    for (subkey, subvalue) in subtable {
                        section_map.insert(subkey.clone(), toml_value_to_string(subvalue));
                    }
                    config.insert(section_name, section_map);
                } else {
                    flatten_toml_table(subtable, section_name, config);
                }
            }
            _ => {
                // Top-level key outside any table
                let mut section_map = HashMap::new();
                section_map.insert("value".to_string(), toml_value_to_string(value));
                config.insert(section_name, section_map);
            }
        }
    }
}

/// Convert TOML Value to string representation
fn toml_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Array(_) | Value::Table(_) => value.to_string(),
        _ => String::new(),
    }
}
