use clap::{Parser, Subcommand, ValueEnum, ArgAction};
use anyhow::Result;
use std::fmt;
use std::path::PathBuf;
use log::{debug, info};
use crate::plugin::{descriptor::is_qualified_name, CapabilityFamily, LearningStrategies, QuestionModules};

/// Plugin host for question modules and learning strategies
#[derive(Parser, Debug)]
#[command(name = "learnhost")]
#[command(about = "Discovers, validates and loads question modules and learning strategies from plugin packages")]
#[command(version)]
pub struct Args {
    /// Application root holding the plugin directories
    #[arg(short = 'r', long = "root", value_name = "PATH", global = true)]
    pub root: Option<PathBuf>,
    
    /// Verbose output (debug level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    
    /// Quiet output (error level logging only)
    #[arg(short, long, global = true)]
    pub quiet: bool,
    
    /// Debug output (trace level logging)
    #[arg(long, global = true)]
    pub debug: bool,
    
    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    pub log_format: String,
    
    /// Log file path for file output
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,
    
    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_file_level: Option<String>,
    
    /// Configuration file path
    #[arg(long, value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,
    
    #[command(subcommand)]
    pub command: Command,
}

/// Capability family selector
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    QuestionModules,
    LearningStrategies,
}

impl Family {
    /// Internal descriptor path for packages of this family
    pub fn descriptor_path(&self) -> &'static str {
        match self {
            Family::QuestionModules => QuestionModules::DESCRIPTOR_PATH,
            Family::LearningStrategies => LearningStrategies::DESCRIPTOR_PATH,
        }
    }
    
    pub fn name(&self) -> &'static str {
        match self {
            Family::QuestionModules => QuestionModules::NAME,
            Family::LearningStrategies => LearningStrategies::NAME,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List loaded plugins
    List {
        /// Only list one family
        #[arg(long, value_enum)]
        family: Option<Family>,
    },
    
    /// Print the diagnostic dump and load outcome for every family
    Dump {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    
    /// Validate a single package without loading it
    Check {
        #[arg(long, value_enum)]
        family: Family,
        
        #[arg(value_name = "PACKAGE")]
        package: PathBuf,
    },
    
    /// Build a package from executable units
    Pack {
        #[arg(long, value_enum)]
        family: Family,
        
        /// Package file to write
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        
        /// Implementation name to declare in the descriptor
        #[arg(short = 'i', long = "implementation", value_name = "NAME", action = ArgAction::Append, required = true)]
        implementations: Vec<String>,
        
        /// Executable unit to include
        #[arg(short = 'u', long = "unit", value_name = "FILE", action = ArgAction::Append, required = true)]
        units: Vec<PathBuf>,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    let args = Args::parse();
    debug!("Parsed CLI arguments: {:?}", args);
    args
}

/// Validate CLI argument combinations
pub fn validate_args(args: &Args) -> Result<()> {
    debug!("Validating CLI argument combinations");
    
    let log_flags_count = [args.verbose, args.quiet, args.debug]
        .iter()
        .filter(|&&flag| flag)
        .count();
    
    if log_flags_count > 1 {
        return Err(anyhow::anyhow!(
            "Conflicting log level flags: only one of --verbose, --quiet, or --debug may be specified"
        ));
    }
    
    match args.log_format.to_lowercase().as_str() {
        "text" | "json" => {},
        _ => return Err(anyhow::anyhow!(
            "Invalid log format '{}'. Valid options: text, json", args.log_format
        )),
    }
    
    if let Some(ref level) = args.log_file_level {
        match level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {},
            _ => return Err(anyhow::anyhow!(
                "Invalid log file level '{}'. Valid levels: error, warn, info, debug, trace", level
            )),
        }
    }
    
    if args.log_file_level.is_some() && args.log_file.is_none() {
        return Err(anyhow::anyhow!(
            "--log-file-level requires --log-file to be specified"
        ));
    }
    
    if let Command::Pack { implementations, .. } = &args.command {
        if let Some(bad) = implementations.iter().find(|name| !is_qualified_name(name)) {
            return Err(anyhow::anyhow!(
                "Invalid implementation name '{}': expected dot-separated identifiers", bad
            ));
        }
    }
    
    info!("CLI arguments validated successfully");
    Ok(())
}
