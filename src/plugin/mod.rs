//! Plugin System Module
//! 
//! Discovers externally built packages on disk, validates them before touching
//! their code, loads each one in its own resolution context, and publishes a
//! frozen, queryable registry per capability family.
//! 
//! # Example Usage
//! 
//! ```no_run
//! use learnhost::plugin::{LearningItem, PluginHost};
//! use std::path::Path;
//! 
//! let host = PluginHost::from_root(Path::new("/opt/learnhost"));
//! let items = vec![LearningItem::new("q1", "multiple-choice")];
//! match host.learning_strategies().create_strategy("leitner", items)? {
//!     Some(_strategy) => println!("strategy ready"),
//!     None => println!("no strategy available"),
//! }
//! # Ok::<(), learnhost::plugin::PluginError>(())
//! ```

pub mod traits;
pub mod error;
pub mod descriptor;
pub mod package;
pub mod compatibility;
pub mod discovery;
pub mod linker;
pub mod loader;
pub mod registry;
pub mod manager;
pub mod families;

#[cfg(test)]
pub mod tests;

// Re-export core types for easier access
pub use traits::{CapabilityFamily, Plugin};
pub use error::{PluginError, PluginResult};
pub use compatibility::{VersionCompatibilityChecker, PLUGIN_API_VERSION};

// Packages and discovery
pub use descriptor::DiscoveryDescriptor;
pub use package::{PackageArchive, PackageBuilder, PACKAGE_EXTENSION};
pub use discovery::{DescriptorValidator, PackageScanner, ValidationResult};

// Loading
pub use linker::{InProcessLinker, Linker, NativeLinker, Resident, UnitDeclaration, UnitHandle, UnitRegistrar};
pub use loader::{IsolatedLoader, ResolutionContext};

// Registry and management
pub use registry::{FailureStage, LoadFailure, LoadOutcome, LoadedPlugin, PluginRegistry, RegistryBuilder};
pub use manager::{ManagerState, PluginConfig, PluginHost, PluginManager};

// Capability families
pub use families::{
    AnswerEvaluation, LearningItem, LearningStrategies, LearningStrategy, QuestionContent,
    QuestionHandler, QuestionModule, QuestionModules, Strategy,
};
