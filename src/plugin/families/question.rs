//! Question Modules
//! 
//! A question module answers for one question-type tag and builds handlers for
//! question content of that type.

use serde::{Deserialize, Serialize};
use crate::plugin::error::PluginResult;
use crate::plugin::linker::Resident;
use crate::plugin::manager::PluginManager;
use crate::plugin::traits::{CapabilityFamily, Plugin};

/// Parsed question content handed to a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionContent {
    /// Question-type tag; matches the module key
    pub question_type: String,
    /// Type-specific body as parsed from course content
    #[serde(default)]
    pub body: serde_json::Value,
}

impl QuestionContent {
    pub fn new<S: Into<String>>(question_type: S, body: serde_json::Value) -> Self {
        Self {
            question_type: question_type.into(),
            body,
        }
    }
}

/// Result of checking one answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEvaluation {
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Handles one question instance
pub trait QuestionHandler: Send {
    fn question_type(&self) -> &str;
    
    /// Text shown to the learner
    fn prompt(&self) -> String;
    
    fn evaluate(&self, answer: &str) -> AnswerEvaluation;
}

/// Contract implemented by question-module plugins
pub trait QuestionModule: Plugin {
    /// Build a handler for `content`
    fn create_handler(&self, content: &QuestionContent) -> PluginResult<Box<dyn QuestionHandler>>;
}

/// Question-module family
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionModules;

impl CapabilityFamily for QuestionModules {
    type Plugin = dyn QuestionModule;
    type Args = QuestionContent;
    type Product = Box<dyn QuestionHandler>;
    
    const NAME: &'static str = "question-module";
    const DESCRIPTOR_PATH: &'static str = "descriptors/question-module";
    const UNIT_SYMBOL: &'static str = "LEARNHOST_QUESTION_MODULE_UNIT";
    const DEFAULT_DIR: &'static str = "modules";
    
    fn construct(plugin: &Self::Plugin, args: Self::Args) -> PluginResult<Self::Product> {
        plugin.create_handler(&args)
    }
}

impl PluginManager<QuestionModules> {
    /// Handler for `content`, chosen by its question type
    pub fn create_handler(&self, content: QuestionContent) -> PluginResult<Option<Resident<Box<dyn QuestionHandler>>>> {
        let key = content.question_type.clone();
        self.create(&key, content)
    }
    
    /// Whether a module is registered for `question_type`
    pub fn supports(&self, question_type: &str) -> PluginResult<bool> {
        Ok(self.find_by_key(question_type)?.is_some())
    }
}
