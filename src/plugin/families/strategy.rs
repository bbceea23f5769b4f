//! Learning Strategies
//! 
//! A learning strategy decides the order in which a session presents items.

use serde::{Deserialize, Serialize};
use crate::plugin::error::PluginResult;
use crate::plugin::linker::Resident;
use crate::plugin::manager::PluginManager;
use crate::plugin::traits::{CapabilityFamily, Plugin};

/// One item a session can present
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LearningItem {
    pub id: String,
    pub question_type: String,
}

impl LearningItem {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, question_type: T) -> Self {
        Self {
            id: id.into(),
            question_type: question_type.into(),
        }
    }
}

/// Sequencing state for one session
pub trait Strategy: Send {
    /// Next item to present, `None` once the session is complete
    fn next_item(&mut self) -> Option<LearningItem>;
    
    fn record_answer(&mut self, item_id: &str, correct: bool);
    
    fn is_complete(&self) -> bool;
}

/// Contract implemented by learning-strategy plugins
pub trait LearningStrategy: Plugin {
    /// Build a strategy over `items`
    fn create_strategy(&self, items: Vec<LearningItem>) -> PluginResult<Box<dyn Strategy>>;
}

/// Learning-strategy family
#[derive(Debug, Clone, Copy, Default)]
pub struct LearningStrategies;

impl CapabilityFamily for LearningStrategies {
    type Plugin = dyn LearningStrategy;
    type Args = Vec<LearningItem>;
    type Product = Box<dyn Strategy>;
    
    const NAME: &'static str = "learning-strategy";
    const DESCRIPTOR_PATH: &'static str = "descriptors/learning-strategy";
    const UNIT_SYMBOL: &'static str = "LEARNHOST_LEARNING_STRATEGY_UNIT";
    const DEFAULT_DIR: &'static str = "strategies";
    
    fn construct(plugin: &Self::Plugin, args: Self::Args) -> PluginResult<Self::Product> {
        plugin.create_strategy(args)
    }
}

impl PluginManager<LearningStrategies> {
    /// Strategy `key` over `items`, or `None` when it is not available
    pub fn create_strategy(&self, key: &str, items: Vec<LearningItem>) -> PluginResult<Option<Resident<Box<dyn Strategy>>>> {
        self.create(key, items)
    }
}
