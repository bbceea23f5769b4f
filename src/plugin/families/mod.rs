//! Capability families supported by the host

pub mod question;
pub mod strategy;

pub use question::{AnswerEvaluation, QuestionContent, QuestionHandler, QuestionModule, QuestionModules};
pub use strategy::{LearningItem, LearningStrategies, LearningStrategy, Strategy};
