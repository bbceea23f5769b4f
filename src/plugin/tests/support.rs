//! Mock plugins, in-process units and package helpers for tests

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::families::*;
use crate::plugin::linker::{
    InProcessLinker, LinkedUnit, Linker, UnitDeclaration, UnitHandle, UnitRegistrar, UnitSource,
};
use crate::plugin::package::PackageBuilder;
use crate::plugin::traits::{CapabilityFamily, Plugin};

/// Strategy plugin with configurable metadata
pub struct MockStrategy {
    key: &'static str,
    name: &'static str,
    version: &'static str,
    valid: bool,
    factory_fails: bool,
}

impl MockStrategy {
    pub fn new(key: &'static str, name: &'static str) -> Self {
        Self {
            key,
            name,
            version: "1.0.0",
            valid: true,
            factory_fails: false,
        }
    }
}

impl Plugin for MockStrategy {
    fn key(&self) -> String {
        self.key.to_string()
    }

    fn display_name(&self) -> String {
        self.name.to_string()
    }

    fn version(&self) -> String {
        self.version.to_string()
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

impl LearningStrategy for MockStrategy {
    fn create_strategy(&self, items: Vec<LearningItem>) -> PluginResult<Box<dyn Strategy>> {
        if self.factory_fails {
            return Err(PluginError::execution_failed("no items can be scheduled"));
        }
        Ok(Box::new(SequentialStrategy::new(items)))
    }
}

/// Presents items in order, re-queueing wrong answers once
pub struct SequentialStrategy {
    queue: VecDeque<LearningItem>,
    current: Option<LearningItem>,
    retried: Vec<String>,
}

impl SequentialStrategy {
    pub fn new(items: Vec<LearningItem>) -> Self {
        Self {
            queue: items.into(),
            current: None,
            retried: Vec::new(),
        }
    }
}

impl Strategy for SequentialStrategy {
    fn next_item(&mut self) -> Option<LearningItem> {
        self.current = self.queue.pop_front();
        self.current.clone()
    }

    fn record_answer(&mut self, item_id: &str, correct: bool) {
        if correct || self.retried.iter().any(|id| id == item_id) {
            return;
        }
        if let Some(item) = self.current.as_ref().filter(|item| item.id == item_id) {
            self.retried.push(item.id.clone());
            self.queue.push_back(item.clone());
        }
    }

    fn is_complete(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Strategy whose key accessor panics
pub struct PanickyMetadata;

impl Plugin for PanickyMetadata {
    fn key(&self) -> String {
        panic!("metadata not initialised")
    }

    fn display_name(&self) -> String {
        "Panicky".to_string()
    }

    fn version(&self) -> String {
        "0.1.0".to_string()
    }
}

impl LearningStrategy for PanickyMetadata {
    fn create_strategy(&self, items: Vec<LearningItem>) -> PluginResult<Box<dyn Strategy>> {
        Ok(Box::new(SequentialStrategy::new(items)))
    }
}

/// Strategy whose factory panics
pub struct PanickyFactory;

impl Plugin for PanickyFactory {
    fn key(&self) -> String {
        "panicky-factory".to_string()
    }

    fn display_name(&self) -> String {
        "Panicky Factory".to_string()
    }

    fn version(&self) -> String {
        "0.1.0".to_string()
    }
}

impl LearningStrategy for PanickyFactory {
    fn create_strategy(&self, _items: Vec<LearningItem>) -> PluginResult<Box<dyn Strategy>> {
        panic!("factory exploded")
    }
}

pub fn sequential() -> Box<dyn LearningStrategy> {
    Box::new(MockStrategy::new("seq", "Sequential"))
}

pub fn sequential_rival() -> Box<dyn LearningStrategy> {
    Box::new(MockStrategy::new("seq", "Sequential (rival)"))
}

pub fn random() -> Box<dyn LearningStrategy> {
    Box::new(MockStrategy::new("random", "Random"))
}

pub fn alpha() -> Box<dyn LearningStrategy> {
    Box::new(MockStrategy::new("alpha", "Alpha"))
}

pub fn beta() -> Box<dyn LearningStrategy> {
    Box::new(MockStrategy::new("beta", "Beta"))
}

pub fn blank_key() -> Box<dyn LearningStrategy> {
    Box::new(MockStrategy::new("  ", "Blank"))
}

pub fn blank_version() -> Box<dyn LearningStrategy> {
    let mut strategy = MockStrategy::new("unversioned", "Unversioned");
    strategy.version = "";
    Box::new(strategy)
}

pub fn self_invalid() -> Box<dyn LearningStrategy> {
    let mut strategy = MockStrategy::new("invalid", "Invalid");
    strategy.valid = false;
    Box::new(strategy)
}

pub fn failing_factory() -> Box<dyn LearningStrategy> {
    let mut strategy = MockStrategy::new("failing", "Failing");
    strategy.factory_fails = true;
    Box::new(strategy)
}

pub fn panicky_factory() -> Box<dyn LearningStrategy> {
    Box::new(PanickyFactory)
}

pub fn panicky_metadata() -> Box<dyn LearningStrategy> {
    Box::new(PanickyMetadata)
}

pub fn panicking_constructor() -> Box<dyn LearningStrategy> {
    panic!("constructor exploded")
}

fn register_seq(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    registrar.register("org.example.Sequential", sequential);
}

fn register_rival(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    registrar.register("org.rival.Sequential", sequential_rival);
}

fn register_random(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    registrar.register("org.example.Random", random);
}

fn register_helper_a(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    registrar.register("shared.Helper", sequential);
    registrar.register("a.Alpha", alpha);
}

fn register_helper_b(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    registrar.register("shared.Helper", random);
    registrar.register("b.Beta", beta);
}

fn register_faulty(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    registrar.register("org.faulty.Exploding", panicking_constructor);
    registrar.register("org.faulty.BlankKey", blank_key);
    registrar.register("org.faulty.BlankVersion", blank_version);
    registrar.register("org.faulty.Invalid", self_invalid);
    registrar.register("org.faulty.PanickyMetadata", panicky_metadata);
}

fn register_factories(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    registrar.register("org.factory.Failing", failing_factory);
    registrar.register("org.factory.Panicky", panicky_factory);
}

fn register_panicking(_registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    panic!("registration exploded")
}

/// Linker resolving every strategy unit used by the tests
/// 
/// `helper_a` and `helper_b` both provide `shared.Helper`, so they can only be
/// linked together if packages are isolated from each other.
pub fn strategy_linker() -> InProcessLinker<LearningStrategies> {
    InProcessLinker::new()
        .with_unit("seq", UnitDeclaration::new(register_seq))
        .with_unit("rival", UnitDeclaration::new(register_rival))
        .with_unit("random", UnitDeclaration::new(register_random))
        .with_unit("helper_a", UnitDeclaration::new(register_helper_a))
        .with_unit("helper_b", UnitDeclaration::new(register_helper_b))
        .with_unit("faulty", UnitDeclaration::new(register_faulty))
        .with_unit("factories", UnitDeclaration::new(register_factories))
        .with_unit("panicking", UnitDeclaration::new(register_panicking))
        .with_unit("outdated", UnitDeclaration::with_api_version(20000101, register_seq))
}

pub fn shared_strategy_linker() -> Arc<InProcessLinker<LearningStrategies>> {
    Arc::new(strategy_linker())
}

/// Multiple-choice question module
pub struct MultipleChoice;

impl Plugin for MultipleChoice {
    fn key(&self) -> String {
        "multiple-choice".to_string()
    }

    fn display_name(&self) -> String {
        "Multiple Choice".to_string()
    }

    fn version(&self) -> String {
        "2.1.0".to_string()
    }
}

impl QuestionModule for MultipleChoice {
    fn create_handler(&self, content: &QuestionContent) -> PluginResult<Box<dyn QuestionHandler>> {
        let prompt = content.body.get("prompt").and_then(|v| v.as_str());
        let answer = content.body.get("answer").and_then(|v| v.as_str());
        match (prompt, answer) {
            (Some(prompt), Some(answer)) => Ok(Box::new(MultipleChoiceHandler {
                prompt: prompt.to_string(),
                answer: answer.to_string(),
            })),
            _ => Err(PluginError::execution_failed("multiple-choice content needs prompt and answer")),
        }
    }
}

pub struct MultipleChoiceHandler {
    prompt: String,
    answer: String,
}

impl QuestionHandler for MultipleChoiceHandler {
    fn question_type(&self) -> &str {
        "multiple-choice"
    }

    fn prompt(&self) -> String {
        self.prompt.clone()
    }

    fn evaluate(&self, answer: &str) -> AnswerEvaluation {
        let correct = answer.trim().eq_ignore_ascii_case(&self.answer);
        AnswerEvaluation {
            correct,
            feedback: (!correct).then(|| format!("The answer was {}", self.answer)),
        }
    }
}

pub fn multiple_choice() -> Box<dyn QuestionModule> {
    Box::new(MultipleChoice)
}

fn register_multiple_choice(registrar: &mut UnitRegistrar<dyn QuestionModule>) {
    registrar.register("org.example.MultipleChoice", multiple_choice);
}

pub fn question_linker() -> Arc<InProcessLinker<QuestionModules>> {
    Arc::new(InProcessLinker::new().with_unit("choice", UnitDeclaration::new(register_multiple_choice)))
}

thread_local! {
    static DROP_LOG: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

fn record_drop(event: String) {
    DROP_LOG.with(|log| log.borrow_mut().push(event));
}

/// Drain the drops recorded on this thread, oldest first
pub fn take_drop_log() -> Vec<String> {
    DROP_LOG.with(|log| log.borrow_mut().drain(..).collect())
}

/// Stands in for a loaded library; logs when the last reference goes
pub struct TrackedUnit {
    stem: String,
}

impl Drop for TrackedUnit {
    fn drop(&mut self) {
        record_drop(format!("unit {} unloaded", self.stem));
    }
}

pub fn tracked_handle(stem: &str) -> UnitHandle {
    Arc::new(TrackedUnit { stem: stem.to_string() })
}

/// Strategy under key "tracked" that logs its own drop and its sessions' drops
pub struct TrackedStrategy {
    label: &'static str,
}

impl Drop for TrackedStrategy {
    fn drop(&mut self) {
        record_drop(format!("plugin {} dropped", self.label));
    }
}

impl Plugin for TrackedStrategy {
    fn key(&self) -> String {
        "tracked".to_string()
    }

    fn display_name(&self) -> String {
        format!("Tracked ({})", self.label)
    }

    fn version(&self) -> String {
        "1.0.0".to_string()
    }
}

impl LearningStrategy for TrackedStrategy {
    fn create_strategy(&self, items: Vec<LearningItem>) -> PluginResult<Box<dyn Strategy>> {
        Ok(Box::new(TrackedSession {
            label: self.label,
            inner: SequentialStrategy::new(items),
        }))
    }
}

pub struct TrackedSession {
    label: &'static str,
    inner: SequentialStrategy,
}

impl Drop for TrackedSession {
    fn drop(&mut self) {
        record_drop(format!("session {} dropped", self.label));
    }
}

impl Strategy for TrackedSession {
    fn next_item(&mut self) -> Option<LearningItem> {
        self.inner.next_item()
    }

    fn record_answer(&mut self, item_id: &str, correct: bool) {
        self.inner.record_answer(item_id, correct)
    }

    fn is_complete(&self) -> bool {
        self.inner.is_complete()
    }
}

pub fn tracked_first() -> Box<dyn LearningStrategy> {
    Box::new(TrackedStrategy { label: "first" })
}

pub fn tracked_second() -> Box<dyn LearningStrategy> {
    Box::new(TrackedStrategy { label: "second" })
}

fn register_tracked_first(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    registrar.register("org.tracked.First", tracked_first);
}

fn register_tracked_second(registrar: &mut UnitRegistrar<dyn LearningStrategy>) {
    registrar.register("org.tracked.Second", tracked_second);
}

/// Links like a native linker: every unit gets its own handle
pub struct TrackingLinker {
    inner: InProcessLinker<LearningStrategies>,
}

impl Linker<LearningStrategies> for TrackingLinker {
    fn link(&self, unit: &UnitSource<'_>, scratch: &Path) -> PluginResult<LinkedUnit<dyn LearningStrategy>> {
        let linked = self.inner.link(unit, scratch)?;
        Ok(LinkedUnit {
            declaration: linked.declaration,
            handle: Some(tracked_handle(unit.stem())),
        })
    }
}

/// Units `tracked_first` and `tracked_second`, both providing key "tracked"
pub fn tracking_strategy_linker() -> Arc<TrackingLinker> {
    Arc::new(TrackingLinker {
        inner: InProcessLinker::new()
            .with_unit("tracked_first", UnitDeclaration::new(register_tracked_first))
            .with_unit("tracked_second", UnitDeclaration::new(register_tracked_second)),
    })
}

/// Write a package for family `F` declaring `implementations`, with one unit per stem
pub fn write_package<F: CapabilityFamily>(
    dir: &Path,
    file_name: &str,
    implementations: &[&str],
    units: &[&str],
) -> PathBuf {
    let mut builder = PackageBuilder::for_family::<F>();
    for implementation in implementations {
        builder = builder.implementation(*implementation);
    }
    for unit in units {
        builder = builder.unit(format!("{}.so", unit), format!("unit {}", unit).into_bytes());
    }
    let path = dir.join(file_name);
    builder.write_to(&path).unwrap();
    path
}

pub fn write_strategy_package(dir: &Path, file_name: &str, implementations: &[&str], units: &[&str]) -> PathBuf {
    write_package::<LearningStrategies>(dir, file_name, implementations, units)
}

pub fn items(ids: &[&str]) -> Vec<LearningItem> {
    ids.iter().map(|id| LearningItem::new(*id, "multiple-choice")).collect()
}
