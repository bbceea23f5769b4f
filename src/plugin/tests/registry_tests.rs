//! Tests for Plugin Registry
//! 
//! Metadata validation, key uniqueness and the frozen query surface.

use std::path::PathBuf;
use std::sync::Arc;
use proptest::prelude::*;
use crate::plugin::error::PluginError;
use crate::plugin::families::{LearningStrategies, LearningStrategy};
use crate::plugin::linker::Resident;
use crate::plugin::loader::RawInstance;
use crate::plugin::registry::{FailureStage, LoadOutcome, PluginRegistry, RegistryBuilder};
use crate::plugin::tests::support::*;
use crate::plugin::traits::Plugin;

fn raw(constructor: fn() -> Box<dyn LearningStrategy>, implementation: &str, package: &str) -> RawInstance<LearningStrategies> {
    RawInstance {
        instance: Resident::new(constructor(), None),
        implementation: implementation.to_string(),
        package: PathBuf::from(package),
    }
}

#[test]
fn test_accept_valid_instance() {
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    assert!(builder.accept(raw(sequential, "org.example.Sequential", "seq.pkg")));
    assert!(builder.contains_key("seq"));
    
    let registry = builder.finish();
    assert_eq!(registry.count(), 1);
    let plugin = registry.find_by_key("seq").unwrap().unwrap();
    assert_eq!(plugin.display_name(), "Sequential");
    assert_eq!(plugin.version(), "1.0.0");
    assert_eq!(plugin.implementation(), "org.example.Sequential");
    assert_eq!(plugin.package(), PathBuf::from("seq.pkg").as_path());
    assert_eq!(registry.outcome().instances_accepted, 1);
}

#[test]
fn test_first_accepted_key_wins() {
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    assert!(builder.accept(raw(sequential, "org.example.Sequential", "a.pkg")));
    assert!(!builder.accept(raw(sequential_rival, "org.rival.Sequential", "b.pkg")));
    
    let registry = builder.finish();
    assert_eq!(registry.count(), 1);
    assert_eq!(registry.find_by_key("seq").unwrap().unwrap().display_name(), "Sequential");
    
    let outcome = registry.outcome();
    assert_eq!(outcome.instances_rejected, 1);
    let duplicate = outcome.failures_at(FailureStage::DuplicateKey).next().unwrap();
    assert_eq!(duplicate.implementation.as_deref(), Some("org.rival.Sequential"));
    assert!(duplicate.reason.contains("org.example.Sequential"));
    assert!(duplicate.reason.contains("a.pkg"));
}

#[test]
fn test_blank_metadata_is_rejected() {
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    assert!(!builder.accept(raw(blank_key, "org.faulty.BlankKey", "f.pkg")));
    assert!(!builder.accept(raw(blank_version, "org.faulty.BlankVersion", "f.pkg")));
    
    let registry = builder.finish();
    assert!(registry.is_empty());
    let reasons: Vec<&str> = registry
        .outcome()
        .failures_at(FailureStage::Metadata)
        .map(|failure| failure.reason.as_str())
        .collect();
    assert_eq!(reasons, vec!["key is blank", "version is blank"]);
}

#[test]
fn test_panicking_metadata_is_rejected() {
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    assert!(!builder.accept(raw(panicky_metadata, "org.faulty.PanickyMetadata", "f.pkg")));
    
    let registry = builder.finish();
    let failure = &registry.outcome().failures[0];
    assert_eq!(failure.stage, FailureStage::Metadata);
    assert_eq!(failure.reason, "key accessor panicked");
}

#[test]
fn test_self_invalid_plugin_is_rejected() {
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    assert!(!builder.accept(raw(self_invalid, "org.faulty.Invalid", "f.pkg")));
    assert!(!builder.contains_key("invalid"));
    
    let registry = builder.finish();
    assert!(registry.outcome().failures[0].reason.contains("reports itself invalid"));
}

#[test]
fn test_rejected_instance_does_not_claim_key() {
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    assert!(!builder.accept(raw(self_invalid, "org.faulty.Invalid", "a.pkg")));
    // A valid plugin under a different key is unaffected by the earlier rejection.
    assert!(builder.accept(raw(random, "org.example.Random", "b.pkg")));
    assert_eq!(builder.finish().keys(), vec!["random"]);
}

#[test]
fn test_rejected_duplicate_is_dropped_before_its_unit() {
    take_drop_log();
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    assert!(builder.accept(raw(tracked_first, "org.tracked.First", "a.pkg")));
    
    let duplicate = RawInstance {
        instance: Resident::new(tracked_second(), Some(tracked_handle("tracked_second"))),
        implementation: "org.tracked.Second".to_string(),
        package: PathBuf::from("b.pkg"),
    };
    assert!(!builder.accept(duplicate));
    assert_eq!(take_drop_log(), vec!["plugin second dropped", "unit tracked_second unloaded"]);
}

#[test]
fn test_blank_lookup_key_is_invalid_argument() {
    let registry = PluginRegistry::<LearningStrategies>::empty();
    assert!(matches!(registry.find_by_key(""), Err(PluginError::InvalidArgument { .. })));
    assert!(matches!(registry.find_by_key("   "), Err(PluginError::InvalidArgument { .. })));
    assert!(registry.find_by_key("seq").unwrap().is_none());
}

#[test]
fn test_lookup_is_idempotent() {
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    builder.accept(raw(sequential, "org.example.Sequential", "seq.pkg"));
    let registry = builder.finish();
    
    let first = registry.find_by_key("seq").unwrap().unwrap();
    let second = registry.find_by_key("seq").unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &registry.all()[0]));
}

#[test]
fn test_all_preserves_acceptance_order() {
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    builder.accept(raw(random, "org.example.Random", "r.pkg"));
    builder.accept(raw(alpha, "a.Alpha", "a.pkg"));
    builder.accept(raw(sequential, "org.example.Sequential", "s.pkg"));
    
    let registry = builder.finish();
    assert_eq!(registry.keys(), vec!["random", "alpha", "seq"]);
}

#[test]
fn test_diagnostic_dump_lists_every_plugin() {
    let mut builder = RegistryBuilder::<LearningStrategies>::new();
    builder.accept(raw(sequential, "org.example.Sequential", "seq.pkg"));
    builder.accept(raw(random, "org.example.Random", "random.pkg"));
    
    let dump = builder.finish().diagnostic_dump();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0], "learning-strategy plugins: 2");
    assert_eq!(lines[1], "  seq | Sequential | 1.0.0 | org.example.Sequential | seq.pkg");
    assert_eq!(lines[2], "  random | Random | 1.0.0 | org.example.Random | random.pkg");
}

#[test]
fn test_empty_registry_dump() {
    let dump = PluginRegistry::<LearningStrategies>::empty().diagnostic_dump();
    assert_eq!(dump, "learning-strategy plugins: 0\n");
}

#[test]
fn test_outcome_counters_and_summary() {
    let mut outcome = LoadOutcome::default();
    outcome.packages_scanned = 3;
    outcome.reject_package(&PathBuf::from("/plugins/bad.pkg"), FailureStage::Validation, "missing descriptor");
    outcome.reject_instance(&PathBuf::from("/plugins/ok.pkg"), "a.B", FailureStage::Instantiation, "boom");
    
    assert_eq!(outcome.packages_rejected, 1);
    assert_eq!(outcome.instances_rejected, 1);
    assert!(outcome.mentions_package("bad.pkg"));
    assert!(!outcome.mentions_package("other.pkg"));
    assert_eq!(
        outcome.summary(),
        "Packages: 3 scanned, 1 rejected | Plugins: 0 accepted, 1 rejected"
    );
    assert_eq!(
        outcome.failures[0].to_string(),
        "[validation] /plugins/bad.pkg: missing descriptor"
    );
    assert_eq!(
        outcome.failures[1].to_string(),
        "[instantiation] /plugins/ok.pkg (a.B): boom"
    );
}

#[test]
fn test_outcome_serializes_stage_in_kebab_case() {
    let mut outcome = LoadOutcome::default();
    outcome.reject_instance(&PathBuf::from("x.pkg"), "a.B", FailureStage::DuplicateKey, "taken");
    
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["failures"][0]["stage"], "duplicate-key");
    assert_eq!(json["failures"][0]["implementation"], "a.B");
}

const CONSTRUCTORS: [fn() -> Box<dyn LearningStrategy>; 5] = [sequential, sequential_rival, random, alpha, beta];

proptest! {
    #[test]
    fn prop_registry_keys_are_unique(picks in proptest::collection::vec(0usize..CONSTRUCTORS.len(), 0..20)) {
        let mut builder = RegistryBuilder::<LearningStrategies>::new();
        for (position, pick) in picks.iter().enumerate() {
            builder.accept(raw(CONSTRUCTORS[*pick], &format!("impl.N{}", position), "p.pkg"));
        }
        let registry = builder.finish();
        
        let mut keys = registry.keys();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), total);
        
        let outcome = registry.outcome();
        prop_assert_eq!(outcome.instances_accepted + outcome.instances_rejected, picks.len());
        
        // The first pick of each key is the one that was kept.
        for plugin in registry.all() {
            let first = picks
                .iter()
                .position(|pick| CONSTRUCTORS[*pick]().key() == plugin.key())
                .unwrap();
            prop_assert_eq!(plugin.implementation(), format!("impl.N{}", first));
        }
    }
}
