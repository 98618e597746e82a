//! Property-based tests for chronicle
//!
//! These tests verify invariants that must hold for all inputs:
//! - An empty rule set never ignores anything
//! - `*.tmp` files are ignored at any depth
//! - The ledger keeps one record per path holding the latest content
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// IGNORE RULE TESTS
// ============================================================================

mod ignore_tests {
    use super::*;
    use chronicle::watch::{is_ignored, IgnoreRule, IgnoreRuleSet};

    fn relative_path() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-zA-Z0-9_.-]{1,12}", 1..5).prop_map(|parts| parts.join("/"))
    }

    proptest! {
        /// Invariant: with no rules, nothing is ignored
        #[test]
        fn empty_rules_ignore_nothing(path in relative_path()) {
            prop_assert!(!is_ignored(&path, &IgnoreRuleSet::empty()));
        }

        /// Invariant: `*.tmp` matches a .tmp file wherever it lives
        #[test]
        fn tmp_files_always_ignored(
            dirs in prop::collection::vec("[a-z0-9_]{1,8}", 0..4),
            stem in "[a-z0-9_]{1,8}",
        ) {
            let rules = IgnoreRuleSet::from_patterns(["*.tmp"]);
            let mut parts = dirs;
            parts.push(format!("{}.tmp", stem));
            prop_assert!(is_ignored(&parts.join("/"), &rules));
        }

        /// Invariant: `*.tmp` never matches files with another extension
        #[test]
        fn other_extensions_not_ignored(path in "[a-z0-9_/]{0,20}[a-z0-9_]\\.(rs|md|txt)") {
            let rules = IgnoreRuleSet::from_patterns(["*.tmp"]);
            prop_assert!(!is_ignored(&path, &rules));
        }

        /// Invariant: parsing arbitrary lines never panics
        #[test]
        fn parse_never_panics(line in "\\PC{0,40}") {
            let _ = IgnoreRule::parse(&line);
        }

        /// Invariant: comment and blank lines never become rules
        #[test]
        fn comments_are_skipped(text in "[ a-z*]{0,20}") {
            let comment = format!("#{}", text);
            prop_assert!(IgnoreRule::parse(&comment).is_none());
            prop_assert!(IgnoreRule::parse("   ").is_none());
        }
    }
}

// ============================================================================
// LEDGER TESTS
// ============================================================================

mod ledger_tests {
    use super::*;
    use chronicle::types::{ChangeRecord, PendingContent};
    use chronicle::watch::ChangeLedger;
    use std::collections::HashMap;

    proptest! {
        /// Invariant: after any sequence of edits, one entry per path with the last content
        #[test]
        fn last_write_wins(edits in prop::collection::vec(("[a-c]", "[a-z]{0,6}"), 1..50)) {
            let ledger = ChangeLedger::new();
            let mut expected: HashMap<String, String> = HashMap::new();

            for (path, content) in &edits {
                ledger.record(ChangeRecord::new(path.clone(), content.clone()));
                expected.insert(path.clone(), content.clone());
            }

            prop_assert_eq!(ledger.len(), expected.len());
            for (path, content) in &expected {
                prop_assert_eq!(ledger.get(path), Some(PendingContent::from(content.clone())));
            }
        }

        /// Invariant: a drain returns every pending path exactly once and empties the ledger
        #[test]
        fn drain_is_complete(paths in prop::collection::hash_set("[a-z]{1,8}", 1..20)) {
            let ledger = ChangeLedger::new();
            for path in &paths {
                ledger.record(ChangeRecord::new(path.clone(), "x"));
            }

            let snapshot = ledger.drain().unwrap();
            prop_assert_eq!(snapshot.len(), paths.len());
            prop_assert!(ledger.is_empty());
            prop_assert!(snapshot
                .records
                .windows(2)
                .all(|w| w[0].relative_path < w[1].relative_path));
        }
    }
}
