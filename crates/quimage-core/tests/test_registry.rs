//! Integration tests for [`quimage_core::registry`].
//!
//! Every test builds its own scheme tree in a temporary directory, so the
//! tests are independent of the shipped `schemes/` tree.

mod common;

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{SchemeTree, FRQI_ENTRIES};
use quimage_core::{
    ApprovalPolicy, CodecError, CustomBundle, FilePolicy, PolicyError, SchemeOrigin,
    SchemeRegistry, StaticPolicy,
};

/// Approves everything and counts how often it was asked.
#[derive(Default)]
struct CountingPolicy {
    calls: AtomicUsize,
}

impl ApprovalPolicy for CountingPolicy {
    fn approved(&self, _: &str) -> Result<bool, PolicyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

struct BrokenPolicy;

impl ApprovalPolicy for BrokenPolicy {
    fn approved(&self, _: &str) -> Result<bool, PolicyError> {
        Err(PolicyError::Unavailable("store offline".into()))
    }
}

struct StalledPolicy;

impl ApprovalPolicy for StalledPolicy {
    fn approved(&self, _: &str) -> Result<bool, PolicyError> {
        thread::sleep(Duration::from_secs(2));
        Ok(true)
    }
}

fn registry(tree: &SchemeTree, approved: &[&str]) -> SchemeRegistry {
    SchemeRegistry::new(
        tree.config(),
        Arc::new(StaticPolicy::new(approved.iter().copied())),
    )
    .expect("registry")
}

// ---------------------------------------------------------------------------
// Path confinement
// ---------------------------------------------------------------------------

/// Traversal-shaped names fail lexically, before the policy is consulted.
#[test]
fn traversal_names_are_path_escapes() {
    let tree = SchemeTree::new();
    tree.outside_scheme("evil", FRQI_ENTRIES);
    let policy = Arc::new(CountingPolicy::default());
    let reg = SchemeRegistry::new(tree.config(), policy.clone()).unwrap();

    let absolute = tree.outside().join("evil");
    for name in [
        "../outside",
        "../outside/evil",
        "..",
        "nested/../../outside",
        "/etc/passwd",
        absolute.to_str().unwrap(),
        "~/schemes",
    ] {
        let err = reg.resolve(name).unwrap_err();
        assert!(
            matches!(err, CodecError::PathEscape { .. }),
            "{name:?} gave {err}"
        );
        assert!(err.is_security());
    }
    assert_eq!(policy.calls.load(Ordering::SeqCst), 0);
}

/// A scheme directory symlinked to a location outside the root is refused
/// even when the name is approved.
#[cfg(unix)]
#[test]
fn symlinked_scheme_dir_is_path_escape() {
    let tree = SchemeTree::new();
    let target = tree.outside_scheme("evil", FRQI_ENTRIES);
    std::os::unix::fs::symlink(&target, tree.root().join("evil")).unwrap();

    let reg = registry(&tree, &["evil"]);
    let err = reg.resolve("evil").unwrap_err();
    assert!(matches!(err, CodecError::PathEscape { .. }), "{err}");
}

/// An entry file symlinked outside the root is refused at load time.
#[cfg(unix)]
#[test]
fn symlinked_entry_is_path_escape() {
    let tree = SchemeTree::new();
    let outside = tree.outside_scheme("payload", FRQI_ENTRIES);
    tree.scheme("sneaky", &FRQI_ENTRIES[..2]);
    std::os::unix::fs::symlink(outside.join("map.json"), tree.root().join("sneaky/map.json"))
        .unwrap();

    let reg = registry(&tree, &["sneaky"]);
    let err = reg.get("sneaky").unwrap_err();
    assert!(matches!(err, CodecError::PathEscape { .. }), "{err}");
}

/// Symlinks that stay inside the root are followed.
#[cfg(unix)]
#[test]
fn internal_symlink_is_allowed() {
    let tree = SchemeTree::new();
    tree.frqi_like("frqi");
    std::os::unix::fs::symlink(tree.root().join("frqi"), tree.root().join("alias")).unwrap();

    let reg = registry(&tree, &["alias"]);
    assert_eq!(reg.get("alias").unwrap().name(), "alias");
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

/// Unapproved names fail with `NotApproved` whether or not they exist.
#[test]
fn unapproved_names_are_rejected_regardless_of_disk() {
    let tree = SchemeTree::new();
    tree.frqi_like("frqi");
    let reg = registry(&tree, &[]);

    for name in ["frqi", "ghost"] {
        let err = reg.resolve(name).unwrap_err();
        assert!(matches!(err, CodecError::NotApproved { .. }), "{name}: {err}");
    }
}

#[test]
fn approved_but_missing_is_not_found() {
    let tree = SchemeTree::new();
    fs::write(tree.root().join("plainfile"), "{}").unwrap();
    let reg = registry(&tree, &["ghost", "plainfile"]);

    for name in ["ghost", "plainfile"] {
        let err = reg.resolve(name).unwrap_err();
        assert!(matches!(err, CodecError::SchemeNotFound { .. }), "{name}: {err}");
    }
}

/// A failing store falls back to the configured allow-list.
#[test]
fn broken_policy_uses_allow_list() {
    let tree = SchemeTree::new();
    tree.frqi_like("frqi").frqi_like("mfrqi");
    let mut config = tree.config();
    config.default_allow_list = Some(vec!["frqi".into()]);
    let reg = SchemeRegistry::new(config, Arc::new(BrokenPolicy)).unwrap();

    assert!(reg.resolve("frqi").is_ok());
    assert!(matches!(
        reg.resolve("mfrqi"),
        Err(CodecError::NotApproved { .. })
    ));
}

/// A stalled store is abandoned after the timeout and fails closed.
#[test]
fn stalled_policy_fails_closed() {
    let tree = SchemeTree::new();
    tree.frqi_like("frqi");
    let mut config = tree.config();
    config.policy_timeout_ms = 50;
    let reg = SchemeRegistry::new(config, Arc::new(StalledPolicy)).unwrap();

    assert!(matches!(
        reg.resolve("frqi"),
        Err(CodecError::NotApproved { .. })
    ));
}

#[test]
fn file_policy_is_reread() {
    let tree = SchemeTree::new();
    tree.frqi_like("frqi");
    let policy_path = tree.outside().join("approvals.json");
    fs::write(&policy_path, r#"{"frqi": false}"#).unwrap();
    let reg = SchemeRegistry::new(tree.config(), Arc::new(FilePolicy::new(&policy_path))).unwrap();

    assert!(matches!(
        reg.resolve("frqi"),
        Err(CodecError::NotApproved { .. })
    ));
    fs::write(&policy_path, r#"{"frqi": true}"#).unwrap();
    assert!(reg.resolve("frqi").is_ok());
}

// ---------------------------------------------------------------------------
// Bundle contract
// ---------------------------------------------------------------------------

#[test]
fn malformed_bundles_are_contract_violations() {
    let tree = SchemeTree::new();
    tree.scheme("no_map", &FRQI_ENTRIES[..2])
        .scheme(
            "code",
            &[
                ("init", "import os; os.system('rm -rf /')"),
                ("data", r#"{"kernel": "row_major_basis"}"#),
                ("map", r#"{"kernel": "ry_angle"}"#),
            ],
        )
        .scheme(
            "unknown",
            &[
                ("init", r#"{"kernel": "zero"}"#),
                ("data", r#"{"kernel": "row_major_basis"}"#),
                ("map", r#"{"kernel": "eval"}"#),
            ],
        )
        .scheme(
            "mismatch",
            &[
                ("init", r#"{"kernel": "zero"}"#),
                ("data", r#"{"kernel": "row_major_basis"}"#),
                ("map", r#"{"kernel": "ry_angle"}"#),
                ("retrieve", r#"{"kernel": "binary"}"#),
            ],
        );
    let reg = registry(&tree, &["no_map", "code", "unknown", "mismatch"]);

    for name in ["no_map", "code", "unknown", "mismatch"] {
        let err = reg.get(name).unwrap_err();
        assert!(
            matches!(err, CodecError::SchemeContractViolation { .. }),
            "{name}: {err}"
        );
        assert!(!err.to_string().contains(tree.root().to_str().unwrap()));
    }
}

#[test]
fn oversized_entry_is_rejected() {
    let tree = SchemeTree::new();
    let padding = " ".repeat(4096);
    let map = format!(r#"{{"kernel": "ry_angle"{padding}}}"#);
    tree.scheme(
        "big",
        &[FRQI_ENTRIES[0], FRQI_ENTRIES[1], ("map", map.as_str())],
    );
    let mut config = tree.config();
    config.max_entry_bytes = 1024;
    let reg = SchemeRegistry::new(config, Arc::new(StaticPolicy::new(["big"]))).unwrap();

    let err = reg.get("big").unwrap_err();
    assert!(err.to_string().contains("exceeds"), "{err}");
}

#[test]
fn retrieve_entry_is_optional() {
    let tree = SchemeTree::new();
    tree.scheme("encode_only", &FRQI_ENTRIES[..3]);
    let reg = registry(&tree, &["encode_only"]);
    let scheme = reg.get("encode_only").unwrap();
    assert!(scheme.retrieve().is_none());
    assert_eq!(scheme.origin(), SchemeOrigin::Registered);
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[test]
fn loads_are_cached_until_reload() {
    let tree = SchemeTree::new();
    tree.frqi_like("frqi");
    let reg = registry(&tree, &["frqi"]);

    assert!(!reg.is_cached("frqi"));
    let first = reg.get("frqi").unwrap();
    let second = reg.get("frqi").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(reg.is_cached("frqi"));

    tree.scheme(
        "frqi",
        &[("map", r#"{"kernel": "ry_segmented"}"#), ("retrieve", r#"{"kernel": "angle", "params": {"payload_qubits": 2}}"#), ("init", r#"{"kernel": "uniform_positions", "params": {"payload_qubits": 2}}"#)],
    );
    assert_eq!(reg.get("frqi").unwrap().map().payload_qubits(), 1);

    let reloaded = reg.reload("frqi").unwrap();
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert_eq!(reloaded.map().payload_qubits(), 2);
    assert_eq!(first.map().payload_qubits(), 1);
    assert!(Arc::ptr_eq(&reloaded, &reg.get("frqi").unwrap()));
}

#[test]
fn failed_loads_are_not_cached() {
    let tree = SchemeTree::new();
    tree.scheme("late", &FRQI_ENTRIES[..2]);
    let reg = registry(&tree, &["late"]);

    assert!(reg.get("late").is_err());
    assert!(!reg.is_cached("late"));
    tree.scheme("late", &FRQI_ENTRIES[2..]);
    assert!(reg.get("late").is_ok());
}

/// Concurrent first loads of one name all observe the same scheme.
#[test]
fn concurrent_first_loads_share_one_scheme() {
    let tree = SchemeTree::new();
    tree.frqi_like("frqi");
    let reg = registry(&tree, &["frqi"]);

    let loaded: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| reg.get("frqi").unwrap())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for scheme in &loaded[1..] {
        assert!(Arc::ptr_eq(&loaded[0], scheme));
    }
}

// ---------------------------------------------------------------------------
// Custom bundles
// ---------------------------------------------------------------------------

fn custom_tree() -> SchemeTree {
    let tree = SchemeTree::new();
    tree.scheme("parts", FRQI_ENTRIES);
    tree
}

#[test]
fn custom_bundles_disabled_by_default() {
    let tree = custom_tree();
    let reg = registry(&tree, &[]);
    let bundle = CustomBundle::new("parts/init.json", "parts/data.json", "parts/map.json");
    assert!(matches!(
        reg.resolve_custom(&bundle),
        Err(CodecError::NotApproved { .. })
    ));
}

#[test]
fn custom_bundle_loads_fresh_each_time() {
    let tree = custom_tree();
    let mut config = tree.config();
    config.allow_custom_bundles = true;
    let reg = SchemeRegistry::new(config, Arc::new(StaticPolicy::default())).unwrap();

    let bundle = CustomBundle::new("parts/init.json", "parts/data.json", "parts/map.json")
        .with_retrieve("parts/retrieve.json");
    let handle = reg.resolve_custom(&bundle).unwrap();
    assert_eq!(handle.origin(), SchemeOrigin::Custom);

    let a = reg.load(&handle).unwrap();
    let b = reg.load(&handle).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(a.retrieve().is_some());
    assert_eq!(a.name(), "custom");
    assert!(!reg.is_cached("custom"));
}

#[test]
fn custom_bundle_paths_are_confined() {
    let tree = custom_tree();
    tree.outside_scheme("evil", FRQI_ENTRIES);
    let mut config = tree.config();
    config.allow_custom_bundles = true;
    let reg = SchemeRegistry::new(config, Arc::new(StaticPolicy::default())).unwrap();

    let escaping = tree.outside().join("evil/map.json");
    for map in ["../outside/evil/map.json", escaping.to_str().unwrap()] {
        let bundle = CustomBundle::new("parts/init.json", "parts/data.json", map);
        let err = reg.resolve_custom(&bundle).unwrap_err();
        assert!(matches!(err, CodecError::PathEscape { .. }), "{map}: {err}");
    }

    let missing = CustomBundle::new("parts/init.json", "parts/data.json", "parts/nope.json");
    assert!(matches!(
        reg.resolve_custom(&missing),
        Err(CodecError::SchemeNotFound { .. })
    ));
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[test]
fn list_reports_scheme_directories() {
    let tree = SchemeTree::new();
    tree.frqi_like("frqi").frqi_like("neqr").frqi_like("has space");
    fs::write(tree.root().join("notes.txt"), "not a scheme").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink(tree.outside(), tree.root().join("escape")).unwrap();

    let reg = registry(&tree, &["neqr"]);
    let listed: Vec<_> = reg.list().unwrap().into_iter().collect();
    assert_eq!(listed, vec!["frqi", "neqr"]);

    let approved: Vec<_> = reg.list_approved().unwrap().into_iter().collect();
    assert_eq!(approved, vec!["neqr"]);
}
