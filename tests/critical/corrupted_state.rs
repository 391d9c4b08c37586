//! P0: corrupt or unexpected checkpoint files.
//! A damaged checkpoint must stop startup instead of silently restarting from zero.

use history_core::{ProgressError, ProgressStore};
use tempfile::TempDir;

fn load_raw(raw: &str) -> Result<ProgressStore, ProgressError> {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("progress.json");
    std::fs::write(&path, raw).expect("write progress");
    ProgressStore::load(path, ["demo"])
}

#[test]
fn p0_truncated_json_is_reported_as_corrupt() {
    let err = load_raw(r#"{ "demo": 3"#).unwrap_err();
    assert!(matches!(err, ProgressError::Corrupt { .. }), "{err}");
    assert!(err.to_string().contains("invalid JSON"));
}

#[test]
fn p0_non_object_root_is_corrupt() {
    let err = load_raw("[1, 2, 3]").unwrap_err();
    assert!(err.to_string().contains("expected a JSON object"));
}

#[test]
fn p0_non_integer_index_is_corrupt() {
    for raw in [r#"{ "demo": "3" }"#, r#"{ "demo": 2.5 }"#, r#"{ "demo": null }"#] {
        let err = load_raw(raw).unwrap_err();
        assert!(matches!(err, ProgressError::Corrupt { .. }), "{raw}: {err}");
    }
}

#[test]
fn p0_index_below_sentinel_is_corrupt() {
    let err = load_raw(r#"{ "demo": -2 }"#).unwrap_err();
    assert!(err.to_string().contains("below -1"));
}

#[test]
fn p0_index_without_successor_is_corrupt() {
    let err = load_raw(&format!(r#"{{ "demo": {} }}"#, i64::MAX)).unwrap_err();
    assert!(matches!(err, ProgressError::Corrupt { .. }), "{err}");
    assert!(err.to_string().contains("not a usable version index"));
}

#[test]
fn p0_corrupt_file_is_left_untouched() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("progress.json");
    std::fs::write(&path, "garbage").expect("write progress");

    assert!(ProgressStore::load(path.clone(), ["demo"]).is_err());
    assert_eq!(std::fs::read_to_string(&path).expect("read"), "garbage");
}

#[test]
fn p0_projects_missing_from_file_start_from_scratch() {
    let store = load_raw(r#"{ "other": 7 }"#).expect("load");
    assert_eq!(store.last_completed("demo"), -1);
    assert_eq!(store.record().resume_index("demo"), 0);
    assert_eq!(store.last_completed("other"), 7);
}

#[test]
fn p0_empty_object_is_valid() {
    let store = load_raw("{}").expect("load");
    assert_eq!(store.last_completed("demo"), -1);
}
