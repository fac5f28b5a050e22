//! Versioned schema migration chain.
//!
//! Records are migrated as raw JSON so every historical shape can be read
//! without keeping old Rust types around. Each step is keyed by its source
//! version and must produce exactly `source + 1`. A record with no version tag
//! is the oldest shape (v0), which kept every setting flat at the top level.
//!
//! Only `settings`, `bookmarks` and `version` are touched; other top-level keys
//! such as `lastUpdate` pass through unchanged.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::settings::{DEFAULT_LANGUAGE, DEFAULT_PRIMARY_COLOR, DEFAULT_SEARCH_ENGINE};

pub const CURRENT_VERSION: u32 = 4;

/// Fields every current-version `settings` object must carry.
pub const REQUIRED_SETTINGS_FIELDS: &[&str] = &[
    "primaryColor",
    "theme",
    "background",
    "clock",
    "showBookmarks",
    "searchEngine",
    "language",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("invalid version tag: {0}")]
    InvalidVersion(String),
    #[error("stored version {stored} is newer than supported version {supported}")]
    FromTheFuture { stored: u32, supported: u32 },
    #[error("no migration step registered for version {0}")]
    MissingStep(u32),
    #[error("migration step from v{from} produced v{produced}")]
    SkippedStep { from: u32, produced: u32 },
    #[error("unrecognised v{version} record: {detail}")]
    Unrecognised { version: u32, detail: String },
}

type Record = Map<String, Value>;
type Step = fn(Record) -> Result<Record, MigrationError>;

const STEPS: &[(u32, Step)] = &[
    (0, v0_to_v1),
    (1, v1_to_v2),
    (2, v2_to_v3),
    (3, v3_to_v4),
];

/// Version tag of a stored record; a missing tag means v0.
pub fn stored_version(record: &Value) -> Result<u32, MigrationError> {
    let map = record.as_object().ok_or(MigrationError::NotAnObject)?;
    version_tag(map)
}

fn version_tag(map: &Record) -> Result<u32, MigrationError> {
    match map.get("version") {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| MigrationError::InvalidVersion(n.to_string())),
        Some(other) => Err(MigrationError::InvalidVersion(other.to_string())),
    }
}

/// Migrates `record` from whatever version it is tagged with to [`CURRENT_VERSION`].
pub fn migrate(record: Value) -> Result<Value, MigrationError> {
    let from = stored_version(&record)?;
    migrate_from(record, from)
}

/// Applies every step from `from` up to [`CURRENT_VERSION`], in order.
pub fn migrate_from(record: Value, from: u32) -> Result<Value, MigrationError> {
    if from > CURRENT_VERSION {
        return Err(MigrationError::FromTheFuture {
            stored: from,
            supported: CURRENT_VERSION,
        });
    }
    let mut map = match record {
        Value::Object(map) => map,
        _ => return Err(MigrationError::NotAnObject),
    };
    let mut version = from;
    while version < CURRENT_VERSION {
        let step = STEPS
            .iter()
            .find(|(source, _)| *source == version)
            .map(|(_, step)| *step)
            .ok_or(MigrationError::MissingStep(version))?;
        map = step(map)?;
        let produced = version_tag(&map)?;
        if produced != version + 1 {
            return Err(MigrationError::SkippedStep {
                from: version,
                produced,
            });
        }
        version = produced;
    }
    validate_current(&map)?;
    Ok(Value::Object(map))
}

fn validate_current(map: &Record) -> Result<(), MigrationError> {
    let settings = map
        .get("settings")
        .and_then(Value::as_object)
        .ok_or_else(|| unrecognised(CURRENT_VERSION, "settings is not an object"))?;
    for field in REQUIRED_SETTINGS_FIELDS {
        if !settings.contains_key(*field) {
            return Err(unrecognised(
                CURRENT_VERSION,
                format!("settings.{field} missing"),
            ));
        }
    }
    if !map.get("bookmarks").is_some_and(Value::is_array) {
        return Err(unrecognised(CURRENT_VERSION, "bookmarks is not an array"));
    }
    Ok(())
}

fn unrecognised(version: u32, detail: impl Into<String>) -> MigrationError {
    MigrationError::Unrecognised {
        version,
        detail: detail.into(),
    }
}

fn take_string(map: &mut Record, key: &str, version: u32) -> Result<Option<String>, MigrationError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(unrecognised(version, format!("{key} is not a string"))),
    }
}

fn take_bool(map: &mut Record, key: &str, version: u32) -> Result<Option<bool>, MigrationError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(_) => Err(unrecognised(version, format!("{key} is not a bool"))),
    }
}

fn settings_mut(map: &mut Record, version: u32) -> Result<&mut Record, MigrationError> {
    map.get_mut("settings")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| unrecognised(version, "settings is not an object"))
}

fn bookmarks_mut(map: &mut Record, version: u32) -> Result<&mut Vec<Value>, MigrationError> {
    map.get_mut("bookmarks")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| unrecognised(version, "bookmarks is not an array"))
}

/// v0 kept everything flat: `color`, `bg`, `clock24h`, `hideBookmarks`, `bookmarks`.
fn v0_to_v1(mut map: Record) -> Result<Record, MigrationError> {
    let color = take_string(&mut map, "color", 0)?.unwrap_or_else(|| DEFAULT_PRIMARY_COLOR.into());
    let background = match take_string(&mut map, "bg", 0)? {
        Some(bg) if !bg.starts_with('#') => json!({ "kind": "image", "value": bg }),
        Some(bg) => json!({ "kind": "color", "value": bg }),
        None => json!({ "kind": "color", "value": crate::settings::DEFAULT_BACKGROUND_VALUE }),
    };
    let clock24h = take_bool(&mut map, "clock24h", 0)?.unwrap_or(true);
    let hide_bookmarks = take_bool(&mut map, "hideBookmarks", 0)?.unwrap_or(false);
    let bookmarks = match map.remove("bookmarks") {
        None | Some(Value::Null) => Value::Array(Vec::new()),
        Some(Value::Array(items)) => {
            if let Some(bad) = items.iter().find(|item| !item.is_object()) {
                return Err(unrecognised(0, format!("bookmark entry {bad} is not an object")));
            }
            Value::Array(items)
        }
        Some(_) => return Err(unrecognised(0, "bookmarks is not an array")),
    };

    let mut out = Record::new();
    if let Some(last_update) = map.remove("lastUpdate") {
        out.insert("lastUpdate".into(), last_update);
    }
    out.insert("version".into(), json!(1));
    out.insert(
        "settings".into(),
        json!({
            "primaryColor": color,
            "background": background,
            "clock24h": clock24h,
            "showBookmarks": !hide_bookmarks,
        }),
    );
    out.insert("bookmarks".into(), bookmarks);
    Ok(out)
}

/// Adds `theme`, renames background kinds and introduces `localBlobId`.
fn v1_to_v2(mut map: Record) -> Result<Record, MigrationError> {
    let settings = settings_mut(&mut map, 1)?;
    settings.entry("theme").or_insert_with(|| json!("auto"));
    let background = settings
        .get_mut("background")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| unrecognised(1, "background is not an object"))?;
    let kind = match background.get("kind").and_then(Value::as_str) {
        Some("image") => "remote",
        Some("color") => "solid",
        Some("gradient") => "gradient",
        Some("file") => "localFile",
        other => return Err(unrecognised(1, format!("unknown background kind {other:?}"))),
    };
    background.insert("kind".into(), json!(kind));
    background.entry("localBlobId").or_insert(Value::Null);
    map.insert("version".into(), json!(2));
    Ok(map)
}

/// Replaces the flat `clock24h` flag with a `clock` object.
fn v2_to_v3(mut map: Record) -> Result<Record, MigrationError> {
    let settings = settings_mut(&mut map, 2)?;
    let format24h = take_bool(settings, "clock24h", 2)?.unwrap_or(true);
    settings.insert(
        "clock".into(),
        json!({ "enabled": true, "format24h": format24h }),
    );
    map.insert("version".into(), json!(3));
    Ok(map)
}

/// Adds search engine and language; bookmark `icon` becomes `favicon`.
fn v3_to_v4(mut map: Record) -> Result<Record, MigrationError> {
    let settings = settings_mut(&mut map, 3)?;
    settings
        .entry("searchEngine")
        .or_insert_with(|| json!(DEFAULT_SEARCH_ENGINE));
    settings
        .entry("language")
        .or_insert_with(|| json!(DEFAULT_LANGUAGE));
    for bookmark in bookmarks_mut(&mut map, 3)? {
        let entry = bookmark
            .as_object_mut()
            .ok_or_else(|| unrecognised(3, "bookmark entry is not an object"))?;
        if let Some(icon) = entry.remove("icon") {
            entry.entry("favicon").or_insert(icon);
        }
    }
    map.insert("version".into(), json!(4));
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_version_tag_is_v0() {
        assert_eq!(stored_version(&json!({"color": "#fff"})).unwrap(), 0);
        assert_eq!(stored_version(&json!({"version": 3})).unwrap(), 3);
    }

    #[test]
    fn rejects_garbage_version_tags() {
        assert!(matches!(
            stored_version(&json!({"version": "two"})),
            Err(MigrationError::InvalidVersion(_))
        ));
        assert!(matches!(
            stored_version(&json!({"version": -1})),
            Err(MigrationError::InvalidVersion(_))
        ));
        assert_eq!(stored_version(&json!([1, 2])), Err(MigrationError::NotAnObject));
    }

    #[test]
    fn refuses_records_from_newer_code() {
        let err = migrate(json!({"version": CURRENT_VERSION + 1})).unwrap_err();
        assert_eq!(
            err,
            MigrationError::FromTheFuture {
                stored: CURRENT_VERSION + 1,
                supported: CURRENT_VERSION
            }
        );
    }

    #[test]
    fn unknown_background_kind_is_a_gap() {
        let record = json!({
            "version": 1,
            "settings": {"primaryColor": "#000", "background": {"kind": "video", "value": "x"}},
            "bookmarks": []
        });
        assert!(matches!(
            migrate(record),
            Err(MigrationError::Unrecognised { version: 1, .. })
        ));
    }

    #[test]
    fn empty_ancient_record_gets_defaults() {
        let migrated = migrate(json!({})).unwrap();
        assert_eq!(migrated["version"], CURRENT_VERSION);
        assert_eq!(migrated["settings"]["primaryColor"], DEFAULT_PRIMARY_COLOR);
        assert_eq!(migrated["settings"]["background"]["kind"], "solid");
        assert_eq!(migrated["bookmarks"], json!([]));
    }

    #[test]
    fn last_update_survives_the_chain() {
        let migrated = migrate(json!({"color": "#abc", "lastUpdate": 99})).unwrap();
        assert_eq!(migrated["lastUpdate"], 99);
    }

    #[test]
    fn current_record_missing_required_field_is_rejected() {
        let mut current = migrate(json!({})).unwrap();
        current["settings"]
            .as_object_mut()
            .unwrap()
            .remove("language");
        assert!(matches!(
            migrate(current),
            Err(MigrationError::Unrecognised { .. })
        ));
    }
}
