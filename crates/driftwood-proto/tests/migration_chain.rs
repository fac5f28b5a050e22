use std::collections::BTreeSet;

use driftwood_proto::migrate::REQUIRED_SETTINGS_FIELDS;
use driftwood_proto::{
    migrate, stored_version, BackgroundKind, LocalRecord, ReplicatedPayload, Theme,
    CURRENT_VERSION,
};
use serde_json::{json, Value};

/// One record per shipped schema version, oldest first.
fn historical_fixtures() -> Vec<(&'static str, Value)> {
    vec![
        (
            "v0 versionless",
            json!({
                "color": "#aa00aa",
                "bg": "https://images.example.com/dunes.jpg",
                "clock24h": false,
                "hideBookmarks": true,
                "bookmarks": [
                    {"url": "https://news.example.com", "title": "News", "icon": "https://news.example.com/f.ico"},
                    {"url": "https://mail.example.com", "title": "Mail"}
                ]
            }),
        ),
        (
            "v1",
            json!({
                "version": 1,
                "settings": {
                    "primaryColor": "#112233",
                    "background": {"kind": "color", "value": "#000000"},
                    "clock24h": true,
                    "showBookmarks": true
                },
                "bookmarks": [{"url": "https://a.example", "title": "A", "icon": "https://a.example/i.png"}]
            }),
        ),
        (
            "v2",
            json!({
                "version": 2,
                "settings": {
                    "primaryColor": "#445566",
                    "theme": "dark",
                    "background": {"kind": "localFile", "value": "me.png", "localBlobId": "blob-1"},
                    "clock24h": false,
                    "showBookmarks": false
                },
                "bookmarks": []
            }),
        ),
        (
            "v3",
            json!({
                "version": 3,
                "settings": {
                    "primaryColor": "#778899",
                    "theme": "light",
                    "background": {"kind": "gradient", "value": "linear-gradient(#000, #fff)", "localBlobId": null},
                    "clock": {"enabled": false, "format24h": false},
                    "showBookmarks": true
                },
                "bookmarks": [{"url": "https://b.example", "title": "B", "icon": null}]
            }),
        ),
        (
            "v4 current",
            json!({
                "version": 4,
                "settings": {
                    "primaryColor": "#3b82f6",
                    "theme": "auto",
                    "background": {"kind": "remote", "value": "https://img.example/x.jpg", "localBlobId": null},
                    "clock": {"enabled": true, "format24h": true},
                    "showBookmarks": true,
                    "searchEngine": "kagi",
                    "language": "fr"
                },
                "bookmarks": [{"url": "https://c.example", "title": "C", "favicon": "https://c.example/f.ico"}]
            }),
        ),
    ]
}

#[test]
fn every_historical_shape_migrates_idempotently() {
    for (name, fixture) in historical_fixtures() {
        let once = migrate(fixture).unwrap_or_else(|err| panic!("{name}: {err}"));
        let twice = migrate(once.clone()).unwrap_or_else(|err| panic!("{name}: {err}"));
        assert_eq!(once, twice, "{name}: migration is not idempotent");
        assert_eq!(stored_version(&once).unwrap(), CURRENT_VERSION, "{name}");
    }
}

#[test]
fn migrated_settings_match_current_field_set_exactly() {
    let required: BTreeSet<&str> = REQUIRED_SETTINGS_FIELDS.iter().copied().collect();
    for (name, fixture) in historical_fixtures() {
        let migrated = migrate(fixture).unwrap();
        let keys: BTreeSet<&str> = migrated["settings"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, required, "{name}: settings field set");
        let record: LocalRecord = serde_json::from_value(migrated)
            .unwrap_or_else(|err| panic!("{name}: does not decode as current record: {err}"));
        assert_eq!(record.version, CURRENT_VERSION);
    }
}

#[test]
fn ancient_record_keeps_user_choices() {
    let (_, ancient) = historical_fixtures().remove(0);
    let record: LocalRecord = serde_json::from_value(migrate(ancient).unwrap()).unwrap();
    assert_eq!(record.settings.primary_color, "#aa00aa");
    assert_eq!(record.settings.background.kind, BackgroundKind::Remote);
    assert_eq!(
        record.settings.background.value,
        "https://images.example.com/dunes.jpg"
    );
    assert!(!record.settings.clock.format24h);
    assert!(!record.settings.show_bookmarks);
    assert_eq!(record.bookmarks.len(), 2);
    assert_eq!(
        record.bookmarks[0].favicon.as_deref(),
        Some("https://news.example.com/f.ico")
    );
    assert_eq!(record.bookmarks[1].favicon, None);
}

#[test]
fn v2_local_file_background_is_preserved_locally() {
    let (_, v2) = historical_fixtures().remove(2);
    let record: LocalRecord = serde_json::from_value(migrate(v2).unwrap()).unwrap();
    assert_eq!(record.settings.theme, Theme::Dark);
    assert_eq!(record.settings.background.kind, BackgroundKind::LocalFile);
    assert_eq!(
        record.settings.background.local_blob_id.as_deref(),
        Some("blob-1")
    );
    assert!(!record.settings.clock.format24h);
}

#[test]
fn replicated_payload_migrates_with_its_timestamp() {
    let stored = json!({
        "version": 2,
        "lastUpdate": 1_690_000_000_000i64,
        "settings": {
            "primaryColor": "#010203",
            "theme": "auto",
            "background": {"kind": "solid", "value": "#000", "localBlobId": null},
            "clock24h": true,
            "showBookmarks": true
        },
        "bookmarks": []
    });
    let payload: ReplicatedPayload = serde_json::from_value(migrate(stored).unwrap()).unwrap();
    assert_eq!(payload.last_update, 1_690_000_000_000);
    assert_eq!(payload.version, CURRENT_VERSION);
    assert_eq!(payload.settings.search_engine, "duckduckgo");
}

#[test]
fn corrupted_records_are_rejected_not_half_migrated() {
    let corrupted = [
        json!("just a string"),
        json!({"bookmarks": "nope"}),
        json!({"color": 12}),
        json!({"version": 2, "settings": []}),
        json!({"version": 3, "settings": {"primaryColor": "#fff"}, "bookmarks": [1]}),
    ];
    for record in corrupted {
        assert!(migrate(record.clone()).is_err(), "accepted {record}");
    }
}
