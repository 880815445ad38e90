use hbnb_core::{
    FieldType, JsonFileStore, KindCatalog, KindSpec, Record, RecordError, RecordStore, StoreError,
};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

fn widget_catalog() -> KindCatalog {
    KindCatalog::new()
        .with_kind(
            KindSpec::new("Widget")
                .field("color", FieldType::String)
                .field("size", FieldType::Integer),
        )
        .unwrap()
        .with_kind(KindSpec::new("Gadget").field("name", FieldType::String))
        .unwrap()
}

fn widget(id: &str) -> Record {
    widget_catalog()
        .get("Widget")
        .unwrap()
        .instantiate_with_id(id)
        .unwrap()
}

fn write_json(path: &Path, value: Value) {
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

#[test]
fn reload_of_missing_file_leaves_store_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonFileStore::new(dir.path().join("absent.json"), widget_catalog());

    assert_eq!(store.reload().unwrap(), 0);
    assert_eq!(store.reload().unwrap(), 0);
    assert!(store.is_empty());
}

#[test]
fn reload_of_empty_file_leaves_store_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    fs::write(&path, "").unwrap();

    let store = JsonFileStore::open(&path, widget_catalog()).unwrap();
    assert!(store.is_empty());
}

#[test]
fn saved_record_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let mut original = widget("abc-1");
    original.set_attribute("color", json!("teal")).unwrap();
    original.set_attribute("tags", json!(["a", "b"])).unwrap();
    let expected = original.clone();

    let mut store = JsonFileStore::new(&path, widget_catalog());
    store.insert(original);
    assert!(store.is_dirty());
    store.save().unwrap();
    assert!(!store.is_dirty());
    drop(store);

    let restarted = JsonFileStore::open(&path, widget_catalog()).unwrap();
    let loaded = restarted.get("Widget", "abc-1").unwrap();
    assert_eq!(loaded.attributes(), expected.attributes());
    assert_eq!(loaded, &expected);
}

#[test]
fn deleted_record_stays_deleted_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let mut store = JsonFileStore::new(&path, widget_catalog());
    store.insert(widget("x"));
    store.insert(widget("y"));
    store.save().unwrap();

    let removed = store.delete("Widget", "x").unwrap();
    assert_eq!(removed.id(), "x");
    store.save().unwrap();

    let restarted = JsonFileStore::open(&path, widget_catalog()).unwrap();
    assert!(matches!(
        restarted.get("Widget", "x"),
        Err(StoreError::NotFound { .. })
    ));
    assert!(restarted.get("Widget", "y").is_ok());
}

#[test]
fn delete_of_absent_record_is_not_found_and_does_not_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let mut store = JsonFileStore::new(&path, widget_catalog());

    let err = store.delete("Widget", "ghost").unwrap_err();
    assert!(matches!(err, StoreError::NotFound { ref kind, ref id } if kind == "Widget" && id == "ghost"));
    assert!(!path.exists());
}

#[test]
fn all_of_kind_filters_by_kind_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = widget_catalog();
    let mut store = JsonFileStore::new(dir.path().join("store.json"), catalog.clone());

    let gadget = catalog.get("Gadget").unwrap().instantiate();
    store.insert(gadget);
    store.insert(widget("w-1"));

    let widgets = store.all_of_kind("Widget");
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].id(), "w-1");
    assert_eq!(store.all_of_kind("Gadget").len(), 1);
    assert_eq!(store.all().len(), 2);
}

#[test]
fn all_of_kind_does_not_match_longer_kind_names() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = widget_catalog()
        .with_kind(KindSpec::new("WidgetPart"))
        .unwrap();
    let mut store = JsonFileStore::new(dir.path().join("store.json"), catalog.clone());

    store.insert(widget("w-1"));
    store.insert(catalog.get("WidgetPart").unwrap().instantiate());

    assert_eq!(store.all_of_kind("Widget").len(), 1);
}

#[test]
fn unknown_kind_fails_reload_without_partial_population() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    write_json(
        &path,
        json!({
            "Widget.a": {
                "id": "a",
                "created_at": "2024-04-20T22:54:27.010738",
                "updated_at": "2024-04-20T22:54:27.010738",
                "__class__": "Widget"
            },
            "Ghost.b": {
                "id": "b",
                "created_at": "2024-04-20T22:54:27.010738",
                "updated_at": "2024-04-20T22:54:27.010738",
                "__class__": "Ghost"
            }
        }),
    );

    let mut store = JsonFileStore::new(&path, widget_catalog());
    let err = store.reload().unwrap_err();

    assert!(matches!(err, StoreError::UnknownKind(ref kind) if kind == "Ghost"));
    assert!(store.is_empty());
    assert!(store.get("Widget", "a").is_err());
}

#[test]
fn failed_reload_leaves_populated_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let mut store = JsonFileStore::new(&path, widget_catalog());
    let mut kept = widget("kept");
    kept.set_attribute("color", json!("red")).unwrap();
    store.insert(kept);
    store.insert(widget("a"));
    let before = store.all().clone();

    write_json(
        &path,
        json!({
            "Widget.a": {
                "id": "a",
                "created_at": "2024-04-20T22:54:27.010738",
                "updated_at": "2024-04-20T22:54:27.010738",
                "color": "overwritten",
                "__class__": "Widget"
            },
            "Widget.fresh": {
                "id": "fresh",
                "created_at": "2024-04-20T22:54:27.010738",
                "updated_at": "2024-04-20T22:54:27.010738",
                "__class__": "Widget"
            },
            "Ghost.b": {
                "id": "b",
                "created_at": "2024-04-20T22:54:27.010738",
                "updated_at": "2024-04-20T22:54:27.010738",
                "__class__": "Ghost"
            }
        }),
    );

    let err = store.reload().unwrap_err();
    assert!(matches!(err, StoreError::UnknownKind(ref kind) if kind == "Ghost"));
    assert_eq!(store.all(), &before);
    assert!(store.get("Widget", "fresh").is_err());
}

#[test]
fn float_attributes_survive_save_and_reload_bit_for_bit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let values: Vec<f64> = (0..2000)
        .map(|i| f64::from(i) * 0.1 + 1.0 / 3.0 - 90.0)
        .chain([
            -25.366666666666674,
            2.291712365432881e-9,
            37.773972,
            -122.431297,
            f64::MIN_POSITIVE,
            f64::MAX,
        ])
        .collect();

    let mut store = JsonFileStore::new(&path, widget_catalog());
    for (index, value) in values.iter().enumerate() {
        let mut record = widget(&format!("w{index}"));
        record.set_attribute("x", json!(value)).unwrap();
        store.insert(record);
    }
    store.save().unwrap();
    drop(store);

    let restarted = JsonFileStore::open(&path, widget_catalog()).unwrap();
    for (index, value) in values.iter().enumerate() {
        let loaded = restarted
            .get("Widget", &format!("w{index}"))
            .unwrap()
            .attribute("x")
            .and_then(Value::as_f64)
            .unwrap();
        assert_eq!(loaded.to_bits(), value.to_bits(), "value {value} reloaded as {loaded}");
    }
}

#[test]
fn save_to_unwritable_path_reports_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonFileStore::new(dir.path(), widget_catalog());
    store.insert(widget("a"));

    let err = store.save().unwrap_err();
    assert!(matches!(err, StoreError::Io { ref path, .. } if path == dir.path()));
    assert!(store.is_dirty());
}

#[test]
fn open_of_unreadable_path_reports_io_error() {
    let dir = tempfile::tempdir().unwrap();

    let err = JsonFileStore::open(dir.path(), widget_catalog()).unwrap_err();
    assert!(matches!(err, StoreError::Io { ref path, .. } if path == dir.path()));
}

#[test]
fn reconstructing_under_another_kind_fails() {
    let catalog = widget_catalog();
    let gadget = catalog.get("Gadget").unwrap().instantiate();

    let err = catalog
        .get("Widget")
        .unwrap()
        .reconstruct(gadget.to_mapping())
        .unwrap_err();
    assert!(matches!(err, RecordError::KindMismatch { ref found, .. } if found == "Gadget"));
}

#[test]
fn malformed_timestamp_fails_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    write_json(
        &path,
        json!({
            "Widget.a": {
                "id": "a",
                "created_at": "not-a-date",
                "updated_at": "2024-04-20T22:54:27.010738",
                "__class__": "Widget"
            }
        }),
    );

    let err = JsonFileStore::open(&path, widget_catalog()).unwrap_err();
    match err {
        StoreError::Record { key, source } => {
            assert_eq!(key, "Widget.a");
            assert!(matches!(
                source,
                RecordError::MalformedTimestamp {
                    field: "created_at",
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn reload_rejects_key_that_disagrees_with_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    write_json(
        &path,
        json!({
            "Gadget.a": {
                "id": "a",
                "created_at": "2024-04-20T22:54:27.010738",
                "updated_at": "2024-04-20T22:54:27.010738",
                "__class__": "Widget"
            }
        }),
    );

    let err = JsonFileStore::open(&path, widget_catalog()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::KeyMismatch { ref key, ref expected } if key == "Gadget.a" && expected == "Widget.a"
    ));
}

#[test]
fn reload_rejects_entries_without_discriminator() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    write_json(&path, json!({ "Widget.a": { "id": "a" } }));

    let err = JsonFileStore::open(&path, widget_catalog()).unwrap_err();
    assert!(matches!(err, StoreError::MalformedEntry { .. }));

    write_json(&path, json!({ "Widget.a": [1, 2, 3] }));
    let err = JsonFileStore::open(&path, widget_catalog()).unwrap_err();
    assert!(matches!(err, StoreError::MalformedEntry { .. }));
}

#[test]
fn reload_rejects_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    fs::write(&path, "{ truncated").unwrap();

    let err = JsonFileStore::open(&path, widget_catalog()).unwrap_err();
    assert!(matches!(err, StoreError::Json { .. }));
}

#[test]
fn repeated_reload_of_unchanged_file_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let mut store = JsonFileStore::new(&path, widget_catalog());
    store.insert(widget("x"));
    store.insert(widget("y"));
    store.save().unwrap();

    let mut restarted = JsonFileStore::open(&path, widget_catalog()).unwrap();
    let before: Vec<Record> = restarted.all().values().cloned().collect();
    assert_eq!(restarted.reload().unwrap(), 2);
    let after: Vec<Record> = restarted.all().values().cloned().collect();
    assert_eq!(before, after);
}

#[test]
fn save_writes_tab_indented_snapshot_keyed_by_composite_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.json");
    let mut store = JsonFileStore::new(&path, widget_catalog());
    store.insert(widget("abc-1"));
    store.save().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\n\t\"Widget.abc-1\": {"));

    let value: Value = serde_json::from_str(&text).unwrap();
    let entry = &value["Widget.abc-1"];
    assert_eq!(entry["__class__"], "Widget");
    assert_eq!(entry["id"], "abc-1");
    assert_eq!(entry["size"], 0);
    assert_eq!(entry["color"], "");
}

#[test]
fn save_of_empty_store_writes_empty_object() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let mut store = JsonFileStore::new(&path, widget_catalog());
    store.save().unwrap();

    let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value, json!({}));
}

#[test]
fn insert_with_duplicate_key_replaces_and_returns_previous() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonFileStore::new(dir.path().join("store.json"), widget_catalog());

    let mut first = widget("dup");
    first.set_attribute("color", json!("red")).unwrap();
    let mut second = widget("dup");
    second.set_attribute("color", json!("blue")).unwrap();

    assert!(store.insert(first).is_none());
    let displaced = store.insert(second).expect("previous record should be returned");
    assert_eq!(displaced.attribute("color"), Some(&json!("red")));
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.get("Widget", "dup").unwrap().attribute("color"),
        Some(&json!("blue"))
    );
}

#[test]
fn create_rejects_unknown_kind_and_registers_known_kind() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonFileStore::new(dir.path().join("store.json"), widget_catalog());

    assert!(matches!(
        store.create("Ghost"),
        Err(StoreError::UnknownKind(_))
    ));

    let id = store.create("Widget").unwrap();
    let record = store.get("Widget", &id).unwrap();
    assert_eq!(record.attribute("size"), Some(&json!(0)));
}

#[test]
fn persist_advances_updated_at_and_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let mut store = JsonFileStore::new(&path, widget_catalog());
    store.insert(widget("p"));

    let before = store.get("Widget", "p").unwrap().clone();
    store.persist("Widget", "p").unwrap();
    let after = store.get("Widget", "p").unwrap();

    assert!(after.updated_at() > before.updated_at());
    assert_eq!(after.created_at(), before.created_at());

    let restarted = JsonFileStore::open(&path, widget_catalog()).unwrap();
    assert_eq!(
        restarted.get("Widget", "p").unwrap().updated_at(),
        after.updated_at()
    );
    assert!(matches!(
        store.persist("Widget", "missing"),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn builtin_catalog_loads_original_snapshot_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved_objects.json");
    write_json(
        &path,
        json!({
            "User.368bf4c9-d31d-488f-a0df-82956df65d87": {
                "id": "368bf4c9-d31d-488f-a0df-82956df65d87",
                "created_at": "2024-04-20T22:54:27.010738",
                "updated_at": "2024-04-20T22:56:10.710577",
                "first_name": "Damian",
                "last_name": "Sal",
                "__class__": "User"
            },
            "Place.c4663bbb-0918-4c0a-9f28-1aba33ce53ff": {
                "id": "c4663bbb-0918-4c0a-9f28-1aba33ce53ff",
                "created_at": "2024-04-20T22:55:15.088887",
                "updated_at": "2024-04-21T12:46:27.944296",
                "amenity_ids": ["60af1e59", "a268f1ab"],
                "longitude": 44.789,
                "latitude": -52.08,
                "price_by_night": 170,
                "__class__": "Place"
            },
            "BaseModel.77503503-4e67-4d6a-833e-6b16127a4570": {
                "id": "77503503-4e67-4d6a-833e-6b16127a4570",
                "created_at": "2024-04-20T22:55:25.273094",
                "updated_at": "2024-04-20T22:55:25.273113",
                "__class__": "BaseModel"
            }
        }),
    );

    let store = JsonFileStore::open(&path, KindCatalog::builtin()).unwrap();
    assert_eq!(store.len(), 3);

    let place = store
        .get("Place", "c4663bbb-0918-4c0a-9f28-1aba33ce53ff")
        .unwrap();
    assert_eq!(place.attribute("price_by_night"), Some(&json!(170)));
    assert_eq!(place.attribute("amenity_ids"), Some(&json!(["60af1e59", "a268f1ab"])));
    assert_eq!(place.attribute("name"), None);

    let user = store
        .get("User", "368bf4c9-d31d-488f-a0df-82956df65d87")
        .unwrap();
    assert_eq!(user.attribute("first_name"), Some(&json!("Damian")));
}

#[test]
fn all_mut_is_live_registry() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonFileStore::new(dir.path().join("store.json"), widget_catalog());
    store.insert(widget("x"));

    store.all_mut().shift_remove("Widget.x");
    assert!(store.get("Widget", "x").is_err());
}
