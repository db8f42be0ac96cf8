//! Property-based tests (fuzzing) for record handling.
//!
//! Uses proptest to generate random and malformed inputs and verify that
//! parsing, validation and storage never panic and only return clean errors.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::{json, Value};

use field_sync::record::parse_coordinates;
use field_sync::storage::VolatileStore;
use field_sync::{Record, RecordInput, StorageBackend, StorageError};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Optional finite reading; `None` is "not measured".
fn reading_strategy() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        Just(None),
        Just(Some(0.0)),
        (-1.0e6f64..1.0e6).prop_map(Some),
    ]
}

/// Generate a valid Record with random readings
fn valid_record_strategy() -> impl Strategy<Value = Record> {
    (
        "[a-z0-9-]{1,36}",
        ".{0,40}",
        (-90.0f64..=90.0, -180.0f64..=180.0),
        reading_strategy(),
        reading_strategy(),
        prop::option::of(-10_000i64..10_000),
        any::<bool>(),
    )
        .prop_map(|(id, location, (lat, lng), temperature, ph, conductivity, synced)| {
            let mut record = Record::with_id(id, location);
            record.coordinates = format!("{}, {}", lat, lng);
            record.temperature = temperature;
            record.ph = ph;
            record.conductivity = conductivity;
            record.synced = synced;
            record
        })
}

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        3,   // depth
        32,  // max nodes
        8,   // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..8)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

/// Form text for a numeric field: blanks, numbers and junk
fn form_text_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        Just(Some("   ".to_string())),
        any::<f64>().prop_map(|v| Some(v.to_string())),
        any::<i64>().prop_map(|v| Some(v.to_string())),
        ".{0,12}".prop_map(Some),
    ]
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Arbitrary JSON never panics the record decoder
    #[test]
    fn fuzz_record_decode_never_panics(value in arbitrary_json_strategy()) {
        let _ = serde_json::from_value::<Record>(value);
    }

    /// A record-shaped object with hostile field values never panics
    #[test]
    fn fuzz_record_shaped_json(
        id in ".*",
        temperature in arbitrary_json_strategy(),
        timestamp in ".*",
    ) {
        let value = json!({
            "id": id,
            "temperature": temperature,
            "timestamp": timestamp,
            "synced": false,
        });
        if let Ok(record) = serde_json::from_value::<Record>(value) {
            let _ = record.validate();
        }
    }

    /// Valid records survive the persisted JSON shape unchanged
    #[test]
    fn prop_record_json_preserves_readings(record in valid_record_strategy()) {
        let raw = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&raw).unwrap();
        prop_assert_eq!(back.temperature, record.temperature);
        prop_assert_eq!(back.ph, record.ph);
        prop_assert_eq!(back.conductivity, record.conductivity);
        prop_assert_eq!(back, record);
    }

    /// Generated valid records pass validation
    #[test]
    fn prop_valid_records_validate(record in valid_record_strategy()) {
        prop_assert!(record.validate().is_ok());
    }

    /// Coordinate parsing never panics and only accepts in-range pairs
    #[test]
    fn fuzz_parse_coordinates(raw in ".{0,40}") {
        if let Ok((lat, lng)) = parse_coordinates(&raw) {
            prop_assert!((-90.0..=90.0).contains(&lat));
            prop_assert!((-180.0..=180.0).contains(&lng));
        }
    }

    /// Form input either becomes a valid record or a clean InvalidRecord error
    #[test]
    fn fuzz_record_input(
        temperature in form_text_strategy(),
        ph in form_text_strategy(),
        conductivity in form_text_strategy(),
        coordinates in ".{0,30}",
    ) {
        let blank_temperature = temperature.as_deref().map_or(true, |t| t.trim().is_empty());
        let input = RecordInput {
            location: "fuzz".into(),
            coordinates,
            temperature,
            ph,
            conductivity,
            ..Default::default()
        };

        match input.into_record() {
            Ok(record) => {
                prop_assert!(record.validate().is_ok());
                if blank_temperature {
                    prop_assert_eq!(record.temperature, None);
                }
            }
            Err(StorageError::InvalidRecord(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }

    /// Saving any id to a tier either stores it or rejects it cleanly
    #[test]
    fn fuzz_tier_save_arbitrary_ids(id in ".{0,20}") {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let tier = VolatileStore::new();
            tier.init().await.unwrap();
            match tier.save(&Record::with_id(id.clone(), "site")).await {
                Ok(stored) => {
                    assert!(!id.trim().is_empty());
                    assert!(stored.timestamp.is_some());
                }
                Err(e) => {
                    assert!(id.trim().is_empty());
                    assert!(matches!(e, StorageError::InvalidRecord(_)));
                }
            }
        });
    }
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn zero_reading_is_not_absent() {
    let input = RecordInput {
        temperature: Some("0".into()),
        depth: Some(String::new()),
        ..Default::default()
    };
    let record = input.into_record().unwrap();
    assert_eq!(record.temperature, Some(0.0));
    assert_eq!(record.depth, None);

    let raw = serde_json::to_value(&record).unwrap();
    assert_eq!(raw["temperature"], json!(0.0));
    assert_eq!(raw["depth"], Value::Null);
}

#[test]
fn missing_optional_fields_decode_as_absent() {
    let record: Record = serde_json::from_value(json!({ "id": "bare" })).unwrap();
    assert_eq!(record.temperature, None);
    assert_eq!(record.timestamp, None);
    assert!(!record.synced);
    assert!(record.validate().is_ok());
}

#[test]
fn non_finite_reading_is_rejected() {
    let mut record = Record::with_id("nan", "site");
    record.ph = Some(f64::NAN);
    assert!(matches!(record.validate(), Err(StorageError::InvalidRecord(_))));
}
