use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson},
    error::ErrorKind,
    selection_criteria::{verify_max_staleness, ReadPreference, ReadPreferenceOptions, TagSet},
};

fn tag_set(pairs: &[(&str, &str)]) -> TagSet {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn deserialize_read_preference() {
    let read_preference: ReadPreference = crate::bson::from_bson(Bson::Document(doc! {
        "mode": "secondaryPreferred",
        "maxStalenessSeconds": 100,
        "tag_sets": [{}, { "dc": "ny" }],
    }))
    .unwrap();

    assert_eq!(read_preference.mode(), "secondaryPreferred");
    assert_eq!(
        read_preference.max_staleness(),
        Some(Duration::from_secs(100))
    );
    assert_eq!(
        read_preference.tag_sets(),
        Some(&vec![tag_set(&[]), tag_set(&[("dc", "ny")])])
    );
}

#[test]
fn deserialize_read_preference_mode_case_insensitive() {
    let read_preference: ReadPreference =
        crate::bson::from_bson(Bson::Document(doc! { "mode": "SecondaryPreferred" })).unwrap();
    assert!(matches!(
        read_preference,
        ReadPreference::SecondaryPreferred { .. }
    ));
}

#[test]
fn deserialize_primary_with_options_fails() {
    let result: std::result::Result<ReadPreference, _> =
        crate::bson::from_bson(Bson::Document(doc! {
            "mode": "primary",
            "tag_sets": [{ "dc": "ny" }],
        }));
    assert!(result.is_err());
}

#[test]
fn deserialize_unknown_mode_fails() {
    let result: std::result::Result<ReadPreference, _> =
        crate::bson::from_bson(Bson::Document(doc! { "mode": "tertiary" }));
    assert!(result.is_err());
}

#[test]
fn serialize_read_preference() {
    let read_preference = ReadPreference::SecondaryPreferred {
        options: Some(
            ReadPreferenceOptions::builder()
                .tag_sets(vec![tag_set(&[("dc", "ny")])])
                .max_staleness(Duration::from_secs(120))
                .build(),
        ),
    };
    let serialized = crate::bson::to_bson(&read_preference).unwrap();
    assert_eq!(
        serialized,
        Bson::Document(doc! {
            "mode": "secondaryPreferred",
            "tagSets": [{ "dc": "ny" }],
            "maxStalenessSeconds": 120,
        })
    );

    let serialized = crate::bson::to_bson(&ReadPreference::Primary).unwrap();
    assert_eq!(serialized, Bson::Document(doc! { "mode": "primary" }));
}

#[test]
fn with_tags_rejects_primary() {
    let error = ReadPreference::Primary
        .with_tags(vec![tag_set(&[("dc", "ny")])])
        .expect_err("tags should not apply to primary");
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));

    let read_preference = ReadPreference::Secondary { options: None }
        .with_tags(vec![tag_set(&[("dc", "ny")])])
        .unwrap();
    assert_eq!(
        read_preference.tag_sets(),
        Some(&vec![tag_set(&[("dc", "ny")])])
    );
}

#[test]
fn with_max_staleness_rejects_primary() {
    let error = ReadPreference::Primary
        .with_max_staleness(Duration::from_secs(120))
        .expect_err("max staleness should not apply to primary");
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));

    let read_preference = ReadPreference::Nearest { options: None }
        .with_max_staleness(Duration::from_secs(120))
        .unwrap();
    assert_eq!(
        read_preference.max_staleness(),
        Some(Duration::from_secs(120))
    );
}

#[test]
fn max_staleness_bounds() {
    verify_max_staleness(Duration::from_secs(90)).expect("90 seconds should be accepted");
    verify_max_staleness(Duration::from_secs(0)).expect("zero should be accepted");

    let error = verify_max_staleness(Duration::from_secs(89))
        .expect_err("a positive bound below 90 seconds should be rejected");
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}
