use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::{
    bson::Bson,
    client::options::ServerAddress,
    topology::{ServerDescription, ServerId, ServerType},
    wire::ServerStatus,
};

const ALL_TYPES: &[(ServerType, &str, i32)] = &[
    (ServerType::Unknown, "Unknown", 0),
    (ServerType::Standalone, "Standalone", 1),
    (ServerType::Mongos, "Mongos", 2),
    (ServerType::PossiblePrimary, "PossiblePrimary", 3),
    (ServerType::RsPrimary, "RSPrimary", 4),
    (ServerType::RsSecondary, "RSSecondary", 5),
    (ServerType::RsArbiter, "RSArbiter", 6),
    (ServerType::RsOther, "RSOther", 7),
    (ServerType::RsGhost, "RSGhost", 8),
];

#[test]
fn server_type_round_trip() {
    for (server_type, native, int) in ALL_TYPES {
        assert_eq!(ServerType::classify(native), *server_type);
        assert_eq!(server_type.as_str(), *native);
        assert_eq!(server_type.to_i32(), *int);
    }
}

#[test]
fn server_type_classify_is_total() {
    // Strings from newer or unknown wire libraries must classify rather than
    // fail.
    assert_eq!(ServerType::classify("LoadBalancer"), ServerType::Unknown);
    assert_eq!(ServerType::classify(""), ServerType::Unknown);
    // Matching is case sensitive per the native representation.
    assert_eq!(ServerType::classify("rsprimary"), ServerType::Unknown);
}

#[test]
fn server_type_default_is_unknown() {
    assert_eq!(ServerType::default(), ServerType::Unknown);
}

#[test]
fn server_type_serde_uses_native_strings() {
    let serialized = crate::bson::to_bson(&ServerType::RsPrimary).unwrap();
    assert_eq!(serialized, Bson::String("RSPrimary".to_string()));

    let deserialized: ServerType =
        crate::bson::from_bson(Bson::String("RSGhost".to_string())).unwrap();
    assert_eq!(deserialized, ServerType::RsGhost);
}

#[test]
fn description_from_status() {
    let status = ServerStatus::builder()
        .id(ServerId::new(3))
        .address(ServerAddress::parse("db1.example.com:27018").unwrap())
        .server_type("RSSecondary")
        .round_trip_time(Duration::from_millis(14))
        .tags(
            [("dc".to_string(), "ny".to_string())]
                .into_iter()
                .collect::<crate::selection_criteria::TagSet>(),
        )
        .build();

    let description = ServerDescription::from(status);
    assert_eq!(description.id, ServerId::new(3));
    assert_eq!(
        description.address,
        ServerAddress::parse("db1.example.com:27018").unwrap()
    );
    assert_eq!(description.server_type, ServerType::RsSecondary);
    assert_eq!(description.round_trip_time, Some(Duration::from_millis(14)));
    assert_eq!(description.tags.get("dc").map(String::as_str), Some("ny"));
    assert!(description.is_data_bearing());
}

#[test]
fn description_from_unrecognized_status() {
    let status = ServerStatus::builder()
        .id(ServerId::new(1))
        .address(ServerAddress::parse("localhost").unwrap())
        .server_type("SomethingNew")
        .build();

    let description = ServerDescription::from(status);
    assert_eq!(description.server_type, ServerType::Unknown);
    assert!(!description.is_data_bearing());
}
