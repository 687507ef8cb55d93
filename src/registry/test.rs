use std::sync::atomic::Ordering;

use futures::future::join_all;

use crate::{
    client::{
        options::{ClientOptions, DriverInfo, DriverOptions},
        Client,
    },
    error::ErrorKind,
    selection_criteria::{ReadPreference, ReadPreferenceOptions},
    test_util::{registry_with, stub_registry, StubDriver},
    wire::{WireDomain, WireDriver, WireFailure},
};

use super::{ClientKey, PersistedClient, ProcessId};

#[tokio::test]
async fn equal_options_share_one_wire_client() {
    let (registry, state) = stub_registry();

    let first = Client::with_options(&registry, ClientOptions::default(), Default::default())
        .await
        .unwrap();
    let second = Client::with_options(&registry, ClientOptions::default(), Default::default())
        .await
        .unwrap();

    assert_eq!(first.key(), second.key());
    assert_eq!(state.clients_created.load(Ordering::SeqCst), 1);
    assert_eq!(registry.persistent_count(), 1);
    assert_eq!(registry.handle_count(), 2);
}

#[tokio::test]
async fn different_options_get_separate_wire_clients() {
    let (registry, state) = stub_registry();

    let _first = Client::with_options(&registry, ClientOptions::default(), Default::default())
        .await
        .unwrap();
    let options = ClientOptions::builder()
        .app_name("reporting".to_string())
        .build();
    let _second = Client::with_options(&registry, options, Default::default())
        .await
        .unwrap();

    assert_eq!(state.clients_created.load(Ordering::SeqCst), 2);
    assert_eq!(registry.persistent_count(), 2);
}

#[test]
fn equivalent_tag_sets_produce_equal_keys() {
    // Tag sets are hash maps, so two structurally equal sets can iterate in
    // different orders. The digest must not depend on that order.
    let options = || {
        let tags = vec![[
            ("dc".to_string(), "ny".to_string()),
            ("rack".to_string(), "1".to_string()),
            ("use".to_string(), "reporting".to_string()),
        ]
        .into_iter()
        .collect()];
        ClientOptions::builder()
            .read_preference(ReadPreference::Secondary {
                options: Some(ReadPreferenceOptions::builder().tag_sets(tags).build()),
            })
            .build()
    };

    let first = ClientKey::new(&options(), &DriverOptions::default()).unwrap();
    let second = ClientKey::new(&options(), &DriverOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn equal_connection_strings_produce_equal_keys() {
    let first = ClientOptions::parse("mongodb://localhost/?appName=app").unwrap();
    let second = ClientOptions::parse("mongodb://localhost/?appName=app").unwrap();

    assert_eq!(
        ClientKey::new(&first, &DriverOptions::default()).unwrap(),
        ClientKey::new(&second, &DriverOptions::default()).unwrap(),
    );
}

#[test]
fn parsed_and_built_options_produce_different_keys() {
    // A client built from a connection string is keyed on the string itself,
    // so it never aliases a client built directly from options.
    let parsed = ClientOptions::parse("mongodb://localhost:27017").unwrap();
    let built = ClientOptions::default();

    assert_ne!(
        ClientKey::new(&parsed, &DriverOptions::default()).unwrap(),
        ClientKey::new(&built, &DriverOptions::default()).unwrap(),
    );
}

#[test]
fn driver_options_contribute_to_the_key() {
    let options = ClientOptions::default();
    let with_info = DriverOptions::builder()
        .driver_info(DriverInfo::builder().name("integration".to_string()).build())
        .build();

    assert_ne!(
        ClientKey::new(&options, &DriverOptions::default()).unwrap(),
        ClientKey::new(&options, &with_info).unwrap(),
    );
}

#[tokio::test]
async fn persistence_setting_routes_to_separate_entries() {
    let (registry, state) = stub_registry();

    let persistent = Client::with_options(&registry, ClientOptions::default(), Default::default())
        .await
        .unwrap();
    let scoped_options = DriverOptions::builder()
        .disable_client_persistence(true)
        .build();
    let scoped = Client::with_options(&registry, ClientOptions::default(), scoped_options)
        .await
        .unwrap();

    assert_ne!(persistent.key(), scoped.key());
    assert_eq!(registry.persistent_count(), 1);
    assert_eq!(registry.request_count(), 1);
    assert_eq!(state.clients_created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn request_scoped_clients_are_torn_down_when_the_request_ends() {
    let (registry, state) = stub_registry();
    let driver_options = DriverOptions::builder()
        .disable_client_persistence(true)
        .build();
    let client = Client::with_options(&registry, ClientOptions::default(), driver_options)
        .await
        .unwrap();

    assert_eq!(registry.request_count(), 1);
    assert_eq!(registry.persistent_count(), 0);

    registry.end_request();

    assert_eq!(registry.request_count(), 0);
    assert_eq!(state.clients_dropped.load(Ordering::SeqCst), 1);

    let error = client.servers().unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Runtime { .. }));
}

#[tokio::test]
async fn persistent_clients_survive_the_end_of_a_request() {
    let (registry, state) = stub_registry();
    let client = Client::with_options(&registry, ClientOptions::default(), Default::default())
        .await
        .unwrap();

    registry.end_request();

    assert_eq!(registry.persistent_count(), 1);
    assert_eq!(state.clients_dropped.load(Ordering::SeqCst), 0);
    assert!(client.servers().is_ok());
}

#[tokio::test]
async fn begin_request_discards_leftover_request_clients() {
    let (registry, state) = stub_registry();
    let driver_options = DriverOptions::builder()
        .disable_client_persistence(true)
        .build();
    let _client = Client::with_options(&registry, ClientOptions::default(), driver_options)
        .await
        .unwrap();

    registry.begin_request();

    assert_eq!(registry.request_count(), 0);
    assert_eq!(state.clients_dropped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_tears_down_persistent_clients() {
    let (registry, state) = stub_registry();
    let client = Client::with_options(&registry, ClientOptions::default(), Default::default())
        .await
        .unwrap();

    registry.shutdown();

    assert_eq!(registry.persistent_count(), 0);
    assert_eq!(state.clients_dropped.load(Ordering::SeqCst), 1);
    assert!(client.servers().is_err());
}

#[tokio::test]
async fn create_failure_leaves_the_registry_unchanged() {
    let driver = StubDriver::new().fail_create(WireFailure::new(
        WireDomain::Stream,
        4,
        "connection refused",
    ));
    let (registry, state) = registry_with(driver);

    let error = Client::with_options(&registry, ClientOptions::default(), Default::default())
        .await
        .unwrap_err();

    assert!(matches!(*error.kind, ErrorKind::Wire { .. }));
    assert!(error.source.is_some());
    assert_eq!(registry.persistent_count(), 0);
    assert_eq!(registry.handle_count(), 0);
    assert_eq!(state.clients_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn handle_count_follows_client_lifetimes() {
    let (registry, _state) = stub_registry();
    let first = Client::with_options(&registry, ClientOptions::default(), Default::default())
        .await
        .unwrap();
    let second = first.clone();
    let third = Client::with_options(&registry, ClientOptions::default(), Default::default())
        .await
        .unwrap();

    // A clone shares its handle with the original.
    assert_eq!(registry.handle_count(), 2);

    drop(second);
    assert_eq!(registry.handle_count(), 2);

    drop(first);
    assert_eq!(registry.handle_count(), 1);

    drop(third);
    assert_eq!(registry.handle_count(), 0);
    assert_eq!(registry.persistent_count(), 1);
}

#[tokio::test]
async fn foreign_clients_are_reset_once_and_never_destroyed() {
    let driver = StubDriver::new();
    let state = driver.state();
    let wire = driver
        .create_client(&ClientOptions::default())
        .await
        .unwrap();

    let parent = ProcessId::from_raw(ProcessId::current().as_u32().wrapping_add(1));
    let persisted = PersistedClient::new(wire, parent);

    persisted.reset_once(parent);
    assert_eq!(state.resets.load(Ordering::SeqCst), 0);

    persisted.reset_once(ProcessId::current());
    persisted.reset_once(ProcessId::current());
    assert_eq!(state.resets.load(Ordering::SeqCst), 1);

    drop(persisted);
    assert_eq!(state.clients_dropped.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn own_clients_are_destroyed_on_drop() {
    let driver = StubDriver::new();
    let state = driver.state();
    let wire = driver
        .create_client(&ClientOptions::default())
        .await
        .unwrap();

    let persisted = PersistedClient::new(wire, ProcessId::current());
    drop(persisted);

    assert_eq!(state.clients_dropped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_construction_converges_on_one_wire_client() {
    let (registry, state) = stub_registry();

    let clients = join_all(
        (0..8).map(|_| Client::with_options(&registry, ClientOptions::default(), Default::default())),
    )
    .await;

    for client in &clients {
        assert!(client.is_ok());
    }
    assert_eq!(state.clients_created.load(Ordering::SeqCst), 1);
    assert_eq!(registry.persistent_count(), 1);
    assert_eq!(registry.handle_count(), 8);
}
