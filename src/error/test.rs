use crate::{
    error::{Error, ErrorDomain, ErrorKind},
    wire::{codes, WireDomain, WireFailure},
};

fn translate(domain: WireDomain, code: i32) -> Error {
    Error::from(WireFailure::new(domain, code, "boom"))
}

#[test]
fn from_domain_maps_one_to_one() {
    let cases: &[(ErrorDomain, fn(&ErrorKind) -> bool)] = &[
        (ErrorDomain::InvalidArgument, |kind| {
            matches!(kind, ErrorKind::InvalidArgument { .. })
        }),
        (ErrorDomain::Runtime, |kind| {
            matches!(kind, ErrorKind::Runtime { .. })
        }),
        (ErrorDomain::Wire, |kind| matches!(kind, ErrorKind::Wire { .. })),
        (ErrorDomain::ConnectionFailed, |kind| {
            matches!(kind, ErrorKind::ConnectionFailed { .. })
        }),
        (ErrorDomain::UnexpectedValue, |kind| {
            matches!(kind, ErrorKind::UnexpectedValue { .. })
        }),
        (ErrorDomain::Logic, |kind| {
            matches!(kind, ErrorKind::Logic { .. })
        }),
    ];

    for (domain, is_expected_kind) in cases {
        let error = Error::from_domain(*domain, "oops");
        assert!(
            is_expected_kind(&error.kind),
            "wrong kind for {:?}: {:?}",
            domain,
            error
        );
    }
}

#[test]
fn error_domain_values_are_stable() {
    assert_eq!(ErrorDomain::InvalidArgument as i32, 1);
    assert_eq!(ErrorDomain::Runtime as i32, 2);
    assert_eq!(ErrorDomain::Wire as i32, 3);
    assert_eq!(ErrorDomain::ConnectionFailed as i32, 7);
    assert_eq!(ErrorDomain::UnexpectedValue as i32, 8);
    assert_eq!(ErrorDomain::Logic as i32, 9);
}

#[test]
fn timeout_code_wins_over_domain() {
    for domain in [
        WireDomain::Server,
        WireDomain::Stream,
        WireDomain::Query,
        WireDomain::Command,
        WireDomain::ServerSelection,
    ] {
        let error = translate(domain, crate::error::EXCEEDED_TIME_LIMIT);
        assert!(
            matches!(*error.kind, ErrorKind::ExecutionTimeout { .. }),
            "wrong kind for {:?}: {:?}",
            domain,
            error
        );
    }
}

#[test]
fn stream_failures_become_connection_errors() {
    let error = translate(WireDomain::Stream, 4);
    assert!(matches!(*error.kind, ErrorKind::ConnectionFailed { .. }));

    let error = translate(WireDomain::ServerSelection, 13053);
    assert!(matches!(*error.kind, ErrorKind::ConnectionFailed { .. }));
}

#[test]
fn authentication_failure_becomes_connection_error() {
    let error = translate(WireDomain::Client, codes::CLIENT_AUTHENTICATE);
    assert!(matches!(*error.kind, ErrorKind::ConnectionFailed { .. }));

    // Other client codes have no dedicated translation.
    let error = translate(WireDomain::Client, 12);
    assert!(matches!(*error.kind, ErrorKind::Runtime { .. }));
}

#[test]
fn invalid_command_argument_translates_to_invalid_argument() {
    let error = translate(WireDomain::Command, codes::COMMAND_INVALID_ARG);
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn unmapped_failures_keep_domain_and_code_in_the_message() {
    let error = Error::from(WireFailure::new(
        WireDomain::Command,
        8000,
        "something went wrong",
    ));
    match *error.kind {
        ErrorKind::Runtime { ref message } => {
            assert_eq!(message, "command error (code 8000): something went wrong")
        }
        ref other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn labels_survive_translation() {
    let failure = WireFailure::new(WireDomain::WriteConcern, 64, "waiting for replication")
        .with_labels(vec!["RetryableWriteError".to_string()]);
    let error = Error::from(failure);

    assert!(error.contains_label("RetryableWriteError"));
    assert!(error.is_retryable_write());
    assert!(!error.contains_label("TransientTransactionError"));
}

#[test]
fn labels_are_found_through_sources() {
    let inner = Error::from(
        WireFailure::new(WireDomain::Server, 189, "stepping down")
            .with_labels(vec!["RetryableWriteError".to_string()]),
    );
    let outer = Error::runtime("operation failed").with_source(inner);

    assert!(outer.labels().is_empty());
    assert!(outer.contains_label("RetryableWriteError"));
    assert!(outer.is_retryable_write());
}
