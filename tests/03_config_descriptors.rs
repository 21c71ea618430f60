//! The serde front door: TOML-shaped descriptors deserialized into
//! [`ParamsEntry`] and promoted to validated [`ConnectionParams`].

use std::time::Duration;

use qlink::config::{ConnectionParams, ParamsEntry};
use qlink::errors::Error;
use qlink::wire::TextEncoding;

#[test]
fn toml_entry_promotes_to_params() {
    let entry: ParamsEntry = toml::from_str(
        r#"
        server = "tickhost"
        port = 5010
        user = "dev"
        password = "secret"
        max_pool_size = 25
        load_balance_timeout_secs = 30
        inactivity_timeout_secs = 120
        encoding = "latin1"
        "#,
    )
    .expect("well-formed entry");

    let params = ConnectionParams::try_from(entry).expect("valid params");
    assert_eq!(params.server, "tickhost");
    assert_eq!(params.port, 5010);
    assert_eq!(params.user, "dev");
    assert_eq!(params.password_exposed(), "secret");
    assert_eq!(params.max_pool_size, 25);
    assert_eq!(params.load_balance_timeout, Duration::from_secs(30));
    assert_eq!(params.inactivity_timeout, Duration::from_secs(120));
    assert_eq!(params.encoding, TextEncoding::Latin1);
    assert!(params.pooling);
}

#[test]
fn toml_defaults_fill_the_gaps() {
    let entry: ParamsEntry = toml::from_str(r#"server = "tickhost""#).expect("minimal entry");
    let params = ConnectionParams::try_from(entry).expect("valid params");
    assert_eq!(params.port, 5001);
    assert_eq!(params.max_pool_size, 100);
    assert_eq!(params.send_timeout, Duration::ZERO);
    assert_eq!(params.encoding, TextEncoding::Utf8);
}

#[test]
fn toml_entry_with_bad_bounds_fails_validation() {
    let entry: ParamsEntry = toml::from_str(
        r#"
        server = "tickhost"
        min_pool_size = 8
        max_pool_size = 2
        "#,
    )
    .expect("parses before validation");

    let err = ConnectionParams::try_from(entry).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn descriptor_string_and_toml_agree_on_pool_identity() {
    let from_str: ConnectionParams =
        "server=TickHost;port=5010;user id=dev;password=secret".parse().expect("descriptor");
    let entry: ParamsEntry = toml::from_str(
        r#"
        server = "tickhost"
        port = 5010
        user = "dev"
        password = "secret"
        "#,
    )
    .expect("entry");
    let from_toml = ConnectionParams::try_from(entry).expect("params");
    assert_eq!(from_str.pool_key(), from_toml.pool_key());
}
