use super::*;

#[test]
fn defaults_point_at_local_node() {
    let settings = Settings::default();
    assert_eq!(settings.server_bind, "127.0.0.1:3001");
    assert_eq!(settings.firefly_endpoint, "http://localhost:5000");
    assert_eq!(settings.firefly_namespace, "default");
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file_overrides(
        &mut settings,
        r#"
bind_addr = "0.0.0.0:4000"
firefly_endpoint = "http://firefly:5000"
event_buffer = 512
"#,
    );
    assert_eq!(settings.server_bind, "0.0.0.0:4000");
    assert_eq!(settings.firefly_endpoint, "http://firefly:5000");
    assert_eq!(settings.firefly_namespace, "default");
    assert_eq!(settings.event_buffer, 512);
}

#[test]
fn malformed_file_is_ignored() {
    let mut settings = Settings::default();
    apply_file_overrides(&mut settings, "bind_addr = ");
    assert_eq!(settings, Settings::default());
}

#[test]
fn prefixed_env_vars_win_over_plain_ones() {
    let mut settings = Settings::default();
    let env: HashMap<&str, &str> = [
        ("SERVER_BIND", "127.0.0.1:1111"),
        ("APP__BIND_ADDR", "127.0.0.1:2222"),
        ("FIREFLY_NAMESPACE", "ns1"),
        ("APP__EVENT_BUFFER", "not-a-number"),
    ]
    .into_iter()
    .collect();

    apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));
    assert_eq!(settings.server_bind, "127.0.0.1:2222");
    assert_eq!(settings.firefly_namespace, "ns1");
    assert_eq!(settings.event_buffer, Settings::default().event_buffer);
}

#[test]
fn endpoint_is_normalized() {
    assert_eq!(
        prepare_firefly_endpoint(" http://localhost:5000/ ").expect("endpoint"),
        "http://localhost:5000"
    );
    assert_eq!(
        prepare_firefly_endpoint("firefly:5000").expect("endpoint"),
        "http://firefly:5000"
    );
    assert_eq!(
        prepare_firefly_endpoint("").expect("endpoint"),
        "http://localhost:5000"
    );
}

#[test]
fn non_http_endpoint_is_rejected() {
    assert!(prepare_firefly_endpoint("ftp://localhost:5000").is_err());
}
