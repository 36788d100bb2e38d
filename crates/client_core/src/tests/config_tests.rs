use super::{load_config, GatewayConfig};

#[test]
fn defaults_then_environment_overrides() {
    std::env::remove_var("CLIENT_BASE_URL");
    std::env::remove_var("CLIENT_USER_AGENT");
    std::env::remove_var("CLIENT_POLL_TIMEOUT_SECS");

    let defaults = GatewayConfig::default();
    let config = load_config();
    assert_eq!(config.base_url, defaults.base_url);
    assert_eq!(config.poll_timeout_secs, defaults.poll_timeout_secs);

    std::env::set_var("CLIENT_BASE_URL", "https://gateway.example");
    std::env::set_var("CLIENT_POLL_TIMEOUT_SECS", "90");
    let config = load_config();
    assert_eq!(config.base_url, "https://gateway.example");
    assert_eq!(config.poll_timeout_secs, 90);

    // Unparsable values are ignored rather than propagated.
    std::env::set_var("CLIENT_POLL_TIMEOUT_SECS", "soon");
    let config = load_config();
    assert_eq!(config.poll_timeout_secs, defaults.poll_timeout_secs);

    std::env::remove_var("CLIENT_BASE_URL");
    std::env::remove_var("CLIENT_POLL_TIMEOUT_SECS");
}
