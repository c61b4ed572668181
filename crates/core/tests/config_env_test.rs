use std::env;
use std::io::Write;

use recon_core::{config::LockBackend, AppConfig};

#[test]
fn test_environment_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
        [dispatcher]
        max_retries = 2

        [cache]
        lock_backend = "redis"
        "#
    )
    .unwrap();

    env::set_var("RECON_DISPATCHER__MAX_RETRIES", "5");
    env::set_var("RECON_CACHE__LOCK_BACKEND", "memory");
    env::set_var("RECON_AUTH__API_KEYS", "key-a,key-b");

    let config = AppConfig::load(file.path().to_str()).unwrap();

    env::remove_var("RECON_DISPATCHER__MAX_RETRIES");
    env::remove_var("RECON_CACHE__LOCK_BACKEND");
    env::remove_var("RECON_AUTH__API_KEYS");

    assert_eq!(config.dispatcher.max_retries, 5);
    assert_eq!(config.cache.lock_backend, LockBackend::Memory);
    assert_eq!(
        config.auth.api_keys,
        vec!["key-a".to_string(), "key-b".to_string()]
    );
    assert_eq!(config.dispatcher.heartbeat_timeout_seconds, 10);
}
