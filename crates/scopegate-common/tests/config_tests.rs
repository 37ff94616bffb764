//! ---
//! sg_section: "06-configuration"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Configuration discovery and environment override tests."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::env;
use std::fs;
use std::time::Duration;

use scopegate_common::config::AppConfig;

// Single test so the process-wide environment variable is not raced.
#[test]
fn candidate_discovery_and_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("missing.toml");
    let second = dir.path().join("scopegate.toml");
    fs::write(&second, "[authz]\nstore_timeout_ms = 40\n").unwrap();

    env::remove_var(AppConfig::ENV_CONFIG_PATH);
    let loaded = AppConfig::load_with_source(&[&first, &second]).unwrap();
    assert_eq!(loaded.source, second);
    assert_eq!(loaded.config.authz.store_timeout, Duration::from_millis(40));

    let override_path = dir.path().join("override.toml");
    fs::write(&override_path, "[authz]\nrole_cache_ttl_secs = 15\n").unwrap();
    env::set_var(AppConfig::ENV_CONFIG_PATH, &override_path);
    let loaded = AppConfig::load_with_source(&[&second]).unwrap();
    assert_eq!(loaded.source, override_path);
    assert_eq!(loaded.config.authz.role_cache_ttl, Duration::from_secs(15));

    fs::write(&override_path, "[authz]\nrole_cache_ttl_secs = 900\n").unwrap();
    assert!(AppConfig::load(&[&second]).is_err());

    env::remove_var(AppConfig::ENV_CONFIG_PATH);
    assert!(AppConfig::load(&[&first]).is_err());
}
