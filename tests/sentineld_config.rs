use std::sync::Mutex;

use tempfile::NamedTempFile;

use od_sentinel::config::ServiceConfig;
use od_sentinel::AlgorithmKind;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTINEL_CONFIG",
        "SENTINEL_DEEPSTACK_URL",
        "SENTINEL_DEEPSTACK_PORT",
        "SENTINEL_DEEPSTACK_API_KEY",
        "SENTINEL_OD_THRESHOLD",
        "SENTINEL_FR_THRESHOLD",
        "SENTINEL_DETECT_TIMEOUT_SECS",
        "SENTINEL_OD_ENABLED",
        "SENTINEL_FR_ENABLED",
        "SENTINEL_DEDUP_ALGORITHM",
        "SENTINEL_DEDUP_THRESHOLD",
        "SENTINEL_POLICY_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "deepstack": {
            "server_url": "http://10.0.0.5",
            "server_port": 8080,
            "api_key": "secret",
            "od_threshold": 0.35,
            "fr_threshold": 0.8,
            "timeout_secs": 4,
            "fr_enabled": true
        },
        "dedup": {
            "algorithm": "difference_hash",
            "hash_size": 16,
            "threshold": 24
        },
        "topics": {
            "read_service": "cameras/snapshots",
            "snapshot_out": "alerts/objects"
        },
        "policy_path": "/etc/sentinel/policies.toml"
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTINEL_CONFIG", file.path());
    std::env::set_var("SENTINEL_DEEPSTACK_PORT", "5001");
    std::env::set_var("SENTINEL_DEDUP_ALGORITHM", "ahash");
    std::env::set_var("SENTINEL_DETECT_TIMEOUT_SECS", "7");

    let cfg = ServiceConfig::load().expect("load config");

    assert_eq!(cfg.deepstack.server_url, "http://10.0.0.5");
    assert_eq!(cfg.deepstack.server_port, 5001);
    assert_eq!(cfg.deepstack.api_key.as_deref(), Some("secret"));
    assert_eq!(cfg.deepstack.od_threshold, 0.35);
    assert_eq!(cfg.deepstack.fr_threshold, 0.8);
    assert_eq!(cfg.deepstack.timeout.as_secs(), 7);
    assert!(cfg.deepstack.od_enabled);
    assert!(cfg.deepstack.fr_enabled);
    assert_eq!(cfg.dedup.algorithm, AlgorithmKind::AverageHash);
    assert_eq!(cfg.dedup.hash_size, 16);
    assert_eq!(cfg.dedup.threshold, 24.0);
    assert_eq!(cfg.topics.read_service, "cameras/snapshots");
    assert_eq!(cfg.topics.snapshot_out, "alerts/objects");
    assert_eq!(cfg.topics.fr_service, "fr_service");
    assert_eq!(cfg.topics.policy_changed, "od_policy_changed");
    assert_eq!(
        cfg.policy_path,
        std::path::PathBuf::from("/etc/sentinel/policies.toml")
    );

    let settings = cfg.deepstack_settings();
    assert_eq!(settings.od_min_confidence, 0.35);
    assert_eq!(settings.fr_min_confidence, 0.8);

    clear_env();
}

#[test]
fn invalid_env_override_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("SENTINEL_OD_THRESHOLD", "1.5");
    assert!(ServiceConfig::load().is_err());
    clear_env();

    std::env::set_var("SENTINEL_DEDUP_ALGORITHM", "wavelet");
    assert!(ServiceConfig::load().is_err());
    clear_env();

    std::env::set_var("SENTINEL_DETECT_TIMEOUT_SECS", "0");
    assert!(ServiceConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("SENTINEL_CONFIG", "/nonexistent/sentinel.json");
    let err = ServiceConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
    clear_env();
}
