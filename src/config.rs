use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use url::Url;

use crate::dedup::{AlgorithmKind, SimilarityAlgorithm};
use crate::detect::DeepStackSettings;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1";
const DEFAULT_SERVER_PORT: u16 = 5000;
const DEFAULT_OD_THRESHOLD: f32 = 0.4;
const DEFAULT_FR_THRESHOLD: f32 = 0.7;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HASH_SIZE: u32 = 8;
const DEFAULT_DEDUP_THRESHOLD: f64 = 10.0;
const DEFAULT_POLICY_PATH: &str = "policies.toml";
const DEFAULT_READ_TOPIC: &str = "read_service";
const DEFAULT_SNAPSHOT_OUT_TOPIC: &str = "snapshot_out";
const DEFAULT_FR_TOPIC: &str = "fr_service";
const DEFAULT_POLICY_CHANGED_TOPIC: &str = "od_policy_changed";

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    deepstack: Option<DeepStackConfigFile>,
    dedup: Option<DedupConfigFile>,
    topics: Option<TopicsConfigFile>,
    policy_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DeepStackConfigFile {
    server_url: Option<String>,
    server_port: Option<u16>,
    api_key: Option<String>,
    od_threshold: Option<f32>,
    fr_threshold: Option<f32>,
    timeout_secs: Option<u64>,
    od_enabled: Option<bool>,
    fr_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DedupConfigFile {
    algorithm: Option<String>,
    hash_size: Option<u32>,
    threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct TopicsConfigFile {
    read_service: Option<String>,
    snapshot_out: Option<String>,
    fr_service: Option<String>,
    policy_changed: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub deepstack: DeepStackConfig,
    pub dedup: DedupConfig,
    pub topics: TopicConfig,
    pub policy_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DeepStackConfig {
    pub server_url: String,
    pub server_port: u16,
    pub api_key: Option<String>,
    /// Minimum confidence sent with object detection requests.
    pub od_threshold: f32,
    /// Minimum confidence for a recognized face to be published.
    pub fr_threshold: f32,
    pub timeout: Duration,
    pub od_enabled: bool,
    pub fr_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub algorithm: AlgorithmKind,
    pub hash_size: u32,
    /// Loss threshold in the algorithm's own units (differing hash bits).
    pub threshold: f64,
}

#[derive(Debug, Clone)]
pub struct TopicConfig {
    pub read_service: String,
    pub snapshot_out: String,
    pub fr_service: String,
    pub policy_changed: String,
}

impl ServiceConfig {
    /// Defaults, then the JSON file named by `SENTINEL_CONFIG`, then
    /// `SENTINEL_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Result<Self> {
        let ds = file.deepstack.unwrap_or_default();
        let deepstack = DeepStackConfig {
            server_url: ds
                .server_url
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            server_port: ds.server_port.unwrap_or(DEFAULT_SERVER_PORT),
            api_key: ds.api_key.filter(|key| !key.trim().is_empty()),
            od_threshold: ds.od_threshold.unwrap_or(DEFAULT_OD_THRESHOLD),
            fr_threshold: ds.fr_threshold.unwrap_or(DEFAULT_FR_THRESHOLD),
            timeout: Duration::from_secs(ds.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            od_enabled: ds.od_enabled.unwrap_or(true),
            fr_enabled: ds.fr_enabled.unwrap_or(false),
        };

        let dd = file.dedup.unwrap_or_default();
        let dedup = DedupConfig {
            algorithm: match dd.algorithm {
                Some(name) => name.parse()?,
                None => AlgorithmKind::default(),
            },
            hash_size: dd.hash_size.unwrap_or(DEFAULT_HASH_SIZE),
            threshold: dd.threshold.unwrap_or(DEFAULT_DEDUP_THRESHOLD),
        };

        let tp = file.topics.unwrap_or_default();
        let topics = TopicConfig {
            read_service: tp
                .read_service
                .unwrap_or_else(|| DEFAULT_READ_TOPIC.to_string()),
            snapshot_out: tp
                .snapshot_out
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_OUT_TOPIC.to_string()),
            fr_service: tp
                .fr_service
                .unwrap_or_else(|| DEFAULT_FR_TOPIC.to_string()),
            policy_changed: tp
                .policy_changed
                .unwrap_or_else(|| DEFAULT_POLICY_CHANGED_TOPIC.to_string()),
        };

        Ok(Self {
            deepstack,
            dedup,
            topics,
            policy_path: file
                .policy_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_POLICY_PATH)),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_nonempty("SENTINEL_DEEPSTACK_URL") {
            self.deepstack.server_url = url;
        }
        if let Some(port) = env_nonempty("SENTINEL_DEEPSTACK_PORT") {
            self.deepstack.server_port = port
                .parse()
                .map_err(|_| anyhow!("SENTINEL_DEEPSTACK_PORT must be a port number"))?;
        }
        if let Some(key) = env_nonempty("SENTINEL_DEEPSTACK_API_KEY") {
            self.deepstack.api_key = Some(key);
        }
        if let Some(threshold) = env_nonempty("SENTINEL_OD_THRESHOLD") {
            self.deepstack.od_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("SENTINEL_OD_THRESHOLD must be a number"))?;
        }
        if let Some(threshold) = env_nonempty("SENTINEL_FR_THRESHOLD") {
            self.deepstack.fr_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("SENTINEL_FR_THRESHOLD must be a number"))?;
        }
        if let Some(secs) = env_nonempty("SENTINEL_DETECT_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("SENTINEL_DETECT_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.deepstack.timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = env_nonempty("SENTINEL_OD_ENABLED") {
            self.deepstack.od_enabled = parse_bool("SENTINEL_OD_ENABLED", &flag)?;
        }
        if let Some(flag) = env_nonempty("SENTINEL_FR_ENABLED") {
            self.deepstack.fr_enabled = parse_bool("SENTINEL_FR_ENABLED", &flag)?;
        }
        if let Some(algorithm) = env_nonempty("SENTINEL_DEDUP_ALGORITHM") {
            self.dedup.algorithm = algorithm.parse()?;
        }
        if let Some(threshold) = env_nonempty("SENTINEL_DEDUP_THRESHOLD") {
            self.dedup.threshold = threshold
                .parse()
                .map_err(|_| anyhow!("SENTINEL_DEDUP_THRESHOLD must be a number"))?;
        }
        if let Some(path) = env_nonempty("SENTINEL_POLICY_PATH") {
            self.policy_path = PathBuf::from(path);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.deepstack.server_url).map_err(|e| {
            anyhow!(
                "deepstack server_url '{}' is not a valid URL: {}",
                self.deepstack.server_url,
                e
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("deepstack server_url must use http or https"));
        }
        for (name, value) in [
            ("od_threshold", self.deepstack.od_threshold),
            ("fr_threshold", self.deepstack.fr_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.deepstack.timeout.is_zero() {
            return Err(anyhow!("detection timeout must be greater than zero"));
        }
        // surfaces hash size and threshold range errors at start-up
        self.dedup.build_algorithm()?;
        for (name, topic) in [
            ("read_service", &self.topics.read_service),
            ("snapshot_out", &self.topics.snapshot_out),
            ("fr_service", &self.topics.fr_service),
            ("policy_changed", &self.topics.policy_changed),
        ] {
            if topic.trim().is_empty() {
                return Err(anyhow!("topic {} must not be empty", name));
            }
        }
        Ok(())
    }

    pub fn deepstack_settings(&self) -> DeepStackSettings {
        DeepStackSettings {
            server_url: self.deepstack.server_url.clone(),
            server_port: self.deepstack.server_port,
            api_key: self.deepstack.api_key.clone(),
            od_min_confidence: self.deepstack.od_threshold,
            fr_min_confidence: self.deepstack.fr_threshold,
            timeout: self.deepstack.timeout,
        }
    }
}

impl DedupConfig {
    pub fn build_algorithm(&self) -> Result<Box<dyn SimilarityAlgorithm>> {
        self.algorithm.build(self.hash_size, self.threshold)
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{} must be a boolean, got '{}'", key, other)),
    }
}
