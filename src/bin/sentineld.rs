//! sentineld - object detection sentinel daemon
//!
//! This daemon:
//! 1. Loads service configuration and camera policies
//! 2. Connects to the MQTT broker and subscribes to the snapshot topic
//! 3. Runs every snapshot through detection, policy filtering and repeat
//!    suppression on its own worker thread
//! 4. Publishes surviving detections (and recognized faces, when enabled)
//! 5. Reloads camera policies whenever the policy-changed topic fires

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use od_sentinel::config::ServiceConfig;
use od_sentinel::transport::{
    parse_mqtt_endpoint, validate_loopback_addr, MqttBus, MqttSettings, TlsMaterials,
};
use od_sentinel::{
    DedupCache, DeepStackClient, EventPublisher, EventRouter, FaceHandler, FilterPipeline,
    PolicyStore, SnapshotHandler,
};

const DAEMON_NAME: &str = "sentineld";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Filter and deduplicate object detections from a camera snapshot stream"
)]
struct Args {
    /// MQTT broker address.
    /// By default, only loopback addresses are allowed.
    #[arg(long, env = "MQTT_BROKER_ADDR", default_value = "127.0.0.1:1883")]
    mqtt_broker_addr: String,

    /// Allow non-loopback MQTT connections.
    #[arg(long, env = "ALLOW_REMOTE_MQTT")]
    allow_remote_mqtt: bool,

    #[arg(long, env = "MQTT_USERNAME")]
    mqtt_username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD")]
    mqtt_password: Option<String>,

    /// Enable TLS for MQTT (implied by mqtts:// addresses).
    #[arg(long, env = "MQTT_USE_TLS")]
    mqtt_use_tls: bool,

    /// CA bundle for the broker; system roots are used when omitted.
    #[arg(long, env = "MQTT_TLS_CA_PATH")]
    mqtt_tls_ca_path: Option<PathBuf>,

    #[arg(long, env = "MQTT_TLS_CLIENT_CERT_PATH")]
    mqtt_tls_client_cert_path: Option<PathBuf>,

    #[arg(long, env = "MQTT_TLS_CLIENT_KEY_PATH")]
    mqtt_tls_client_key_path: Option<PathBuf>,

    #[arg(long, env = "MQTT_CLIENT_ID", default_value = DAEMON_NAME)]
    mqtt_client_id: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = ServiceConfig::load()?;

    let endpoint = parse_mqtt_endpoint(&args.mqtt_broker_addr, args.mqtt_use_tls)?;
    if !args.allow_remote_mqtt {
        validate_loopback_addr(&endpoint, &args.mqtt_broker_addr)?;
    } else {
        log::warn!("Remote MQTT enabled - ensure broker is in a trusted network");
    }
    let tls = TlsMaterials::load(
        args.mqtt_tls_ca_path.as_deref(),
        args.mqtt_tls_client_cert_path.as_deref(),
        args.mqtt_tls_client_key_path.as_deref(),
    )?;

    if !cfg.deepstack.od_enabled && !cfg.deepstack.fr_enabled {
        return Err(anyhow!(
            "both object detection and face recognition are disabled; nothing to do"
        ));
    }

    let policies = Arc::new(PolicyStore::load(&cfg.policy_path)?);
    let deepstack = Arc::new(DeepStackClient::new(&cfg.deepstack_settings())?);
    let bus = Arc::new(MqttBus::new(MqttSettings {
        endpoint: endpoint.clone(),
        tls,
        client_id: args.mqtt_client_id.clone(),
        username: args.mqtt_username.clone(),
        password: args.mqtt_password.clone(),
    }));
    let publisher: Arc<dyn EventPublisher> = bus.publisher();

    let mut router = EventRouter::new(
        &cfg.topics.read_service,
        &cfg.topics.policy_changed,
        Arc::clone(&policies),
    );
    if cfg.deepstack.od_enabled {
        let algorithm = cfg.dedup.build_algorithm()?;
        let pipeline = Arc::new(FilterPipeline::new(
            Arc::clone(&policies),
            DedupCache::new(algorithm),
        ));
        router = router.with_handler(Arc::new(SnapshotHandler::new(
            deepstack.clone(),
            pipeline,
            Arc::clone(&publisher),
            &cfg.topics.snapshot_out,
        )));
    }
    if cfg.deepstack.fr_enabled {
        router = router.with_handler(Arc::new(FaceHandler::new(
            deepstack.clone(),
            Arc::clone(&publisher),
            &cfg.topics.fr_service,
            cfg.deepstack.fr_threshold,
        )));
    }

    log::info!("{} starting", DAEMON_NAME);
    log::info!(
        "  MQTT broker: {}:{} (TLS: {})",
        endpoint.host,
        endpoint.port,
        endpoint.use_tls
    );
    log::info!(
        "  Inference service: {}:{} (timeout {}s)",
        cfg.deepstack.server_url,
        cfg.deepstack.server_port,
        cfg.deepstack.timeout.as_secs()
    );
    log::info!(
        "  Policies: {} cameras from {}",
        policies.len(),
        cfg.policy_path.display()
    );
    log::info!(
        "  Dedup: {} (hash size {}, threshold {})",
        cfg.dedup.algorithm,
        cfg.dedup.hash_size,
        cfg.dedup.threshold
    );
    log::info!("  Handlers: {}", router.handler_names().join(", "));
    log::warn!(
        "every snapshot is handled on its own thread with no queue limit; \
         a snapshot burst spawns a matching burst of threads"
    );

    let (tx, rx) = mpsc::channel();
    let subscriber_done = tx.clone();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let subscriber_bus = Arc::clone(&bus);
    std::thread::Builder::new()
        .name("mqtt-subscriber".to_string())
        .spawn(move || {
            if let Err(e) = subscriber_bus.run(&router) {
                log::error!("MQTT subscriber exited: {:#}", e);
            }
            let _ = subscriber_done.send(());
        })?;

    log::info!("{} waiting for shutdown signal (Ctrl-C)...", DAEMON_NAME);
    let _ = rx.recv();
    log::info!("shutting down");
    bus.stop();
    Ok(())
}
