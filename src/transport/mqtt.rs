//! MQTT bus: publisher and the long-lived subscriber loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, Incoming, MqttOptions};

use super::endpoint::{build_transport, MqttEndpoint, TlsMaterials};
use crate::adapter::{BusFrame, EventPublisher, EventRouter};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub endpoint: MqttEndpoint,
    pub tls: TlsMaterials,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub fn connect_mqtt(settings: &MqttSettings) -> Result<(Client, Connection)> {
    let endpoint = &settings.endpoint;
    let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
    options.set_keep_alive(Duration::from_secs(60));
    options.set_clean_start(true);
    if let Some(user) = settings.username.as_deref() {
        options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
    }
    options.set_transport(build_transport(endpoint, &settings.tls)?);

    let (client, connection) = Client::new(options, 10);
    log::info!(
        "Connected to MQTT broker {}:{} (TLS: {}, auth: {})",
        endpoint.host,
        endpoint.port,
        endpoint.use_tls,
        settings.username.is_some()
    );
    Ok((client, connection))
}

/// Convert a rumqttc notification into a bus frame.
pub fn frame_from_event(event: &Event) -> BusFrame {
    match event {
        Event::Incoming(Incoming::Publish(publish)) => BusFrame::Message {
            topic: String::from_utf8_lossy(&publish.topic).into_owned(),
            payload: publish.payload.to_vec(),
        },
        _ => BusFrame::Control,
    }
}

/// Publishes through whichever client the subscriber loop currently holds.
#[derive(Default)]
pub struct MqttPublisher {
    client: RwLock<Option<Client>>,
}

impl MqttPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, client: Client) {
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
    }

    fn detach(&self) -> Option<Client> {
        self.client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl EventPublisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let client = self
            .client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| anyhow!("not connected to the MQTT broker"))?;
        client.publish(topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

/// Subscriber loop that survives broker restarts.
pub struct MqttBus {
    settings: MqttSettings,
    publisher: Arc<MqttPublisher>,
    running: AtomicBool,
}

impl MqttBus {
    pub fn new(settings: MqttSettings) -> Self {
        Self {
            settings,
            publisher: Arc::new(MqttPublisher::new()),
            running: AtomicBool::new(true),
        }
    }

    pub fn publisher(&self) -> Arc<MqttPublisher> {
        Arc::clone(&self.publisher)
    }

    /// Ask the loop to exit and drop the broker connection.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(client) = self.publisher.detach() {
            if let Err(e) = client.disconnect() {
                log::debug!("MQTT disconnect failed: {}", e);
            }
        }
    }

    /// Read the bus until [`MqttBus::stop`] is called, routing every frame.
    ///
    /// Connection errors are logged and followed by a reconnect after a fixed
    /// delay.
    pub fn run(&self, router: &EventRouter) -> Result<()> {
        while self.running.load(Ordering::SeqCst) {
            let (client, mut connection) = connect_mqtt(&self.settings)?;
            for topic in router.topics() {
                client.subscribe(topic, QoS::AtMostOnce)?;
                log::info!("Subscribed to {}", topic);
            }
            self.publisher.attach(client);

            for notification in connection.iter() {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                match notification {
                    Ok(event) => {
                        // workers are detached; the loop never waits on them
                        drop(router.route(&frame_from_event(&event)));
                    }
                    Err(e) => {
                        log::error!("MQTT connection error: {}. Reconnecting...", e);
                        break;
                    }
                }
            }

            self.publisher.detach();
            if self.running.load(Ordering::SeqCst) {
                std::thread::sleep(RECONNECT_DELAY);
            }
        }
        log::info!("MQTT subscriber stopped");
        Ok(())
    }
}
