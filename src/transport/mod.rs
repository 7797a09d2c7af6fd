//! MQTT transport for the snapshot stream.

mod endpoint;
mod mqtt;

pub use endpoint::{
    build_transport, parse_mqtt_endpoint, validate_loopback_addr, MqttEndpoint, TlsMaterials,
};
pub use mqtt::{connect_mqtt, frame_from_event, MqttBus, MqttPublisher, MqttSettings};
