use anyhow::{anyhow, bail, Context, Result};
use log::info;
use rumqttc::{Client, Event, MqttOptions, Outgoing, QoS};
use std::time::Duration;

use crate::config::Config;
use crate::model::EnergyBill;

/// Broker settings, present only when `--mqtt-host` was given.
pub struct MqttTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub topic: &'a str,
}

impl<'a> MqttTarget<'a> {
    pub fn from_config(config: &'a Config) -> Option<Self> {
        config.mqtt_host.as_deref().map(|host| Self {
            host,
            port: config.mqtt_port,
            client_id: config.mqtt_client_id.as_str(),
            topic: config.mqtt_topic.as_str(),
        })
    }

    fn options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(self.client_id, self.host, self.port);
        opts.set_keep_alive(Duration::from_secs(60));
        opts
    }
}

/// Publish a saved bill as JSON on the target topic. QoS 0, so success only
/// means the packet left this process.
pub fn publish_bill(target: &MqttTarget<'_>, bill: &EnergyBill) -> Result<()> {
    let payload = serde_json::to_vec(bill).context("Failed to serialize bill to JSON")?;

    let (client, mut connection) = Client::new(target.options(), 10);
    client
        .publish(target.topic, QoS::AtMostOnce, false, payload)
        .with_context(|| format!("Failed to queue {} for {}", bill.id, target.topic))?;

    // Nothing is sent until the event loop runs; stop at the first outgoing publish.
    let sent = connection.iter().find_map(|event| match event {
        Ok(Event::Outgoing(Outgoing::Publish(_))) => Some(Ok(true)),
        Ok(Event::Outgoing(Outgoing::Disconnect)) => Some(Ok(false)),
        Ok(_) => None,
        Err(e) => Some(Err(e)),
    });
    client.disconnect().ok();

    match sent {
        Some(Ok(true)) => {
            info!(
                "Published {} to {} on {}:{}",
                bill.id, target.topic, target.host, target.port
            );
            Ok(())
        }
        Some(Err(e)) => Err(anyhow!("MQTT connection to {}:{} failed: {}", target.host, target.port, e)),
        _ => bail!("MQTT connection closed before {} was sent", bill.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn no_target_without_host() {
        let config = Config::try_parse_from(["energysplit", "groups"]).unwrap();
        assert!(MqttTarget::from_config(&config).is_none());
    }

    #[test]
    fn target_uses_configured_broker() {
        let config = Config::try_parse_from([
            "energysplit",
            "--mqtt-host",
            "broker.local",
            "--mqtt-topic",
            "home/energy",
            "groups",
        ])
        .unwrap();
        let target = MqttTarget::from_config(&config).unwrap();
        assert_eq!(target.host, "broker.local");
        assert_eq!(target.port, 1883);
        assert_eq!(target.client_id, "energysplit");
        assert_eq!(target.topic, "home/energy");

        let opts = target.options();
        assert_eq!(opts.broker_address(), ("broker.local".to_string(), 1883));
        assert_eq!(opts.client_id(), "energysplit");
        assert_eq!(opts.keep_alive(), Duration::from_secs(60));
    }
}
