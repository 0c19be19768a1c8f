use std::time::Duration;

use rumqttc::{
    v5::{mqttbytes::v5::ConnectProperties, MqttOptions as RuMqttOptions},
    TlsConfiguration, Transport,
};
use serde::Deserialize;
use spbridge_types::utils::duration_ms;

/// PEM encoded material for a TLS connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TlsOptions {
    pub ca: Vec<u8>,
    /// Client certificate and key for mutual TLS.
    #[serde(default)]
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
    #[serde(default)]
    pub alpn: Option<Vec<Vec<u8>>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Connection options for the broker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MqttOptions {
    pub broker_addr: String,
    pub port: u16,
    pub client_id: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub tls: Option<TlsOptions>,
    #[serde(default = "default_keep_alive", with = "duration_ms")]
    pub keep_alive: Duration,
    #[serde(default)]
    pub max_packet_size: Option<u32>,
    #[serde(default)]
    pub receive_maximum: Option<u16>,
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
}

impl MqttOptions {
    pub fn new<S: Into<String>, S1: Into<String>>(client_id: S, addr: S1, port: u16) -> Self {
        Self {
            broker_addr: addr.into(),
            port,
            client_id: client_id.into(),
            credentials: None,
            tls: None,
            keep_alive: default_keep_alive(),
            max_packet_size: None,
            receive_maximum: None,
        }
    }

    pub fn with_credentials<S: Into<String>, S1: Into<String>>(
        mut self,
        username: S,
        password: S1,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Build the rumqttc options. Clean start and a zero session expiry are always set.
    pub(crate) fn into_rumqtt(self) -> RuMqttOptions {
        let mut options = RuMqttOptions::new(self.client_id, self.broker_addr, self.port);
        options.set_keep_alive(self.keep_alive);
        if let Some(credentials) = self.credentials {
            options.set_credentials(credentials.username, credentials.password);
        }
        if let Some(tls) = self.tls {
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca: tls.ca,
                alpn: tls.alpn,
                client_auth: tls.client_auth,
            }));
        }

        let mut connect_properties = ConnectProperties::new();
        /* Sparkplug requires session expiry interval to be 0 */
        connect_properties.session_expiry_interval = Some(0);
        connect_properties.max_packet_size = self.max_packet_size;
        connect_properties.receive_maximum = self.receive_maximum;
        options
            .set_clean_start(true)
            .set_connect_properties(connect_properties);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_with_defaults() {
        let options: MqttOptions = serde_json::from_str(
            r#"{"broker_addr": "localhost", "port": 1883, "client_id": "bridge-1"}"#,
        )
        .unwrap();
        assert_eq!(options, MqttOptions::new("bridge-1", "localhost", 1883));
        assert_eq!(options.keep_alive, Duration::from_secs(30));
    }

    #[test]
    fn rumqtt_options_force_clean_session() {
        let options = MqttOptions::new("bridge-1", "localhost", 1883)
            .with_credentials("user", "pass")
            .into_rumqtt();
        assert!(options.clean_start());
        assert_eq!(
            options
                .connect_properties()
                .and_then(|p| p.session_expiry_interval),
            Some(0)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }
}
