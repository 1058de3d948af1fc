//! Node configuration
//!
//! Defaults, then an optional TOML file, then environment overrides
//! (`CERTFLIGHT_FLIGHT_SIZE`, `CERTFLIGHT_PEER`, `CERTFLIGHT_COOLDOWN_SECS`,
//! `CERTFLIGHT_LOSS_RATE`). Command-line flags are applied last by the
//! binary, which validates the merged result once.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::contracts::{Role, RoutingSummary};
use crate::errors::{FlightError, Result};
use crate::instrumentation::EnergyModel;
use crate::transmitter::TransmitterBuilder;

/// Fixed routing summary for hosts without a mesh routing layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    pub parent_address: [u8; 2],
    pub parent_link_cost: u16,
    pub rank_metric: u16,
    pub neighbor_count: u16,
    pub beacon_interval: u16,
}

impl From<RoutingConfig> for RoutingSummary {
    fn from(c: RoutingConfig) -> Self {
        Self {
            parent_address: c.parent_address,
            parent_link_cost: c.parent_link_cost,
            rank_metric: c.rank_metric,
            neighbor_count: c.neighbor_count,
            beacon_interval: c.beacon_interval,
        }
    }
}

/// Everything a node needs besides its role
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Exchanges per flight
    pub flight_size: u32,
    /// Filler payload length of each report
    pub filler_len: usize,
    pub fill_byte: u8,
    /// Initiator pause after the last exchange of a flight
    pub cooldown_secs: u64,
    /// Buffer size touched by one simulated hash pass
    pub hash_buffer_len: usize,
    /// Loop bound of the simulated key generation
    pub keygen_bound: u64,
    pub client_port: u16,
    pub server_port: u16,
    /// Initiator's sink address; defaults to the IPv6 loopback on `server_port`
    pub peer: Option<SocketAddr>,
    /// Wait before the driver resends a datagram the link dropped
    pub retransmit_timeout_ms: u64,
    /// Probability of dropping an outbound datagram, in [0, 1]
    pub loss_rate: f64,
    pub routing: Option<RoutingConfig>,
    pub energy: EnergyModel,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            flight_size: crate::FLIGHT_SIZE,
            filler_len: crate::FILLER_LEN,
            fill_byte: crate::FILL_BYTE,
            cooldown_secs: crate::COOLDOWN_SECS,
            hash_buffer_len: crate::HASH_BUFFER_LEN,
            keygen_bound: crate::KEYGEN_BOUND,
            client_port: crate::UDP_CLIENT_PORT,
            server_port: crate::UDP_SERVER_PORT,
            peer: None,
            retransmit_timeout_ms: 2_000,
            loss_rate: 0.0,
            routing: None,
            energy: EnergyModel::default(),
        }
    }
}

impl NodeConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FlightError::InvalidConfig(e.to_string()))
    }

    /// Defaults, then `path` if given, then the process environment
    ///
    /// The result is not validated; callers merge any remaining overrides
    /// first and then call [`NodeConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_toml_str(&std::fs::read_to_string(p)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `CERTFLIGHT_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(s) = lookup("CERTFLIGHT_FLIGHT_SIZE") {
            self.flight_size = parse_var("CERTFLIGHT_FLIGHT_SIZE", &s)?;
        }
        if let Some(s) = lookup("CERTFLIGHT_PEER") {
            self.peer = Some(parse_var("CERTFLIGHT_PEER", &s)?);
        }
        if let Some(s) = lookup("CERTFLIGHT_COOLDOWN_SECS") {
            self.cooldown_secs = parse_var("CERTFLIGHT_COOLDOWN_SECS", &s)?;
        }
        if let Some(s) = lookup("CERTFLIGHT_LOSS_RATE") {
            self.loss_rate = parse_var("CERTFLIGHT_LOSS_RATE", &s)?;
        }
        Ok(())
    }

    /// Reject values no node can run with
    pub fn validate(&self) -> Result<()> {
        if self.flight_size < 2 {
            return Err(FlightError::InvalidFlightSize(self.flight_size));
        }
        if self.filler_len == 0 {
            return Err(FlightError::InvalidConfig("filler_len must be positive".into()));
        }
        // the encoded report, not just the filler, has to fit a datagram
        TransmitterBuilder::new()
            .with_filler_len(self.filler_len)
            .with_fill_byte(self.fill_byte)
            .build()?;
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(FlightError::InvalidConfig(format!(
                "loss_rate {} outside [0, 1]",
                self.loss_rate
            )));
        }
        if self.retransmit_timeout_ms == 0 {
            return Err(FlightError::InvalidConfig(
                "retransmit_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.retransmit_timeout_ms)
    }

    /// Local address a node of `role` binds to
    pub fn local_addr(&self, role: Role) -> SocketAddr {
        let port = match role {
            Role::Initiator => self.client_port,
            Role::Responder => self.server_port,
        };
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)
    }

    /// Peer a node of `role` starts with; responders learn theirs
    pub fn initial_peer(&self, role: Role) -> Option<SocketAddr> {
        match role {
            Role::Initiator => Some(self.peer.unwrap_or_else(|| {
                SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), self.server_port)
            })),
            Role::Responder => self.peer,
        }
    }

    pub fn routing_summary(&self) -> Option<RoutingSummary> {
        self.routing.map(RoutingSummary::from)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| FlightError::InvalidConfig(format!("{key}={value}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flight_size, 18);
        assert_eq!(config.cooldown(), Duration::from_secs(120));
        assert_eq!(config.local_addr(Role::Initiator).port(), 8775);
        assert_eq!(config.local_addr(Role::Responder).port(), 5688);
    }

    #[test]
    fn test_partial_toml() {
        let config = NodeConfig::from_toml_str(
            r#"
            flight_size = 6
            peer = "[fd00::1]:5688"

            [energy]
            transmit_current = 20

            [routing]
            rank_metric = 256
            neighbor_count = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.flight_size, 6);
        assert_eq!(config.peer, Some("[fd00::1]:5688".parse().unwrap()));
        assert_eq!(config.energy.transmit_current, 20);
        assert_eq!(config.energy.cpu_current, 2);
        assert_eq!(config.filler_len, 128);

        let routing = config.routing_summary().unwrap();
        assert_eq!(routing.rank_metric, 256);
        assert_eq!(routing.parent_link_cost, 0);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result = NodeConfig::from_toml_str("flight_sise = 6");
        assert!(matches!(result, Err(FlightError::InvalidConfig(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CERTFLIGHT_FLIGHT_SIZE", "4"),
            ("CERTFLIGHT_LOSS_RATE", "0.25"),
            ("CERTFLIGHT_PEER", "127.0.0.1:9000"),
        ]
        .into_iter()
        .collect();

        let mut config = NodeConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.flight_size, 4);
        assert_eq!(config.loss_rate, 0.25);
        assert_eq!(config.cooldown_secs, 120);
        assert_eq!(config.initial_peer(Role::Initiator), Some("127.0.0.1:9000".parse().unwrap()));
    }

    #[test]
    fn test_bad_override_reported() {
        let mut config = NodeConfig::default();
        let result = config.apply_overrides(|k| {
            (k == "CERTFLIGHT_FLIGHT_SIZE").then(|| "eighteen".to_string())
        });
        assert!(matches!(result, Err(FlightError::InvalidConfig(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = NodeConfig { flight_size: 1, ..NodeConfig::default() };
        assert!(matches!(config.validate(), Err(FlightError::InvalidFlightSize(1))));

        config.flight_size = 18;
        config.loss_rate = 1.5;
        assert!(config.validate().is_err());

        config.loss_rate = 0.1;
        config.filler_len = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filler_checked_against_encoded_size() {
        let config = NodeConfig { filler_len: 1020, ..NodeConfig::default() };
        assert!(matches!(
            config.validate(),
            Err(FlightError::DatagramTooLarge { limit: 1024, .. })
        ));

        let config = NodeConfig { filler_len: 512, ..NodeConfig::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_initial_peer_by_role() {
        let config = NodeConfig::default();
        assert_eq!(
            config.initial_peer(Role::Initiator),
            Some("[::1]:5688".parse().unwrap())
        );
        assert_eq!(config.initial_peer(Role::Responder), None);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("certflight-{}.toml", std::process::id()));
        std::fs::write(&path, "flight_size = 5\ncooldown_secs = 0\n").unwrap();

        let config = NodeConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.flight_size, 5);
        assert_eq!(config.cooldown_secs, 0);
    }

    #[test]
    fn test_load_leaves_validation_to_caller() {
        let path = std::env::temp_dir().join(format!("certflight-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "flight_size = 1
").unwrap();

        let mut config = NodeConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(config.validate().is_err());

        // a later command-line override repairs it
        config.flight_size = 4;
        assert!(config.validate().is_ok());
    }
}
