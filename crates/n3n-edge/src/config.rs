// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Edge and community configuration.
//!
//! Loading this from a config file or CLI flags is out of scope (see the
//! crate's top-level docs); what lives here is the validated, in-memory
//! shape the rest of the crate consumes.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::EdgeError;
use crate::mac::Mac;
use crate::tap::AddressMode;
use crate::transform::TransformId;

/// Default management listener port.
pub const DEFAULT_MGMT_PORT: u16 = 5644;
/// Default interval between REGISTER/REGISTER_SUPER emissions.
pub const DEFAULT_REGISTER_INTERVAL: Duration = Duration::from_secs(20);
/// Default TTL placed on REGISTER_SUPER.
pub const DEFAULT_REGISTER_TTL: u8 = 20;
/// Maximum length of a community name on the wire, see `codec::COMMUNITY_SIZE`.
pub const COMMUNITY_NAME_MAX: usize = 20;

/// A supernode configured by the operator, by host:port string.
#[derive(Clone, Debug)]
pub struct SupernodeAddr {
    pub host: String,
    pub port: u16,
}

impl SupernodeAddr {
    /// Parse a `"host:port"` string, e.g. `"sn.example.com:7654"`.
    pub fn parse(s: &str) -> Result<Self, EdgeError> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EdgeError::ConfigInvalid(format!("supernode '{s}' missing ':port'")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| EdgeError::ConfigInvalid(format!("supernode '{s}' has invalid port")))?;
        if host.is_empty() {
            return Err(EdgeError::ConfigInvalid(format!("supernode '{s}' missing host")));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// Everything scoping one overlay community.
#[derive(Clone, Debug)]
pub struct Community {
    pub name: String,
    pub allow_p2p: bool,
    pub allow_routing: bool,
    pub encrypt_key: Option<String>,
    pub transop_id: TransformId,
    pub tuntap_ip_mode: AddressMode,
    pub mgmt_port: u16,
    pub register_interval: Duration,
    pub register_ttl: u8,
    pub tos: u8,
    pub drop_multicast: bool,
    pub disable_pmtu_discovery: bool,
    pub tap_ip: Ipv4Addr,
    pub tap_netmask: Ipv4Addr,
    pub tap_mac: Mac,
    pub mtu: u16,
}

impl Community {
    pub fn validate(&self) -> Result<(), EdgeError> {
        if self.name.is_empty() {
            return Err(EdgeError::ConfigInvalid("community_name must not be empty".into()));
        }
        if self.name.len() > COMMUNITY_NAME_MAX {
            return Err(EdgeError::ConfigInvalid(format!(
                "community_name '{}' exceeds {COMMUNITY_NAME_MAX} bytes",
                self.name
            )));
        }
        if self.mtu == 0 {
            return Err(EdgeError::ConfigInvalid("mtu must be nonzero".into()));
        }
        Ok(())
    }
}

/// Optional Unix-domain socket the management plane also listens on,
/// alongside its always-present TCP listener. Gated at the call site by the
/// `mgmt-unix-socket` feature.
#[derive(Clone, Debug)]
pub struct MgmtUnixSocket {
    pub path: PathBuf,
    pub mode: u32,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Top-level edge runtime configuration.
#[derive(Clone, Debug)]
pub struct EdgeConfig {
    pub community: Community,
    pub bind_address: IpAddr,
    pub bind_port: u16,
    pub supernodes: Vec<SupernodeAddr>,
    pub mgmt_unix_socket: Option<MgmtUnixSocket>,
}

impl EdgeConfig {
    pub fn validate(&self) -> Result<(), EdgeError> {
        self.community.validate()?;
        if self.supernodes.is_empty() {
            return Err(EdgeError::ConfigInvalid("at least one supernode is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_community() -> Community {
        Community {
            name: "mycommunity".to_string(),
            allow_p2p: true,
            allow_routing: true,
            encrypt_key: None,
            transop_id: TransformId::NULL,
            tuntap_ip_mode: AddressMode::Static,
            mgmt_port: DEFAULT_MGMT_PORT,
            register_interval: DEFAULT_REGISTER_INTERVAL,
            register_ttl: DEFAULT_REGISTER_TTL,
            tos: 0,
            drop_multicast: false,
            disable_pmtu_discovery: false,
            tap_ip: Ipv4Addr::new(10, 0, 0, 1),
            tap_netmask: Ipv4Addr::new(255, 255, 255, 0),
            tap_mac: Mac::NULL,
            mtu: 1400,
        }
    }

    #[test]
    fn parses_host_port() {
        let sn = SupernodeAddr::parse("sn.example.com:7654").unwrap();
        assert_eq!(sn.host, "sn.example.com");
        assert_eq!(sn.port, 7654);
    }

    #[test]
    fn rejects_missing_port() {
        assert!(SupernodeAddr::parse("sn.example.com").is_err());
    }

    #[test]
    fn rejects_community_name_over_20_bytes() {
        let mut community = sample_community();
        community.name = "a".repeat(21);
        assert!(matches!(community.validate(), Err(EdgeError::ConfigInvalid(_))));
    }

    #[test]
    fn rejects_config_with_no_supernodes() {
        let config = EdgeConfig {
            community: sample_community(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 0,
            supernodes: vec![],
            mgmt_unix_socket: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        let config = EdgeConfig {
            community: sample_community(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 0,
            supernodes: vec![SupernodeAddr::parse("sn.example.com:7654").unwrap()],
            mgmt_unix_socket: None,
        };
        assert!(config.validate().is_ok());
    }
}
