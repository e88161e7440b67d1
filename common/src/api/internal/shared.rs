// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Network descriptors shared between rack setup and the sled agents.

use crate::api::external::{self, Name, Vni};
use oxnet::{IpNet, Ipv4Net};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use uuid::Uuid;

/// The type of network interface
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Deserialize,
    Serialize,
    JsonSchema,
    Hash,
)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkInterfaceKind {
    /// A vNIC attached to a guest instance
    Instance { id: Uuid },
    /// A vNIC associated with an internal service
    Service { id: Uuid },
    /// A vNIC associated with a probe
    Probe { id: Uuid },
}

/// Information required to construct a virtual network interface
#[derive(
    Clone,
    Debug,
    Deserialize,
    Serialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub struct NetworkInterface {
    pub id: Uuid,
    pub kind: NetworkInterfaceKind,
    pub name: Name,
    pub ip: IpAddr,
    pub mac: external::MacAddr,
    pub subnet: IpNet,
    pub vni: Vni,
    pub primary: bool,
    pub slot: u8,
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum NetworkInterfaceError {
    #[error("interface {name}: IP {ip} is not within subnet {subnet}")]
    IpNotInSubnet { name: Name, ip: IpAddr, subnet: IpNet },
}

impl NetworkInterface {
    /// Checks that the interface's address lies within its own subnet.
    pub fn validate(&self) -> Result<(), NetworkInterfaceError> {
        let in_subnet = match (self.subnet, self.ip) {
            (IpNet::V4(net), IpAddr::V4(ip)) => net.contains(ip),
            (IpNet::V6(net), IpAddr::V6(ip)) => net.contains(ip),
            (IpNet::V4(_), IpAddr::V6(_)) | (IpNet::V6(_), IpAddr::V4(_)) => {
                false
            }
        };
        if !in_subnet {
            return Err(NetworkInterfaceError::IpNotInSubnet {
                name: self.name.clone(),
                ip: self.ip,
                subnet: self.subnet,
            });
        }
        Ok(())
    }
}

/// An IP address and port range used for source NAT, i.e., making
/// outbound network connections from guests or services.
// Note that `Deserialize` is manually implemented; if you make any changes to
// the fields of this structure, you must make them to that implementation too.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub struct SourceNatConfig {
    /// The external address provided to the instance or service.
    pub ip: IpAddr,
    /// The first port used for source NAT, inclusive.
    first_port: u16,
    /// The last port used for source NAT, also inclusive.
    last_port: u16,
}

// We implement `Deserialize` manually to add validity checking on the port
// range.
impl<'de> Deserialize<'de> for SourceNatConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        // The fields of `SourceNatConfigShadow` should exactly match the fields
        // of `SourceNatConfig`. We're not really using serde's remote derive,
        // but by adding the attribute we get compile-time checking that all the
        // field names and types match. (It doesn't check the _order_, but that
        // should be fine as long as we're using JSON or similar formats.)
        #[derive(Deserialize)]
        #[serde(remote = "SourceNatConfig")]
        struct SourceNatConfigShadow {
            ip: IpAddr,
            first_port: u16,
            last_port: u16,
        }

        let shadow = SourceNatConfigShadow::deserialize(deserializer)?;
        SourceNatConfig::new(shadow.ip, shadow.first_port, shadow.last_port)
            .map_err(D::Error::custom)
    }
}

impl SourceNatConfig {
    /// Construct a `SourceNatConfig` with the given port range, both inclusive.
    ///
    /// # Errors
    ///
    /// Fails if `first_port` is greater than `last_port`.
    pub fn new(
        ip: IpAddr,
        first_port: u16,
        last_port: u16,
    ) -> Result<Self, SourceNatConfigError> {
        if first_port <= last_port {
            Ok(Self { ip, first_port, last_port })
        } else {
            Err(SourceNatConfigError::InvertedPortRange {
                first_port,
                last_port,
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceNatConfigError {
    #[error(
        "snat port range is decreasing: ({first_port}, {last_port})"
    )]
    InvertedPortRange { first_port: u16, last_port: u16 },
}

impl From<SourceNatConfigError> for external::Error {
    fn from(err: SourceNatConfigError) -> Self {
        external::Error::invalid_value("snat_cfg", err)
    }
}

/// Initial network configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub struct RackNetworkConfig {
    /// First ip address to be used for configuring network infrastructure
    pub infra_ip_first: Ipv4Addr,
    /// Last ip address to be used for configuring network infrastructure
    pub infra_ip_last: Ipv4Addr,
    /// Uplinks for connecting the rack to external networks
    pub uplinks: Vec<UplinkConfig>,
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum RackNetworkConfigError {
    #[error(
        "infrastructure IP range is decreasing: {first} is greater than \
         {last}"
    )]
    InvertedInfraRange { first: Ipv4Addr, last: Ipv4Addr },

    #[error(
        "uplink {switch}/{port}: address {addr} is outside the \
         infrastructure IP range {first} - {last}"
    )]
    UplinkAddressNotInInfraRange {
        switch: SwitchLocation,
        port: String,
        addr: Ipv4Addr,
        first: Ipv4Addr,
        last: Ipv4Addr,
    },

    #[error("uplink {switch}/{port} is configured more than once")]
    DuplicateUplinkPort { switch: SwitchLocation, port: String },
}

impl From<RackNetworkConfigError> for external::Error {
    fn from(err: RackNetworkConfigError) -> Self {
        external::Error::invalid_value("rack_network_config", err)
    }
}

impl RackNetworkConfig {
    /// Checks the infrastructure range and that every uplink address is
    /// drawn from it.
    pub fn validate(&self) -> Result<(), RackNetworkConfigError> {
        let first = self.infra_ip_first;
        let last = self.infra_ip_last;
        if first > last {
            return Err(RackNetworkConfigError::InvertedInfraRange {
                first,
                last,
            });
        }

        let mut seen = BTreeSet::new();
        for uplink in &self.uplinks {
            if !seen.insert((uplink.switch, uplink.uplink_port.as_str())) {
                return Err(RackNetworkConfigError::DuplicateUplinkPort {
                    switch: uplink.switch,
                    port: uplink.uplink_port.clone(),
                });
            }

            let addr = uplink.uplink_cidr.addr();
            if addr < first || addr > last {
                return Err(
                    RackNetworkConfigError::UplinkAddressNotInInfraRange {
                        switch: uplink.switch,
                        port: uplink.uplink_port.clone(),
                        addr,
                        first,
                        last,
                    },
                );
            }
        }
        Ok(())
    }
}

/// Switch port uplink configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub struct UplinkConfig {
    /// Gateway address
    pub gateway_ip: Ipv4Addr,
    /// Switch to use for uplink
    pub switch: SwitchLocation,
    /// Switchport to use for external connectivity
    pub uplink_port: String,
    /// Speed for the switchport
    pub uplink_port_speed: PortSpeed,
    /// Forward Error Correction setting for the switchport
    pub uplink_port_fec: PortFec,
    /// IP Address and prefix (e.g., `192.168.0.1/16`) to apply to switchport
    /// (must be in infra_ip pool)
    pub uplink_cidr: Ipv4Net,
    /// VLAN id to use for uplink
    pub uplink_vid: Option<u16>,
}

/// Identifies switch physical location
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Serialize,
    PartialEq,
    JsonSchema,
    Hash,
    Eq,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum SwitchLocation {
    /// Switch in upper slot
    Switch0,
    /// Switch in lower slot
    Switch1,
}

impl fmt::Display for SwitchLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchLocation::Switch0 => write!(f, "switch0"),
            SwitchLocation::Switch1 => write!(f, "switch1"),
        }
    }
}

/// Switchport Speed options
#[derive(
    Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum PortSpeed {
    #[serde(alias = "0G")]
    Speed0G,
    #[serde(alias = "1G")]
    Speed1G,
    #[serde(alias = "10G")]
    Speed10G,
    #[serde(alias = "25G")]
    Speed25G,
    #[serde(alias = "40G")]
    Speed40G,
    #[serde(alias = "50G")]
    Speed50G,
    #[serde(alias = "100G")]
    Speed100G,
    #[serde(alias = "200G")]
    Speed200G,
    #[serde(alias = "400G")]
    Speed400G,
}

/// Switchport FEC options
#[derive(
    Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum PortFec {
    Firecode,
    None,
    Rs,
}

#[cfg(test)]
mod test {
    use super::*;

    fn service_nic(ip: &str, subnet: &str) -> NetworkInterface {
        NetworkInterface {
            id: Uuid::new_v4(),
            kind: NetworkInterfaceKind::Service { id: Uuid::new_v4() },
            name: "nexus-0".parse().unwrap(),
            ip: ip.parse().unwrap(),
            mac: "a8:40:25:ff:00:01".parse().unwrap(),
            subnet: subnet.parse().unwrap(),
            vni: Vni::SERVICES_VNI,
            primary: true,
            slot: 0,
        }
    }

    #[test]
    fn test_nic_ip_within_subnet() {
        assert!(service_nic("172.30.2.5", "172.30.2.0/24").validate().is_ok());
        assert!(matches!(
            service_nic("172.30.3.5", "172.30.2.0/24").validate(),
            Err(NetworkInterfaceError::IpNotInSubnet { .. })
        ));
        assert!(service_nic("fd77:e9d2:9cd9:2::5", "172.30.2.0/24")
            .validate()
            .is_err());
    }

    #[test]
    fn test_nic_kind_serde() {
        let nic = service_nic("172.30.2.5", "172.30.2.0/24");
        let value = serde_json::to_value(&nic).unwrap();
        assert_eq!(value["kind"]["type"], "service");
        assert_eq!(value["subnet"], "172.30.2.0/24");
        let back: NetworkInterface = serde_json::from_value(value).unwrap();
        assert_eq!(back, nic);
    }

    #[test]
    fn test_source_nat_config_ports() {
        let ip = "10.0.0.5".parse().unwrap();
        assert!(SourceNatConfig::new(ip, 0, 16383).is_ok());
        assert!(SourceNatConfig::new(ip, 100, 100).is_ok());
        assert!(SourceNatConfig::new(ip, 16384, 0).is_err());

        let good = r#"{"ip": "10.0.0.5", "first_port": 0, "last_port": 16383}"#;
        let snat: SourceNatConfig = serde_json::from_str(good).unwrap();
        assert_eq!((snat.first_port, snat.last_port), (0, 16383));

        let bad = r#"{"ip": "10.0.0.5", "first_port": 10, "last_port": 9}"#;
        let err = serde_json::from_str::<SourceNatConfig>(bad).unwrap_err();
        assert!(err.to_string().contains("decreasing"), "{err}");
    }

    fn uplink(port: &str, cidr: &str) -> UplinkConfig {
        UplinkConfig {
            gateway_ip: "172.30.0.10".parse().unwrap(),
            switch: SwitchLocation::Switch0,
            uplink_port: port.to_string(),
            uplink_port_speed: PortSpeed::Speed400G,
            uplink_port_fec: PortFec::Firecode,
            uplink_cidr: cidr.parse().unwrap(),
            uplink_vid: None,
        }
    }

    #[test]
    fn test_rack_network_config_validation() {
        let mut config = RackNetworkConfig {
            infra_ip_first: "172.30.0.1".parse().unwrap(),
            infra_ip_last: "172.30.0.10".parse().unwrap(),
            uplinks: vec![uplink("qsfp0", "172.30.0.1/24")],
        };
        config.validate().unwrap();

        config.uplinks.push(uplink("qsfp0", "172.30.0.2/24"));
        assert!(matches!(
            config.validate(),
            Err(RackNetworkConfigError::DuplicateUplinkPort { .. })
        ));

        config.uplinks[1] = uplink("qsfp1", "172.30.0.11/24");
        assert!(matches!(
            config.validate(),
            Err(RackNetworkConfigError::UplinkAddressNotInInfraRange { .. })
        ));

        config.uplinks.pop();
        std::mem::swap(&mut config.infra_ip_first, &mut config.infra_ip_last);
        assert!(matches!(
            config.validate(),
            Err(RackNetworkConfigError::InvertedInfraRange { .. })
        ));
    }

    #[test]
    fn test_port_speed_aliases() {
        #[derive(Deserialize)]
        struct Port {
            speed: PortSpeed,
            fec: PortFec,
        }
        let port: Port =
            toml::from_str("speed = \"400G\"\nfec = \"rs\"").unwrap();
        assert_eq!(port.speed, PortSpeed::Speed400G);
        assert_eq!(port.fec, PortFec::Rs);
        let port: Port =
            toml::from_str("speed = \"speed100_g\"\nfec = \"none\"").unwrap();
        assert_eq!(port.speed, PortSpeed::Speed100G);
        assert_eq!(port.fec, PortFec::None);
    }
}
