// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rack initialization types.

use crate::zone::ServiceZoneRequest;
use camino::{Utf8Path, Utf8PathBuf};
use rss_common::address::{
    get_64_subnet, IpRange, Ipv6Subnet, AZ_PREFIX, RACK_PREFIX, SLED_PREFIX,
};
use rss_common::api::external::{self, Name};
use rss_common::api::internal::nexus::Certificate;
use rss_common::api::internal::shared::{
    RackNetworkConfig, RackNetworkConfigError,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sled_hardware_types::Baseboard;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv6Addr};
use uuid::Uuid;

/// The smallest number of peers with which trust quorum may be established.
pub const MIN_TRUST_QUORUM_PEERS: usize = 3;

/// RecoverySiloConfig
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub struct RecoverySiloConfig {
    pub silo_name: Name,
    pub user_name: Name,
    pub user_password_hash: rss_passwords::NewPasswordHash,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BootstrapAddressDiscovery {
    /// Ignore all bootstrap addresses except our own.
    OnlyOurs,
    /// Ignore all bootstrap addresses except the following.
    OnlyThese { addrs: BTreeSet<Ipv6Addr> },
}

/// Ways in which an otherwise well-formed [`RackInitializeRequest`] can be
/// unusable
#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum RackInitializeRequestError {
    #[error("At least one external DNS IP is required")]
    NoExternalDnsIps,

    #[error(
        "External DNS IP {ip} is not contained in \
         `internal_services_ip_pool_ranges`"
    )]
    ExternalDnsIpNotInPool { ip: IpAddr },

    #[error(
        "Trust quorum requires at least {required} peers, but only {found} \
         were provided"
    )]
    InsufficientQuorumPeers { found: usize, required: usize },

    #[error("Trust quorum peer {peer} is listed more than once")]
    DuplicateQuorumPeer { peer: Baseboard },

    #[error(
        "Zone {zone_id} uses external address {ip}, which is not contained \
         in `internal_services_ip_pool_ranges`"
    )]
    ServiceIpNotInPool { zone_id: Uuid, ip: IpAddr },

    #[error("Invalid rack network config: {0}")]
    RackNetworkConfig(#[from] RackNetworkConfigError),
}

impl From<RackInitializeRequestError> for external::Error {
    fn from(err: RackInitializeRequestError) -> Self {
        match err {
            RackInitializeRequestError::ExternalDnsIpNotInPool { ip } => {
                external::Error::ExternalDnsIpNotInPool { ip }
            }
            RackInitializeRequestError::InsufficientQuorumPeers {
                found,
                required,
            } => external::Error::InsufficientQuorumPeers { found, required },
            RackInitializeRequestError::RackNetworkConfig(err) => err.into(),
            RackInitializeRequestError::NoExternalDnsIps
            | RackInitializeRequestError::DuplicateQuorumPeer { .. }
            | RackInitializeRequestError::ServiceIpNotInPool { .. } => {
                external::Error::invalid_request(&err.to_string())
            }
        }
    }
}

// "Shadow" copy of `RackInitializeRequest` that does no validation on its
// fields.
#[derive(Clone, Deserialize)]
struct UnvalidatedRackInitializeRequest {
    trust_quorum_peers: Option<Vec<Baseboard>>,
    bootstrap_discovery: BootstrapAddressDiscovery,
    ntp_servers: Vec<String>,
    dns_servers: Vec<IpAddr>,
    internal_services_ip_pool_ranges: Vec<IpRange>,
    external_dns_ips: Vec<IpAddr>,
    external_dns_zone_name: String,
    #[serde(default)]
    external_certificates: Vec<Certificate>,
    recovery_silo: RecoverySiloConfig,
    rack_subnet: Ipv6Addr,
    #[serde(default)]
    rack_network_config: Option<RackNetworkConfig>,
}

impl TryFrom<UnvalidatedRackInitializeRequest> for RackInitializeRequest {
    type Error = RackInitializeRequestError;

    fn try_from(
        value: UnvalidatedRackInitializeRequest,
    ) -> Result<Self, Self::Error> {
        let request = RackInitializeRequest {
            trust_quorum_peers: value.trust_quorum_peers,
            bootstrap_discovery: value.bootstrap_discovery,
            ntp_servers: value.ntp_servers,
            dns_servers: value.dns_servers,
            internal_services_ip_pool_ranges: value
                .internal_services_ip_pool_ranges,
            external_dns_ips: value.external_dns_ips,
            external_dns_zone_name: value.external_dns_zone_name,
            external_certificates: value.external_certificates,
            recovery_silo: value.recovery_silo,
            rack_subnet: value.rack_subnet,
            rack_network_config: value.rack_network_config,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Configuration for the "rack setup service".
///
/// The Rack Setup Service should be responsible for one-time setup actions,
/// such as CockroachDB placement and initialization.  Without operator
/// intervention, however, these actions need a way to be automated in our
/// deployment.
#[derive(Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(try_from = "UnvalidatedRackInitializeRequest")]
pub struct RackInitializeRequest {
    /// The set of peer_ids required to initialize trust quorum
    ///
    /// The value is `None` if we are not using trust quorum
    pub trust_quorum_peers: Option<Vec<Baseboard>>,

    /// Describes how bootstrap addresses should be collected during RSS.
    pub bootstrap_discovery: BootstrapAddressDiscovery,

    /// The external NTP server addresses.
    pub ntp_servers: Vec<String>,

    /// The external DNS server addresses.
    pub dns_servers: Vec<IpAddr>,

    /// Ranges of the service IP pool which may be used for internal services.
    pub internal_services_ip_pool_ranges: Vec<IpRange>,

    /// Service IP addresses on which we run external DNS servers.
    ///
    /// Each address must be present in `internal_services_ip_pool_ranges`.
    pub external_dns_ips: Vec<IpAddr>,

    /// DNS name for the DNS zone delegated to the rack for external DNS
    pub external_dns_zone_name: String,

    /// initial TLS certificates for the external API
    #[serde(default)]
    pub external_certificates: Vec<Certificate>,

    /// Configuration of the Recovery Silo (the initial Silo)
    pub recovery_silo: RecoverySiloConfig,

    /// The subnet of the rack; only the first `RACK_PREFIX` bits are used.
    pub rack_subnet: Ipv6Addr,

    /// Initial rack network configuration
    #[serde(default)]
    pub rack_network_config: Option<RackNetworkConfig>,
}

impl RackInitializeRequest {
    /// Load a RackInitializeRequest from a file path.
    pub fn from_file<P: AsRef<Utf8Path>>(
        path: P,
    ) -> Result<Self, RackInitializeRequestParseError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            RackInitializeRequestParseError::Io { path: path.into(), err }
        })?;
        let mut raw_config = Self::from_toml(&contents).map_err(|err| {
            RackInitializeRequestParseError::Deserialize {
                path: path.into(),
                err: err.into(),
            }
        })?;

        // We look for a pair of well-known paths adjacent to config-rss.toml
        // that specify an extra TLS certificate and private key.  Any
        // developer can use this to inject a TLS certificate into their
        // setup.
        if let Some(parent) = path.parent() {
            let cert_path = parent.join("initial-tls-cert.pem");
            let key_path = parent.join("initial-tls-key.pem");
            let cert_bytes = std::fs::read_to_string(&cert_path);
            let key_bytes = std::fs::read_to_string(&key_path);
            match (cert_bytes, key_bytes) {
                (Ok(cert), Ok(key)) => {
                    raw_config
                        .external_certificates
                        .push(Certificate { key, cert });
                }
                (Err(cert_error), Err(key_error))
                    if cert_error.kind() == std::io::ErrorKind::NotFound
                        && key_error.kind() == std::io::ErrorKind::NotFound =>
                {
                    // Fine.  No extra cert was provided.
                }
                (Err(cert_error), _) => {
                    return Err(RackInitializeRequestParseError::Certificate(
                        anyhow::Error::new(cert_error).context(format!(
                            "loading certificate from {:?}",
                            cert_path
                        )),
                    ));
                }
                (_, Err(key_error)) => {
                    return Err(RackInitializeRequestParseError::Certificate(
                        anyhow::Error::new(key_error).context(format!(
                            "loading private key from {:?}",
                            key_path
                        )),
                    ));
                }
            };
        }

        Ok(raw_config)
    }

    /// Parse a RackInitializeRequest from TOML.
    pub fn from_toml(data: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<RackInitializeRequest>(data)
    }

    /// Checks the rack-wide policy this request must satisfy.
    ///
    /// This runs automatically on deserialization; it is exposed for
    /// requests assembled in code.
    pub fn validate(&self) -> Result<(), RackInitializeRequestError> {
        validate_external_dns(
            &self.external_dns_ips,
            &self.internal_services_ip_pool_ranges,
        )?;

        if let Some(peers) = &self.trust_quorum_peers {
            if peers.len() < MIN_TRUST_QUORUM_PEERS {
                return Err(
                    RackInitializeRequestError::InsufficientQuorumPeers {
                        found: peers.len(),
                        required: MIN_TRUST_QUORUM_PEERS,
                    },
                );
            }
            let mut seen = BTreeSet::new();
            for peer in peers {
                if !seen.insert(peer) {
                    return Err(
                        RackInitializeRequestError::DuplicateQuorumPeer {
                            peer: peer.clone(),
                        },
                    );
                }
            }
        }

        if let Some(rack_network_config) = &self.rack_network_config {
            rack_network_config.validate()?;
        }
        Ok(())
    }

    /// Checks that every address `zone` uses outside the rack, including a
    /// boundary NTP zone's source NAT address, is drawn from
    /// `internal_services_ip_pool_ranges`.
    pub fn validate_service_zone(
        &self,
        zone: &ServiceZoneRequest,
    ) -> Result<(), RackInitializeRequestError> {
        for service in zone.services() {
            let Some(ip) = service.details.external_ip() else {
                continue;
            };
            if !self
                .internal_services_ip_pool_ranges
                .iter()
                .any(|range| range.contains(ip))
            {
                return Err(RackInitializeRequestError::ServiceIpNotInPool {
                    zone_id: zone.id(),
                    ip,
                });
            }
        }
        Ok(())
    }

    pub fn az_subnet(&self) -> Ipv6Subnet<AZ_PREFIX> {
        Ipv6Subnet::<AZ_PREFIX>::new(self.rack_subnet)
    }

    /// Returns the subnet for our rack.
    pub fn rack_subnet(&self) -> Ipv6Subnet<RACK_PREFIX> {
        Ipv6Subnet::<RACK_PREFIX>::new(self.rack_subnet)
    }

    /// Returns the subnet for the `index`-th sled in the rack.
    pub fn sled_subnet(&self, index: u8) -> Ipv6Subnet<SLED_PREFIX> {
        get_64_subnet(self.rack_subnet(), index)
    }
}

fn validate_external_dns(
    dns_ips: &[IpAddr],
    internal_ranges: &[IpRange],
) -> Result<(), RackInitializeRequestError> {
    if dns_ips.is_empty() {
        return Err(RackInitializeRequestError::NoExternalDnsIps);
    }

    // Every external DNS IP should also be present in one of the internal
    // services IP pool ranges. This check is O(N*M), but we expect both N
    // and M to be small (~5 DNS servers, and a small number of pools).
    for &ip in dns_ips {
        if !internal_ranges.iter().any(|range| range.contains(ip)) {
            return Err(RackInitializeRequestError::ExternalDnsIpNotInPool {
                ip,
            });
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum RackInitializeRequestParseError {
    #[error("Failed to read config from {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to deserialize config from {path}: {err}")]
    Deserialize {
        path: Utf8PathBuf,
        #[source]
        err: anyhow::Error,
    },
    #[error("Loading certificate: {0}")]
    Certificate(#[source] anyhow::Error),
}

// This custom debug implementation hides the private keys.
impl std::fmt::Debug for RackInitializeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // If you find a compiler error here, and you just added a field to this
        // struct, be sure to add it to the Debug impl below!
        let RackInitializeRequest {
            trust_quorum_peers,
            bootstrap_discovery,
            ntp_servers,
            dns_servers,
            internal_services_ip_pool_ranges,
            external_dns_ips,
            external_dns_zone_name,
            external_certificates: _,
            recovery_silo,
            rack_subnet,
            rack_network_config,
        } = &self;

        f.debug_struct("RackInitializeRequest")
            .field("trust_quorum_peers", trust_quorum_peers)
            .field("bootstrap_discovery", bootstrap_discovery)
            .field("ntp_servers", ntp_servers)
            .field("dns_servers", dns_servers)
            .field(
                "internal_services_ip_pool_ranges",
                internal_services_ip_pool_ranges,
            )
            .field("external_dns_ips", external_dns_ips)
            .field("external_dns_zone_name", external_dns_zone_name)
            .field("external_certificates", &"<redacted>")
            .field("recovery_silo", recovery_silo)
            .field("rack_subnet", rack_subnet)
            .field("rack_network_config", rack_network_config)
            .finish()
    }
}

/// Return a RackInitializeRequest configuration suitable for testing.
pub fn rack_initialize_request_test_config() -> RackInitializeRequest {
    // Use env! rather than std::env::var because this might be called from
    // a dependent crate.
    let manifest_dir = Utf8Path::new(env!("CARGO_MANIFEST_DIR"));
    let path =
        manifest_dir.join("../../smf/sled-agent/non-gimlet/config-rss.toml");
    let contents = std::fs::read_to_string(&path).unwrap();
    toml::from_str(&contents)
        .unwrap_or_else(|e| panic!("failed to parse {:?}: {}", &path, e))
}
