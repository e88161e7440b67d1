// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Zones, the services that run inside them, and the ledgered set of zones a
//! sled has been asked to run.
//!
//! A [`ServiceZoneRequest`] can only be built (or deserialized) when its
//! services, dataset and network interfaces agree with its zone type, so the
//! sled agent never has to second-guess a request it has already accepted.

use crate::dataset::{DatasetKind, DatasetRequest};
use camino::{Utf8Path, Utf8PathBuf};
use rss_common::api::external::{self, Generation, MacAddr};
use rss_common::api::internal::shared::{
    NetworkInterface, NetworkInterfaceKind, SourceNatConfig,
};
use rss_common::ledger::Ledgerable;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};
use uuid::Uuid;

/// The filename of the ledger holding a sled's [`AllZoneRequests`].
pub const SERVICES_LEDGER_FILENAME: &str = "services.json";

/// The prefix of every zone name created on behalf of the control plane.
pub const ZONE_PREFIX: &str = "oxz_";

/// The type of zone that Sled Agent may run
#[derive(
    Clone,
    Copy,
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
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Clickhouse,
    ClickhouseKeeper,
    CockroachDb,
    CruciblePantry,
    Crucible,
    ExternalDns,
    InternalDns,
    Nexus,
    Ntp,
    Oximeter,
}

impl ZoneType {
    /// Returns the kind of dataset a zone of this type manages, if any.
    ///
    /// Zones with a dataset kind must carry exactly that dataset; all other
    /// zones must carry none.
    pub fn dataset_kind(&self) -> Option<DatasetKind> {
        match self {
            ZoneType::Clickhouse => Some(DatasetKind::Clickhouse),
            ZoneType::ClickhouseKeeper => Some(DatasetKind::ClickhouseKeeper),
            ZoneType::CockroachDb => Some(DatasetKind::CockroachDb),
            ZoneType::Crucible => Some(DatasetKind::Crucible),
            ZoneType::ExternalDns => Some(DatasetKind::ExternalDns),
            ZoneType::InternalDns => Some(DatasetKind::InternalDns),
            ZoneType::CruciblePantry
            | ZoneType::Nexus
            | ZoneType::Ntp
            | ZoneType::Oximeter => None,
        }
    }
}

impl std::fmt::Display for ZoneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ZoneType::*;
        let name = match self {
            Clickhouse => "clickhouse",
            ClickhouseKeeper => "clickhouse_keeper",
            CockroachDb => "cockroachdb",
            CruciblePantry => "crucible_pantry",
            Crucible => "crucible",
            ExternalDns => "external_dns",
            InternalDns => "internal_dns",
            Nexus => "nexus",
            Ntp => "ntp",
            Oximeter => "oximeter",
        };
        write!(f, "{name}")
    }
}

/// Describes service-specific parameters.
#[derive(
    Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash,
)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceType {
    Nexus {
        /// The address at which the internal nexus server is reachable.
        internal_address: SocketAddrV6,
        /// The address at which the external nexus server is reachable.
        external_ip: IpAddr,
        /// The service vNIC providing external connectivity using OPTE.
        nic: NetworkInterface,
        /// Whether Nexus's external endpoint should use TLS
        external_tls: bool,
        /// External DNS servers Nexus can use to resolve external hosts.
        external_dns_servers: Vec<IpAddr>,
    },
    ExternalDns {
        /// The address at which the external DNS server API is reachable.
        http_address: SocketAddrV6,
        /// The address at which the external DNS server is reachable.
        dns_address: SocketAddr,
        /// The service vNIC providing external connectivity using OPTE.
        nic: NetworkInterface,
    },
    InternalDns {
        http_address: SocketAddrV6,
        dns_address: SocketAddrV6,
        /// The addresses in the global zone which should be created
        ///
        /// For the DNS service, which exists outside the sleds's typical subnet
        /// - adding an address in the GZ is necessary to allow inter-zone
        /// traffic routing.
        gz_address: Ipv6Addr,

        /// The address is also identified with an auxiliary bit of information
        /// to ensure that the created global zone address can have a unique
        /// name.
        gz_address_index: u32,
    },
    Oximeter {
        address: SocketAddrV6,
    },
    CruciblePantry {
        address: SocketAddrV6,
    },
    BoundaryNtp {
        address: SocketAddrV6,
        ntp_servers: Vec<String>,
        dns_servers: Vec<IpAddr>,
        domain: Option<String>,
        /// The service vNIC providing outbound connectivity using OPTE.
        nic: NetworkInterface,
        /// The SNAT configuration for outbound connections.
        snat_cfg: SourceNatConfig,
    },
    InternalNtp {
        address: SocketAddrV6,
        ntp_servers: Vec<String>,
        dns_servers: Vec<IpAddr>,
        domain: Option<String>,
    },
    Clickhouse {
        address: SocketAddrV6,
    },
    ClickhouseKeeper {
        address: SocketAddrV6,
    },
    CockroachDb {
        address: SocketAddrV6,
    },
    Crucible {
        address: SocketAddrV6,
    },
}

impl ServiceType {
    /// Returns the type of zone this service must run in.
    pub fn zone_type(&self) -> ZoneType {
        match self {
            ServiceType::Nexus { .. } => ZoneType::Nexus,
            ServiceType::ExternalDns { .. } => ZoneType::ExternalDns,
            ServiceType::InternalDns { .. } => ZoneType::InternalDns,
            ServiceType::Oximeter { .. } => ZoneType::Oximeter,
            ServiceType::CruciblePantry { .. } => ZoneType::CruciblePantry,
            ServiceType::BoundaryNtp { .. }
            | ServiceType::InternalNtp { .. } => ZoneType::Ntp,
            ServiceType::Clickhouse { .. } => ZoneType::Clickhouse,
            ServiceType::ClickhouseKeeper { .. } => ZoneType::ClickhouseKeeper,
            ServiceType::CockroachDb { .. } => ZoneType::CockroachDb,
            ServiceType::Crucible { .. } => ZoneType::Crucible,
        }
    }

    /// Returns the OPTE interface embedded in this service, if it has one.
    pub fn nic(&self) -> Option<&NetworkInterface> {
        match self {
            ServiceType::Nexus { nic, .. }
            | ServiceType::ExternalDns { nic, .. }
            | ServiceType::BoundaryNtp { nic, .. } => Some(nic),
            ServiceType::InternalDns { .. }
            | ServiceType::Oximeter { .. }
            | ServiceType::CruciblePantry { .. }
            | ServiceType::InternalNtp { .. }
            | ServiceType::Clickhouse { .. }
            | ServiceType::ClickhouseKeeper { .. }
            | ServiceType::CockroachDb { .. }
            | ServiceType::Crucible { .. } => None,
        }
    }

    /// Returns the address this service uses outside the rack, if any.
    ///
    /// For boundary NTP this is the source NAT address of its outbound
    /// traffic.
    pub fn external_ip(&self) -> Option<IpAddr> {
        match self {
            ServiceType::Nexus { external_ip, .. } => Some(*external_ip),
            ServiceType::ExternalDns { dns_address, .. } => {
                Some(dns_address.ip())
            }
            ServiceType::BoundaryNtp { snat_cfg, .. } => Some(snat_cfg.ip),
            ServiceType::InternalDns { .. }
            | ServiceType::Oximeter { .. }
            | ServiceType::CruciblePantry { .. }
            | ServiceType::InternalNtp { .. }
            | ServiceType::Clickhouse { .. }
            | ServiceType::ClickhouseKeeper { .. }
            | ServiceType::CockroachDb { .. }
            | ServiceType::Crucible { .. } => None,
        }
    }
}

/// Used to request that the Sled initialize a single service.
#[derive(
    Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash,
)]
pub struct ServiceZoneService {
    pub id: Uuid,
    pub details: ServiceType,
}

/// Reasons a zone description is rejected
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ZoneCompositionError {
    #[error("zone {zone_id} ({zone_type}) has no services")]
    NoServices { zone_id: Uuid, zone_type: ZoneType },

    #[error("zone {zone_id} ({zone_type}) has no underlay addresses")]
    NoAddresses { zone_id: Uuid, zone_type: ZoneType },

    #[error(
        "zone {zone_id} ({zone_type}) cannot run service {service_id}, \
         which belongs in a {service_zone_type} zone"
    )]
    InconsistentZoneComposition {
        zone_id: Uuid,
        zone_type: ZoneType,
        service_id: Uuid,
        service_zone_type: ZoneType,
    },

    #[error(
        "zone {zone_id} ({zone_type}) cannot manage a {dataset_kind} dataset"
    )]
    IncompatibleDataset {
        zone_id: Uuid,
        zone_type: ZoneType,
        dataset_kind: DatasetKind,
    },

    #[error(
        "zone {zone_id} ({zone_type}) requires a {expected} dataset, but none \
         was provided"
    )]
    MissingDataset { zone_id: Uuid, zone_type: ZoneType, expected: DatasetKind },

    #[error("zone {zone_id} has {count} primary network interfaces")]
    MultiplePrimaryInterfaces { zone_id: Uuid, count: usize },

    #[error("zone {zone_id} has network interfaces but none is primary")]
    NoPrimaryInterface { zone_id: Uuid },

    #[error("zone {zone_id}: invalid network interface {nic_id}: {reason}")]
    InvalidInterface { zone_id: Uuid, nic_id: Uuid, reason: String },

    #[error("zone {zone_id}: MAC address {mac} is used more than once")]
    DuplicateMacAddress { zone_id: Uuid, mac: MacAddr },
}

impl From<ZoneCompositionError> for external::Error {
    fn from(err: ZoneCompositionError) -> Self {
        let message = err.to_string();
        match err {
            ZoneCompositionError::NoServices { .. }
            | ZoneCompositionError::NoAddresses { .. }
            | ZoneCompositionError::InconsistentZoneComposition { .. } => {
                external::Error::InconsistentZoneComposition { message }
            }
            ZoneCompositionError::IncompatibleDataset { .. }
            | ZoneCompositionError::MissingDataset { .. } => {
                external::Error::IncompatibleDataset { message }
            }
            ZoneCompositionError::MultiplePrimaryInterfaces { .. } => {
                external::Error::MultiplePrimaryInterfaces { message }
            }
            ZoneCompositionError::NoPrimaryInterface { .. }
            | ZoneCompositionError::InvalidInterface { .. }
            | ZoneCompositionError::DuplicateMacAddress { .. } => {
                external::Error::invalid_value("nic", message)
            }
        }
    }
}

// "Shadow" copy of `ServiceZoneRequest` that does no validation on its
// fields.
#[derive(Clone, Deserialize)]
struct UnvalidatedServiceZoneRequest {
    id: Uuid,
    zone_type: ZoneType,
    addresses: Vec<Ipv6Addr>,
    #[serde(default)]
    dataset: Option<DatasetRequest>,
    services: Vec<ServiceZoneService>,
}

impl TryFrom<UnvalidatedServiceZoneRequest> for ServiceZoneRequest {
    type Error = ZoneCompositionError;

    fn try_from(
        value: UnvalidatedServiceZoneRequest,
    ) -> Result<Self, Self::Error> {
        ServiceZoneRequest::new(
            value.id,
            value.zone_type,
            value.addresses,
            value.dataset,
            value.services,
        )
    }
}

/// Describes a request to create a zone running one or more services.
#[derive(
    Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash,
)]
#[serde(try_from = "UnvalidatedServiceZoneRequest")]
pub struct ServiceZoneRequest {
    // The UUID of the zone to be initialized.
    id: Uuid,
    // The type of the zone to be created.
    zone_type: ZoneType,
    // The addresses on which the service should listen for requests.
    addresses: Vec<Ipv6Addr>,
    // Datasets which should be managed by this service.
    #[serde(default)]
    dataset: Option<DatasetRequest>,
    // Services that should be run in the zone
    services: Vec<ServiceZoneService>,
}

impl ServiceZoneRequest {
    /// Builds a zone request, checking that its parts fit together.
    pub fn new(
        id: Uuid,
        zone_type: ZoneType,
        addresses: Vec<Ipv6Addr>,
        dataset: Option<DatasetRequest>,
        services: Vec<ServiceZoneService>,
    ) -> Result<Self, ZoneCompositionError> {
        if services.is_empty() {
            return Err(ZoneCompositionError::NoServices {
                zone_id: id,
                zone_type,
            });
        }
        if addresses.is_empty() {
            return Err(ZoneCompositionError::NoAddresses {
                zone_id: id,
                zone_type,
            });
        }

        if let Some(service) =
            services.iter().find(|s| s.details.zone_type() != zone_type)
        {
            return Err(ZoneCompositionError::InconsistentZoneComposition {
                zone_id: id,
                zone_type,
                service_id: service.id,
                service_zone_type: service.details.zone_type(),
            });
        }

        match (zone_type.dataset_kind(), &dataset) {
            (expected, Some(dataset))
                if expected != Some(*dataset.name.dataset()) =>
            {
                return Err(ZoneCompositionError::IncompatibleDataset {
                    zone_id: id,
                    zone_type,
                    dataset_kind: *dataset.name.dataset(),
                });
            }
            (Some(expected), None) => {
                return Err(ZoneCompositionError::MissingDataset {
                    zone_id: id,
                    zone_type,
                    expected,
                });
            }
            _ => (),
        }

        validate_nics(id, &services)?;

        Ok(Self { id, zone_type, addresses, dataset, services })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn zone_type(&self) -> ZoneType {
        self.zone_type
    }

    pub fn addresses(&self) -> &[Ipv6Addr] {
        &self.addresses
    }

    pub fn dataset(&self) -> Option<&DatasetRequest> {
        self.dataset.as_ref()
    }

    pub fn services(&self) -> &[ServiceZoneService] {
        &self.services
    }

    /// Returns the name of the zone that runs this request.
    pub fn zone_name(&self) -> String {
        format!("{ZONE_PREFIX}{}_{}", self.zone_type, self.id)
    }
}

fn validate_nics(
    zone_id: Uuid,
    services: &[ServiceZoneService],
) -> Result<(), ZoneCompositionError> {
    let nics: Vec<&NetworkInterface> =
        services.iter().filter_map(|s| s.details.nic()).collect();
    if nics.is_empty() {
        return Ok(());
    }

    let primaries = nics.iter().filter(|nic| nic.primary).count();
    if primaries > 1 {
        return Err(ZoneCompositionError::MultiplePrimaryInterfaces {
            zone_id,
            count: primaries,
        });
    }
    if primaries == 0 {
        return Err(ZoneCompositionError::NoPrimaryInterface { zone_id });
    }

    let mut macs = BTreeSet::new();
    for nic in nics {
        if !matches!(nic.kind, NetworkInterfaceKind::Service { .. }) {
            return Err(ZoneCompositionError::InvalidInterface {
                zone_id,
                nic_id: nic.id,
                reason: "service zones only use service interfaces"
                    .to_string(),
            });
        }
        nic.validate().map_err(|err| {
            ZoneCompositionError::InvalidInterface {
                zone_id,
                nic_id: nic.id,
                reason: err.to_string(),
            }
        })?;
        if !macs.insert(nic.mac) {
            return Err(ZoneCompositionError::DuplicateMacAddress {
                zone_id,
                mac: nic.mac,
            });
        }
    }
    Ok(())
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ZoneRequestError {
    #[error(
        "invalid zone root {root:?}: must be an absolute path without \
         `.` or `..` components"
    )]
    InvalidZoneRoot { root: Utf8PathBuf },

    #[error(
        "requested generation {requested} is older than current generation \
         {current}"
    )]
    StaleGeneration { requested: Generation, current: Generation },

    #[error("zone {zone} was requested more than once")]
    DuplicateZone { zone: String },
}

impl From<ZoneRequestError> for external::Error {
    fn from(err: ZoneRequestError) -> Self {
        match err {
            ZoneRequestError::InvalidZoneRoot { .. } => {
                external::Error::invalid_value("root", err)
            }
            ZoneRequestError::DuplicateZone { .. } => {
                external::Error::invalid_request(&err.to_string())
            }
            ZoneRequestError::StaleGeneration { requested, current } => {
                external::Error::StaleGeneration { requested, current }
            }
        }
    }
}

fn is_normalized_absolute(root: &Utf8Path) -> bool {
    root.is_absolute()
        && !root.as_str().split('/').any(|c| c == "." || c == "..")
}

#[derive(Clone, Deserialize)]
struct UnvalidatedZoneRequest {
    zone: ServiceZoneRequest,
    root: Utf8PathBuf,
}

impl TryFrom<UnvalidatedZoneRequest> for ZoneRequest {
    type Error = ZoneRequestError;

    fn try_from(value: UnvalidatedZoneRequest) -> Result<Self, Self::Error> {
        ZoneRequest::new(value.zone, value.root)
    }
}

/// This struct represents the combo of "what zone did you ask for" + "where did
/// we put it".
#[derive(
    Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash,
)]
#[serde(try_from = "UnvalidatedZoneRequest")]
pub struct ZoneRequest {
    zone: ServiceZoneRequest,
    #[schemars(with = "String")]
    root: Utf8PathBuf,
}

impl ZoneRequest {
    pub fn new(
        zone: ServiceZoneRequest,
        root: Utf8PathBuf,
    ) -> Result<Self, ZoneRequestError> {
        if !is_normalized_absolute(&root) {
            return Err(ZoneRequestError::InvalidZoneRoot { root });
        }
        Ok(Self { zone, root })
    }

    pub fn zone(&self) -> &ServiceZoneRequest {
        &self.zone
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the path at which this zone's filesystem lives.
    pub fn zone_path(&self) -> Utf8PathBuf {
        self.root.join(self.zone.zone_name())
    }
}

#[derive(Deserialize)]
struct UnvalidatedAllZoneRequests {
    generation: Generation,
    requests: Vec<ZoneRequest>,
}

impl TryFrom<UnvalidatedAllZoneRequests> for AllZoneRequests {
    type Error = ZoneRequestError;

    fn try_from(
        value: UnvalidatedAllZoneRequests,
    ) -> Result<Self, Self::Error> {
        AllZoneRequests::new(value.generation, value.requests)
    }
}

/// A wrapper around `ZoneRequest` that allows it to be serialized to a JSON
/// file.
///
/// No two requests share a zone name.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(try_from = "UnvalidatedAllZoneRequests")]
pub struct AllZoneRequests {
    pub generation: Generation,
    requests: Vec<ZoneRequest>,
}

impl AllZoneRequests {
    pub fn new(
        generation: Generation,
        requests: Vec<ZoneRequest>,
    ) -> Result<Self, ZoneRequestError> {
        let mut names = BTreeSet::new();
        for request in &requests {
            let zone = request.zone.zone_name();
            if !names.insert(zone.clone()) {
                return Err(ZoneRequestError::DuplicateZone { zone });
            }
        }
        Ok(Self { generation, requests })
    }

    pub fn requests(&self) -> &[ZoneRequest] {
        &self.requests
    }

    /// Replaces this set with `new` if `new` is at least as recent.
    ///
    /// On failure, `self` is left untouched.
    pub fn try_replace(
        &mut self,
        new: AllZoneRequests,
    ) -> Result<(), ZoneRequestError> {
        if new.generation < self.generation {
            return Err(ZoneRequestError::StaleGeneration {
                requested: new.generation,
                current: self.generation,
            });
        }
        *self = new;
        Ok(())
    }

    /// Returns the request for the zone named `zone_name`, if present.
    pub fn find(&self, zone_name: &str) -> Option<&ZoneRequest> {
        self.requests.iter().find(|r| r.zone.zone_name() == zone_name)
    }
}

impl Ledgerable for AllZoneRequests {
    fn is_newer_than(&self, other: &AllZoneRequests) -> bool {
        self.generation >= other.generation
    }
}
