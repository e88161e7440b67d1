// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common IP addressing functionality.
//!
//! This addressing functionality is shared by rack setup and every sled
//! agent, which need to agree upon addressing schemes.

use crate::api::external::{self, Error};
use oxnet::Ipv6Net;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddrV6};

pub const AZ_PREFIX: u8 = 48;
pub const RACK_PREFIX: u8 = 56;
pub const SLED_PREFIX: u8 = 64;

pub const DNS_PORT: u16 = 53;
pub const DNS_HTTP_PORT: u16 = 5353;
pub const SLED_AGENT_PORT: u16 = 12345;
pub const BOOTSTRAP_AGENT_RACK_INIT_PORT: u16 = 12346;

pub const COCKROACH_PORT: u16 = 32221;
pub const CRUCIBLE_PORT: u16 = 32345;
pub const CLICKHOUSE_PORT: u16 = 8123;
pub const CLICKHOUSE_KEEPER_PORT: u16 = 9181;
pub const OXIMETER_PORT: u16 = 12223;
pub const CRUCIBLE_PANTRY_PORT: u16 = 17000;
pub const NEXUS_INTERNAL_PORT: u16 = 12221;
pub const NTP_PORT: u16 = 123;

/// The number of ports available to an SNAT IP.
pub const NUM_SOURCE_NAT_PORTS: u16 = 1 << 14;

/// Wraps an [`Ipv6Net`] with a compile-time prefix length.
#[derive(
    Debug,
    Clone,
    Copy,
    JsonSchema,
    Serialize,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
#[schemars(rename = "Ipv6Subnet")]
pub struct Ipv6Subnet<const N: u8> {
    net: Ipv6Net,
}

impl<const N: u8> Ipv6Subnet<N> {
    const VALID_PREFIX: () = assert!(N <= 128, "IPv6 prefix must be <= 128");

    pub fn new(addr: Ipv6Addr) -> Self {
        let () = Self::VALID_PREFIX;
        // Ensure the address is set to within-prefix only components.
        let net = Ipv6Net::new_unchecked(addr, N);
        Self { net: Ipv6Net::new_unchecked(net.prefix(), N) }
    }

    /// Returns the underlying network.
    pub fn net(&self) -> Ipv6Net {
        self.net
    }
}

// We need a custom Deserialize to ensure that the subnet is what we expect.
impl<'de, const N: u8> Deserialize<'de> for Ipv6Subnet<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Inner {
            net: Ipv6Net,
        }

        let Inner { net } = Inner::deserialize(deserializer)?;
        if net.width() == N {
            Ok(Self::new(net.addr()))
        } else {
            Err(<D::Error as serde::de::Error>::custom(format!(
                "expected prefix {} but found {}",
                N,
                net.width(),
            )))
        }
    }
}

const SLED_AGENT_ADDRESS_INDEX: u128 = 1;

/// Return the sled agent address for a subnet.
///
/// This address will come from the first address of the [`SLED_PREFIX`] subnet.
pub fn get_sled_address(sled_subnet: Ipv6Subnet<SLED_PREFIX>) -> SocketAddrV6 {
    let base = u128::from(sled_subnet.net().prefix());
    let sled_agent_ip = Ipv6Addr::from(base + SLED_AGENT_ADDRESS_INDEX);
    SocketAddrV6::new(sled_agent_ip, SLED_AGENT_PORT, 0, 0)
}

/// Returns a sled subnet within a rack subnet.
///
/// The subnet at index == 0 is used for rack-local services.
pub fn get_64_subnet(
    rack_subnet: Ipv6Subnet<RACK_PREFIX>,
    index: u8,
) -> Ipv6Subnet<SLED_PREFIX> {
    let mut rack_network = rack_subnet.net().addr().octets();

    // To set bits distinguishing the /64 from the /56, we modify the 7th octet.
    rack_network[7] = index;
    Ipv6Subnet::<SLED_PREFIX>::new(Ipv6Addr::from(rack_network))
}

/// The IP address version.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IpVersion {
    V4,
    V6,
}

impl std::fmt::Display for IpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::V4 => write!(f, "v4"),
            Self::V6 => write!(f, "v6"),
        }
    }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum IpRangeError {
    #[error(
        "IP address ranges must be non-decreasing: {first} is greater than \
         {last}"
    )]
    Decreasing { first: IpAddr, last: IpAddr },
    #[error("IP address ranges cannot mix IPv4 and IPv6")]
    MixedFamilies,
}

impl From<IpRangeError> for Error {
    fn from(err: IpRangeError) -> Self {
        Error::InvalidRange { message: err.to_string() }
    }
}

/// An IP Range is a contiguous range of IP addresses, usually within an IP
/// Pool.
///
/// The first address in the range is guaranteed to be no greater than the last
/// address.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    Ord,
    PartialOrd,
)]
#[serde(untagged)]
pub enum IpRange {
    V4(Ipv4Range),
    V6(Ipv6Range),
}

// NOTE: We don't derive JsonSchema. That's intended so that we can use an
// untagged enum for `IpRange`, and use this method to annotate schemars output
// so that each variant is labelled with its address family.
impl JsonSchema for IpRange {
    fn schema_name() -> String {
        "IpRange".to_string()
    }

    fn json_schema(
        gen: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            subschemas: Some(Box::new(schemars::schema::SubschemaValidation {
                one_of: Some(vec![
                    external::label_schema(
                        "v4",
                        gen.subschema_for::<Ipv4Range>(),
                    ),
                    external::label_schema(
                        "v6",
                        gen.subschema_for::<Ipv6Range>(),
                    ),
                ]),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

impl IpRange {
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self, addr) {
            (IpRange::V4(r), IpAddr::V4(addr)) => r.contains(addr),
            (IpRange::V6(r), IpAddr::V6(addr)) => r.contains(addr),
            (IpRange::V6(_), IpAddr::V4(_))
            | (IpRange::V4(_), IpAddr::V6(_)) => false,
        }
    }

    pub fn first_address(&self) -> IpAddr {
        match self {
            IpRange::V4(inner) => IpAddr::from(inner.first),
            IpRange::V6(inner) => IpAddr::from(inner.first),
        }
    }

    pub fn last_address(&self) -> IpAddr {
        match self {
            IpRange::V4(inner) => IpAddr::from(inner.last),
            IpRange::V6(inner) => IpAddr::from(inner.last),
        }
    }

    pub fn iter(&self) -> IpRangeIter {
        match self {
            IpRange::V4(ip4) => IpRangeIter::V4(ip4.iter()),
            IpRange::V6(ip6) => IpRangeIter::V6(ip6.iter()),
        }
    }

    // Has to be u128 to accommodate IPv6
    pub fn len(&self) -> u128 {
        match self {
            IpRange::V4(ip4) => u128::from(ip4.len()),
            IpRange::V6(ip6) => ip6.len(),
        }
    }

    /// Return the IP version of this range.
    pub fn version(&self) -> IpVersion {
        match self {
            IpRange::V4(_) => IpVersion::V4,
            IpRange::V6(_) => IpVersion::V6,
        }
    }
}

impl From<IpAddr> for IpRange {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(addr) => IpRange::V4(Ipv4Range::from(addr)),
            IpAddr::V6(addr) => IpRange::V6(Ipv6Range::from(addr)),
        }
    }
}

impl TryFrom<(IpAddr, IpAddr)> for IpRange {
    type Error = IpRangeError;

    fn try_from(pair: (IpAddr, IpAddr)) -> Result<Self, Self::Error> {
        match (pair.0, pair.1) {
            (IpAddr::V4(a), IpAddr::V4(b)) => Self::try_from((a, b)),
            (IpAddr::V6(a), IpAddr::V6(b)) => Self::try_from((a, b)),
            (IpAddr::V4(_), IpAddr::V6(_)) | (IpAddr::V6(_), IpAddr::V4(_)) => {
                Err(IpRangeError::MixedFamilies)
            }
        }
    }
}

impl TryFrom<(Ipv4Addr, Ipv4Addr)> for IpRange {
    type Error = IpRangeError;

    fn try_from(pair: (Ipv4Addr, Ipv4Addr)) -> Result<Self, Self::Error> {
        Ipv4Range::new(pair.0, pair.1).map(IpRange::V4)
    }
}

impl TryFrom<(Ipv6Addr, Ipv6Addr)> for IpRange {
    type Error = IpRangeError;

    fn try_from(pair: (Ipv6Addr, Ipv6Addr)) -> Result<Self, Self::Error> {
        Ipv6Range::new(pair.0, pair.1).map(IpRange::V6)
    }
}

impl From<Ipv4Range> for IpRange {
    fn from(value: Ipv4Range) -> Self {
        Self::V4(value)
    }
}

impl From<Ipv6Range> for IpRange {
    fn from(value: Ipv6Range) -> Self {
        Self::V6(value)
    }
}

/// A non-decreasing IPv4 address range, inclusive of both ends.
///
/// The first address must be less than or equal to the last address.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
    PartialOrd,
    Ord,
)]
#[serde(try_from = "AnyIpv4Range")]
pub struct Ipv4Range {
    first: Ipv4Addr,
    last: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(first: Ipv4Addr, last: Ipv4Addr) -> Result<Self, IpRangeError> {
        if first <= last {
            Ok(Self { first, last })
        } else {
            Err(IpRangeError::Decreasing {
                first: first.into(),
                last: last.into(),
            })
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.first <= addr && addr <= self.last
    }

    pub fn first_address(&self) -> Ipv4Addr {
        self.first
    }

    pub fn last_address(&self) -> Ipv4Addr {
        self.last
    }

    pub fn iter(&self) -> Ipv4RangeIter {
        Ipv4RangeIter { next: Some(self.first.into()), last: self.last.into() }
    }

    /// Number of addresses in the range.
    pub fn len(&self) -> u64 {
        let start_num = u64::from(u32::from(self.first));
        let end_num = u64::from(u32::from(self.last));
        end_num - start_num + 1
    }
}

impl From<Ipv4Addr> for Ipv4Range {
    fn from(addr: Ipv4Addr) -> Self {
        Self { first: addr, last: addr }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
struct AnyIpv4Range {
    first: Ipv4Addr,
    last: Ipv4Addr,
}

impl TryFrom<AnyIpv4Range> for Ipv4Range {
    type Error = IpRangeError;
    fn try_from(r: AnyIpv4Range) -> Result<Self, Self::Error> {
        Ipv4Range::new(r.first, r.last)
    }
}

/// A non-decreasing IPv6 address range, inclusive of both ends.
///
/// The first address must be less than or equal to the last address.
#[derive(
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
)]
#[serde(try_from = "AnyIpv6Range")]
pub struct Ipv6Range {
    first: Ipv6Addr,
    last: Ipv6Addr,
}

impl Ipv6Range {
    pub fn new(first: Ipv6Addr, last: Ipv6Addr) -> Result<Self, IpRangeError> {
        if first <= last {
            Ok(Self { first, last })
        } else {
            Err(IpRangeError::Decreasing {
                first: first.into(),
                last: last.into(),
            })
        }
    }

    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        self.first <= addr && addr <= self.last
    }

    pub fn first_address(&self) -> Ipv6Addr {
        self.first
    }

    pub fn last_address(&self) -> Ipv6Addr {
        self.last
    }

    pub fn iter(&self) -> Ipv6RangeIter {
        Ipv6RangeIter { next: Some(self.first.into()), last: self.last.into() }
    }

    /// Number of addresses in the range.
    ///
    /// Saturates for the single range covering the entire IPv6 space.
    pub fn len(&self) -> u128 {
        let start_num = u128::from(self.first);
        let end_num = u128::from(self.last);
        (end_num - start_num).saturating_add(1)
    }
}

impl From<Ipv6Addr> for Ipv6Range {
    fn from(addr: Ipv6Addr) -> Self {
        Self { first: addr, last: addr }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
struct AnyIpv6Range {
    first: Ipv6Addr,
    last: Ipv6Addr,
}

impl TryFrom<AnyIpv6Range> for Ipv6Range {
    type Error = IpRangeError;
    fn try_from(r: AnyIpv6Range) -> Result<Self, Self::Error> {
        Ipv6Range::new(r.first, r.last)
    }
}

pub struct Ipv4RangeIter {
    next: Option<u32>,
    last: u32,
}

impl Iterator for Ipv4RangeIter {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next?;
        if next < self.last {
            self.next = Some(next + 1);
        } else {
            self.next = None;
        }
        Some(next.into())
    }
}

pub struct Ipv6RangeIter {
    next: Option<u128>,
    last: u128,
}

impl Iterator for Ipv6RangeIter {
    type Item = Ipv6Addr;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next?;
        if next < self.last {
            self.next = Some(next + 1);
        } else {
            self.next = None;
        }
        Some(next.into())
    }
}

pub enum IpRangeIter {
    V4(Ipv4RangeIter),
    V6(Ipv6RangeIter),
}

impl Iterator for IpRangeIter {
    type Item = IpAddr;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::V4(iter) => iter.next().map(IpAddr::V4),
            Self::V6(iter) => iter.next().map(IpAddr::V6),
        }
    }
}
