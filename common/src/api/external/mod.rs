// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Validated primitive types used throughout rack and zone configuration
//!
//! Each type here can only be constructed from input that satisfies its
//! invariants, so code that receives one never has to re-check it.

mod error;
mod name;

pub use error::*;
pub use name::*;

use anyhow::anyhow;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FormatResult;
use std::str::FromStr;

/// Generation numbers, used for optimistic concurrency control
// Generations are ultimately stored as i64 by the control plane, so we never
// hand out a value that would not fit.
#[derive(
    Copy,
    Clone,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "u64")]
pub struct Generation(u64);

const MAX_GENERATION: u64 = i64::MAX as u64;

impl Generation {
    pub const fn new() -> Generation {
        Generation(1)
    }

    pub const fn from_u32(value: u32) -> Generation {
        Generation(value as u64)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Generation {
        // It should technically be an operational error if this exceeds the
        // value allowed by an i64.  But it seems unlikely enough to happen in
        // practice that we can probably feel safe with this.
        let next_gen = self.0 + 1;
        assert!(next_gen <= MAX_GENERATION);
        Generation(next_gen)
    }
}

impl Default for Generation {
    fn default() -> Self {
        Generation::new()
    }
}

impl Display for Generation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(&self.0.to_string())
    }
}

impl From<&Generation> for i64 {
    fn from(g: &Generation) -> Self {
        // Construction guarantees the value is within range.
        g.0 as i64
    }
}

impl TryFrom<u64> for Generation {
    type Error = anyhow::Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > MAX_GENERATION {
            return Err(anyhow!("generation number too large"));
        }
        Ok(Generation(value))
    }
}

impl TryFrom<i64> for Generation {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(Generation(
            u64::try_from(value)
                .map_err(|_| anyhow!("generation number is negative"))?,
        ))
    }
}

/// Errors parsing a [`MacAddr`]
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
#[error(
    "invalid MAC address {input:?}: expected six colon-separated pairs of \
     hex digits"
)]
pub struct MacAddrError {
    pub input: String,
}

/// The `MacAddr` represents a Media Access Control (MAC) address, used to
/// uniquely identify hardware devices on a network.
// NOTE: We're using the `macaddr` crate for the internal representation, but
// it accepts several textual forms.  We only accept the colon-separated one.
#[derive(
    Clone, Copy, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub macaddr::MacAddr6);

impl MacAddr {
    /// The octets of this address, most significant first.
    pub fn octets(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out.copy_from_slice(self.0.as_bytes());
        out
    }
}

impl FromStr for MacAddr {
    type Err = MacAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MacAddrError { input: s.to_string() };
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != 6
            || octets.iter().any(|octet| {
                octet.len() != 2
                    || !octet.chars().all(|c| c.is_ascii_hexdigit())
            })
        {
            return Err(err());
        }
        s.parse().map(MacAddr).map_err(|_| err())
    }
}

impl TryFrom<String> for MacAddr {
    type Error = MacAddrError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl std::ops::Deref for MacAddr {
    type Target = macaddr::MacAddr6;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let [a, b, c, d, e, g] = self.octets();
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl JsonSchema for MacAddr {
    fn schema_name() -> String {
        "MacAddr".to_string()
    }

    fn json_schema(
        _: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        schemars::schema::Schema::Object(schemars::schema::SchemaObject {
            metadata: Some(Box::new(schemars::schema::Metadata {
                title: Some("A MAC address".to_string()),
                description: Some(
                    "A Media Access Control address, in EUI-48 format"
                        .to_string(),
                ),
                examples: vec!["ff:ff:ff:ff:ff:ff".into()],
                ..Default::default()
            })),
            instance_type: Some(schemars::schema::SingleOrVec::Single(
                Box::new(schemars::schema::InstanceType::String),
            )),
            string: Some(Box::new(schemars::schema::StringValidation {
                max_length: Some(17), // 12 hex characters and 5 ":"-separators
                min_length: Some(17),
                pattern: Some(
                    r#"^([0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}$"#.to_string(),
                ),
            })),
            ..Default::default()
        })
    }
}

/// Errors constructing a [`Vni`]
#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid VNI {0}: must be at most {}", Vni::MAX_VNI)]
pub struct VniError(pub u32);

/// A Geneve Virtual Network Identifier
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "u32")]
pub struct Vni(u32);

impl Vni {
    /// Virtual Network Identifiers are constrained to be 24-bit values.
    pub const MAX_VNI: u32 = 0xFF_FFFF;

    /// The VNI for the builtin services VPC.
    pub const SERVICES_VNI: Self = Self(100);

    /// Create a new VNI, validating that it fits in 24 bits.
    pub const fn new(n: u32) -> Result<Self, VniError> {
        if n <= Self::MAX_VNI {
            Ok(Self(n))
        } else {
            Err(VniError(n))
        }
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Vni {
    type Error = VniError;

    fn try_from(x: u32) -> Result<Self, VniError> {
        Self::new(x)
    }
}

impl Display for Vni {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "{}", self.0)
    }
}

/// Wraps a schema in an object with a single `title`, for use as one
/// alternative of a `oneOf`.
pub fn label_schema(
    label: &str,
    schema: schemars::schema::Schema,
) -> schemars::schema::Schema {
    schemars::schema::SchemaObject {
        metadata: Some(
            schemars::schema::Metadata {
                title: Some(label.to_string()),
                ..Default::default()
            }
            .into(),
        ),
        subschemas: Some(
            schemars::schema::SubschemaValidation {
                all_of: Some(vec![schema]),
                ..Default::default()
            }
            .into(),
        ),
        ..Default::default()
    }
    .into()
}
