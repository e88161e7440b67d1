// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Zpool names

use crate::api::external::Error;
use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const ZPOOL_EXTERNAL_PREFIX: &str = "oxp_";
pub const ZPOOL_INTERNAL_PREFIX: &str = "oxi_";

const ZPOOL_NAME_REGEX: &str = r"^ox[ip]_[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$";

#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ZpoolKind {
    // This zpool is used for external storage (u.2)
    External,
    // This zpool is used for internal storage (m.2)
    Internal,
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ZpoolNameError {
    #[error(
        "bad zpool name {0:?}: must start with {ZPOOL_EXTERNAL_PREFIX:?} or \
         {ZPOOL_INTERNAL_PREFIX:?}"
    )]
    BadPrefix(String),
    #[error(
        "bad zpool name {0:?}: expected a lowercase, hyphenated version 4 UUID \
         after the prefix"
    )]
    BadUuid(String),
}

impl From<ZpoolNameError> for Error {
    fn from(err: ZpoolNameError) -> Self {
        Error::InvalidZpoolName { message: err.to_string() }
    }
}

/// A wrapper around a zpool name.
///
/// This expects that the format will be: `ox{i,p}_<UUID>` - we parse the prefix
/// when reading the structure, and validate that the UUID is a lowercase
/// version 4 UUID.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ZpoolName {
    id: Uuid,
    kind: ZpoolKind,
}

/// Custom JsonSchema implementation to encode the constraints on Name.
impl JsonSchema for ZpoolName {
    fn schema_name() -> String {
        "ZpoolName".to_string()
    }
    fn json_schema(
        _: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            metadata: Some(Box::new(schemars::schema::Metadata {
                title: Some("The name of a Zpool".to_string()),
                description: Some(
                    "Zpool names are of the format ox{i,p}_<UUID>. They are \
                     either Internal or External, and should be unique"
                        .to_string(),
                ),
                ..Default::default()
            })),
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            string: Some(Box::new(schemars::schema::StringValidation {
                pattern: Some(ZPOOL_NAME_REGEX.to_owned()),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

impl ZpoolName {
    pub const fn new_internal(id: Uuid) -> Self {
        Self { id, kind: ZpoolKind::Internal }
    }

    pub const fn new_external(id: Uuid) -> Self {
        Self { id, kind: ZpoolKind::External }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ZpoolKind {
        self.kind
    }

    /// Returns a path to a dataset's mountpoint within the zpool.
    ///
    /// For example: oxp_(UUID) -> /pool/ext/(UUID)/(dataset)
    pub fn dataset_mountpoint(&self, dataset: &str) -> Utf8PathBuf {
        let mut path = Utf8PathBuf::new();
        path.push("/pool");
        match self.kind {
            ZpoolKind::External => path.push("ext"),
            ZpoolKind::Internal => path.push("int"),
        };
        path.push(self.id().to_string());
        path.push(dataset);
        path
    }
}

/// Returns true if `s` is a lowercase, hyphenated UUID with version 4 and the
/// RFC 4122 variant.
fn is_lowercase_v4_uuid(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    let well_formed = bytes.iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_digit() || (b'a'..=b'f').contains(b),
    });
    well_formed
        && bytes[14] == b'4'
        && matches!(bytes[19], b'8' | b'9' | b'a' | b'b')
}

impl FromStr for ZpoolName {
    type Err = ZpoolNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = if let Some(id) = s.strip_prefix(ZPOOL_EXTERNAL_PREFIX)
        {
            (ZpoolKind::External, id)
        } else if let Some(id) = s.strip_prefix(ZPOOL_INTERNAL_PREFIX) {
            (ZpoolKind::Internal, id)
        } else {
            return Err(ZpoolNameError::BadPrefix(s.to_string()));
        };

        if !is_lowercase_v4_uuid(id) {
            return Err(ZpoolNameError::BadUuid(s.to_string()));
        }
        let id = Uuid::from_str(id)
            .map_err(|_| ZpoolNameError::BadUuid(s.to_string()))?;
        Ok(ZpoolName { id, kind })
    }
}

impl<'de> Deserialize<'de> for ZpoolName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ZpoolName::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ZpoolName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl fmt::Display for ZpoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            ZpoolKind::External => ZPOOL_EXTERNAL_PREFIX,
            ZpoolKind::Internal => ZPOOL_INTERNAL_PREFIX,
        };
        write!(f, "{prefix}{}", self.id)
    }
}
