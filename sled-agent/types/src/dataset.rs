// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Datasets backing the zones that keep persistent state.

use camino::{Utf8Path, Utf8PathBuf};
use rss_common::zpool_name::ZpoolName;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::SocketAddrV6;
use uuid::Uuid;

/// The type of a dataset, and an auxiliary information necessary
/// to successfully launch a zone managing the associated data.
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
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetKind {
    CockroachDb,
    Crucible,
    Clickhouse,
    ClickhouseKeeper,
    ExternalDns,
    InternalDns,
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use DatasetKind::*;
        let s = match self {
            Crucible => "crucible",
            CockroachDb => "cockroachdb",
            Clickhouse => "clickhouse",
            ClickhouseKeeper => "clickhouse_keeper",
            ExternalDns => "external_dns",
            InternalDns => "internal_dns",
        };
        write!(f, "{}", s)
    }
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Clone,
    JsonSchema,
)]
pub struct DatasetName {
    // A unique identifier for the Zpool on which the dataset is stored.
    pool_name: ZpoolName,
    // A name for the dataset within the Zpool.
    kind: DatasetKind,
}

impl DatasetName {
    pub fn new(pool_name: ZpoolName, kind: DatasetKind) -> Self {
        Self { pool_name, kind }
    }

    pub fn pool(&self) -> &ZpoolName {
        &self.pool_name
    }

    pub fn dataset(&self) -> &DatasetKind {
        &self.kind
    }

    pub fn full(&self) -> String {
        format!("{}/{}", self.pool_name, self.kind)
    }

    /// Returns the mountpoint of this dataset beneath `root`.
    ///
    /// `root` is usually `/`, but tests and non-global zones mount pools
    /// elsewhere.
    pub fn mountpoint(&self, root: &Utf8Path) -> Utf8PathBuf {
        let mountpoint =
            self.pool_name.dataset_mountpoint(&self.kind.to_string());
        root.join(mountpoint.strip_prefix("/").unwrap_or(&mountpoint))
    }
}

/// Describes a request to provision a specific dataset
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
pub struct DatasetRequest {
    pub id: Uuid,
    pub name: DatasetName,
    pub service_address: SocketAddrV6,
}
