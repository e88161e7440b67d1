// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compares the sleds a rack plan expects with what the sleds report.

use serde::Serialize;
use sled_agent_types::inventory::SledInventory;
use sled_hardware_types::Baseboard;
use std::collections::{BTreeMap, BTreeSet};

/// The differences between the expected and the reported set of sleds
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InventoryReport {
    /// Expected baseboards that no sled reported.
    pub missing: BTreeSet<Baseboard>,
    /// Reported baseboards that were not expected.
    pub unexpected: BTreeSet<Baseboard>,
    /// Baseboards reported by more than one sled.
    pub duplicates: BTreeSet<Baseboard>,
    /// Every version reported for each component, across all sleds.
    pub versions: BTreeMap<String, BTreeSet<semver::Version>>,
}

impl InventoryReport {
    /// Returns true if exactly the expected sleds reported, once each.
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty()
            && self.unexpected.is_empty()
            && self.duplicates.is_empty()
    }

    /// Returns the components reported at more than one version.
    pub fn version_skew(
        &self,
    ) -> impl Iterator<Item = (&str, &BTreeSet<semver::Version>)> + '_ {
        self.versions
            .iter()
            .filter(|(_, versions)| versions.len() > 1)
            .map(|(name, versions)| (name.as_str(), versions))
    }
}

pub fn reconcile(
    expected: impl IntoIterator<Item = Baseboard>,
    reported: &[SledInventory],
) -> InventoryReport {
    let expected: BTreeSet<Baseboard> = expected.into_iter().collect();
    let mut report = InventoryReport::default();

    let mut seen = BTreeSet::new();
    for inventory in reported {
        if !seen.insert(&inventory.baseboard) {
            report.duplicates.insert(inventory.baseboard.clone());
        }
        if !expected.contains(&inventory.baseboard) {
            report.unexpected.insert(inventory.baseboard.clone());
        }
        for component in &inventory.components {
            report
                .versions
                .entry(component.name.clone())
                .or_default()
                .insert(component.version.clone());
        }
    }

    report.missing =
        expected.iter().filter(|b| !seen.contains(b)).cloned().collect();
    report
}
