// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! What a sled reports about itself.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sled_hardware_types::Baseboard;

/// A piece of software running on a sled, and its version
#[derive(
    Clone,
    Debug,
    Serialize,
    Deserialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
pub struct Component {
    pub name: String,
    pub version: semver::Version,
}

/// Identity and software inventory reported by a single sled
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SledInventory {
    pub baseboard: Baseboard,
    pub components: Vec<Component>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_inventory_serde() {
        let inventory = SledInventory {
            baseboard: Baseboard::new_pc("pc-1".into(), "i86pc".into()),
            components: vec![Component {
                name: "sled-agent".to_string(),
                version: semver::Version::new(1, 0, 3),
            }],
        };
        let value = serde_json::to_value(&inventory).unwrap();
        assert_eq!(value["components"][0]["version"], "1.0.3");
        assert_eq!(value["baseboard"]["type"], "pc");
        let back: SledInventory = serde_json::from_value(value).unwrap();
        assert_eq!(back, inventory);
    }
}
