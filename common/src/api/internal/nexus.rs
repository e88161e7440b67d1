// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types handed to the control plane when the rack is initialized

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A PEM-encoded certificate chain and its private key
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub struct Certificate {
    pub cert: String,
    pub key: String,
}

// Never print the private key.
impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("cert", &self.cert)
            .field("key", &"<redacted>")
            .finish()
    }
}
