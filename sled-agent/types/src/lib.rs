// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common types for sled-agent.

pub mod dataset;
pub mod inventory;
pub mod rack_init;
pub mod rack_ops;
pub mod sled;
pub mod zone;
