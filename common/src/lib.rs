// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Rack setup: common facilities
//!
//! Validated value types, addressing, and persistence helpers shared by the
//! rack setup service and the sled agent.  Everything here is agnostic to the
//! transport used to exchange these structures.

// We only use rustdoc for internal documentation, including private items, so
// it's expected that we'll have links to private items in the docs.
#![allow(rustdoc::private_intra_doc_links)]

pub mod address;
pub mod api;
pub mod cmd;
pub mod ledger;
pub mod zpool_name;
