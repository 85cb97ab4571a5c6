// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Key/value storage backends for warden

mod file;
mod memory;
mod table;

pub use file::JsonFileStorage;
pub use memory::MemoryStorage;
pub use table::{matches_filter, Filter, Record, Storage, StorageError};
