// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod client;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod integration_tests;

pub use client::{EngineClient, EngineState, MIN_RPC_TIMEOUT};
pub use server::{DataPackController, EngineAdapter, EngineServer, EngineSyncService};
