// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod codec;         // per-kind payload codecs
pub mod config;        // config loading + runtime builder
pub mod datapack;      // identifiers, datapacks, per-engine cache
pub mod engine;        // engine RPC client + server scaffold
pub mod errors;        // error taxonomy
pub mod fti;           // fixed-time-interval orchestration loop
pub mod functions;     // transceiver / preprocessing registry
pub mod graph;         // computational graph + event loop
pub mod observability; // structured log messages
pub mod proto;         // generated protobufs live here
