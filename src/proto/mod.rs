// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

// Module declaration for generated protobuf code
#[path = "lockstride.v1.rs"]
pub mod lockstride_v1;

// Re-export the types for easier access
pub use lockstride_v1::{DataPackMessage, RunLoopStepReply, RunLoopStepRequest};
