// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.

use tracing::Span;

pub mod engine;
pub mod sync_loop;

/// Emit a message through `tracing` with structured fields attached, or
/// open a span carrying the same fields.
pub trait StructuredLog {
    fn log(&self);

    fn span(&self, name: &str) -> Span;
}
