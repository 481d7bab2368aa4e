// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for FTI loop iteration events.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// One synchronized iteration finished across all engines.
///
/// # Log Level
/// `debug!` - High-frequency operational event
pub struct IterationCompleted {
    pub iteration: u64,
    pub engine_count: usize,
    pub duration: std::time::Duration,
}

impl Display for IterationCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Iteration {} completed across {} engines in {:?}",
            self.iteration, self.engine_count, self.duration
        )
    }
}

impl StructuredLog for IterationCompleted {
    fn log(&self) {
        tracing::debug!(
            iteration = self.iteration,
            engine_count = self.engine_count,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "iteration",
            span_name = name,
            iteration = self.iteration,
            engine_count = self.engine_count,
        )
    }
}

/// The loop finished its configured run.
///
/// # Log Level
/// `info!` - Important operational event
pub struct LoopCompleted {
    pub iterations: u64,
    pub duration: std::time::Duration,
}

impl Display for LoopCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Synchronization loop completed {} iterations in {:?}",
            self.iterations, self.duration
        )
    }
}

impl StructuredLog for LoopCompleted {
    fn log(&self) {
        tracing::info!(
            iterations = self.iterations,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("loop_completed", span_name = name, iterations = self.iterations)
    }
}

/// The loop aborted mid-iteration.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct LoopAborted<'a> {
    pub iteration: u64,
    pub error: &'a dyn std::error::Error,
}

impl Display for LoopAborted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Synchronization loop aborted during iteration {}: {}",
            self.iteration, self.error
        )
    }
}

impl StructuredLog for LoopAborted<'_> {
    fn log(&self) {
        tracing::error!(
            iteration = self.iteration,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "loop_aborted",
            span_name = name,
            iteration = self.iteration,
            error = %self.error,
        )
    }
}
