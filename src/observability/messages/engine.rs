// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for engine client lifecycle and step events.

use std::fmt::{Display, Formatter};

use tracing::Span;

use crate::observability::messages::StructuredLog;

/// A step RPC was dispatched to an engine.
///
/// # Log Level
/// `debug!` - High-frequency operational event
pub struct StepDispatched<'a> {
    pub engine: &'a str,
    pub time_step_ns: i64,
}

impl Display for StepDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatched step of {}ns to engine '{}'",
            self.time_step_ns, self.engine
        )
    }
}

impl StructuredLog for StepDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            engine = self.engine,
            time_step_ns = self.time_step_ns,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "step_dispatched",
            span_name = name,
            engine = self.engine,
            time_step_ns = self.time_step_ns,
        )
    }
}

/// An engine completed its step and reported a new simulated time.
///
/// # Log Level
/// `debug!` - High-frequency operational event
pub struct StepCompleted<'a> {
    pub engine: &'a str,
    pub engine_time_ns: i64,
}

impl Display for StepCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Engine '{}' completed its step at {}ns",
            self.engine, self.engine_time_ns
        )
    }
}

impl StructuredLog for StepCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            engine = self.engine,
            engine_time_ns = self.engine_time_ns,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "step_completed",
            span_name = name,
            engine = self.engine,
            engine_time_ns = self.engine_time_ns,
        )
    }
}

/// An engine failed to answer within its configured budget.
///
/// # Log Level
/// `error!` - Fatal to the current run
pub struct StepTimedOut<'a> {
    pub engine: &'a str,
}

impl Display for StepTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Engine '{}' loop is taking too long to complete",
            self.engine
        )
    }
}

impl StructuredLog for StepTimedOut<'_> {
    fn log(&self) {
        tracing::error!(engine = self.engine, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("step_timed_out", span_name = name, engine = self.engine)
    }
}
