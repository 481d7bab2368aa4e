// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Message types follow a struct-based pattern with a `Display`
//! implementation so that log strings live in one place instead of being
//! scattered through the codebase. Messages are organized by subsystem:
//!
//! * `messages::engine` - engine client lifecycle and step events
//! * `messages::sync_loop` - FTI loop iteration events

pub mod messages;
