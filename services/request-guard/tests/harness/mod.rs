// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for request guard attack simulation.
//!
//! Drives the composed router with hostile traffic patterns and tallies how
//! each request was answered.

pub mod attacks;
pub mod generators;
pub mod metrics;
