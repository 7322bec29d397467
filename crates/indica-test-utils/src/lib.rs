// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Indica integration tests.
//!
//! Provides a mock SMS provider and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockTextProvider`] - Mock SMS provider with scripted outcomes and send capture
//! - [`TestHarness`] - Temp database, flow engine and queue processor wired together

pub mod harness;
pub mod mock_provider;

pub use harness::{TEST_SENDER, TEST_TENANT, TestHarness, TestHarnessBuilder};
pub use mock_provider::{MockTextProvider, SentText};
