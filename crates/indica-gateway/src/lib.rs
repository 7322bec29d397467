// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Administrative HTTP API for the Indica delivery engine.
//!
//! Exposes queue inspection and control, trigger ingestion, and flow and
//! template management behind a bearer token. `/health` stays public for
//! process supervisors.

pub mod auth;
pub mod catalog;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, HealthState, ServerConfig, router, start_server};
