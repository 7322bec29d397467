// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the queue, flow and template tables.

pub mod flows;
pub mod queue;
pub mod templates;
