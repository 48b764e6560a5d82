/*
 * This file is part of Fancurve.
 *
 * Copyright (C) 2025 Fancurve contributors
 *
 * Fancurve is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Fancurve is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Fancurve. If not, see <https://www.gnu.org/licenses/>.
 */

//! Fancurve - temperature-driven fan curves for SMC-managed machines
//!
//! This library wires the fan control engine from `fc_core` into a process:
//! command line and config file handling, the JSON event log, the terminal
//! status line and the service entry point.

pub mod config;
pub mod logger;
pub mod service;
pub mod status;

#[cfg(test)]
pub mod test_utils;
