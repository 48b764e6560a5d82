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

//! Service entry point
//!
//! Opens the controller, classifies it, runs the control loop until a
//! termination request arrives and hands the fans back on the way out.

use std::path::Path;

use fc_core::{
    Connector, ControlConfig, ControlLoop, DockState, ShutdownToken, SimConnector, Smc,
    TickObserver,
};
use fc_error::{FancurveError, Result};
use serde_json::json;
use tracing::info;

use crate::config::Settings;
use crate::logger;
use crate::status::{StatusLine, TickLog};

/// What a completed run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub sensors: usize,
    pub fans: usize,
    pub ticks: u64,
}

/// Open the simulated controller described by `profile`
///
/// Without a profile there is no controller to talk to.
pub fn open_connector(profile: Option<&Path>) -> Result<SimConnector> {
    let path = profile.ok_or_else(|| {
        FancurveError::session("no controller transport available; pass --sim PROFILE")
    })?;
    SimConnector::from_file(path)
        .map_err(|e| FancurveError::session(format!("{}: {}", path.display(), e)))
}

/// Classify the controller behind `connector` and run until `token` is set
///
/// Fails only at startup: when the session cannot be opened or when there
/// are no sensors or no usable fans. Fans are always returned to automatic
/// control before this returns `Ok`.
pub fn run<C, D, O>(
    connector: &C,
    dock: D,
    config: ControlConfig,
    token: &ShutdownToken,
    observer: &mut O,
) -> Result<RunSummary>
where
    C: Connector,
    D: DockState,
    O: TickObserver + ?Sized,
{
    let session = connector.open().map_err(|e| match e {
        FancurveError::SessionUnavailable(_) => e,
        other => FancurveError::session(other.to_string()),
    })?;
    let mut control = ControlLoop::start(Smc::new(session), dock, config)?;

    let inventory = control.inventory();
    let groups: serde_json::Map<String, serde_json::Value> = fc_core::SensorGroup::ALL
        .iter()
        .map(|g| {
            let keys: Vec<String> = inventory.sensors(*g).iter().map(|k| k.to_string()).collect();
            (g.name().to_string(), json!(keys))
        })
        .collect();
    logger::log_event("classified", json!({ "sensors": groups, "fans": inventory.fans }));

    let summary = RunSummary {
        sensors: inventory.sensor_count(),
        fans: inventory.fans.len(),
        ticks: 0,
    };
    let ticks = control.run(token, observer);

    logger::log_event("shutdown", json!({ "ticks": ticks }));
    info!(ticks, "fancurve stopped");
    Ok(RunSummary { ticks, ..summary })
}

/// Run with resolved settings: simulated controller, status line on stderr
pub fn run_with_settings(settings: &Settings, token: &ShutdownToken) -> Result<RunSummary> {
    let connector = open_connector(settings.profile.as_deref())?;
    let dock = connector.handle();

    let mut status = StatusLine::stderr();
    if settings.control.log_enabled {
        if let Err(e) = status.reserve() {
            tracing::debug!(error = %e, "could not reserve status window");
        }
    }
    let mut observer = TickLog::new(status);
    run(&connector, dock, settings.control, token, &mut observer)
}
