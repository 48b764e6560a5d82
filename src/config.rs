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

//! Command line and config file handling
//!
//! Settings come from three places, later ones winning: built-in defaults,
//! an optional JSON config file, and the command line.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use fc_core::ControlConfig;
use fc_error::{FancurveError, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "FANCURVE_CONFIG";

/// Config file read when nothing else names one and it exists
pub const SYSTEM_CONFIG_PATH: &str = "/etc/fancurve/config.json";

/// Contents of the JSON config file; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub raise_floor: Option<bool>,
    #[serde(default)]
    pub log: Option<bool>,
    /// Simulated controller profile
    #[serde(default)]
    pub profile: Option<PathBuf>,
    #[serde(default)]
    pub json_log: Option<PathBuf>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Unknown argument: {0}")]
    Unknown(String),

    #[error("{0} requires a path argument")]
    MissingValue(String),
}

/// Parsed command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    /// `log` / `nolog`, the last one given wins
    pub log: Option<bool>,
    /// `high`: keep the fans at or above the raised floor
    pub high: bool,
    pub sim: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub json_log: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Args),
    Help,
    Version,
}

/// Parse arguments, program name excluded
pub fn parse_args<I>(args: I) -> std::result::Result<Command, ArgsError>
where
    I: IntoIterator<Item = String>,
{
    let args: Vec<String> = args.into_iter().collect();
    let mut parsed = Args::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "log" => parsed.log = Some(true),
            "nolog" => parsed.log = Some(false),
            "high" => parsed.high = true,
            flag @ ("--sim" | "--config" | "--json-log") => {
                i += 1;
                let value = args
                    .get(i)
                    .map(PathBuf::from)
                    .ok_or_else(|| ArgsError::MissingValue(flag.to_string()))?;
                match flag {
                    "--sim" => parsed.sim = Some(value),
                    "--config" => parsed.config = Some(value),
                    _ => parsed.json_log = Some(value),
                }
            }
            arg => return Err(ArgsError::Unknown(arg.to_string())),
        }
        i += 1;
    }

    Ok(Command::Run(parsed))
}

/// Config file to read: `--config`, then `$FANCURVE_CONFIG`, then the
/// system path if present
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let system = Path::new(SYSTEM_CONFIG_PATH);
    system.exists().then(|| system.to_path_buf())
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path).map_err(|source| FancurveError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content)
        .map_err(|e| FancurveError::config(format!("{}: {}", path.display(), e)))
}

/// Everything the service needs to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub control: ControlConfig,
    pub profile: Option<PathBuf>,
    pub json_log: Option<PathBuf>,
}

impl Settings {
    /// Merge command line over file. Tick logging defaults to `tty`.
    pub fn resolve(args: &Args, file: &FileConfig, tty: bool) -> Self {
        Self {
            control: ControlConfig {
                raise_floor: args.high || file.raise_floor.unwrap_or(false),
                log_enabled: args.log.or(file.log).unwrap_or(tty),
            },
            profile: args.sim.clone().or_else(|| file.profile.clone()),
            json_log: args.json_log.clone().or_else(|| file.json_log.clone()),
        }
    }
}

/// Read the config file, if any, and merge the command line over it
pub fn load_settings(args: &Args, tty: bool) -> Result<Settings> {
    let file = match config_path(args.config.as_deref()) {
        Some(path) => {
            debug!(path = %path.display(), "loading config file");
            load_file_config(&path)?
        }
        None => FileConfig::default(),
    };
    Ok(Settings::resolve(args, &file, tty))
}
