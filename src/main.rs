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

use std::env;
use std::io;
use std::process;

use anyhow::Context;
use crossterm::tty::IsTty;
use fc_core::ShutdownToken;
use fc_error::FancurveError;
use serde_json::json;
use tracing::{error, info, warn};

use fancurve::config::{load_settings, parse_args, Command};
use fancurve::logger;
use fancurve::service;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!(
        r#"fancurve {} - temperature-driven fan curves for SMC-managed machines

USAGE:
    fancurve [OPTIONS] [log|nolog] [high]

WORDS:
    log                 Print a status line every tick (default on a terminal)
    nolog               Never print the status line
    high                Keep the fans at 68% or more

OPTIONS:
    --sim PATH          Drive a simulated controller described by PATH
    --config PATH       Read settings from PATH (default: $FANCURVE_CONFIG,
                        then /etc/fancurve/config.json)
    --json-log PATH     Append JSON events to PATH
    -h, --help          Print this help
    -v, --version       Print version

ENVIRONMENT:
    FANCURVE_LOG        Log filter (default: info)
    FANCURVE_CONFIG     Config file path
"#,
        VERSION
    );
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);
        logger::log_event("fatal_error", json!({ "panic": message, "location": location }));
    }));
}

fn init_tracing() -> String {
    let log_level = env::var("FANCURVE_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(io::stderr)
        .with_env_filter(&log_level)
        .init();
    log_level
}

fn main() -> anyhow::Result<()> {
    install_panic_hook();

    let args = match parse_args(env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Version) => {
            println!("fancurve {}", VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            process::exit(1);
        }
    };

    let log_level = init_tracing();
    let tty = io::stderr().is_tty();
    let settings = load_settings(&args, tty).context("failed to load configuration")?;

    if let Some(path) = &settings.json_log {
        logger::init_logging(path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;
    }
    logger::log_event(
        "startup",
        json!({
            "version": VERSION,
            "raise_floor": settings.control.raise_floor,
            "log": settings.control.log_enabled,
            "profile": settings.profile,
        }),
    );
    info!("fancurve {} starting (log level {})", VERSION, log_level);

    let token = ShutdownToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("termination requested");
        handler_token.request();
    }) {
        warn!("Failed to set signal handler: {}. Fans are only released on a clean exit.", e);
    }

    match service::run_with_settings(&settings, &token) {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                fans = summary.fans,
                "all fans returned to automatic control"
            );
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            logger::log_event("fatal_error", json!({ "error": e.to_string() }));
            if matches!(e, FancurveError::NoFans) && unsafe { libc::geteuid() } != 0 {
                eprintln!("You probably need to run fancurve as root.");
            }
            process::exit(1);
        }
    }
}
