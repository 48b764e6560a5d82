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

//! Per-tick status output
//!
//! Prints `NN% VVV.VV KKKK` for every tick: raw level, reading of the
//! hottest sensor and its key. On a terminal the lines cycle through a fixed
//! window instead of scrolling.

use std::io::{self, Stderr, Write};

use crossterm::cursor::MoveUp;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::tty::IsTty;
use fc_core::{TickObserver, TickReport};
use serde_json::json;
use tracing::warn;

use crate::logger;

/// Height of the terminal status window
pub const STATUS_WINDOW_LINES: u16 = 10;

pub fn format_status(report: &TickReport) -> String {
    match report.dominant {
        Some((key, value)) => format!("{:02}% {:6.2} {}", report.raw_percent, value, key),
        None => format!("{:02}% {:>6} ----", report.raw_percent, "--"),
    }
}

/// Writes status lines to a terminal or a plain stream
pub struct StatusLine<W: Write> {
    out: W,
    tty: bool,
    printed: u16,
}

impl StatusLine<Stderr> {
    pub fn stderr() -> Self {
        let tty = io::stderr().is_tty();
        Self::new(io::stderr(), tty)
    }
}

impl<W: Write> StatusLine<W> {
    pub fn new(out: W, tty: bool) -> Self {
        Self { out, tty, printed: 0 }
    }

    pub fn is_tty(&self) -> bool {
        self.tty
    }

    /// Blank the window below the cursor and return to its top
    pub fn reserve(&mut self) -> io::Result<()> {
        if !self.tty {
            return Ok(());
        }
        for _ in 0..STATUS_WINDOW_LINES {
            queue!(self.out, Clear(ClearType::CurrentLine), Print("\n"))?;
        }
        queue!(self.out, Clear(ClearType::CurrentLine), MoveUp(STATUS_WINDOW_LINES))?;
        self.out.flush()
    }

    pub fn write(&mut self, report: &TickReport) -> io::Result<()> {
        if self.tty && self.printed >= STATUS_WINDOW_LINES {
            queue!(self.out, MoveUp(STATUS_WINDOW_LINES))?;
            self.printed = 0;
        }
        queue!(self.out, Print(format_status(report)), Print("\n"))?;
        if self.tty {
            // wipe the previous cycle's line below
            queue!(self.out, Clear(ClearType::CurrentLine))?;
            self.printed += 1;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Tick observer for the service: JSON events plus the status line
pub struct TickLog<W: Write> {
    status: StatusLine<W>,
}

impl<W: Write> TickLog<W> {
    pub fn new(status: StatusLine<W>) -> Self {
        Self { status }
    }

    pub fn into_inner(self) -> StatusLine<W> {
        self.status
    }
}

impl<W: Write> TickObserver for TickLog<W> {
    fn on_tick(&mut self, report: &TickReport) {
        if logger::is_enabled() {
            logger::log_event(
                "tick",
                json!({
                    "tick": report.tick,
                    "raw_percent": report.raw_percent,
                    "effective_percent": report.effective_percent,
                    "applied_percent": report.applied_percent,
                    "dominant_key": report.dominant.map(|(k, _)| k.to_string()),
                    "dominant_value": report.dominant.map(|(_, v)| v),
                    "docked": report.docked,
                    "reasserted": report.reasserted,
                    "write_failures": report.write_failures,
                }),
            );
        }
    }

    fn on_status(&mut self, report: &TickReport) {
        if let Err(e) = self.status.write(report) {
            warn!(error = %e, "failed to write status line");
        }
    }
}
