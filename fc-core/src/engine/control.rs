//! Fan curve control loop
//!
//! One cooperative loop on the calling thread. Each tick reads every
//! classified sensor, finds the one closest to (or furthest past) its limit,
//! smooths the resulting level and writes a target to every usable fan. The
//! loop owns the controller session; fans are handed back to automatic
//! control when it ends, however it ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fc_error::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::classify::{classify, release_fans, Inventory};
use super::curve::{apply_floor, normalize, percent_from_lin, poll_interval, RollingWindow};
use crate::constants::{fan_mode, timing};
use crate::smc::{ControllerSession, DockState, Key, Smc};

/// Runtime options for the control loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Never run the fans below the raised floor level
    pub raise_floor: bool,
    /// Report every tick to the status observer
    pub log_enabled: bool,
}

/// Cooperative termination request shared with signal handlers
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    requested: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep up to `duration`, waking early on a termination request
    ///
    /// Returns whether termination was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(timing::SHUTDOWN_POLL));
        }
    }
}

/// What one tick observed and did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    /// 1 is the startup probe, so the first loop tick is 2
    pub tick: u64,
    pub raw_percent: u8,
    /// Median of the last three raw levels
    pub effective_percent: u8,
    /// Effective level after the floor clamp, as written to the fans
    pub applied_percent: u8,
    /// Hottest sensor relative to its bounds, and its reading
    pub dominant: Option<(Key, f64)>,
    pub docked: bool,
    pub reasserted: bool,
    pub write_failures: usize,
    pub sleep: Duration,
}

/// Receives tick reports from [`ControlLoop::run`]
pub trait TickObserver {
    /// Every tick
    fn on_tick(&mut self, _report: &TickReport) {}

    /// Every tick while [`ControlConfig::log_enabled`] is set
    fn on_status(&mut self, report: &TickReport);
}

impl<F: FnMut(&TickReport)> TickObserver for F {
    fn on_status(&mut self, report: &TickReport) {
        self(report)
    }
}

/// Whether loop tick `tick` re-issues manual mode
///
/// Counting the startup probe as tick 1, manual mode goes out again on
/// ticks 12, 23, 34 and so on.
pub fn is_reassert_tick(tick: u64) -> bool {
    tick > 1 && (tick - 1) % timing::REASSERT_PERIOD_TICKS == 0
}

/// The running fan controller
pub struct ControlLoop<S: ControllerSession, D: DockState> {
    smc: Smc<S>,
    inventory: Inventory,
    dock: D,
    config: ControlConfig,
    window: RollingWindow,
    tick: u64,
    released: bool,
}

impl<S: ControllerSession, D: DockState> ControlLoop<S, D> {
    /// Classify the controller and take over its fans
    ///
    /// On failure the session is closed before returning.
    pub fn start(mut smc: Smc<S>, dock: D, config: ControlConfig) -> Result<Self> {
        let inventory = classify(&mut smc)?;
        Ok(Self::new(smc, inventory, dock, config))
    }

    /// Wrap an already classified controller
    pub fn new(smc: Smc<S>, inventory: Inventory, dock: D, config: ControlConfig) -> Self {
        Self {
            smc,
            inventory,
            dock,
            config,
            window: RollingWindow::new(),
            tick: 1,
            released: false,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn config(&self) -> ControlConfig {
        self.config
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn smc(&self) -> &Smc<S> {
        &self.smc
    }

    pub fn smc_mut(&mut self) -> &mut Smc<S> {
        &mut self.smc
    }

    /// Ticks so far, including the startup probe
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Hottest sensor as `(key, reading, lin)`
    ///
    /// Unreadable sensors decode to NaN and never win.
    fn hottest(&mut self, docked: bool) -> Option<(Key, f64, f64)> {
        let mut hottest: Option<(Key, f64, f64)> = None;
        for (group, key) in self.inventory.iter_sensors() {
            let value = self.smc.read_num(key);
            let lin = normalize(value, group.bounds(docked));
            if lin.is_nan() {
                continue;
            }
            if hottest.map_or(true, |(_, _, best)| lin > best) {
                hottest = Some((key, value, lin));
            }
        }
        hottest
    }

    fn reassert_manual(&mut self) {
        for fan in &self.inventory.fans {
            if let Err(e) = self.smc.write_int(fan.mode_key(), fan_mode::MANUAL) {
                warn!(fan = fan.id, error = %e, "failed to re-assert manual mode");
            }
        }
    }

    fn apply(&mut self, percent: u8) -> usize {
        let mut failures = 0;
        for fan in &self.inventory.fans {
            let target = fan.target_for(percent);
            if let Err(e) = self.smc.write_num(fan.target_key(), target) {
                debug!(fan = fan.id, target, error = %e, "fan target write failed");
                failures += 1;
            }
        }
        failures
    }

    /// Run one tick: read, quantize, re-assert when due, smooth, actuate
    ///
    /// Never fails; unreadable sensors and failed writes are skipped for
    /// this tick only.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        self.inventory.resolve_pending(&mut self.smc);
        let docked = self.dock.is_docked();

        let hottest = self.hottest(docked);
        let raw_percent = hottest.map_or(0, |(_, _, lin)| percent_from_lin(lin));

        let reasserted = is_reassert_tick(self.tick);
        if reasserted {
            debug!(tick = self.tick, "re-asserting manual mode");
            self.reassert_manual();
        }

        let effective_percent = self.window.push(raw_percent);
        let applied_percent = apply_floor(effective_percent, self.config.raise_floor);
        let write_failures = self.apply(applied_percent);

        let report = TickReport {
            tick: self.tick,
            raw_percent,
            effective_percent,
            applied_percent,
            dominant: hottest.map(|(key, value, _)| (key, value)),
            docked,
            reasserted,
            write_failures,
            sleep: poll_interval(raw_percent),
        };
        debug!(
            tick = report.tick,
            raw = raw_percent,
            effective = effective_percent,
            applied = applied_percent,
            "tick"
        );
        report
    }

    /// Tick until `token` is set, then hand the fans back
    ///
    /// Returns the number of loop ticks run.
    pub fn run<O: TickObserver + ?Sized>(&mut self, token: &ShutdownToken, observer: &mut O) -> u64 {
        info!(fans = self.inventory.fans.len(), "control loop starting");
        let mut ran = 0;

        while !token.is_requested() {
            let report = self.tick();
            ran += 1;

            observer.on_tick(&report);
            if self.config.log_enabled {
                observer.on_status(&report);
            }

            if token.sleep(report.sleep) {
                break;
            }
        }

        info!(ticks = ran, "control loop stopping");
        self.shutdown();
        ran
    }

    /// Return every fan to automatic control, once
    ///
    /// Returns how many fans could not be reverted.
    pub fn shutdown(&mut self) -> usize {
        if self.released {
            return 0;
        }
        self.released = true;
        let failures = release_fans(&mut self.smc, &self.inventory.fans);
        info!(
            fans = self.inventory.fans.len(),
            failures, "fans returned to automatic control"
        );
        failures
    }
}

impl<S: ControllerSession, D: DockState> Drop for ControlLoop<S, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FanDescriptor;
    use crate::hw::{SimHandle, SimKey, SimProfile, SimSession};
    use crate::smc::TypeTag;

    fn key(name: &str) -> Key {
        name.parse().unwrap()
    }

    fn profile(sensors: &[(&str, f64)]) -> SimProfile {
        let mut keys: Vec<SimKey> = sensors
            .iter()
            .map(|(name, value)| SimKey::new(key(name), TypeTag::SP78, *value))
            .collect();
        keys.push(SimKey::new(key("F0Tg"), TypeTag::FLT, 1000.0));
        keys.push(SimKey::new(key("F0Md"), TypeTag::UI8, 0.0));
        keys.push(SimKey::new(key("F0Mn"), TypeTag::FLT, 1000.0).read_only());
        keys.push(SimKey::new(key("F0Mx"), TypeTag::FLT, 6000.0).read_only());
        SimProfile { docked: false, keys }
    }

    fn start(
        sensors: &[(&str, f64)],
        config: ControlConfig,
    ) -> (ControlLoop<SimSession, SimHandle>, SimHandle) {
        let session = SimSession::new(&profile(sensors)).unwrap();
        let handle = session.handle();
        let control = ControlLoop::start(Smc::new(session), handle.clone(), config).unwrap();
        (control, handle)
    }

    #[test]
    fn test_reassert_ticks() {
        let due: Vec<u64> = (1..=25).filter(|t| is_reassert_tick(*t)).collect();
        assert_eq!(due, vec![12, 23]);
    }

    #[test]
    fn test_first_tick_is_full_speed_pulse() {
        let (mut control, handle) = start(&[("TC0D", 40.0)], ControlConfig::default());
        let report = control.tick();
        assert_eq!(report.tick, 2);
        assert_eq!(report.raw_percent, 0);
        assert_eq!(report.effective_percent, 99);
        assert_eq!(handle.value(key("F0Tg")), Some(6000.0));
    }

    #[test]
    fn test_hot_scenario_settles_at_fifty() {
        let (mut control, handle) = start(&[("TC0D", 89.0)], ControlConfig::default());
        let reports: Vec<TickReport> = (0..3).map(|_| control.tick()).collect();

        assert!(reports.iter().all(|r| r.raw_percent == 50));
        assert_eq!(reports[2].effective_percent, 50);
        assert_eq!(reports[2].dominant, Some((key("TC0D"), 89.0)));

        let target = handle.value(key("F0Tg")).unwrap();
        let expected = FanDescriptor { id: 0, min: 1000.0, max: 6000.0 }.target_for(50);
        assert!((target - expected).abs() < 0.5);
        assert!((target - 3525.25).abs() < 0.5);
    }

    #[test]
    fn test_dominant_is_highest_relative_position() {
        // 60 in "other" (60..70) is lin 0.0, 90 in "hot" (82..96) is lin ~0.57
        let (mut control, _handle) =
            start(&[("TB0T", 60.0), ("TC0D", 90.0)], ControlConfig::default());
        let report = control.tick();
        assert_eq!(report.dominant, Some((key("TC0D"), 90.0)));
    }

    #[test]
    fn test_skin_bounds_follow_dock_each_tick() {
        let (mut control, handle) = start(&[("Ts0S", 40.0)], ControlConfig::default());
        // undocked: 40 is the top of (36, 40)
        assert_eq!(control.tick().raw_percent, 99);
        handle.set_docked(true);
        // docked: 40 is the bottom of (40, 45)
        let report = control.tick();
        assert!(report.docked);
        assert_eq!(report.raw_percent, 0);
    }

    #[test]
    fn test_floor_clamp_applied_after_smoothing() {
        let config = ControlConfig { raise_floor: true, log_enabled: false };
        // warm bounds (65, 79): lin ~0.4 -> 40
        let (mut control, handle) = start(&[("TPCD", 70.6)], config);
        for _ in 0..3 {
            control.tick();
        }
        let report = control.tick();
        assert_eq!(report.effective_percent, 40);
        assert_eq!(report.applied_percent, 68);
        let expected = FanDescriptor { id: 0, min: 1000.0, max: 6000.0 }.target_for(68);
        assert!((handle.value(key("F0Tg")).unwrap() - expected).abs() < 0.5);
    }

    #[test]
    fn test_unreadable_sensor_does_not_stall() {
        let mut profile = profile(&[("TC0D", 89.0)]);
        // an encoding the codec does not know decodes to NaN every tick
        profile.keys.push(SimKey::new(key("TC1D"), "fp97".parse().unwrap(), 0.0));
        let session = SimSession::new(&profile).unwrap();
        let handle = session.handle();

        let mut control =
            ControlLoop::start(Smc::new(session), false, ControlConfig::default()).unwrap();
        assert_eq!(control.inventory().sensor_count(), 2);
        for _ in 0..3 {
            let report = control.tick();
            assert_eq!(report.dominant.map(|(k, _)| k), Some(key("TC0D")));
            assert_eq!(report.raw_percent, 50);
        }
        drop(control);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_hot_sensor_joins_after_startup_hiccups() {
        let mut profile = profile(&[("TB0T", 60.0)]);
        profile.keys.push(SimKey::new(key("TC0D"), TypeTag::SP78, 96.0).flaky_info(3));
        let session = SimSession::new(&profile).unwrap();
        let mut control =
            ControlLoop::start(Smc::new(session), false, ControlConfig::default()).unwrap();
        assert_eq!(control.inventory().pending(), &[key("TC0D")]);

        let first = control.tick();
        assert_eq!(first.dominant, Some((key("TB0T"), 60.0)));
        assert_eq!(first.raw_percent, 0);

        let second = control.tick();
        assert_eq!(second.dominant, Some((key("TC0D"), 96.0)));
        assert_eq!(second.raw_percent, 99);
        assert_eq!(control.inventory().sensor_count(), 2);
    }

    #[test]
    fn test_cool_system_idles_fans() {
        let (mut control, handle) = start(&[("TC0D", 89.0)], ControlConfig::default());
        handle.set_value(key("TC0D"), 20.0).unwrap();
        for _ in 0..3 {
            control.tick();
        }
        let report = control.tick();
        assert_eq!(report.raw_percent, 0);
        assert_eq!(report.effective_percent, 0);
        assert_eq!(handle.value(key("F0Tg")), Some(1000.0));
    }

    #[test]
    fn test_run_stops_on_request_and_releases_fans() {
        let (mut control, handle) = start(&[("TC0D", 100.0)], ControlConfig {
            raise_floor: false,
            log_enabled: true,
        });
        let token = ShutdownToken::new();
        let stopper = token.clone();

        let mut statuses = Vec::new();
        let mut observer = |report: &TickReport| {
            statuses.push(report.effective_percent);
            stopper.request();
        };
        let ran = control.run(&token, &mut observer);

        assert_eq!(ran, 1);
        assert_eq!(statuses, vec![99]);
        assert_eq!(handle.value(key("F0Md")), Some(0.0));
        // release happens once even if dropped later
        assert_eq!(control.shutdown(), 0);
        assert_eq!(handle.writes_to(key("F0Md")), vec![1.0, 0.0]);
    }

    #[test]
    fn test_status_only_when_logging() {
        struct Counter {
            ticks: u32,
            statuses: u32,
            token: ShutdownToken,
        }
        impl TickObserver for Counter {
            fn on_tick(&mut self, _report: &TickReport) {
                self.ticks += 1;
                self.token.request();
            }
            fn on_status(&mut self, _report: &TickReport) {
                self.statuses += 1;
            }
        }

        let (mut control, _handle) = start(&[("TC0D", 100.0)], ControlConfig::default());
        let token = ShutdownToken::new();
        let mut counter = Counter { ticks: 0, statuses: 0, token: token.clone() };
        control.run(&token, &mut counter);
        assert_eq!(counter.ticks, 1);
        assert_eq!(counter.statuses, 0);
    }

    #[test]
    fn test_drop_releases_fans() {
        let (control, handle) = start(&[("TC0D", 60.0)], ControlConfig::default());
        drop(control);
        assert_eq!(handle.value(key("F0Md")), Some(0.0));
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_token_sleep_wakes_early() {
        let token = ShutdownToken::new();
        token.request();
        let started = Instant::now();
        assert!(token.sleep(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!ShutdownToken::new().sleep(Duration::from_millis(1)));
    }
}
