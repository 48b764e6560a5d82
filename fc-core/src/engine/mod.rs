//! Fan control engine modules
//!
//! Contains the sensor classifier, the level mapping and the control loop.

mod classify;
mod control;
mod curve;

pub use classify::{classify, is_temperature_key, release_fans, FanDescriptor, Inventory, SensorGroup};
pub use control::{
    is_reassert_tick, ControlConfig, ControlLoop, ShutdownToken, TickObserver, TickReport,
};
pub use curve::{apply_floor, normalize, percent_from_lin, poll_interval, RollingWindow};
