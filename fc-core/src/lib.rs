//! Fancurve Core Library
//!
//! Temperature-driven fan control for machines whose fans and sensors sit
//! behind a system management controller addressed by four-character keys.
//!
//! # Module Structure
//!
//! - `smc/` - Key model, value codec, session traits, metadata cache
//! - `hw/` - Controller backends (simulated controller, index enumeration)
//! - `engine/` - Sensor classifier, level mapping, control loop
//!
//! # Example
//!
//! ```no_run
//! use fc_core::{ControlConfig, ControlLoop, ShutdownToken, SimConnector, SimProfile, Smc};
//! use fc_core::Connector;
//!
//! let connector = SimConnector::new(&SimProfile::default()).unwrap();
//! let dock = connector.handle();
//! let smc = Smc::new(connector.open().unwrap());
//!
//! let mut control = ControlLoop::start(smc, dock, ControlConfig::default()).unwrap();
//! control.run(&ShutdownToken::new(), &mut |_: &fc_core::TickReport| {});
//! ```

// Grouped modules
pub mod engine;
pub mod hw;
pub mod smc;

// Standalone modules
pub mod constants;

pub use fc_error::{FancurveError, Result};

// Re-export engine types
pub use engine::{
    classify, ControlConfig, ControlLoop, FanDescriptor, Inventory, RollingWindow, SensorGroup,
    ShutdownToken, TickObserver, TickReport,
};

// Re-export backends
pub use hw::{enumerate_by_index, key_count, IndexedKeys, SimConnector, SimHandle, SimKey, SimProfile, SimSession};

// Re-export controller access
pub use smc::{
    Connector, ControllerSession, DockState, InfoError, InfoState, Key, KeyInfo, RawValue, Smc,
    TypeTag,
};
