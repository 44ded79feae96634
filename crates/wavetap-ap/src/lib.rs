//! # wavetap-ap
//!
//! The access-point subsystem of the wavetap handheld: the five-mode
//! controller (Off, Normal, Hidden, Repeater, Honeypot), the connected
//! client registry with persisted MAC blocking and forced disconnect,
//! and the bounded single-client packet-capture engine.
//!
//! The controller is the sole owner of all mutable subsystem state and
//! is driven from the device's single-threaded main loop; only the two
//! driver hooks (frame observation, station admission) run off it, and
//! they touch nothing but bounded shared buffers and a blocklist lookup.

pub mod capture;
pub mod clients;
pub mod config;
pub mod controller;
pub mod error;
pub mod transition;

pub use capture::{CaptureEngine, CapturedFrameRecord, FRAME_CAPACITY};
pub use clients::{Blocklist, BlocklistView, ClientRegistry, ConnectedClient};
pub use config::{AccessPointConfig, ApMode, ApSettings};
pub use controller::{ApController, ApStatus};
pub use error::{ApError, Result, TransitionStage};
