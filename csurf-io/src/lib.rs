//! # csurf-io
//!
//! MIDI and OSC transport for control surfaces: widget templates (`.mst`,
//! `.ost`), message generators and feedback processors, shared hardware
//! ports, and construction of pages from CSI.ini.
//!
//! - [`midi_widgets`] / [`osc_widgets`] - template parsing
//! - [`midi`] / [`osc`] - [`SurfaceIo`](csurf_core::surface::SurfaceIo) implementations
//! - [`ports`] - port and socket sharing
//! - [`mcu`] - Mackie Control sysex
//! - [`builder`] - surfaces and pages from CSI.ini definitions

pub mod builder;
pub mod error;
pub mod mcu;
pub mod midi;
pub mod midi_widgets;
pub mod osc;
pub mod osc_widgets;
pub mod ports;

pub use builder::{build_pages, build_surface, BuildReport};
pub use error::IoError;
pub use ports::PortRegistry;
