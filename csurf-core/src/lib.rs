//! # csurf-core
//!
//! Zone engine for hardware control surfaces. Zone files bind surface widgets
//! to DAW actions; this crate loads them, keeps track of which zones are
//! active, routes widget input to the right binding and produces feedback.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use csurf_core::config::Config;
//! use csurf_core::daw::OfflineDaw;
//! use csurf_core::integrator::Integrator;
//! use csurf_core::page::Page;
//!
//! let config = Config::load();
//! let mut integrator = Integrator::new(Box::new(OfflineDaw::new()), config);
//! // build pages from CSI.ini and surfaces from csurf-io templates
//! integrator.add_page(page);
//! integrator.initialize();
//! loop {
//!     integrator.run();
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`zone_manager`] - per-surface zone lifecycle: Home, associated zones,
//!   FX zones, learn mode, auto-mapping and garbage collection
//! - [`zone`] / [`zone_file`] - zone instances and the `.zon` format
//! - [`action`] / [`context`] - action registry and per-binding state
//! - [`surface`] / [`page`] / [`integrator`] - the surface, page and
//!   top-level poll loop
//! - [`ini`] - CSI.ini parsing
//! - [`config`] - TOML configuration (embedded defaults + user override)

pub mod action;
pub mod config;
pub mod context;
pub mod daw;
pub mod error;
pub mod fx_layout;
pub mod ini;
pub mod integrator;
pub mod modifiers;
pub mod page;
pub mod steps;
pub mod surface;
pub mod template;
pub mod tokenizer;
pub mod tracks;
pub mod values;
pub mod widget;
pub mod zone;
pub mod zone_file;
pub mod zone_manager;

pub use error::{Diagnostic, IniError, ZoneError};
pub use integrator::Integrator;
pub use page::Page;
pub use surface::{InputEvent, Surface, SurfaceIo};
