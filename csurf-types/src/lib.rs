//! # csurf-types
//!
//! Shared type definitions for the control-surface engine.
//! Used by csurf-core (zone engine), csurf-io (MIDI/OSC transport) and the host binary.

mod color;
mod listener;
mod message;
pub mod modifier;
mod navigator;
mod zone_info;

pub use color::Rgba;
pub use listener::ListenerCategories;
pub use message::{OscArg, OutMessage};
pub use modifier::{Modifier, TOGGLE_BIT, TOUCH_BIT};
pub use navigator::Navigator;
pub use zone_info::{FxLayoutInfo, ZoneInfo};

/// Unique identifier for a zone instance inside a zone arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ZoneId(u32);

impl ZoneId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a widget on its surface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct WidgetId(u32);

impl WidgetId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for WidgetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle of a DAW track. `TrackId::MASTER` is the master track.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(u32);

impl TrackId {
    pub const MASTER: TrackId = TrackId(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
    pub fn is_master(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_master() {
            write!(f, "master")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Identifies the zone manager that allocated a zone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ManagerId(u32);

impl ManagerId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_display() {
        assert_eq!(TrackId::MASTER.to_string(), "master");
        assert_eq!(TrackId::new(3).to_string(), "3");
    }

    #[test]
    fn test_widget_id_index() {
        assert_eq!(WidgetId::new(7).index(), 7);
    }
}
