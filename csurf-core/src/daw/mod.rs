//! Capability interface to the host DAW.
//!
//! The engine never talks to a DAW directly; every query and command goes
//! through [`Daw`]. [`offline::OfflineDaw`] is an in-memory implementation used
//! by tests and the demo host.

pub mod offline;

use std::path::PathBuf;

use csurf_types::{Rgba, TrackId};

pub use offline::OfflineDaw;

/// Which FX window has focus, as reported by the DAW.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusedFx {
    /// 0 none, 1 track FX, 2 item FX; bit 4 set when the window lost focus but stays open.
    pub state: u32,
    /// 1-based track number, 0 for master.
    pub track_number: usize,
    pub fx_index: usize,
}

/// Parameter most recently touched with the mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastTouchedFx {
    pub track_number: usize,
    pub fx_index: usize,
    pub param_index: i32,
}

pub trait Daw {
    fn now_ms(&self) -> f64;
    fn resource_path(&self) -> PathBuf;

    // ─── Tracks ────────────────────────────────────────────────────

    /// Number of tracks, master excluded.
    fn track_count(&self) -> usize;
    /// Track by 1-based number; 0 is master.
    fn track(&self, number: usize) -> Option<TrackId>;
    fn track_number(&self, track: TrackId) -> usize;
    fn selected_track(&self) -> Option<TrackId>;
    fn track_name(&self, track: TrackId) -> String;
    fn track_color(&self, track: TrackId) -> Rgba;
    /// Linear gain, 1.0 is unity.
    fn track_volume(&self, track: TrackId) -> f64;
    fn set_track_volume(&mut self, track: TrackId, gain: f64);
    /// -1.0 (left) to 1.0 (right).
    fn track_pan(&self, track: TrackId) -> f64;
    fn set_track_pan(&mut self, track: TrackId, pan: f64);
    fn track_pan_width(&self, track: TrackId) -> f64;
    fn set_track_pan_width(&mut self, track: TrackId, width: f64);
    fn track_mute(&self, track: TrackId) -> bool;
    fn set_track_mute(&mut self, track: TrackId, mute: bool);
    fn track_solo(&self, track: TrackId) -> bool;
    fn set_track_solo(&mut self, track: TrackId, solo: bool);
    fn track_record_arm(&self, track: TrackId) -> bool;
    fn set_track_record_arm(&mut self, track: TrackId, armed: bool);
    fn track_selected(&self, track: TrackId) -> bool;
    fn set_track_selected(&mut self, track: TrackId, selected: bool);
    fn set_only_track_selected(&mut self, track: TrackId);
    /// Automation touch state for `param` ("volume", "pan", …).
    fn set_track_touched(&mut self, _track: TrackId, _param: &str, _touched: bool) {}

    // ─── Track lists ───────────────────────────────────────────────

    /// Selected tracks in track order.
    fn selected_tracks(&self) -> Vec<TrackId> {
        (1..=self.track_count())
            .filter_map(|n| self.track(n))
            .filter(|t| self.track_selected(*t))
            .collect()
    }
    /// VCA leaders that do not follow another leader, in track order.
    fn vca_leaders(&self) -> Vec<TrackId> {
        Vec::new()
    }
    fn vca_followers(&self, _leader: TrackId) -> Vec<TrackId> {
        Vec::new()
    }
    fn is_vca_leader(&self, _track: TrackId) -> bool {
        false
    }
    /// Direct children of a folder; `None` lists the top level.
    fn folder_children(&self, parent: Option<TrackId>) -> Vec<TrackId> {
        match parent {
            None => (1..=self.track_count()).filter_map(|n| self.track(n)).collect(),
            Some(_) => Vec::new(),
        }
    }
    fn is_folder(&self, track: TrackId) -> bool {
        !self.folder_children(Some(track)).is_empty()
    }

    // ─── Sends ─────────────────────────────────────────────────────

    fn send_count(&self, track: TrackId) -> usize;
    fn send_name(&self, track: TrackId, send: usize) -> String;
    fn send_volume(&self, track: TrackId, send: usize) -> f64;
    fn set_send_volume(&mut self, track: TrackId, send: usize, gain: f64);
    fn send_pan(&self, track: TrackId, send: usize) -> f64;
    fn set_send_pan(&mut self, track: TrackId, send: usize, pan: f64);
    fn send_mute(&self, track: TrackId, send: usize) -> bool;
    fn set_send_mute(&mut self, track: TrackId, send: usize, mute: bool);

    // ─── FX ────────────────────────────────────────────────────────

    fn fx_count(&self, track: TrackId) -> usize;
    fn fx_name(&self, track: TrackId, fx: usize) -> String;
    fn fx_param_count(&self, track: TrackId, fx: usize) -> usize;
    fn fx_param_name(&self, track: TrackId, fx: usize, param: i32) -> String;
    /// Normalised 0..1 value.
    fn fx_param(&self, track: TrackId, fx: usize, param: i32) -> f64;
    fn set_fx_param(&mut self, track: TrackId, fx: usize, param: i32, value: f64);
    fn fx_param_formatted(&self, track: TrackId, fx: usize, param: i32) -> String;
    fn fx_enabled(&self, track: TrackId, fx: usize) -> bool;
    fn set_fx_enabled(&mut self, track: TrackId, fx: usize, enabled: bool);
    fn open_fx_window(&mut self, _track: TrackId, _fx: usize, _open: bool) {}
    fn focused_fx(&self) -> FocusedFx;
    fn last_touched_fx(&self) -> Option<LastTouchedFx>;

    // ─── Transport and commands ────────────────────────────────────

    fn play(&mut self);
    fn stop(&mut self);
    fn record(&mut self);
    fn rewind(&mut self);
    fn fast_forward(&mut self);
    fn is_playing(&self) -> bool;
    fn is_recording(&self) -> bool;
    fn run_command(&mut self, command_id: i32);
    /// Resolves a named command, `None` when unknown.
    fn named_command(&self, name: &str) -> Option<i32>;

    // ─── User interaction ──────────────────────────────────────────

    fn show_message(&mut self, text: &str);
    fn speak(&mut self, _text: &str) {}
    /// Yes/No question; implementations without a UI answer `false`.
    fn confirm(&mut self, title: &str, message: &str) -> bool;
}

/// Gain to the 0..1 fader position used by volume actions.
///
/// The fader spans -60 dB to +12 dB linearly in dB; silence is 0.
pub fn volume_to_normalized(gain: f64) -> f64 {
    if gain <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * gain.log10();
    ((db + 60.0) / 72.0).clamp(0.0, 1.0)
}

pub fn normalized_to_volume(value: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    let db = value.min(1.0) * 72.0 - 60.0;
    db_to_gain(db)
}

pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        -144.0
    } else {
        (20.0 * gain.log10()).max(-144.0)
    }
}

pub fn db_to_gain(db: f64) -> f64 {
    if db <= -144.0 {
        0.0
    } else {
        10f64.powf(db / 20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_curve() {
        assert_eq!(volume_to_normalized(0.0), 0.0);
        let unity = volume_to_normalized(1.0);
        assert!((unity - 60.0 / 72.0).abs() < 1e-9);
        assert!((normalized_to_volume(unity) - 1.0).abs() < 1e-9);
        assert_eq!(normalized_to_volume(0.0), 0.0);
    }

    #[test]
    fn test_db_conversion() {
        assert!((gain_to_db(1.0)).abs() < 1e-9);
        assert!((db_to_gain(-6.0) - 0.501187).abs() < 1e-5);
        assert_eq!(gain_to_db(0.0), -144.0);
        assert_eq!(db_to_gain(-144.0), 0.0);
    }
}
