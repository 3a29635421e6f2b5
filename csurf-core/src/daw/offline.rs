//! In-memory DAW used by tests and the demo host.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use csurf_types::{Rgba, TrackId};

use super::{Daw, FocusedFx, LastTouchedFx};

#[derive(Debug, Clone)]
pub struct OfflineParam {
    pub name: String,
    pub value: f64,
    /// When set, writes snap to this many evenly spaced values.
    pub steps: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct OfflineFx {
    pub name: String,
    pub enabled: bool,
    pub params: Vec<OfflineParam>,
}

#[derive(Debug, Clone)]
pub struct OfflineSend {
    pub name: String,
    pub volume: f64,
    pub pan: f64,
    pub mute: bool,
}

#[derive(Debug, Clone)]
pub struct OfflineTrack {
    pub name: String,
    pub color: Rgba,
    pub volume: f64,
    pub pan: f64,
    pub width: f64,
    pub mute: bool,
    pub solo: bool,
    pub armed: bool,
    pub selected: bool,
    pub vca_leader: bool,
    /// Leader this track follows.
    pub vca_follows: Option<TrackId>,
    pub folder_parent: Option<TrackId>,
    pub sends: Vec<OfflineSend>,
    pub fx: Vec<OfflineFx>,
}

impl OfflineTrack {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            color: Rgba::WHITE,
            volume: 1.0,
            pan: 0.0,
            width: 1.0,
            mute: false,
            solo: false,
            armed: false,
            selected: false,
            vca_leader: false,
            vca_follows: None,
            folder_parent: None,
            sends: Vec::new(),
            fx: Vec::new(),
        }
    }
}

/// A DAW that keeps its whole state in memory and records commands.
#[derive(Debug)]
pub struct OfflineDaw {
    /// Index 0 is master.
    tracks: Vec<OfflineTrack>,
    now_ms: f64,
    /// When set, `now_ms` is wall time since this instant.
    clock_start: Option<Instant>,
    resource_path: PathBuf,
    focused_fx: FocusedFx,
    last_touched: Option<LastTouchedFx>,
    playing: bool,
    recording: bool,
    named_commands: HashMap<String, i32>,
    pub commands_run: Vec<i32>,
    pub transport_log: Vec<&'static str>,
    pub messages: Vec<String>,
    pub spoken: Vec<String>,
    pub confirm_answer: bool,
    pub confirmations: Vec<String>,
    pub touched: Vec<(TrackId, String, bool)>,
}

impl Default for OfflineDaw {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineDaw {
    pub fn new() -> Self {
        Self {
            tracks: vec![OfflineTrack::new("MASTER")],
            now_ms: 1000.0,
            clock_start: None,
            resource_path: std::env::temp_dir(),
            focused_fx: FocusedFx::default(),
            last_touched: None,
            playing: false,
            recording: false,
            named_commands: HashMap::new(),
            commands_run: Vec::new(),
            transport_log: Vec::new(),
            messages: Vec::new(),
            spoken: Vec::new(),
            confirm_answer: false,
            confirmations: Vec::new(),
            touched: Vec::new(),
        }
    }

    pub fn with_resource_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.resource_path = path.into();
        self
    }

    /// Follows the system clock instead of the manual one.
    pub fn with_wall_clock(mut self) -> Self {
        self.clock_start = Some(Instant::now());
        self
    }

    pub fn add_track(&mut self, name: &str) -> TrackId {
        self.tracks.push(OfflineTrack::new(name));
        TrackId::new((self.tracks.len() - 1) as u32)
    }

    pub fn add_send(&mut self, track: TrackId, name: &str) -> usize {
        let Some(t) = self.track_mut(track) else { return 0 };
        t.sends.push(OfflineSend { name: name.to_string(), volume: 1.0, pan: 0.0, mute: false });
        t.sends.len() - 1
    }

    pub fn add_fx(&mut self, track: TrackId, name: &str, params: &[&str]) -> usize {
        let Some(t) = self.track_mut(track) else { return 0 };
        t.fx.push(OfflineFx {
            name: name.to_string(),
            enabled: true,
            params: params
                .iter()
                .map(|p| OfflineParam { name: p.to_string(), value: 0.0, steps: None })
                .collect(),
        });
        t.fx.len() - 1
    }

    pub fn set_param_steps(&mut self, track: TrackId, fx: usize, param: usize, steps: usize) {
        if let Some(p) = self.param_mut(track, fx, param as i32) {
            p.steps = Some(steps);
        }
    }

    pub fn register_named_command(&mut self, name: &str, id: i32) {
        self.named_commands.insert(name.to_string(), id);
    }

    pub fn set_now_ms(&mut self, now_ms: f64) {
        self.now_ms = now_ms;
    }

    pub fn advance_ms(&mut self, ms: f64) {
        self.now_ms += ms;
    }

    pub fn select_track(&mut self, track: TrackId) {
        self.set_only_track_selected(track);
    }

    /// Makes `leader` a VCA leader and each of `followers` follow it.
    pub fn set_vca_group(&mut self, leader: TrackId, followers: &[TrackId]) {
        if let Some(t) = self.track_mut(leader) {
            t.vca_leader = true;
        }
        for follower in followers {
            if let Some(t) = self.track_mut(*follower) {
                t.vca_follows = Some(leader);
            }
        }
    }

    pub fn set_folder_parent(&mut self, child: TrackId, parent: TrackId) {
        if let Some(t) = self.track_mut(child) {
            t.folder_parent = Some(parent);
        }
    }

    fn user_tracks(&self) -> impl Iterator<Item = (TrackId, &OfflineTrack)> {
        self.tracks.iter().enumerate().skip(1).map(|(i, t)| (TrackId::new(i as u32), t))
    }

    pub fn set_focused_fx(&mut self, focused: FocusedFx) {
        self.focused_fx = focused;
    }

    pub fn set_last_touched(&mut self, last: Option<LastTouchedFx>) {
        self.last_touched = last;
    }

    pub fn offline_track(&self, track: TrackId) -> Option<&OfflineTrack> {
        self.tracks.get(track.get() as usize)
    }

    fn track_ref(&self, track: TrackId) -> Option<&OfflineTrack> {
        self.tracks.get(track.get() as usize)
    }

    fn track_mut(&mut self, track: TrackId) -> Option<&mut OfflineTrack> {
        self.tracks.get_mut(track.get() as usize)
    }

    fn send_ref(&self, track: TrackId, send: usize) -> Option<&OfflineSend> {
        self.track_ref(track).and_then(|t| t.sends.get(send))
    }

    fn send_mut(&mut self, track: TrackId, send: usize) -> Option<&mut OfflineSend> {
        self.track_mut(track).and_then(|t| t.sends.get_mut(send))
    }

    fn fx_ref(&self, track: TrackId, fx: usize) -> Option<&OfflineFx> {
        self.track_ref(track).and_then(|t| t.fx.get(fx))
    }

    fn param_ref(&self, track: TrackId, fx: usize, param: i32) -> Option<&OfflineParam> {
        let index = usize::try_from(param).ok()?;
        self.fx_ref(track, fx).and_then(|f| f.params.get(index))
    }

    fn param_mut(&mut self, track: TrackId, fx: usize, param: i32) -> Option<&mut OfflineParam> {
        let index = usize::try_from(param).ok()?;
        self.track_mut(track)
            .and_then(|t| t.fx.get_mut(fx))
            .and_then(|f| f.params.get_mut(index))
    }
}

impl Daw for OfflineDaw {
    fn now_ms(&self) -> f64 {
        match self.clock_start {
            Some(start) => self.now_ms + start.elapsed().as_secs_f64() * 1000.0,
            None => self.now_ms,
        }
    }

    fn resource_path(&self) -> PathBuf {
        self.resource_path.clone()
    }

    fn track_count(&self) -> usize {
        self.tracks.len() - 1
    }

    fn track(&self, number: usize) -> Option<TrackId> {
        (number < self.tracks.len()).then(|| TrackId::new(number as u32))
    }

    fn track_number(&self, track: TrackId) -> usize {
        track.get() as usize
    }

    fn selected_track(&self) -> Option<TrackId> {
        self.tracks
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, t)| t.selected)
            .map(|(i, _)| TrackId::new(i as u32))
    }

    fn vca_leaders(&self) -> Vec<TrackId> {
        self.user_tracks()
            .filter(|(_, t)| t.vca_leader && t.vca_follows.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    fn vca_followers(&self, leader: TrackId) -> Vec<TrackId> {
        self.user_tracks().filter(|(_, t)| t.vca_follows == Some(leader)).map(|(id, _)| id).collect()
    }

    fn is_vca_leader(&self, track: TrackId) -> bool {
        self.track_ref(track).is_some_and(|t| t.vca_leader)
    }

    fn folder_children(&self, parent: Option<TrackId>) -> Vec<TrackId> {
        self.user_tracks().filter(|(_, t)| t.folder_parent == parent).map(|(id, _)| id).collect()
    }

    fn track_name(&self, track: TrackId) -> String {
        self.track_ref(track).map(|t| t.name.clone()).unwrap_or_default()
    }

    fn track_color(&self, track: TrackId) -> Rgba {
        self.track_ref(track).map(|t| t.color).unwrap_or(Rgba::WHITE)
    }

    fn track_volume(&self, track: TrackId) -> f64 {
        self.track_ref(track).map(|t| t.volume).unwrap_or(0.0)
    }

    fn set_track_volume(&mut self, track: TrackId, gain: f64) {
        if let Some(t) = self.track_mut(track) {
            t.volume = gain.max(0.0);
        }
    }

    fn track_pan(&self, track: TrackId) -> f64 {
        self.track_ref(track).map(|t| t.pan).unwrap_or(0.0)
    }

    fn set_track_pan(&mut self, track: TrackId, pan: f64) {
        if let Some(t) = self.track_mut(track) {
            t.pan = pan.clamp(-1.0, 1.0);
        }
    }

    fn track_pan_width(&self, track: TrackId) -> f64 {
        self.track_ref(track).map(|t| t.width).unwrap_or(1.0)
    }

    fn set_track_pan_width(&mut self, track: TrackId, width: f64) {
        if let Some(t) = self.track_mut(track) {
            t.width = width.clamp(-1.0, 1.0);
        }
    }

    fn track_mute(&self, track: TrackId) -> bool {
        self.track_ref(track).is_some_and(|t| t.mute)
    }

    fn set_track_mute(&mut self, track: TrackId, mute: bool) {
        if let Some(t) = self.track_mut(track) {
            t.mute = mute;
        }
    }

    fn track_solo(&self, track: TrackId) -> bool {
        self.track_ref(track).is_some_and(|t| t.solo)
    }

    fn set_track_solo(&mut self, track: TrackId, solo: bool) {
        if let Some(t) = self.track_mut(track) {
            t.solo = solo;
        }
    }

    fn track_record_arm(&self, track: TrackId) -> bool {
        self.track_ref(track).is_some_and(|t| t.armed)
    }

    fn set_track_record_arm(&mut self, track: TrackId, armed: bool) {
        if let Some(t) = self.track_mut(track) {
            t.armed = armed;
        }
    }

    fn track_selected(&self, track: TrackId) -> bool {
        self.track_ref(track).is_some_and(|t| t.selected)
    }

    fn set_track_selected(&mut self, track: TrackId, selected: bool) {
        if let Some(t) = self.track_mut(track) {
            t.selected = selected;
        }
    }

    fn set_only_track_selected(&mut self, track: TrackId) {
        for (i, t) in self.tracks.iter_mut().enumerate() {
            t.selected = i == track.get() as usize;
        }
    }

    fn set_track_touched(&mut self, track: TrackId, param: &str, touched: bool) {
        self.touched.push((track, param.to_string(), touched));
    }

    fn send_count(&self, track: TrackId) -> usize {
        self.track_ref(track).map(|t| t.sends.len()).unwrap_or(0)
    }

    fn send_name(&self, track: TrackId, send: usize) -> String {
        self.send_ref(track, send).map(|s| s.name.clone()).unwrap_or_default()
    }

    fn send_volume(&self, track: TrackId, send: usize) -> f64 {
        self.send_ref(track, send).map(|s| s.volume).unwrap_or(0.0)
    }

    fn set_send_volume(&mut self, track: TrackId, send: usize, gain: f64) {
        if let Some(s) = self.send_mut(track, send) {
            s.volume = gain.max(0.0);
        }
    }

    fn send_pan(&self, track: TrackId, send: usize) -> f64 {
        self.send_ref(track, send).map(|s| s.pan).unwrap_or(0.0)
    }

    fn set_send_pan(&mut self, track: TrackId, send: usize, pan: f64) {
        if let Some(s) = self.send_mut(track, send) {
            s.pan = pan.clamp(-1.0, 1.0);
        }
    }

    fn send_mute(&self, track: TrackId, send: usize) -> bool {
        self.send_ref(track, send).is_some_and(|s| s.mute)
    }

    fn set_send_mute(&mut self, track: TrackId, send: usize, mute: bool) {
        if let Some(s) = self.send_mut(track, send) {
            s.mute = mute;
        }
    }

    fn fx_count(&self, track: TrackId) -> usize {
        self.track_ref(track).map(|t| t.fx.len()).unwrap_or(0)
    }

    fn fx_name(&self, track: TrackId, fx: usize) -> String {
        self.fx_ref(track, fx).map(|f| f.name.clone()).unwrap_or_default()
    }

    fn fx_param_count(&self, track: TrackId, fx: usize) -> usize {
        self.fx_ref(track, fx).map(|f| f.params.len()).unwrap_or(0)
    }

    fn fx_param_name(&self, track: TrackId, fx: usize, param: i32) -> String {
        self.param_ref(track, fx, param).map(|p| p.name.clone()).unwrap_or_default()
    }

    fn fx_param(&self, track: TrackId, fx: usize, param: i32) -> f64 {
        self.param_ref(track, fx, param).map(|p| p.value).unwrap_or(0.0)
    }

    fn set_fx_param(&mut self, track: TrackId, fx: usize, param: i32, value: f64) {
        if let Some(p) = self.param_mut(track, fx, param) {
            let value = value.clamp(0.0, 1.0);
            p.value = match p.steps {
                Some(steps) if steps > 1 => {
                    let last = (steps - 1) as f64;
                    (value * last).round() / last
                }
                _ => value,
            };
        }
    }

    fn fx_param_formatted(&self, track: TrackId, fx: usize, param: i32) -> String {
        format!("{:.2}", self.fx_param(track, fx, param))
    }

    fn fx_enabled(&self, track: TrackId, fx: usize) -> bool {
        self.fx_ref(track, fx).is_some_and(|f| f.enabled)
    }

    fn set_fx_enabled(&mut self, track: TrackId, fx: usize, enabled: bool) {
        if let Some(f) = self.track_mut(track).and_then(|t| t.fx.get_mut(fx)) {
            f.enabled = enabled;
        }
    }

    fn focused_fx(&self) -> FocusedFx {
        self.focused_fx
    }

    fn last_touched_fx(&self) -> Option<LastTouchedFx> {
        self.last_touched
    }

    fn play(&mut self) {
        self.playing = true;
        self.transport_log.push("play");
    }

    fn stop(&mut self) {
        self.playing = false;
        self.recording = false;
        self.transport_log.push("stop");
    }

    fn record(&mut self) {
        self.recording = !self.recording;
        self.transport_log.push("record");
    }

    fn rewind(&mut self) {
        self.transport_log.push("rewind");
    }

    fn fast_forward(&mut self) {
        self.transport_log.push("fast_forward");
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn run_command(&mut self, command_id: i32) {
        self.commands_run.push(command_id);
    }

    fn named_command(&self, name: &str) -> Option<i32> {
        self.named_commands.get(name).copied()
    }

    fn show_message(&mut self, text: &str) {
        log::info!(target: "daw", "{}", text);
        self.messages.push(text.to_string());
    }

    fn speak(&mut self, text: &str) {
        self.spoken.push(text.to_string());
    }

    fn confirm(&mut self, title: &str, message: &str) -> bool {
        self.confirmations.push(format!("{}: {}", title, message));
        self.confirm_answer
    }
}
