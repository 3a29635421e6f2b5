//! Track and send actions.

use csurf_types::TrackId;

use super::{Action, ActionRegistry, ActionTarget, Feedback, Services, SurfaceCommand};
use crate::context::ActionContext;
use crate::daw::{db_to_gain, gain_to_db, normalized_to_volume, volume_to_normalized, Daw};

pub(super) fn register(registry: &mut ActionRegistry) {
    registry.register("TrackVolume", || Box::new(TrackVolume));
    registry.register("TrackVolumeDB", || Box::new(TrackVolumeDb));
    registry.register("TrackPan", || Box::new(TrackPan { percent: false }));
    registry.register("TrackPanPercent", || Box::new(TrackPan { percent: true }));
    registry.register("TrackPanWidth", || Box::new(TrackPanWidth { percent: false }));
    registry.register("TrackPanWidthPercent", || Box::new(TrackPanWidth { percent: true }));
    registry.register("TrackSelect", || Box::new(TrackSelect));
    registry.register("TrackUniqueSelect", || Box::new(TrackUniqueSelect));
    registry.register("TrackRecordArm", || Box::new(TrackToggle::RecordArm));
    registry.register("TrackMute", || Box::new(TrackToggle::Mute));
    registry.register("TrackSolo", || Box::new(TrackToggle::Solo));
    registry.register("ClearAllSolo", || Box::new(ClearAllSolo));
    registry.register("TrackNameDisplay", || Box::new(TrackDisplay::Name));
    registry.register("TrackNumberDisplay", || Box::new(TrackDisplay::Number));
    registry.register("TrackVolumeDisplay", || Box::new(TrackDisplay::Volume));
    registry.register("TrackPanDisplay", || Box::new(TrackDisplay::Pan));
    registry.register("TrackToggleVCASpill", || Box::new(ToggleSpill::Vca));
    registry.register("TrackToggleFolderSpill", || Box::new(ToggleSpill::Folder));
    registry.register("TrackVCALeaderDisplay", || Box::new(SpillDisplay::VcaLeader));
    registry.register("TrackFolderParentDisplay", || Box::new(SpillDisplay::FolderParent));

    registry.register("TrackSendVolume", || Box::new(SendVolume { db: false }));
    registry.register("TrackSendVolumeDB", || Box::new(SendVolume { db: true }));
    registry.register("TrackSendPan", || Box::new(SendPan { percent: false }));
    registry.register("TrackSendPanPercent", || Box::new(SendPan { percent: true }));
    registry.register("TrackSendMute", || Box::new(SendMute));
    registry.register("TrackSendNameDisplay", || Box::new(SendDisplay::Name));
    registry.register("TrackSendVolumeDisplay", || Box::new(SendDisplay::Volume));
}

fn bool_value(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

/// Pan in -1..1 to the 0..1 widget scale.
fn pan_to_normalized(pan: f64) -> f64 {
    (pan + 1.0) / 2.0
}

fn normalized_to_pan(value: f64) -> f64 {
    value * 2.0 - 1.0
}

fn pan_text(pan: f64) -> String {
    let percent = (pan * 100.0).round() as i32;
    match percent {
        0 => "<C>".to_string(),
        p if p < 0 => format!("{}<", -p),
        p => format!(">{}", p),
    }
}

fn send_track(target: &ActionTarget, daw: &dyn Daw) -> Option<(TrackId, usize)> {
    let track = target.track?;
    (target.slot_index < daw.send_count(track)).then_some((track, target.slot_index))
}

// ─── Track ─────────────────────────────────────────────────────────

struct TrackVolume;

impl Action for TrackVolume {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if let Some(track) = target.track {
            svc.daw.set_track_volume(track, normalized_to_volume(value));
        }
    }

    fn touch(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if let Some(track) = target.track {
            svc.daw.set_track_touched(track, "volume", value != 0.0);
        }
    }

    fn current_normalized_value(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> f64 {
        target.track.map(|t| volume_to_normalized(daw.track_volume(t))).unwrap_or(0.0)
    }

    fn feedback(&self, ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match target.track {
            Some(_) => Feedback::Value(self.current_normalized_value(ctx, target, daw)),
            None => Feedback::Clear,
        }
    }
}

/// Volume in dB; the value arrives already scaled to the context range.
struct TrackVolumeDb;

impl Action for TrackVolumeDb {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if let Some(track) = target.track {
            svc.daw.set_track_volume(track, db_to_gain(value));
        }
    }

    fn touch(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if let Some(track) = target.track {
            svc.daw.set_track_touched(track, "volume", value != 0.0);
        }
    }

    fn current_normalized_value(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> f64 {
        target.track.map(|t| gain_to_db(daw.track_volume(t))).unwrap_or(-144.0)
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match target.track {
            Some(t) => Feedback::Value(volume_to_normalized(daw.track_volume(t))),
            None => Feedback::Clear,
        }
    }
}

struct TrackPan {
    percent: bool,
}

impl Action for TrackPan {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        let Some(track) = target.track else { return };
        let pan = if self.percent { value / 100.0 } else { normalized_to_pan(value) };
        svc.daw.set_track_pan(track, pan);
    }

    fn touch(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if let Some(track) = target.track {
            svc.daw.set_track_touched(track, "pan", value != 0.0);
        }
    }

    fn current_normalized_value(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> f64 {
        let Some(track) = target.track else { return 0.0 };
        let pan = daw.track_pan(track);
        if self.percent {
            pan * 100.0
        } else {
            pan_to_normalized(pan)
        }
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match target.track {
            Some(t) => Feedback::Value(pan_to_normalized(daw.track_pan(t))),
            None => Feedback::Clear,
        }
    }
}

struct TrackPanWidth {
    percent: bool,
}

impl Action for TrackPanWidth {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        let Some(track) = target.track else { return };
        let width = if self.percent { value / 100.0 } else { normalized_to_pan(value) };
        svc.daw.set_track_pan_width(track, width);
    }

    fn touch(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if let Some(track) = target.track {
            svc.daw.set_track_touched(track, "width", value != 0.0);
        }
    }

    fn current_normalized_value(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> f64 {
        let Some(track) = target.track else { return 0.0 };
        let width = daw.track_pan_width(track);
        if self.percent {
            width * 100.0
        } else {
            pan_to_normalized(width)
        }
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match target.track {
            Some(t) => Feedback::Value(pan_to_normalized(daw.track_pan_width(t))),
            None => Feedback::Clear,
        }
    }
}

struct TrackSelect;

impl Action for TrackSelect {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        if let Some(track) = target.track {
            let selected = svc.daw.track_selected(track);
            svc.daw.set_track_selected(track, !selected);
        }
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match target.track {
            Some(t) => Feedback::Value(bool_value(daw.track_selected(t))),
            None => Feedback::Clear,
        }
    }
}

struct TrackUniqueSelect;

impl Action for TrackUniqueSelect {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        if let Some(track) = target.track {
            svc.daw.set_only_track_selected(track);
        }
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match target.track {
            Some(t) => Feedback::Value(bool_value(daw.track_selected(t))),
            None => Feedback::Clear,
        }
    }
}

enum TrackToggle {
    RecordArm,
    Mute,
    Solo,
}

impl TrackToggle {
    fn get(&self, daw: &dyn Daw, track: TrackId) -> bool {
        match self {
            TrackToggle::RecordArm => daw.track_record_arm(track),
            TrackToggle::Mute => daw.track_mute(track),
            TrackToggle::Solo => daw.track_solo(track),
        }
    }
}

impl Action for TrackToggle {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        let Some(track) = target.track else { return };
        let on = !self.get(&*svc.daw, track);
        match self {
            TrackToggle::RecordArm => svc.daw.set_track_record_arm(track, on),
            TrackToggle::Mute => svc.daw.set_track_mute(track, on),
            TrackToggle::Solo => svc.daw.set_track_solo(track, on),
        }
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match target.track {
            Some(t) => Feedback::Value(bool_value(self.get(daw, t))),
            None => Feedback::Clear,
        }
    }
}

struct ClearAllSolo;

impl Action for ClearAllSolo {
    fn do_action(&self, _ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        for number in 1..=svc.daw.track_count() {
            if let Some(track) = svc.daw.track(number) {
                svc.daw.set_track_solo(track, false);
            }
        }
    }

    fn feedback(&self, _ctx: &ActionContext, _target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        let any = (1..=daw.track_count()).filter_map(|n| daw.track(n)).any(|t| daw.track_solo(t));
        Feedback::Value(bool_value(any))
    }
}

enum TrackDisplay {
    Name,
    Number,
    Volume,
    Pan,
}

impl Action for TrackDisplay {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        let Some(track) = target.track else { return Feedback::Text(String::new()) };
        let text = match self {
            TrackDisplay::Name if track.is_master() => "Master".to_string(),
            TrackDisplay::Name => daw.track_name(track),
            TrackDisplay::Number => daw.track_number(track).to_string(),
            TrackDisplay::Volume => format!("{:.2}", gain_to_db(daw.track_volume(track))),
            TrackDisplay::Pan => pan_text(daw.track_pan(track)),
        };
        Feedback::Text(text)
    }
}

// ─── VCA and folder spill ──────────────────────────────────────────

enum ToggleSpill {
    Vca,
    Folder,
}

impl Action for ToggleSpill {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        let Some(track) = target.track else { return };
        svc.push(match self {
            ToggleSpill::Vca => SurfaceCommand::ToggleVcaSpill(track),
            ToggleSpill::Folder => SurfaceCommand::ToggleFolderSpill(track),
        });
    }
}

/// Marks the tracks a spill toggle applies to.
enum SpillDisplay {
    VcaLeader,
    FolderParent,
}

impl Action for SpillDisplay {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        let Some(track) = target.track else { return Feedback::Text(String::new()) };
        let text = match self {
            SpillDisplay::VcaLeader if daw.is_vca_leader(track) => "Leader",
            SpillDisplay::FolderParent if daw.is_folder(track) => "Parent",
            _ => "",
        };
        Feedback::Text(text.to_string())
    }
}

// ─── Sends ─────────────────────────────────────────────────────────

struct SendVolume {
    db: bool,
}

impl Action for SendVolume {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        let Some((track, send)) = send_track(target, &*svc.daw) else { return };
        let gain = if self.db { db_to_gain(value) } else { normalized_to_volume(value) };
        svc.daw.set_send_volume(track, send, gain);
    }

    fn current_normalized_value(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> f64 {
        let Some((track, send)) = send_track(target, daw) else { return 0.0 };
        let gain = daw.send_volume(track, send);
        if self.db {
            gain_to_db(gain)
        } else {
            volume_to_normalized(gain)
        }
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match send_track(target, daw) {
            Some((track, send)) => Feedback::Value(volume_to_normalized(daw.send_volume(track, send))),
            None => Feedback::Clear,
        }
    }
}

struct SendPan {
    percent: bool,
}

impl Action for SendPan {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        let Some((track, send)) = send_track(target, &*svc.daw) else { return };
        let pan = if self.percent { value / 100.0 } else { normalized_to_pan(value) };
        svc.daw.set_send_pan(track, send, pan);
    }

    fn current_normalized_value(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> f64 {
        let Some((track, send)) = send_track(target, daw) else { return 0.0 };
        let pan = daw.send_pan(track, send);
        if self.percent {
            pan * 100.0
        } else {
            pan_to_normalized(pan)
        }
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match send_track(target, daw) {
            Some((track, send)) => Feedback::Value(pan_to_normalized(daw.send_pan(track, send))),
            None => Feedback::Clear,
        }
    }
}

struct SendMute;

impl Action for SendMute {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        let Some((track, send)) = send_track(target, &*svc.daw) else { return };
        let mute = svc.daw.send_mute(track, send);
        svc.daw.set_send_mute(track, send, !mute);
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match send_track(target, daw) {
            Some((track, send)) => Feedback::Value(bool_value(daw.send_mute(track, send))),
            None => Feedback::Clear,
        }
    }
}

enum SendDisplay {
    Name,
    Volume,
}

impl Action for SendDisplay {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        let Some((track, send)) = send_track(target, daw) else { return Feedback::Text(String::new()) };
        Feedback::Text(match self {
            SendDisplay::Name => daw.send_name(track, send),
            SendDisplay::Volume => format!("{:.2}", gain_to_db(daw.send_volume(track, send))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionRegistry, SurfaceCommand};
    use crate::config::Config;
    use crate::context::NoObserver;
    use crate::daw::OfflineDaw;
    use crate::steps::SteppedValueCache;
    use crate::tokenizer::tokenize;
    use crate::widget::Widget;
    use csurf_types::{Navigator, WidgetId, ZoneId};

    fn run(daw: &mut OfflineDaw, line: &str, track: TrackId, slot: usize, value: f64) -> Vec<SurfaceCommand> {
        let config = Config::embedded();
        let registry = ActionRegistry::with_builtin_actions();
        let params = tokenize(line);
        let widget = Widget::new("Fader1");
        let mut ctx = ActionContext::new(
            registry.create(&params[0]),
            &params,
            WidgetId::new(0),
            &widget,
            ZoneId::new(0),
            daw,
            &config,
        );
        let target = ActionTarget {
            zone: ZoneId::new(0),
            widget: WidgetId::new(0),
            track: Some(track),
            navigator: Navigator::Track(0),
            slot_index: slot,
            zone_name: "Track".to_string(),
        };
        let mut steps = SteppedValueCache::new();
        let mut commands: Vec<SurfaceCommand> = Vec::new();
        let mut svc = Services {
            daw,
            config: &config,
            steps: &mut steps,
            modifiers: &[0],
            commands: &mut commands,
        };
        ctx.do_action(value, &target, &mut svc, &mut NoObserver);
        commands
    }

    #[test]
    fn test_volume_db_sets_gain() {
        let mut daw = OfflineDaw::new();
        let t = daw.add_track("Kick");
        run(&mut daw, "TrackVolumeDB", t, 0, -6.0);
        assert!((daw.track_volume(t) - db_to_gain(-6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_pan_percent_clamps() {
        let mut daw = OfflineDaw::new();
        let t = daw.add_track("Kick");
        run(&mut daw, "TrackPanPercent", t, 0, 250.0);
        assert!((daw.track_pan(t) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mute_toggles_on_press_only() {
        let mut daw = OfflineDaw::new();
        let t = daw.add_track("Kick");
        run(&mut daw, "TrackMute", t, 0, 1.0);
        run(&mut daw, "TrackMute", t, 0, 0.0);
        assert!(daw.track_mute(t));
        run(&mut daw, "TrackMute", t, 0, 1.0);
        assert!(!daw.track_mute(t));
    }

    #[test]
    fn test_send_out_of_range_ignored() {
        let mut daw = OfflineDaw::new();
        let t = daw.add_track("Kick");
        daw.add_send(t, "Verb");
        run(&mut daw, "TrackSendMute", t, 3, 1.0);
        assert!(!daw.send_mute(t, 0));
        run(&mut daw, "TrackSendMute", t, 0, 1.0);
        assert!(daw.send_mute(t, 0));
    }

    #[test]
    fn test_spill_toggle_queues_command_on_press() {
        let mut daw = OfflineDaw::new();
        let t = daw.add_track("Drums VCA");
        assert!(run(&mut daw, "TrackToggleVCASpill", t, 0, 0.0).is_empty());
        assert_eq!(run(&mut daw, "TrackToggleVCASpill", t, 0, 1.0), vec![SurfaceCommand::ToggleVcaSpill(t)]);
        assert_eq!(
            run(&mut daw, "TrackToggleFolderSpill", t, 0, 1.0),
            vec![SurfaceCommand::ToggleFolderSpill(t)]
        );
    }

    #[test]
    fn test_spill_displays() {
        let mut daw = OfflineDaw::new();
        let lead = daw.add_track("Drums VCA");
        let kick = daw.add_track("Kick");
        daw.set_vca_group(lead, &[kick]);
        daw.set_folder_parent(lead, kick);
        let target = |track| ActionTarget {
            zone: ZoneId::new(0),
            widget: WidgetId::new(0),
            track: Some(track),
            navigator: Navigator::Track(0),
            slot_index: 0,
            zone_name: "VCA".to_string(),
        };
        let config = Config::embedded();
        let registry = ActionRegistry::with_builtin_actions();
        let widget = Widget::new("Display1");
        let ctx = ActionContext::new(
            registry.create("TrackVCALeaderDisplay"),
            &tokenize("TrackVCALeaderDisplay"),
            WidgetId::new(0),
            &widget,
            ZoneId::new(0),
            &daw,
            &config,
        );
        assert_eq!(SpillDisplay::VcaLeader.feedback(&ctx, &target(lead), &daw), Feedback::Text("Leader".into()));
        assert_eq!(SpillDisplay::VcaLeader.feedback(&ctx, &target(kick), &daw), Feedback::Text(String::new()));
        assert_eq!(SpillDisplay::FolderParent.feedback(&ctx, &target(kick), &daw), Feedback::Text("Parent".into()));
    }

    #[test]
    fn test_pan_text() {
        assert_eq!(pan_text(0.0), "<C>");
        assert_eq!(pan_text(-0.5), "50<");
        assert_eq!(pan_text(0.25), ">25");
    }
}
