//! Surface-level actions: transport, zone navigation, modifiers, banking, messaging.

use csurf_types::{Modifier, OscArg, OutMessage};

use super::{Action, ActionRegistry, ActionTarget, Feedback, Services, SurfaceCommand};
use crate::context::ActionContext;
use crate::daw::Daw;
use crate::widget::channel_from_name;

pub(super) fn register(registry: &mut ActionRegistry) {
    registry.register("Reaper", || Box::new(ReaperCommand));
    registry.register("FixedTextDisplay", || Box::new(FixedTextDisplay));
    registry.register("Speak", || Box::new(Speak));
    registry.register("SendMIDIMessage", || Box::new(SendMidiMessage));
    registry.register("SendOSCMessage", || Box::new(SendOscMessage));

    registry.register("Rewind", || Box::new(Transport::Rewind));
    registry.register("FastForward", || Box::new(Transport::FastForward));
    registry.register("Play", || Box::new(Transport::Play));
    registry.register("Stop", || Box::new(Transport::Stop));
    registry.register("Record", || Box::new(Transport::Record));

    registry.register("GoHome", || Box::new(Navigate::Home));
    registry.register("AllSurfacesGoHome", || Box::new(Navigate::AllSurfacesHome));
    registry.register("GoSubZone", || Box::new(Navigate::SubZone));
    registry.register("LeaveSubZone", || Box::new(Navigate::LeaveSubZone));
    registry.register("GoAssociatedZone", || Box::new(Navigate::AssociatedZone));
    registry.register("GoFXSlot", || Box::new(Navigate::FxSlot));
    registry.register("GoFXLayoutZone", || Box::new(Navigate::FxLayoutZone));
    registry.register("NextPage", || Box::new(Navigate::NextPage));
    registry.register("GoPage", || Box::new(Navigate::Page));

    registry.register("ClearFocusedFXParam", || Box::new(Simple(SurfaceCommand::ClearFocusedFxParam)));
    registry.register("ClearFocusedFX", || Box::new(Simple(SurfaceCommand::ClearFocusedFx)));
    registry.register("ClearSelectedTrackFX", || Box::new(Simple(SurfaceCommand::ClearSelectedTrackFx)));
    registry.register("ClearFXSlot", || Box::new(Simple(SurfaceCommand::ClearFxSlot)));
    registry.register("ToggleEnableFocusedFXMapping", || {
        Box::new(Simple(SurfaceCommand::ToggleFocusedFxMapping))
    });
    registry.register("ToggleEnableFocusedFXParamMapping", || {
        Box::new(Simple(SurfaceCommand::ToggleFocusedFxParamMapping))
    });
    registry.register("AutoMapFocusedFX", || Box::new(Simple(SurfaceCommand::AutoMapFocusedFx)));
    registry.register("AutoMapSlotFX", || Box::new(AutoMapSlotFx));
    registry.register("ClearModifiers", || Box::new(Simple(SurfaceCommand::ClearModifiers)));
    registry.register("ToggleUseLocalModifiers", || Box::new(Simple(SurfaceCommand::ToggleUseLocalModifiers)));
    registry.register("ClearModifier", || Box::new(ClearModifier));
    registry.register("SetLatchTime", || Box::new(SetLatchTime));
    registry.register("ToggleChannel", || Box::new(ToggleChannel));
    registry.register("Bank", || Box::new(Bank));

    registry.register("Shift", || Box::new(ModifierKey(Modifier::Shift)));
    registry.register("Option", || Box::new(ModifierKey(Modifier::Option)));
    registry.register("Control", || Box::new(ModifierKey(Modifier::Control)));
    registry.register("Alt", || Box::new(ModifierKey(Modifier::Alt)));
    registry.register("Flip", || Box::new(ModifierKey(Modifier::Flip)));
    registry.register("Global", || Box::new(ModifierKey(Modifier::Global)));
    registry.register("Marker", || Box::new(ModifierKey(Modifier::Marker)));
    registry.register("Nudge", || Box::new(ModifierKey(Modifier::Nudge)));
    registry.register("Zoom", || Box::new(ModifierKey(Modifier::Zoom)));
    registry.register("Scrub", || Box::new(ModifierKey(Modifier::Scrub)));
}

pub struct NoAction;

impl Action for NoAction {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    fn feedback(&self, _ctx: &ActionContext, _target: &ActionTarget, _daw: &dyn Daw) -> Feedback {
        Feedback::Clear
    }
}

struct ReaperCommand;

impl Action for ReaperCommand {
    fn do_action(&self, ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        svc.daw.run_command(ctx.command_id());
    }
}

struct FixedTextDisplay;

impl Action for FixedTextDisplay {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    fn feedback(&self, ctx: &ActionContext, _target: &ActionTarget, _daw: &dyn Daw) -> Feedback {
        Feedback::Text(ctx.string_param().to_string())
    }
}

struct Speak;

impl Action for Speak {
    fn do_action(&self, ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        svc.daw.speak(ctx.string_param());
    }
}

/// Parses hex bytes; a token may hold several space-separated bytes.
fn hex_bytes(params: &[String]) -> Vec<u8> {
    params
        .iter()
        .flat_map(|p| p.split_whitespace())
        .filter_map(|b| u8::from_str_radix(b.trim_start_matches("0x"), 16).ok())
        .collect()
}

struct SendMidiMessage;

impl Action for SendMidiMessage {
    fn do_action(&self, ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        let bytes = hex_bytes(ctx.parameters());
        match bytes.as_slice() {
            [status, data1, data2] => svc.push(SurfaceCommand::Send(OutMessage::Midi {
                status: *status,
                data1: *data1,
                data2: *data2,
            })),
            [0xF0, ..] => svc.push(SurfaceCommand::Send(OutMessage::SysEx(bytes.clone()))),
            _ => log::warn!(target: "action", "SendMIDIMessage: cannot send {:?}", ctx.parameters()),
        }
    }
}

fn osc_arg(token: &str) -> OscArg {
    if let Ok(i) = token.parse::<i32>() {
        OscArg::Int(i)
    } else if let Ok(f) = token.parse::<f32>() {
        OscArg::Float(f)
    } else {
        OscArg::Str(token.to_string())
    }
}

struct SendOscMessage;

impl Action for SendOscMessage {
    fn do_action(&self, ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        let mut tokens = ctx.parameters().iter().flat_map(|p| p.split_whitespace());
        let Some(address) = tokens.next() else { return };
        let args = tokens.map(osc_arg).collect();
        svc.push(SurfaceCommand::Send(OutMessage::Osc { address: address.to_string(), args }));
    }
}

enum Transport {
    Rewind,
    FastForward,
    Play,
    Stop,
    Record,
}

impl Action for Transport {
    fn do_action(&self, _ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        match self {
            Transport::Rewind => svc.daw.rewind(),
            Transport::FastForward => svc.daw.fast_forward(),
            Transport::Play => svc.daw.play(),
            Transport::Stop => svc.daw.stop(),
            Transport::Record => svc.daw.record(),
        }
    }

    fn feedback(&self, _ctx: &ActionContext, _target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        let on = match self {
            Transport::Play => daw.is_playing(),
            Transport::Stop => !daw.is_playing() && !daw.is_recording(),
            Transport::Record => daw.is_recording(),
            Transport::Rewind | Transport::FastForward => return Feedback::None,
        };
        Feedback::Value(if on { 1.0 } else { 0.0 })
    }
}

enum Navigate {
    Home,
    AllSurfacesHome,
    SubZone,
    LeaveSubZone,
    AssociatedZone,
    FxSlot,
    FxLayoutZone,
    NextPage,
    Page,
}

impl Action for Navigate {
    fn do_action(&self, ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        let name = ctx.string_param().to_string();
        let command = match self {
            Navigate::Home => SurfaceCommand::GoHome,
            Navigate::AllSurfacesHome => SurfaceCommand::AllSurfacesGoHome,
            Navigate::SubZone => SurfaceCommand::GoSubZone { zone: target.zone, name },
            Navigate::LeaveSubZone => SurfaceCommand::LeaveSubZone { zone: target.zone },
            Navigate::AssociatedZone => SurfaceCommand::GoAssociatedZone { name },
            Navigate::FxSlot => {
                let Some(track) = target.track else { return };
                SurfaceCommand::GoFxSlot { track, navigator: target.navigator, slot: target.slot_index }
            }
            Navigate::FxLayoutZone => SurfaceCommand::GoFxLayoutZone { name, slot: target.slot_index },
            Navigate::NextPage => SurfaceCommand::NextPage,
            Navigate::Page => SurfaceCommand::GoPage(name),
        };
        svc.push(command);
    }
}

/// Pushes a fixed command on press.
pub(super) struct Simple(pub(super) SurfaceCommand);

impl Action for Simple {
    fn do_action(&self, _ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        svc.push(self.0.clone());
    }
}

struct AutoMapSlotFx;

impl Action for AutoMapSlotFx {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        if let Some(track) = target.track {
            svc.push(SurfaceCommand::AutoMapSlotFx { track, slot: target.slot_index });
        }
    }
}

struct ModifierKey(Modifier);

impl Action for ModifierKey {
    fn do_action(&self, _ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        svc.push(SurfaceCommand::Modifier { modifier: self.0, pressed: value != 0.0 });
    }
}

struct ClearModifier;

impl Action for ClearModifier {
    fn do_action(&self, ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        match Modifier::from_name(ctx.string_param()) {
            Some(modifier) => svc.push(SurfaceCommand::ClearModifier(modifier)),
            None => log::warn!(target: "action", "ClearModifier: unknown modifier {}", ctx.string_param()),
        }
    }
}

struct SetLatchTime;

impl Action for SetLatchTime {
    fn do_action(&self, ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        svc.push(SurfaceCommand::SetLatchTime(ctx.int_param() as f64));
    }
}

struct ToggleChannel;

impl Action for ToggleChannel {
    fn do_action(&self, ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        svc.push(SurfaceCommand::ToggleChannel(channel_from_name(ctx.widget_name())));
    }
}

struct Bank;

impl Action for Bank {
    fn do_action(&self, ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        svc.push(SurfaceCommand::Bank { kind: ctx.string_param().to_string(), amount: ctx.int_param() });
    }
}
