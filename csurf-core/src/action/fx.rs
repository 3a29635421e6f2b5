//! FX parameter, FX slot and learn actions.

use csurf_types::TrackId;

use super::surface::Simple;
use super::{Action, ActionRegistry, ActionTarget, Feedback, Services, SurfaceCommand};
use crate::context::ActionContext;
use crate::daw::Daw;

pub(super) fn register(registry: &mut ActionRegistry) {
    registry.register("FXParam", || Box::new(FxParam));
    registry.register("JSFXParam", || Box::new(JsfxParam));
    registry.register("FocusedFXParam", || Box::new(FocusedFxParam));
    registry.register("FXParamNameDisplay", || Box::new(FxParamDisplay::Name));
    registry.register("FXParamValueDisplay", || Box::new(FxParamDisplay::Value));
    registry.register("FXNameDisplay", || Box::new(FxNameDisplay));
    registry.register("ToggleFXBypass", || Box::new(ToggleFxBypass));
    registry.register("FXBypassDisplay", || Box::new(FxBypassDisplay));
    registry.register("FocusedFXParamNameDisplay", || Box::new(FocusedFxParamDisplay::Name));
    registry.register("FocusedFXParamValueDisplay", || Box::new(FocusedFxParamDisplay::Value));

    registry.register("SaveLearnedFXParams", || Box::new(Simple(SurfaceCommand::SaveLearnedFxParams)));
    registry.register("SaveTemplatedFXParams", || Box::new(Simple(SurfaceCommand::SaveTemplatedFxParams)));
    registry.register("EraseLastTouchedControl", || {
        Box::new(Simple(SurfaceCommand::EraseLastTouchedControl))
    });
    registry.register("LearnFXParam", || Box::new(LearnFxParam));
    registry.register("LearnFXParamNameDisplay", || Box::new(LearnDisplay));
    registry.register("LearnFXParamValueDisplay", || Box::new(LearnDisplay));
}

/// Track and FX slot the target points at, if that slot exists.
fn fx_slot(target: &ActionTarget, daw: &dyn Daw) -> Option<(TrackId, usize)> {
    let track = target.track?;
    (target.slot_index < daw.fx_count(track)).then_some((track, target.slot_index))
}

/// Track, FX slot and parameter of the last touched FX parameter.
fn last_touched(daw: &dyn Daw) -> Option<(TrackId, usize, i32)> {
    let last = daw.last_touched_fx()?;
    let track = daw.track(last.track_number)?;
    Some((track, last.fx_index, last.param_index))
}

struct FxParam;

impl Action for FxParam {
    fn do_action(&self, ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if let Some((track, fx)) = fx_slot(target, &*svc.daw) {
            svc.daw.set_fx_param(track, fx, ctx.param_index(), value);
        }
    }

    fn current_normalized_value(&self, ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> f64 {
        fx_slot(target, daw)
            .map(|(track, fx)| daw.fx_param(track, fx, ctx.param_index()))
            .unwrap_or(0.0)
    }

    fn feedback(&self, ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match fx_slot(target, daw) {
            Some(_) => Feedback::Value(self.current_normalized_value(ctx, target, daw)),
            None => Feedback::Clear,
        }
    }
}

/// FX parameter whose steps snap to the context's stepped table on write.
struct JsfxParam;

impl Action for JsfxParam {
    fn do_action(&self, ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        let Some((track, fx)) = fx_slot(target, &*svc.daw) else { return };
        let value = ctx
            .stepped_values()
            .iter()
            .copied()
            .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
            .unwrap_or(value);
        svc.daw.set_fx_param(track, fx, ctx.param_index(), value);
    }

    fn current_normalized_value(&self, ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> f64 {
        FxParam.current_normalized_value(ctx, target, daw)
    }

    fn feedback(&self, ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        FxParam.feedback(ctx, target, daw)
    }
}

struct FocusedFxParam;

impl Action for FocusedFxParam {
    fn do_action(&self, _ctx: &ActionContext, value: f64, _target: &ActionTarget, svc: &mut Services<'_>) {
        if let Some((track, fx, param)) = last_touched(&*svc.daw) {
            svc.daw.set_fx_param(track, fx, param, value);
        }
    }

    fn current_normalized_value(&self, _ctx: &ActionContext, _target: &ActionTarget, daw: &dyn Daw) -> f64 {
        last_touched(daw).map(|(track, fx, param)| daw.fx_param(track, fx, param)).unwrap_or(0.0)
    }

    fn feedback(&self, _ctx: &ActionContext, _target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match last_touched(daw) {
            Some((track, fx, param)) => Feedback::Value(daw.fx_param(track, fx, param)),
            None => Feedback::Clear,
        }
    }
}

enum FxParamDisplay {
    Name,
    Value,
}

impl Action for FxParamDisplay {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    fn feedback(&self, ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        let Some((track, fx)) = fx_slot(target, daw) else { return Feedback::Text(String::new()) };
        Feedback::Text(match self {
            FxParamDisplay::Name if !ctx.fx_param_display_name().is_empty() => {
                ctx.fx_param_display_name().to_string()
            }
            FxParamDisplay::Name => daw.fx_param_name(track, fx, ctx.param_index()),
            FxParamDisplay::Value => daw.fx_param_formatted(track, fx, ctx.param_index()),
        })
    }
}

struct FxNameDisplay;

impl Action for FxNameDisplay {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        Feedback::Text(fx_slot(target, daw).map(|(track, fx)| daw.fx_name(track, fx)).unwrap_or_default())
    }
}

struct ToggleFxBypass;

impl Action for ToggleFxBypass {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        if value == 0.0 {
            return;
        }
        if let Some((track, fx)) = fx_slot(target, &*svc.daw) {
            let enabled = svc.daw.fx_enabled(track, fx);
            svc.daw.set_fx_enabled(track, fx, !enabled);
        }
    }

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        match fx_slot(target, daw) {
            Some((track, fx)) => Feedback::Value(if daw.fx_enabled(track, fx) { 1.0 } else { 0.0 }),
            None => Feedback::Clear,
        }
    }
}

struct FxBypassDisplay;

impl Action for FxBypassDisplay {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    fn feedback(&self, _ctx: &ActionContext, target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        let text = match fx_slot(target, daw) {
            Some((track, fx)) if daw.fx_enabled(track, fx) => "Enabled",
            Some(_) => "Bypassed",
            None => "",
        };
        Feedback::Text(text.to_string())
    }
}

enum FocusedFxParamDisplay {
    Name,
    Value,
}

impl Action for FocusedFxParamDisplay {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    fn feedback(&self, _ctx: &ActionContext, _target: &ActionTarget, daw: &dyn Daw) -> Feedback {
        let Some((track, fx, param)) = last_touched(daw) else { return Feedback::Text(String::new()) };
        Feedback::Text(match self {
            FocusedFxParamDisplay::Name => daw.fx_param_name(track, fx, param),
            FocusedFxParamDisplay::Value => daw.fx_param_formatted(track, fx, param),
        })
    }
}

/// Binds or drives a learn-zone cell; the zone manager does the work.
struct LearnFxParam;

impl Action for LearnFxParam {
    fn do_action(&self, _ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        svc.push(SurfaceCommand::Learn { zone: target.zone, widget: target.widget, value });
    }
}

/// Learn-zone displays are refreshed by the zone manager from the cell's learn state.
struct LearnDisplay;

impl Action for LearnDisplay {
    fn do_action(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}
}
