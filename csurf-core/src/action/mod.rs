//! Actions: what a binding does when its widget moves, and what it reports back.
//!
//! Actions are stateless; per-binding state lives in [`ActionContext`].
//! Anything that changes zone or modifier state is queued as a
//! [`SurfaceCommand`] and applied after dispatch.

mod fx;
mod surface;
mod track;

use std::collections::HashMap;

use csurf_types::{Modifier, Navigator, OutMessage, TrackId, WidgetId, ZoneId};

use crate::config::Config;
use crate::context::ActionContext;
use crate::daw::Daw;
use crate::steps::SteppedValueCache;
use crate::tracks::TrackListMode;

/// Where a context acts: resolved per dispatch from its zone.
#[derive(Debug, Clone)]
pub struct ActionTarget {
    pub zone: ZoneId,
    pub widget: WidgetId,
    pub track: Option<TrackId>,
    pub navigator: Navigator,
    pub slot_index: usize,
    /// Zone alias, or name when the alias is empty.
    pub zone_name: String,
}

/// Shared services available while an action runs.
pub struct Services<'a> {
    pub daw: &'a mut dyn Daw,
    pub config: &'a Config,
    pub steps: &'a mut SteppedValueCache,
    /// Active modifier combinations for the dispatching surface.
    pub modifiers: &'a [u32],
    pub commands: &'a mut Vec<SurfaceCommand>,
}

impl Services<'_> {
    pub fn push(&mut self, command: SurfaceCommand) {
        self.commands.push(command);
    }
}

/// What an action wants shown on its widget.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    None,
    Value(f64),
    Text(String),
    Clear,
}

/// State changes requested by actions, applied once the dispatch returns.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCommand {
    GoHome,
    AllSurfacesGoHome,
    GoSubZone { zone: ZoneId, name: String },
    LeaveSubZone { zone: ZoneId },
    GoAssociatedZone { name: String },
    GoFxSlot { track: TrackId, navigator: Navigator, slot: usize },
    GoFxLayoutZone { name: String, slot: usize },
    ClearFocusedFxParam,
    ClearFocusedFx,
    ClearSelectedTrackFx,
    ClearFxSlot,
    ToggleFocusedFxMapping,
    ToggleFocusedFxParamMapping,
    AutoMapFocusedFx,
    AutoMapSlotFx { track: TrackId, slot: usize },
    SaveLearnedFxParams,
    SaveTemplatedFxParams,
    EraseLastTouchedControl,
    Learn { zone: ZoneId, widget: WidgetId, value: f64 },
    Modifier { modifier: Modifier, pressed: bool },
    ClearModifier(Modifier),
    ClearModifiers,
    ToggleUseLocalModifiers,
    SetLatchTime(f64),
    ToggleChannel(usize),
    Bank { kind: String, amount: i32 },
    /// A `VCA`, `Folder` or `SelectedTracks` zone was activated or deactivated.
    TrackListMode { mode: TrackListMode, active: bool },
    ToggleVcaSpill(TrackId),
    ToggleFolderSpill(TrackId),
    NextPage,
    GoPage(String),
    Send(OutMessage),
}

pub trait Action {
    /// Applies a value that has already been range-clamped and inverted.
    fn do_action(&self, ctx: &ActionContext, value: f64, target: &ActionTarget, svc: &mut Services<'_>);

    /// Touch state change on the widget's channel.
    fn touch(&self, _ctx: &ActionContext, _value: f64, _target: &ActionTarget, _svc: &mut Services<'_>) {}

    /// Current value on the action's 0..1 scale, used by relative input.
    fn current_normalized_value(&self, _ctx: &ActionContext, _target: &ActionTarget, _daw: &dyn Daw) -> f64 {
        0.0
    }

    fn feedback(&self, _ctx: &ActionContext, _target: &ActionTarget, _daw: &dyn Daw) -> Feedback {
        Feedback::None
    }
}

pub type ActionFactory = fn() -> Box<dyn Action>;

/// Name to factory table consulted while zones are instantiated.
pub struct ActionRegistry {
    factories: HashMap<&'static str, ActionFactory>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtin_actions()
    }
}

impl ActionRegistry {
    pub fn empty() -> Self {
        let mut registry = Self { factories: HashMap::new() };
        registry.register("NoAction", || Box::new(surface::NoAction));
        registry
    }

    pub fn with_builtin_actions() -> Self {
        let mut registry = Self::empty();
        surface::register(&mut registry);
        track::register(&mut registry);
        fx::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: ActionFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiates `name`, or `NoAction` when it is not registered.
    pub fn create(&self, name: &str) -> Box<dyn Action> {
        match self.factories.get(name) {
            Some(factory) => factory(),
            None => {
                log::debug!(target: "action", "unknown action {}, using NoAction", name);
                Box::new(surface::NoAction)
            }
        }
    }
}
