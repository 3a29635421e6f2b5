//! One control surface: its widgets, its zone manager and the I/O behind it.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use csurf_types::{ManagerId, OutMessage, WidgetId};

use crate::action::{ActionRegistry, SurfaceCommand};
use crate::config::Config;
use crate::daw::Daw;
use crate::error::ZoneError;
use crate::modifiers::ModifierManager;
use crate::steps::SteppedValueCache;
use crate::tracks::TrackNavigation;
use crate::widget::WidgetSet;
use crate::zone_manager::{ManagerSettings, SurfaceEnv, ZoneManager};

/// Commands may queue further commands; this bounds the chain per cycle.
const MAX_COMMAND_ROUNDS: usize = 16;

/// Per-channel touch and toggle state.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    touched: HashSet<usize>,
    toggled: HashSet<usize>,
}

impl ChannelState {
    pub fn is_touched(&self, channel: usize) -> bool {
        self.touched.contains(&channel)
    }

    pub fn set_touched(&mut self, channel: usize, touched: bool) {
        if touched {
            self.touched.insert(channel);
        } else {
            self.touched.remove(&channel);
        }
    }

    pub fn is_toggled(&self, channel: usize) -> bool {
        self.toggled.contains(&channel)
    }

    pub fn toggle(&mut self, channel: usize) {
        if !self.toggled.remove(&channel) {
            self.toggled.insert(channel);
        }
    }
}

/// Decoded input, already matched to a widget by the I/O layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Value { widget: WidgetId, value: f64 },
    Relative { widget: WidgetId, delta: f64 },
    Accelerated { widget: WidgetId, level: usize, delta: f64 },
    Touch { widget: WidgetId, value: f64 },
}

impl InputEvent {
    pub fn widget(&self) -> WidgetId {
        match *self {
            InputEvent::Value { widget, .. }
            | InputEvent::Relative { widget, .. }
            | InputEvent::Accelerated { widget, .. }
            | InputEvent::Touch { widget, .. } => widget,
        }
    }

    fn value(&self) -> f64 {
        match *self {
            InputEvent::Value { value, .. } | InputEvent::Touch { value, .. } => value,
            InputEvent::Relative { delta, .. } | InputEvent::Accelerated { delta, .. } => delta,
        }
    }
}

/// Transport side of a surface.
pub trait SurfaceIo {
    /// Log target for IN/OUT tracing, e.g. `surface::midi`.
    fn log_target(&self) -> &'static str;

    /// Appends input received since the last poll.
    fn poll(&mut self, events: &mut Vec<InputEvent>);

    fn send(&mut self, message: &OutMessage);
}

/// In-process transport: input is pushed by hand and output is recorded.
/// Clones share the same queues.
#[derive(Debug, Clone, Default)]
pub struct Loopback {
    inbox: Rc<RefCell<Vec<InputEvent>>>,
    sent: Rc<RefCell<Vec<OutMessage>>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: InputEvent) {
        self.inbox.borrow_mut().push(event);
    }

    pub fn take_sent(&self) -> Vec<OutMessage> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }
}

impl SurfaceIo for Loopback {
    fn log_target(&self) -> &'static str {
        "surface"
    }

    fn poll(&mut self, events: &mut Vec<InputEvent>) {
        events.append(&mut self.inbox.borrow_mut());
    }

    fn send(&mut self, message: &OutMessage) {
        self.sent.borrow_mut().push(message.clone());
    }
}

/// Page-owned state a surface borrows for one call.
pub struct PageContext<'a> {
    pub daw: &'a mut dyn Daw,
    pub config: &'a Config,
    pub registry: &'a ActionRegistry,
    pub steps: &'a mut SteppedValueCache,
    pub tracks: &'a TrackNavigation,
    pub modifiers: &'a ModifierManager,
}

struct SurfaceState {
    widgets: WidgetSet,
    channels: ChannelState,
    local_modifiers: ModifierManager,
    uses_local_modifiers: bool,
    modifiers_changed: bool,
    commands: Vec<SurfaceCommand>,
    out: Vec<OutMessage>,
}

impl SurfaceState {
    fn modifiers<'a>(&'a self, cx: &'a PageContext<'_>) -> &'a [u32] {
        if self.uses_local_modifiers {
            self.local_modifiers.combinations()
        } else {
            cx.modifiers.combinations()
        }
    }

    fn env<'a>(&'a mut self, cx: &'a mut PageContext<'_>) -> SurfaceEnv<'a> {
        let modifiers = if self.uses_local_modifiers {
            self.local_modifiers.combinations()
        } else {
            cx.modifiers.combinations()
        };
        SurfaceEnv {
            daw: &mut *cx.daw,
            config: cx.config,
            registry: cx.registry,
            steps: &mut *cx.steps,
            tracks: cx.tracks,
            widgets: &mut self.widgets,
            channels: &self.channels,
            modifiers,
            commands: &mut self.commands,
            out: &mut self.out,
        }
    }
}

pub struct Surface {
    name: String,
    io: Box<dyn SurfaceIo>,
    zones: ZoneManager,
    state: SurfaceState,
    events: Vec<InputEvent>,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("name", &self.name)
            .field("widgets", &self.state.widgets.len())
            .field("zones", &self.zones)
            .finish()
    }
}

impl Surface {
    pub fn new(
        id: ManagerId,
        settings: ManagerSettings,
        widgets: WidgetSet,
        io: Box<dyn SurfaceIo>,
        latch_time_ms: f64,
    ) -> Self {
        Self {
            name: settings.surface_name.clone(),
            io,
            zones: ZoneManager::new(id, settings),
            state: SurfaceState {
                widgets,
                channels: ChannelState::default(),
                local_modifiers: ModifierManager::new(latch_time_ms),
                uses_local_modifiers: false,
                modifiers_changed: false,
                commands: Vec::new(),
                out: Vec::new(),
            },
            events: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zones(&self) -> &ZoneManager {
        &self.zones
    }

    pub fn zones_mut(&mut self) -> &mut ZoneManager {
        &mut self.zones
    }

    pub fn widgets(&self) -> &WidgetSet {
        &self.state.widgets
    }

    pub fn channels(&self) -> &ChannelState {
        &self.state.channels
    }

    pub fn uses_local_modifiers(&self) -> bool {
        self.state.uses_local_modifiers
    }

    pub fn local_modifiers(&self) -> &ModifierManager {
        &self.state.local_modifiers
    }

    /// Returns and resets whether this surface's local modifiers changed.
    pub fn take_modifiers_changed(&mut self) -> bool {
        std::mem::take(&mut self.state.modifiers_changed)
    }

    /// Loads zone files and activates Home.
    pub fn initialize(&mut self, cx: &mut PageContext<'_>) -> Result<(), ZoneError> {
        let mut env = self.state.env(cx);
        self.zones.initialize(&mut env)
    }

    /// Drains the transport and dispatches each event synchronously.
    pub fn poll_input(&mut self, cx: &mut PageContext<'_>) {
        self.io.poll(&mut self.events);
        let events = std::mem::take(&mut self.events);
        for event in events {
            self.handle_input(event, cx);
        }
    }

    pub fn handle_input(&mut self, event: InputEvent, cx: &mut PageContext<'_>) {
        let widget = event.widget();
        if cx.config.surface_in_display() {
            log::info!(
                target: self.io.log_target(),
                "IN <- {} {} {}",
                self.name,
                self.state.widgets.name_of(widget),
                event.value()
            );
        }
        if let InputEvent::Touch { value, .. } = event {
            let channel = self.state.widgets.channel_of(widget);
            self.state.channels.set_touched(channel, value != 0.0);
        }

        let mut env = self.state.env(cx);
        let handled = match event {
            InputEvent::Value { value, .. } => self.zones.do_action(widget, value, &mut env),
            InputEvent::Relative { delta, .. } => self.zones.do_relative_action(widget, delta, &mut env),
            InputEvent::Accelerated { level, delta, .. } => {
                self.zones.do_accelerated_relative_action(widget, level, delta, &mut env)
            }
            InputEvent::Touch { value, .. } => self.zones.do_touch(widget, value, &mut env),
        };
        if !handled {
            log::trace!(target: "zone", "{}: {} is unbound", self.name, self.state.widgets.name_of(widget));
        }
    }

    /// Applies queued commands. Commands for the page or integrator are returned.
    pub fn apply_commands(&mut self, cx: &mut PageContext<'_>) -> Vec<SurfaceCommand> {
        let mut bubbled = Vec::new();
        for _ in 0..MAX_COMMAND_ROUNDS {
            if self.state.commands.is_empty() {
                return bubbled;
            }
            let commands = std::mem::take(&mut self.state.commands);
            for command in commands {
                let rest = {
                    let mut env = self.state.env(cx);
                    self.zones.handle_command(command, &mut env)
                };
                if let Some(rest) = rest {
                    bubbled.extend(self.handle_surface_command(rest, cx));
                }
            }
        }
        if !self.state.commands.is_empty() {
            log::warn!(
                target: "zone",
                "{}: dropping {} commands queued by a command loop",
                self.name,
                self.state.commands.len()
            );
            self.state.commands.clear();
        }
        bubbled
    }

    fn handle_surface_command(&mut self, command: SurfaceCommand, cx: &mut PageContext<'_>) -> Option<SurfaceCommand> {
        let local = self.state.uses_local_modifiers;
        match command {
            SurfaceCommand::Modifier { modifier, pressed } if local => {
                let now = cx.daw.now_ms();
                if let Some(text) = self.state.local_modifiers.set_modifier(modifier, pressed, now) {
                    cx.daw.speak(&text);
                }
                self.local_modifiers_changed();
            }
            SurfaceCommand::ClearModifier(modifier) if local => {
                self.state.local_modifiers.clear_modifier(modifier);
                self.local_modifiers_changed();
            }
            SurfaceCommand::ClearModifiers if local => {
                self.state.local_modifiers.clear_modifiers();
                self.local_modifiers_changed();
            }
            SurfaceCommand::ToggleUseLocalModifiers => {
                self.state.uses_local_modifiers = !local;
                log::debug!(
                    target: "modifiers",
                    "{}: local modifiers {}",
                    self.name,
                    if local { "off" } else { "on" }
                );
                self.refresh_modifiers(cx);
            }
            SurfaceCommand::SetLatchTime(ms) => {
                self.state.local_modifiers.set_latch_time_ms(ms);
                return Some(SurfaceCommand::SetLatchTime(ms));
            }
            SurfaceCommand::ToggleChannel(channel) => self.state.channels.toggle(channel),
            SurfaceCommand::Send(message) => self.state.out.push(message),
            other => return Some(other),
        }
        None
    }

    fn local_modifiers_changed(&mut self) {
        self.state.modifiers_changed = true;
        let combinations = self.state.local_modifiers.combinations().to_vec();
        self.zones.update_current_modifiers(&combinations, &mut self.state.widgets);
    }

    /// Recomputes cached zone modifiers from whichever manager is in effect.
    pub fn refresh_modifiers(&mut self, cx: &PageContext<'_>) {
        let combinations = self.state.modifiers(cx).to_vec();
        self.zones.update_current_modifiers(&combinations, &mut self.state.widgets);
    }

    /// Mirrors a broadcaster's local modifiers onto this surface.
    pub fn copy_local_modifiers(&mut self, from: &ModifierManager) {
        if !self.state.uses_local_modifiers {
            return;
        }
        self.state.local_modifiers.copy_state_from(from);
        let combinations = self.state.local_modifiers.combinations().to_vec();
        self.zones.update_current_modifiers(&combinations, &mut self.state.widgets);
    }

    /// Runs `f` against this surface's zone manager with a full environment.
    pub fn with_zones<R>(
        &mut self,
        cx: &mut PageContext<'_>,
        f: impl FnOnce(&mut ZoneManager, &mut SurfaceEnv<'_>) -> R,
    ) -> R {
        let mut env = self.state.env(cx);
        f(&mut self.zones, &mut env)
    }

    /// Focus tracking, held actions and feedback, then deferred collection.
    pub fn update(&mut self, cx: &mut PageContext<'_>) {
        {
            let mut env = self.state.env(cx);
            self.zones.check_focused_fx_state(&mut env);
            self.zones.request_update(&mut env);
        }
        self.zones.collect_garbage();
    }

    /// Force-clears every widget, e.g. when the page is left.
    pub fn clear_widgets(&mut self) {
        let ids: Vec<WidgetId> = self.state.widgets.ids().collect();
        for id in ids {
            if let Some(widget) = self.state.widgets.get_mut(id) {
                widget.force_clear(&mut self.state.out);
            }
        }
    }

    /// Sends everything queued for the device.
    pub fn flush(&mut self, config: &Config) {
        for message in self.state.out.drain(..) {
            if config.surface_out_display() {
                log::info!(target: self.io.log_target(), "OUT -> {} {:?}", self.name, message);
            }
            self.io.send(&message);
        }
    }

    /// Messages queued but not yet flushed.
    pub fn pending_output(&self) -> &[OutMessage] {
        &self.state.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_state_toggle_and_touch() {
        let mut channels = ChannelState::default();
        channels.toggle(3);
        assert!(channels.is_toggled(3));
        channels.toggle(3);
        assert!(!channels.is_toggled(3));
        channels.set_touched(1, true);
        assert!(channels.is_touched(1));
        channels.set_touched(1, false);
        assert!(!channels.is_touched(1));
    }

    #[test]
    fn test_input_event_widget() {
        let w = WidgetId::new(4);
        assert_eq!(InputEvent::Accelerated { widget: w, level: 2, delta: 1.0 }.widget(), w);
        assert_eq!(InputEvent::Touch { widget: w, value: 1.0 }.value(), 1.0);
    }

    #[test]
    fn test_loopback_clones_share_queues() {
        let handle = Loopback::new();
        let mut io = handle.clone();
        handle.push(InputEvent::Value { widget: WidgetId::new(0), value: 1.0 });
        let mut events = Vec::new();
        io.poll(&mut events);
        assert_eq!(events.len(), 1);
        io.poll(&mut events);
        assert_eq!(events.len(), 1);

        io.send(&OutMessage::Midi { status: 0x90, data1: 1, data2: 127 });
        assert_eq!(handle.take_sent().len(), 1);
        assert!(handle.take_sent().is_empty());
    }
}
