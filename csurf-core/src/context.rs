//! ActionContext: one instantiated binding of an action to a widget in a zone,
//! carrying the value shaping state (range, steps, acceleration, hold, colour).

use csurf_types::{OutMessage, Rgba, TrackId, WidgetId, ZoneId};

use crate::action::{Action, ActionTarget, Feedback, Services};
use crate::config::Config;
use crate::daw::Daw;
use crate::values::{ColorSpec, ValueSpec, WidgetDefaults};
use crate::widget::{Widget, WidgetProperties};

/// Notified just before a range-bound value reaches its action.
pub trait MoveObserver {
    fn widget_moved(&mut self, ctx: &mut ActionContext, target: &ActionTarget, svc: &mut Services<'_>);
}

/// Observer that ignores every move.
pub struct NoObserver;

impl MoveObserver for NoObserver {
    fn widget_moved(&mut self, _ctx: &mut ActionContext, _target: &ActionTarget, _svc: &mut Services<'_>) {}
}

pub struct ActionContext {
    action: Box<dyn Action>,
    action_name: String,
    widget: WidgetId,
    widget_name: String,
    zone: ZoneId,
    modifier: u32,

    int_param: i32,
    string_param: String,
    param_index: i32,
    command_id: i32,
    fx_param_display_name: String,
    parameters: Vec<String>,
    widget_properties: WidgetProperties,

    range_minimum: f64,
    range_maximum: f64,
    stepped_values: Vec<f64>,
    stepped_values_index: usize,
    delta_value: f64,
    accelerated_delta_values: Vec<f64>,
    accelerated_tick_values: Vec<u32>,
    accumulated_inc_ticks: u32,
    accumulated_dec_ticks: u32,

    is_value_inverted: bool,
    is_feedback_inverted: bool,
    hold_delay_ms: f64,
    delay_start_time: Option<f64>,
    deferred_value: f64,

    supports_color: bool,
    color_values: Vec<Rgba>,
    current_color_index: usize,
    supports_track_color: bool,

    provide_feedback: bool,
    cell_address: String,
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("action", &self.action_name)
            .field("widget", &self.widget_name)
            .field("zone", &self.zone)
            .field("modifier", &self.modifier)
            .finish()
    }
}

fn starts_with_digit(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Leading integer of `s` (`atol` semantics): optional sign, then digits.
fn leading_int(s: &str) -> i32 {
    let mut end = 0;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() || (i == 0 && c == '-') {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    s[..end].parse().unwrap_or(0)
}

impl ActionContext {
    /// Builds a context. `params_and_properties[0]` is the action name; tokens
    /// containing `=` become widget properties.
    pub fn new(
        action: Box<dyn Action>,
        params_and_properties: &[String],
        widget_id: WidgetId,
        widget: &Widget,
        zone: ZoneId,
        daw: &dyn Daw,
        config: &Config,
    ) -> Self {
        let mut widget_properties = WidgetProperties::new();
        let mut params: Vec<String> = Vec::new();
        for p in params_and_properties {
            if p.contains('=') {
                let kvp: Vec<&str> = p.split('=').collect();
                if kvp.len() == 2 {
                    widget_properties.insert(kvp[0].to_string(), kvp[1].to_string());
                }
            } else {
                params.push(p.clone());
            }
        }

        let action_name = params.first().cloned().unwrap_or_default();
        let first = params.get(1).map(String::as_str).unwrap_or("");

        let mut ctx = ActionContext {
            action,
            action_name: action_name.clone(),
            widget: widget_id,
            widget_name: widget.name().to_string(),
            zone,
            modifier: 0,
            int_param: 0,
            string_param: String::new(),
            param_index: 0,
            command_id: 0,
            fx_param_display_name: String::new(),
            parameters: params.iter().skip(1).cloned().collect(),
            widget_properties,
            range_minimum: 0.0,
            range_maximum: 1.0,
            stepped_values: Vec::new(),
            stepped_values_index: 0,
            delta_value: 0.0,
            accelerated_delta_values: Vec::new(),
            accelerated_tick_values: Vec::new(),
            accumulated_inc_ticks: 0,
            accumulated_dec_ticks: 0,
            is_value_inverted: false,
            is_feedback_inverted: false,
            hold_delay_ms: 0.0,
            delay_start_time: None,
            deferred_value: 0.0,
            supports_color: false,
            color_values: Vec::new(),
            current_color_index: 0,
            supports_track_color: false,
            provide_feedback: false,
            cell_address: String::new(),
        };

        if starts_with_digit(first) || first.starts_with('-') {
            ctx.int_param = leading_int(first);
        }
        if starts_with_digit(first) {
            ctx.param_index = leading_int(first);
        }
        if params.len() > 1 {
            ctx.string_param = first.to_string();
        }
        if action_name == "Bank" {
            if let Some(amount) = params.get(2).filter(|p| starts_with_digit(p) || p.starts_with('-')) {
                ctx.int_param = leading_int(amount);
            }
        }

        match action_name.as_str() {
            "TrackVolumeDB" | "TrackSendVolumeDB" => {
                ctx.range_minimum = -144.0;
                ctx.range_maximum = 24.0;
            }
            "TrackPanPercent" | "TrackPanWidthPercent" | "TrackPanLPercent" | "TrackPanRPercent"
            | "TrackSendPanPercent" => {
                ctx.range_minimum = -100.0;
                ctx.range_maximum = 100.0;
            }
            "Reaper" if params.len() > 1 => {
                ctx.command_id = if starts_with_digit(first) {
                    leading_int(first)
                } else {
                    daw.named_command(first).filter(|id| *id != 0).unwrap_or(65535)
                };
            }
            "FXParamNameDisplay" if starts_with_digit(first) => {
                if let Some(name) = params.get(2).filter(|p| *p != "{" && *p != "[") {
                    ctx.fx_param_display_name = name.clone();
                }
            }
            _ => {}
        }

        let colors = ColorSpec::parse(&params);
        ctx.supports_color = colors.supports_color;
        ctx.supports_track_color = colors.follows_track_color;
        ctx.color_values = colors.colors;

        let values = ValueSpec::parse(
            &params,
            WidgetDefaults {
                step_size: widget.step_size(),
                acceleration_values: widget.acceleration_values(),
            },
            |n| config.base_tick_count(n),
        );
        if let Some((min, max)) = values.range {
            ctx.range_minimum = min;
            ctx.range_maximum = max;
        }
        ctx.stepped_values = values.stepped_values;
        ctx.delta_value = values.delta;
        ctx.accelerated_delta_values = values.accelerated_deltas;
        ctx.accelerated_tick_values = values.accelerated_ticks;

        if ctx.accelerated_tick_values.is_empty() {
            ctx.accelerated_tick_values.push(10);
        }

        ctx
    }

    // ─── Accessors ─────────────────────────────────────────────────

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn widget(&self) -> WidgetId {
        self.widget
    }

    pub fn widget_name(&self) -> &str {
        &self.widget_name
    }

    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    /// Binding mask this context is stored under.
    pub fn modifier(&self) -> u32 {
        self.modifier
    }

    pub fn set_modifier(&mut self, modifier: u32) {
        self.modifier = modifier;
    }

    pub fn int_param(&self) -> i32 {
        self.int_param
    }

    pub fn string_param(&self) -> &str {
        &self.string_param
    }

    pub fn param_index(&self) -> i32 {
        self.param_index
    }

    pub fn set_param_index(&mut self, index: i32) {
        self.param_index = index;
    }

    pub fn command_id(&self) -> i32 {
        self.command_id
    }

    pub fn fx_param_display_name(&self) -> &str {
        &self.fx_param_display_name
    }

    /// Parameters after the action name, properties excluded.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn widget_properties(&self) -> &WidgetProperties {
        &self.widget_properties
    }

    pub fn range(&self) -> (f64, f64) {
        (self.range_minimum, self.range_maximum)
    }

    pub fn set_range(&mut self, min: f64, max: f64) {
        self.range_minimum = min;
        self.range_maximum = max;
    }

    pub fn stepped_values(&self) -> &[f64] {
        &self.stepped_values
    }

    pub fn set_stepped_values(&mut self, values: Vec<f64>) {
        self.stepped_values = values;
        self.stepped_values_index = 0;
    }

    pub fn stepped_values_index(&self) -> usize {
        self.stepped_values_index
    }

    pub fn delta_value(&self) -> f64 {
        self.delta_value
    }

    pub fn accelerated_tick_values(&self) -> &[u32] {
        &self.accelerated_tick_values
    }

    pub fn accumulated_ticks(&self) -> (u32, u32) {
        (self.accumulated_inc_ticks, self.accumulated_dec_ticks)
    }

    pub fn set_value_inverted(&mut self) {
        self.is_value_inverted = true;
    }

    pub fn set_feedback_inverted(&mut self) {
        self.is_feedback_inverted = true;
    }

    pub fn set_hold_delay_ms(&mut self, ms: f64) {
        self.hold_delay_ms = ms;
    }

    pub fn provides_feedback(&self) -> bool {
        self.provide_feedback
    }

    pub fn set_provide_feedback(&mut self, provide: bool) {
        self.provide_feedback = provide;
    }

    pub fn colors(&self) -> &[Rgba] {
        &self.color_values
    }

    pub fn current_color_index(&self) -> usize {
        self.current_color_index
    }

    pub fn cell_address(&self) -> &str {
        &self.cell_address
    }

    pub fn set_cell_address(&mut self, address: impl Into<String>) {
        self.cell_address = address.into();
    }

    pub fn current_normalized_value(&self, target: &ActionTarget, daw: &dyn Daw) -> f64 {
        self.action.current_normalized_value(self, target, daw)
    }

    // ─── Dispatch ──────────────────────────────────────────────────

    /// Absolute input: press/release or fader position.
    pub fn do_action(
        &mut self,
        value: f64,
        target: &ActionTarget,
        svc: &mut Services<'_>,
        observer: &mut dyn MoveObserver,
    ) {
        if self.hold_delay_ms != 0.0 {
            if value == 0.0 {
                self.deferred_value = 0.0;
                self.delay_start_time = None;
            } else {
                self.deferred_value = value;
                self.delay_start_time = Some(svc.daw.now_ms());
            }
        } else if !self.stepped_values.is_empty() {
            if value != 0.0 {
                self.advance_stepped_index();
                let v = self.stepped_values[self.stepped_values_index];
                self.do_range_bound_action(v, target, svc, observer);
            }
        } else {
            self.do_range_bound_action(value, target, svc, observer);
        }
    }

    /// Fires a held binding once its delay has elapsed.
    pub fn run_deferred_actions(
        &mut self,
        target: &ActionTarget,
        svc: &mut Services<'_>,
        observer: &mut dyn MoveObserver,
    ) {
        let Some(start) = self.delay_start_time else { return };
        if self.hold_delay_ms == 0.0 || svc.daw.now_ms() <= start + self.hold_delay_ms {
            return;
        }

        if !self.stepped_values.is_empty() {
            if self.deferred_value != 0.0 {
                self.advance_stepped_index();
                let v = self.stepped_values[self.stepped_values_index];
                self.do_range_bound_action(v, target, svc, observer);
            }
        } else {
            let v = self.deferred_value;
            self.do_range_bound_action(v, target, svc, observer);
        }

        self.delay_start_time = None;
        self.deferred_value = 0.0;
    }

    /// Wraps to the first step only when the table ascends.
    fn advance_stepped_index(&mut self) {
        let last = self.stepped_values.len() - 1;
        if self.stepped_values_index >= last {
            if self.stepped_values[0] < self.stepped_values[last] {
                self.stepped_values_index = 0;
            }
        } else {
            self.stepped_values_index += 1;
        }
    }

    fn relative_delta(&self, delta: f64) -> f64 {
        if self.delta_value != 0.0 {
            if delta > 0.0 {
                self.delta_value
            } else {
                -self.delta_value
            }
        } else {
            delta
        }
    }

    /// Relative input from a plain encoder.
    pub fn do_relative_action(
        &mut self,
        delta: f64,
        target: &ActionTarget,
        svc: &mut Services<'_>,
        observer: &mut dyn MoveObserver,
    ) {
        if !self.stepped_values.is_empty() {
            self.step_by(delta, target, svc, observer);
        } else {
            let v = self.current_normalized_value(target, &*svc.daw) + self.relative_delta(delta);
            self.do_range_bound_action(v, target, svc, observer);
        }
    }

    /// Relative input from an accelerated encoder; `level` is the acceleration index.
    pub fn do_accelerated_relative_action(
        &mut self,
        level: usize,
        delta: f64,
        target: &ActionTarget,
        svc: &mut Services<'_>,
        observer: &mut dyn MoveObserver,
    ) {
        if !self.stepped_values.is_empty() {
            self.do_accelerated_stepped_value_action(level, delta, target, svc, observer);
        } else if !self.accelerated_delta_values.is_empty() {
            let idx = level.min(self.accelerated_delta_values.len() - 1);
            let step = self.accelerated_delta_values[idx];
            let current = self.current_normalized_value(target, &*svc.daw);
            let v = if delta > 0.0 { current + step } else { current - step };
            self.do_range_bound_action(v, target, svc, observer);
        } else {
            let v = self.current_normalized_value(target, &*svc.daw) + self.relative_delta(delta);
            self.do_range_bound_action(v, target, svc, observer);
        }
    }

    fn step_by(
        &mut self,
        delta: f64,
        target: &ActionTarget,
        svc: &mut Services<'_>,
        observer: &mut dyn MoveObserver,
    ) {
        let last = self.stepped_values.len() - 1;
        if delta > 0.0 {
            self.stepped_values_index = (self.stepped_values_index + 1).min(last);
        } else {
            self.stepped_values_index = self.stepped_values_index.saturating_sub(1);
        }
        let v = self.stepped_values[self.stepped_values_index];
        self.do_range_bound_action(v, target, svc, observer);
    }

    fn do_accelerated_stepped_value_action(
        &mut self,
        level: usize,
        delta: f64,
        target: &ActionTarget,
        svc: &mut Services<'_>,
        observer: &mut dyn MoveObserver,
    ) {
        if delta > 0.0 {
            self.accumulated_inc_ticks += 1;
            self.accumulated_dec_ticks = self.accumulated_dec_ticks.saturating_sub(1);
        } else if delta < 0.0 {
            self.accumulated_dec_ticks += 1;
            self.accumulated_inc_ticks = self.accumulated_inc_ticks.saturating_sub(1);
        }

        let idx = level.min(self.accelerated_tick_values.len().saturating_sub(1));
        let threshold = self.accelerated_tick_values.get(idx).copied().unwrap_or(10);

        let fire = (delta > 0.0 && self.accumulated_inc_ticks >= threshold)
            || (delta < 0.0 && self.accumulated_dec_ticks >= threshold);

        if fire {
            self.accumulated_inc_ticks = 0;
            self.accumulated_dec_ticks = 0;
            self.step_by(delta, target, svc, observer);
        }
    }

    /// Clamps, inverts, notifies the observer, then runs the action.
    pub fn do_range_bound_action(
        &mut self,
        value: f64,
        target: &ActionTarget,
        svc: &mut Services<'_>,
        observer: &mut dyn MoveObserver,
    ) {
        let mut value = value.min(self.range_maximum).max(self.range_minimum);

        if self.is_value_inverted {
            value = 1.0 - value;
        }

        observer.widget_moved(self, target, svc);

        self.action.do_action(self, value, target, svc);
    }

    pub fn do_touch(&mut self, value: f64, target: &ActionTarget, svc: &mut Services<'_>) {
        self.action.touch(self, value, target, svc);
    }

    // ─── Feedback ──────────────────────────────────────────────────

    pub fn request_update(
        &mut self,
        target: &ActionTarget,
        daw: &dyn Daw,
        widget: &mut Widget,
        out: &mut Vec<OutMessage>,
    ) {
        if !self.provide_feedback {
            return;
        }
        match self.action.feedback(self, target, daw) {
            Feedback::None => {}
            Feedback::Value(v) => self.update_widget_value(v, target.track, daw, widget, out),
            Feedback::Text(text) => widget.update_text(&self.widget_properties, &text, out),
            Feedback::Clear => self.clear_widget(widget, out),
        }
    }

    pub fn clear_widget(&mut self, widget: &mut Widget, out: &mut Vec<OutMessage>) {
        widget.update_value(&self.widget_properties, 0.0, out);
        widget.update_text(&self.widget_properties, "", out);
    }

    pub fn update_widget_value(
        &mut self,
        value: f64,
        track: Option<TrackId>,
        daw: &dyn Daw,
        widget: &mut Widget,
        out: &mut Vec<OutMessage>,
    ) {
        if !self.stepped_values.is_empty() {
            self.set_stepped_value_index(value);
        }

        let value = if self.is_feedback_inverted { 1.0 - value } else { value };

        widget.update_value(&self.widget_properties, value, out);

        if self.supports_color {
            self.current_color_index = if value == 0.0 { 0 } else { 1 };
            if let Some(color) = self.color_values.get(self.current_color_index) {
                widget.update_color(*color, out);
            }
        }

        if self.supports_track_color {
            if let Some(track) = track {
                widget.update_color(daw.track_color(track), out);
            }
        }
    }

    /// Points the stepped index at the step closest to `value`.
    fn set_stepped_value_index(&mut self, value: f64) {
        let mut best = 0;
        let mut best_distance = f64::MAX;
        for (i, v) in self.stepped_values.iter().enumerate() {
            let distance = (v - value).abs();
            if distance < best_distance {
                best = i;
                best_distance = distance;
            }
        }
        self.stepped_values_index = best;
    }

    pub fn update_text(&self, text: &str, widget: &mut Widget, out: &mut Vec<OutMessage>) {
        widget.update_text(&self.widget_properties, text, out);
    }
}
