use std::collections::{BTreeMap, HashMap};

use csurf_types::{OutMessage, Rgba, WidgetId};

use crate::context::ActionContext;

/// `key=value` parameters of a binding, passed through to feedback processors.
pub type WidgetProperties = BTreeMap<String, String>;

/// Device-specific encoder of widget feedback.
///
/// Implementations translate values, text and colour into outgoing messages
/// and are free to suppress duplicates.
pub trait FeedbackProcessor {
    fn set_value(&mut self, properties: &WidgetProperties, value: f64, out: &mut Vec<OutMessage>);

    fn set_text(&mut self, _properties: &WidgetProperties, _text: &str, _out: &mut Vec<OutMessage>) {}

    fn set_color(&mut self, _color: Rgba, _out: &mut Vec<OutMessage>) {}

    /// Called with the widget's bindings whenever the zone or modifier
    /// that owns the widget changes.
    fn configure(&mut self, _contexts: &[ActionContext]) {}

    /// Sends a neutral state regardless of what was sent before.
    fn force_clear(&mut self, out: &mut Vec<OutMessage>);
}

/// A named physical control on a surface.
pub struct Widget {
    name: String,
    channel: usize,
    step_size: f64,
    acceleration_values: Vec<f64>,
    processors: Vec<Box<dyn FeedbackProcessor>>,
    last_value: Option<f64>,
    last_text: Option<String>,
    last_color: Option<Rgba>,
}

impl std::fmt::Debug for Widget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Widget")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("processors", &self.processors.len())
            .finish()
    }
}

/// Trailing decimal digits of a widget name, 0 when there are none.
pub fn channel_from_name(name: &str) -> usize {
    let digits: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(0)
}

impl Widget {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let channel = channel_from_name(&name);
        Self {
            name,
            channel,
            step_size: 0.0,
            acceleration_values: Vec::new(),
            processors: Vec::new(),
            last_value: None,
            last_text: None,
            last_color: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn set_step_size(&mut self, step_size: f64) {
        self.step_size = step_size;
    }

    pub fn acceleration_values(&self) -> &[f64] {
        &self.acceleration_values
    }

    pub fn set_acceleration_values(&mut self, values: Vec<f64>) {
        self.acceleration_values = values;
    }

    pub fn add_feedback_processor(&mut self, processor: Box<dyn FeedbackProcessor>) {
        self.processors.push(processor);
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    pub fn last_text(&self) -> Option<&str> {
        self.last_text.as_deref()
    }

    pub fn last_color(&self) -> Option<Rgba> {
        self.last_color
    }

    pub fn update_value(&mut self, properties: &WidgetProperties, value: f64, out: &mut Vec<OutMessage>) {
        self.last_value = Some(value);
        for p in &mut self.processors {
            p.set_value(properties, value, out);
        }
    }

    pub fn update_text(&mut self, properties: &WidgetProperties, text: &str, out: &mut Vec<OutMessage>) {
        self.last_text = Some(text.to_string());
        for p in &mut self.processors {
            p.set_text(properties, text, out);
        }
    }

    pub fn update_color(&mut self, color: Rgba, out: &mut Vec<OutMessage>) {
        self.last_color = Some(color);
        for p in &mut self.processors {
            p.set_color(color, out);
        }
    }

    pub fn configure(&mut self, contexts: &[ActionContext]) {
        for p in &mut self.processors {
            p.configure(contexts);
        }
    }

    pub fn force_clear(&mut self, out: &mut Vec<OutMessage>) {
        self.last_value = Some(0.0);
        self.last_text = Some(String::new());
        for p in &mut self.processors {
            p.force_clear(out);
        }
    }
}

/// All widgets of one surface, addressable by id or name.
#[derive(Debug, Default)]
pub struct WidgetSet {
    widgets: Vec<Widget>,
    by_name: HashMap<String, WidgetId>,
}

impl WidgetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a widget; a duplicate name replaces the earlier lookup entry.
    pub fn add(&mut self, widget: Widget) -> WidgetId {
        let id = WidgetId::new(self.widgets.len() as u32);
        self.by_name.insert(widget.name().to_string(), id);
        self.widgets.push(widget);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<WidgetId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: WidgetId) -> Option<&Widget> {
        self.widgets.get(id.index())
    }

    pub fn get_mut(&mut self, id: WidgetId) -> Option<&mut Widget> {
        self.widgets.get_mut(id.index())
    }

    pub fn by_name(&self, name: &str) -> Option<&Widget> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = WidgetId> {
        (0..self.widgets.len() as u32).map(WidgetId::new)
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn name_of(&self, id: WidgetId) -> &str {
        self.get(id).map(Widget::name).unwrap_or("")
    }

    pub fn channel_of(&self, id: WidgetId) -> usize {
        self.get(id).map(Widget::channel).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_from_name() {
        assert_eq!(channel_from_name("Fader12"), 12);
        assert_eq!(channel_from_name("Play"), 0);
        assert_eq!(channel_from_name("Rotary2A3"), 3);
    }

    #[test]
    fn test_widget_set_lookup() {
        let mut set = WidgetSet::new();
        let a = set.add(Widget::new("Fader1"));
        let b = set.add(Widget::new("Mute1"));
        assert_eq!(set.id_of("Mute1"), Some(b));
        assert_eq!(set.name_of(a), "Fader1");
        assert_eq!(set.channel_of(b), 1);
        assert_eq!(set.len(), 2);
        assert!(set.id_of("Solo1").is_none());
    }

    #[test]
    fn test_update_records_last_values() {
        let mut w = Widget::new("Display1");
        let mut out = Vec::new();
        w.update_text(&WidgetProperties::new(), "Kick", &mut out);
        w.update_value(&WidgetProperties::new(), 0.25, &mut out);
        assert_eq!(w.last_text(), Some("Kick"));
        assert_eq!(w.last_value(), Some(0.25));
        assert!(out.is_empty());
    }
}
