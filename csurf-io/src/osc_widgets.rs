//! `.ost` OSC widget templates. Every line names an OSC address:
//!
//! ```text
//! Widget Fader1
//!     Control /track/1/volume
//!     FB_Processor /track/1/volume
//! WidgetEnd
//! ```

use std::collections::HashMap;
use std::path::Path;

use csurf_core::error::Diagnostic;
use csurf_core::surface::InputEvent;
use csurf_core::tokenizer::{is_ignorable, tokenize, trim_line};
use csurf_core::widget::{FeedbackProcessor, Widget, WidgetProperties, WidgetSet};
use csurf_types::{OscArg, OutMessage, WidgetId};

use crate::error::IoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscInput {
    Control,
    AnyPress,
    /// A fader without touch sensing; each move is wrapped in a touch.
    MotorizedFaderWithoutTouch,
    Touch,
}

impl OscInput {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Control" => Some(OscInput::Control),
            "AnyPress" => Some(OscInput::AnyPress),
            "MotorizedFaderWithoutTouch" => Some(OscInput::MotorizedFaderWithoutTouch),
            "Touch" => Some(OscInput::Touch),
            _ => None,
        }
    }

    fn events(self, widget: WidgetId, value: f64, events: &mut Vec<InputEvent>) {
        match self {
            OscInput::Control => events.push(InputEvent::Value { widget, value }),
            OscInput::AnyPress => events.push(InputEvent::Value {
                widget,
                value: if value != 0.0 { 1.0 } else { 0.0 },
            }),
            OscInput::MotorizedFaderWithoutTouch => {
                events.push(InputEvent::Touch { widget, value: 1.0 });
                events.push(InputEvent::Value { widget, value });
                events.push(InputEvent::Touch { widget, value: 0.0 });
            }
            OscInput::Touch => events.push(InputEvent::Touch { widget, value }),
        }
    }
}

/// Input bindings by OSC address.
#[derive(Debug, Default)]
pub struct AddressTable {
    by_address: HashMap<String, Vec<(WidgetId, OscInput)>>,
}

impl AddressTable {
    pub fn len(&self) -> usize {
        self.by_address.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Returns false when nothing listens on `address`.
    pub fn process(&self, address: &str, value: f64, events: &mut Vec<InputEvent>) -> bool {
        let Some(bindings) = self.by_address.get(address) else {
            return false;
        };
        for &(widget, input) in bindings {
            input.events(widget, value, events);
        }
        true
    }
}

/// Sends values as floats and text as strings to one address.
#[derive(Debug)]
pub struct OscProcessor {
    address: String,
    integer: bool,
    last: Option<OscArg>,
}

impl OscProcessor {
    pub fn float(address: impl Into<String>) -> Self {
        Self { address: address.into(), integer: false, last: None }
    }

    /// Sends values truncated to `i32`.
    pub fn int(address: impl Into<String>) -> Self {
        Self { address: address.into(), integer: true, last: None }
    }

    fn send(&mut self, arg: OscArg, out: &mut Vec<OutMessage>) {
        if self.last.as_ref() == Some(&arg) {
            return;
        }
        self.last = Some(arg.clone());
        out.push(OutMessage::Osc { address: self.address.clone(), args: vec![arg] });
    }

    fn value_arg(&self, value: f64) -> OscArg {
        if self.integer {
            OscArg::Int(value as i32)
        } else {
            OscArg::Float(value as f32)
        }
    }
}

impl FeedbackProcessor for OscProcessor {
    fn set_value(&mut self, _properties: &WidgetProperties, value: f64, out: &mut Vec<OutMessage>) {
        let arg = self.value_arg(value);
        self.send(arg, out);
    }

    fn set_text(&mut self, _properties: &WidgetProperties, text: &str, out: &mut Vec<OutMessage>) {
        self.send(OscArg::Str(text.to_string()), out);
    }

    fn force_clear(&mut self, out: &mut Vec<OutMessage>) {
        self.last = None;
        let arg = self.value_arg(0.0);
        self.send(arg, out);
    }
}

/// A parsed `.ost` file.
#[derive(Debug, Default)]
pub struct OscTemplate {
    pub widgets: WidgetSet,
    pub addresses: AddressTable,
}

pub fn load_osc_template(path: &Path) -> Result<(OscTemplate, Vec<Diagnostic>), IoError> {
    if !path.is_file() {
        return Err(IoError::MissingTemplate(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_osc_template(path, &contents))
}

pub fn parse_osc_template(path: &Path, contents: &str) -> (OscTemplate, Vec<Diagnostic>) {
    let mut template = OscTemplate::default();
    let mut diagnostics = Vec::new();
    let mut current: Option<(Widget, Vec<(String, OscInput)>)> = None;

    for (index, raw) in contents.lines().enumerate() {
        let line_number = index + 1;
        let line = trim_line(raw);
        if is_ignorable(&line) {
            continue;
        }
        let tokens = tokenize(&line);

        if tokens[0] == "WidgetEnd" {
            match current.take() {
                Some((widget, inputs)) => add_widget(&mut template, widget, inputs),
                None => diagnostics.push(Diagnostic::new(path, line_number, "WidgetEnd without Widget")),
            }
            continue;
        }

        let Some((widget, inputs)) = current.as_mut() else {
            match tokens.as_slice() {
                [kind, name, ..] if kind == "Widget" => current = Some((Widget::new(name.as_str()), Vec::new())),
                _ => diagnostics.push(Diagnostic::new(path, line_number, format!("unexpected {}", tokens[0]))),
            }
            continue;
        };

        match tokens.as_slice() {
            [kind, address] if kind == "FB_Processor" => {
                widget.add_feedback_processor(Box::new(OscProcessor::float(address.as_str())))
            }
            [kind, address] if kind == "FB_IntProcessor" => {
                widget.add_feedback_processor(Box::new(OscProcessor::int(address.as_str())))
            }
            [kind, address] => match OscInput::from_name(kind) {
                Some(input) => inputs.push((address.clone(), input)),
                None => log::debug!(target: "surface::osc", "{}: skipping {}", widget.name(), kind),
            },
            _ => diagnostics.push(Diagnostic::new(
                path,
                line_number,
                format!("expected `<kind> <address>`, found {}", line),
            )),
        }
    }

    if let Some((widget, inputs)) = current {
        diagnostics.push(Diagnostic::new(
            path,
            contents.lines().count(),
            format!("{} has no WidgetEnd", widget.name()),
        ));
        add_widget(&mut template, widget, inputs);
    }

    for d in &diagnostics {
        d.log();
    }
    (template, diagnostics)
}

fn add_widget(template: &mut OscTemplate, widget: Widget, inputs: Vec<(String, OscInput)>) {
    let id = template.widgets.add(widget);
    for (address, input) in inputs {
        template.addresses.by_address.entry(address).or_default().push((id, input));
    }
}
