//! `.mst` MIDI widget templates: widgets, the generators that turn raw MIDI
//! into widget input, and the feedback processors that turn widget state back
//! into MIDI.
//!
//! ```text
//! StepSize
//!     RotaryWidgetClass 0.001
//! StepSizeEnd
//! AccelerationValues
//!     RotaryWidgetClass Dec 41 42 43 44
//!     RotaryWidgetClass Inc 01 02 03 04
//!     RotaryWidgetClass Val 0.001 0.002 0.004 0.008
//! AccelerationValuesEnd
//!
//! Widget Fader1
//!     Fader14Bit e0 7f 7f
//!     FB_Fader14Bit e0 7f 7f
//! WidgetEnd
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use csurf_core::error::Diagnostic;
use csurf_core::surface::InputEvent;
use csurf_core::tokenizer::{is_ignorable, tokenize, trim_line};
use csurf_core::widget::{FeedbackProcessor, Widget, WidgetProperties, WidgetSet};
use csurf_types::{OutMessage, WidgetId};

use crate::error::IoError;
use crate::mcu::{DisplayProcessor, MCU, MCU_XT};

/// Status, data1, data2.
pub type MidiBytes = [u8; 3];

fn key3(m: MidiBytes) -> u32 {
    (m[0] as u32) << 16 | (m[1] as u32) << 8 | m[2] as u32
}

fn key2(m: MidiBytes) -> u32 {
    (m[0] as u32) << 16 | (m[1] as u32) << 8
}

fn key1(m: MidiBytes) -> u32 {
    (m[0] as u32) << 16
}

/// Turns one matched MIDI message into widget input.
#[derive(Debug, Clone)]
pub enum Generator {
    Press { widget: WidgetId, press: MidiBytes, release: Option<MidiBytes> },
    AnyPress { widget: WidgetId },
    Fader14Bit { widget: WidgetId },
    Fader7Bit { widget: WidgetId },
    /// Sign-magnitude relative encoder: bit 6 set means counter-clockwise.
    Encoder { widget: WidgetId },
    /// Encoder whose data2 bytes map onto acceleration levels.
    AcceleratedEncoder { widget: WidgetId, inc: HashMap<u8, usize>, dec: HashMap<u8, usize> },
    /// Two's complement relative encoder.
    EncoderPlain { widget: WidgetId },
    /// Absolute 7-bit encoder, turned into deltas against the previous value.
    Encoder7Bit { widget: WidgetId, last: Option<u8> },
    Touch { widget: WidgetId, press: MidiBytes, release: MidiBytes },
}

impl Generator {
    pub fn widget(&self) -> WidgetId {
        match self {
            Generator::Press { widget, .. }
            | Generator::AnyPress { widget }
            | Generator::Fader14Bit { widget }
            | Generator::Fader7Bit { widget }
            | Generator::Encoder { widget }
            | Generator::AcceleratedEncoder { widget, .. }
            | Generator::EncoderPlain { widget }
            | Generator::Encoder7Bit { widget, .. }
            | Generator::Touch { widget, .. } => *widget,
        }
    }

    pub fn process(&mut self, m: MidiBytes) -> Option<InputEvent> {
        let [_, d1, d2] = m;
        match self {
            Generator::Press { widget, press, release } => {
                let value = if m == *press {
                    1.0
                } else if Some(m) == *release {
                    0.0
                } else {
                    return None;
                };
                Some(InputEvent::Value { widget: *widget, value })
            }
            Generator::AnyPress { widget } => Some(InputEvent::Value {
                widget: *widget,
                value: if d2 != 0 { 1.0 } else { 0.0 },
            }),
            Generator::Fader14Bit { widget } => {
                let raw = (d2 as u16) << 7 | d1 as u16;
                Some(InputEvent::Value { widget: *widget, value: raw as f64 / 16383.0 })
            }
            Generator::Fader7Bit { widget } => {
                Some(InputEvent::Value { widget: *widget, value: d2 as f64 / 127.0 })
            }
            Generator::Encoder { widget } => {
                let magnitude = (d2 & 0x3f) as f64 / 63.0;
                let delta = if d2 & 0x40 != 0 { -magnitude } else { magnitude };
                Some(InputEvent::Relative { widget: *widget, delta })
            }
            Generator::AcceleratedEncoder { widget, inc, dec } => {
                if let Some(&level) = inc.get(&d2) {
                    Some(InputEvent::Accelerated { widget: *widget, level, delta: 1.0 })
                } else {
                    dec.get(&d2)
                        .map(|&level| InputEvent::Accelerated { widget: *widget, level, delta: -1.0 })
                }
            }
            Generator::EncoderPlain { widget } => {
                let delta = if d2 < 0x40 {
                    d2 as f64 / 63.0
                } else {
                    -((0x80 - d2 as u16) as f64) / 63.0
                };
                Some(InputEvent::Relative { widget: *widget, delta })
            }
            Generator::Encoder7Bit { widget, last } => {
                let previous = last.replace(d2)?;
                let delta = match (previous, d2) {
                    (0, 0) => -1.0 / 127.0,
                    (127, 127) => 1.0 / 127.0,
                    _ => (d2 as f64 - previous as f64) / 127.0,
                };
                if delta == 0.0 {
                    return None;
                }
                Some(InputEvent::Relative { widget: *widget, delta })
            }
            Generator::Touch { widget, press, release } => {
                let value = if m == *press {
                    1.0
                } else if m == *release {
                    0.0
                } else {
                    return None;
                };
                Some(InputEvent::Touch { widget: *widget, value })
            }
        }
    }
}

/// Generators keyed by the leading one, two or three bytes of a message.
#[derive(Debug, Default)]
pub struct GeneratorTable {
    by_key: HashMap<u32, Vec<Generator>>,
}

impl GeneratorTable {
    fn add(&mut self, key: u32, generator: Generator) {
        self.by_key.entry(key).or_default().push(generator);
    }

    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Runs the generators of the most specific matching key.
    /// Returns false when nothing is mapped to the message.
    pub fn process(&mut self, m: MidiBytes, events: &mut Vec<InputEvent>) -> bool {
        let key = [key3(m), key2(m), key1(m)]
            .into_iter()
            .find(|k| self.by_key.contains_key(k));
        let Some(generators) = key.and_then(|k| self.by_key.get_mut(&k)) else {
            return false;
        };
        events.extend(generators.iter_mut().filter_map(|g| g.process(m)));
        true
    }
}

/// Sends `on` for any non-zero value and `off` otherwise.
#[derive(Debug)]
pub struct TwoStateProcessor {
    on: MidiBytes,
    off: MidiBytes,
    last: Option<bool>,
}

impl TwoStateProcessor {
    pub fn new(on: MidiBytes, off: MidiBytes) -> Self {
        Self { on, off, last: None }
    }

    fn send(&mut self, lit: bool, out: &mut Vec<OutMessage>) {
        self.last = Some(lit);
        let [status, data1, data2] = if lit { self.on } else { self.off };
        out.push(OutMessage::Midi { status, data1, data2 });
    }
}

impl FeedbackProcessor for TwoStateProcessor {
    fn set_value(&mut self, _properties: &WidgetProperties, value: f64, out: &mut Vec<OutMessage>) {
        let lit = value != 0.0;
        if self.last != Some(lit) {
            self.send(lit, out);
        }
    }

    fn force_clear(&mut self, out: &mut Vec<OutMessage>) {
        self.send(false, out);
    }
}

/// Pitch-bend style fader position, LSB first.
#[derive(Debug)]
pub struct Fader14BitProcessor {
    status: u8,
    last: Option<u16>,
}

impl Fader14BitProcessor {
    pub fn new(status: u8) -> Self {
        Self { status, last: None }
    }

    fn send(&mut self, position: u16, out: &mut Vec<OutMessage>) {
        self.last = Some(position);
        out.push(OutMessage::Midi {
            status: self.status,
            data1: (position & 0x7f) as u8,
            data2: (position >> 7 & 0x7f) as u8,
        });
    }
}

impl FeedbackProcessor for Fader14BitProcessor {
    fn set_value(&mut self, _properties: &WidgetProperties, value: f64, out: &mut Vec<OutMessage>) {
        let position = (value.clamp(0.0, 1.0) * 16383.0).round() as u16;
        if self.last != Some(position) {
            self.send(position, out);
        }
    }

    fn force_clear(&mut self, out: &mut Vec<OutMessage>) {
        self.send(0, out);
    }
}

#[derive(Debug)]
pub struct Fader7BitProcessor {
    status: u8,
    data1: u8,
    last: Option<u8>,
}

impl Fader7BitProcessor {
    pub fn new(status: u8, data1: u8) -> Self {
        Self { status, data1, last: None }
    }

    fn send(&mut self, data2: u8, out: &mut Vec<OutMessage>) {
        self.last = Some(data2);
        out.push(OutMessage::Midi { status: self.status, data1: self.data1, data2 });
    }
}

impl FeedbackProcessor for Fader7BitProcessor {
    fn set_value(&mut self, _properties: &WidgetProperties, value: f64, out: &mut Vec<OutMessage>) {
        let data2 = (value.clamp(0.0, 1.0) * 127.0).round() as u8;
        if self.last != Some(data2) {
            self.send(data2, out);
        }
    }

    fn force_clear(&mut self, out: &mut Vec<OutMessage>) {
        self.send(0, out);
    }
}

/// MCU-style LED ring around a v-pot. The ring CC sits 0x20 above the
/// encoder CC; `RingStyle=Dot|BoostCut|Fill|Spread` picks the ring mode.
#[derive(Debug)]
pub struct EncoderRingProcessor {
    status: u8,
    data1: u8,
    last: Option<u8>,
}

impl EncoderRingProcessor {
    pub fn new(status: u8, encoder_data1: u8) -> Self {
        Self { status, data1: encoder_data1.wrapping_add(0x20) & 0x7f, last: None }
    }

    fn ring_style(properties: &WidgetProperties) -> u8 {
        match properties.get("RingStyle").map(String::as_str) {
            Some("BoostCut") => 0x10,
            Some("Fill") => 0x20,
            Some("Spread") => 0x30,
            _ => 0x00,
        }
    }

    fn send(&mut self, data2: u8, out: &mut Vec<OutMessage>) {
        self.last = Some(data2);
        out.push(OutMessage::Midi { status: self.status, data1: self.data1, data2 });
    }
}

impl FeedbackProcessor for EncoderRingProcessor {
    fn set_value(&mut self, properties: &WidgetProperties, value: f64, out: &mut Vec<OutMessage>) {
        let position = (value.clamp(0.0, 1.0) * 127.0) as u32;
        let led = 1 + ((position * 11) >> 7) as u8;
        let data2 = Self::ring_style(properties) | led;
        if self.last != Some(data2) {
            self.send(data2, out);
        }
    }

    fn force_clear(&mut self, out: &mut Vec<OutMessage>) {
        self.send(0, out);
    }
}

/// Encoder settings declared per widget class in `StepSize` and
/// `AccelerationValues` sections.
#[derive(Debug, Default)]
struct EncoderValues {
    step_sizes: HashMap<String, f64>,
    dec: HashMap<String, HashMap<u8, usize>>,
    inc: HashMap<String, HashMap<u8, usize>>,
    values: HashMap<String, Vec<f64>>,
}

impl EncoderValues {
    fn is_accelerated(&self, class: &str) -> bool {
        self.step_sizes.contains_key(class)
            && self.dec.contains_key(class)
            && self.inc.contains_key(class)
            && self.values.contains_key(class)
    }

    fn parse_line(&mut self, section: Section, tokens: &[String]) -> Result<(), String> {
        let class = tokens[0].clone();
        match section {
            Section::StepSize => {
                let step: f64 = tokens[1].parse().map_err(|_| format!("bad step size {}", tokens[1]))?;
                self.step_sizes.insert(class, step);
            }
            Section::Acceleration if tokens.len() > 2 => match tokens[1].as_str() {
                "Dec" | "Inc" => {
                    let mut map = HashMap::new();
                    for (level, token) in tokens[2..].iter().enumerate() {
                        map.insert(parse_hex(token)?, level);
                    }
                    let target = if tokens[1] == "Dec" { &mut self.dec } else { &mut self.inc };
                    target.entry(class).or_default().extend(map);
                }
                "Val" => {
                    let mut values: Vec<f64> = Vec::new();
                    for token in &tokens[2..] {
                        values.push(token.parse().map_err(|_| format!("bad acceleration value {}", token))?);
                    }
                    self.values.entry(class).or_default().extend(values);
                }
                other => return Err(format!("unknown acceleration row {}", other)),
            },
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    StepSize,
    Acceleration,
}

/// Accepts `b0`, `B0` and `0xb0`.
fn parse_hex(token: &str) -> Result<u8, String> {
    let digits = token.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|_| format!("bad hex byte {}", token))
}

fn parse_message(tokens: &[String]) -> Result<MidiBytes, String> {
    Ok([parse_hex(&tokens[0])?, parse_hex(&tokens[1])?, parse_hex(&tokens[2])?])
}

/// The first message is bytes 1-3 of a line, the second bytes 4-6.
fn line_messages(tokens: &[String]) -> Result<(Option<MidiBytes>, Option<MidiBytes>), String> {
    let first = if tokens.len() > 3 { Some(parse_message(&tokens[1..4])?) } else { None };
    let second = if tokens.len() > 6 { Some(parse_message(&tokens[4..7])?) } else { None };
    Ok((first, second))
}

/// A parsed `.mst` file.
#[derive(Debug, Default)]
pub struct MidiTemplate {
    pub widgets: WidgetSet,
    pub generators: GeneratorTable,
    /// MCU device bytes (0x14 / 0x15) whose displays or meters the template drives.
    pub mcu_devices: BTreeSet<u8>,
}

pub fn load_midi_template(path: &Path) -> Result<(MidiTemplate, Vec<Diagnostic>), IoError> {
    if !path.is_file() {
        return Err(IoError::MissingTemplate(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_midi_template(path, &contents))
}

struct WidgetBlock {
    name: String,
    class: String,
    lines: Vec<(usize, Vec<String>)>,
}

pub fn parse_midi_template(path: &Path, contents: &str) -> (MidiTemplate, Vec<Diagnostic>) {
    let mut template = MidiTemplate::default();
    let mut diagnostics = Vec::new();
    let mut values = EncoderValues::default();
    let mut section = Section::None;
    let mut block: Option<WidgetBlock> = None;

    for (index, raw) in contents.lines().enumerate() {
        let line_number = index + 1;
        let line = trim_line(raw);
        if is_ignorable(&line) {
            continue;
        }
        let tokens = tokenize(&line);

        if let Some(current) = block.as_mut() {
            if tokens[0] == "WidgetEnd" {
                if let Some(done) = block.take() {
                    add_widget(path, done, &values, &mut template, &mut diagnostics);
                }
            } else {
                current.lines.push((line_number, tokens));
            }
            continue;
        }

        match tokens[0].as_str() {
            "Widget" if tokens.len() > 1 => {
                block = Some(WidgetBlock {
                    name: tokens[1].clone(),
                    class: tokens.get(2).cloned().unwrap_or_default(),
                    lines: Vec::new(),
                });
            }
            "Widget" => diagnostics.push(Diagnostic::new(path, line_number, "Widget without a name")),
            "StepSize" => section = Section::StepSize,
            "AccelerationValues" => section = Section::Acceleration,
            "StepSizeEnd" | "AccelerationValuesEnd" => section = Section::None,
            _ if section != Section::None && tokens.len() > 1 => {
                if let Err(message) = values.parse_line(section, &tokens) {
                    diagnostics.push(Diagnostic::new(path, line_number, message));
                }
            }
            other => diagnostics.push(Diagnostic::new(path, line_number, format!("unexpected {}", other))),
        }
    }

    if let Some(open) = block {
        diagnostics.push(Diagnostic::new(path, contents.lines().count(), format!("{} has no WidgetEnd", open.name)));
        add_widget(path, open, &values, &mut template, &mut diagnostics);
    }

    for d in &diagnostics {
        d.log();
    }
    log::debug!(
        target: "surface::midi",
        "{}: {} widgets, {} generators",
        path.display(),
        template.widgets.len(),
        template.generators.len()
    );
    (template, diagnostics)
}

fn add_widget(
    path: &Path,
    block: WidgetBlock,
    values: &EncoderValues,
    template: &mut MidiTemplate,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut widget = Widget::new(block.name.as_str());
    if let Some(&step) = values.step_sizes.get(&block.class) {
        widget.set_step_size(step);
    }
    if let Some(accel) = values.values.get(&block.class) {
        widget.set_acceleration_values(accel.clone());
    }

    let mut pending: Vec<(u32, Generator)> = Vec::new();
    let placeholder = WidgetId::new(0);

    for (line_number, tokens) in &block.lines {
        let size = tokens.len();
        let (m1, m2) = match line_messages(tokens) {
            Ok(messages) => messages,
            Err(message) => {
                diagnostics.push(Diagnostic::new(path, *line_number, message));
                continue;
            }
        };

        let kind = tokens[0].as_str();
        match (kind, m1, m2) {
            ("AnyPress", Some(m1), _) if size == 4 || size == 7 => {
                pending.push((key2(m1), Generator::AnyPress { widget: placeholder }))
            }
            ("Press", Some(m1), None) if size == 4 => pending.push((
                key3(m1),
                Generator::Press { widget: placeholder, press: m1, release: None },
            )),
            ("Press", Some(m1), Some(m2)) if size == 7 => {
                let generator = Generator::Press { widget: placeholder, press: m1, release: Some(m2) };
                pending.push((key3(m1), generator.clone()));
                pending.push((key3(m2), generator));
            }
            ("Fader14Bit", Some(m1), _) if size == 4 => {
                pending.push((key1(m1), Generator::Fader14Bit { widget: placeholder }))
            }
            ("Fader7Bit", Some(m1), _) if size == 4 => {
                pending.push((key2(m1), Generator::Fader7Bit { widget: placeholder }))
            }
            ("Encoder", Some(m1), _) if size == 4 => {
                let generator = if values.is_accelerated(&block.class) {
                    Generator::AcceleratedEncoder {
                        widget: placeholder,
                        inc: values.inc[&block.class].clone(),
                        dec: values.dec[&block.class].clone(),
                    }
                } else {
                    Generator::Encoder { widget: placeholder }
                };
                pending.push((key2(m1), generator));
            }
            ("EncoderPlain", Some(m1), _) if size == 4 => {
                pending.push((key2(m1), Generator::EncoderPlain { widget: placeholder }))
            }
            ("Encoder7Bit", Some(m1), _) if size == 4 => {
                pending.push((key2(m1), Generator::Encoder7Bit { widget: placeholder, last: None }))
            }
            ("Touch", Some(m1), Some(m2)) if size == 7 => {
                let generator = Generator::Touch { widget: placeholder, press: m1, release: m2 };
                pending.push((key3(m1), generator.clone()));
                pending.push((key3(m2), generator));
            }

            ("FB_TwoState", Some(m1), Some(m2)) if size == 7 => {
                widget.add_feedback_processor(Box::new(TwoStateProcessor::new(m1, m2)))
            }
            ("FB_Fader14Bit", Some(m1), _) if size == 4 => {
                widget.add_feedback_processor(Box::new(Fader14BitProcessor::new(m1[0])))
            }
            ("FB_Fader7Bit", Some(m1), _) if size == 4 => {
                widget.add_feedback_processor(Box::new(Fader7BitProcessor::new(m1[0], m1[1])))
            }
            ("FB_Encoder", Some(m1), _) if size == 4 => {
                widget.add_feedback_processor(Box::new(EncoderRingProcessor::new(m1[0], m1[1])))
            }
            ("FB_MCUDisplayUpper" | "FB_MCUDisplayLower" | "FB_MCUXTDisplayUpper" | "FB_MCUXTDisplayLower", _, _)
                if size == 2 =>
            {
                let Ok(channel) = tokens[1].parse::<usize>() else {
                    diagnostics.push(Diagnostic::new(path, *line_number, format!("bad display channel {}", tokens[1])));
                    continue;
                };
                let device = if kind.starts_with("FB_MCUXT") { MCU_XT } else { MCU };
                let row = if kind.ends_with("Lower") { 1 } else { 0 };
                template.mcu_devices.insert(device);
                widget.add_feedback_processor(Box::new(DisplayProcessor::new(device, row, channel)));
            }
            ("FB_MCUVUMeter" | "FB_MCUXTVUMeter", _, _) if size == 2 => {
                template.mcu_devices.insert(if kind == "FB_MCUVUMeter" { MCU } else { MCU_XT });
                log::debug!(target: "surface::midi", "{}: meter processors are not supported", block.name);
            }
            _ => log::debug!(target: "surface::midi", "{}: skipping {} with {} tokens", block.name, kind, size),
        }
    }

    let id = template.widgets.add(widget);
    for (key, mut generator) in pending {
        set_widget(&mut generator, id);
        template.generators.add(key, generator);
    }
}

fn set_widget(generator: &mut Generator, id: WidgetId) {
    match generator {
        Generator::Press { widget, .. }
        | Generator::AnyPress { widget }
        | Generator::Fader14Bit { widget }
        | Generator::Fader7Bit { widget }
        | Generator::Encoder { widget }
        | Generator::AcceleratedEncoder { widget, .. }
        | Generator::EncoderPlain { widget }
        | Generator::Encoder7Bit { widget, .. }
        | Generator::Touch { widget, .. } => *widget = id,
    }
}
