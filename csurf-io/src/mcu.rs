//! Mackie Control Universal sysex: device init and the channel strip display.

use csurf_types::OutMessage;

use csurf_core::context::ActionContext;
use csurf_core::widget::{FeedbackProcessor, WidgetProperties};

/// Device byte of a Mackie Control main unit.
pub const MCU: u8 = 0x14;
/// Device byte of a Mackie Control extender.
pub const MCU_XT: u8 = 0x15;

const HEADER: [u8; 4] = [0xF0, 0x00, 0x00, 0x66];
const DISPLAY_COMMAND: u8 = 0x12;
const CELL_WIDTH: usize = 7;
const ROW_WIDTH: usize = 56;

/// Init sequence for a device: identity request, reset, meter mode global,
/// then signal-LED meters on for all eight channels.
pub fn init_sequence(device: u8) -> Vec<Vec<u8>> {
    let mut lines = vec![
        vec![0xF0, 0x7E, 0x00, 0x06, 0x01, 0xF7],
        sysex(device, &[0x00]),
        sysex(device, &[0x21, 0x01]),
    ];
    for channel in 0..8u8 {
        lines.push(sysex(device, &[0x20, channel, 0x01]));
    }
    lines
}

pub fn initialize_mcu() -> Vec<Vec<u8>> {
    init_sequence(MCU)
}

pub fn initialize_mcuxt() -> Vec<Vec<u8>> {
    init_sequence(MCU_XT)
}

fn sysex(device: u8, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER.len() + body.len() + 2);
    bytes.extend_from_slice(&HEADER);
    bytes.push(device);
    bytes.extend_from_slice(body);
    bytes.push(0xF7);
    bytes
}

/// One 7-character cell of the upper or lower LCD row.
#[derive(Debug)]
pub struct DisplayProcessor {
    device: u8,
    row: usize,
    channel: usize,
    last: Option<String>,
}

impl DisplayProcessor {
    pub fn new(device: u8, row: usize, channel: usize) -> Self {
        Self { device, row, channel, last: None }
    }

    fn cell(text: &str) -> Vec<u8> {
        let mut cell: Vec<u8> = text
            .chars()
            .take(CELL_WIDTH)
            .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b' ' })
            .collect();
        cell.resize(CELL_WIDTH, b' ');
        cell
    }

    fn write(&mut self, text: &str, out: &mut Vec<OutMessage>) {
        if self.last.as_deref() == Some(text) {
            return;
        }
        self.last = Some(text.to_string());
        let offset = (self.row * ROW_WIDTH + self.channel * CELL_WIDTH) as u8;
        let mut body = vec![DISPLAY_COMMAND, offset];
        body.extend(Self::cell(text));
        out.push(OutMessage::SysEx(sysex(self.device, &body)));
    }
}

impl FeedbackProcessor for DisplayProcessor {
    fn set_value(&mut self, _properties: &WidgetProperties, _value: f64, _out: &mut Vec<OutMessage>) {}

    fn set_text(&mut self, _properties: &WidgetProperties, text: &str, out: &mut Vec<OutMessage>) {
        self.write(text, out);
    }

    /// A new binding repaints the cell even when its text matches.
    fn configure(&mut self, _contexts: &[ActionContext]) {
        self.last = None;
    }

    fn force_clear(&mut self, out: &mut Vec<OutMessage>) {
        self.last = None;
        self.write("", out);
    }
}
