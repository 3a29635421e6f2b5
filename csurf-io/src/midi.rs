//! MIDI transport of a surface.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::Receiver;

use csurf_core::surface::{InputEvent, SurfaceIo};
use csurf_types::OutMessage;
use midir::MidiOutputConnection;

use crate::midi_widgets::GeneratorTable;

/// Anything raw MIDI bytes can be written to.
pub trait MidiSend {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), String>;
}

impl MidiSend for MidiOutputConnection {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), String> {
        self.send(bytes).map_err(|e| e.to_string())
    }
}

/// Captures output in memory.
impl MidiSend for Vec<Vec<u8>> {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), String> {
        self.push(bytes.to_vec());
        Ok(())
    }
}

/// An output port; surfaces on the same port share one connection.
pub type SharedMidiOut = Rc<RefCell<dyn MidiSend>>;

pub struct MidiSurfaceIo {
    name: String,
    generators: GeneratorTable,
    input: Option<Receiver<Vec<u8>>>,
    output: Option<SharedMidiOut>,
}

impl std::fmt::Debug for MidiSurfaceIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiSurfaceIo")
            .field("name", &self.name)
            .field("generators", &self.generators.len())
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .finish()
    }
}

impl MidiSurfaceIo {
    pub fn new(
        name: impl Into<String>,
        generators: GeneratorTable,
        input: Option<Receiver<Vec<u8>>>,
        output: Option<SharedMidiOut>,
    ) -> Self {
        Self { name: name.into(), generators, input, output }
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some(output) = &self.output else { return };
        if let Err(e) = output.borrow_mut().send_bytes(bytes) {
            log::warn!(target: "surface::midi", "{}: send failed: {}", self.name, e);
        }
    }
}

impl SurfaceIo for MidiSurfaceIo {
    fn log_target(&self) -> &'static str {
        "surface::midi"
    }

    fn poll(&mut self, events: &mut Vec<InputEvent>) {
        let Some(input) = &self.input else { return };
        while let Ok(message) = input.try_recv() {
            // sysex and one-byte realtime messages never drive widgets
            if message.len() < 2 || message[0] == 0xF0 {
                continue;
            }
            let bytes = [message[0], message[1], message.get(2).copied().unwrap_or(0)];
            if !self.generators.process(bytes, events) {
                log::trace!(
                    target: "surface::midi",
                    "IN <- {} {:02x} {:02x} {:02x} unmapped",
                    self.name,
                    bytes[0],
                    bytes[1],
                    bytes[2]
                );
            }
        }
    }

    fn send(&mut self, message: &OutMessage) {
        match message {
            OutMessage::Midi { status, data1, data2 } => self.write(&[*status, *data1, *data2]),
            OutMessage::SysEx(bytes) => self.write(bytes),
            OutMessage::Osc { address, .. } => {
                log::trace!(target: "surface::midi", "{}: dropping OSC {}", self.name, address)
            }
            OutMessage::ZoneActivated(_) => {}
        }
    }
}
