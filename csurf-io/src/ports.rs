//! Hardware ports and sockets, opened once and shared by every surface that
//! names them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use midir::{MidiInput, MidiInputConnection, MidiOutput};

use crate::error::IoError;
use crate::midi::SharedMidiOut;
use crate::osc::OscEndpoint;

type Subscribers = Arc<Mutex<Vec<Sender<Vec<u8>>>>>;

/// One open input port fanned out to every subscribed surface.
struct OpenInput {
    connection: MidiInputConnection<()>,
    subscribers: Subscribers,
}

impl OpenInput {
    fn subscribe(&self) -> Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }
}

pub struct PortRegistry {
    client_name: String,
    midi_inputs: HashMap<i32, OpenInput>,
    midi_outputs: HashMap<i32, SharedMidiOut>,
    osc_endpoints: HashMap<String, OscEndpoint>,
}

impl std::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRegistry")
            .field("midi_inputs", &self.midi_inputs.keys().collect::<Vec<_>>())
            .field("midi_outputs", &self.midi_outputs.keys().collect::<Vec<_>>())
            .field("osc_endpoints", &self.osc_endpoints.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PortRegistry {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            midi_inputs: HashMap::new(),
            midi_outputs: HashMap::new(),
            osc_endpoints: HashMap::new(),
        }
    }

    /// Subscribes to MIDI input port `port` (an index into the system's
    /// input list), opening it on first use.
    pub fn midi_input(&mut self, port: i32) -> Result<Receiver<Vec<u8>>, IoError> {
        if let Some(open) = self.midi_inputs.get(&port) {
            return Ok(open.subscribe());
        }

        let midi_in = MidiInput::new(&self.client_name).map_err(|e| IoError::MidiInit(e.to_string()))?;
        let ports = midi_in.ports();
        let device = usize::try_from(port)
            .ok()
            .and_then(|i| ports.get(i))
            .ok_or(IoError::NoSuchMidiPort { port })?;
        let port_name = midi_in.port_name(device).unwrap_or_else(|_| "Unknown".to_string());

        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let fanout = Arc::clone(&subscribers);
        let connection = midi_in
            .connect(
                device,
                &format!("{}-in-{}", self.client_name, port),
                move |_timestamp, message, _| {
                    if let Ok(mut subscribers) = fanout.lock() {
                        subscribers.retain(|tx| tx.send(message.to_vec()).is_ok());
                    }
                },
                (),
            )
            .map_err(|e| IoError::MidiConnect { port, message: e.to_string() })?;

        log::info!(target: "surface::midi", "opened MIDI input {} ({})", port, port_name);
        let open = OpenInput { connection, subscribers };
        let rx = open.subscribe();
        self.midi_inputs.insert(port, open);
        Ok(rx)
    }

    /// Output port `port`, opened on first use.
    pub fn midi_output(&mut self, port: i32) -> Result<SharedMidiOut, IoError> {
        if let Some(open) = self.midi_outputs.get(&port) {
            return Ok(Rc::clone(open));
        }

        let midi_out = MidiOutput::new(&self.client_name).map_err(|e| IoError::MidiInit(e.to_string()))?;
        let ports = midi_out.ports();
        let device = usize::try_from(port)
            .ok()
            .and_then(|i| ports.get(i))
            .ok_or(IoError::NoSuchMidiPort { port })?;
        let port_name = midi_out.port_name(device).unwrap_or_else(|_| "Unknown".to_string());
        let connection = midi_out
            .connect(device, &format!("{}-out-{}", self.client_name, port))
            .map_err(|e| IoError::MidiConnect { port, message: e.to_string() })?;

        log::info!(target: "surface::midi", "opened MIDI output {} ({})", port, port_name);
        let shared: SharedMidiOut = Rc::new(RefCell::new(connection));
        self.midi_outputs.insert(port, Rc::clone(&shared));
        Ok(shared)
    }

    /// Sockets for the OSC surface `surface`. A surface placed on several
    /// pages gets the same sockets each time.
    pub fn osc_endpoint(
        &mut self,
        surface: &str,
        receive_port: &str,
        transmit_port: &str,
        remote_ip: &str,
    ) -> Result<OscEndpoint, IoError> {
        if let Some(open) = self.osc_endpoints.get(surface) {
            return Ok(open.clone());
        }

        let receive = parse_port(receive_port)?;
        let transmit = parse_port(transmit_port)?;
        let remote = resolve(remote_ip, transmit)?;

        let input = bind(receive)?;
        let output = if receive == transmit { Rc::clone(&input) } else { bind(0)? };

        log::info!(target: "surface::osc", "{}: listening on {}, sending to {}", surface, receive, remote);
        let endpoint = OscEndpoint { input, output, remote };
        self.osc_endpoints.insert(surface.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    /// Closes every MIDI input connection.
    pub fn close(&mut self) {
        for (_, open) in self.midi_inputs.drain() {
            open.connection.close();
        }
        self.midi_outputs.clear();
        self.osc_endpoints.clear();
    }
}

impl Drop for PortRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

fn parse_port(port: &str) -> Result<u16, IoError> {
    port.parse().map_err(|_| IoError::BadAddress(port.to_string()))
}

fn resolve(ip: &str, port: u16) -> Result<SocketAddr, IoError> {
    (ip, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| IoError::BadAddress(format!("{}:{}", ip, port)))
}

fn bind(port: u16) -> Result<Rc<UdpSocket>, IoError> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).map_err(|source| IoError::Bind { port, source })?;
    socket.set_nonblocking(true)?;
    Ok(Rc::new(socket))
}
