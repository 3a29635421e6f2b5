//! OSC-over-UDP transport of a surface.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::rc::Rc;

use csurf_core::surface::{InputEvent, SurfaceIo};
use csurf_core::zone_file::sanitize_file_name;
use csurf_types::{OscArg, OutMessage};
use rosc::{OscMessage, OscPacket, OscType};

use crate::osc_widgets::AddressTable;

const RECV_BUFFER: usize = 4096;

/// Sockets of one OSC surface. When the receive and transmit ports are the
/// same, `input` and `output` are the same socket.
#[derive(Debug, Clone)]
pub struct OscEndpoint {
    pub input: Rc<UdpSocket>,
    pub output: Rc<UdpSocket>,
    pub remote: SocketAddr,
}

pub struct OscSurfaceIo {
    name: String,
    addresses: AddressTable,
    endpoint: OscEndpoint,
    buf: Vec<u8>,
}

impl std::fmt::Debug for OscSurfaceIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscSurfaceIo")
            .field("name", &self.name)
            .field("addresses", &self.addresses.len())
            .field("remote", &self.endpoint.remote)
            .finish()
    }
}

fn to_osc_type(arg: &OscArg) -> OscType {
    match arg {
        OscArg::Float(f) => OscType::Float(*f),
        OscArg::Int(i) => OscType::Int(*i),
        OscArg::Str(s) => OscType::String(s.clone()),
    }
}

impl OscSurfaceIo {
    pub fn new(name: impl Into<String>, addresses: AddressTable, endpoint: OscEndpoint) -> Self {
        Self {
            name: name.into(),
            addresses,
            endpoint,
            buf: vec![0u8; RECV_BUFFER],
        }
    }

    fn handle_packet(&self, packet: &OscPacket, events: &mut Vec<InputEvent>) {
        match packet {
            OscPacket::Message(msg) => {
                let value = match msg.args.first() {
                    Some(OscType::Float(f)) => *f as f64,
                    Some(OscType::Double(d)) => *d,
                    Some(OscType::Int(i)) => *i as f64,
                    _ => return,
                };
                if !self.addresses.process(&msg.addr, value, events) {
                    log::trace!(target: "surface::osc", "IN <- {} {} {} unmapped", self.name, msg.addr, value);
                }
            }
            OscPacket::Bundle(bundle) => {
                for inner in &bundle.content {
                    self.handle_packet(inner, events);
                }
            }
        }
    }

    fn write(&self, addr: String, args: Vec<OscType>) {
        let packet = OscPacket::Message(OscMessage { addr, args });
        let result = rosc::encoder::encode(&packet)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e.to_string()))
            .and_then(|buf| self.endpoint.output.send_to(&buf, self.endpoint.remote));
        if let Err(e) = result {
            log::warn!(target: "surface::osc", "{}: send failed: {}", self.name, e);
        }
    }
}

impl SurfaceIo for OscSurfaceIo {
    fn log_target(&self) -> &'static str {
        "surface::osc"
    }

    fn poll(&mut self, events: &mut Vec<InputEvent>) {
        let mut buf = std::mem::take(&mut self.buf);
        loop {
            match self.endpoint.input.recv_from(&mut buf) {
                Ok((n, _)) => match rosc::decoder::decode_udp(&buf[..n]) {
                    Ok((_, packet)) => self.handle_packet(&packet, events),
                    Err(e) => log::debug!(target: "surface::osc", "{}: bad packet: {:?}", self.name, e),
                },
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!(target: "surface::osc", "{}: receive failed: {}", self.name, e);
                    break;
                }
            }
        }
        self.buf = buf;
    }

    fn send(&mut self, message: &OutMessage) {
        match message {
            OutMessage::Osc { address, args } => {
                self.write(address.clone(), args.iter().map(to_osc_type).collect())
            }
            OutMessage::ZoneActivated(zone) => self.write(format!("/{}", sanitize_file_name(zone)), Vec::new()),
            OutMessage::Midi { .. } | OutMessage::SysEx(_) => {
                log::trace!(target: "surface::osc", "{}: dropping MIDI output", self.name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use crate::osc_widgets::parse_osc_template;

    fn endpoint() -> (OscEndpoint, UdpSocket) {
        let input = UdpSocket::bind("127.0.0.1:0").unwrap();
        input.set_nonblocking(true).unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let input = Rc::new(input);
        let endpoint = OscEndpoint {
            input: input.clone(),
            output: input,
            remote: peer.local_addr().unwrap(),
        };
        (endpoint, peer)
    }

    fn receive(peer: &UdpSocket) -> OscMessage {
        let mut buf = [0u8; RECV_BUFFER];
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        match rosc::decoder::decode_udp(&buf[..n]).unwrap().1 {
            OscPacket::Message(msg) => msg,
            OscPacket::Bundle(_) => panic!("expected a message"),
        }
    }

    #[test]
    fn test_incoming_message_reaches_widget() {
        let (template, _) = parse_osc_template(
            Path::new("t.ost"),
            "Widget Fader1\n    Control /track/1/volume\nWidgetEnd\n",
        );
        let fader = template.widgets.id_of("Fader1").unwrap();
        let (endpoint, peer) = endpoint();
        let target = endpoint.input.local_addr().unwrap();
        let mut io = OscSurfaceIo::new("TouchOSC", template.addresses, endpoint);

        let packet = OscPacket::Message(OscMessage {
            addr: "/track/1/volume".to_string(),
            args: vec![OscType::Float(0.5)],
        });
        peer.send_to(&rosc::encoder::encode(&packet).unwrap(), target).unwrap();

        let mut events = Vec::new();
        for _ in 0..200 {
            io.poll(&mut events);
            if !events.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(events, vec![InputEvent::Value { widget: fader, value: 0.5 }]);
    }

    #[test]
    fn test_feedback_and_zone_announcement_are_sent() {
        let (endpoint, peer) = endpoint();
        let mut io = OscSurfaceIo::new("TouchOSC", AddressTable::default(), endpoint);

        io.send(&OutMessage::Osc {
            address: "/track/1/name".to_string(),
            args: vec![OscArg::Str("Kick".to_string())],
        });
        let msg = receive(&peer);
        assert_eq!(msg.addr, "/track/1/name");
        assert_eq!(msg.args, vec![OscType::String("Kick".to_string())]);

        io.send(&OutMessage::ZoneActivated("VST: Comp".to_string()));
        let msg = receive(&peer);
        assert_eq!(msg.addr, "/VST__Comp");
        assert!(msg.args.is_empty());
    }
}
