use serde::{Deserialize, Serialize};

/// A loosely-typed OSC argument, so engine code doesn't depend on `rosc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OscArg {
    Float(f32),
    Int(i32),
    Str(String),
}

/// Outgoing traffic produced by feedback processors and actions,
/// drained by the transport layer once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutMessage {
    Midi { status: u8, data1: u8, data2: u8 },
    SysEx(Vec<u8>),
    Osc { address: String, args: Vec<OscArg> },
    /// A zone became active; OSC surfaces announce it as `/<name>`.
    ZoneActivated(String),
}
