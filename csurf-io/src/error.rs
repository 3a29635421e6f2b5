use std::fmt;
use std::path::PathBuf;

/// Errors that stop a surface's transport or template from being set up.
#[derive(Debug)]
pub enum IoError {
    Io(std::io::Error),
    /// The platform MIDI layer could not be opened.
    MidiInit(String),
    /// A MIDI port index from CSI.ini does not exist on this machine.
    NoSuchMidiPort { port: i32 },
    MidiConnect { port: i32, message: String },
    /// A UDP socket for an OSC surface could not be bound.
    Bind { port: u16, source: std::io::Error },
    /// Port or address in CSI.ini is not usable.
    BadAddress(String),
    /// The `.mst` / `.ost` file named by CSI.ini does not exist.
    MissingTemplate(PathBuf),
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Io(e) => write!(f, "IO error: {}", e),
            IoError::MidiInit(e) => write!(f, "cannot open MIDI: {}", e),
            IoError::NoSuchMidiPort { port } => write!(f, "no MIDI port {}", port),
            IoError::MidiConnect { port, message } => {
                write!(f, "cannot connect MIDI port {}: {}", port, message)
            }
            IoError::Bind { port, source } => write!(f, "cannot bind UDP port {}: {}", port, source),
            IoError::BadAddress(addr) => write!(f, "bad address {}", addr),
            IoError::MissingTemplate(path) => {
                write!(f, "please check your installation, cannot find {}", path.display())
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::Io(e) => Some(e),
            IoError::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Io(e)
    }
}
