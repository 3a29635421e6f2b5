use std::fmt;
use std::path::{Path, PathBuf};

/// Errors that stop a surface's zone manager from initialising.
#[derive(Debug)]
pub enum ZoneError {
    Io(std::io::Error),
    /// Zone folder is missing or contains no `.zon` files.
    MissingZoneFolder(PathBuf),
    /// No `Home` zone was found for the surface.
    MissingHome { surface: String },
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneError::Io(e) => write!(f, "IO error: {}", e),
            ZoneError::MissingZoneFolder(path) => {
                write!(f, "please check your installation, cannot find zone files in {}", path.display())
            }
            ZoneError::MissingHome { surface } => {
                write!(f, "{} needs a Home Zone to operate, please recheck your installation", surface)
            }
        }
    }
}

impl std::error::Error for ZoneError {}

impl From<std::io::Error> for ZoneError {
    fn from(e: std::io::Error) -> Self {
        ZoneError::Io(e)
    }
}

/// Errors that stop CSI.ini from being read.
#[derive(Debug)]
pub enum IniError {
    Io(std::io::Error),
    /// The `CSI` folder under the resource path does not exist.
    MissingFolder(PathBuf),
    /// First line of CSI.ini is not the expected version token.
    Version { expected: String, found: String },
}

impl fmt::Display for IniError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IniError::Io(e) => write!(f, "IO error: {}", e),
            IniError::MissingFolder(path) => {
                write!(f, "please check your installation, cannot find {}", path.display())
            }
            IniError::Version { expected, found } => {
                write!(f, "version mismatch, your CSI.ini file is not {} (found {:?})", expected, found)
            }
        }
    }
}

impl std::error::Error for IniError {}

impl From<std::io::Error> for IniError {
    fn from(e: std::io::Error) -> Self {
        IniError::Io(e)
    }
}

/// A recoverable problem found while parsing a text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: &Path, line: usize, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    /// Writes the diagnostic to the log in the engine's standard form.
    pub fn log(&self) {
        log::warn!(
            target: "zone",
            "Trouble in {}, around line {}: {}",
            self.path.display(),
            self.line,
            self.message
        );
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trouble in {}, around line {}: {}",
            self.path.display(),
            self.line,
            self.message
        )
    }
}
