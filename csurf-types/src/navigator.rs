use serde::{Deserialize, Serialize};

/// Strategy that resolves the DAW track a zone instance acts on.
///
/// A zone instance keeps the navigator it was created with for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Navigator {
    /// Bank-relative channel on the page's track list (zero based).
    Track(usize),
    MasterTrack,
    SelectedTrack,
    /// Track owning the currently focused FX window.
    FocusedFx,
}

impl Navigator {
    pub fn channel(&self) -> Option<usize> {
        match self {
            Navigator::Track(channel) => Some(*channel),
            _ => None,
        }
    }
}
