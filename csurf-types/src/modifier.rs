//! Modifier keys and the bit masks used to key bindings.
//!
//! Bits 0 and 1 are reserved for channel touch and toggle state; the
//! hardware modifiers start at bit 2.

use serde::{Deserialize, Serialize};

/// Mask bit added when the widget's channel is touched.
pub const TOUCH_BIT: u32 = 1;
/// Mask bit added when the widget's channel is toggled.
pub const TOGGLE_BIT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    Shift,
    Option,
    Control,
    Alt,
    Flip,
    Global,
    Marker,
    Nudge,
    Zoom,
    Scrub,
}

impl Modifier {
    pub const ALL: [Modifier; 10] = [
        Modifier::Shift,
        Modifier::Option,
        Modifier::Control,
        Modifier::Alt,
        Modifier::Flip,
        Modifier::Global,
        Modifier::Marker,
        Modifier::Nudge,
        Modifier::Zoom,
        Modifier::Scrub,
    ];

    pub fn bit(self) -> u32 {
        4 << self.index()
    }

    pub fn index(self) -> usize {
        match self {
            Modifier::Shift => 0,
            Modifier::Option => 1,
            Modifier::Control => 2,
            Modifier::Alt => 3,
            Modifier::Flip => 4,
            Modifier::Global => 5,
            Modifier::Marker => 6,
            Modifier::Nudge => 7,
            Modifier::Zoom => 8,
            Modifier::Scrub => 9,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Modifier::Shift => "Shift",
            Modifier::Option => "Option",
            Modifier::Control => "Control",
            Modifier::Alt => "Alt",
            Modifier::Flip => "Flip",
            Modifier::Global => "Global",
            Modifier::Marker => "Marker",
            Modifier::Nudge => "Nudge",
            Modifier::Zoom => "Zoom",
            Modifier::Scrub => "Scrub",
        }
    }

    pub fn from_name(name: &str) -> Option<Modifier> {
        Modifier::ALL.iter().copied().find(|m| m.name() == name)
    }
}

impl std::fmt::Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Sum of the modifier bits named by `tokens`; unknown tokens contribute nothing.
pub fn mask_from_tokens<S: AsRef<str>>(tokens: &[S]) -> u32 {
    tokens
        .iter()
        .filter_map(|t| Modifier::from_name(t.as_ref()))
        .fold(0, |mask, m| mask | m.bit())
}

/// Renders a mask in binding syntax, e.g. `Shift+Option+`.
pub fn mask_to_string(mask: u32) -> String {
    let mut out = String::new();
    for m in Modifier::ALL {
        if mask & m.bit() != 0 {
            out.push_str(m.name());
            out.push('+');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_bits() {
        assert_eq!(Modifier::Shift.bit(), 4);
        assert_eq!(Modifier::Option.bit(), 8);
        assert_eq!(Modifier::Scrub.bit(), 2048);
    }

    #[test]
    fn test_mask_from_tokens_ignores_unknown() {
        assert_eq!(mask_from_tokens(&["Shift", "Fader1", "Alt"]), 4 | 32);
    }

    #[test]
    fn test_mask_to_string() {
        assert_eq!(mask_to_string(4 | 8), "Shift+Option+");
        assert_eq!(mask_to_string(0), "");
    }
}
