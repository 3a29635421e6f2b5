use serde::{Deserialize, Serialize};

/// 8-bit RGBA colour used for widget and track colour feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Rgba {
    fn default() -> Self {
        Self::BLACK
    }
}

impl Rgba {
    pub const BLACK: Rgba = Rgba { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Rgba = Rgba { r: 255, g: 255, b: 255, a: 255 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Some(Self { r: byte(0)?, g: byte(2)?, b: byte(4)?, a })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex_rgb_and_rgba() {
        assert_eq!(Rgba::from_hex("#FF8000"), Some(Rgba::rgb(255, 128, 0)));
        let c = Rgba::from_hex("#01020304").unwrap();
        assert_eq!((c.r, c.g, c.b, c.a), (1, 2, 3, 4));
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert_eq!(Rgba::from_hex("FF8000"), None);
        assert_eq!(Rgba::from_hex("#FF80"), None);
        assert_eq!(Rgba::from_hex("#GG8000"), None);
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(Rgba::rgb(10, 0, 255).to_hex(), "#0A00FF");
    }
}
