use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Catalog entry produced by the zone-file pre-pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub file_path: PathBuf,
    pub alias: String,
}

/// One line of the `FXLayouts` zone: which modifiers, widget suffix and
/// channel count make up a row of FX parameter cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxLayoutInfo {
    /// Modifier token as written in the layout (`Shift`, `Shift+Option`, or `NoModifiers`).
    pub modifiers: String,
    pub suffix: String,
    pub channel_count: usize,
}

impl FxLayoutInfo {
    /// Modifier names in the prefix, without the trailing `+`.
    pub fn modifier_tokens(&self) -> Vec<&str> {
        self.modifiers.split('+').filter(|s| !s.is_empty() && *s != "NoModifiers").collect()
    }

    /// Prefix to write in generated bindings; `NoModifiers` renders as nothing.
    pub fn binding_prefix(&self) -> String {
        let tokens = self.modifier_tokens();
        if tokens.is_empty() {
            String::new()
        } else {
            format!("{}+", tokens.join("+"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(modifiers: &str) -> FxLayoutInfo {
        FxLayoutInfo { modifiers: modifiers.to_string(), suffix: "A".to_string(), channel_count: 8 }
    }

    #[test]
    fn test_binding_prefix() {
        assert_eq!(layout("NoModifiers").binding_prefix(), "");
        assert_eq!(layout("").binding_prefix(), "");
        assert_eq!(layout("Shift").binding_prefix(), "Shift+");
        assert_eq!(layout("Shift+Option").modifier_tokens(), vec!["Shift", "Option"]);
    }
}
