use serde::{Deserialize, Serialize};

/// Which broadcasts a listener surface follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerCategories {
    pub go_home: bool,
    pub sends: bool,
    pub receives: bool,
    pub focused_fx: bool,
    pub focused_fx_param: bool,
    pub fx_menu: bool,
    pub local_fx_slot: bool,
    pub selected_track_fx: bool,
    pub custom: bool,
    pub modifiers: bool,
}

impl ListenerCategories {
    /// Parses a whitespace separated category list such as `"GoHome Sends Modifiers"`.
    /// Unknown category names are ignored.
    pub fn parse(spec: &str) -> Self {
        let mut c = Self::default();
        for word in spec.split_whitespace() {
            match word {
                "GoHome" => c.go_home = true,
                "Sends" => c.sends = true,
                "Receives" => c.receives = true,
                "FocusedFX" => c.focused_fx = true,
                "FocusedFXParam" => c.focused_fx_param = true,
                "FXMenu" => c.fx_menu = true,
                "LocalFXSlot" => c.local_fx_slot = true,
                "SelectedTrackFX" => c.selected_track_fx = true,
                "Custom" => c.custom = true,
                "Modifiers" => c.modifiers = true,
                _ => {}
            }
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_categories() {
        let c = ListenerCategories::parse("GoHome Sends Modifiers Bogus");
        assert!(c.go_home && c.sends && c.modifiers);
        assert!(!c.receives && !c.custom);
    }
}
