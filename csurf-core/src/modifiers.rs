//! Modifier key state with latch/momentary behaviour and the derived
//! combination list used for binding resolution.

use csurf_types::Modifier;

#[derive(Debug, Clone, Copy, Default)]
struct ModifierSlot {
    is_engaged: bool,
    pressed_time: f64,
}

#[derive(Debug, Clone)]
pub struct ModifierManager {
    slots: [ModifierSlot; 10],
    combinations: Vec<u32>,
    latch_time_ms: f64,
}

impl Default for ModifierManager {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl ModifierManager {
    pub fn new(latch_time_ms: f64) -> Self {
        Self {
            slots: [ModifierSlot::default(); 10],
            combinations: vec![0],
            latch_time_ms,
        }
    }

    /// Active modifier masks, most specific first; always ends with 0.
    pub fn combinations(&self) -> &[u32] {
        &self.combinations
    }

    pub fn is_engaged(&self, modifier: Modifier) -> bool {
        self.slots[modifier.index()].is_engaged
    }

    pub fn latch_time_ms(&self) -> f64 {
        self.latch_time_ms
    }

    pub fn set_latch_time_ms(&mut self, latch_time_ms: f64) {
        self.latch_time_ms = latch_time_ms;
    }

    /// Mask of all engaged modifiers.
    pub fn engaged_mask(&self) -> u32 {
        Modifier::ALL
            .iter()
            .filter(|m| self.slots[m.index()].is_engaged)
            .fold(0, |mask, m| mask | m.bit())
    }

    /// Applies a press (`pressed == true`) or release of a modifier key at `now_ms`.
    ///
    /// A press of a released key engages it. A release after the latch time
    /// disengages it; a quick press-release leaves it latched. Returns the
    /// announcement to speak, if any.
    pub fn set_modifier(&mut self, modifier: Modifier, pressed: bool, now_ms: f64) -> Option<String> {
        let latch_time = self.latch_time_ms;
        let slot = &mut self.slots[modifier.index()];
        let mut announcement = None;

        if pressed && !slot.is_engaged {
            slot.is_engaged = true;
            slot.pressed_time = now_ms;
        } else if now_ms - slot.pressed_time > latch_time {
            if !pressed && slot.is_engaged {
                announcement = Some(format!("{} Unlock", modifier.name()));
            }
            slot.is_engaged = pressed;
        } else {
            announcement = Some(format!("{} Lock", modifier.name()));
        }

        self.recalculate();
        log::debug!(target: "modifiers", "{} {} -> {:?}", modifier, if pressed { "press" } else { "release" }, self.combinations);
        announcement
    }

    pub fn clear_modifier(&mut self, modifier: Modifier) {
        self.slots[modifier.index()].is_engaged = false;
        self.recalculate();
    }

    pub fn clear_modifiers(&mut self) {
        for slot in &mut self.slots {
            slot.is_engaged = false;
        }
        self.recalculate();
    }

    /// Copies the engaged state of another manager.
    pub fn copy_state_from(&mut self, other: &ModifierManager) {
        self.slots = other.slots;
        self.recalculate();
    }

    fn recalculate(&mut self) {
        let bits: Vec<u32> = Modifier::ALL
            .iter()
            .filter(|m| self.slots[m.index()].is_engaged)
            .map(|m| m.bit())
            .collect();

        let mut combinations = vec![0];
        for subset in 1u32..(1u32 << bits.len()) {
            let mask = bits
                .iter()
                .enumerate()
                .filter(|(i, _)| subset & (1 << i) != 0)
                .fold(0, |mask, (_, bit)| mask | bit);
            combinations.push(mask);
        }
        combinations.sort_unstable_by(|a, b| b.cmp(a));
        self.combinations = combinations;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_combinations() {
        assert_eq!(ModifierManager::default().combinations(), &[0]);
    }

    #[test]
    fn test_momentary_press_and_release() {
        let mut m = ModifierManager::new(100.0);
        assert_eq!(m.set_modifier(Modifier::Shift, true, 1000.0), None);
        assert_eq!(m.combinations(), &[4, 0]);
        assert_eq!(m.set_modifier(Modifier::Shift, false, 1500.0), Some("Shift Unlock".to_string()));
        assert_eq!(m.combinations(), &[0]);
    }

    #[test]
    fn test_quick_press_latches() {
        let mut m = ModifierManager::new(100.0);
        m.set_modifier(Modifier::Shift, true, 1000.0);
        assert_eq!(m.set_modifier(Modifier::Shift, false, 1050.0), Some("Shift Lock".to_string()));
        assert!(m.is_engaged(Modifier::Shift));

        // second press while latched, held long: releases on let-go
        m.set_modifier(Modifier::Shift, true, 2000.0);
        m.set_modifier(Modifier::Shift, false, 2500.0);
        assert!(!m.is_engaged(Modifier::Shift));
    }

    #[test]
    fn test_combinations_sorted_descending() {
        let mut m = ModifierManager::new(0.0);
        m.set_modifier(Modifier::Shift, true, 1.0);
        m.set_modifier(Modifier::Option, true, 1.0);
        assert_eq!(m.combinations(), &[12, 8, 4, 0]);
        assert_eq!(m.engaged_mask(), 12);
    }

    #[test]
    fn test_clear_modifiers() {
        let mut m = ModifierManager::new(0.0);
        m.set_modifier(Modifier::Alt, true, 1.0);
        m.clear_modifiers();
        assert_eq!(m.combinations(), &[0]);
    }
}
