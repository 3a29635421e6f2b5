//! Zone instances and the arena that owns them.
//!
//! Relations between zones (included, sub and associated) are id lists into
//! the arena. Zones are created when a zone file is instantiated and freed
//! only by [`ZoneArena::collect_garbage`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use csurf_types::{ManagerId, Navigator, WidgetId, ZoneId, TOGGLE_BIT, TOUCH_BIT};

use crate::context::ActionContext;
use crate::widget::WidgetSet;

/// Bank offsets a zone manager applies to slot-indexed zones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BankOffsets {
    pub track_send: usize,
    pub track_receive: usize,
    pub track_fx_menu: usize,
    pub selected_track_send: usize,
    pub selected_track_receive: usize,
    pub selected_track_fx_menu: usize,
    pub master_track_fx_menu: usize,
}

impl BankOffsets {
    /// Applies a `Bank` amount to the offset named by `kind`. Returns false
    /// when `kind` is not a zone-manager bank.
    pub fn adjust(&mut self, kind: &str, amount: i32) -> bool {
        let offset = match kind {
            "TrackSend" => &mut self.track_send,
            "TrackReceive" => &mut self.track_receive,
            "TrackFXMenu" => &mut self.track_fx_menu,
            "SelectedTrackSend" => &mut self.selected_track_send,
            "SelectedTrackReceive" => &mut self.selected_track_receive,
            "SelectedTrackFXMenu" => &mut self.selected_track_fx_menu,
            "MasterTrackFXMenu" => &mut self.master_track_fx_menu,
            _ => return false,
        };
        *offset = offset.saturating_add_signed(amount as isize);
        true
    }
}

pub struct Zone {
    name: String,
    alias: String,
    source_path: PathBuf,
    owner: ManagerId,
    navigator: Navigator,
    slot_index: usize,
    is_active: bool,
    marked: bool,
    enclosing: Option<ZoneId>,

    widgets: Vec<WidgetId>,
    contexts: HashMap<WidgetId, BTreeMap<u32, Vec<ActionContext>>>,
    current_modifiers: HashMap<WidgetId, u32>,

    included: Vec<ZoneId>,
    sub_zones: BTreeMap<String, Vec<ZoneId>>,
    associated: BTreeMap<String, Vec<ZoneId>>,
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("name", &self.name)
            .field("navigator", &self.navigator)
            .field("slot_index", &self.slot_index)
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl Zone {
    pub fn new(
        owner: ManagerId,
        name: impl Into<String>,
        alias: impl Into<String>,
        source_path: &Path,
        navigator: Navigator,
        slot_index: usize,
    ) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            source_path: source_path.to_path_buf(),
            owner,
            navigator,
            slot_index,
            is_active: false,
            marked: false,
            enclosing: None,
            widgets: Vec::new(),
            contexts: HashMap::new(),
            current_modifiers: HashMap::new(),
            included: Vec::new(),
            sub_zones: BTreeMap::new(),
            associated: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn owner(&self) -> ManagerId {
        self.owner
    }

    pub fn navigator(&self) -> Navigator {
        self.navigator
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn enclosing(&self) -> Option<ZoneId> {
        self.enclosing
    }

    pub fn set_enclosing(&mut self, enclosing: ZoneId) {
        self.enclosing = Some(enclosing);
    }

    pub fn raw_slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn set_slot_index(&mut self, slot_index: usize) {
        self.slot_index = slot_index;
    }

    /// Slot index with the manager's bank offsets applied for banked zone kinds.
    pub fn slot_index(&self, offsets: &BankOffsets) -> usize {
        match self.name.as_str() {
            "TrackSend" => offsets.track_send,
            "TrackReceive" => offsets.track_receive,
            "TrackFXMenu" => offsets.track_fx_menu,
            "SelectedTrackSend" => self.slot_index + offsets.selected_track_send,
            "SelectedTrackReceive" => self.slot_index + offsets.selected_track_receive,
            "SelectedTrackFXMenu" => self.slot_index + offsets.selected_track_fx_menu,
            "MasterTrackFXMenu" => self.slot_index + offsets.master_track_fx_menu,
            _ => self.slot_index,
        }
    }

    /// Highest channel among the zone's widgets.
    pub fn channel_number(&self, widgets: &WidgetSet) -> usize {
        self.widgets.iter().map(|w| widgets.channel_of(*w)).max().unwrap_or(0)
    }

    // ─── Relations ─────────────────────────────────────────────────

    pub fn included(&self) -> &[ZoneId] {
        &self.included
    }

    pub fn add_included(&mut self, ids: impl IntoIterator<Item = ZoneId>) {
        self.included.extend(ids);
    }

    pub fn sub_zones(&self) -> &BTreeMap<String, Vec<ZoneId>> {
        &self.sub_zones
    }

    pub fn set_sub_zones(&mut self, name: &str, ids: Vec<ZoneId>) {
        self.sub_zones.insert(name.to_string(), ids);
    }

    pub fn associated(&self) -> &BTreeMap<String, Vec<ZoneId>> {
        &self.associated
    }

    pub fn set_associated(&mut self, name: &str, ids: Vec<ZoneId>) {
        self.associated.insert(name.to_string(), ids);
    }

    pub fn associated_group(&self, name: &str) -> &[ZoneId] {
        self.associated.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every associated and sub-zone, in that order.
    pub fn children(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.associated
            .values()
            .chain(self.sub_zones.values())
            .flat_map(|ids| ids.iter().copied())
    }

    // ─── Bindings ──────────────────────────────────────────────────

    pub fn widgets(&self) -> &[WidgetId] {
        &self.widgets
    }

    pub fn has_widget(&self, widget: WidgetId) -> bool {
        self.contexts.contains_key(&widget)
    }

    pub fn add_widget(&mut self, widget: WidgetId) {
        if !self.contexts.contains_key(&widget) {
            self.widgets.push(widget);
            self.contexts.insert(widget, BTreeMap::new());
        }
    }

    pub fn add_context(&mut self, widget: WidgetId, modifier: u32, mut context: ActionContext) {
        self.add_widget(widget);
        context.set_modifier(modifier);
        self.contexts
            .entry(widget)
            .or_default()
            .entry(modifier)
            .or_default()
            .push(context);
    }

    pub fn has_binding(&self, widget: WidgetId, modifier: u32) -> bool {
        self.contexts.get(&widget).is_some_and(|m| m.contains_key(&modifier))
    }

    /// First active combination that has bindings for `widget`.
    fn first_bound_modifier(&self, widget: WidgetId, modifiers: &[u32]) -> Option<u32> {
        let bound = self.contexts.get(&widget)?;
        modifiers.iter().copied().find(|m| bound.contains_key(m))
    }

    /// Recomputes the cached modifier of every widget.
    pub fn update_current_modifiers(&mut self, modifiers: &[u32]) {
        for i in 0..self.widgets.len() {
            let widget = self.widgets[i];
            if let Some(m) = self.first_bound_modifier(widget, modifiers) {
                self.current_modifiers.insert(widget, m);
            }
        }
    }

    /// Hands each widget the contexts bound at its current modifier.
    pub fn configure_widgets(&self, widgets: &mut WidgetSet) {
        for &widget in &self.widgets {
            if let Some(w) = widgets.get_mut(widget) {
                w.configure(self.contexts(widget, self.current_modifier(widget)));
            }
        }
    }

    /// Cached modifier for `widget`, 0 when none was resolved yet.
    pub fn current_modifier(&self, widget: WidgetId) -> u32 {
        self.current_modifiers.get(&widget).copied().unwrap_or(0)
    }

    /// Binding key to use for `widget` given the channel's touch and toggle state.
    pub fn resolve_modifier(&self, widget: WidgetId, modifiers: &[u32], touched: bool, toggled: bool) -> Option<u32> {
        let base = match self.current_modifiers.get(&widget) {
            Some(m) => *m,
            None => self.first_bound_modifier(widget, modifiers)?,
        };
        let bound = self.contexts.get(&widget)?;
        let both = base + (TOUCH_BIT | TOGGLE_BIT);
        if touched && toggled && bound.contains_key(&both) {
            Some(both)
        } else if touched && bound.contains_key(&(base + TOUCH_BIT)) {
            Some(base + TOUCH_BIT)
        } else if toggled && bound.contains_key(&(base + TOGGLE_BIT)) {
            Some(base + TOGGLE_BIT)
        } else if bound.contains_key(&base) {
            Some(base)
        } else {
            None
        }
    }

    pub fn contexts(&self, widget: WidgetId, modifier: u32) -> &[ActionContext] {
        self.contexts
            .get(&widget)
            .and_then(|m| m.get(&modifier))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contexts_mut(&mut self, widget: WidgetId, modifier: u32) -> Option<&mut Vec<ActionContext>> {
        self.contexts.get_mut(&widget).and_then(|m| m.get_mut(&modifier))
    }

    /// Every context bound to `widget`, under any modifier.
    pub fn all_contexts_mut(&mut self, widget: WidgetId) -> impl Iterator<Item = &mut ActionContext> {
        self.contexts
            .get_mut(&widget)
            .into_iter()
            .flat_map(|m| m.values_mut())
            .flat_map(|v| v.iter_mut())
    }

    /// Sets the parameter index on the contexts at the widget's current modifier.
    pub fn set_fx_param_num(&mut self, widget: WidgetId, param: i32) {
        let modifier = self.current_modifier(widget);
        if let Some(contexts) = self.contexts_mut(widget, modifier) {
            for ctx in contexts {
                ctx.set_param_index(param);
            }
        }
    }
}

/// Owner of every zone a manager instantiated, plus the free list GC sweeps.
/// Ids are never reused; freed zones are removed from the map.
#[derive(Debug, Default)]
pub struct ZoneArena {
    zones: BTreeMap<ZoneId, Zone>,
    next_id: u32,
    free_list: Vec<ZoneId>,
}

impl ZoneArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a zone and appends it to the free list.
    pub fn insert(&mut self, zone: Zone) -> ZoneId {
        let id = ZoneId::new(self.next_id);
        self.next_id += 1;
        self.zones.insert(id, zone);
        self.free_list.push(id);
        id
    }

    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(&id)
    }

    pub fn get_mut(&mut self, id: ZoneId) -> Option<&mut Zone> {
        self.zones.get_mut(&id)
    }

    pub fn contains(&self, id: ZoneId) -> bool {
        self.zones.contains_key(&id)
    }

    /// Number of live zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn free_list(&self) -> &[ZoneId] {
        &self.free_list
    }

    pub fn ids(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.zones.keys().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Zone> {
        self.zones.values_mut()
    }

    /// Mark and sweep from `roots`. Entries owned by another manager are
    /// dropped from the free list without being freed. Returns the number of
    /// zones freed.
    pub fn collect_garbage(&mut self, owner: ManagerId, roots: &[ZoneId]) -> usize {
        let mut foreign = HashSet::new();
        for id in &self.free_list {
            match self.zones.get_mut(id) {
                Some(zone) if zone.owner != owner => {
                    log::warn!(target: "zone::gc", "zone {} belongs to another manager, leaking it", zone.name);
                    foreign.insert(*id);
                }
                Some(zone) => zone.marked = false,
                None => {}
            }
        }
        self.free_list.retain(|id| !foreign.contains(id));

        let mut worklist: Vec<ZoneId> = roots.to_vec();
        while let Some(id) = worklist.pop() {
            let Some(zone) = self.get_mut(id) else { continue };
            if zone.marked {
                continue;
            }
            zone.marked = true;
            worklist.extend(zone.children());
            worklist.extend(zone.included.iter().copied());
        }

        let mut freed = 0;
        let zones = &mut self.zones;
        self.free_list.retain(|id| match zones.get(id) {
            Some(zone) if !zone.marked => {
                log::debug!(target: "zone::gc", "freeing zone {} ({})", zone.name, id);
                zones.remove(id);
                freed += 1;
                false
            }
            Some(_) => true,
            None => false,
        });
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: &str) -> Zone {
        Zone::new(ManagerId::new(1), name, "", Path::new("z.zon"), Navigator::SelectedTrack, 0)
    }

    #[test]
    fn test_slot_index_rules() {
        let offsets = BankOffsets { track_send: 3, selected_track_send: 2, ..Default::default() };
        let mut send = zone("TrackSend");
        send.set_slot_index(5);
        assert_eq!(send.slot_index(&offsets), 3);
        let mut selected = zone("SelectedTrackSend");
        selected.set_slot_index(1);
        assert_eq!(selected.slot_index(&offsets), 3);
        let mut fx = zone("VST: Comp");
        fx.set_slot_index(4);
        assert_eq!(fx.slot_index(&offsets), 4);
    }

    #[test]
    fn test_bank_offsets_adjust() {
        let mut offsets = BankOffsets::default();
        assert!(offsets.adjust("TrackSend", 2));
        assert!(offsets.adjust("TrackSend", -5));
        assert_eq!(offsets.track_send, 0);
        assert!(!offsets.adjust("Track", 1));
    }

    #[test]
    fn test_gc_frees_unreachable() {
        let mut arena = ZoneArena::new();
        let home = arena.insert(zone("Home"));
        let buttons = arena.insert(zone("Buttons"));
        let send = arena.insert(zone("Send"));
        let dropped = arena.insert(zone("VST: Comp"));
        arena.get_mut(home).unwrap().add_included([buttons]);
        arena.get_mut(home).unwrap().set_associated("Send", vec![send]);

        let freed = arena.collect_garbage(ManagerId::new(1), &[home]);
        assert_eq!(freed, 1);
        assert!(arena.contains(buttons));
        assert!(arena.contains(send));
        assert!(!arena.contains(dropped));
        assert_eq!(arena.free_list().len(), 3);
    }

    #[test]
    fn test_gc_handles_cycles() {
        let mut arena = ZoneArena::new();
        let a = arena.insert(zone("A"));
        let b = arena.insert(zone("B"));
        arena.get_mut(a).unwrap().add_included([b]);
        arena.get_mut(b).unwrap().add_included([a]);
        assert_eq!(arena.collect_garbage(ManagerId::new(1), &[a]), 0);
        assert_eq!(arena.collect_garbage(ManagerId::new(1), &[]), 2);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_gc_leaks_foreign_zones() {
        let mut arena = ZoneArena::new();
        let foreign = arena.insert(Zone::new(
            ManagerId::new(9),
            "Other",
            "",
            Path::new("o.zon"),
            Navigator::SelectedTrack,
            0,
        ));
        assert_eq!(arena.collect_garbage(ManagerId::new(1), &[]), 0);
        assert!(arena.contains(foreign));
        assert!(arena.free_list().is_empty());
    }

    #[test]
    fn test_freed_zones_do_not_accumulate() {
        let mut arena = ZoneArena::new();
        let home = arena.insert(zone("Home"));
        let mut last = home;
        for _ in 0..1000 {
            last = arena.insert(zone("VST: Comp"));
            assert_eq!(arena.collect_garbage(ManagerId::new(1), &[home]), 1);
        }
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.ids().collect::<Vec<_>>(), vec![home]);
        assert_eq!(arena.free_list(), &[home]);
        assert!(!arena.contains(last));
        assert_ne!(arena.insert(zone("Next")), last);
    }
}
