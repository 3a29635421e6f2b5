//! Per-surface zone lifecycle: loading zone files into the arena, activating
//! and deactivating zone hierarchies, routing widget input through the active
//! zones, feedback, FX mapping and garbage collection.
//!
//! Loading lives in [`loader`], learn mode in [`learn`] and FX auto-mapping in
//! [`automap`]; all of them extend [`ZoneManager`].

mod automap;
mod learn;
mod loader;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use csurf_types::{FxLayoutInfo, ListenerCategories, ManagerId, Navigator, OutMessage, TrackId, WidgetId, ZoneId, ZoneInfo};

use crate::action::{ActionRegistry, ActionTarget, Services, SurfaceCommand};
use crate::config::Config;
use crate::daw::{Daw, FocusedFx};
use crate::fx_layout::SurfaceFxLayout;
use crate::steps::SteppedValueCache;
use crate::surface::ChannelState;
use crate::tracks::{TrackListMode, TrackNavigation};
use crate::widget::{WidgetProperties, WidgetSet};
use crate::zone::{BankOffsets, Zone, ZoneArena};
use crate::zone_file::ZoneCatalog;

pub use learn::LearnInfo;
pub use loader::navigators_for_zone;

use learn::LearnState;

/// Everything a zone manager borrows from its surface and page for one call.
pub struct SurfaceEnv<'a> {
    pub daw: &'a mut dyn Daw,
    pub config: &'a Config,
    pub registry: &'a ActionRegistry,
    pub steps: &'a mut SteppedValueCache,
    pub tracks: &'a TrackNavigation,
    pub widgets: &'a mut WidgetSet,
    pub channels: &'a ChannelState,
    /// Active modifier combinations, highest first, ending with 0.
    pub modifiers: &'a [u32],
    pub commands: &'a mut Vec<SurfaceCommand>,
    pub out: &'a mut Vec<OutMessage>,
}

impl SurfaceEnv<'_> {
    fn services(&mut self) -> Services<'_> {
        Services {
            daw: &mut *self.daw,
            config: self.config,
            steps: &mut *self.steps,
            modifiers: self.modifiers,
            commands: &mut *self.commands,
        }
    }

    fn step_bounds(&self) -> (usize, usize) {
        (self.config.min_param_steps(), self.config.max_param_steps())
    }
}

/// Navigation a broadcaster surface relays to the listeners on its page.
#[derive(Debug, Clone, PartialEq)]
pub enum Broadcast {
    GoHome,
    AssociatedZone(String),
    FocusedFx,
    ClearFocusedFx,
    ClearFocusedFxParam,
    ToggleFocusedFxParamMapping,
    FxSlot { track: TrackId, navigator: Navigator, slot: usize },
    ClearFxSlot,
}

impl Broadcast {
    pub fn accepted_by(&self, categories: &ListenerCategories) -> bool {
        match self {
            Broadcast::GoHome => categories.go_home,
            Broadcast::AssociatedZone(name) => match name.as_str() {
                "TrackSend" | "SelectedTrackSend" => categories.sends,
                "TrackReceive" | "SelectedTrackReceive" => categories.receives,
                "TrackFXMenu" | "SelectedTrackFXMenu" | "MasterTrackFXMenu" => categories.fx_menu,
                "SelectedTrackFX" => categories.selected_track_fx,
                _ => categories.custom,
            },
            Broadcast::FocusedFx | Broadcast::ClearFocusedFx => categories.focused_fx,
            Broadcast::ClearFocusedFxParam | Broadcast::ToggleFocusedFxParamMapping => categories.focused_fx_param,
            Broadcast::FxSlot { .. } | Broadcast::ClearFxSlot => categories.local_fx_slot,
        }
    }
}

/// Zone files written or deleted at runtime. Surfaces on the page that share
/// the FX zone folder pick them up.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogChange {
    Added { fx_zone_folder: String, name: String, info: ZoneInfo },
    Removed { fx_zone_folder: String, name: String },
}

/// Where a surface's zone files live and how many channels it spans.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub surface_name: String,
    /// `<resource>/CSI/Zones`.
    pub zone_root: PathBuf,
    pub zone_folder: String,
    pub fx_zone_folder: String,
    pub num_channels: usize,
    pub channel_offset: usize,
}

#[derive(Debug, Clone, Copy)]
enum Input {
    Value(f64),
    Relative(f64),
    Accelerated { level: usize, delta: f64 },
    Touch(f64),
}

pub struct ZoneManager {
    id: ManagerId,
    settings: ManagerSettings,
    catalog: ZoneCatalog,
    zones: ZoneArena,
    /// Zone names on the current load stack.
    loading: Vec<String>,

    home: Option<ZoneId>,
    focused_fx_param_zone: Option<ZoneId>,
    no_map_zone: Option<ZoneId>,
    focused_fx_zones: Vec<ZoneId>,
    selected_track_fx_zones: Vec<ZoneId>,
    fx_slot_zones: Vec<ZoneId>,
    needs_gc: bool,

    is_focused_fx_mapping_enabled: bool,
    is_focused_fx_param_mapping_enabled: bool,
    last_focused_fx: FocusedFx,

    surface_layout: SurfaceFxLayout,
    fx_layouts: Vec<FxLayoutInfo>,
    prologue: Vec<String>,
    epilogue: Vec<String>,
    learn: LearnState,
    offsets: BankOffsets,

    listener_categories: ListenerCategories,
    is_broadcaster: bool,
    broadcasts: Vec<Broadcast>,
    catalog_changes: Vec<CatalogChange>,
}

impl std::fmt::Debug for ZoneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneManager")
            .field("surface", &self.settings.surface_name)
            .field("zones", &self.zones.len())
            .field("home", &self.home)
            .finish()
    }
}

fn action_target(id: ZoneId, zone: &Zone, widget: WidgetId, offsets: &BankOffsets, env: &SurfaceEnv<'_>) -> ActionTarget {
    ActionTarget {
        zone: id,
        widget,
        track: env.tracks.resolve(zone.navigator(), &*env.daw),
        navigator: zone.navigator(),
        slot_index: zone.slot_index(offsets),
        zone_name: zone.display_name().to_string(),
    }
}

fn resolve_modifier(zone: &Zone, widget: WidgetId, env: &SurfaceEnv<'_>) -> Option<u32> {
    let channel = env.widgets.channel_of(widget);
    zone.resolve_modifier(
        widget,
        env.modifiers,
        env.channels.is_touched(channel),
        env.channels.is_toggled(channel),
    )
}

impl ZoneManager {
    pub fn new(id: ManagerId, settings: ManagerSettings) -> Self {
        Self {
            id,
            settings,
            catalog: ZoneCatalog::new(),
            zones: ZoneArena::new(),
            loading: Vec::new(),
            home: None,
            focused_fx_param_zone: None,
            no_map_zone: None,
            focused_fx_zones: Vec::new(),
            selected_track_fx_zones: Vec::new(),
            fx_slot_zones: Vec::new(),
            needs_gc: false,
            is_focused_fx_mapping_enabled: true,
            is_focused_fx_param_mapping_enabled: false,
            last_focused_fx: FocusedFx::default(),
            surface_layout: SurfaceFxLayout::default(),
            fx_layouts: Vec::new(),
            prologue: Vec::new(),
            epilogue: Vec::new(),
            learn: LearnState::default(),
            offsets: BankOffsets::default(),
            listener_categories: ListenerCategories::default(),
            is_broadcaster: false,
            broadcasts: Vec::new(),
            catalog_changes: Vec::new(),
        }
    }

    // ─── Accessors ─────────────────────────────────────────────────

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn surface_name(&self) -> &str {
        &self.settings.surface_name
    }

    pub fn fx_zone_folder(&self) -> &str {
        &self.settings.fx_zone_folder
    }

    pub fn num_channels(&self) -> usize {
        self.settings.num_channels
    }

    pub fn catalog(&self) -> &ZoneCatalog {
        &self.catalog
    }

    pub fn zones(&self) -> &ZoneArena {
        &self.zones
    }

    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    pub fn home(&self) -> Option<ZoneId> {
        self.home
    }

    pub fn focused_fx_param_zone(&self) -> Option<ZoneId> {
        self.focused_fx_param_zone
    }

    pub fn no_map_zone(&self) -> Option<ZoneId> {
        self.no_map_zone
    }

    pub fn focused_fx_zones(&self) -> &[ZoneId] {
        &self.focused_fx_zones
    }

    pub fn selected_track_fx_zones(&self) -> &[ZoneId] {
        &self.selected_track_fx_zones
    }

    pub fn fx_slot_zones(&self) -> &[ZoneId] {
        &self.fx_slot_zones
    }

    pub fn offsets(&self) -> &BankOffsets {
        &self.offsets
    }

    pub fn is_focused_fx_mapping_enabled(&self) -> bool {
        self.is_focused_fx_mapping_enabled
    }

    pub fn is_focused_fx_param_mapping_enabled(&self) -> bool {
        self.is_focused_fx_param_mapping_enabled
    }

    /// Names of every active zone, in arena order.
    pub fn active_zone_names(&self) -> Vec<String> {
        self.zones
            .ids()
            .filter_map(|id| self.zones.get(id))
            .filter(|z| z.is_active())
            .map(|z| z.name().to_string())
            .collect()
    }

    /// First instance of a zone by name, active or not.
    pub fn find_zone(&self, name: &str) -> Option<ZoneId> {
        self.zones
            .ids()
            .find(|id| self.zones.get(*id).is_some_and(|z| z.name() == name))
    }

    pub fn set_listener_categories(&mut self, categories: ListenerCategories) {
        self.listener_categories = categories;
    }

    pub fn listener_categories(&self) -> &ListenerCategories {
        &self.listener_categories
    }

    pub fn set_broadcaster(&mut self, is_broadcaster: bool) {
        self.is_broadcaster = is_broadcaster;
    }

    pub fn is_broadcaster(&self) -> bool {
        self.is_broadcaster
    }

    pub fn take_broadcasts(&mut self) -> Vec<Broadcast> {
        std::mem::take(&mut self.broadcasts)
    }

    pub fn take_catalog_changes(&mut self) -> Vec<CatalogChange> {
        std::mem::take(&mut self.catalog_changes)
    }

    fn broadcast(&mut self, broadcast: Broadcast) {
        if self.is_broadcaster {
            self.broadcasts.push(broadcast);
        }
    }

    fn zone_dir(&self) -> PathBuf {
        self.settings.zone_root.join(&self.settings.zone_folder)
    }

    fn fx_zone_dir(&self) -> PathBuf {
        self.settings.zone_root.join(&self.settings.fx_zone_folder)
    }

    fn register_zone_file(&mut self, name: &str, path: &Path, alias: &str) {
        let info = ZoneInfo { file_path: path.to_path_buf(), alias: alias.to_string() };
        self.catalog.insert(name.to_string(), info.clone());
        self.catalog_changes.push(CatalogChange::Added {
            fx_zone_folder: self.settings.fx_zone_folder.clone(),
            name: name.to_string(),
            info,
        });
    }

    /// Applies a catalog change made by another surface on the page.
    pub fn apply_catalog_change(&mut self, change: &CatalogChange) {
        match change {
            CatalogChange::Added { fx_zone_folder, name, info } if *fx_zone_folder == self.settings.fx_zone_folder => {
                self.catalog.insert(name.clone(), info.clone());
            }
            CatalogChange::Removed { fx_zone_folder, name } if *fx_zone_folder == self.settings.fx_zone_folder => {
                self.catalog.remove(name);
            }
            _ => {}
        }
    }

    /// Recomputes each zone's cached per-widget modifier after a modifier
    /// change and reconfigures the widgets of active zones.
    pub fn update_current_modifiers(&mut self, modifiers: &[u32], widgets: &mut WidgetSet) {
        for zone in self.zones.iter_mut() {
            zone.update_current_modifiers(modifiers);
            if zone.is_active() {
                zone.configure_widgets(widgets);
            }
        }
    }

    // ─── Activation ────────────────────────────────────────────────

    fn fire_widget(&mut self, id: ZoneId, widget_name: &str, env: &mut SurfaceEnv<'_>) {
        let Some(widget) = env.widgets.id_of(widget_name) else { return };
        if self.zones.get(id).is_some_and(|z| z.has_widget(widget)) {
            self.run_contexts(id, widget, Input::Value(1.0), env);
        }
    }

    pub fn activate(&mut self, id: ZoneId, env: &mut SurfaceEnv<'_>) {
        let Some(zone) = self.zones.get_mut(id) else { return };
        zone.update_current_modifiers(env.modifiers);
        zone.configure_widgets(env.widgets);

        self.fire_widget(id, "OnZoneActivation", env);

        let Some(zone) = self.zones.get_mut(id) else { return };
        zone.set_active(true);
        log::debug!(target: "zone", "{}: activate {}", self.settings.surface_name, zone.name());
        let name = zone.name().to_string();
        let children: Vec<ZoneId> = zone.children().collect();
        let included = zone.included().to_vec();
        if let Some(mode) = TrackListMode::for_zone(&name) {
            env.commands.push(SurfaceCommand::TrackListMode { mode, active: true });
        }
        env.out.push(OutMessage::ZoneActivated(name));

        for child in children {
            self.deactivate(child, env);
        }
        for inc in included {
            self.activate(inc, env);
        }
    }

    pub fn deactivate(&mut self, id: ZoneId, env: &mut SurfaceEnv<'_>) {
        let Some(zone) = self.zones.get_mut(id) else { return };
        let widgets = zone.widgets().to_vec();
        for widget in widgets {
            let modifier = zone.current_modifier(widget);
            let (Some(contexts), Some(w)) = (zone.contexts_mut(widget, modifier), env.widgets.get_mut(widget)) else {
                continue;
            };
            for ctx in contexts.iter_mut() {
                ctx.clear_widget(w, env.out);
            }
        }

        self.fire_widget(id, "OnZoneDeactivation", env);

        let Some(zone) = self.zones.get_mut(id) else { return };
        if zone.is_active() {
            if let Some(mode) = TrackListMode::for_zone(zone.name()) {
                env.commands.push(SurfaceCommand::TrackListMode { mode, active: false });
            }
        }
        zone.set_active(false);
        let related: Vec<ZoneId> = zone.included().iter().copied().chain(zone.children()).collect();
        for z in related {
            self.deactivate(z, env);
        }
    }

    fn deactivate_all(&mut self, ids: &[ZoneId], env: &mut SurfaceEnv<'_>) {
        for id in ids {
            self.deactivate(*id, env);
        }
    }

    fn set_slot_index(&mut self, id: ZoneId, slot: usize) {
        if let Some(zone) = self.zones.get_mut(id) {
            zone.set_slot_index(slot);
        }
    }

    // ─── Dispatch ──────────────────────────────────────────────────

    /// Roots in the order input and feedback visit them.
    fn dispatch_roots(&self) -> Vec<ZoneId> {
        let mut roots = Vec::new();
        if self.is_focused_fx_param_mapping_enabled {
            roots.extend(self.focused_fx_param_zone);
        }
        roots.extend(&self.focused_fx_zones);
        roots.extend(&self.selected_track_fx_zones);
        roots.extend(&self.fx_slot_zones);
        roots.extend(self.no_map_zone);
        roots.extend(self.home);
        roots
    }

    fn dispatch(&mut self, widget: WidgetId, input: Input, env: &mut SurfaceEnv<'_>) -> bool {
        let mut is_used = false;
        for root in self.dispatch_roots() {
            self.dispatch_zone(root, widget, input, &mut is_used, env);
            if is_used {
                break;
            }
        }
        if !is_used {
            log::trace!(target: "zone", "{}: no binding for {}", self.settings.surface_name, env.widgets.name_of(widget));
        }
        is_used
    }

    fn dispatch_zone(&mut self, id: ZoneId, widget: WidgetId, input: Input, is_used: &mut bool, env: &mut SurfaceEnv<'_>) {
        let Some(zone) = self.zones.get(id) else { return };
        if !zone.is_active() || *is_used {
            return;
        }
        let children: Vec<ZoneId> = zone
            .sub_zones()
            .values()
            .chain(zone.associated().values())
            .flatten()
            .copied()
            .collect();
        let has_widget = zone.has_widget(widget);
        let included = zone.included().to_vec();

        for child in children {
            self.dispatch_zone(child, widget, input, is_used, env);
        }
        if *is_used {
            return;
        }

        if has_widget {
            *is_used = true;
            self.run_contexts(id, widget, input, env);
        } else {
            for inc in included {
                self.dispatch_zone(inc, widget, input, is_used, env);
            }
        }
    }

    fn run_contexts(&mut self, id: ZoneId, widget: WidgetId, input: Input, env: &mut SurfaceEnv<'_>) {
        let Some(zone) = self.zones.get(id) else { return };
        let Some(modifier) = resolve_modifier(zone, widget, env) else { return };
        let target = action_target(id, zone, widget, &self.offsets, env);

        let Some(contexts) = self.zones.get_mut(id).and_then(|z| z.contexts_mut(widget, modifier)) else {
            return;
        };
        let mut svc = env.services();
        for ctx in contexts.iter_mut() {
            match input {
                Input::Value(v) => ctx.do_action(v, &target, &mut svc, &mut self.learn),
                Input::Relative(delta) => ctx.do_relative_action(delta, &target, &mut svc, &mut self.learn),
                Input::Accelerated { level, delta } => {
                    ctx.do_accelerated_relative_action(level, delta, &target, &mut svc, &mut self.learn)
                }
                Input::Touch(v) => ctx.do_touch(v, &target, &mut svc),
            }
        }
        self.apply_pending_param_nums(env.widgets);
    }

    /// Absolute input. Returns false when no active zone binds the widget.
    pub fn do_action(&mut self, widget: WidgetId, value: f64, env: &mut SurfaceEnv<'_>) -> bool {
        self.dispatch(widget, Input::Value(value), env)
    }

    pub fn do_relative_action(&mut self, widget: WidgetId, delta: f64, env: &mut SurfaceEnv<'_>) -> bool {
        self.dispatch(widget, Input::Relative(delta), env)
    }

    pub fn do_accelerated_relative_action(
        &mut self,
        widget: WidgetId,
        level: usize,
        delta: f64,
        env: &mut SurfaceEnv<'_>,
    ) -> bool {
        self.dispatch(widget, Input::Accelerated { level, delta }, env)
    }

    /// Touch input; the surface records the channel's touch state first.
    pub fn do_touch(&mut self, widget: WidgetId, value: f64, env: &mut SurfaceEnv<'_>) -> bool {
        self.dispatch(widget, Input::Touch(value), env)
    }

    // ─── Feedback ──────────────────────────────────────────────────

    /// Runs held actions and refreshes every widget from the highest-priority
    /// zone that binds it. Widgets no active zone binds are cleared.
    pub fn request_update(&mut self, env: &mut SurfaceEnv<'_>) {
        let mut used = HashSet::new();
        for root in self.dispatch_roots() {
            self.update_zone(root, &mut used, env);
        }

        let empty = WidgetProperties::new();
        let all: Vec<WidgetId> = env.widgets.ids().collect();
        for id in all {
            if used.contains(&id) {
                continue;
            }
            if let Some(widget) = env.widgets.get_mut(id) {
                widget.update_value(&empty, 0.0, env.out);
                widget.update_text(&empty, "", env.out);
            }
        }
    }

    fn update_zone(&mut self, id: ZoneId, used: &mut HashSet<WidgetId>, env: &mut SurfaceEnv<'_>) {
        let Some(zone) = self.zones.get(id) else { return };
        if !zone.is_active() {
            return;
        }
        let children: Vec<ZoneId> = zone
            .sub_zones()
            .values()
            .chain(zone.associated().values())
            .flatten()
            .copied()
            .collect();
        let widgets = zone.widgets().to_vec();
        let included = zone.included().to_vec();

        if self.learn.learn_zone() == Some(id) {
            self.request_learn_update(used, env);
        }
        for child in children {
            self.update_zone(child, used, env);
        }
        for widget in widgets {
            if used.insert(widget) {
                self.update_widget(id, widget, env);
            }
        }
        for inc in included {
            self.update_zone(inc, used, env);
        }
    }

    fn update_widget(&mut self, id: ZoneId, widget: WidgetId, env: &mut SurfaceEnv<'_>) {
        let Some(zone) = self.zones.get(id) else { return };
        let Some(modifier) = resolve_modifier(zone, widget, env) else { return };
        let target = action_target(id, zone, widget, &self.offsets, env);

        let Some(contexts) = self.zones.get_mut(id).and_then(|z| z.contexts_mut(widget, modifier)) else {
            return;
        };
        {
            let mut svc = env.services();
            for ctx in contexts.iter_mut() {
                ctx.run_deferred_actions(&target, &mut svc, &mut self.learn);
            }
        }
        if let (Some(ctx), Some(w)) = (contexts.iter_mut().find(|c| c.provides_feedback()), env.widgets.get_mut(widget)) {
            ctx.request_update(&target, &*env.daw, w, env.out);
        }
        self.apply_pending_param_nums(env.widgets);
    }

    // ─── Navigation ────────────────────────────────────────────────

    /// Deactivates and drops every FX zone list and the no-map zone.
    fn clear_fx_mapping(&mut self, env: &mut SurfaceEnv<'_>) {
        self.clear_focused_fx(env);
        self.clear_selected_track_fx(env);
        self.clear_fx_slot(env);
    }

    pub fn go_home(&mut self, env: &mut SurfaceEnv<'_>) {
        self.clear_fx_mapping(env);
        self.offsets = BankOffsets::default();
        if self.is_focused_fx_param_mapping_enabled {
            if let Some(id) = self.focused_fx_param_zone {
                self.activate(id, env);
            }
        }
        if let Some(home) = self.home {
            self.activate(home, env);
        }
    }

    /// Switches `id`'s associated zones. An already-active target toggles
    /// back home; `"Track"` just deactivates them all.
    fn go_associated(&mut self, id: ZoneId, name: &str, slot: Option<usize>, env: &mut SurfaceEnv<'_>) {
        let Some(zone) = self.zones.get(id) else { return };
        let all: Vec<ZoneId> = zone.associated().values().flatten().copied().collect();
        if name == "Track" {
            self.deactivate_all(&all, env);
            return;
        }
        let group = zone.associated_group(name).to_vec();
        let Some(first) = group.first() else {
            log::debug!(target: "zone", "{} has no associated zone {}", zone.name(), name);
            return;
        };
        if self.zones.get(*first).is_some_and(Zone::is_active) {
            self.go_home(env);
            return;
        }
        self.deactivate_all(&all, env);
        for z in group {
            if let Some(slot) = slot {
                self.set_slot_index(z, slot);
            }
            self.activate(z, env);
        }
    }

    pub fn go_associated_zone(&mut self, name: &str, env: &mut SurfaceEnv<'_>) {
        match name {
            "SelectedTrackFX" => self.go_selected_track_fx(env),
            "LearnFXParams" => self.go_learn_fx_params_for_focus(env),
            _ => {
                if let Some(id) = self.no_map_zone {
                    self.deactivate(id, env);
                }
                let Some(home) = self.home else { return };
                self.clear_fx_mapping(env);
                self.offsets = BankOffsets::default();
                self.go_associated(home, name, None, env);
            }
        }
    }

    /// Activates the named sub-zone group of `id`, forwarding to the enclosing
    /// zone when `id` is itself a sub-zone.
    pub fn go_sub_zone(&mut self, id: ZoneId, name: &str, env: &mut SurfaceEnv<'_>) {
        let Some(zone) = self.zones.get(id) else { return };
        if let Some(enclosing) = zone.enclosing() {
            self.go_sub_zone(enclosing, name, env);
            return;
        }
        let slot = zone.raw_slot_index();
        let all: Vec<ZoneId> = zone.sub_zones().values().flatten().copied().collect();
        let target = zone.sub_zones().get(name).cloned().unwrap_or_default();
        self.deactivate_all(&all, env);
        for z in target {
            self.set_slot_index(z, slot);
            self.activate(z, env);
        }
    }

    /// Returns from a sub-zone to the zone that encloses it.
    pub fn leave_sub_zone(&mut self, id: ZoneId, env: &mut SurfaceEnv<'_>) {
        let Some(enclosing) = self.zones.get(id).and_then(Zone::enclosing) else { return };
        self.deactivate(id, env);
        self.activate(enclosing, env);
    }

    /// Re-activates whichever FX menu zone is showing so it follows the new selection.
    pub fn on_track_selection(&mut self, env: &mut SurfaceEnv<'_>) {
        let Some(home) = self.home.and_then(|h| self.zones.get(h)) else { return };
        for name in ["TrackFXMenu", "SelectedTrackFXMenu"] {
            let group = home.associated_group(name).to_vec();
            if group.first().and_then(|z| self.zones.get(*z)).is_some_and(Zone::is_active) {
                for z in group {
                    self.activate(z, env);
                }
                return;
            }
        }
    }

    pub fn clear_focused_fx_param(&mut self, env: &mut SurfaceEnv<'_>) {
        if let Some(id) = self.focused_fx_param_zone {
            self.deactivate(id, env);
        }
    }

    pub fn toggle_focused_fx_param_mapping(&mut self, env: &mut SurfaceEnv<'_>) {
        self.is_focused_fx_param_mapping_enabled = !self.is_focused_fx_param_mapping_enabled;
        let Some(id) = self.focused_fx_param_zone else { return };
        if self.is_focused_fx_param_mapping_enabled {
            self.activate(id, env);
        } else {
            self.deactivate(id, env);
        }
    }

    pub fn clear_focused_fx(&mut self, env: &mut SurfaceEnv<'_>) {
        let zones = std::mem::take(&mut self.focused_fx_zones);
        self.deactivate_all(&zones, env);
        self.needs_gc = true;
    }

    pub fn clear_selected_track_fx(&mut self, env: &mut SurfaceEnv<'_>) {
        let zones = std::mem::take(&mut self.selected_track_fx_zones);
        self.deactivate_all(&zones, env);
        self.needs_gc = true;
    }

    pub fn clear_fx_slot(&mut self, env: &mut SurfaceEnv<'_>) {
        let zones = std::mem::take(&mut self.fx_slot_zones);
        self.deactivate_all(&zones, env);
        if let Some(id) = self.no_map_zone {
            self.deactivate(id, env);
        }
        self.needs_gc = true;
    }

    /// Loads and activates the zones of every FX on the selected track that has one.
    pub fn go_selected_track_fx(&mut self, env: &mut SurfaceEnv<'_>) {
        if let Some(home) = self.home {
            self.clear_fx_mapping(env);
            self.offsets = BankOffsets::default();
            self.go_associated(home, "SelectedTrackFX", None, env);
        }

        let Some(track) = env.daw.selected_track() else { return };
        for slot in 0..env.daw.fx_count(track) {
            let fx_name = env.daw.fx_name(track, slot);
            let Some(info) = self.catalog.get(&fx_name).cloned() else { continue };
            let ids = self.load_zone_file(&info.file_path, &[Navigator::SelectedTrack], None, env);
            for id in ids {
                self.set_slot_index(id, slot);
                self.activate(id, env);
                self.selected_track_fx_zones.push(id);
            }
        }
        self.needs_gc = true;
    }

    /// Loads the zone of the focused FX window, if it has one.
    pub fn go_focused_fx(&mut self, env: &mut SurfaceEnv<'_>) {
        self.clear_focused_fx(env);

        let focused = env.daw.focused_fx();
        if focused.state != 1 {
            return;
        }
        let Some(track) = env.daw.track(focused.track_number) else { return };
        let fx_name = env.daw.fx_name(track, focused.fx_index);
        let Some(info) = self.catalog.get(&fx_name).cloned() else { return };

        let ids = self.load_zone_file(&info.file_path, &[Navigator::FocusedFx], None, env);
        for id in ids {
            self.set_slot_index(id, focused.fx_index);
            self.activate(id, env);
            self.focused_fx_zones.push(id);
        }
        self.needs_gc = true;
    }

    /// Follows FX window focus. An unsaved learn session for another FX is
    /// offered for saving first.
    pub fn check_focused_fx_state(&mut self, env: &mut SurfaceEnv<'_>) {
        let focused = env.daw.focused_fx();

        if focused.state & 1 != 0 && !self.learn.fx_name().is_empty() {
            let focused_name = env
                .daw
                .track(focused.track_number)
                .map(|t| env.daw.fx_name(t, focused.fx_index))
                .unwrap_or_default();
            if focused_name != self.learn.fx_name() {
                let question = format!("Save learned parameters for {}?", self.learn.fx_name());
                if env.daw.confirm("Unsaved Learn FX Params", &question) {
                    self.save_learned_fx_params(env);
                } else {
                    self.clear_learned_fx_params();
                    self.go_home(env);
                }
            }
        }

        if !self.is_focused_fx_mapping_enabled || focused == self.last_focused_fx {
            return;
        }
        self.last_focused_fx = focused;

        if focused.state == 1 {
            self.go_focused_fx(env);
            self.broadcast(Broadcast::FocusedFx);
        } else if focused.state & 4 != 0 {
            self.clear_focused_fx(env);
            self.broadcast(Broadcast::ClearFocusedFx);
        }
    }

    // ─── Commands ──────────────────────────────────────────────────

    /// Applies a queued command. Commands that belong to the surface or page
    /// are handed back.
    pub fn handle_command(&mut self, command: SurfaceCommand, env: &mut SurfaceEnv<'_>) -> Option<SurfaceCommand> {
        match command {
            SurfaceCommand::GoHome => {
                self.go_home(env);
                self.broadcast(Broadcast::GoHome);
            }
            SurfaceCommand::GoSubZone { zone, name } => self.go_sub_zone(zone, &name, env),
            SurfaceCommand::LeaveSubZone { zone } => self.leave_sub_zone(zone, env),
            SurfaceCommand::GoAssociatedZone { name } => {
                self.go_associated_zone(&name, env);
                self.broadcast(Broadcast::AssociatedZone(name));
            }
            SurfaceCommand::GoFxSlot { track, navigator, slot } => {
                self.go_fx_slot(track, navigator, slot, env);
                self.broadcast(Broadcast::FxSlot { track, navigator, slot });
            }
            SurfaceCommand::GoFxLayoutZone { name, slot } => self.go_fx_layout_zone(&name, slot, env),
            SurfaceCommand::ClearFocusedFxParam => {
                self.clear_focused_fx_param(env);
                self.broadcast(Broadcast::ClearFocusedFxParam);
            }
            SurfaceCommand::ClearFocusedFx => {
                self.clear_focused_fx(env);
                self.broadcast(Broadcast::ClearFocusedFx);
            }
            SurfaceCommand::ClearSelectedTrackFx => self.clear_selected_track_fx(env),
            SurfaceCommand::ClearFxSlot => {
                self.clear_fx_slot(env);
                self.broadcast(Broadcast::ClearFxSlot);
            }
            SurfaceCommand::ToggleFocusedFxMapping => {
                self.is_focused_fx_mapping_enabled = !self.is_focused_fx_mapping_enabled;
            }
            SurfaceCommand::ToggleFocusedFxParamMapping => {
                self.toggle_focused_fx_param_mapping(env);
                self.broadcast(Broadcast::ToggleFocusedFxParamMapping);
            }
            SurfaceCommand::AutoMapFocusedFx => self.auto_map_focused_fx(env),
            SurfaceCommand::AutoMapSlotFx { track, slot } => self.auto_map_slot_fx(track, slot, env),
            SurfaceCommand::SaveLearnedFxParams => self.save_learned_fx_params(env),
            SurfaceCommand::SaveTemplatedFxParams => self.save_templated_fx_params(env),
            SurfaceCommand::EraseLastTouchedControl => self.erase_last_touched_control(env),
            SurfaceCommand::Learn { zone, widget, value } => {
                if self.learn.learn_zone() == Some(zone) {
                    self.do_learn(widget, value, env);
                }
            }
            SurfaceCommand::Bank { kind, amount } => {
                if !self.offsets.adjust(&kind, amount) {
                    return Some(SurfaceCommand::Bank { kind, amount });
                }
            }
            other => return Some(other),
        }
        None
    }

    /// Applies a broadcast from another surface, if this surface listens for it.
    pub fn receive_broadcast(&mut self, broadcast: &Broadcast, env: &mut SurfaceEnv<'_>) {
        if !broadcast.accepted_by(&self.listener_categories) {
            return;
        }
        log::debug!(target: "zone", "{}: following {:?}", self.settings.surface_name, broadcast);
        match broadcast {
            Broadcast::GoHome => self.go_home(env),
            Broadcast::AssociatedZone(name) => self.go_associated_zone(name, env),
            Broadcast::FocusedFx => self.go_focused_fx(env),
            Broadcast::ClearFocusedFx => self.clear_focused_fx(env),
            Broadcast::ClearFocusedFxParam => self.clear_focused_fx_param(env),
            Broadcast::ToggleFocusedFxParamMapping => self.toggle_focused_fx_param_mapping(env),
            Broadcast::FxSlot { track, navigator, slot } => self.go_fx_slot(*track, *navigator, *slot, env),
            Broadcast::ClearFxSlot => self.clear_fx_slot(env),
        }
    }

    // ─── Garbage collection ────────────────────────────────────────

    fn gc_roots(&self) -> Vec<ZoneId> {
        let mut roots: Vec<ZoneId> = Vec::new();
        roots.extend(self.no_map_zone);
        roots.extend(self.home);
        roots.extend(self.learn.fx_layout());
        roots.extend(self.focused_fx_param_zone);
        roots.extend(&self.focused_fx_zones);
        roots.extend(&self.selected_track_fx_zones);
        roots.extend(&self.fx_slot_zones);
        roots
    }

    /// Frees zones no root reaches. Runs only after a root list changed.
    pub fn collect_garbage(&mut self) -> usize {
        if !self.needs_gc {
            return 0;
        }
        self.needs_gc = false;
        let roots = self.gc_roots();
        let freed = self.zones.collect_garbage(self.id, &roots);
        if freed > 0 {
            log::debug!(target: "zone::gc", "{}: freed {} zones", self.settings.surface_name, freed);
        }
        freed
    }

    pub fn needs_gc(&self) -> bool {
        self.needs_gc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daw::OfflineDaw;
    use crate::tracks::PageOptions;
    use crate::widget::Widget;
    use std::fs;

    pub(super) struct Fixture {
        pub dir: tempfile::TempDir,
        pub daw: OfflineDaw,
        pub config: Config,
        pub registry: ActionRegistry,
        pub steps: SteppedValueCache,
        pub tracks: TrackNavigation,
        pub widgets: WidgetSet,
        pub channels: ChannelState,
        pub modifiers: Vec<u32>,
        pub commands: Vec<SurfaceCommand>,
        pub out: Vec<OutMessage>,
    }

    impl Fixture {
        pub fn new(widget_names: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("Zones/Test")).unwrap();
            fs::create_dir_all(dir.path().join("Zones/TestFX")).unwrap();
            let mut widgets = WidgetSet::new();
            for name in widget_names {
                widgets.add(Widget::new(*name));
            }
            let mut tracks = TrackNavigation::new(PageOptions::default());
            tracks.set_num_channels(2);
            let daw = OfflineDaw::new().with_resource_path(dir.path());
            Self {
                dir,
                daw,
                config: Config::embedded(),
                registry: ActionRegistry::default(),
                steps: SteppedValueCache::new(),
                tracks,
                widgets,
                channels: ChannelState::default(),
                modifiers: vec![0],
                commands: Vec::new(),
                out: Vec::new(),
            }
        }

        pub fn write_zone(&self, folder: &str, file: &str, contents: &str) {
            fs::write(self.dir.path().join("Zones").join(folder).join(file), contents).unwrap();
        }

        pub fn settings(&self) -> ManagerSettings {
            ManagerSettings {
                surface_name: "Test".to_string(),
                zone_root: self.dir.path().join("Zones"),
                zone_folder: "Test".to_string(),
                fx_zone_folder: "TestFX".to_string(),
                num_channels: 2,
                channel_offset: 0,
            }
        }

        pub fn env(&mut self) -> SurfaceEnv<'_> {
            SurfaceEnv {
                daw: &mut self.daw,
                config: &self.config,
                registry: &self.registry,
                steps: &mut self.steps,
                tracks: &self.tracks,
                widgets: &mut self.widgets,
                channels: &self.channels,
                modifiers: &self.modifiers,
                commands: &mut self.commands,
                out: &mut self.out,
            }
        }

        pub fn widget(&self, name: &str) -> WidgetId {
            self.widgets.id_of(name).unwrap()
        }
    }

    pub(super) fn manager(fx: &mut Fixture) -> ZoneManager {
        let mut zm = ZoneManager::new(ManagerId::new(1), fx.settings());
        zm.initialize(&mut fx.env()).unwrap();
        zm
    }

    #[test]
    fn test_missing_home_is_an_error() {
        let mut fx = Fixture::new(&["Play"]);
        fx.write_zone("Test", "Buttons.zon", "Zone Buttons\nPlay Play\nZoneEnd\n");
        let mut zm = ZoneManager::new(ManagerId::new(1), fx.settings());
        let err = zm.initialize(&mut fx.env()).unwrap_err();
        assert!(matches!(err, crate::error::ZoneError::MissingHome { .. }));
    }

    #[test]
    fn test_empty_zone_folder_is_an_error() {
        let mut fx = Fixture::new(&["Play"]);
        let mut zm = ZoneManager::new(ManagerId::new(1), fx.settings());
        let err = zm.initialize(&mut fx.env()).unwrap_err();
        assert!(matches!(err, crate::error::ZoneError::MissingZoneFolder(_)));
    }

    #[test]
    fn test_home_activates_included_and_announces() {
        let mut fx = Fixture::new(&["Play", "Stop"]);
        fx.write_zone(
            "Test",
            "Home.zon",
            "Zone Home\nIncludedZones\nButtons\nIncludedZonesEnd\nPlay Play\nZoneEnd\n",
        );
        fx.write_zone("Test", "Buttons.zon", "Zone Buttons\nStop Stop\nZoneEnd\n");
        let zm = manager(&mut fx);

        let mut active = zm.active_zone_names();
        active.sort();
        assert_eq!(active, vec!["Buttons", "Home"]);
        let announced: Vec<&OutMessage> =
            fx.out.iter().filter(|m| matches!(m, OutMessage::ZoneActivated(_))).collect();
        assert_eq!(
            announced,
            vec![
                &OutMessage::ZoneActivated("Home".to_string()),
                &OutMessage::ZoneActivated("Buttons".to_string()),
            ]
        );
    }

    struct Recorder(std::rc::Rc<std::cell::RefCell<Vec<Vec<String>>>>);

    impl crate::widget::FeedbackProcessor for Recorder {
        fn set_value(&mut self, _: &WidgetProperties, _: f64, _: &mut Vec<OutMessage>) {}

        fn configure(&mut self, contexts: &[crate::context::ActionContext]) {
            self.0.borrow_mut().push(contexts.iter().map(|c| c.action_name().to_string()).collect());
        }

        fn force_clear(&mut self, _: &mut Vec<OutMessage>) {}
    }

    #[test]
    fn test_activation_and_modifier_change_configure_widgets() {
        let mut fx = Fixture::new(&["Play"]);
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let play = fx.widget("Play");
        fx.widgets.get_mut(play).unwrap().add_feedback_processor(Box::new(Recorder(seen.clone())));
        fx.write_zone("Test", "Home.zon", "Zone Home\nPlay Play\nShift+Play Stop\nZoneEnd\n");
        let mut zm = manager(&mut fx);
        assert_eq!(seen.borrow().last().unwrap(), &vec!["Play".to_string()]);

        let shift = csurf_types::Modifier::Shift.bit();
        zm.update_current_modifiers(&[shift, 0], &mut fx.widgets);
        assert_eq!(seen.borrow().last().unwrap(), &vec!["Stop".to_string()]);
    }

    #[test]
    fn test_dispatch_reaches_included_zone() {
        let mut fx = Fixture::new(&["Play", "Stop"]);
        fx.write_zone(
            "Test",
            "Home.zon",
            "Zone Home\nIncludedZones\nButtons\nIncludedZonesEnd\nPlay Play\nZoneEnd\n",
        );
        fx.write_zone("Test", "Buttons.zon", "Zone Buttons\nStop Stop\nZoneEnd\n");
        let mut zm = manager(&mut fx);

        let stop = fx.widget("Stop");
        assert!(zm.do_action(stop, 1.0, &mut fx.env()));
        assert_eq!(fx.daw.transport_log, vec!["stop"]);
    }

    #[test]
    fn test_unbound_widget_is_not_used() {
        let mut fx = Fixture::new(&["Play", "Stop"]);
        fx.write_zone("Test", "Home.zon", "Zone Home\nPlay Play\nZoneEnd\n");
        let mut zm = manager(&mut fx);
        let stop = fx.widget("Stop");
        assert!(!zm.do_action(stop, 1.0, &mut fx.env()));
    }

    #[test]
    fn test_associated_zone_toggles_back_home() {
        let mut fx = Fixture::new(&["Play", "Fader1"]);
        fx.write_zone(
            "Test",
            "Home.zon",
            "Zone Home\nAssociatedZones\nSend\nAssociatedZonesEnd\nPlay Play\nZoneEnd\n",
        );
        fx.write_zone("Test", "Send.zon", "Zone Send\nFader1 NoAction\nZoneEnd\n");
        let mut zm = manager(&mut fx);
        let send = zm.find_zone("Send").unwrap();
        assert!(!zm.zone(send).unwrap().is_active());

        zm.go_associated_zone("Send", &mut fx.env());
        assert!(zm.zone(send).unwrap().is_active());

        zm.go_associated_zone("Send", &mut fx.env());
        assert!(!zm.zone(send).unwrap().is_active());
        assert!(zm.zone(zm.home().unwrap()).unwrap().is_active());
    }

    #[test]
    fn test_sub_zone_takes_enclosing_slot_and_forwards() {
        let mut fx = Fixture::new(&["Play", "Stop"]);
        fx.write_zone(
            "Test",
            "Home.zon",
            "Zone Home\nSubZones\nAltA\nAltB\nSubZonesEnd\nPlay Play\nZoneEnd\n",
        );
        fx.write_zone("Test", "AltA.zon", "Zone AltA\nStop Stop\nZoneEnd\n");
        fx.write_zone("Test", "AltB.zon", "Zone AltB\nStop Record\nZoneEnd\n");
        let mut zm = manager(&mut fx);
        let home = zm.home().unwrap();
        let a = zm.find_zone("AltA").unwrap();
        let b = zm.find_zone("AltB").unwrap();
        assert_eq!(zm.zone(a).unwrap().enclosing(), Some(home));

        zm.go_sub_zone(home, "AltA", &mut fx.env());
        assert!(zm.zone(a).unwrap().is_active());

        // asking the sub-zone switches its siblings through the enclosing zone
        zm.go_sub_zone(a, "AltB", &mut fx.env());
        assert!(!zm.zone(a).unwrap().is_active());
        assert!(zm.zone(b).unwrap().is_active());

        let stop = fx.widget("Stop");
        zm.do_action(stop, 1.0, &mut fx.env());
        assert_eq!(fx.daw.transport_log, vec!["record"]);

        zm.leave_sub_zone(b, &mut fx.env());
        assert!(!zm.zone(b).unwrap().is_active());
    }

    #[test]
    fn test_broadcast_categories() {
        let c = ListenerCategories::parse("GoHome Sends FocusedFX");
        assert!(Broadcast::GoHome.accepted_by(&c));
        assert!(Broadcast::AssociatedZone("TrackSend".into()).accepted_by(&c));
        assert!(!Broadcast::AssociatedZone("TrackReceive".into()).accepted_by(&c));
        assert!(!Broadcast::AssociatedZone("MyPanel".into()).accepted_by(&c));
        assert!(Broadcast::ClearFocusedFx.accepted_by(&c));
        assert!(!Broadcast::ClearFxSlot.accepted_by(&c));
    }

    #[test]
    fn test_bank_command_adjusts_zone_offsets_only() {
        let mut fx = Fixture::new(&["Play"]);
        fx.write_zone("Test", "Home.zon", "Zone Home\nPlay Play\nZoneEnd\n");
        let mut zm = manager(&mut fx);
        let handled = zm.handle_command(SurfaceCommand::Bank { kind: "SelectedTrackSend".into(), amount: 2 }, &mut fx.env());
        assert!(handled.is_none());
        assert_eq!(zm.offsets().selected_track_send, 2);

        let passed = zm.handle_command(SurfaceCommand::Bank { kind: "Track".into(), amount: 8 }, &mut fx.env());
        assert_eq!(passed, Some(SurfaceCommand::Bank { kind: "Track".into(), amount: 8 }));
    }

    #[test]
    fn test_go_home_resets_offsets() {
        let mut fx = Fixture::new(&["Play"]);
        fx.write_zone("Test", "Home.zon", "Zone Home\nPlay Play\nZoneEnd\n");
        let mut zm = manager(&mut fx);
        zm.handle_command(SurfaceCommand::Bank { kind: "TrackSend".into(), amount: 1 }, &mut fx.env());
        zm.handle_command(SurfaceCommand::GoHome, &mut fx.env());
        assert_eq!(*zm.offsets(), BankOffsets::default());
    }

    #[test]
    fn test_focused_fx_follows_window_focus() {
        let mut fx = Fixture::new(&["Play", "Rotary1"]);
        fx.write_zone("Test", "Home.zon", "Zone Home\nPlay Play\nZoneEnd\n");
        fx.write_zone("TestFX", "EQ.zon", "Zone \"VST: EQ\" EQ\nRotary1 FXParam 0\nZoneEnd\n");
        let t = fx.daw.add_track("Vox");
        fx.daw.add_fx(t, "VST: EQ", &["Gain"]);
        let mut zm = manager(&mut fx);

        fx.daw.set_focused_fx(FocusedFx { state: 1, track_number: 1, fx_index: 0 });
        zm.check_focused_fx_state(&mut fx.env());
        assert_eq!(zm.focused_fx_zones().len(), 1);

        let rotary = fx.widget("Rotary1");
        zm.do_action(rotary, 0.25, &mut fx.env());
        assert!((fx.daw.fx_param(t, 0, 0) - 0.25).abs() < 1e-9);

        fx.daw.set_focused_fx(FocusedFx { state: 5, track_number: 1, fx_index: 0 });
        zm.check_focused_fx_state(&mut fx.env());
        assert!(zm.focused_fx_zones().is_empty());
    }

    #[test]
    fn test_focused_fx_mapping_can_be_disabled() {
        let mut fx = Fixture::new(&["Play"]);
        fx.write_zone("Test", "Home.zon", "Zone Home\nPlay Play\nZoneEnd\n");
        fx.write_zone("TestFX", "EQ.zon", "Zone \"VST: EQ\" EQ\nPlay Stop\nZoneEnd\n");
        let t = fx.daw.add_track("Vox");
        fx.daw.add_fx(t, "VST: EQ", &["Gain"]);
        let mut zm = manager(&mut fx);
        zm.handle_command(SurfaceCommand::ToggleFocusedFxMapping, &mut fx.env());
        fx.daw.set_focused_fx(FocusedFx { state: 1, track_number: 1, fx_index: 0 });
        zm.check_focused_fx_state(&mut fx.env());
        assert!(zm.focused_fx_zones().is_empty());
    }

    #[test]
    fn test_selected_track_fx_loads_every_mapped_fx() {
        let mut fx = Fixture::new(&["Play", "Rotary1"]);
        fx.write_zone(
            "Test",
            "Home.zon",
            "Zone Home\nAssociatedZones\nSelectedTrackFX\nAssociatedZonesEnd\nPlay Play\nZoneEnd\n",
        );
        fx.write_zone("Test", "SelectedTrackFX.zon", "Zone SelectedTrackFX\nZoneEnd\n");
        fx.write_zone("TestFX", "EQ.zon", "Zone \"VST: EQ\" EQ\nRotary1 FXParam 0\nZoneEnd\n");
        let t = fx.daw.add_track("Vox");
        fx.daw.add_fx(t, "VST: Unmapped", &["A"]);
        fx.daw.add_fx(t, "VST: EQ", &["Gain"]);
        fx.daw.select_track(t);
        let mut zm = manager(&mut fx);

        zm.go_associated_zone("SelectedTrackFX", &mut fx.env());
        assert_eq!(zm.selected_track_fx_zones().len(), 1);
        let id = zm.selected_track_fx_zones()[0];
        assert_eq!(zm.zone(id).unwrap().raw_slot_index(), 1);

        let rotary = fx.widget("Rotary1");
        zm.do_action(rotary, 0.5, &mut fx.env());
        assert!((fx.daw.fx_param(t, 1, 0) - 0.5).abs() < 1e-9);
    }
}
