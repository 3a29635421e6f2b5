//! A page: the surfaces that work together, their shared bank position and
//! their shared modifiers.

use csurf_types::ListenerCategories;

use crate::action::{ActionRegistry, SurfaceCommand};
use crate::config::Config;
use crate::daw::Daw;
use crate::error::ZoneError;
use crate::modifiers::ModifierManager;
use crate::steps::SteppedValueCache;
use crate::surface::{PageContext, Surface};
use crate::tracks::{PageOptions, TrackNavigation};

/// Integrator-owned state lent to a page for one call.
pub struct Engine<'a> {
    pub daw: &'a mut dyn Daw,
    pub config: &'a Config,
    pub registry: &'a ActionRegistry,
    pub steps: &'a mut SteppedValueCache,
}

fn context<'a>(
    engine: &'a mut Engine<'_>,
    tracks: &'a TrackNavigation,
    modifiers: &'a ModifierManager,
) -> PageContext<'a> {
    PageContext {
        daw: &mut *engine.daw,
        config: engine.config,
        registry: engine.registry,
        steps: &mut *engine.steps,
        tracks,
        modifiers,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    broadcaster: usize,
    listener: usize,
}

#[derive(Debug)]
pub struct Page {
    name: String,
    tracks: TrackNavigation,
    modifiers: ModifierManager,
    surfaces: Vec<Surface>,
    links: Vec<Link>,
}

impl Page {
    pub fn new(name: impl Into<String>, options: PageOptions, latch_time_ms: f64) -> Self {
        Self {
            name: name.into(),
            tracks: TrackNavigation::new(options),
            modifiers: ModifierManager::new(latch_time_ms),
            surfaces: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tracks(&self) -> &TrackNavigation {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut TrackNavigation {
        &mut self.tracks
    }

    pub fn modifiers(&self) -> &ModifierManager {
        &self.modifiers
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn surface(&self, name: &str) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.name() == name)
    }

    pub fn surface_mut(&mut self, name: &str) -> Option<&mut Surface> {
        self.surfaces.iter_mut().find(|s| s.name() == name)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.surfaces.iter().position(|s| s.name() == name)
    }

    pub fn add_surface(&mut self, surface: Surface) {
        self.tracks.set_num_channels(surface.zones().num_channels());
        self.surfaces.push(surface);
    }

    /// Makes `listener` follow `broadcaster`. Returns false when either
    /// surface is not on this page.
    pub fn add_listener(&mut self, broadcaster: &str, listener: &str, categories: ListenerCategories) -> bool {
        let (Some(b), Some(l)) = (self.index_of(broadcaster), self.index_of(listener)) else {
            return false;
        };
        self.surfaces[b].zones_mut().set_broadcaster(true);
        self.surfaces[l].zones_mut().set_listener_categories(categories);
        let link = Link { broadcaster: b, listener: l };
        if !self.links.contains(&link) {
            self.links.push(link);
        }
        true
    }

    /// Loads every surface's zones. Surfaces that fail are reported and stay inert.
    pub fn initialize(&mut self, engine: &mut Engine<'_>) -> Vec<(String, ZoneError)> {
        let mut failures = Vec::new();
        for index in 0..self.surfaces.len() {
            let result = {
                let mut cx = context(engine, &self.tracks, &self.modifiers);
                self.surfaces[index].initialize(&mut cx)
            };
            if let Err(e) = result {
                failures.push((self.surfaces[index].name().to_string(), e));
            }
            self.relay(index, engine);
        }
        failures
    }

    /// One poll cycle. Commands that belong to the integrator are returned.
    pub fn run(&mut self, engine: &mut Engine<'_>) -> Vec<SurfaceCommand> {
        let mut escalated = Vec::new();
        for index in 0..self.surfaces.len() {
            let bubbled = {
                let mut cx = context(engine, &self.tracks, &self.modifiers);
                let surface = &mut self.surfaces[index];
                surface.poll_input(&mut cx);
                surface.apply_commands(&mut cx)
            };
            for command in bubbled {
                escalated.extend(self.handle_command(command, engine));
            }
            self.relay(index, engine);
        }

        for index in 0..self.surfaces.len() {
            {
                let mut cx = context(engine, &self.tracks, &self.modifiers);
                self.surfaces[index].update(&mut cx);
            }
            self.relay(index, engine);
        }

        for surface in &mut self.surfaces {
            surface.flush(engine.config);
        }
        escalated
    }

    fn handle_command(&mut self, command: SurfaceCommand, engine: &mut Engine<'_>) -> Option<SurfaceCommand> {
        match command {
            SurfaceCommand::Modifier { modifier, pressed } => {
                let now = engine.daw.now_ms();
                if let Some(text) = self.modifiers.set_modifier(modifier, pressed, now) {
                    engine.daw.speak(&text);
                }
                self.page_modifiers_changed(engine);
            }
            SurfaceCommand::ClearModifier(modifier) => {
                self.modifiers.clear_modifier(modifier);
                self.page_modifiers_changed(engine);
            }
            SurfaceCommand::ClearModifiers => {
                self.modifiers.clear_modifiers();
                self.page_modifiers_changed(engine);
            }
            SurfaceCommand::SetLatchTime(ms) => self.modifiers.set_latch_time_ms(ms),
            SurfaceCommand::Bank { kind, amount } if kind == "Track" => {
                self.tracks.adjust_bank(amount, &*engine.daw);
            }
            SurfaceCommand::TrackListMode { mode, active: true } => self.tracks.enter_mode(mode),
            SurfaceCommand::TrackListMode { mode, active: false } => self.tracks.leave_mode(mode),
            SurfaceCommand::ToggleVcaSpill(track) => self.tracks.toggle_vca_spill(track, &*engine.daw),
            SurfaceCommand::ToggleFolderSpill(track) => self.tracks.toggle_folder_spill(track, &*engine.daw),
            SurfaceCommand::Bank { kind, .. } => {
                log::debug!(target: "zone", "{}: unknown bank kind {}", self.name, kind);
            }
            SurfaceCommand::AllSurfacesGoHome => self.go_home(engine),
            SurfaceCommand::NextPage | SurfaceCommand::GoPage(_) => return Some(command),
            other => log::debug!(target: "zone", "{}: unhandled command {:?}", self.name, other),
        }
        None
    }

    fn page_modifiers_changed(&mut self, engine: &mut Engine<'_>) {
        let cx = context(engine, &self.tracks, &self.modifiers);
        for surface in &mut self.surfaces {
            if !surface.uses_local_modifiers() {
                surface.refresh_modifiers(&cx);
            }
        }
    }

    /// Hands a surface's broadcasts to its listeners and its catalog changes
    /// to every other surface.
    fn relay(&mut self, index: usize, engine: &mut Engine<'_>) {
        let source = &mut self.surfaces[index];
        let broadcasts = source.zones_mut().take_broadcasts();
        let changes = source.zones_mut().take_catalog_changes();
        let modifiers = source.take_modifiers_changed().then(|| source.local_modifiers().clone());

        if !changes.is_empty() {
            for (other, surface) in self.surfaces.iter_mut().enumerate() {
                if other == index {
                    continue;
                }
                for change in &changes {
                    surface.zones_mut().apply_catalog_change(change);
                }
            }
        }

        let listeners: Vec<usize> = self
            .links
            .iter()
            .filter(|link| link.broadcaster == index)
            .map(|link| link.listener)
            .collect();
        for listener in listeners {
            let surface = &mut self.surfaces[listener];
            if let Some(modifiers) = &modifiers {
                if surface.zones().listener_categories().modifiers {
                    surface.copy_local_modifiers(modifiers);
                }
            }
            let mut cx = context(engine, &self.tracks, &self.modifiers);
            for broadcast in &broadcasts {
                surface.with_zones(&mut cx, |zones, env| zones.receive_broadcast(broadcast, env));
            }
        }
    }

    pub fn go_home(&mut self, engine: &mut Engine<'_>) {
        for surface in &mut self.surfaces {
            let mut cx = context(engine, &self.tracks, &self.modifiers);
            surface.with_zones(&mut cx, |zones, env| zones.go_home(env));
        }
    }

    /// Follows a DAW track selection change.
    pub fn on_track_selection(&mut self, engine: &mut Engine<'_>) {
        self.tracks.follow_selection(&*engine.daw);
        for index in 0..self.surfaces.len() {
            {
                let mut cx = context(engine, &self.tracks, &self.modifiers);
                self.surfaces[index].with_zones(&mut cx, |zones, env| zones.on_track_selection(env));
            }
            self.relay(index, engine);
        }
    }

    /// Page became current: every surface starts from Home.
    pub fn enter(&mut self, engine: &mut Engine<'_>) {
        log::info!(target: "zone", "entering page {}", self.name);
        self.go_home(engine);
    }

    /// Page stopped being current: surfaces are blanked.
    pub fn leave(&mut self, config: &Config) {
        for surface in &mut self.surfaces {
            surface.clear_widgets();
            surface.flush(config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daw::{normalized_to_volume, OfflineDaw};
    use crate::surface::{InputEvent, Loopback};
    use crate::tracks::TrackListMode;
    use crate::widget::{Widget, WidgetSet};
    use crate::zone_manager::ManagerSettings;
    use csurf_types::ManagerId;
    use std::fs;

    struct Rig {
        dir: tempfile::TempDir,
        daw: OfflineDaw,
        config: Config,
        registry: ActionRegistry,
        steps: SteppedValueCache,
    }

    impl Rig {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut daw = OfflineDaw::new().with_resource_path(dir.path());
            for i in 0..3 {
                daw.add_track(&format!("Track {}", i + 1));
            }
            Self {
                dir,
                daw,
                config: Config::embedded(),
                registry: ActionRegistry::default(),
                steps: SteppedValueCache::new(),
            }
        }

        fn engine(&mut self) -> Engine<'_> {
            Engine {
                daw: &mut self.daw,
                config: &self.config,
                registry: &self.registry,
                steps: &mut self.steps,
            }
        }

        fn write_zone(&self, folder: &str, file: &str, contents: &str) {
            let dir = self.dir.path().join("Zones").join(folder);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(file), contents).unwrap();
        }

        fn surface(&self, name: &str, id: u32, widgets: &[&str], io: &Loopback) -> Surface {
            let mut set = WidgetSet::new();
            for w in widgets {
                set.add(Widget::new(*w));
            }
            let settings = ManagerSettings {
                surface_name: name.to_string(),
                zone_root: self.dir.path().join("Zones"),
                zone_folder: name.to_string(),
                fx_zone_folder: format!("{}FX", name),
                num_channels: 1,
                channel_offset: 0,
            };
            Surface::new(ManagerId::new(id), settings, set, Box::new(io.clone()), 100.0)
        }
    }

    fn press(page: &Page, io: &Loopback, surface: &str, widget: &str, value: f64) {
        let id = page.surface(surface).unwrap().widgets().id_of(widget).unwrap();
        io.push(InputEvent::Value { widget: id, value });
    }

    #[test]
    fn test_page_modifier_selects_shifted_binding() {
        let mut rig = Rig::new();
        rig.write_zone("A", "Home.zon", "Zone Home\nIncludedZones\nTrack\nIncludedZonesEnd\nShift Shift\nZoneEnd\n");
        rig.write_zone("A", "Track.zon", "Zone Track\nFader| TrackVolume\nShift+Fader| TrackVolumeDB\nZoneEnd\n");
        let io = Loopback::new();
        let mut page = Page::new("Main", PageOptions::default(), 100.0);
        page.add_surface(rig.surface("A", 1, &["Shift", "Fader1"], &io));
        assert!(page.initialize(&mut rig.engine()).is_empty());
        let track = rig.daw.track(1).unwrap();

        press(&page, &io, "A", "Fader1", 0.5);
        page.run(&mut rig.engine());
        let plain = rig.daw.track_volume(track);
        assert!((plain - normalized_to_volume(0.5)).abs() < 1e-9);

        press(&page, &io, "A", "Shift", 1.0);
        page.run(&mut rig.engine());
        assert_eq!(page.modifiers().combinations()[0], csurf_types::Modifier::Shift.bit());

        press(&page, &io, "A", "Fader1", 0.5);
        page.run(&mut rig.engine());
        assert!((rig.daw.track_volume(track) - plain).abs() > 1e-6);
    }

    #[test]
    fn test_go_home_is_relayed_to_listener() {
        let mut rig = Rig::new();
        rig.write_zone("A", "Home.zon", "Zone Home\nPlay GoHome\nZoneEnd\n");
        rig.write_zone("B", "Home.zon", "Zone Home\nAssociatedZones\nPanel\nAssociatedZonesEnd\nZoneEnd\n");
        rig.write_zone("B", "Panel.zon", "Zone Panel\nKnob1 NoAction\nZoneEnd\n");
        let io_a = Loopback::new();
        let io_b = Loopback::new();
        let mut page = Page::new("Main", PageOptions::default(), 100.0);
        page.add_surface(rig.surface("A", 1, &["Play"], &io_a));
        page.add_surface(rig.surface("B", 2, &["Knob1"], &io_b));
        assert!(page.add_listener("A", "B", ListenerCategories::parse("GoHome")));
        assert!(!page.add_listener("A", "Nope", ListenerCategories::default()));
        assert!(page.initialize(&mut rig.engine()).is_empty());

        {
            let mut engine = rig.engine();
            let b = page.surfaces.iter_mut().find(|s| s.name() == "B").unwrap();
            let mut cx = context(&mut engine, &page.tracks, &page.modifiers);
            b.with_zones(&mut cx, |zones, env| zones.go_associated_zone("Panel", env));
        }
        let panel = page.surface("B").unwrap().zones().find_zone("Panel").unwrap();
        assert!(page.surface("B").unwrap().zones().zone(panel).unwrap().is_active());

        press(&page, &io_a, "A", "Play", 1.0);
        page.run(&mut rig.engine());
        assert!(!page.surface("B").unwrap().zones().zone(panel).unwrap().is_active());
    }

    #[test]
    fn test_track_bank_and_page_commands() {
        let mut rig = Rig::new();
        rig.write_zone("A", "Home.zon", "Zone Home\nRight Bank Track 1\nNext NextPage\nZoneEnd\n");
        let io = Loopback::new();
        let mut page = Page::new("Main", PageOptions::default(), 100.0);
        page.add_surface(rig.surface("A", 1, &["Right", "Next"], &io));
        page.initialize(&mut rig.engine());

        press(&page, &io, "A", "Right", 1.0);
        assert!(page.run(&mut rig.engine()).is_empty());
        assert_eq!(page.tracks().track_offset(), 1);

        press(&page, &io, "A", "Next", 1.0);
        assert_eq!(page.run(&mut rig.engine()), vec![SurfaceCommand::NextPage]);
    }

    #[test]
    fn test_vca_zone_switches_track_list() {
        let mut rig = Rig::new();
        let (lead, a, b) = (rig.daw.track(1).unwrap(), rig.daw.track(2).unwrap(), rig.daw.track(3).unwrap());
        rig.daw.set_vca_group(lead, &[a, b]);
        rig.write_zone(
            "A",
            "Home.zon",
            "Zone Home\nAssociatedZones\nVCA\nAssociatedZonesEnd\nVcaMode GoAssociatedZone VCA\nZoneEnd\n",
        );
        rig.write_zone("A", "VCA.zon", "Zone VCA\nSpill| TrackToggleVCASpill\nZoneEnd\n");
        let io = Loopback::new();
        let mut page = Page::new("Main", PageOptions::default(), 100.0);
        page.add_surface(rig.surface("A", 1, &["VcaMode", "Spill1"], &io));
        assert!(page.initialize(&mut rig.engine()).is_empty());

        press(&page, &io, "A", "VcaMode", 1.0);
        page.run(&mut rig.engine());
        assert_eq!(page.tracks().mode(), TrackListMode::Vca);
        assert_eq!(page.tracks().channel_track(0, &rig.daw), Some(lead));

        press(&page, &io, "A", "Spill1", 1.0);
        page.run(&mut rig.engine());
        assert_eq!(page.tracks().vca_spill(), Some(lead));

        press(&page, &io, "A", "VcaMode", 1.0);
        page.run(&mut rig.engine());
        assert_eq!(page.tracks().mode(), TrackListMode::Tracks);
    }

    #[test]
    fn test_zone_activation_reaches_transport() {
        let mut rig = Rig::new();
        rig.write_zone("A", "Home.zon", "Zone Home\nPlay Play\nZoneEnd\n");
        let io = Loopback::new();
        let mut page = Page::new("Main", PageOptions::default(), 100.0);
        page.add_surface(rig.surface("A", 1, &["Play"], &io));
        page.initialize(&mut rig.engine());
        page.run(&mut rig.engine());
        assert!(io.take_sent().contains(&csurf_types::OutMessage::ZoneActivated("Home".to_string())));
    }
}
