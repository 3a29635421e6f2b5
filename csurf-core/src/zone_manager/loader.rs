//! Instantiating zone files: catalog pre-pass, per-navigator zone creation and
//! template binding.

use std::path::Path;

use csurf_types::{Navigator, ZoneId};

use crate::context::ActionContext;
use crate::error::{Diagnostic, ZoneError};
use crate::fx_layout::{parse_boilerplate, parse_fx_layouts, SurfaceFxLayout};
use crate::template::NameTemplate;
use crate::zone::Zone;
use crate::zone_file::{build_catalog, read_zone_definition, ZoneDefinition};

use super::{SurfaceEnv, ZoneManager};

/// Navigators a zone is instantiated with; one zone instance per navigator.
pub fn navigators_for_zone(name: &str, num_channels: usize, channel_offset: usize) -> Vec<Navigator> {
    match name {
        "MasterTrack" => vec![Navigator::MasterTrack],
        "Track" | "VCA" | "Folder" | "SelectedTracks" | "TrackSend" | "TrackReceive" | "TrackFXMenu" => {
            (0..num_channels).map(|i| Navigator::Track(i + channel_offset)).collect()
        }
        "SelectedTrack" | "SelectedTrackSend" | "SelectedTrackReceive" | "SelectedTrackFXMenu" => {
            vec![Navigator::SelectedTrack; num_channels]
        }
        "MasterTrackFXMenu" => vec![Navigator::MasterTrack; num_channels],
        _ => vec![Navigator::SelectedTrack],
    }
}

impl ZoneManager {
    /// Catalogs the surface's zone folders, loads Home and the FX layout
    /// descriptions, builds the no-map and learn zones and goes home.
    pub fn initialize(&mut self, env: &mut SurfaceEnv<'_>) -> Result<(), ZoneError> {
        let zone_dir = self.zone_dir();
        if !zone_dir.is_dir() {
            return Err(ZoneError::MissingZoneFolder(zone_dir));
        }
        self.catalog = build_catalog(&[zone_dir.clone(), self.fx_zone_dir()]);
        if self.catalog.is_empty() {
            return Err(ZoneError::MissingZoneFolder(zone_dir));
        }

        let Some(home) = self.catalog.get("Home").cloned() else {
            return Err(ZoneError::MissingHome { surface: self.settings.surface_name.clone() });
        };
        self.load_zone_file(&home.file_path, &[Navigator::SelectedTrack], None, env);
        if self.home.is_none() {
            return Err(ZoneError::MissingHome { surface: self.settings.surface_name.clone() });
        }

        if let Some(info) = self.catalog.get("FocusedFXParam").cloned() {
            self.load_zone_file(&info.file_path, &[Navigator::SelectedTrack], None, env);
        }

        if let Some(contents) = self.read_cataloged("SurfaceFXLayout") {
            self.surface_layout = SurfaceFxLayout::parse(&contents);
        }
        if let Some(contents) = self.read_cataloged("FXLayouts") {
            self.fx_layouts = parse_fx_layouts(&contents);
        }
        if let Some(contents) = self.read_cataloged("FXPrologue") {
            self.prologue = parse_boilerplate(&contents);
        }
        if let Some(contents) = self.read_cataloged("FXEpilogue") {
            self.epilogue = parse_boilerplate(&contents);
        }

        self.initialize_no_map_zone(env);
        self.initialize_fx_params_learn_zone(env);

        log::debug!(
            target: "zone",
            "{}: {} zones cataloged, {} instantiated",
            self.settings.surface_name,
            self.catalog.len(),
            self.zones.len()
        );

        self.go_home(env);
        Ok(())
    }

    fn read_cataloged(&self, name: &str) -> Option<String> {
        let info = self.catalog.get(name)?;
        match std::fs::read_to_string(&info.file_path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                Diagnostic::new(&info.file_path, 0, e.to_string()).log();
                None
            }
        }
    }

    /// Instantiates the first zone in `path` once per navigator. Sub-zones get
    /// `enclosing` set. Returns the new zones in navigator order.
    pub(super) fn load_zone_file(
        &mut self,
        path: &Path,
        navigators: &[Navigator],
        enclosing: Option<ZoneId>,
        env: &mut SurfaceEnv<'_>,
    ) -> Vec<ZoneId> {
        let def = match read_zone_definition(path) {
            Ok(def) => def,
            Err(e) => {
                Diagnostic::new(path, 0, e.to_string()).log();
                return Vec::new();
            }
        };
        for diagnostic in &def.diagnostics {
            diagnostic.log();
        }
        if !def.complete {
            return Vec::new();
        }
        if self.loading.contains(&def.name) {
            Diagnostic::new(path, 1, format!("zone {} includes itself", def.name)).log();
            return Vec::new();
        }

        self.loading.push(def.name.clone());
        let mut ids = Vec::with_capacity(navigators.len());
        for (i, navigator) in navigators.iter().enumerate() {
            let id = self.instantiate(&def, i, *navigator, navigators.len(), enclosing, env);
            ids.push(id);
        }
        self.loading.pop();

        ids
    }

    fn instantiate(
        &mut self,
        def: &ZoneDefinition,
        index: usize,
        navigator: Navigator,
        navigator_count: usize,
        enclosing: Option<ZoneId>,
        env: &mut SurfaceEnv<'_>,
    ) -> ZoneId {
        let mut zone = Zone::new(self.id, &def.name, &def.alias, &def.path, navigator, index);
        if let Some(e) = enclosing {
            zone.set_enclosing(e);
        }
        let id = self.zones.insert(zone);

        match def.name.as_str() {
            "Home" => self.home = Some(id),
            "FocusedFXParam" => self.focused_fx_param_zone = Some(id),
            _ => {}
        }

        if def.name == "Home" {
            for name in &def.associated {
                let Some(info) = self.catalog.get(name).cloned() else { continue };
                let navigators = navigators_for_zone(name, self.settings.num_channels, self.settings.channel_offset);
                let group = self.load_zone_file(&info.file_path, &navigators, None, env);
                if let Some(zone) = self.zones.get_mut(id) {
                    zone.set_associated(name, group);
                }
            }
        }

        for name in &def.included {
            let Some(info) = self.catalog.get(name).cloned() else { continue };
            let navigators = navigators_for_zone(name, self.settings.num_channels, self.settings.channel_offset);
            let group = self.load_zone_file(&info.file_path, &navigators, None, env);
            if let Some(zone) = self.zones.get_mut(id) {
                zone.add_included(group);
            }
        }

        self.bind_templates(id, def, index, navigator_count, enclosing, env);

        if enclosing.is_none() {
            for name in &def.sub_zones {
                let Some(info) = self.catalog.get(name).cloned() else { continue };
                let group = self.load_zone_file(&info.file_path, &[navigator], Some(id), env);
                if let Some(zone) = self.zones.get_mut(id) {
                    zone.set_sub_zones(name, group);
                }
            }
        }

        id
    }

    fn bind_templates(
        &mut self,
        id: ZoneId,
        def: &ZoneDefinition,
        index: usize,
        navigator_count: usize,
        enclosing: Option<ZoneId>,
        env: &mut SurfaceEnv<'_>,
    ) {
        let enclosing_channel = enclosing
            .and_then(|e| self.zones.get(e))
            .map(|z| z.channel_number(env.widgets))
            .unwrap_or(0);

        let Some(zone) = self.zones.get_mut(id) else { return };

        for (raw_widget, modifier, templates) in def.templates.groups() {
            let widget_name = if navigator_count > 1 {
                NameTemplate::parse(raw_widget).resolve(index + 1)
            } else if enclosing_channel != 0 {
                NameTemplate::parse(raw_widget).resolve(enclosing_channel)
            } else {
                raw_widget.to_string()
            };
            let Some(widget_id) = env.widgets.id_of(&widget_name) else { continue };
            let Some(widget) = env.widgets.get(widget_id) else { continue };

            zone.add_widget(widget_id);

            for template in templates {
                let action_name = template.action.resolve(index + 1);
                let params: Vec<String> = template.params.iter().map(|p| p.resolve(index + 1)).collect();
                let mut ctx = ActionContext::new(
                    env.registry.create(&action_name),
                    &params,
                    widget_id,
                    widget,
                    id,
                    &*env.daw,
                    env.config,
                );
                ctx.set_provide_feedback(template.provide_feedback);
                if template.is_value_inverted {
                    ctx.set_value_inverted();
                }
                if template.is_feedback_inverted {
                    ctx.set_feedback_inverted();
                }
                if template.hold_delay != 0.0 {
                    ctx.set_hold_delay_ms(template.hold_delay * env.config.hold_delay_ms());
                }
                if template.is_decrease {
                    ctx.set_range(-2.0, 1.0);
                } else if template.is_increase {
                    ctx.set_range(0.0, 2.0);
                }
                zone.add_context(widget_id, modifier, ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{manager, Fixture};
    use super::*;

    #[test]
    fn test_navigators_for_zone() {
        assert_eq!(navigators_for_zone("Track", 3, 8), vec![
            Navigator::Track(8),
            Navigator::Track(9),
            Navigator::Track(10)
        ]);
        assert_eq!(navigators_for_zone("MasterTrack", 8, 0), vec![Navigator::MasterTrack]);
        assert_eq!(navigators_for_zone("SelectedTrackSend", 2, 0), vec![Navigator::SelectedTrack; 2]);
        assert_eq!(navigators_for_zone("Buttons", 8, 0), vec![Navigator::SelectedTrack]);
    }

    #[test]
    fn test_track_zone_instantiated_per_channel() {
        let mut fx = Fixture::new(&["Fader1", "Fader2", "Mute1", "Mute2"]);
        fx.write_zone(
            "Test",
            "Home.zon",
            "Zone Home\nIncludedZones\nTrack\nIncludedZonesEnd\nZoneEnd\n",
        );
        fx.write_zone("Test", "Track.zon", "Zone Track\nFader| TrackVolume\nMute| TrackMute\nZoneEnd\n");
        let zm = manager(&mut fx);

        let home = zm.zone(zm.home().unwrap()).unwrap();
        assert_eq!(home.included().len(), 2);
        let second = zm.zone(home.included()[1]).unwrap();
        assert_eq!(second.navigator(), Navigator::Track(1));
        assert!(second.has_widget(fx.widget("Fader2")));
        assert!(!second.has_widget(fx.widget("Fader1")));
    }

    #[test]
    fn test_include_cycle_is_cut() {
        let mut fx = Fixture::new(&["Play"]);
        fx.write_zone(
            "Test",
            "Home.zon",
            "Zone Home\nIncludedZones\nA\nIncludedZonesEnd\nPlay Play\nZoneEnd\n",
        );
        fx.write_zone("Test", "A.zon", "Zone A\nIncludedZones\nB\nIncludedZonesEnd\nZoneEnd\n");
        fx.write_zone("Test", "B.zon", "Zone B\nIncludedZones\nA\nIncludedZonesEnd\nZoneEnd\n");
        let zm = manager(&mut fx);

        let mut names: Vec<String> = zm.zones().ids().map(|id| zm.zone(id).unwrap().name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["A", "B", "Home"]);
    }

    #[test]
    fn test_missing_widget_is_skipped() {
        let mut fx = Fixture::new(&["Play"]);
        fx.write_zone("Test", "Home.zon", "Zone Home\nPlay Play\nJogWheel Scrub\nZoneEnd\n");
        let zm = manager(&mut fx);
        let home = zm.zone(zm.home().unwrap()).unwrap();
        assert_eq!(home.widgets().len(), 1);
    }

    #[test]
    fn test_sub_zone_widgets_take_enclosing_channel() {
        let mut fx = Fixture::new(&["Fader1", "Fader2", "Mute2"]);
        fx.write_zone(
            "Test",
            "Home.zon",
            "Zone Home\nIncludedZones\nChannel\nIncludedZonesEnd\nZoneEnd\n",
        );
        fx.write_zone(
            "Test",
            "Channel.zon",
            "Zone Channel\nSubZones\nChannelAlt\nSubZonesEnd\nFader2 TrackVolume\nZoneEnd\n",
        );
        fx.write_zone("Test", "ChannelAlt.zon", "Zone ChannelAlt\nMute| TrackMute\nZoneEnd\n");
        let zm = manager(&mut fx);

        let alt = zm.find_zone("ChannelAlt").unwrap();
        assert!(zm.zone(alt).unwrap().has_widget(fx.widget("Mute2")));
    }

    #[test]
    fn test_template_modifiers_and_flags_applied() {
        let mut fx = Fixture::new(&["Fader1", "Button1"]);
        fx.write_zone(
            "Test",
            "Home.zon",
            "Zone Home\nInvert+Fader1 TrackVolume\nHold+Button1 Play\nZoneEnd\n",
        );
        let zm = manager(&mut fx);
        let home = zm.zone(zm.home().unwrap()).unwrap();
        let ctx = &home.contexts(fx.widget("Fader1"), 0)[0];
        assert_eq!(ctx.action_name(), "TrackVolume");
        assert!(ctx.provides_feedback());
        assert_eq!(home.contexts(fx.widget("Button1"), 0).len(), 1);
    }
}
