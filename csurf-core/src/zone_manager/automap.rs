//! FX slot mapping: the no-map fallback zone, zones loaded per FX slot and
//! zone files generated from the surface FX layout.

use csurf_types::{Navigator, TrackId, ZoneId};

use crate::context::ActionContext;
use crate::fx_layout::{fx_alias, render_auto_map_zone, AutoMapInput, AutoMapParam};
use crate::steps::discover_fx_steps;
use crate::zone_file::sanitize_file_name;

use super::learn::write_zone_file;
use super::{SurfaceEnv, ZoneManager};

impl ZoneManager {
    /// Loads the `NoMap` zone and binds `NoAction` to every unmapped-modifier
    /// layout cell the file itself leaves unbound.
    pub(super) fn initialize_no_map_zone(&mut self, env: &mut SurfaceEnv<'_>) {
        if !self.surface_layout.is_complete() {
            return;
        }
        let Some(info) = self.catalog.get("NoMap").cloned() else { return };
        let Some(id) = self
            .load_zone_file(&info.file_path, &[Navigator::SelectedTrack], None, env)
            .first()
            .copied()
        else {
            return;
        };
        self.no_map_zone = Some(id);

        let layout = &self.surface_layout;
        let widget_types = layout.widget_types();
        let Some(zone) = self.zones.get_mut(id) else { return };
        let used = zone.widgets().to_vec();
        let no_action = vec!["NoAction".to_string()];

        for cell in self.fx_layouts.iter().filter(|l| l.modifier_tokens().is_empty()) {
            for channel in 1..=cell.channel_count {
                let address = format!("{}{}", cell.suffix, channel);

                for display in [layout.name_display(), layout.value_display()] {
                    let Some(widget) = env.widgets.id_of(&format!("{}{}", display, address)) else { continue };
                    if used.contains(&widget) {
                        continue;
                    }
                    let Some(w) = env.widgets.get(widget) else { continue };
                    let mut ctx =
                        ActionContext::new(env.registry.create("NoAction"), &no_action, widget, w, id, &*env.daw, env.config);
                    ctx.set_provide_feedback(true);
                    zone.add_context(widget, 0, ctx);
                }

                for widget_type in &widget_types {
                    let Some(widget) = env.widgets.id_of(&format!("{}{}", widget_type, address)) else { continue };
                    if used.contains(&widget) {
                        continue;
                    }
                    let Some(w) = env.widgets.get(widget) else { continue };
                    let ctx =
                        ActionContext::new(env.registry.create("NoAction"), &no_action, widget, w, id, &*env.daw, env.config);
                    zone.add_context(widget, 0, ctx);
                }
            }
        }
    }

    /// Sweeps the FX's parameters for stepped values once per FX name.
    fn calculate_stepped_values(&mut self, fx_name: &str, track: TrackId, slot: usize, env: &mut SurfaceEnv<'_>) {
        if env.steps.has_been_calculated(fx_name) {
            return;
        }
        let param_limit: usize = self.fx_layouts.iter().map(|l| l.channel_count).sum();
        let bounds = env.step_bounds();
        discover_fx_steps(&mut *env.steps, &mut *env.daw, fx_name, track, slot, param_limit, bounds);
    }

    /// Maps one FX slot: its zone file when there is one, else the no-map zone
    /// with the FX window opened.
    pub fn go_fx_slot(&mut self, track: TrackId, navigator: Navigator, slot: usize, env: &mut SurfaceEnv<'_>) {
        if slot >= env.daw.fx_count(track) {
            return;
        }
        let fx_name = env.daw.fx_name(track, slot);
        self.calculate_stepped_values(&fx_name, track, slot, env);

        let previous = std::mem::take(&mut self.fx_slot_zones);
        self.deactivate_all(&previous, env);

        if let Some(info) = self.catalog.get(&fx_name).cloned() {
            let ids = self.load_zone_file(&info.file_path, &[navigator], None, env);
            self.activate_fx_slot_zones(ids, slot, env);
        } else if let Some(id) = self.no_map_zone {
            log::debug!(target: "zone", "{}: no zone for {}", self.settings.surface_name, fx_name);
            env.daw.open_fx_window(track, slot, true);
            self.set_slot_index(id, slot);
            self.activate(id, env);
        }
        self.needs_gc = true;
    }

    fn activate_fx_slot_zones(&mut self, ids: Vec<ZoneId>, slot: usize, env: &mut SurfaceEnv<'_>) {
        self.fx_slot_zones = ids;
        if let Some(last) = self.fx_slot_zones.last().copied() {
            self.set_slot_index(last, slot);
            self.activate(last, env);
        }
    }

    /// Auto-maps the FX whose window has focus.
    pub fn auto_map_focused_fx(&mut self, env: &mut SurfaceEnv<'_>) {
        let focused = env.daw.focused_fx();
        if focused.state != 1 || focused.track_number == 0 {
            return;
        }
        let Some(track) = env.daw.track(focused.track_number) else { return };
        self.auto_map_slot(track, focused.fx_index, Navigator::FocusedFx, env);
    }

    /// Auto-maps the FX in `slot` of `track`, seen through the selected track.
    pub fn auto_map_slot_fx(&mut self, track: TrackId, slot: usize, env: &mut SurfaceEnv<'_>) {
        self.auto_map_slot(track, slot, Navigator::SelectedTrack, env);
    }

    fn auto_map_slot(&mut self, track: TrackId, slot: usize, navigator: Navigator, env: &mut SurfaceEnv<'_>) {
        if slot >= env.daw.fx_count(track) {
            return;
        }
        let fx_name = env.daw.fx_name(track, slot);
        self.calculate_stepped_values(&fx_name, track, slot, env);
        self.auto_map_fx(&fx_name, track, slot, navigator, env);
    }

    /// Writes an auto-generated zone for the FX from the surface FX layout,
    /// registers it and activates it as the FX slot zone.
    pub fn auto_map_fx(
        &mut self,
        fx_name: &str,
        track: TrackId,
        slot: usize,
        navigator: Navigator,
        env: &mut SurfaceEnv<'_>,
    ) {
        if self.fx_layouts.is_empty() || self.surface_layout.is_empty() {
            return;
        }
        let alias = fx_alias(fx_name);
        let params: Vec<AutoMapParam> = (0..env.daw.fx_param_count(track, slot))
            .map(|i| AutoMapParam {
                name: env.daw.fx_param_name(track, slot, i as i32),
                steps: env.steps.get(fx_name, i as i32),
            })
            .collect();

        let contents = render_auto_map_zone(&AutoMapInput {
            fx_name,
            alias: &alias,
            layout: &self.surface_layout,
            fx_layouts: &self.fx_layouts,
            prologue: &self.prologue,
            epilogue: &self.epilogue,
            params: &params,
            step_bounds: env.step_bounds(),
        });

        let path = self
            .fx_zone_dir()
            .join("AutoGeneratedFXZones")
            .join(format!("{}.zon", sanitize_file_name(fx_name)));
        if let Err(e) = write_zone_file(&path, &contents) {
            log::warn!(target: "zone", "cannot write {}: {}", path.display(), e);
            env.daw.show_message(&format!("Could not save {}: {}", path.display(), e));
            return;
        }
        log::info!(target: "zone", "{}: auto-mapped {} to {}", self.settings.surface_name, fx_name, path.display());
        self.register_zone_file(fx_name, &path, &alias);

        let previous = std::mem::take(&mut self.fx_slot_zones);
        self.deactivate_all(&previous, env);
        let ids = self.load_zone_file(&path, &[navigator], None, env);
        self.activate_fx_slot_zones(ids, slot, env);
        self.needs_gc = true;
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{manager, Fixture};
    use super::*;
    use crate::action::SurfaceCommand;
    use crate::daw::Daw;

    const WIDGETS: &[&str] = &[
        "RotaryA1",
        "RotaryPushA1",
        "DisplayUpperA1",
        "DisplayLowerA1",
        "RotaryA2",
        "RotaryPushA2",
        "DisplayUpperA2",
        "DisplayLowerA2",
    ];

    fn layout_fixture() -> Fixture {
        let fx = Fixture::new(WIDGETS);
        fx.write_zone("Test", "Home.zon", "Zone Home\nZoneEnd\n");
        fx.write_zone(
            "Test",
            "SurfaceFXLayout.zon",
            "Zone SurfaceFXLayout\nRotary FXParam\nDisplayUpper FixedTextDisplay\nDisplayLower FXParamValueDisplay\n#WidgetTypes Rotary RotaryPush\nZoneEnd\n",
        );
        fx.write_zone("Test", "FXLayouts.zon", "Zone FXLayouts\nNoModifiers A 2\nZoneEnd\n");
        fx.write_zone("Test", "NoMap.zon", "Zone NoMap\nDisplayUpperA1 FixedTextDisplay \"No Map\"\nZoneEnd\n");
        fx
    }

    #[test]
    fn test_no_map_zone_fills_unbound_cells() {
        let mut fx = layout_fixture();
        let zm = manager(&mut fx);
        let zone = zm.zone(zm.no_map_zone().unwrap()).unwrap();

        assert_eq!(zone.contexts(fx.widget("DisplayUpperA1"), 0)[0].action_name(), "FixedTextDisplay");
        let value = &zone.contexts(fx.widget("DisplayLowerA2"), 0)[0];
        assert_eq!(value.action_name(), "NoAction");
        assert!(value.provides_feedback());
        let push = &zone.contexts(fx.widget("RotaryPushA2"), 0)[0];
        assert_eq!(push.action_name(), "NoAction");
        assert!(!push.provides_feedback());
    }

    #[test]
    fn test_fx_slot_without_zone_uses_no_map() {
        let mut fx = layout_fixture();
        let t = fx.daw.add_track("Vox");
        fx.daw.add_fx(t, "VST: First", &["A"]);
        fx.daw.add_fx(t, "VST: Second", &["B"]);
        let mut zm = manager(&mut fx);

        zm.handle_command(SurfaceCommand::GoFxSlot { track: t, navigator: Navigator::SelectedTrack, slot: 1 }, &mut fx.env());
        let no_map = zm.zone(zm.no_map_zone().unwrap()).unwrap();
        assert!(no_map.is_active());
        assert_eq!(no_map.raw_slot_index(), 1);
        assert!(zm.fx_slot_zones().is_empty());

        // out of range slots are ignored
        zm.clear_fx_slot(&mut fx.env());
        zm.go_fx_slot(t, Navigator::SelectedTrack, 5, &mut fx.env());
        assert!(!zm.zone(zm.no_map_zone().unwrap()).unwrap().is_active());
    }

    #[test]
    fn test_fx_slot_loads_cataloged_zone() {
        let mut fx = layout_fixture();
        fx.write_zone("TestFX", "Comp.zon", "Zone \"VST: Comp\" Comp\nRotaryA1 FXParam 0\nZoneEnd\n");
        let t = fx.daw.add_track("Vox");
        fx.daw.add_fx(t, "VST: Reverb", &["Mix"]);
        fx.daw.add_fx(t, "VST: Comp", &["Threshold"]);
        let mut zm = manager(&mut fx);

        zm.go_fx_slot(t, Navigator::Track(0), 1, &mut fx.env());
        assert_eq!(zm.fx_slot_zones().len(), 1);
        let zone = zm.zone(zm.fx_slot_zones()[0]).unwrap();
        assert!(zone.is_active());
        assert_eq!(zone.raw_slot_index(), 1);
        assert_eq!(zone.navigator(), Navigator::Track(0));

        assert!(zm.do_action(fx.widget("RotaryA1"), 0.25, &mut fx.env()));
        assert!((fx.daw.fx_param(t, 1, 0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_auto_map_writes_zone_and_activates_it() {
        let mut fx = layout_fixture();
        let t = fx.daw.add_track("Vox");
        fx.daw.add_fx(t, "VST: Comp (Acme)", &["Threshold", "Ratio", "Attack"]);
        fx.daw.select_track(t);
        let mut zm = manager(&mut fx);

        zm.handle_command(SurfaceCommand::AutoMapSlotFx { track: t, slot: 0 }, &mut fx.env());

        let path = fx.dir.path().join("Zones/TestFX/AutoGeneratedFXZones/VST__Comp__Acme_.zon");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Zone \"VST: Comp (Acme)\" \"Comp\"\n"));
        assert!(text.contains("\tRotaryA1\tFXParam 0\n"));
        assert!(text.contains("\tDisplayUpperA2\tFixedTextDisplay \"Ratio\"\n"));
        // two cells, so the third parameter is only listed
        assert!(!text.contains("FXParam 2"));
        assert!(text.ends_with("0 Threshold\n1 Ratio\n2 Attack\n"));

        assert_eq!(zm.catalog()["VST: Comp (Acme)"].file_path, path);
        assert_eq!(zm.fx_slot_zones().len(), 1);
        assert!(zm.do_action(fx.widget("RotaryA2"), 0.6, &mut fx.env()));
        assert!((fx.daw.fx_param(t, 0, 1) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_auto_map_sweeps_stepped_params_once() {
        let mut fx = layout_fixture();
        let t = fx.daw.add_track("Vox");
        fx.daw.add_fx(t, "UAD Pultec", &["Boost", "Freq"]);
        fx.daw.set_param_steps(t, 0, 1, 4);
        fx.daw.select_track(t);
        let mut zm = manager(&mut fx);

        zm.auto_map_slot_fx(t, 0, &mut fx.env());
        assert!(fx.steps.has_been_calculated("UAD Pultec"));
        assert_eq!(fx.steps.get("UAD Pultec", 1), 4);

        let text = std::fs::read_to_string(fx.dir.path().join("Zones/TestFX/AutoGeneratedFXZones/UAD_Pultec.zon")).unwrap();
        assert!(text.contains("\tRotaryA2\tFXParam 1 [ "));
        assert!(text.contains("\tRotaryA1\tFXParam 0\n"));
    }

    #[test]
    fn test_replaced_fx_slot_zones_are_collected() {
        let mut fx = layout_fixture();
        let t = fx.daw.add_track("Vox");
        fx.daw.add_fx(t, "VST: Comp", &["Threshold"]);
        fx.daw.select_track(t);
        let mut zm = manager(&mut fx);
        zm.collect_garbage();

        zm.auto_map_slot_fx(t, 0, &mut fx.env());
        let first = zm.fx_slot_zones()[0];
        zm.auto_map_slot_fx(t, 0, &mut fx.env());
        assert_ne!(zm.fx_slot_zones()[0], first);

        assert!(zm.needs_gc());
        assert!(zm.collect_garbage() >= 1);
        assert!(zm.zone(first).is_none());
        assert!(zm.zone(zm.fx_slot_zones()[0]).is_some());
        assert_eq!(zm.collect_garbage(), 0);
    }
}
