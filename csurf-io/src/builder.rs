//! Turns CSI.ini page and surface definitions into live pages.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use csurf_core::config::Config;
use csurf_core::error::Diagnostic;
use csurf_core::ini::{csi_folder, IniFile, SurfaceDef, Transport};
use csurf_core::page::Page;
use csurf_core::surface::{Surface, SurfaceIo};
use csurf_core::widget::WidgetSet;
use csurf_core::zone_manager::ManagerSettings;
use csurf_types::{ManagerId, OutMessage};

use crate::error::IoError;
use crate::mcu::init_sequence;
use crate::midi::{MidiSurfaceIo, SharedMidiOut};
use crate::midi_widgets::load_midi_template;
use crate::osc::{OscEndpoint, OscSurfaceIo};
use crate::osc_widgets::load_osc_template;
use crate::ports::PortRegistry;

/// `<resource>/CSI/Surfaces/Midi`.
pub fn midi_template_folder(resource_path: &Path) -> PathBuf {
    csi_folder(resource_path).join("Surfaces").join("Midi")
}

/// `<resource>/CSI/Surfaces/OSC`.
pub fn osc_template_folder(resource_path: &Path) -> PathBuf {
    csi_folder(resource_path).join("Surfaces").join("OSC")
}

fn settings(def: &SurfaceDef, resource_path: &Path) -> ManagerSettings {
    ManagerSettings {
        surface_name: def.name.clone(),
        zone_root: csi_folder(resource_path).join("Zones"),
        zone_folder: def.zone_folder.clone(),
        fx_zone_folder: def.fx_zone_folder.clone(),
        num_channels: def.num_channels,
        channel_offset: def.channel_offset,
    }
}

fn assemble(id: ManagerId, def: &SurfaceDef, resource_path: &Path, widgets: WidgetSet, io: Box<dyn SurfaceIo>, latch_time_ms: f64) -> Surface {
    Surface::new(id, settings(def, resource_path), widgets, io, latch_time_ms)
}

/// Builds a MIDI surface over already opened ports. MCU devices the template
/// drives are sent their init sysex straight away.
pub fn midi_surface(
    id: ManagerId,
    def: &SurfaceDef,
    resource_path: &Path,
    input: Option<Receiver<Vec<u8>>>,
    output: Option<SharedMidiOut>,
    latch_time_ms: f64,
) -> Result<(Surface, Vec<Diagnostic>), IoError> {
    let path = midi_template_folder(resource_path).join(&def.template_file);
    let (template, diagnostics) = load_midi_template(&path)?;
    let mut io = MidiSurfaceIo::new(def.name.as_str(), template.generators, input, output);
    for &device in &template.mcu_devices {
        log::debug!(target: "surface::midi", "{}: initialising MCU device {:02x}", def.name, device);
        for line in init_sequence(device) {
            io.send(&OutMessage::SysEx(line));
        }
    }
    Ok((assemble(id, def, resource_path, template.widgets, Box::new(io), latch_time_ms), diagnostics))
}

pub fn osc_surface(
    id: ManagerId,
    def: &SurfaceDef,
    resource_path: &Path,
    endpoint: OscEndpoint,
    latch_time_ms: f64,
) -> Result<(Surface, Vec<Diagnostic>), IoError> {
    let path = osc_template_folder(resource_path).join(&def.template_file);
    let (template, diagnostics) = load_osc_template(&path)?;
    let io = OscSurfaceIo::new(def.name.as_str(), template.addresses, endpoint);
    Ok((assemble(id, def, resource_path, template.widgets, Box::new(io), latch_time_ms), diagnostics))
}

/// Opens the transport of `def` and builds the surface.
pub fn build_surface(
    id: ManagerId,
    def: &SurfaceDef,
    transport: &Transport,
    resource_path: &Path,
    ports: &mut PortRegistry,
    latch_time_ms: f64,
) -> Result<(Surface, Vec<Diagnostic>), IoError> {
    match transport {
        Transport::Midi { in_port, out_port } => {
            let input = ports.midi_input(*in_port)?;
            let output = ports.midi_output(*out_port)?;
            midi_surface(id, def, resource_path, Some(input), Some(output), latch_time_ms)
        }
        Transport::Osc { receive_port, transmit_port, remote_ip } => {
            let endpoint = ports.osc_endpoint(&def.name, receive_port, transmit_port, remote_ip)?;
            osc_surface(id, def, resource_path, endpoint, latch_time_ms)
        }
    }
}

/// Pages built from CSI.ini, plus what went wrong along the way.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub diagnostics: Vec<Diagnostic>,
    /// Surfaces that could not be built, with the reason.
    pub failures: Vec<(String, IoError)>,
}

/// Builds every page. A surface whose transport or template fails is left
/// off its page; the rest of the page still works.
pub fn build_pages(
    ini: &IniFile,
    resource_path: &Path,
    ports: &mut PortRegistry,
    config: &Config,
) -> (Vec<Page>, BuildReport) {
    let mut report = BuildReport::default();
    let mut pages = Vec::new();
    let mut next_id = 1u32;

    for page_def in &ini.pages {
        let mut page = Page::new(page_def.name.as_str(), page_def.options, config.latch_time_ms());
        for def in &page_def.surfaces {
            let Some(transport) = ini.transport(&def.name) else {
                log::warn!(target: "ini", "{}: no MidiSurface or OSCSurface line", def.name);
                continue;
            };
            let id = ManagerId::new(next_id);
            next_id += 1;
            match build_surface(id, def, transport, resource_path, ports, config.latch_time_ms()) {
                Ok((surface, diagnostics)) => {
                    report.diagnostics.extend(diagnostics);
                    page.add_surface(surface);
                }
                Err(e) => {
                    log::error!(target: "ini", "{} on page {}: {}", def.name, page_def.name, e);
                    report.failures.push((def.name.clone(), e));
                }
            }
        }
        for listener in &page_def.listeners {
            if !page.add_listener(&listener.broadcaster, &listener.listener, listener.categories) {
                log::warn!(
                    target: "ini",
                    "page {}: cannot link {} to {}",
                    page_def.name,
                    listener.broadcaster,
                    listener.listener
                );
            }
        }
        pages.push(page);
    }
    (pages, report)
}
