#![allow(dead_code)]
//! Test harness utilities for csurf-core integration tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;

use csurf_core::action::ActionRegistry;
use csurf_core::config::Config;
use csurf_core::daw::OfflineDaw;
use csurf_core::page::{Engine, Page};
use csurf_core::steps::SteppedValueCache;
use csurf_core::surface::{InputEvent, Loopback, Surface};
use csurf_core::tracks::PageOptions;
use csurf_core::widget::{FeedbackProcessor, Widget, WidgetProperties, WidgetSet};
use csurf_core::zone_manager::ManagerSettings;
use csurf_types::{ManagerId, OutMessage};

/// Values a widget was sent, shared with the test.
pub type Recorded = Rc<RefCell<Vec<f64>>>;

/// Feedback processor that records every value it is asked to send.
pub struct Recorder(pub Recorded);

impl FeedbackProcessor for Recorder {
    fn set_value(&mut self, _properties: &WidgetProperties, value: f64, _out: &mut Vec<OutMessage>) {
        self.0.borrow_mut().push(value);
    }

    fn force_clear(&mut self, _out: &mut Vec<OutMessage>) {}
}

/// One page driven against an offline DAW, with zone files in a temp dir.
pub struct Bench {
    pub dir: tempfile::TempDir,
    pub daw: OfflineDaw,
    pub config: Config,
    pub registry: ActionRegistry,
    pub steps: SteppedValueCache,
    pub page: Page,
    pub ios: HashMap<String, Loopback>,
    next_id: u32,
}

impl Bench {
    pub fn new(tracks: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut daw = OfflineDaw::new().with_resource_path(dir.path());
        for i in 0..tracks {
            daw.add_track(&format!("Track {}", i + 1));
        }
        Self {
            dir,
            daw,
            config: Config::embedded(),
            registry: ActionRegistry::default(),
            steps: SteppedValueCache::new(),
            page: Page::new("Main", PageOptions::default(), 100.0),
            ios: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn write_zone(&self, folder: &str, file: &str, contents: &str) {
        let dir = self.dir.path().join("CSI/Zones").join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), contents).unwrap();
    }

    pub fn widgets(names: &[&str]) -> WidgetSet {
        let mut set = WidgetSet::new();
        for name in names {
            set.add(Widget::new(*name));
        }
        set
    }

    pub fn add_surface(&mut self, name: &str, channels: usize, widgets: WidgetSet) -> Loopback {
        let io = Loopback::new();
        let settings = ManagerSettings {
            surface_name: name.to_string(),
            zone_root: self.dir.path().join("CSI/Zones"),
            zone_folder: name.to_string(),
            fx_zone_folder: format!("{}FX", name),
            num_channels: channels,
            channel_offset: 0,
        };
        let id = ManagerId::new(self.next_id);
        self.next_id += 1;
        self.page.add_surface(Surface::new(id, settings, widgets, Box::new(io.clone()), 100.0));
        self.ios.insert(name.to_string(), io.clone());
        io
    }

    pub fn engine(&mut self) -> Engine<'_> {
        Engine {
            daw: &mut self.daw,
            config: &self.config,
            registry: &self.registry,
            steps: &mut self.steps,
        }
    }

    pub fn initialize(&mut self) {
        let mut engine = Engine {
            daw: &mut self.daw,
            config: &self.config,
            registry: &self.registry,
            steps: &mut self.steps,
        };
        let failures = self.page.initialize(&mut engine);
        assert!(failures.is_empty(), "initialisation failed: {:?}", failures);
    }

    pub fn run(&mut self) {
        let mut engine = Engine {
            daw: &mut self.daw,
            config: &self.config,
            registry: &self.registry,
            steps: &mut self.steps,
        };
        self.page.run(&mut engine);
    }

    pub fn input(&self, surface: &str, widget: &str, value: f64) {
        let id = self.page.surface(surface).unwrap().widgets().id_of(widget).unwrap();
        self.ios[surface].push(InputEvent::Value { widget: id, value });
    }
}
