//! Top-level owner of the DAW connection and the pages of surfaces.

use crate::action::{ActionRegistry, SurfaceCommand};
use crate::config::Config;
use crate::daw::Daw;
use crate::page::{Engine, Page};
use crate::steps::SteppedValueCache;

pub struct Integrator {
    daw: Box<dyn Daw>,
    config: Config,
    registry: ActionRegistry,
    steps: SteppedValueCache,
    pages: Vec<Page>,
    current: usize,
}

impl std::fmt::Debug for Integrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integrator")
            .field("pages", &self.pages.len())
            .field("current", &self.current)
            .finish()
    }
}

impl Integrator {
    pub fn new(daw: Box<dyn Daw>, config: Config) -> Self {
        Self {
            daw,
            config,
            registry: ActionRegistry::default(),
            steps: SteppedValueCache::new(),
            pages: Vec::new(),
            current: 0,
        }
    }

    pub fn daw(&self) -> &dyn Daw {
        &*self.daw
    }

    pub fn daw_mut(&mut self) -> &mut dyn Daw {
        &mut *self.daw
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry_mut(&mut self) -> &mut ActionRegistry {
        &mut self.registry
    }

    pub fn add_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn current_page_index(&self) -> usize {
        self.current
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.pages.get(self.current)
    }

    pub fn current_page_mut(&mut self) -> Option<&mut Page> {
        self.pages.get_mut(self.current)
    }

    /// Loads zones for every surface on every page. Failures are shown to the
    /// user; the remaining surfaces keep working.
    pub fn initialize(&mut self) {
        let mut messages = Vec::new();
        for page in &mut self.pages {
            let mut engine = Engine {
                daw: &mut *self.daw,
                config: &self.config,
                registry: &self.registry,
                steps: &mut self.steps,
            };
            for (surface, error) in page.initialize(&mut engine) {
                log::error!(target: "zone", "{} on page {}: {}", surface, page.name(), error);
                messages.push(format!("{}: {}", surface, error));
            }
        }
        for message in messages {
            self.daw.show_message(&message);
        }
    }

    /// One poll cycle of the current page.
    pub fn run(&mut self) {
        let Some(page) = self.pages.get_mut(self.current) else { return };
        let mut engine = Engine {
            daw: &mut *self.daw,
            config: &self.config,
            registry: &self.registry,
            steps: &mut self.steps,
        };
        let escalated = page.run(&mut engine);
        for command in escalated {
            match command {
                SurfaceCommand::NextPage => self.next_page(),
                SurfaceCommand::GoPage(name) => {
                    if !self.go_page(&name) {
                        log::warn!(target: "zone", "no page named {}", name);
                    }
                }
                other => log::debug!(target: "zone", "ignoring {:?} at integrator level", other),
            }
        }
    }

    pub fn next_page(&mut self) {
        if self.pages.is_empty() {
            return;
        }
        self.switch_to((self.current + 1) % self.pages.len());
    }

    /// Returns false when no page has that name.
    pub fn go_page(&mut self, name: &str) -> bool {
        match self.pages.iter().position(|p| p.name() == name) {
            Some(index) => {
                self.switch_to(index);
                true
            }
            None => false,
        }
    }

    fn switch_to(&mut self, index: usize) {
        if index == self.current || index >= self.pages.len() {
            return;
        }
        let offset = self.pages[self.current].tracks().track_offset();
        self.pages[self.current].leave(&self.config);

        self.current = index;
        let page = &mut self.pages[index];
        if !page.tracks().options().no_synch_pages {
            page.tracks_mut().set_track_offset(offset);
        }
        let mut engine = Engine {
            daw: &mut *self.daw,
            config: &self.config,
            registry: &self.registry,
            steps: &mut self.steps,
        };
        page.enter(&mut engine);
    }

    /// The DAW's track selection changed.
    pub fn on_track_selection(&mut self) {
        let Some(page) = self.pages.get_mut(self.current) else { return };
        let mut engine = Engine {
            daw: &mut *self.daw,
            config: &self.config,
            registry: &self.registry,
            steps: &mut self.steps,
        };
        page.on_track_selection(&mut engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daw::OfflineDaw;
    use crate::tracks::PageOptions;

    fn integrator_with_pages(names: &[&str]) -> Integrator {
        let mut integrator = Integrator::new(Box::new(OfflineDaw::new()), Config::embedded());
        for name in names {
            integrator.add_page(Page::new(*name, PageOptions::default(), 100.0));
        }
        integrator
    }

    #[test]
    fn test_next_page_wraps() {
        let mut integrator = integrator_with_pages(&["A", "B"]);
        integrator.next_page();
        assert_eq!(integrator.current_page().unwrap().name(), "B");
        integrator.next_page();
        assert_eq!(integrator.current_page().unwrap().name(), "A");
    }

    #[test]
    fn test_go_page_by_name_carries_bank() {
        let mut integrator = integrator_with_pages(&["A", "B"]);
        integrator.current_page_mut().unwrap().tracks_mut().set_track_offset(4);
        assert!(integrator.go_page("B"));
        assert_eq!(integrator.current_page().unwrap().tracks().track_offset(), 4);
        assert!(!integrator.go_page("Nope"));
    }

    #[test]
    fn test_no_synch_pages_keeps_own_bank() {
        let mut integrator = Integrator::new(Box::new(OfflineDaw::new()), Config::embedded());
        integrator.add_page(Page::new("A", PageOptions::default(), 100.0));
        let options = PageOptions { no_synch_pages: true, ..Default::default() };
        integrator.add_page(Page::new("B", options, 100.0));
        integrator.current_page_mut().unwrap().tracks_mut().set_track_offset(4);
        integrator.next_page();
        assert_eq!(integrator.current_page().unwrap().tracks().track_offset(), 0);
    }

    #[test]
    fn test_run_without_pages_is_harmless() {
        let mut integrator = integrator_with_pages(&[]);
        integrator.run();
        integrator.on_track_selection();
        assert!(integrator.current_page().is_none());
    }
}
