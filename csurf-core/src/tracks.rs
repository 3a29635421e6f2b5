//! Page-level track banking and navigator resolution.

use csurf_types::{Navigator, TrackId};

use crate::daw::Daw;

/// Options given on a `Page` line of CSI.ini.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOptions {
    /// Bank follows the DAW's track control panel.
    pub follow_tcp: bool,
    /// Bank position is not shared when switching pages.
    pub no_synch_pages: bool,
    pub use_scroll_link: bool,
    pub use_scroll_synch: bool,
}

impl PageOptions {
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut options = Self::default();
        for token in tokens {
            match token.as_ref() {
                "FollowTCP" => options.follow_tcp = true,
                "NoSynchPages" => options.no_synch_pages = true,
                "UseScrollLink" => options.use_scroll_link = true,
                "UseScrollSynch" => options.use_scroll_synch = true,
                _ => {}
            }
        }
        options
    }
}

/// Which list of tracks the page's channels bank over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TrackListMode {
    #[default]
    Tracks,
    Vca,
    Folder,
    SelectedTracks,
}

impl TrackListMode {
    /// Mode a zone switches the page into while it is active.
    pub fn for_zone(name: &str) -> Option<Self> {
        match name {
            "VCA" => Some(Self::Vca),
            "Folder" => Some(Self::Folder),
            "SelectedTracks" => Some(Self::SelectedTracks),
            _ => None,
        }
    }
}

/// Bank position over the DAW's track list for one page.
#[derive(Debug, Clone, Default)]
pub struct TrackNavigation {
    track_offset: usize,
    num_channels: usize,
    options: PageOptions,
    mode: TrackListMode,
    vca_offset: usize,
    folder_offset: usize,
    selected_offset: usize,
    /// Leader whose followers are spilled into the VCA list.
    vca_spill: Option<TrackId>,
    /// Folder whose children are spilled into the folder list.
    folder_spill: Option<TrackId>,
}

impl TrackNavigation {
    pub fn new(options: PageOptions) -> Self {
        Self { options, ..Default::default() }
    }

    pub fn options(&self) -> PageOptions {
        self.options
    }

    /// Offset into the full track list; shared across pages unless `NoSynchPages`.
    pub fn track_offset(&self) -> usize {
        self.track_offset
    }

    pub fn set_track_offset(&mut self, offset: usize) {
        self.track_offset = offset;
    }

    /// Widest surface on the page; banking stops once the last track is visible.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn set_num_channels(&mut self, channels: usize) {
        self.num_channels = self.num_channels.max(channels);
    }

    pub fn mode(&self) -> TrackListMode {
        self.mode
    }

    pub fn vca_spill(&self) -> Option<TrackId> {
        self.vca_spill
    }

    pub fn folder_spill(&self) -> Option<TrackId> {
        self.folder_spill
    }

    pub fn enter_mode(&mut self, mode: TrackListMode) {
        log::debug!(target: "zone", "track list mode {:?}", mode);
        self.mode = mode;
    }

    /// Returns to the full track list unless another mode took over meanwhile.
    pub fn leave_mode(&mut self, mode: TrackListMode) {
        if self.mode == mode {
            self.enter_mode(TrackListMode::Tracks);
        }
    }

    /// Spills or collapses the followers of a VCA leader.
    pub fn toggle_vca_spill(&mut self, track: TrackId, daw: &dyn Daw) {
        if self.mode != TrackListMode::Vca || !daw.is_vca_leader(track) {
            return;
        }
        self.vca_spill = if self.vca_spill == Some(track) { None } else { Some(track) };
        self.vca_offset = 0;
    }

    /// Spills or collapses the children of a folder track.
    pub fn toggle_folder_spill(&mut self, track: TrackId, daw: &dyn Daw) {
        if self.mode != TrackListMode::Folder || !daw.is_folder(track) {
            return;
        }
        self.folder_spill = if self.folder_spill == Some(track) { None } else { Some(track) };
        self.folder_offset = 0;
    }

    /// Tracks the channels bank over in the current mode.
    fn mode_tracks(&self, daw: &dyn Daw) -> Vec<TrackId> {
        match self.mode {
            TrackListMode::Tracks => (1..=daw.track_count()).filter_map(|n| daw.track(n)).collect(),
            TrackListMode::Vca => match self.vca_spill {
                Some(leader) => std::iter::once(leader).chain(daw.vca_followers(leader)).collect(),
                None => daw.vca_leaders(),
            },
            TrackListMode::Folder => match self.folder_spill {
                Some(parent) => std::iter::once(parent).chain(daw.folder_children(Some(parent))).collect(),
                None => daw.folder_children(None),
            },
            TrackListMode::SelectedTracks => daw.selected_tracks(),
        }
    }

    fn mode_offset(&mut self) -> &mut usize {
        match self.mode {
            TrackListMode::Tracks => &mut self.track_offset,
            TrackListMode::Vca => &mut self.vca_offset,
            TrackListMode::Folder => &mut self.folder_offset,
            TrackListMode::SelectedTracks => &mut self.selected_offset,
        }
    }

    fn current_offset(&self) -> usize {
        match self.mode {
            TrackListMode::Tracks => self.track_offset,
            TrackListMode::Vca => self.vca_offset,
            TrackListMode::Folder => self.folder_offset,
            TrackListMode::SelectedTracks => self.selected_offset,
        }
    }

    /// Moves the current list's bank by `amount` tracks, keeping a full bank in view.
    pub fn adjust_bank(&mut self, amount: i32, daw: &dyn Daw) {
        let track_count = match self.mode {
            TrackListMode::Tracks => daw.track_count(),
            _ => self.mode_tracks(daw).len(),
        };
        let num_channels = self.num_channels;
        let offset = self.mode_offset();
        if track_count <= num_channels {
            *offset = 0;
            return;
        }
        let top = track_count - num_channels;
        *offset = (*offset).saturating_add_signed(amount as isize).min(top);
        log::debug!(target: "zone", "{:?} bank offset {}", self.mode, self.current_offset());
    }

    /// Scrolls the bank so the selected track is visible, when following the DAW.
    pub fn follow_selection(&mut self, daw: &dyn Daw) {
        if !self.options.follow_tcp || self.num_channels == 0 || self.mode != TrackListMode::Tracks {
            return;
        }
        let Some(selected) = daw.selected_track() else { return };
        let number = daw.track_number(selected);
        if number == 0 {
            return;
        }
        let index = number - 1;
        if index < self.track_offset {
            self.track_offset = index;
        } else if index >= self.track_offset + self.num_channels {
            self.track_offset = index + 1 - self.num_channels;
        }
    }

    /// Track a channel on this page currently shows.
    pub fn channel_track(&self, channel: usize, daw: &dyn Daw) -> Option<TrackId> {
        if self.mode != TrackListMode::Tracks {
            return self.mode_tracks(daw).get(self.current_offset() + channel).copied();
        }
        let number = self.track_offset + channel + 1;
        if number > daw.track_count() {
            return None;
        }
        daw.track(number)
    }

    pub fn resolve(&self, navigator: Navigator, daw: &dyn Daw) -> Option<TrackId> {
        match navigator {
            Navigator::Track(channel) => self.channel_track(channel, daw),
            Navigator::MasterTrack => daw.track(0),
            Navigator::SelectedTrack => daw.selected_track(),
            Navigator::FocusedFx => {
                let focused = daw.focused_fx();
                if focused.state & 1 == 0 {
                    return None;
                }
                daw.track(focused.track_number)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daw::{FocusedFx, OfflineDaw};

    fn daw_with_tracks(n: usize) -> OfflineDaw {
        let mut daw = OfflineDaw::new();
        for i in 0..n {
            daw.add_track(&format!("Track {}", i + 1));
        }
        daw
    }

    #[test]
    fn test_page_options_parse() {
        let o = PageOptions::parse(&["FollowTCP", "NoSynchPages", "Bogus"]);
        assert!(o.follow_tcp && o.no_synch_pages);
        assert!(!o.use_scroll_link);
    }

    #[test]
    fn test_adjust_bank_clamps() {
        let daw = daw_with_tracks(10);
        let mut nav = TrackNavigation::new(PageOptions::default());
        nav.set_num_channels(8);
        nav.adjust_bank(8, &daw);
        assert_eq!(nav.track_offset(), 2);
        nav.adjust_bank(-5, &daw);
        assert_eq!(nav.track_offset(), 0);
    }

    #[test]
    fn test_resolve_navigators() {
        let mut daw = daw_with_tracks(3);
        let nav = TrackNavigation::new(PageOptions::default());
        assert_eq!(nav.resolve(Navigator::Track(0), &daw), daw.track(1));
        assert_eq!(nav.resolve(Navigator::Track(3), &daw), None);
        assert_eq!(nav.resolve(Navigator::MasterTrack, &daw), Some(TrackId::MASTER));
        assert_eq!(nav.resolve(Navigator::FocusedFx, &daw), None);
        daw.set_focused_fx(FocusedFx { state: 1, track_number: 2, fx_index: 0 });
        assert_eq!(nav.resolve(Navigator::FocusedFx, &daw), daw.track(2));
    }

    #[test]
    fn test_selected_tracks_mode_banks_over_selection() {
        let mut daw = daw_with_tracks(6);
        for n in [2, 4, 5] {
            let t = daw.track(n).unwrap();
            daw.set_track_selected(t, true);
        }
        let mut nav = TrackNavigation::new(PageOptions::default());
        nav.set_num_channels(2);
        nav.enter_mode(TrackListMode::SelectedTracks);
        assert_eq!(nav.channel_track(0, &daw), daw.track(2));
        assert_eq!(nav.channel_track(1, &daw), daw.track(4));
        nav.adjust_bank(5, &daw);
        assert_eq!(nav.channel_track(1, &daw), daw.track(5));
        assert_eq!(nav.track_offset(), 0);

        nav.leave_mode(TrackListMode::Vca);
        assert_eq!(nav.mode(), TrackListMode::SelectedTracks);
        nav.leave_mode(TrackListMode::SelectedTracks);
        assert_eq!(nav.channel_track(0, &daw), daw.track(1));
    }

    #[test]
    fn test_vca_spill_lists_leader_then_followers() {
        let mut daw = daw_with_tracks(4);
        let (lead, a, b) = (daw.track(1).unwrap(), daw.track(2).unwrap(), daw.track(3).unwrap());
        let other = daw.track(4).unwrap();
        daw.set_vca_group(lead, &[a, b]);
        daw.set_vca_group(other, &[]);
        let mut nav = TrackNavigation::new(PageOptions::default());
        nav.set_num_channels(3);

        nav.toggle_vca_spill(lead, &daw);
        assert_eq!(nav.vca_spill(), None);

        nav.enter_mode(TrackListMode::Vca);
        assert_eq!(nav.channel_track(1, &daw), Some(other));
        nav.toggle_vca_spill(a, &daw);
        assert_eq!(nav.vca_spill(), None);
        nav.toggle_vca_spill(lead, &daw);
        assert_eq!(
            (0..3).map(|c| nav.channel_track(c, &daw)).collect::<Vec<_>>(),
            vec![Some(lead), Some(a), Some(b)]
        );
        nav.toggle_vca_spill(lead, &daw);
        assert_eq!(nav.channel_track(2, &daw), None);
    }

    #[test]
    fn test_folder_spill_lists_children() {
        let mut daw = daw_with_tracks(4);
        let (bus, kick, snare) = (daw.track(1).unwrap(), daw.track(2).unwrap(), daw.track(3).unwrap());
        daw.set_folder_parent(kick, bus);
        daw.set_folder_parent(snare, bus);
        let mut nav = TrackNavigation::new(PageOptions::default());
        nav.set_num_channels(8);
        nav.enter_mode(TrackListMode::Folder);
        assert_eq!(nav.channel_track(1, &daw), daw.track(4));
        nav.toggle_folder_spill(bus, &daw);
        assert_eq!(nav.folder_spill(), Some(bus));
        assert_eq!(nav.channel_track(2, &daw), Some(snare));
        assert_eq!(TrackListMode::for_zone("Folder"), Some(TrackListMode::Folder));
        assert_eq!(TrackListMode::for_zone("Track"), None);
    }

    #[test]
    fn test_follow_selection_scrolls() {
        let mut daw = daw_with_tracks(12);
        let mut nav = TrackNavigation::new(PageOptions { follow_tcp: true, ..Default::default() });
        nav.set_num_channels(8);
        let t10 = daw.track(10).unwrap();
        daw.select_track(t10);
        nav.follow_selection(&daw);
        assert_eq!(nav.track_offset(), 2);
    }
}
