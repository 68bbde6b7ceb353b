use crate::i18n::Notice;
use crate::models::{BrowseOptions, DisplayMode, Station};
use crate::pagination::Pager;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Loading,
    Playing,
    Paused,
    Error,
}

/// Browsing and playback state, free of any I/O.
#[derive(Debug, Clone)]
pub struct Session {
    pub stations: Vec<Station>,
    pub display_mode: DisplayMode,
    pub pager: Pager,
    pub browse: BrowseOptions,
    pub current: Option<Station>,
    pub phase: PlaybackPhase,
    pub loading: bool,
    pub notice: Option<Notice>,
    default_limit: u32,
}

impl Session {
    pub fn new(items_per_page: usize, limit: u32) -> Self {
        Self {
            stations: vec![],
            display_mode: DisplayMode::All,
            pager: Pager::new(items_per_page),
            browse: BrowseOptions {
                limit,
                ..Default::default()
            },
            current: None,
            phase: PlaybackPhase::Idle,
            loading: false,
            notice: None,
            default_limit: limit,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }

    pub fn set_stations(&mut self, stations: Vec<Station>) {
        self.stations = stations;
        self.pager.reset();
    }

    /// What the user currently sees: every favorite, or one page of the station list.
    pub fn visible<'a>(&'a self, favorites: &'a [Station]) -> &'a [Station] {
        match self.display_mode {
            DisplayMode::Favorites => favorites,
            _ => self.pager.slice(&self.stations),
        }
    }

    pub fn has_more(&self) -> bool {
        self.display_mode != DisplayMode::Favorites && self.pager.has_more(self.stations.len())
    }

    pub fn total_pages(&self) -> usize {
        self.pager.total_pages(self.stations.len())
    }

    pub fn next_page(&mut self) -> bool {
        self.pager.next(self.stations.len())
    }

    pub fn previous_page(&mut self) -> bool {
        self.pager.previous()
    }

    pub fn set_items_per_page(&mut self, n: usize) {
        self.pager.set_items_per_page(n, self.stations.len());
    }

    fn current_index(&self) -> Option<usize> {
        let current = self.current.as_ref()?;
        self.stations
            .iter()
            .position(|s| s.stationuuid == current.stationuuid)
    }

    /// Station after the current one, wrapping to the first.
    pub fn next_station(&self) -> Option<&Station> {
        if self.stations.is_empty() || self.current.is_none() {
            return None;
        }
        let next = match self.current_index() {
            Some(i) => (i + 1) % self.stations.len(),
            None => 0,
        };
        self.stations.get(next)
    }

    /// Station before the current one, wrapping to the last.
    pub fn previous_station(&self) -> Option<&Station> {
        if self.stations.is_empty() || self.current.is_none() {
            return None;
        }
        let last = self.stations.len() - 1;
        let prev = match self.current_index() {
            Some(0) | None => last,
            Some(i) => i - 1,
        };
        self.stations.get(prev)
    }

    pub fn random_station<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Station> {
        if self.stations.is_empty() {
            return None;
        }
        self.stations.get(rng.gen_range(0..self.stations.len()))
    }

    pub fn apply_dislikes(&mut self, disliked: &[Station]) {
        self.stations
            .retain(|s| !disliked.iter().any(|d| d.stationuuid == s.stationuuid));
        self.pager.reset();
    }

    pub fn reset_to_defaults(&mut self) {
        self.browse = BrowseOptions {
            limit: self.default_limit,
            ..Default::default()
        };
        self.current = None;
        self.pager.reset();
    }
}
