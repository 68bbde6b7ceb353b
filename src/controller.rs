use crate::config::AppConfig;
use crate::filters::sanitize_browse;
use crate::i18n::{Language, Notice};
use crate::library::Library;
use crate::models::{BrowseOptions, DisplayMode, SearchFilters, Station, User, ALL_GENRES};
use crate::mpv::{MpvCommand, MpvEvent, MpvProcess};
use crate::radio_browser::{self, parse_stream_url, RadioBrowserClient};
use crate::session::{PlaybackPhase, Session};
use crate::storage::{Storage, StorageKey};
use crate::user::{AccountError, Accounts};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub phase: PlaybackPhase,
    pub station: Option<Station>,
    pub media_title: Option<String>,
    pub notice: Option<String>,
    pub loading: bool,
    pub display_mode: DisplayMode,
    pub browse: BrowseOptions,
    pub visible: Vec<Station>,
    pub page: usize,
    pub total_pages: usize,
    pub has_more: bool,
    pub station_count: usize,
    pub favorites: Vec<Station>,
    pub disliked: Vec<Station>,
    pub user: Option<User>,
    pub volume: u8,
    pub language: Language,
}

impl ControllerState {
    pub fn label_text(&self) -> String {
        if let Some(st) = &self.station {
            let name = st.name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }

        if let Some(t) = self.media_title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return t.to_string();
        }

        "radio".to_string()
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.iter().any(|s| s.stationuuid == id)
    }
}

#[derive(Debug, Clone)]
pub enum UiCommand {
    ShowAll,
    ShowGenre(String),
    ShowTopVoted,
    ShowFavorites,
    SearchByName(String),
    SearchByFilters(SearchFilters),
    NextPage,
    PreviousPage,
    SetItemsPerPage(usize),
    SetBrowseOptions(BrowseOptions),
    ResetToDefaults,
    Play(Station),
    TogglePause,
    Stop,
    NextStation,
    PreviousStation,
    RandomStation,
    Like,
    DeleteFavorite(String),
    ToggleDislike(Station),
    SetVolume(u8),
    SetLanguage(Language),
    Register {
        username: String,
        email: String,
        password: String,
        confirm: String,
    },
    Login {
        username: String,
        password: String,
    },
    Logout,
    Shutdown,
}

pub struct ControllerHandle {
    pub cmd_tx: mpsc::UnboundedSender<UiCommand>,
    pub state_rx: watch::Receiver<ControllerState>,
    _thread: Option<std::thread::JoinHandle<()>>,
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(UiCommand::Shutdown);
        if let Some(t) = self._thread.take() {
            let _ = t.join();
        }
    }
}

pub fn start_controller(config: AppConfig, config_path: PathBuf) -> Result<ControllerHandle> {
    let storage = Storage::open(config.data_dir()?)?;
    let library = Library::load(&storage).context("Failed to load favorites")?;
    let accounts = Accounts::load(storage.clone()).context("Failed to load user")?;
    let last_server: Option<String> = storage.load(StorageKey::LastServer).unwrap_or_else(|e| {
        warn!(error = ?e, "ignoring unreadable last server");
        None
    });
    let last_played: Option<Station> = storage.load(StorageKey::LastPlayedStation).unwrap_or_else(|e| {
        warn!(error = ?e, "ignoring unreadable last played station");
        None
    });
    let rb = RadioBrowserClient::new(config.mirrors.clone(), &config.user_agent, last_server)?;
    let socket_path = crate::mpv::socket_path()?;

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(initial_state(&config, &library, &accounts));

    let thread = std::thread::Builder::new()
        .name("controller".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    warn!(error = ?e, "failed to build controller runtime");
                    return;
                }
            };
            rt.block_on(async move {
                let (mpv, mpv_events) = MpvProcess::spawn(socket_path);
                let parts = Parts {
                    config,
                    config_path,
                    storage,
                    library,
                    accounts,
                    rb,
                    mpv,
                };
                let (mut ctl, internal_rx) = Controller::new(parts);
                ctl.startup(last_played);
                let _ = state_tx.send(ctl.snapshot());
                if let Err(e) = controller_main(ctl, cmd_rx, mpv_events, internal_rx, state_tx).await {
                    warn!(error = ?e, "controller exited with error");
                }
            });
        })
        .context("Failed to spawn controller thread")?;

    Ok(ControllerHandle {
        cmd_tx,
        state_rx,
        _thread: Some(thread),
    })
}

fn initial_state(config: &AppConfig, library: &Library, accounts: &Accounts) -> ControllerState {
    ControllerState {
        phase: PlaybackPhase::Idle,
        station: None,
        media_title: None,
        notice: None,
        loading: true,
        display_mode: DisplayMode::All,
        browse: BrowseOptions {
            limit: config.limit,
            ..Default::default()
        },
        visible: vec![],
        page: 0,
        total_pages: 0,
        has_more: false,
        station_count: 0,
        favorites: library.favorites.clone(),
        disliked: library.disliked.clone(),
        user: accounts.user().cloned(),
        volume: config.volume,
        language: config.language,
    }
}

async fn controller_main(
    mut ctl: Controller,
    mut cmd_rx: mpsc::UnboundedReceiver<UiCommand>,
    mut mpv_events: mpsc::UnboundedReceiver<MpvEvent>,
    mut internal_rx: mpsc::UnboundedReceiver<InternalMsg>,
    state_tx: watch::Sender<ControllerState>,
) -> Result<()> {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    ctl.handle_command(UiCommand::Shutdown);
                    break;
                };
                if !ctl.handle_command(cmd) {
                    break;
                }
            }
            ev = mpv_events.recv() => {
                let Some(ev) = ev else {
                    ctl.session.phase = PlaybackPhase::Error;
                    ctl.session.notice = Some(Notice::PlaybackControlFailed);
                    let _ = state_tx.send(ctl.snapshot());
                    break;
                };
                ctl.handle_mpv(ev);
            }
            Some(msg) = internal_rx.recv() => {
                ctl.handle_internal(msg);
            }
        }
        state_tx.send_if_modified(|state| {
            let next = ctl.snapshot();
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
    ctl.finish_writes().await;
    Ok(())
}

type PersistJob = Box<dyn FnOnce() -> Result<()> + Send>;

/// Runs persistence jobs one at a time so writes land in the order they were made.
fn spawn_writer() -> (mpsc::UnboundedSender<PersistJob>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<PersistJob>();
    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match tokio::task::spawn_blocking(job).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = ?e, "failed to persist"),
                Err(e) => warn!(error = ?e, "persist task panicked"),
            }
        }
    });
    (tx, handle)
}

#[derive(Debug, Clone)]
enum FetchKind {
    Browse(BrowseOptions),
    TopVoted(u32),
    SearchByName(String),
    SearchByFilters(SearchFilters),
}

#[derive(Debug)]
enum InternalMsg {
    FetchDone {
        generation: u64,
        kind: FetchKind,
        res: radio_browser::Result<Vec<Station>>,
        last_server: Option<String>,
    },
    LoadTimeout {
        generation: u64,
    },
}

struct Parts {
    config: AppConfig,
    config_path: PathBuf,
    storage: Storage,
    library: Library,
    accounts: Accounts,
    rb: RadioBrowserClient,
    mpv: MpvProcess,
}

struct Controller {
    config: AppConfig,
    config_path: PathBuf,
    storage: Storage,
    library: Library,
    accounts: Accounts,
    session: Session,
    rb: RadioBrowserClient,
    mpv: MpvProcess,
    mpv_ready: bool,
    internal_tx: mpsc::UnboundedSender<InternalMsg>,
    persist_tx: mpsc::UnboundedSender<PersistJob>,
    writer: JoinHandle<()>,
    fetch_generation: u64,
    play_generation: u64,
    loaded_url: Option<String>,
    stream_started: bool,
    want_paused: bool,
    media_title: Option<String>,
    /// Last unfiltered browse list, shown again when a search is cleared.
    all_stations: Option<Vec<Station>>,
}

impl Controller {
    fn new(parts: Parts) -> (Self, mpsc::UnboundedReceiver<InternalMsg>) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (persist_tx, writer) = spawn_writer();
        let session = Session::new(parts.config.items_per_page, parts.config.limit);
        let ctl = Self {
            config: parts.config,
            config_path: parts.config_path,
            storage: parts.storage,
            library: parts.library,
            accounts: parts.accounts,
            session,
            rb: parts.rb,
            mpv: parts.mpv,
            mpv_ready: false,
            internal_tx,
            persist_tx,
            writer,
            fetch_generation: 0,
            play_generation: 0,
            loaded_url: None,
            stream_started: false,
            want_paused: false,
            media_title: None,
            all_stations: None,
        };
        (ctl, internal_rx)
    }

    /// Restores the last played station without autoplay and loads the full list.
    fn startup(&mut self, last_played: Option<Station>) {
        if let Some(station) = last_played {
            info!(stationuuid = %station.stationuuid, "restoring last played station");
            let url = station
                .stream_url()
                .and_then(|u| parse_stream_url(u).ok())
                .map(|u| u.to_string());
            self.session.current = Some(station);
            if let Some(url) = url {
                self.start_stream(url, true);
            }
        }
        self.show(DisplayMode::All);
    }

    fn snapshot(&self) -> ControllerState {
        let lang = self.config.language;
        ControllerState {
            phase: self.session.phase,
            station: self.session.current.clone(),
            media_title: self.media_title.clone(),
            notice: self.session.notice.map(|n| n.text(lang).to_string()),
            loading: self.session.loading,
            display_mode: self.session.display_mode.clone(),
            browse: self.session.browse.clone(),
            visible: self.session.visible(&self.library.favorites).to_vec(),
            page: self.session.pager.page(),
            total_pages: self.session.total_pages(),
            has_more: self.session.has_more(),
            station_count: self.session.stations.len(),
            favorites: self.library.favorites.clone(),
            disliked: self.library.disliked.clone(),
            user: self.accounts.user().cloned(),
            volume: self.config.volume,
            language: lang,
        }
    }

    /// Returns false once the controller should exit.
    fn handle_command(&mut self, cmd: UiCommand) -> bool {
        match cmd {
            UiCommand::ShowAll => self.show(DisplayMode::All),
            UiCommand::ShowGenre(tag) => {
                let tag = tag.trim().to_string();
                if tag.is_empty() || tag == ALL_GENRES {
                    self.show(DisplayMode::All);
                } else {
                    self.show(DisplayMode::Genre(tag));
                }
            }
            UiCommand::ShowTopVoted => self.show(DisplayMode::TopVoted),
            UiCommand::ShowFavorites => self.show(DisplayMode::Favorites),
            UiCommand::SearchByName(text) => {
                if text.trim().is_empty() {
                    match self.all_stations.clone() {
                        Some(stations) => {
                            self.fetch_generation += 1;
                            self.session.loading = false;
                            self.session.notice = None;
                            self.session.display_mode = DisplayMode::All;
                            self.session.set_stations(stations);
                        }
                        None => self.show(DisplayMode::All),
                    }
                } else {
                    self.spawn_fetch(FetchKind::SearchByName(text));
                }
            }
            UiCommand::SearchByFilters(filters) => {
                self.spawn_fetch(FetchKind::SearchByFilters(filters.normalized()));
            }
            UiCommand::NextPage => {
                self.session.next_page();
            }
            UiCommand::PreviousPage => {
                self.session.previous_page();
            }
            UiCommand::SetItemsPerPage(n) => self.session.set_items_per_page(n),
            UiCommand::SetBrowseOptions(opts) => {
                let genre = opts.genre.trim().to_string();
                self.session.browse = opts;
                if genre.is_empty() || genre == ALL_GENRES {
                    self.show(DisplayMode::All);
                } else {
                    self.show(DisplayMode::Genre(genre));
                }
            }
            UiCommand::ResetToDefaults => {
                self.stop_playback();
                self.session.reset_to_defaults();
                self.show(DisplayMode::All);
            }
            UiCommand::Play(station) => self.play(station),
            UiCommand::TogglePause => self.toggle_pause(),
            UiCommand::Stop => self.stop_playback(),
            UiCommand::NextStation => {
                if let Some(next) = self.session.next_station().cloned() {
                    self.play(next);
                }
            }
            UiCommand::PreviousStation => {
                if let Some(prev) = self.session.previous_station().cloned() {
                    self.play(prev);
                }
            }
            UiCommand::RandomStation => {
                let pick = self.session.random_station(&mut rand::thread_rng()).cloned();
                match pick {
                    Some(station) => {
                        info!(name = %station.name, "playing random station");
                        self.play(station);
                        self.show(DisplayMode::All);
                    }
                    None => self.session.notice = Some(Notice::NoStationsAvailable),
                }
            }
            UiCommand::Like => {
                if let Some(current) = self.session.current.clone() {
                    if self.library.like(&current) {
                        info!(name = %current.name, "added to favorites");
                        self.persist_library();
                    }
                }
            }
            UiCommand::DeleteFavorite(id) => {
                if self.library.delete_favorite(&id) {
                    self.persist_library();
                }
            }
            UiCommand::ToggleDislike(station) => {
                let disliked = self.library.toggle_dislike(&station);
                debug!(stationuuid = %station.stationuuid, disliked, "dislike toggled");
                self.session.apply_dislikes(&self.library.disliked);
                if let Some(all) = self.all_stations.as_mut() {
                    all.retain(|s| !self.library.is_disliked(&s.stationuuid));
                }
                self.persist_library();
            }
            UiCommand::SetVolume(v) => {
                let v = v.min(100);
                self.config.volume = v;
                if self.mpv_ready {
                    if let Err(e) = self.mpv.command(MpvCommand::SetVolume(v)) {
                        debug!(error = %e, "volume not applied");
                    }
                }
                self.persist_config();
            }
            UiCommand::SetLanguage(lang) => {
                self.config.language = lang;
                self.persist_config();
            }
            UiCommand::Register {
                username,
                email,
                password,
                confirm,
            } => {
                let notice = match self.accounts.register(&username, &email, &password, &confirm) {
                    Ok(user) => {
                        info!(username = %user.username, "registered");
                        Notice::RegistrationSuccessful
                    }
                    Err(AccountError::MissingFields) => Notice::MissingFields,
                    Err(AccountError::PasswordMismatch) => Notice::PasswordMismatch,
                    Err(e) => {
                        warn!(error = %e, "registration failed");
                        Notice::RegistrationFailed
                    }
                };
                self.session.notice = Some(notice);
            }
            UiCommand::Login { username, password } => {
                let notice = match self.accounts.login(&username, &password) {
                    Ok(_) => Notice::LoginSuccessful,
                    Err(AccountError::MissingCredentials) => Notice::MissingCredentials,
                    Err(e) => {
                        warn!(error = %e, "login failed");
                        Notice::InvalidCredentials
                    }
                };
                self.session.notice = Some(notice);
            }
            UiCommand::Logout => {
                if !self.accounts.is_authenticated() {
                    return true;
                }
                if let Err(e) = self.accounts.logout() {
                    warn!(error = ?e, "failed to clear active user");
                }
            }
            UiCommand::Shutdown => {
                let _ = self.mpv.command(MpvCommand::Shutdown);
                return false;
            }
        }
        true
    }

    fn show(&mut self, mode: DisplayMode) {
        info!(mode = %mode.label(), "changing display mode");
        self.session.display_mode = mode.clone();
        match mode {
            DisplayMode::All => {
                self.session.browse.genre = ALL_GENRES.to_string();
                self.spawn_fetch(FetchKind::Browse(self.session.browse.clone()));
            }
            DisplayMode::Genre(tag) => {
                self.session.browse.genre = tag;
                self.spawn_fetch(FetchKind::Browse(self.session.browse.clone()));
            }
            DisplayMode::TopVoted => self.spawn_fetch(FetchKind::TopVoted(self.config.top_vote_count)),
            DisplayMode::Favorites | DisplayMode::Search => self.session.notice = None,
        }
    }

    fn spawn_fetch(&mut self, kind: FetchKind) {
        self.fetch_generation += 1;
        let generation = self.fetch_generation;
        self.session.loading = true;
        self.session.notice = None;

        let mut client = self.rb.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let res = match &kind {
                FetchKind::Browse(opts) => client.browse(opts).await,
                FetchKind::TopVoted(n) => client.top_voted(*n).await,
                FetchKind::SearchByName(q) => client.search_by_name(q).await,
                FetchKind::SearchByFilters(f) => client.search_by_filters(f).await,
            };
            let last_server = client.last_server().map(str::to_string);
            let _ = tx.send(InternalMsg::FetchDone {
                generation,
                kind,
                res,
                last_server,
            });
        });
    }

    fn handle_internal(&mut self, msg: InternalMsg) {
        match msg {
            InternalMsg::FetchDone {
                generation,
                kind,
                res,
                last_server,
            } => {
                if last_server.is_some() && last_server.as_deref() != self.rb.last_server() {
                    self.rb.set_last_server(last_server.clone());
                    let storage = self.storage.clone();
                    self.persist(move || storage.save(StorageKey::LastServer, &last_server));
                }
                if generation != self.fetch_generation {
                    debug!(generation, "dropping stale fetch result");
                    return;
                }
                self.session.loading = false;
                self.apply_fetch(kind, res);
            }
            InternalMsg::LoadTimeout { generation } => {
                if generation == self.play_generation && self.session.phase == PlaybackPhase::Loading {
                    warn!("stream did not start in time");
                    let _ = self.mpv.command(MpvCommand::Stop);
                    self.loaded_url = None;
                    self.session.phase = PlaybackPhase::Error;
                    self.session.notice = Some(Notice::CannotPlay);
                }
            }
        }
    }

    fn apply_fetch(&mut self, kind: FetchKind, res: radio_browser::Result<Vec<Station>>) {
        match (kind, res) {
            (FetchKind::Browse(opts), Ok(raw)) => {
                let stations = sanitize_browse(raw, &self.library.disliked);
                info!(count = stations.len(), "stations loaded");
                if opts.genre == ALL_GENRES {
                    self.all_stations = Some(stations.clone());
                }
                self.session.set_stations(stations);
            }
            (FetchKind::TopVoted(_), Ok(stations)) => {
                info!(count = stations.len(), "top voted stations loaded");
                self.session.set_stations(stations);
            }
            (FetchKind::SearchByName(_) | FetchKind::SearchByFilters(_), Ok(stations)) => {
                info!(count = stations.len(), "search results loaded");
                self.session.set_stations(stations);
                self.session.display_mode = DisplayMode::Search;
            }
            (FetchKind::Browse(_), Err(e)) => {
                warn!(error = %e, "failed to fetch stations");
                self.session.notice = Some(Notice::FetchStationsFailed);
            }
            (FetchKind::TopVoted(_), Err(e)) => {
                warn!(error = %e, "failed to fetch top stations");
                self.session.notice = Some(Notice::FetchTopStationsFailed);
            }
            (FetchKind::SearchByName(_), Err(e)) => {
                warn!(error = %e, "search failed");
                self.session.set_stations(vec![]);
                self.session.notice = Some(Notice::NoSearchMatches);
            }
            (FetchKind::SearchByFilters(_), Err(e)) => {
                warn!(error = %e, "filter search failed");
                self.session.set_stations(vec![]);
                self.session.notice = Some(Notice::NoFilterMatches);
            }
        }
    }

    fn play(&mut self, station: Station) {
        if self.session.phase == PlaybackPhase::Loading {
            debug!(name = %station.name, "ignoring play while another station is loading");
            return;
        }
        if self.library.is_disliked(&station.stationuuid) {
            self.stop_playback();
            return;
        }

        let _ = self.mpv.command(MpvCommand::Stop);
        self.loaded_url = None;
        self.media_title = None;
        self.session.notice = None;

        let url = station
            .stream_url()
            .and_then(|u| parse_stream_url(u).ok())
            .map(|u| u.to_string());
        self.session.current = Some(station);
        match url {
            Some(url) => self.start_stream(url, false),
            None => {
                self.session.phase = PlaybackPhase::Idle;
                self.session.notice = Some(Notice::NoStreamUrl);
            }
        }
    }

    /// A paused start preloads the stream without autoplay.
    fn start_stream(&mut self, url: String, paused: bool) {
        self.play_generation += 1;
        self.want_paused = paused;
        self.stream_started = false;
        self.loaded_url = Some(url.clone());

        if self.mpv_ready && self.send_load(&url, paused).is_err() {
            self.loaded_url = None;
            self.session.phase = PlaybackPhase::Error;
            self.session.notice = Some(Notice::CannotPlay);
            return;
        }

        if paused {
            self.session.phase = PlaybackPhase::Paused;
            return;
        }
        self.arm_load_timeout();
    }

    /// Waits for the current attempt to report `PlaybackStarted`.
    fn arm_load_timeout(&mut self) {
        self.session.phase = PlaybackPhase::Loading;

        let generation = self.play_generation;
        let timeout = Duration::from_secs(self.config.load_timeout_secs);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(InternalMsg::LoadTimeout { generation });
        });
    }

    fn send_load(&self, url: &str, paused: bool) -> Result<()> {
        self.mpv.command(MpvCommand::SetPause(paused))?;
        self.mpv.command(MpvCommand::LoadUrl { url: url.to_string() })
    }

    fn toggle_pause(&mut self) {
        let Some(current) = self.session.current.clone() else {
            return;
        };
        if self.session.phase == PlaybackPhase::Loading {
            debug!("ignoring pause while the stream is loading");
            return;
        }

        if self.session.is_playing() {
            if self.mpv.command(MpvCommand::SetPause(true)).is_err() {
                self.session.notice = Some(Notice::PlaybackControlFailed);
                self.session.phase = PlaybackPhase::Error;
                return;
            }
            self.want_paused = true;
            self.session.phase = PlaybackPhase::Paused;
            return;
        }

        if self.loaded_url.is_none() {
            match current.stream_url().and_then(|u| parse_stream_url(u).ok()) {
                Some(url) => self.start_stream(url.to_string(), false),
                None => self.session.notice = Some(Notice::CannotResume),
            }
            return;
        }

        if self.mpv.command(MpvCommand::SetPause(false)).is_err() {
            self.session.phase = PlaybackPhase::Error;
            self.session.notice = Some(Notice::CannotResume);
            return;
        }
        self.want_paused = false;
        self.session.notice = None;
        if self.stream_started {
            self.session.phase = PlaybackPhase::Playing;
        } else {
            self.arm_load_timeout();
        }
    }

    fn stop_playback(&mut self) {
        let _ = self.mpv.command(MpvCommand::Stop);
        self.loaded_url = None;
        self.stream_started = false;
        self.want_paused = false;
        self.media_title = None;
        self.session.phase = PlaybackPhase::Idle;
    }

    fn handle_mpv(&mut self, ev: MpvEvent) {
        match ev {
            MpvEvent::Ready => {
                self.mpv_ready = true;
                if let Err(e) = self.mpv.command(MpvCommand::SetVolume(self.config.volume)) {
                    debug!(error = %e, "volume not applied");
                }
                if let Some(url) = self.loaded_url.clone() {
                    if self.send_load(&url, self.want_paused).is_err() {
                        self.session.phase = PlaybackPhase::Error;
                        self.session.notice = Some(Notice::CannotPlay);
                    }
                }
            }
            MpvEvent::MediaTitle(t) => self.media_title = t,
            MpvEvent::Pause(p) => {
                self.want_paused = p;
                if self.loaded_url.is_some()
                    && matches!(self.session.phase, PlaybackPhase::Playing | PlaybackPhase::Paused)
                {
                    self.session.phase = if p { PlaybackPhase::Paused } else { PlaybackPhase::Playing };
                }
            }
            MpvEvent::PlaybackStarted => {
                if self.loaded_url.is_none() {
                    return;
                }
                self.stream_started = true;
                if self.want_paused {
                    self.session.phase = PlaybackPhase::Paused;
                    return;
                }
                let was_loading = self.session.phase == PlaybackPhase::Loading;
                self.session.phase = PlaybackPhase::Playing;
                self.session.notice = None;
                if was_loading {
                    if let Some(station) = self.session.current.clone() {
                        info!(stationuuid = %station.stationuuid, "playback started");
                        let storage = self.storage.clone();
                        self.persist(move || storage.save(StorageKey::LastPlayedStation, &station));
                    }
                }
            }
            MpvEvent::LoadFailed(why) => {
                warn!(error = %why, "stream failed");
                self.loaded_url = None;
                if self.session.phase == PlaybackPhase::Loading {
                    self.session.phase = PlaybackPhase::Error;
                    self.session.notice = Some(Notice::CannotPlay);
                } else {
                    self.session.phase = PlaybackPhase::Idle;
                }
            }
            MpvEvent::Crashed(e) => {
                warn!(error = %e, "mpv crashed/restarting");
                self.mpv_ready = false;
                if matches!(self.session.phase, PlaybackPhase::Loading | PlaybackPhase::Playing) {
                    self.session.phase = PlaybackPhase::Error;
                    self.session.notice = Some(Notice::PlaybackControlFailed);
                }
            }
        }
    }

    fn persist_library(&self) {
        let library = self.library.clone();
        let storage = self.storage.clone();
        self.persist(move || library.save(&storage));
    }

    fn persist_config(&self) {
        let config = self.config.clone();
        let path = self.config_path.clone();
        self.persist(move || config.save_atomic(&path));
    }

    fn persist<F>(&self, f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if self.persist_tx.send(Box::new(f)).is_err() {
            warn!("persistence writer is gone");
        }
    }

    /// Lets queued writes reach disk before the runtime goes away.
    async fn finish_writes(self) {
        let Controller {
            persist_tx, writer, ..
        } = self;
        drop(persist_tx);
        if let Err(e) = writer.await {
            warn!(error = ?e, "persistence writer failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        ctl: Controller,
        internal_rx: mpsc::UnboundedReceiver<InternalMsg>,
        mpv_rx: mpsc::UnboundedReceiver<MpvCommand>,
        _tmp: tempfile::TempDir,
    }

    impl Harness {
        fn new(mirrors: Vec<String>) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let config = AppConfig {
                mirrors: mirrors.clone(),
                items_per_page: 2,
                data_dir: Some(tmp.path().join("data")),
                ..Default::default()
            };
            let storage = Storage::open(config.data_dir().unwrap()).unwrap();
            let (mpv, mpv_rx) = MpvProcess::detached();
            let parts = Parts {
                rb: RadioBrowserClient::new(mirrors, &config.user_agent, None).unwrap(),
                config_path: tmp.path().join("config.toml"),
                library: Library::default(),
                accounts: Accounts::load(storage.clone()).unwrap(),
                storage,
                config,
                mpv,
            };
            let (mut ctl, internal_rx) = Controller::new(parts);
            ctl.mpv_ready = true;
            Self {
                ctl,
                internal_rx,
                mpv_rx,
                _tmp: tmp,
            }
        }

        async fn settle_fetch(&mut self) {
            let msg = self.internal_rx.recv().await.unwrap();
            self.ctl.handle_internal(msg);
        }

        /// Resolves once every write queued so far has been handled.
        async fn flush_writes(&self) {
            let (tx, rx) = tokio::sync::oneshot::channel();
            self.ctl.persist(move || {
                let _ = tx.send(());
                Ok(())
            });
            rx.await.unwrap();
        }

        fn drain_mpv(&mut self) -> Vec<MpvCommand> {
            let mut out = vec![];
            while let Ok(cmd) = self.mpv_rx.try_recv() {
                out.push(cmd);
            }
            out
        }
    }

    fn station(id: &str) -> Station {
        Station {
            stationuuid: id.into(),
            name: format!("Station {id}"),
            url: format!("http://stream.example/{id}"),
            url_resolved: format!("http://stream.example/{id}.mp3"),
            ..Default::default()
        }
    }

    fn station_json(id: &str) -> serde_json::Value {
        serde_json::to_value(station(id)).unwrap()
    }

    fn ids(stations: &[Station]) -> Vec<&str> {
        stations.iter().map(|s| s.stationuuid.as_str()).collect()
    }

    #[tokio::test]
    async fn browse_loads_sanitized_first_page() {
        let server = MockServer::start().await;
        let mut dup = station_json("dup");
        dup["name"] = json!("Station a");
        Mock::given(method("GET"))
            .and(path("/json/stations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                station_json("a"),
                dup,
                station_json("b"),
                station_json("c"),
            ])))
            .mount(&server)
            .await;

        let mut h = Harness::new(vec![server.uri()]);
        h.ctl.handle_command(UiCommand::ShowAll);
        assert!(h.ctl.snapshot().loading);
        h.settle_fetch().await;

        let snap = h.ctl.snapshot();
        assert!(!snap.loading);
        assert_eq!(snap.station_count, 3);
        assert_eq!(ids(&snap.visible), vec!["a", "b"]);
        assert!(snap.has_more);
        assert_eq!(snap.total_pages, 2);

        h.ctl.handle_command(UiCommand::NextPage);
        assert_eq!(ids(&h.ctl.snapshot().visible), vec!["c"]);
        h.ctl.handle_command(UiCommand::NextPage);
        assert_eq!(h.ctl.snapshot().page, 1);
    }

    #[tokio::test]
    async fn failed_browse_surfaces_translated_notice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut h = Harness::new(vec![server.uri()]);
        h.ctl.handle_command(UiCommand::SetLanguage(Language::De));
        h.ctl.handle_command(UiCommand::ShowGenre("jazz".into()));
        h.settle_fetch().await;

        let snap = h.ctl.snapshot();
        assert_eq!(snap.display_mode, DisplayMode::Genre("jazz".into()));
        assert_eq!(snap.notice.as_deref(), Some("Sender konnten nicht geladen werden"));
    }

    #[tokio::test]
    async fn stale_fetch_results_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/stations/topvote/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([station_json("top")])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/json/stations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([station_json("found")])))
            .mount(&server)
            .await;

        let mut h = Harness::new(vec![server.uri()]);
        h.ctl.handle_command(UiCommand::ShowTopVoted);
        h.ctl.handle_command(UiCommand::SearchByName("found".into()));
        h.settle_fetch().await;
        h.settle_fetch().await;

        let snap = h.ctl.snapshot();
        assert_eq!(snap.display_mode, DisplayMode::Search);
        assert_eq!(ids(&snap.visible), vec!["found"]);
    }

    #[tokio::test]
    async fn search_miss_clears_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let mut h = Harness::new(vec![server.uri()]);
        h.ctl.session.set_stations(vec![station("old")]);
        h.ctl.handle_command(UiCommand::SearchByName("nothing".into()));
        h.settle_fetch().await;

        let snap = h.ctl.snapshot();
        assert_eq!(snap.station_count, 0);
        assert_eq!(snap.notice.as_deref(), Some("No stations found matching your search"));
    }

    #[tokio::test]
    async fn blank_search_restores_all_stations_without_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/stations/search"))
            .and(query_param("name", "hit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([station_json("hit")])))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/json/stations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                station_json("a"),
                station_json("b"),
            ])))
            .mount(&server)
            .await;

        let mut h = Harness::new(vec![server.uri()]);
        h.ctl.handle_command(UiCommand::ShowAll);
        h.settle_fetch().await;
        h.ctl.handle_command(UiCommand::SearchByName("hit".into()));
        h.settle_fetch().await;
        assert_eq!(ids(&h.ctl.snapshot().visible), vec!["hit"]);

        h.ctl.handle_command(UiCommand::SearchByName("   ".into()));
        let snap = h.ctl.snapshot();
        assert_eq!(snap.display_mode, DisplayMode::All);
        assert_eq!(ids(&snap.visible), vec!["a", "b"]);
        assert!(!snap.loading);
        assert!(h.internal_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn blank_search_without_cached_list_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/stations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([station_json("a")])))
            .mount(&server)
            .await;

        let mut h = Harness::new(vec![server.uri()]);
        h.ctl.session.display_mode = DisplayMode::Search;
        h.ctl.session.set_stations(vec![station("hit")]);
        h.ctl.handle_command(UiCommand::SearchByName("".into()));
        assert!(h.ctl.session.loading);
        h.settle_fetch().await;
        assert_eq!(ids(&h.ctl.snapshot().visible), vec!["a"]);
    }

    #[tokio::test]
    async fn slow_superseded_fetch_does_not_block_the_next_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/stations/topvote/5"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([station_json("top")]))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/json/stations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([station_json("hit")])))
            .mount(&server)
            .await;

        let mut h = Harness::new(vec![server.uri()]);
        h.ctl.handle_command(UiCommand::ShowTopVoted);
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.ctl.handle_command(UiCommand::SearchByName("hit".into()));

        let msg = tokio::time::timeout(Duration::from_secs(1), h.internal_rx.recv())
            .await
            .expect("search result held up by the slow fetch")
            .unwrap();
        h.ctl.handle_internal(msg);
        let snap = h.ctl.snapshot();
        assert_eq!(snap.display_mode, DisplayMode::Search);
        assert_eq!(ids(&snap.visible), vec!["hit"]);
    }

    #[tokio::test]
    async fn play_loads_stream_and_confirms_on_start() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::Play(station("a")));
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Loading);
        assert_eq!(
            h.drain_mpv(),
            vec![
                MpvCommand::Stop,
                MpvCommand::SetPause(false),
                MpvCommand::LoadUrl {
                    url: "http://stream.example/a.mp3".into()
                },
            ]
        );

        // Another station is ignored until the first one starts.
        h.ctl.handle_command(UiCommand::Play(station("b")));
        assert_eq!(h.ctl.snapshot().station.unwrap().stationuuid, "a");

        h.ctl.handle_mpv(MpvEvent::PlaybackStarted);
        assert!(h.ctl.session.is_playing());
        assert!(h.ctl.snapshot().notice.is_none());
    }

    #[tokio::test]
    async fn load_failure_reports_cannot_play() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::Play(station("a")));
        h.ctl.handle_mpv(MpvEvent::LoadFailed("unrecognized file format".into()));
        let snap = h.ctl.snapshot();
        assert_eq!(snap.phase, PlaybackPhase::Error);
        assert_eq!(
            snap.notice.as_deref(),
            Some("Cannot play this station. Please try another one.")
        );
    }

    #[tokio::test]
    async fn load_timeout_only_hits_current_attempt() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::Play(station("a")));
        let generation = h.ctl.play_generation;
        h.ctl.handle_internal(InternalMsg::LoadTimeout {
            generation: generation - 1,
        });
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Loading);
        h.ctl.handle_internal(InternalMsg::LoadTimeout { generation });
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Error);
    }

    #[tokio::test]
    async fn pause_is_ignored_while_loading() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::Play(station("a")));
        h.drain_mpv();
        h.ctl.handle_command(UiCommand::TogglePause);
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Loading);
        assert!(h.drain_mpv().is_empty());

        let generation = h.ctl.play_generation;
        h.ctl.handle_internal(InternalMsg::LoadTimeout { generation });
        let snap = h.ctl.snapshot();
        assert_eq!(snap.phase, PlaybackPhase::Error);
        assert_eq!(
            snap.notice.as_deref(),
            Some("Cannot play this station. Please try another one.")
        );
    }

    #[tokio::test]
    async fn resuming_unstarted_preload_waits_for_playback() {
        let mut h = Harness::new(vec![]);
        h.ctl.startup(Some(station("last")));
        h.drain_mpv();

        h.ctl.handle_command(UiCommand::TogglePause);
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Loading);
        assert_eq!(h.drain_mpv(), vec![MpvCommand::SetPause(false)]);

        h.ctl.handle_mpv(MpvEvent::PlaybackStarted);
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Playing);
    }

    #[tokio::test]
    async fn station_without_stream_url() {
        let mut h = Harness::new(vec![]);
        let mut st = station("a");
        st.url.clear();
        st.url_resolved = "ftp://nope".into();
        h.ctl.handle_command(UiCommand::Play(st));
        let snap = h.ctl.snapshot();
        assert_eq!(snap.phase, PlaybackPhase::Idle);
        assert_eq!(snap.notice.as_deref(), Some("No valid stream URL found"));
    }

    #[tokio::test]
    async fn disliked_station_does_not_play() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::ToggleDislike(station("a")));
        h.drain_mpv();
        h.ctl.handle_command(UiCommand::Play(station("a")));
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Idle);
        assert_eq!(h.drain_mpv(), vec![MpvCommand::Stop]);
    }

    #[tokio::test]
    async fn toggle_pause_round_trip() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::TogglePause);
        assert!(h.drain_mpv().is_empty());

        h.ctl.handle_command(UiCommand::Play(station("a")));
        h.ctl.handle_mpv(MpvEvent::PlaybackStarted);
        h.drain_mpv();

        h.ctl.handle_command(UiCommand::TogglePause);
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Paused);
        h.ctl.handle_command(UiCommand::TogglePause);
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Playing);
        assert_eq!(
            h.drain_mpv(),
            vec![MpvCommand::SetPause(true), MpvCommand::SetPause(false)]
        );
    }

    #[tokio::test]
    async fn next_and_previous_wrap_around() {
        let mut h = Harness::new(vec![]);
        h.ctl
            .session
            .set_stations(vec![station("a"), station("b"), station("c")]);
        h.ctl.handle_command(UiCommand::Play(station("c")));
        h.ctl.handle_mpv(MpvEvent::PlaybackStarted);

        h.ctl.handle_command(UiCommand::NextStation);
        assert_eq!(h.ctl.snapshot().station.unwrap().stationuuid, "a");
        h.ctl.handle_mpv(MpvEvent::PlaybackStarted);

        h.ctl.handle_command(UiCommand::PreviousStation);
        assert_eq!(h.ctl.snapshot().station.unwrap().stationuuid, "c");
    }

    #[tokio::test]
    async fn random_on_empty_list() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::RandomStation);
        assert_eq!(h.ctl.snapshot().notice.as_deref(), Some("No stations available"));
    }

    #[tokio::test]
    async fn like_and_dislike_update_library_and_list() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::Like);
        assert!(h.ctl.library.favorites.is_empty());

        h.ctl
            .session
            .set_stations(vec![station("a"), station("b"), station("c")]);
        h.ctl.handle_command(UiCommand::Play(station("a")));
        h.ctl.handle_command(UiCommand::Like);
        h.ctl.handle_command(UiCommand::Like);
        assert_eq!(ids(&h.ctl.snapshot().favorites), vec!["a"]);

        h.ctl.handle_command(UiCommand::ShowFavorites);
        assert_eq!(ids(&h.ctl.snapshot().visible), vec!["a"]);

        h.ctl.handle_command(UiCommand::ToggleDislike(station("b")));
        assert_eq!(ids(&h.ctl.session.stations), vec!["a", "c"]);
        h.ctl.handle_command(UiCommand::DeleteFavorite("a".into()));
        assert!(h.ctl.snapshot().favorites.is_empty());
    }

    #[tokio::test]
    async fn preloads_last_played_paused() {
        let mut h = Harness::new(vec![]);
        h.ctl.mpv_ready = false;
        h.ctl.startup(Some(station("last")));
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Paused);
        assert!(h.drain_mpv().is_empty());

        h.ctl.handle_mpv(MpvEvent::Ready);
        let cmds = h.drain_mpv();
        assert_eq!(cmds[0], MpvCommand::SetVolume(50));
        assert_eq!(cmds[1], MpvCommand::SetPause(true));

        h.ctl.handle_mpv(MpvEvent::PlaybackStarted);
        assert_eq!(h.ctl.session.phase, PlaybackPhase::Paused);
    }

    #[tokio::test]
    async fn account_commands_set_notices() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::Register {
            username: "ana".into(),
            email: "ana@example.com".into(),
            password: "pw".into(),
            confirm: "nope".into(),
        });
        assert_eq!(h.ctl.snapshot().notice.as_deref(), Some("Password doesn't match."));

        h.ctl.handle_command(UiCommand::Register {
            username: "ana".into(),
            email: "ana@example.com".into(),
            password: "pw".into(),
            confirm: "pw".into(),
        });
        assert_eq!(h.ctl.snapshot().user.unwrap().username, "ana");

        h.ctl.handle_command(UiCommand::Logout);
        assert!(h.ctl.snapshot().user.is_none());

        h.ctl.handle_command(UiCommand::Login {
            username: "ana".into(),
            password: "bad".into(),
        });
        assert_eq!(
            h.ctl.snapshot().notice.as_deref(),
            Some("Invalid username or password.")
        );

        h.ctl.handle_command(UiCommand::Login {
            username: "ana".into(),
            password: "pw".into(),
        });
        assert_eq!(h.ctl.snapshot().notice.as_deref(), Some("Login successful!"));
    }

    #[tokio::test]
    async fn volume_change_survives_a_gone_player() {
        let mut h = Harness::new(vec![]);
        h.mpv_rx.close();
        h.ctl.handle_command(UiCommand::SetVolume(70));
        h.ctl.handle_mpv(MpvEvent::Ready);
        let snap = h.ctl.snapshot();
        assert_eq!(snap.volume, 70);
        assert_eq!(snap.phase, PlaybackPhase::Idle);
        assert!(snap.notice.is_none());
    }

    #[tokio::test]
    async fn playback_start_persists_last_played_station() {
        let mut h = Harness::new(vec![]);
        h.ctl.handle_command(UiCommand::Play(station("a")));
        h.ctl.handle_mpv(MpvEvent::PlaybackStarted);
        h.flush_writes().await;

        let saved: Option<Station> = h.ctl.storage.load(StorageKey::LastPlayedStation).unwrap();
        assert_eq!(saved, Some(station("a")));
    }

    #[tokio::test]
    async fn answering_mirror_is_remembered_and_tried_first() {
        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&down)
            .await;
        let up = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/stations/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([station_json("a")])))
            .mount(&up)
            .await;

        let mirrors = vec![down.uri(), up.uri()];
        let mut h = Harness::new(mirrors.clone());
        h.ctl.handle_command(UiCommand::ShowAll);
        h.settle_fetch().await;
        h.flush_writes().await;

        let saved: Option<String> = h.ctl.storage.load(StorageKey::LastServer).unwrap();
        assert_eq!(saved.as_deref(), Some(up.uri().as_str()));

        let restarted = RadioBrowserClient::new(mirrors, "test", saved).unwrap();
        assert_eq!(restarted.ordered_mirrors()[0], up.uri());
    }

    #[tokio::test]
    async fn library_writes_land_in_order() {
        let mut h = Harness::new(vec![]);
        h.ctl.session.set_stations(vec![station("a"), station("b")]);
        for _ in 0..20 {
            h.ctl.handle_command(UiCommand::Play(station("a")));
            h.ctl.handle_mpv(MpvEvent::PlaybackStarted);
            h.ctl.handle_command(UiCommand::Like);
            h.ctl.handle_command(UiCommand::DeleteFavorite("a".into()));
        }
        h.ctl.handle_command(UiCommand::ToggleDislike(station("b")));
        h.flush_writes().await;

        let on_disk = Library::load(&h.ctl.storage).unwrap();
        assert!(on_disk.favorites.is_empty());
        assert_eq!(ids(&on_disk.disliked), vec!["b"]);
    }

    #[test]
    fn label_prefers_station_then_title() {
        let tmp = tempfile::tempdir().unwrap();
        let accounts = Accounts::load(Storage::open(tmp.path()).unwrap()).unwrap();
        let mut state = initial_state(&AppConfig::default(), &Library::default(), &accounts);
        assert_eq!(state.label_text(), "radio");
        state.media_title = Some("Live Set".into());
        assert_eq!(state.label_text(), "Live Set");
        state.station = Some(station("a"));
        assert_eq!(state.label_text(), "Station a");
    }
}
