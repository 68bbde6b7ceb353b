use crate::controller::{ControllerHandle, ControllerState, UiCommand};
use crate::i18n::Language;
use crate::models::{BrowseOptions, DisplayMode, SearchFilters, Station};
use crate::session::PlaybackPhase;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub const HELP: &str = "\
commands:
  all | genre <tag> | top | favorites     switch station list
  search <text>                           search stations by name
  filter name=.. country=.. language=.. genre=.. bitrate=.. codec=MP3,AAC
  options language=.. country=.. codec=.. bitrate=.. limit=.. genre=..
  next | prev | pagesize <n>              page through the list
  play <n> | pause | stop | >> | << | random
  like | unlike <n> | dislike <n>         favorites are numbered in `favorites`
  vol <0-100> | lang <en|de|fr|es|zh|ar> | reset
  register <user> <email> <password> <confirm> | login <user> <password> | logout
  help | quit";

#[derive(Debug, Clone)]
pub enum Action {
    Command(UiCommand),
    Help,
    Quit,
}

/// Turns one input line into an action; `Err` carries a message for the user.
pub fn parse_line(line: &str, state: &ControllerState) -> Result<Option<Action>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => return Ok(Some(Action::Help)),
        "quit" | "exit" | "q" => return Ok(Some(Action::Quit)),
        "all" => UiCommand::ShowAll,
        "genre" => UiCommand::ShowGenre(required(rest, "genre <tag>")?.to_string()),
        "top" => UiCommand::ShowTopVoted,
        "favorites" | "favs" => UiCommand::ShowFavorites,
        "search" => UiCommand::SearchByName(rest.to_string()),
        "filter" => UiCommand::SearchByFilters(parse_filters(rest)?),
        "options" => UiCommand::SetBrowseOptions(parse_options(rest, &state.browse)?),
        "next" => UiCommand::NextPage,
        "prev" => UiCommand::PreviousPage,
        "pagesize" => UiCommand::SetItemsPerPage(parse_number(rest, "pagesize <n>")?),
        "play" => UiCommand::Play(pick(&state.visible, rest)?.clone()),
        "pause" => UiCommand::TogglePause,
        "stop" => UiCommand::Stop,
        ">>" => UiCommand::NextStation,
        "<<" => UiCommand::PreviousStation,
        "random" => UiCommand::RandomStation,
        "like" => UiCommand::Like,
        "unlike" => UiCommand::DeleteFavorite(pick(&state.favorites, rest)?.stationuuid.clone()),
        "dislike" => UiCommand::ToggleDislike(pick(&state.visible, rest)?.clone()),
        "vol" | "volume" => {
            let percent = parse_number::<u16>(rest, "vol <0-100>")?.min(100);
            UiCommand::SetVolume(percent as u8)
        }
        "lang" => UiCommand::SetLanguage(
            rest.parse::<Language>().map_err(|e| e.to_string())?,
        ),
        "reset" => UiCommand::ResetToDefaults,
        "register" => {
            let [username, email, password, confirm] = words::<4>(rest, "register <user> <email> <password> <confirm>")?;
            UiCommand::Register {
                username,
                email,
                password,
                confirm,
            }
        }
        "login" => {
            let [username, password] = words::<2>(rest, "login <user> <password>")?;
            UiCommand::Login { username, password }
        }
        "logout" => UiCommand::Logout,
        other => return Err(format!("unknown command: {other}\n{HELP}")),
    };
    Ok(Some(Action::Command(cmd)))
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest)
    }
}

fn parse_number<T: std::str::FromStr>(rest: &str, usage: &str) -> Result<T, String> {
    rest.parse().map_err(|_| format!("usage: {usage}"))
}

fn words<const N: usize>(rest: &str, usage: &str) -> Result<[String; N], String> {
    let parts: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
    parts.try_into().map_err(|_| format!("usage: {usage}"))
}

/// 1-based index into a listed set of stations.
fn pick<'a>(stations: &'a [Station], rest: &str) -> Result<&'a Station, String> {
    let n: usize = parse_number(rest, "<n> (number from the list)")?;
    n.checked_sub(1)
        .and_then(|i| stations.get(i))
        .ok_or_else(|| format!("no station #{n} in the list"))
}

/// `key=value` pairs; a value runs until the next token containing `=`.
fn key_values(rest: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for token in rest.split_whitespace() {
        if let Some((k, v)) = token.split_once('=') {
            pairs.push((k.to_ascii_lowercase(), v.to_string()));
        } else if let Some((_, v)) = pairs.last_mut() {
            v.push(' ');
            v.push_str(token);
        } else {
            return Err(format!("expected key=value, got `{token}`"));
        }
    }
    Ok(pairs)
}

fn parse_filters(rest: &str) -> Result<SearchFilters, String> {
    let mut f = SearchFilters::default();
    for (k, v) in key_values(rest)? {
        match k.as_str() {
            "name" => f.name = Some(v),
            "country" => f.country = Some(v),
            "language" => f.language = Some(v),
            "genre" | "tag" => f.genre = Some(v),
            "bitrate" => f.bitrate = Some(parse_number(&v, "bitrate=<kbps>")?),
            "codec" | "codecs" => f.codecs = v.split(',').map(str::to_string).collect(),
            other => return Err(format!("unknown filter: {other}")),
        }
    }
    Ok(f)
}

/// Applies `key=value` changes on top of the options currently in use.
fn parse_options(rest: &str, current: &BrowseOptions) -> Result<BrowseOptions, String> {
    let mut o = current.clone();
    for (k, v) in key_values(rest)? {
        match k.as_str() {
            "language" => o.language = v,
            "country" => o.country = v,
            "codec" => o.codec = v,
            "genre" | "tag" => o.genre = v,
            "bitrate" => o.bitrate = parse_number(&v, "bitrate=<kbps>")?,
            "limit" => o.limit = parse_number(&v, "limit=<n>")?,
            other => return Err(format!("unknown option: {other}")),
        }
    }
    Ok(o)
}

pub fn render(state: &ControllerState) -> String {
    let mut out = String::new();

    let phase = match state.phase {
        PlaybackPhase::Idle => "stopped",
        PlaybackPhase::Loading => "loading",
        PlaybackPhase::Playing => "playing",
        PlaybackPhase::Paused => "paused",
        PlaybackPhase::Error => "error",
    };
    let _ = write!(out, "[{phase}] {}", state.label_text());
    if let Some(title) = state.media_title.as_deref().filter(|t| !t.trim().is_empty()) {
        if state.station.is_some() {
            let _ = write!(out, " - {title}");
        }
    }
    let _ = write!(out, "  vol {}%  {}", state.volume, state.language);
    if let Some(user) = &state.user {
        let _ = write!(out, "  @{}", user.username);
    }
    out.push('\n');

    if let Some(notice) = &state.notice {
        let _ = writeln!(out, "! {notice}");
    }
    if state.loading {
        out.push_str("... loading stations\n");
        return out;
    }

    let _ = write!(out, "-- {}", state.display_mode.label());
    if state.display_mode != DisplayMode::Favorites && state.total_pages > 0 {
        let _ = write!(
            out,
            " (page {}/{}, {} stations)",
            state.page + 1,
            state.total_pages,
            state.station_count
        );
    }
    out.push('\n');

    for (i, s) in state.visible.iter().enumerate() {
        let star = if state.is_favorite(&s.stationuuid) { "*" } else { " " };
        let playing = state
            .station
            .as_ref()
            .is_some_and(|c| c.stationuuid == s.stationuuid);
        let marker = if playing { ">" } else { " " };
        let _ = write!(out, "{marker}{star}{:>3}. {}", i + 1, s.name.trim());
        let subtitle = station_subtitle(s);
        if !subtitle.is_empty() {
            let _ = write!(out, "  ({subtitle})");
        }
        out.push('\n');
    }
    if state.has_more {
        out.push_str("   more: `next`\n");
    }
    if !state.disliked.is_empty() {
        let _ = writeln!(out, "   ({} disliked stations hidden)", state.disliked.len());
    }
    out
}

fn station_subtitle(s: &Station) -> String {
    let mut parts: Vec<String> = Vec::new();
    for field in [&s.country, &s.codec] {
        let field = field.trim();
        if !field.is_empty() {
            parts.push(field.to_string());
        }
    }
    if s.bitrate > 0 {
        parts.push(format!("{} kbps", s.bitrate));
    }
    if let Some(tag) = s.tag_list().first() {
        parts.push(tag.to_string());
    }
    parts.join(" · ")
}

/// Reads commands from stdin and prints the station view whenever it changes.
pub async fn run(controller: &mut ControllerHandle) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_render = String::new();

    stdout.write_all(format!("{HELP}\n\n").as_bytes()).await?;

    loop {
        tokio::select! {
            changed = controller.state_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let view = render(&controller.state_rx.borrow_and_update());
                if view != last_render {
                    stdout.write_all(view.as_bytes()).await?;
                    stdout.flush().await?;
                    last_render = view;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    return Ok(());
                };
                let parsed = {
                    let state = controller.state_rx.borrow();
                    parse_line(&line, &state)
                };
                match parsed {
                    Ok(None) => {}
                    Ok(Some(Action::Quit)) => return Ok(()),
                    Ok(Some(Action::Help)) => {
                        stdout.write_all(format!("{HELP}\n").as_bytes()).await?;
                    }
                    Ok(Some(Action::Command(cmd))) => {
                        if controller.cmd_tx.send(cmd).is_err() {
                            return Ok(());
                        }
                    }
                    Err(msg) => {
                        stdout.write_all(format!("{msg}\n").as_bytes()).await?;
                    }
                }
                stdout.flush().await?;
            }
        }
    }
}
