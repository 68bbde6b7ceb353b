use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum MpvCommand {
    LoadUrl { url: String },
    TogglePause,
    SetPause(bool),
    SetVolume(u8),
    Stop,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MpvEvent {
    Ready,
    MediaTitle(Option<String>),
    Pause(bool),
    /// Audio is flowing for the loaded URL.
    PlaybackStarted,
    LoadFailed(String),
    Crashed(String),
}

#[derive(Debug)]
pub struct MpvProcess {
    cmd_tx: mpsc::UnboundedSender<MpvCommand>,
}

impl MpvProcess {
    pub fn spawn(socket_path: PathBuf) -> (Self, mpsc::UnboundedReceiver<MpvEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_mpv(socket_path, cmd_rx, evt_tx));

        (Self { cmd_tx }, evt_rx)
    }

    /// A handle whose commands are collected instead of reaching mpv.
    #[cfg(test)]
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<MpvCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (Self { cmd_tx }, cmd_rx)
    }

    pub fn command(&self, cmd: MpvCommand) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| anyhow!("mpv task is not running"))
    }
}

async fn run_mpv(
    socket_path: PathBuf,
    mut cmd_rx: mpsc::UnboundedReceiver<MpvCommand>,
    evt_tx: mpsc::UnboundedSender<MpvEvent>,
) {
    let mut backoff = Duration::from_millis(200);
    loop {
        if cmd_rx.is_closed() {
            return;
        }
        match spawn_and_connect(&socket_path).await {
            Ok((mut child, mut stream)) => {
                backoff = Duration::from_millis(200);
                let _ = send_observers(&mut stream).await;
                let _ = evt_tx.send(MpvEvent::Ready);
                match io_loop(&mut child, stream, &mut cmd_rx, &evt_tx).await {
                    Ok(()) => return,
                    Err(e) => {
                        let _ = evt_tx.send(MpvEvent::Crashed(e.to_string()));
                    }
                }
            }
            Err(e) => {
                let _ = evt_tx.send(MpvEvent::Crashed(e.to_string()));
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, Duration::from_secs(5));
            }
        }
    }
}

async fn spawn_and_connect(socket_path: &Path) -> Result<(Child, UnixStream)> {
    let _ = tokio::fs::remove_file(socket_path).await;

    let mut child = Command::new("mpv")
        .arg("--idle=yes")
        .arg("--no-terminal")
        .arg("--no-video")
        .arg("--force-window=no")
        .arg(format!(
            "--input-ipc-server={}",
            socket_path
                .to_str()
                .ok_or_else(|| anyhow!("Invalid socket path"))?
        ))
        .kill_on_drop(true)
        .spawn()
        .context("Failed to spawn mpv")?;

    let start = tokio::time::Instant::now();
    let stream = loop {
        match UnixStream::connect(socket_path).await {
            Ok(s) => break s,
            Err(e) => {
                if start.elapsed() > Duration::from_secs(3) {
                    let _ = child.kill().await;
                    return Err(e).context("Timed out connecting to mpv IPC socket");
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    };

    Ok((child, stream))
}

async fn send_observers(stream: &mut UnixStream) -> Result<()> {
    for (id, prop) in [(1, "media-title"), (2, "pause")] {
        send_json(
            stream,
            mpv_cmd(vec![
                serde_json::json!("observe_property"),
                serde_json::json!(id),
                serde_json::json!(prop),
            ]),
        )
        .await?;
    }
    Ok(())
}

async fn io_loop(
    child: &mut Child,
    stream: UnixStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<MpvCommand>,
    evt_tx: &mpsc::UnboundedSender<MpvEvent>,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.context("mpv wait failed")?;
                return Err(anyhow!("mpv exited: {status}"));
            }
            maybe_line = reader.next_line() => {
                let line = maybe_line.context("mpv IPC read error")?;
                let Some(line) = line else {
                    return Err(anyhow!("mpv IPC closed"));
                };
                match parse_event(&line) {
                    Ok(Some(ev)) => { let _ = evt_tx.send(ev); }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "ignoring mpv IPC line"),
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { return Ok(()); };
                if cmd == MpvCommand::Shutdown {
                    let _ = child.kill().await;
                    return Ok(());
                }
                send_json_half(&mut write_half, command_json(&cmd)).await?;
            }
        }
    }
}

fn command_json(cmd: &MpvCommand) -> serde_json::Value {
    use serde_json::json;

    match cmd {
        MpvCommand::LoadUrl { url } => mpv_cmd(vec![json!("loadfile"), json!(url), json!("replace")]),
        MpvCommand::TogglePause => mpv_cmd(vec![json!("cycle"), json!("pause")]),
        MpvCommand::SetPause(p) => mpv_cmd(vec![json!("set_property"), json!("pause"), json!(p)]),
        MpvCommand::SetVolume(v) => mpv_cmd(vec![
            json!("set_property"),
            json!("volume"),
            json!((*v).min(100)),
        ]),
        MpvCommand::Stop | MpvCommand::Shutdown => mpv_cmd(vec![json!("stop")]),
    }
}

fn mpv_cmd(command: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({ "command": command })
}

async fn send_json(stream: &mut UnixStream, v: serde_json::Value) -> Result<()> {
    let mut buf = serde_json::to_vec(&v).context("Serialize mpv IPC request")?;
    buf.push(b'\n');
    stream.write_all(&buf).await.context("Write mpv IPC request")?;
    Ok(())
}

async fn send_json_half(write_half: &mut OwnedWriteHalf, v: serde_json::Value) -> Result<()> {
    let mut buf = serde_json::to_vec(&v).context("Serialize mpv IPC request")?;
    buf.push(b'\n');
    write_half.write_all(&buf).await.context("Write mpv IPC request")?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct MpvIncoming {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    file_error: Option<String>,
}

/// `Ok(None)` for well-formed lines we have no use for (command replies, other events).
fn parse_event(line: &str) -> Result<Option<MpvEvent>> {
    let incoming: MpvIncoming = serde_json::from_str(line).context("Invalid mpv IPC JSON")?;
    let Some(event) = incoming.event.as_deref() else {
        return Ok(None);
    };
    let ev = match event {
        "playback-restart" => Some(MpvEvent::PlaybackStarted),
        "end-file" if incoming.reason.as_deref() == Some("error") => {
            let why = incoming.file_error.unwrap_or_else(|| "unknown error".to_string());
            warn!(error = %why, "mpv could not load stream");
            Some(MpvEvent::LoadFailed(why))
        }
        "property-change" => match incoming.name.as_deref() {
            Some("media-title") => {
                let title = incoming
                    .data
                    .and_then(|v| v.as_str().map(|s| s.to_string()));
                Some(MpvEvent::MediaTitle(title))
            }
            Some("pause") => {
                let paused = incoming
                    .data
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Some(MpvEvent::Pause(paused))
            }
            _ => None,
        },
        _ => None,
    };
    Ok(ev)
}

pub fn socket_path() -> Result<PathBuf> {
    let runtime = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);

    let dir = runtime.join("soundpulse");
    crate::storage::ensure_private_dir(&dir)?;
    Ok(dir.join(format!("mpv-{}.sock", std::process::id())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_media_title() {
        let line = r#"{"event":"property-change","name":"media-title","data":"Song Title"}"#;
        assert_eq!(
            parse_event(line).unwrap(),
            Some(MpvEvent::MediaTitle(Some("Song Title".to_string())))
        );
    }

    #[test]
    fn parses_pause() {
        let line = r#"{"event":"property-change","name":"pause","data":true}"#;
        assert_eq!(parse_event(line).unwrap(), Some(MpvEvent::Pause(true)));
    }

    #[test]
    fn parses_playback_lifecycle() {
        assert_eq!(
            parse_event(r#"{"event":"playback-restart"}"#).unwrap(),
            Some(MpvEvent::PlaybackStarted)
        );
        let failed = r#"{"event":"end-file","reason":"error","file_error":"loading failed","playlist_entry_id":1}"#;
        assert_eq!(
            parse_event(failed).unwrap(),
            Some(MpvEvent::LoadFailed("loading failed".to_string()))
        );
        let stopped = r#"{"event":"end-file","reason":"stop"}"#;
        assert_eq!(parse_event(stopped).unwrap(), None);
    }

    #[test]
    fn ignores_command_replies() {
        assert_eq!(parse_event(r#"{"request_id":0,"error":"success"}"#).unwrap(), None);
        assert!(parse_event("garbage").is_err());
    }

    #[test]
    fn clamps_volume_command() {
        let v = command_json(&MpvCommand::SetVolume(180));
        assert_eq!(v, serde_json::json!({"command": ["set_property", "volume", 100]}));
    }
}
