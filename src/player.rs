//! Finding a video player and launching it on a finished slideshow.

use crate::config::AUTO_PLAYER;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::SystemTime;
use thiserror::Error;

/// Players we know how to launch, best first.
pub const PREFERRED_PLAYERS: [&str; 10] = [
    "vlc",
    "mpv",
    "celluloid",
    "shotcut",
    "ffplay",
    "totem",
    "smplayer",
    "mplayer",
    "xine",
    "gxine",
];

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Video file not found: {}", .0.display())]
    VideoMissing(PathBuf),
    #[error("No video player detected, install one of: {}", PREFERRED_PLAYERS.join(", "))]
    NoPlayer,
    #[error("Failed to play video with any available player: {last}")]
    AllFailed { last: io::Error },
}

/// Installed players from [`PREFERRED_PLAYERS`], in priority order.
pub fn detect_players() -> Vec<String> {
    let found: Vec<String> = PREFERRED_PLAYERS
        .iter()
        .filter(|p| which::which(p).is_ok())
        .map(|p| p.to_string())
        .collect();
    if found.is_empty() {
        log::warn!("No video players detected on system");
    } else {
        log::info!("Available players: {}", found.join(", "));
    }
    found
}

pub fn ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok()
}

/// Order in which to try players for a given preference.
///
/// `auto` keeps the detected order. A named player goes first even if it was
/// not detected, followed by the detected ones.
pub fn candidates(preference: &str, available: &[String]) -> Vec<String> {
    if preference.is_empty() || preference == AUTO_PLAYER {
        return available.to_vec();
    }
    std::iter::once(preference.to_string())
        .chain(available.iter().filter(|p| *p != preference).cloned())
        .collect()
}

/// Launch the first player that starts. Returns the player used.
///
/// The player runs detached; we don't wait for it.
pub fn play(video: &Path, candidates: &[String]) -> Result<String, PlayerError> {
    if !video.is_file() {
        return Err(PlayerError::VideoMissing(video.to_path_buf()));
    }

    let mut last = None;
    for player in candidates {
        log::info!("Playing video with {}: {}", player, video.display());
        let spawned = Command::new(player)
            .arg(video)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(_) => return Ok(player.clone()),
            Err(e) => {
                log::debug!("Failed with {}: {}", player, e);
                last = Some(e);
            }
        }
    }

    match last {
        Some(last) => Err(PlayerError::AllFailed { last }),
        None => Err(PlayerError::NoPlayer),
    }
}

/// `.mp4` files in `dir`, newest first. A missing directory has none.
pub fn list_videos(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut videos: Vec<(SystemTime, PathBuf)> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map_or(false, |e| e.eq_ignore_ascii_case("mp4"))
        })
        .filter_map(|path| {
            let metadata = fs::metadata(&path).ok()?;
            metadata.is_file().then(|| (metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH), path))
        })
        .collect();

    videos.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(videos.into_iter().map(|(_, path)| path).collect())
}
