use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::media::{EpisodeIndex, TitleInfo};

pub const CONTAINER_EXT: &str = "mkv";

/// `None` when the platform has no config directory.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("streamdl").join("config.json"))
}

pub fn sanitize_filename(name: &str) -> String {
    name.trim()
        .chars()
        .map(|ch| match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '\n' => '_',
            other => other,
        })
        .collect()
}

fn title_folder(output_base: &Path, info: &TitleInfo) -> PathBuf {
    output_base.join(sanitize_filename(&format!("{} ({})", info.title, info.year)))
}

/// `<out>/<Title> (<Year>)/<Title> (<Year>).mkv`
pub fn movie_destination(output_base: &Path, info: &TitleInfo) -> PathBuf {
    title_folder(output_base, info).join(format!(
        "{} ({}).{CONTAINER_EXT}",
        sanitize_filename(&info.title),
        info.year
    ))
}

/// `<out>/<Show> (<Year>)/Season NN/<Show> (<Year>) - SNNENN.mkv`
pub fn episode_destination(output_base: &Path, info: &TitleInfo, index: EpisodeIndex) -> PathBuf {
    title_folder(output_base, info)
        .join(format!("Season {:02}", index.season))
        .join(format!(
            "{} ({}) - {index}.{CONTAINER_EXT}",
            sanitize_filename(&info.title),
            info.year
        ))
}

/// Sibling the transcoder writes into before the final rename.
pub fn part_path(destination: &Path) -> PathBuf {
    let mut raw = OsString::from(destination.as_os_str());
    raw.push(".part");
    PathBuf::from(raw)
}

/// Resume check: an existing, non-empty file counts as done.
pub fn has_completed_file(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
