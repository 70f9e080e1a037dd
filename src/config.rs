use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use url::Url;

use crate::cli::Cli;

const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_LISTING_LANG: &str = "it";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PACE_DELAY: Duration = Duration::from_millis(400);

/// Optional settings file. Every field can also come from the command line.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub api_base: Option<String>,
    pub ffmpeg_path: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub listing_lang: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub metadata_timeout_secs: Option<u64>,
    pub pace_delay_ms: Option<u64>,
}

impl FileConfig {
    /// An explicit path wins; otherwise the default location is used when the
    /// platform has one.
    pub fn discover(explicit: Option<&Path>, default: Option<PathBuf>) -> Result<Self> {
        match explicit.map(Path::to_path_buf).or(default) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Missing file means "no overrides".
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file {}", path.display()));
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub api_base: Url,
    pub ffmpeg_path: PathBuf,
    pub output_base: PathBuf,
    pub debug: bool,
    pub resume: bool,
    pub allow_file_protocol: bool,
    pub listing_lang: String,
    pub request_timeout: Duration,
    pub metadata_timeout: Duration,
    pub pace_delay: Duration,
}

impl Config {
    /// Flags and environment (already merged by clap) win over the file.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self> {
        let raw_base = cli.base_url.clone().or(file.base_url).context(
            "catalog base URL is not configured (set --base-url, STREAMDL_BASE_URL or base_url)",
        )?;
        let base_url = parse_base(&raw_base, "base URL")?;

        let api_base = match cli.api_base.clone().or(file.api_base) {
            Some(raw) => parse_base(&raw, "API base")?,
            None => parse_base(
                &format!("{}/api/list", base_url.as_str().trim_end_matches('/')),
                "API base",
            )?,
        };

        Ok(Self {
            base_url,
            api_base,
            ffmpeg_path: cli
                .ffmpeg_path
                .clone()
                .or(file.ffmpeg_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG)),
            output_base: cli
                .output
                .clone()
                .or(file.output)
                .unwrap_or_else(|| PathBuf::from(".")),
            debug: cli.debug,
            resume: cli.resume,
            allow_file_protocol: cli.allow_file_protocol,
            listing_lang: file
                .listing_lang
                .unwrap_or_else(|| DEFAULT_LISTING_LANG.to_string()),
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            metadata_timeout: file
                .metadata_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_METADATA_TIMEOUT),
            pace_delay: file
                .pace_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PACE_DELAY),
        })
    }

    /// Resolves the transcoder on PATH (or checks an explicit path).
    pub fn locate_transcoder(&self) -> Result<PathBuf> {
        which::which(&self.ffmpeg_path).with_context(|| {
            format!(
                "transcoder '{}' not found; install ffmpeg or pass --ffmpeg-path",
                self.ffmpeg_path.display()
            )
        })
    }
}

fn parse_base(raw: &str, what: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid {what} '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("{what} '{raw}' must use http or https"));
    }
    Ok(url)
}
