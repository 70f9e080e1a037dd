use std::path::PathBuf;

use clap::Parser;

use crate::media::MediaKind;

#[derive(Debug, Default, Parser)]
#[command(
    name = "streamdl",
    version,
    about = "Download catalog movies and TV episodes into local Matroska files"
)]
pub struct Cli {
    /// Media type to download (prompted when omitted)
    #[arg(long = "type", value_enum)]
    pub kind: Option<MediaKind>,

    /// TMDB identifier of the title (prompted when omitted)
    #[arg(long)]
    pub tmdb_id: Option<u64>,

    /// Verbose logging and transcoder output
    #[arg(long)]
    pub debug: bool,

    /// Path to the ffmpeg binary
    #[arg(long, env = "STREAMDL_FFMPEG")]
    pub ffmpeg_path: Option<PathBuf>,

    /// Output directory
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Skip units whose output file already exists and is non-empty
    #[arg(long)]
    pub resume: bool,

    #[arg(long)]
    pub season_from: Option<u32>,

    #[arg(long)]
    pub season_to: Option<u32>,

    #[arg(long)]
    pub episode_from: Option<u32>,

    #[arg(long)]
    pub episode_to: Option<u32>,

    /// Catalog site base URL
    #[arg(long, env = "STREAMDL_BASE_URL")]
    pub base_url: Option<String>,

    /// Catalog listing API base (defaults to <base-url>/api/list)
    #[arg(long, env = "STREAMDL_API_BASE")]
    pub api_base: Option<String>,

    /// Let the transcoder open local files in addition to network streams
    #[arg(long)]
    pub allow_file_protocol: bool,

    /// Alternate config file
    #[arg(long, env = "STREAMDL_CONFIG")]
    pub config: Option<PathBuf>,
}
