use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};

/// External (TMDB) identifier shared by the metadata lookup and the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogId(pub u64);

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CatalogId {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let value = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow!("'{}' is not a valid identifier", raw.trim()))?;
        if value == 0 {
            return Err(anyhow!("identifier must be a positive integer"));
        }
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MediaKind {
    Movie,
    #[value(name = "tv")]
    TvShow,
}

impl MediaKind {
    /// Path segment used by the catalog, the listing API and TMDB.
    pub fn as_path(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::TvShow => "tv",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "tv" => Ok(Self::TvShow),
            other => Err(anyhow!("unknown media type '{other}' (expected movie or tv)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeIndex {
    pub season: u32,
    pub episode: u32,
}

impl EpisodeIndex {
    pub fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }
}

impl fmt::Display for EpisodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.episode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleInfo {
    pub title: String,
    pub year: String,
}

impl TitleInfo {
    pub fn fallback(kind: MediaKind, id: CatalogId) -> Self {
        Self {
            title: format!("{kind}_{id}"),
            year: "Unknown".to_string(),
        }
    }
}
