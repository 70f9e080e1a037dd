use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::http::{HttpClient, TransportError};
use crate::media::{CatalogId, EpisodeIndex, MediaKind};

/// Season number -> distinct episode numbers, both ascending.
pub(crate) type EpisodeMap = BTreeMap<u32, BTreeSet<u32>>;

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(#[source] TransportError),
    #[error("catalog listing from {url} is malformed: {reason}")]
    Malformed { url: String, reason: String },
    #[error("{} not found in catalog (HTTP {status})", missing_unit_label(.kind, .id, .episode))]
    UnitNotFound {
        kind: MediaKind,
        id: CatalogId,
        episode: Option<EpisodeIndex>,
        status: u16,
    },
}

impl CatalogError {
    /// Only a missing unit lets a batch carry on.
    pub(crate) fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnitNotFound { .. })
    }
}

fn missing_unit_label(kind: &MediaKind, id: &CatalogId, episode: &Option<EpisodeIndex>) -> String {
    unit_label(*kind, *id, *episode)
}

pub(crate) fn unit_label(kind: MediaKind, id: CatalogId, episode: Option<EpisodeIndex>) -> String {
    match episode {
        Some(index) => format!("{kind} {id} {index}"),
        None => format!("{kind} {id}"),
    }
}

pub(crate) trait Catalog {
    fn exists(&self, kind: MediaKind, id: CatalogId) -> Result<bool, CatalogError>;

    fn list_episodes(&self, id: CatalogId) -> Result<EpisodeMap, CatalogError>;

    fn fetch_playable_page(
        &self,
        kind: MediaKind,
        id: CatalogId,
        episode: Option<EpisodeIndex>,
    ) -> Result<String, CatalogError>;
}

pub(crate) struct CatalogClient {
    http: HttpClient,
    base_url: Url,
    api_base: Url,
    listing_lang: String,
    timeout: Duration,
}

impl CatalogClient {
    pub(crate) fn new(
        http: HttpClient,
        base_url: Url,
        api_base: Url,
        listing_lang: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            api_base,
            listing_lang: listing_lang.into(),
            timeout,
        }
    }

    fn listing_url(&self, listing: &str) -> String {
        format!(
            "{}/{listing}?lang={}",
            self.api_base.as_str().trim_end_matches('/'),
            self.listing_lang
        )
    }

    pub(crate) fn page_url(
        &self,
        kind: MediaKind,
        id: CatalogId,
        episode: Option<EpisodeIndex>,
    ) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        match episode {
            Some(index) => format!(
                "{base}/{kind}/{id}/{:02}/{:02}",
                index.season, index.episode
            ),
            None => format!("{base}/{kind}/{id}"),
        }
    }

    fn fetch_listing(&self, listing: &str) -> Result<Vec<Value>, CatalogError> {
        let url = self.listing_url(listing);
        let body = self
            .http
            .get_text(&url, self.timeout)
            .map_err(CatalogError::Unavailable)?;
        parse_listing(&body).map_err(|reason| CatalogError::Malformed { url, reason })
    }
}

impl Catalog for CatalogClient {
    fn exists(&self, kind: MediaKind, id: CatalogId) -> Result<bool, CatalogError> {
        let items = self.fetch_listing(kind.as_path())?;
        Ok(items.iter().any(|item| item_id(item) == Some(id)))
    }

    fn list_episodes(&self, id: CatalogId) -> Result<EpisodeMap, CatalogError> {
        let items = self.fetch_listing("episode")?;
        let episodes = collect_episodes(&items, id);
        debug!(%id, seasons = episodes.len(), "episode listing fetched");
        Ok(episodes)
    }

    fn fetch_playable_page(
        &self,
        kind: MediaKind,
        id: CatalogId,
        episode: Option<EpisodeIndex>,
    ) -> Result<String, CatalogError> {
        let url = self.page_url(kind, id, episode);
        match self.http.get_text(&url, self.timeout) {
            Ok(html) => Ok(html),
            Err(err) => match err.status() {
                Some(status) => Err(CatalogError::UnitNotFound {
                    kind,
                    id,
                    episode,
                    status,
                }),
                None => Err(CatalogError::Unavailable(err)),
            },
        }
    }
}

pub(crate) fn parse_listing(raw: &str) -> Result<Vec<Value>, String> {
    let parsed: Value = serde_json::from_str(raw).map_err(|err| err.to_string())?;
    match parsed {
        Value::Array(items) => Ok(items),
        other => Err(format!("expected a JSON array, got {}", json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn item_id(item: &Value) -> Option<CatalogId> {
    as_u64(item.get("tmdb_id")?).map(CatalogId)
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    as_u64(value).and_then(|raw| u32::try_from(raw).ok())
}

/// Groups the episode listing rows for `id` by season.
///
/// `e` is either one episode number or an array of them. Rows without a usable
/// season or episode are skipped.
pub(crate) fn collect_episodes(items: &[Value], id: CatalogId) -> EpisodeMap {
    let mut episodes = EpisodeMap::new();
    for item in items.iter().filter(|item| item_id(item) == Some(id)) {
        let Some(season) = item.get("s").and_then(as_u32) else {
            continue;
        };
        let numbers: Vec<u32> = match item.get("e") {
            Some(Value::Array(values)) => values.iter().filter_map(as_u32).collect(),
            Some(value) => as_u32(value).into_iter().collect(),
            None => Vec::new(),
        };
        if numbers.is_empty() {
            continue;
        }
        episodes.entry(season).or_default().extend(numbers);
    }
    episodes
}
