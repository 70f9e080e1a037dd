//! Title and year lookup used for display and output paths.
//!
//! Lookups never fail: anything that goes wrong yields
//! [`TitleInfo::fallback`] so a download can still be named.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::http::HttpClient;
use crate::media::{CatalogId, MediaKind, TitleInfo};

pub(crate) const TMDB_BASE_URL: &str = "https://www.themoviedb.org";

static HEADER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".header_poster_wrapper h2").expect("header selector is valid")
});
static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("title selector is valid"));
static RELEASE_DATE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span.release_date").expect("release date selector is valid")
});

pub(crate) trait TitleLookup {
    fn lookup(&self, kind: MediaKind, id: CatalogId) -> TitleInfo;
}

/// Scrapes the public TMDB title page.
pub(crate) struct TmdbLookup {
    http: HttpClient,
    base_url: String,
    timeout: Duration,
}

impl TmdbLookup {
    pub(crate) fn new(http: HttpClient, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout,
        }
    }

    fn page_url(&self, kind: MediaKind, id: CatalogId) -> String {
        format!(
            "{}/{kind}/{id}?language=en-US",
            self.base_url.trim_end_matches('/')
        )
    }
}

impl TitleLookup for TmdbLookup {
    fn lookup(&self, kind: MediaKind, id: CatalogId) -> TitleInfo {
        let url = self.page_url(kind, id);
        let html = match self.http.get_text(&url, self.timeout) {
            Ok(html) => html,
            Err(err) => {
                warn!(%kind, %id, error = %err, "metadata lookup failed, using fallback name");
                return TitleInfo::fallback(kind, id);
            }
        };

        match parse_title_page(&html) {
            Some(info) => {
                debug!(%kind, %id, title = %info.title, year = %info.year, "metadata resolved");
                info
            }
            None => {
                warn!(%kind, %id, "metadata page had no title header, using fallback name");
                TitleInfo::fallback(kind, id)
            }
        }
    }
}

/// Reads `.header_poster_wrapper h2`: the anchor text is the title and the
/// `release_date` span holds `(YYYY)`.
pub(crate) fn parse_title_page(html: &str) -> Option<TitleInfo> {
    let document = Html::parse_document(html);
    let header = document.select(&HEADER_SELECTOR).next()?;

    let title = header
        .select(&TITLE_SELECTOR)
        .next()
        .map(element_text)
        .filter(|title| !title.is_empty())?;

    let year = header
        .select(&RELEASE_DATE_SELECTOR)
        .next()
        .map(|span| {
            element_text(span)
                .trim_matches(|c| c == '(' || c == ')')
                .trim()
                .to_string()
        })
        .filter(|year| !year.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    Some(TitleInfo { title, year })
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Memoizes lookups for the lifetime of one run.
pub(crate) struct CachedLookup<L> {
    inner: L,
    cache: RefCell<HashMap<(MediaKind, CatalogId), TitleInfo>>,
}

impl<L: TitleLookup> CachedLookup<L> {
    pub(crate) fn new(inner: L) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }
}

impl<L: TitleLookup> TitleLookup for CachedLookup<L> {
    fn lookup(&self, kind: MediaKind, id: CatalogId) -> TitleInfo {
        if let Some(hit) = self.cache.borrow().get(&(kind, id)) {
            return hit.clone();
        }
        let info = self.inner.lookup(kind, id);
        self.cache.borrow_mut().insert((kind, id), info.clone());
        info
    }
}
