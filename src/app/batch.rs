use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, info_span, warn};
use url::Url;

use crate::catalog::{Catalog, CatalogError};
use crate::media::{CatalogId, EpisodeIndex, MediaKind};
use crate::metadata::TitleLookup;
use crate::paths::{episode_destination, has_completed_file, movie_destination};
use crate::playlist::{ResolveError, extract_playlist};
use crate::transcode::{CancelFlag, DownloadTarget, TranscodeError, Transcoder};

/// Inclusive range only when both bounds are present; otherwise no filter.
pub(crate) fn inclusive_range(
    from: Option<u32>,
    to: Option<u32>,
) -> Option<RangeInclusive<u32>> {
    match (from, to) {
        (Some(start), Some(end)) => Some(start..=end),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BatchOptions {
    pub(crate) output_base: PathBuf,
    pub(crate) resume: bool,
    pub(crate) season_range: Option<RangeInclusive<u32>>,
    pub(crate) episode_range: Option<RangeInclusive<u32>>,
    pub(crate) pace_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    AlreadyDownloaded,
}

#[derive(Debug, Error)]
pub(crate) enum FailureCause {
    #[error(transparent)]
    UnitNotFound(CatalogError),
    #[error(transparent)]
    PlaylistNotFound(ResolveError),
    #[error(transparent)]
    TranscodeFailed(TranscodeError),
}

#[derive(Debug)]
pub(crate) enum TranscodeResult {
    Success(PathBuf),
    Skipped(SkipReason),
    Failed(FailureCause),
}

impl TranscodeResult {
    fn ran_transcoder(&self) -> bool {
        matches!(
            self,
            Self::Success(_) | Self::Failed(FailureCause::TranscodeFailed(_))
        )
    }
}

/// Running `done/total` counter; `total` ignores range filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UnitPosition {
    pub(crate) done: usize,
    pub(crate) total: usize,
}

impl fmt::Display for UnitPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.done, self.total)
    }
}

#[derive(Debug)]
pub(crate) struct UnitReport {
    pub(crate) episode: Option<EpisodeIndex>,
    pub(crate) position: Option<UnitPosition>,
    pub(crate) result: TranscodeResult,
}

#[derive(Debug, Default)]
pub(crate) struct BatchReport {
    pub(crate) units: Vec<UnitReport>,
}

impl BatchReport {
    pub(crate) fn succeeded(&self) -> usize {
        self.count(|result| matches!(result, TranscodeResult::Success(_)))
    }

    pub(crate) fn skipped(&self) -> usize {
        self.count(|result| matches!(result, TranscodeResult::Skipped(_)))
    }

    pub(crate) fn failed(&self) -> usize {
        self.count(|result| matches!(result, TranscodeResult::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&TranscodeResult) -> bool) -> usize {
        self.units
            .iter()
            .filter(|unit| predicate(&unit.result))
            .count()
    }
}

/// Errors that end the whole run.
#[derive(Debug, Error)]
pub(crate) enum BatchError {
    #[error("{kind} {id} is not available in the catalog")]
    NotAvailable { kind: MediaKind, id: CatalogId },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error("download interrupted by operator")]
    Cancelled,
}

pub(crate) struct BatchController<C, T, L> {
    catalog: C,
    transcoder: T,
    lookup: L,
    catalog_base: Url,
    options: BatchOptions,
    cancel: CancelFlag,
}

impl<C, T, L> BatchController<C, T, L>
where
    C: Catalog,
    T: Transcoder,
    L: TitleLookup,
{
    pub(crate) fn new(
        catalog: C,
        transcoder: T,
        lookup: L,
        catalog_base: Url,
        options: BatchOptions,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            catalog,
            transcoder,
            lookup,
            catalog_base,
            options,
            cancel,
        }
    }

    /// Checks availability, then downloads the movie or the episode matrix.
    pub(crate) fn run(
        &mut self,
        kind: MediaKind,
        id: CatalogId,
    ) -> Result<BatchReport, BatchError> {
        if !self.catalog.exists(kind, id)? {
            return Err(BatchError::NotAvailable { kind, id });
        }

        match kind {
            MediaKind::Movie => self.run_movie(id),
            MediaKind::TvShow => self.run_tv(id),
        }
    }

    pub(crate) fn run_movie(&mut self, id: CatalogId) -> Result<BatchReport, BatchError> {
        let info = self.lookup.lookup(MediaKind::Movie, id);
        let destination = movie_destination(&self.options.output_base, &info);
        info!(%id, title = %info.title, year = %info.year, "movie");

        self.ensure_not_cancelled()?;
        let result = match self.download_unit(MediaKind::Movie, id, None, destination)? {
            TranscodeResult::Failed(FailureCause::TranscodeFailed(err)) => {
                return Err(BatchError::Transcode(err));
            }
            other => other,
        };

        Ok(BatchReport {
            units: vec![UnitReport {
                episode: None,
                position: None,
                result,
            }],
        })
    }

    pub(crate) fn run_tv(&mut self, id: CatalogId) -> Result<BatchReport, BatchError> {
        let episodes = self.catalog.list_episodes(id)?;
        if episodes.is_empty() {
            warn!(%id, "no episodes found");
            return Ok(BatchReport::default());
        }

        let info = self.lookup.lookup(MediaKind::TvShow, id);
        let total: usize = episodes.values().map(BTreeSet::len).sum();
        info!(%id, show = %info.title, year = %info.year, seasons = episodes.len(), total, "show");

        let season_range = self.options.season_range.clone();
        let episode_range = self.options.episode_range.clone();
        let mut report = BatchReport::default();
        let mut done = 0;

        for (&season, numbers) in &episodes {
            if let Some(range) = &season_range
                && !range.contains(&season)
            {
                continue;
            }

            for &episode in numbers {
                if let Some(range) = &episode_range
                    && !range.contains(&episode)
                {
                    continue;
                }

                self.ensure_not_cancelled()?;
                done += 1;
                let index = EpisodeIndex::new(season, episode);
                let position = UnitPosition { done, total };
                info!(%id, "Episode {position} - {index}");

                let destination = episode_destination(&self.options.output_base, &info, index);
                let result = self.download_unit(MediaKind::TvShow, id, Some(index), destination)?;
                let paced = result.ran_transcoder();
                report.units.push(UnitReport {
                    episode: Some(index),
                    position: Some(position),
                    result,
                });

                if paced && !self.options.pace_delay.is_zero() {
                    thread::sleep(self.options.pace_delay);
                }
            }
        }

        Ok(report)
    }

    /// One unit: resume check, page fetch, playlist resolution, transcode.
    /// Failures that only affect this unit come back as `Failed`.
    fn download_unit(
        &mut self,
        kind: MediaKind,
        id: CatalogId,
        episode: Option<EpisodeIndex>,
        destination: PathBuf,
    ) -> Result<TranscodeResult, BatchError> {
        let span = match episode {
            Some(index) => info_span!("unit", %kind, %id, episode = %index),
            None => info_span!("unit", %kind, %id),
        };
        let _entered = span.enter();

        if self.options.resume && has_completed_file(&destination) {
            info!(path = %destination.display(), "skipping existing file");
            return Ok(TranscodeResult::Skipped(SkipReason::AlreadyDownloaded));
        }

        let page = match self.catalog.fetch_playable_page(kind, id, episode) {
            Ok(page) => page,
            Err(err) if err.is_recoverable() => {
                error!(error = %err, "page unavailable");
                return Ok(TranscodeResult::Failed(FailureCause::UnitNotFound(err)));
            }
            Err(err) => return Err(err.into()),
        };

        let resolved =
            extract_playlist(&page).and_then(|token| token.stream_url(&self.catalog_base));
        let stream_url = match resolved {
            Ok(url) => url,
            Err(err) => {
                error!(error = %err, "playlist missing");
                return Ok(TranscodeResult::Failed(FailureCause::PlaylistNotFound(err)));
            }
        };

        info!(path = %destination.display(), "downloading");
        let target = DownloadTarget {
            destination,
            stream_url,
            kind,
        };
        match self.transcoder.transcode(&target) {
            Ok(path) => {
                info!(path = %path.display(), "saved");
                Ok(TranscodeResult::Success(path))
            }
            Err(TranscodeError::Cancelled) => Err(BatchError::Cancelled),
            Err(err) if err.is_recoverable() => {
                error!(error = %err, "transcode failed");
                Ok(TranscodeResult::Failed(FailureCause::TranscodeFailed(err)))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn ensure_not_cancelled(&self) -> Result<(), BatchError> {
        if self.cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }
        Ok(())
    }
}
