mod batch;
mod prompt;


use std::io;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::catalog::CatalogClient;
use crate::cli::Cli;
use crate::config::{Config, FileConfig};
use crate::http::{HttpClient, RetryPolicy};
use crate::logging;
use crate::media::{CatalogId, MediaKind};
use crate::metadata::{CachedLookup, TMDB_BASE_URL, TmdbLookup};
use crate::paths::config_file_path;
use crate::transcode::{CancelFlag, CommandOptions, ConsoleProgress, TranscodeSupervisor};

use self::batch::{BatchController, BatchOptions, BatchReport, TranscodeResult, inclusive_range};

pub fn run(cli: Cli) -> Result<()> {
    let file = FileConfig::discover(cli.config.as_deref(), config_file_path())?;
    let config = Config::resolve(&cli, file)?;
    logging::init(config.debug)?;

    let ffmpeg = config.locate_transcoder()?;
    debug!(ffmpeg = %ffmpeg.display(), "transcoder located");

    let kind = match cli.kind {
        Some(kind) => kind,
        None => prompt::prompt_kind(&mut io::stdin().lock(), &mut io::stdout())?,
    };
    let id = match cli.tmdb_id {
        Some(raw) => raw.to_string().parse::<CatalogId>()?,
        None => prompt::prompt_id(&mut io::stdin().lock(), &mut io::stdout())?,
    };

    let (cancel, _sigint) =
        CancelFlag::install_sigint().context("failed to install interrupt handler")?;
    let mut controller = build_controller(&cli, &config, ffmpeg, cancel);

    info!(%kind, %id, output = %config.output_base.display(), "starting");
    let report = controller.run(kind, id)?;
    info!(
        succeeded = report.succeeded(),
        skipped = report.skipped(),
        failed = report.failed(),
        "finished"
    );
    log_outcomes(kind, id, &report);
    Ok(())
}

/// One line per unit; failures carry enough to retry that unit by hand.
fn log_outcomes(kind: MediaKind, id: CatalogId, report: &BatchReport) {
    for unit in &report.units {
        let episode = unit
            .episode
            .map(|index| index.to_string())
            .unwrap_or_else(|| "-".to_string());
        let position = unit
            .position
            .map(|position| position.to_string())
            .unwrap_or_else(|| "-".to_string());
        match &unit.result {
            TranscodeResult::Success(path) => debug!(%episode, path = %path.display(), "saved"),
            TranscodeResult::Skipped(reason) => debug!(%episode, ?reason, "skipped"),
            TranscodeResult::Failed(cause) => {
                warn!(%kind, %id, %episode, %position, %cause, "unit failed")
            }
        }
    }
}

fn build_controller(
    cli: &Cli,
    config: &Config,
    ffmpeg: std::path::PathBuf,
    cancel: CancelFlag,
) -> BatchController<CatalogClient, TranscodeSupervisor<ConsoleProgress>, CachedLookup<TmdbLookup>>
{
    let catalog = CatalogClient::new(
        HttpClient::new(RetryPolicy::default()),
        config.base_url.clone(),
        config.api_base.clone(),
        config.listing_lang.clone(),
        config.request_timeout,
    );

    // Metadata has a fallback name, so one attempt is enough.
    let lookup = CachedLookup::new(TmdbLookup::new(
        HttpClient::new(RetryPolicy {
            retries: 0,
            ..RetryPolicy::default()
        }),
        TMDB_BASE_URL,
        config.metadata_timeout,
    ));

    let transcoder = TranscodeSupervisor::new(
        ffmpeg,
        CommandOptions {
            verbose: config.debug,
            allow_file_protocol: config.allow_file_protocol,
        },
        cancel.clone(),
        ConsoleProgress::default(),
    );

    let options = BatchOptions {
        output_base: config.output_base.clone(),
        resume: config.resume,
        season_range: inclusive_range(cli.season_from, cli.season_to),
        episode_range: inclusive_range(cli.episode_from, cli.episode_to),
        pace_delay: config.pace_delay,
    };

    BatchController::new(
        catalog,
        transcoder,
        lookup,
        config.base_url.clone(),
        options,
        cancel,
    )
}
