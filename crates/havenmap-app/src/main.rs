use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
    time::Duration,
};

use futures_util::stream::{Stream, StreamExt};
use havenmap_app::cli::{Cli, Commands, GeohashCommands, GetArgs, ImportArgs, ListArgs};
use havenmap_app::config::{self, AppConfig};
use havenmap_app::error::AppError;
use havenmap_app::ingestion::{
    IngestError, IngestEvent, IngestSummary, ManifestEntry, ManifestWriter, SpreadsheetIngestor,
};
use havenmap_app::paths::AppPaths;
use havenmap_app::pipeline::{Coordinates, Record, geohash};
use havenmap_app::services::{Bootstrap, GoogleGeocoder};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde_json::json;
use tracing_subscriber::{filter::LevelFilter, fmt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let verbosity = cli.verbose;

    match cli.command {
        Some(Commands::Import(args)) => run_import(args, verbosity).await?,
        Some(Commands::Get(args)) => run_get(args).await?,
        Some(Commands::List(args)) => run_list(args).await?,
        Some(Commands::Geohash(command)) => run_geohash(command)?,
        None => Cli::print_help(),
    }

    Ok(())
}

fn open_bootstrap(cfg: &AppConfig) -> Result<Bootstrap, AppError> {
    let source = cfg.credential_source()?;
    Ok(Bootstrap::from_storage(source.as_ref(), &cfg.storage)?)
}

async fn run_import(args: ImportArgs, verbosity: u8) -> Result<(), AppError> {
    let cfg = config::load()?;
    let api_key = args
        .api_key
        .or_else(|| cfg.geocoding.api_key.clone())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            AppError::Config(
                "geocoding API key missing: pass --api-key or set geocoding.api_key".to_string(),
            )
        })?;
    let collection = args
        .collection
        .unwrap_or_else(|| cfg.storage.collection.clone());

    let bootstrap = open_bootstrap(&cfg)?;
    let geocoder = GoogleGeocoder::with_endpoint(&cfg.geocoding.endpoint, api_key)?;
    let ingestor = SpreadsheetIngestor::builder()
        .geocoder(Arc::new(geocoder))
        .store(bootstrap.store.clone())
        .collection(collection)
        .layout(cfg.import.columns)
        .build();

    tracing::info!(
        input = %args.input.display(),
        backend = %cfg.storage.backend,
        collection = ingestor.collection(),
        "starting spreadsheet import"
    );

    let manifest = if args.no_manifest {
        ManifestSlot::Disabled
    } else {
        ManifestSlot::Pending(cfg.storage.path.clone())
    };

    let progress = (verbosity == 0).then(make_progress_bar);
    let mut tracker = ImportTracker::new(progress.clone(), manifest);
    let mut stream = Box::pin(ingestor.ingest_stream(&args.input));
    let result = process_import_stream(&mut stream, &mut tracker).await;
    drop(stream);

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            if let Some(pb) = progress {
                pb.abandon_with_message("Import aborted");
            }
            tracker.close_manifest().await;
            bootstrap.shutdown();
            return Err(err);
        }
    };

    finish_import_progress(progress, &summary);
    tracker.close_manifest().await;
    bootstrap.shutdown();

    println!(
        "imported {} of {} rows ({} geocoded, {} skipped, {} failed writes)",
        summary.stored, summary.rows, summary.geocoded, summary.skipped, summary.store_failed
    );
    Ok(())
}

/// The ledger is opened on the first stored record, so an import that aborts
/// on an unusable input leaves no empty ledger behind.
enum ManifestSlot {
    Disabled,
    Pending(PathBuf),
    Open(ManifestWriter),
}

async fn open_manifest(data_dir: &Path) -> Option<ManifestWriter> {
    let path = match AppPaths::new(data_dir) {
        Ok(paths) => paths.import_manifest_path(),
        Err(err) => {
            tracing::warn!(error = %err, "import manifest disabled");
            return None;
        }
    };

    match ManifestWriter::open(&path).await {
        Ok(writer) => {
            tracing::debug!(path = %path.display(), "opened import manifest");
            Some(writer)
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "import manifest disabled");
            None
        }
    }
}

async fn process_import_stream<S>(
    stream: &mut S,
    tracker: &mut ImportTracker,
) -> Result<IngestSummary, AppError>
where
    S: Stream<Item = Result<IngestEvent, IngestError>> + Unpin,
{
    let mut summary = IngestSummary::default();
    while let Some(event) = stream.next().await {
        if let Some(done) = tracker.handle_event(event?).await {
            summary = done;
        }
    }
    Ok(summary)
}

struct ImportTracker {
    progress: Option<ProgressBar>,
    manifest: ManifestSlot,
}

impl ImportTracker {
    fn new(progress: Option<ProgressBar>, manifest: ManifestSlot) -> Self {
        Self { progress, manifest }
    }

    async fn manifest(&mut self) -> Option<&mut ManifestWriter> {
        if let ManifestSlot::Pending(data_dir) = &self.manifest {
            let opened = open_manifest(data_dir).await;
            self.manifest = match opened {
                Some(writer) => ManifestSlot::Open(writer),
                None => ManifestSlot::Disabled,
            };
        }
        match &mut self.manifest {
            ManifestSlot::Open(writer) => Some(writer),
            _ => None,
        }
    }

    async fn handle_event(&mut self, event: IngestEvent) -> Option<IngestSummary> {
        match event {
            IngestEvent::Started { rows } => {
                if let Some(pb) = self.progress.as_ref() {
                    pb.set_length(rows as u64);
                    pb.set_message("reading rows".to_string());
                }
            }
            IngestEvent::RowStored {
                row,
                record_id,
                geohash,
                geocoded,
            } => {
                self.bump_position();

                if let Some(manifest) = self.manifest().await {
                    let entry = ManifestEntry::new(record_id.clone(), row, geohash.clone());
                    if let Err(e) = manifest.write(&entry).await {
                        tracing::warn!(
                            record_id = %record_id,
                            row,
                            error = %e,
                            "failed to write manifest entry"
                        );
                    }
                }

                if let Some(pb) = self.progress.as_ref() {
                    pb.set_message(format!("stored row {row} ({geohash})"));
                } else {
                    tracing::info!(row, record_id = %record_id, geohash = %geohash, geocoded, "stored record");
                }
            }
            IngestEvent::RowSkipped { row, reason } => {
                self.bump_position();
                if let Some(pb) = self.progress.as_ref() {
                    pb.set_message(format!("skipped row {row}: {reason}"));
                }
            }
            IngestEvent::StoreFailed { row, .. } => {
                self.bump_position();
                if let Some(pb) = self.progress.as_ref() {
                    pb.set_message(format!("write failed for row {row}"));
                }
            }
            IngestEvent::Completed { summary } => return Some(summary),
        }

        None
    }

    fn bump_position(&self) {
        if let Some(pb) = self.progress.as_ref() {
            pb.inc(1);
        }
    }

    async fn close_manifest(&mut self) {
        if let ManifestSlot::Open(manifest) =
            std::mem::replace(&mut self.manifest, ManifestSlot::Disabled)
        {
            let path = manifest.path().to_path_buf();
            if let Err(e) = manifest.close().await {
                tracing::warn!(path = %path.display(), error = %e, "failed to flush import manifest");
            }
        }
    }
}

fn finish_import_progress(progress: Option<ProgressBar>, summary: &IngestSummary) {
    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Completed: {}/{} stored ({} skipped, {} failed)",
            summary.stored, summary.rows, summary.skipped, summary.store_failed
        ));
    }
}

async fn run_get(args: GetArgs) -> Result<(), AppError> {
    let cfg = config::load()?;
    let collection = args
        .collection
        .unwrap_or_else(|| cfg.storage.collection.clone());
    let bootstrap = open_bootstrap(&cfg)?;

    let document = bootstrap
        .store
        .get(&collection, &args.id)
        .await?
        .ok_or_else(|| AppError::RecordNotFound {
            collection: collection.clone(),
            id: args.id.clone(),
        })?;
    let record = Record::from_representation(&document)?;
    let representation = record.to_representation();

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&representation)?
    } else {
        serde_json::to_string(&representation)?
    };
    println!("{rendered}");

    bootstrap.shutdown();
    Ok(())
}

async fn run_list(args: ListArgs) -> Result<(), AppError> {
    let cfg = config::load()?;
    let collection = args
        .collection
        .unwrap_or_else(|| cfg.storage.collection.clone());
    let bootstrap = open_bootstrap(&cfg)?;

    let ids = bootstrap.store.list(&collection).await?;
    tracing::info!(collection = %collection, count = ids.len(), "listed records");
    for id in ids {
        println!("{id}");
    }

    bootstrap.shutdown();
    Ok(())
}

fn run_geohash(command: GeohashCommands) -> Result<(), AppError> {
    match command {
        GeohashCommands::Encode(args) => {
            let coordinates = Coordinates::new(args.latitude, args.longitude)?;
            println!("{}", geohash::encode(coordinates, args.precision)?);
        }
        GeohashCommands::Decode(args) => {
            let bbox = geohash::decode_bbox(&args.hash)?;
            let center = bbox.center();
            let rendered = json!({
                "latitude": center.latitude(),
                "longitude": center.longitude(),
                "latitude_error": bbox.latitude_error(),
                "longitude_error": bbox.longitude_error(),
                "bbox": {
                    "min_latitude": bbox.min_latitude,
                    "max_latitude": bbox.max_latitude,
                    "min_longitude": bbox.min_longitude,
                    "max_longitude": bbox.max_longitude,
                },
            });
            println!("{rendered}");
        }
    }
    Ok(())
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command.as_ref() {
        Some(Commands::Import(_)) => match cli.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        Some(Commands::Get(_) | Commands::List(_) | Commands::Geohash(_)) => match cli.verbose {
            0 => LevelFilter::OFF,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        None => LevelFilter::WARN,
    }
}

fn make_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {pos}/{len} rows ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
