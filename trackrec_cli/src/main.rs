use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use trackrec_core::persistence::restore;
use trackrec_core::*;

#[derive(Parser)]
#[command(name = "trackrec")]
#[command(about = "GPS track recorder with GPX export", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Record samples from a `lat,lon` CSV file, appending to the stored track
    Record {
        /// CSV file with one `lat,lon` fix per row
        #[arg(long)]
        input: PathBuf,

        /// Delay between replayed samples
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,

        /// Print every point as it is recorded
        #[arg(long)]
        follow: bool,
    },

    /// Show the stored track
    Status {
        /// Also recompute the distance from the points
        #[arg(long)]
        verify: bool,
    },

    /// Export the stored track as a GPX file
    Export {
        /// Directory to write the GPX file into
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Erase the stored track
    Clear,
}

struct Context {
    config: Config,
    data_dir: PathBuf,
}

impl Context {
    fn slot(&self) -> FileSlot {
        FileSlot::new(&self.data_dir)
    }

    fn record_key(&self) -> &str {
        &self.config.storage.record_key
    }

    fn writer(&self, slot: FileSlot) -> Box<dyn RecordWriter> {
        if self.config.storage.background_writes {
            Box::new(BackgroundWriter::spawn(slot, self.record_key()))
        } else {
            Box::new(SlotWriter::new(slot, self.record_key()))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_with_level(logging::level_for(cli.verbose, cli.quiet));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| config.storage.data_dir.clone());
    let ctx = Context { config, data_dir };

    match cli.command {
        Commands::Record {
            input,
            interval_ms,
            follow,
        } => cmd_record(&ctx, &input, interval_ms, follow),
        Commands::Status { verify } => cmd_status(&ctx, verify),
        Commands::Export { out_dir } => cmd_export(&ctx, out_dir),
        Commands::Clear => cmd_clear(&ctx),
    }
}

fn cmd_record(ctx: &Context, input: &Path, interval_ms: u64, follow: bool) -> Result<()> {
    let source = ReplaySource::from_csv_path(input)?.with_interval(Duration::from_millis(interval_ms));

    let mut slot = ctx.slot();
    let record = restore(&mut slot, ctx.record_key());

    let mut store = TrackStore::new(source, ctx.writer(slot))
        .with_watch_options(ctx.config.source.watch_options());
    store.subscribe_observer(Box::new(RecordingNotifier::new(LogNotifier)));
    if follow {
        store.subscribe_observer(Box::new(|event: &TrackEvent| {
            if let TrackEvent::PointAdded {
                point,
                point_count,
                total_distance_km,
            } = event
            {
                println!(
                    "#{:<5} {:.5}, {:.5}  {:.2} km",
                    point_count, point.latitude, point.longitude, total_distance_km
                );
            }
        }));
    }

    store.load(record)?;
    let before = store.track().len();

    store.start()?;
    store.run_until_idle();
    store.flush();

    println!("✓ Recorded {} points", store.track().len() - before);
    print_track(store.track());
    Ok(())
}

fn cmd_status(ctx: &Context, verify: bool) -> Result<()> {
    let track = restore(&mut ctx.slot(), ctx.record_key()).into_track();

    print_track(&track);
    if verify {
        let recomputed = track.recomputed_distance();
        println!("Recomputed: {:.2} km", recomputed);
        if (recomputed - track.total_distance_km()).abs() > 1e-6 {
            println!("⚠ Stored distance differs from the recorded points");
        }
    }
    Ok(())
}

fn cmd_export(ctx: &Context, out_dir: Option<PathBuf>) -> Result<()> {
    let track = restore(&mut ctx.slot(), ctx.record_key()).into_track();

    let exported_at = Utc::now();
    let document = render_gpx(&track, exported_at, &ctx.config.export.options())?;

    let out_dir = out_dir.unwrap_or_else(|| ctx.config.export.export_dir.clone());
    let mut sink = DirectorySink::new(out_dir);
    let path = sink.write_document(&export_file_name(exported_at), &document)?;

    println!("✓ Track saved to {}", path.display());
    Ok(())
}

fn cmd_clear(ctx: &Context) -> Result<()> {
    let mut slot = ctx.slot();
    let record = restore(&mut slot, ctx.record_key());

    // An idle store never touches its source
    let mut store = TrackStore::new(
        ReplaySource::new(Vec::new()),
        SlotWriter::new(slot, ctx.record_key()),
    );
    store.load(record)?;
    store.clear();

    println!("✓ Track cleared");
    Ok(())
}

fn print_track(track: &Track) {
    println!("Points: {}", track.len());
    println!("Distance: {:.2} km", track.total_distance_km());
    match track.last_point() {
        Some(p) => println!("Coordinates: {:.5}, {:.5}", p.latitude, p.longitude),
        None => println!("Coordinates: --"),
    }
}
