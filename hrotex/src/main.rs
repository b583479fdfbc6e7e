use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use log::*;
use structopt::*;

use hrot::*;

#[derive(Debug, StructOpt)]
#[structopt(name = "hrotex", about = "Dumps an HROT pack into a directory")]
struct Opt {
    /// Pass multiple times for additional verbosity (debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Only print warnings and errors, not each file as it's extracted.
    #[structopt(short, long)]
    quiet: bool,

    /// Prints the entries in the pack instead of extracting them.
    #[structopt(short = "n", long)]
    dry_run: bool,

    /// How many files to write at once (0 for one per core).
    #[structopt(short, long, default_value = "0")]
    jobs: usize,

    /// Reject packs whose table of contents has trailing bytes
    /// instead of ignoring them.
    #[structopt(long)]
    strict_toc: bool,

    #[structopt(name("pack file"))]
    pack_path: PathBuf,

    #[structopt(name("output directory"))]
    output: PathBuf,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    // Info (each file as it's written) by default
    errlog.verbosity(if args.quiet { 1 } else { args.verbosity + 2 });
    errlog.init()?;

    let source = ArchiveSource::open(&args.pack_path)
        .with_context(|| format!("Couldn't open {}", args.pack_path.display()))?;
    let archive = if args.strict_toc {
        HrotArchive::strict(&source)
    } else {
        HrotArchive::new(&source)
    }
    .context("Couldn't load archive")?;

    if args.dry_run {
        print_entries(&archive);
        return Ok(());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    watch_for_interrupt(cancel.clone());

    let sink = DirectorySink::new(&args.output)
        .with_context(|| format!("Couldn't create {}", args.output.display()))?;
    let options = ExtractOptions {
        jobs: args.jobs,
        cancel: Some(cancel),
    };
    let report = extract(&archive, &sink, &options)?;

    // Each skipped entry was already logged as it happened.
    eprintln!(
        "Extracted {} of {} files ({} bytes), skipped {}",
        report.extracted,
        report.total(),
        report.bytes_written,
        report.skipped.len()
    );

    if report.cancelled {
        eprintln!("Interrupted, {} files not extracted", report.not_attempted);
        process::exit(130);
    }
    Ok(())
}

fn print_entries(archive: &HrotArchive) {
    let plan = ExtractPlan::new(archive);
    for entry in &plan.entries {
        println!("{}\t{} bytes", entry.path, entry.data.len());
    }
    for skipped in &plan.skipped {
        println!("{}\tskipped: {}", skipped.name, skipped.error);
    }
}

/// Sets `cancel` on Ctrl-C so extraction stops after the files in flight.
/// A second Ctrl-C quits on the spot.
fn watch_for_interrupt(cancel: Arc<AtomicBool>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!("Couldn't listen for Ctrl-C: {}", e);
                return;
            }
        };
        match runtime.block_on(wait_for_interrupts(tokio::signal::ctrl_c, &cancel)) {
            Ok(()) => {
                eprintln!("Interrupted again, quitting");
                process::exit(130);
            }
            Err(e) => warn!("Stopped listening for Ctrl-C: {}", e),
        }
    });
}

/// Sets `cancel` when `interrupted()` first resolves,
/// and returns once it resolves a second time.
async fn wait_for_interrupts<F, Fut>(mut interrupted: F, cancel: &AtomicBool) -> io::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    interrupted().await?;
    info!("Interrupted, finishing files in flight (Ctrl-C again to quit now)");
    cancel.store(true, Ordering::Relaxed);
    interrupted().await
}
