//! Writes an archive's entries out, one file per entry.
//!
//! Each entry in an HROT pack is stored as a plain byte range,
//! so entries can be written out independently of each other,
//! in any order and on as many threads as we'd like.
//! A bad entry (one pointing outside the archive, or with a path that would
//! escape the output directory) is skipped and reported,
//! and the rest of the archive is extracted anyway.
//! So is a later entry whose path an earlier one already took:
//! paths are handed out in TOC order before anything is written.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use log::*;
use rayon::prelude::*;

use crate::read::{Entry, HrotArchive};
use crate::result::*;

/// Somewhere to put extracted entries
///
/// Implementations must be safe to call from several threads at once
/// when extracting in parallel.
pub trait OutputSink: Sync {
    /// Writes `data` to the given relative path,
    /// creating parent directories as needed.
    fn write(&self, path: &Utf8Path, data: &[u8]) -> io::Result<()>;
}

/// Writes entries as files under a root directory.
///
/// Symbolic links are never followed: a link found in place of a directory
/// or file we want to write is an error.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Creates the sink, and the root directory if it doesn't exist yet.
    pub fn new<P: Into<PathBuf>>(root: P) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl OutputSink for DirectorySink {
    fn write(&self, path: &Utf8Path, data: &[u8]) -> io::Result<()> {
        let mut target = self.root.clone();

        if let Some(parent) = path.parent() {
            for component in parent.components() {
                target.push(component.as_str());
                make_dir(&target)?;
            }
        }

        target.push(path.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Path has no file name")
        })?);
        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(symlink_error(&target));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let mut file = File::create(&target)?;
        file.write_all(data)?;
        Ok(())
    }
}

/// Makes a single directory, tolerating one that's already there
/// (possibly because another thread just made it).
fn make_dir(dir: &Path) -> io::Result<()> {
    match fs::symlink_metadata(dir) {
        Ok(meta) if meta.file_type().is_symlink() => Err(symlink_error(dir)),
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and isn't a directory", dir.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::create_dir(dir) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            other => other,
        },
        Err(e) => Err(e),
    }
}

fn symlink_error(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("Refusing to write through symlink {}", path.display()),
    )
}

/// Knobs for [`extract()`]
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// How many entries to write at once.
    ///
    /// 1 extracts on the calling thread,
    /// 0 uses as many threads as Rayon thinks is best.
    pub jobs: usize,

    /// Set this to stop extraction early.
    ///
    /// Entries already written stay where they are.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            cancel: None,
        }
    }
}

impl ExtractOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }
}

/// An entry that couldn't be extracted, and why
#[derive(Debug)]
pub struct SkippedEntry {
    pub index: usize,
    pub name: String,
    pub error: HrotError,
}

/// What happened during an [`extract()`]
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Number of entries written out
    pub extracted: usize,

    /// Total bytes written out
    pub bytes_written: u64,

    /// Entries that were bad or couldn't be written, sorted by TOC index
    pub skipped: Vec<SkippedEntry>,

    /// Entries never looked at because extraction was cancelled
    pub not_attempted: usize,

    /// True if extraction was cancelled before reaching every entry
    pub cancelled: bool,
}

impl ExtractReport {
    /// The number of entries in the archive's table of contents
    pub fn total(&self) -> usize {
        self.extracted + self.skipped.len() + self.not_attempted
    }

    /// Returns true if every entry was extracted.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.not_attempted == 0
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Written(bytes) => {
                self.extracted += 1;
                self.bytes_written += bytes as u64;
            }
            Outcome::Skipped(skipped) => self.skipped.push(skipped),
            Outcome::NotAttempted => {
                self.not_attempted += 1;
                self.cancelled = true;
            }
        }
    }
}

enum Outcome {
    Written(usize),
    Skipped(SkippedEntry),
    NotAttempted,
}

/// The entries an [`extract()`] will write, decided up front in TOC order
///
/// Every planned entry gets a path of its own. When two records want the
/// same path, or one wants a file where another needs a directory,
/// the first record wins and the later one is skipped with
/// [`HrotError::DuplicateEntry`]. Since this is settled before anything is
/// written, the extracted tree doesn't depend on how many threads write it.
#[derive(Debug, Default)]
pub struct ExtractPlan<'a> {
    /// Entries to write, in TOC order
    pub entries: Vec<Entry<'a>>,

    /// Entries that were bad or collided with an earlier one, in TOC order
    pub skipped: Vec<SkippedEntry>,
}

impl<'a> ExtractPlan<'a> {
    /// Resolves every entry in the archive and claims its path.
    pub fn new(archive: &HrotArchive<'a>) -> Self {
        let mut plan = Self::default();
        // Path -> index of the entry that claimed it
        let mut files: BTreeMap<Utf8PathBuf, usize> = BTreeMap::new();
        let mut dirs: BTreeMap<Utf8PathBuf, usize> = BTreeMap::new();

        for metadata in archive.entries() {
            let entry = match archive.resolve(&metadata) {
                Ok(entry) => entry,
                Err(error) => {
                    plan.skip(metadata.index, &metadata.name, error);
                    continue;
                }
            };

            let clash = files
                .get(&entry.path)
                .or_else(|| dirs.get(&entry.path))
                .or_else(|| entry.path.ancestors().skip(1).find_map(|a| files.get(a)));
            if let Some(&first) = clash {
                let error = HrotError::DuplicateEntry {
                    index: entry.index,
                    name: entry.name.clone().into_owned(),
                    path: entry.path.clone(),
                    first,
                };
                plan.skip(entry.index, &entry.name, error);
                continue;
            }

            for ancestor in entry.path.ancestors().skip(1) {
                if ancestor.as_str().is_empty() {
                    break;
                }
                dirs.entry(ancestor.to_owned()).or_insert(entry.index);
            }
            files.insert(entry.path.clone(), entry.index);
            plan.entries.push(entry);
        }
        plan
    }

    fn skip(&mut self, index: usize, name: &str, error: HrotError) {
        warn!("Skipping entry {} ({}): {}", index, name, error);
        self.skipped.push(SkippedEntry {
            index,
            name: name.to_owned(),
            error,
        });
    }
}

/// Extracts every entry in the archive to the given sink.
///
/// Problems with individual entries are logged and collected in the
/// returned report; they don't stop the rest of the archive from being
/// extracted. The only error returned is failing to start worker threads.
///
/// ```no_run
/// # use hrot::*;
/// let source = ArchiveSource::open("assets.pak")?;
/// let archive = HrotArchive::new(&source)?;
/// let sink = DirectorySink::new("assets")?;
/// let report = extract(&archive, &sink, &ExtractOptions::default())?;
/// println!("{} of {} files extracted", report.extracted, report.total());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn extract<S: OutputSink>(
    archive: &HrotArchive,
    sink: &S,
    options: &ExtractOptions,
) -> HrotResult<ExtractReport> {
    let ExtractPlan { entries, skipped } = ExtractPlan::new(archive);
    let mut report = ExtractReport {
        skipped,
        ..ExtractReport::default()
    };

    if options.jobs == 1 {
        for entry in &entries {
            report.record(extract_one(entry, sink, options));
        }
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .build()?;
        let outcomes: Vec<Outcome> = pool.install(|| {
            entries
                .par_iter()
                .map(|entry| extract_one(entry, sink, options))
                .collect()
        });
        for outcome in outcomes {
            report.record(outcome);
        }
    }
    report.skipped.sort_by_key(|s| s.index);

    info!(
        "Extracted {} of {} entries ({} bytes), skipped {}",
        report.extracted,
        report.total(),
        report.bytes_written,
        report.skipped.len()
    );
    if report.cancelled {
        warn!(
            "Extraction cancelled, {} entries not attempted",
            report.not_attempted
        );
    }
    Ok(report)
}

fn extract_one<S: OutputSink>(entry: &Entry, sink: &S, options: &ExtractOptions) -> Outcome {
    if options.cancelled() {
        return Outcome::NotAttempted;
    }

    info!("Extracting {}, size = {} bytes", entry.path, entry.data.len());
    match sink.write(&entry.path, entry.data) {
        Ok(()) => Outcome::Written(entry.data.len()),
        Err(source) => {
            let error = HrotError::Output {
                path: entry.path.clone(),
                source,
            };
            warn!("Skipping entry {} ({}): {}", entry.index, entry.name, error);
            Outcome::Skipped(SkippedEntry {
                index: entry.index,
                name: entry.name.clone().into_owned(),
                error,
            })
        }
    }
}
