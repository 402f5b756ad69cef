//! Reconciliation engine for a `<root>/<artist>/<album>/<NN name>.mp3`
//! library: scan the tree, read every embedded tag, derive per-album
//! consensus values, classify each track's divergences into concerns, and
//! optionally repair the tags after backing the originals up.

pub mod dirty;
pub mod events;
pub mod filter;
pub mod model;
pub mod populate;
pub mod reconcile;
pub mod repair;
pub mod report;
pub mod scan;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use common::ExitClass;
use metadata::{MetadataError, TagIo};
use serde::Serialize;
use tracing::info;

use crate::dirty::DirtyMarker;
use crate::events::{Event, EventSink, Level};
use crate::filter::Filters;
use crate::populate::{default_workers, populate};
use crate::reconcile::reconcile;
use crate::repair::repair;
use crate::report::{render, ConsoleSink};
use crate::scan::scan;

#[derive(Clone, Debug)]
pub struct Options {
    pub root: PathBuf,
    pub extension: String,
    pub artist_filter: String,
    pub album_filter: String,
    pub track_filter: String,
    pub dry_run: bool,
    pub state_dir: Option<PathBuf>,
    pub workers: Option<usize>,
}

impl Options {
    pub fn new(root: PathBuf) -> Options {
        Options {
            root,
            extension: "mp3".to_string(),
            artist_filter: ".*".to_string(),
            album_filter: ".*".to_string(),
            track_filter: ".*".to_string(),
            dry_run: false,
            state_dir: None,
            workers: None,
        }
    }
}

/// End-of-run accounting. `exit` is the most severe class observed.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct RunReport {
    pub examined: usize,
    pub concerned: usize,
    pub repaired: usize,
    pub failed: usize,
    pub exit: ExitClass,
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Metadata(MetadataError),
    Filter(regex::Error),
    InvalidRoot(PathBuf),
    Invariant(String),
}

impl LibraryError {
    pub fn exit_class(&self) -> ExitClass {
        match self {
            LibraryError::Io(_) | LibraryError::Metadata(_) => ExitClass::System,
            LibraryError::Filter(_) | LibraryError::InvalidRoot(_) => ExitClass::User,
            LibraryError::Invariant(_) => ExitClass::Program,
        }
    }
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Metadata(err) => write!(f, "metadata error: {}", err),
            LibraryError::Filter(err) => write!(f, "malformed filter: {}", err),
            LibraryError::InvalidRoot(path) => {
                write!(f, "library root {:?} is not a directory", path)
            }
            LibraryError::Invariant(what) => write!(f, "invariant violated: {}", what),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<MetadataError> for LibraryError {
    fn from(err: MetadataError) -> Self {
        LibraryError::Metadata(err)
    }
}

/// One full engine invocation: scan, filter, populate, reconcile, report,
/// then repair (or the dry-run plan). The caller supplies the tag I/O and
/// both sinks so tests can run the whole pipeline in memory.
pub fn run(
    options: &Options,
    io: &dyn TagIo,
    console: &dyn ConsoleSink,
    events: &dyn EventSink,
    cancel: &AtomicBool,
) -> Result<RunReport, LibraryError> {
    events.emit(Event {
        level: Level::Info,
        kind: "start",
        entity: String::new(),
        message: format!("auditing {:?}", options.root),
    });

    let filters = Filters::compile(
        &options.artist_filter,
        &options.album_filter,
        &options.track_filter,
    )?;
    let library = scan(&options.root, &options.extension)?;
    let mut library = filters.apply(library);
    library.check_consistency().map_err(LibraryError::Invariant)?;

    if library.is_empty() {
        console.line("no tracks matched the library root and filters");
        events.emit(Event {
            level: Level::Error,
            kind: "empty-library",
            entity: String::new(),
            message: "no tracks matched the library root and filters".to_string(),
        });
        return Ok(RunReport {
            exit: ExitClass::User,
            ..RunReport::default()
        });
    }

    let workers = options.workers.unwrap_or_else(default_workers);
    let stats = populate(&mut library, io, workers, cancel);
    info!(
        read = stats.read,
        unreadable = stats.unreadable,
        cancelled = stats.cancelled,
        "metadata populated"
    );

    let tree = reconcile(&library, cancel);
    render(&tree, &library, console, events);

    let state_dir = options
        .state_dir
        .clone()
        .unwrap_or_else(DirtyMarker::default_state_dir);
    let marker = DirtyMarker::new(&state_dir);

    let summary = repair(
        &mut library,
        &tree,
        io,
        &marker,
        console,
        events,
        options.dry_run,
        cancel,
    );

    let report = RunReport {
        examined: library.tracks.len(),
        concerned: tree.track_count(),
        repaired: summary.repaired,
        failed: summary.failed,
        exit: summary.exit,
    };

    console.line(&format!(
        "examined {} / concerned {} / repaired {} / failed {}",
        report.examined, report.concerned, report.repaired, report.failed
    ));
    events.emit(Event {
        level: Level::Info,
        kind: "end",
        entity: String::new(),
        message: format!(
            "examined {} / concerned {} / repaired {} / failed {}",
            report.examined, report.concerned, report.repaired, report.failed
        ),
    });

    Ok(report)
}
