//! Bulk metadata reader. A fixed pool of workers pulls `(track, path)` jobs
//! off a bounded queue and posts results back to the coordinating thread,
//! which attaches them to the arena; tree order never depends on completion
//! order.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use metadata::{MetadataError, ParseStatus, TagIo, TagView};
use tracing::{debug, warn};

use crate::model::{Library, TrackId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PopulateStats {
    pub read: usize,
    pub unreadable: usize,
    pub cancelled: usize,
}

pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, 8)
}

/// Reads every track's tag exactly once. On return each track carries either
/// a `TagView` (possibly with a non-`Ok` status) or a recorded open failure.
/// When `cancel` is raised, in-flight reads drain and the remaining tracks
/// are marked [`ParseStatus::Cancelled`].
pub fn populate(
    library: &mut Library,
    io: &dyn TagIo,
    workers: usize,
    cancel: &AtomicBool,
) -> PopulateStats {
    let workers = workers.max(1);
    let jobs: Vec<(TrackId, PathBuf)> = library
        .tracks
        .iter()
        .enumerate()
        .map(|(idx, track)| (TrackId(idx), track.path.clone()))
        .collect();
    let expected = jobs.len();

    let (job_tx, job_rx) = bounded::<(TrackId, PathBuf)>(workers * 2);
    let (result_tx, result_rx) = bounded::<(TrackId, Result<TagView, MetadataError>)>(workers * 2);

    let mut stats = PopulateStats::default();

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (id, path) in job_rx.iter() {
                    let result = io.read(&path);
                    if result_tx.send((id, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(result_tx);

        scope.spawn(move || {
            for job in jobs {
                if cancel.load(Ordering::Relaxed) {
                    debug!("populate cancelled; draining in-flight reads");
                    break;
                }
                if job_tx.send(job).is_err() {
                    break;
                }
            }
        });

        for (id, result) in result_rx.iter().take(expected) {
            match result {
                Ok(view) => {
                    stats.read += 1;
                    library.track_mut(id).tag = Some(view);
                }
                Err(err) => {
                    stats.unreadable += 1;
                    let track = library.track_mut(id);
                    warn!(file = %track.path.display(), error = %err, "cannot read file");
                    track.read_error = Some(err.to_string());
                }
            }
        }
    });

    for track in &mut library.tracks {
        if track.tag.is_none() && track.read_error.is_none() {
            track.tag = Some(TagView::with_status(ParseStatus::Cancelled));
            stats.cancelled += 1;
        }
    }

    stats
}
