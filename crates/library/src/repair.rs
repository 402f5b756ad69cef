//! Repair executor. Strictly sequential: backups and tag rewrites happen in
//! tree order so outcomes and the dirty-marker creation are reproducible.
//! Failures stay per-track; a backup-directory failure aborts only its album.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use common::ExitClass;
use metadata::TagIo;
use tracing::debug;

use crate::dirty::DirtyMarker;
use crate::events::{Event, EventSink, Level};
use crate::model::Library;
use crate::reconcile::{ConcernKind, ConcernTree, ConcernedTrack};
use crate::report::ConsoleSink;

#[derive(Clone, Debug, PartialEq)]
pub enum RepairOutcome {
    Repaired,
    Planned,
    Skipped { reason: String },
    BackupCollision { backup: PathBuf },
    Failed { cause: String },
}

#[derive(Clone, Debug)]
pub struct TrackRepair {
    pub path: String,
    pub outcome: RepairOutcome,
}

#[derive(Clone, Debug, Default)]
pub struct RepairSummary {
    pub repaired: usize,
    pub failed: usize,
    pub skipped: usize,
    pub exit: ExitClass,
    pub tracks: Vec<TrackRepair>,
}

impl RepairSummary {
    fn record(&mut self, path: String, outcome: RepairOutcome) {
        match &outcome {
            RepairOutcome::Repaired | RepairOutcome::Planned => self.repaired += 1,
            RepairOutcome::Skipped { .. } => self.skipped += 1,
            RepairOutcome::BackupCollision { .. } | RepairOutcome::Failed { .. } => {
                self.failed += 1;
                self.exit = self.exit.merge(ExitClass::System);
            }
        }
        self.tracks.push(TrackRepair { path, outcome });
    }
}

/// Walks the concern tree and repairs every track that has reconciled
/// overrides. In dry-run mode the identical traversal emits the would-be
/// plan instead and touches nothing.
pub fn repair(
    library: &mut Library,
    tree: &ConcernTree,
    io: &dyn TagIo,
    marker: &DirtyMarker,
    console: &dyn ConsoleSink,
    events: &dyn EventSink,
    dry_run: bool,
    cancel: &AtomicBool,
) -> RepairSummary {
    let mut summary = RepairSummary::default();
    let mut marked = false;

    for artist in &tree.artists {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        for album in &artist.albums {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let repairable: Vec<&ConcernedTrack> = album
                .tracks
                .iter()
                .filter(|t| !t.overrides.is_empty() || is_unreadable(t))
                .collect();
            if repairable.is_empty() {
                continue;
            }

            let backup_dir = library.album(album.album).backup_dir();
            if !dry_run && !backup_dir.is_dir() {
                if let Err(err) = fs::create_dir(&backup_dir) {
                    let dir_display = library.display_path(&backup_dir);
                    console.line(&format!(
                        "{}: cannot create backup directory: {}",
                        dir_display, err
                    ));
                    events.emit(Event {
                        level: Level::Error,
                        kind: "system",
                        entity: dir_display,
                        message: format!("cannot create backup directory: {}", err),
                    });
                    summary.exit = summary.exit.merge(ExitClass::System);
                    for track in repairable {
                        let path = library.display_path(&library.track(track.track).path);
                        summary.record(
                            path,
                            RepairOutcome::Skipped {
                                reason: "album backup directory could not be created".to_string(),
                            },
                        );
                    }
                    continue;
                }
            }

            for concerned in repairable {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let outcome = repair_track(
                    library, concerned, &backup_dir, io, marker, console, events, dry_run,
                    &mut marked, &mut summary,
                );
                let path = library.display_path(&library.track(concerned.track).path);
                summary.record(path, outcome);
            }
        }
    }

    summary
}

fn is_unreadable(track: &ConcernedTrack) -> bool {
    track
        .concerns
        .iter()
        .any(|c| matches!(c.kind, ConcernKind::Unreadable { .. }))
}

fn repair_track(
    library: &mut Library,
    concerned: &ConcernedTrack,
    backup_dir: &std::path::Path,
    io: &dyn TagIo,
    marker: &DirtyMarker,
    console: &dyn ConsoleSink,
    events: &dyn EventSink,
    dry_run: bool,
    marked: &mut bool,
    summary: &mut RepairSummary,
) -> RepairOutcome {
    let track = library.track(concerned.track);
    let track_display = library.display_path(&track.path);

    if is_unreadable(concerned) {
        // Rewriting a file whose frames we could not read would destroy
        // whatever is in there; refuse before any backup is taken. A dry
        // run reports the refusal as part of the plan instead of failing.
        if dry_run {
            console.line(&format!(
                "{}: would fail: tag is unreadable",
                track_display
            ));
            events.emit(Event {
                level: Level::Info,
                kind: "plan",
                entity: track_display,
                message: "would fail: tag is unreadable".to_string(),
            });
            return RepairOutcome::Skipped {
                reason: "tag is unreadable".to_string(),
            };
        }
        console.line(&format!("{}: repair failed: tag is unreadable", track_display));
        events.emit(Event {
            level: Level::Error,
            kind: "repair-failed",
            entity: track_display,
            message: "tag is unreadable".to_string(),
        });
        return RepairOutcome::Failed {
            cause: "tag is unreadable".to_string(),
        };
    }

    let number = match concerned.number {
        Some(number) => number,
        None => {
            console.line(&format!(
                "{}: skipped: no track number to name a backup with",
                track_display
            ));
            return RepairOutcome::Skipped {
                reason: "file name carries no track number".to_string(),
            };
        }
    };
    let backup = backup_dir.join(format!("{}.{}", number, track.extension));

    if dry_run {
        console.line(&format!(
            "{}: would back up to {} and set {}",
            track_display,
            library.display_path(&backup),
            describe_overrides(concerned),
        ));
        events.emit(Event {
            level: Level::Info,
            kind: "plan",
            entity: track_display,
            message: format!("would set {}", describe_overrides(concerned)),
        });
        return RepairOutcome::Planned;
    }

    if backup.exists() {
        // Never overwrite an earlier backup; the first original wins.
        console.line(&format!(
            "{}: backup collision: {} already exists",
            track_display,
            library.display_path(&backup)
        ));
        events.emit(Event {
            level: Level::Error,
            kind: "backup-collision",
            entity: track_display,
            message: format!("backup {} already exists", library.display_path(&backup)),
        });
        return RepairOutcome::BackupCollision { backup };
    }

    if let Err(err) = fs::copy(&track.path, &backup) {
        console.line(&format!("{}: backup failed: {}", track_display, err));
        events.emit(Event {
            level: Level::Error,
            kind: "repair-failed",
            entity: track_display,
            message: format!("backup failed: {}", err),
        });
        return RepairOutcome::Failed {
            cause: format!("backup failed: {}", err),
        };
    }
    debug!(file = %track_display, backup = %backup.display(), "backed up original");

    let view = track.tag.clone().unwrap_or_default();
    match io.write(&track.path, &view, &concerned.overrides) {
        Ok(written) => {
            library.track_mut(concerned.track).tag = Some(written);
            if !*marked {
                match marker.mark() {
                    Ok(()) => *marked = true,
                    Err(err) => {
                        // Non-fatal for the track, but the run exits with a
                        // system error so the host never misses a reset.
                        events.emit(Event {
                            level: Level::Error,
                            kind: "system",
                            entity: track_display.clone(),
                            message: format!("cannot write dirty marker: {}", err),
                        });
                        summary.exit = summary.exit.merge(ExitClass::System);
                    }
                }
            }
            console.line(&format!(
                "{}: set {}",
                track_display,
                describe_overrides(concerned)
            ));
            events.emit(Event {
                level: Level::Info,
                kind: "repaired",
                entity: track_display,
                message: format!("set {}", describe_overrides(concerned)),
            });
            RepairOutcome::Repaired
        }
        Err(err) => {
            // The backup stays in place; the original may be partially
            // written.
            console.line(&format!("{}: repair failed: {}", track_display, err));
            events.emit(Event {
                level: Level::Error,
                kind: "repair-failed",
                entity: track_display,
                message: err.to_string(),
            });
            RepairOutcome::Failed {
                cause: err.to_string(),
            }
        }
    }
}

fn describe_overrides(concerned: &ConcernedTrack) -> String {
    let parts: Vec<String> = concerned
        .overrides
        .iter()
        .map(|(field, value)| format!("{}=\"{}\"", field, value))
        .collect();
    parts.join(", ")
}
