//! Consensus and classification. Walks a populated library and produces a
//! concern tree mirroring it: per-album canonical values for genre, year and
//! disc by strict majority, per-track conflicts against the filesystem and
//! those canonical values. Output is deterministic for identical input.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use common::nfc;
use metadata::{FieldKind, Overrides, ParseStatus, TagView};

use crate::model::{AlbumId, ArtistId, Library, TrackId};

/// Fields whose authority is the per-album consensus rather than the
/// filesystem.
pub const CONSENSUS_FIELDS: [FieldKind; 3] = [FieldKind::Genre, FieldKind::Year, FieldKind::Disc];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConcernKind {
    Conflict {
        field: FieldKind,
        actual: Option<String>,
        expected: String,
    },
    Unreadable {
        cause: String,
    },
    MissingTag {
        field: FieldKind,
    },
    NumberingGap {
        after: u32,
        next: u32,
    },
    DuplicateNumber {
        number: u32,
    },
    Naming {
        file_name: String,
    },
}

impl ConcernKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConcernKind::Conflict { .. } => "conflict",
            ConcernKind::Unreadable { .. } => "unreadable",
            ConcernKind::MissingTag { .. } => "missing-tag",
            ConcernKind::NumberingGap { .. } | ConcernKind::DuplicateNumber { .. } => {
                "numbering-gap"
            }
            ConcernKind::Naming { .. } => "naming",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ConcernKind::Conflict { .. } | ConcernKind::Naming { .. } => Severity::Warn,
            ConcernKind::Unreadable { .. } => Severity::Error,
            ConcernKind::MissingTag { .. }
            | ConcernKind::NumberingGap { .. }
            | ConcernKind::DuplicateNumber { .. } => Severity::Info,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Concern {
    pub kind: ConcernKind,
    pub severity: Severity,
    pub message: String,
}

impl Concern {
    fn new(kind: ConcernKind, message: String) -> Concern {
        let severity = kind.severity();
        Concern {
            kind,
            severity,
            message,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConcernedTrack {
    pub track: TrackId,
    pub number: Option<u32>,
    pub file_name: String,
    pub concerns: Vec<Concern>,
    /// Reconciled values the repair stage writes, in fixed field order.
    pub overrides: Overrides,
}

#[derive(Clone, Debug)]
pub struct ConcernedAlbum {
    pub album: AlbumId,
    pub name: String,
    pub concerns: Vec<Concern>,
    pub tracks: Vec<ConcernedTrack>,
}

#[derive(Clone, Debug)]
pub struct ConcernedArtist {
    pub artist: ArtistId,
    pub name: String,
    pub concerns: Vec<Concern>,
    pub albums: Vec<ConcernedAlbum>,
}

#[derive(Clone, Debug, Default)]
pub struct ConcernTree {
    pub artists: Vec<ConcernedArtist>,
}

impl ConcernTree {
    pub fn is_empty(&self) -> bool {
        self.artists.is_empty()
    }

    pub fn track_count(&self) -> usize {
        self.artists
            .iter()
            .flat_map(|a| &a.albums)
            .map(|a| a.tracks.len())
            .sum()
    }

    pub fn concern_count(&self) -> usize {
        self.artists
            .iter()
            .map(|artist| {
                artist.concerns.len()
                    + artist
                        .albums
                        .iter()
                        .map(|album| {
                            album.concerns.len()
                                + album.tracks.iter().map(|t| t.concerns.len()).sum::<usize>()
                        })
                        .sum::<usize>()
            })
            .sum()
    }
}

/// Per-album canonical values. `None` means no strict majority exists and
/// the field imposes nothing on the album's tracks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlbumConsensus {
    pub genre: Option<String>,
    pub year: Option<String>,
    pub disc: Option<String>,
}

impl AlbumConsensus {
    pub fn field(&self, kind: FieldKind) -> Option<&str> {
        match kind {
            FieldKind::Genre => self.genre.as_deref(),
            FieldKind::Year => self.year.as_deref(),
            FieldKind::Disc => self.disc.as_deref(),
            _ => None,
        }
    }
}

/// Strict majority over non-empty values: a value wins when it occurs in
/// more than half of the non-empty samples. A 50/50 split has no winner.
pub fn strict_majority<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut total = 0usize;
    for value in values {
        total += 1;
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .find(|(_, count)| count * 2 > total)
        .map(|(value, _)| value.to_string())
}

pub fn album_consensus(library: &Library, album: AlbumId) -> AlbumConsensus {
    let views: Vec<&TagView> = library
        .album(album)
        .tracks
        .iter()
        .filter_map(|id| library.track(*id).tag.as_ref())
        .filter(|view| view.status == ParseStatus::Ok)
        .collect();

    let canonical = |kind: FieldKind| {
        let values: Vec<String> = views.iter().filter_map(|view| view.field(kind)).collect();
        strict_majority(values.iter().map(String::as_str))
    };

    AlbumConsensus {
        genre: canonical(FieldKind::Genre),
        year: canonical(FieldKind::Year),
        disc: canonical(FieldKind::Disc),
    }
}

pub fn reconcile(library: &Library, cancel: &AtomicBool) -> ConcernTree {
    let mut tree = ConcernTree::default();

    for (artist_idx, artist) in library.artists.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let mut concerned_artist = ConcernedArtist {
            artist: ArtistId(artist_idx),
            name: artist.name.clone(),
            concerns: Vec::new(),
            albums: Vec::new(),
        };

        for album_id in &artist.albums {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let album = library.album(*album_id);
            let consensus = album_consensus(library, *album_id);
            let mut concerned_album = ConcernedAlbum {
                album: *album_id,
                name: album.name.clone(),
                concerns: numbering_concerns(library, *album_id),
                tracks: Vec::new(),
            };

            for track_id in &album.tracks {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let concerned = classify_track(library, *track_id, &consensus);
                if !concerned.concerns.is_empty() || !concerned.overrides.is_empty() {
                    concerned_album.tracks.push(concerned);
                }
            }

            if !concerned_album.concerns.is_empty() || !concerned_album.tracks.is_empty() {
                concerned_artist.albums.push(concerned_album);
            }
        }

        if !concerned_artist.concerns.is_empty() || !concerned_artist.albums.is_empty() {
            tree.artists.push(concerned_artist);
        }
    }

    tree
}

fn numbering_concerns(library: &Library, album_id: AlbumId) -> Vec<Concern> {
    let mut concerns = Vec::new();
    let mut numbers: Vec<u32> = library
        .album(album_id)
        .tracks
        .iter()
        .filter_map(|id| library.track(*id).number)
        .collect();
    numbers.sort_unstable();

    for window in numbers.windows(2) {
        let (prev, next) = (window[0], window[1]);
        if next == prev {
            concerns.push(Concern::new(
                ConcernKind::DuplicateNumber { number: next },
                format!("track number {} appears more than once", next),
            ));
        } else if next > prev + 1 {
            concerns.push(Concern::new(
                ConcernKind::NumberingGap { after: prev, next },
                format!("track numbers jump from {} to {}", prev, next),
            ));
        }
    }
    concerns.dedup();
    concerns
}

fn classify_track(library: &Library, track_id: TrackId, consensus: &AlbumConsensus) -> ConcernedTrack {
    let track = library.track(track_id);
    let album = library.album(track.album);
    let artist = library.artist(album.artist);

    let mut concerns = Vec::new();
    let mut overrides: Overrides = Vec::new();

    if let Some(cause) = &track.read_error {
        concerns.push(Concern::new(
            ConcernKind::Unreadable {
                cause: cause.clone(),
            },
            format!("file could not be read: {}", cause),
        ));
        return ConcernedTrack {
            track: track_id,
            number: track.number,
            file_name: track.file_name.clone(),
            concerns,
            overrides,
        };
    }

    if track.canonical_title.is_none() {
        concerns.push(Concern::new(
            ConcernKind::Naming {
                file_name: track.file_name.clone(),
            },
            format!(
                "file name \"{}\" does not follow the \"<NN> <name>\" pattern",
                track.file_name
            ),
        ));
    }

    let view = match &track.tag {
        Some(view) => view,
        None => {
            return ConcernedTrack {
                track: track_id,
                number: track.number,
                file_name: track.file_name.clone(),
                concerns,
                overrides,
            }
        }
    };

    match view.status {
        ParseStatus::Ok | ParseStatus::Missing => {
            // A wholly missing tag is an all-fields-empty view: the
            // filesystem and the album consensus can rebuild it.
            filesystem_conflicts(&mut concerns, &mut overrides, track, view, &artist.name, &album.name);
            consensus_conflicts(&mut concerns, &mut overrides, view, consensus);
        }
        ParseStatus::Malformed => {
            concerns.push(Concern::new(
                ConcernKind::Unreadable {
                    cause: "malformed tag".to_string(),
                },
                "tag header is present but malformed".to_string(),
            ));
        }
        ParseStatus::UnsupportedVersion => {
            concerns.push(Concern::new(
                ConcernKind::Unreadable {
                    cause: "unsupported tag version".to_string(),
                },
                "tag version is not supported".to_string(),
            ));
        }
        ParseStatus::Cancelled => {}
    }

    ConcernedTrack {
        track: track_id,
        number: track.number,
        file_name: track.file_name.clone(),
        concerns,
        overrides,
    }
}

/// The filesystem is authoritative for artist, album, title and number.
fn filesystem_conflicts(
    concerns: &mut Vec<Concern>,
    overrides: &mut Overrides,
    track: &crate::model::Track,
    view: &TagView,
    artist_name: &str,
    album_name: &str,
) {
    name_conflict(
        concerns,
        overrides,
        FieldKind::Artist,
        view.artist.as_deref(),
        artist_name,
        "directory name",
    );
    name_conflict(
        concerns,
        overrides,
        FieldKind::Album,
        view.album.as_deref(),
        album_name,
        "directory name",
    );

    if let Some(title) = &track.canonical_title {
        name_conflict(
            concerns,
            overrides,
            FieldKind::Title,
            view.title.as_deref(),
            title,
            "file name",
        );
    }

    if let Some(number) = track.number {
        if view.track_no != Some(number) {
            let actual = view.track_no.map(|n| n.to_string());
            concerns.push(Concern::new(
                ConcernKind::Conflict {
                    field: FieldKind::TrackNumber,
                    actual: actual.clone(),
                    expected: number.to_string(),
                },
                match actual {
                    Some(actual) => format!(
                        "track-number tag {} does not match file name number {}; the file name is authoritative",
                        actual, number
                    ),
                    None => format!(
                        "track-number tag is empty; file name number {} is authoritative",
                        number
                    ),
                },
            ));
            overrides.push((FieldKind::TrackNumber, number.to_string()));
        }
    }
}

fn name_conflict(
    concerns: &mut Vec<Concern>,
    overrides: &mut Overrides,
    field: FieldKind,
    actual: Option<&str>,
    expected: &str,
    authority: &str,
) {
    let matches = actual.map(|value| nfc(value) == nfc(expected)).unwrap_or(false);
    if matches {
        return;
    }
    concerns.push(Concern::new(
        ConcernKind::Conflict {
            field,
            actual: actual.map(str::to_owned),
            expected: expected.to_string(),
        },
        match actual {
            Some(actual) => format!(
                "{} tag \"{}\" does not match {} \"{}\"; the {} is authoritative",
                field, actual, authority, expected, authority
            ),
            None => format!(
                "{} tag is empty; {} \"{}\" is authoritative",
                field, authority, expected
            ),
        },
    ));
    overrides.push((field, expected.to_string()));
}

/// The album consensus is authoritative for genre, year and disc, but only
/// when a strict majority exists. Empty values never conflict; they are
/// reported as missing and filled from the consensus where one exists.
fn consensus_conflicts(
    concerns: &mut Vec<Concern>,
    overrides: &mut Overrides,
    view: &TagView,
    consensus: &AlbumConsensus,
) {
    for field in CONSENSUS_FIELDS {
        let actual = view.field(field);
        let canonical = consensus.field(field);
        match (actual, canonical) {
            (Some(actual), Some(canonical)) => {
                if actual != canonical {
                    concerns.push(Concern::new(
                        ConcernKind::Conflict {
                            field,
                            actual: Some(actual.clone()),
                            expected: canonical.to_string(),
                        },
                        format!(
                            "{} tag \"{}\" does not match album consensus \"{}\"; the consensus is authoritative",
                            field, actual, canonical
                        ),
                    ));
                    overrides.push((field, canonical.to_string()));
                }
            }
            (None, Some(canonical)) => {
                concerns.push(Concern::new(
                    ConcernKind::MissingTag { field },
                    format!(
                        "{} tag is empty; album consensus \"{}\" will be applied",
                        field, canonical
                    ),
                ));
                overrides.push((field, canonical.to_string()));
            }
            (None, None) => {
                concerns.push(Concern::new(
                    ConcernKind::MissingTag { field },
                    format!("{} tag is empty and the album has no consensus value", field),
                ));
            }
            (Some(_), None) => {}
        }
    }
}
