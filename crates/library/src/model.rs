//! Arena-indexed library tree. Parents own ordered child-id vectors and
//! children keep their parent's id, so walking either direction is an index
//! lookup rather than a reference cycle.

use std::path::{Path, PathBuf};

use common::relpath_from;
use metadata::TagView;
use once_cell::sync::Lazy;
use regex::Regex;

pub const BACKUP_DIR_NAME: &str = "pre-repair-backup";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtistId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlbumId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub usize);

#[derive(Clone, Debug)]
pub struct Artist {
    pub name: String,
    pub path: PathBuf,
    pub albums: Vec<AlbumId>,
}

#[derive(Clone, Debug)]
pub struct Album {
    pub artist: ArtistId,
    pub name: String,
    pub path: PathBuf,
    pub tracks: Vec<TrackId>,
}

impl Album {
    pub fn backup_dir(&self) -> PathBuf {
        self.path.join(BACKUP_DIR_NAME)
    }
}

#[derive(Clone, Debug)]
pub struct Track {
    pub album: AlbumId,
    pub path: PathBuf,
    pub file_name: String,
    pub extension: String,
    /// Filename-derived track number; `None` when the stem does not parse.
    pub number: Option<u32>,
    /// Filename-derived title, underscores replaced and whitespace trimmed.
    pub canonical_title: Option<String>,
    pub tag: Option<TagView>,
    /// Cause of an open failure during populate, if any.
    pub read_error: Option<String>,
}

impl Track {
    pub fn stem(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(idx) => &self.file_name[..idx],
            None => &self.file_name,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Library {
    pub root: PathBuf,
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
    pub tracks: Vec<Track>,
}

impl Library {
    pub fn new(root: PathBuf) -> Self {
        Library {
            root,
            ..Library::default()
        }
    }

    pub fn artist(&self, id: ArtistId) -> &Artist {
        &self.artists[id.0]
    }

    pub fn album(&self, id: AlbumId) -> &Album {
        &self.albums[id.0]
    }

    pub fn track(&self, id: TrackId) -> &Track {
        &self.tracks[id.0]
    }

    pub fn track_mut(&mut self, id: TrackId) -> &mut Track {
        &mut self.tracks[id.0]
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Slash-normalized path relative to the library root, for display and
    /// event fields.
    pub fn display_path(&self, path: &Path) -> String {
        relpath_from(&self.root, path).unwrap_or_else(|| path.to_string_lossy().to_string())
    }

    /// Verifies parent and child ids agree across the arena. Every album id
    /// an artist holds must point back to that artist, and likewise for
    /// tracks; a violation means the tree was assembled or rebuilt wrongly.
    pub fn check_consistency(&self) -> Result<(), String> {
        for (idx, artist) in self.artists.iter().enumerate() {
            for album_id in &artist.albums {
                let album = self.albums.get(album_id.0).ok_or_else(|| {
                    format!("artist \"{}\" references missing album {:?}", artist.name, album_id)
                })?;
                if album.artist.0 != idx {
                    return Err(format!(
                        "album \"{}\" does not point back to artist \"{}\"",
                        album.name, artist.name
                    ));
                }
            }
        }
        for (idx, album) in self.albums.iter().enumerate() {
            for track_id in &album.tracks {
                let track = self.tracks.get(track_id.0).ok_or_else(|| {
                    format!("album \"{}\" references missing track {:?}", album.name, track_id)
                })?;
                if track.album.0 != idx {
                    return Err(format!(
                        "track \"{}\" does not point back to album \"{}\"",
                        track.file_name, album.name
                    ));
                }
            }
        }
        Ok(())
    }

    /// Orders each album's track list by number ascending (unnumbered last),
    /// ties broken by file name.
    pub fn sort_album_tracks(&mut self) {
        let order_key = |track: &Track| (track.number.unwrap_or(u32::MAX), track.file_name.clone());
        let tracks = &self.tracks;
        for album in &mut self.albums {
            album
                .tracks
                .sort_by_key(|id| order_key(&tracks[id.0]));
        }
    }
}

static STEM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3})[ _-]+(.+)$").expect("stem pattern"));

/// Splits a file stem like `"03_Set Fire-to the Rain "` into `(3, "Set Fire-to
/// the Rain")`. Returns `None` when the stem does not carry a numeric prefix.
pub fn parse_file_stem(stem: &str) -> Option<(u32, String)> {
    let caps = STEM_PATTERN.captures(stem)?;
    let number = caps[1].parse().ok()?;
    let name = caps[2].replace('_', " ").trim_end().to_string();
    Some((number, name))
}
