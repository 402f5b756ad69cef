//! Include filters applied between scan and populate. A node survives when
//! its own name matches its regex and every ancestor matched too; the arena
//! is rebuilt so ids stay dense.

use regex::Regex;

use crate::model::{Album, AlbumId, Artist, ArtistId, Library, TrackId};
use crate::LibraryError;

pub struct Filters {
    artist: Regex,
    album: Regex,
    track: Regex,
}

impl Filters {
    pub fn compile(artist: &str, album: &str, track: &str) -> Result<Filters, LibraryError> {
        Ok(Filters {
            artist: Regex::new(artist).map_err(LibraryError::Filter)?,
            album: Regex::new(album).map_err(LibraryError::Filter)?,
            track: Regex::new(track).map_err(LibraryError::Filter)?,
        })
    }

    /// Keeps matching nodes, dropping albums and artists left without any
    /// tracks. Filters never add concerns; they only shrink the tree.
    pub fn apply(&self, library: Library) -> Library {
        let mut out = Library::new(library.root.clone());

        for artist in &library.artists {
            if !self.artist.is_match(&artist.name) {
                continue;
            }
            let artist_id = ArtistId(out.artists.len());
            let mut kept_artist = Artist {
                name: artist.name.clone(),
                path: artist.path.clone(),
                albums: Vec::new(),
            };

            for album_id in &artist.albums {
                let album = library.album(*album_id);
                if !self.album.is_match(&album.name) {
                    continue;
                }
                let new_album_id = AlbumId(out.albums.len());
                let mut kept_album = Album {
                    artist: artist_id,
                    name: album.name.clone(),
                    path: album.path.clone(),
                    tracks: Vec::new(),
                };

                for track_id in &album.tracks {
                    let track = library.track(*track_id);
                    if !self.track.is_match(track.stem()) {
                        continue;
                    }
                    let new_track_id = TrackId(out.tracks.len());
                    let mut kept_track = track.clone();
                    kept_track.album = new_album_id;
                    out.tracks.push(kept_track);
                    kept_album.tracks.push(new_track_id);
                }

                if kept_album.tracks.is_empty() {
                    continue;
                }
                out.albums.push(kept_album);
                kept_artist.albums.push(new_album_id);
            }

            if kept_artist.albums.is_empty() {
                continue;
            }
            out.artists.push(kept_artist);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::Filters;
    use crate::model::{Album, AlbumId, Artist, ArtistId, Library, Track, TrackId};
    use std::path::PathBuf;

    fn sample_library() -> Library {
        let mut library = Library::new(PathBuf::from("/music"));
        for (ai, artist_name) in ["Adele", "Bowie"].iter().enumerate() {
            let artist_id = ArtistId(ai);
            let album_id = AlbumId(library.albums.len());
            library.artists.push(Artist {
                name: artist_name.to_string(),
                path: PathBuf::from("/music").join(artist_name),
                albums: vec![album_id],
            });
            let album_path = PathBuf::from("/music").join(artist_name).join("Album");
            let mut album = Album {
                artist: artist_id,
                name: "Album".into(),
                path: album_path.clone(),
                tracks: Vec::new(),
            };
            for (ti, file_name) in ["01 One.mp3", "02 Two.mp3"].iter().enumerate() {
                let track_id = TrackId(library.tracks.len());
                library.tracks.push(Track {
                    album: album_id,
                    path: album_path.join(file_name),
                    file_name: file_name.to_string(),
                    extension: "mp3".into(),
                    number: Some(ti as u32 + 1),
                    canonical_title: None,
                    tag: None,
                    read_error: None,
                });
                album.tracks.push(track_id);
            }
            library.albums.push(album);
        }
        library
    }

    #[test]
    fn match_all_keeps_everything() {
        let library = sample_library();
        let filtered = Filters::compile(".*", ".*", ".*").unwrap().apply(library);
        assert_eq!(filtered.artists.len(), 2);
        assert_eq!(filtered.tracks.len(), 4);
    }

    #[test]
    fn artist_filter_prunes_subtree() {
        let filters = Filters::compile("^Adele$", ".*", ".*").unwrap();
        let filtered = filters.apply(sample_library());
        assert_eq!(filtered.artists.len(), 1);
        assert_eq!(filtered.artists[0].name, "Adele");
        assert_eq!(filtered.tracks.len(), 2);
        filtered.check_consistency().unwrap();
    }

    #[test]
    fn track_filter_drops_empty_parents() {
        let filters = Filters::compile(".*", ".*", "Nothing").unwrap();
        let filtered = filters.apply(sample_library());
        assert!(filtered.is_empty());
        assert!(filtered.artists.is_empty());
    }

    #[test]
    fn track_filter_matches_stem() {
        let filters = Filters::compile(".*", ".*", "One").unwrap();
        let filtered = filters.apply(sample_library());
        assert_eq!(filtered.tracks.len(), 2);
        assert!(filtered
            .tracks
            .iter()
            .all(|t| t.file_name == "01 One.mp3"));
    }

    #[test]
    fn bad_pattern_is_an_error() {
        assert!(Filters::compile("(", ".*", ".*").is_err());
    }
}
