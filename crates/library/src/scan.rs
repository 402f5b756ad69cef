//! Directory enumeration: `<root>/<artist>/<album>/<NN name>.<ext>`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::model::{parse_file_stem, Album, AlbumId, Artist, ArtistId, Library, Track, TrackId};
use crate::LibraryError;

/// Builds the in-memory library from the three fixed directory levels.
/// Artists and albums come back in Unicode code-point order of their
/// directory names; tracks in number order. Symbolic links are followed
/// once; revisiting an already-seen directory identity stops the descent.
pub fn scan(root: &Path, extension: &str) -> Result<Library, LibraryError> {
    if !root.is_dir() {
        return Err(LibraryError::InvalidRoot(root.to_path_buf()));
    }

    let mut visited: HashSet<PathBuf> = HashSet::new();
    if let Ok(canonical) = fs::canonicalize(root) {
        visited.insert(canonical);
    }

    let mut library = Library::new(root.to_path_buf());

    for artist_dir in child_dirs(root, &mut visited) {
        let artist_name = dir_name(&artist_dir);
        let artist_id = ArtistId(library.artists.len());
        let mut artist = Artist {
            name: artist_name,
            path: artist_dir.clone(),
            albums: Vec::new(),
        };

        for album_dir in child_dirs(&artist_dir, &mut visited) {
            let album_id = AlbumId(library.albums.len());
            let mut album = Album {
                artist: artist_id,
                name: dir_name(&album_dir),
                path: album_dir.clone(),
                tracks: Vec::new(),
            };

            for file in child_files(&album_dir, extension) {
                let file_name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let stem = match file_name.rfind('.') {
                    Some(idx) => &file_name[..idx],
                    None => file_name.as_str(),
                };
                let parsed = parse_file_stem(stem);
                if parsed.is_none() {
                    debug!(file = %file.display(), "file name does not carry a track number");
                }
                let (number, canonical_title) = match parsed {
                    Some((number, title)) => (Some(number), Some(title)),
                    None => (None, None),
                };
                let track_id = TrackId(library.tracks.len());
                library.tracks.push(Track {
                    album: album_id,
                    path: file,
                    file_name,
                    extension: extension.trim_start_matches('.').to_string(),
                    number,
                    canonical_title,
                    tag: None,
                    read_error: None,
                });
                album.tracks.push(track_id);
            }

            if album.tracks.is_empty() {
                continue;
            }
            library.albums.push(album);
            artist.albums.push(album_id);
        }

        if artist.albums.is_empty() {
            continue;
        }
        library.artists.push(artist);
    }

    library.sort_album_tracks();
    Ok(library)
}

/// Immediate child directories, sorted by name. A directory whose canonical
/// identity was already seen (symlink cycle or diamond) is skipped.
fn child_dirs(dir: &Path, visited: &mut HashSet<PathBuf>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path().to_path_buf();
        match fs::canonicalize(&path) {
            Ok(canonical) => {
                if !visited.insert(canonical) {
                    warn!(dir = %path.display(), "skipping already-visited directory");
                    continue;
                }
            }
            Err(err) => {
                warn!(dir = %path.display(), error = %err, "cannot resolve directory");
                continue;
            }
        }
        out.push(path);
    }
    out
}

/// Immediate child files carrying the configured extension, sorted by name.
fn child_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let wanted = extension.trim_start_matches('.');
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let keep = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(wanted))
            .unwrap_or(false);
        if keep {
            out.push(entry.path().to_path_buf());
        }
    }
    out
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::scan;
    use std::fs;

    #[test]
    fn scan_builds_sorted_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (artist, album, files) in [
            ("Beta", "First", vec!["02 B.mp3", "01 A.mp3"]),
            ("Alpha", "Only", vec!["01 Solo.mp3", "notes.txt"]),
        ] {
            let album_dir = root.join(artist).join(album);
            fs::create_dir_all(&album_dir).unwrap();
            for file in files {
                fs::write(album_dir.join(file), b"x").unwrap();
            }
        }

        let library = scan(root, "mp3").unwrap();
        let artists: Vec<&str> = library.artists.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(artists, ["Alpha", "Beta"]);
        assert_eq!(library.tracks.len(), 3);

        let beta_album = library
            .albums
            .iter()
            .find(|a| a.name == "First")
            .unwrap();
        let names: Vec<&str> = beta_album
            .tracks
            .iter()
            .map(|id| library.track(*id).file_name.as_str())
            .collect();
        assert_eq!(names, ["01 A.mp3", "02 B.mp3"]);
    }

    #[test]
    fn scan_skips_empty_albums_and_artists() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Empty").join("Nothing")).unwrap();
        let full = root.join("Full").join("Album");
        fs::create_dir_all(&full).unwrap();
        fs::write(full.join("01 X.mp3"), b"x").unwrap();

        let library = scan(root, "mp3").unwrap();
        assert_eq!(library.artists.len(), 1);
        assert_eq!(library.artists[0].name, "Full");
    }

    #[test]
    fn scan_matches_extension_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let album = root.join("Artist").join("Album");
        fs::create_dir_all(&album).unwrap();
        fs::write(album.join("01 Upper.MP3"), b"x").unwrap();
        fs::write(album.join("02 Lower.mp3"), b"x").unwrap();
        fs::write(album.join("03 Other.flac"), b"x").unwrap();

        let library = scan(root, "mp3").unwrap();
        assert_eq!(library.tracks.len(), 2);
    }

    #[test]
    fn scan_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(scan(&missing, "mp3").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn scan_breaks_symlink_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let album = root.join("Artist").join("Album");
        fs::create_dir_all(&album).unwrap();
        fs::write(album.join("01 X.mp3"), b"x").unwrap();
        // Loop back to the root from the artist level.
        std::os::unix::fs::symlink(root, root.join("Artist").join("loop")).unwrap();

        let library = scan(root, "mp3").unwrap();
        assert_eq!(library.tracks.len(), 1);
    }
}
