//! Console outline of the concern tree, plus the mirrored event stream.

use parking_lot::Mutex;

use crate::events::{Event, EventSink, Level};
use crate::model::Library;
use crate::reconcile::{Concern, ConcernTree, Severity};

pub trait ConsoleSink: Send + Sync {
    fn line(&self, line: &str);
}

pub struct StdoutConsole;

impl ConsoleSink for StdoutConsole {
    fn line(&self, line: &str) {
        println!("{}", line);
    }
}

#[derive(Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<String>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl ConsoleSink for MemoryConsole {
    fn line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Prints the tree as an indented outline, one header per concerned entity
/// and one bullet per concern, and mirrors each concern as a structured
/// event. Traversal order matches the library order, so output is stable.
pub fn render(tree: &ConcernTree, library: &Library, console: &dyn ConsoleSink, events: &dyn EventSink) {
    for artist in &tree.artists {
        let artist_path = &library.artist(artist.artist).path;
        let artist_entity = library.display_path(artist_path);
        console.line(&artist.name);
        emit_concerns(console, events, 1, &artist_entity, &artist.concerns);

        for album in &artist.albums {
            let album_path = &library.album(album.album).path;
            let album_entity = library.display_path(album_path);
            console.line(&format!("  {}", album.name));
            emit_concerns(console, events, 2, &album_entity, &album.concerns);

            for track in &album.tracks {
                let track_path = &library.track(track.track).path;
                let track_entity = library.display_path(track_path);
                console.line(&format!("    {}", track.file_name));
                emit_concerns(console, events, 3, &track_entity, &track.concerns);
            }
        }
    }
}

fn emit_concerns(
    console: &dyn ConsoleSink,
    events: &dyn EventSink,
    depth: usize,
    entity: &str,
    concerns: &[Concern],
) {
    let indent = "  ".repeat(depth);
    for concern in concerns {
        console.line(&format!("{}- {}", indent, concern.message));
        events.emit(Event {
            level: level_for(concern.severity),
            kind: concern.kind.name(),
            entity: entity.to_string(),
            message: concern.message.clone(),
        });
    }
}

fn level_for(severity: Severity) -> Level {
    match severity {
        Severity::Info => Level::Info,
        Severity::Warn => Level::Warn,
        Severity::Error => Level::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::{render, MemoryConsole};
    use crate::events::MemoryEvents;
    use crate::model::{Album, AlbumId, Artist, ArtistId, Library, Track, TrackId};
    use crate::reconcile::reconcile;
    use metadata::{ParseStatus, TagView};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn outline_has_header_and_bullets() {
        let mut library = Library::new(PathBuf::from("/music"));
        library.artists.push(Artist {
            name: "Adele".into(),
            path: "/music/Adele".into(),
            albums: vec![AlbumId(0)],
        });
        library.albums.push(Album {
            artist: ArtistId(0),
            name: "21".into(),
            path: "/music/Adele/21".into(),
            tracks: vec![TrackId(0)],
        });
        library.tracks.push(Track {
            album: AlbumId(0),
            path: PathBuf::from("/music/Adele/21/01 Rolling.mp3"),
            file_name: "01 Rolling.mp3".into(),
            extension: "mp3".into(),
            number: Some(1),
            canonical_title: Some("Rolling".into()),
            tag: Some(TagView {
                artist: Some("Adele".into()),
                album: Some("Twenty-One".into()),
                title: Some("Rolling".into()),
                track_no: Some(1),
                genre: Some("Pop".into()),
                year: Some(2011),
                disc: Some("1".into()),
                status: ParseStatus::Ok,
                ..TagView::default()
            }),
            read_error: None,
        });

        let tree = reconcile(&library, &AtomicBool::new(false));
        let console = MemoryConsole::new();
        let events = MemoryEvents::new();
        render(&tree, &library, &console, &events);

        let lines = console.snapshot();
        assert_eq!(lines[0], "Adele");
        assert_eq!(lines[1], "  21");
        assert_eq!(lines[2], "    01 Rolling.mp3");
        assert!(lines[3].starts_with("      - album tag"));

        let emitted = events.snapshot();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].kind, "conflict");
        assert_eq!(emitted[0].entity, "Adele/21/01 Rolling.mp3");
    }
}
