use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use id3::{ErrorKind, Tag, TagLike, Version};
use parking_lot::Mutex;

/// Outcome of parsing one file's embedded tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStatus {
    Ok,
    /// File opened fine but carries no tag.
    Missing,
    /// A tag header is present but truncated or invalid.
    Malformed,
    /// Tag version the reader does not support.
    UnsupportedVersion,
    /// Never read; the run was cancelled before this file's turn.
    Cancelled,
}

/// The tag fields the reconciler understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Artist,
    Album,
    Title,
    TrackNumber,
    Genre,
    Year,
    Disc,
}

impl FieldKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Artist => "artist",
            FieldKind::Album => "album",
            FieldKind::Title => "title",
            FieldKind::TrackNumber => "track-number",
            FieldKind::Genre => "genre",
            FieldKind::Year => "year",
            FieldKind::Disc => "disc",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Replacement values the repair stage applies frame-wise.
pub type Overrides = Vec<(FieldKind, String)>;

/// Normalized view of one file's embedded metadata. `raw` keeps the full
/// frame list so a rewrite round-trips frames the engine does not understand.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagView {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub track_no: Option<u32>,
    pub track_total: Option<u32>,
    pub disc: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub status: ParseStatus,
    pub raw: Option<Tag>,
}

impl Default for ParseStatus {
    fn default() -> Self {
        ParseStatus::Missing
    }
}

impl TagView {
    pub fn with_status(status: ParseStatus) -> Self {
        TagView {
            status,
            ..TagView::default()
        }
    }

    /// Textual form of a field, as the reconciler compares it.
    pub fn field(&self, kind: FieldKind) -> Option<String> {
        match kind {
            FieldKind::Artist => self.artist.clone(),
            FieldKind::Album => self.album.clone(),
            FieldKind::Title => self.title.clone(),
            FieldKind::TrackNumber => self.track_no.map(|n| n.to_string()),
            FieldKind::Genre => self.genre.clone(),
            FieldKind::Year => self.year.map(|y| format!("{:04}", y)),
            FieldKind::Disc => self.disc.clone(),
        }
    }
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Id3(id3::Error),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Id3(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<id3::Error> for MetadataError {
    fn from(err: id3::Error) -> Self {
        MetadataError::Id3(err)
    }
}

/// Single-file tag access. Two implementations: the real ID3 reader/writer
/// and an in-memory double for engine tests.
pub trait TagIo: Send + Sync {
    /// Fails only when the file itself cannot be read; tag-level problems
    /// come back as a non-`Ok` [`ParseStatus`] with an empty field map.
    fn read(&self, path: &Path) -> Result<TagView, MetadataError>;

    /// Applies `overrides` on top of `view.raw` and writes the tag back.
    /// Frames not named by an override are copied verbatim. Returns the
    /// post-write view.
    fn write(
        &self,
        path: &Path,
        view: &TagView,
        overrides: &[(FieldKind, String)],
    ) -> Result<TagView, MetadataError>;
}

pub struct Id3TagIo;

impl TagIo for Id3TagIo {
    fn read(&self, path: &Path) -> Result<TagView, MetadataError> {
        match Tag::read_from_path(path) {
            Ok(tag) => Ok(view_from_tag(&tag)),
            Err(err) => match err.kind {
                ErrorKind::Io(io_err) => Err(MetadataError::Io(io_err)),
                ErrorKind::NoTag => {
                    // A zero-length file is not a tagless audio file; treat
                    // it as unreadable so the concern names the real problem.
                    if fs::metadata(path)?.len() == 0 {
                        return Err(MetadataError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "empty file",
                        )));
                    }
                    Ok(TagView::with_status(ParseStatus::Missing))
                }
                ErrorKind::UnsupportedFeature => {
                    Ok(TagView::with_status(ParseStatus::UnsupportedVersion))
                }
                _ => Ok(TagView::with_status(ParseStatus::Malformed)),
            },
        }
    }

    fn write(
        &self,
        path: &Path,
        view: &TagView,
        overrides: &[(FieldKind, String)],
    ) -> Result<TagView, MetadataError> {
        let mut tag = match &view.raw {
            Some(raw) => raw.clone(),
            None => Tag::new(),
        };
        for (field, value) in overrides {
            apply_override(&mut tag, *field, value);
        }
        tag.write_to_path(path, Version::Id3v24)?;
        Ok(view_from_tag(&tag))
    }
}

fn view_from_tag(tag: &Tag) -> TagView {
    let (track_from_text, track_total_from_text) = split_slash_pair(text_frame(tag, "TRCK"));
    let track_no = tag.track().or(track_from_text);
    let track_total = tag.total_tracks().or(track_total_from_text);

    let year = tag
        .year()
        .or_else(|| tag.date_recorded().map(|ts| ts.year))
        .or_else(|| text_frame(tag, "TDRC").and_then(|s| head_year(s)));

    TagView {
        artist: non_empty(tag.artist().map(str::to_owned)),
        album: non_empty(tag.album().map(str::to_owned)),
        title: non_empty(tag.title().map(str::to_owned)),
        track_no,
        track_total,
        disc: non_empty(text_frame(tag, "TPOS").map(str::to_owned)),
        year,
        genre: non_empty(tag.genre_parsed().map(|g| g.into_owned())),
        status: ParseStatus::Ok,
        raw: Some(tag.clone()),
    }
}

fn apply_override(tag: &mut Tag, field: FieldKind, value: &str) {
    match field {
        FieldKind::Artist => tag.set_artist(value),
        FieldKind::Album => tag.set_album(value),
        FieldKind::Title => tag.set_title(value),
        FieldKind::TrackNumber => {
            // Preserve an original "N/T" total when one is present.
            let (_, total) = split_slash_pair(text_frame(tag, "TRCK"));
            let total = tag.total_tracks().or(total);
            match total {
                Some(total) => tag.set_text("TRCK", format!("{}/{}", value, total)),
                None => tag.set_text("TRCK", value),
            }
        }
        // Genre stays textual; a numeric index would survive a round trip
        // but defeats consensus comparison.
        FieldKind::Genre => tag.set_text("TCON", value),
        FieldKind::Year => tag.set_text("TDRC", value),
        FieldKind::Disc => tag.set_text("TPOS", value),
    }
}

fn text_frame<'a>(tag: &'a Tag, id: &str) -> Option<&'a str> {
    tag.get(id).and_then(|frame| frame.content().text())
}

/// "3" -> (Some(3), None); "3/12" -> (Some(3), Some(12)).
fn split_slash_pair(text: Option<&str>) -> (Option<u32>, Option<u32>) {
    let Some(text) = text else {
        return (None, None);
    };
    let mut parts = text.split('/');
    let head = parts.next().and_then(|p| p.trim().parse().ok());
    let tail = parts.next().and_then(|p| p.trim().parse().ok());
    (head, tail)
}

/// Leading four-digit year of a timestamp-ish string ("2011-05-02" -> 2011).
fn head_year(text: &str) -> Option<i32> {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// In-memory tag store for engine tests. Paths registered with a view behave
/// like real files; unknown paths read as unreadable; paths listed in
/// `fail_writes` fail every write with an I/O error.
#[derive(Default)]
pub struct MemoryTagIo {
    views: Mutex<HashMap<PathBuf, TagView>>,
    fail_writes: Mutex<Vec<PathBuf>>,
}

impl MemoryTagIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, view: TagView) {
        self.views.lock().insert(path.into(), view);
    }

    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.fail_writes.lock().push(path.into());
    }

    pub fn view(&self, path: &Path) -> Option<TagView> {
        self.views.lock().get(path).cloned()
    }
}

impl TagIo for MemoryTagIo {
    fn read(&self, path: &Path) -> Result<TagView, MetadataError> {
        match self.views.lock().get(path) {
            Some(view) => Ok(view.clone()),
            None => Err(MetadataError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            ))),
        }
    }

    fn write(
        &self,
        path: &Path,
        view: &TagView,
        overrides: &[(FieldKind, String)],
    ) -> Result<TagView, MetadataError> {
        if self.fail_writes.lock().iter().any(|p| p == path) {
            return Err(MetadataError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "write refused",
            )));
        }
        let mut next = view.clone();
        for (field, value) in overrides {
            match field {
                FieldKind::Artist => next.artist = Some(value.clone()),
                FieldKind::Album => next.album = Some(value.clone()),
                FieldKind::Title => next.title = Some(value.clone()),
                FieldKind::TrackNumber => next.track_no = value.parse().ok(),
                FieldKind::Genre => next.genre = Some(value.clone()),
                FieldKind::Year => next.year = value.parse().ok(),
                FieldKind::Disc => next.disc = Some(value.clone()),
            }
        }
        next.status = ParseStatus::Ok;
        self.views.lock().insert(path.to_path_buf(), next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use id3::frame::ExtendedText;
    use std::fs::File;

    fn write_fixture(dir: &Path, name: &str, build: impl FnOnce(&mut Tag)) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap();
        let mut tag = Tag::new();
        build(&mut tag);
        tag.write_to_path(&path, Version::Id3v24).unwrap();
        path
    }

    #[test]
    fn read_round_trips_core_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "01 Rolling.mp3", |tag| {
            tag.set_artist("Adele");
            tag.set_album("21");
            tag.set_title("Rolling");
            tag.set_text("TRCK", "1/11");
            tag.set_text("TDRC", "2011");
            tag.set_text("TCON", "Pop");
            tag.set_text("TPOS", "1/1");
        });

        let view = Id3TagIo.read(&path).unwrap();
        assert_eq!(view.status, ParseStatus::Ok);
        assert_eq!(view.artist.as_deref(), Some("Adele"));
        assert_eq!(view.album.as_deref(), Some("21"));
        assert_eq!(view.title.as_deref(), Some("Rolling"));
        assert_eq!(view.track_no, Some(1));
        assert_eq!(view.track_total, Some(11));
        assert_eq!(view.year, Some(2011));
        assert_eq!(view.genre.as_deref(), Some("Pop"));
        assert_eq!(view.disc.as_deref(), Some("1/1"));
    }

    #[test]
    fn missing_tag_reads_as_missing_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("untagged.mp3");
        std::fs::write(&path, b"\xff\xfb\x90\x00 not a real frame").unwrap();

        let view = Id3TagIo.read(&path).unwrap();
        assert_eq!(view.status, ParseStatus::Missing);
        assert_eq!(view.artist, None);
        assert!(view.raw.is_none());
    }

    #[test]
    fn zero_byte_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        File::create(&path).unwrap();

        match Id3TagIo.read(&path) {
            Err(MetadataError::Io(_)) => {}
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn absent_file_is_unreadable() {
        match Id3TagIo.read(Path::new("/nonexistent/track.mp3")) {
            Err(MetadataError::Io(_)) => {}
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn write_applies_overrides_and_keeps_unknown_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "02 Someone.mp3", |tag| {
            tag.set_artist("Adele");
            tag.set_album("Twenty-One");
            tag.set_text("TRCK", "2/11");
            tag.add_frame(ExtendedText {
                description: "CUSTOM".to_string(),
                value: "keep me".to_string(),
            });
        });

        let view = Id3TagIo.read(&path).unwrap();
        let written = Id3TagIo
            .write(&path, &view, &[(FieldKind::Album, "21".to_string())])
            .unwrap();
        assert_eq!(written.album.as_deref(), Some("21"));

        let reread = Id3TagIo.read(&path).unwrap();
        assert_eq!(reread.album.as_deref(), Some("21"));
        assert_eq!(reread.artist.as_deref(), Some("Adele"));
        assert_eq!(reread.track_no, Some(2));
        assert_eq!(reread.track_total, Some(11));
        let raw = reread.raw.as_ref().unwrap();
        let kept = raw
            .extended_texts()
            .any(|t| t.description == "CUSTOM" && t.value == "keep me");
        assert!(kept, "TXXX frame must survive a rewrite");
    }

    #[test]
    fn track_number_override_preserves_total() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "03 Turning.mp3", |tag| {
            tag.set_text("TRCK", "7/11");
        });

        let view = Id3TagIo.read(&path).unwrap();
        Id3TagIo
            .write(&path, &view, &[(FieldKind::TrackNumber, "3".to_string())])
            .unwrap();

        let reread = Id3TagIo.read(&path).unwrap();
        assert_eq!(reread.track_no, Some(3));
        assert_eq!(reread.track_total, Some(11));
    }

    #[test]
    fn track_number_override_without_total_stays_bare() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "04 Rumour.mp3", |tag| {
            tag.set_text("TRCK", "9");
        });

        let view = Id3TagIo.read(&path).unwrap();
        let written = Id3TagIo
            .write(&path, &view, &[(FieldKind::TrackNumber, "4".to_string())])
            .unwrap();
        assert_eq!(written.track_no, Some(4));
        assert_eq!(written.track_total, None);
    }

    #[test]
    fn field_renders_year_four_digit() {
        let view = TagView {
            year: Some(987),
            ..TagView::default()
        };
        assert_eq!(view.field(FieldKind::Year).as_deref(), Some("0987"));
    }

    #[test]
    fn memory_io_applies_overrides() {
        let io = MemoryTagIo::new();
        let path = Path::new("/m/a/b/01 X.mp3");
        io.insert(
            path,
            TagView {
                artist: Some("Old".into()),
                status: ParseStatus::Ok,
                ..TagView::default()
            },
        );
        let view = io.read(path).unwrap();
        io.write(path, &view, &[(FieldKind::Artist, "New".into())])
            .unwrap();
        assert_eq!(io.view(path).unwrap().artist.as_deref(), Some("New"));
    }
}
