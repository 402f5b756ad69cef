use std::path::Path;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Process exit classes, ordered by severity. A run's exit code is the most
/// severe class observed anywhere during the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitClass {
    Ok,
    User,
    Program,
    System,
}

impl ExitClass {
    pub fn code(self) -> i32 {
        match self {
            ExitClass::Ok => 0,
            ExitClass::User => 1,
            ExitClass::Program => 2,
            ExitClass::System => 3,
        }
    }

    pub fn merge(self, other: ExitClass) -> ExitClass {
        self.max(other)
    }
}

impl Default for ExitClass {
    fn default() -> Self {
        ExitClass::Ok
    }
}

/// NFC-normalize a name for comparison. Directory names and tag values may
/// carry the same text in different normal forms (macOS volumes decompose).
pub fn nfc(value: &str) -> String {
    value.nfc().collect()
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::{nfc, relpath_from, ExitClass};
    use std::path::Path;

    #[test]
    fn exit_class_merge_keeps_most_severe() {
        assert_eq!(ExitClass::Ok.merge(ExitClass::User), ExitClass::User);
        assert_eq!(ExitClass::System.merge(ExitClass::User), ExitClass::System);
        assert_eq!(ExitClass::Program.merge(ExitClass::System), ExitClass::System);
        assert_eq!(ExitClass::Ok.merge(ExitClass::Ok), ExitClass::Ok);
    }

    #[test]
    fn exit_codes_follow_taxonomy() {
        assert_eq!(ExitClass::Ok.code(), 0);
        assert_eq!(ExitClass::User.code(), 1);
        assert_eq!(ExitClass::Program.code(), 2);
        assert_eq!(ExitClass::System.code(), 3);
    }

    #[test]
    fn nfc_folds_decomposed_names() {
        // "é" composed vs "e" + combining acute
        assert_eq!(nfc("Caf\u{e9}"), nfc("Cafe\u{301}"));
    }

    #[test]
    fn relpath_uses_forward_slashes() {
        let root = Path::new("/music");
        let path = Path::new("/music/Adele/21/01 Rolling.mp3");
        assert_eq!(
            relpath_from(root, path).as_deref(),
            Some("Adele/21/01 Rolling.mp3")
        );
        assert_eq!(relpath_from(Path::new("/other"), path), None);
    }
}
