//! Path and filename helpers

use std::path::{Path, PathBuf};

/// Characters stripped from titles before they become file or directory names
const FORBIDDEN_CHARS: &str = "<>:\"/\\|?*";

/// Maximum length of a sanitized filename stem
const MAX_FILENAME_LENGTH: usize = 150;

/// Turn a display title into a filesystem-safe name.
///
/// Strips forbidden characters, replaces spaces with underscores, and caps
/// the length. Falls back to "untitled" if nothing survives.
pub fn sanitize_filename(title: &str) -> String {
    let sanitized: String = title
        .trim()
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(*c) && !c.is_control())
        .map(|c| if c == ' ' { '_' } else { c })
        .take(MAX_FILENAME_LENGTH)
        .collect();

    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}

/// Zero-padded page filename for an index, wide enough for the page count.
///
/// `page_file_name(5, 100)` is `"005.jpg"`.
pub fn page_file_name(index: usize, total_pages: usize) -> String {
    let width = total_pages.max(1).to_string().len();
    format!("{index:0width$}.jpg")
}

/// Pick an output path that does not collide with an existing file.
///
/// If `base` exists, appends `(1)`, `(2)`, ... to the stem until a free path
/// is found, so an existing artifact is never overwritten.
pub fn unique_output_path(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_path_buf();
    }

    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let extension = base.extension().and_then(|s| s.to_str());
    let parent = base.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 1;
    loop {
        let name = match extension {
            Some(ext) => format!("{stem}({counter}).{ext}"),
            None => format!("{stem}({counter})"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
