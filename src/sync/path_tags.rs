//! Mapping between hierarchical paths and session tags.

/// Display name used when a path has no usable segment
pub const UNTITLED_NAME: &str = "untitled";

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Directory segments of `path`, root first, without the file name.
pub fn tags_from_path(path: &str) -> Vec<String> {
    let parts: Vec<&str> = segments(path).collect();
    match parts.split_last() {
        Some((_, dirs)) => dirs.iter().map(|s| s.to_string()).collect(),
        None => Vec::new(),
    }
}

/// Last non-empty segment of `path`.
pub fn name_from_path(path: &str) -> String {
    segments(path)
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| UNTITLED_NAME.to_string())
}

/// Canonical form of a path: segments joined by single slashes.
pub fn canonical_path(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("/")
}

/// True when `key` names `folder` itself or something beneath it.
pub fn is_within_folder(key: &str, folder: &str) -> bool {
    let folder = canonical_path(folder);
    if folder.is_empty() {
        return false;
    }
    key == folder || key.starts_with(&format!("{}/", folder))
}
