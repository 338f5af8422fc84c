//! Additional methods for libstd and external crates.

use std::path::{Component, Path, PathBuf};

/// Normalizes a source path so that equivalent spellings compare equal.
///
/// Any leading `./` is removed, `.` components are dropped and `..` components cancel the preceding normal
/// component. Leading `..` components of a relative path are kept. An empty result becomes `.`.
pub fn normalize_path(path: &str) -> String {
    let mut trimmed = path;
    while trimmed.starts_with("./") {
        trimmed = trimmed[2..].trim_start_matches('/');
    }

    let mut stack: Vec<Component> = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => match stack.last() {
                Some(&Component::Normal(_)) => {
                    stack.pop();
                },
                // the parent of the root is the root itself.
                Some(&Component::RootDir) => {},
                _ => stack.push(component),
            },
            _ => stack.push(component),
        }
    }

    if stack.is_empty() {
        return ".".to_owned();
    }
    stack.iter().collect::<PathBuf>().into_string_lossy()
}

/// Adds the `into_string_lossy` method to `Vec<u8>` and `PathBuf`.
pub trait IntoStringLossy {
    /// Consumes the ownership and converts the string-like object into a real string. Unconvertible characters are
    /// replaced by U+FFFD.
    fn into_string_lossy(self) -> String;
}

impl IntoStringLossy for Vec<u8> {
    fn into_string_lossy(self) -> String {
        String::from_utf8(self).unwrap_or_else(|e| String::from_utf8_lossy(&e.into_bytes()).into_owned())
    }
}

impl IntoStringLossy for PathBuf {
    fn into_string_lossy(self) -> String {
        self.into_os_string().into_string().unwrap_or_else(|s| s.to_string_lossy().into_owned())
    }
}

/// Computes `100 * part / total`, defined as zero when `total` is zero.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}
