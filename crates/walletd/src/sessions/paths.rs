use std::env;
use std::path::{Component, Path, PathBuf};

use dirs::home_dir;

/// Normalises a wallet path into the key used by the session map.
///
/// `~` is expanded, relative paths are anchored at the working directory and
/// `.`/`..` components are folded lexically. When the file exists, symlinks
/// are resolved too, so two spellings of one file share a session.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let expanded = expand_home(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    };
    let folded = fold_components(&absolute);
    folded.canonicalize().unwrap_or(folded)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

fn fold_components(path: &Path) -> PathBuf {
    let mut folded = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other.as_os_str()),
        }
    }
    folded
}
