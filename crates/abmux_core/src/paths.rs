//! Path normalization and binary lookup.
//!
//! A `PathResolver` is built once at startup and passed by reference to
//! whatever needs to turn user-supplied paths into real ones. Results are
//! cached per raw input for the lifetime of the resolver.

use std::collections::HashMap;
use std::env;
use std::path::{Component, Path, PathBuf};

use directories::BaseDirs;
use parking_lot::Mutex;

/// Resolves user-supplied paths (with `~` and `$VAR`) to concrete paths.
#[derive(Debug, Default)]
pub struct PathResolver {
    cache: Mutex<HashMap<String, PathBuf>>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand `~` and environment variables and lexically normalize.
    pub fn normalize(&self, raw: &str) -> PathBuf {
        if let Some(hit) = self.cache.lock().get(raw) {
            return hit.clone();
        }

        let expanded = expand_vars(&expand_home(raw));
        let normalized = normalize_lexically(Path::new(&expanded));

        tracing::trace!("normalized {:?} -> {}", raw, normalized.display());
        self.cache
            .lock()
            .insert(raw.to_string(), normalized.clone());
        normalized
    }

    /// Whether the path exists, trying it as given and then relative to the
    /// current directory.
    pub fn exists(&self, raw: &str) -> bool {
        let path = self.normalize(raw);
        if path.exists() {
            return true;
        }
        env::current_dir()
            .map(|cwd| cwd.join(&path).exists())
            .unwrap_or(false)
    }

    /// Resolve a binary reference to an absolute path.
    ///
    /// Bare names (no separator) are looked up on `PATH`. The result is
    /// canonicalized when it exists; otherwise the normalized path is
    /// returned unchanged so the probe can report it as missing.
    pub fn resolve_binary(&self, raw: &str) -> PathBuf {
        let path = self.normalize(raw);
        let is_bare = path.components().count() == 1 && !path.is_absolute();

        let candidate = if is_bare {
            find_in_path(&path).unwrap_or(path)
        } else {
            path
        };

        candidate.canonicalize().unwrap_or(candidate)
    }

    /// Number of cached entries.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

fn expand_home(raw: &str) -> String {
    let rest = if raw == "~" {
        ""
    } else if let Some(rest) = raw.strip_prefix("~/") {
        rest
    } else {
        return raw.to_string();
    };

    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest).to_string_lossy().into_owned(),
        None => raw.to_string(),
    }
}

/// Expand `$NAME` and `${NAME}`. Unknown variables are left as written.
fn expand_vars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let braced = matches!(chars.peek(), Some((_, '{')));
        if braced {
            chars.next();
        }
        let start = i + 1 + usize::from(braced);
        let mut end = start;
        while let Some(&(j, n)) = chars.peek() {
            if n.is_ascii_alphanumeric() || n == '_' {
                end = j + n.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let closed = braced && matches!(chars.peek(), Some((_, '}')));
        if closed {
            chars.next();
        }

        let name = &raw[start..end];
        match env::var(name) {
            Ok(value) if !name.is_empty() && (!braced || closed) => out.push_str(&value),
            _ => {
                out.push('$');
                if braced {
                    out.push('{');
                }
                out.push_str(name);
                if closed {
                    out.push('}');
                }
            }
        }
    }
    out
}

/// Remove `.` components and fold `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Search `PATH` for an executable file with the given name.
fn find_in_path(tool: &Path) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let full = dir.join(tool);
        if full.is_file() {
            return Some(full);
        }
        #[cfg(windows)]
        {
            let exe = full.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}
