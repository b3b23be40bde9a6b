//! Source discovery and job creation.
//!
//! Scans a book folder for single-track audio files and turns them into
//! numbered jobs, one per file, in file-name order.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::MuxSettings;
use crate::models::{BookMetadata, Job};

/// Extensions picked up when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["m4a", "mp4", "aac"];

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error(
        "{} and {} share a base name and would write the same output",
        .first.display(),
        .second.display()
    )]
    DuplicateStem { first: PathBuf, second: PathBuf },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Regular files directly in `folder` with one of `extensions`
/// (case-insensitive), sorted by file name.
///
/// Pipeline artifacts (`*_demux.*`, `*_temp.*`) and files that already
/// carry `container_extension` are skipped. Two sources with the same base
/// name (`01.m4a`, `01.mp4`) are an error, since their outputs would collide.
pub fn discover_sources(
    folder: &Path,
    extensions: &[&str],
    container_extension: &str,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !folder.is_dir() {
        return Err(DiscoveryError::NotADirectory(folder.to_path_buf()));
    }

    let io_err = |source| DiscoveryError::Io {
        path: folder.to_path_buf(),
        source,
    };

    let mut sources = Vec::new();
    for entry in fs::read_dir(folder).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() {
            continue;
        }

        let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            continue;
        };
        if ext.eq_ignore_ascii_case(container_extension)
            || !extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
        {
            continue;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if stem.ends_with("_demux") || stem.ends_with("_temp") {
            tracing::debug!("Skipping leftover artifact {}", path.display());
            continue;
        }

        sources.push(path);
    }

    sources.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    reject_duplicate_stems(&sources)?;
    tracing::info!(
        "Discovered {} source file(s) in {}",
        sources.len(),
        folder.display()
    );
    Ok(sources)
}

fn reject_duplicate_stems(sources: &[PathBuf]) -> Result<(), DiscoveryError> {
    let mut seen: HashMap<&OsStr, &PathBuf> = HashMap::new();
    for source in sources {
        let Some(stem) = source.file_stem() else {
            continue;
        };
        if let Some(first) = seen.insert(stem, source) {
            return Err(DiscoveryError::DuplicateStem {
                first: first.clone(),
                second: source.clone(),
            });
        }
    }
    Ok(())
}

/// One pending job per source, numbered from 1 in the given order.
pub fn build_jobs(sources: &[PathBuf], book: &BookMetadata, mux: &MuxSettings) -> Vec<Job> {
    let total = sources.len() as u32;
    sources
        .iter()
        .zip(1u32..)
        .map(|(source, part)| {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Job::new(
                format!("{:03}-{}", part, stem),
                source.clone(),
                part,
                book.tags_for(part, total, &mux.part_label),
                &mux.raw_extension,
                &mux.container_extension,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn finds_matching_files_in_name_order() {
        let dir = tempdir().unwrap();
        for name in [
            "02.m4a",
            "01.M4A",
            "03.mp4",
            "cover.jpg",
            "01_demux.aac",
            "01_temp.m4a",
            "00.m4b",
        ] {
            touch(dir.path(), name);
        }
        fs::create_dir(dir.path().join("sub.m4a")).unwrap();

        let found = discover_sources(dir.path(), DEFAULT_EXTENSIONS, "m4b").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["01.M4A", "02.m4a", "03.mp4"]);
    }

    #[test]
    fn same_base_name_with_two_extensions_is_rejected() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "01.m4a");
        touch(dir.path(), "01.mp4");
        touch(dir.path(), "02.m4a");

        let err = discover_sources(dir.path(), DEFAULT_EXTENSIONS, "m4b").unwrap_err();
        let DiscoveryError::DuplicateStem { first, second } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(first.file_name().unwrap(), "01.m4a");
        assert_eq!(second.file_name().unwrap(), "01.mp4");
        assert!(err.to_string().contains("01.mp4"));
    }

    #[test]
    fn missing_folder_is_an_error() {
        let err = discover_sources(Path::new("/nonexistent/book"), DEFAULT_EXTENSIONS, "m4b")
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NotADirectory(_)));
    }

    #[test]
    fn jobs_are_numbered_with_tags() {
        let book = BookMetadata {
            title: "Book".to_string(),
            ..BookMetadata::default()
        };
        let sources = vec![PathBuf::from("/b/one.m4a"), PathBuf::from("/b/two.m4a")];
        let jobs = build_jobs(&sources, &book, &MuxSettings::default());

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].id, "002-two");
        assert_eq!(jobs[1].part_number, 2);
        assert_eq!(jobs[1].tags.title, "Book, Part 2");
        assert_eq!(jobs[1].tags.total_tracks, 2);
        assert_eq!(jobs[0].working_paths.final_output, PathBuf::from("/b/one.m4b"));
    }
}
