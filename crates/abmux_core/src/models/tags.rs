//! Book metadata and the per-file tag set derived from it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Metadata for the whole book, as collected by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub narrators: Vec<String>,
    pub series_title: Option<String>,
    pub series_number: Option<u32>,
    /// Publication date, passed through as the year tag.
    pub date: String,
    pub description: String,
    pub copyright: String,
    pub cover: Option<PathBuf>,
}

impl BookMetadata {
    pub fn authors_string(&self) -> String {
        self.authors.join(", ")
    }

    pub fn narrators_string(&self) -> String {
        self.narrators.join(", ")
    }

    /// Tags for file `track` of `total_tracks` (1-based).
    ///
    /// `part_label` names the part in the title of multi-file books
    /// ("Title, Part 2").
    pub fn tags_for(&self, track: u32, total_tracks: u32, part_label: &str) -> TagSet {
        let title = if total_tracks > 1 {
            format!("{}, {} {}", self.title, part_label, track)
        } else {
            self.title.clone()
        };

        let authors = self.authors_string();
        let artist = if self.narrators.is_empty() {
            authors.clone()
        } else {
            format!("{} (read by {})", authors, self.narrators_string())
        };

        let album = self
            .series_title
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| self.title.clone());

        TagSet {
            title,
            sort_title: self.title.clone(),
            artist,
            album,
            album_artist: authors,
            track,
            total_tracks,
            disk: self.series_number.unwrap_or(1),
            year: self.date.clone(),
            copyright: self.copyright.clone(),
            description: self.description.clone(),
            cover: self.cover.clone(),
        }
    }
}

/// Tag values written into one output file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pub title: String,
    pub sort_title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub track: u32,
    pub total_tracks: u32,
    pub disk: u32,
    pub year: String,
    pub copyright: String,
    pub description: String,
    pub cover: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> BookMetadata {
        BookMetadata {
            title: "On Basilisk Station".to_string(),
            authors: vec!["David Weber".to_string()],
            narrators: vec!["Allyson Johnson".to_string(), "Someone Else".to_string()],
            series_title: Some("Honor Harrington".to_string()),
            series_number: Some(1),
            date: "2009".to_string(),
            description: "A description".to_string(),
            copyright: "(c) 1993".to_string(),
            cover: None,
        }
    }

    #[test]
    fn multi_part_tags() {
        let tags = book().tags_for(2, 5, "Part");
        assert_eq!(tags.title, "On Basilisk Station, Part 2");
        assert_eq!(tags.sort_title, "On Basilisk Station");
        assert_eq!(
            tags.artist,
            "David Weber (read by Allyson Johnson, Someone Else)"
        );
        assert_eq!(tags.album_artist, "David Weber");
        assert_eq!(tags.album, "Honor Harrington");
        assert_eq!((tags.track, tags.total_tracks, tags.disk), (2, 5, 1));
    }

    #[test]
    fn single_file_without_series_or_narrator() {
        let mut meta = book();
        meta.series_title = None;
        meta.series_number = None;
        meta.narrators.clear();

        let tags = meta.tags_for(1, 1, "Part");
        assert_eq!(tags.title, "On Basilisk Station");
        assert_eq!(tags.album, "On Basilisk Station");
        assert_eq!(tags.artist, "David Weber");
        assert_eq!(tags.disk, 1);
    }

    #[test]
    fn metadata_deserializes_with_missing_fields() {
        let meta: BookMetadata =
            serde_json::from_str(r#"{"title": "T", "authors": ["A", "B"]}"#).unwrap();
        assert_eq!(meta.authors_string(), "A, B");
        assert!(meta.cover.is_none());
    }
}
