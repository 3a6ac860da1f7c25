//! Song catalog
//!
//! The catalog is a JSON document mapping a normalized lookup key to a song
//! record. It is re-read at the start of every operation and written back after
//! every mutation, so the file on disk is always the source of truth.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reply used when the catalog holds nothing
pub const EMPTY_CATALOG: &str = "No songs in database.";

/// A playable song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    /// Song title
    pub title: String,

    /// Performing artist
    pub artist: String,

    /// Audio file location
    pub file_path: PathBuf,
}

/// Catalog contents in on-disk order
pub type Songs = IndexMap<String, SongRecord>;

/// Normalize a spoken or typed song name into a lookup key
#[must_use]
pub fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Persistent song catalog backed by a JSON file
#[derive(Debug, Clone)]
pub struct MusicCatalog {
    path: PathBuf,
}

impl MusicCatalog {
    /// Create a catalog stored at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the catalog file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the catalog from disk
    ///
    /// A missing or unreadable file yields an empty catalog. Keys are
    /// normalized as they are read.
    #[must_use]
    pub fn load(&self) -> Songs {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "catalog not found, starting empty");
            return Songs::new();
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read catalog");
                return Songs::new();
            }
        };

        match serde_json::from_str::<Songs>(&content) {
            Ok(songs) => {
                tracing::debug!(count = songs.len(), "loaded catalog");
                // Hand-edited files may carry keys that were never normalized
                songs
                    .into_iter()
                    .map(|(key, song)| (normalize_key(&key), song))
                    .collect()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to parse catalog");
                Songs::new()
            }
        }
    }

    /// Write the whole catalog, replacing the previous document
    ///
    /// The document is written to a sibling temp file and renamed into place so
    /// a failed write never leaves a truncated catalog behind.
    ///
    /// # Errors
    ///
    /// Returns `CatalogIo` if the file cannot be written
    pub fn save(&self, songs: &Songs) -> Result<()> {
        let json = serde_json::to_string_pretty(songs)?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| catalog_io(&self.path, &e))?;

        let mut staged =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| catalog_io(&self.path, &e))?;
        std::io::Write::write_all(&mut staged, json.as_bytes())
            .map_err(|e| catalog_io(&self.path, &e))?;
        staged
            .persist(&self.path)
            .map_err(|e| catalog_io(&self.path, &e.error))?;

        tracing::debug!(count = songs.len(), path = %self.path.display(), "catalog saved");
        Ok(())
    }

    /// Insert or replace a song under its normalized name
    ///
    /// # Errors
    ///
    /// Returns `CatalogIo` if the catalog cannot be saved
    pub fn add(&self, name: &str, title: &str, artist: &str, path: &str) -> Result<()> {
        let mut songs = self.load();
        songs.insert(
            normalize_key(name),
            SongRecord {
                title: title.to_string(),
                artist: artist.to_string(),
                file_path: PathBuf::from(path),
            },
        );
        self.save(&songs)?;

        tracing::info!(title, artist, "added song");
        Ok(())
    }

    /// Remove a song by name, returning whether it was present
    ///
    /// # Errors
    ///
    /// Returns `CatalogIo` if the catalog cannot be saved
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut songs = self.load();
        let Some(removed) = songs.shift_remove(&normalize_key(name)) else {
            tracing::info!(name, "song not in catalog");
            return Ok(false);
        };
        self.save(&songs)?;

        tracing::info!(title = %removed.title, "removed song");
        Ok(true)
    }

    /// Resolve a spoken query to a song
    #[must_use]
    pub fn search(&self, query: &str) -> Option<SongRecord> {
        find_song(&self.load(), query).cloned()
    }

    /// Human-readable summary of every song
    #[must_use]
    pub fn list(&self) -> String {
        describe(&self.load())
    }
}

/// Resolve a query against catalog contents
///
/// Precedence, first hit wins: exact key, then a key/query substring match in
/// either direction, then the query inside a title or artist. Ties go to the
/// earliest entry in file order.
#[must_use]
pub fn find_song<'a>(songs: &'a Songs, query: &str) -> Option<&'a SongRecord> {
    let query = normalize_key(query);
    if query.is_empty() {
        return None;
    }

    if let Some(song) = songs.get(&query) {
        return Some(song);
    }

    if let Some((_, song)) = songs
        .iter()
        .find(|(key, _)| key.contains(&query) || query.contains(key.as_str()))
    {
        return Some(song);
    }

    songs.values().find(|song| {
        song.title.to_lowercase().contains(&query) || song.artist.to_lowercase().contains(&query)
    })
}

/// Format catalog contents for speaking
#[must_use]
pub fn describe(songs: &Songs) -> String {
    if songs.is_empty() {
        return EMPTY_CATALOG.to_string();
    }

    let entries: Vec<String> = songs
        .values()
        .map(|song| format!("{} by {}", song.title, song.artist))
        .collect();

    format!("Available songs: {}", entries.join(", "))
}

fn catalog_io(path: &Path, err: &std::io::Error) -> Error {
    tracing::error!(path = %path.display(), error = %err, "failed to save catalog");
    Error::CatalogIo(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, artist: &str) -> SongRecord {
        SongRecord {
            title: title.to_string(),
            artist: artist.to_string(),
            file_path: PathBuf::from(format!("/music/{title}.mp3")),
        }
    }

    fn sample() -> Songs {
        let mut songs = Songs::new();
        songs.insert("bohemian".to_string(), record("Bohemian Rhapsody", "Queen"));
        songs.insert("imagine".to_string(), record("Imagine", "John Lennon"));
        songs.insert("hey".to_string(), record("Hey Jude", "The Beatles"));
        songs
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Bohemian "), "bohemian");
        assert_eq!(normalize_key("HEY JUDE"), "hey jude");
    }

    #[test]
    fn test_exact_key_wins() {
        let songs = sample();
        let song = find_song(&songs, "Bohemian").unwrap();
        assert_eq!(song.title, "Bohemian Rhapsody");
    }

    #[test]
    fn test_query_containing_key() {
        let songs = sample();
        let song = find_song(&songs, "bohemian rhapsody").unwrap();
        assert_eq!(song.artist, "Queen");
    }

    #[test]
    fn test_key_containing_query() {
        let songs = sample();
        let song = find_song(&songs, "imag").unwrap();
        assert_eq!(song.title, "Imagine");
    }

    #[test]
    fn test_substring_tier_follows_file_order() {
        let mut songs = Songs::new();
        songs.insert("love song".to_string(), record("First", "A"));
        songs.insert("love me".to_string(), record("Second", "B"));

        assert_eq!(find_song(&songs, "love").unwrap().title, "First");
    }

    #[test]
    fn test_key_tier_beats_title_tier() {
        let mut songs = Songs::new();
        songs.insert("yesterday".to_string(), record("Queen Street", "Someone"));
        songs.insert("queen".to_string(), record("Other", "Band"));

        // "queen" is a key, even though an earlier record has it in its title
        assert_eq!(find_song(&songs, "queen").unwrap().title, "Other");
    }

    #[test]
    fn test_title_and_artist_tier() {
        let songs = sample();
        assert_eq!(find_song(&songs, "lennon").unwrap().title, "Imagine");
        assert_eq!(find_song(&songs, "jude").unwrap().title, "Hey Jude");
    }

    #[test]
    fn test_no_match() {
        let songs = sample();
        assert!(find_song(&songs, "stairway").is_none());
        assert!(find_song(&songs, "   ").is_none());
        assert!(find_song(&Songs::new(), "anything").is_none());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&Songs::new()), EMPTY_CATALOG);
        assert_eq!(
            describe(&sample()),
            "Available songs: Bohemian Rhapsody by Queen, Imagine by John Lennon, Hey Jude by The Beatles"
        );
    }
}
