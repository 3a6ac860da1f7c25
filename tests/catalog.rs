//! Song catalog persistence tests

use std::path::PathBuf;

use bloom_assistant::catalog::EMPTY_CATALOG;
use bloom_assistant::{MusicCatalog, SongRecord};
use tempfile::TempDir;

fn catalog_in(dir: &TempDir) -> MusicCatalog {
    MusicCatalog::new(dir.path().join("music_database.json"))
}

#[test]
fn test_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);

    assert!(catalog.load().is_empty());
    assert_eq!(catalog.list(), EMPTY_CATALOG);
    assert!(catalog.search("anything").is_none());
}

#[test]
fn test_corrupt_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);
    std::fs::write(catalog.path(), "{ not json").unwrap();

    assert!(catalog.load().is_empty());
}

#[test]
fn test_reads_existing_document() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);
    std::fs::write(
        catalog.path(),
        r#"{
  "bohemian": {"title": "Bohemian Rhapsody", "artist": "Queen", "file_path": "/music/bohemian.mp3"},
  "imagine": {"title": "Imagine", "artist": "John Lennon", "file_path": "/music/imagine.mp3"}
}"#,
    )
    .unwrap();

    let songs = catalog.load();
    let keys: Vec<&str> = songs.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["bohemian", "imagine"]);
    assert_eq!(
        catalog.search("bohemian rhapsody"),
        Some(SongRecord {
            title: "Bohemian Rhapsody".to_string(),
            artist: "Queen".to_string(),
            file_path: PathBuf::from("/music/bohemian.mp3"),
        })
    );
    assert_eq!(catalog.search("lennon").unwrap().title, "Imagine");
}

#[test]
fn test_save_of_load_is_stable() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);
    catalog.add("hey", "Hey Jude", "The Beatles", "/music/hey.mp3").unwrap();
    catalog.add("imagine", "Imagine", "John Lennon", "/music/imagine.mp3").unwrap();

    let before = std::fs::read(catalog.path()).unwrap();
    catalog.save(&catalog.load()).unwrap();
    let after = std::fs::read(catalog.path()).unwrap();

    assert_eq!(before, after);
}

#[test]
fn test_add_normalizes_name() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);

    catalog.add("  Hey Jude ", "Hey Jude", "The Beatles", "/music/hey.mp3").unwrap();

    let songs = catalog.load();
    assert!(songs.contains_key("hey jude"));
    assert_eq!(songs["hey jude"].title, "Hey Jude");
}

#[test]
fn test_add_replaces_existing_entry() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);

    catalog.add("imagine", "Imagine", "John Lennon", "/old.mp3").unwrap();
    catalog.add("IMAGINE", "Imagine", "John Lennon", "/new.mp3").unwrap();

    let songs = catalog.load();
    assert_eq!(songs.len(), 1);
    assert_eq!(songs["imagine"].file_path, PathBuf::from("/new.mp3"));
}

#[test]
fn test_add_then_remove() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);

    catalog.add("imagine", "Imagine", "John Lennon", "/music/imagine.mp3").unwrap();
    catalog.add("hey", "Hey Jude", "The Beatles", "/music/hey.mp3").unwrap();
    assert!(catalog.load().contains_key("imagine"));

    assert!(catalog.remove("Imagine").unwrap());
    assert!(!catalog.remove("imagine").unwrap());

    let songs = catalog.load();
    assert!(!songs.contains_key("imagine"));
    assert!(songs.contains_key("hey"));
    assert_eq!(catalog.list(), "Available songs: Hey Jude by The Beatles");
}

#[test]
fn test_remove_from_missing_catalog_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);

    assert!(!catalog.remove("ghost").unwrap());
    assert!(!catalog.path().exists());
}

#[test]
fn test_save_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let catalog = MusicCatalog::new(dir.path().join("nested/deeper/music_database.json"));

    catalog.add("imagine", "Imagine", "John Lennon", "/music/imagine.mp3").unwrap();

    assert!(catalog.path().exists());
}

#[test]
fn test_writes_leave_no_stray_files() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);

    for i in 0..5 {
        catalog
            .add(&format!("song {i}"), "Title", "Artist", "/music/song.mp3")
            .unwrap();
    }
    catalog.remove("song 0").unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec!["music_database.json"]);
    assert_eq!(catalog.load().len(), 4);
}

#[test]
fn test_hand_edited_keys_are_normalized() {
    let dir = TempDir::new().unwrap();
    let catalog = catalog_in(&dir);
    std::fs::write(
        catalog.path(),
        r#"{"  Bohemian ": {"title": "Bohemian Rhapsody", "artist": "Queen", "file_path": "/music/bohemian.mp3"}}"#,
    )
    .unwrap();

    let songs = catalog.load();
    let keys: Vec<&str> = songs.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["bohemian"]);
    assert_eq!(catalog.search("bohemian rhapsody").unwrap().artist, "Queen");

    assert!(catalog.remove("Bohemian").unwrap());
    assert!(catalog.load().is_empty());
}
