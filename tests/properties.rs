use std::{collections::HashSet, sync::Arc};

use hashnotes::{
    decode_collection, derive_tags, encode_collection, popular_tags, search, JsonFileBackend,
    MemoryBackend, NoteBackend, NoteDraft, NoteStore, RetryPolicy, WritePolicy,
};
use tempfile::tempdir;

fn draft(title: &str, tags: &[&str]) -> NoteDraft {
    NoteDraft::new(title, "", tags.iter().map(|t| t.to_string()).collect())
}

fn write_through(backend: Arc<MemoryBackend>) -> NoteStore {
    NoteStore::open(backend, WritePolicy::WriteThrough, RetryPolicy::default())
}

#[test]
fn test_saving_a_loaded_collection_changes_nothing() {
    let dir = tempdir().unwrap();
    let backend = JsonFileBackend::new(dir.path().join("notes.json"));

    {
        let mut store = NoteStore::open(
            Arc::new(JsonFileBackend::new(backend.path())),
            WritePolicy::WriteThrough,
            RetryPolicy::default(),
        );
        store.create(draft("First", &["a"]));
        store.create(draft("Second", &["b", "a"]));
    }

    let first = std::fs::read_to_string(backend.path()).unwrap();
    let loaded = backend.load().unwrap().unwrap();
    backend.save(&loaded).unwrap();
    let second = std::fs::read_to_string(backend.path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(decode_collection(&encode_collection(&loaded).unwrap()).unwrap(), loaded);
}

#[test]
fn test_ids_are_distinct_within_one_millisecond() {
    let mut store = write_through(Arc::new(MemoryBackend::new()));

    let ids: HashSet<String> = (0..500)
        .map(|i| store.create(draft(&format!("n{}", i), &[])).id)
        .collect();

    assert_eq!(ids.len(), 500);
    assert_eq!(store.len(), 500);
}

#[test]
fn test_update_keeps_identity() {
    let mut store = write_through(Arc::new(MemoryBackend::new()));
    let original = store.create(draft("Draft", &["a"]));

    let mut edited = original.clone();
    edited.title = "Final".to_string();
    edited.content = "done".to_string();
    edited.tags = vec!["b".to_string()];
    edited.created_at = chrono::Utc::now() + chrono::Duration::days(1);
    assert!(store.update(edited));

    let stored = store.get(&original.id).unwrap();
    assert_eq!(stored.id, original.id);
    assert_eq!(stored.created_at, original.created_at);
    assert!(stored.updated_at >= original.updated_at);
    assert_eq!(stored.title, "Final");
    assert_eq!(stored.tags, vec!["b"]);
}

#[test]
fn test_deleting_absent_id_twice_is_harmless() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = write_through(backend.clone());
    store.create(draft("Keep", &[]));
    let before = store.list().to_vec();
    let saves = backend.save_count();

    assert!(!store.delete("missing"));
    assert!(!store.delete("missing"));

    assert_eq!(store.list(), before.as_slice());
    assert_eq!(backend.save_count(), saves);
}

#[test]
fn test_tag_counts_and_popular_order() {
    let mut store = write_through(Arc::new(MemoryBackend::new()));
    store.create(draft("one", &["a", "b"]));
    store.create(draft("two", &["b"]));

    let tags = derive_tags(store.list(), &[]);
    let counts: Vec<(&str, usize)> = tags.iter().map(|t| (t.name.as_str(), t.count)).collect();
    assert_eq!(counts, vec![("a", 1), ("b", 2)]);

    let popular: Vec<String> = popular_tags(&tags).into_iter().map(|t| t.name).collect();
    assert_eq!(popular, vec!["b", "a"]);
}

#[test]
fn test_search_by_title() {
    let mut store = write_through(Arc::new(MemoryBackend::new()));
    store.create(draft("Meeting notes", &[]));
    store.create(draft("Shopping list", &[]));

    let titles = |query: &str| -> Vec<String> {
        search(store.list(), query)
            .into_iter()
            .map(|n| n.title.clone())
            .collect()
    };

    assert_eq!(titles("meet"), vec!["Meeting notes"]);
    assert!(titles("").is_empty());
    assert_eq!(titles("LIST"), vec!["Shopping list"]);
}

#[tokio::test]
async fn test_write_behind_reaches_storage_on_shutdown() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = NoteStore::open(
        backend.clone(),
        WritePolicy::WriteBehind,
        RetryPolicy::default(),
    );
    let mut changes = store.subscribe();

    let note = store.create(draft("Later", &["x"]));
    assert!(changes.has_changed().unwrap());
    assert_eq!(changes.borrow_and_update().revision, 1);

    store.shutdown().await.unwrap();

    let saved = backend.load().unwrap().unwrap();
    assert_eq!(saved, vec![note]);
}

#[test]
fn test_newer_schema_file_survives_an_older_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.json");
    let raw = r#"{"version": 9, "notes": [{"id": "x"}]}"#;
    std::fs::write(&path, raw).unwrap();

    let mut store = NoteStore::open(
        Arc::new(JsonFileBackend::new(&path)),
        WritePolicy::WriteThrough,
        RetryPolicy::default(),
    );
    assert!(store.is_empty());

    store.create(draft("Would overwrite", &[]));
    assert!(store.persistence_status().is_dirty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), raw);
}
