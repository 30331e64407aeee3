//! In-memory bookmark list mirrored to storage on every mutation

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{Bookmark, BookmarkFilter, Category, Snapshot};
use crate::utils::{host_of, normalize_url};

use super::backend::KeyValueStorage;
use super::{CATEGORIES_KEY, SESSION_KEY, URLS_KEY};

/// Who is using this collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Option<String>,
    pub updated_at: Option<chrono::DateTime<Utc>>,
}

/// What an import changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added_urls: usize,
    pub added_categories: usize,
    pub skipped_urls: usize,
}

pub struct BookmarkStore {
    storage: Box<dyn KeyValueStorage>,
    urls: Vec<Bookmark>,
    categories: Vec<Category>,
}

impl BookmarkStore {
    /// Load the stored snapshot once. Unreadable or corrupt entries are
    /// logged and replaced by empty lists.
    pub fn open(storage: Box<dyn KeyValueStorage>) -> Self {
        let urls: Vec<Bookmark> = load_or_default(storage.as_ref(), URLS_KEY);
        let categories: Vec<Category> = load_or_default(storage.as_ref(), CATEGORIES_KEY);
        debug!("Loaded {} bookmarks and {} categories", urls.len(), categories.len());

        Self {
            storage,
            urls,
            categories,
        }
    }

    fn persist_urls(&self) -> Result<()> {
        let json = serde_json::to_string(&self.urls)?;
        self.storage.set(URLS_KEY, &json)
    }

    fn persist_categories(&self) -> Result<()> {
        let json = serde_json::to_string(&self.categories)?;
        self.storage.set(CATEGORIES_KEY, &json)
    }

    /// Write both lists or neither: a failed bookmark write puts the previous
    /// categories back.
    fn write_both(&self, urls: &[Bookmark], categories: &[Category]) -> Result<()> {
        let urls_json = serde_json::to_string(urls)?;
        let categories_json = serde_json::to_string(categories)?;
        let previous_categories = self.storage.get(CATEGORIES_KEY)?;

        self.storage.set(CATEGORIES_KEY, &categories_json)?;
        if let Err(e) = self.storage.set(URLS_KEY, &urls_json) {
            let restored = match &previous_categories {
                Some(json) => self.storage.set(CATEGORIES_KEY, json),
                None => self.storage.remove(CATEGORIES_KEY),
            };
            if let Err(restore_error) = restored {
                warn!("Could not restore categories after a failed write: {}", restore_error);
            }
            return Err(e);
        }
        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.urls.iter().map(|b| b.id).max().unwrap_or(0) + 1
    }

    fn ensure_category(&self, category_id: Option<&str>) -> Result<()> {
        match category_id {
            Some(id) if !self.categories.iter().any(|c| c.id == id) => {
                Err(Error::NotFound(format!("category '{}'", id)))
            }
            _ => Ok(()),
        }
    }

    fn position(&self, id: u64) -> Result<usize> {
        self.urls
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| Error::NotFound(format!("bookmark {}", id)))
    }

    pub fn list(&self) -> &[Bookmark] {
        &self.urls
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, id: u64) -> Option<&Bookmark> {
        self.urls.iter().find(|b| b.id == id)
    }

    pub fn find_by_url(&self, url: &str) -> Option<&Bookmark> {
        self.urls.iter().find(|b| b.url == url)
    }

    /// Every saved URL, in insertion order
    pub fn urls(&self) -> Vec<String> {
        self.urls.iter().map(|b| b.url.clone()).collect()
    }

    pub fn search(&self, filter: &BookmarkFilter) -> Vec<&Bookmark> {
        self.urls.iter().filter(|b| filter.matches(b)).collect()
    }

    /// Validate, normalize and save a new URL
    pub fn add_url(&mut self, input: &str, title: Option<&str>, category_id: Option<&str>) -> Result<Bookmark> {
        let url = normalize_url(input)?;
        if self.find_by_url(&url).is_some() {
            return Err(Error::Validation(format!("{} is already saved", url)));
        }
        self.ensure_category(category_id)?;

        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => host_of(&url).unwrap_or_else(|| url.clone()),
        };

        let mut bookmark = Bookmark::new(self.next_id(), url, title);
        bookmark.category_id = category_id.map(str::to_string);

        self.urls.push(bookmark.clone());
        self.persist_urls()?;
        info!("Saved bookmark {} ({})", bookmark.id, bookmark.url);
        Ok(bookmark)
    }

    /// Apply `change` to a bookmark; the edit is discarded if it leaves an
    /// invalid URL, a duplicate URL or an unknown category.
    pub fn update<F>(&mut self, id: u64, change: F) -> Result<Bookmark>
    where
        F: FnOnce(&mut Bookmark),
    {
        let index = self.position(id)?;
        let mut edited = self.urls[index].clone();
        change(&mut edited);

        edited.id = id;
        edited.url = normalize_url(&edited.url)?;
        if self.urls.iter().any(|b| b.id != id && b.url == edited.url) {
            return Err(Error::Validation(format!("{} is already saved", edited.url)));
        }
        self.ensure_category(edited.category_id.as_deref())?;
        edited.updated_at = Utc::now();

        self.urls[index] = edited.clone();
        self.persist_urls()?;
        Ok(edited)
    }

    pub fn remove(&mut self, id: u64) -> Result<Bookmark> {
        let index = self.position(id)?;
        let removed = self.urls.remove(index);
        self.persist_urls()?;
        info!("Removed bookmark {} ({})", removed.id, removed.url);
        Ok(removed)
    }

    pub fn record_visit(&mut self, id: u64) -> Result<Bookmark> {
        self.update(id, |b| b.visit_count += 1)
    }

    pub fn toggle_favorite(&mut self, id: u64) -> Result<Bookmark> {
        self.update(id, |b| b.favorite = !b.favorite)
    }

    pub fn add_category(&mut self, name: &str, color: Option<&str>) -> Result<Category> {
        let mut category = Category::new(name);
        if category.id.is_empty() {
            return Err(Error::Validation("category name is empty".to_string()));
        }
        if self.categories.iter().any(|c| c.id == category.id) {
            return Err(Error::Validation(format!("category '{}' already exists", category.id)));
        }
        category.color = color.map(str::to_string);

        self.categories.push(category.clone());
        self.persist_categories()?;
        Ok(category)
    }

    pub fn rename_category(&mut self, id: &str, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("category name is empty".to_string()));
        }
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("category '{}'", id)))?;
        category.name = name.to_string();
        let renamed = category.clone();

        self.persist_categories()?;
        Ok(renamed)
    }

    /// Delete a category; its bookmarks become uncategorized
    pub fn remove_category(&mut self, id: &str) -> Result<Category> {
        let index = self
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("category '{}'", id)))?;
        let removed = self.categories.remove(index);

        let mut orphaned = 0;
        for bookmark in self.urls.iter_mut().filter(|b| b.category_id.as_deref() == Some(id)) {
            bookmark.category_id = None;
            orphaned += 1;
        }

        self.persist_categories()?;
        if orphaned > 0 {
            self.persist_urls()?;
        }
        Ok(removed)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            urls: self.urls.clone(),
            categories: self.categories.clone(),
        }
    }

    /// Apply an imported snapshot, all or nothing.
    ///
    /// Every URL is validated before anything changes. With `merge`, existing
    /// data is kept and only new URLs and categories are added (with fresh
    /// ids); otherwise the snapshot replaces the collection.
    pub fn import(&mut self, snapshot: Snapshot, merge: bool) -> Result<ImportSummary> {
        let mut incoming = Vec::with_capacity(snapshot.urls.len());
        for mut bookmark in snapshot.urls {
            bookmark.url = normalize_url(&bookmark.url)
                .map_err(|e| Error::Import(format!("bookmark {}: {}", bookmark.id, e)))?;
            incoming.push(bookmark);
        }
        if snapshot.categories.iter().any(|c| c.id.trim().is_empty()) {
            return Err(Error::Import("category with an empty id".to_string()));
        }

        let mut summary = ImportSummary::default();
        let (urls, categories) = if merge {
            let mut categories = self.categories.clone();
            for category in snapshot.categories {
                if !categories.iter().any(|c| c.id == category.id) {
                    categories.push(category);
                    summary.added_categories += 1;
                }
            }

            let mut urls = self.urls.clone();
            let mut seen: HashSet<String> = urls.iter().map(|b| b.url.clone()).collect();
            let mut next_id = self.next_id();
            for mut bookmark in incoming {
                if !seen.insert(bookmark.url.clone()) {
                    summary.skipped_urls += 1;
                    continue;
                }
                bookmark.id = next_id;
                next_id += 1;
                urls.push(bookmark);
                summary.added_urls += 1;
            }
            (urls, categories)
        } else {
            let mut seen = HashSet::new();
            let mut urls = Vec::with_capacity(incoming.len());
            for bookmark in incoming {
                if seen.insert(bookmark.url.clone()) {
                    urls.push(bookmark);
                } else {
                    summary.skipped_urls += 1;
                }
            }
            renumber_duplicate_ids(&mut urls)?;
            summary.added_urls = urls.len();
            summary.added_categories = snapshot.categories.len();
            (urls, snapshot.categories)
        };

        let known: HashSet<&str> = categories.iter().map(|c| c.id.as_str()).collect();
        let urls: Vec<Bookmark> = urls
            .into_iter()
            .map(|mut b| {
                if b.category_id.as_deref().map_or(false, |id| !known.contains(id)) {
                    b.category_id = None;
                }
                b
            })
            .collect();

        self.write_both(&urls, &categories)?;
        self.urls = urls;
        self.categories = categories;

        info!(
            "Imported {} bookmarks and {} categories ({} skipped)",
            summary.added_urls, summary.added_categories, summary.skipped_urls
        );
        Ok(summary)
    }

    pub fn session(&self) -> Session {
        load_or_default(self.storage.as_ref(), SESSION_KEY)
    }

    pub fn set_user(&self, user: Option<&str>) -> Result<Session> {
        let session = Session {
            user: user.map(str::to_string),
            updated_at: Some(Utc::now()),
        };
        self.storage.set(SESSION_KEY, &serde_json::to_string(&session)?)?;
        Ok(session)
    }
}

/// Give every bookmark that repeats an earlier id a fresh one past the
/// current maximum.
fn renumber_duplicate_ids(urls: &mut [Bookmark]) -> Result<()> {
    let max = urls.iter().map(|b| b.id).max().unwrap_or(0);
    let mut next_id = max;
    let mut ids = HashSet::with_capacity(urls.len());
    for bookmark in urls.iter_mut() {
        if ids.insert(bookmark.id) {
            continue;
        }
        next_id = next_id
            .checked_add(1)
            .ok_or_else(|| Error::Import("no free bookmark id left".to_string()))?;
        debug!("Bookmark id {} is taken, importing {} as {}", bookmark.id, bookmark.url, next_id);
        bookmark.id = next_id;
        ids.insert(next_id);
    }
    Ok(())
}

fn load_or_default<T: DeserializeOwned + Default>(storage: &dyn KeyValueStorage, key: &str) -> T {
    match storage.get(key) {
        Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("Ignoring corrupt '{}' in storage: {}", key, e);
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            warn!("Could not read '{}' from storage: {}", key, e);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    /// Storage that shares its contents with the test and can be made to fail
    #[derive(Clone, Default)]
    struct SharedStorage {
        inner: Arc<MemoryStorage>,
        fail_writes: Arc<std::sync::atomic::AtomicBool>,
        fail_key: Arc<std::sync::Mutex<Option<&'static str>>>,
    }

    impl KeyValueStorage for SharedStorage {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst)
                || *self.fail_key.lock().unwrap() == Some(key)
            {
                return Err(Error::Storage("quota exceeded".to_string()));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    fn store() -> (BookmarkStore, SharedStorage) {
        let storage = SharedStorage::default();
        (BookmarkStore::open(Box::new(storage.clone())), storage)
    }

    #[test]
    fn test_add_url_normalizes_and_persists() {
        let (mut store, storage) = store();
        let bookmark = store.add_url("example.com", None, None).unwrap();

        assert_eq!(bookmark.url, "https://example.com");
        assert_eq!(bookmark.title, "example.com");
        assert_eq!(bookmark.id, 1);

        let reopened = BookmarkStore::open(Box::new(storage));
        assert_eq!(reopened.list().len(), 1);
        assert_eq!(reopened.urls(), vec!["https://example.com".to_string()]);
    }

    #[test]
    fn test_add_url_rejects_invalid_and_duplicates() {
        let (mut store, _) = store();
        assert!(matches!(store.add_url("not-a-domain", None, None), Err(Error::Validation(_))));
        store.add_url("https://example.com", None, None).unwrap();
        assert!(matches!(store.add_url("example.com/", None, None), Err(Error::Validation(_))));
        assert!(matches!(
            store.add_url("rust-lang.org", None, Some("missing")),
            Err(Error::NotFound(_))
        ));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_corrupt_storage_is_ignored() {
        let storage = SharedStorage::default();
        storage.set(URLS_KEY, "{not json").unwrap();
        let store = BookmarkStore::open(Box::new(storage));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_storage_failure_keeps_memory_state() {
        let (mut store, storage) = store();
        storage.fail_writes.store(true, std::sync::atomic::Ordering::SeqCst);

        let err = store.add_url("example.com", None, None).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(err.is_structural());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_update_rejects_bad_edit() {
        let (mut store, _) = store();
        let first = store.add_url("a.dev", None, None).unwrap();
        store.add_url("b.dev", None, None).unwrap();

        assert!(store.update(first.id, |b| b.url = "b.dev".to_string()).is_err());
        assert!(store.update(first.id, |b| b.url = "nope".to_string()).is_err());
        assert_eq!(store.get(first.id).unwrap().url, "https://a.dev");

        let favorite = store.toggle_favorite(first.id).unwrap();
        assert!(favorite.favorite);
        assert_eq!(store.record_visit(first.id).unwrap().visit_count, 1);
    }

    #[test]
    fn test_remove_category_orphans_bookmarks() {
        let (mut store, _) = store();
        let category = store.add_category("Reading List", Some("#ff0000")).unwrap();
        assert_eq!(category.id, "reading-list");
        assert!(store.add_category("reading list", None).is_err());

        let bookmark = store.add_url("a.dev", Some("A"), Some("reading-list")).unwrap();
        assert_eq!(store.rename_category("reading-list", "Later").unwrap().name, "Later");

        store.remove_category("reading-list").unwrap();
        assert_eq!(store.get(bookmark.id).unwrap().category_id, None);
        assert!(store.categories().is_empty());
    }

    #[test]
    fn test_search() {
        let (mut store, _) = store();
        store.add_category("Dev", None).unwrap();
        store.add_url("docs.rs", Some("Rust docs"), Some("dev")).unwrap();
        store.add_url("news.ycombinator.com", Some("HN"), None).unwrap();

        let filter = BookmarkFilter { query: Some("rust".into()), ..Default::default() };
        assert_eq!(store.search(&filter).len(), 1);

        let filter = BookmarkFilter { category_id: Some("dev".into()), ..Default::default() };
        assert_eq!(store.search(&filter)[0].title, "Rust docs");
    }

    #[test]
    fn test_import_invalid_url_changes_nothing() {
        let (mut store, _) = store();
        store.add_url("keep.dev", None, None).unwrap();

        let snapshot = Snapshot {
            urls: vec![
                Bookmark::new(1, "https://fine.dev".into(), "ok".into()),
                Bookmark::new(2, "bad".into(), "bad".into()),
            ],
            categories: vec![],
        };

        assert!(matches!(store.import(snapshot, false), Err(Error::Import(_))));
        assert_eq!(store.urls(), vec!["https://keep.dev".to_string()]);
    }

    #[test]
    fn test_import_merge_skips_duplicates() {
        let (mut store, _) = store();
        store.add_url("keep.dev", None, None).unwrap();

        let mut incoming = Bookmark::new(1, "https://new.dev".into(), "New".into());
        incoming.category_id = Some("gone".into());
        let snapshot = Snapshot {
            urls: vec![Bookmark::new(1, "https://keep.dev".into(), "dup".into()), incoming],
            categories: vec![Category::new("Tools")],
        };

        let summary = store.import(snapshot, true).unwrap();
        assert_eq!(summary, ImportSummary { added_urls: 1, added_categories: 1, skipped_urls: 1 });
        assert_eq!(store.list().len(), 2);
        assert_eq!(store.find_by_url("https://new.dev").unwrap().id, 2);
        assert_eq!(store.find_by_url("https://new.dev").unwrap().category_id, None);
    }

    #[test]
    fn test_import_replace() {
        let (mut store, _) = store();
        store.add_url("old.dev", None, None).unwrap();

        let snapshot = Snapshot {
            urls: vec![Bookmark::new(9, "new.dev".into(), "New".into())],
            categories: vec![Category::new("Tools")],
        };
        store.import(snapshot, false).unwrap();

        assert_eq!(store.urls(), vec!["https://new.dev".to_string()]);
        assert_eq!(store.categories()[0].id, "tools");
    }

    #[test]
    fn test_import_failed_write_leaves_storage_unchanged() {
        let (mut store, storage) = store();
        store.add_category("Old", None).unwrap();
        store.add_url("old.dev", None, Some("old")).unwrap();
        let before = store.snapshot();

        *storage.fail_key.lock().unwrap() = Some(URLS_KEY);
        let snapshot = Snapshot {
            urls: vec![Bookmark::new(1, "new.dev".into(), "New".into())],
            categories: vec![Category::new("New")],
        };
        assert!(matches!(store.import(snapshot, false), Err(Error::Storage(_))));
        assert_eq!(store.snapshot(), before);

        *storage.fail_key.lock().unwrap() = None;
        let reopened = BookmarkStore::open(Box::new(storage));
        assert_eq!(reopened.urls(), vec!["https://old.dev".to_string()]);
        let category_ids: Vec<&str> = reopened.categories().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(category_ids, vec!["old"]);
        assert_eq!(reopened.list()[0].category_id.as_deref(), Some("old"));
    }

    #[test]
    fn test_import_failed_write_on_empty_storage_leaves_nothing() {
        let (mut store, storage) = store();
        *storage.fail_key.lock().unwrap() = Some(URLS_KEY);

        let snapshot = Snapshot {
            urls: vec![Bookmark::new(1, "new.dev".into(), "New".into())],
            categories: vec![Category::new("New")],
        };
        assert!(store.import(snapshot, true).is_err());
        assert_eq!(storage.get(CATEGORIES_KEY).unwrap(), None);
        assert!(store.categories().is_empty());
    }

    #[test]
    fn test_import_replace_renumbers_repeated_ids() {
        let (mut store, _) = store();
        let snapshot = Snapshot {
            urls: vec![
                Bookmark::new(1, "a.dev".into(), "A".into()),
                Bookmark::new(1, "b.dev".into(), "B".into()),
                Bookmark::new(5, "c.dev".into(), "C".into()),
            ],
            categories: vec![],
        };
        store.import(snapshot, false).unwrap();

        let ids: Vec<u64> = store.list().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 6, 5]);
        assert_eq!(store.get(6).unwrap().url, "https://b.dev");

        store.remove(1).unwrap();
        assert_eq!(store.urls(), vec!["https://b.dev".to_string(), "https://c.dev".to_string()]);
        assert_eq!(store.add_url("d.dev", None, None).unwrap().id, 7);
    }

    #[test]
    fn test_session() {
        let (store, _) = store();
        assert_eq!(store.session().user, None);
        store.set_user(Some("sam")).unwrap();
        assert_eq!(store.session().user.as_deref(), Some("sam"));
    }
}
