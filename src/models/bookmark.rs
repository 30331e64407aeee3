//! Bookmark and category records as persisted and exported

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// A saved URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub visit_count: u64,
}

impl Bookmark {
    pub fn new(id: u64, url: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            url,
            title,
            description: String::new(),
            category_id: None,
            tags: Vec::new(),
            favorite: false,
            created_at: now,
            updated_at: now,
            visit_count: 0,
        }
    }

    /// Case-insensitive match against url, title, description and tags
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        self.url.to_lowercase().contains(&needle)
            || self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl Category {
    /// Create a category whose id is the slug of its name
    pub fn new(name: &str) -> Self {
        Self {
            id: slugify(name),
            name: name.trim().to_string(),
            color: None,
        }
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

// Bulk `{urls, categories}` snapshot used for backup and import
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub urls: Vec<Bookmark>,
    pub categories: Vec<Category>,
}

/// Criteria for listing bookmarks; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct BookmarkFilter {
    pub query: Option<String>,
    pub category_id: Option<String>,
    pub tag: Option<String>,
    pub favorites_only: bool,
}

impl BookmarkFilter {
    pub fn matches(&self, bookmark: &Bookmark) -> bool {
        if self.favorites_only && !bookmark.favorite {
            return false;
        }
        if let Some(category) = &self.category_id {
            if bookmark.category_id.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !bookmark.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        match &self.query {
            Some(query) => bookmark.matches_query(query),
            None => true,
        }
    }
}
