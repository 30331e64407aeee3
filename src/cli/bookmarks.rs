//! Bookmark collection CLI commands

use crate::config::settings::AppConfig;
use crate::models::{Bookmark, BookmarkFilter, Category};
use crate::qr::qr_image_url;
use crate::storage::{BookmarkStore, FileStorage};
use crate::transfer::{export_csv, export_json, parse_import};
use crate::utils::normalize_url;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Open the store under the configured data directory
pub fn open_store(config: &AppConfig) -> Result<BookmarkStore> {
    let storage = FileStorage::new(&config.storage.data_dir)?;
    Ok(BookmarkStore::open(Box::new(storage)))
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// URL to save; `https://` is assumed when no scheme is given
    pub url: String,

    #[arg(long)]
    pub title: Option<String>,

    /// Category id
    #[arg(long)]
    pub category: Option<String>,

    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
}

impl AddArgs {
    pub fn execute(&self, config: &AppConfig) -> Result<()> {
        let mut store = open_store(config)?;
        let mut bookmark = store.add_url(&self.url, self.title.as_deref(), self.category.as_deref())?;

        if !self.tags.is_empty() {
            let tags = clean_tags(&self.tags);
            bookmark = store.update(bookmark.id, |b| b.tags = tags)?;
        }

        println!("➕ Saved #{} {}", bookmark.id, bookmark.url);
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub id: u64,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Category id; pass an empty value to clear it
    #[arg(long)]
    pub category: Option<String>,

    /// Comma-separated tags, replacing the current ones
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,
}

impl EditArgs {
    pub fn execute(&self, config: &AppConfig) -> Result<()> {
        let mut store = open_store(config)?;
        let bookmark = store.update(self.id, |b| {
            if let Some(url) = &self.url {
                b.url = url.clone();
            }
            if let Some(title) = &self.title {
                b.title = title.trim().to_string();
            }
            if let Some(description) = &self.description {
                b.description = description.trim().to_string();
            }
            if let Some(category) = &self.category {
                b.category_id = Some(category.trim().to_string()).filter(|c| !c.is_empty());
            }
            if let Some(tags) = &self.tags {
                b.tags = clean_tags(tags);
            }
        })?;

        println!("✏️  Updated {}", describe(&bookmark));
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Text matched against url, title, description and tags
    #[arg(long)]
    pub query: Option<String>,

    /// Category id
    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub tag: Option<String>,

    /// Only favorites
    #[arg(long, default_value = "false")]
    pub favorites: bool,
}

impl ListArgs {
    pub fn filter(&self) -> BookmarkFilter {
        BookmarkFilter {
            query: self.query.clone(),
            category_id: self.category.clone(),
            tag: self.tag.clone(),
            favorites_only: self.favorites,
        }
    }

    pub fn execute(&self, config: &AppConfig) -> Result<()> {
        let store = open_store(config)?;
        let matches = store.search(&self.filter());

        if matches.is_empty() {
            println!("No bookmarks found");
            return Ok(());
        }
        for bookmark in &matches {
            println!("{}", describe(bookmark));
        }
        println!("{} of {} bookmarks", matches.len(), store.list().len());
        Ok(())
    }
}

/// Commands that act on one bookmark by id
#[derive(Debug, Args)]
pub struct IdArgs {
    pub id: u64,
}

impl IdArgs {
    pub fn remove(&self, config: &AppConfig) -> Result<()> {
        let removed = open_store(config)?.remove(self.id)?;
        println!("🗑️  Removed #{} {}", removed.id, removed.url);
        Ok(())
    }

    pub fn toggle_favorite(&self, config: &AppConfig) -> Result<()> {
        let bookmark = open_store(config)?.toggle_favorite(self.id)?;
        let verb = if bookmark.favorite { "Starred" } else { "Unstarred" };
        println!("⭐ {} #{} {}", verb, bookmark.id, bookmark.url);
        Ok(())
    }

    /// Print the URL and count the visit
    pub fn visit(&self, config: &AppConfig) -> Result<()> {
        let bookmark = open_store(config)?.record_visit(self.id)?;
        println!("{}", bookmark.url);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value = "json")]
    pub format: ExportFormat,

    /// Output file; stdout when omitted
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl ExportArgs {
    pub fn execute(&self, config: &AppConfig) -> Result<()> {
        let snapshot = open_store(config)?.snapshot();
        let rendered = match self.format {
            ExportFormat::Json => export_json(&snapshot)?,
            ExportFormat::Csv => export_csv(&snapshot)?,
        };

        match &self.out {
            Some(path) => {
                fs::write(path, rendered)
                    .with_context(|| format!("Failed to write export to {}", path.display()))?;
                info!("📦 Exported {} bookmarks to {}", snapshot.urls.len(), path.display());
            }
            None => print!("{}", rendered),
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// JSON backup produced by `export`
    pub file: PathBuf,

    /// Keep existing bookmarks and add only new ones
    #[arg(long, default_value = "false")]
    pub merge: bool,
}

impl ImportArgs {
    pub fn execute(&self, config: &AppConfig) -> Result<()> {
        let json = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;

        // Nothing is touched unless the whole file is valid
        let snapshot = parse_import(&json)?;
        let summary = open_store(config)?.import(snapshot, self.merge)?;

        println!(
            "📥 Imported {} bookmarks and {} categories ({} duplicates skipped)",
            summary.added_urls, summary.added_categories, summary.skipped_urls
        );
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct QrArgs {
    /// URL to share
    pub url: String,
}

impl QrArgs {
    pub fn execute(&self, config: &AppConfig) -> Result<()> {
        let url = normalize_url(&self.url)?;
        println!("{}", qr_image_url(&config.qr, &url)?);
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    /// Create a category
    Add {
        name: String,

        #[arg(long)]
        color: Option<String>,
    },

    /// List categories with their bookmark counts
    List,

    /// Rename a category
    Rename { id: String, name: String },

    /// Delete a category; its bookmarks become uncategorized
    Remove { id: String },
}

impl CategoryCommand {
    pub fn execute(&self, config: &AppConfig) -> Result<()> {
        let mut store = open_store(config)?;

        match self {
            CategoryCommand::Add { name, color } => {
                let category = store.add_category(name, color.as_deref())?;
                println!("📁 Created {}", describe_category(&category, 0));
            }
            CategoryCommand::List => {
                if store.categories().is_empty() {
                    println!("No categories");
                }
                for category in store.categories() {
                    let count = store
                        .list()
                        .iter()
                        .filter(|b| b.category_id.as_deref() == Some(category.id.as_str()))
                        .count();
                    println!("{}", describe_category(category, count));
                }
            }
            CategoryCommand::Rename { id, name } => {
                let category = store.rename_category(id, name)?;
                println!("📁 Renamed {}", describe_category(&category, 0));
            }
            CategoryCommand::Remove { id } => {
                let category = store.remove_category(id)?;
                println!("🗑️  Removed category {}", category.id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Remember who is using this collection
    Set { name: String },

    /// Show the current user
    Show,

    /// Forget the current user
    Clear,
}

impl UserCommand {
    pub fn execute(&self, config: &AppConfig) -> Result<()> {
        let store = open_store(config)?;

        match self {
            UserCommand::Set { name } => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(anyhow!("User name must not be empty"));
                }
                store.set_user(Some(name))?;
                println!("👤 Signed in as {}", name);
            }
            UserCommand::Show => match store.session().user {
                Some(user) => println!("👤 {}", user),
                None => println!("Not signed in"),
            },
            UserCommand::Clear => {
                store.set_user(None)?;
                println!("👤 Signed out");
            }
        }
        Ok(())
    }
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !cleaned.iter().any(|c| c.eq_ignore_ascii_case(tag)) {
            cleaned.push(tag.to_string());
        }
    }
    cleaned
}

fn describe(bookmark: &Bookmark) -> String {
    let mut line = format!("#{} {} {}", bookmark.id, bookmark.title, bookmark.url);
    if bookmark.favorite {
        line.insert_str(0, "⭐ ");
    }
    if let Some(category) = &bookmark.category_id {
        line.push_str(&format!(" [{}]", category));
    }
    if !bookmark.tags.is_empty() {
        line.push_str(&format!(" #{}", bookmark.tags.join(" #")));
    }
    line
}

fn describe_category(category: &Category, count: usize) -> String {
    let mut line = format!("{} ({}) - {} bookmark(s)", category.name, category.id, count);
    if let Some(color) = &category.color {
        line.push_str(&format!(" {}", color));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::StorageConfig;
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            storage: StorageConfig {
                data_dir: dir.to_path_buf(),
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_add_with_tags_and_list_filter() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        AddArgs {
            url: "docs.rs".into(),
            title: None,
            category: None,
            tags: vec![" rust ".into(), "RUST".into(), "docs".into()],
        }
        .execute(&config)
        .unwrap();

        let store = open_store(&config).unwrap();
        let saved = &store.list()[0];
        assert_eq!(saved.url, "https://docs.rs");
        assert_eq!(saved.tags, vec!["rust".to_string(), "docs".to_string()]);

        let args = ListArgs {
            query: None,
            category: None,
            tag: Some("Docs".into()),
            favorites: false,
        };
        assert_eq!(store.search(&args.filter()).len(), 1);
    }

    #[test]
    fn test_edit_clears_category() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        {
            let mut store = open_store(&config).unwrap();
            store.add_category("Work", None).unwrap();
            store.add_url("example.com", None, Some("work")).unwrap();
        }

        EditArgs {
            id: 1,
            url: None,
            title: Some("Example".into()),
            description: None,
            category: Some(String::new()),
            tags: None,
        }
        .execute(&config)
        .unwrap();

        let store = open_store(&config).unwrap();
        assert_eq!(store.get(1).unwrap().title, "Example");
        assert_eq!(store.get(1).unwrap().category_id, None);
    }

    #[test]
    fn test_import_rejects_bad_file_without_changes() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path().join("data").as_path());
        open_store(&config).unwrap().add_url("example.com", None, None).unwrap();

        let file = dir.path().join("backup.json");
        fs::write(&file, r#"{"urls": []}"#).unwrap();
        let result = ImportArgs { file, merge: false }.execute(&config);

        assert!(result.is_err());
        assert_eq!(open_store(&config).unwrap().list().len(), 1);
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path().join("data").as_path());
        open_store(&config).unwrap().add_url("example.com", None, None).unwrap();

        let out = dir.path().join("export.csv");
        ExportArgs {
            format: ExportFormat::Csv,
            out: Some(out.clone()),
        }
        .execute(&config)
        .unwrap();

        let csv = fs::read_to_string(out).unwrap();
        assert!(csv.contains("https://example.com,example.com"));
    }

    #[test]
    fn test_user_session() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        UserCommand::Set { name: "sam".into() }.execute(&config).unwrap();
        assert_eq!(open_store(&config).unwrap().session().user.as_deref(), Some("sam"));

        UserCommand::Clear.execute(&config).unwrap();
        assert_eq!(open_store(&config).unwrap().session().user, None);
        assert!(UserCommand::Set { name: " ".into() }.execute(&config).is_err());
    }

    #[test]
    fn test_describe_bookmark() {
        let mut bookmark = Bookmark::new(3, "https://a.dev".into(), "A".into());
        bookmark.favorite = true;
        bookmark.tags = vec!["x".into(), "y".into()];
        assert_eq!(describe(&bookmark), "⭐ #3 A https://a.dev #x #y");
    }
}
