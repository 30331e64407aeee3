//! Export and import of the bookmark collection

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Bookmark, Category, Snapshot};

/// Format version written into JSON backups
pub const EXPORT_VERSION: &str = "1.0";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Backup<'a> {
    version: &'a str,
    exported_at: DateTime<Utc>,
    urls: &'a [Bookmark],
    categories: &'a [Category],
}

/// Pretty JSON backup of the whole collection
pub fn export_json(snapshot: &Snapshot) -> Result<String> {
    let backup = Backup {
        version: EXPORT_VERSION,
        exported_at: Utc::now(),
        urls: &snapshot.urls,
        categories: &snapshot.categories,
    };
    Ok(serde_json::to_string_pretty(&backup)?)
}

/// One spreadsheet row per bookmark, with the category name resolved
pub fn export_csv(snapshot: &Snapshot) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["url", "title", "description", "category", "tags", "favorite", "created_at"])?;

    for bookmark in &snapshot.urls {
        let category = bookmark
            .category_id
            .as_deref()
            .and_then(|id| snapshot.categories.iter().find(|c| c.id == id))
            .map(|c| c.name.clone())
            .unwrap_or_default();

        wtr.write_record(&[
            bookmark.url.clone(),
            bookmark.title.clone(),
            bookmark.description.clone(),
            category,
            bookmark.tags.join(";"),
            bookmark.favorite.to_string(),
            bookmark.created_at.to_rfc3339(),
        ])?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| Error::Unknown(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Unknown(format!("CSV is not UTF-8: {}", e)))
}

/// Parse a JSON backup, requiring both a `urls` and a `categories` array.
///
/// Nothing is applied here; the caller hands the snapshot to the store only
/// after this succeeds.
pub fn parse_import(json: &str) -> Result<Snapshot> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| Error::Import(format!("not valid JSON: {}", e)))?;

    for field in ["urls", "categories"] {
        match value.get(field) {
            Some(Value::Array(_)) => {}
            Some(_) => return Err(Error::Import(format!("'{}' must be an array", field))),
            None => return Err(Error::Import(format!("missing '{}' array", field))),
        }
    }

    serde_json::from_value(value).map_err(|e| Error::Import(format!("malformed entry: {}", e)))
}
