//! Read model for the history list: search, pagination and display helpers.

use crate::core::{ClosedObjectRecord, Result};
use crate::history::{read_history, read_settings};
use crate::storage::PersistentStore;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Case-insensitive label substring; blank matches everything
    pub search: Option<String>,
    /// 1-based page number
    pub page: usize,
    /// Entries per page; `None` uses the stored display page size
    pub page_size: Option<usize>,
}

impl HistoryQuery {
    pub fn new() -> Self {
        Self {
            page: 1,
            ..Self::default()
        }
    }

    pub fn search(mut self, search: &str) -> Self {
        self.search = Some(search.to_string());
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub entries: Vec<ClosedObjectRecord>,
    pub page: usize,
    pub total_pages: usize,
    /// Entries matching the search
    pub matched: usize,
    /// Entries in the whole history
    pub total: usize,
}

impl HistoryPage {
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Filter and paginate an already loaded history
pub fn select_page(
    history: &[ClosedObjectRecord],
    query: &HistoryQuery,
    page_size: usize,
) -> HistoryPage {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let matched: Vec<&ClosedObjectRecord> = match &needle {
        Some(needle) => history
            .iter()
            .filter(|entry| entry.label.to_lowercase().contains(needle.as_str()))
            .collect(),
        None => history.iter().collect(),
    };

    let page_size = page_size.max(1);
    let total_pages = matched.len().div_ceil(page_size);
    let page = query.page.clamp(1, total_pages.max(1));
    let entries = matched
        .iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(|entry| (*entry).clone())
        .collect();

    HistoryPage {
        entries,
        page,
        total_pages,
        matched: matched.len(),
        total: history.len(),
    }
}

/// Load the stored history and settings and select one page.
///
/// A history that cannot be read is shown as empty.
pub async fn query_history(
    store: &dyn PersistentStore,
    query: &HistoryQuery,
) -> Result<HistoryPage> {
    let settings = read_settings(store).await?.unwrap_or_default();
    let history = read_history(store).await.unwrap_or_default();
    let page_size = query.page_size.unwrap_or(settings.display_page_size);
    Ok(select_page(&history, query, page_size))
}

/// Location the UI should reopen when an entry is activated
pub fn reopen_target(entry: &ClosedObjectRecord) -> &str {
    &entry.location_ref
}

const SHORT_LOCATION_MAX: usize = 50;

/// Host plus path of a location, cut to fit a list row.
///
/// Query and fragment are dropped and a bare "/" path is omitted. Anything
/// without a `scheme://host` part is shown as is, subject to the same cut.
pub fn shorten_location(location: &str) -> String {
    let shortened = match location.split_once("://") {
        Some((_, rest)) if !rest.is_empty() => {
            let rest = rest.split(['?', '#']).next().unwrap_or_default();
            match rest.split_once('/') {
                Some((host, path)) if !path.is_empty() => format!("{}/{}", host, path),
                Some((host, _)) => host.to_string(),
                None => rest.to_string(),
            }
        }
        _ => location.to_string(),
    };

    if shortened.chars().count() > SHORT_LOCATION_MAX {
        let head: String = shortened.chars().take(SHORT_LOCATION_MAX - 3).collect();
        format!("{}...", head)
    } else {
        shortened
    }
}

/// Relative age of a closure, e.g. "5m ago"
pub fn format_time_ago(closed_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(closed_at);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else if days < 7 {
        format!("{}d ago", days)
    } else {
        closed_at.format("%b %-d").to_string()
    }
}
