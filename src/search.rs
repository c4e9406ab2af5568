//! Search query and SearchTimeline variables.

use serde_json::{json, Value};

use crate::config::SearchConfig;

/// Operation that serves search results.
pub const SEARCH_OPERATION: &str = "SearchTimeline";

/// Raw query string as typed into the search box.
pub fn raw_query(search: &SearchConfig) -> String {
    format!(
        "{} since:{} until:{}",
        search.tag.trim(),
        search.since,
        search.until
    )
}

/// Variables for one SearchTimeline page.
pub fn variables(search: &SearchConfig, cursor: Option<&str>) -> Value {
    let mut vars = json!({
        "rawQuery": raw_query(search),
        "count": search.page_size,
        "querySource": "typed_query",
        "product": search.product,
        "withGrokTranslatedBio": false
    });
    if let Some(cursor) = cursor {
        vars["cursor"] = Value::String(cursor.to_string());
    }
    vars
}
