//! The normalized output unit and its field formatting.

use chrono::DateTime;

/// Source timestamp format, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const SOURCE_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Output timestamp format.
const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column headers, in output order.
pub const HEADERS: [&str; 7] = [
    "Author Name",
    "Post Date",
    "Post Link",
    "Other Hashtags",
    "Repost Count",
    "Impression Count",
    "Like Count",
];

/// One harvested post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub author_name: String,
    pub post_date: String,
    pub post_link: String,
    /// Co-occurring tags, `#`-prefixed, search tag excluded.
    pub other_hashtags: Vec<String>,
    pub repost_count: u64,
    pub impression_count: u64,
    pub like_count: u64,
}

impl Record {
    /// Field values in [`HEADERS`] order.
    pub fn to_row(&self) -> [String; 7] {
        [
            self.author_name.clone(),
            self.post_date.clone(),
            self.post_link.clone(),
            self.other_hashtags.join(", "),
            self.repost_count.to_string(),
            self.impression_count.to_string(),
            self.like_count.to_string(),
        ]
    }
}

/// Reformat a source timestamp; unparseable input is passed through unchanged.
pub fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_str(raw, SOURCE_DATE_FORMAT) {
        Ok(dt) => dt.format(OUTPUT_DATE_FORMAT).to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Permalink for a post, built from the author handle and numeric id.
pub fn permalink(base_url: &str, handle: &str, id: &str) -> String {
    format!(
        "{}/{}/status/{}",
        base_url.trim_end_matches('/'),
        handle,
        id
    )
}

/// Tags other than the search target, re-prefixed with `#`.
///
/// Comparison ignores case, surrounding whitespace and `#` characters.
pub fn co_tags<'a>(tags: impl IntoIterator<Item = &'a str>, search_tag: &str) -> Vec<String> {
    let target = normalize_tag(search_tag);
    tags.into_iter()
        .filter(|tag| normalize_tag(tag) != target)
        .map(|tag| format!("#{}", tag))
        .collect()
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('#', "").to_lowercase()
}
