//! Search timeline response parsing.
//!
//! The platform delivers each page as a list of *instructions*, some of which
//! carry *entries*. Entries are either cursors or timeline items wrapping a
//! post. Several nesting shapes have shipped over time for the same data, so
//! each level is decoded by a small total function that names the shapes it
//! knows and returns `None` for anything else. A post that does not decode is
//! skipped; only a missing instruction list fails the page.

pub mod record;

use serde_json::Value;
use tracing::debug;

pub use record::{Record, HEADERS};

use crate::{Error, Result};

/// Opaque pagination token.
pub type Cursor = String;

/// Location of the instruction list inside a search response.
const INSTRUCTIONS_PATH: &str =
    "/data/search_by_raw_query/search_timeline/timeline/instructions";

/// Entry id of the bottom-cursor placeholder that replace instructions target.
const BOTTOM_CURSOR_PLACEHOLDER: &str = "cursor-bottom-0";

/// What one response page yielded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelinePage {
    pub records: Vec<Record>,
    /// Cursor for the next page, if the timeline continues.
    pub cursor: Option<Cursor>,
    /// Timeline items that did not decode into a record.
    pub skipped: usize,
}

enum Instruction<'a> {
    AddEntries(&'a [Value]),
    ReplaceEntry {
        replaces: Option<&'a str>,
        entry: &'a Value,
    },
    Other,
}

impl<'a> Instruction<'a> {
    fn decode(raw: &'a Value) -> Self {
        match raw.get("type").and_then(Value::as_str) {
            Some("TimelineAddEntries") => match raw.get("entries").and_then(Value::as_array) {
                Some(entries) => Self::AddEntries(entries),
                None => Self::Other,
            },
            Some("TimelineReplaceEntry") => match raw.get("entry") {
                Some(entry) => Self::ReplaceEntry {
                    replaces: raw
                        .get("entry_id_to_replace")
                        .or_else(|| raw.get("entryIdToReplace"))
                        .or_else(|| entry.get("entryIdToReplace"))
                        .and_then(Value::as_str),
                    entry,
                },
                None => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorKind {
    Bottom,
    ShowMore,
    Other,
}

enum Content<'a> {
    Cursor { kind: CursorKind, value: &'a str },
    Item(&'a Value),
    Other,
}

impl<'a> Content<'a> {
    fn decode(entry: &'a Value) -> Self {
        let Some(content) = entry.get("content") else {
            return Self::Other;
        };
        let entry_type = content
            .get("entryType")
            .or_else(|| content.get("__typename"))
            .and_then(Value::as_str);
        match entry_type {
            Some("TimelineTimelineCursor") => {
                let Some(value) = content.get("value").and_then(Value::as_str) else {
                    return Self::Other;
                };
                let kind = match content.get("cursorType").and_then(Value::as_str) {
                    Some("Bottom") => CursorKind::Bottom,
                    Some("ShowMore") => CursorKind::ShowMore,
                    _ => CursorKind::Other,
                };
                Self::Cursor { kind, value }
            }
            Some("TimelineTimelineItem") => match content.get("itemContent") {
                Some(item) => Self::Item(item),
                None => Self::Other,
            },
            _ => Self::Other,
        }
    }

    fn bottom_cursor(&self) -> Option<&'a str> {
        match *self {
            Self::Cursor {
                kind: CursorKind::Bottom,
                value,
            } => Some(value),
            _ => None,
        }
    }
}

/// Where the post node sits inside a tweet result.
enum TweetShape<'a> {
    /// `result` is the post itself.
    Plain(&'a Value),
    /// `result` wraps the post under `tweet` (visibility-restricted results).
    Wrapped(&'a Value),
}

impl<'a> TweetShape<'a> {
    fn decode(result: &'a Value) -> Self {
        match result.get("tweet") {
            Some(inner) if inner.is_object() => Self::Wrapped(inner),
            _ => Self::Plain(result),
        }
    }

    fn node(&self) -> &'a Value {
        match *self {
            Self::Plain(v) | Self::Wrapped(v) => v,
        }
    }
}

/// Where the author's legacy block sits inside a user result.
enum UserShape<'a> {
    /// `result.legacy`
    Direct { result: &'a Value, legacy: &'a Value },
    /// `result.user.legacy`
    Nested { result: &'a Value, legacy: &'a Value },
}

impl<'a> UserShape<'a> {
    fn decode(result: &'a Value) -> Option<Self> {
        if let Some(legacy) = result.get("legacy").filter(|v| v.is_object()) {
            return Some(Self::Direct { result, legacy });
        }
        let legacy = result
            .get("user")
            .and_then(|u| u.get("legacy"))
            .filter(|v| v.is_object())?;
        Some(Self::Nested { result, legacy })
    }

    /// First non-empty value of `field` from the legacy block, then `core`, then the result itself.
    fn field(&self, field: &str) -> Option<&'a str> {
        let (result, legacy) = match *self {
            Self::Direct { result, legacy } | Self::Nested { result, legacy } => (result, legacy),
        };
        [Some(legacy), result.get("core"), Some(result)]
            .into_iter()
            .flatten()
            .filter_map(|block| block.get(field).and_then(Value::as_str))
            .find(|s| !s.is_empty())
    }
}

/// Extracts records and the next cursor from search timeline responses.
#[derive(Debug, Clone)]
pub struct TimelineParser {
    search_tag: String,
    base_url: String,
}

impl TimelineParser {
    pub fn new(search_tag: impl Into<String>) -> Self {
        Self {
            search_tag: search_tag.into(),
            base_url: "https://x.com".into(),
        }
    }

    /// Origin used when synthesizing permalinks.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parse one raw response page.
    ///
    /// Fails only when the instruction list is missing entirely; a page with no
    /// entries yields an empty [`TimelinePage`].
    pub fn extract(&self, raw: &Value) -> Result<TimelinePage> {
        let instructions = raw
            .pointer(INSTRUCTIONS_PATH)
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedResponse(describe_missing(raw)))?;
        let instructions: Vec<Instruction> =
            instructions.iter().map(Instruction::decode).collect();

        let entries = gather_entries(&instructions);

        let mut page = TimelinePage::default();
        for entry in &entries {
            match Content::decode(entry) {
                Content::Cursor {
                    kind: CursorKind::Bottom | CursorKind::ShowMore,
                    value,
                } => page.cursor = Some(value.to_string()),
                Content::Cursor { .. } | Content::Other => {}
                Content::Item(item) => match self.decode_record(item) {
                    Some(record) => page.records.push(record),
                    None => page.skipped += 1,
                },
            }
        }

        // Cursors nested in the raw instructions take precedence over those
        // found while scanning; the flat entry list is the last resort.
        if let Some(cursor) = instruction_cursor(&instructions) {
            page.cursor = Some(cursor.to_string());
        }
        if page.cursor.is_none() {
            page.cursor = entries
                .iter()
                .filter_map(|e| Content::decode(e).bottom_cursor())
                .last()
                .map(str::to_string);
        }

        if page.skipped > 0 {
            debug!("skipped {} undecodable timeline items", page.skipped);
        }
        Ok(page)
    }

    fn decode_record(&self, item: &Value) -> Option<Record> {
        let result = item.pointer("/tweet_results/result")?;
        let tweet = TweetShape::decode(result).node();
        let legacy = tweet.get("legacy").filter(|v| v.is_object())?;

        let user_result = tweet.pointer("/core/user_results/result")?;
        let user = UserShape::decode(user_result)?;

        let id = legacy
            .get("id_str")
            .or_else(|| tweet.get("rest_id"))
            .and_then(Value::as_str)?;
        let created_at = legacy.get("created_at").and_then(Value::as_str)?;

        let handle = user.field("screen_name").unwrap_or("Unknown");
        let author_name = user.field("name").unwrap_or("Unknown");

        let tags = legacy
            .pointer("/entities/hashtags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Some(Record {
            author_name: author_name.to_string(),
            post_date: record::format_timestamp(created_at),
            post_link: record::permalink(&self.base_url, handle, id),
            other_hashtags: record::co_tags(tags, &self.search_tag),
            repost_count: count(legacy.get("retweet_count")),
            impression_count: count(tweet.pointer("/views/count")),
            like_count: count(legacy.get("favorite_count")),
        })
    }
}

/// Entries from every add-entries instruction, plus replacement entries that
/// target the bottom-cursor placeholder, in instruction order.
fn gather_entries<'a>(instructions: &[Instruction<'a>]) -> Vec<&'a Value> {
    let mut entries = Vec::new();
    for instruction in instructions {
        match *instruction {
            Instruction::AddEntries(list) => entries.extend(list.iter()),
            Instruction::ReplaceEntry {
                replaces: Some(BOTTOM_CURSOR_PLACEHOLDER),
                entry,
            } => entries.push(entry),
            Instruction::ReplaceEntry { .. } | Instruction::Other => {}
        }
    }
    entries
}

/// Last bottom cursor found directly in the instructions.
fn instruction_cursor<'a>(instructions: &[Instruction<'a>]) -> Option<&'a str> {
    let mut found = None;
    for instruction in instructions {
        match *instruction {
            Instruction::AddEntries(list) => {
                let last = list
                    .iter()
                    .filter_map(|e| Content::decode(e).bottom_cursor())
                    .last();
                if last.is_some() {
                    found = last;
                }
            }
            Instruction::ReplaceEntry { entry, .. } => {
                if let Some(c) = Content::decode(entry).bottom_cursor() {
                    found = Some(c);
                }
            }
            Instruction::Other => {}
        }
    }
    found
}

/// Non-negative integer from a number or numeric string; anything else is 0.
fn count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn describe_missing(raw: &Value) -> String {
    let api_error = raw
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str);
    match api_error {
        Some(message) => format!("no timeline instructions (api error: {})", message),
        None => "no timeline instructions".to_string(),
    }
}
