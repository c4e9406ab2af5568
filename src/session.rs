//! Captured browser session input.
//!
//! A session file is produced by an external capture tool after an interactive
//! login. It must be validated before any browser work begins.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::{Error, Result};

/// One captured cookie.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
}

/// Validated session: cookies plus web storage snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub cookies: Vec<SessionCookie>,
    pub local_storage: BTreeMap<String, String>,
    pub session_storage: BTreeMap<String, String>,
}

impl SessionState {
    /// Read and validate a session file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Parse and validate session JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Validate an already-parsed session document.
    ///
    /// Requires an object with a `cookies` array. `localStorage` and
    /// `sessionStorage` are optional and default to empty.
    pub fn from_value(value: &Value) -> Result<Self> {
        let doc = value
            .as_object()
            .ok_or_else(|| Error::Session("session data must be an object".into()))?;
        let cookies = doc
            .get("cookies")
            .ok_or_else(|| Error::Session("session data has no 'cookies'".into()))?
            .as_array()
            .ok_or_else(|| Error::Session("'cookies' must be a list".into()))?;

        let cookies = cookies
            .iter()
            .enumerate()
            .map(|(i, c)| {
                serde_json::from_value(c.clone())
                    .map_err(|e| Error::Session(format!("cookie {}: {}", i, e)))
            })
            .collect::<Result<Vec<SessionCookie>>>()?;

        Ok(Self {
            cookies,
            local_storage: storage(doc.get("localStorage"), "localStorage")?,
            session_storage: storage(doc.get("sessionStorage"), "sessionStorage")?,
        })
    }
}

fn storage(raw: Option<&Value>, key: &str) -> Result<BTreeMap<String, String>> {
    let entries = match raw {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(entries)) => entries,
        Some(_) => return Err(Error::Session(format!("'{}' must be an object", key))),
    };
    Ok(entries
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_session() {
        let session = SessionState::from_value(&json!({
            "cookies": [
                { "name": "auth_token", "value": "abc", "domain": ".x.com", "path": "/",
                  "httpOnly": true, "secure": true },
                { "name": "ct0", "value": "def" }
            ],
            "localStorage": { "theme": "dark", "count": 3 }
        }))
        .unwrap();
        assert_eq!(session.cookies.len(), 2);
        assert_eq!(session.cookies[0].domain.as_deref(), Some(".x.com"));
        assert_eq!(session.cookies[1].path, None);
        assert_eq!(session.local_storage["theme"], "dark");
        assert_eq!(session.local_storage["count"], "3");
        assert!(session.session_storage.is_empty());
    }

    #[test]
    fn test_rejects_non_object() {
        let err = SessionState::from_value(&json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("object"));
    }

    #[test]
    fn test_rejects_missing_cookies() {
        let err = SessionState::from_value(&json!({ "localStorage": {} })).unwrap_err();
        assert!(err.to_string().contains("cookies"));
    }

    #[test]
    fn test_rejects_non_list_cookies() {
        let err = SessionState::from_value(&json!({ "cookies": { "a": 1 } })).unwrap_err();
        assert!(err.to_string().contains("list"));
    }

    #[test]
    fn test_rejects_bad_cookie() {
        let err = SessionState::from_value(&json!({ "cookies": [{ "value": "x" }] })).unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }

    #[test]
    fn test_from_json_text() {
        let session = SessionState::from_json(r#"{"cookies": []}"#).unwrap();
        assert_eq!(session, SessionState::default());
        assert!(matches!(
            SessionState::from_json("not json"),
            Err(Error::Json(_))
        ));
    }
}
