use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, Result};

/// A deduplicated set of user ids read from an import file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocklist {
    pub user_ids: BTreeSet<String>,
    pub duplicated: usize,
    pub invalid: usize,
}

impl Blocklist {
    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    /// Ids in a stable order, ready for an imported-ids session.
    pub fn into_ids(self) -> Vec<String> {
        self.user_ids.into_iter().collect()
    }

    /// Merge `other` into `self`. Ids present in both count as duplicates.
    /// The merged set still never grows past `max`.
    pub fn concat(mut self, other: Blocklist, max: usize) -> Blocklist {
        self.duplicated += other.duplicated;
        self.invalid += other.invalid;
        for id in other.user_ids {
            if self.user_ids.len() >= max {
                break;
            }
            if !self.user_ids.insert(id) {
                self.duplicated += 1;
            }
        }
        self
    }

    /// Count one candidate. Returns `false` once the set is full.
    fn push(&mut self, id: &str, max: usize) -> bool {
        if self.user_ids.len() >= max {
            return false;
        }
        if !is_user_id(id) {
            self.invalid += 1;
        } else if !self.user_ids.insert(id.to_string()) {
            self.duplicated += 1;
        }
        self.user_ids.len() < max
    }
}

fn is_user_id(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse an import file. Text starting with `{` is read as
/// `{"users":[{"id":...}]}`, anything else as one id per line.
pub fn parse(text: &str, max: usize) -> Result<Blocklist> {
    let list = if text.trim_start().starts_with('{') {
        parse_json(text, max)?
    } else {
        parse_lines(text, max)
    };
    debug!(
        ids = list.len(),
        duplicated = list.duplicated,
        invalid = list.invalid,
        "blocklist parsed"
    );
    Ok(list)
}

/// Parse several import files and merge them into one list.
pub fn parse_files(paths: &[impl AsRef<Path>], max: usize) -> Result<Blocklist> {
    let mut merged = Blocklist::default();
    for (path, text) in paths.iter().zip(crate::io::read_all(paths)?) {
        let list = parse(&text, max).map_err(|err| match err {
            EngineError::Blocklist(msg) | EngineError::Validation(msg) => {
                EngineError::Blocklist(format!("{}: {msg}", path.as_ref().display()))
            }
            other => other,
        })?;
        merged = merged.concat(list, max);
    }
    Ok(merged)
}

/// One id per line, the format [`parse`] reads back.
pub fn render(ids: &[String]) -> String {
    let mut out = String::with_capacity(ids.len() * 20);
    for id in ids {
        out.push_str(id);
        out.push('\n');
    }
    out
}

fn parse_json(text: &str, max: usize) -> Result<Blocklist> {
    let json: Value = serde_json::from_str(text)?;
    let users = json
        .get("users")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::Blocklist("expected a \"users\" array".into()))?;

    let mut list = Blocklist::default();
    for user in users {
        let id = match user.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) if n.is_u64() => n.to_string(),
            _ => String::new(),
        };
        if !list.push(&id, max) {
            break;
        }
    }
    Ok(list)
}

fn parse_lines(text: &str, max: usize) -> Blocklist {
    let mut list = Blocklist::default();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !list.push(line, max) {
            break;
        }
    }
    list
}
