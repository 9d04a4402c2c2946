use regex::{Regex, RegexBuilder};

use crate::error::{VmError, VmResult};
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

const MAX_CACHED_PATTERNS: usize = 256;

/// Compiled patterns for one run. LIKE and REGEX operands are usually
/// constants inside loops, so they are compiled once per distinct pattern.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: FastHashMap<(String, bool), Regex>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self {
            compiled: fast_hash_map_new(),
        }
    }

    pub fn get(&mut self, pattern: &str, case_insensitive: bool) -> VmResult<&Regex> {
        let key = (pattern.to_string(), case_insensitive);
        if !self.compiled.contains_key(&key) {
            if self.compiled.len() >= MAX_CACHED_PATTERNS {
                self.compiled.clear();
            }
            let re = RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| VmError::InvalidOperation(format!("Invalid regular expression '{pattern}': {e}")))?;
            self.compiled.insert(key.clone(), re);
        }
        self.compiled
            .get(&key)
            .ok_or_else(|| VmError::InvalidOperation(format!("Invalid regular expression '{pattern}'")))
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Translates a SQL LIKE pattern into an anchored regex. `%` matches any run
/// of characters, `_` exactly one; a backslash makes the next character
/// literal.
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => match chars.next() {
                Some(next) => out.push_str(&regex::escape(&next.to_string())),
                None => out.push_str(r"\\"),
            },
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// SQL `LIKE` / `ILIKE` over the whole string.
pub fn like(cache: &mut RegexCache, haystack: &str, pattern: &str, case_insensitive: bool) -> VmResult<bool> {
    let re = cache.get(&like_to_regex(pattern), case_insensitive)?;
    Ok(re.is_match(haystack))
}

/// Unanchored regular-expression search.
pub fn regex_match(cache: &mut RegexCache, haystack: &str, pattern: &str, case_insensitive: bool) -> VmResult<bool> {
    let re = cache.get(pattern, case_insensitive)?;
    Ok(re.is_match(haystack))
}
