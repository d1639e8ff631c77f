// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Destination-table template expansion

use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use wr_core::PipelineError;

/// Placeholder pattern: `$YYYY`-style date tokens, `$1`..`$9` positional
/// captures, or `$name` params.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*|[1-9])").expect("constant regex pattern is valid")
});

/// Expand a destination-table template for one source object.
///
/// Date tokens come from the source modification time, so every file of a
/// window expands against its own mod time and the coordinator can verify
/// bucket membership per file.
pub fn expand_table(
    template: &str,
    source_time: DateTime<Utc>,
    captures: &[String],
    params: &HashMap<String, String>,
) -> Result<String, PipelineError> {
    let mut unresolved = Vec::new();
    let expanded = TOKEN_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let token = &caps[1];
            match token {
                "YYYY" => format!("{:04}", source_time.year()),
                "MM" => format!("{:02}", source_time.month()),
                "DD" => format!("{:02}", source_time.day()),
                "HH" => format!("{:02}", source_time.hour()),
                _ => {
                    if let Ok(index) = token.parse::<usize>() {
                        match captures.get(index - 1) {
                            Some(value) => value.clone(),
                            None => {
                                unresolved.push(format!("${token}"));
                                String::new()
                            }
                        }
                    } else {
                        match params.get(token) {
                            Some(value) => value.clone(),
                            None => {
                                unresolved.push(format!("${token}"));
                                String::new()
                            }
                        }
                    }
                }
            }
        })
        .into_owned();

    if !unresolved.is_empty() {
        return Err(PipelineError::config(format!(
            "unresolved placeholder(s) {} in table template {template:?}",
            unresolved.join(", ")
        )));
    }
    Ok(expanded)
}

#[cfg(test)]
#[path = "expand_tests.rs"]
mod tests;
