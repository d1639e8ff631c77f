// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule-file parsing (YAML and JSON)

use crate::rule::Rule;
use serde::Deserialize;
use thiserror::Error;

/// Rule file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

/// Errors that can occur during rule parsing
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid rule in {location}: {message}")]
    InvalidRule { location: String, message: String },
}

/// A rule file holds one rule or a list of rules.
#[derive(Deserialize)]
#[serde(untagged)]
enum RuleDoc {
    Many(Vec<Rule>),
    One(Box<Rule>),
}

/// Format for a rule file name, or `None` for non-rule files.
pub fn format_for_name(name: &str) -> Option<Format> {
    let ext = name.rsplit('.').next()?;
    match ext {
        "yaml" | "yml" => Some(Format::Yaml),
        "json" => Some(Format::Json),
        _ => None,
    }
}

/// Parse and validate the rules of one file.
pub fn parse_rules(content: &str, format: Format, location: &str) -> Result<Vec<Rule>, ParseError> {
    let doc: RuleDoc = match format {
        Format::Yaml => serde_yaml::from_str(content)?,
        Format::Json => serde_json::from_str(content)?,
    };
    let mut rules = match doc {
        RuleDoc::Many(rules) => rules,
        RuleDoc::One(rule) => vec![*rule],
    };
    for (index, rule) in rules.iter_mut().enumerate() {
        validate(rule, index, location)?;
        rule.url = location.to_string();
    }
    Ok(rules)
}

fn validate(rule: &mut Rule, index: usize, location: &str) -> Result<(), ParseError> {
    let here = |message: String| ParseError::InvalidRule {
        location: format!("{location}[{index}]"),
        message,
    };

    rule.when
        .init()
        .map_err(|e| here(format!("invalid when.pattern: {e}")))?;

    if rule.dest.table.is_empty() {
        return Err(here("dest.table was empty".into()));
    }
    for (pos, action) in rule
        .on_success
        .iter()
        .chain(rule.on_failure.iter())
        .enumerate()
    {
        if action.kind().is_none() {
            return Err(here(format!(
                "unknown action {:?} at position {pos}",
                action.action
            )));
        }
    }
    if let Some(split) = rule.dest.split() {
        if split.mapping.is_empty() {
            return Err(here("schema.split.mapping was empty".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
