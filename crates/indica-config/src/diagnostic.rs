// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Every `indica.toml` field has a default, so figment can only fail on a
//! misspelled key or a value of the wrong shape. Both are reported as miette
//! diagnostics; misspelled keys point at the offending line and suggest the
//! closest valid key.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration problem, renderable with [`render_errors`].
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key that no section of `indica.toml` defines.
    #[error("unknown key `{key}` in [{section}]")]
    #[diagnostic(
        code(indica::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        section: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value that does not deserialize into its field.
    #[error("bad value for `{key}`: {detail}")]
    #[diagnostic(code(indica::config::bad_value))]
    BadValue { key: String, detail: String },

    /// A semantic check from [`crate::validation`] failed.
    #[error("validation error: {message}")]
    #[diagnostic(code(indica::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(indica::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Converts a figment failure into diagnostics, one per underlying error.
///
/// `toml_sources` pairs each loaded file name with its contents so unknown
/// keys can be located.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let section = error.path.join(".");
            match &error.kind {
                Kind::UnknownField(key, expected) => {
                    let (span, src) = locate_key(toml_sources, &error.path, key);
                    ConfigError::UnknownKey {
                        key: key.clone(),
                        section: if section.is_empty() { "root".into() } else { section },
                        suggestion: suggest_key(key, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::InvalidType(actual, expected) => ConfigError::BadValue {
                    key: section,
                    detail: format!("found {actual}, expected {expected}"),
                },
                Kind::InvalidValue(actual, expected) => ConfigError::BadValue {
                    key: section,
                    detail: format!("{actual} is out of range, expected {expected}"),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Finds the first loaded file that defines `key` inside the `path` section.
fn locate_key(
    toml_sources: &[(String, String)],
    path: &[String],
    key: &str,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    toml_sources
        .iter()
        .find_map(|(name, content)| {
            find_key_offset(content, path, key).map(|offset| {
                (
                    Some(SourceSpan::new(offset.into(), key.len())),
                    Some(NamedSource::new(name, content.clone())),
                )
            })
        })
        .unwrap_or((None, None))
}

/// Byte offset of `field = ...` within the `[path]` table of `content`.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = if path.is_empty() {
        0
    } else {
        let header = format!("[{}]", path.join("."));
        content.find(&header)? + header.len()
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            return None;
        }
        let assigns_field = trimmed
            .strip_prefix(field)
            .is_some_and(|rest| rest.trim_start().starts_with('='));
        if assigns_field {
            return Some(offset + line.len() - trimmed.len());
        }
        offset += line.len();
    }
    None
}

/// Closest valid key by Jaro-Winkler similarity, if any is close enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Writes each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
