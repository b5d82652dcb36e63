// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with fuzzy match suggestions.
//!
//! Every field in the config model carries a serde default, so the errors
//! figment can actually surface here are unknown keys (from
//! `deny_unknown_fields`) and wrongly typed values. Unknown keys get a
//! source span and a Jaro-Winkler "did you mean?" suggestion; anything else
//! falls through as plain text.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity score to suggest a correction.
/// 0.75 catches one-letter typos like `restart_ceeling` without matching
/// unrelated keys.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(tessera::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// The unrecognized key name.
        key: String,
        /// Nearest valid key, if any is close enough.
        suggestion: Option<String>,
        /// Comma-joined valid keys for the section.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid value for `{key}`: expected {expected}, found {found}")]
    #[diagnostic(
        code(tessera::config::bad_value),
        help("set `{key}` to {expected}")
    )]
    BadValue {
        /// Dotted path of the offending key, e.g. `lifecycle.restart_ceiling`.
        key: String,
        expected: String,
        found: String,
    },

    /// A semantic validation error for a well-formed value.
    #[error("validation error: {message}")]
    #[diagnostic(code(tessera::config::validation))]
    Validation { message: String },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(tessera::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a `figment::Error` into a list of `ConfigError` diagnostics.
///
/// A figment error may aggregate several failures; each is classified
/// independently, with unknown keys resolved to a span in the TOML source
/// they came from.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    let sources = SourceLookup {
        files: toml_sources,
    };
    err.into_iter().map(|e| classify(e, &sources)).collect()
}

fn classify(error: figment::Error, sources: &SourceLookup<'_>) -> ConfigError {
    use figment::error::Kind;

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let valid: Vec<&str> = expected.to_vec();
            let (span, src) = sources.locate(&error, field);
            ConfigError::UnknownKey {
                key: field.clone(),
                suggestion: suggest_key(field, &valid),
                valid_keys: valid.join(", "),
                span,
                src,
            }
        }
        Kind::InvalidType(found, expected) => ConfigError::BadValue {
            key: dotted_path(&error),
            expected: expected.to_string(),
            found: found.to_string(),
        },
        _ => ConfigError::Other(error.to_string()),
    }
}

fn dotted_path(error: &figment::Error) -> String {
    error
        .path
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Resolves error locations against the TOML files that were loaded.
struct SourceLookup<'a> {
    files: &'a [(String, String)],
}

impl SourceLookup<'_> {
    /// Span of `key` in the file the error's metadata points at, if the
    /// file was captured and the key can be found in its section.
    fn locate(
        &self,
        error: &figment::Error,
        key: &str,
    ) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
        let file = error
            .metadata
            .as_ref()
            .and_then(|m| m.source.as_ref())
            .and_then(|s| match s {
                figment::Source::File(path) => Some(path.display().to_string()),
                _ => None,
            });
        let Some(file) = file else {
            return (None, None);
        };
        let Some((name, content)) = self.files.iter().find(|(p, _)| *p == file) else {
            return (None, None);
        };

        let section = error.path.first().map(|s| s.to_string());
        match key_offset(content, section.as_deref(), key) {
            Some(offset) => (
                Some(SourceSpan::new(offset.into(), key.len())),
                Some(NamedSource::new(name, content.clone())),
            ),
            None => (None, None),
        }
    }
}

/// Byte offset of `key` within its TOML section.
///
/// Walks the content line by line, tracking the current `[section]` header;
/// the key only matches inside the requested section (or before any header
/// when `section` is `None`), so a same-named key in a later section is
/// never picked up.
fn key_offset(content: &str, section: Option<&str>, key: &str) -> Option<usize> {
    let mut offset = 0;
    let mut current: Option<&str> = None;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if let Some(header) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            current = Some(header);
        } else if current == section {
            let stripped = line.trim_start();
            if let Some(rest) = stripped.strip_prefix(key)
                && rest.trim_start().starts_with('=')
            {
                return Some(offset + (line.len() - stripped.len()));
            }
        }
        offset += line.len();
    }
    None
}

/// Suggest the nearest valid key by Jaro-Winkler similarity.
///
/// Returns `None` when nothing clears the similarity threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render a list of `ConfigError`s to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    let mut out = String::new();
    for error in errors {
        if handler.render_report(&mut out, error).is_err() {
            out.push_str(&format!("Error: {error}\n"));
        }
    }
    eprint!("{out}");
}
