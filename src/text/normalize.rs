//! Token normalization
//!
//! Fixed pipeline: NFKC, optional Japanese shinjitai to traditional kanji,
//! optional traditional to simplified Chinese, then lowercase.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;
use zhconv::{zhconv, Variant};

const JP2T_TABLE: &str = include_str!("../../data/jp2t.txt");

/// Script folding switches, both off by default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerOptions {
    /// Fold Japanese new-form kanji into traditional forms
    #[serde(default)]
    pub jp2t: bool,

    /// Fold traditional Chinese into simplified Chinese
    #[serde(default)]
    pub t2s: bool,
}

/// Per-token normalizer. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Normalizer {
    jp2t: Option<HashMap<char, char>>,
    t2s: bool,
}

impl Normalizer {
    /// Build a normalizer, loading the conversion tables the options ask for
    pub fn new(options: NormalizerOptions) -> Result<Self> {
        let jp2t = if options.jp2t {
            Some(parse_char_table(JP2T_TABLE)?)
        } else {
            None
        };

        Ok(Self {
            jp2t,
            t2s: options.t2s,
        })
    }

    pub fn normalize(&self, token: &str) -> String {
        let mut out: String = token.nfkc().collect();

        if let Some(table) = &self.jp2t {
            out = out
                .chars()
                .map(|c| table.get(&c).copied().unwrap_or(c))
                .collect();
        }

        if self.t2s {
            out = zhconv(&out, Variant::ZhHans);
        }

        out.to_lowercase()
    }
}

/// Parse a `<from> <to>` single-character mapping table
fn parse_char_table(source: &str) -> Result<HashMap<char, char>> {
    let mut table = HashMap::new();

    for (lineno, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let (from, to) = match fields.as_slice() {
            [from, to] => (single_char(from), single_char(to)),
            _ => (None, None),
        };

        match (from, to) {
            (Some(from), Some(to)) => {
                table.insert(from, to);
            }
            _ => {
                return Err(Error::Text(format!(
                    "malformed conversion table entry at line {}: {:?}",
                    lineno + 1,
                    line
                )))
            }
        }
    }

    Ok(table)
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
