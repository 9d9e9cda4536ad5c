//! Text analysis for the lexical index
//!
//! - `tokenize`: mixed CJK/Latin segmentation with optional stop-word filtering
//! - `normalize`: per-token Unicode and script folding
//!
//! [`TextAnalyzer`] combines both into the derived `seg_content` field.

mod normalize;
mod tokenize;

pub use normalize::{Normalizer, NormalizerOptions};
pub use tokenize::Tokenizer;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Text analysis settings (`[text]` in the config file)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOptions {
    #[serde(default)]
    pub jp2t: bool,

    #[serde(default)]
    pub t2s: bool,

    #[serde(default)]
    pub filter_stop_words: bool,
}

/// Tokenizer plus normalizer, shared by every write path
#[derive(Debug)]
pub struct TextAnalyzer {
    tokenizer: Tokenizer,
    normalizer: Normalizer,
}

impl TextAnalyzer {
    pub fn new(options: TextOptions) -> Result<Self> {
        let normalizer = Normalizer::new(NormalizerOptions {
            jp2t: options.jp2t,
            t2s: options.t2s,
        })?;

        Ok(Self {
            tokenizer: Tokenizer::new(options.filter_stop_words),
            normalizer,
        })
    }

    /// Raw tokens followed by their normalized forms, space-joined.
    ///
    /// Both forms are kept so lexical matching sees the original spelling
    /// as well as the folded one.
    pub fn seg_content(&self, text: &str) -> String {
        let raw = self.tokenizer.tokenize(text);
        let normalized: Vec<String> = raw.iter().map(|t| self.normalizer.normalize(t)).collect();

        raw.into_iter()
            .chain(normalized)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seg_content_keeps_raw_then_normalized() {
        let analyzer = TextAnalyzer::new(TextOptions::default()).unwrap();
        assert_eq!(
            analyzer.seg_content("The Quick fox"),
            "The Quick fox the quick fox"
        );
    }

    #[test]
    fn test_seg_content_empty() {
        let analyzer = TextAnalyzer::new(TextOptions::default()).unwrap();
        assert_eq!(analyzer.seg_content(""), "");
    }

    #[test]
    fn test_seg_content_folds_scripts() {
        let analyzer = TextAnalyzer::new(TextOptions {
            jp2t: true,
            t2s: true,
            filter_stop_words: false,
        })
        .unwrap();
        let seg = analyzer.seg_content("HELLO 檢索");
        assert!(seg.starts_with("HELLO "));
        assert!(seg.contains("hello"));
        assert!(seg.contains('檢'));
        assert!(seg.contains('检'));
    }

    #[test]
    fn test_seg_content_deterministic() {
        let analyzer = TextAnalyzer::new(TextOptions {
            jp2t: true,
            t2s: true,
            filter_stop_words: true,
        })
        .unwrap();
        let text = "日本国の検索エンジン and 繁體中文 search";
        let first = analyzer.seg_content(text);
        for _ in 0..5 {
            assert_eq!(analyzer.seg_content(text), first);
        }
    }
}
