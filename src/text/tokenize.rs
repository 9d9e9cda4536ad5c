//! Mixed-script segmentation

use jieba_rs::Jieba;
use lindera::dictionary::load_dictionary;
use lindera::mode::Mode;
use lindera::segmenter::Segmenter;
use lindera::tokenizer::Tokenizer as IpadicTokenizer;
use std::collections::HashSet;
use std::ops::Range;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: &str = include_str!("../../data/stopwords.txt");

/// Segments text into word tokens.
///
/// CJK runs that contain kana are Japanese and go through the IPADIC
/// segmenter. Everything else goes through the jieba dictionary (HMM enabled
/// for unknown words), where Latin letters and digits come out as whole
/// alphanumeric runs. Whitespace and punctuation-only segments are dropped.
pub struct Tokenizer {
    jieba: Jieba,
    japanese: Option<IpadicTokenizer>,
    stop_words: Option<HashSet<String>>,
}

impl Tokenizer {
    pub fn new(filter_stop_words: bool) -> Self {
        let stop_words = filter_stop_words.then(|| {
            STOP_WORDS
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect()
        });

        let japanese = match load_dictionary("embedded://ipadic") {
            Ok(dictionary) => Some(IpadicTokenizer::new(Segmenter::new(
                Mode::Normal,
                dictionary,
                None,
            ))),
            Err(e) => {
                warn!("IPADIC unavailable, Japanese falls back to jieba: {}", e);
                None
            }
        };

        Self {
            jieba: Jieba::new(),
            japanese,
            stop_words,
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut tokens = Vec::new();
        for (is_japanese, run) in script_runs(text) {
            if is_japanese {
                self.cut_japanese(run, &mut tokens);
            } else {
                self.cut_jieba(run, &mut tokens);
            }
        }
        tokens
    }

    fn cut_japanese(&self, run: &str, out: &mut Vec<String>) {
        let Some(segmenter) = &self.japanese else {
            return self.cut_jieba(run, out);
        };

        match segmenter.tokenize(run) {
            Ok(tokens) => {
                for token in &tokens {
                    self.push(&token.surface, out);
                }
            }
            Err(e) => {
                warn!("IPADIC segmentation failed, using jieba: {}", e);
                self.cut_jieba(run, out);
            }
        }
    }

    fn cut_jieba(&self, run: &str, out: &mut Vec<String>) {
        for token in self.jieba.cut(run, true) {
            self.push(token, out);
        }
    }

    fn push(&self, token: &str, out: &mut Vec<String>) {
        let token = token.trim();
        if token.unicode_words().next().is_some() && !self.is_stop_word(token) {
            out.push(token.to_string());
        }
    }

    fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words
            .as_ref()
            .map_or(false, |words| words.contains(token))
    }
}

fn is_kana(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{30ff}' | '\u{31f0}'..='\u{31ff}' | '\u{ff66}'..='\u{ff9f}')
}

fn is_cjk(c: char) -> bool {
    is_kana(c)
        || matches!(
            c,
            '\u{3005}' | '\u{3400}'..='\u{4dbf}' | '\u{4e00}'..='\u{9fff}' | '\u{f900}'..='\u{faff}'
        )
}

/// Split `text` into pieces, flagging CJK runs that contain kana.
///
/// Adjacent non-Japanese runs are merged so jieba sees them whole.
fn script_runs(text: &str) -> Vec<(bool, &str)> {
    let mut runs: Vec<(bool, Range<usize>)> = Vec::new();
    let mut start = 0;
    let mut in_cjk = false;
    let mut has_kana = false;

    for (idx, c) in text.char_indices() {
        let cjk = is_cjk(c);
        if idx > start && cjk != in_cjk {
            push_run(&mut runs, in_cjk && has_kana, start..idx);
            start = idx;
            has_kana = false;
        }
        in_cjk = cjk;
        has_kana |= is_kana(c);
    }
    if start < text.len() {
        push_run(&mut runs, in_cjk && has_kana, start..text.len());
    }

    runs.into_iter()
        .map(|(japanese, range)| (japanese, &text[range]))
        .collect()
}

fn push_run(runs: &mut Vec<(bool, Range<usize>)>, japanese: bool, range: Range<usize>) {
    match runs.last_mut() {
        Some((false, last)) if !japanese => last.end = range.end,
        _ => runs.push((japanese, range)),
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field(
                "stop_words",
                &self.stop_words.as_ref().map(|w| w.len()).unwrap_or(0),
            )
            .finish()
    }
}
