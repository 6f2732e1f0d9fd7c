//! # Topic Classifier
//!
//! Turns message text into a list of topics and a count of dictionary
//! (profane) words. The text is cleaned first: characters outside the Basic
//! Multilingual Plane (emoji), line breaks, single quotes, URLs and
//! `@mentions` are removed. The cleaned text is lowercased and split on
//! whitespace and ASCII punctuation; every remaining word that is neither a
//! noise word nor purely numeric becomes a topic, once. Word pairs from the
//! cleaned text are appended as further topics.

use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

static ASTRAL: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[\x{10000}-\x{10FFFF}]").expect("static pattern compiles"));
static URL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)(?:https?://|www\.)[^\s]+").expect("static pattern compiles")
});
static MENTION: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"@[A-Za-z0-9_-]*").expect("static pattern compiles"));

/// Characters words are split on, besides whitespace.
const DELIMITERS: &[char] = &[
  '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', ':', ';', '<', '=',
  '>', '?', '@', '[', ']', '^', '_', '`', '{', '|', '}', '~',
];

/// Result of classifying one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
  /// Distinct topics in order of first appearance, words before word pairs.
  pub topics: Vec<String>,
  /// Number of dictionary words, counting repeats.
  pub swear_word_count: usize,
}

impl Classification {
  /// Whether any dictionary word was found.
  pub fn is_vulgar(&self) -> bool {
    self.swear_word_count > 0
  }
}

/// Word-list based classifier.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
  dictionary: HashSet<String>,
  noise_words: HashSet<String>,
}

impl Classifier {
  /// Creates a classifier from a dictionary and a noise-word list.
  pub fn new<D, N>(dictionary: D, noise_words: N) -> Self
  where
    D: IntoIterator,
    D::Item: AsRef<str>,
    N: IntoIterator,
    N::Item: AsRef<str>,
  {
    let normalize = |w: &str| w.trim().to_lowercase();
    Self {
      dictionary: dictionary
        .into_iter()
        .map(|w| normalize(w.as_ref()))
        .filter(|w| !w.is_empty())
        .collect(),
      noise_words: noise_words
        .into_iter()
        .map(|w| normalize(w.as_ref()))
        .filter(|w| !w.is_empty())
        .collect(),
    }
  }

  /// Loads both word lists from files with one word per line.
  pub fn from_files(
    dictionary: impl AsRef<Path>,
    noise_words: impl AsRef<Path>,
  ) -> Result<Self, ConfigError> {
    let read = |path: &Path| {
      std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
      })
    };
    let dictionary = read(dictionary.as_ref())?;
    let noise_words = read(noise_words.as_ref())?;
    Ok(Self::new(dictionary.lines(), noise_words.lines()))
  }

  /// Removes emoji, line breaks, quotes, URLs and mentions.
  pub fn clean(text: &str) -> String {
    let text = ASTRAL.replace_all(text, " ");
    let text = text.replace("\r\n", " ").replace('\n', " ");
    let text = text.replace('\'', "");
    let text = URL.replace_all(&text, " ");
    MENTION.replace_all(&text, " ").into_owned()
  }

  /// Classifies `text`.
  pub fn classify(&self, text: &str) -> Classification {
    let body = Self::clean(text);
    let lowered = body.to_lowercase();

    let mut result = Classification::default();
    let mut seen = HashSet::new();
    for word in lowered.split(|c: char| c.is_whitespace() || DELIMITERS.contains(&c)) {
      let word = word.trim();
      if word.is_empty()
        || self.noise_words.contains(word)
        || word.chars().all(|c| c.is_ascii_digit())
      {
        continue;
      }
      if self.dictionary.contains(word) {
        result.swear_word_count += 1;
      }
      if seen.insert(word.to_string()) {
        result.topics.push(word.to_string());
      }
    }

    let words: Vec<&str> = body.split_whitespace().collect();
    for pair in words.windows(2) {
      let topic = format!("{} {}", pair[0], pair[1]).to_lowercase();
      if seen.insert(topic.clone()) {
        result.topics.push(topic);
      }
    }
    result
  }
}
