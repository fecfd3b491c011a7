// WHY: Tokenizer/POS tagger collaborator behind a trait, plus the explicit sentence cache
// the validator threads through instead of a process-wide global

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::vocabulary::{is_punctuation, NUMERALS, PRONOUNS};

/// Parallel tokens and CTB-style POS tags for one sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSentence {
    pub tokens: Vec<String>,
    pub tags: Vec<String>,
}

impl TaggedSentence {
    pub fn new(tokens: Vec<String>, tags: Vec<String>) -> Result<Self, EngineError> {
        if tokens.len() != tags.len() {
            return Err(EngineError::Failed(format!(
                "tagger returned {} tokens but {} tags",
                tokens.len(),
                tags.len()
            )));
        }
        Ok(Self { tokens, tags })
    }

    /// Parse the `tok/TAG tok/TAG` line format
    pub fn parse_line(line: &str) -> Result<Self, EngineError> {
        let mut tokens = Vec::new();
        let mut tags = Vec::new();
        for pair in line.split_whitespace() {
            let (token, tag) = pair
                .rsplit_once('/')
                .filter(|(token, tag)| !token.is_empty() && !tag.is_empty())
                .ok_or_else(|| EngineError::Failed(format!("malformed tagged token {pair:?}")))?;
            tokens.push(token.to_string());
            tags.push(tag.to_string());
        }
        if tokens.is_empty() {
            return Err(EngineError::Failed("tagger returned an empty analysis".to_string()));
        }
        Ok(Self { tokens, tags })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// `tok/TAG` pairs joined by spaces
    pub fn render(&self) -> String {
        self.tokens
            .iter()
            .zip(&self.tags)
            .map(|(token, tag)| format!("{token}/{tag}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Deterministic tokenize-and-tag collaborator
pub trait Tagger {
    fn tag(&self, sentence: &str) -> Result<TaggedSentence, EngineError>;
}

/// Sentence text to tagged result; failures are not cached so a later call may retry
#[derive(Debug, Default)]
pub struct TagCache {
    entries: HashMap<String, TaggedSentence>,
    hits: usize,
    misses: usize,
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_tag(
        &mut self,
        tagger: &dyn Tagger,
        sentence: &str,
    ) -> Result<&TaggedSentence, EngineError> {
        if self.entries.contains_key(sentence) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let tagged = tagger.tag(sentence)?;
            self.entries.insert(sentence.to_string(), tagged);
        }
        self.entries
            .get(sentence)
            .ok_or_else(|| EngineError::Failed("tag cache lost an entry".to_string()))
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Forward maximum matching over a word/tag dictionary
#[derive(Debug, Clone)]
pub struct DictionaryTagger {
    words: HashMap<String, String>,
    max_word_chars: usize,
    fallback_tag: String,
}

impl Default for DictionaryTagger {
    /// Function words only; content words fall back to NN
    fn default() -> Self {
        let mut tagger =
            Self { words: HashMap::new(), max_word_chars: 1, fallback_tag: "NN".to_string() };

        let defaults: [(&str, &[&str]); 11] = [
            ("AS", &["了", "着", "过"]),
            ("DEG", &["的"]),
            ("DER", &["得"]),
            ("PN", PRONOUNS),
            ("CD", NUMERALS),
            (
                "M",
                &[
                    "个", "次", "回", "遍", "场", "顿", "声", "趟", "把", "根", "支", "首", "本",
                    "件", "杯",
                ],
            ),
            (
                "AD",
                &[
                    "不", "没", "很", "都", "也", "还", "又", "再", "就", "才", "别", "总是",
                    "已经", "好好",
                ],
            ),
            ("P", &["跟", "向", "对", "给", "为", "被", "在", "从"]),
            ("CC", &["和", "与", "或者"]),
            ("DT", &["这", "那"]),
            ("SP", &["吧", "吗", "呢", "啊"]),
        ];
        for (tag, words) in defaults {
            for word in words {
                tagger.insert(word, tag);
            }
        }
        tagger.insert("是", "VC");
        tagger.insert("有", "VE");
        tagger
    }
}

impl DictionaryTagger {
    pub fn insert(&mut self, word: &str, tag: &str) {
        self.max_word_chars = self.max_word_chars.max(word.chars().count());
        self.words.insert(word.to_string(), tag.to_string());
    }

    pub fn with_fallback_tag(mut self, tag: &str) -> Self {
        self.fallback_tag = tag.to_string();
        self
    }

    /// Merge `word<TAB>TAG` lines over the defaults. Malformed lines are skipped with a warning.
    pub fn from_tsv_str(content: &str) -> Self {
        let mut tagger = Self::default();
        let mut loaded = 0usize;

        for (line_idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('\t') {
                Some((word, tag)) if !word.trim().is_empty() && !tag.trim().is_empty() => {
                    tagger.insert(word.trim(), tag.trim());
                    loaded += 1;
                }
                _ => warn!("Skipping malformed dictionary line {}: {:?}", line_idx + 1, line),
            }
        }

        debug!("Dictionary tagger loaded {} entries", loaded);
        tagger
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read POS dictionary {}", path.display()))?;
        let tagger = Self::from_tsv_str(&content);
        info!("Loaded POS dictionary {} ({} words)", path.display(), tagger.words.len());
        Ok(tagger)
    }
}

impl Tagger for DictionaryTagger {
    fn tag(&self, sentence: &str) -> Result<TaggedSentence, EngineError> {
        let chars: Vec<char> = sentence.chars().filter(|c| !c.is_whitespace()).collect();
        let mut tokens = Vec::new();
        let mut tags = Vec::new();
        let mut pos = 0;

        while pos < chars.len() {
            let longest = (1..=self.max_word_chars.min(chars.len() - pos)).rev().find_map(|len| {
                let word: String = chars[pos..pos + len].iter().collect();
                self.words.get(&word).map(|tag| (word, tag.clone(), len))
            });

            let (token, tag, len) = match longest {
                Some(found) => found,
                None => {
                    let c = chars[pos];
                    let tag = if is_punctuation(c) {
                        "PU".to_string()
                    } else {
                        self.fallback_tag.clone()
                    };
                    (c.to_string(), tag, 1)
                }
            };
            tokens.push(token);
            tags.push(tag);
            pos += len;
        }

        TaggedSentence::new(tokens, tags)
    }
}

/// External tagger process: one sentence on stdin, one `tok/TAG` line on stdout
#[derive(Debug, Clone)]
pub struct CommandTagger {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTagger {
    pub fn new(program: &str, args: Vec<String>, timeout: Duration) -> Self {
        Self { program: program.to_string(), args, timeout }
    }

    /// Split a shell-style command line on whitespace (no quoting)
    pub fn from_command_line(command: &str, timeout: Duration) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next().context("Tagger command is empty")?;
        Ok(Self::new(program, parts.map(String::from).collect(), timeout))
    }
}

impl Tagger for CommandTagger {
    fn tag(&self, sentence: &str) -> Result<TaggedSentence, EngineError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Unavailable(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            writeln!(stdin, "{sentence}")
                .map_err(|e| EngineError::Failed(format!("write to tagger: {e}")))?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Failed("tagger stdout unavailable".to_string()))?;

        // WHY: a reader thread lets the caller enforce the timeout and kill a hung process
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let result = BufReader::new(stdout).read_line(&mut line).map(|_| line);
            let _ = tx.send(result);
        });

        let outcome = rx.recv_timeout(self.timeout);
        if outcome.is_err() {
            let _ = child.kill();
        }
        let _ = child.wait();

        match outcome {
            Ok(Ok(line)) => TaggedSentence::parse_line(line.trim()),
            Ok(Err(e)) => Err(EngineError::Failed(format!("read from tagger: {e}"))),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(EngineError::Timeout(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(EngineError::Failed("tagger reader exited".to_string()))
            }
        }
    }
}
