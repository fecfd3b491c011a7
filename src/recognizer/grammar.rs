// WHY: Engine-independent grammar description: a tagged union of per-entry fragments
// built from literals, closed vocabularies, and bounded spans

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::lexicon::LiheciType;

/// One element of a fragment's surface sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Literal characters
    Lit(String),
    /// Any one of several sequences
    Alt(Vec<Vec<Term>>),
    /// `body` repeated between `min` and `max` times
    Repeat { body: Vec<Term>, min: usize, max: usize },
    /// Between `min` and `max` legal insertion characters (anything but punctuation)
    Legal { min: usize, max: usize },
}

impl Term {
    pub fn lit(text: &str) -> Self {
        Self::Lit(text.to_string())
    }

    /// Alternation of literal words
    pub fn words(words: &[&str]) -> Self {
        Self::Alt(words.iter().map(|w| vec![Self::lit(w)]).collect())
    }

    pub fn optional(body: Vec<Term>) -> Self {
        Self::Repeat { body, min: 0, max: 1 }
    }
}

/// Surface shape encoded in an output label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LabelKind {
    Whole,
    Split { reduplicated: bool },
    /// External prepositional phrase with its normalized marker
    Ext(String),
}

/// Label emitted by the recognizer:
/// `lemma+Lemma+TypeTag+SHAPE[+REDUP]` or `lemma+Lemma+TypeTag+EXT+MARKER`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputLabel {
    pub lemma: String,
    pub liheci_type: LiheciType,
    pub kind: LabelKind,
}

impl fmt::Display for OutputLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+Lemma+{}+", self.lemma, self.liheci_type.tag())?;
        match &self.kind {
            LabelKind::Whole => f.write_str("WHOLE"),
            LabelKind::Split { reduplicated: false } => f.write_str("SPLIT"),
            LabelKind::Split { reduplicated: true } => f.write_str("SPLIT+REDUP"),
            LabelKind::Ext(marker) => write!(f, "EXT+{marker}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed output label {0:?}")]
pub struct LabelParseError(pub String);

impl FromStr for OutputLabel {
    type Err = LabelParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let err = || LabelParseError(raw.to_string());
        let parts: Vec<&str> = raw.trim().split('+').collect();

        if parts.len() < 4 || parts[1] != "Lemma" || parts[0].is_empty() {
            return Err(err());
        }
        let liheci_type = LiheciType::parse(parts[2]).ok_or_else(err)?;

        let kind = match &parts[3..] {
            ["WHOLE"] => LabelKind::Whole,
            ["SPLIT"] => LabelKind::Split { reduplicated: false },
            ["SPLIT", "REDUP"] => LabelKind::Split { reduplicated: true },
            ["EXT", marker] if !marker.is_empty() => LabelKind::Ext(marker.to_string()),
            _ => return Err(err()),
        };

        Ok(Self { lemma: parts[0].to_string(), liheci_type, kind })
    }
}

/// All surface patterns for one label of one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub label: OutputLabel,
    /// Position of the owning entry in the lexicon; batching groups by this
    pub entry_index: usize,
    /// Alternative core sequences spanning HEAD through TAIL. Empty means unmatchable.
    pub alternatives: Vec<Vec<Term>>,
    /// Core sequences subtracted from this fragment's language
    pub minus: Vec<Vec<Term>>,
}

impl Fragment {
    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }
}

/// Complete grammar handed to a pattern engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    pub fragments: Vec<Fragment>,
    /// Bound on the wildcard context before HEAD and after TAIL
    pub context_window: usize,
    /// Entries per compiled batch
    pub batch_size: usize,
    /// Characters excluded from legal insertion spans
    pub punctuation: Vec<char>,
}

impl Grammar {
    /// Distinct entries represented by at least one fragment
    pub fn entry_count(&self) -> usize {
        let mut indices: Vec<usize> = self.fragments.iter().map(|f| f.entry_index).collect();
        indices.dedup();
        indices.len()
    }
}
