// WHY: Sentence matcher - one recognizer lookup per sentence, reduced to a set of raw analyses.
// Engine failures degrade to "no match" so one bad sentence never stops the corpus.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::lexicon::LiheciType;
use crate::recognizer::{LabelKind, Lookup, OutputLabel, Recognizer};

/// Surface shape of a candidate occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Shape {
    Whole,
    Split,
    Redup,
}

impl Shape {
    pub const ALL: [Shape; 3] = [Shape::Split, Shape::Whole, Shape::Redup];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whole => "WHOLE",
            Self::Split => "SPLIT",
            Self::Redup => "REDUP",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recognizer analysis; equal tuples collapse
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawAnalysis {
    pub lemma: String,
    pub liheci_type: LiheciType,
    /// WHOLE or SPLIT as reported by the recognizer
    pub shape: Shape,
    pub is_reduplicated: bool,
}

/// Matcher output for one sentence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentenceMatch {
    pub analyses: BTreeSet<RawAnalysis>,
    /// External PP markers per lemma
    pub external_pp: BTreeMap<String, Vec<String>>,
}

impl SentenceMatch {
    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    fn add_label(&mut self, label: OutputLabel) {
        let (shape, is_reduplicated) = match label.kind {
            LabelKind::Whole => (Shape::Whole, false),
            LabelKind::Split { reduplicated } => (Shape::Split, reduplicated),
            LabelKind::Ext(marker) => {
                let markers = self.external_pp.entry(label.lemma).or_default();
                if !markers.contains(&marker) {
                    markers.push(marker);
                }
                return;
            }
        };
        self.analyses.insert(RawAnalysis {
            lemma: label.lemma,
            liheci_type: label.liheci_type,
            shape,
            is_reduplicated,
        });
    }
}

/// One row of the candidate table handed between stages, keyed by (sentence id, lemma, shape)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub sentence_id: String,
    pub sentence: Arc<str>,
    pub lemma: String,
    pub liheci_type: LiheciType,
    pub shape: Shape,
    pub is_reduplicated: bool,
    pub external_pp: Vec<String>,
}

impl Candidate {
    pub fn new(sentence_id: &str, sentence: Arc<str>, analysis: RawAnalysis) -> Self {
        Self {
            sentence_id: sentence_id.to_string(),
            sentence,
            lemma: analysis.lemma,
            liheci_type: analysis.liheci_type,
            shape: analysis.shape,
            is_reduplicated: analysis.is_reduplicated,
            external_pp: Vec::new(),
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.sentence_id, &self.lemma)
    }
}

impl SentenceMatch {
    /// Flatten into candidate rows, attaching EXT markers to every row of their lemma
    pub fn into_candidates(self, sentence_id: &str, sentence: &Arc<str>) -> Vec<Candidate> {
        let external_pp = self.external_pp;
        self.analyses
            .into_iter()
            .map(|analysis| {
                let mut candidate = Candidate::new(sentence_id, Arc::clone(sentence), analysis);
                if let Some(markers) = external_pp.get(&candidate.lemma) {
                    candidate.external_pp = markers.clone();
                }
                candidate
            })
            .collect()
    }
}

/// Counters across all matched sentences
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchStats {
    pub sentences: usize,
    pub sentences_with_analyses: usize,
    pub raw_labels: usize,
    pub duplicate_labels: usize,
    pub malformed_labels: usize,
    pub unknown_lookups: usize,
    pub engine_errors: usize,
    /// Sentences with no analyses that are too long for the recognizer to see in full
    pub sentences_beyond_window: usize,
}

/// Runs a compiled recognizer over sentences
pub struct SentenceMatcher {
    recognizer: Arc<dyn Recognizer>,
    stats: MatchStats,
}

impl SentenceMatcher {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self { recognizer, stats: MatchStats::default() }
    }

    pub fn stats(&self) -> &MatchStats {
        &self.stats
    }

    pub fn match_sentence(&mut self, sentence: &str) -> SentenceMatch {
        self.stats.sentences += 1;

        let labels = match self.recognizer.lookup(sentence) {
            Ok(Lookup::Analyses(labels)) => labels,
            Ok(Lookup::NoAnalysis) => {
                self.note_uncovered(sentence);
                return SentenceMatch::default();
            }
            Ok(Lookup::Unknown) => {
                debug!("Recognizer returned unknown for sentence {:?}", sentence);
                self.stats.unknown_lookups += 1;
                return SentenceMatch::default();
            }
            Err(e) => {
                warn!("Recognizer lookup failed, treating as no match: {}", e);
                self.stats.engine_errors += 1;
                return SentenceMatch::default();
            }
        };

        trace!(sentence, ?labels, "Raw recognizer output");
        let raw_count = labels.len();
        self.stats.raw_labels += raw_count;

        // WHY: dedupe on the raw string before parsing so identical labels from
        // different batches count once
        let unique: BTreeSet<String> = labels.into_iter().collect();
        self.stats.duplicate_labels += raw_count - unique.len();

        let mut result = SentenceMatch::default();
        for raw in unique {
            match raw.parse::<OutputLabel>() {
                Ok(label) => result.add_label(label),
                Err(e) => {
                    warn!("Ignoring recognizer output: {}", e);
                    self.stats.malformed_labels += 1;
                }
            }
        }

        if result.is_empty() {
            self.note_uncovered(sentence);
        } else {
            self.stats.sentences_with_analyses += 1;
        }
        result
    }

    fn note_uncovered(&mut self, sentence: &str) {
        let Some(covered) = self.recognizer.covered_chars() else {
            return;
        };
        let chars = sentence.chars().count();
        if chars > covered {
            warn!(
                "No analyses for a {}-character sentence; occurrences outside a {}-character \
                 span are not seen: {:?}",
                chars, covered, sentence
            );
            self.stats.sentences_beyond_window += 1;
        }
    }
}
