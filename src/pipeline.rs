// WHY: Stage orchestration; each stage hands a fully materialized table to the next so any
// stage can be re-run in isolation on the previous table

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::insertion::{InsertionClassifier, InsertionError, InsertionType};
use crate::lexicon::{Lexicon, LiheciType};
use crate::matcher::{Candidate, MatchStats, SentenceMatcher, Shape};
use crate::pos::{MatchPattern, PosRules, PosValidator};
use crate::recognizer::{GrammarOptions, PatternCompiler, PatternEngine};
use crate::redup::{RedupDisambiguator, RedupStats};
use crate::tagger::{TagCache, Tagger};

/// Input sentence with a caller-assigned identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub id: String,
    pub text: String,
}

impl Sentence {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// Final verdict for one candidate; never modified after construction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRecord {
    pub sentence_id: String,
    pub sentence: String,
    pub lemma: String,
    pub liheci_type: LiheciType,
    pub head: String,
    pub tail: String,
    pub shape: Shape,
    pub is_reduplicated: bool,
    pub external_pp: Vec<String>,
    pub insertion: String,
    pub insertion_tagged: String,
    pub insertion_type: InsertionType,
    pub error: Option<InsertionError>,
    pub confidence: f64,
    pub head_token_idx: Option<usize>,
    pub tail_token_idx: Option<usize>,
    pub head_pos: Option<String>,
    pub tail_pos: Option<String>,
    pub pos_pattern: Option<MatchPattern>,
    pub tokens_pos: String,
    pub accepted: bool,
    pub reason: String,
}

/// Counters from the insertion and POS stages
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationStats {
    pub rows_in: usize,
    pub insertion_types: BTreeMap<String, usize>,
    pub insertion_errors: BTreeMap<String, usize>,
    pub dropped_low_confidence: usize,
    pub pos_checked: usize,
    pub pos_overridden: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Rejection reasons keyed by their prefix before ':'
    pub rejection_reasons: BTreeMap<String, usize>,
    pub tag_cache_hits: usize,
    pub tag_cache_misses: usize,
}

/// Per-stage statistics for a full run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub sentences: usize,
    pub raw_candidates: usize,
    pub matching: MatchStats,
    pub reduplication: RedupStats,
    pub validation: ValidationStats,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub records: Vec<ValidationRecord>,
    pub stats: PipelineStats,
}

impl PipelineOutput {
    pub fn accepted(&self) -> impl Iterator<Item = &ValidationRecord> {
        self.records.iter().filter(|r| r.accepted)
    }
}

pub struct Pipeline {
    lexicon: Lexicon,
    matcher: SentenceMatcher,
    redup: RedupDisambiguator,
    classifier: InsertionClassifier,
    validator: PosValidator,
    tagger: Box<dyn Tagger>,
    cache: TagCache,
    drop_threshold: f64,
}

impl Pipeline {
    /// Compile both recognizers and wire the stages.
    /// Compilation failure aborts before any sentence is read.
    pub fn build(
        lexicon: Lexicon,
        engine: &dyn PatternEngine,
        tagger: Box<dyn Tagger>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let compiler = PatternCompiler::new(GrammarOptions::from(config));

        let general = engine
            .compile(&compiler.compile(&lexicon))
            .context("Failed to compile the general recognizer")?;
        let redup_only = engine
            .compile(&compiler.compile_redup_only(&lexicon))
            .context("Failed to compile the reduplication recognizer")?;

        info!(
            "Pipeline ready: {} lexicon entries, {} general patterns, {} reduplication patterns",
            lexicon.len(),
            general.pattern_count(),
            redup_only.pattern_count()
        );

        Ok(Self {
            lexicon,
            matcher: SentenceMatcher::new(general),
            redup: RedupDisambiguator::new(redup_only),
            classifier: InsertionClassifier::from_config(config),
            validator: PosValidator::new(PosRules::default(), config.pos_override_threshold),
            tagger,
            cache: TagCache::new(),
            drop_threshold: config.drop_threshold,
        })
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn match_stats(&self) -> &MatchStats {
        self.matcher.stats()
    }

    /// Stage 1: raw candidates for every sentence
    pub fn match_sentences(
        &mut self,
        sentences: &[Sentence],
        progress: Option<&ProgressBar>,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for sentence in sentences {
            let text: Arc<str> = Arc::from(sentence.text.as_str());
            let found = self.matcher.match_sentence(&text);
            if !found.is_empty() {
                let analyses = found.analyses.len();
                debug!(sentence_id = %sentence.id, analyses, "Sentence matched");
            }
            candidates.extend(found.into_candidates(&sentence.id, &text));
            if let Some(pb) = progress {
                pb.inc(1);
            }
        }

        info!("Matched {} sentences: {} raw candidates", sentences.len(), candidates.len());
        let beyond = self.matcher.stats().sentences_beyond_window;
        if beyond > 0 {
            warn!(
                "{} sentences exceed the context window; raise context_window to scan them fully",
                beyond
            );
        }
        candidates
    }

    /// Stage 2: resolve reduplication ambiguity
    pub fn disambiguate(&self, candidates: Vec<Candidate>) -> (Vec<Candidate>, RedupStats) {
        self.redup.disambiguate(candidates)
    }

    /// Stages 3 and 4: insertion classification, confidence filter, POS validation
    pub fn validate(
        &mut self,
        candidates: Vec<Candidate>,
    ) -> (Vec<ValidationRecord>, ValidationStats) {
        let mut stats = ValidationStats { rows_in: candidates.len(), ..ValidationStats::default() };
        let mut records = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let Some(entry) = self.lexicon.get(&candidate.lemma) else {
                warn!("Candidate lemma {} is not in the lexicon, skipping", candidate.lemma);
                continue;
            };

            let analysis = self.classifier.classify(entry, candidate.shape, &candidate.sentence);
            *stats.insertion_types.entry(analysis.insertion_type.to_string()).or_default() += 1;
            if let Some(error) = analysis.error {
                *stats.insertion_errors.entry(error.to_string()).or_default() += 1;
            }

            let mut record = ValidationRecord {
                sentence_id: candidate.sentence_id.clone(),
                sentence: candidate.sentence.to_string(),
                lemma: candidate.lemma.clone(),
                liheci_type: candidate.liheci_type,
                head: entry.head.clone(),
                tail: entry.tail.clone(),
                shape: candidate.shape,
                is_reduplicated: candidate.is_reduplicated,
                external_pp: candidate.external_pp.clone(),
                insertion: analysis.span.text.clone(),
                insertion_tagged: analysis.span.render_tagged(),
                insertion_type: analysis.insertion_type,
                error: analysis.error,
                confidence: analysis.confidence,
                head_token_idx: None,
                tail_token_idx: None,
                head_pos: None,
                tail_pos: None,
                pos_pattern: None,
                tokens_pos: String::new(),
                accepted: false,
                reason: String::new(),
            };

            if analysis.confidence < self.drop_threshold {
                stats.dropped_low_confidence += 1;
                record.reason = match analysis.error {
                    Some(error) => format!("insertion_error:{error}"),
                    None => format!("below_confidence_threshold:{:.2}", analysis.confidence),
                };
            } else {
                stats.pos_checked += 1;
                let check = self.validator.validate(
                    &mut self.cache,
                    self.tagger.as_ref(),
                    entry,
                    candidate.shape,
                    &candidate.sentence,
                    analysis.confidence,
                );
                if check.overridden {
                    stats.pos_overridden += 1;
                }
                record.head_token_idx = check.head.as_ref().map(|h| h.index);
                record.tail_token_idx = check.tail.as_ref().map(|t| t.index);
                record.head_pos = check.head.map(|h| h.pos);
                record.tail_pos = check.tail.map(|t| t.pos);
                record.pos_pattern = check.pattern;
                record.tokens_pos = check.tokens_pos;
                record.accepted = check.passed;
                record.reason = check.reason;
            }

            if record.accepted {
                stats.accepted += 1;
            } else {
                stats.rejected += 1;
                let prefix = record.reason.split(':').next().unwrap_or_default().to_string();
                *stats.rejection_reasons.entry(prefix).or_default() += 1;
            }
            records.push(record);
        }

        stats.tag_cache_hits = self.cache.hits();
        stats.tag_cache_misses = self.cache.misses();
        info!(
            "Validation: {} rows, {} accepted, {} rejected ({} below confidence, {} POS overrides)",
            stats.rows_in,
            stats.accepted,
            stats.rejected,
            stats.dropped_low_confidence,
            stats.pos_overridden
        );
        for (reason, count) in &stats.rejection_reasons {
            info!("  rejected {}: {}", reason, count);
        }

        (records, stats)
    }

    /// All stages over a batch of sentences
    pub fn run(
        &mut self,
        sentences: &[Sentence],
        progress: Option<&ProgressBar>,
    ) -> PipelineOutput {
        let candidates = self.match_sentences(sentences, progress);
        let raw_candidates = candidates.len();
        let (candidates, reduplication) = self.disambiguate(candidates);
        let (records, validation) = self.validate(candidates);

        PipelineOutput {
            records,
            stats: PipelineStats {
                sentences: sentences.len(),
                raw_candidates,
                matching: self.matcher.stats().clone(),
                reduplication,
                validation,
            },
        }
    }
}
