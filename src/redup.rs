// WHY: Reduplication disambiguator - the general recognizer is tuned for recall, so groups that
// look reduplicated are re-checked against a narrow REDUP-only recognizer and kept or dropped whole

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::matcher::{Candidate, Shape};
use crate::recognizer::{LabelKind, Lookup, OutputLabel, Recognizer};

/// Counters from one disambiguation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedupStats {
    pub rows_in: usize,
    pub duplicates_removed: usize,
    pub groups: usize,
    pub ambiguous_groups: usize,
    pub confirmed_redup: usize,
    pub filtered_groups: usize,
    pub filtered_rows: usize,
    pub rows_out: usize,
}

pub struct RedupDisambiguator {
    recognizer: Arc<dyn Recognizer>,
}

impl RedupDisambiguator {
    /// `recognizer` must be compiled from the REDUP-only grammar
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self { recognizer }
    }

    /// Does the narrow recognizer accept `lemma` as reduplicated in `sentence`?
    fn confirms(&self, sentence: &str, lemma: &str) -> bool {
        match self.recognizer.lookup(sentence) {
            Ok(Lookup::Analyses(labels)) => labels.iter().any(|raw| {
                raw.parse::<OutputLabel>()
                    .map(|label| {
                        let redup_split = LabelKind::Split { reduplicated: true };
                        label.lemma == lemma && label.kind == redup_split
                    })
                    .unwrap_or(false)
            }),
            Ok(Lookup::NoAnalysis) | Ok(Lookup::Unknown) => false,
            Err(e) => {
                warn!("Reduplication lookup failed for lemma {}: {}", lemma, e);
                false
            }
        }
    }

    /// Resolve ambiguous (sentence, lemma) groups.
    /// Output order follows first appearance of each group.
    pub fn disambiguate(&self, candidates: Vec<Candidate>) -> (Vec<Candidate>, RedupStats) {
        let mut stats = RedupStats { rows_in: candidates.len(), ..RedupStats::default() };

        let mut seen = HashSet::new();
        let mut order: Vec<(String, String)> = Vec::new();
        let mut groups: BTreeMap<(String, String), Vec<Candidate>> = BTreeMap::new();

        for candidate in candidates {
            let identity = (
                candidate.sentence_id.clone(),
                candidate.lemma.clone(),
                candidate.shape,
                candidate.is_reduplicated,
            );
            if !seen.insert(identity) {
                stats.duplicates_removed += 1;
                continue;
            }
            let key = (candidate.sentence_id.clone(), candidate.lemma.clone());
            let group = groups.entry(key.clone()).or_default();
            if group.is_empty() {
                order.push(key);
            }
            group.push(candidate);
        }
        stats.groups = groups.len();

        let mut output = Vec::new();
        for key in order {
            let Some(group) = groups.remove(&key) else {
                continue;
            };

            let has_whole = group.iter().any(|c| c.shape == Shape::Whole);
            let has_split = group.iter().any(|c| c.shape == Shape::Split);
            let flagged = group.iter().any(|c| c.is_reduplicated);

            if !((has_whole && has_split) || flagged) {
                output.extend(group);
                continue;
            }

            stats.ambiguous_groups += 1;
            let sentence = Arc::clone(&group[0].sentence);

            if self.confirms(&sentence, &key.1) {
                // WHY: prefer the recognizer's own REDUP-flagged row, else any SPLIT row
                let keep = group
                    .iter()
                    .position(|c| c.is_reduplicated)
                    .or_else(|| group.iter().position(|c| c.shape == Shape::Split))
                    .unwrap_or(0);
                let mut survivor = group[keep].clone();
                for other in &group {
                    for marker in &other.external_pp {
                        if !survivor.external_pp.contains(marker) {
                            survivor.external_pp.push(marker.clone());
                        }
                    }
                }
                survivor.shape = Shape::Redup;
                survivor.is_reduplicated = true;
                debug!("Confirmed reduplication for {} in sentence {}", key.1, key.0);
                stats.confirmed_redup += 1;
                output.push(survivor);
            } else {
                debug!("Dropping ambiguous group for {} in sentence {}", key.1, key.0);
                stats.filtered_groups += 1;
                stats.filtered_rows += group.len();
            }
        }

        stats.rows_out = output.len();
        info!(
            "Reduplication check: {} rows in, {} ambiguous groups, {} confirmed, {} filtered, \
             {} rows out",
            stats.rows_in,
            stats.ambiguous_groups,
            stats.confirmed_redup,
            stats.filtered_groups,
            stats.rows_out
        );
        (output, stats)
    }
}
