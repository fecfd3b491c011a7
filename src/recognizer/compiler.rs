// WHY: Lexicon entries become labelled fragments here; the engine never sees the lexicon

use tracing::{debug, info, warn};

use super::grammar::{Fragment, Grammar, LabelKind, OutputLabel, Term};
use crate::config::PipelineConfig;
use crate::lexicon::{Lexicon, LexiconEntry, RedupPattern};
use crate::vocabulary::{
    ASPECT_MARKERS, CLASSIFIERS, DEGREE_MARKERS, DEMONSTRATIVES, FIXED_DURATIONS,
    NEGATED_POTENTIAL, NUMERALS, POSSESSIVE_MARKER, PRONOUNS, PUNCTUATION, RESULT_COMPLEMENTS,
    TIME_UNITS,
};

/// Knobs that shape the compiled grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarOptions {
    pub context_window: usize,
    pub insertion_max: usize,
    pub batch_size: usize,
    pub hint_vocabulary: bool,
}

impl Default for GrammarOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for GrammarOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            context_window: config.context_window,
            insertion_max: config.insertion_max,
            batch_size: config.batch_size,
            hint_vocabulary: config.hint_vocabulary,
        }
    }
}

/// Head and tail after trimming; entries that fail this are never compiled
struct Morphemes<'a> {
    head: &'a str,
    tail: &'a str,
}

fn morphemes(entry: &LexiconEntry) -> Option<Morphemes<'_>> {
    let head = entry.head.trim();
    let tail = entry.tail.trim();
    if head.is_empty() || tail.is_empty() {
        warn!("Skipping lemma {:?}: empty head or tail after trimming", entry.lemma);
        return None;
    }
    Some(Morphemes { head, tail })
}

/// Builds recognizer grammars from a lexicon
#[derive(Debug, Clone, Default)]
pub struct PatternCompiler {
    options: GrammarOptions,
}

impl PatternCompiler {
    pub fn new(options: GrammarOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GrammarOptions {
        &self.options
    }

    /// Full grammar: WHOLE, SPLIT, REDUP and EXT fragments for every entry
    pub fn compile(&self, lexicon: &Lexicon) -> Grammar {
        let mut fragments = Vec::new();
        let mut skipped = 0usize;

        for (entry_index, entry) in lexicon.entries().iter().enumerate() {
            match morphemes(entry) {
                Some(m) => fragments.extend(self.entry_fragments(entry_index, entry, &m)),
                None => skipped += 1,
            }
        }

        let unmatchable = fragments.iter().filter(|f| f.is_empty()).count();
        info!(
            "Compiled grammar: {} fragments from {} entries ({} skipped, {} unmatchable fragments)",
            fragments.len(),
            lexicon.len() - skipped,
            skipped,
            unmatchable
        );

        self.grammar(fragments)
    }

    /// Narrow grammar with only the declared reduplication fragments
    pub fn compile_redup_only(&self, lexicon: &Lexicon) -> Grammar {
        let fragments: Vec<Fragment> = lexicon
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.has_redup())
            .filter_map(|(entry_index, entry)| {
                let m = morphemes(entry)?;
                Some(Fragment {
                    label: label(entry, LabelKind::Split { reduplicated: true }),
                    entry_index,
                    alternatives: redup_cores(entry, &m),
                    minus: Vec::new(),
                })
            })
            .collect();

        info!("Compiled reduplication grammar: {} fragments", fragments.len());
        self.grammar(fragments)
    }

    fn grammar(&self, fragments: Vec<Fragment>) -> Grammar {
        Grammar {
            fragments,
            context_window: self.options.context_window,
            batch_size: self.options.batch_size,
            punctuation: PUNCTUATION.to_vec(),
        }
    }

    fn entry_fragments(
        &self,
        entry_index: usize,
        entry: &LexiconEntry,
        m: &Morphemes<'_>,
    ) -> Vec<Fragment> {
        let whole = whole_cores(entry, m);
        let split = self.split_cores(entry, m);
        let redup = redup_cores(entry, m);

        let mut fragments = Vec::with_capacity(3 + entry.pp_requirement.len());

        if !redup.is_empty() {
            fragments.push(Fragment {
                label: label(entry, LabelKind::Split { reduplicated: true }),
                entry_index,
                alternatives: redup.clone(),
                minus: Vec::new(),
            });
        }

        // WHY: general shapes exclude the reduplicated surfaces so those are tagged only as REDUP
        fragments.push(Fragment {
            label: label(entry, LabelKind::Whole),
            entry_index,
            alternatives: whole.clone(),
            minus: redup.clone(),
        });

        if split.is_empty() {
            debug!("Lemma {} has no enabled SPLIT insertion shape", entry.lemma);
        }
        fragments.push(Fragment {
            label: label(entry, LabelKind::Split { reduplicated: false }),
            entry_index,
            alternatives: split.clone(),
            minus: redup,
        });

        for rule in &entry.pp_requirement {
            let mut spans = whole.clone();
            spans.extend(split.iter().cloned());
            let prepositions: Vec<&str> = rule.prepositions.iter().map(String::as_str).collect();

            fragments.push(Fragment {
                label: label(entry, LabelKind::Ext(rule.marker.clone())),
                entry_index,
                alternatives: vec![vec![
                    Term::words(&prepositions),
                    Term::Legal { min: 1, max: self.options.insertion_max },
                    Term::Alt(spans),
                ]],
                minus: Vec::new(),
            });
        }

        fragments
    }

    fn split_cores(&self, entry: &LexiconEntry, m: &Morphemes<'_>) -> Vec<Vec<Term>> {
        let n = self.options.insertion_max;
        let mut cores = Vec::new();

        if self.options.hint_vocabulary {
            cores.push(vec![
                Term::lit(m.head),
                Term::Legal { min: 0, max: n },
                hint_insertion(),
                Term::Legal { min: 0, max: n },
                Term::lit(m.tail),
            ]);
        }

        if let Some(rule) = entry.pronoun_rule {
            if rule.admits_bare_pronoun() {
                cores.push(vec![
                    Term::lit(m.head),
                    Term::words(PRONOUNS),
                    Term::Legal { min: 0, max: n },
                    Term::lit(m.tail),
                ]);
            }
            if rule.admits_possessive() {
                cores.push(vec![
                    Term::lit(m.head),
                    Term::words(PRONOUNS),
                    Term::lit(POSSESSIVE_MARKER),
                    Term::Legal { min: 0, max: n },
                    Term::lit(m.tail),
                ]);
            }
        }

        cores
    }
}

fn label(entry: &LexiconEntry, kind: LabelKind) -> OutputLabel {
    OutputLabel { lemma: entry.lemma.clone(), liheci_type: entry.liheci_type, kind }
}

fn whole_cores(entry: &LexiconEntry, m: &Morphemes<'_>) -> Vec<Vec<Term>> {
    let (h, t) = (m.head, m.tail);
    let mut cores = vec![vec![Term::Lit(format!("{h}{t}"))]];

    if entry.liheci_type.admits_generated_redup() {
        cores.push(vec![Term::Lit(format!("{h}{h}{t}"))]);
        cores.push(vec![Term::Lit(format!("{h}{h}{t}{t}"))]);
        cores.push(vec![Term::Lit(format!("{h}一{h}{t}"))]);
    }

    cores
}

fn redup_cores(entry: &LexiconEntry, m: &Morphemes<'_>) -> Vec<Vec<Term>> {
    let (h, t) = (m.head, m.tail);
    entry
        .redup_patterns
        .iter()
        .map(|pattern| match pattern {
            RedupPattern::Aab => vec![Term::Lit(format!("{h}{h}{t}"))],
            RedupPattern::AXab => vec![
                Term::lit(h),
                Term::words(&["一", "了"]),
                Term::lit(h),
                Term::lit(t),
            ],
        })
        .collect()
}

/// Open hint vocabulary of attested insertions
fn hint_insertion() -> Term {
    let numeral_run = Term::Repeat { body: vec![Term::words(NUMERALS)], min: 1, max: 4 };

    Term::Alt(vec![
        vec![Term::words(ASPECT_MARKERS)],
        vec![Term::lit(NEGATED_POTENTIAL)],
        vec![
            Term::Alt(vec![vec![numeral_run.clone()], vec![Term::words(DEMONSTRATIVES)]]),
            Term::words(CLASSIFIERS),
        ],
        vec![numeral_run, Term::words(TIME_UNITS)],
        vec![Term::words(FIXED_DURATIONS)],
        vec![Term::words(PRONOUNS), Term::lit(POSSESSIVE_MARKER)],
        vec![Term::words(RESULT_COMPLEMENTS)],
        vec![Term::words(DEGREE_MARKERS)],
        vec![Term::lit(POSSESSIVE_MARKER)],
    ])
}
