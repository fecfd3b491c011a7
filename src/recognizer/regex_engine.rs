// WHY: Multi-pattern regex-automata backend; each batch is one meta regex searched with
// overlapping semantics so every matching label is reported in a single pass

use regex_automata::{meta::Regex, Input, MatchKind, PatternID, PatternSet};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::grammar::{Fragment, Grammar, Term};
use super::{Lookup, PatternEngine, Recognizer};
use crate::error::EngineError;

/// Escape characters that carry meaning in regex syntax
fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
                | '#' | '&' | '-' | '~'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Renders grammar terms to regex syntax for one grammar
struct Renderer {
    legal_class: String,
}

impl Renderer {
    fn new(punctuation: &[char]) -> Self {
        let mut legal_class = String::from("[^");
        for c in punctuation {
            escape_into(&mut legal_class, &c.to_string());
        }
        legal_class.push(']');
        Self { legal_class }
    }

    fn sequence(&self, out: &mut String, terms: &[Term]) {
        for term in terms {
            self.term(out, term);
        }
    }

    fn term(&self, out: &mut String, term: &Term) {
        match term {
            Term::Lit(text) => escape_into(out, text),
            Term::Alt(options) => self.alternation(out, options),
            Term::Repeat { body, min, max } => {
                out.push_str("(?:");
                self.sequence(out, body);
                out.push_str(&format!("){{{min},{max}}}"));
            }
            Term::Legal { min, max } => {
                out.push_str(&self.legal_class);
                out.push_str(&format!("{{{min},{max}}}"));
            }
        }
    }

    fn alternation(&self, out: &mut String, options: &[Vec<Term>]) {
        if options.is_empty() {
            // matches nothing
            out.push_str(r"[^\s\S]");
            return;
        }
        out.push_str("(?:");
        for (i, option) in options.iter().enumerate() {
            if i > 0 {
                out.push('|');
            }
            self.sequence(out, option);
        }
        out.push(')');
    }

    /// Whole-sentence pattern: bounded context, one of the cores, bounded context
    fn anchored(&self, cores: &[Vec<Term>], context: usize) -> String {
        let mut out = format!(r"\A(?s:.){{0,{context}}}");
        self.alternation(&mut out, cores);
        out.push_str(&format!(r"(?s:.){{0,{context}}}\z"));
        out
    }
}

/// One label and the compiled patterns that decide it
#[derive(Debug)]
struct BatchOutput {
    label: String,
    accept: PatternID,
    reject: Option<PatternID>,
}

#[derive(Debug)]
struct Batch {
    regex: Regex,
    outputs: Vec<BatchOutput>,
}

/// Recognizer made of independently compiled batches whose results are unioned
#[derive(Debug)]
pub struct CompiledRecognizer {
    batches: Vec<Batch>,
    pattern_count: usize,
    context_window: usize,
}

impl Recognizer for CompiledRecognizer {
    fn lookup(&self, sentence: &str) -> Result<Lookup, EngineError> {
        let input = Input::new(sentence);
        let mut labels = Vec::new();

        for batch in &self.batches {
            let mut matched = PatternSet::new(batch.regex.pattern_len());
            batch.regex.which_overlapping_matches(&input, &mut matched);
            if matched.is_empty() {
                continue;
            }

            for output in &batch.outputs {
                let rejected = output.reject.is_some_and(|pid| matched.contains(pid));
                if matched.contains(output.accept) && !rejected {
                    labels.push(output.label.clone());
                }
            }
        }

        if labels.is_empty() {
            Ok(Lookup::NoAnalysis)
        } else {
            Ok(Lookup::Analyses(labels))
        }
    }

    fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    // HEAD and TAIL take at least one character each, so an occurrence anywhere in a
    // sentence this short leaves at most `context_window` characters on either side
    fn covered_chars(&self) -> Option<usize> {
        Some(self.context_window + 2)
    }
}

/// Interns rendered patterns so shared cores compile once
/// (a REDUP core reused as a WHOLE exclusion)
#[derive(Default)]
struct PatternTable {
    patterns: Vec<String>,
    index: HashMap<String, PatternID>,
}

impl PatternTable {
    fn intern(&mut self, pattern: String) -> Result<PatternID, EngineError> {
        if let Some(&pid) = self.index.get(&pattern) {
            return Ok(pid);
        }
        let pid = PatternID::new(self.patterns.len())
            .map_err(|e| EngineError::Failed(format!("too many patterns in batch: {e}")))?;
        self.index.insert(pattern.clone(), pid);
        self.patterns.push(pattern);
        Ok(pid)
    }
}

/// Pattern engine backed by regex-automata meta regexes
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexEngine;

impl RegexEngine {
    fn compile_batch(
        &self,
        renderer: &Renderer,
        fragments: &[&Fragment],
        context: usize,
    ) -> Result<Option<Batch>, EngineError> {
        let mut table = PatternTable::default();
        let mut outputs = Vec::new();

        for fragment in fragments {
            if fragment.is_empty() {
                continue;
            }
            let accept = table.intern(renderer.anchored(&fragment.alternatives, context))?;
            let reject = if fragment.minus.is_empty() {
                None
            } else {
                Some(table.intern(renderer.anchored(&fragment.minus, context))?)
            };
            outputs.push(BatchOutput { label: fragment.label.to_string(), accept, reject });
        }

        if outputs.is_empty() {
            return Ok(None);
        }

        let regex = Regex::builder()
            .configure(Regex::config().match_kind(MatchKind::All).nfa_size_limit(None))
            .build_many(&table.patterns)
            .map_err(|e| EngineError::Failed(format!("failed to compile recognizer batch: {e}")))?;

        Ok(Some(Batch { regex, outputs }))
    }
}

impl PatternEngine for RegexEngine {
    fn compile(&self, grammar: &Grammar) -> Result<Arc<dyn Recognizer>, EngineError> {
        let renderer = Renderer::new(&grammar.punctuation);
        let batch_size = grammar.batch_size.max(1);

        // WHY: fragments arrive grouped by entry; batches are cut on entry boundaries
        let mut groups: Vec<Vec<&Fragment>> = Vec::new();
        let mut entries_in_group = 0usize;
        let mut last_entry = None;
        for fragment in &grammar.fragments {
            if last_entry != Some(fragment.entry_index) {
                if groups.is_empty() || entries_in_group == batch_size {
                    groups.push(Vec::new());
                    entries_in_group = 0;
                }
                entries_in_group += 1;
                last_entry = Some(fragment.entry_index);
            }
            if let Some(group) = groups.last_mut() {
                group.push(fragment);
            }
        }

        let mut batches = Vec::with_capacity(groups.len());
        for (i, group) in groups.iter().enumerate() {
            if let Some(batch) = self.compile_batch(&renderer, group, grammar.context_window)? {
                debug!(
                    "Compiled batch {}: {} patterns, {} labels",
                    i,
                    batch.regex.pattern_len(),
                    batch.outputs.len()
                );
                batches.push(batch);
            }
        }

        let pattern_count = batches.iter().map(|b| b.regex.pattern_len()).sum();
        info!("Recognizer ready: {} batches, {} patterns", batches.len(), pattern_count);

        Ok(Arc::new(CompiledRecognizer {
            batches,
            pattern_count,
            context_window: grammar.context_window,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::{Lexicon, LexiconEntry, LiheciType, PronounRule, RedupPattern};
    use crate::recognizer::{GrammarOptions, PatternCompiler};

    fn recognizer(lexicon: &Lexicon, options: GrammarOptions) -> Arc<dyn Recognizer> {
        let grammar = PatternCompiler::new(options).compile(lexicon);
        RegexEngine.compile(&grammar).unwrap()
    }

    fn labels(recognizer: &Arc<dyn Recognizer>, sentence: &str) -> Vec<String> {
        match recognizer.lookup(sentence).unwrap() {
            Lookup::Analyses(mut labels) => {
                labels.sort();
                labels
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_escape_meta_characters() {
        let mut out = String::new();
        escape_into(&mut out, "a.b(c)");
        assert_eq!(out, r"a\.b\(c\)");
    }

    #[test]
    fn test_whole_and_split_labels() {
        let lexicon = Lexicon::from_entries([
            LexiconEntry::new("吃醋", "吃", "醋", LiheciType::VerbObject)
                .with_pronoun_rule(PronounRule::PronObjOk),
        ]);
        let rec = recognizer(&lexicon, GrammarOptions::default());

        assert_eq!(labels(&rec, "她又吃醋了"), vec!["吃醋+Lemma+Verb-Object+WHOLE"]);
        assert_eq!(labels(&rec, "他吃了她的醋"), vec!["吃醋+Lemma+Verb-Object+SPLIT"]);
        assert!(labels(&rec, "今天天气很好").is_empty());
    }

    #[test]
    fn test_punctuation_blocks_insertion() {
        let lexicon =
            Lexicon::from_entries([LexiconEntry::new("吃醋", "吃", "醋", LiheciType::VerbObject)]);
        let rec = recognizer(&lexicon, GrammarOptions::default());
        assert!(labels(&rec, "我吃了，醋呢").is_empty());
    }

    #[test]
    fn test_redup_excludes_general_shapes() {
        let lexicon = Lexicon::from_entries([
            LexiconEntry::new("散步", "散", "步", LiheciType::VerbObject)
                .with_redup(RedupPattern::Aab),
        ]);
        let rec = recognizer(&lexicon, GrammarOptions::default());
        assert_eq!(labels(&rec, "我们去散散步吧"), vec!["散步+Lemma+Verb-Object+SPLIT+REDUP"]);
        assert_eq!(labels(&rec, "我们去散步吧"), vec!["散步+Lemma+Verb-Object+WHOLE"]);
    }

    #[test]
    fn test_context_window_is_bounded() {
        let lexicon =
            Lexicon::from_entries([LexiconEntry::new("吃醋", "吃", "醋", LiheciType::VerbObject)]);
        let options = GrammarOptions { context_window: 3, ..GrammarOptions::default() };
        let rec = recognizer(&lexicon, options);

        assert_eq!(labels(&rec, "她又吃醋了").len(), 1);
        assert!(labels(&rec, "她今天早上又吃醋了").is_empty());
    }

    #[test]
    fn test_batches_are_unioned() {
        let entries: Vec<LexiconEntry> = ["吃醋", "生气", "见面", "帮忙", "睡觉"]
            .iter()
            .map(|lemma| {
                let chars: Vec<char> = lemma.chars().collect();
                let (head, tail) = (chars[0].to_string(), chars[1].to_string());
                LexiconEntry::new(lemma, &head, &tail, LiheciType::VerbObject)
            })
            .collect();
        let lexicon = Lexicon::from_entries(entries);
        let options = GrammarOptions { batch_size: 2, ..GrammarOptions::default() };
        let rec = recognizer(&lexicon, options);

        assert_eq!(
            labels(&rec, "我们见面吃醋睡觉"),
            vec![
                "吃醋+Lemma+Verb-Object+WHOLE",
                "睡觉+Lemma+Verb-Object+WHOLE",
                "见面+Lemma+Verb-Object+WHOLE",
            ]
        );
    }

    #[test]
    fn test_empty_grammar_finds_nothing() {
        let rec = recognizer(&Lexicon::default(), GrammarOptions::default());
        assert_eq!(rec.lookup("他吃了她的醋").unwrap(), Lookup::NoAnalysis);
        assert_eq!(rec.pattern_count(), 0);
    }
}
