// WHY: Insertion classifier - turns the material between HEAD and TAIL into a category
// profile, an insertion type, a lemma-specific error, and a coverage confidence

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::lexicon::{LexiconEntry, PronounRule};
use crate::matcher::Shape;
use crate::vocabulary::{Category, InsertionVocabulary};

/// Single label summarizing an insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsertionType {
    AspectQuant,
    Aspect,
    Quantifier,
    Classifier,
    PronounDe,
    Pronoun,
    ModifierDe,
    Modifier,
    Resultative,
    Empty,
    Unknown,
    ExtPp,
    RedupSkip,
}

impl InsertionType {
    /// Selection order for category-driven types
    pub const DEFAULT_PRIORITY: [InsertionType; 9] = [
        InsertionType::AspectQuant,
        InsertionType::Aspect,
        InsertionType::Quantifier,
        InsertionType::Classifier,
        InsertionType::PronounDe,
        InsertionType::Pronoun,
        InsertionType::ModifierDe,
        InsertionType::Modifier,
        InsertionType::Resultative,
    ];

    /// Categories that must all be present for this type; empty for fallback types
    pub fn required_categories(&self) -> &'static [Category] {
        use Category::*;
        match self {
            Self::AspectQuant => &[Aspect, Numeral, Classifier],
            Self::Aspect => &[Aspect],
            Self::Quantifier => &[Numeral, Classifier],
            Self::Classifier => &[Classifier],
            Self::PronounDe => &[Pronoun, Possessive],
            Self::Pronoun => &[Pronoun],
            Self::ModifierDe => &[Modifier, Possessive],
            Self::Modifier => &[Modifier],
            Self::Resultative => &[Resultative],
            Self::Empty | Self::Unknown | Self::ExtPp | Self::RedupSkip => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AspectQuant => "ASPECT_QUANT",
            Self::Aspect => "ASPECT",
            Self::Quantifier => "QUANTIFIER",
            Self::Classifier => "CLASSIFIER",
            Self::PronounDe => "PRONOUN_DE",
            Self::Pronoun => "PRONOUN",
            Self::ModifierDe => "MODIFIER_DE",
            Self::Modifier => "MODIFIER",
            Self::Resultative => "RESULTATIVE",
            Self::Empty => "EMPTY",
            Self::Unknown => "UNKNOWN",
            Self::ExtPp => "EXT_PP",
            Self::RedupSkip => "REDUP_SKIP",
        }
    }
}

impl fmt::Display for InsertionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lemma-specific grammar violation inside an insertion, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsertionError {
    MissingRequiredDe,
    MissingPreferredDe,
    InvalidPronounInsertion,
    PpInInsertion,
}

impl InsertionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRequiredDe => "MISSING_REQUIRED_DE",
            Self::MissingPreferredDe => "MISSING_PREFERRED_DE",
            Self::InvalidPronounInsertion => "INVALID_PRONOUN_INSERTION",
            Self::PpInInsertion => "PP_IN_INSERTION",
        }
    }
}

impl fmt::Display for InsertionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal insertion text with one category slot per character
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertionSpan {
    pub text: String,
    pub tagged: Vec<(char, Option<Category>)>,
}

impl InsertionSpan {
    pub fn new(text: &str, vocabulary: &InsertionVocabulary) -> Self {
        Self { text: text.to_string(), tagged: vocabulary.annotate(text) }
    }

    pub fn is_empty(&self) -> bool {
        self.tagged.is_empty()
    }

    pub fn categories(&self) -> BTreeSet<Category> {
        self.tagged.iter().filter_map(|(_, c)| *c).collect()
    }

    pub fn has(&self, category: Category) -> bool {
        self.tagged.iter().any(|(_, c)| *c == Some(category))
    }

    /// A pronoun run not closed by the possessive marker (`他` in `了他一个`, not in `他的`)
    pub fn has_bare_pronoun(&self) -> bool {
        let categories: Vec<Option<Category>> = self.tagged.iter().map(|(_, c)| *c).collect();
        categories.iter().enumerate().any(|(i, c)| {
            *c == Some(Category::Pronoun)
                && !matches!(
                    categories.get(i + 1),
                    Some(Some(Category::Pronoun)) | Some(Some(Category::Possessive))
                )
        })
    }

    pub fn tagged_count(&self) -> usize {
        self.tagged.iter().filter(|(_, c)| c.is_some()).count()
    }

    /// Tagged characters over total characters; a zero-length insertion is fully licensed
    pub fn coverage(&self) -> f64 {
        if self.tagged.is_empty() {
            return 1.0;
        }
        self.tagged_count() as f64 / self.tagged.len() as f64
    }

    /// `了:ASPECT+她:PRO+的:DE`, untagged characters omitted
    pub fn render_tagged(&self) -> String {
        self.tagged
            .iter()
            .filter_map(|(ch, c)| c.map(|c| format!("{ch}:{c}")))
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// Classifier verdict for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionAnalysis {
    pub span: InsertionSpan,
    pub insertion_type: InsertionType,
    pub error: Option<InsertionError>,
    pub confidence: f64,
}

/// Find the insertion between a HEAD and the first TAIL after it.
/// Among all HEAD occurrences the shortest non-empty gap wins, so a fused
/// occurrence elsewhere in the sentence does not hide the split one.
pub fn locate_insertion<'a>(sentence: &'a str, head: &str, tail: &str) -> Option<&'a str> {
    let mut empty_gap = None;
    let mut best: Option<&'a str> = None;

    for (start, _) in sentence.match_indices(head) {
        let after = start + head.len();
        let Some(offset) = sentence[after..].find(tail) else {
            continue;
        };
        let gap = &sentence[after..after + offset];
        if gap.is_empty() {
            empty_gap.get_or_insert(gap);
        } else if best.map_or(true, |b| gap.chars().count() < b.chars().count()) {
            best = Some(gap);
        }
    }

    best.or(empty_gap)
}

pub struct InsertionClassifier {
    vocabulary: InsertionVocabulary,
    priority: Vec<InsertionType>,
    preferred_de_penalty: f64,
    whole_confidence: f64,
    ext_pp_confidence: f64,
    ext_pp_lookbehind: usize,
}

impl Default for InsertionClassifier {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl InsertionClassifier {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            vocabulary: InsertionVocabulary::default(),
            priority: config.insertion_priority.clone(),
            preferred_de_penalty: config.preferred_de_penalty,
            whole_confidence: config.whole_confidence,
            ext_pp_confidence: config.ext_pp_confidence,
            ext_pp_lookbehind: config.ext_pp_lookbehind,
        }
    }

    pub fn vocabulary(&self) -> &InsertionVocabulary {
        &self.vocabulary
    }

    pub fn classify(
        &self,
        entry: &LexiconEntry,
        shape: Shape,
        sentence: &str,
    ) -> InsertionAnalysis {
        match shape {
            Shape::Redup => InsertionAnalysis {
                span: InsertionSpan::default(),
                insertion_type: InsertionType::RedupSkip,
                error: None,
                confidence: 1.0,
            },
            Shape::Whole => self.classify_whole(entry, sentence),
            Shape::Split => match locate_insertion(sentence, entry.head.trim(), entry.tail.trim()) {
                Some(text) => self.classify_span(entry, InsertionSpan::new(text, &self.vocabulary)),
                None => {
                    warn!("Cannot locate head/tail of {} in sentence {:?}", entry.lemma, sentence);
                    InsertionAnalysis {
                        span: InsertionSpan::default(),
                        insertion_type: InsertionType::Unknown,
                        error: None,
                        confidence: 0.0,
                    }
                }
            },
        }
    }

    /// Type, error, and confidence for an already located insertion
    pub fn classify_span(&self, entry: &LexiconEntry, span: InsertionSpan) -> InsertionAnalysis {
        let insertion_type = self.insertion_type(&span);
        let mut confidence = span.coverage();
        let mut error = None;

        let has_pronoun = span.has(Category::Pronoun);
        let has_de = span.has(Category::Possessive);

        match entry.pronoun_rule {
            Some(PronounRule::PronPossRequired) if has_pronoun && !has_de => {
                error.get_or_insert(InsertionError::MissingRequiredDe);
                confidence = 0.0;
            }
            Some(PronounRule::PronPossPreferred) if has_pronoun && !has_de => {
                error.get_or_insert(InsertionError::MissingPreferredDe);
                confidence *= self.preferred_de_penalty;
            }
            Some(PronounRule::NoDirectNp) if has_pronoun => {
                error.get_or_insert(InsertionError::InvalidPronounInsertion);
                confidence = 0.0;
            }
            // no rule licenses a bare pronoun object
            None if span.has_bare_pronoun() => {
                error.get_or_insert(InsertionError::InvalidPronounInsertion);
                confidence = 0.0;
            }
            _ => {}
        }

        if entry.requires_external_pp() && span.has(Category::Preposition) {
            error.get_or_insert(InsertionError::PpInInsertion);
            confidence = 0.0;
        }

        InsertionAnalysis { span, insertion_type, error, confidence }
    }

    fn insertion_type(&self, span: &InsertionSpan) -> InsertionType {
        if span.is_empty() {
            return InsertionType::Empty;
        }
        let present = span.categories();
        self.priority
            .iter()
            .copied()
            .find(|t| {
                let required = t.required_categories();
                !required.is_empty() && required.iter().all(|c| present.contains(c))
            })
            .unwrap_or(InsertionType::Unknown)
    }

    fn classify_whole(&self, entry: &LexiconEntry, sentence: &str) -> InsertionAnalysis {
        let head = entry.head.trim();
        let fused = format!("{}{}", head, entry.tail.trim());
        let head_pos = sentence.find(&fused).or_else(|| sentence.find(head)).unwrap_or(0);

        let before: Vec<char> = sentence[..head_pos].chars().collect();
        let window_start = before.len().saturating_sub(self.ext_pp_lookbehind);
        let window: String = before[window_start..].iter().collect();

        if self.has_preposition_then_pronoun(&window) {
            InsertionAnalysis {
                span: InsertionSpan::default(),
                insertion_type: InsertionType::ExtPp,
                error: None,
                confidence: self.ext_pp_confidence,
            }
        } else {
            InsertionAnalysis {
                span: InsertionSpan::default(),
                insertion_type: InsertionType::Empty,
                error: None,
                confidence: self.whole_confidence,
            }
        }
    }

    fn has_preposition_then_pronoun(&self, text: &str) -> bool {
        self.vocabulary
            .annotate(text)
            .windows(2)
            .any(|pair| {
                pair[0].1 == Some(Category::Preposition) && pair[1].1 == Some(Category::Pronoun)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::LiheciType;

    fn entry(lemma: &str, rule: Option<PronounRule>) -> LexiconEntry {
        let chars: Vec<char> = lemma.chars().collect();
        let (head, tail) = (chars[0].to_string(), chars[1].to_string());
        let e = LexiconEntry::new(lemma, &head, &tail, LiheciType::VerbObject);
        match rule {
            Some(rule) => e.with_pronoun_rule(rule),
            None => e,
        }
    }

    #[test]
    fn test_locate_prefers_split_occurrence() {
        assert_eq!(locate_insertion("他吃了她的醋", "吃", "醋"), Some("了她的"));
        assert_eq!(locate_insertion("他吃醋又吃了她的醋", "吃", "醋"), Some("了她的"));
        assert_eq!(locate_insertion("我们见面吧", "见", "面"), Some(""));
        assert_eq!(locate_insertion("他来了", "吃", "醋"), None);
    }

    #[test]
    fn test_pronoun_object_with_aspect() {
        let classifier = InsertionClassifier::default();
        let chicu = entry("吃醋", Some(PronounRule::PronObjOk));
        let result = classifier.classify(&chicu, Shape::Split, "他吃了她的醋");

        assert_eq!(result.insertion_type, InsertionType::Aspect);
        assert_eq!(result.error, None);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.span.render_tagged(), "了:ASPECT+她:PRO+的:DE");
    }

    #[test]
    fn test_missing_required_de_forces_zero() {
        let classifier = InsertionClassifier::default();
        let daoluan = entry("捣乱", Some(PronounRule::PronPossRequired));
        let result = classifier.classify(&daoluan, Shape::Split, "他总是捣他们乱");
        assert_eq!(result.error, Some(InsertionError::MissingRequiredDe));
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.insertion_type, InsertionType::Pronoun);
    }

    #[test]
    fn test_missing_preferred_de_is_soft() {
        let classifier = InsertionClassifier::default();
        let shengqi = entry("生气", Some(PronounRule::PronPossPreferred));
        let result = classifier.classify(&shengqi, Shape::Split, "别生他气");
        assert_eq!(result.error, Some(InsertionError::MissingPreferredDe));
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_no_direct_np_rejects_pronoun() {
        let classifier = InsertionClassifier::default();
        let shuijiao = entry("睡觉", Some(PronounRule::NoDirectNp));
        let result = classifier.classify(&shuijiao, Shape::Split, "睡他觉");
        assert_eq!(result.error, Some(InsertionError::InvalidPronounInsertion));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_entry_without_rule_rejects_bare_pronoun() {
        let classifier = InsertionClassifier::default();
        let bangmang = entry("帮忙", None);

        for sentence in ["帮了他一个忙", "帮了他忙", "帮他们一个忙"] {
            let result = classifier.classify(&bangmang, Shape::Split, sentence);
            assert_eq!(result.error, Some(InsertionError::InvalidPronounInsertion), "{sentence}");
            assert_eq!(result.confidence, 0.0, "{sentence}");
        }

        // a possessive pronoun is not a bare object
        let result = classifier.classify(&bangmang, Shape::Split, "帮了他的忙");
        assert_eq!(result.error, None);

        let pron_obj_ok = entry("帮忙", Some(PronounRule::PronObjOk));
        let allowed = classifier.classify(&pron_obj_ok, Shape::Split, "帮了他一个忙");
        assert_eq!(allowed.error, None);
        assert_eq!(allowed.confidence, 1.0);
    }

    #[test]
    fn test_bare_pronoun_detection() {
        let vocab = InsertionVocabulary::default();
        assert!(InsertionSpan::new("了他一个", &vocab).has_bare_pronoun());
        assert!(InsertionSpan::new("他们", &vocab).has_bare_pronoun());
        assert!(!InsertionSpan::new("他们的", &vocab).has_bare_pronoun());
        assert!(!InsertionSpan::new("了一个", &vocab).has_bare_pronoun());
    }

    #[test]
    fn test_preposition_inside_pp_lemma() {
        let classifier = InsertionClassifier::default();
        let daoqian = entry("道歉", None).with_pp_rule("WITH_PP", &["跟", "向", "对"]);
        let result = classifier.classify(&daoqian, Shape::Split, "他道了跟我的歉");
        assert_eq!(result.error, Some(InsertionError::PpInInsertion));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_highest_priority_error_is_recorded() {
        let classifier = InsertionClassifier::default();
        let both = entry("道歉", Some(PronounRule::PronPossPreferred))
            .with_pp_rule("WITH_PP", &["跟"]);
        let result = classifier.classify(&both, Shape::Split, "道跟他歉");
        assert_eq!(result.error, Some(InsertionError::MissingPreferredDe));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_zero_insertion_is_licensed() {
        let classifier = InsertionClassifier::default();
        for rule in [None, Some(PronounRule::NoDirectNp), Some(PronounRule::PronPossRequired)] {
            let result = classifier.classify(&entry("见面", rule), Shape::Split, "我们见面吧");
            assert_eq!(result.insertion_type, InsertionType::Empty);
            assert_eq!(result.confidence, 1.0);
            assert_eq!(result.error, None);
        }
    }

    #[test]
    fn test_confidence_monotonic_in_tagged_characters() {
        let vocab = InsertionVocabulary::default();
        let base = InsertionSpan::new("了书", &vocab);
        let more = InsertionSpan::new("了个书", &vocab);
        assert!(more.coverage() > base.coverage());
        assert_eq!(InsertionSpan::new("书本", &vocab).coverage(), 0.0);
    }

    #[test]
    fn test_type_priority() {
        let classifier = InsertionClassifier::default();
        let e = entry("帮忙", Some(PronounRule::PronObjOk));
        let ty = |text: &str| {
            let span = InsertionSpan::new(text, classifier.vocabulary());
            classifier.classify_span(&e, span).insertion_type
        };

        assert_eq!(ty("了一个"), InsertionType::AspectQuant);
        assert_eq!(ty("一个"), InsertionType::Quantifier);
        assert_eq!(ty("个"), InsertionType::Classifier);
        assert_eq!(ty("他的"), InsertionType::PronounDe);
        assert_eq!(ty("大的"), InsertionType::ModifierDe);
        assert_eq!(ty("完"), InsertionType::Resultative);
        assert_eq!(ty("书"), InsertionType::Unknown);
        assert_eq!(ty(""), InsertionType::Empty);
    }

    #[test]
    fn test_custom_priority_order() {
        let config = PipelineConfig {
            insertion_priority: vec![InsertionType::Pronoun, InsertionType::Aspect],
            ..PipelineConfig::default()
        };
        let classifier = InsertionClassifier::from_config(&config);
        let e = entry("吃醋", Some(PronounRule::PronObjOk));
        let result = classifier.classify(&e, Shape::Split, "他吃了她的醋");
        assert_eq!(result.insertion_type, InsertionType::Pronoun);
    }

    #[test]
    fn test_whole_shape_external_pp() {
        let classifier = InsertionClassifier::default();
        let daoqian = entry("道歉", None);

        let ext = classifier.classify(&daoqian, Shape::Whole, "他跟我道歉");
        assert_eq!(ext.insertion_type, InsertionType::ExtPp);
        assert_eq!(ext.confidence, 0.8);

        let plain = classifier.classify(&daoqian, Shape::Whole, "他道歉了");
        assert_eq!(plain.insertion_type, InsertionType::Empty);
        assert_eq!(plain.confidence, 0.5);
    }

    #[test]
    fn test_redup_skips_classification() {
        let classifier = InsertionClassifier::default();
        let result = classifier.classify(&entry("散步", None), Shape::Redup, "散散步");
        assert_eq!(result.insertion_type, InsertionType::RedupSkip);
        assert_eq!(result.confidence, 1.0);
    }
}
