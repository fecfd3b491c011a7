// WHY: POS validator - a cheap syntactic sanity check on HEAD/TAIL realization that
// catches accidental character matches the surface grammar cannot see

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::lexicon::{LexiconEntry, LiheciType};
use crate::matcher::Shape;
use crate::tagger::{TagCache, TaggedSentence, Tagger};

pub const VERB_TAGS: &[&str] = &["VV", "VC", "VE"];
pub const NOUN_TAGS: &[&str] = &["NN", "NR", "NT"];
pub const ADJ_TAGS: &[&str] = &["VA", "JJ"];

/// Function-word tags that can never realize a TAIL morpheme
pub const TAIL_BLACKLIST: &[&str] = &["AD", "P", "CS", "CC", "DT", "DEG", "DEC", "AS", "SP"];

fn tag_set(groups: &[&[&str]]) -> BTreeSet<String> {
    groups.iter().flat_map(|g| g.iter()).map(|t| t.to_string()).collect()
}

/// Per-type expectation tables
#[derive(Debug, Clone)]
pub struct PosRules {
    pub tail_blacklist: BTreeSet<String>,
    pub head_allowed: HashMap<LiheciType, BTreeSet<String>>,
    pub tail_allowed: HashMap<LiheciType, BTreeSet<String>>,
    /// Extra TAIL tags tolerated by fused and reduplicated shapes
    pub fused_tail_extra: BTreeSet<String>,
}

impl Default for PosRules {
    fn default() -> Self {
        let head_allowed = HashMap::from([
            (LiheciType::VerbObject, tag_set(&[VERB_TAGS])),
            (LiheciType::PseudoVerbObject, tag_set(&[VERB_TAGS])),
            (LiheciType::Simplex, tag_set(&[VERB_TAGS])),
            (LiheciType::ModifierHead, tag_set(&[VERB_TAGS, ADJ_TAGS, &["AD"]])),
        ]);
        let tail_allowed = HashMap::from([
            (LiheciType::VerbObject, tag_set(&[NOUN_TAGS, &["M", "VA"]])),
            (LiheciType::PseudoVerbObject, tag_set(&[NOUN_TAGS])),
            (LiheciType::Simplex, tag_set(&[NOUN_TAGS])),
            (LiheciType::ModifierHead, tag_set(&[NOUN_TAGS, ADJ_TAGS])),
        ]);

        Self {
            tail_blacklist: tag_set(&[TAIL_BLACKLIST]),
            head_allowed,
            tail_allowed,
            fused_tail_extra: tag_set(&[VERB_TAGS]),
        }
    }
}

impl PosRules {
    pub fn head_allows(&self, liheci_type: LiheciType, tag: &str) -> bool {
        self.head_allowed.get(&liheci_type).map_or(true, |allowed| allowed.contains(tag))
    }

    pub fn tail_allows(&self, liheci_type: LiheciType, shape: Shape, tag: &str) -> bool {
        let base =
            self.tail_allowed.get(&liheci_type).map_or(true, |allowed| allowed.contains(tag));
        let fused = matches!(shape, Shape::Whole | Shape::Redup);
        base || (fused && self.fused_tail_extra.contains(tag))
    }

    /// Verdict and reason for known HEAD/TAIL tags
    pub fn check(
        &self,
        liheci_type: LiheciType,
        shape: Shape,
        head_pos: &str,
        tail_pos: &str,
    ) -> (bool, String) {
        if self.tail_blacklist.contains(tail_pos) {
            return (false, format!("tail_pos_blacklisted:{tail_pos}"));
        }
        if !self.head_allows(liheci_type, head_pos) {
            return (false, format!("head_pos_invalid:{head_pos}"));
        }
        if !self.tail_allows(liheci_type, shape, tail_pos) {
            return (false, format!("tail_pos_invalid:{tail_pos}"));
        }
        (true, "pos_valid".to_string())
    }
}

/// How HEAD and TAIL were found among the tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPattern {
    SameToken,
    SeparateTokens,
    HeadNotFound,
    TailNotFound,
}

impl MatchPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameToken => "same_token",
            Self::SeparateTokens => "separate_tokens",
            Self::HeadNotFound => "head_not_found",
            Self::TailNotFound => "tail_not_found",
        }
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token position and tag of one morpheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHit {
    pub index: usize,
    pub pos: String,
}

/// Locate HEAD and the first TAIL at or after it. The first HEAD token with a following
/// TAIL wins; when no HEAD has one, the first HEAD is reported with `TailNotFound`.
pub fn find_head_tail(
    head: &str,
    tail: &str,
    tagged: &TaggedSentence,
) -> (Option<TokenHit>, Option<TokenHit>, MatchPattern) {
    let hit = |index: usize| TokenHit { index, pos: tagged.tags[index].clone() };
    let mut first_head = None;

    for (i, token) in tagged.tokens.iter().enumerate() {
        let Some(offset) = token.find(head) else {
            continue;
        };
        first_head.get_or_insert(i);

        if token[offset + head.len()..].contains(tail) {
            return (Some(hit(i)), Some(hit(i)), MatchPattern::SameToken);
        }
        if let Some(j) = (i + 1..tagged.tokens.len()).find(|&j| tagged.tokens[j].contains(tail)) {
            return (Some(hit(i)), Some(hit(j)), MatchPattern::SeparateTokens);
        }
    }

    match first_head {
        Some(i) => (Some(hit(i)), None, MatchPattern::TailNotFound),
        None => (None, None, MatchPattern::HeadNotFound),
    }
}

/// Validator output attached to a record
#[derive(Debug, Clone, PartialEq)]
pub struct PosCheck {
    pub head: Option<TokenHit>,
    pub tail: Option<TokenHit>,
    pub pattern: Option<MatchPattern>,
    pub tokens_pos: String,
    pub passed: bool,
    pub overridden: bool,
    pub reason: String,
}

pub struct PosValidator {
    rules: PosRules,
    override_threshold: f64,
}

impl Default for PosValidator {
    fn default() -> Self {
        Self::new(PosRules::default(), PipelineConfig::default().pos_override_threshold)
    }
}

impl PosValidator {
    pub fn new(rules: PosRules, override_threshold: f64) -> Self {
        Self { rules, override_threshold }
    }

    pub fn rules(&self) -> &PosRules {
        &self.rules
    }

    pub fn validate(
        &self,
        cache: &mut TagCache,
        tagger: &dyn Tagger,
        entry: &LexiconEntry,
        shape: Shape,
        sentence: &str,
        confidence: f64,
    ) -> PosCheck {
        let tagged = match cache.get_or_tag(tagger, sentence) {
            Ok(tagged) => tagged,
            Err(e) => {
                warn!("Tagger failed for lemma {}: {}", entry.lemma, e);
                return PosCheck {
                    head: None,
                    tail: None,
                    pattern: None,
                    tokens_pos: String::new(),
                    passed: false,
                    overridden: false,
                    reason: format!("tagger_error:{}", e.code()),
                };
            }
        };

        let (head, tail, pattern) = find_head_tail(entry.head.trim(), entry.tail.trim(), tagged);

        let (mut passed, mut reason) = match (&head, &tail) {
            (Some(h), Some(t)) => self.rules.check(entry.liheci_type, shape, &h.pos, &t.pos),
            _ => (true, "pos_not_determined".to_string()),
        };

        let mut overridden = false;
        if !passed && confidence > self.override_threshold {
            debug!("POS rejection of {} overridden at confidence {:.2}", entry.lemma, confidence);
            reason = format!("pos_override_by_confidence:{confidence:.2};original:{reason}");
            passed = true;
            overridden = true;
        }

        PosCheck {
            tokens_pos: tagged.render(),
            head,
            tail,
            pattern: Some(pattern),
            passed,
            overridden,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::tagger::DictionaryTagger;

    fn tagged(line: &str) -> TaggedSentence {
        TaggedSentence::parse_line(line).unwrap()
    }

    #[test]
    fn test_find_same_and_separate_tokens() {
        let (h, t, p) = find_head_tail("道", "歉", &tagged("他/PN 跟/P 我/PN 道歉/VV"));
        assert_eq!(p, MatchPattern::SameToken);
        assert_eq!(h.unwrap().index, 3);
        assert_eq!(t.unwrap().pos, "VV");

        let (h, t, p) = find_head_tail("吃", "醋", &tagged("他/PN 吃/VV 了/AS 她/PN 的/DEG 醋/NN"));
        assert_eq!(p, MatchPattern::SeparateTokens);
        assert_eq!(h.unwrap().index, 1);
        assert_eq!(t.unwrap().index, 5);
    }

    #[test]
    fn test_find_missing_morphemes() {
        let (_, _, p) = find_head_tail("吃", "醋", &tagged("他/PN 来/VV 了/AS"));
        assert_eq!(p, MatchPattern::HeadNotFound);

        let (h, t, p) = find_head_tail("吃", "醋", &tagged("他/PN 吃/VV 了/AS"));
        assert_eq!(p, MatchPattern::TailNotFound);
        assert!(h.is_some() && t.is_none());
    }

    #[test]
    fn test_rule_order() {
        let rules = PosRules::default();
        let vo = LiheciType::VerbObject;

        assert_eq!(rules.check(vo, Shape::Split, "VV", "NN"), (true, "pos_valid".to_string()));
        assert_eq!(rules.check(vo, Shape::Split, "NN", "AD").1, "tail_pos_blacklisted:AD");
        assert_eq!(rules.check(vo, Shape::Split, "NN", "NN").1, "head_pos_invalid:NN");
        assert_eq!(rules.check(vo, Shape::Split, "VV", "VV").1, "tail_pos_invalid:VV");
        // fused shapes tolerate verbal tails
        assert!(rules.check(vo, Shape::Whole, "VV", "VV").0);
        assert!(rules.check(vo, Shape::Redup, "VV", "VV").0);
    }

    #[test]
    fn test_modifier_head_allows_adjectival_head() {
        let rules = PosRules::default();
        assert!(rules.check(LiheciType::ModifierHead, Shape::Split, "VA", "NN").0);
        assert!(rules.check(LiheciType::ModifierHead, Shape::Split, "AD", "JJ").0);
        assert!(!rules.check(LiheciType::PseudoVerbObject, Shape::Split, "VV", "M").0);
    }

    #[test]
    fn test_override_by_confidence() {
        let validator = PosValidator::default();
        let tagger = DictionaryTagger::default();
        let mut cache = TagCache::new();
        let entry = LexiconEntry::new("帮忙", "帮", "忙", LiheciType::VerbObject);

        // 帮 and 忙 are unknown to the default dictionary and tag as NN
        let sentence = "帮了他一个忙";
        let strong = validator.validate(&mut cache, &tagger, &entry, Shape::Split, sentence, 1.0);
        assert!(strong.passed);
        assert!(strong.overridden);
        assert_eq!(strong.reason, "pos_override_by_confidence:1.00;original:head_pos_invalid:NN");

        let weak = validator.validate(&mut cache, &tagger, &entry, Shape::Split, sentence, 0.55);
        assert!(!weak.passed);
        assert_eq!(weak.reason, "head_pos_invalid:NN");
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_not_determined_passes() {
        let validator = PosValidator::default();
        let tagger = DictionaryTagger::from_tsv_str("吃\tVV\n");
        let mut cache = TagCache::new();
        let entry = LexiconEntry::new("吃醋", "吃", "醋", LiheciType::VerbObject);

        let check = validator.validate(&mut cache, &tagger, &entry, Shape::Split, "他吃了", 0.0);
        assert!(check.passed);
        assert_eq!(check.reason, "pos_not_determined");
        assert_eq!(check.pattern, Some(MatchPattern::TailNotFound));
    }

    struct OfflineTagger;

    impl Tagger for OfflineTagger {
        fn tag(&self, _sentence: &str) -> Result<TaggedSentence, EngineError> {
            Err(EngineError::Timeout(std::time::Duration::from_secs(30)))
        }
    }

    #[test]
    fn test_tagger_failure_rejects_without_override() {
        let validator = PosValidator::default();
        let mut cache = TagCache::new();
        let entry = LexiconEntry::new("吃醋", "吃", "醋", LiheciType::VerbObject);

        let check =
            validator.validate(&mut cache, &OfflineTagger, &entry, Shape::Split, "他吃醋了", 1.0);
        assert!(!check.passed);
        assert_eq!(check.reason, "tagger_error:timeout");
    }
}
