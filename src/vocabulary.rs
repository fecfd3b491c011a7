// WHY: Closed-class word lists shared by the recognizer's hint insertions and the
// insertion annotator; both stages must agree on what counts as punctuation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Sentence punctuation; never a legal insertion character
pub const PUNCTUATION: &[char] =
    &['，', '。', '、', '！', '？', '：', '；', ',', '.', '!', '?', '…'];

pub const ASPECT_MARKERS: &[&str] = &["了", "过", "着"];

pub const NUMERALS: &[&str] = &[
    "一", "二", "两", "三", "四", "五", "六", "七", "八", "九", "十", "百", "千", "万", "几", "半",
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9",
];

pub const DEMONSTRATIVES: &[&str] = &["这", "那"];

/// Classifiers accepted after a numeral or demonstrative in hint insertions
pub const CLASSIFIERS: &[&str] = &[
    "个", "次", "回", "遍", "场", "顿", "口", "句", "声", "趟", "阵", "通", "番", "把", "根", "瓶",
    "条", "只", "支", "本", "辆", "杯", "碗", "件", "双", "张", "种", "块", "匹", "头", "份", "班",
    "手", "针", "斤", "首", "节",
];

pub const TIME_UNITS: &[&str] = &["年", "月", "天", "小时", "分钟", "会儿"];

/// Durations that do not decompose into numeral + unit
pub const FIXED_DURATIONS: &[&str] = &["半个月", "半天", "一整天", "一辈子"];

pub const PRONOUNS: &[&str] = &[
    "我", "你", "他", "她", "它", "咱", "我们", "你们", "他们", "她们", "它们", "咱们", "大家",
    "人家", "谁", "自己",
];

pub const POSSESSIVE_MARKER: &str = "的";

/// Negated potential complement (睡不了觉)
pub const NEGATED_POTENTIAL: &str = "不了";

pub const RESULT_COMPLEMENTS: &[&str] = &["完", "好", "住", "开", "掉", "成", "到", "来", "去"];

pub const DEGREE_MARKERS: &[&str] = &["下", "点"];

pub fn is_punctuation(c: char) -> bool {
    PUNCTUATION.contains(&c)
}

/// Semantic category assigned to insertion characters.
/// Declaration order is the tie-break precedence for equally long matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Aspect,
    Numeral,
    Classifier,
    Pronoun,
    Possessive,
    Modifier,
    Resultative,
    Preposition,
}

impl Category {
    /// Short code used in tagged-insertion strings (`了:ASPECT+他:PRO`)
    pub fn code(&self) -> &'static str {
        match self {
            Self::Aspect => "ASPECT",
            Self::Numeral => "NUM",
            Self::Classifier => "CLF",
            Self::Pronoun => "PRO",
            Self::Possessive => "DE",
            Self::Modifier => "MOD",
            Self::Resultative => "RES",
            Self::Preposition => "PREP",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Longest-match annotator over the insertion word lists
#[derive(Debug, Clone)]
pub struct InsertionVocabulary {
    words: HashMap<String, Category>,
    max_word_chars: usize,
}

impl Default for InsertionVocabulary {
    fn default() -> Self {
        let annotator_classifiers: &[&str] = &[
            "个", "次", "天", "把", "场", "声", "手", "根", "支", "首", "趟", "遍", "下", "年",
            "月", "日", "周", "回", "小时", "分钟", "会儿",
        ];
        let modifiers: &[&str] =
            &["好", "大", "小", "重", "轻", "长", "短", "高", "厚", "很", "整"];
        let resultatives: &[&str] = &["完", "到"];
        let prepositions: &[&str] = &["跟", "和", "与", "向", "对", "给", "为", "被", "把"];

        let mut vocabulary = Self { words: HashMap::new(), max_word_chars: 0 };
        vocabulary.extend(Category::Aspect, ASPECT_MARKERS);
        vocabulary.extend(Category::Numeral, NUMERALS);
        vocabulary.extend(Category::Classifier, annotator_classifiers);
        vocabulary.extend(Category::Pronoun, PRONOUNS);
        vocabulary.extend(Category::Possessive, &[POSSESSIVE_MARKER]);
        vocabulary.extend(Category::Modifier, modifiers);
        vocabulary.extend(Category::Resultative, resultatives);
        vocabulary.extend(Category::Preposition, prepositions);
        vocabulary
    }
}

impl InsertionVocabulary {
    /// Add words to a category; a word already held by a higher-precedence category keeps it
    pub fn extend(&mut self, category: Category, words: &[&str]) {
        for word in words {
            let slot = self.words.entry(word.to_string()).or_insert(category);
            if category < *slot {
                *slot = category;
            }
            self.max_word_chars = self.max_word_chars.max(word.chars().count());
        }
    }

    pub fn category_of(&self, word: &str) -> Option<Category> {
        self.words.get(word).copied()
    }

    /// Tag every character of `text`. Each position takes the longest vocabulary word
    /// starting there; characters of that word share its category.
    pub fn annotate(&self, text: &str) -> Vec<(char, Option<Category>)> {
        let chars: Vec<char> = text.chars().collect();
        let mut tagged = Vec::with_capacity(chars.len());
        let mut pos = 0;

        while pos < chars.len() {
            let longest = (1..=self.max_word_chars.min(chars.len() - pos))
                .rev()
                .find_map(|len| {
                    let word: String = chars[pos..pos + len].iter().collect();
                    self.category_of(&word).map(|category| (len, category))
                });

            match longest {
                Some((len, category)) => {
                    tagged.extend(chars[pos..pos + len].iter().map(|&c| (c, Some(category))));
                    pos += len;
                }
                None => {
                    tagged.push((chars[pos], None));
                    pos += 1;
                }
            }
        }

        tagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_match_wins() {
        let vocab = InsertionVocabulary::default();
        let tagged = vocab.annotate("他们");
        assert_eq!(tagged, vec![('他', Some(Category::Pronoun)), ('们', Some(Category::Pronoun))]);

        let tagged = vocab.annotate("一小时");
        assert_eq!(tagged[0].1, Some(Category::Numeral));
        // 小时 beats 小 (MOD)
        assert_eq!(tagged[1].1, Some(Category::Classifier));
        assert_eq!(tagged[2].1, Some(Category::Classifier));
    }

    #[test]
    fn test_precedence_breaks_ties() {
        let vocab = InsertionVocabulary::default();
        // 把 is both classifier and preposition
        assert_eq!(vocab.category_of("把"), Some(Category::Classifier));
        // 好 is both a hint resultative and a modifier in the annotator
        assert_eq!(vocab.category_of("好"), Some(Category::Modifier));
    }

    #[test]
    fn test_untagged_characters() {
        let vocab = InsertionVocabulary::default();
        let tagged = vocab.annotate("了书");
        assert_eq!(tagged, vec![('了', Some(Category::Aspect)), ('书', None)]);
        assert!(vocab.annotate("").is_empty());
    }

    #[test]
    fn test_punctuation_set() {
        assert!(is_punctuation('，'));
        assert!(is_punctuation('?'));
        assert!(!is_punctuation('了'));
    }
}
