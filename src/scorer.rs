// WHY: Scorer - confusion matrices keyed by (sentence id, lemma); a read-only view over
// gold and accepted records

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::gold::GoldCase;
use crate::lexicon::{Lexicon, TypeGroup};
use crate::matcher::Shape;
use crate::pipeline::ValidationRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Confusion {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tn: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl Confusion {
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.fn_ + self.tn
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    fn record(&mut self, expected: bool, predicted: bool) {
        match (expected, predicted) {
            (true, true) => self.tp += 1,
            (false, true) => self.fp += 1,
            (true, false) => self.fn_ += 1,
            (false, false) => self.tn += 1,
        }
    }
}

/// Per-shape precision; recall is undefined without per-shape gold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShapeScore {
    pub tp: usize,
    pub fp: usize,
}

impl ShapeScore {
    pub fn total(&self) -> usize {
        self.tp + self.fp
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.total())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissedCase {
    pub sentence_id: String,
    pub lemma: String,
    pub sentence: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Evaluation {
    pub overall: Confusion,
    pub by_group: BTreeMap<TypeGroup, Confusion>,
    pub by_shape: BTreeMap<Shape, ShapeScore>,
    /// Gold error annotations of false positives ("unannotated" when absent)
    pub fp_error_types: BTreeMap<String, usize>,
    pub false_negatives: Vec<MissedCase>,
    /// Gold rows whose lemma is missing from the lexicon and so belong to no group
    pub ungrouped_cases: usize,
}

/// Score accepted records against gold. Duplicate gold keys count once; the first row wins.
pub fn evaluate(
    gold: &[GoldCase],
    records: &[ValidationRecord],
    lexicon: &Lexicon,
) -> Evaluation {
    let accepted: Vec<&ValidationRecord> = records.iter().filter(|r| r.accepted).collect();
    let predicted: BTreeSet<(&str, &str)> =
        accepted.iter().map(|r| (r.sentence_id.as_str(), r.lemma.as_str())).collect();

    let mut expected: HashMap<(&str, &str), &GoldCase> = HashMap::new();
    for case in gold {
        expected.entry((case.sentence_id.as_str(), case.lemma.as_str())).or_insert(case);
    }

    let mut eval = Evaluation::default();
    for group in TypeGroup::ALL {
        eval.by_group.insert(group, Confusion::default());
    }

    let mut keys: Vec<_> = expected.keys().copied().collect();
    keys.sort();

    for key in keys {
        let case = expected[&key];
        let hit = predicted.contains(&key);
        eval.overall.record(case.expected, hit);

        match lexicon.get(&case.lemma).map(|e| e.liheci_type.group()) {
            Some(group) => eval.by_group.entry(group).or_default().record(case.expected, hit),
            None => eval.ungrouped_cases += 1,
        }

        if hit && !case.expected {
            let label = case.error_type.clone().unwrap_or_else(|| "unannotated".to_string());
            *eval.fp_error_types.entry(label).or_default() += 1;
        }
        if !hit && case.expected {
            eval.false_negatives.push(MissedCase {
                sentence_id: case.sentence_id.clone(),
                lemma: case.lemma.clone(),
                sentence: case.sentence.clone(),
            });
        }
    }

    for shape in Shape::ALL {
        let keys: BTreeSet<(&str, &str)> = accepted
            .iter()
            .filter(|r| r.shape == shape)
            .map(|r| (r.sentence_id.as_str(), r.lemma.as_str()))
            .collect();
        let mut score = ShapeScore::default();
        for key in keys {
            match expected.get(&key) {
                Some(case) if case.expected => score.tp += 1,
                Some(_) => score.fp += 1,
                None => {}
            }
        }
        eval.by_shape.insert(shape, score);
    }

    eval
}
