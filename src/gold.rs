// WHY: Gold annotations in the three layouts seen in practice, normalized to one case type

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::pipeline::Sentence;
use crate::reader::{AsyncFileReader, ReadStats, ReaderConfig};

/// One gold judgement: does `lemma` occur as a liheci in this sentence?
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoldCase {
    pub sentence_id: String,
    pub lemma: String,
    pub expected: bool,
    pub sentence: String,
    /// `[ERROR_TYPE]` annotation carried by negative rows
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GoldLoadReport {
    pub read: ReadStats,
    pub cases: usize,
    pub positives: usize,
    pub negatives: usize,
    pub skipped_lines: usize,
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Split a leading `[ERROR_TYPE]` off the sentence text
fn split_error_type(raw: &str) -> (Option<String>, String) {
    let text = raw.trim();
    if let Some(rest) = text.strip_prefix('[') {
        if let Some((tag, sentence)) = rest.split_once(']') {
            let tag = tag.trim();
            if !tag.is_empty() {
                return (Some(tag.to_string()), sentence.trim().to_string());
            }
        }
    }
    (None, text.to_string())
}

fn is_header(first_field: &str) -> bool {
    matches!(
        first_field.trim().to_ascii_lowercase().as_str(),
        "sent_id" | "sentence_id" | "id" | "lemma"
    )
}

/// Parse gold lines. Legacy `lemma|sentence|flag` rows are numbered in file order.
/// Malformed lines are skipped with a warning, or abort under `fail_fast`.
pub fn parse_gold(lines: &[String], fail_fast: bool) -> Result<(Vec<GoldCase>, usize)> {
    let mut cases = Vec::new();
    let mut skipped = 0usize;
    let mut legacy_counter = 0usize;

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = if trimmed.contains('\t') {
            trimmed.splitn(4, '\t').collect()
        } else {
            trimmed.splitn(4, '|').collect()
        };
        if is_header(fields[0]) {
            continue;
        }

        let parsed = match fields.as_slice() {
            [sid, lemma, flag, sentence] => {
                let sid = sid.trim().to_string();
                parse_flag(flag).map(|expected| (sid, *lemma, expected, *sentence))
            }
            [lemma, sentence, flag] => parse_flag(flag).map(|expected| {
                legacy_counter += 1;
                (legacy_counter.to_string(), *lemma, expected, *sentence)
            }),
            _ => None,
        };

        match parsed {
            Some((sentence_id, lemma, expected, sentence))
                if !lemma.trim().is_empty() && !sentence_id.is_empty() =>
            {
                let (error_type, sentence) = split_error_type(sentence);
                cases.push(GoldCase {
                    sentence_id,
                    lemma: lemma.trim().to_string(),
                    expected,
                    sentence,
                    error_type,
                });
            }
            _ => {
                let msg = format!("Malformed gold line {}: {:?}", idx + 1, trimmed);
                if fail_fast {
                    anyhow::bail!(msg);
                }
                warn!("{}", msg);
                skipped += 1;
            }
        }
    }

    Ok((cases, skipped))
}

/// Load a gold file; an unreadable file is an error even without fail_fast
pub async fn load_gold(path: &Path, fail_fast: bool) -> Result<(Vec<GoldCase>, GoldLoadReport)> {
    let reader = AsyncFileReader::new(ReaderConfig { fail_fast, ..ReaderConfig::default() });
    let (lines, read) = reader.read_file_lines(path).await?;
    if read.is_unreadable() {
        anyhow::bail!(
            "Gold file {} is unreadable: {}",
            path.display(),
            read.read_error.clone().unwrap_or_default()
        );
    }

    let (cases, skipped_lines) = parse_gold(&lines, fail_fast)?;
    let positives = cases.iter().filter(|c| c.expected).count();
    let report = GoldLoadReport {
        read,
        cases: cases.len(),
        positives,
        negatives: cases.len() - positives,
        skipped_lines,
    };

    info!(
        "Loaded {} gold cases from {} ({} positive, {} negative, {} skipped)",
        report.cases,
        path.display(),
        report.positives,
        report.negatives,
        report.skipped_lines
    );
    Ok((cases, report))
}

/// Distinct sentences in first-appearance order; the first text seen for an id wins
pub fn gold_sentences(cases: &[GoldCase]) -> Vec<Sentence> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    let mut sentences = Vec::new();

    for case in cases {
        match seen.get(case.sentence_id.as_str()) {
            Some(&text) if text != case.sentence => {
                warn!(
                    "Gold sentence {} has conflicting texts, keeping the first",
                    case.sentence_id
                );
            }
            Some(_) => {}
            None => {
                seen.insert(&case.sentence_id, &case.sentence);
                sentences.push(Sentence::new(case.sentence_id.clone(), case.sentence.clone()));
            }
        }
    }

    sentences
}
