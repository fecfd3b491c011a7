// WHY: Output artifacts of a run; record tables, a readable per-case report, metrics text
// and the JSON run statistics

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::PipelineConfig;
use crate::gold::{GoldCase, GoldLoadReport};
use crate::lexicon::LexiconLoadReport;
use crate::pipeline::{PipelineStats, ValidationRecord};
use crate::reader::ReadStats;
use crate::scorer::{Confusion, Evaluation};

const TSV_HEADER: [&str; 18] = [
    "sentence_id",
    "lemma",
    "type",
    "shape",
    "is_reduplicated",
    "external_pp",
    "insertion",
    "insertion_tagged",
    "insertion_type",
    "error",
    "confidence",
    "head_pos",
    "tail_pos",
    "pos_pattern",
    "tokens_pos",
    "accepted",
    "reason",
    "sentence",
];

/// Gold outcome of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    TruePositive,
    FalsePositive,
    FalseNegative,
    TrueNegative,
}

impl CaseStatus {
    pub fn from_outcome(expected: bool, accepted: bool) -> Self {
        match (expected, accepted) {
            (true, true) => Self::TruePositive,
            (false, true) => Self::FalsePositive,
            (true, false) => Self::FalseNegative,
            (false, false) => Self::TrueNegative,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::TruePositive => "TP",
            Self::FalsePositive => "FP",
            Self::FalseNegative => "FN",
            Self::TrueNegative => "TN",
        }
    }
}

fn or_dash(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "-",
    }
}

/// Write records as a tab-separated table with a header row
pub fn write_records_tsv<W: Write>(writer: W, records: &[&ValidationRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    wtr.write_record(TSV_HEADER)?;

    for r in records {
        let error = r.error.map(|e| e.to_string()).unwrap_or_default();
        let pattern = r.pos_pattern.map(|p| p.to_string()).unwrap_or_default();
        wtr.write_record([
            r.sentence_id.as_str(),
            r.lemma.as_str(),
            r.liheci_type.tag(),
            r.shape.as_str(),
            if r.is_reduplicated { "true" } else { "false" },
            r.external_pp.join(",").as_str(),
            r.insertion.as_str(),
            r.insertion_tagged.as_str(),
            r.insertion_type.as_str(),
            error.as_str(),
            format!("{:.3}", r.confidence).as_str(),
            r.head_pos.as_deref().unwrap_or_default(),
            r.tail_pos.as_deref().unwrap_or_default(),
            pattern.as_str(),
            r.tokens_pos.as_str(),
            if r.accepted { "true" } else { "false" },
            r.reason.as_str(),
            r.sentence.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// First gold judgement per (sentence id, lemma)
fn gold_index(gold: &[GoldCase]) -> HashMap<(&str, &str), bool> {
    let mut index = HashMap::new();
    for case in gold {
        index.entry((case.sentence_id.as_str(), case.lemma.as_str())).or_insert(case.expected);
    }
    index
}

/// Readable block report, one block per record
pub fn render_case_report(records: &[ValidationRecord], gold: Option<&[GoldCase]>) -> String {
    let index = gold.map(gold_index).unwrap_or_default();
    let mut out = String::new();

    for r in records {
        let status = index
            .get(&(r.sentence_id.as_str(), r.lemma.as_str()))
            .map(|&expected| CaseStatus::from_outcome(expected, r.accepted).code())
            .unwrap_or("--");

        let _ = writeln!(
            out,
            "=== [{}] {} {} ({}, {}) ===",
            status,
            r.sentence_id,
            r.lemma,
            r.liheci_type,
            r.shape.as_str()
        );
        let _ = writeln!(out, "sentence:    {}", r.sentence);
        let _ = writeln!(out, "tokens:      {}", or_dash(Some(r.tokens_pos.as_str())));
        let _ = writeln!(
            out,
            "head:        {} @{} {}",
            r.head,
            r.head_token_idx.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string()),
            or_dash(r.head_pos.as_deref())
        );
        let _ = writeln!(
            out,
            "tail:        {} @{} {} ({})",
            r.tail,
            r.tail_token_idx.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string()),
            or_dash(r.tail_pos.as_deref()),
            r.pos_pattern.map(|p| p.as_str()).unwrap_or("-")
        );
        let _ = writeln!(
            out,
            "insertion:   {} [{}] {} confidence {:.2}",
            or_dash(Some(r.insertion.as_str())),
            r.insertion_tagged,
            r.insertion_type,
            r.confidence
        );
        if let Some(error) = r.error {
            let _ = writeln!(out, "error:       {error}");
        }
        if !r.external_pp.is_empty() {
            let _ = writeln!(out, "external_pp: {}", r.external_pp.join(","));
        }
        let verdict = if r.accepted { "accepted" } else { "rejected" };
        let _ = writeln!(out, "verdict:     {} ({})", verdict, r.reason);
        out.push('\n');
    }

    out
}

fn confusion_lines(out: &mut String, c: &Confusion) {
    let _ = writeln!(
        out,
        "  TP={} FP={} FN={} TN={} (total {})",
        c.tp,
        c.fp,
        c.fn_,
        c.tn,
        c.total()
    );
    let _ = writeln!(
        out,
        "  precision={:.4} recall={:.4} f1={:.4} accuracy={:.4}",
        c.precision(),
        c.recall(),
        c.f1(),
        c.accuracy()
    );
}

pub fn render_metrics(evaluation: &Evaluation) -> String {
    let mut out = String::new();

    out.push_str("Overall\n");
    confusion_lines(&mut out, &evaluation.overall);

    out.push_str("\nBy type group\n");
    for (group, confusion) in &evaluation.by_group {
        let _ = writeln!(out, "{}", group.label());
        confusion_lines(&mut out, confusion);
    }

    out.push_str("\nBy shape (accepted rows)\n");
    for (shape, score) in &evaluation.by_shape {
        let _ = writeln!(
            out,
            "  {:<5} TP={} FP={} precision={:.4}",
            shape.as_str(),
            score.tp,
            score.fp,
            score.precision()
        );
    }

    if evaluation.ungrouped_cases > 0 {
        let _ = writeln!(
            out,
            "\nGold cases with lemmas outside the lexicon: {}",
            evaluation.ungrouped_cases
        );
    }

    if !evaluation.fp_error_types.is_empty() {
        out.push_str("\nFalse positives by gold error type\n");
        for (error_type, count) in &evaluation.fp_error_types {
            let _ = writeln!(out, "  {error_type}: {count}");
        }
    }

    if !evaluation.false_negatives.is_empty() {
        let _ = writeln!(out, "\nFalse negatives ({})", evaluation.false_negatives.len());
        for missed in &evaluation.false_negatives {
            let _ =
                writeln!(out, "  {}\t{}\t{}", missed.sentence_id, missed.lemma, missed.sentence);
        }
    }

    out
}

/// Paths of the files produced by `write_reports`
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub validated: PathBuf,
    pub rejected: PathBuf,
    pub report: PathBuf,
    pub metrics: Option<PathBuf>,
}

fn create(path: &Path) -> Result<std::io::BufWriter<std::fs::File>> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(std::io::BufWriter::new(file))
}

/// Write the record tables, the block report and, when scored, the metrics
pub fn write_reports(
    out_dir: &Path,
    records: &[ValidationRecord],
    gold: Option<&[GoldCase]>,
    evaluation: Option<&Evaluation>,
) -> Result<ReportPaths> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

    let paths = ReportPaths {
        validated: out_dir.join("validated.tsv"),
        rejected: out_dir.join("rejected.tsv"),
        report: out_dir.join("report.txt"),
        metrics: evaluation.map(|_| out_dir.join("metrics.txt")),
    };

    let (accepted, rejected): (Vec<&ValidationRecord>, Vec<&ValidationRecord>) =
        records.iter().partition(|r| r.accepted);
    write_records_tsv(create(&paths.validated)?, &accepted)
        .with_context(|| format!("Failed to write {}", paths.validated.display()))?;
    write_records_tsv(create(&paths.rejected)?, &rejected)
        .with_context(|| format!("Failed to write {}", paths.rejected.display()))?;

    std::fs::write(&paths.report, render_case_report(records, gold))
        .with_context(|| format!("Failed to write {}", paths.report.display()))?;

    if let (Some(path), Some(evaluation)) = (&paths.metrics, evaluation) {
        std::fs::write(path, render_metrics(evaluation))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    info!(
        "Wrote reports to {}: {} validated, {} rejected",
        out_dir.display(),
        accepted.len(),
        rejected.len()
    );
    Ok(paths)
}

/// Whole-run statistics serialized to JSON
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Unix timestamp (seconds) of the run start
    pub run_start: u64,
    pub total_processing_time_ms: u64,
    pub config: PipelineConfig,
    pub lexicon: LexiconLoadReport,
    pub gold: Option<GoldLoadReport>,
    pub corpus: Option<ReadStats>,
    pub pipeline: PipelineStats,
    pub evaluation: Option<Evaluation>,
}

pub async fn write_run_stats(path: &Path, stats: &RunStats) -> Result<()> {
    let json = serde_json::to_string_pretty(stats).context("Failed to serialize run statistics")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write run statistics {}", path.display()))?;
    info!("Wrote run statistics to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insertion::InsertionType;
    use crate::lexicon::LiheciType;
    use crate::matcher::Shape;
    use crate::pos::MatchPattern;
    use tempfile::TempDir;

    fn record(sid: &str, accepted: bool) -> ValidationRecord {
        ValidationRecord {
            sentence_id: sid.to_string(),
            sentence: "他吃了她的醋".to_string(),
            lemma: "吃醋".to_string(),
            liheci_type: LiheciType::VerbObject,
            head: "吃".to_string(),
            tail: "醋".to_string(),
            shape: Shape::Split,
            is_reduplicated: false,
            external_pp: Vec::new(),
            insertion: "了她的".to_string(),
            insertion_tagged: "了:ASPECT+她:PRO+的:DE".to_string(),
            insertion_type: InsertionType::PronounDe,
            error: None,
            confidence: 1.0,
            head_token_idx: Some(1),
            tail_token_idx: Some(5),
            head_pos: Some("VV".to_string()),
            tail_pos: Some("NN".to_string()),
            pos_pattern: Some(MatchPattern::SeparateTokens),
            tokens_pos: "他/PN 吃/VV 了/AS 她/PN 的/DEG 醋/NN".to_string(),
            accepted,
            reason: if accepted { "pos_valid".to_string() } else { "tail_pos_invalid".to_string() },
        }
    }

    fn gold(sid: &str, expected: bool) -> GoldCase {
        GoldCase {
            sentence_id: sid.to_string(),
            lemma: "吃醋".to_string(),
            expected,
            sentence: "他吃了她的醋".to_string(),
            error_type: None,
        }
    }

    #[test]
    fn test_tsv_has_header_and_rows() {
        let rec = record("1", true);
        let mut buf = Vec::new();
        write_records_tsv(&mut buf, &[&rec]).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("sentence_id\tlemma\ttype\tshape"));
        assert!(lines[1].starts_with("1\t吃醋\tVerb-Object\tSPLIT\tfalse"));
        assert!(lines[1].contains("\t1.000\t"));
    }

    #[test]
    fn test_case_report_marks_gold_status() {
        let records = vec![record("1", true), record("2", false), record("3", false)];
        let gold = vec![gold("1", true), gold("2", true)];

        let report = render_case_report(&records, Some(&gold));
        assert!(report.contains("=== [TP] 1 吃醋"));
        assert!(report.contains("=== [FN] 2 吃醋"));
        assert!(report.contains("=== [--] 3 吃醋"));
        assert!(report.contains("tail:        醋 @5 NN (separate_tokens)"));
    }

    #[test]
    fn test_write_reports_splits_by_verdict() {
        let temp_dir = TempDir::new().unwrap();
        let records = vec![record("1", true), record("2", false)];

        let paths = write_reports(temp_dir.path(), &records, None, None).unwrap();
        let validated = std::fs::read_to_string(&paths.validated).unwrap();
        let rejected = std::fs::read_to_string(&paths.rejected).unwrap();

        assert_eq!(validated.lines().count(), 2);
        assert!(rejected.contains("tail_pos_invalid"));
        assert!(paths.metrics.is_none());
        assert!(paths.report.exists());
    }

    #[test]
    fn test_metrics_text() {
        let evaluation = Evaluation {
            overall: Confusion { tp: 1, fp: 1, fn_: 0, tn: 2 },
            fp_error_types: [("MISSING_DE".to_string(), 1)].into_iter().collect(),
            ..Evaluation::default()
        };

        let text = render_metrics(&evaluation);
        assert!(text.contains("TP=1 FP=1 FN=0 TN=2 (total 4)"));
        assert!(text.contains("precision=0.5000"));
        assert!(text.contains("MISSING_DE: 1"));
    }
}
