// Error handling across loaders and collaborators
// WHY: Input errors skip-and-warn, collaborator failures degrade per sentence, and only
// unusable inputs or an uncompilable grammar abort the run

use std::sync::Arc;
use std::time::Duration;

use liheci::gold::load_gold;
use liheci::recognizer::{Grammar, Lookup, PatternEngine, Recognizer};
use liheci::{
    EngineError, Lexicon, Pipeline, PipelineConfig, RegexEngine, Sentence, TaggedSentence, Tagger,
};

#[path = "integration/mod.rs"]
mod test_utils;
use test_utils::{sample_lexicon, TestFixture, LEXICON_HEADER};

struct FailingTagger(EngineError);

impl Tagger for FailingTagger {
    fn tag(&self, _sentence: &str) -> Result<TaggedSentence, EngineError> {
        Err(self.0.clone())
    }
}

struct BrokenEngine;

impl PatternEngine for BrokenEngine {
    fn compile(&self, _grammar: &Grammar) -> Result<Arc<dyn Recognizer>, EngineError> {
        Err(EngineError::Unavailable("no backend".to_string()))
    }
}

/// Delegates to the regex engine but fails lookups for sentences containing a marker
struct FlakyEngine;

struct FlakyRecognizer {
    inner: Arc<dyn Recognizer>,
}

impl Recognizer for FlakyRecognizer {
    fn lookup(&self, sentence: &str) -> Result<Lookup, EngineError> {
        if sentence.contains("坏") {
            return Err(EngineError::Timeout(Duration::from_secs(30)));
        }
        self.inner.lookup(sentence)
    }

    fn pattern_count(&self) -> usize {
        self.inner.pattern_count()
    }
}

impl PatternEngine for FlakyEngine {
    fn compile(&self, grammar: &Grammar) -> Result<Arc<dyn Recognizer>, EngineError> {
        Ok(Arc::new(FlakyRecognizer { inner: RegexEngine.compile(grammar)? }))
    }
}

#[tokio::test]
async fn test_missing_lexicon_is_fatal() {
    let fixture = TestFixture::new();
    let result = Lexicon::load(&fixture.root_path.join("missing.csv")).await;
    assert!(result.is_err(), "Missing lexicon should abort");
}

#[tokio::test]
async fn test_lexicon_without_required_columns_is_fatal() {
    let fixture = TestFixture::new();
    let path = fixture.create_file("lexicon.csv", "Lemma,A,B\n吃醋,吃,醋\n");
    let error = Lexicon::load(&path).await.unwrap_err();
    assert!(format!("{error:#}").contains("Type"), "error: {error:#}");
}

#[tokio::test]
async fn test_malformed_lexicon_rows_are_skipped() {
    let fixture = TestFixture::new();
    let path = fixture.create_lexicon(&[
        "吃醋,吃,醋,Verb-Object,,,PRON_OBJ_OK,",
        "坏词,,词,Verb-Object,,,,",
        "同字,同,同,Verb-Object,,,,",
        "怪型,怪,型,Noun-Noun,,,,",
        "# 注释,注,释,Verb-Object,,,,",
        "吃醋,吃,醋,Modifier-Head,,,,",
    ]);

    let (lexicon, report) = Lexicon::load(&path).await.unwrap();
    assert_eq!(lexicon.len(), 1);
    assert_eq!(report.rows_read, 6);
    assert_eq!(report.entries_loaded, 1);
    assert_eq!(report.rows_skipped, 4);
    assert_eq!(report.duplicates, 1);
    // the first definition wins
    assert_eq!(lexicon.get("吃醋").unwrap().liheci_type, liheci::LiheciType::VerbObject);
}

#[tokio::test]
async fn test_lexicon_with_only_bad_rows_is_fatal() {
    let fixture = TestFixture::new();
    let content = format!("{LEXICON_HEADER}\n坏词,,词,Verb-Object,,,,\n");
    let path = fixture.create_file("lexicon.csv", &content);
    assert!(Lexicon::load(&path).await.is_err());
}

#[tokio::test]
async fn test_missing_gold_is_fatal() {
    let fixture = TestFixture::new();
    let result = load_gold(&fixture.root_path.join("missing.tsv"), false).await;
    assert!(result.is_err(), "Unreadable gold should abort even without fail_fast");
}

#[tokio::test]
async fn test_malformed_gold_rows() {
    let fixture = TestFixture::new();
    let path =
        fixture.create_gold("1\t吃醋\tTrue\t他吃了她的醋\n2\t吃醋\tperhaps\t他吃醋了\nbroken\n");

    let (cases, report) = load_gold(&path, false).await.unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(report.skipped_lines, 2);

    let result = load_gold(&path, true).await;
    assert!(result.is_err(), "fail_fast should abort on the first malformed row");
}

#[test]
fn test_failing_tagger_rejects_without_aborting() {
    let tagger = FailingTagger(EngineError::Timeout(Duration::from_secs(30)));
    let config = PipelineConfig::default();
    let mut pipeline =
        Pipeline::build(sample_lexicon(), &RegexEngine, Box::new(tagger), &config).unwrap();

    let output = pipeline.run(
        &[Sentence::new("1", "他吃了她的醋"), Sentence::new("2", "他总是捣他们乱")],
        None,
    );

    assert_eq!(output.records.len(), 2);
    let chicu = output.records.iter().find(|r| r.lemma == "吃醋").unwrap();
    assert!(!chicu.accepted);
    assert_eq!(chicu.reason, "tagger_error:timeout");

    // the second row is decided before tagging
    let daoluan = output.records.iter().find(|r| r.lemma == "捣乱").unwrap();
    assert_eq!(daoluan.reason, "insertion_error:MISSING_REQUIRED_DE");
    assert_eq!(output.stats.validation.rejection_reasons.get("tagger_error"), Some(&1));
}

#[test]
fn test_uncompilable_grammar_aborts_before_processing() {
    let result = Pipeline::build(
        sample_lexicon(),
        &BrokenEngine,
        Box::new(test_utils::sample_tagger()),
        &PipelineConfig::default(),
    );
    let error = result.err().expect("build should fail");
    assert!(format!("{error:#}").contains("no backend"));
}

#[test]
fn test_engine_lookup_failure_yields_no_analyses() {
    let mut pipeline = Pipeline::build(
        sample_lexicon(),
        &FlakyEngine,
        Box::new(test_utils::sample_tagger()),
        &PipelineConfig::default(),
    )
    .unwrap();

    let output = pipeline.run(
        &[Sentence::new("1", "坏天气里他吃了她的醋"), Sentence::new("2", "他吃了她的醋")],
        None,
    );

    assert_eq!(output.stats.matching.engine_errors, 1);
    assert_eq!(output.records.len(), 1);
    assert_eq!(output.records[0].sentence_id, "2");
    assert!(output.records[0].accepted);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = PipelineConfig { batch_size: 0, ..PipelineConfig::default() };
    let tagger = Box::new(test_utils::sample_tagger());
    let result = Pipeline::build(sample_lexicon(), &RegexEngine, tagger, &config);
    assert!(result.is_err());

    let out_of_range = PipelineConfig::from_toml_str("drop_threshold = 1.5\n");
    assert!(out_of_range.and_then(|c| c.validate()).is_err());
}
