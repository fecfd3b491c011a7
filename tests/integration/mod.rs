// Integration test utilities and common code
// WHY: Centralized utilities avoid duplication across integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use liheci::{DictionaryTagger, Lexicon, Pipeline, PipelineConfig, RegexEngine};

pub const LEXICON_HEADER: &str =
    "Lemma,A,B,Type,RedupPattern,Transitivity,PronounInsertion,PPRequirement";

/// Lexicon rows covering the documented end-to-end cases
pub const SAMPLE_LEXICON_ROWS: &[&str] = &[
    "吃醋,吃,醋,Verb-Object,,intransitive,PRON_OBJ_OK,",
    "帮忙,帮,忙,Verb-Object,,intransitive,PRON_OBJ_OK,",
    "生气,生,气,Verb-Object,,intransitive,PRON_POSS_REQUIRED,",
    "捣乱,捣,乱,Pseudo V-O,,intransitive,PRON_POSS_REQUIRED,",
    "道歉,道,歉,Verb-Object,,intransitive,,EXT:WITH_PP(跟|向|对)",
    "散步,散,步,Verb-Object,AAB,intransitive,,",
    "见面,见,面,Verb-Object,,intransitive,NO_DIRECT_NP,",
];

/// POS entries for the content words of the sample sentences
pub const SAMPLE_POS_DICT: &str = "\
吃\tVV\n醋\tNN\n帮\tVV\n忙\tNN\n生\tVV\n气\tNN\n捣\tVV\n乱\tNN\n\
道\tVV\n歉\tNN\n道歉\tVV\n散\tVV\n散步\tVV\n见\tVV\n面\tNN\n见面\tVV\n去\tVV\n";

/// Test fixture helper for creating temporary directories with pipeline inputs
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();

        Self { temp_dir, root_path }
    }

    /// Write a file relative to the fixture root, creating parent directories
    pub fn create_file<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        let file_path = self.root_path.join(relative_path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }

        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    /// Lexicon CSV with the standard header followed by `rows`
    pub fn create_lexicon(&self, rows: &[&str]) -> PathBuf {
        let mut content = String::from(LEXICON_HEADER);
        content.push('\n');
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        self.create_file("lexicon.csv", &content)
    }

    pub fn create_sample_lexicon(&self) -> PathBuf {
        self.create_lexicon(SAMPLE_LEXICON_ROWS)
    }

    pub fn create_gold(&self, content: &str) -> PathBuf {
        self.create_file("gold.tsv", content)
    }

    pub fn create_corpus(&self, content: &str) -> PathBuf {
        self.create_file("corpus.txt", content)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root_path.join("out")
    }
}

/// In-memory lexicon matching `SAMPLE_LEXICON_ROWS`
pub fn sample_lexicon() -> Lexicon {
    let mut content = String::from(LEXICON_HEADER);
    for row in SAMPLE_LEXICON_ROWS {
        content.push('\n');
        content.push_str(row);
    }
    Lexicon::from_csv_str(&content).expect("Sample lexicon should parse").0
}

pub fn sample_tagger() -> DictionaryTagger {
    DictionaryTagger::from_tsv_str(SAMPLE_POS_DICT)
}

/// Pipeline over the sample lexicon with the regex engine and sample POS dictionary
pub fn sample_pipeline() -> Pipeline {
    let config = PipelineConfig::default();
    Pipeline::build(sample_lexicon(), &RegexEngine, Box::new(sample_tagger()), &config)
        .expect("Sample pipeline should build")
}
