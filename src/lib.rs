pub mod config;
pub mod error;
pub mod gold;
pub mod insertion;
pub mod lexicon;
pub mod matcher;
pub mod pipeline;
pub mod pos;
pub mod reader;
pub mod recognizer;
pub mod redup;
pub mod report;
pub mod scorer;
pub mod tagger;
pub mod vocabulary;

// Re-export the types needed to run and score a pipeline
pub use config::PipelineConfig;
pub use error::EngineError;
pub use gold::{load_gold, GoldCase};
pub use insertion::{InsertionClassifier, InsertionError, InsertionType};
pub use lexicon::{Lexicon, LexiconEntry, LiheciType, TypeGroup};
pub use matcher::{Candidate, Shape};
pub use pipeline::{Pipeline, PipelineOutput, Sentence, ValidationRecord};
pub use pos::{MatchPattern, PosValidator};
pub use recognizer::{Lookup, PatternEngine, Recognizer, RegexEngine};
pub use scorer::{evaluate, Confusion, Evaluation};
pub use tagger::{CommandTagger, DictionaryTagger, TagCache, TaggedSentence, Tagger};
