// WHY: Lexicon model - the single source of truth for per-lemma rules
// Every downstream stage reads entries from here and never writes them back

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Structural class of a compound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LiheciType {
    VerbObject,
    PseudoVerbObject,
    ModifierHead,
    Simplex,
}

impl LiheciType {
    /// Parse the free-form spellings found in lexicon sheets and output labels
    /// ("Verb-Object", "Pseudo V-O", "PseudoV-O", "Modifier-Head", "Simplex Word", ...)
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match key.as_str() {
            "verbobject" | "vo" => Some(Self::VerbObject),
            "pseudovo" | "pseudoverbobject" => Some(Self::PseudoVerbObject),
            "modifierhead" | "mh" => Some(Self::ModifierHead),
            "simplex" | "simplexword" => Some(Self::Simplex),
            _ => None,
        }
    }

    /// Space-free tag used inside recognizer output labels
    pub fn tag(&self) -> &'static str {
        match self {
            Self::VerbObject => "Verb-Object",
            Self::PseudoVerbObject => "PseudoV-O",
            Self::ModifierHead => "Modifier-Head",
            Self::Simplex => "SimplexWord",
        }
    }

    /// Whether WHOLE also covers the generated reduplicated surfaces (h·h·t, h·h·t·t, h·一·h·t)
    pub fn admits_generated_redup(&self) -> bool {
        matches!(self, Self::VerbObject | Self::Simplex)
    }

    pub fn group(&self) -> TypeGroup {
        match self {
            Self::VerbObject | Self::PseudoVerbObject => TypeGroup::VerbObjectGroup,
            Self::ModifierHead | Self::Simplex => TypeGroup::ModifierHeadGroup,
        }
    }
}

impl fmt::Display for LiheciType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Coarse grouping used when slicing evaluation metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeGroup {
    #[serde(rename = "VO_Group")]
    VerbObjectGroup,
    #[serde(rename = "MH_Group")]
    ModifierHeadGroup,
}

impl TypeGroup {
    pub const ALL: [TypeGroup; 2] = [TypeGroup::VerbObjectGroup, TypeGroup::ModifierHeadGroup];

    pub fn label(&self) -> &'static str {
        match self {
            Self::VerbObjectGroup => "VO_Group (Verb-Object, PseudoV-O)",
            Self::ModifierHeadGroup => "MH_Group (Modifier-Head, SimplexWord)",
        }
    }
}

/// Declared reduplication shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RedupPattern {
    /// head·head·tail (散散步)
    Aab,
    /// head·一/了·head·tail (看一看书, 看了看书)
    AXab,
}

/// Parse a RedupPattern cell; several patterns may share one cell ("AAB;A_XAB")
pub fn parse_redup_patterns(raw: &str) -> BTreeSet<RedupPattern> {
    let upper = raw.trim().to_uppercase();
    let mut patterns = BTreeSet::new();

    for part in upper.split(|c: char| matches!(c, ';' | ',' | '|' | '/' | ' ')) {
        let compact: String = part.chars().filter(|c| c.is_ascii_alphabetic()).collect();
        match compact.as_str() {
            "AAB" => {
                patterns.insert(RedupPattern::Aab);
            }
            "AXAB" => {
                patterns.insert(RedupPattern::AXab);
            }
            "" => {}
            other => debug!("Ignoring unknown reduplication pattern token: {}", other),
        }
    }

    patterns
}

/// How a lemma tolerates a pronoun inside the insertion span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PronounRule {
    /// Pronoun must be followed by 的 (帮他的忙 style possessive)
    PronPossRequired,
    /// 的 after the pronoun is preferred, its absence is a soft error
    PronPossPreferred,
    /// A bare pronoun object is fine (帮了他一个忙)
    PronObjOk,
    /// No direct pronoun/NP may sit between head and tail
    NoDirectNp,
}

impl PronounRule {
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match key.as_str() {
            "PRONPOSSREQUIRED" => Some(Self::PronPossRequired),
            "PRONPOSSPREFERRED" => Some(Self::PronPossPreferred),
            "PRONOBJOK" => Some(Self::PronObjOk),
            "NODIRECTNP" => Some(Self::NoDirectNp),
            _ => None,
        }
    }

    /// Bare pronoun right after the head is a recognizer shape for this rule.
    /// Possessive rules keep it so the classifier can report the missing 的.
    pub fn admits_bare_pronoun(&self) -> bool {
        matches!(self, Self::PronPossRequired | Self::PronPossPreferred | Self::PronObjOk)
    }

    /// Pronoun + 的 right after the head is a recognizer shape for this rule
    pub fn admits_possessive(&self) -> bool {
        matches!(self, Self::PronPossRequired | Self::PronPossPreferred)
    }
}

/// One external prepositional-phrase requirement, e.g. `EXT:WITH_PP(跟|和)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpRule {
    /// Normalized marker name ("WITH" for `WITH_PP`)
    pub marker: String,
    pub prepositions: Vec<String>,
}

/// Parse a PPRequirement cell into its rules. Unparseable fragments are ignored.
pub fn parse_pp_requirement(raw: &str) -> Vec<PpRule> {
    let mut rules = Vec::new();
    let mut rest = raw.trim();

    // ASCII uppercasing keeps byte offsets aligned with `rest`
    while let Some(start) = rest.to_ascii_uppercase().find("EXT:") {
        let after = &rest[start + 4..];
        let (Some(open), Some(close)) = (after.find('('), after.find(')')) else {
            break;
        };
        if close < open {
            rest = &after[close + 1..];
            continue;
        }

        let marker = normalize_pp_marker(&after[..open]);
        let prepositions: Vec<String> = after[open + 1..close]
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();

        if !marker.is_empty() && !prepositions.is_empty() {
            rules.push(PpRule { marker, prepositions });
        }
        rest = &after[close + 1..];
    }

    rules
}

fn normalize_pp_marker(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .replace("_PP", "")
        .replace("PP", "")
        .trim_matches('_')
        .to_string()
}

/// A single compound and its syntactic constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub lemma: String,
    pub head: String,
    pub tail: String,
    pub liheci_type: LiheciType,
    pub redup_patterns: BTreeSet<RedupPattern>,
    pub transitivity: String,
    pub pronoun_rule: Option<PronounRule>,
    pub pp_requirement: Vec<PpRule>,
}

impl LexiconEntry {
    /// Minimal entry with no reduplication, pronoun, or PP constraints
    pub fn new(lemma: &str, head: &str, tail: &str, liheci_type: LiheciType) -> Self {
        Self {
            lemma: lemma.to_string(),
            head: head.to_string(),
            tail: tail.to_string(),
            liheci_type,
            redup_patterns: BTreeSet::new(),
            transitivity: String::new(),
            pronoun_rule: None,
            pp_requirement: Vec::new(),
        }
    }

    pub fn with_redup(mut self, pattern: RedupPattern) -> Self {
        self.redup_patterns.insert(pattern);
        self
    }

    pub fn with_pronoun_rule(mut self, rule: PronounRule) -> Self {
        self.pronoun_rule = Some(rule);
        self
    }

    pub fn with_pp_rule(mut self, marker: &str, prepositions: &[&str]) -> Self {
        self.pp_requirement.push(PpRule {
            marker: normalize_pp_marker(marker),
            prepositions: prepositions.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    pub fn has_redup(&self) -> bool {
        !self.redup_patterns.is_empty()
    }

    /// Lemmas with a PP requirement want the phrase outside the compound
    pub fn requires_external_pp(&self) -> bool {
        !self.pp_requirement.is_empty()
    }

    /// Build an entry from one sheet row. `Err` carries the reason the row is skipped.
    fn from_row(row: LexiconRow) -> std::result::Result<Self, String> {
        let lemma = row.lemma.trim().to_string();
        let head = row.head.trim().to_string();
        let tail = row.tail.trim().to_string();

        if head.is_empty() || tail.is_empty() {
            return Err(format!("lemma {lemma:?} has an empty head or tail"));
        }
        if head == tail {
            return Err(format!("lemma {lemma:?} has identical head and tail {head:?}"));
        }
        let liheci_type = LiheciType::parse(&row.liheci_type)
            .ok_or_else(|| format!("lemma {lemma:?} has unknown type {:?}", row.liheci_type))?;

        let pronoun_raw = row.pronoun_insertion.trim();
        let pronoun_rule = if pronoun_raw.is_empty() {
            None
        } else {
            let rule = PronounRule::parse(pronoun_raw);
            if rule.is_none() {
                warn!(
                    "Lemma {}: unknown PronounInsertion value {:?}, treating as none",
                    lemma, pronoun_raw
                );
            }
            rule
        };

        Ok(Self {
            redup_patterns: parse_redup_patterns(&row.redup_pattern),
            transitivity: row.transitivity.trim().to_string(),
            pp_requirement: parse_pp_requirement(&row.pp_requirement),
            lemma,
            head,
            tail,
            liheci_type,
            pronoun_rule,
        })
    }
}

/// Raw sheet row; every column is optional so one bad cell never poisons the file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LexiconRow {
    #[serde(rename = "Lemma")]
    lemma: String,
    #[serde(rename = "A")]
    head: String,
    #[serde(rename = "B")]
    tail: String,
    #[serde(rename = "Type")]
    liheci_type: String,
    #[serde(rename = "RedupPattern")]
    redup_pattern: String,
    #[serde(rename = "Transitivity")]
    transitivity: String,
    #[serde(rename = "PronounInsertion")]
    pronoun_insertion: String,
    #[serde(rename = "PPRequirement")]
    pp_requirement: String,
}

/// Outcome counters from loading a lexicon sheet
#[derive(Debug, Clone, Default, Serialize)]
pub struct LexiconLoadReport {
    pub rows_read: usize,
    pub entries_loaded: usize,
    pub rows_skipped: usize,
    pub duplicates: usize,
}

/// Ordered, lemma-indexed collection of entries
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    entries: Vec<LexiconEntry>,
    index: HashMap<String, usize>,
}

impl Lexicon {
    /// Build from already-validated entries; later duplicates of a lemma are dropped
    pub fn from_entries(entries: impl IntoIterator<Item = LexiconEntry>) -> Self {
        let mut lexicon = Self::default();
        for entry in entries {
            if !lexicon.insert(entry) {
                debug!("Dropping duplicate lexicon entry");
            }
        }
        lexicon
    }

    fn insert(&mut self, entry: LexiconEntry) -> bool {
        if self.index.contains_key(&entry.lemma) {
            return false;
        }
        self.index.insert(entry.lemma.clone(), self.entries.len());
        self.entries.push(entry);
        true
    }

    /// Parse a CSV lexicon. Malformed rows are skipped with a warning;
    /// only an unreadable header aborts.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<(Self, LexiconLoadReport)> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers().context("Lexicon has no readable header row")?.clone();
        for required in ["Lemma", "A", "B", "Type"] {
            if !headers.iter().any(|h| h == required) {
                anyhow::bail!("Lexicon header is missing required column {required:?}");
            }
        }

        let mut lexicon = Self::default();
        let mut report = LexiconLoadReport::default();

        for (row_idx, record) in csv_reader.deserialize::<LexiconRow>().enumerate() {
            report.rows_read += 1;
            // WHY: +2 accounts for the header line and 1-based numbering
            let line = row_idx + 2;

            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping unreadable lexicon row at line {}: {}", line, e);
                    report.rows_skipped += 1;
                    continue;
                }
            };

            let lemma = row.lemma.trim();
            if lemma.is_empty() || lemma.starts_with('#') {
                report.rows_skipped += 1;
                continue;
            }

            match LexiconEntry::from_row(row) {
                Ok(entry) => {
                    let lemma = entry.lemma.clone();
                    if lexicon.insert(entry) {
                        report.entries_loaded += 1;
                    } else {
                        warn!(
                            "Duplicate lemma {} at line {}, keeping the first definition",
                            lemma, line
                        );
                        report.duplicates += 1;
                    }
                }
                Err(reason) => {
                    warn!("Skipping malformed lexicon row at line {}: {}", line, reason);
                    report.rows_skipped += 1;
                }
            }
        }

        info!(
            "Lexicon parsed: {} entries from {} rows ({} skipped, {} duplicates)",
            report.entries_loaded, report.rows_read, report.rows_skipped, report.duplicates
        );
        Ok((lexicon, report))
    }

    pub fn from_csv_str(content: &str) -> Result<(Self, LexiconLoadReport)> {
        Self::from_csv_reader(content.as_bytes())
    }

    /// Load a lexicon sheet from disk
    pub async fn load(path: &Path) -> Result<(Self, LexiconLoadReport)> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read lexicon {}", path.display()))?;
        let (lexicon, report) = Self::from_csv_str(&content)
            .with_context(|| format!("Failed to parse lexicon {}", path.display()))?;
        if lexicon.is_empty() {
            anyhow::bail!("Lexicon {} contains no usable entries", path.display());
        }
        Ok((lexicon, report))
    }

    pub fn get(&self, lemma: &str) -> Option<&LexiconEntry> {
        self.index.get(lemma).map(|&idx| &self.entries[idx])
    }

    pub fn entries(&self) -> &[LexiconEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "\
Lemma,A,B,Type,RedupPattern,Transitivity,PronounInsertion,PPRequirement
散步,散,步,Verb-Object,AAB,intransitive,,
帮忙,帮,忙,Verb-Object,,intransitive,PRON_OBJ_OK,
道歉,道,歉,Verb-Object,,intransitive,,EXT:WITH_PP(跟|向|对)
# 注释,x,y,Verb-Object,,,,
坏行,,行,Verb-Object,,,,
同同,同,同,Simplex Word,,,,
捣乱,捣,乱,Pseudo V-O,,,PRON_POSS_REQUIRED,
帮忙,帮,忙,Verb-Object,,,,
";

    #[test]
    fn test_type_spellings() {
        assert_eq!(LiheciType::parse("Verb-Object"), Some(LiheciType::VerbObject));
        assert_eq!(LiheciType::parse("Pseudo V-O"), Some(LiheciType::PseudoVerbObject));
        assert_eq!(LiheciType::parse("PseudoV-O"), Some(LiheciType::PseudoVerbObject));
        assert_eq!(LiheciType::parse("Modifier-Head"), Some(LiheciType::ModifierHead));
        assert_eq!(LiheciType::parse("Simplex Word"), Some(LiheciType::Simplex));
        assert_eq!(LiheciType::parse("Adjective"), None);

        for ty in [
            LiheciType::VerbObject,
            LiheciType::PseudoVerbObject,
            LiheciType::ModifierHead,
            LiheciType::Simplex,
        ] {
            assert_eq!(LiheciType::parse(ty.tag()), Some(ty), "tag must parse back");
        }
    }

    #[test]
    fn test_redup_pattern_cells() {
        assert!(parse_redup_patterns("").is_empty());
        assert_eq!(parse_redup_patterns("AAB"), BTreeSet::from([RedupPattern::Aab]));
        assert_eq!(parse_redup_patterns("A_XAB"), BTreeSet::from([RedupPattern::AXab]));
        assert_eq!(
            parse_redup_patterns("AAB;A·X·AB"),
            BTreeSet::from([RedupPattern::Aab, RedupPattern::AXab])
        );
    }

    #[test]
    fn test_pp_requirement_parsing() {
        let rules = parse_pp_requirement("EXT:WITH_PP(跟|向 | 对) EXT:FOR_PP(给)");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].marker, "WITH");
        assert_eq!(rules[0].prepositions, vec!["跟", "向", "对"]);
        assert_eq!(rules[1].marker, "FOR");

        assert!(parse_pp_requirement("").is_empty());
        assert!(parse_pp_requirement("EXT:BROKEN").is_empty());
    }

    #[test]
    fn test_pronoun_rule_spellings() {
        assert_eq!(PronounRule::parse("PRON_POSS_REQUIRED"), Some(PronounRule::PronPossRequired));
        assert_eq!(PronounRule::parse("PronObjOk"), Some(PronounRule::PronObjOk));
        assert_eq!(PronounRule::parse("no_direct_np"), Some(PronounRule::NoDirectNp));
        assert!(!PronounRule::NoDirectNp.admits_bare_pronoun());
        assert!(PronounRule::PronPossRequired.admits_possessive());
        assert!(!PronounRule::PronObjOk.admits_possessive());
    }

    #[test]
    fn test_sheet_loading_skips_bad_rows() {
        let (lexicon, report) = Lexicon::from_csv_str(SHEET).unwrap();

        assert_eq!(lexicon.len(), 4);
        assert_eq!(report.entries_loaded, 4);
        assert_eq!(report.duplicates, 1);
        // comment, empty head, identical head/tail
        assert_eq!(report.rows_skipped, 3);

        let sanbu = lexicon.get("散步").unwrap();
        assert!(sanbu.has_redup());
        assert_eq!(sanbu.transitivity, "intransitive");

        let daoqian = lexicon.get("道歉").unwrap();
        assert!(daoqian.requires_external_pp());

        let daoluan = lexicon.get("捣乱").unwrap();
        assert_eq!(daoluan.liheci_type, LiheciType::PseudoVerbObject);
        assert_eq!(daoluan.pronoun_rule, Some(PronounRule::PronPossRequired));

        let lemmas: Vec<_> = lexicon.entries().iter().map(|e| e.lemma.as_str()).collect();
        assert_eq!(lemmas, vec!["散步", "帮忙", "道歉", "捣乱"]);
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let result = Lexicon::from_csv_str("Lemma,A,Type\n散步,散,Verb-Object\n");
        assert!(result.is_err());
    }
}
