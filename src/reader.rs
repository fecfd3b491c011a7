use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::pipeline::Sentence;

/// Configuration for file reading behavior
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Whether to fail fast on first error or keep the lines read so far
    pub fail_fast: bool,
    /// Buffer size for async reading (default: 8KB)
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            // WHY: 8KB matches typical filesystem block reads for line-oriented inputs
            buffer_size: 8192,
        }
    }
}

/// Statistics for one input file
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadStats {
    pub file_path: String,
    pub lines_read: u64,
    pub bytes_read: u64,
    pub duration_ms: u64,
    pub read_error: Option<String>,
}

impl ReadStats {
    /// Nothing usable came out of the file
    pub fn is_unreadable(&self) -> bool {
        self.read_error.is_some() && self.lines_read == 0
    }
}

/// Async line reader for gold, corpus and dictionary inputs
pub struct AsyncFileReader {
    config: ReaderConfig,
}

impl AsyncFileReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    fn failed(&self, error_msg: String, stats: ReadStats) -> Result<(Vec<String>, ReadStats)> {
        warn!("{}", error_msg);
        if self.config.fail_fast {
            Err(anyhow::anyhow!(error_msg))
        } else {
            Ok((Vec::new(), stats))
        }
    }

    /// Read a UTF-8 file line by line. A leading BOM and trailing carriage returns are stripped.
    /// Without fail_fast, a decoding error keeps the lines read before it.
    pub async fn read_file_lines<P: AsRef<Path>>(
        &self,
        file_path: P,
    ) -> Result<(Vec<String>, ReadStats)> {
        let path = file_path.as_ref();
        let start_time = std::time::Instant::now();
        let mut stats = ReadStats { file_path: path.display().to_string(), ..ReadStats::default() };

        debug!("Starting async read of file: {}", path.display());

        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                let error_msg = format!("Failed to open file {}: {}", path.display(), e);
                stats.read_error = Some(error_msg.clone());
                stats.duration_ms = start_time.elapsed().as_millis() as u64;
                return self.failed(error_msg, stats);
            }
        };

        let reader = BufReader::with_capacity(self.config.buffer_size, file);
        let mut lines = reader.lines();
        let mut result_lines = Vec::new();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    stats.bytes_read += line.len() as u64 + 1; // +1 for newline
                    stats.lines_read += 1;
                    let line = if stats.lines_read == 1 {
                        line.trim_start_matches('\u{feff}').to_string()
                    } else {
                        line
                    };
                    result_lines.push(line.trim_end_matches('\r').to_string());
                }
                Ok(None) => break,
                Err(e) => {
                    let error_msg = format!(
                        "UTF-8 decoding error in {} at line {}: {}",
                        path.display(),
                        stats.lines_read + 1,
                        e
                    );
                    warn!("{}", error_msg);
                    stats.read_error = Some(error_msg.clone());
                    stats.duration_ms = start_time.elapsed().as_millis() as u64;

                    if self.config.fail_fast {
                        return Err(anyhow::anyhow!(error_msg));
                    }
                    return Ok((result_lines, stats));
                }
            }
        }

        stats.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Read {}: {} lines, {} bytes in {}ms",
            path.display(),
            stats.lines_read,
            stats.bytes_read,
            stats.duration_ms
        );
        Ok((result_lines, stats))
    }

    /// Read a corpus: one sentence per line, either `id<TAB>sentence` or a bare sentence
    /// numbered by its line. Blank lines and `#` comments are skipped.
    pub async fn read_sentences<P: AsRef<Path>>(
        &self,
        file_path: P,
    ) -> Result<(Vec<Sentence>, ReadStats)> {
        let (lines, stats) = self.read_file_lines(file_path).await?;
        Ok((parse_sentences(&lines), stats))
    }
}

/// Corpus lines to sentences
pub fn parse_sentences(lines: &[String]) -> Vec<Sentence> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            match line.split_once('\t') {
                Some((id, text)) if !id.trim().is_empty() && !text.trim().is_empty() => {
                    Some(Sentence::new(id.trim(), text.trim()))
                }
                _ => Some(Sentence::new((idx + 1).to_string(), line)),
            }
        })
        .collect()
}
