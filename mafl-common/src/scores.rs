//! Pairwise similarity scores
//!
//! A score file is headerless delimited text with one `template, target, score`
//! row per pair. Scores rank templates against a target; a pair with no row
//! scores `0.0`.

use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Similarity metric a score table was computed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cross-correlation
    Xcorr,
    /// Normalised mutual information
    Nmi,
}

impl SimilarityMetric {
    pub fn name(&self) -> &'static str {
        match self {
            SimilarityMetric::Xcorr => "xcorr",
            SimilarityMetric::Nmi => "nmi",
        }
    }

    /// Score file name under the output directory (e.g. `xcorr.csv`)
    pub fn score_file_name(&self) -> String {
        format!("{}.csv", self.name())
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SimilarityMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xcorr" => Ok(SimilarityMetric::Xcorr),
            "nmi" => Ok(SimilarityMetric::Nmi),
            other => Err(Error::Config(format!("Unknown similarity metric: {}", other))),
        }
    }
}

/// Immutable (template stem, target stem) → score lookup
#[derive(Debug, Clone, Default)]
pub struct ScoreTable {
    scores: HashMap<(String, String), f64>,
}

impl ScoreTable {
    /// Build a table from in-memory rows; later duplicates override earlier ones
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, S, f64)>,
        S: Into<String>,
    {
        let scores = rows
            .into_iter()
            .map(|(template, target, score)| ((template.into(), target.into()), score))
            .collect();
        Self { scores }
    }

    /// Load a score file
    ///
    /// Every non-blank row must have exactly three fields and a finite numeric
    /// score. The first malformed row aborts the load with
    /// [`Error::ScoreParse`] naming that row.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open score file {}: {}", path.display(), e),
            ))
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut scores = HashMap::new();

        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::ScoreParse {
                path: path.to_path_buf(),
                line: e.position().map(|p| p.line()).unwrap_or(index as u64 + 1),
                row: String::new(),
                reason: e.to_string(),
            })?;

            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(index as u64 + 1);
            let parse_error = |reason: String| Error::ScoreParse {
                path: path.to_path_buf(),
                line,
                row: record.iter().collect::<Vec<_>>().join(","),
                reason,
            };

            if record.len() != 3 {
                return Err(parse_error(format!(
                    "expected 3 fields, found {}",
                    record.len()
                )));
            }

            let score: f64 = record[2]
                .parse()
                .map_err(|_| parse_error(format!("score {:?} is not a number", &record[2])))?;
            if !score.is_finite() {
                return Err(parse_error(format!("score {} is not finite", score)));
            }

            scores.insert((record[0].to_string(), record[1].to_string()), score);
        }

        tracing::debug!(
            path = %path.display(),
            pairs = scores.len(),
            "Score table loaded"
        );

        Ok(Self { scores })
    }

    /// Score of `template` against `target`, `0.0` when absent
    pub fn get(&self, template: &str, target: &str) -> f64 {
        self.get_or(template, target, 0.0)
    }

    /// Score of `template` against `target`, `default` when absent
    pub fn get_or(&self, template: &str, target: &str, default: f64) -> f64 {
        self.scores
            .get(&(template.to_string(), target.to_string()))
            .copied()
            .unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Location of a metric's score file under `output_dir`
pub fn score_file_path(output_dir: &Path, metric: SimilarityMetric) -> PathBuf {
    output_dir.join(metric.score_file_name())
}
