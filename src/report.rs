use std::fmt::{self, Display, Formatter, Write as _};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use log::info;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::inception_score::InceptionScore;
use crate::similarity::SimilarityResult;

pub const REPORT_TEXT_FILENAME: &str = "report.txt";
pub const REPORT_JSON_FILENAME: &str = "report.json";

/// The outcome of one metric. A failed metric does not fail the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricOutcome<T>
{
    Completed { value: T },
    Failed { error: String },
    Skipped { reason: String },
}

impl<T> MetricOutcome<T>
{
    pub fn from_result(result: Result<T>) -> Self
    {
        match result {
            Ok(value) => MetricOutcome::Completed { value },
            Err(e) => MetricOutcome::failed(&e),
        }
    }

    pub fn failed(error: &Error) -> Self
    {
        MetricOutcome::Failed { error: error.to_string() }
    }

    pub fn skipped(reason: impl Into<String>) -> Self
    {
        MetricOutcome::Skipped { reason: reason.into() }
    }

    pub fn value(&self) -> Option<&T>
    {
        match self {
            MetricOutcome::Completed { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool
    {
        matches!(self, MetricOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report
{
    pub generated_at: String,
    pub generated_images: usize,
    pub reference_images: Option<usize>,
    pub fid: MetricOutcome<f64>,
    pub inception_score: MetricOutcome<InceptionScore>,
    pub clip_similarity: MetricOutcome<SimilarityResult>,
}

pub fn system_time_to_string(system_time: SystemTime) -> String
{
    let datetime: DateTime<Local> = system_time.into();
    // Without fractional seconds or the timezone, e.g. "2021-01-01 12:00:00".
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

// Bands used when the experiments were first written up.
pub fn fid_interpretation(fid: f64) -> &'static str
{
    match fid {
        x if x < 50.0 => "excellent",
        x if x < 100.0 => "good",
        x if x < 150.0 => "acceptable",
        _ => "needs improvement",
    }
}

pub fn inception_score_interpretation(score: f64) -> &'static str
{
    match score {
        x if x > 5.0 => "excellent",
        x if x >= 3.0 => "good",
        x if x >= 2.0 => "acceptable",
        _ => "needs improvement",
    }
}

/// Bands for `logit_scale * cosine`, i.e. 100x the cosine similarity.
pub fn clip_similarity_interpretation(similarity: f64) -> &'static str
{
    match similarity {
        x if x > 30.0 => "excellent alignment",
        x if x >= 25.0 => "good alignment",
        x if x >= 20.0 => "acceptable alignment",
        _ => "poor alignment",
    }
}

/// Four decimals, or four significant digits in scientific notation for
/// magnitudes under 1e-3 so small values still diff across runs.
pub fn format_value(value: f64) -> String
{
    if value != 0.0 && value.abs() < 1e-3 {
        format!("{:.4e}", value)
    } else {
        format!("{:.4}", value)
    }
}

fn write_outcome<T>(out: &mut String, name: &str, outcome: &MetricOutcome<T>, render: impl Fn(&T) -> String) -> fmt::Result
{
    match outcome {
        MetricOutcome::Completed { value } => writeln!(out, "{}: {}", name, render(value)),
        MetricOutcome::Failed { error } => writeln!(out, "{}: FAILED ({})", name, error),
        MetricOutcome::Skipped { reason } => writeln!(out, "{}: skipped ({})", name, reason),
    }
}

impl Report
{
    pub fn new(generated_images: usize, reference_images: Option<usize>) -> Self
    {
        Report {
            generated_at: system_time_to_string(SystemTime::now()),
            generated_images,
            reference_images,
            fid: MetricOutcome::skipped("not requested"),
            inception_score: MetricOutcome::skipped("not requested"),
            clip_similarity: MetricOutcome::skipped("not requested"),
        }
    }

    /// True when at least one requested metric failed.
    pub fn has_failures(&self) -> bool
    {
        self.fid.is_failed() || self.inception_score.is_failed() || self.clip_similarity.is_failed()
    }

    fn render(&self) -> std::result::Result<String, fmt::Error>
    {
        let mut out = String::new();
        writeln!(out, "Evaluation report ({})", self.generated_at)?;
        writeln!(out, "Generated images: {}", self.generated_images)?;
        if let Some(reference) = self.reference_images {
            writeln!(out, "Reference images: {}", reference)?;
        }
        writeln!(out)?;

        write_outcome(&mut out, "FID", &self.fid, |fid| {
            format!("{} ({})", format_value(*fid), fid_interpretation(*fid))
        })?;
        write_outcome(&mut out, "Inception Score", &self.inception_score, |score| {
            format!(
                "{} ± {} over {} split(s) ({})",
                format_value(score.mean),
                format_value(score.std),
                score.splits(),
                inception_score_interpretation(score.mean)
            )
        })?;
        write_outcome(&mut out, "Average CLIP Similarity", &self.clip_similarity, |result| {
            format!("{} ({})", format_value(result.mean), clip_similarity_interpretation(result.mean))
        })?;

        if let Some(result) = self.clip_similarity.value() {
            writeln!(out)?;
            writeln!(out, "Individual Results:")?;
            for pair in &result.pairs
            {
                let name = pair.image.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                writeln!(out, "{}: {}", name, format_value(pair.similarity))?;
            }
        }
        Ok(out)
    }

    /// Writes `report.txt` and `report.json` into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<()>
    {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(REPORT_TEXT_FILENAME), self.to_string())?;
        std::fs::write(dir.join(REPORT_JSON_FILENAME), serde_json::to_string_pretty(self)?)?;
        info!("Results saved to {:?}", dir);
        Ok(())
    }
}

impl Display for Report
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.render()?)
    }
}
