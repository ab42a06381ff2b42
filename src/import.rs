use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::info;

use crate::capabilities::TextSupplier;
use crate::error::{CoachError, CoachResult};
use crate::models::{QuizAttempt, StudySession};

#[derive(Deserialize)]
struct QuizRow {
    topic: String,
    score: f64,
    date: String,
}

#[derive(Deserialize)]
struct SessionRow {
    subject: String,
    duration_minutes: u32,
    date: String,
}

/// Accepts `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS` (a space also works as the separator).
pub fn parse_timestamp(raw: &str) -> CoachResult<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(value);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CoachError::Validation(format!("unrecognized date '{raw}'")))
}

fn csv_error(path: &Path, err: csv::Error) -> CoachError {
    CoachError::Validation(format!("{}: {err}", path.display()))
}

fn clean_label(raw: &str, field: &str, line: usize) -> CoachResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(CoachError::Validation(format!("row {line}: {field} is empty")));
    }
    Ok(value.to_string())
}

pub fn read_quiz_attempts(path: &Path) -> CoachResult<Vec<QuizAttempt>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| csv_error(path, err))?;
    let mut attempts = Vec::new();

    for (index, result) in reader.deserialize::<QuizRow>().enumerate() {
        let line = index + 2;
        let row = result.map_err(|err| csv_error(path, err))?;
        if !row.score.is_finite() || !(0.0..=100.0).contains(&row.score) {
            return Err(CoachError::Validation(format!(
                "row {line}: score {} is outside 0-100",
                row.score
            )));
        }
        attempts.push(QuizAttempt {
            topic: clean_label(&row.topic, "topic", line)?,
            score: row.score,
            date: parse_timestamp(&row.date)?,
        });
    }

    info!(count = attempts.len(), path = %path.display(), "imported quiz attempts");
    Ok(attempts)
}

pub fn read_study_sessions(path: &Path) -> CoachResult<Vec<StudySession>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| csv_error(path, err))?;
    let mut sessions = Vec::new();

    for (index, result) in reader.deserialize::<SessionRow>().enumerate() {
        let line = index + 2;
        let row = result.map_err(|err| csv_error(path, err))?;
        sessions.push(StudySession {
            subject: clean_label(&row.subject, "subject", line)?,
            duration_minutes: row.duration_minutes,
            date: parse_timestamp(&row.date)?,
        });
    }

    info!(count = sessions.len(), path = %path.display(), "imported study sessions");
    Ok(sessions)
}

/// Plain-text study material read from disk on each request.
#[derive(Debug, Clone)]
pub struct MaterialFile {
    path: PathBuf,
}

impl MaterialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TextSupplier for MaterialFile {
    async fn text(&self) -> CoachResult<String> {
        tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            CoachError::ExternalCall(format!("{}: {err}", self.path.display()))
        })
    }
}
