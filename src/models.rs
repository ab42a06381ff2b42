use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::CoachResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    pub subject: String,
    pub duration_minutes: u32,
    pub date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub topic: String,
    pub score: f64,
    pub date: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub average_score: f64,
    pub total_quizzes: usize,
    pub improvement_rate: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub total_sessions: usize,
    pub total_study_time: u64,
    pub average_session_duration: f64,
    pub consistency_score: f64,
}

/// Where study time went, per subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyPatterns {
    pub total_sessions: usize,
    pub total_time_minutes: u64,
    pub average_session_length: f64,
    pub subjects_studied: BTreeMap<String, u64>,
    pub most_studied_subject: String,
    pub most_studied_minutes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Position in gap listings; high severity is surfaced first.
    pub fn rank(self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningGap {
    pub topic: String,
    pub average_score: f64,
    pub attempt_count: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::Increasing => "increasing",
            Direction::Decreasing => "decreasing",
            Direction::Stable => "stable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub direction: Direction,
    pub absolute_change: f64,
    pub percent_change: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub user_id: String,
    pub name: String,
    pub grade: Option<u8>,
    pub subjects: Vec<String>,
    pub weak_topics: Vec<String>,
    pub study_hours_per_day: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentHistory {
    pub quiz_attempts: Vec<QuizAttempt>,
    pub study_sessions: Vec<StudySession>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDay {
    pub day: u32,
    pub date: NaiveDate,
    pub focus: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub days: Vec<PlanDay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
    pub correct: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub topic: String,
    pub difficulty: Difficulty,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Video,
    Interactive,
    Article,
    Practice,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Video => "video",
            ResourceKind::Interactive => "interactive",
            ResourceKind::Article => "article",
            ResourceKind::Practice => "practice",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl From<Difficulty> for LearningLevel {
    fn from(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => LearningLevel::Beginner,
            Difficulty::Medium => LearningLevel::Intermediate,
            Difficulty::Hard => LearningLevel::Advanced,
        }
    }
}

impl fmt::Display for LearningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LearningLevel::Beginner => "beginner",
            LearningLevel::Intermediate => "intermediate",
            LearningLevel::Advanced => "advanced",
        };
        f.write_str(label)
    }
}

/// A learning resource as returned by a lookup provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub title: String,
    pub url: String,
    pub description: String,
    pub source: String,
    /// Kind-specific fields such as `duration` or `read_time`.
    #[serde(default)]
    pub details: BTreeMap<String, String>,
    #[serde(default)]
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub topic: String,
    pub level: LearningLevel,
    pub resources: Vec<Resource>,
    pub total_found: usize,
}

/// One analytics step inside the analyzing branch: its value or the reason it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Section<T> {
    Value(T),
    Error { error: String },
}

impl<T> Section<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Section::Value(value) => Some(value),
            Section::Error { .. } => None,
        }
    }
}

impl<T> From<CoachResult<T>> for Section<T> {
    fn from(result: CoachResult<T>) -> Self {
        match result {
            Ok(value) => Section::Value(value),
            Err(err) => Section::Error {
                error: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressAnalysis {
    pub performance: Section<PerformanceMetrics>,
    pub engagement: Section<EngagementMetrics>,
    pub study_patterns: Section<StudyPatterns>,
    /// Average score per quiz topic.
    pub subject_performance: Section<BTreeMap<String, f64>>,
    pub learning_gaps: Section<Vec<LearningGap>>,
    pub insights: Section<Vec<String>>,
    pub score_trend: Option<TrendResult>,
    pub focus_topic: String,
    pub focus_is_gap: bool,
}

/// How a pipeline stage produced its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Generated(T),
    Fallback { value: T, reason: String },
    Failed { error: String },
}

impl<T> StageOutcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            StageOutcome::Generated(value) | StageOutcome::Fallback { value, .. } => Some(value),
            StageOutcome::Failed { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, StageOutcome::Fallback { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Generated(_) => "generated",
            StageOutcome::Fallback { .. } => "fallback",
            StageOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Planning,
    Quizzing,
    Resourcing,
    Analyzing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub session_id: String,
    pub plan: StageOutcome<StudyPlan>,
    pub quiz: StageOutcome<Quiz>,
    pub resources: StageOutcome<ResourceSet>,
    pub progress_analysis: StageOutcome<ProgressAnalysis>,
    pub transitions: Vec<Stage>,
}
