use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::ResourceKind;

pub const DEFAULT_CONFIG_FILE: &str = "study-coach.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub retry: RetrySettings,
    pub fallback: FallbackStrategy,
    pub gaps: GapThresholds,
    pub insights: InsightThresholds,
    pub planner: PlannerSettings,
    pub quiz: QuizSettings,
    pub resources: ResourceSettings,
    pub gemini: GeminiSettings,
}

impl CoachConfig {
    /// Load from an explicit path, else `study-coach.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: CoachConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.gaps.validate()?;
        self.insights.validate()?;
        if self.planner.days == 0 {
            anyhow::bail!("planner.days must be at least 1");
        }
        if self.quiz.num_questions == 0 {
            anyhow::bail!("quiz.num_questions must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// What planning and quizzing do once retries are exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    #[default]
    RuleBased,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapThresholds {
    pub high_below: f64,
    pub medium_below: f64,
    pub gap_below: f64,
}

impl GapThresholds {
    fn validate(&self) -> anyhow::Result<()> {
        if !(self.high_below <= self.medium_below && self.medium_below <= self.gap_below) {
            anyhow::bail!(
                "gap thresholds must be ordered: high_below <= medium_below <= gap_below"
            );
        }
        Ok(())
    }
}

impl Default for GapThresholds {
    fn default() -> Self {
        Self {
            high_below: 40.0,
            medium_below: 55.0,
            gap_below: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightThresholds {
    pub excellent_at: f64,
    pub good_at: f64,
    pub trend_delta: f64,
    pub consistency_high_at: f64,
    pub consistency_low_below: f64,
    pub max_listed_topics: usize,
    /// Average session minutes below which longer sessions are suggested.
    pub short_session_below: f64,
    /// Average session minutes above which breaks are suggested.
    pub long_session_above: f64,
    pub weak_subject_below: f64,
}

impl InsightThresholds {
    fn validate(&self) -> anyhow::Result<()> {
        if self.good_at > self.excellent_at {
            anyhow::bail!("insight thresholds must be ordered: good_at <= excellent_at");
        }
        if self.consistency_low_below > self.consistency_high_at {
            anyhow::bail!(
                "insight thresholds must be ordered: consistency_low_below <= consistency_high_at"
            );
        }
        if self.trend_delta.is_nan() || self.trend_delta < 0.0 {
            anyhow::bail!("insights.trend_delta must not be negative");
        }
        if self.short_session_below > self.long_session_above {
            anyhow::bail!(
                "insight thresholds must be ordered: short_session_below <= long_session_above"
            );
        }
        Ok(())
    }
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            excellent_at: 80.0,
            good_at: 60.0,
            trend_delta: 10.0,
            consistency_high_at: 70.0,
            consistency_low_below: 40.0,
            max_listed_topics: 3,
            short_session_below: 25.0,
            long_session_above: 90.0,
            weak_subject_below: 65.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub days: u32,
    pub default_daily_hours: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            days: 7,
            default_daily_hours: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizSettings {
    pub num_questions: usize,
    pub material_char_limit: usize,
    pub material_line_limit: usize,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            num_questions: 10,
            material_char_limit: 2000,
            material_line_limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    pub kinds: Vec<ResourceKind>,
    pub per_kind_limit: usize,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            kinds: vec![ResourceKind::Video, ResourceKind::Article, ResourceKind::Practice],
            per_kind_limit: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro-latest".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}
