use std::collections::BTreeMap;

use tracing::warn;

use crate::config::InsightThresholds;
use crate::error::{CoachError, CoachResult};
use crate::models::{
    EngagementMetrics, LearningGap, PerformanceMetrics, Severity, StudyPatterns,
};

pub const FALLBACK_INSIGHT: &str = "Unable to generate insights at this time.";

/// Advisory insight lines. Never fails; a problem with the inputs yields a
/// single generic line instead.
pub fn generate(
    performance: &PerformanceMetrics,
    engagement: &EngagementMetrics,
    gaps: &[LearningGap],
    thresholds: &InsightThresholds,
) -> Vec<String> {
    match try_generate(performance, engagement, gaps, thresholds) {
        Ok(insights) => insights,
        Err(err) => {
            warn!(error = %err, "insight generation failed");
            vec![FALLBACK_INSIGHT.to_string()]
        }
    }
}

fn ensure_finite(label: &str, value: f64) -> CoachResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CoachError::Validation(format!("{label} is not a finite number")))
    }
}

fn try_generate(
    performance: &PerformanceMetrics,
    engagement: &EngagementMetrics,
    gaps: &[LearningGap],
    thresholds: &InsightThresholds,
) -> CoachResult<Vec<String>> {
    let average = ensure_finite("average score", performance.average_score)?;
    let improvement = ensure_finite("improvement rate", performance.improvement_rate)?;
    let consistency = ensure_finite("consistency score", engagement.consistency_score)?;

    let mut insights = Vec::new();

    if average >= thresholds.excellent_at {
        insights.push(format!("Excellent performance! Average score: {average}%"));
    } else if average >= thresholds.good_at {
        insights.push(format!(
            "Good progress, but room for improvement. Average score: {average}%"
        ));
    } else {
        insights.push(format!("Performance needs attention. Average score: {average}%"));
    }

    if improvement > thresholds.trend_delta {
        insights.push(format!(
            "Great improvement trend! +{improvement}% from early attempts"
        ));
    } else if improvement < -thresholds.trend_delta {
        insights.push("Performance declining. Consider reviewing fundamentals.".to_string());
    }

    if consistency >= thresholds.consistency_high_at {
        insights.push(format!("Excellent study consistency! Score: {consistency}/100"));
    } else if consistency < thresholds.consistency_low_below {
        insights.push("Study consistency needs improvement. Try daily sessions.".to_string());
    }

    let high_priority: Vec<&str> = gaps
        .iter()
        .filter(|gap| gap.severity == Severity::High)
        .take(thresholds.max_listed_topics)
        .map(|gap| gap.topic.as_str())
        .collect();

    if !high_priority.is_empty() {
        insights.push(format!("High priority topics: {}", high_priority.join(", ")));
    } else if gaps.is_empty() {
        insights.push("No major learning gaps identified. Keep up the good work!".to_string());
    }

    Ok(insights)
}

/// Session-length and weak-subject advice. Either input may be missing, in
/// which case its rule is skipped.
pub fn study_habits(
    patterns: Option<&StudyPatterns>,
    subject_performance: Option<&BTreeMap<String, f64>>,
    thresholds: &InsightThresholds,
) -> Vec<String> {
    let mut insights = Vec::new();

    if let Some(patterns) = patterns {
        let length = patterns.average_session_length;
        if length < thresholds.short_session_below {
            insights.push("Consider longer study sessions for better retention.".to_string());
        } else if length > thresholds.long_session_above {
            insights.push("Take breaks to avoid fatigue during long sessions.".to_string());
        }
    }

    if let Some(averages) = subject_performance {
        let weak: Vec<&str> = averages
            .iter()
            .filter(|(_, average)| **average < thresholds.weak_subject_below)
            .map(|(subject, _)| subject.as_str())
            .collect();
        if !weak.is_empty() {
            insights.push(format!("Need improvement in: {}", weak.join(", ")));
        }
    }

    insights
}
