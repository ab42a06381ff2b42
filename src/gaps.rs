use crate::config::GapThresholds;
use crate::error::CoachResult;
use crate::metrics::{round2, scores_by_topic, topic_average};
use crate::models::{LearningGap, QuizAttempt, Severity};

/// Severity tier for a topic average, or `None` when the topic is not a gap.
pub fn classify(average: f64, thresholds: &GapThresholds) -> Option<Severity> {
    if average >= thresholds.gap_below {
        None
    } else if average < thresholds.high_below {
        Some(Severity::High)
    } else if average < thresholds.medium_below {
        Some(Severity::Medium)
    } else {
        Some(Severity::Low)
    }
}

/// Topics averaging below the gap threshold, worst tier first and lowest
/// average first within a tier.
pub fn identify_gaps(
    attempts: &[QuizAttempt],
    thresholds: &GapThresholds,
) -> CoachResult<Vec<LearningGap>> {
    let grouped = scores_by_topic(attempts)?;

    let mut gaps: Vec<(f64, LearningGap)> = grouped
        .into_iter()
        .filter_map(|(topic, scores)| {
            let average = topic_average(&scores);
            classify(average, thresholds).map(|severity| {
                (
                    average,
                    LearningGap {
                        topic,
                        average_score: round2(average),
                        attempt_count: scores.len(),
                        severity,
                    },
                )
            })
        })
        .collect();

    gaps.sort_by(|(a_avg, a), (b_avg, b)| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then(a_avg.total_cmp(b_avg))
            .then_with(|| a.topic.cmp(&b.topic))
    });

    Ok(gaps.into_iter().map(|(_, gap)| gap).collect())
}
