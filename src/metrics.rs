use std::collections::BTreeMap;

use crate::error::{CoachError, CoachResult};
use crate::models::{
    EngagementMetrics, PerformanceMetrics, QuizAttempt, StudyPatterns, StudySession,
};

/// Window used when comparing early and recent quiz performance.
const IMPROVEMENT_WINDOW: usize = 3;
const MAX_CONSISTENCY: f64 = 100.0;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn validate_score(attempt: &QuizAttempt) -> CoachResult<f64> {
    if !attempt.score.is_finite() || !(0.0..=100.0).contains(&attempt.score) {
        return Err(CoachError::Validation(format!(
            "score {} for topic '{}' is outside 0-100",
            attempt.score, attempt.topic
        )));
    }
    Ok(attempt.score)
}

pub fn performance_metrics(attempts: &[QuizAttempt]) -> CoachResult<PerformanceMetrics> {
    let scores = attempts
        .iter()
        .map(validate_score)
        .collect::<CoachResult<Vec<f64>>>()?;

    if scores.is_empty() {
        return Ok(PerformanceMetrics::default());
    }

    let improvement_rate = if scores.len() >= IMPROVEMENT_WINDOW {
        let early = mean(&scores[..IMPROVEMENT_WINDOW]);
        let recent = mean(&scores[scores.len() - IMPROVEMENT_WINDOW..]);
        if early > 0.0 {
            (recent - early) / early * 100.0
        } else {
            0.0
        }
    } else {
        0.0
    };

    let highest = scores.iter().copied().fold(f64::MIN, f64::max);
    let lowest = scores.iter().copied().fold(f64::MAX, f64::min);

    Ok(PerformanceMetrics {
        average_score: round2(mean(&scores)),
        total_quizzes: scores.len(),
        improvement_rate: round2(improvement_rate),
        highest_score: round2(highest),
        lowest_score: round2(lowest),
    })
}

pub fn engagement_metrics(sessions: &[StudySession]) -> EngagementMetrics {
    let (Some(first), Some(last)) = (
        sessions.iter().map(|s| s.date).min(),
        sessions.iter().map(|s| s.date).max(),
    ) else {
        return EngagementMetrics::default();
    };

    let total_sessions = sessions.len();
    let total_study_time: u64 = sessions.iter().map(|s| s.duration_minutes as u64).sum();
    let span_days = (last - first).num_days() + 1;
    let weeks = (span_days as f64 / 7.0).max(1.0);
    let consistency = (total_sessions as f64 / weeks) * 10.0;

    EngagementMetrics {
        total_sessions,
        total_study_time,
        average_session_duration: round2(total_study_time as f64 / total_sessions as f64),
        consistency_score: round2(consistency).min(MAX_CONSISTENCY),
    }
}

/// Scores grouped by topic, in topic order.
pub fn scores_by_topic(attempts: &[QuizAttempt]) -> CoachResult<BTreeMap<String, Vec<f64>>> {
    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for attempt in attempts {
        let score = validate_score(attempt)?;
        grouped.entry(attempt.topic.clone()).or_default().push(score);
    }

    Ok(grouped)
}

pub fn topic_average(scores: &[f64]) -> f64 {
    mean(scores)
}

/// Rounded average score for each topic.
pub fn subject_performance(attempts: &[QuizAttempt]) -> CoachResult<BTreeMap<String, f64>> {
    Ok(scores_by_topic(attempts)?
        .into_iter()
        .map(|(topic, scores)| (topic, round2(mean(&scores))))
        .collect())
}

/// Minutes per subject and the subject with the most time. Ties go to the
/// alphabetically first subject.
pub fn study_patterns(sessions: &[StudySession]) -> CoachResult<StudyPatterns> {
    if sessions.is_empty() {
        return Err(CoachError::InsufficientData(
            "no study sessions to analyze".into(),
        ));
    }

    let mut subjects_studied: BTreeMap<String, u64> = BTreeMap::new();
    for session in sessions {
        *subjects_studied.entry(session.subject.clone()).or_insert(0) +=
            session.duration_minutes as u64;
    }

    let total_time_minutes: u64 = subjects_studied.values().sum();
    let (most_studied_subject, most_studied_minutes) = subjects_studied
        .iter()
        .fold(None::<(&String, u64)>, |best, (subject, &minutes)| match best {
            Some((_, top)) if top >= minutes => best,
            _ => Some((subject, minutes)),
        })
        .map(|(subject, minutes)| (subject.clone(), minutes))
        .unwrap_or_default();

    Ok(StudyPatterns {
        total_sessions: sessions.len(),
        total_time_minutes,
        average_session_length: round2(total_time_minutes as f64 / sessions.len() as f64),
        subjects_studied,
        most_studied_subject,
        most_studied_minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn attempt(topic: &str, score: f64, day: u32) -> QuizAttempt {
        QuizAttempt {
            topic: topic.to_string(),
            score,
            date: at(day),
        }
    }

    fn session(minutes: u32, date: NaiveDateTime) -> StudySession {
        subject_session("Physics", minutes, date)
    }

    fn subject_session(subject: &str, minutes: u32, date: NaiveDateTime) -> StudySession {
        StudySession {
            subject: subject.to_string(),
            duration_minutes: minutes,
            date,
        }
    }

    #[test]
    fn empty_attempts_yield_neutral_metrics() {
        let metrics = performance_metrics(&[]).unwrap();
        assert_eq!(metrics, PerformanceMetrics::default());
        assert_eq!(metrics.average_score, 0.0);
    }

    #[test]
    fn average_is_arithmetic_mean() {
        let attempts = vec![
            attempt("Physics", 45.0, 15),
            attempt("Math", 78.0, 16),
            attempt("Physics", 52.0, 18),
        ];
        let metrics = performance_metrics(&attempts).unwrap();
        assert_eq!(metrics.average_score, 58.33);
        assert_eq!(metrics.total_quizzes, 3);
        assert_eq!(metrics.highest_score, 78.0);
        assert_eq!(metrics.lowest_score, 45.0);
    }

    #[test]
    fn improvement_needs_three_attempts() {
        let attempts = vec![attempt("Math", 20.0, 1), attempt("Math", 90.0, 2)];
        let metrics = performance_metrics(&attempts).unwrap();
        assert_eq!(metrics.improvement_rate, 0.0);
    }

    #[test]
    fn improvement_compares_first_and_last_three_in_input_order() {
        let attempts = vec![
            attempt("Math", 50.0, 9),
            attempt("Math", 50.0, 1),
            attempt("Math", 50.0, 2),
            attempt("Math", 60.0, 3),
            attempt("Math", 60.0, 4),
            attempt("Math", 60.0, 5),
        ];
        let metrics = performance_metrics(&attempts).unwrap();
        assert_eq!(metrics.improvement_rate, 20.0);
    }

    #[test]
    fn zero_early_mean_gives_zero_improvement() {
        let attempts = vec![
            attempt("Math", 0.0, 1),
            attempt("Math", 0.0, 2),
            attempt("Math", 0.0, 3),
            attempt("Math", 80.0, 4),
        ];
        let metrics = performance_metrics(&attempts).unwrap();
        assert_eq!(metrics.improvement_rate, 0.0);
    }

    #[test]
    fn out_of_range_score_is_a_validation_error() {
        let attempts = vec![attempt("Math", 140.0, 1)];
        assert!(matches!(
            performance_metrics(&attempts),
            Err(CoachError::Validation(_))
        ));
        assert!(matches!(
            scores_by_topic(&[attempt("Math", f64::NAN, 1)]),
            Err(CoachError::Validation(_))
        ));
    }

    #[test]
    fn engagement_of_nothing_is_zero() {
        assert_eq!(engagement_metrics(&[]), EngagementMetrics::default());
    }

    #[test]
    fn engagement_counts_sessions_over_span() {
        let sessions = vec![
            session(45, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap().and_hms_opt(10, 0, 0).unwrap()),
            session(60, NaiveDate::from_ymd_opt(2025, 1, 16).unwrap().and_hms_opt(14, 0, 0).unwrap()),
            session(30, NaiveDate::from_ymd_opt(2025, 1, 18).unwrap().and_hms_opt(9, 0, 0).unwrap()),
            session(50, NaiveDate::from_ymd_opt(2025, 1, 20).unwrap().and_hms_opt(16, 0, 0).unwrap()),
        ];
        let metrics = engagement_metrics(&sessions);
        assert_eq!(metrics.total_sessions, 4);
        assert_eq!(metrics.total_study_time, 185);
        assert_eq!(metrics.average_session_duration, 46.25);
        // Six day span counts as one week.
        assert_eq!(metrics.consistency_score, 40.0);
    }

    #[test]
    fn sparse_sessions_over_long_span_score_low() {
        let sessions = vec![session(30, at(1)), session(30, at(1) + Duration::days(69))];
        let metrics = engagement_metrics(&sessions);
        assert_eq!(metrics.consistency_score, 2.0);
    }

    #[test]
    fn consistency_is_capped() {
        let sessions: Vec<StudySession> = (0..100)
            .map(|i| session(10, at(3) + Duration::minutes(i)))
            .collect();
        let metrics = engagement_metrics(&sessions);
        assert_eq!(metrics.consistency_score, 100.0);
    }

    #[test]
    fn metrics_are_idempotent() {
        let attempts = vec![attempt("Math", 71.0, 1), attempt("Bio", 33.5, 2)];
        assert_eq!(
            performance_metrics(&attempts).unwrap(),
            performance_metrics(&attempts).unwrap()
        );
    }

    #[test]
    fn patterns_total_minutes_per_subject() {
        let sessions = vec![
            subject_session("Physics", 45, at(15)),
            subject_session("Math", 60, at(16)),
            subject_session("Physics", 30, at(18)),
            subject_session("Chemistry", 20, at(19)),
        ];
        let patterns = study_patterns(&sessions).unwrap();

        assert_eq!(patterns.total_sessions, 4);
        assert_eq!(patterns.total_time_minutes, 155);
        assert_eq!(patterns.average_session_length, 38.75);
        assert_eq!(patterns.subjects_studied["Physics"], 75);
        assert_eq!(patterns.subjects_studied["Math"], 60);
        assert_eq!(patterns.most_studied_subject, "Physics");
        assert_eq!(patterns.most_studied_minutes, 75);
    }

    #[test]
    fn pattern_ties_pick_first_subject_by_name() {
        let sessions = vec![
            subject_session("Math", 40, at(1)),
            subject_session("Biology", 40, at(2)),
        ];
        assert_eq!(study_patterns(&sessions).unwrap().most_studied_subject, "Biology");
    }

    #[test]
    fn patterns_need_sessions() {
        assert!(matches!(
            study_patterns(&[]),
            Err(CoachError::InsufficientData(_))
        ));
    }

    #[test]
    fn subject_performance_averages_each_topic() {
        let attempts = vec![
            attempt("Physics", 45.0, 1),
            attempt("Math", 78.0, 2),
            attempt("Physics", 52.0, 3),
            attempt("Math", 85.0, 4),
            attempt("Chemistry", 70.0, 5),
            attempt("Chemistry", 71.0, 6),
            attempt("Chemistry", 71.0, 7),
        ];
        let averages = subject_performance(&attempts).unwrap();
        assert_eq!(averages.len(), 3);
        assert_eq!(averages["Physics"], 48.5);
        assert_eq!(averages["Math"], 81.5);
        assert_eq!(averages["Chemistry"], 70.67);
        assert!(subject_performance(&[]).unwrap().is_empty());
    }
}
