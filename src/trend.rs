use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{CoachError, CoachResult};
use crate::metrics::round2;
use crate::models::{Direction, QuizAttempt, StudySession, TrendPoint, TrendResult};

/// Endpoint delta across a series ordered by timestamp.
pub fn trend(series: &[TrendPoint]) -> CoachResult<TrendResult> {
    if series.len() < 2 {
        return Err(CoachError::InsufficientData(format!(
            "trend needs at least 2 points, got {}",
            series.len()
        )));
    }

    let mut sorted = series.to_vec();
    sorted.sort_by_key(|point| point.timestamp);

    let first = sorted[0].value;
    let last = sorted[sorted.len() - 1].value;
    let change = last - first;
    let percent_change = if first != 0.0 {
        round2(change / first * 100.0)
    } else {
        0.0
    };

    let direction = if change > 0.0 {
        Direction::Increasing
    } else if change < 0.0 {
        Direction::Decreasing
    } else {
        Direction::Stable
    };

    Ok(TrendResult {
        direction,
        absolute_change: change,
        percent_change,
        sample_count: sorted.len(),
    })
}

/// Quiz scores as a series, optionally restricted to one topic.
pub fn score_series(attempts: &[QuizAttempt], topic: Option<&str>) -> Vec<TrendPoint> {
    attempts
        .iter()
        .filter(|attempt| topic.map_or(true, |t| attempt.topic.eq_ignore_ascii_case(t)))
        .map(|attempt| TrendPoint {
            timestamp: attempt.date,
            value: attempt.score,
        })
        .collect()
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Total study minutes per calendar week (weeks start on Monday).
pub fn weekly_study_minutes(sessions: &[StudySession]) -> Vec<TrendPoint> {
    let mut weeks: BTreeMap<NaiveDate, u64> = BTreeMap::new();

    for session in sessions {
        *weeks.entry(week_start(session.date.date())).or_insert(0) +=
            session.duration_minutes as u64;
    }

    weeks
        .into_iter()
        .filter_map(|(start, minutes)| {
            start.and_hms_opt(0, 0, 0).map(|timestamp| TrendPoint {
                timestamp,
                value: minutes as f64,
            })
        })
        .collect()
}
