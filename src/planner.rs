use chrono::{Duration, NaiveDate};

use crate::config::PlannerSettings;
use crate::error::{CoachError, CoachResult};
use crate::models::{PlanDay, StudentProfile, StudyPlan};

pub const GENERAL_STUDY: &str = "General Study";

fn daily_minutes(profile: &StudentProfile, settings: &PlannerSettings) -> u32 {
    let hours = profile
        .study_hours_per_day
        .filter(|h| h.is_finite() && *h > 0.0)
        .unwrap_or(settings.default_daily_hours);
    (hours * 60.0).round() as u32
}

pub fn plan_prompt(profile: &StudentProfile, settings: &PlannerSettings) -> String {
    let grade = profile
        .grade
        .map(|g| format!(", Grade {g}"))
        .unwrap_or_default();
    format!(
        "Student: {}{}\nSubjects: {}\nWeak Topics: {}\nDaily Study Time: {} minutes\n\n\
         Create a {}-day study schedule that:\n\
         1. Prioritizes weak topics with 40% more time\n\
         2. Implements spaced repetition (review on day 3 and day 7)\n\
         3. Balances subjects across the week\n\
         4. Includes buffer time for rest\n\n\
         Separate each day with a blank line.\n\
         Format: Day | Topic | Duration | Goals",
        profile.name,
        grade,
        profile.subjects.join(", "),
        profile.weak_topics.join(", "),
        daily_minutes(profile, settings),
        settings.days,
    )
}

/// Splits generated text into day blocks separated by blank lines.
pub fn parse_plan(
    text: &str,
    profile: &StudentProfile,
    start: NaiveDate,
    settings: &PlannerSettings,
) -> CoachResult<StudyPlan> {
    let minutes = daily_minutes(profile, settings);
    let days: Vec<PlanDay> = text
        .replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .take(settings.days as usize)
        .zip(0u32..)
        .map(|(block, index)| PlanDay {
            day: index + 1,
            date: start + Duration::days(index as i64),
            focus: block.to_string(),
            minutes,
        })
        .collect();

    if days.is_empty() {
        return Err(CoachError::Parse("plan response contained no days".into()));
    }
    Ok(StudyPlan { days })
}

/// Round-robin over the profile's subjects.
pub fn fallback_plan(
    profile: &StudentProfile,
    start: NaiveDate,
    settings: &PlannerSettings,
) -> StudyPlan {
    let minutes = daily_minutes(profile, settings);
    let days = (0..settings.days)
        .map(|index| {
            let focus = if profile.subjects.is_empty() {
                GENERAL_STUDY.to_string()
            } else {
                profile.subjects[index as usize % profile.subjects.len()].clone()
            };
            PlanDay {
                day: index + 1,
                date: start + Duration::days(index as i64),
                focus,
                minutes,
            }
        })
        .collect();

    StudyPlan { days }
}
