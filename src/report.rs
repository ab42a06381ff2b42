use std::fmt::Write;

use crate::models::{
    PipelineResult, ProgressAnalysis, Section, StageOutcome, StudentHistory, StudentProfile,
    TrendResult,
};
use crate::trend;

fn stage_note<T>(outcome: &StageOutcome<T>) -> String {
    match outcome {
        StageOutcome::Generated(_) => "generated".to_string(),
        StageOutcome::Fallback { reason, .. } => format!("rule-based fallback ({reason})"),
        StageOutcome::Failed { error } => format!("failed: {error}"),
    }
}

fn trend_line(label: &str, trend: &TrendResult) -> String {
    format!(
        "- {}: {} by {:.2} ({:+.2}%) across {} samples",
        label, trend.direction, trend.absolute_change, trend.percent_change, trend.sample_count
    )
}

fn write_analysis(output: &mut String, analysis: &ProgressAnalysis, history: &StudentHistory) {
    let _ = writeln!(output, "### Performance");
    match &analysis.performance {
        Section::Value(metrics) => {
            let _ = writeln!(
                output,
                "- {} quizzes, average {:.2}, best {:.2}, lowest {:.2}, improvement {:+.2}%",
                metrics.total_quizzes,
                metrics.average_score,
                metrics.highest_score,
                metrics.lowest_score,
                metrics.improvement_rate
            );
        }
        Section::Error { error } => {
            let _ = writeln!(output, "- unavailable: {error}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Engagement");
    match &analysis.engagement {
        Section::Value(metrics) => {
            let _ = writeln!(
                output,
                "- {} sessions, {} minutes total, {:.2} minutes per session, consistency {:.2}/100",
                metrics.total_sessions,
                metrics.total_study_time,
                metrics.average_session_duration,
                metrics.consistency_score
            );
        }
        Section::Error { error } => {
            let _ = writeln!(output, "- unavailable: {error}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Study Patterns");
    match &analysis.study_patterns {
        Section::Value(patterns) => {
            let _ = writeln!(
                output,
                "- Most studied: {} ({} of {} minutes)",
                patterns.most_studied_subject,
                patterns.most_studied_minutes,
                patterns.total_time_minutes
            );
            for (subject, minutes) in &patterns.subjects_studied {
                let _ = writeln!(output, "- {subject}: {minutes} min");
            }
        }
        Section::Error { error } => {
            let _ = writeln!(output, "- unavailable: {error}");
        }
    }
    if let Section::Value(averages) = &analysis.subject_performance {
        if !averages.is_empty() {
            let _ = writeln!(output);
            let _ = writeln!(output, "| Topic | Average |");
            let _ = writeln!(output, "|---|---|");
            for (topic, average) in averages {
                let _ = writeln!(output, "| {topic} | {average:.2} |");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Learning Gaps");
    match &analysis.learning_gaps {
        Section::Value(gaps) if gaps.is_empty() => {
            let _ = writeln!(output, "No learning gaps below the threshold.");
        }
        Section::Value(gaps) => {
            for gap in gaps {
                let _ = writeln!(
                    output,
                    "- {} ({} severity): average {:.2} over {} attempts",
                    gap.topic, gap.severity, gap.average_score, gap.attempt_count
                );
            }
        }
        Section::Error { error } => {
            let _ = writeln!(output, "- unavailable: {error}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Insights");
    match &analysis.insights {
        Section::Value(insights) => {
            for insight in insights {
                let _ = writeln!(output, "- {insight}");
            }
        }
        Section::Error { error } => {
            let _ = writeln!(output, "- unavailable: {error}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Trends");
    let weekly = trend::trend(&trend::weekly_study_minutes(&history.study_sessions)).ok();
    if analysis.score_trend.is_none() && weekly.is_none() {
        let _ = writeln!(output, "Not enough history for trends yet.");
    }
    if let Some(scores) = &analysis.score_trend {
        let _ = writeln!(output, "{}", trend_line("Quiz scores", scores));
    }
    if let Some(weekly) = &weekly {
        let _ = writeln!(output, "{}", trend_line("Weekly study minutes", weekly));
    }
}

pub fn build_report(
    profile: &StudentProfile,
    history: &StudentHistory,
    result: &PipelineResult,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Study Coach Report");
    let _ = writeln!(
        output,
        "Prepared for {} (session {})",
        profile.name, result.session_id
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Study Plan");
    let _ = writeln!(output, "Source: {}", stage_note(&result.plan));
    if let Some(plan) = result.plan.value() {
        for day in &plan.days {
            let focus = day.focus.lines().next().unwrap_or_default();
            let _ = writeln!(
                output,
                "- Day {} ({}): {} [{} min]",
                day.day, day.date, focus, day.minutes
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Quiz");
    let _ = writeln!(output, "Source: {}", stage_note(&result.quiz));
    if let Some(quiz) = result.quiz.value() {
        let _ = writeln!(output, "Topic: {} ({} difficulty)", quiz.topic, quiz.difficulty);
        for question in &quiz.questions {
            let _ = writeln!(output, "{}. {}", question.id, question.question);
            for option in &question.options {
                let _ = writeln!(output, "   - {option}");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Resources");
    match &result.resources {
        StageOutcome::Failed { error } => {
            let _ = writeln!(output, "Resource lookup failed: {error}");
        }
        outcome => {
            if let Some(set) = outcome.value() {
                if set.resources.is_empty() {
                    let _ = writeln!(output, "No resources found for {}.", set.topic);
                }
                for resource in &set.resources {
                    let _ = writeln!(
                        output,
                        "- [{}] {} ({}) {}",
                        resource.kind, resource.title, resource.source, resource.url
                    );
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Progress");
    match &result.progress_analysis {
        StageOutcome::Failed { error } => {
            let _ = writeln!(output, "Progress analysis failed: {error}");
        }
        outcome => {
            if let Some(analysis) = outcome.value() {
                write_analysis(&mut output, analysis, history);
            }
        }
    }

    output
}
