use crate::config::QuizSettings;
use crate::error::{CoachError, CoachResult};
use crate::metrics::performance_metrics;
use crate::models::{Difficulty, QuizAttempt, QuizQuestion, StudentProfile, StudyPlan, Quiz};
use crate::planner::GENERAL_STUDY;

const QUESTION_FIELDS: usize = 6;

/// First weak topic, then first subject.
pub fn quiz_topic(profile: &StudentProfile) -> String {
    profile
        .weak_topics
        .iter()
        .chain(profile.subjects.iter())
        .map(|topic| topic.trim())
        .find(|topic| !topic.is_empty())
        .unwrap_or(GENERAL_STUDY)
        .to_string()
}

/// `fraction` is the student's score on a 0-1 scale.
pub fn adapt_difficulty(fraction: f64) -> Difficulty {
    if fraction < 0.5 {
        Difficulty::Easy
    } else if fraction < 0.75 {
        Difficulty::Medium
    } else {
        Difficulty::Hard
    }
}

pub fn difficulty_for(attempts: &[QuizAttempt]) -> Difficulty {
    match performance_metrics(attempts) {
        Ok(metrics) if metrics.total_quizzes > 0 => adapt_difficulty(metrics.average_score / 100.0),
        _ => Difficulty::Medium,
    }
}

/// Lines of the material that mention the topic, bounded in lines and characters.
pub fn relevant_section(material: &str, topic: &str, settings: &QuizSettings) -> String {
    let needle = topic.to_lowercase();
    let section = material
        .lines()
        .filter(|line| line.to_lowercase().contains(&needle))
        .take(settings.material_line_limit)
        .collect::<Vec<_>>()
        .join("\n");
    section.chars().take(settings.material_char_limit).collect()
}

pub fn quiz_prompt(
    topic: &str,
    difficulty: Difficulty,
    plan: Option<&StudyPlan>,
    material: Option<&str>,
    settings: &QuizSettings,
) -> String {
    let mut prompt = format!("Quiz topic: {topic}\nDifficulty: {difficulty}\n");

    if let Some(plan) = plan {
        let schedule = plan
            .days
            .iter()
            .map(|day| format!("Day {}: {}", day.day, day.focus.lines().next().unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\n");
        prompt.push_str(&format!("\nStudy plan:\n{schedule}\n"));
    }

    if let Some(material) = material.filter(|m| !m.trim().is_empty()) {
        prompt.push_str(&format!("\nBased on this text about {topic}:\n{material}\n"));
    }

    prompt.push_str(&format!(
        "\nGenerate {} multiple-choice quiz questions.\n\
         Format: Question | Option A | Option B | Option C | Option D | Correct Answer\n\
         Make questions progressively harder.",
        settings.num_questions
    ));
    prompt
}

/// Reads pipe-delimited question lines, skipping anything malformed.
pub fn parse_questions(text: &str, settings: &QuizSettings) -> CoachResult<Vec<QuizQuestion>> {
    let questions: Vec<QuizQuestion> = text
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('|').map(str::trim).collect();
            if parts.len() < QUESTION_FIELDS || parts[0].is_empty() {
                return None;
            }
            Some((parts[0], parts[1..5].to_vec(), parts[5]))
        })
        .take(settings.num_questions)
        .zip(1u32..)
        .map(|((question, options, correct), id)| QuizQuestion {
            id,
            question: question.to_string(),
            options: options.into_iter().map(str::to_string).collect(),
            correct: correct.to_string(),
        })
        .collect();

    if questions.is_empty() {
        return Err(CoachError::Parse("quiz response contained no questions".into()));
    }
    Ok(questions)
}

/// Open-ended stand-in used when no generated quiz is available.
pub fn placeholder_quiz(topic: &str, difficulty: Difficulty) -> Quiz {
    Quiz {
        topic: topic.to_string(),
        difficulty,
        questions: vec![QuizQuestion {
            id: 1,
            question: format!("Summarize the key ideas of {topic} in your own words."),
            options: Vec::new(),
            correct: String::new(),
        }],
    }
}
