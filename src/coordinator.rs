//! Study pipeline: plan, then quiz, then resources and progress analytics side by side.
//!
//! Planning and quizzing degrade to rule-based output when generation keeps
//! failing. The two fan-out branches never share state; each reports its own
//! failure in its slot of the result. The only error `run` returns is a
//! session registry failure.

use std::future::Future;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::capabilities::{LookupConstraints, ResourceLookup, SessionStore, TextGenerator, TextSupplier};
use crate::config::{CoachConfig, FallbackStrategy};
use crate::error::{CoachError, CoachResult};
use crate::models::{
    Difficulty, PipelineResult, ProgressAnalysis, Quiz, ResourceSet, Section, Stage,
    StageOutcome, StudentHistory, StudentProfile, StudyPlan,
};
use crate::retry::RetryableCaller;
use crate::{gaps, insights, metrics, planner, quiz, resources, trend};

pub const CANCELLED: &str = "cancelled";

/// Per-invocation state handed to every stage.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub session_id: String,
    pub user_id: String,
    pub started_on: NaiveDate,
}

pub struct AgentCoordinator {
    generator: Arc<dyn TextGenerator>,
    lookup: Arc<dyn ResourceLookup>,
    sessions: Arc<dyn SessionStore>,
    material: Option<Arc<dyn TextSupplier>>,
    retry: RetryableCaller,
    config: CoachConfig,
}

fn cancelled<T>() -> StageOutcome<T> {
    StageOutcome::Failed {
        error: CANCELLED.to_string(),
    }
}

async fn unless_cancelled<T>(
    cancel: &CancellationToken,
    stage: impl Future<Output = StageOutcome<T>>,
) -> StageOutcome<T> {
    if cancel.is_cancelled() {
        return cancelled();
    }
    tokio::select! {
        biased;
        outcome = stage => outcome,
        _ = cancel.cancelled() => cancelled(),
    }
}

fn was_cancelled<T>(outcome: &StageOutcome<T>) -> bool {
    matches!(outcome, StageOutcome::Failed { error } if error == CANCELLED)
}

/// `Failed` only when cancellation cost a stage its output.
fn terminal_stage(cancelled_slots: &[bool]) -> Stage {
    if cancelled_slots.contains(&true) {
        Stage::Failed
    } else {
        Stage::Done
    }
}

/// Metrics, then gaps, then insights. Each step's failure stays in its own section.
pub fn analyze_progress(
    history: &StudentHistory,
    focus_topic: &str,
    config: &CoachConfig,
) -> ProgressAnalysis {
    let performance = metrics::performance_metrics(&history.quiz_attempts);
    let engagement = metrics::engagement_metrics(&history.study_sessions);
    let learning_gaps = gaps::identify_gaps(&history.quiz_attempts, &config.gaps);

    let study_patterns = metrics::study_patterns(&history.study_sessions);
    let subject_performance = metrics::subject_performance(&history.quiz_attempts);

    let insights = match (&performance, &learning_gaps) {
        (Ok(performance), Ok(learning_gaps)) => {
            let mut lines =
                insights::generate(performance, &engagement, learning_gaps, &config.insights);
            lines.extend(insights::study_habits(
                study_patterns.as_ref().ok(),
                subject_performance.as_ref().ok(),
                &config.insights,
            ));
            Section::Value(lines)
        }
        (Err(err), _) | (_, Err(err)) => Section::Error {
            error: format!("insights unavailable: {err}"),
        },
    };

    let score_trend = trend::trend(&trend::score_series(&history.quiz_attempts, None)).ok();
    let focus_is_gap = learning_gaps.as_ref().is_ok_and(|found| {
        found
            .iter()
            .any(|gap| gap.topic.eq_ignore_ascii_case(focus_topic))
    });

    ProgressAnalysis {
        performance: performance.into(),
        engagement: Section::Value(engagement),
        study_patterns: study_patterns.into(),
        subject_performance: subject_performance.into(),
        learning_gaps: learning_gaps.into(),
        insights,
        score_trend,
        focus_topic: focus_topic.to_string(),
        focus_is_gap,
    }
}

impl AgentCoordinator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        lookup: Arc<dyn ResourceLookup>,
        sessions: Arc<dyn SessionStore>,
        config: CoachConfig,
    ) -> Self {
        Self {
            generator,
            lookup,
            sessions,
            material: None,
            retry: RetryableCaller::from_settings(&config.retry),
            config,
        }
    }

    pub fn with_material(mut self, material: Arc<dyn TextSupplier>) -> Self {
        self.material = Some(material);
        self
    }

    pub async fn run(
        &self,
        profile: &StudentProfile,
        history: &StudentHistory,
    ) -> CoachResult<PipelineResult> {
        self.run_with_cancel(profile, history, CancellationToken::new())
            .await
    }

    /// Cancelling stops stages that have not finished; finished stages keep
    /// their output and the rest report "cancelled".
    pub async fn run_with_cancel(
        &self,
        profile: &StudentProfile,
        history: &StudentHistory,
        cancel: CancellationToken,
    ) -> CoachResult<PipelineResult> {
        let session_id = self
            .sessions
            .create(
                &profile.user_id,
                json!({
                    "name": profile.name,
                    "subjects": profile.subjects,
                    "status": "running",
                }),
            )
            .await?;

        let ctx = PipelineContext {
            session_id,
            user_id: profile.user_id.clone(),
            started_on: Utc::now().date_naive(),
        };
        let span = info_span!("pipeline", session_id = %ctx.session_id, user_id = %ctx.user_id);

        async {
            let result = self.execute(&ctx, profile, history, &cancel).await;
            self.record(&ctx, &result).await?;
            Ok::<_, CoachError>(result)
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        ctx: &PipelineContext,
        profile: &StudentProfile,
        history: &StudentHistory,
        cancel: &CancellationToken,
    ) -> PipelineResult {
        let mut transitions = vec![Stage::Planning];
        let plan = unless_cancelled(cancel, self.plan_stage(ctx, profile)).await;
        info!(outcome = plan.label(), "planning finished");

        transitions.push(Stage::Quizzing);
        let quiz = unless_cancelled(cancel, self.quiz_stage(profile, history, plan.value())).await;
        info!(outcome = quiz.label(), "quizzing finished");

        let (topic, difficulty) = match quiz.value() {
            Some(quiz) => (quiz.topic.clone(), quiz.difficulty),
            None => (
                quiz::quiz_topic(profile),
                quiz::difficulty_for(&history.quiz_attempts),
            ),
        };

        transitions.push(Stage::Resourcing);
        transitions.push(Stage::Analyzing);
        let (resources, progress_analysis) = tokio::join!(
            unless_cancelled(cancel, self.resource_stage(&topic, difficulty)),
            unless_cancelled(cancel, self.analysis_stage(history, &topic)),
        );
        info!(
            resources = resources.label(),
            analysis = progress_analysis.label(),
            "fan-out finished"
        );

        transitions.push(terminal_stage(&[
            was_cancelled(&plan),
            was_cancelled(&quiz),
            was_cancelled(&resources),
            was_cancelled(&progress_analysis),
        ]));

        PipelineResult {
            session_id: ctx.session_id.clone(),
            plan,
            quiz,
            resources,
            progress_analysis,
            transitions,
        }
    }

    fn fallback<T>(&self, stage: &str, err: CoachError, build: impl FnOnce() -> T) -> StageOutcome<T> {
        match self.config.fallback {
            FallbackStrategy::RuleBased => {
                warn!(stage, error = %err, "generation failed, using rule-based fallback");
                StageOutcome::Fallback {
                    value: build(),
                    reason: err.to_string(),
                }
            }
            FallbackStrategy::Disabled => {
                error!(stage, error = %err, "generation failed");
                StageOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn plan_stage(
        &self,
        ctx: &PipelineContext,
        profile: &StudentProfile,
    ) -> StageOutcome<StudyPlan> {
        let settings = &self.config.planner;
        let prompt = planner::plan_prompt(profile, settings);

        let generated = self
            .retry
            .call("plan", || self.generator.generate(&prompt))
            .await
            .and_then(|text| planner::parse_plan(&text, profile, ctx.started_on, settings));

        match generated {
            Ok(plan) => StageOutcome::Generated(plan),
            Err(err) => self.fallback("planning", err, || {
                planner::fallback_plan(profile, ctx.started_on, settings)
            }),
        }
    }

    async fn study_material(&self, topic: &str) -> Option<String> {
        let supplier = self.material.as_ref()?;
        match supplier.text().await {
            Ok(text) => {
                let section = quiz::relevant_section(&text, topic, &self.config.quiz);
                debug!(chars = section.len(), "using study material");
                Some(section)
            }
            Err(err) => {
                warn!(error = %err, "study material unavailable");
                None
            }
        }
    }

    async fn quiz_stage(
        &self,
        profile: &StudentProfile,
        history: &StudentHistory,
        plan: Option<&StudyPlan>,
    ) -> StageOutcome<Quiz> {
        let settings = &self.config.quiz;
        let topic = quiz::quiz_topic(profile);
        let difficulty = quiz::difficulty_for(&history.quiz_attempts);
        let material = self.study_material(&topic).await;
        let prompt = quiz::quiz_prompt(&topic, difficulty, plan, material.as_deref(), settings);

        let generated = self
            .retry
            .call("quiz", || self.generator.generate(&prompt))
            .await
            .and_then(|text| quiz::parse_questions(&text, settings));

        match generated {
            Ok(questions) => StageOutcome::Generated(Quiz {
                topic,
                difficulty,
                questions,
            }),
            Err(err) => self.fallback("quizzing", err, || {
                quiz::placeholder_quiz(&topic, difficulty)
            }),
        }
    }

    async fn resource_stage(&self, topic: &str, difficulty: Difficulty) -> StageOutcome<ResourceSet> {
        let constraints = LookupConstraints {
            level: difficulty.into(),
            kinds: self.config.resources.kinds.clone(),
        };

        match self.lookup.find(topic, &constraints).await {
            Ok(found) => StageOutcome::Generated(resources::curate(
                topic,
                found,
                &constraints,
                self.config.resources.per_kind_limit,
            )),
            Err(err) => {
                error!(topic, error = %err, "resource lookup failed");
                StageOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn analysis_stage(&self, history: &StudentHistory, topic: &str) -> StageOutcome<ProgressAnalysis> {
        let history = history.clone();
        let topic = topic.to_string();
        let config = self.config.clone();

        match tokio::task::spawn_blocking(move || analyze_progress(&history, &topic, &config)).await {
            Ok(analysis) => StageOutcome::Generated(analysis),
            Err(err) => {
                error!(error = %err, "progress analysis aborted");
                StageOutcome::Failed {
                    error: format!("progress analysis aborted: {err}"),
                }
            }
        }
    }

    async fn record(&self, ctx: &PipelineContext, result: &PipelineResult) -> CoachResult<()> {
        let status = if result.transitions.last() == Some(&Stage::Done) {
            "done"
        } else {
            "failed"
        };
        let snapshot = serde_json::to_value(result)
            .map_err(|err| CoachError::Validation(format!("unserializable result: {err}")))?;

        let updated = self
            .sessions
            .update(&ctx.session_id, json!({ "status": status, "result": snapshot }))
            .await?;
        if !updated {
            warn!("session disappeared before the result was recorded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::SessionRecord;
    use crate::gemini::OfflineGenerator;
    use crate::models::{QuizAttempt, Resource, Severity, StudySession};
    use crate::resources::StaticCatalog;
    use crate::store::MemorySessionStore;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct AlwaysFails {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for AlwaysFails {
        async fn generate(&self, _prompt: &str) -> CoachResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CoachError::ExternalCall("model unavailable".into()))
        }
    }

    #[derive(Default)]
    struct Recording {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for Recording {
        async fn generate(&self, prompt: &str) -> CoachResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            OfflineGenerator.generate(prompt).await
        }
    }

    struct BrokenLookup;

    #[async_trait]
    impl ResourceLookup for BrokenLookup {
        async fn find(&self, _topic: &str, _c: &LookupConstraints) -> CoachResult<Vec<Resource>> {
            Err(CoachError::ExternalCall("search offline".into()))
        }
    }

    struct StuckLookup;

    #[async_trait]
    impl ResourceLookup for StuckLookup {
        async fn find(&self, _topic: &str, _c: &LookupConstraints) -> CoachResult<Vec<Resource>> {
            std::future::pending().await
        }
    }

    /// Returns the catalog after analysis has had time to finish, cancelling on the way out.
    struct CancelsOnReturn {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl ResourceLookup for CancelsOnReturn {
        async fn find(&self, topic: &str, c: &LookupConstraints) -> CoachResult<Vec<Resource>> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let found = StaticCatalog.find(topic, c).await;
            self.cancel.cancel();
            found
        }
    }

    struct Textbook;

    #[async_trait]
    impl TextSupplier for Textbook {
        async fn text(&self) -> CoachResult<String> {
            Ok("Preface\nThermodynamics deals with heat and work.\nIndex".into())
        }
    }

    struct RegistryDown;

    #[async_trait]
    impl SessionStore for RegistryDown {
        async fn create(&self, _user_id: &str, _data: Value) -> CoachResult<String> {
            Err(CoachError::Registry("connection refused".into()))
        }

        async fn get(&self, _session_id: &str) -> CoachResult<Option<SessionRecord>> {
            Err(CoachError::Registry("connection refused".into()))
        }

        async fn update(&self, _session_id: &str, _partial: Value) -> CoachResult<bool> {
            Err(CoachError::Registry("connection refused".into()))
        }
    }

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn profile() -> StudentProfile {
        StudentProfile {
            user_id: "student-7".into(),
            name: "Rural Student".into(),
            grade: Some(10),
            subjects: vec!["Physics".into(), "Chemistry".into(), "Math".into()],
            weak_topics: vec!["Thermodynamics".into()],
            study_hours_per_day: Some(2.0),
        }
    }

    fn history() -> StudentHistory {
        let attempt = |topic: &str, score: f64, day: u32| QuizAttempt {
            topic: topic.into(),
            score,
            date: at(day),
        };
        StudentHistory {
            quiz_attempts: vec![
                attempt("Physics", 45.0, 15),
                attempt("Math", 78.0, 16),
                attempt("Physics", 52.0, 18),
                attempt("Chemistry", 88.0, 20),
                attempt("Math", 85.0, 22),
            ],
            study_sessions: vec![
                StudySession {
                    subject: "Physics".into(),
                    duration_minutes: 45,
                    date: at(15),
                },
                StudySession {
                    subject: "Math".into(),
                    duration_minutes: 60,
                    date: at(16),
                },
            ],
        }
    }

    fn coordinator(
        generator: Arc<dyn TextGenerator>,
        lookup: Arc<dyn ResourceLookup>,
        store: Arc<dyn SessionStore>,
        config: CoachConfig,
    ) -> AgentCoordinator {
        AgentCoordinator::new(generator, lookup, store, config)
    }

    #[tokio::test]
    async fn happy_path_generates_every_stage() {
        let store = Arc::new(MemorySessionStore::new());
        let coach = coordinator(
            Arc::new(OfflineGenerator),
            Arc::new(StaticCatalog),
            store.clone(),
            CoachConfig::default(),
        );

        let result = coach.run(&profile(), &history()).await.unwrap();

        assert!(matches!(result.plan, StageOutcome::Generated(ref plan) if plan.days.len() == 7));
        let quiz = match &result.quiz {
            StageOutcome::Generated(quiz) => quiz,
            other => panic!("unexpected quiz outcome {other:?}"),
        };
        assert_eq!(quiz.topic, "Thermodynamics");
        assert_eq!(quiz.difficulty, Difficulty::Medium);
        assert_eq!(quiz.questions.len(), 2);

        let resources = result.resources.value().unwrap();
        assert_eq!(resources.topic, "Thermodynamics");
        assert_eq!(resources.total_found, 6);

        let analysis = result.progress_analysis.value().unwrap();
        let gaps = analysis.learning_gaps.value().unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].topic, "Physics");
        assert_eq!(gaps[0].severity, Severity::Medium);
        assert_eq!(analysis.performance.value().unwrap().average_score, 69.6);
        assert!(!analysis.insights.value().unwrap().is_empty());
        assert!(!analysis.focus_is_gap);

        assert_eq!(
            result.transitions,
            vec![
                Stage::Planning,
                Stage::Quizzing,
                Stage::Resourcing,
                Stage::Analyzing,
                Stage::Done
            ]
        );

        let record = store.get(&result.session_id).await.unwrap().unwrap();
        assert_eq!(record.user_id, "student-7");
        assert_eq!(record.data["status"], "done");
        assert_eq!(record.data["result"]["plan"]["status"], "generated");
    }

    #[tokio::test(start_paused = true)]
    async fn failing_generator_falls_back_and_branches_still_run() {
        let generator = Arc::new(AlwaysFails {
            calls: AtomicUsize::new(0),
        });
        let coach = coordinator(
            generator.clone(),
            Arc::new(StaticCatalog),
            Arc::new(MemorySessionStore::new()),
            CoachConfig::default(),
        );

        let result = coach.run(&profile(), &history()).await.unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 6);
        match &result.plan {
            StageOutcome::Fallback { value, reason } => {
                let focus: Vec<&str> = value.days.iter().map(|d| d.focus.as_str()).collect();
                assert_eq!(
                    focus,
                    vec!["Physics", "Chemistry", "Math", "Physics", "Chemistry", "Math", "Physics"]
                );
                assert!(reason.contains("model unavailable"));
            }
            other => panic!("expected fallback plan, got {other:?}"),
        }
        match &result.quiz {
            StageOutcome::Fallback { value, .. } => {
                assert_eq!(value.questions.len(), 1);
                assert_eq!(value.topic, "Thermodynamics");
            }
            other => panic!("expected placeholder quiz, got {other:?}"),
        }
        assert!(matches!(result.resources, StageOutcome::Generated(_)));
        assert!(matches!(result.progress_analysis, StageOutcome::Generated(_)));
        assert_eq!(result.transitions.last(), Some(&Stage::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_fallback_reports_failures_but_keeps_going() {
        let config = CoachConfig {
            fallback: FallbackStrategy::Disabled,
            ..CoachConfig::default()
        };
        let coach = coordinator(
            Arc::new(AlwaysFails {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(StaticCatalog),
            Arc::new(MemorySessionStore::new()),
            config,
        );

        let result = coach.run(&profile(), &history()).await.unwrap();

        assert!(result.plan.is_failed());
        assert!(result.quiz.is_failed());
        assert_eq!(result.resources.value().unwrap().topic, "Thermodynamics");
        assert!(result.progress_analysis.value().is_some());
    }

    #[tokio::test]
    async fn failed_lookup_does_not_touch_analysis() {
        let coach = coordinator(
            Arc::new(OfflineGenerator),
            Arc::new(BrokenLookup),
            Arc::new(MemorySessionStore::new()),
            CoachConfig::default(),
        );

        let result = coach.run(&profile(), &history()).await.unwrap();

        match &result.resources {
            StageOutcome::Failed { error } => assert!(error.contains("search offline")),
            other => panic!("expected failed resources, got {other:?}"),
        }
        let analysis = result.progress_analysis.value().unwrap();
        assert!(analysis.performance.value().is_some());
        assert_eq!(result.transitions.last(), Some(&Stage::Done));
    }

    #[tokio::test]
    async fn invalid_history_is_reported_per_section() {
        let mut bad = history();
        bad.quiz_attempts[0].score = 140.0;
        let coach = coordinator(
            Arc::new(OfflineGenerator),
            Arc::new(StaticCatalog),
            Arc::new(MemorySessionStore::new()),
            CoachConfig::default(),
        );

        let result = coach.run(&profile(), &bad).await.unwrap();

        let analysis = result.progress_analysis.value().unwrap();
        assert!(matches!(analysis.performance, Section::Error { .. }));
        assert!(matches!(analysis.learning_gaps, Section::Error { .. }));
        assert!(matches!(analysis.insights, Section::Error { .. }));
        assert_eq!(analysis.engagement.value().unwrap().total_sessions, 2);
        assert!(result.resources.value().is_some());
    }

    #[tokio::test]
    async fn registry_outage_fails_the_run() {
        let coach = coordinator(
            Arc::new(OfflineGenerator),
            Arc::new(StaticCatalog),
            Arc::new(RegistryDown),
            CoachConfig::default(),
        );

        let result = coach.run(&profile(), &history()).await;
        assert!(matches!(result, Err(CoachError::Registry(_))));
    }

    #[tokio::test]
    async fn cancelling_during_fan_out_keeps_finished_branch() {
        let store = Arc::new(MemorySessionStore::new());
        let coach = coordinator(
            Arc::new(OfflineGenerator),
            Arc::new(StuckLookup),
            store.clone(),
            CoachConfig::default(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let result = coach
            .run_with_cancel(&profile(), &history(), cancel)
            .await
            .unwrap();

        assert!(matches!(result.plan, StageOutcome::Generated(_)));
        match &result.resources {
            StageOutcome::Failed { error } => assert_eq!(error, CANCELLED),
            other => panic!("expected cancelled resources, got {other:?}"),
        }
        assert!(matches!(result.progress_analysis, StageOutcome::Generated(_)));
        assert_eq!(result.transitions.last(), Some(&Stage::Failed));

        let record = store.get(&result.session_id).await.unwrap().unwrap();
        assert_eq!(record.data["status"], "failed");
    }

    #[tokio::test]
    async fn cancelled_before_start_still_returns_a_result() {
        let coach = coordinator(
            Arc::new(OfflineGenerator),
            Arc::new(StaticCatalog),
            Arc::new(MemorySessionStore::new()),
            CoachConfig::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = coach
            .run_with_cancel(&profile(), &history(), cancel)
            .await
            .unwrap();

        assert!(result.plan.is_failed());
        assert!(result.quiz.is_failed());
        assert!(result.resources.is_failed());
        assert!(result.progress_analysis.is_failed());
        assert_eq!(result.transitions.last(), Some(&Stage::Failed));
    }

    #[tokio::test]
    async fn quiz_prompt_carries_plan_and_material() {
        let generator = Arc::new(Recording::default());
        let coach = coordinator(
            generator.clone(),
            Arc::new(StaticCatalog),
            Arc::new(MemorySessionStore::new()),
            CoachConfig::default(),
        )
        .with_material(Arc::new(Textbook));

        coach.run(&profile(), &history()).await.unwrap();

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("study schedule"));
        assert!(prompts[1].contains("Day 1: Day 1 | Foundations"));
        assert!(prompts[1].contains("Thermodynamics deals with heat and work."));
        assert!(!prompts[1].contains("Preface"));
    }

    #[tokio::test]
    async fn concurrent_runs_get_separate_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let coach = coordinator(
            Arc::new(OfflineGenerator),
            Arc::new(StaticCatalog),
            store.clone(),
            CoachConfig::default(),
        );
        let first = profile();
        let mut other = profile();
        other.user_id = "student-8".into();
        let history = history();

        let (a, b) = tokio::join!(coach.run(&first, &history), coach.run(&other, &history));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.session_id, b.session_id);
        assert_eq!(store.len().await, 2);
        assert_eq!(a.progress_analysis, b.progress_analysis);
    }

    #[test]
    fn analysis_flags_focus_topic_gaps() {
        let analysis = analyze_progress(&history(), "physics", &CoachConfig::default());
        assert!(analysis.focus_is_gap);
        let trend = analysis.score_trend.unwrap();
        assert_eq!(trend.sample_count, 5);
        assert_eq!(trend.absolute_change, 40.0);
    }

    #[test]
    fn analysis_of_empty_history_is_neutral() {
        let analysis = analyze_progress(&StudentHistory::default(), "Math", &CoachConfig::default());
        assert_eq!(analysis.performance.value().unwrap().total_quizzes, 0);
        assert!(analysis.learning_gaps.value().unwrap().is_empty());
        assert!(analysis.score_trend.is_none());
        let insights = analysis.insights.value().unwrap();
        assert_eq!(insights[0], "Performance needs attention. Average score: 0%");
        assert_eq!(
            insights.last().unwrap(),
            "No major learning gaps identified. Keep up the good work!"
        );
    }

    #[test]
    fn terminal_stage_follows_cancelled_slots() {
        let finished: StageOutcome<u8> = StageOutcome::Generated(1);
        let fallback: StageOutcome<u8> = StageOutcome::Fallback {
            value: 1,
            reason: "model unavailable".into(),
        };
        let broken: StageOutcome<u8> = StageOutcome::Failed {
            error: "search offline".into(),
        };
        let stopped: StageOutcome<u8> = cancelled();

        assert!(!was_cancelled(&finished));
        assert!(!was_cancelled(&fallback));
        assert!(!was_cancelled(&broken));
        assert!(was_cancelled(&stopped));

        assert_eq!(terminal_stage(&[false, false, false, false]), Stage::Done);
        assert_eq!(
            terminal_stage(&[was_cancelled(&finished), was_cancelled(&broken)]),
            Stage::Done
        );
        assert_eq!(terminal_stage(&[false, false, true, false]), Stage::Failed);
    }

    #[tokio::test]
    async fn cancel_after_both_branches_finish_is_done() {
        let cancel = CancellationToken::new();
        let store = Arc::new(MemorySessionStore::new());
        let coach = coordinator(
            Arc::new(OfflineGenerator),
            Arc::new(CancelsOnReturn {
                cancel: cancel.clone(),
            }),
            store.clone(),
            CoachConfig::default(),
        );

        let result = coach
            .run_with_cancel(&profile(), &history(), cancel.clone())
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
        assert!(matches!(result.resources, StageOutcome::Generated(_)));
        assert!(matches!(result.progress_analysis, StageOutcome::Generated(_)));
        assert_eq!(result.transitions.last(), Some(&Stage::Done));
        let record = store.get(&result.session_id).await.unwrap().unwrap();
        assert_eq!(record.data["status"], "done");
    }

    #[test]
    fn analysis_reports_study_patterns_and_subject_averages() {
        let analysis = analyze_progress(&history(), "Physics", &CoachConfig::default());

        let patterns = analysis.study_patterns.value().unwrap();
        assert_eq!(patterns.total_time_minutes, 105);
        assert_eq!(patterns.most_studied_subject, "Math");
        assert_eq!(patterns.most_studied_minutes, 60);

        let averages = analysis.subject_performance.value().unwrap();
        assert_eq!(averages["Physics"], 48.5);
        assert_eq!(averages["Math"], 81.5);
        assert_eq!(averages["Chemistry"], 88.0);

        let insights = analysis.insights.value().unwrap();
        assert_eq!(insights.last().unwrap(), "Need improvement in: Physics");
    }

    #[test]
    fn missing_sessions_only_blank_the_pattern_section() {
        let history = StudentHistory {
            study_sessions: Vec::new(),
            ..history()
        };
        let analysis = analyze_progress(&history, "Physics", &CoachConfig::default());
        assert!(matches!(analysis.study_patterns, Section::Error { .. }));
        assert!(analysis.subject_performance.value().is_some());
        assert!(analysis.insights.value().is_some());
    }
}
