use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use study_coach::capabilities::{SessionStore, TextGenerator};
use study_coach::config::CoachConfig;
use study_coach::gemini::{GeminiGenerator, OfflineGenerator};
use study_coach::import::{self, MaterialFile};
use study_coach::models::{StudentHistory, StudentProfile};
use study_coach::resources::StaticCatalog;
use study_coach::store::MemorySessionStore;
use study_coach::{coordinator, db, gaps, insights, metrics, report, trend, AgentCoordinator};
use tracing::info;

#[derive(Parser)]
#[command(name = "study-coach")]
#[command(about = "Study planning and progress analytics for Group Scholar students", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config (defaults to ./study-coach.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the session registry schema
    InitDb,
    /// Compute performance, engagement, gaps, and insights from records
    Analyze {
        #[arg(long)]
        quizzes: PathBuf,
        #[arg(long)]
        sessions: Option<PathBuf>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the direction of quiz scores (or weekly study minutes) over time
    Trend {
        #[arg(long, required_unless_present = "sessions")]
        quizzes: Option<PathBuf>,
        #[arg(long)]
        topic: Option<String>,
        /// Study sessions CSV; reports weekly study minutes instead of scores
        #[arg(long, conflicts_with = "quizzes")]
        sessions: Option<PathBuf>,
    },
    /// Run the full plan, quiz, resources, and progress pipeline
    Run {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "student")]
        user_id: String,
        #[arg(long)]
        grade: Option<u8>,
        /// Comma-separated subjects
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,
        /// Comma-separated weak topics
        #[arg(long, value_delimiter = ',')]
        weak_topics: Vec<String>,
        #[arg(long)]
        hours: Option<f64>,
        #[arg(long)]
        quizzes: Option<PathBuf>,
        #[arg(long)]
        sessions: Option<PathBuf>,
        /// Text file with study material for quiz generation
        #[arg(long)]
        material: Option<PathBuf>,
        /// Record sessions in Postgres (requires DATABASE_URL)
        #[arg(long)]
        persist: bool,
        #[arg(long, default_value = "study-report.md")]
        out: PathBuf,
    },
}

fn load_history(
    quizzes: Option<&PathBuf>,
    sessions: Option<&PathBuf>,
) -> anyhow::Result<StudentHistory> {
    let quiz_attempts = match quizzes {
        Some(path) => import::read_quiz_attempts(path)?,
        None => Vec::new(),
    };
    let study_sessions = match sessions {
        Some(path) => import::read_study_sessions(path)?,
        None => Vec::new(),
    };
    Ok(StudentHistory {
        quiz_attempts,
        study_sessions,
    })
}

fn database_url() -> anyhow::Result<String> {
    std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let config = CoachConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::InitDb => {
            let pool = db::connect(&database_url()?).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Analyze {
            quizzes,
            sessions,
            json,
        } => {
            let history = load_history(Some(&quizzes), sessions.as_ref())?;
            if json {
                let analysis = coordinator::analyze_progress(&history, "", &config);
                println!("{}", serde_json::to_string_pretty(&analysis)?);
                return Ok(());
            }

            let performance = metrics::performance_metrics(&history.quiz_attempts)?;
            let engagement = metrics::engagement_metrics(&history.study_sessions);
            let learning_gaps = gaps::identify_gaps(&history.quiz_attempts, &config.gaps)?;

            println!(
                "Average score {:.2} over {} quizzes (best {:.2}, lowest {:.2}, improvement {:+.2}%)",
                performance.average_score,
                performance.total_quizzes,
                performance.highest_score,
                performance.lowest_score,
                performance.improvement_rate
            );
            println!(
                "{} sessions, {} minutes, consistency {:.2}/100",
                engagement.total_sessions, engagement.total_study_time, engagement.consistency_score
            );

            if learning_gaps.is_empty() {
                println!("No learning gaps found.");
            } else {
                println!("Learning gaps:");
                for gap in &learning_gaps {
                    println!(
                        "- {} ({}) average {:.2} across {} attempts",
                        gap.topic, gap.severity, gap.average_score, gap.attempt_count
                    );
                }
            }

            let patterns = metrics::study_patterns(&history.study_sessions).ok();
            if let Some(patterns) = &patterns {
                println!(
                    "Most studied: {} ({} of {} minutes)",
                    patterns.most_studied_subject,
                    patterns.most_studied_minutes,
                    patterns.total_time_minutes
                );
            }
            let subject_performance = metrics::subject_performance(&history.quiz_attempts)?;
            for (topic, average) in &subject_performance {
                println!("  {topic}: {average:.2}");
            }

            let mut lines =
                insights::generate(&performance, &engagement, &learning_gaps, &config.insights);
            lines.extend(insights::study_habits(
                patterns.as_ref(),
                Some(&subject_performance),
                &config.insights,
            ));
            for insight in lines {
                println!("* {insight}");
            }
        }
        Commands::Trend {
            quizzes,
            topic,
            sessions,
        } => {
            let (label, series) = match (quizzes, sessions) {
                (_, Some(path)) => (
                    "Weekly study minutes".to_string(),
                    trend::weekly_study_minutes(&import::read_study_sessions(&path)?),
                ),
                (Some(path), None) => (
                    topic.clone().unwrap_or_else(|| "All topics".to_string()),
                    trend::score_series(&import::read_quiz_attempts(&path)?, topic.as_deref()),
                ),
                (None, None) => anyhow::bail!("pass --quizzes or --sessions"),
            };
            let result = trend::trend(&series)?;
            println!(
                "{} {}: change {:.2} ({:+.2}%) across {} samples",
                label,
                result.direction,
                result.absolute_change,
                result.percent_change,
                result.sample_count
            );
        }
        Commands::Run {
            name,
            user_id,
            grade,
            subjects,
            weak_topics,
            hours,
            quizzes,
            sessions,
            material,
            persist,
            out,
        } => {
            let history = load_history(quizzes.as_ref(), sessions.as_ref())?;
            let profile = StudentProfile {
                user_id,
                name,
                grade,
                subjects,
                weak_topics,
                study_hours_per_day: hours,
            };

            let generator: Arc<dyn TextGenerator> = match GeminiGenerator::from_env(&config.gemini) {
                Some(gemini) => Arc::new(gemini),
                None => {
                    info!(
                        env = %config.gemini.api_key_env,
                        "no API key set, using offline generator"
                    );
                    Arc::new(OfflineGenerator)
                }
            };
            let store: Arc<dyn SessionStore> = if persist {
                let pool = db::connect(&database_url()?).await?;
                Arc::new(db::PgSessionStore::new(pool))
            } else {
                Arc::new(MemorySessionStore::new())
            };

            let mut coach =
                AgentCoordinator::new(generator, Arc::new(StaticCatalog), store, config);
            if let Some(path) = material {
                coach = coach.with_material(Arc::new(MaterialFile::new(path)));
            }

            let result = coach.run(&profile, &history).await?;
            let markdown = report::build_report(&profile, &history, &result);
            std::fs::write(&out, markdown)?;
            println!(
                "Session {}: plan {}, quiz {}, resources {}, analysis {}.",
                result.session_id,
                result.plan.label(),
                result.quiz.label(),
                result.resources.label(),
                result.progress_analysis.label()
            );
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
