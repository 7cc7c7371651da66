use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use studybud_rag::core::logging;
use studybud_rag::generation::PlanPreferences;
use studybud_rag::ingest::FileType;
use studybud_rag::pipeline::SourceFile;
use studybud_rag::rag::DocumentType;
use studybud_rag::state::AppState;

#[derive(Parser)]
#[command(name = "studybud-rag", about = "Course material retrieval and study assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, chunk, embed and store uploaded files
    Ingest {
        #[arg(long)]
        course: String,
        /// quiz, assignment, syllabus, resource, textbook, paper, notes or other
        #[arg(long = "type", default_value = "resource")]
        document_type: String,
        /// Overrides the file type derived from the extension
        #[arg(long)]
        file_type: Option<String>,
        /// Paths relative to the uploads directory
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Answer a question from the stored course material
    Ask {
        #[arg(long, default_value = "cli")]
        user: String,
        #[arg(long)]
        course: Option<String>,
        question: String,
    },
    /// Generate a study plan for a course
    Plan {
        #[arg(long, default_value = "cli")]
        user: String,
        #[arg(long)]
        course: String,
        #[arg(long, default_value_t = 10)]
        hours: u32,
        #[arg(long, default_value = "moderate")]
        difficulty: String,
        #[arg(long, default_value = "B+")]
        target_grade: String,
        /// Comma-separated topics to prioritize
        #[arg(long, value_delimiter = ',')]
        priority: Vec<String>,
        query: String,
    },
    /// Send one guarded chat message
    Chat {
        #[arg(long, default_value = "cli")]
        user: String,
        #[arg(long)]
        course: Option<String>,
        message: String,
    },
    /// Print the effective configuration with secrets redacted
    Config,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let state = AppState::initialize().await?;
    logging::init(&state.paths);
    let pipeline = &state.pipeline;

    match cli.command {
        Commands::Ingest {
            course,
            document_type,
            file_type,
            files,
        } => {
            let document_type: DocumentType = document_type.parse()?;
            let uploads: Vec<(SourceFile, DocumentType)> = files
                .into_iter()
                .map(|path| {
                    let file = SourceFile::new(path);
                    let file = match &file_type {
                        Some(declared) => file.with_type(FileType::parse(declared)),
                        None => file,
                    };
                    (file, document_type)
                })
                .collect();
            let reports = pipeline.process_documents(&uploads, &course).await;
            for report in &reports {
                if report.document_id.is_none() {
                    tracing::warn!(errors = ?report.errors, "Upload was not indexed");
                }
            }
            print_json(&reports)
        }
        Commands::Ask {
            user,
            course,
            question,
        } => {
            let answer = pipeline
                .answer_question(&user, &question, course.as_deref())
                .await
                .context("Question answering failed")?;
            print_json(&answer)
        }
        Commands::Plan {
            user,
            course,
            hours,
            difficulty,
            target_grade,
            priority,
            query,
        } => {
            let preferences = PlanPreferences {
                study_hours: hours,
                difficulty,
                target_grade,
                priority_topics: priority,
            };
            let plan = pipeline
                .generate_study_plan(&user, &course, &query, &preferences)
                .await;
            print_json(&plan)
        }
        Commands::Chat {
            user,
            course,
            message,
        } => {
            let turn = pipeline.chat_turn(&user, &message, course.as_deref()).await;
            print_json(&turn)
        }
        Commands::Config => {
            let config = state.config.load_config()?;
            print_json(&state.config.redact_sensitive_values(&config))
        }
    }
}
