use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use uuid::Uuid;

use symptom_intake::config::{load_record_key, IntakeConfig};
use symptom_intake::crypto::RecordKey;
use symptom_intake::models::Audience;
use symptom_intake::{init_tracing, IntakeService};

#[derive(Parser)]
#[command(name = "symptom-intake")]
#[command(about = "Turn free-text symptom descriptions into encrypted clinical records")]
struct Cli {
    /// Use a throwaway key and an in-memory store (nothing is persisted)
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one intake session and print the record and summary as JSON
    Intake {
        /// Free-text symptom description, in any supported language
        #[arg(long)]
        text: String,
        /// Read one answer per line from stdin for each follow-up question
        #[arg(long)]
        answers_from_stdin: bool,
        #[arg(long, value_enum, default_value_t = AudienceArg::Patient)]
        audience: AudienceArg,
    },
    /// Run one intake session and write the clinician PDF report
    Report {
        #[arg(long)]
        text: String,
        /// Output PDF path
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AudienceArg {
    Patient,
    Doctor,
}

impl From<AudienceArg> for Audience {
    fn from(a: AudienceArg) -> Self {
        match a {
            AudienceArg::Patient => Audience::Patient,
            AudienceArg::Doctor => Audience::Doctor,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = IntakeConfig::from_env()?;
    let key = if cli.ephemeral {
        config.database_path = None;
        RecordKey::generate()
    } else {
        load_record_key()?
    };
    let service = IntakeService::from_config(&config, key)?;
    let session_id = Uuid::new_v4();

    match cli.command {
        Commands::Intake {
            text,
            answers_from_stdin,
            audience,
        } => {
            let mut snapshot = service.submit_intake(&text, session_id)?;
            if answers_from_stdin {
                let stdin = std::io::stdin();
                let mut lines = stdin.lock().lines();
                while let Some(question) = snapshot.questions.first().cloned() {
                    eprint!("{} ", question.text);
                    std::io::stderr().flush()?;
                    let Some(answer) = lines.next().transpose()? else { break };
                    snapshot = service.submit_answer(
                        session_id,
                        Some(&question.symptom_id),
                        question.attribute,
                        &answer,
                    )?;
                }
            }
            let (record_id, _) = service.freeze_and_encrypt(session_id)?;
            let summary = service.get_summary(&record_id, audience.into())?;
            let out = json!({
                "record_id": record_id,
                "record": snapshot.record,
                "summary": summary,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Report { text, out } => {
            service.submit_intake(&text, session_id)?;
            let (record_id, _) = service.freeze_and_encrypt(session_id)?;
            let report = service.get_report(&record_id)?;
            std::fs::write(&out, &report.bytes)?;
            println!(
                "Wrote {} ({} page(s), record {})",
                out.display(),
                report.pages,
                record_id
            );
        }
    }
    Ok(())
}
