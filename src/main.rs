use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use exam_evaluator::banner;
use exam_evaluator::config::{ClientConfig, MaterialSpec, SubmissionJob};
use exam_evaluator::errors::Result;
use exam_evaluator::report::{EvaluationReport, ReportView};
use exam_evaluator::submission::SubmissionController;
use exam_evaluator::transport::HttpTransport;

#[derive(Parser, Debug)]
#[command(version, about = "Submit answer sheets to the evaluation service and show the report")]
struct Cli {
    /// Client config file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Evaluation service base URL; overrides the config file
    #[arg(long, global = true, env = "EVALUATOR_API_BASE")]
    api_base: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit the three materials for evaluation
    Evaluate(EvaluateArgs),
    /// Render a saved report JSON file
    Render {
        report: PathBuf,
    },
    /// Check that the evaluation service is reachable
    Health,
}

#[derive(clap::Args, Debug)]
struct EvaluateArgs {
    /// TOML job file; the flags below override its entries
    #[arg(long)]
    job: Option<PathBuf>,
    /// Scanned answer sheet (image or PDF)
    #[arg(long)]
    answer_sheet: Option<PathBuf>,
    #[arg(long)]
    question_paper: Option<PathBuf>,
    #[arg(long)]
    question_paper_text: Option<String>,
    #[arg(long)]
    solution_key: Option<PathBuf>,
    #[arg(long)]
    solution_key_text: Option<String>,
    /// Print the raw report as JSON instead of the text view
    #[arg(long)]
    json: bool,
}

impl EvaluateArgs {
    /// The banner shares stdout with the report, so it stays off for `--json`.
    fn shows_banner(&self) -> bool {
        !self.json
    }

    fn into_job(self) -> Result<SubmissionJob> {
        let mut job = match &self.job {
            Some(path) => SubmissionJob::from_file(path)?,
            None => SubmissionJob::default(),
        };
        if self.answer_sheet.is_some() {
            job.answer_sheet = self.answer_sheet;
        }
        overlay(&mut job.question_paper, self.question_paper, self.question_paper_text);
        overlay(&mut job.solution_key, self.solution_key, self.solution_key_text);
        Ok(job)
    }
}

fn overlay(spec: &mut MaterialSpec, file: Option<PathBuf>, text: Option<String>) {
    if file.is_some() {
        spec.file = file;
    }
    if text.is_some() {
        spec.text = text;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        log::debug!("No .env file loaded: {}", e);
    }
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

/// What `evaluate` writes to stdout: pretty JSON that `render` can read back, or the text view.
fn report_output(report: &EvaluationReport, as_json: bool) -> Result<String> {
    if as_json {
        Ok(format!("{}\n", serde_json::to_string_pretty(report)?))
    } else {
        Ok(ReportView::from_report(report).render_text())
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }

    match cli.command {
        Command::Evaluate(args) => {
            if args.shows_banner() {
                banner::print_banner();
            }
            let as_json = args.json;
            let job = args.into_job()?;
            let inputs = job.load_inputs().await?;

            let transport = HttpTransport::from_config(config)?;
            let controller = SubmissionController::new(transport);
            let report = controller.submit(&inputs.snapshot()).await?;

            print!("{}", report_output(&report, as_json)?);
            if let Some(attempt) = controller.last_attempt() {
                log::info!(
                    "Attempt {} finished in {}ms",
                    attempt.id,
                    attempt.latency_ms.unwrap_or_default()
                );
            }
        }
        Command::Render { report } => {
            let body = tokio::fs::read_to_string(&report).await?;
            let report = EvaluationReport::from_json(&body)?;
            print!("{}", ReportView::from_report(&report).render_text());
        }
        Command::Health => {
            let transport = HttpTransport::from_config(config)?;
            let status = transport.health().await?;
            println!("✅ {} is {}", transport.config().api_base, status);
        }
    }

    Ok(())
}
