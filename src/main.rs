use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use dbchat::audit::AuditLogger;
use dbchat::config::AppConfig;
use dbchat::db::{Connector, Credentials, PgConnector, SslMode};
use dbchat::execute::ExecutionOutcome;
use dbchat::llm::HttpTextGenerator;
use dbchat::pipeline::{Pipeline, PipelineReport};
use dbchat::render::{logs_table, render_table};
use dbchat::translate::Translator;

/// Ask a PostgreSQL database questions in plain English
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (default: <config dir>/dbchat/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Your name, recorded in the audit log
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long, short = 'p')]
    port: Option<u16>,

    #[arg(long, short = 'd')]
    database: Option<String>,

    /// Database role to connect as
    #[arg(long, short = 'U')]
    user: Option<String>,

    #[arg(long, value_enum)]
    ssl_mode: Option<SslMode>,

    /// Create the audit table after login if it does not exist
    #[arg(long)]
    init_audit: bool,
}

enum SessionEnd {
    Disconnect,
    Quit,
}

const HELP: &str = "\
Type a request in plain English, e.g. \"show me all customers\".

  \\logs        show the most recent audit entries
  \\schema      show the schema hint sent to the model
  \\ping        test the text-generation API connection
  \\disconnect  forget the credentials and log in again
  \\q           quit";

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with result tables.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let generator =
        HttpTextGenerator::from_config(&config.llm).context("Failed to build HTTP client")?;
    if !generator.has_api_key() {
        eprintln!(
            "{}",
            format!(
                "Warning: {} is not set. Set it in your environment to enable SQL generation.",
                config.llm.api_key_env
            )
            .yellow()
        );
    }

    let connector: Arc<dyn Connector> = Arc::new(PgConnector);
    let pipeline = Pipeline::new(
        connector.clone(),
        Translator::new(Arc::new(generator), &config.llm),
        config.classifier.build(),
        AuditLogger::new(connector, &config.audit),
    );

    let stdin = io::stdin();
    let mut input = stdin.lock();

    let mut defaults = config.database.credentials();
    if let Some(host) = &cli.host {
        defaults.host = host.clone();
    }
    if let Some(port) = cli.port {
        defaults.port = port;
    }
    if let Some(database) = &cli.database {
        defaults.database = database.clone();
    }
    if let Some(user) = &cli.user {
        defaults.username = user.clone();
    }
    if let Some(ssl_mode) = cli.ssl_mode {
        defaults.ssl_mode = ssl_mode;
    }
    defaults.app_user = cli.name.clone().unwrap_or_default();

    // Values given on the command line are only taken silently the first time.
    let mut first_login = true;

    loop {
        let Some(creds) = login(&mut input, &defaults, first_login)? else {
            return Ok(());
        };
        first_login = false;
        println!("{}", format!("Connected as {}", creds.app_user).green());

        if cli.init_audit {
            match pipeline.ensure_audit_table(&creds).await {
                Ok(()) => println!("Audit table is ready."),
                Err(e) => eprintln!("{}", format!("Could not create audit table: {e}").red()),
            }
        }

        match run_session(&pipeline, &creds, &mut input).await? {
            SessionEnd::Disconnect => {
                println!("{}", "Disconnected.".green());
            }
            SessionEnd::Quit => return Ok(()),
        }
    }
}

/// Collect credentials. Returns `None` when input ends.
fn login(input: &mut impl BufRead, defaults: &Credentials, first: bool) -> Result<Option<Credentials>> {
    println!("{}", "Welcome to dbchat".bold());

    loop {
        let mut creds = defaults.clone();
        let ask = |current: &str| !first || current.is_empty();

        macro_rules! field {
            ($label:expr, $slot:expr) => {
                if ask($slot.as_str()) {
                    match prompt(input, $label, &$slot)? {
                        Some(value) => $slot = value,
                        None => return Ok(None),
                    }
                }
            };
        }

        field!("Your name (for activity logs)", creds.app_user);
        field!("DB username", creds.username);
        field!("DB host", creds.host);
        field!("Database name", creds.database);

        creds.password = match std::env::var("PGPASSWORD") {
            Ok(pw) => pw,
            Err(_) => {
                let label = format!("Password for {}: ", creds.display_string());
                rpassword::read_password_from_tty(Some(label.as_str()))
                    .context("Failed to read password")?
            }
        };

        if creds.app_user.trim().is_empty()
            || creds.username.trim().is_empty()
            || creds.database.trim().is_empty()
        {
            println!("{}", "Please fill in all fields.".yellow());
            continue;
        }
        return Ok(Some(creds));
    }
}

/// Print `label [default]: ` and read one line. Empty input keeps the default.
fn prompt(input: &mut impl BufRead, label: &str, default: &str) -> Result<Option<String>> {
    if default.is_empty() {
        print!("{label}: ");
    } else {
        print!("{label} [{default}]: ");
    }
    io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let value = line.trim();
    Ok(Some(if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }))
}

async fn run_session(
    pipeline: &Pipeline,
    creds: &Credentials,
    input: &mut impl BufRead,
) -> Result<SessionEnd> {
    println!("Type \\help for commands.");

    loop {
        print!("{}> ", creds.database);
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            println!();
            return Ok(SessionEnd::Quit);
        }
        let request = line.trim();

        match request {
            "" => println!("{}", "Please enter a query.".yellow()),
            "\\q" | "\\quit" | "exit" => return Ok(SessionEnd::Quit),
            "\\disconnect" => return Ok(SessionEnd::Disconnect),
            "\\help" | "\\?" => println!("{HELP}"),
            "\\schema" => {
                let hint = pipeline.schema_hint(creds).await;
                if hint.is_empty() {
                    println!("(no tables found or schema unavailable)");
                } else {
                    println!("{hint}");
                }
            }
            "\\ping" => match pipeline.ping().await {
                Ok(reply) => println!("{}", format!("API connected! Response: {reply}").green()),
                Err(e) => println!("{}", format!("API connection failed: {e}").red()),
            },
            "\\logs" => match pipeline.recent_logs(creds).await {
                Ok(entries) if entries.is_empty() => println!("No logs available."),
                Ok(entries) => println!("{}", render_table(&logs_table(&entries))),
                Err(e) => println!("{}", format!("Error fetching logs: {e}").red()),
            },
            _ if request.starts_with('\\') => {
                println!("{}", format!("Unknown command {request}. Type \\help.").yellow())
            }
            _ => match pipeline.run(creds, request).await {
                Ok(report) => print_report(&report),
                Err(e) => println!("{}", format!("Could not generate SQL: {e}").red()),
            },
        }
    }
}

fn print_report(report: &PipelineReport) {
    println!("{}", "Generated SQL".bold());
    println!("{}", report.statement.sql.as_str().cyan());
    println!("{}", format!("[{}]", report.statement.action).dim());

    match &report.outcome {
        Ok(ExecutionOutcome::Rows(rows)) => {
            println!("{}", render_table(rows));
            println!(
                "{}",
                format!("{} ({:.1?})", report.status_message(), rows.execution_time).dim()
            );
        }
        Ok(ExecutionOutcome::Affected(_)) => println!("{}", report.status_message().green()),
        Err(e) => {
            println!("{}", "Database Execution Error".red().bold());
            println!("{}", e.display_full().red());
        }
    }

    if let Err(e) = &report.audit {
        eprintln!("{}", format!("Warning: {e}").yellow());
    }
}
