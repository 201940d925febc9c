//! score-db: submit one request file (YAML or JSON) and print the response envelope.
//!
//! Run: `score-db request.yaml --pretty`
//! Connection settings come from `DATABASE_URL` or the `SCORE_POSTGRESQL_DB_*` variables.

use clap::Parser;
use score_db::{apply_migrations, ensure_database_exists, DbContext, DbSettings};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "score-db", version, about = "Store and query NWP verification metrics")]
struct Cli {
    /// Request file with `db_request_name`, `method`, `params` and `body`.
    request_file: PathBuf,

    /// Pretty-print the response.
    #[arg(long)]
    pretty: bool,

    /// Create the database, schema and tables before submitting.
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("score_db=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let text = std::fs::read_to_string(&cli.request_file)?;
    // YAML is a superset of JSON, so one parser covers both.
    let request: serde_json::Value = serde_yaml::from_str(&text)?;

    let settings = DbSettings::from_env()?;
    if cli.migrate {
        ensure_database_exists(&settings.database_url).await?;
    }
    let pool = settings.connect().await?;
    if cli.migrate {
        apply_migrations(&pool, &settings.schema).await?;
    }

    let ctx = DbContext::new(pool, &settings.schema);
    let response = ctx.submit(&request).await?;
    let out = if cli.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", out);

    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
