use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use framing_core::config::ApiKey;
use framing_core::error::{FramingError, Result};
use framing_eval::pairs;
use framing_eval::runner::EvalRunner;
use framing_llm::claude::ClaudeChatModel;

mod args;

use args::Cli;

mod exit_codes {
    pub const OK: i32 = 0;
    pub const FATAL: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const INPUT_ERROR: i32 = 3;
}

fn exit_code(err: &FramingError) -> i32 {
    match err {
        FramingError::Config(_) => exit_codes::CONFIG_ERROR,
        FramingError::Source(_) => exit_codes::INPUT_ERROR,
        _ => exit_codes::FATAL,
    }
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let config = cli.eval_config();
    config.validate()?;
    tracing::debug!(?config, prompts = %cli.prompts.display(), "resolved configuration");

    // Both startup checks happen before any request is sent.
    let api_key = ApiKey::resolve(&config.api_key_var, |var| std::env::var(var).ok())?;
    let pairs = pairs::load(&cli.prompts)?;

    let mut model = ClaudeChatModel::from_config(api_key, &config);
    if let Some(url) = &cli.base_url {
        model = model.with_base_url(url.clone());
    }

    let mut runner = EvalRunner::new(config);
    let report = runner.run(&model, &pairs).await?;

    println!(
        "Evaluation complete: {} records ({} errors)",
        report.records.len(),
        report.error_count()
    );
    println!("  JSON: {}", report.artifacts.json_path.display());
    println!("  CSV:  {}", report.artifacts.csv_path.display());
    Ok(exit_codes::OK)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // A missing .env file is fine; the variable may already be exported.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "framing=info,framing_eval=info,framing_llm=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            exit_code(&e)
        }
    };
    std::process::exit(code);
}
