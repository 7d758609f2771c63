use critique::ai_service::AIService;
use critique::config::CritiqueConfig;
use critique::doctor::{CheckStatus, CritiqueDoctor};
use critique::server;
use critique::store::ReviewStore;
use critique::upload::decode_source;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // .env in the working directory, before config is resolved
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("critique=info,tower_http=info")),
        )
        .init();

    let matches = Command::new("critique")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Upload source files and get an AI code review")
        .subcommand_required(true)
        .subcommand(
            Command::new("serve")
                .about("Run the web app")
                .arg(Arg::new("host").long("host").help("Address to bind"))
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_parser(clap::value_parser!(u16))
                        .help("Port to listen on"),
                ),
        )
        .subcommand(
            Command::new("review")
                .about("Review a local file and print the report")
                .arg(Arg::new("path").required(true))
                .arg(
                    Arg::new("language")
                        .short('l')
                        .long("language")
                        .help("Language hint: python, java, c, cpp"),
                )
                .arg(
                    Arg::new("no-save")
                        .long("no-save")
                        .action(ArgAction::SetTrue)
                        .help("Don't store the report"),
                ),
        )
        .subcommand(
            Command::new("list").about("List recent reports").arg(
                Arg::new("limit")
                    .short('n')
                    .value_parser(clap::value_parser!(usize))
                    .default_value("20"),
            ),
        )
        .subcommand(
            Command::new("show").about("Print a stored report").arg(
                Arg::new("id")
                    .required(true)
                    .value_parser(clap::value_parser!(i64)),
            ),
        )
        .subcommand(Command::new("doctor").about("Check configuration and storage"))
        .get_matches();

    if let Err(e) = run(&matches).await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let mut config = CritiqueConfig::load().context("Failed to load config")?;

    match matches.subcommand() {
        Some(("serve", sub_matches)) => {
            if let Some(host) = sub_matches.get_one::<String>("host") {
                config.host = host.clone();
            }
            if let Some(port) = sub_matches.get_one::<u16>("port") {
                config.port = *port;
            }
            server::start_server(&config).await
        }
        Some(("review", sub_matches)) => {
            let path_str = sub_matches
                .get_one::<String>("path")
                .context("Path required")?;
            let language = sub_matches
                .get_one::<String>("language")
                .map(String::as_str)
                .unwrap_or("");
            let save = !sub_matches.get_flag("no-save");
            review_file(&config, Path::new(path_str), language, save).await
        }
        Some(("list", sub_matches)) => {
            let limit = sub_matches.get_one::<usize>("limit").copied().unwrap_or(20);
            let store = ReviewStore::open_at(&config.database_path()?)?;
            let reports = store.list_recent(limit)?;
            if reports.is_empty() {
                println!("No reports yet.");
            }
            for report in reports {
                println!("{:>5}  {}", report.id, report);
            }
            Ok(())
        }
        Some(("show", sub_matches)) => {
            let id = *sub_matches.get_one::<i64>("id").context("Id required")?;
            let store = ReviewStore::open_at(&config.database_path()?)?;
            match store.get(id)? {
                Some(report) => {
                    println!("📄 {}\n", report);
                    println!("{}", report.review_text);
                    Ok(())
                }
                None => anyhow::bail!("No report with id {}", id),
            }
        }
        Some(("doctor", _)) => {
            println!("🔮 critique doctor");
            let api_key = config.resolve_api_key(|name| std::env::var(name).ok());
            let report = CritiqueDoctor::new().run(&config, api_key.as_deref());
            for check in &report.checks {
                let mark = match check.status {
                    CheckStatus::Pass => "✅",
                    CheckStatus::Warning => "⚠️ ",
                    CheckStatus::Fail => "❌",
                };
                println!("{} {}: {}", mark, check.name, check.message);
            }
            if report.overall_health == CheckStatus::Fail {
                std::process::exit(1);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn review_file(config: &CritiqueConfig, path: &Path, language: &str, save: bool) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let code = decode_source(&bytes);
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let reviewer = AIService::new(config.ai_config());
    let outcome = reviewer.review(&code, language).await;
    if outcome.is_fallback() {
        eprintln!("⚠️  Gemini unavailable, showing fallback checklist");
    }
    let review_text = outcome.into_text();

    if save {
        let store = ReviewStore::open_at(&config.database_path()?)?;
        let report = store.create(&filename, &code)?;
        store.update_review(report.id, &review_text)?;
        eprintln!("💾 Saved as report {}", report.id);
    }

    println!("{}", review_text);
    Ok(())
}
