use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use propstats_core::config::{StatsConfig, resolve_config_path};
use propstats_core::extract::extract_type_declarations;
use propstats_core::fetch::{MediaWikiClient, MediaWikiClientConfig, PageSource};
use propstats_core::normalize::{KnownTypes, PromptClarifier, SkipAllClarifier};
use propstats_core::report::{render_csv, render_json, render_summary};
use propstats_core::survey::{SurveyReport, run_survey};
use propstats_core::topics::discover_topics;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "propstats",
    version,
    about = "Tabulate declared datatypes of wiki property proposals as CSV"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "URL", help = "Override the wiki API URL")]
    api_url: Option<String>,
    #[arg(long, global = true, help = "Print resolved configuration to stderr")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    api_url: Option<String>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            api_url: cli.api_url.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Fetch every topic, tabulate datatypes and print the CSV report")]
    Tabulate(TabulateArgs),
    #[command(about = "List the topics discovered on the proposal index")]
    Topics,
    #[command(about = "Print the raw datatype declarations of one topic")]
    Extract(ExtractArgs),
    #[command(name = "known-types", about = "Print the configured datatype vocabulary")]
    KnownTypes,
}

#[derive(Debug, Args)]
struct TabulateArgs {
    #[arg(short, long, value_name = "PATH", help = "Write the report to a file instead of stdout")]
    output: Option<PathBuf>,
    #[arg(long, help = "Emit the full survey report as JSON instead of CSV")]
    json: bool,
    #[arg(long, help = "Discard unrecognized datatypes instead of prompting")]
    non_interactive: bool,
    #[arg(long, help = "Prompt again for every occurrence of an unrecognized datatype")]
    no_cache: bool,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    topic: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);
    init_tracing();

    match cli.command {
        Some(Commands::Tabulate(args)) => run_tabulate(&runtime, args),
        Some(Commands::Topics) => run_topics(&runtime),
        Some(Commands::Extract(ExtractArgs { topic })) => run_extract(&runtime, &topic),
        Some(Commands::KnownTypes) => run_known_types(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

fn run_tabulate(runtime: &RuntimeOptions, args: TabulateArgs) -> Result<()> {
    let mut config = resolve_runtime_config(runtime)?;
    if args.no_cache {
        config.types.cache_clarifications = Some(false);
    }
    let mut client = build_client(runtime, &config)?;

    let report = if args.non_interactive {
        run_survey(&mut client, &mut SkipAllClarifier, &config)?
    } else {
        let stdin = io::stdin();
        let mut clarifier = PromptClarifier::new(stdin.lock(), io::stderr());
        run_survey(&mut client, &mut clarifier, &config)?
    };

    eprintln!();
    eprint!("{}", render_summary(&report.clarifications));
    eprintln!("counted: {}", report.tally.grand_total());
    eprintln!("requests: {}", report.request_count);

    let rendered = render_report(&report, args.json)?;
    match args.output {
        Some(path) => {
            write_report(&path, &rendered)?;
            eprintln!("wrote report: {}", normalize_path(&path));
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(rendered.as_bytes())
                .context("failed to write report to stdout")?;
        }
    }
    Ok(())
}

fn run_topics(runtime: &RuntimeOptions) -> Result<()> {
    let config = resolve_runtime_config(runtime)?;
    let mut client = build_client(runtime, &config)?;
    let topics = discover_topics(&mut client, &config)?;

    println!("topics.count: {}", topics.len());
    if topics.is_empty() {
        println!("topics: <none>");
    }
    for topic in topics {
        println!("{topic}");
    }
    Ok(())
}

fn run_extract(runtime: &RuntimeOptions, topic: &str) -> Result<()> {
    let topic = topic.trim();
    if topic.is_empty() {
        bail!("extract requires a non-empty topic");
    }
    let config = resolve_runtime_config(runtime)?;
    let mut client = build_client(runtime, &config)?;
    let title = config.proposal_page_title(topic);
    let page = client.fetch_page(&title)?;
    let declarations = extract_type_declarations(&page);

    println!("page: {title}");
    println!("declarations.count: {}", declarations.len());
    for raw in declarations {
        println!("{}", raw.trim());
    }
    Ok(())
}

fn run_known_types(runtime: &RuntimeOptions) -> Result<()> {
    let config = resolve_runtime_config(runtime)?;
    for type_name in KnownTypes::from_config(&config).iter() {
        println!("{type_name}");
    }
    Ok(())
}

fn render_report(report: &SurveyReport, json: bool) -> Result<String> {
    if json {
        let mut rendered = render_json(report)?;
        rendered.push('\n');
        return Ok(rendered);
    }
    Ok(render_csv(&report.topics, &report.tally))
}

fn write_report(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

fn resolve_runtime_config(runtime: &RuntimeOptions) -> Result<StatsConfig> {
    dotenvy::dotenv().ok();

    let cwd = env::current_dir().context("failed to read current directory")?;
    let location = resolve_config_path(runtime.config.as_deref(), &cwd);
    let config = location.load()?;

    if runtime.diagnostics {
        eprintln!(
            "[diagnostics]\nconfig_path: {} ({}, {})\n{}",
            normalize_path(&location.path),
            location.source.as_str(),
            if location.path.exists() { "found" } else { "missing" },
            config.diagnostics()
        );
    }
    Ok(config)
}

fn build_client(runtime: &RuntimeOptions, config: &StatsConfig) -> Result<MediaWikiClient> {
    let mut client_config = MediaWikiClientConfig::from_config(config);
    if let Some(api_url) = &runtime.api_url {
        client_config.api_url = api_url.trim().to_string();
    }
    MediaWikiClient::new(client_config)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
