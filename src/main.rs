use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};

use lexa::env::{self, EnvVar};
use lexa::rewrite::config::{load_rewrite_config, ConfigManager};
use lexa::rewrite::{
    Analyzer, ConceptExtractor, FileStore, GeminiAnalyzer, LiteralAnalyzer, ReplacementRule,
    RewriteConfig, RewriteError, RewriteResult, RewriteService, RuleList, Settings,
};

const DEFAULT_TAB: &str = "cli";

#[derive(Parser)]
#[command(name = "lexa")]
#[command(about = "Rewrite vocabulary in HTML pages using replacement rules", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or JSON); defaults to the standard search paths
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace phrases in an HTML page and print the result
    Process(ProcessArgs),

    /// Remove all replacement markers from an HTML page
    Revert(RevertArgs),

    /// Manage stored replacement rules
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print the supported environment variables as Markdown
    #[command(name = "env-docs")]
    EnvDocs,
}

#[derive(Args)]
struct ProcessArgs {
    /// Input HTML file, or "-" for stdin
    input: String,

    /// Write the result to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with replacement rules (defaults to the stored rules)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Tab identifier used for the processed-page marker
    #[arg(long, default_value = DEFAULT_TAB)]
    tab: String,

    /// Page URL, used to refuse browser-internal pages
    #[arg(long)]
    url: Option<String>,

    /// Match concepts literally instead of calling the language model
    #[arg(long)]
    offline: bool,
}

#[derive(Args)]
struct RevertArgs {
    /// Input HTML file, or "-" for stdin
    input: String,

    /// Write the result to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List stored rules
    List,
    /// Create a rule for a word by extracting the concepts it expresses
    Add {
        word: String,
        /// Use the word itself as the only concept
        #[arg(long)]
        offline: bool,
    },
    /// Remove a rule by id
    Remove { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration and stored settings
    Show,
    /// Store the language model API key
    #[command(name = "set-key")]
    SetKey { key: String },
    /// Enable or disable automatic processing
    #[command(name = "auto-process")]
    AutoProcess {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Write an example configuration file
    Example { path: PathBuf },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let level = env::core::LogLevel::get()
        .ok()
        .and_then(|level| level.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);
    let no_color = env::core::NoColor::get().unwrap_or(false);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_ansi(!no_color)
        .init();
}

async fn run(cli: Cli) -> RewriteResult<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Process(args) => process_page(config, args).await,
        Commands::Revert(args) => revert_page(config, args).await,
        Commands::Rules(command) => rules(config, command).await,
        Commands::Config(command) => configure(config, command).await,
        Commands::EnvDocs => {
            print!("{}", env::generate_env_docs());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> RewriteResult<RewriteConfig> {
    match path {
        Some(path) => {
            let mut config = ConfigManager::load_from_file(&path.to_string_lossy())?;
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        None => Ok(load_rewrite_config()),
    }
}

async fn open_settings(config: &RewriteConfig) -> RewriteResult<Settings> {
    let store = FileStore::open(config.expanded_store_path()).await?;
    Ok(Settings::new(Arc::new(store)))
}

fn build_service(config: RewriteConfig, settings: Settings, offline: bool) -> RewriteResult<RewriteService> {
    if offline {
        let literal = Arc::new(LiteralAnalyzer::new());
        let analyzer: Arc<dyn Analyzer> = literal.clone();
        let extractor: Arc<dyn ConceptExtractor> = literal;
        RewriteService::new(config, settings, analyzer, extractor)
    } else {
        let gemini = Arc::new(GeminiAnalyzer::new(&config, settings.clone())?);
        RewriteService::new(config, settings, gemini.clone(), gemini)
    }
}

async fn process_page(config: RewriteConfig, args: ProcessArgs) -> RewriteResult<()> {
    let html = read_input(&args.input)?;
    let rules = match &args.rules {
        Some(path) => Some(read_rules(path)?),
        None => None,
    };

    let settings = open_settings(&config).await?;
    let service = build_service(config, settings, args.offline)?;

    service.open_page(&args.tab, &html, args.url.as_deref()).await?;
    let outcome = service.process_page(&args.tab, rules).await?;
    let snapshot = service.snapshot(&args.tab)?;
    service.close_page(&args.tab).await?;

    write_output(args.output.as_deref(), &snapshot)?;
    if outcome.already_processed {
        eprintln!("Page already processed");
    } else {
        eprintln!("{} replacement(s) made", outcome.replacements_made);
    }
    Ok(())
}

async fn revert_page(config: RewriteConfig, args: RevertArgs) -> RewriteResult<()> {
    let html = read_input(&args.input)?;
    let settings = open_settings(&config).await?;
    let service = build_service(config, settings, true)?;

    service.open_page(DEFAULT_TAB, &html, None).await?;
    let outcome = service.revert_page(DEFAULT_TAB).await?;
    let snapshot = service.snapshot(DEFAULT_TAB)?;
    service.close_page(DEFAULT_TAB).await?;

    write_output(args.output.as_deref(), &snapshot)?;
    eprintln!("{} replacement(s) reverted", outcome.reverted_count);
    Ok(())
}

async fn rules(config: RewriteConfig, command: RulesCommand) -> RewriteResult<()> {
    let settings = open_settings(&config).await?;

    match command {
        RulesCommand::List => {
            let rules = settings.rules().await?;
            if rules.is_empty() {
                eprintln!("No rules");
            }
            for rule in rules.as_slice() {
                println!("{}\t{}\t{}", rule.id, rule.replacement, rule.original.join(", "));
            }
        }
        RulesCommand::Add { word, offline } => {
            let service = build_service(config, settings, offline)?;
            let rule = service.add_rule(&word).await?;
            println!("{}\t{}\t{}", rule.id, rule.replacement, rule.original.join(", "));
        }
        RulesCommand::Remove { id } => {
            let mut rules = settings.rules().await?;
            if !rules.remove_rule(&id) {
                return Err(RewriteError::InvalidInput(format!("No rule with id {}", id)));
            }
            settings.save_rules(&rules).await?;
            eprintln!("Removed rule {}", id);
        }
    }
    Ok(())
}

async fn configure(config: RewriteConfig, command: ConfigCommand) -> RewriteResult<()> {
    match command {
        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| RewriteError::SerializationError(e.to_string()))?;
            println!("{}", rendered);

            let settings = open_settings(&config).await?;
            let key_state = if settings.api_key().await?.is_some() { "set" } else { "not set" };
            println!("# api key: {}", key_state);
            println!("# auto process: {}", settings.auto_process().await?);
            println!("# rules: {}", settings.rules().await?.len());
        }
        ConfigCommand::SetKey { key } => {
            open_settings(&config).await?.set_api_key(&key).await?;
            eprintln!("API key saved");
        }
        ConfigCommand::AutoProcess { state } => {
            let enabled = matches!(state, Toggle::On);
            open_settings(&config).await?.set_auto_process(enabled).await?;
            eprintln!("Auto process {}", if enabled { "enabled" } else { "disabled" });
        }
        ConfigCommand::Example { path } => {
            ConfigManager::generate_example_config(&path.to_string_lossy())?;
            eprintln!("Example configuration written to {}", path.display());
        }
    }
    Ok(())
}

fn read_input(input: &str) -> RewriteResult<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        fs::read(input)
            .map_err(|e| RewriteError::InvalidInput(format!("Cannot read {}: {}", input, e)))
    }
}

fn read_rules(path: &Path) -> RewriteResult<Vec<ReplacementRule>> {
    let content = fs::read_to_string(path)
        .map_err(|e| RewriteError::InvalidInput(format!("Cannot read {}: {}", path.display(), e)))?;
    let rules: RuleList = serde_json::from_str(&content)?;
    rules.validate()?;
    Ok(rules.into_vec())
}

fn write_output(path: Option<&Path>, html: &str) -> RewriteResult<()> {
    match path {
        Some(path) => fs::write(path, html)?,
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(html.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
