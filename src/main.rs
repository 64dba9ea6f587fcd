// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use yacap::app_config::{self, CaptionLanguage, CaptionProviderKind, Config};
use yacap::app_controller::Controller;
use yacap::providers::mock::MockProvider;

/// CLI Wrapper for CaptionProviderKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliCaptionProvider {
    Gemini,
    #[value(name = "openai")]
    OpenAI,
}

impl From<CliCaptionProvider> for CaptionProviderKind {
    fn from(cli_provider: CliCaptionProvider) -> Self {
        match cli_provider {
            CliCaptionProvider::Gemini => CaptionProviderKind::Gemini,
            CliCaptionProvider::OpenAI => CaptionProviderKind::OpenAI,
        }
    }
}

/// CLI Wrapper for CaptionLanguage to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliCaptionLanguage {
    En,
    Zh,
}

impl From<CliCaptionLanguage> for CaptionLanguage {
    fn from(cli_language: CliCaptionLanguage) -> Self {
        match cli_language {
            CliCaptionLanguage::En => CaptionLanguage::En,
            CliCaptionLanguage::Zh => CaptionLanguage::Zh,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Caption every image in a file or directory
    Caption(CaptionArgs),

    /// Generate shell completions for yacap
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct CaptionArgs {
    /// Image file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Directory for caption files (defaults to the image directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Force overwrite of existing caption files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Caption provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliCaptionProvider>,

    /// Model name to use for captioning
    #[arg(short, long)]
    model: Option<String>,

    /// Text placed before every caption (e.g. a trigger word)
    #[arg(long)]
    prefix: Option<String>,

    /// Text placed after every caption
    #[arg(long)]
    suffix: Option<String>,

    /// Caption language written to the files
    #[arg(long, value_enum)]
    language: Option<CliCaptionLanguage>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Use a local fake provider instead of calling any API
    #[arg(long)]
    dry_run: bool,
}

/// yacap - Yet Another Captioner
///
/// Batch-captions images for text-to-image training using vision-language APIs.
#[derive(Parser, Debug)]
#[command(name = "yacap")]
#[command(version)]
#[command(about = "AI-powered bilingual image captioning tool")]
#[command(long_about = "yacap captions images in English and Chinese using vision-language APIs \
and writes one caption file per image.

EXAMPLES:
    yacap caption photos/                          # Caption using default config
    yacap caption -f photos/                       # Force overwrite existing caption files
    yacap caption -p openai -m gpt-4o photos/      # Use specific provider and model
    yacap caption --prefix 'sks,' photos/          # Prepend a trigger word
    yacap caption --language zh -o out/ photos/    # Write Chinese captions to out/
    yacap caption --dry-run photos/                # Try the pipeline without API calls
    yacap completions bash > yacap.bash            # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically. API keys can also be provided with the
    GEMINI_API_KEY and OPENAI_API_KEY environment variables.

SUPPORTED PROVIDERS:
    gemini - Google Gemini API (default: gemini-2.0-flash)
    openai - OpenAI or any compatible endpoint (default: gpt-4o-mini)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // The logger itself accepts everything; set_max_level does the filtering
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.target().starts_with("yacap")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config or the command line says otherwise
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "yacap", &mut std::io::stdout());
            Ok(())
        }
        Commands::Caption(args) => run_caption(args).await,
    }
}

/// Load the config file, or write a default one if it does not exist
fn load_or_create_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let file = File::open(config_path)
            .context(format!("Failed to open config file: {}", config_path))?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .context(format!("Failed to parse config file: {}", config_path))?;
        return Ok(config);
    }

    warn!("Config file not found at '{}', creating default config.", config_path);
    let config = Config::default();
    let config_json = serde_json::to_string_pretty(&config)
        .context("Failed to serialize default config to JSON")?;
    std::fs::write(config_path, config_json)
        .context(format!("Failed to write default config to file: {}", config_path))?;
    Ok(config)
}

/// Apply command line overrides on top of the loaded config
fn apply_overrides(config: &mut Config, options: &CaptionArgs) {
    if let Some(provider) = &options.provider {
        config.caption.provider = provider.clone().into();
    }

    if let Some(model) = &options.model {
        config.caption.active_provider_config_mut().model = model.clone();
    }

    if let Some(prefix) = &options.prefix {
        config.export.prefix = prefix.clone();
    }

    if let Some(suffix) = &options.suffix {
        config.export.suffix = suffix.clone();
    }

    if let Some(language) = &options.language {
        config.export.language = language.clone().into();
    }

    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}

async fn run_caption(options: CaptionArgs) -> Result<()> {
    // Command line log level applies before the config is read
    if let Some(cmd_log_level) = &options.log_level {
        let config_log_level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(config_log_level.to_level_filter());
    }

    let mut config = load_or_create_config(&options.config_path)?;
    apply_overrides(&mut config, &options);

    if options.dry_run {
        info!("Dry run: no API requests will be made");
    } else {
        config.validate()
            .context("Configuration validation failed")?;
    }

    if options.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    if !options.input_path.exists() {
        return Err(anyhow!("Input path does not exist: {:?}", options.input_path));
    }

    let output_dir = match &options.output_dir {
        Some(dir) => dir.clone(),
        None if options.input_path.is_dir() => options.input_path.clone(),
        None => options.input_path.parent().unwrap_or(Path::new(".")).to_path_buf(),
    };

    let controller = if options.dry_run {
        Controller::with_provider(config, Arc::new(MockProvider::working().with_latency(200, 800)))
    } else {
        Controller::with_config(config)?
    };

    let summary = controller.run(options.input_path.clone(), output_dir, options.force_overwrite).await?;

    if summary.failed > 0 {
        warn!("{} of {} image(s) could not be captioned", summary.failed, summary.total);
    }
    Ok(())
}
