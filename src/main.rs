use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use pricescout::capture::{NetworkCapture, NetworkExchange};
use pricescout::config::{get_config_path, ConfigOverrides};
use pricescout::fetch::PageFetcher;
use pricescout::logging::{init_logging, LogContext};
use pricescout::pricing::PriceParser;
use pricescout::{should_use_browser, AppConfig, DetectionResult, ExtractionModeDetector};

#[derive(Parser)]
#[command(name = "pricescout")]
#[command(about = "Configurator page detection and price learning")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, help = "Configuration file path")]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a page needs a live browser
    Detect {
        #[arg(help = "Page URL")]
        url: String,

        #[arg(long, help = "File with the page's visible text")]
        text: Option<String>,

        #[arg(long, help = "File with the page's raw markup")]
        markup: Option<String>,

        #[arg(long, help = "Fetch the page over HTTP instead of reading files")]
        fetch: bool,
    },

    /// Run a saved response body through the network capture
    Harvest {
        #[arg(help = "File with the response body")]
        body: String,

        #[arg(long, default_value = "https://capture.local/api/price", help = "URL the body was served from")]
        url: String,

        #[arg(long, default_value = "application/json", help = "Response content type")]
        content_type: String,
    },

    /// Parse a displayed price
    ParsePrice {
        #[arg(help = "Price text, e.g. \"Total: $1,299.00\"")]
        text: String,
    },

    /// Print the effective configuration
    Config,

    /// Detect, then learn option prices in a live browser
    #[cfg(feature = "browser")]
    Probe {
        #[arg(help = "Configurator page URL")]
        url: String,
    },
}

#[derive(Serialize)]
struct DetectOutput<'a> {
    url: &'a str,
    use_browser: bool,
    #[serde(flatten)]
    detection: &'a DetectionResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(config_path) = &cli.config {
        let mut config = AppConfig::load_from_file(config_path).await?;
        ConfigOverrides::apply(&mut config)?;
        config
    } else {
        AppConfig::load().await?
    };

    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging)?;

    let context = LogContext::new("main", "startup").with_string_field("version", env!("CARGO_PKG_VERSION"));
    pricescout::log_debug!(context, "PriceScout starting");

    match cli.command {
        Commands::Detect { url, text, markup, fetch } => detect(&config, &url, text, markup, fetch).await?,
        Commands::Harvest { body, url, content_type } => harvest(&config, &body, url, content_type).await?,
        Commands::ParsePrice { text } => parse_price(&config, &text)?,
        Commands::Config => show_config(&config)?,
        #[cfg(feature = "browser")]
        Commands::Probe { url } => probe(&config, &url).await?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn detect(
    config: &AppConfig,
    url: &str,
    text: Option<String>,
    markup: Option<String>,
    fetch: bool,
) -> Result<()> {
    let (text, markup) = if fetch {
        let page = PageFetcher::new(&config.fetch)?.fetch(url).await?;
        (page.text, Some(page.markup))
    } else {
        let text_path = text.context("either --text or --fetch is required")?;
        let text = tokio::fs::read_to_string(&text_path)
            .await
            .with_context(|| format!("reading {}", text_path))?;
        let markup = match markup {
            Some(path) => Some(
                tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading {}", path))?,
            ),
            None => None,
        };
        (text, markup)
    };

    let detector = ExtractionModeDetector::new()?;
    let detection = detector.detect(url, &text, markup.as_deref());
    info!("{} -> {:?} ({:.2})", url, detection.mode, detection.confidence);

    print_json(&DetectOutput {
        url,
        use_browser: should_use_browser(&detection),
        detection: &detection,
    })
}

async fn harvest(config: &AppConfig, body_path: &str, url: String, content_type: String) -> Result<()> {
    let body = tokio::fs::read_to_string(body_path)
        .await
        .with_context(|| format!("reading {}", body_path))?;

    let capture = NetworkCapture::new(&config.capture)?;
    capture
        .sink()
        .observe(NetworkExchange::new(url, 200, content_type), Some(body.as_str()));

    print_json(&capture.summary().await)
}

fn parse_price(config: &AppConfig, text: &str) -> Result<()> {
    let parser = PriceParser::with_range(config.learner.min_plausible_price, config.learner.max_plausible_price)?;
    print_json(&serde_json::json!({
        "input": text,
        "price": parser.parse(text),
    }))
}

fn show_config(config: &AppConfig) -> Result<()> {
    println!("# {}", get_config_path().display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(feature = "browser")]
async fn probe(config: &AppConfig, url: &str) -> Result<()> {
    use pricescout::browser::playwright::{InputDiscovery, PlaywrightDriver};
    use pricescout::{ConfiguratorProbe, PageInput, ProbeSession};

    let page = PageFetcher::new(&config.fetch)?.fetch(url).await?;

    let session = ProbeSession::new(&config.capture)?;
    let driver = PlaywrightDriver::launch(&config.browser).await?;
    driver.attach_capture(session.capture().sink())?;

    let probe = ConfiguratorProbe::new(config)?;
    let input = PageInput::new(url, &page.text).with_markup(&page.markup);
    let report = probe.probe_page(&session, &driver, &InputDiscovery, input).await;

    driver.close().await;
    print_json(&report)
}
