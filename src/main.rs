//! Shiori CLI - web novel URL decomposition and episode extraction.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shiori::config::Config;
use shiori::console::Console;
use shiori::credentials::{CookieFileStore, CredentialStore, MemoryCredentialStore};
use shiori::pipeline::{DecomposeRequest, ExtractRequest, Pipeline};
use shiori::sources::{Options, RequestContext, SiteId};
use std::sync::Arc;

/// Web novel URL decomposer and episode extractor.
#[derive(Parser, Debug)]
#[command(name = "shiori")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Send cookies from the cookies directory to sites that use them.
    #[arg(long, global = true)]
    with_cookies: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Expand series URLs into their episode URLs.
    Decompose {
        /// Series or episode URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Report failing URLs and keep the rest instead of aborting.
        #[arg(long)]
        lenient: bool,
    },

    /// Extract the text and metadata of a single episode.
    Extract {
        /// Episode URL.
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let console = Console::new().quiet(args.json);

    console.step("Loading configuration...");
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let credentials = load_credentials(&config, args.with_cookies, &console)?;
    let pipeline =
        Pipeline::from_config(&config.scraping).context("Failed to create HTTP client")?;
    let ctx = RequestContext::new(
        Options {
            with_cookies: args.with_cookies,
        },
        credentials,
    );

    match args.command {
        Command::Decompose { urls, lenient } => {
            let request = DecomposeRequest {
                url_string: urls.join(" "),
            };
            if lenient {
                decompose_lenient(&pipeline, &request, &ctx, &console, args.json).await
            } else {
                decompose(&pipeline, &request, &ctx, &console, args.json).await
            }
        }
        Command::Extract { url } => extract(&pipeline, url, &ctx, &console, args.json).await,
    }
}

/// Builds the credential store: cookie files when enabled, otherwise empty.
fn load_credentials(
    config: &Config,
    with_cookies: bool,
    console: &Console,
) -> Result<Arc<dyn CredentialStore>> {
    if !with_cookies {
        return Ok(Arc::new(MemoryCredentialStore::new()));
    }

    let dir = config
        .cookies_dir()
        .context("Failed to resolve cookies directory")?;
    let store = CookieFileStore::load(&dir)
        .with_context(|| format!("Failed to load cookies from {}", dir.display()))?;

    for site in SiteId::ALL {
        match store.source_for(site) {
            Some(path) => console.info(&format!("Using {} cookies from {}", site, path.display())),
            None => tracing::debug!(%site, dir = %dir.display(), "no cookie file"),
        }
    }

    Ok(Arc::new(store))
}

async fn decompose(
    pipeline: &Pipeline,
    request: &DecomposeRequest,
    ctx: &RequestContext,
    console: &Console,
    json: bool,
) -> Result<()> {
    console.step("Decomposing URLs...");
    let response = pipeline
        .decompose(request, ctx)
        .await
        .context("Failed to decompose URLs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    for (i, episode) in response.novel_url_list.iter().enumerate() {
        println!("{}", console.episode_line(i + 1, episode));
    }
    console.success(&format!(
        "Found {} episodes",
        console.count(response.novel_url_list.len())
    ));
    Ok(())
}

async fn decompose_lenient(
    pipeline: &Pipeline,
    request: &DecomposeRequest,
    ctx: &RequestContext,
    console: &Console,
    json: bool,
) -> Result<()> {
    console.step("Decomposing URLs...");
    let partial = pipeline
        .decompose_lenient(request, ctx)
        .await
        .context("Failed to decompose URLs")?;

    if json {
        let failed: Vec<_> = partial
            .failed
            .iter()
            .map(|f| serde_json::json!({ "url": f.url, "error": f.error.to_string() }))
            .collect();
        let output = serde_json::json!({
            "novel_url_list": partial.succeeded,
            "failed": failed,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for (i, episode) in partial.succeeded.iter().enumerate() {
        println!("{}", console.episode_line(i + 1, episode));
    }
    for failure in &partial.failed {
        console.warning(&format!("{}: {}", failure.url, failure.error));
    }
    console.success(&format!(
        "Found {} episodes, {} URLs failed",
        console.count(partial.succeeded.len()),
        partial.failed.len()
    ));
    Ok(())
}

async fn extract(
    pipeline: &Pipeline,
    url: String,
    ctx: &RequestContext,
    console: &Console,
    json: bool,
) -> Result<()> {
    console.step(&format!("Extracting {}...", url));
    let request = ExtractRequest { url };
    let record = pipeline
        .extract(&request, ctx)
        .await
        .with_context(|| format!("Failed to extract {}", request.url))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    console.section(&record.series_title_and_author);
    console.record(&record);
    Ok(())
}
