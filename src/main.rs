use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lianwen::batch::{BatchRun, ItemStatus, RunState};
use lianwen::clipboard::{copy_content, paste_link, paste_links, FileClipboard};
use lianwen::extractors::{ExtractionOutcome, SimulatedExtractor};
use lianwen::output::{self, ResultHandoff};
use lianwen::{utils, BatchProcessor, Cli, Commands, Config, OutputFormat, Platform, PlatformHint, TranscriptExtractor};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "lianwen=debug" } else { "lianwen=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let config = Config::load_from(&config_path).await?;

    match cli.command {
        Commands::Extract {
            url,
            paste,
            platform,
            format,
            output,
            export,
            copy,
        } => {
            let format = format.unwrap_or_else(|| config.default_format());
            let options = ExtractOptions {
                output,
                export,
                copy,
                quiet: cli.quiet,
            };
            let url = resolve_extract_url(&config, url, paste).await?;
            run_extract(&config, &url, platform, format, options).await?;
        }
        Commands::Batch {
            input,
            links,
            paste,
            format,
            download_all,
            retry_failed,
        } => {
            let format = format.unwrap_or_else(|| config.default_format());
            let text = collect_batch_input(&config, input.as_deref(), &links, paste).await?;
            run_batch(&config, &text, format, download_all, retry_failed, cli.quiet).await?;
        }
        Commands::Show {
            query,
            share,
            retry,
        } => {
            run_show(&config, &query, share, retry).await?;
        }
        Commands::Config { set } => {
            let mut config = config;
            if !set.is_empty() {
                for assignment in &set {
                    let (key, value) = assignment
                        .split_once('=')
                        .with_context(|| format!("Expected KEY=VALUE, got '{}'", assignment))?;
                    config.set(key.trim(), value)?;
                }
                config.save_to(&config_path).await?;
                println!("Saved configuration to {}", config_path.display());
            }
            config.display();
        }
        Commands::Platforms => {
            println!("Supported platforms:");
            for platform in Platform::supported() {
                println!("  • {}", platform);
            }
            println!("  Links from other sites are accepted and shown as {}", Platform::Unknown);
        }
    }

    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress.set_message(message.to_string());
    progress
}

/// Link for single extraction: the clipboard when asked, else the argument
async fn resolve_extract_url(config: &Config, url: Option<String>, paste: bool) -> Result<String> {
    if paste {
        let clipboard = FileClipboard::new(config.clipboard_file());
        match paste_link(&clipboard).await {
            Ok(link) => return Ok(link),
            // a link on the command line still works
            Err(e) if url.is_some() => eprintln!("{}", e),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(url.unwrap_or_default())
}

struct ExtractOptions {
    output: Option<PathBuf>,
    export: bool,
    copy: bool,
    quiet: bool,
}

async fn run_extract(
    config: &Config,
    url: &str,
    hint: PlatformHint,
    format: OutputFormat,
    options: ExtractOptions,
) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        anyhow::bail!("Please enter a video link");
    }

    let platform = Platform::resolve(url, hint);
    tracing::info!("Starting extraction for {} link: {}", platform, url);

    let extractor = SimulatedExtractor::from_config(&config.simulation);
    let progress = (!options.quiet).then(|| spinner("Extracting transcript..."));
    let outcome = extractor.extract(url, 0).await;

    let title = match outcome {
        ExtractionOutcome::Success { title, result_id } => {
            if let Some(progress) = &progress {
                progress.finish_with_message("Extraction complete");
            }
            tracing::debug!("Extraction result id: {}", result_id);
            title
        }
        ExtractionOutcome::Failure { error } => {
            if let Some(progress) = &progress {
                progress.finish_with_message("Extraction failed");
            }
            anyhow::bail!(error);
        }
    };

    let content = output::render_transcript(&title, format);
    eprintln!(
        "{} | {} | about {} characters",
        title,
        platform,
        output::transcript_length(&content)
    );

    match &options.output {
        Some(path) => {
            output::save_to_file(&content, path).await?;
            println!("Transcript saved to: {}", path.display());
        }
        None => println!("{}", content),
    }

    if options.export {
        let path = output::export_transcript(&content, &config.export_dir(), &title).await?;
        println!("Transcript exported to: {}", path.display());
    }

    if options.copy {
        let clipboard = FileClipboard::new(config.clipboard_file());
        match copy_content(&content, &clipboard).await {
            Ok(()) => eprintln!("Copied to clipboard"),
            Err(e) => eprintln!("{}", e),
        }
    }

    Ok(())
}

/// Gather the batch text from a file or stdin, `--link` flags and the clipboard
async fn collect_batch_input(
    config: &Config,
    input: Option<&Path>,
    links: &[String],
    paste: bool,
) -> Result<String> {
    let mut text = match input {
        Some(path) if path == Path::new("-") => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read links from standard input")?;
            buffer
        }
        Some(path) => fs_err::read_to_string(path).context("Failed to read links file")?,
        None => String::new(),
    };

    for link in links {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(link);
    }

    if paste {
        let clipboard = FileClipboard::new(config.clipboard_file());
        match paste_links(&text, &clipboard).await {
            Ok(merged) => text = merged,
            // clipboard problems never stop the batch
            Err(e) => eprintln!("{}", e),
        }
    }

    Ok(text)
}

fn batch_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Mirror published snapshots onto a progress bar until the batch ends
fn spawn_progress_ui(
    mut updates: tokio::sync::watch::Receiver<BatchRun>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let total = updates.borrow().progress().total;
        let progress = batch_progress_bar(total);

        loop {
            let message = {
                let run = updates.borrow_and_update();
                progress.set_position(run.progress().processed as u64);
                run.items()
                    .iter()
                    .find(|item| item.status == ItemStatus::Processing)
                    .map(|item| {
                        let host = utils::extract_domain(&item.url).unwrap_or_else(|| item.url.clone());
                        format!("{} ({})", host, item.platform)
                    })
                    .unwrap_or_default()
            };
            progress.set_message(message);

            if updates.changed().await.is_err() {
                break;
            }
        }

        progress.finish_and_clear();
    })
}

async fn run_batch(
    config: &Config,
    text: &str,
    format: OutputFormat,
    download_all: bool,
    retry_failed: bool,
    quiet: bool,
) -> Result<()> {
    let extractor: Arc<dyn TranscriptExtractor> = Arc::new(SimulatedExtractor::from_config(&config.simulation));
    let processor = BatchProcessor::new(extractor);
    let started = Instant::now();

    let handle = processor.spawn(text, format)?;
    let cancel = handle.cancellation_token();

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling after the current item finishes...");
                cancel.cancel();
            }
        })
    };

    let progress_ui = (!quiet).then(|| spawn_progress_ui(handle.subscribe()));
    let mut run = handle.finish().await?;
    if let Some(progress_ui) = progress_ui {
        let _ = progress_ui.await;
    }

    if retry_failed && run.state() == RunState::Completed {
        let failed: Vec<usize> = run
            .items()
            .iter()
            .enumerate()
            .filter(|(_, item)| matches!(item.status, ItemStatus::Failed { .. }))
            .map(|(index, _)| index)
            .collect();

        for index in failed {
            if cancel.is_cancelled() {
                break;
            }
            run = processor.retry(run, index, &cancel, |_| {}).await?;
        }
    }
    interrupt.abort();

    print!("{}", output::render_run(&run));
    println!("Elapsed: {}", utils::format_duration(started.elapsed().as_secs_f64()));

    if run.state() != RunState::Completed {
        for (index, item) in run.abandoned() {
            tracing::info!("Item {} abandoned by cancellation: {}", index + 1, item.url);
        }
        return Ok(());
    }

    println!("View all results: {}", ResultHandoff::from_run(&run).to_link()?);

    if download_all {
        let dir = config.export_dir();
        let paths = output::download_all(&run, &dir).await?;
        println!("Downloaded {} transcripts to {}", paths.len(), dir.display());
    }

    Ok(())
}

async fn run_show(config: &Config, query: &str, share: bool, retry: Option<usize>) -> Result<()> {
    let mut handoff = ResultHandoff::from_query(query)?;

    match retry {
        Some(position) => handoff = retry_from_handoff(config, handoff, position).await?,
        None => render_handoff(&handoff),
    }

    if share {
        let link = handoff.share_link()?;
        println!("Share link: {}", link);
        let clipboard = FileClipboard::new(config.clipboard_file());
        match copy_content(&link, &clipboard).await {
            Ok(()) => eprintln!("Share link copied to clipboard"),
            Err(e) => eprintln!("Failed to copy share link. {}", e),
        }
    }

    Ok(())
}

fn render_handoff(handoff: &ResultHandoff) {
    match &handoff.items {
        Some(items) => {
            println!("Batch {} ({} results)", handoff.batch_id, items.len());
            for (index, item) in items.iter().enumerate() {
                println!("{}", output::render_item_row(index, item, handoff.format));
            }
        }
        None => {
            let title = format!("Result {}", handoff.batch_id);
            let content = output::render_transcript(&title, handoff.format);
            println!("{}", content);
            eprintln!("About {} characters", output::transcript_length(&content));
        }
    }
}

/// Run one failed item of a finished batch again and print the updated batch
async fn retry_from_handoff(
    config: &Config,
    handoff: ResultHandoff,
    position: usize,
) -> Result<ResultHandoff> {
    let items = handoff
        .items
        .context("Retry needs a \"view all\" query that carries batchResults")?;
    let index = position.checked_sub(1).context("Item positions start at 1")?;
    let run = BatchRun::restore(items, handoff.format)?;

    let extractor: Arc<dyn TranscriptExtractor> = Arc::new(SimulatedExtractor::from_config(&config.simulation));
    let processor = BatchProcessor::new(extractor);
    let run = processor
        .retry(run, index, &CancellationToken::new(), |_| {})
        .await?;

    let retried = ResultHandoff::from_run(&run);
    print!("{}", output::render_run(&run));
    println!("View all results: {}", retried.to_link()?);
    Ok(retried)
}
