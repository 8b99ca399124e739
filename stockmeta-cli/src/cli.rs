//! Command-line interface for stockmeta.
//!
//! All domain logic lives in the `stockmeta` library; this module parses
//! commands, builds the production adapters (Gemini over HTTP, ExifTool as a
//! child process) and prints results.
//!
//! ## How To Use
//! - Command-line users: run the `stockmeta` binary with `--help`.
//! - Integration tests: call [`run`] with a constructed [`Cli`].
use crate::load_config::load_config;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stockmeta::bridge::save_metadata;
use stockmeta::config::RuntimeConfig;
use stockmeta::credentials::{mask_key, probe_credential, KeyStatus};
use stockmeta::exif::ExifTool;
use stockmeta::export::{rows_from_items, to_csv, write_csv};
use stockmeta::gemini::GeminiFactory;
use stockmeta::metadata::{Creativity, MetadataGenerator};
use stockmeta::pipeline::{
    generate_bulk_prompts, run_pipeline, BulkPromptRequest, ImageStyle, PipelineProgress,
    PipelineRequest,
};
use stockmeta::queue::{shared, spawn_worker, ItemStatus, QueueItem};
use stockmeta::settings::{AppSettings, SettingsStore, SUPPORTED_MODELS};

/// Generate stock-image SEO metadata and text-to-image prompts with Gemini.
#[derive(Parser)]
#[clap(
    name = "stockmeta",
    version,
    about = "Generate SEO metadata and text-to-image prompts for stock images"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate metadata for every image in a YAML batch job
    Batch {
        /// Path to the YAML batch job file
        #[clap(long)]
        config: PathBuf,
    },
    /// Turn an idea into refined text-to-image prompts
    Prompts {
        /// The idea to build prompts around
        #[clap(long)]
        idea: String,
        /// Number of prompts to generate
        #[clap(long, default_value_t = 5)]
        count: u32,
        /// Image style: photorealistic or vector
        #[clap(long, default_value = "photorealistic")]
        style: ImageStyle,
        /// Also generate a negative prompt per item
        #[clap(long)]
        negative: bool,
        /// Print the prompts as JSON
        #[clap(long)]
        json: bool,
        /// One call with the built-in content policy instead of the staged pipeline
        #[clap(long, conflicts_with = "negative")]
        quick: bool,
    },
    /// Manage API keys
    Keys {
        #[clap(subcommand)]
        action: KeyAction,
    },
    /// Show or change saved settings
    Settings {
        #[clap(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
pub enum KeyAction {
    /// Add a key at the lowest priority
    Add {
        key: String,
        #[clap(long)]
        label: Option<String>,
    },
    /// Remove a key
    Remove { key: String },
    /// List keys in priority order (masked)
    List,
    /// Check whether a key works; checks every saved key when none is given
    Test { key: Option<String> },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the saved settings with keys masked
    Show,
    /// Change one or more settings
    Set {
        #[clap(long)]
        model: Option<String>,
        #[clap(long)]
        creativity: Option<Creativity>,
        /// Let the model choose lengths instead of the fixed targets
        #[clap(long)]
        auto_metadata: Option<bool>,
        #[clap(long)]
        title_length: Option<u32>,
        #[clap(long)]
        description_length: Option<u32>,
        #[clap(long)]
        keyword_count: Option<u32>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let result = dispatch(cli).await;

    let exit_span = tracing::info_span!("exit");
    exit_span.in_scope(|| {
        tracing::info!(success = result.is_ok(), "run finished");
    });
    result
}

async fn dispatch(cli: Cli) -> Result<()> {
    let runtime = RuntimeConfig::from_env().context("Invalid environment configuration")?;
    runtime.trace_loaded();
    let store = SettingsStore::new(&runtime.settings_dir);

    match cli.command {
        Commands::Batch { config } => run_batch(&runtime, &store, config).await,
        Commands::Prompts {
            idea,
            count,
            style,
            negative,
            json,
            quick,
        } => {
            if quick {
                let request = BulkPromptRequest { idea, count };
                return run_bulk_prompts(&runtime, &store, request, json).await;
            }
            let request = PipelineRequest {
                idea,
                count,
                style,
                negative_prompts: negative,
            };
            run_prompts(&runtime, &store, request, json).await
        }
        Commands::Keys { action } => run_keys(&runtime, &store, action).await,
        Commands::Settings { action } => run_settings(&store, action),
    }
}

fn gemini(runtime: &RuntimeConfig) -> Result<GeminiFactory> {
    GeminiFactory::from_runtime(runtime).context("Failed to build HTTP client")
}

async fn run_batch(runtime: &RuntimeConfig, store: &SettingsStore, config: PathBuf) -> Result<()> {
    let job = load_config(config)?;
    let inputs = job.resolve_inputs()?;
    let settings = store.load();
    let generation = job.overrides.apply(settings.generation_config());
    let candidates = settings.candidate_keys(runtime.fallback_credential.as_deref());
    if candidates.is_empty() {
        tracing::warn!("No API key configured; every item will fail");
    }
    tracing::info!(
        command = "batch",
        images = inputs.len(),
        keys = candidates.len(),
        model = %generation.model,
        "Starting batch"
    );

    let processor = Arc::new(MetadataGenerator::new(
        generation,
        candidates,
        Arc::new(gemini(runtime)?),
    ));
    let (queue, worker) = spawn_worker(shared(job.policy), processor);
    queue.submit_all(inputs);
    queue.shutdown();
    worker.await.context("Queue worker crashed")?;

    let items = queue.snapshot();
    for item in &items {
        print_item(item);
    }

    let rows = rows_from_items(&items);
    match &job.csv_output {
        Some(path) => {
            write_csv(path, &rows).await?;
            println!("Wrote {} rows to {}", rows.len(), path.display());
        }
        None => print!("{}", to_csv(&rows)),
    }

    if job.write_tags {
        write_tags(runtime, &items).await?;
    }

    let summary = queue.summary();
    if summary.failed > 0 {
        bail!("{} of {} images failed", summary.failed, items.len());
    }
    Ok(())
}

fn print_item(item: &QueueItem) {
    match (&item.status, &item.result, &item.error) {
        (ItemStatus::Success, Some(result), _) => {
            println!("[success] {}: {}", item.file.name, result.title)
        }
        (_, _, Some(error)) => println!("[error] {}: {}", item.file.name, error),
        (status, _, _) => println!("[{:?}] {}", status, item.file.name),
    }
}

async fn write_tags(runtime: &RuntimeConfig, items: &[QueueItem]) -> Result<()> {
    let exiftool = ExifTool::spawn(&runtime.exiftool_path, runtime.exif_task_timeout)
        .await
        .context("Failed to start exiftool")?;
    for item in items {
        let Some(result) = &item.result else {
            continue;
        };
        let path = item.file.path.to_string_lossy();
        let outcome = save_metadata(&exiftool, &path, result).await;
        match outcome.error {
            None => println!("[tags] {}: written", item.file.name),
            Some(error) => println!("[tags] {}: {}", item.file.name, error),
        }
    }
    exiftool.shutdown().await?;
    Ok(())
}

async fn run_prompts(
    runtime: &RuntimeConfig,
    store: &SettingsStore,
    request: PipelineRequest,
    json: bool,
) -> Result<()> {
    let settings = store.load();
    let candidates = settings.candidate_keys(runtime.fallback_credential.as_deref());
    let factory = gemini(runtime)?;
    let progress = |p: &PipelineProgress| eprintln!("[{}]", p.stage.tag());

    let output = run_pipeline(
        &request,
        &settings.model,
        &candidates,
        &factory,
        Some(&progress),
    )
    .await
    .map_err(|e| anyhow!(e.user_message()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    if output.prompts.is_empty() {
        println!("The model returned no usable prompts.");
    }
    for (i, prompt) in output.prompts.iter().enumerate() {
        println!("{}. {}", i + 1, prompt.prompt);
        if let Some(negative) = &prompt.negative_prompt {
            println!("   negative: {negative}");
        }
    }
    Ok(())
}

async fn run_bulk_prompts(
    runtime: &RuntimeConfig,
    store: &SettingsStore,
    request: BulkPromptRequest,
    json: bool,
) -> Result<()> {
    let settings = store.load();
    let candidates = settings.candidate_keys(runtime.fallback_credential.as_deref());
    let factory = gemini(runtime)?;

    let output = generate_bulk_prompts(&request, &settings.model, &candidates, &factory)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    if output.prompts.is_empty() {
        println!("The model returned no usable prompts.");
    }
    for (i, prompt) in output.prompts.iter().enumerate() {
        println!("{}. {prompt}", i + 1);
    }
    Ok(())
}

async fn run_keys(runtime: &RuntimeConfig, store: &SettingsStore, action: KeyAction) -> Result<()> {
    match action {
        KeyAction::Add { key, label } => {
            let settings = store.add_credential(&key, label)?;
            println!(
                "Added key {} ({} configured)",
                mask_key(key.trim()),
                settings.api_keys.len()
            );
        }
        KeyAction::Remove { key } => {
            store.remove_credential(&key)?;
            println!("Removed key {}", mask_key(key.trim()));
        }
        KeyAction::List => {
            let settings = store.load();
            if settings.api_keys.is_empty() {
                println!("No API keys configured.");
            }
            for (i, credential) in settings.api_keys.iter().enumerate() {
                match &credential.label {
                    Some(label) => println!("{}. {} ({})", i + 1, label, mask_key(&credential.key)),
                    None => println!("{}. {}", i + 1, mask_key(&credential.key)),
                }
            }
            if runtime.fallback_credential.is_some() {
                println!("Fallback key from environment is tried last.");
            }
        }
        KeyAction::Test { key } => {
            let settings = store.load();
            let keys: Vec<String> = match key {
                Some(key) => vec![key],
                None => settings.api_keys.iter().map(|c| c.key.clone()).collect(),
            };
            if keys.is_empty() {
                bail!("No API keys to test");
            }
            let factory = gemini(runtime)?;
            for key in keys {
                let probe = probe_credential(&factory, &settings.model, &key).await;
                let status = match probe.status {
                    KeyStatus::Valid => "valid",
                    KeyStatus::Invalid => "invalid",
                    KeyStatus::RateLimited => "rate-limited",
                };
                match probe.message {
                    Some(message) => println!("{}: {} ({})", mask_key(&key), status, message),
                    None => println!("{}: {}", mask_key(&key), status),
                }
            }
        }
    }
    Ok(())
}

fn masked(settings: &AppSettings) -> AppSettings {
    let mut shown = settings.clone();
    for credential in &mut shown.api_keys {
        credential.key = mask_key(&credential.key);
    }
    shown
}

fn run_settings(store: &SettingsStore, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let settings = store.load();
            println!("{}", serde_json::to_string_pretty(&masked(&settings))?);
        }
        SettingsAction::Set {
            model,
            creativity,
            auto_metadata,
            title_length,
            description_length,
            keyword_count,
        } => {
            if let Some(model) = &model {
                if !SUPPORTED_MODELS.iter().any(|(id, _)| *id == model.as_str()) {
                    tracing::warn!(model = %model, "Model is not in the supported list");
                }
            }
            let settings = store.update(|s| {
                if let Some(model) = model {
                    s.model = model;
                }
                if let Some(creativity) = creativity {
                    s.creativity_level = creativity;
                }
                if let Some(auto) = auto_metadata {
                    s.use_auto_metadata = auto;
                }
                if let Some(n) = title_length {
                    s.title_length = n;
                }
                if let Some(n) = description_length {
                    s.description_length = n;
                }
                if let Some(n) = keyword_count {
                    s.keyword_count = n;
                }
            })?;
            println!("Settings saved to {}", store.path().display());
            println!("{}", serde_json::to_string_pretty(&masked(&settings))?);
        }
    }
    Ok(())
}
