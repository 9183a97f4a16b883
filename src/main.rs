use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use snapflow::stages::source::resolve_location;
use snapflow::stages::{CommandClipboard, CopyToClipboard, FileSource, SaveToFile, UriToText};
use snapflow::{
    CommandChain, CommandRunner, Config, DataRouter, DataType, ProcessorChain, RunnerEvent,
    SharedStage, Stage, TaskEvent,
};

#[derive(Parser, Debug)]
#[command(name = "snapflow")]
#[command(
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SNAPFLOW_GIT_HASH"), ")"),
    about = "Route captured images and text through save and clipboard pipelines"
)]
struct Cli {
    /// Capture to process (path or file:// URI)
    #[arg(value_name = "INPUT")]
    input: String,

    /// Directory to save into (overrides [save].directory)
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Do not copy the result to the clipboard
    #[arg(long, action = ArgAction::SetTrue)]
    no_clipboard: bool,

    /// Do not save the capture to disk
    #[arg(long, action = ArgAction::SetTrue)]
    no_save: bool,

    /// Configuration file to use instead of ~/.config/snapflow/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print task events as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

/// Builds `source -> router{type -> branch}` for the requested outputs.
fn build_pipeline(cli: &Cli, config: &Config) -> anyhow::Result<SharedStage> {
    let path = resolve_location(&cli.input)?;
    if !path.is_file() {
        bail!("Input file not found: {}", path.display());
    }

    let save = !cli.no_save;
    let clipboard = !cli.no_clipboard && config.clipboard.enabled;
    if !save && !clipboard {
        bail!("Nothing to do: both saving and clipboard are disabled");
    }

    let copy: SharedStage = Arc::new(
        CopyToClipboard::new(Arc::new(CommandClipboard::new(&config.clipboard.command)))
            .with_weight(config.weights.clipboard),
    );

    let mut router = DataRouter::new("by-type");
    if save {
        let mut save_config = config.file_save_config();
        if let Some(dir) = &cli.save_dir {
            save_config.save_directory = dir.clone();
        }
        let mut branch = ProcessorChain::new("save").then(Arc::new(
            SaveToFile::new(save_config).with_weight(config.weights.save),
        ))?;
        if clipboard {
            branch = branch
                .then(Arc::new(UriToText::local_paths()))?
                .then(copy)?;
        }

        let branch: SharedStage = Arc::new(branch);
        for slot in [DataType::Image, DataType::Text, DataType::RawData] {
            router.connect(slot, Arc::clone(&branch))?;
        }
    } else {
        for slot in [DataType::Image, DataType::Text] {
            router.connect(slot, Arc::clone(&copy))?;
        }
    }

    let source = FileSource::new(path).with_weight(config.weights.read);
    let command = CommandChain::new("snapflow", Arc::new(source))?
        .then(Arc::new(router))
        .context("Input type has no route: binary data can only be saved")?;

    Ok(Arc::new(command))
}

fn print_event(event: &RunnerEvent, json: bool) {
    if json {
        let (kind, value) = match &event.event {
            TaskEvent::Started => ("started", serde_json::Value::Null),
            TaskEvent::Progress(p) => ("progress", serde_json::json!(p)),
            TaskEvent::Status(status) => ("status", serde_json::json!(status)),
            TaskEvent::Completed => ("completed", serde_json::Value::Null),
            TaskEvent::Canceled(reason) => ("canceled", serde_json::json!(reason.to_string())),
        };
        let line = serde_json::json!({
            "task": event.task_id.0,
            "command": event.command,
            "event": kind,
            "value": value,
        });
        println!("{}", line);
        return;
    }

    match &event.event {
        TaskEvent::Progress(p) => eprintln!("[{:>3.0}%]", p * 100.0),
        TaskEvent::Status(status) => println!("{}", status),
        TaskEvent::Completed => println!("Done."),
        TaskEvent::Started | TaskEvent::Canceled(_) => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let command = build_pipeline(&cli, &config)?;
    log::debug!(
        "Pipeline '{}' estimated weight {}",
        command.name(),
        command.time_estimate().weight()
    );

    let runner = CommandRunner::new();
    let mut events = runner.subscribe();

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handler")?;
    let cancel_runner = runner.clone();
    thread::spawn(move || {
        for sig in signals.forever() {
            log::info!("Received signal {} - canceling", sig);
            cancel_runner.cancel_all();
        }
    });

    let task = runner.run(command)?;

    while let Some(event) = events.recv().await {
        if event.task_id != task.id() {
            continue;
        }
        print_event(&event, cli.json);
        match event.event {
            TaskEvent::Completed => return Ok(()),
            TaskEvent::Canceled(reason) => {
                if reason.is_user_cancel() {
                    bail!("Canceled");
                }
                return Err(anyhow::anyhow!("{}", reason));
            }
            _ => {}
        }
    }

    bail!("Task {} ended without a final event", task.id())
}
