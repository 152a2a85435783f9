use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use deferq_core::domain::{Callback, callback};
use deferq_core::{
    DiagnosticContext, ErrorHandler, GlobalOptions, OwnerKey, QueueDriver, QueueOptions, QueueSet,
    Settings, Target, TaskError,
};

#[derive(Parser)]
#[command(name = "deferq", about = "Deferred-task batching queue demo")]
struct Cli {
    /// TOML settings file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule a small batch of work and flush it.
    Demo {
        /// Report task failures to an error handler instead of aborting.
        #[arg(long)]
        isolate: bool,

        /// Run a single pass; work scheduled during it stays pending.
        #[arg(long)]
        no_continue: bool,

        /// Queue to schedule into.
        #[arg(long, default_value = "actions")]
        queue: String,
    },
    /// Print the effective settings as JSON.
    Settings,
}

#[derive(Debug, Deserialize)]
struct Revision {
    rev: u64,
}

/// Demo owner: a document that can be saved and re-rendered.
struct Document {
    key: OwnerKey,
}

impl Target for Document {
    fn identity(&self) -> Option<OwnerKey> {
        Some(self.key.clone())
    }

    fn method(&self, name: &str) -> Option<Callback> {
        let key = self.key.clone();
        match name {
            "save" => Some(callback(move |_, args| {
                let revision = args.first().cloned().unwrap_or(Value::Null);
                let Revision { rev } = serde_json::from_value::<Revision>(revision)
                    .map_err(TaskError::from_source)?;
                info!(document = %key, rev, "save");
                Ok(())
            })),
            "render" => Some(callback(move |_, args| {
                info!(document = %key, ?args, "render");
                Ok(())
            })),
            "validate" => Some(callback(move |_, _| {
                Err(TaskError::msg(format!("{key} is not valid")))
            })),
            _ => None,
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display())),
        None => Ok(Settings::default()),
    }
}

fn build_queues(settings: &Settings, isolate: bool) -> QueueSet {
    let mut global = GlobalOptions::from(settings);
    if isolate {
        global = global.with_error_handler(ErrorHandler::direct(|err, context| {
            tracing::warn!(error = %err, %context, "isolated task failure");
            Ok(())
        }));
    }

    let mut set = QueueSet::new(global);
    for name in &settings.queues {
        let before = name.clone();
        let after = name.clone();
        set.insert(
            name.clone(),
            QueueOptions::new()
                .before(move || info!(queue = %before, "pass start"))
                .after(move || info!(queue = %after, "pass end")),
        );
    }
    set
}

async fn run_demo(
    settings: Settings,
    isolate: bool,
    continue_if_more: bool,
    queue: String,
) -> anyhow::Result<()> {
    let driver = QueueDriver::spawn(settings, move |settings| build_queues(settings, isolate))
        .context("starting queue driver")?;

    let target = queue.clone();
    driver
        .run(move |queues| -> Result<(), deferq_core::QueueError> {
            let queue = queues.require(&target)?;
            let doc: deferq_core::Owner = Rc::new(Document {
                key: OwnerKey::new("doc-1"),
            });

            // Coalesced: one save with the latest arguments.
            queue.push_unique(
                Some(Rc::clone(&doc)),
                "save",
                vec![json!({ "rev": 1 })],
                DiagnosticContext::here().with_label("first save"),
            );
            queue.push(
                Some(Rc::clone(&doc)),
                "validate",
                vec![],
                DiagnosticContext::here().with_label("validate"),
            );
            queue.push_unique(
                Some(Rc::clone(&doc)),
                "save",
                vec![json!({ "rev": 2 })],
                DiagnosticContext::here().with_label("second save"),
            );

            // Scheduled from inside the flush; only drained with continuation.
            let reentrant = queue.clone();
            let owner = Rc::clone(&doc);
            queue.push(
                None,
                deferq_core::Method::direct(move |_, _| {
                    reentrant.push(
                        Some(Rc::clone(&owner)),
                        "render",
                        vec![Value::from("full")],
                        DiagnosticContext::here().with_label("render"),
                    );
                    Ok(())
                }),
                vec![],
                DiagnosticContext::here().with_label("schedule render"),
            );
            Ok(())
        })
        .await??;

    let flushed = driver.flush(&queue, Some(continue_if_more)).await;
    let stats = driver.stats(&queue).await?;
    driver.shutdown();

    match flushed {
        Ok(flush) => {
            println!("{}", serde_json::to_string_pretty(&json!({ "flush": flush, "queue": stats }))?);
            Ok(())
        }
        Err(err) => Err(err).context("flush aborted"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_ref())?;

    match cli.command {
        Command::Demo {
            isolate,
            no_continue,
            queue,
        } => run_demo(settings, isolate, !no_continue, queue).await,
        Command::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}
