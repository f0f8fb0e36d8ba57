use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use machine_core::{load_settings, Identifiable, JobProcessor, Machine, OperationError};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod layout;
mod sim;

#[derive(Parser, Debug)]
#[command(about = "Drive a simulated machine through its command sequencer")]
struct Cli {
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long, default_value = "layout.toml")]
    layout: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the configured resources as JSON.
    Describe,
    /// Home every head through the sequencer.
    Home {
        #[arg(long)]
        ignore_enabled: bool,
        #[arg(long)]
        enable: bool,
    },
    /// Queue a batch of operations, one of which fails.
    Demo {
        #[arg(long, default_value_t = 5)]
        operations: usize,
        #[arg(long, default_value_t = 3)]
        fail_at: usize,
        #[arg(long)]
        disabled: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref())?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let layout = layout::load_layout(&cli.layout)?;
    let machine = Arc::new(
        layout
            .builder(settings)?
            .build()
            .context("failed to commit machine configuration")?,
    );

    match cli.command {
        Command::Describe => describe(&machine)?,
        Command::Home {
            ignore_enabled,
            enable,
        } => {
            if enable {
                machine.set_enabled(true)?;
            }
            match machine.submit_home(ignore_enabled).wait() {
                Ok(()) => println!("homed {} head(s)", machine.heads().len()),
                Err(err) => println!("homing did not complete: {err}"),
            }
        }
        Command::Demo {
            operations,
            fail_at,
            disabled,
        } => demo(&machine, operations, fail_at, disabled)?,
    }

    Ok(())
}

fn describe(machine: &Machine) -> Result<()> {
    let ids = |items: Vec<String>| serde_json::Value::from(items);
    let processors: serde_json::Map<String, serde_json::Value> = machine
        .job_processors()
        .iter()
        .map(|(kind, processor)| (kind.to_string(), processor.name().into()))
        .collect();

    let summary = serde_json::json!({
        "enabled": machine.is_enabled(),
        "default_head": machine.default_head().map(|head| head.id().to_string()),
        "heads": ids(machine.heads().iter().map(|h| h.id().to_string()).collect()),
        "feeders": ids(machine.feeders().iter().map(|f| f.id().to_string()).collect()),
        "cameras": ids(machine.cameras().iter().map(|c| c.id().to_string()).collect()),
        "job_processors": processors,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn demo(machine: &Machine, operations: usize, fail_at: usize, disabled: bool) -> Result<()> {
    if !disabled {
        machine.set_enabled(true)?;
    }

    let handles: Vec<_> = (1..=operations)
        .map(|step| {
            machine.submit(move || {
                if step == fail_at {
                    anyhow::bail!("step {step} failed on purpose");
                }
                info!(step, "demo step ran");
                Ok(step)
            })
        })
        .collect();

    for (index, handle) in handles.into_iter().enumerate() {
        let step = index + 1;
        match handle.wait() {
            Ok(value) => println!("step {step}: ok ({value})"),
            Err(OperationError::Cancelled) => println!("step {step}: cancelled"),
            Err(err) => println!("step {step}: {err}"),
        }
    }
    println!("sequencer: {:?}", machine.sequencer_phase());
    Ok(())
}
