//! Emit one record through the configured pipeline.
//!
//! ```text
//! logship-emit [--sync] [--sink NAME] [--type operation|access|default] DESCRIPTION
//! ```
//!
//! Configuration comes from the environment (and `.env`), see
//! `PipelineConfig::from_env`.
//!
//! Logging:
//!   LOG_FORMAT  - "json" or "text" (default: "text")
//!   RUST_LOG    - standard env filter (default: info for the logship crates)

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logship_core::{DefaultLog, OperationLog, RecordKind, UserAccessLog};
use logship_dispatch::{CallOutcome, DeliveryState, LogCall, PipelineBuilder};

struct Args {
    description: String,
    kind: RecordKind,
    sink: Option<String>,
    sync: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut description = None;
    let mut kind = RecordKind::of::<DefaultLog>();
    let mut sink = None;
    let mut sync = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sync" => sync = true,
            "--sink" => sink = Some(args.next().context("--sink needs a value")?),
            "--type" => {
                kind = match args.next().context("--type needs a value")?.as_str() {
                    "operation" => RecordKind::of::<OperationLog>(),
                    "access" => RecordKind::of::<UserAccessLog>(),
                    "default" => RecordKind::of::<DefaultLog>(),
                    other => bail!("unknown record type: {}", other),
                }
            }
            _ if description.is_none() => description = Some(arg),
            _ => bail!("unexpected argument: {}", arg),
        }
    }

    Ok(Args {
        description: description.context("missing DESCRIPTION")?,
        kind,
        sink,
        sync,
    })
}

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            "logship_core=info,logship_db=info,logship_sinks=info,logship_dispatch=info,logship_emit=info"
                .into()
        });
    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = parse_args()?;
    let pipeline = PipelineBuilder::from_env().build().await;

    let mut call = LogCall::new(args.description)
        .with_kind(args.kind)
        .with_metadata("cli", "logship-emit", "EMIT")
        .with_async(!args.sync);
    if let Some(sink) = args.sink {
        call = call.with_sink(sink);
    }

    let state = pipeline.record(&call, &CallOutcome::new()).await;
    pipeline.shutdown().await;

    info!(state = %state, "Record emitted");
    if state == DeliveryState::Failed {
        bail!("record delivery failed");
    }
    Ok(())
}
