//! `aika`: a thin CLI for local inspection/smoke-testing of the historian
//! core against an in-memory store. Not a production server — admin HTTP
//! controllers, auth, and persistence live in the surrounding application,
//! which this crate treats as an external collaborator (spec.md §1).

use std::sync::Arc;

use aika_core::aggregate::AggFn;
use aika_core::cancel::CancellationToken;
use aika_core::config::HistorianConfig;
use aika_core::hub::SubscriptionHub;
use aika_core::model::{DataType, DeviationKind, FilterConfig, Page, Quality, Sample, TagFilter, TagSettings};
use aika_core::pipeline::WritePipeline;
use aika_core::reader::{IntervalOrCount, TagDataReader};
use aika_core::registry::TagRegistry;
use aika_core::storage::memory::MemoryStorage;
use aika_core::storage::StorageAdapter;
use aika_core::time::{parse_interval, parse_relative_time};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "aika", version, about = "Local inspection CLI for the Aika historian core")]
struct Cli {
    #[arg(long, global = true, default_value = "info", help = "tracing filter directive, e.g. 'info' or 'aika_core=debug'")]
    log_level: String,

    #[arg(long, global = true, help = "print the tag listing as JSON instead of debug output")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a tag, write a few demo samples through the pipeline, then read them back.
    Demo {
        #[arg(long, default_value = "Demo.Tag")]
        name: String,
        #[arg(long, value_enum, default_value_t = DataTypeArg::Float)]
        data_type: DataTypeArg,
        #[arg(long, default_value_t = 0.5)]
        exception_limit: f64,
        #[arg(long, default_value_t = 1.0)]
        compression_limit: f64,
    },
    /// Parse a relative-time or interval expression and print the result (spec.md §6).
    ParseTime {
        /// e.g. "* - 1h30m" for a relative time, or "1.5h" for an interval.
        expr: String,
        #[arg(long, help = "parse as an interval instead of a relative time")]
        interval: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DataTypeArg {
    Float,
    Integer,
    Text,
}

impl From<DataTypeArg> for DataType {
    fn from(v: DataTypeArg) -> Self {
        match v {
            DataTypeArg::Float => DataType::FloatingPoint,
            DataTypeArg::Integer => DataType::Integer,
            DataTypeArg::Text => DataType::Text,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _ = aika_core::logging::init_logging(&cli.log_level);

    match cli.command {
        Command::Demo { name, data_type, exception_limit, compression_limit } => {
            run_demo(&name, data_type.into(), exception_limit, compression_limit, cli.json)
        }
        Command::ParseTime { expr, interval } => {
            if interval {
                let d = parse_interval(&expr)?;
                println!("{expr} -> {} s", d.num_seconds());
            } else {
                let parsed = parse_relative_time(&expr, Utc::now())?;
                println!("{expr} -> {parsed}");
            }
            Ok(())
        }
    }
}

fn run_demo(
    name: &str,
    data_type: DataType,
    exception_limit: f64,
    compression_limit: f64,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = TagRegistry::new();
    let def = registry.create(
        "cli",
        TagSettings {
            name: name.to_string(),
            data_type,
            units: "unit".into(),
            description: "created by `aika demo`".into(),
            state_set_name: None,
            exception_cfg: FilterConfig {
                enabled: true,
                deviation_kind: DeviationKind::Absolute,
                limit: exception_limit,
                window: chrono::Duration::hours(1),
            },
            compression_cfg: FilterConfig {
                enabled: true,
                deviation_kind: DeviationKind::Absolute,
                limit: compression_limit,
                window: chrono::Duration::hours(1),
            },
            owner: "cli".into(),
            policies: vec![],
        },
    )?;

    let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());
    let hub = SubscriptionHub::new(8);
    let pipeline = WritePipeline::new(registry.clone(), storage.clone(), hub, HistorianConfig::default());
    let reader = TagDataReader::new(registry.clone(), storage);
    let cancel = CancellationToken::none();

    let now = Utc::now();
    let samples: Vec<Sample> = (0..10)
        .map(|i| Sample::numeric(now + chrono::Duration::seconds(i), (i as f64).sin() * 5.0 + 10.0, Quality::Good, "unit"))
        .collect();

    let summary = pipeline.write_snapshot("cli", &def.name, samples, &cancel)?;
    println!("write summary: {summary:?}");

    let snapshot = pipeline.snapshot(def.id, &cancel)?;
    println!("current snapshot: {snapshot:?}");

    let t0 = now;
    let t1 = now + chrono::Duration::seconds(9);
    let averaged = reader.read_processed(&cancel, &def.name, AggFn::Average, t0, t1, IntervalOrCount::Interval(chrono::Duration::seconds(3)))?;
    println!("averaged: {averaged:?}");

    let tags = registry.list(&TagFilter::Any, Page { page_size: 10, page: 1 })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else {
        println!("tags: {:?}", tags.iter().map(|t| &t.name).collect::<Vec<_>>());
    }

    Ok(())
}
