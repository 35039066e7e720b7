use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use tabletio::{SplitOptions, TableRef, WriterConfig};

/// Runtime configuration for the `tabletio-driver` binary.
///
/// Every value is parsed from CLI arguments or environment variables. The
/// defaults load a small table and scan it on every available core.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tabletio-driver",
    version,
    about = "Load, split and scan an in-process table with tabletio"
)]
pub struct CliArgs {
    /// Table identifier to load and scan.
    ///
    /// Environment variable: `TABLE`
    #[arg(long, env = "TABLE", default_value_t = String::from("driver"))]
    pub table: String,

    /// Number of rows written during the load phase.
    ///
    /// Environment variable: `ROWS`
    #[arg(long, env = "ROWS", default_value_t = 100_000)]
    pub rows: u64,

    /// Size of the single cell value stored in each row.
    ///
    /// Environment variable: `VALUE_BYTES`
    #[arg(long, env = "VALUE_BYTES", default_value_t = 256)]
    pub value_bytes: usize,

    /// Distance in bytes between consecutive sample keys reported by the
    /// store. Smaller values give the planner a finer view of the data.
    ///
    /// Environment variable: `SAMPLE_INTERVAL_BYTES`
    #[arg(long, env = "SAMPLE_INTERVAL_BYTES", default_value_t = 1 << 20)]
    pub sample_interval_bytes: u64,

    /// Desired size of one work unit.
    ///
    /// Environment variable: `DESIRED_UNIT_BYTES`
    #[arg(long, env = "DESIRED_UNIT_BYTES", default_value_t = 2 << 20)]
    pub desired_unit_bytes: u64,

    /// Number of scan workers. Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `WORKERS`
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,

    /// Admission ceiling: mutation batches in flight at once.
    ///
    /// Environment variable: `MAX_INFLIGHT_RPCS`
    #[arg(long, env = "MAX_INFLIGHT_RPCS", default_value_t = 10)]
    pub max_inflight_rpcs: usize,

    /// Mutations per batch call.
    ///
    /// Environment variable: `MAX_BATCH_SIZE`
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 100)]
    pub max_batch_size: usize,

    /// Rows returned per reader step.
    ///
    /// Environment variable: `BATCH_ROWS`
    #[arg(long, env = "BATCH_ROWS", default_value_t = 64)]
    pub batch_rows: usize,

    /// How often the rebalancing monitor looks for a straggler. Zero disables
    /// rebalancing.
    ///
    /// Environment variable: `REBALANCE_INTERVAL_MS`
    #[arg(long, env = "REBALANCE_INTERVAL_MS", default_value_t = 50)]
    pub rebalance_interval_ms: u64,

    /// Share of a straggler's unread range handed to a new unit.
    ///
    /// Environment variable: `REBALANCE_FRACTION`
    #[arg(long, env = "REBALANCE_FRACTION", default_value_t = 0.5)]
    pub rebalance_fraction: f64,

    /// Reject every n-th row during the load. Zero rejects nothing.
    ///
    /// Environment variable: `POISON_EVERY`
    #[arg(long, env = "POISON_EVERY", default_value_t = 0)]
    pub poison_every: u64,

    /// Seed for row keys and the split shuffle.
    ///
    /// Environment variable: `SEED`
    #[arg(long, env = "SEED", default_value_t = 0)]
    pub seed: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub table: TableRef,
    pub rows: u64,
    pub value_bytes: usize,
    pub sample_interval_bytes: u64,
    pub split_options: SplitOptions,
    pub workers: usize,
    pub writer: WriterConfig,
    pub batch_rows: usize,
    pub rebalance_interval: Option<Duration>,
    pub rebalance_fraction: f64,
    pub poison_every: Option<u64>,
    pub seed: u64,
    pub log_json: bool,
}

impl TryFrom<CliArgs> for DriverConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let workers = args.workers.unwrap_or_else(num_cpus::get);
        if workers == 0 {
            bail!("WORKERS must be greater than 0");
        }
        if args.rows == 0 {
            bail!("ROWS must be greater than 0");
        }
        if args.batch_rows == 0 {
            bail!("BATCH_ROWS must be greater than 0");
        }
        if args.sample_interval_bytes == 0 {
            bail!("SAMPLE_INTERVAL_BYTES must be greater than 0");
        }
        if !(args.rebalance_fraction > 0.0 && args.rebalance_fraction < 1.0) {
            bail!(
                "REBALANCE_FRACTION ({}) must lie strictly between 0 and 1",
                args.rebalance_fraction
            );
        }

        let table = TableRef::new(&args.table)?;
        let split_options = SplitOptions::new(args.desired_unit_bytes)?;
        let writer = WriterConfig::builder()
            .max_inflight_rpcs(args.max_inflight_rpcs)
            .max_batch_size(args.max_batch_size)
            .build()?;

        Ok(Self {
            table,
            rows: args.rows,
            value_bytes: args.value_bytes,
            sample_interval_bytes: args.sample_interval_bytes,
            split_options,
            workers,
            writer,
            batch_rows: args.batch_rows,
            rebalance_interval: (args.rebalance_interval_ms > 0)
                .then(|| Duration::from_millis(args.rebalance_interval_ms)),
            rebalance_fraction: args.rebalance_fraction,
            poison_every: (args.poison_every > 0).then_some(args.poison_every),
            seed: args.seed,
            log_json: args.log_json,
        })
    }
}
