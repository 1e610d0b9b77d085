use clap::Parser;

use ollama_deproxy::cache::hash::{fastest, measure_hash_speed, BenchmarkParams};
use ollama_deproxy::cache::HashAlgorithm;
use ollama_deproxy::observability::logging;

#[derive(Parser)]
#[command(name = "hash-bench")]
#[command(about = "Benchmark cache-key digest algorithms", long_about = None)]
struct Cli {
    /// Bytes hashed per iteration.
    #[arg(long, default_value_t = 1024 * 1024)]
    data_size: usize,

    /// Hashes per timed run.
    #[arg(long, default_value_t = 256)]
    iterations: u32,

    /// Timed runs per algorithm.
    #[arg(long, default_value_t = 5)]
    repeat: u32,

    /// Untimed hashes before measuring.
    #[arg(long, default_value_t = 8)]
    warmup: u32,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    let params = BenchmarkParams {
        data_size: cli.data_size,
        iterations: cli.iterations,
        repeat: cli.repeat,
        warmup_rounds: cli.warmup,
    };

    let speeds = measure_hash_speed(&params);
    let mut rows: Vec<_> = speeds.iter().collect();
    rows.sort_by(|a, b| b.1.total_cmp(a.1));

    println!("{:<10} {:>12}", "ALGORITHM", "MiB/s");
    for (algorithm, mib) in rows {
        println!("{:<10} {:>12.1}", algorithm.name(), mib);
    }

    let best = fastest(&speeds).unwrap_or(HashAlgorithm::FALLBACK);
    println!("\nFastest: {best}  (pin with HASH_ALGORITHM={best})");
}
