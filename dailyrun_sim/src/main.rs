//! Daily Run DST Simulator CLI
//!
//! Run deterministic simulation scenarios against the competition engine.

use clap::Parser;
use dailyrun_sim::{ScenarioId, ScenarioResult, ScenarioRunner, SimExport, StoreKind};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Daily Run Deterministic Simulation Testing CLI
#[derive(Parser, Debug)]
#[command(name = "dailyrun-sim")]
#[command(about = "Run deterministic simulation tests for the daily run engine", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,
    
    /// Number of registered players
    #[arg(short, long, default_value = "50")]
    players: usize,
    
    /// Scenario to run (seed_stampede, score_storm, wave_creep, purge_and_restore, week_rollover, banned_player, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,
    
    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,
    
    /// Store backend (memory, sled)
    #[arg(long, default_value = "memory")]
    store: String,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    
    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
    
    /// Export the final leaderboards to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn exit_with(message: &str, hint: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("{}", hint);
    std::process::exit(1);
}

fn main() {
    let args = Args::parse();
    
    // Initialize logging; RUST_LOG wins when set
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: tracing subscriber already installed");
    }
    
    if !args.json {
        info!("Daily Run DST Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
    
    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => exit_with(
                &e,
                "Available scenarios: seed_stampede, score_storm, wave_creep, purge_and_restore, week_rollover, banned_player, all",
            ),
        }
    };
    
    let store: StoreKind = match args.store.parse() {
        Ok(store) => store,
        Err(e) => exit_with(&e, "Available stores: memory, sled"),
    };
    
    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };
    
    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            exit_with("--export only supports a single scenario, not 'all'", "Pick one with --scenario");
        }
        let scenario = scenarios[0];
        
        info!("Running with export to: {}", export_path);
        let result = ScenarioRunner::new(base_seed, args.players).with_store(store).run(scenario);
        
        let mut export = SimExport::new(scenario.name(), base_seed, store.name());
        export.finalize(result.passed, result.failure_reason.clone(), result.snapshot.clone());
        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {:?}", e);
        } else {
            info!("Exported leaderboards to {}", export_path);
        }
        
        if result.passed {
            info!("✓ {} (seed={}) PASSED", scenario.name(), base_seed);
        } else {
            error!(
                "✗ {} FAILED: {}",
                scenario.name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        return;
    }
    
    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;
    
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed, args.players).with_store(store);
        
        for scenario in &scenarios {
            let result = runner.run(*scenario);
            
            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED [{} submissions, {} checks]",
                        scenario.name(),
                        seed,
                        result.metrics.submissions,
                        result.metrics.checks
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            
            if !result.passed {
                failed_count += 1;
            }
            
            all_results.push(result);
        }
    }
    
    // Summary
    let total = all_results.len();
    let passed = total - failed_count;
    
    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "store": store.name(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "final_day": r.final_day.map(|d| d.to_string()),
                    "submissions": r.metrics.submissions,
                    "seed_requests": r.metrics.seed_requests,
                    "lifecycle_ops": r.metrics.lifecycle_ops,
                    "days": r.metrics.days_simulated,
                    "checks": r.metrics.checks,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            
            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }
    
    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
