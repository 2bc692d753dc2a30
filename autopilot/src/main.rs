use anyhow::{Context, Result};
use arena_autopilot::benchmark::{resolve_profiles, run_benchmark, BenchmarkConfig};
use arena_autopilot::config::AutopilotSettings;
use arena_autopilot::profiles::{describe_profiles, resolve_profile};
use arena_autopilot::runner::{load_recording, replay, write_command_log};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "arena-autopilot")]
#[command(about = "Offline replay and benchmarking for the arena agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded tick stream through one agent
    Replay {
        #[arg(long)]
        input: PathBuf,
        /// Profile id or path to a JSON policy config (default: AUTOPILOT_PROFILE)
        #[arg(long)]
        profile: Option<String>,
        /// Controlled agent id (default: PLAYER_ID)
        #[arg(long)]
        player_id: Option<String>,
        /// Command log destination (JSON lines)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replay every recording under every profile in parallel
    Bench {
        /// Comma-separated recording paths
        #[arg(long, value_delimiter = ',', required = true)]
        recordings: Vec<PathBuf>,
        /// Comma-separated profile ids (default: whole roster)
        #[arg(long)]
        profiles: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// List the profile roster
    ListProfiles,
    /// Print one profile as JSON
    ShowProfile {
        #[arg(long)]
        name: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Cli { command } = Cli::parse();
    let settings = AutopilotSettings::from_env();

    match command {
        Commands::Replay {
            input,
            profile,
            player_id,
            output,
        } => {
            let profile = profile.unwrap_or_else(|| settings.profile.clone());
            let player_id = player_id.unwrap_or_else(|| settings.player_id.clone());
            let mut policy = resolve_profile(&profile)?;
            settings.apply_to(&mut policy);

            let recording = load_recording(&input)?;
            let artifact = replay(&player_id, policy, &recording);

            let output = output.unwrap_or_else(|| {
                PathBuf::from(format!("replays/{player_id}-{}.jsonl", timestamp_suffix()))
            });
            write_command_log(&output, &artifact.outputs)?;

            let metrics = &artifact.metrics;
            println!("profile={profile}");
            println!("player_id={player_id}");
            println!("ticks={}", metrics.ticks);
            println!("skipped={}", metrics.skipped);
            println!("commands={}", metrics.commands);
            println!("halts={}", metrics.halts);
            println!("side_requests={}", metrics.side_requests);
            println!("max_in_flight={}", metrics.max_in_flight);
            for (tactic, count) in &metrics.tactics {
                println!("tactic.{tactic}={count}");
            }
            println!("no_decision={}", metrics.no_decision);
            println!("output={}", output.display());
        }
        Commands::Bench {
            recordings,
            profiles,
            out_dir,
            jobs,
        } => {
            let profiles = resolve_profiles(profiles.as_deref())?;
            let out_dir = out_dir
                .unwrap_or_else(|| PathBuf::from(format!("benchmarks/{}", timestamp_suffix())));

            let report = run_benchmark(BenchmarkConfig {
                profiles,
                recordings,
                settings,
                out_dir: out_dir.clone(),
                jobs,
            })?;

            println!("runs={}", report.run_count);
            println!(
                "jobs={}",
                report
                    .jobs
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "auto".to_string())
            );
            println!("out_dir={}", out_dir.display());
            println!("ranking:");
            for (idx, profile) in report.profile_rankings.iter().enumerate() {
                println!(
                    "  {}. {}  decided={:.1}% avg_commands={:.1} avg_halts={:.2} avg_skipped={:.1} max_in_flight={}",
                    idx + 1,
                    profile.profile,
                    profile.avg_decided_rate * 100.0,
                    profile.avg_commands,
                    profile.avg_halts,
                    profile.avg_skipped,
                    profile.max_in_flight,
                );
            }
        }
        Commands::ListProfiles => {
            for profile in describe_profiles() {
                let ladder: Vec<&str> = profile.ladder.iter().map(|tactic| tactic.name()).collect();
                println!("{:10} {}", profile.id, profile.description);
                println!("{:10} ladder={}", "", ladder.join(">"));
            }
        }
        Commands::ShowProfile { name } => {
            let policy = resolve_profile(&name)?;
            let encoded =
                serde_json::to_string_pretty(&policy).context("failed to serialize profile")?;
            println!("{encoded}");
        }
    }

    Ok(())
}

fn timestamp_suffix() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{now}")
}
