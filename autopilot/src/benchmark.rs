use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::AutopilotSettings;
use crate::profiles::{profile_ids, resolve_profile};
use crate::runner::{load_recording, replay, RecordingLine, ReplayMetrics};

#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    pub profiles: Vec<String>,
    pub recordings: Vec<PathBuf>,
    pub settings: AutopilotSettings,
    pub out_dir: PathBuf,
    pub jobs: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub profile: String,
    pub recording: String,
    pub decided_rate: f64,
    pub metrics: ReplayMetrics,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileAggregate {
    pub profile: String,
    pub runs: usize,
    pub avg_decided_rate: f64,
    pub avg_commands: f64,
    pub avg_halts: f64,
    pub avg_skipped: f64,
    pub max_in_flight: u64,
    pub tactics: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub generated_unix_s: u64,
    pub agent_id: String,
    pub jobs: Option<usize>,
    pub profiles: Vec<String>,
    pub recordings: Vec<String>,
    pub run_count: usize,
    pub profile_rankings: Vec<ProfileAggregate>,
    pub runs: Vec<RunRecord>,
}

pub fn resolve_profiles(input: Option<&str>) -> Result<Vec<String>> {
    match input {
        None => Ok(profile_ids().iter().map(|id| (*id).to_string()).collect()),
        Some(raw) => {
            let mut profiles = Vec::new();
            for token in raw.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                profiles.push(token.to_string());
            }
            if profiles.is_empty() {
                return Err(anyhow!("--profiles resolved to empty list"));
            }
            Ok(profiles)
        }
    }
}

pub fn run_benchmark(config: BenchmarkConfig) -> Result<BenchmarkReport> {
    if config.recordings.is_empty() {
        return Err(anyhow!("benchmark requires at least one recording"));
    }
    if config.profiles.is_empty() {
        return Err(anyhow!("benchmark requires at least one profile"));
    }
    if let Some(jobs) = config.jobs {
        if jobs == 0 {
            return Err(anyhow!("benchmark --jobs must be >= 1 when provided"));
        }
    }
    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("failed creating {}", config.out_dir.display()))?;

    // Fail on a bad profile or recording before any replay starts.
    let mut policies = HashMap::new();
    for profile in &config.profiles {
        let mut policy = resolve_profile(profile)?;
        config.settings.apply_to(&mut policy);
        policies.insert(profile.clone(), policy);
    }
    let mut recordings: Vec<(String, Vec<RecordingLine>)> = Vec::new();
    for path in &config.recordings {
        recordings.push((recording_label(path), load_recording(path)?));
    }

    let run_jobs: Vec<(&String, usize)> = config
        .profiles
        .iter()
        .flat_map(|profile| (0..recordings.len()).map(move |idx| (profile, idx)))
        .collect();

    let agent_id = config.settings.player_id.as_str();
    let run_one = |(profile, idx): &(&String, usize)| -> Result<RunRecord> {
        let policy = policies
            .get(*profile)
            .cloned()
            .ok_or_else(|| anyhow!("profile '{profile}' was not resolved"))?;
        let (label, recording) = &recordings[*idx];
        let artifact = replay(agent_id, policy, recording);
        Ok(RunRecord {
            profile: (*profile).clone(),
            recording: label.clone(),
            decided_rate: artifact.metrics.decided_rate(),
            metrics: artifact.metrics,
        })
    };

    let run_results: Vec<Result<RunRecord>> = if let Some(jobs) = config.jobs {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("failed to build rayon threadpool")?;
        pool.install(|| run_jobs.par_iter().map(run_one).collect())
    } else {
        run_jobs.par_iter().map(run_one).collect()
    };

    let mut runs = Vec::with_capacity(run_results.len());
    for result in run_results {
        runs.push(result?);
    }

    let mut grouped: HashMap<&str, Vec<&RunRecord>> = HashMap::new();
    for run in &runs {
        grouped.entry(run.profile.as_str()).or_default().push(run);
    }

    let mut rankings = Vec::new();
    for (profile, profile_runs) in grouped {
        let runs_count = profile_runs.len() as f64;
        let mut tactics = BTreeMap::new();
        for run in &profile_runs {
            for (tactic, count) in &run.metrics.tactics {
                *tactics.entry(tactic.clone()).or_default() += count;
            }
        }
        rankings.push(ProfileAggregate {
            profile: profile.to_string(),
            runs: profile_runs.len(),
            avg_decided_rate: profile_runs.iter().map(|r| r.decided_rate).sum::<f64>()
                / runs_count,
            avg_commands: profile_runs.iter().map(|r| r.metrics.commands).sum::<u64>() as f64
                / runs_count,
            avg_halts: profile_runs.iter().map(|r| r.metrics.halts).sum::<u64>() as f64
                / runs_count,
            avg_skipped: profile_runs.iter().map(|r| r.metrics.skipped).sum::<u64>() as f64
                / runs_count,
            max_in_flight: profile_runs
                .iter()
                .map(|r| r.metrics.max_in_flight)
                .max()
                .unwrap_or_default(),
            tactics,
        });
    }

    rankings.sort_by(|a, b| {
        b.avg_decided_rate
            .total_cmp(&a.avg_decided_rate)
            .then_with(|| a.avg_halts.total_cmp(&b.avg_halts))
            .then_with(|| a.profile.cmp(&b.profile))
    });

    runs.sort_by(|a, b| {
        a.profile
            .cmp(&b.profile)
            .then_with(|| a.recording.cmp(&b.recording))
    });

    write_rankings_csv(&config.out_dir.join("rankings.csv"), &rankings)?;

    let report = BenchmarkReport {
        generated_unix_s: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        agent_id: config.settings.player_id.clone(),
        jobs: config.jobs,
        profiles: config.profiles,
        recordings: recordings.iter().map(|(label, _)| label.clone()).collect(),
        run_count: runs.len(),
        profile_rankings: rankings,
        runs,
    };

    let report_path = config.out_dir.join("summary.json");
    fs::write(
        &report_path,
        serde_json::to_vec_pretty(&report).context("failed to serialize summary json")?,
    )
    .with_context(|| format!("failed writing {}", report_path.display()))?;

    Ok(report)
}

fn recording_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_rankings_csv(path: &Path, rows: &[ProfileAggregate]) -> Result<()> {
    let mut csv = String::from(
        "rank,profile,runs,avg_decided_rate,avg_commands,avg_halts,avg_skipped,max_in_flight\n",
    );
    for (idx, row) in rows.iter().enumerate() {
        csv.push_str(&format!(
            "{},{},{},{:.4},{:.2},{:.2},{:.2},{}\n",
            idx + 1,
            row.profile,
            row.runs,
            row.avg_decided_rate,
            row.avg_commands,
            row.avg_halts,
            row.avg_skipped,
            row.max_in_flight
        ));
    }
    fs::write(path, csv).with_context(|| format!("failed writing {}", path.display()))
}
