use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use arena_core::{AgentContext, DriveAck, PolicyConfig, TickOutput, TickSnapshot, Trace};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One line of a recorded session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordingLine {
    Tick(TickSnapshot),
    Drive(DriveAck),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayMetrics {
    pub agent_id: String,
    pub ticks: u64,
    pub skipped: u64,
    pub commands: u64,
    pub halts: u64,
    pub side_requests: u64,
    pub drive_acks: u64,
    /// Tactic name to the number of ticks it decided.
    pub tactics: BTreeMap<String, u64>,
    pub no_decision: u64,
    /// Most commands observed between two releases of the in-flight gate.
    pub max_in_flight: u64,
}

impl ReplayMetrics {
    fn record(&mut self, output: &TickOutput, released: bool, outstanding: &mut u64) {
        self.ticks += 1;
        if released {
            *outstanding = 0;
        }
        if output.command.is_some() {
            self.commands += 1;
            *outstanding += 1;
            self.max_in_flight = self.max_in_flight.max(*outstanding);
        }
        self.side_requests += output.side_requests.len() as u64;
        match &output.trace {
            Trace::Skipped { .. } => self.skipped += 1,
            Trace::Halted => self.halts += 1,
            Trace::Decided { tactic } => {
                *self.tactics.entry(tactic.name().to_string()).or_default() += 1;
            }
            Trace::NoDecision => self.no_decision += 1,
        }
    }

    /// Share of evaluated ticks on which some tactic fired.
    pub fn decided_rate(&self) -> f64 {
        let evaluated = self.ticks.saturating_sub(self.skipped);
        if evaluated == 0 {
            return 0.0;
        }
        let decided: u64 = self.tactics.values().sum();
        decided as f64 / evaluated as f64
    }
}

#[derive(Clone, Debug)]
pub struct ReplayArtifact {
    pub outputs: Vec<TickOutput>,
    pub metrics: ReplayMetrics,
}

pub fn parse_recording(raw: &str) -> Result<Vec<RecordingLine>> {
    parse_lines(raw.lines().map(|line| Ok(line.to_string())))
}

pub fn load_recording(path: &Path) -> Result<Vec<RecordingLine>> {
    let file = fs::File::open(path).with_context(|| format!("failed opening {}", path.display()))?;
    parse_lines(BufReader::new(file).lines())
        .with_context(|| format!("failed loading recording {}", path.display()))
}

fn parse_lines<I>(lines: I) -> Result<Vec<RecordingLine>>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    let mut recording = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line.with_context(|| format!("failed reading line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry: RecordingLine = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid recording entry on line {}", idx + 1))?;
        recording.push(entry);
    }
    if recording.is_empty() {
        return Err(anyhow!("recording has no entries"));
    }
    Ok(recording)
}

/// Drive one agent through a recording, tick by tick.
pub fn replay(agent_id: &str, config: PolicyConfig, recording: &[RecordingLine]) -> ReplayArtifact {
    let mut agent = AgentContext::new(agent_id, config);
    let mut outputs = Vec::new();
    let mut metrics = ReplayMetrics {
        agent_id: agent_id.to_string(),
        ..ReplayMetrics::default()
    };
    let mut outstanding = 0;

    for entry in recording {
        match entry {
            RecordingLine::Drive(ack) => {
                metrics.drive_acks += 1;
                agent.on_drive_ack(ack);
            }
            RecordingLine::Tick(snapshot) => {
                let before = agent.tracker().in_flight();
                let output = agent.on_tick(snapshot);
                // The gate was released this tick if the previous command is gone,
                // or was replaced by a fresh one.
                let released = before.is_some()
                    && (agent.tracker().in_flight().is_none() || output.command.is_some());
                metrics.record(&output, released, &mut outstanding);
                debug!(tick = output.tick, trace = ?output.trace, "replayed tick");
                outputs.push(output);
            }
        }
    }

    info!(
        agent = agent_id,
        ticks = metrics.ticks,
        commands = metrics.commands,
        halts = metrics.halts,
        "replay finished"
    );
    ReplayArtifact { outputs, metrics }
}

/// Outbound log: one JSON document per tick that sent something.
pub fn write_command_log(path: &Path, outputs: &[TickOutput]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    let mut file =
        fs::File::create(path).with_context(|| format!("failed creating {}", path.display()))?;
    for output in outputs {
        if output.command.is_none() && output.side_requests.is_empty() {
            continue;
        }
        let line = serde_json::to_string(output).context("failed to serialize tick output")?;
        writeln!(file, "{line}").with_context(|| format!("failed writing {}", path.display()))?;
    }
    Ok(())
}
