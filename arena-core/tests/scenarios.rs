use arena_core::hazard::blast_footprint;
use arena_core::policy::{Ladder, PolicyConfig, Tactic};
use arena_core::snapshot::{BombRecord, DriveAck, MapSize, PlayerRecord, TickSnapshot};
use arena_core::tracker::{AwaitAck, TrackerState};
use arena_core::{
    AgentContext, Command, HazardIndex, Position, SideRequest, SkipReason, TileKind, Trace,
};

const ME: &str = "p1";
const RIVAL: &str = "p2";

fn player(id: &str, row: i32, col: i32, power: u32) -> PlayerRecord {
    PlayerRecord {
        id: id.to_string(),
        position: Position::new(row, col),
        blast_power: power,
        is_empowered: false,
        current_weapon: 0,
        lives_remaining: 3,
        cooldown_ms: 0,
        special_ability_ready: false,
        pairing_tokens: 0,
    }
}

fn bomb(owner: &str, row: i32, col: i32, power: u32, fuse: u64, created_at: u64) -> BombRecord {
    BombRecord {
        position: Position::new(row, col),
        owner_id: owner.to_string(),
        blast_power: power,
        remaining_fuse_ms: fuse,
        created_at,
    }
}

fn snapshot(
    id: u64,
    timestamp_ms: u64,
    map: &[&[u8]],
    players: Vec<PlayerRecord>,
    bombs: Vec<BombRecord>,
) -> TickSnapshot {
    TickSnapshot {
        id,
        timestamp_ms,
        size: MapSize {
            cols: map[0].len(),
            rows: map.len(),
        },
        map: map.iter().map(|row| row.to_vec()).collect(),
        players,
        bombs,
        items: Vec::new(),
        tag: None,
        tag_player_id: None,
        remaining_time_ms: 120_000,
    }
}

const OPEN_5X5_WITH_BOX: [&[u8]; 5] = [
    &[0, 0, 0, 0, 0],
    &[0, 0, 0, 0, 0],
    &[0, 0, 2, 0, 0],
    &[0, 0, 0, 0, 0],
    &[0, 0, 0, 0, 0],
];

fn mining_tick(agent: &mut AgentContext) -> arena_core::TickOutput {
    let first = snapshot(
        1,
        0,
        &OPEN_5X5_WITH_BOX,
        vec![player(ME, 2, 0, 2)],
        vec![],
    );
    agent.on_tick(&first)
}

#[test]
fn bomb_spot_then_retreat() {
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    let output = mining_tick(&mut agent);

    assert_eq!(output.trace, Trace::Decided { tactic: Tactic::Mine });
    // Drop in place at (2,0), then step right and up to (1,1).
    assert_eq!(output.command.as_ref().map(Command::to_string).as_deref(), Some("b23"));

    let plan = agent.tracker().plan();
    let grid = agent.grid().expect("grid kept");
    let drop_cell = plan.drop_at().expect("mining plan drops");
    let drop_at = grid.position_of(drop_cell);
    assert_eq!(drop_at.row, 2);
    assert!(drop_at.col <= 1);

    let footprint = blast_footprint(grid, drop_cell, 2);
    let retreat = plan.cells().last().expect("retreat cell");
    assert!(!footprint.contains(retreat));
    assert_eq!(grid.position_of(retreat), Position::new(1, 1));
    assert!(!agent.permissions().drop_device.is_allowed());
}

#[test]
fn hazard_override_selects_escape() {
    let map: [&[u8]; 5] = [&[0; 5], &[0; 5], &[0; 5], &[0; 5], &[0; 5]];
    let tick = snapshot(
        1,
        0,
        &map,
        vec![player(ME, 2, 2, 1), player(RIVAL, 0, 4, 1)],
        vec![bomb(RIVAL, 2, 3, 1, 300, 0)],
    );

    let config = PolicyConfig::default();
    let grid = arena_core::Grid::from_rows(5, 5, &tick.map).expect("grid");
    let hazards = HazardIndex::build(&grid, &tick.bombs, |_| None, config.critical_fuse_ms);
    let here = grid.index_of(Position::new(2, 2)).expect("cell");
    assert!(!hazards.can_arrive_safely(here, 0.0, &config.arrival()));

    let mut agent = AgentContext::new(ME, config);
    let output = agent.on_tick(&tick);
    assert_eq!(output.trace, Trace::Decided { tactic: Tactic::Escape });
    assert!(output.command.is_some());
    let target = agent.tracker().plan().cells().last().expect("escape target");
    assert!(!hazards.is_threatened(target));
}

#[test]
fn idle_timeout_clears_plan() {
    let boxes: [&[u8]; 1] = [&[0, 0, 0, 0, 0, 2, 2]];
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    let first = agent.on_tick(&snapshot(1, 0, &boxes, vec![player(ME, 0, 0, 1)], vec![]));
    assert!(first.command.is_some());
    assert!(agent.tracker().plan().len() >= 3);
    assert_eq!(agent.tracker().state(), TrackerState::Following);

    // Boxes gone and the agent never moved.
    let cleared: [&[u8]; 1] = [&[0, 0, 0, 0, 0, 0, 0]];
    let stuck = agent.on_tick(&snapshot(2, 1_500, &cleared, vec![player(ME, 0, 0, 1)], vec![]));
    assert!(agent.tracker().plan().is_empty());
    assert_eq!(agent.tracker().state(), TrackerState::Idle);
    assert_eq!(stuck.trace, Trace::NoDecision);
    // Timeout re-checks drop permission and no own bomb is active.
    assert!(agent.permissions().drop_device.is_allowed());
}

#[test]
fn one_command_in_flight() {
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    assert!(mining_tick(&mut agent).command.is_some());

    let own_bomb = || vec![bomb(ME, 2, 0, 2, 1_700, 1)];
    let moving = agent.on_tick(&snapshot(
        2,
        300,
        &OPEN_5X5_WITH_BOX,
        vec![player(ME, 2, 1, 2), player(RIVAL, 4, 4, 2)],
        own_bomb(),
    ));
    assert_eq!(moving.command, None);
    assert_eq!(moving.trace, Trace::Decided { tactic: Tactic::InFlight });
    assert_eq!(agent.tracker().in_flight(), Some(AwaitAck::PlanSettled));

    let arrived = agent.on_tick(&snapshot(
        3,
        600,
        &OPEN_5X5_WITH_BOX,
        vec![player(ME, 1, 1, 2), player(RIVAL, 4, 4, 2)],
        own_bomb(),
    ));
    assert_ne!(arrived.trace, Trace::Decided { tactic: Tactic::InFlight });
    assert!(agent.tracker().plan().is_empty() || arrived.command.is_some());
}

#[test]
fn missing_agent_skips_tick() {
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    let output = agent.on_tick(&snapshot(
        1,
        0,
        &OPEN_5X5_WITH_BOX,
        vec![player(RIVAL, 0, 0, 1)],
        vec![],
    ));
    assert_eq!(output.command, None);
    assert_eq!(
        output.trace,
        Trace::Skipped {
            reason: SkipReason::MissingAgent
        }
    );
    assert!(agent.state().is_none());
}

#[test]
fn ragged_map_skips_tick() {
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    let mut tick = snapshot(1, 0, &OPEN_5X5_WITH_BOX, vec![player(ME, 0, 0, 1)], vec![]);
    tick.map[3].pop();
    let output = agent.on_tick(&tick);
    assert_eq!(
        output.trace,
        Trace::Skipped {
            reason: SkipReason::MalformedSnapshot
        }
    );
}

#[test]
fn new_opponent_bomb_on_route_halts_until_acknowledged() {
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    assert!(mining_tick(&mut agent).command.is_some());

    // Rival bomb at (0,1) reaches (1,1), the pending retreat cell.
    let bombs = vec![bomb(ME, 2, 0, 2, 1_900, 1), bomb(RIVAL, 0, 1, 1, 2_000, 2)];
    let halted = agent.on_tick(&snapshot(
        2,
        100,
        &OPEN_5X5_WITH_BOX,
        vec![player(ME, 2, 0, 2), player(RIVAL, 0, 2, 1)],
        bombs.clone(),
    ));
    assert_eq!(halted.command, Some(Command::Halt));
    assert_eq!(halted.trace, Trace::Halted);
    assert!(agent.tracker().plan().is_empty());
    assert_eq!(agent.tracker().in_flight(), Some(AwaitAck::Stop));

    let waiting = agent.on_tick(&snapshot(
        3,
        200,
        &OPEN_5X5_WITH_BOX,
        vec![player(ME, 2, 0, 2), player(RIVAL, 0, 2, 1)],
        bombs.clone(),
    ));
    assert_eq!(waiting.command, None);

    let mut ack = snapshot(
        4,
        300,
        &OPEN_5X5_WITH_BOX,
        vec![player(ME, 2, 0, 2), player(RIVAL, 0, 2, 1)],
        bombs,
    );
    ack.tag = Some("player:stop-moving".to_string());
    ack.tag_player_id = Some(ME.to_string());
    let resumed = agent.on_tick(&ack);
    assert_ne!(resumed.trace, Trace::Decided { tactic: Tactic::InFlight });
    assert_ne!(resumed.trace, Trace::Halted);
}

#[test]
fn bomb_covering_only_the_reached_cell_does_not_halt() {
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    assert!(mining_tick(&mut agent).command.is_some());

    // Agent now stands on (2,1); the rival blast reaches it but not (1,1).
    let output = agent.on_tick(&snapshot(
        2,
        300,
        &OPEN_5X5_WITH_BOX,
        vec![player(ME, 2, 1, 2), player(RIVAL, 4, 4, 1)],
        vec![bomb(ME, 2, 0, 2, 1_700, 1), bomb(RIVAL, 3, 1, 1, 2_000, 2)],
    ));
    assert_ne!(output.trace, Trace::Halted);
    assert_eq!(output.command, None);
    assert_eq!(output.trace, Trace::Decided { tactic: Tactic::InFlight });
    assert_eq!(agent.tracker().plan().head(), Some(6));
    assert!(!agent.tracker().awaiting_halt());
}

#[test]
fn unacknowledged_halt_releases_after_cell_budget() {
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    assert!(mining_tick(&mut agent).command.is_some());

    let bombs = vec![bomb(ME, 2, 0, 2, 1_900, 1), bomb(RIVAL, 0, 1, 1, 2_000, 2)];
    let players = vec![player(ME, 2, 0, 2), player(RIVAL, 0, 2, 1)];
    let halted = agent.on_tick(&snapshot(
        2,
        100,
        &OPEN_5X5_WITH_BOX,
        players.clone(),
        bombs.clone(),
    ));
    assert_eq!(halted.trace, Trace::Halted);

    // Exactly one budget after the halt the gate still holds.
    let holding = agent.on_tick(&snapshot(
        3,
        1_100,
        &OPEN_5X5_WITH_BOX,
        players.clone(),
        bombs.clone(),
    ));
    assert_eq!(holding.command, None);
    assert_eq!(holding.trace, Trace::Decided { tactic: Tactic::InFlight });
    assert!(agent.tracker().awaiting_halt());
    assert_eq!(agent.tracker().in_flight(), Some(AwaitAck::Stop));

    let released = agent.on_tick(&snapshot(4, 1_101, &OPEN_5X5_WITH_BOX, players, bombs));
    assert!(!agent.tracker().awaiting_halt());
    assert_ne!(agent.tracker().in_flight(), Some(AwaitAck::Stop));
    assert_ne!(released.trace, Trace::Decided { tactic: Tactic::InFlight });
    assert_ne!(released.trace, Trace::Halted);
}

#[test]
fn halt_drive_ack_releases_gate() {
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    assert!(mining_tick(&mut agent).command.is_some());
    let bombs = vec![bomb(ME, 2, 0, 2, 1_900, 1), bomb(RIVAL, 0, 1, 1, 2_000, 2)];
    let players = vec![player(ME, 2, 0, 2), player(RIVAL, 0, 2, 1)];
    let halted = agent.on_tick(&snapshot(
        2,
        100,
        &OPEN_5X5_WITH_BOX,
        players.clone(),
        bombs.clone(),
    ));
    assert_eq!(halted.trace, Trace::Halted);

    // Movement acks and other agents' halts leave the gate closed.
    agent.on_drive_ack(&DriveAck {
        player_id: ME.to_string(),
        direction: "4".to_string(),
    });
    agent.on_drive_ack(&DriveAck {
        player_id: RIVAL.to_string(),
        direction: "x".to_string(),
    });
    assert!(agent.tracker().awaiting_halt());

    agent.on_drive_ack(&DriveAck {
        player_id: ME.to_string(),
        direction: "x".to_string(),
    });
    assert!(!agent.tracker().awaiting_halt());
    let resumed = agent.on_tick(&snapshot(3, 200, &OPEN_5X5_WITH_BOX, players, bombs));
    assert_ne!(resumed.trace, Trace::Decided { tactic: Tactic::InFlight });
}

#[test]
fn box_already_in_a_pending_blast_is_not_mined() {
    let map: [&[u8]; 3] = [&[0, 0, 0, 0, 2, 0], &[0, 0, 0, 0, 0, 0], &[0, 0, 0, 0, 0, 0]];
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    let output = agent.on_tick(&snapshot(
        1,
        0,
        &map,
        vec![player(ME, 2, 0, 1)],
        vec![bomb(RIVAL, 0, 5, 1, 3_000, 5)],
    ));
    assert_ne!(output.trace, Trace::Decided { tactic: Tactic::Mine });
    assert_eq!(output.command, None);
    assert_eq!(output.trace, Trace::NoDecision);
}

#[test]
fn matured_blast_scorches_grid_after_bomb_disappears() {
    let map: [&[u8]; 3] = [&[0, 0, 0, 1], &[0, 0, 0, 0], &[0, 0, 0, 0]];
    let mut agent = AgentContext::new(ME, PolicyConfig::default());
    agent.on_tick(&snapshot(
        1,
        0,
        &map,
        vec![player(ME, 2, 3, 1), player(RIVAL, 2, 0, 1)],
        vec![bomb(RIVAL, 0, 1, 2, 500, 7)],
    ));
    agent.on_tick(&snapshot(
        2,
        600,
        &map,
        vec![player(ME, 2, 3, 1), player(RIVAL, 2, 0, 1)],
        vec![],
    ));
    let grid = agent.grid().expect("grid kept");
    for (row, col) in [(0, 0), (0, 1), (0, 2), (1, 1), (2, 1)] {
        let cell = grid.index_of(Position::new(row, col)).expect("cell");
        assert_eq!(grid.kind(cell), Some(TileKind::HazardZone), "({row},{col})");
    }
    let wall = grid.index_of(Position::new(0, 3)).expect("cell");
    assert_eq!(grid.kind(wall), Some(TileKind::IndestructibleWall));

    agent.on_tick(&snapshot(
        3,
        2_600,
        &map,
        vec![player(ME, 2, 3, 1), player(RIVAL, 2, 0, 1)],
        vec![],
    ));
    let grid = agent.grid().expect("grid kept");
    let origin = grid.index_of(Position::new(0, 1)).expect("cell");
    assert_eq!(grid.kind(origin), Some(TileKind::Road));
}

#[test]
fn side_requests_are_rate_limited() {
    let map: [&[u8]; 1] = [&[0, 0, 0]];
    let mut me = player(ME, 0, 0, 1);
    me.is_empowered = true;
    me.current_weapon = 1;
    me.pairing_tokens = 1;
    let mut agent = AgentContext::new(ME, PolicyConfig::default());

    let first = agent.on_tick(&snapshot(1, 0, &map, vec![me.clone()], vec![]));
    assert!(first.side_requests.contains(&SideRequest::SwitchItem));
    assert!(first.side_requests.contains(&SideRequest::InitiatePairing));

    let soon = agent.on_tick(&snapshot(2, 400, &map, vec![me.clone()], vec![]));
    assert!(soon.side_requests.is_empty());

    let companion = player(&format!("{ME}_child"), 0, 2, 1);
    let later = agent.on_tick(&snapshot(3, 1_200, &map, vec![me, companion], vec![]));
    assert_eq!(later.side_requests, vec![SideRequest::SwitchItem]);
}

#[test]
fn special_ability_fires_along_facing() {
    let map: [&[u8]; 3] = [&[0; 6], &[0; 6], &[0; 6]];
    let ladder = Ladder::new(vec![Tactic::InFlight, Tactic::SpecialAbility]).expect("ladder");
    let config = PolicyConfig {
        ladder,
        ..PolicyConfig::default()
    };
    let mut agent = AgentContext::new(ME, config);

    let armed = |col| {
        let mut me = player(ME, 1, col, 1);
        me.is_empowered = true;
        me.current_weapon = 2;
        me.special_ability_ready = true;
        me
    };
    let first = agent.on_tick(&snapshot(1, 0, &map, vec![armed(0), player(RIVAL, 1, 5, 1)], vec![]));
    assert_eq!(first.trace, Trace::NoDecision);

    let second = agent.on_tick(&snapshot(2, 600, &map, vec![armed(1), player(RIVAL, 1, 5, 1)], vec![]));
    assert_eq!(second.trace, Trace::Decided { tactic: Tactic::SpecialAbility });
    assert_eq!(second.command, None);
    assert_eq!(
        second.side_requests,
        vec![SideRequest::UseAbility {
            target: RIVAL.to_string()
        }]
    );
    assert!(!agent.permissions().special_ability.is_allowed());
}
