//! Concurrency and lifecycle scenarios for DST.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// DST-001: every caller races to issue the same day's seed
    SeedStampede,
    
    /// DST-002: concurrent submissions for the same runs
    ScoreStorm,
    
    /// DST-003: waves climb while scores stall; timestamps must not drift
    WaveCreep,
    
    /// DST-004: racing moderators delete and restore runs
    PurgeAndRestore,
    
    /// DST-005: ten days of play across a Sunday boundary
    WeekRollover,
    
    /// DST-006: banned players drop off both boards
    BannedPlayer,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SeedStampede,
            ScenarioId::ScoreStorm,
            ScenarioId::WaveCreep,
            ScenarioId::PurgeAndRestore,
            ScenarioId::WeekRollover,
            ScenarioId::BannedPlayer,
        ]
    }
    
    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SeedStampede => "seed_stampede",
            ScenarioId::ScoreStorm => "score_storm",
            ScenarioId::WaveCreep => "wave_creep",
            ScenarioId::PurgeAndRestore => "purge_and_restore",
            ScenarioId::WeekRollover => "week_rollover",
            ScenarioId::BannedPlayer => "banned_player",
        }
    }
    
    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SeedStampede => "4 callers per player issue today's seed at once; exactly one seed survives",
            ScenarioId::ScoreStorm => "Every player submits 8 times concurrently; stored bests match the oracle",
            ScenarioId::WaveCreep => "Sequential submissions with a moving clock; last_updated tracks score only",
            ScenarioId::PurgeAndRestore => "3 moderators per run race to delete, 2 to restore; one change each",
            ScenarioId::WeekRollover => "10 simulated days from Monday; weekly board resets on Sunday",
            ScenarioId::BannedPlayer => "A quarter of players banned then one unbanned; counts stay consistent",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "seed_stampede" | "seedstampede" | "dst-001" => Ok(ScenarioId::SeedStampede),
            "score_storm" | "scorestorm" | "dst-002" => Ok(ScenarioId::ScoreStorm),
            "wave_creep" | "wavecreep" | "dst-003" => Ok(ScenarioId::WaveCreep),
            "purge_and_restore" | "purgeandrestore" | "dst-004" => Ok(ScenarioId::PurgeAndRestore),
            "week_rollover" | "weekrollover" | "dst-005" => Ok(ScenarioId::WeekRollover),
            "banned_player" | "bannedplayer" | "dst-006" => Ok(ScenarioId::BannedPlayer),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

/// Which store backs a scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Memory,
    
    /// Throwaway on-disk sled database
    Sled,
}

impl StoreKind {
    pub fn name(&self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Sled => "sled",
        }
    }
}

impl std::str::FromStr for StoreKind {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreKind::Memory),
            "sled" => Ok(StoreKind::Sled),
            _ => Err(format!("Unknown store: {} (expected memory or sled)", s)),
        }
    }
}
