use anyhow::{Result, ensure};
use millionaire_game::{EndReason, MemoryBackend, PersistenceConfig, SessionStore, StorageBackend};
use std::sync::Arc;

use crate::logic::{PlayStrategy, SimulationPlan, SimulationSummary, TurnDecision};

// Logic test scenario
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: SimulationPlan,
}

impl TestScenario {
    #[must_use]
    pub fn simulation(name: impl Into<String>, plan: SimulationPlan) -> Self {
        Self {
            name: name.into(),
            plan,
        }
    }
}

struct CatalogEntry {
    key: &'static str,
    description: &'static str,
    build: fn() -> TestScenario,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        key: "smoke",
        description: "Random play reaches a valid ending and cleans up storage",
        build: smoke,
    },
    CatalogEntry {
        key: "perfect-run",
        description: "Fifteen correct answers win the top prize",
        build: perfect_run,
    },
    CatalogEntry {
        key: "checkpoint-fall",
        description: "A wrong sixth answer falls back to the first checkpoint",
        build: checkpoint_fall,
    },
    CatalogEntry {
        key: "late-fall",
        description: "A wrong thirteenth answer keeps the second checkpoint",
        build: late_fall,
    },
    CatalogEntry {
        key: "walk-away",
        description: "Walking away after seven banks the current prize",
        build: walk_away,
    },
    CatalogEntry {
        key: "timeout",
        description: "Letting the clock run out before a checkpoint pays nothing",
        build: timeout,
    },
    CatalogEntry {
        key: "resume-after-reload",
        description: "Reloading after every answer resumes the identical session",
        build: resume_after_reload,
    },
    CatalogEntry {
        key: "lifeline-usage",
        description: "Each lifeline is spent at most once and its hints are followed",
        build: lifeline_usage,
    },
    CatalogEntry {
        key: "storage-fallback",
        description: "A failing primary tier falls back to the secondary tier",
        build: storage_fallback,
    },
    CatalogEntry {
        key: "random-play",
        description: "Random answers always land on a ladder prize",
        build: random_play,
    },
];

/// Keys and descriptions of every scenario, in catalog order.
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    CATALOG
        .iter()
        .map(|entry| (entry.key, entry.description))
        .collect()
}

pub fn all_scenario_keys() -> Vec<String> {
    CATALOG.iter().map(|entry| entry.key.to_string()).collect()
}

pub fn get_scenario(key: &str) -> Option<TestScenario> {
    CATALOG
        .iter()
        .find(|entry| entry.key == key)
        .map(|entry| (entry.build)())
}

fn smoke() -> TestScenario {
    TestScenario::simulation(
        "Smoke",
        SimulationPlan::new(PlayStrategy::Random)
            .with_expectation(full_ladder_expectation)
            .with_expectation(cleanup_expectation),
    )
}

fn perfect_run() -> TestScenario {
    TestScenario::simulation(
        "Perfect Run",
        SimulationPlan::new(PlayStrategy::Perfect)
            .with_expectation(win_expectation)
            .with_expectation(cleanup_expectation),
    )
}

fn checkpoint_fall() -> TestScenario {
    TestScenario::simulation(
        "Checkpoint Fall",
        SimulationPlan::new(PlayStrategy::FallAt(5)).with_expectation(first_checkpoint_expectation),
    )
}

fn late_fall() -> TestScenario {
    TestScenario::simulation(
        "Late Fall",
        SimulationPlan::new(PlayStrategy::FallAt(12))
            .with_expectation(second_checkpoint_expectation),
    )
}

fn walk_away() -> TestScenario {
    TestScenario::simulation(
        "Walk Away",
        SimulationPlan::new(PlayStrategy::WalkAfter(7)).with_expectation(walk_away_expectation),
    )
}

fn timeout() -> TestScenario {
    TestScenario::simulation(
        "Timeout",
        SimulationPlan::new(PlayStrategy::TimeoutAt(3)).with_expectation(timeout_expectation),
    )
}

fn resume_after_reload() -> TestScenario {
    TestScenario::simulation(
        "Resume After Reload",
        SimulationPlan::new(PlayStrategy::Perfect)
            .with_reload_every(1)
            .with_expectation(resume_expectation)
            .with_expectation(win_expectation),
    )
}

fn lifeline_usage() -> TestScenario {
    TestScenario::simulation(
        "Lifeline Usage",
        SimulationPlan::new(PlayStrategy::LifelineSeeker).with_expectation(lifeline_expectation),
    )
}

fn storage_fallback() -> TestScenario {
    TestScenario::simulation(
        "Storage Fallback",
        SimulationPlan::new(PlayStrategy::Perfect)
            .with_store(failing_primary_store)
            .with_expectation(fallback_expectation)
            .with_expectation(win_expectation),
    )
}

fn random_play() -> TestScenario {
    TestScenario::simulation(
        "Random Play",
        SimulationPlan::new(PlayStrategy::Random).with_expectation(ladder_prize_expectation),
    )
}

fn failing_primary_store() -> SessionStore {
    let primary = MemoryBackend::new("primary");
    primary.set_failing(true);
    let tiers: Vec<Arc<dyn StorageBackend>> = vec![
        Arc::new(primary),
        Arc::new(MemoryBackend::new("secondary")),
    ];
    SessionStore::new(PersistenceConfig::default(), tiers)
}

fn full_ladder_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.questions_drawn == 15,
        "Expected 15 questions, drew {}",
        summary.questions_drawn
    );
    ensure!(
        summary.result.total_questions == summary.questions_drawn,
        "Result total {} disagrees with the session",
        summary.result.total_questions
    );
    Ok(())
}

fn cleanup_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        !summary.leftover_state,
        "Finished session {} is still in storage",
        summary.session_key
    );
    Ok(())
}

fn expect_ending(summary: &SimulationSummary, reason: EndReason, prize: &str) -> Result<()> {
    ensure!(
        summary.result.end_reason == reason,
        "Expected {reason}, got {}",
        summary.result.end_reason
    );
    ensure!(
        summary.result.final_prize == prize,
        "Expected prize {prize}, got {}",
        summary.result.final_prize
    );
    Ok(())
}

fn win_expectation(summary: &SimulationSummary) -> Result<()> {
    expect_ending(summary, EndReason::Win, "$1,000,000")?;
    ensure!(
        summary.result.answered_questions.len() == 15,
        "A win needs 15 answers"
    );
    Ok(())
}

fn first_checkpoint_expectation(summary: &SimulationSummary) -> Result<()> {
    expect_ending(summary, EndReason::Wrong, "$1,000")?;
    ensure!(
        summary.result.current_question_index == 5,
        "Should stop on question 6"
    );
    Ok(())
}

fn second_checkpoint_expectation(summary: &SimulationSummary) -> Result<()> {
    expect_ending(summary, EndReason::Wrong, "$32,000")?;
    ensure!(
        summary.result.last_answered_prize == "$125,000",
        "Twelve correct answers bank $125,000, got {}",
        summary.result.last_answered_prize
    );
    Ok(())
}

fn walk_away_expectation(summary: &SimulationSummary) -> Result<()> {
    expect_ending(summary, EndReason::WalkAway, "$4,000")?;
    ensure!(
        summary.result.last_checkpoint_prize == "$1,000",
        "Checkpoint after seven should be $1,000"
    );
    Ok(())
}

fn timeout_expectation(summary: &SimulationSummary) -> Result<()> {
    expect_ending(summary, EndReason::Timeout, "$0")
}

fn resume_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.reloads == 14,
        "Expected 14 reloads, saw {}",
        summary.reloads
    );
    ensure!(
        summary.resume_mismatches == 0,
        "{} reloads resumed a different state",
        summary.resume_mismatches
    );
    Ok(())
}

fn lifeline_expectation(summary: &SimulationSummary) -> Result<()> {
    let requested = summary
        .turns
        .iter()
        .filter(|turn| matches!(turn.decision, TurnDecision::UseLifeline(_)))
        .count();
    let used = summary.result.used_lifelines.used_count();
    ensure!(
        requested == used,
        "{requested} lifeline turns but {used} lifelines marked used"
    );
    // The first question is answered after 50:50 and the second after the poll.
    ensure!(used >= 2, "Expected at least two lifelines spent, got {used}");
    ensure!(
        summary.turns.first().and_then(|turn| turn.correct).is_none()
            && summary.turns.get(1).and_then(|turn| turn.correct) == Some(true),
        "50:50 must never hide the correct answer"
    );
    Ok(())
}

fn fallback_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.active_backend.as_deref() == Some("secondary"),
        "Expected saves on the secondary tier, active tier is {:?}",
        summary.active_backend
    );
    Ok(())
}

fn ladder_prize_expectation(summary: &SimulationSummary) -> Result<()> {
    let prize = summary.result.final_prize.as_str();
    let allowed: &[&str] = match summary.result.end_reason {
        EndReason::Win => &["$1,000,000"],
        EndReason::Wrong | EndReason::Timeout => &["$0", "$1,000", "$32,000"],
        EndReason::WalkAway => return Ok(()),
    };
    ensure!(
        allowed.contains(&prize),
        "{} ended with off-ladder prize {prize}",
        summary.result.end_reason
    );
    Ok(())
}
