//! Marchlands CLI - headless runner for the strategy simulation.
//!
//! - `marchlands simulate` - play a game with no human input and report the
//!   result

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use marchlands_core::{GameConfig, GameEngine};
use marchlands_protocol::{CivId, Event, TurnPhase};

#[derive(Parser)]
#[command(name = "marchlands")]
#[command(about = "Turn-based strategy simulation", version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a self-play game
    Simulate {
        /// Map and game seed (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,

        /// Maximum number of turns to play
        #[arg(long, default_value_t = 100)]
        turns: u32,

        /// Game config YAML
        #[arg(long)]
        config: Option<PathBuf>,

        /// Let the AI play human seats instead of leaving them idle
        #[arg(long)]
        all_ai: bool,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct CivReport {
    id: CivId,
    name: String,
    personality: String,
    eliminated: bool,
    units: usize,
    cities: usize,
    techs: usize,
    gold: i32,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    seed: u64,
    turn: u32,
    game_over: bool,
    winner: Option<CivId>,
    combats: u32,
    state_hash: u64,
    civs: Vec<CivReport>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Simulate {
            seed,
            turns,
            config,
            all_ai,
            json,
        } => simulate(seed, turns, config, all_ai, json),
    }
}

fn init_logging(verbose: bool, json: bool) {
    // RUST_LOG wins over the verbosity flag.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn simulate(
    seed: Option<u64>,
    turns: u32,
    config_path: Option<PathBuf>,
    all_ai: bool,
    json: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => GameConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GameConfig::default(),
    };
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if all_ai {
        config = config.all_ai();
    }

    let mut engine = GameEngine::from_config(&config).context("failed to set up game")?;
    info!(seed = config.seed, turns, "simulation started");

    let mut combats = 0u32;
    for _ in 0..turns {
        if engine.phase().is_game_over() {
            break;
        }
        let turn = engine.turn();
        let events = engine
            .end_turn()
            .with_context(|| format!("turn {turn} failed"))?;

        let mut turn_combats = 0u32;
        let mut produced = 0u32;
        let mut researched = 0u32;
        for event in &events {
            match event {
                Event::Combat { .. } => turn_combats += 1,
                Event::UnitProduced { .. } => produced += 1,
                Event::TechResearched { .. } => researched += 1,
                _ => {}
            }
        }
        combats += turn_combats;
        info!(
            turn,
            combats = turn_combats,
            produced,
            researched,
            living = engine.state().living_civs().count(),
            "turn summary"
        );
    }

    let report = build_report(&engine, config.seed, combats)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode report")?
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

fn build_report(engine: &GameEngine, seed: u64, combats: u32) -> Result<SimulationReport> {
    let state = engine.state();
    let (game_over, winner) = match engine.phase() {
        TurnPhase::GameOver { winner } => (true, winner),
        _ => (false, None),
    };

    let civs = state
        .civs
        .iter()
        .map(|civ| CivReport {
            id: civ.id,
            name: civ.name.clone(),
            personality: format!("{:?}", civ.personality).to_lowercase(),
            eliminated: civ.eliminated,
            units: state.units_of(civ.id).count(),
            cities: state.cities_of(civ.id).count(),
            techs: civ.tech.researched_count(),
            gold: civ.resources.gold,
        })
        .collect();

    Ok(SimulationReport {
        seed,
        turn: engine.turn(),
        game_over,
        winner,
        combats,
        state_hash: engine.state_hash().context("failed to hash final state")?,
        civs,
    })
}

fn print_report(report: &SimulationReport) {
    println!("Marchlands simulation (seed {})", report.seed);
    println!();
    match (report.game_over, report.winner) {
        (true, Some(winner)) => println!("Game over on turn {}: {} wins", report.turn, winner),
        (true, None) => println!("Game over on turn {}: no survivors", report.turn),
        (false, _) => println!("Stopped on turn {} with no winner", report.turn),
    }
    println!("Combats fought: {}", report.combats);
    println!("State hash: {:016x}", report.state_hash);
    println!();
    println!(
        "{:<6} {:<20} {:<11} {:>5} {:>6} {:>5} {:>6}",
        "civ", "name", "personality", "units", "cities", "techs", "gold"
    );
    for civ in &report.civs {
        let marker = if civ.eliminated { " (eliminated)" } else { "" };
        println!(
            "{:<6} {:<20} {:<11} {:>5} {:>6} {:>5} {:>6}{}",
            civ.id.to_string(),
            civ.name,
            civ.personality,
            civ.units,
            civ.cities,
            civ.techs,
            civ.gold,
            marker
        );
    }
}
