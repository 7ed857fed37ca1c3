use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use path_compiler::{parse_instructions, Instruction};
use patrol_executor::mock::{LegScript, ScriptedNavigation};
use patrol_executor::{
    PatrolController, PatrolMetrics, PatrolOutcome, Route, RouteBook, RouteConfig,
    TracingAnnouncer, TracingLog,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "patrol",
    version,
    about = "Waypoint patrol planner and simulator",
    disable_help_subcommand = true
)]
struct Cli {
    /// Route book (YAML); built-in routes are used when the file is absent
    #[arg(long, global = true, default_value = "configs/patrol.yaml")]
    routes_file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum RouteArg {
    Corridor,
    Expo,
}

impl From<RouteArg> for Route {
    fn from(value: RouteArg) -> Self {
        match value {
            RouteArg::Corridor => Route::Corridor,
            RouteArg::Expo => Route::Expo,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List configured routes
    Routes {
        /// Print the full route book as YAML
        #[arg(long, action = ArgAction::SetTrue)]
        yaml: bool,
    },
    /// Compile a route and print its waypoints
    Compile {
        #[arg(long, value_enum, default_value_t = RouteArg::Corridor)]
        route: RouteArg,
        /// Emit JSON instead of a table
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Run a patrol against the scripted navigation backend
    Simulate {
        #[arg(long, value_enum, default_value_t = RouteArg::Corridor)]
        route: RouteArg,
        /// Make a leg fail N times before succeeding, as LEG:N (repeatable)
        #[arg(long = "fail", value_parser = parse_fail_spec)]
        fail: Vec<(usize, u32)>,
        /// Make a leg fail on every attempt (repeatable)
        #[arg(long = "block")]
        block: Vec<usize>,
        /// Simulated travel time per leg in milliseconds
        #[arg(long, default_value_t = 200u64)]
        travel_ms: u64,
        /// Override the countdown before the first leg
        #[arg(long)]
        start_delay_ms: Option<u64>,
        /// Print the report as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
        /// Print Prometheus metrics after the run
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
}

fn parse_fail_spec(s: &str) -> Result<(usize, u32), String> {
    let (leg, times) = s
        .split_once(':')
        .ok_or_else(|| format!("expected LEG:N, got '{s}'"))?;
    let leg = leg
        .trim()
        .parse()
        .map_err(|e| format!("invalid leg '{leg}': {e}"))?;
    let times = times
        .trim()
        .parse()
        .map_err(|e| format!("invalid count '{times}': {e}"))?;
    Ok((leg, times))
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let book = RouteBook::load(&cli.routes_file)?;

    match cli.command {
        Commands::Routes { yaml } => list_routes(&book, yaml),
        Commands::Compile { route, json } => compile_route(&book, route.into(), json),
        Commands::Simulate {
            route,
            fail,
            block,
            travel_ms,
            start_delay_ms,
            json,
            metrics,
        } => {
            let mut book = book;
            if let Some(ms) = start_delay_ms {
                book.executor.start_delay_ms = ms;
            }
            let mut nav =
                ScriptedNavigation::new().with_travel_time(Duration::from_millis(travel_ms));
            for (leg, times) in fail {
                nav = nav.script_leg(leg, LegScript::FailTimes(times));
            }
            for leg in block {
                nav = nav.script_leg(leg, LegScript::AlwaysFail);
            }
            simulate(book, route.into(), nav, json, metrics).await
        }
    }
}

fn list_routes(book: &RouteBook, yaml: bool) -> Result<()> {
    if yaml {
        print!("{}", book.to_yaml_string()?);
        return Ok(());
    }
    for (route, config) in &book.routes {
        let legs = count_legs(config)
            .with_context(|| format!("route {} does not compile", route.name()))?;
        let skippable: Vec<String> = config.skippable.iter().map(|l| l.to_string()).collect();
        println!(
            "{:<10} legs={:<3} skippable=[{}]",
            route.name(),
            legs,
            skippable.join(", ")
        );
    }
    Ok(())
}

/// Number of move legs in a route, rejecting malformed tokens.
fn count_legs(config: &RouteConfig) -> Result<usize> {
    let instructions = parse_instructions(config.instructions.as_slice())?;
    Ok(instructions
        .iter()
        .filter(|i| matches!(i, Instruction::Move(_)))
        .count())
}

fn compile_route(book: &RouteBook, route: Route, json: bool) -> Result<()> {
    let config = book
        .get(route)
        .ok_or_else(|| anyhow!("route {} not configured", route))?;
    let waypoints = path_compiler::compile_tokens(config.instructions.as_slice())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&waypoints)?);
        return Ok(());
    }
    for (i, wp) in waypoints.iter().enumerate() {
        let skip = if config.skippable.allows(i) {
            " (skippable)"
        } else {
            ""
        };
        println!(
            "{:>3}  {:<8} x={:>9.3} y={:>9.3} theta={:.3}{}",
            i + 1,
            wp.label.to_string(),
            wp.x,
            wp.y,
            wp.theta,
            skip
        );
    }
    Ok(())
}

async fn simulate(
    book: RouteBook,
    route: Route,
    nav: ScriptedNavigation,
    json: bool,
    print_metrics: bool,
) -> Result<()> {
    let metrics = PatrolMetrics::new().map_err(|e| anyhow!(e))?;
    let controller = Arc::new(PatrolController::with_metrics(
        Arc::new(nav),
        Arc::new(TracingAnnouncer),
        Arc::new(TracingLog),
        book,
        metrics.clone(),
    ));

    controller.start_patrol(route)?;
    info!("Simulating {} patrol (Ctrl-C to stop)", route);

    let interrupt = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping patrol");
                controller.stop_patrol();
            }
        })
    };

    let report = controller.wait().await;
    interrupt.abort();
    let report = report.ok_or_else(|| anyhow!("patrol task ended without a report"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match &report.outcome {
            PatrolOutcome::Finished => println!("Patrol {} finished", report.route),
            PatrolOutcome::Cancelled => println!(
                "Patrol {} stopped at leg {}",
                report.route,
                report.cursor.index + 1
            ),
            PatrolOutcome::Aborted(reason) => {
                println!("Patrol {} aborted: {}", report.route, reason)
            }
        }
        println!(
            "legs attempted={} failures={} skipped={:?}",
            report.attempted_legs().len(),
            report.failure_count(),
            report.skipped_legs()
        );
    }
    if print_metrics {
        print!("{}", metrics.encode_text());
    }
    Ok(())
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
