use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "fivlo-cli", version, about = "FIVLO focus sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive Pomodoro session
    Pomodoro(commands::session::PomodoroArgs),
    /// Run an interactive Time Attack session
    TimeAttack(commands::session::TimeAttackArgs),
    /// Print the default step plan for a goal
    Plan(commands::plan::PlanArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("FIVLO_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Pomodoro(args) => commands::session::run_pomodoro(args),
        Commands::TimeAttack(args) => commands::session::run_time_attack(args),
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
