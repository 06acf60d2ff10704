//! Interactive terminal sessions driven by the real 1 Hz clock.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use fivlo_core::{
    fallback_plan, spawn_sync, Choice, Command, Config, Event, HttpTransport, IntervalClock,
    OfflineTransport, PendingDecision, Phase, PhaseKind, RewardDispatcher, SessionController,
    SessionDriver, SessionRequest, SessionTransport, TransitionPolicy,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Args)]
pub struct SessionOptions {
    /// Color tag shown next to the goal
    #[arg(long)]
    pub color: Option<String>,
    /// Keep everything local; never call the remote API
    #[arg(long)]
    pub offline: bool,
    /// Advance through every phase boundary without asking
    #[arg(long)]
    pub auto: bool,
    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PomodoroArgs {
    /// What you are focusing on
    pub goal: String,
    /// Focus length in minutes (defaults to config)
    #[arg(long)]
    pub focus: Option<u64>,
    /// Break length in minutes (defaults to config)
    #[arg(long = "break")]
    pub rest: Option<u64>,
    #[command(flatten)]
    pub options: SessionOptions,
}

#[derive(Args)]
pub struct TimeAttackArgs {
    /// What you want to get done
    pub goal: String,
    /// A step as NAME=DURATION (e.g. "sort=5m", "wipe=90s"). Repeatable.
    #[arg(long = "step", value_parser = parse_step)]
    pub steps: Vec<Phase>,
    /// Total minutes for the default plan when no steps are given
    #[arg(long, default_value_t = 30)]
    pub minutes: u64,
    #[command(flatten)]
    pub options: SessionOptions,
}

pub fn run_pomodoro(args: PomodoroArgs) -> CliResult {
    let config = with_durations(Config::load_or_default(), args.focus, args.rest);
    let request = config.pomodoro_request(&args.goal);
    run_session(request, config, args.options)
}

/// Command-line durations win over the configured ones for this run only.
fn with_durations(mut config: Config, focus: Option<u64>, rest: Option<u64>) -> Config {
    if let Some(focus) = focus {
        config.pomodoro.focus_minutes = focus;
    }
    if let Some(rest) = rest {
        config.pomodoro.break_minutes = rest;
    }
    config
}

pub fn run_time_attack(args: TimeAttackArgs) -> CliResult {
    let config = Config::load_or_default();
    let steps = if args.steps.is_empty() {
        fallback_plan(&args.goal, args.minutes)
    } else {
        args.steps
    };
    let request = SessionRequest::time_attack(args.goal, steps);
    run_session(request, config, args.options)
}

fn run_session(mut request: SessionRequest, config: Config, options: SessionOptions) -> CliResult {
    if let Some(color) = options.color.clone() {
        request = request.with_color(color);
    }
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(drive(request, config, options));
    // stdin reader may still be blocked on a read
    runtime.shutdown_background();
    result
}

fn transports(
    config: &Config,
    offline: bool,
) -> CliResult<(Arc<dyn SessionTransport>, Arc<dyn RewardDispatcher>)> {
    if offline || !config.remote.enabled {
        tracing::info!("running offline");
        let offline = Arc::new(OfflineTransport);
        return Ok((offline.clone(), offline));
    }
    let http = Arc::new(HttpTransport::from_config(&config.remote)?);
    Ok((http.clone(), http))
}

async fn drive(request: SessionRequest, config: Config, options: SessionOptions) -> CliResult {
    let (transport, rewards) = transports(&config, options.offline)?;
    let (sync, worker) = spawn_sync(transport, rewards);
    let transitions = if options.auto {
        TransitionPolicy {
            auto_advance_delay_secs: config.transitions.auto_advance_delay_secs,
            ..TransitionPolicy::automatic()
        }
    } else {
        config.transitions
    };
    let clock = IntervalClock::new(tokio::runtime::Handle::current());
    let mut controller = SessionController::new(Box::new(clock), sync, transitions, config.rewards);

    let render = Renderer { json: options.json };
    render.all(controller.create(&request)?);
    if !options.json {
        print_help();
    }
    render.all(controller.start());

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_commands(cmd_tx));
    let driver = tokio::spawn(SessionDriver::new(controller).run(cmd_rx, ev_tx));

    while let Some(event) = ev_rx.recv().await {
        render.one(&event);
    }
    let mut controller = driver.await?;

    // quitting abandons whatever is still live
    render.all(controller.reset());
    let grace = Duration::from_secs(config.remote.timeout_secs.max(1));
    render.all(controller.flush(grace).await);
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "sync worker did not shut down cleanly");
    }

    if let Some(session) = controller.session() {
        if options.json {
            println!("{}", serde_json::to_string(session)?);
        } else {
            println!(
                "\n{}: {} focused, {} cycle(s), {} coin(s)",
                session.goal_label,
                format_clock(session.elapsed_seconds),
                session.cycle_count,
                session.coins_earned
            );
        }
    }
    Ok(())
}

async fn read_commands(tx: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(cmd) = parse_command(&line) else {
            if !line.trim().is_empty() {
                print_help();
            }
            continue;
        };
        if tx.send(cmd).await.is_err() || cmd == Command::Quit {
            break;
        }
    }
}

fn parse_command(line: &str) -> Option<Command> {
    let cmd = match line.trim() {
        "p" | "pause" => Command::Pause,
        "r" | "resume" => Command::Resume,
        "b" | "break" => Command::Choose(Choice::TakeBreak),
        "s" | "skip" => Command::Choose(Choice::SkipBreak),
        "c" | "continue" => Command::Choose(Choice::Continue),
        "f" | "finish" => Command::Choose(Choice::Finish),
        "n" | "next" => Command::Choose(Choice::NextStep),
        "d" | "done" => Command::CompletePhase,
        "a" | "advance" => Command::Advance,
        "?" | "status" => Command::Status,
        "x" | "stop" => Command::Stop,
        "q" | "quit" => Command::Quit,
        _ => return None,
    };
    Some(cmd)
}

fn print_help() {
    println!(
        "keys: [p]ause [r]esume [d]one-with-phase [b]reak [s]kip-break [c]ontinue [f]inish [n]ext [?]status [x]stop [q]uit"
    );
}

/// Parse `NAME=DURATION`. A bare number is minutes; `s`, `m` and `h`
/// suffixes are accepted.
pub fn parse_step(raw: &str) -> Result<Phase, String> {
    let (name, duration) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=DURATION, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("step name missing in '{raw}'"));
    }
    let secs = parse_duration(duration.trim())?;
    if secs == 0 {
        return Err(format!("step '{name}' has no duration"));
    }
    Ok(Phase::step(name, secs))
}

fn parse_duration(raw: &str) -> Result<u64, String> {
    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, _)) => raw.split_at(i),
        None => (raw, "m"),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{raw}'"))?;
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(format!("unknown duration unit in '{raw}'")),
    };
    Ok(n.saturating_mul(scale))
}

pub fn format_clock(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
    } else {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

struct Renderer {
    json: bool,
}

impl Renderer {
    fn all(&self, events: Vec<Event>) {
        for event in &events {
            self.one(event);
        }
    }

    fn one(&self, event: &Event) {
        if self.json {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
            return;
        }
        match event {
            Event::Tick { remaining_secs } => {
                print!("\r  {} ", format_clock(*remaining_secs));
                let _ = std::io::stdout().flush();
            }
            Event::SessionCreated {
                goal_label,
                phase_count,
                ..
            } => println!("{goal_label}: {phase_count} phase(s) planned"),
            Event::TimerStarted {
                phase_kind,
                remaining_secs,
                ..
            } => println!("{} started, {} left", kind_label(*phase_kind), format_clock(*remaining_secs)),
            Event::TimerPaused { remaining_secs, .. } => {
                println!("\npaused at {}", format_clock(*remaining_secs))
            }
            Event::TimerResumed { remaining_secs, .. } => {
                println!("resumed, {} left", format_clock(*remaining_secs))
            }
            Event::PhaseStarted {
                name, total_secs, ..
            } => println!("\n{name}: {}", format_clock(*total_secs)),
            Event::PhaseCompleted {
                phase_kind,
                pending,
                ..
            } => {
                println!("\n{} complete", kind_label(*phase_kind));
                match pending {
                    Some(PendingDecision::BreakChoice) => println!("[b] take a break  [s] skip the break"),
                    Some(PendingDecision::ContinueChoice) => println!("[c] another round  [f] finish"),
                    Some(PendingDecision::NextStep) => println!("[n] next step"),
                    None => {}
                }
            }
            Event::StepProgress { remaining_steps, .. } => {
                println!("\n{remaining_steps} step(s) to go")
            }
            Event::CycleCompleted { cycle_count, .. } => println!("cycle {cycle_count} done"),
            Event::RewardRequested { .. } => {}
            Event::SessionFinished { elapsed_secs, .. } => {
                println!("\nfinished after {}", format_clock(*elapsed_secs))
            }
            Event::SessionReset { .. } => println!("\nsession stopped"),
            Event::Notice { message } => println!("\n{message}"),
            Event::StateSnapshot {
                status,
                phase_name,
                remaining_secs,
                total_secs,
                cycle_count,
                ..
            } => println!(
                "\n{status} | {phase_name} {}/{} | cycles {cycle_count}",
                format_clock(*remaining_secs),
                format_clock(*total_secs)
            ),
        }
    }
}

fn kind_label(kind: PhaseKind) -> &'static str {
    match kind {
        PhaseKind::Focus => "focus",
        PhaseKind::Break => "break",
        PhaseKind::Step => "step",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fivlo_core::SessionMode;

    #[test]
    fn flag_durations_override_config() {
        let defaults = Config::default();
        let config = with_durations(defaults.clone(), Some(50), None);
        let request = config.pomodoro_request("Read");
        assert_eq!(request.goal_label, "Read");
        assert_eq!(
            request.mode,
            SessionMode::Pomodoro {
                focus_secs: 3000,
                break_secs: defaults.pomodoro.break_minutes * 60,
            }
        );

        let untouched = with_durations(defaults.clone(), None, None);
        assert_eq!(untouched.pomodoro.focus_minutes, defaults.pomodoro.focus_minutes);
    }

    #[test]
    fn parse_step_accepts_units() {
        assert_eq!(parse_step("sort=5m").unwrap(), Phase::step("sort", 300));
        assert_eq!(parse_step("wipe=90s").unwrap().total_seconds, 90);
        assert_eq!(parse_step("deep clean=1h").unwrap().total_seconds, 3600);
        assert_eq!(parse_step("bin=3").unwrap().total_seconds, 180);
    }

    #[test]
    fn parse_step_rejects_garbage() {
        assert!(parse_step("sort").is_err());
        assert!(parse_step("=5m").is_err());
        assert!(parse_step("sort=0").is_err());
        assert!(parse_step("sort=5d").is_err());
        assert!(parse_step("sort=m").is_err());
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(parse_command(" p "), Some(Command::Pause));
        assert_eq!(parse_command("b"), Some(Command::Choose(Choice::TakeBreak)));
        assert_eq!(parse_command("done"), Some(Command::CompletePhase));
        assert_eq!(parse_command("q"), Some(Command::Quit));
        assert_eq!(parse_command("zzz"), None);
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(3725), "1:02:05");
    }
}
