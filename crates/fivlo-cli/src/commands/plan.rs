use clap::Args;
use fivlo_core::fallback_plan;

#[derive(Args)]
pub struct PlanArgs {
    /// What you want to get done
    pub goal: String,
    /// Total time available, in minutes
    #[arg(long, default_value_t = 30)]
    pub minutes: u64,
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: PlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let goal = args.goal.trim();
    if goal.is_empty() {
        return Err("goal must not be empty".into());
    }
    let steps = fallback_plan(goal, args.minutes);
    if steps.is_empty() {
        return Err("no time to plan: --minutes must be at least 1".into());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }
    for (i, step) in steps.iter().enumerate() {
        println!(
            "{:>2}. {:<24} {}",
            i + 1,
            step.name,
            super::session::format_clock(step.total_seconds)
        );
    }
    Ok(())
}
