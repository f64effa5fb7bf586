//! Step execution loop for a code-writing agent.
//!
//! Runs plan files (a task split into steps) through a bounded model loop
//! that executes `<python>`/`<bash>` blocks and validates `<final_answer>`.

use std::path::{Path, PathBuf};

use agent::core::types::Plan;
use agent::exit_codes;
use agent::io::backend::{ExecutionBackend, LocalBackend};
use agent::io::config::{AgentConfig, load_config, write_config};
use agent::io::conversation_log::RunLogDir;
use agent::io::model::OpenRouterClient;
use agent::io::plan_store::load_plan;
use agent::io::prompt::format_step_variables;
use agent::step::StepConfig;
use agent::task::{StepReport, TaskStop, run_task};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

const DEFAULT_CONFIG: &str = "agent.toml";

#[derive(Parser)]
#[command(name = "agent", version, about = "Bounded step execution loop for a code-writing agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `agent.toml`.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Validate a plan file and print its steps.
    CheckPlan { plan: PathBuf },
    /// Run each plan as one task with a fresh namespace.
    Run {
        #[arg(required = true)]
        plans: Vec<PathBuf>,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Directory code blocks run in.
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
        /// Conversation logs go to `<log-dir>/<timestamp>/step_<i>/`.
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
    },
}

fn main() {
    agent::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::CheckPlan { plan } => cmd_check_plan(&plan),
        Command::Run {
            plans,
            config,
            workdir,
            log_dir,
        } => cmd_run(&plans, &config, &workdir, &log_dir),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &AgentConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_check_plan(path: &Path) -> Result<i32> {
    let plan = load_plan(path)?;
    print!("{}", describe_plan(&plan));
    Ok(exit_codes::OK)
}

fn describe_plan(plan: &Plan) -> String {
    let mut out = format!("task: {}\n", plan.task.trim());
    for (idx, step) in plan.steps.iter().enumerate() {
        out.push_str(&format!("step {}: {}\n", idx + 1, step.description.trim()));
        out.push_str(&format!(
            "  inputs: {}\n",
            format_step_variables(&step.input_variables)
        ));
        out.push_str(&format!(
            "  outputs: {}\n",
            format_step_variables(&step.output_variables)
        ));
    }
    out
}

fn cmd_run(plans: &[PathBuf], config_path: &Path, workdir: &Path, log_dir: &Path) -> Result<i32> {
    // Validate every plan before the first model request.
    let plans = plans
        .iter()
        .map(|path| load_plan(path))
        .collect::<Result<Vec<Plan>>>()?;
    let cfg = load_config(config_path)?;
    let model = OpenRouterClient::from_config(&cfg.model)?;
    let workdir = workdir
        .canonicalize()
        .with_context(|| format!("resolve workdir {}", workdir.display()))?;
    let mut backend = LocalBackend::new(cfg.execution.clone(), workdir);
    let step_config = StepConfig::from_agent_config(&cfg);

    let mut code = exit_codes::OK;
    for plan in &plans {
        backend.reset().context("reset namespace")?;
        let logs = RunLogDir::create(log_dir, plan)?;
        println!("task: {} (logs: {})", plan.task.trim(), logs.dir.display());
        let outcome = run_task(plan, &model, &mut backend, &step_config, Some(&logs), print_report)?;
        code = match outcome.stop {
            TaskStop::Complete => code,
            TaskStop::Failed { .. } => exit_codes::FAILED,
            TaskStop::Exhausted { .. } => exit_codes::EXHAUSTED,
        };
    }
    Ok(code)
}

fn print_report(report: &StepReport) {
    println!("{}", format_report(report));
}

fn format_report(report: &StepReport) -> String {
    format!(
        "step {} [{}] after {} iteration(s): {}",
        report.index + 1,
        report.outcome.status.as_str(),
        report.outcome.iterations,
        report.outcome.answer.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent::core::types::{StepOutcome, StepStatus};
    use agent::test_support::step_with_outputs;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["agent", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn parse_run_with_defaults() {
        let cli = Cli::parse_from(["agent", "run", "a.json", "b.json"]);
        let Command::Run {
            plans,
            config,
            workdir,
            log_dir,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(plans, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
        assert_eq!(config, PathBuf::from("agent.toml"));
        assert_eq!(workdir, PathBuf::from("."));
        assert_eq!(log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn run_requires_a_plan() {
        assert!(Cli::try_parse_from(["agent", "run"]).is_err());
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        assert_eq!(cmd_init(&path, false).expect("first init"), exit_codes::OK);
        assert!(cmd_init(&path, false).is_err());
        assert_eq!(cmd_init(&path, true).expect("forced"), exit_codes::OK);
    }

    #[test]
    fn describe_plan_lists_variables() {
        let plan = Plan {
            task: "2+2".to_string(),
            steps: vec![step_with_outputs(&[("result", "int")])],
        };
        assert_eq!(
            describe_plan(&plan),
            "task: 2+2\nstep 1: test step\n  inputs: None\n  outputs: \n  - result (int): \n"
        );
    }

    #[test]
    fn report_line() {
        let report = StepReport {
            index: 0,
            description: "compute".to_string(),
            outcome: StepOutcome {
                status: StepStatus::Completed,
                answer: "The result is 4".to_string(),
                iterations: 2,
            },
            outputs: Vec::new(),
        };
        assert_eq!(
            format_report(&report),
            "step 1 [completed] after 2 iteration(s): The result is 4"
        );
    }
}
