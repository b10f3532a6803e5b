#![forbid(unsafe_code)]
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use horaire::{
    io,
    model::Constraint,
    optimizer::Goals,
    provider::{JsonWorkspace, Workspace},
    Engine, EngineOptions, HeadcountPolicy, SolveStatus,
};
use std::fs;
use std::time::Duration;
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// CLI de planification d'équipes (sans base de données)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Fichier JSON de l'espace de travail
    #[arg(long, global = true, default_value = "horaire.json")]
    workspace: String,

    /// Options du moteur (JSON)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Importer des employés depuis un CSV
    ImportEmployees {
        #[arg(long)]
        csv: String,
    },

    /// Importer des créneaux depuis un CSV
    ImportShifts {
        #[arg(long)]
        csv: String,
    },

    /// Importer des règles normalisées (tableau JSON de contraintes)
    ImportRules {
        #[arg(long)]
        json: String,
    },

    /// Générer un planning et l'enregistrer dans l'espace de travail
    Generate {
        /// Budget de recherche en millisecondes
        #[arg(long)]
        time_budget_ms: Option<u64>,
        /// auto | strict | best-effort
        #[arg(long, value_parser = parse_policy)]
        policy: Option<HeadcountPolicy>,
        #[arg(long)]
        out_csv: Option<String>,
        #[arg(long)]
        out_json: Option<String>,
    },

    /// Valider le planning enregistré
    Validate {
        /// Export CSV des conflits (optionnel)
        #[arg(long)]
        report: Option<String>,
    },

    /// Proposer des améliorations au planning enregistré
    Optimize {
        #[arg(long)]
        no_coverage: bool,
        #[arg(long)]
        no_balance: bool,
        #[arg(long)]
        no_qualifications: bool,
        #[arg(long)]
        out_json: Option<String>,
    },

    /// Lister le planning et optionnellement l'exporter
    List {
        #[arg(long)]
        out_csv: Option<String>,
    },
}

fn parse_policy(raw: &str) -> Result<HeadcountPolicy, String> {
    match raw {
        "auto" => Ok(HeadcountPolicy::Auto),
        "strict" => Ok(HeadcountPolicy::Strict),
        "best-effort" | "best_effort" => Ok(HeadcountPolicy::BestEffort),
        other => Err(format!("unknown policy: {other}")),
    }
}

fn saved_schedule(workspace: &Workspace) -> Result<&horaire::AssignmentSet> {
    match workspace.schedule.as_ref() {
        Some(set) => Ok(set),
        None => bail!("no schedule in workspace; run `generate` first"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    let mut options = match &cli.config {
        Some(path) => EngineOptions::from_path(path)?,
        None => EngineOptions::default(),
    };
    let store = JsonWorkspace::open(&cli.workspace);
    let mut workspace = store.load()?;

    let code = match cli.cmd {
        Commands::ImportEmployees { csv } => {
            let employees = io::import_employees_csv(&csv)?;
            println!("imported {} employee(s)", employees.len());
            workspace.employees.extend(employees);
            store.save(&workspace)?;
            0
        }
        Commands::ImportShifts { csv } => {
            let shifts = io::import_shifts_csv(&csv)?;
            println!("imported {} shift(s)", shifts.len());
            workspace.shifts.extend(shifts);
            store.save(&workspace)?;
            0
        }
        Commands::ImportRules { json } => {
            let data = fs::read(&json).with_context(|| format!("reading {json}"))?;
            let rules: Vec<Constraint> =
                serde_json::from_slice(&data).with_context(|| format!("parsing rules {json}"))?;
            println!("imported {} rule(s)", rules.len());
            workspace.constraints.extend(rules);
            store.save(&workspace)?;
            0
        }
        Commands::Generate {
            time_budget_ms,
            policy,
            out_csv,
            out_json,
        } => {
            if let Some(policy) = policy {
                options.headcount_policy = policy;
            }
            let engine = Engine::new(options);
            let outcome = engine.generate_with_hint(
                &workspace.employees,
                &workspace.shifts,
                &workspace.constraints,
                time_budget_ms.map(Duration::from_millis),
                workspace.schedule.as_ref(),
            )?;
            println!(
                "status: {} | objective: {:.2} | coverage: {:.1}% | conflicts: {}",
                outcome.status.as_str(),
                outcome.objective_score,
                outcome.coverage.coverage_percentage,
                outcome.conflicts.len()
            );
            for p in &outcome.preconditions {
                eprintln!(
                    "shift {}: {} eligible for {} required",
                    p.shift, p.eligible, p.required
                );
            }
            if let Some(path) = out_csv {
                io::export_schedule_csv(path, &outcome.assignment_set, &workspace.shifts)?;
            }
            if let Some(path) = out_json {
                io::export_json(path, &outcome)?;
            }
            let code = match outcome.status {
                SolveStatus::Optimal | SolveStatus::Feasible => 0,
                // Code 2 = WARNING/INCOMPLETE
                SolveStatus::Infeasible | SolveStatus::TimeoutWithPartial => 2,
            };
            workspace.schedule = Some(outcome.assignment_set);
            store.save(&workspace)?;
            code
        }
        Commands::Validate { report } => {
            let schedule = saved_schedule(&workspace)?;
            let engine = Engine::new(options);
            let result = engine.validate(
                schedule,
                &workspace.employees,
                &workspace.shifts,
                &workspace.constraints,
            )?;
            if let Some(path) = report {
                io::export_conflicts_csv(path, &result.conflicts)?;
            }
            for c in &result.conflicts {
                println!("[{}] {}: {}", c.severity.as_str(), c.kind.as_str(), c.message);
            }
            println!(
                "coverage: {:.1}% ({}/{} slots)",
                result.coverage.coverage_percentage,
                result.coverage.assigned_slots,
                result.coverage.required_slots
            );
            if result.is_valid {
                println!("OK: schedule is valid");
                0
            } else {
                eprintln!("Found {} blocking conflict(s)", result.high_count());
                2
            }
        }
        Commands::Optimize {
            no_coverage,
            no_balance,
            no_qualifications,
            out_json,
        } => {
            let schedule = saved_schedule(&workspace)?;
            let goals = Goals {
                maximize_coverage: !no_coverage,
                balance_workload: !no_balance,
                prefer_qualifications: !no_qualifications,
            };
            let engine = Engine::new(options);
            let report = engine.optimize(
                schedule,
                &workspace.employees,
                &workspace.shifts,
                &workspace.constraints,
                &goals,
            )?;
            for (rank, s) in report.suggestions.iter().enumerate() {
                println!(
                    "{:>2}. [{}] {} (impact {:.2}, coverage {:.1}% -> {:.1}%)",
                    rank + 1,
                    s.kind.as_str(),
                    s.explanation,
                    s.impact,
                    s.coverage_before,
                    s.coverage_after
                );
            }
            for item in &report.unresolved {
                eprintln!("unresolved {} on {}: {}", item.kind.as_str(), item.shift, item.reason);
            }
            println!(
                "projected coverage: {:.1}%",
                report.projected_coverage.coverage_percentage
            );
            if let Some(path) = out_json {
                io::export_json(path, &report)?;
            }
            0
        }
        Commands::List { out_csv } => {
            let schedule = saved_schedule(&workspace)?;
            if let Some(path) = out_csv {
                io::export_schedule_csv(path, schedule, &workspace.shifts)?;
            }
            // impression compacte
            for a in schedule {
                let window = workspace
                    .shifts
                    .iter()
                    .find(|s| &s.id == a.shift())
                    .map(|s| format!("{} → {}", s.start.to_rfc3339(), s.end.to_rfc3339()))
                    .unwrap_or_else(|| "-".to_string());
                println!("{} | {} | {}", a.shift(), window, a.employee());
            }
            0
        }
    };

    std::process::exit(code);
}
