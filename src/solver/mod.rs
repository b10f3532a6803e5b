//! Recherche d'une affectation respectant toutes les clauses dures et minimisant l'objectif.

mod objective;
mod search;

pub use objective::{evaluate, Breakdown};
pub(crate) use objective::variance;

use crate::builder::{HeadcountPolicy, Problem, VarId};
use crate::model::AssignmentSet;
use search::{Incumbent, Mode, Search, SearchStats};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    TimeoutWithPartial,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Feasible => "feasible",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::TimeoutWithPartial => "timeout-with-partial",
        }
    }
}

/// Résultat du solveur : un jeu neuf, indépendant de l'appelant.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub status: SolveStatus,
    pub assignments: AssignmentSet,
    pub objective: f64,
    pub breakdown: Breakdown,
    /// Vrai si l'égalité d'effectif a été relâchée.
    pub relaxed: bool,
    pub timed_out: bool,
    pub expansions: u64,
}

/// Résout `problem` dans le budget donné. `warm_start` oriente l'exploration sans changer l'objectif.
pub fn solve(
    problem: &Problem,
    time_budget: Duration,
    warm_start: Option<&AssignmentSet>,
) -> Solution {
    let started = Instant::now();

    if let Some((employee, shift)) = problem.unsatisfiable_fixed.first() {
        warn!(%employee, %shift, "hard preference on an ineligible pair");
        return infeasible(problem);
    }
    if (0..problem.shifts().len()).any(|s| problem.fixed[s].len() > problem.target(s) as usize) {
        warn!("more hard preferences than headcount on a shift");
        return infeasible(problem);
    }

    let hints = hints_from(problem, warm_start);
    let deadline = started + time_budget;

    let (mode, best, stats) = match problem.policy {
        HeadcountPolicy::Strict => {
            let (best, stats) = phase(problem, Mode::Strict, &hints, deadline, time_budget);
            (Mode::Strict, best, stats)
        }
        HeadcountPolicy::BestEffort => {
            let (best, stats) = phase(problem, Mode::Relaxed, &hints, deadline, time_budget);
            (Mode::Relaxed, best, stats)
        }
        HeadcountPolicy::Auto => {
            let (best, stats) = phase(problem, Mode::Strict, &hints, deadline, time_budget);
            if best.is_some() {
                (Mode::Strict, best, stats)
            } else {
                info!(
                    exhausted = stats.exhausted,
                    "no solution with exact headcount; relaxing coverage and retrying once"
                );
                let retry = deadline
                    .saturating_duration_since(Instant::now())
                    .max(time_budget / 4);
                let (best, retry_stats) =
                    phase(problem, Mode::Relaxed, &hints, Instant::now() + retry, retry);
                let stats = SearchStats {
                    exhausted: retry_stats.exhausted,
                    expansions: stats.expansions + retry_stats.expansions,
                };
                (Mode::Relaxed, best, stats)
            }
        }
    };

    let solution = finish(problem, mode, best, stats);
    info!(
        status = ?solution.status,
        objective = solution.objective,
        assignments = solution.assignments.len(),
        expansions = solution.expansions,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "solve finished"
    );
    solution
}

fn phase(
    problem: &Problem,
    mode: Mode,
    hints: &HashSet<VarId>,
    deadline: Instant,
    budget: Duration,
) -> (Option<Incumbent>, SearchStats) {
    debug!(?mode, budget_ms = budget.as_millis() as u64, "search phase");
    let search = Search::new(problem, mode, hints, deadline, deadline + budget);
    let mut incumbent = None;
    let stats = search.run(&mut incumbent);
    if !stats.exhausted {
        warn!(?mode, expansions = stats.expansions, "time budget exhausted");
    }
    (incumbent, stats)
}

fn hints_from(problem: &Problem, warm_start: Option<&AssignmentSet>) -> HashSet<VarId> {
    let Some(set) = warm_start else {
        return HashSet::new();
    };
    set.iter()
        .filter_map(|a| {
            let e = problem.rules.employee_idx(a.employee())?;
            let s = problem.rules.shift_idx(a.shift())?;
            problem.var(e, s)
        })
        .collect()
}

fn finish(
    problem: &Problem,
    mode: Mode,
    best: Option<Incumbent>,
    stats: SearchStats,
) -> Solution {
    let relaxed = mode == Mode::Relaxed;
    let Some(best) = best else {
        let mut solution = infeasible(problem);
        solution.relaxed = relaxed;
        solution.expansions = stats.expansions;
        if !stats.exhausted {
            solution.status = SolveStatus::TimeoutWithPartial;
            solution.timed_out = true;
        }
        return solution;
    };

    let required: u32 = problem.shifts().iter().map(|s| s.headcount).sum();
    let short = best.filled < required;
    let status = match (relaxed, stats.exhausted, short) {
        (true, false, _) => SolveStatus::TimeoutWithPartial,
        (false, true, false) => SolveStatus::Optimal,
        _ => SolveStatus::Feasible,
    };
    Solution {
        status,
        assignments: problem.decode(&best.vars),
        objective: best.score,
        breakdown: best.breakdown,
        relaxed,
        timed_out: !stats.exhausted,
        expansions: stats.expansions,
    }
}

fn infeasible(problem: &Problem) -> Solution {
    let breakdown = evaluate(problem, &vec![false; problem.variables.len()]);
    Solution {
        status: SolveStatus::Infeasible,
        assignments: AssignmentSet::new(),
        objective: breakdown.total(),
        breakdown,
        relaxed: false,
        timed_out: false,
        expansions: 0,
    }
}
