use crate::builder::{Problem, Term};
use chrono::{IsoWeek, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

/// Décomposition de l'objectif (à minimiser).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Breakdown {
    pub linear: f64,
    pub rest: f64,
    pub consecutive: f64,
    pub min_hours: f64,
    pub shortfall: f64,
    pub fairness: f64,
}

impl Breakdown {
    pub fn total(&self) -> f64 {
        self.linear + self.rest + self.consecutive + self.min_hours + self.shortfall + self.fairness
    }

    /// Préférences, coûts et règles souples, hors couverture et équité.
    pub fn soft(&self) -> f64 {
        self.linear + self.rest + self.consecutive + self.min_hours
    }
}

/// Évalue une sélection complète de variables.
pub fn evaluate(problem: &Problem, selected: &[bool]) -> Breakdown {
    let filled = filled_per_shift(problem, selected);
    let mut breakdown = Breakdown::default();
    for term in &problem.terms {
        match term {
            Term::Linear { var, coefficient } => {
                if selected[*var] {
                    breakdown.linear += coefficient;
                }
            }
            Term::Pair { a, b, weight } => {
                if selected[*a] && selected[*b] {
                    breakdown.rest += weight;
                }
            }
            Term::ConsecutiveExcess {
                employee,
                limit,
                weight,
            } => {
                let excess = consecutive_excess(&worked_days(problem, selected, *employee), *limit);
                breakdown.consecutive += weight * f64::from(excess);
            }
            Term::MinMinutes {
                employee,
                week,
                minutes,
                weight,
            } => {
                let worked = week_minutes(problem, selected, *employee, *week);
                let deficit = (minutes - worked).max(0);
                breakdown.min_hours += weight * deficit as f64 / 60.0;
            }
            Term::Shortfall { shift, weight } => {
                let required = problem.shifts()[*shift].headcount;
                let missing = required.saturating_sub(filled[*shift]);
                breakdown.shortfall += weight * f64::from(missing);
            }
            Term::Fairness { weight } => {
                breakdown.fairness += weight * hours_variance(problem, selected);
            }
        }
    }
    breakdown
}

/// Borne inférieure admissible d'une sélection partielle.
///
/// Les termes non monotones (heures minimales, équité) sont comptés à zéro ; les récompenses
/// encore atteignables sur les créneaux non tranchés sont déduites.
pub(crate) fn lower_bound(problem: &Problem, selected: &[bool], decided: &[bool]) -> f64 {
    let mut filled: Option<Vec<u32>> = None;
    let mut bound = 0.0;
    for term in &problem.terms {
        match term {
            Term::Linear { var, coefficient } => {
                if selected[*var] {
                    bound += coefficient;
                } else if *coefficient < 0.0 && !decided[problem.variables[*var].shift] {
                    bound += coefficient;
                }
            }
            Term::Pair { a, b, weight } => {
                if selected[*a] && selected[*b] {
                    bound += weight;
                }
            }
            Term::ConsecutiveExcess {
                employee,
                limit,
                weight,
            } => {
                let excess = consecutive_excess(&worked_days(problem, selected, *employee), *limit);
                bound += weight * f64::from(excess);
            }
            Term::MinMinutes { .. } | Term::Fairness { .. } => {}
            Term::Shortfall { shift, weight } => {
                let required = problem.shifts()[*shift].headcount;
                let reachable = if decided[*shift] {
                    let filled = filled.get_or_insert_with(|| filled_per_shift(problem, selected));
                    filled[*shift]
                } else {
                    problem.target(*shift)
                };
                bound += weight * f64::from(required.saturating_sub(reachable));
            }
        }
    }
    bound
}

pub(crate) fn filled_per_shift(problem: &Problem, selected: &[bool]) -> Vec<u32> {
    let mut filled = vec![0u32; problem.shifts().len()];
    for (v, variable) in problem.variables.iter().enumerate() {
        if selected[v] {
            filled[variable.shift] += 1;
        }
    }
    filled
}

fn worked_days(problem: &Problem, selected: &[bool], employee: usize) -> BTreeSet<NaiveDate> {
    problem
        .employee_vars(employee)
        .iter()
        .filter(|&&v| selected[v])
        .map(|&v| problem.shifts()[problem.variables[v].shift].day())
        .collect()
}

fn week_minutes(problem: &Problem, selected: &[bool], employee: usize, week: IsoWeek) -> i64 {
    problem
        .employee_vars(employee)
        .iter()
        .filter(|&&v| selected[v])
        .filter(|&&v| problem.shifts()[problem.variables[v].shift].iso_week() == week)
        .map(|&v| problem.variables[v].minutes)
        .sum()
}

/// Jours au-delà de `limit` sur l'ensemble des séries consécutives.
pub(crate) fn consecutive_excess(days: &BTreeSet<NaiveDate>, limit: u32) -> u32 {
    let mut excess = 0;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for &day in days {
        run = match previous {
            Some(prev) if prev.succ_opt() == Some(day) => run + 1,
            _ => 1,
        };
        if run > limit {
            excess += 1;
        }
        previous = Some(day);
    }
    excess
}

// variance des heures sur les employés ayant au moins une variable
fn hours_variance(problem: &Problem, selected: &[bool]) -> f64 {
    let hours: Vec<f64> = (0..problem.employees().len())
        .filter(|&e| !problem.employee_vars(e).is_empty())
        .map(|e| {
            problem
                .employee_vars(e)
                .iter()
                .filter(|&&v| selected[v])
                .map(|&v| problem.variables[v].minutes as f64 / 60.0)
                .sum::<f64>()
        })
        .collect();
    variance(&hours)
}

pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
