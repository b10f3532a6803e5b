//! Suggestions locales (ajout, retrait, réaffectation, échange) sur un jeu existant.
//!
//! Chaque candidat est simulé sur une copie du jeu puis revalidé ; rien n'est appliqué ici,
//! l'appelant choisit les suggestions qu'il accepte.

use crate::builder::{BuilderError, Problem, VarId};
use crate::conflicts::{self, ConflictKind, CoverageStats, Severity, ValidationReport};
use crate::model::{Assignment, AssignmentSet, EmployeeId, ShiftId};
use crate::solver::{self, variance};
use chrono::{DateTime, IsoWeek, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const EPSILON: f64 = 1e-9;
const COVERAGE_WEIGHT: f64 = 10.0;
const BALANCE_WEIGHT: f64 = 1.0;
const QUALIFICATION_WEIGHT: f64 = 5.0;
const OVERTIME_WEIGHT: f64 = 2.0;
const MAX_CANDIDATES: usize = 5_000;

/// Objectifs activables, chacun avec un poids interne.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Goals {
    pub maximize_coverage: bool,
    pub balance_workload: bool,
    pub prefer_qualifications: bool,
}

impl Default for Goals {
    fn default() -> Self {
        Self {
            maximize_coverage: true,
            balance_workload: true,
            prefer_qualifications: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Swap,
    Reassign,
    Add,
    Remove,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionKind::Swap => "swap",
            SuggestionKind::Reassign => "reassign",
            SuggestionKind::Add => "add",
            SuggestionKind::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    /// Affectations retirées ; les `added` de même rang les remplacent sur place.
    pub removed: Vec<Assignment>,
    pub added: Vec<Assignment>,
    /// Positif = amélioration.
    pub impact: f64,
    pub coverage_before: f64,
    pub coverage_after: f64,
    pub resulting_cost: f64,
    pub earliest_start: DateTime<Utc>,
    pub explanation: String,
}

impl Suggestion {
    /// Produit un nouveau jeu ; `set` n'est pas modifié.
    pub fn apply_to(&self, set: &AssignmentSet) -> AssignmentSet {
        apply(set, &self.removed, &self.added)
    }

    fn touches_shift(&self, shift: &ShiftId) -> bool {
        self.added.iter().any(|a| a.shift() == shift)
    }

    fn removes_any(&self, assignments: &[Assignment]) -> bool {
        self.removed
            .iter()
            .any(|r| assignments.iter().any(|a| a.same_pair(r)))
    }

    fn pair_key(&self) -> Vec<(EmployeeId, ShiftId)> {
        self.removed
            .iter()
            .chain(&self.added)
            .map(|a| (a.employee().clone(), a.shift().clone()))
            .collect()
    }
}

/// Conflit pour lequel aucune modification locale sûre n'a été trouvée.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedItem {
    pub shift: ShiftId,
    pub kind: ConflictKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub suggestions: Vec<Suggestion>,
    pub unresolved: Vec<UnresolvedItem>,
    pub current_coverage: CoverageStats,
    /// Couverture obtenue en appliquant les suggestions compatibles dans l'ordre du classement.
    pub projected_coverage: CoverageStats,
}

struct Candidate {
    kind: SuggestionKind,
    removed: Vec<Assignment>,
    added: Vec<Assignment>,
}

impl Candidate {
    fn apply_to(&self, set: &AssignmentSet) -> AssignmentSet {
        apply(set, &self.removed, &self.added)
    }
}

fn apply(set: &AssignmentSet, removed: &[Assignment], added: &[Assignment]) -> AssignmentSet {
    let mut next = set.clone();
    let mut added = added.iter();
    for old in removed {
        match added.next() {
            Some(replacement) => {
                if !next.replace(old, replacement.clone()) {
                    next.push(replacement.clone());
                }
            }
            None => {
                next.remove(old);
            }
        }
    }
    for extra in added {
        next.push(extra.clone());
    }
    next
}

// mesures d'un jeu, avant ou après simulation
struct Snapshot {
    report: ValidationReport,
    high: BTreeSet<(ConflictKind, ShiftId, Option<EmployeeId>, Vec<(EmployeeId, ShiftId)>)>,
    weighted_conflicts: f64,
    soft: f64,
    spread: f64,
    cost: f64,
    mismatches: usize,
    overtime_hours: f64,
    hours: Vec<f64>,
    pairs: Vec<(usize, usize)>,
}

fn conflict_weight(severity: Severity) -> f64 {
    match severity {
        Severity::High => 20.0,
        Severity::Medium => 12.0,
        Severity::Low => 1.0,
    }
}

fn snapshot(problem: &Problem, set: &AssignmentSet) -> Result<Snapshot, BuilderError> {
    let rules = &problem.rules;
    let report = conflicts::detect(set, rules)?;
    let selection = problem.selection_of(set)?;
    let soft = solver::evaluate(problem, &selection).soft();

    let mut pairs = Vec::with_capacity(set.len());
    let mut hours = vec![0.0; problem.employees().len()];
    let mut week_minutes: BTreeMap<(usize, IsoWeek), i64> = BTreeMap::new();
    let mut cost = 0.0;
    let mut mismatches = 0;
    for assignment in set {
        let (e, s) = rules.resolve(assignment)?;
        let shift = rules.shift(s);
        hours[e] += shift.hours();
        cost += rules.employee(e).hourly_cost * shift.hours();
        *week_minutes.entry((e, shift.iso_week())).or_insert(0) += shift.duration_minutes();
        if !rules.is_qualified(e, s) {
            mismatches += 1;
        }
        pairs.push((e, s));
    }
    let overtime_hours = week_minutes
        .iter()
        .map(|(&(e, _), &minutes)| (minutes - rules.max_minutes(e)).max(0) as f64 / 60.0)
        .sum();

    let active: Vec<f64> = (0..hours.len())
        .filter(|&e| !problem.employee_vars(e).is_empty() || hours[e] > 0.0)
        .map(|e| hours[e])
        .collect();
    let spread = variance(&active).sqrt();

    let high = report
        .conflicts
        .iter()
        .filter(|c| c.severity == Severity::High)
        .map(|c| c.signature())
        .collect();
    let weighted_conflicts = report
        .conflicts
        .iter()
        .map(|c| conflict_weight(c.severity))
        .sum();

    Ok(Snapshot {
        report,
        high,
        weighted_conflicts,
        soft,
        spread,
        cost,
        mismatches,
        overtime_hours,
        hours,
        pairs,
    })
}

fn impact(goals: &Goals, before: &Snapshot, after: &Snapshot) -> f64 {
    let mut impact = before.weighted_conflicts - after.weighted_conflicts;
    impact += before.soft - after.soft;
    impact += OVERTIME_WEIGHT * (before.overtime_hours - after.overtime_hours);
    if goals.maximize_coverage {
        let gained = f64::from(after.report.coverage.assigned_slots)
            - f64::from(before.report.coverage.assigned_slots);
        impact += COVERAGE_WEIGHT * gained;
    }
    if goals.balance_workload {
        impact += BALANCE_WEIGHT * (before.spread - after.spread);
    }
    if goals.prefer_qualifications {
        impact += QUALIFICATION_WEIGHT * (before.mismatches as f64 - after.mismatches as f64);
    }
    impact
}

/// Propose des modifications classées par impact décroissant, puis coût, puis début de créneau.
pub fn optimize(
    set: &AssignmentSet,
    problem: &Problem,
    goals: &Goals,
    max_suggestions: usize,
) -> Result<OptimizationReport, BuilderError> {
    let before = snapshot(problem, set)?;
    let candidates = generate_candidates(set, problem, goals, &before);
    debug!(candidates = candidates.len(), "optimizer candidates generated");

    let mut suggestions = Vec::new();
    for candidate in candidates {
        let next = candidate.apply_to(set);
        let after = snapshot(problem, &next)?;
        if after.report.high_count() > before.report.high_count()
            || after.high.iter().any(|sig| !before.high.contains(sig))
        {
            continue;
        }
        if candidate.kind == SuggestionKind::Swap
            && after.spread >= before.spread - EPSILON
            && after.soft >= before.soft - EPSILON
        {
            continue;
        }
        let score = impact(goals, &before, &after);
        if score <= EPSILON {
            continue;
        }
        suggestions.push(Suggestion {
            explanation: explain(&candidate),
            earliest_start: earliest_start(problem, &candidate),
            kind: candidate.kind,
            removed: candidate.removed,
            added: candidate.added,
            impact: score,
            coverage_before: before.report.coverage.coverage_percentage,
            coverage_after: after.report.coverage.coverage_percentage,
            resulting_cost: after.cost,
        });
    }
    suggestions.sort_by(rank);

    let unresolved = unresolved_items(&before.report, &suggestions);
    suggestions.truncate(max_suggestions);
    let projected_coverage = project(problem, set, &before, &suggestions)?;

    info!(
        suggestions = suggestions.len(),
        unresolved = unresolved.len(),
        projected = projected_coverage.coverage_percentage,
        "optimization done"
    );
    Ok(OptimizationReport {
        suggestions,
        unresolved,
        current_coverage: before.report.coverage.clone(),
        projected_coverage,
    })
}

fn rank(a: &Suggestion, b: &Suggestion) -> Ordering {
    if (a.impact - b.impact).abs() > EPSILON {
        return b.impact.total_cmp(&a.impact);
    }
    a.resulting_cost
        .total_cmp(&b.resulting_cost)
        .then(a.earliest_start.cmp(&b.earliest_start))
        .then(a.kind.cmp(&b.kind))
        .then_with(|| a.pair_key().cmp(&b.pair_key()))
}

fn generate_candidates(
    set: &AssignmentSet,
    problem: &Problem,
    goals: &Goals,
    before: &Snapshot,
) -> Vec<Candidate> {
    let rules = &problem.rules;
    let assignments = set.as_slice();
    let mut staffed: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); problem.shifts().len()];
    for &(e, s) in &before.pairs {
        staffed[s].insert(e);
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let mut push = |kind: SuggestionKind, removed: Vec<Assignment>, added: Vec<Assignment>| {
        if out.len() >= MAX_CANDIDATES {
            return;
        }
        let key: (SuggestionKind, Vec<_>, Vec<_>) = (
            kind,
            removed.iter().map(|a| (a.employee().clone(), a.shift().clone())).collect(),
            added.iter().map(|a| (a.employee().clone(), a.shift().clone())).collect(),
        );
        if seen.insert(key) {
            out.push(Candidate {
                kind,
                removed,
                added,
            });
        }
    };
    // variables libres d'un créneau : employés éligibles pas encore dessus
    let free_vars = |s: usize| -> Vec<VarId> {
        problem
            .shift_vars(s)
            .iter()
            .copied()
            .filter(|&v| !staffed[s].contains(&problem.variables[v].employee))
            .collect()
    };

    for conflict in &before.report.conflicts {
        match conflict.kind {
            ConflictKind::CoverageShortfall => {
                let Some(s) = rules.shift_idx(&conflict.shift) else {
                    continue;
                };
                for v in free_vars(s) {
                    push(SuggestionKind::Add, Vec::new(), vec![problem.assignment_for(v)]);
                }
            }
            ConflictKind::RestViolation | ConflictKind::DoubleBooking => {
                for assignment in &conflict.assignments {
                    push(SuggestionKind::Remove, vec![assignment.clone()], Vec::new());
                }
            }
            ConflictKind::AvailabilityViolation | ConflictKind::QualificationMismatch => {
                for assignment in &conflict.assignments {
                    let Some(s) = rules.shift_idx(assignment.shift()) else {
                        continue;
                    };
                    for v in free_vars(s) {
                        push(
                            SuggestionKind::Reassign,
                            vec![assignment.clone()],
                            vec![problem.assignment_for(v)],
                        );
                    }
                }
            }
        }
    }

    // dépassement du plafond hebdomadaire
    let mut week_load: BTreeMap<(usize, IsoWeek), Vec<usize>> = BTreeMap::new();
    for (idx, &(e, s)) in before.pairs.iter().enumerate() {
        week_load
            .entry((e, rules.shift(s).iso_week()))
            .or_default()
            .push(idx);
    }
    for (&(e, _), indices) in &week_load {
        let minutes: i64 = indices
            .iter()
            .map(|&i| rules.shift(before.pairs[i].1).duration_minutes())
            .sum();
        if minutes > rules.max_minutes(e) {
            for &i in indices {
                push(SuggestionKind::Remove, vec![assignments[i].clone()], Vec::new());
            }
        }
    }

    if goals.prefer_qualifications {
        for (idx, &(e, s)) in before.pairs.iter().enumerate() {
            if rules.is_qualified(e, s) {
                continue;
            }
            for v in free_vars(s) {
                push(
                    SuggestionKind::Reassign,
                    vec![assignments[idx].clone()],
                    vec![problem.assignment_for(v)],
                );
            }
        }
    }

    if goals.balance_workload {
        let active: Vec<usize> = (0..before.hours.len())
            .filter(|&e| !problem.employee_vars(e).is_empty() || before.hours[e] > 0.0)
            .collect();
        if !active.is_empty() {
            let mean = active.iter().map(|&e| before.hours[e]).sum::<f64>() / active.len() as f64;
            for (idx, &(e, s)) in before.pairs.iter().enumerate() {
                if before.hours[e] <= mean + EPSILON {
                    continue;
                }
                for v in free_vars(s) {
                    let target = problem.variables[v].employee;
                    if before.hours[target] < mean - EPSILON {
                        push(
                            SuggestionKind::Reassign,
                            vec![assignments[idx].clone()],
                            vec![problem.assignment_for(v)],
                        );
                    }
                }
            }
        }
    }

    for (i, &(e1, s1)) in before.pairs.iter().enumerate() {
        for (j, &(e2, s2)) in before.pairs.iter().enumerate().skip(i + 1) {
            if e1 == e2 || s1 == s2 || staffed[s2].contains(&e1) || staffed[s1].contains(&e2) {
                continue;
            }
            let (Some(v21), Some(v12)) = (problem.var(e2, s1), problem.var(e1, s2)) else {
                continue;
            };
            push(
                SuggestionKind::Swap,
                vec![assignments[i].clone(), assignments[j].clone()],
                vec![problem.assignment_for(v21), problem.assignment_for(v12)],
            );
        }
    }

    out
}

fn earliest_start(problem: &Problem, candidate: &Candidate) -> DateTime<Utc> {
    candidate
        .removed
        .iter()
        .chain(&candidate.added)
        .filter_map(|a| problem.rules.shift_idx(a.shift()))
        .map(|s| problem.rules.shift(s).start)
        .min()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn explain(candidate: &Candidate) -> String {
    match (candidate.kind, candidate.removed.as_slice(), candidate.added.as_slice()) {
        (SuggestionKind::Add, _, [added, ..]) => format!(
            "assign {} to under-covered shift {}",
            added.employee(),
            added.shift()
        ),
        (SuggestionKind::Remove, [removed, ..], _) => {
            format!("drop {} from shift {}", removed.employee(), removed.shift())
        }
        (SuggestionKind::Reassign, [removed, ..], [added, ..]) => format!(
            "move shift {} from {} to {}",
            removed.shift(),
            removed.employee(),
            added.employee()
        ),
        (SuggestionKind::Swap, [first, second, ..], _) => format!(
            "swap {} on {} with {} on {}",
            first.employee(),
            first.shift(),
            second.employee(),
            second.shift()
        ),
        (kind, _, _) => kind.as_str().to_string(),
    }
}

fn unresolved_items(report: &ValidationReport, suggestions: &[Suggestion]) -> Vec<UnresolvedItem> {
    report
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::CoverageShortfall || c.severity == Severity::High)
        .filter(|c| {
            !suggestions.iter().any(|s| match c.kind {
                ConflictKind::CoverageShortfall => s.touches_shift(&c.shift),
                _ => s.removes_any(&c.assignments),
            })
        })
        .map(|c| UnresolvedItem {
            shift: c.shift.clone(),
            kind: c.kind,
            reason: format!(
                "no local edit resolves the {} without a new high-severity conflict",
                c.kind.as_str().replace('_', " ")
            ),
        })
        .collect()
}

fn project(
    problem: &Problem,
    set: &AssignmentSet,
    before: &Snapshot,
    suggestions: &[Suggestion],
) -> Result<CoverageStats, BuilderError> {
    let mut working = set.clone();
    let mut high = before.report.high_count();
    let mut coverage = before.report.coverage.clone();
    for suggestion in suggestions {
        let applicable = suggestion
            .removed
            .iter()
            .all(|a| working.contains_pair(a.employee(), a.shift()))
            && !suggestion
                .added
                .iter()
                .any(|a| working.contains_pair(a.employee(), a.shift()));
        if !applicable {
            continue;
        }
        let next = suggestion.apply_to(&working);
        let report = conflicts::detect(&next, &problem.rules)?;
        // accepté s'il lève un conflit bloquant, ou sinon s'il ne réduit pas la couverture
        let accepted = report.high_count() < high
            || (report.high_count() == high
                && report.coverage.assigned_slots >= coverage.assigned_slots);
        if !accepted {
            continue;
        }
        high = report.high_count();
        coverage = report.coverage;
        working = next;
    }
    Ok(coverage)
}
