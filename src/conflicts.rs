//! Détection de conflits : revalide n'importe quel jeu d'affectations sans passer par le solveur.

use crate::builder::BuilderError;
use crate::config::EngineOptions;
use crate::model::{Assignment, AssignmentSet, Constraint, Employee, EmployeeId, Shift, ShiftId};
use crate::rules::RuleBook;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    DoubleBooking,
    QualificationMismatch,
    AvailabilityViolation,
    RestViolation,
    CoverageShortfall,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::DoubleBooking => "double_booking",
            ConflictKind::QualificationMismatch => "qualification_mismatch",
            ConflictKind::AvailabilityViolation => "availability_violation",
            ConflictKind::RestViolation => "rest_violation",
            ConflictKind::CoverageShortfall => "coverage_shortfall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    /// Créneau de référence (le plus tôt pour un conflit à deux créneaux).
    pub shift: ShiftId,
    pub shift_start: DateTime<Utc>,
    pub employee: Option<EmployeeId>,
    pub assignments: Vec<Assignment>,
    pub message: String,
}

impl Conflict {
    /// Identité stable d'un conflit, pour comparer deux validations.
    pub fn signature(&self) -> (ConflictKind, ShiftId, Option<EmployeeId>, Vec<(EmployeeId, ShiftId)>) {
        let mut pairs: Vec<_> = self
            .assignments
            .iter()
            .map(|a| (a.employee().clone(), a.shift().clone()))
            .collect();
        pairs.sort();
        (self.kind, self.shift.clone(), self.employee.clone(), pairs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub total_shifts: usize,
    pub covered_shifts: usize,
    pub required_slots: u32,
    pub assigned_slots: u32,
    pub unique_employees: usize,
    pub coverage_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Aucun conflit de sévérité haute.
    pub is_valid: bool,
    pub conflicts: Vec<Conflict>,
    pub coverage: CoverageStats,
}

impl ValidationReport {
    pub fn high_count(&self) -> usize {
        self.count_severity(Severity::High)
    }

    pub fn count_severity(&self, severity: Severity) -> usize {
        self.conflicts.iter().filter(|c| c.severity == severity).count()
    }

    pub fn count(&self, kind: ConflictKind) -> usize {
        self.conflicts.iter().filter(|c| c.kind == kind).count()
    }
}

/// Valide un jeu d'affectations contre les entrées d'origine.
pub fn validate(
    set: &AssignmentSet,
    employees: &[Employee],
    shifts: &[Shift],
    constraints: &[Constraint],
    options: &EngineOptions,
) -> Result<ValidationReport, BuilderError> {
    let rules = RuleBook::compile(employees, shifts, constraints, options)?;
    detect(set, &rules)
}

struct Resolved<'a> {
    assignment: &'a Assignment,
    employee: usize,
    shift: usize,
}

pub(crate) fn detect(set: &AssignmentSet, rules: &RuleBook) -> Result<ValidationReport, BuilderError> {
    let resolved = set
        .iter()
        .map(|assignment| {
            let (employee, shift) = rules.resolve(assignment)?;
            Ok(Resolved {
                assignment,
                employee,
                shift,
            })
        })
        .collect::<Result<Vec<_>, BuilderError>>()?;

    let mut by_employee: BTreeMap<usize, Vec<&Resolved>> = BTreeMap::new();
    for r in &resolved {
        by_employee.entry(r.employee).or_default().push(r);
    }
    for list in by_employee.values_mut() {
        list.sort_by_key(|r| r.shift);
    }

    let mut conflicts = Vec::new();
    double_bookings(rules, &by_employee, &mut conflicts);
    qualification_mismatches(rules, &resolved, &mut conflicts);
    availability_violations(rules, &resolved, &mut conflicts);
    rest_violations(rules, &by_employee, &mut conflicts);
    let coverage = coverage_shortfalls(rules, &resolved, &mut conflicts);

    conflicts.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(a.shift_start.cmp(&b.shift_start))
            .then(a.kind.cmp(&b.kind))
            .then(a.shift.cmp(&b.shift))
            .then(a.employee.cmp(&b.employee))
    });
    let is_valid = !conflicts.iter().any(|c| c.severity == Severity::High);
    debug!(
        conflicts = conflicts.len(),
        is_valid,
        coverage = coverage.coverage_percentage,
        "validation done"
    );

    Ok(ValidationReport {
        is_valid,
        conflicts,
        coverage,
    })
}

fn window(shift: &Shift) -> String {
    format!(
        "{} {}-{}",
        shift.start.format("%Y-%m-%d"),
        shift.start.format("%H:%M"),
        shift.end.format("%H:%M")
    )
}

fn double_bookings(
    rules: &RuleBook,
    by_employee: &BTreeMap<usize, Vec<&Resolved>>,
    out: &mut Vec<Conflict>,
) {
    for (&e, list) in by_employee {
        for (idx, a) in list.iter().enumerate() {
            let first = rules.shift(a.shift);
            for b in list.iter().skip(idx + 1) {
                let second = rules.shift(b.shift);
                if !first.overlaps(second) {
                    continue;
                }
                let employee = &rules.employee(e).id;
                out.push(Conflict {
                    kind: ConflictKind::DoubleBooking,
                    severity: Severity::High,
                    shift: first.id.clone(),
                    shift_start: first.start,
                    employee: Some(employee.clone()),
                    assignments: vec![a.assignment.clone(), b.assignment.clone()],
                    message: format!(
                        "employee {employee} is booked on overlapping shifts {} ({}) and {} ({})",
                        first.id,
                        window(first),
                        second.id,
                        window(second)
                    ),
                });
            }
        }
    }
}

fn qualification_mismatches(rules: &RuleBook, resolved: &[Resolved], out: &mut Vec<Conflict>) {
    for r in resolved {
        if r.assignment.is_override() || rules.is_qualified(r.employee, r.shift) {
            continue;
        }
        let shift = rules.shift(r.shift);
        let employee = &rules.employee(r.employee).id;
        let required: Vec<&str> = rules.requirement(r.shift).iter().map(String::as_str).collect();
        out.push(Conflict {
            kind: ConflictKind::QualificationMismatch,
            severity: Severity::High,
            shift: shift.id.clone(),
            shift_start: shift.start,
            employee: Some(employee.clone()),
            assignments: vec![r.assignment.clone()],
            message: format!(
                "employee {employee} lacks a qualification for shift {} (requires one of: {})",
                shift.id,
                required.join(", ")
            ),
        });
    }
}

fn availability_violations(rules: &RuleBook, resolved: &[Resolved], out: &mut Vec<Conflict>) {
    for r in resolved {
        let shift = rules.shift(r.shift);
        let employee = rules.employee(r.employee);
        let reason = if !employee.is_available_for(shift.start, shift.end) {
            "outside declared availability"
        } else if rules.is_blacked_out(r.employee, r.shift) {
            "during a declared unavailability"
        } else {
            continue;
        };
        out.push(Conflict {
            kind: ConflictKind::AvailabilityViolation,
            severity: Severity::Medium,
            shift: shift.id.clone(),
            shift_start: shift.start,
            employee: Some(employee.id.clone()),
            assignments: vec![r.assignment.clone()],
            message: format!(
                "employee {} is assigned to shift {} ({}) {reason}",
                employee.id,
                shift.id,
                window(shift)
            ),
        });
    }
}

// compare chaque affectation à celle qui termine le plus tard parmi les précédentes
fn rest_violations(
    rules: &RuleBook,
    by_employee: &BTreeMap<usize, Vec<&Resolved>>,
    out: &mut Vec<Conflict>,
) {
    for (&e, list) in by_employee {
        let Some(min_rest) = rules.rest_minutes(e) else {
            continue;
        };
        let mut latest: Option<&Resolved> = None;
        for &r in list {
            let shift = rules.shift(r.shift);
            if let Some(prev) = latest {
                let previous = rules.shift(prev.shift);
                if previous.end <= shift.start {
                    let gap = previous.rest_before(shift);
                    if gap < min_rest {
                        let employee = &rules.employee(e).id;
                        out.push(Conflict {
                            kind: ConflictKind::RestViolation,
                            severity: Severity::Medium,
                            shift: previous.id.clone(),
                            shift_start: previous.start,
                            employee: Some(employee.clone()),
                            assignments: vec![prev.assignment.clone(), r.assignment.clone()],
                            message: format!(
                                "employee {employee} rests {}h{:02} between {} and {} (minimum {}h)",
                                gap / 60,
                                gap % 60,
                                previous.id,
                                shift.id,
                                min_rest / 60
                            ),
                        });
                    }
                }
            }
            let later = latest.map_or(true, |prev| rules.shift(prev.shift).end < shift.end);
            if later {
                latest = Some(r);
            }
        }
    }
}

fn coverage_shortfalls(
    rules: &RuleBook,
    resolved: &[Resolved],
    out: &mut Vec<Conflict>,
) -> CoverageStats {
    let mut staffed: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); rules.shifts().len()];
    for r in resolved {
        staffed[r.shift].insert(r.employee);
    }

    let mut stats = CoverageStats {
        total_shifts: rules.shifts().len(),
        unique_employees: resolved
            .iter()
            .map(|r| r.employee)
            .collect::<BTreeSet<_>>()
            .len(),
        ..CoverageStats::default()
    };
    for (s, shift) in rules.shifts().iter().enumerate() {
        let assigned = staffed[s].len() as u32;
        stats.required_slots += shift.headcount;
        stats.assigned_slots += assigned.min(shift.headcount);
        if assigned >= shift.headcount {
            stats.covered_shifts += 1;
            continue;
        }
        let severity = if shift.mandatory {
            Severity::High
        } else {
            Severity::Low
        };
        out.push(Conflict {
            kind: ConflictKind::CoverageShortfall,
            severity,
            shift: shift.id.clone(),
            shift_start: shift.start,
            employee: None,
            assignments: resolved
                .iter()
                .filter(|r| r.shift == s)
                .map(|r| r.assignment.clone())
                .collect(),
            message: format!(
                "shift {} ({}) has {assigned} of {} required employees",
                shift.id,
                window(shift),
                shift.headcount
            ),
        });
    }
    stats.coverage_percentage = if stats.required_slots == 0 {
        100.0
    } else {
        f64::from(stats.assigned_slots) * 100.0 / f64::from(stats.required_slots)
    };
    stats
}
