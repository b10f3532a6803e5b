//! Index validé des entrées, partagé par le builder et le détecteur de conflits.

use crate::builder::BuilderError;
use crate::config::EngineOptions;
use crate::model::{
    Assignment, Constraint, ConstraintKind, DayOrDate, Employee, EmployeeId, Shift, ShiftId,
    Strength, TimeInterval, SECONDS_PER_DAY,
};
use chrono::{Datelike, IsoWeek, Timelike};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// Indisponibilité déclarée par une règle `Unavailable`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blackout {
    pub on: DayOrDate,
    pub interval: Option<TimeInterval>,
}

impl Blackout {
    /// Vrai si le créneau touche la période bloquée, jour par jour.
    pub fn blocks(&self, shift: &Shift) -> bool {
        let first = shift.start.date_naive();
        let last_instant = shift.end - chrono::Duration::seconds(1);
        let last = last_instant.date_naive();
        let mut day = first;
        while day <= last {
            let matches = match self.on {
                DayOrDate::Day(weekday) => day.weekday() == weekday,
                DayOrDate::Date(date) => day == date,
            };
            if matches {
                let Some(interval) = self.interval else {
                    return true;
                };
                let from = if day == first {
                    shift.start.time().num_seconds_from_midnight()
                } else {
                    0
                };
                let to = if day == shift.end.date_naive() {
                    shift.end.time().num_seconds_from_midnight()
                } else {
                    SECONDS_PER_DAY
                };
                let (start, end) = interval.bounds();
                if from < end && start < to {
                    return true;
                }
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        false
    }
}

#[derive(Debug, Clone)]
pub struct RuleBook {
    employees: Vec<Employee>,
    shifts: Vec<Shift>,
    employee_index: HashMap<EmployeeId, usize>,
    shift_index: HashMap<ShiftId, usize>,
    requirements: Vec<BTreeSet<String>>,
    rest_minutes: Vec<Option<i64>>,
    soft_rest: Vec<Vec<(i64, f64)>>,
    max_consecutive: Vec<Option<u32>>,
    soft_consecutive: Vec<Vec<(u32, f64)>>,
    blackouts: Vec<Vec<Blackout>>,
    soft_blackouts: Vec<Vec<(Blackout, f64)>>,
    preferences: Vec<(usize, usize, Strength)>,
    qualification_bonus: Vec<(usize, String, f64)>,
    fairness_weight: f64,
}

impl RuleBook {
    /// Valide les entrées et les indexe. Employés triés par id, créneaux par début puis id.
    pub fn compile(
        employees: &[Employee],
        shifts: &[Shift],
        constraints: &[Constraint],
        options: &EngineOptions,
    ) -> Result<Self, BuilderError> {
        let mut employees = employees.to_vec();
        employees.sort_by(|a, b| a.id.cmp(&b.id));
        let mut employee_index = HashMap::with_capacity(employees.len());
        for (idx, employee) in employees.iter().enumerate() {
            if employee_index.insert(employee.id.clone(), idx).is_some() {
                return Err(BuilderError::DuplicateEmployee(employee.id.to_string()));
            }
            validate_employee(employee)?;
        }

        let mut shifts = shifts.to_vec();
        shifts.sort_by(|a, b| (a.start, a.end, &a.id).cmp(&(b.start, b.end, &b.id)));
        let mut shift_index = HashMap::with_capacity(shifts.len());
        for (idx, shift) in shifts.iter().enumerate() {
            shift.validate()?;
            if shift_index.insert(shift.id.clone(), idx).is_some() {
                return Err(BuilderError::DuplicateShift(shift.id.to_string()));
            }
        }

        let n = employees.len();
        let mut book = Self {
            requirements: shifts
                .iter()
                .map(|s| s.required_qualifications.clone())
                .collect(),
            rest_minutes: vec![None; n],
            soft_rest: vec![Vec::new(); n],
            max_consecutive: vec![None; n],
            soft_consecutive: vec![Vec::new(); n],
            blackouts: vec![Vec::new(); n],
            soft_blackouts: vec![Vec::new(); n],
            preferences: Vec::new(),
            qualification_bonus: Vec::new(),
            fairness_weight: 0.0,
            employees,
            shifts,
            employee_index,
            shift_index,
        };

        let mut overrides: Vec<Option<BTreeSet<String>>> = vec![None; book.shifts.len()];
        for constraint in constraints {
            book.absorb(constraint, &mut overrides)?;
        }
        for (idx, tags) in overrides.into_iter().enumerate() {
            if let Some(tags) = tags {
                book.requirements[idx] = tags;
            }
        }
        let default_rest = options.default_min_rest_hours.map(|h| i64::from(h) * 60);
        for rest in &mut book.rest_minutes {
            if rest.is_none() {
                *rest = default_rest;
            }
        }
        Ok(book)
    }

    fn absorb(
        &mut self,
        constraint: &Constraint,
        overrides: &mut [Option<BTreeSet<String>>],
    ) -> Result<(), BuilderError> {
        let context = label(&constraint.kind);
        if let Some(weight) = constraint.strength.weight() {
            // seule une préférence souple peut être négative (évitement)
            let avoidance = matches!(constraint.kind, ConstraintKind::PreferredShift { .. });
            if !weight.is_finite() || (weight < 0.0 && !avoidance) {
                return Err(BuilderError::InvalidWeight { context, weight });
            }
        }
        let strength = constraint.strength;

        match &constraint.kind {
            ConstraintKind::Unavailable {
                employee,
                on,
                interval,
            } => {
                let e = self.employee_ref(context, employee)?;
                if let Some(interval) = interval {
                    interval.validate()?;
                }
                let blackout = Blackout {
                    on: *on,
                    interval: *interval,
                };
                match strength {
                    Strength::Hard => self.blackouts[e].push(blackout),
                    Strength::Soft { weight } => self.soft_blackouts[e].push((blackout, weight)),
                }
            }
            ConstraintKind::MaxConsecutiveDays { employee, days } => {
                let e = self.employee_ref(context, employee)?;
                if *days == 0 {
                    return Err(BuilderError::InvalidRule {
                        context,
                        reason: "days must be at least 1",
                    });
                }
                match strength {
                    Strength::Hard => {
                        let current = self.max_consecutive[e].unwrap_or(u32::MAX);
                        self.max_consecutive[e] = Some(current.min(*days));
                    }
                    Strength::Soft { weight } => self.soft_consecutive[e].push((*days, weight)),
                }
            }
            ConstraintKind::MinRestHours { employee, hours } => {
                let e = self.employee_ref(context, employee)?;
                let minutes = i64::from(*hours) * 60;
                match strength {
                    Strength::Hard => {
                        let current = self.rest_minutes[e].unwrap_or(0);
                        self.rest_minutes[e] = Some(current.max(minutes));
                    }
                    Strength::Soft { weight } => self.soft_rest[e].push((minutes, weight)),
                }
            }
            ConstraintKind::PreferredShift { employee, shift } => {
                let e = self.employee_ref(context, employee)?;
                let s = self.shift_ref(context, shift)?;
                self.preferences.push((e, s, strength));
            }
            ConstraintKind::FairnessTarget => match strength {
                Strength::Hard => {
                    warn!("hard fairness target ignored: fairness is only an objective term");
                }
                Strength::Soft { weight } => self.fairness_weight += weight,
            },
            ConstraintKind::RequiredQualification { shift, tag } => {
                let s = self.shift_ref(context, shift)?;
                match strength {
                    Strength::Hard => {
                        overrides[s]
                            .get_or_insert_with(BTreeSet::new)
                            .insert(tag.clone());
                    }
                    Strength::Soft { weight } => {
                        self.qualification_bonus.push((s, tag.clone(), weight));
                    }
                }
            }
        }
        Ok(())
    }

    fn employee_ref(&self, context: &'static str, id: &EmployeeId) -> Result<usize, BuilderError> {
        self.employee_idx(id).ok_or_else(|| BuilderError::UnknownEmployee {
            context,
            employee: id.to_string(),
        })
    }

    fn shift_ref(&self, context: &'static str, id: &ShiftId) -> Result<usize, BuilderError> {
        self.shift_idx(id).ok_or_else(|| BuilderError::UnknownShift {
            context,
            shift: id.to_string(),
        })
    }

    /// Résout une affectation en indices (employé, créneau).
    pub fn resolve(&self, assignment: &Assignment) -> Result<(usize, usize), BuilderError> {
        let e = self.employee_ref("assignment set", assignment.employee())?;
        let s = self.shift_ref("assignment set", assignment.shift())?;
        Ok((e, s))
    }

    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }
    pub fn shifts(&self) -> &[Shift] {
        &self.shifts
    }
    pub fn employee(&self, idx: usize) -> &Employee {
        &self.employees[idx]
    }
    pub fn shift(&self, idx: usize) -> &Shift {
        &self.shifts[idx]
    }
    pub fn employee_idx(&self, id: &EmployeeId) -> Option<usize> {
        self.employee_index.get(id).copied()
    }
    pub fn shift_idx(&self, id: &ShiftId) -> Option<usize> {
        self.shift_index.get(id).copied()
    }

    /// Exigence effective (celle du shift, ou celle imposée par règle).
    pub fn requirement(&self, shift: usize) -> &BTreeSet<String> {
        &self.requirements[shift]
    }

    pub fn is_qualified(&self, employee: usize, shift: usize) -> bool {
        self.employees[employee].is_qualified_for(&self.requirements[shift])
    }

    pub fn is_blacked_out(&self, employee: usize, shift: usize) -> bool {
        let shift = &self.shifts[shift];
        self.blackouts[employee].iter().any(|b| b.blocks(shift))
    }

    /// Disponibilité déclarée et aucune indisponibilité dure.
    pub fn is_available(&self, employee: usize, shift: usize) -> bool {
        let s = &self.shifts[shift];
        self.employees[employee].is_available_for(s.start, s.end)
            && !self.is_blacked_out(employee, shift)
    }

    pub fn rest_minutes(&self, employee: usize) -> Option<i64> {
        self.rest_minutes[employee]
    }
    pub fn soft_rest(&self, employee: usize) -> &[(i64, f64)] {
        &self.soft_rest[employee]
    }
    pub fn max_consecutive(&self, employee: usize) -> Option<u32> {
        self.max_consecutive[employee]
    }
    pub fn soft_consecutive(&self, employee: usize) -> &[(u32, f64)] {
        &self.soft_consecutive[employee]
    }
    pub fn soft_blackouts(&self, employee: usize) -> &[(Blackout, f64)] {
        &self.soft_blackouts[employee]
    }
    pub fn preferences(&self) -> &[(usize, usize, Strength)] {
        &self.preferences
    }
    pub fn qualification_bonus(&self) -> &[(usize, String, f64)] {
        &self.qualification_bonus
    }
    pub fn fairness_weight(&self) -> f64 {
        self.fairness_weight
    }

    pub fn max_minutes(&self, employee: usize) -> i64 {
        i64::from(self.employees[employee].max_hours_per_week) * 60
    }

    /// Semaines ISO couvertes par l'horizon.
    pub fn weeks(&self) -> BTreeSet<IsoWeek> {
        self.shifts.iter().map(Shift::iso_week).collect()
    }
}

fn label(kind: &ConstraintKind) -> &'static str {
    match kind {
        ConstraintKind::Unavailable { .. } => "unavailable rule",
        ConstraintKind::MaxConsecutiveDays { .. } => "max_consecutive_days rule",
        ConstraintKind::MinRestHours { .. } => "min_rest_hours rule",
        ConstraintKind::PreferredShift { .. } => "preferred_shift rule",
        ConstraintKind::FairnessTarget => "fairness_target rule",
        ConstraintKind::RequiredQualification { .. } => "required_qualification rule",
    }
}

fn validate_employee(employee: &Employee) -> Result<(), BuilderError> {
    for window in &employee.availability {
        window.interval.validate()?;
    }
    for (idx, a) in employee.availability.iter().enumerate() {
        for b in employee.availability.iter().skip(idx + 1) {
            if a.day == b.day && a.interval.overlaps(&b.interval) {
                return Err(BuilderError::OverlappingAvailability {
                    employee: employee.id.to_string(),
                    day: a.day,
                });
            }
        }
    }
    if employee.min_hours_per_week > employee.max_hours_per_week {
        return Err(BuilderError::HoursBounds {
            employee: employee.id.to_string(),
            min: employee.min_hours_per_week,
            max: employee.max_hours_per_week,
        });
    }
    if !employee.hourly_cost.is_finite() || employee.hourly_cost < 0.0 {
        return Err(BuilderError::InvalidCost {
            employee: employee.id.to_string(),
        });
    }
    Ok(())
}
