use chrono::{DateTime, Datelike, IsoWeek, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

/// Violation d'un invariant du modèle, détectée à la construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("interval must start before it ends ({start} >= {end})")]
    InvalidInterval { start: NaiveTime, end: NaiveTime },
    #[error("shift {shift}: end must be strictly after start")]
    InvalidShiftWindow { shift: String },
    #[error("shift {shift}: headcount must be at least 1")]
    ZeroHeadcount { shift: String },
    #[error("employee {employee} holds none of the qualifications required by shift {shift}")]
    QualificationMismatch { employee: String, shift: String },
}

/// Identifiant fort pour Employee
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiant fort pour Shift
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShiftId(String);

impl ShiftId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plage horaire dans une journée. Une fin à `00:00` signifie minuit en fin de journée.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeInterval {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ModelError> {
        let interval = Self { start, end };
        interval.validate()?;
        Ok(interval)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let (start, end) = self.bounds();
        if start >= end {
            return Err(ModelError::InvalidInterval {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Bornes en secondes depuis minuit, fin exclusive.
    pub fn bounds(&self) -> (u32, u32) {
        let start = self.start.num_seconds_from_midnight();
        let end = match self.end.num_seconds_from_midnight() {
            0 => SECONDS_PER_DAY,
            s => s,
        };
        (start, end)
    }

    pub fn contains(&self, from: u32, to: u32) -> bool {
        let (start, end) = self.bounds();
        start <= from && to <= end
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        let (a_start, a_end) = self.bounds();
        let (b_start, b_end) = other.bounds();
        a_start < b_end && b_start < a_end
    }
}

/// Disponibilité hebdomadaire : un jour, une plage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub day: Weekday,
    pub interval: TimeInterval,
}

fn default_max_hours() -> u32 {
    40
}

/// Employé planifiable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub qualifications: BTreeSet<String>,
    #[serde(default)]
    pub availability: Vec<AvailabilityWindow>,
    #[serde(default = "default_max_hours")]
    pub max_hours_per_week: u32,
    #[serde(default)]
    pub min_hours_per_week: u32,
    #[serde(default)]
    pub hourly_cost: f64,
}

impl Employee {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self {
            id: EmployeeId::new(&id),
            display_name: id.as_ref().to_owned(),
            qualifications: BTreeSet::new(),
            availability: Vec::new(),
            max_hours_per_week: default_max_hours(),
            min_hours_per_week: 0,
            hourly_cost: 0.0,
        }
    }

    pub fn with_qualification<S: Into<String>>(mut self, tag: S) -> Self {
        self.qualifications.insert(tag.into());
        self
    }

    /// Ajoute une plage de disponibilité en validant `start < end`.
    pub fn with_availability(
        mut self,
        day: Weekday,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Self, ModelError> {
        let interval = TimeInterval::new(start, end)?;
        self.availability.push(AvailabilityWindow { day, interval });
        Ok(self)
    }

    pub fn with_weekly_hours(mut self, min: u32, max: u32) -> Self {
        self.min_hours_per_week = min;
        self.max_hours_per_week = max;
        self
    }

    pub fn with_hourly_cost(mut self, cost: f64) -> Self {
        self.hourly_cost = cost;
        self
    }

    pub fn windows_on(&self, day: Weekday) -> impl Iterator<Item = &TimeInterval> {
        self.availability
            .iter()
            .filter(move |w| w.day == day)
            .map(|w| &w.interval)
    }

    /// Une exigence vide accepte tout le monde, sinon il faut au moins une qualification commune.
    pub fn is_qualified_for(&self, required: &BTreeSet<String>) -> bool {
        required.is_empty() || !self.qualifications.is_disjoint(required)
    }

    /// Vrai si `[start, end)` est entièrement couvert par les plages déclarées,
    /// y compris à cheval sur minuit quand les plages s'enchaînent.
    pub fn is_available_for(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if end <= start {
            return false;
        }
        let mut cursor = start;
        while cursor < end {
            let date = cursor.date_naive();
            let next_midnight = match date.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
                Some(naive) => naive.and_utc(),
                None => return false,
            };
            let segment_end = end.min(next_midnight);
            let from = cursor.time().num_seconds_from_midnight();
            let to = if segment_end == next_midnight {
                SECONDS_PER_DAY
            } else {
                segment_end.time().num_seconds_from_midnight()
            };
            if !self.windows_on(date.weekday()).any(|w| w.contains(from, to)) {
                return false;
            }
            cursor = segment_end;
        }
        true
    }
}

fn default_headcount() -> u32 {
    1
}

/// Créneau à pourvoir (UTC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub required_qualifications: BTreeSet<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_headcount")]
    pub headcount: u32,
    /// Couverture imposée légalement : un manque devient bloquant.
    #[serde(default)]
    pub mandatory: bool,
}

impl Shift {
    /// Crée un shift en validant `end > start` et `headcount >= 1`.
    pub fn new<S: AsRef<str>, P: Into<String>>(
        id: S,
        position: P,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        headcount: u32,
    ) -> Result<Self, ModelError> {
        let shift = Self {
            id: ShiftId::new(id),
            position: position.into(),
            required_qualifications: BTreeSet::new(),
            start,
            end,
            headcount,
            mandatory: false,
        };
        shift.validate()?;
        Ok(shift)
    }

    pub fn requiring<S: Into<String>>(mut self, tag: S) -> Self {
        self.required_qualifications.insert(tag.into());
        self
    }

    pub fn legally_mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.end <= self.start {
            return Err(ModelError::InvalidShiftWindow {
                shift: self.id.to_string(),
            });
        }
        if self.headcount == 0 {
            return Err(ModelError::ZeroHeadcount {
                shift: self.id.to_string(),
            });
        }
        Ok(())
    }

    /// Durée en minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn hours(&self) -> f64 {
        self.duration_minutes() as f64 / 60.0
    }

    pub fn overlaps(&self, other: &Shift) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Jour de rattachement (date de début).
    pub fn day(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn iso_week(&self) -> IsoWeek {
        self.start.iso_week()
    }

    /// Repos entre la fin de `self` et le début de `next`, en minutes.
    pub fn rest_before(&self, next: &Shift) -> i64 {
        (next.start - self.end).num_minutes()
    }
}

/// Jour de la semaine récurrent ou date précise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOrDate {
    Day(Weekday),
    Date(NaiveDate),
}

/// Règle dure, ou souple avec un poids.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Hard,
    Soft { weight: f64 },
}

impl Strength {
    pub fn is_hard(&self) -> bool {
        matches!(self, Strength::Hard)
    }

    /// Poids d'une règle souple ; une règle dure n'en a pas.
    pub fn weight(&self) -> Option<f64> {
        match self {
            Strength::Hard => None,
            Strength::Soft { weight } => Some(*weight),
        }
    }
}

/// Les différentes règles normalisées reçues du normaliseur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    Unavailable {
        employee: EmployeeId,
        on: DayOrDate,
        #[serde(default)]
        interval: Option<TimeInterval>,
    },
    MaxConsecutiveDays {
        employee: EmployeeId,
        days: u32,
    },
    MinRestHours {
        employee: EmployeeId,
        hours: u32,
    },
    PreferredShift {
        employee: EmployeeId,
        shift: ShiftId,
    },
    FairnessTarget,
    RequiredQualification {
        shift: ShiftId,
        tag: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(flatten)]
    pub kind: ConstraintKind,
    pub strength: Strength,
}

impl Constraint {
    pub fn hard(kind: ConstraintKind) -> Self {
        Self {
            kind,
            strength: Strength::Hard,
        }
    }

    pub fn soft(kind: ConstraintKind, weight: f64) -> Self {
        Self {
            kind,
            strength: Strength::Soft { weight },
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[default]
    Proposed,
    Confirmed,
}

/// Affectation (employé, créneau). Construite uniquement si les qualifications se recoupent,
/// sauf dérogation explicite.
///
/// La désérialisation (espace de travail JSON) ne connaît ni l'employé ni le créneau et ne
/// peut donc pas refaire ce contrôle : un jeu relu doit passer par `validate`, qui signale
/// toute paire non qualifiée sans dérogation en `QualificationMismatch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    employee: EmployeeId,
    shift: ShiftId,
    #[serde(default)]
    status: AssignmentStatus,
    #[serde(default)]
    qualification_override: bool,
}

impl Assignment {
    /// Vérifie le recoupement avec les qualifications déclarées par le shift.
    pub fn new(
        employee: &Employee,
        shift: &Shift,
        status: AssignmentStatus,
    ) -> Result<Self, ModelError> {
        Self::for_requirement(employee, &shift.id, &shift.required_qualifications, status)
    }

    /// Variante utilisée quand l'exigence effective diffère du shift (règle `RequiredQualification`).
    pub fn for_requirement(
        employee: &Employee,
        shift: &ShiftId,
        required: &BTreeSet<String>,
        status: AssignmentStatus,
    ) -> Result<Self, ModelError> {
        if !employee.is_qualified_for(required) {
            return Err(ModelError::QualificationMismatch {
                employee: employee.id.to_string(),
                shift: shift.to_string(),
            });
        }
        Ok(Self {
            employee: employee.id.clone(),
            shift: shift.clone(),
            status,
            qualification_override: false,
        })
    }

    /// Dérogation explicite du manager : aucune vérification de qualification.
    pub fn overridden(employee: &EmployeeId, shift: &ShiftId, status: AssignmentStatus) -> Self {
        Self {
            employee: employee.clone(),
            shift: shift.clone(),
            status,
            qualification_override: true,
        }
    }

    pub fn employee(&self) -> &EmployeeId {
        &self.employee
    }
    pub fn shift(&self) -> &ShiftId {
        &self.shift
    }
    pub fn status(&self) -> AssignmentStatus {
        self.status
    }
    pub fn is_override(&self) -> bool {
        self.qualification_override
    }

    pub fn confirmed(mut self) -> Self {
        self.status = AssignmentStatus::Confirmed;
        self
    }

    pub fn same_pair(&self, other: &Assignment) -> bool {
        self.employee == other.employee && self.shift == other.shift
    }
}

/// Période couverte par un jeu d'affectations (bornes incluses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Collection ordonnée d'affectations, possédée par l'appelant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon: Option<Horizon>,
    #[serde(default)]
    assignments: Vec<Assignment>,
}

impl AssignmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_horizon(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.horizon = Some(Horizon { start, end });
        self
    }

    pub fn push(&mut self, assignment: Assignment) {
        self.assignments.push(assignment);
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Assignment> {
        self.assignments.iter()
    }

    pub fn as_slice(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn contains_pair(&self, employee: &EmployeeId, shift: &ShiftId) -> bool {
        self.position(employee, shift).is_some()
    }

    pub fn position(&self, employee: &EmployeeId, shift: &ShiftId) -> Option<usize> {
        self.assignments
            .iter()
            .position(|a| &a.employee == employee && &a.shift == shift)
    }

    pub fn for_employee<'a>(
        &'a self,
        employee: &'a EmployeeId,
    ) -> impl Iterator<Item = &'a Assignment> + 'a {
        self.assignments.iter().filter(move |a| &a.employee == employee)
    }

    pub fn for_shift<'a>(&'a self, shift: &'a ShiftId) -> impl Iterator<Item = &'a Assignment> + 'a {
        self.assignments.iter().filter(move |a| &a.shift == shift)
    }

    /// Remplace sur place, en conservant l'ordre. Renvoie `false` si l'affectation est absente.
    pub fn replace(&mut self, old: &Assignment, new: Assignment) -> bool {
        match self.assignments.iter().position(|a| a.same_pair(old)) {
            Some(idx) => {
                self.assignments[idx] = new;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, target: &Assignment) -> Option<Assignment> {
        let idx = self.assignments.iter().position(|a| a.same_pair(target))?;
        Some(self.assignments.remove(idx))
    }
}

impl FromIterator<Assignment> for AssignmentSet {
    fn from_iter<I: IntoIterator<Item = Assignment>>(iter: I) -> Self {
        Self {
            horizon: None,
            assignments: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AssignmentSet {
    type Item = &'a Assignment;
    type IntoIter = std::slice::Iter<'a, Assignment>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.iter()
    }
}
