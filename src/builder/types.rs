use crate::model::{EmployeeId, ModelError, ShiftId};
use crate::rules::RuleBook;
use chrono::{IsoWeek, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Index d'une variable de décision dans `Problem::variables`.
pub type VarId = usize;

/// Politique de couverture des effectifs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadcountPolicy {
    /// Égalité stricte, puis un unique repli en « au mieux » si rien n'est trouvé.
    #[default]
    Auto,
    /// Égalité stricte, jamais relâchée.
    Strict,
    /// Directement « au mieux », les manques étant pénalisés.
    BestEffort,
}

/// Variable binaire « employé affecté au créneau ».
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub employee: usize,
    pub shift: usize,
    pub minutes: i64,
    pub labor_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Overlap,
    Rest,
}

/// Clauses dures, linéaires sur les variables d'un employé ou d'un créneau.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Somme des variables du créneau == `target` (`target` borné par le nombre d'éligibles).
    Headcount { shift: usize, target: u32 },
    /// `a + b <= 1`
    Exclusive { a: VarId, b: VarId, reason: Exclusion },
    /// Somme des minutes de la semaine ISO <= `limit`.
    MaxMinutes {
        employee: usize,
        week: IsoWeek,
        vars: Vec<VarId>,
        limit: i64,
    },
    /// Aucune série de jours travaillés plus longue que `limit`.
    MaxConsecutiveDays { employee: usize, limit: u32 },
    /// Préférence dure : la paire doit être retenue. `var` absent = paire inéligible.
    Fixed {
        employee: EmployeeId,
        shift: ShiftId,
        var: Option<VarId>,
    },
}

/// Termes de l'objectif (minimisé).
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Coefficient sur une variable ; négatif = récompense.
    Linear { var: VarId, coefficient: f64 },
    /// Pénalité si les deux variables sont retenues (repos souple).
    Pair { a: VarId, b: VarId, weight: f64 },
    /// Pénalité par jour au-delà de `limit` dans une série.
    ConsecutiveExcess {
        employee: usize,
        limit: u32,
        weight: f64,
    },
    /// Pénalité par heure manquante sous le minimum hebdomadaire.
    MinMinutes {
        employee: usize,
        week: IsoWeek,
        minutes: i64,
        weight: f64,
    },
    /// Pénalité par place non pourvue.
    Shortfall { shift: usize, weight: f64 },
    /// Variance des heures affectées, pondérée.
    Fairness { weight: f64 },
}

/// Créneau dont le vivier d'éligibles est inférieur à l'effectif demandé.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveragePrecondition {
    pub shift: ShiftId,
    pub eligible: u32,
    pub required: u32,
}

/// Problème compilé : variables, clauses dures et termes d'objectif.
#[derive(Debug, Clone)]
pub struct Problem {
    pub(crate) rules: RuleBook,
    pub variables: Vec<Variable>,
    pub clauses: Vec<Clause>,
    pub terms: Vec<Term>,
    pub preconditions: Vec<CoveragePrecondition>,
    pub policy: HeadcountPolicy,
    pub(crate) shift_vars: Vec<Vec<VarId>>,
    pub(crate) employee_vars: Vec<Vec<VarId>>,
    pub(crate) lookup: HashMap<(usize, usize), VarId>,
    pub(crate) exclusions: Vec<Vec<VarId>>,
    pub(crate) targets: Vec<u32>,
    pub(crate) week_limits: HashMap<(usize, IsoWeek), i64>,
    pub(crate) consecutive_limits: Vec<Option<u32>>,
    pub(crate) fixed: Vec<Vec<VarId>>,
    pub(crate) unsatisfiable_fixed: Vec<(EmployeeId, ShiftId)>,
    pub(crate) coefficients: Vec<f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuilderError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("duplicate employee id: {0}")]
    DuplicateEmployee(String),
    #[error("duplicate shift id: {0}")]
    DuplicateShift(String),
    #[error("employee {employee}: overlapping availability windows on {day}")]
    OverlappingAvailability { employee: String, day: Weekday },
    #[error("employee {employee}: min_hours_per_week ({min}) exceeds max_hours_per_week ({max})")]
    HoursBounds { employee: String, min: u32, max: u32 },
    #[error("employee {employee}: hourly_cost must be a finite non-negative number")]
    InvalidCost { employee: String },
    #[error("{context}: unknown employee {employee}")]
    UnknownEmployee {
        context: &'static str,
        employee: String,
    },
    #[error("{context}: unknown shift {shift}")]
    UnknownShift { context: &'static str, shift: String },
    #[error("{context}: weight must be finite and non-negative (got {weight})")]
    InvalidWeight { context: &'static str, weight: f64 },
    #[error("{context}: {reason}")]
    InvalidRule {
        context: &'static str,
        reason: &'static str,
    },
}
