#![forbid(unsafe_code)]
//! Horaire : moteur de planification d'équipes sous contraintes (local, sans BD).
//!
//! - Modèle : employés, créneaux, règles dures ou souples, affectations.
//! - Compilation en problème (variables pré-filtrées, clauses, termes d'objectif).
//! - Recherche par séparation et évaluation, budget de temps, relâchement de l'effectif.
//! - Détection de conflits indépendante du solveur, suggestions d'amélioration locales.
//! - Tout en UTC ; les plages de disponibilité sont hebdomadaires.

pub mod builder;
pub mod config;
pub mod conflicts;
pub mod engine;
pub mod io;
pub mod model;
pub mod optimizer;
pub mod provider;
mod rules;
pub mod solver;

pub use builder::{build, BuilderError, HeadcountPolicy, Problem};
pub use config::EngineOptions;
pub use conflicts::{validate, Conflict, ConflictKind, CoverageStats, Severity, ValidationReport};
pub use engine::{Engine, GenerateOutcome};
pub use model::{
    Assignment, AssignmentSet, AssignmentStatus, Constraint, ConstraintKind, DayOrDate, Employee,
    EmployeeId, ModelError, Shift, ShiftId, Strength, TimeInterval,
};
pub use optimizer::{optimize, Goals, OptimizationReport, Suggestion, SuggestionKind};
pub use provider::{DataProvider, JsonWorkspace, RuleNormalizer, Workspace};
pub use solver::{solve, Solution, SolveStatus};
