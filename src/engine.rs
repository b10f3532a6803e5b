use crate::builder::{self, BuilderError, CoveragePrecondition};
use crate::config::EngineOptions;
use crate::conflicts::{self, Conflict, CoverageStats, ValidationReport};
use crate::model::{AssignmentSet, Constraint, Employee, Shift};
use crate::optimizer::{self, Goals, OptimizationReport};
use crate::solver::{self, Breakdown, SolveStatus};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Résultat de `generate` : le jeu produit et sa revalidation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub status: SolveStatus,
    pub assignment_set: AssignmentSet,
    pub conflicts: Vec<Conflict>,
    pub coverage: CoverageStats,
    pub objective_score: f64,
    pub breakdown: Breakdown,
    pub relaxed: bool,
    pub timed_out: bool,
    /// Créneaux ayant moins d'éligibles que d'effectif demandé.
    pub preconditions: Vec<CoveragePrecondition>,
}

/// Engine : point d'entrée des trois opérations (générer, valider, optimiser).
///
/// Sans état entre deux appels ; chaque opération recompile ses entrées.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: EngineOptions,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Génère un planning. `time_budget` remplace le budget configuré.
    pub fn generate(
        &self,
        employees: &[Employee],
        shifts: &[Shift],
        constraints: &[Constraint],
        time_budget: Option<Duration>,
    ) -> Result<GenerateOutcome, BuilderError> {
        self.generate_with_hint(employees, shifts, constraints, time_budget, None)
    }

    /// Comme `generate`, en explorant d'abord les paires présentes dans `hint`.
    pub fn generate_with_hint(
        &self,
        employees: &[Employee],
        shifts: &[Shift],
        constraints: &[Constraint],
        time_budget: Option<Duration>,
        hint: Option<&AssignmentSet>,
    ) -> Result<GenerateOutcome, BuilderError> {
        let problem = builder::build(employees, shifts, constraints, &self.options)?;
        let budget =
            time_budget.unwrap_or_else(|| self.options.time_budget_for(problem.variables.len()));
        let solution = solver::solve(&problem, budget, hint);
        let report = conflicts::detect(&solution.assignments, &problem.rules)?;
        info!(
            status = ?solution.status,
            conflicts = report.conflicts.len(),
            coverage = report.coverage.coverage_percentage,
            "schedule generated"
        );
        Ok(GenerateOutcome {
            status: solution.status,
            assignment_set: solution.assignments,
            conflicts: report.conflicts,
            coverage: report.coverage,
            objective_score: solution.objective,
            breakdown: solution.breakdown,
            relaxed: solution.relaxed,
            timed_out: solution.timed_out,
            preconditions: problem.preconditions,
        })
    }

    pub fn validate(
        &self,
        set: &AssignmentSet,
        employees: &[Employee],
        shifts: &[Shift],
        constraints: &[Constraint],
    ) -> Result<ValidationReport, BuilderError> {
        conflicts::validate(set, employees, shifts, constraints, &self.options)
    }

    pub fn optimize(
        &self,
        set: &AssignmentSet,
        employees: &[Employee],
        shifts: &[Shift],
        constraints: &[Constraint],
        goals: &Goals,
    ) -> Result<OptimizationReport, BuilderError> {
        let problem = builder::build(employees, shifts, constraints, &self.options)?;
        optimizer::optimize(set, &problem, goals, self.options.max_suggestions)
    }
}
