//! Compilation des employés, créneaux et règles en problème solvable.

mod types;

pub use types::{
    BuilderError, Clause, CoveragePrecondition, Exclusion, HeadcountPolicy, Problem, Term,
    VarId, Variable,
};

use crate::config::EngineOptions;
use crate::model::{
    Assignment, AssignmentSet, AssignmentStatus, Constraint, Employee, Shift, Strength,
};
use crate::rules::RuleBook;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Construit le problème. Fonction pure : mêmes entrées, même problème.
pub fn build(
    employees: &[Employee],
    shifts: &[Shift],
    constraints: &[Constraint],
    options: &EngineOptions,
) -> Result<Problem, BuilderError> {
    let rules = RuleBook::compile(employees, shifts, constraints, options)?;
    Ok(compile(rules, options))
}

// pré-filtre : qualification, disponibilité, et durée compatible avec le plafond hebdomadaire
fn eligible(rules: &RuleBook, employee: usize, shift: usize) -> bool {
    rules.is_qualified(employee, shift)
        && rules.is_available(employee, shift)
        && rules.shift(shift).duration_minutes() <= rules.max_minutes(employee)
}

pub(crate) fn compile(rules: RuleBook, options: &EngineOptions) -> Problem {
    let n_employees = rules.employees().len();
    let n_shifts = rules.shifts().len();

    let mut variables = Vec::new();
    let mut shift_vars = vec![Vec::new(); n_shifts];
    let mut employee_vars = vec![Vec::new(); n_employees];
    let mut lookup = HashMap::new();
    for s in 0..n_shifts {
        let shift = rules.shift(s);
        for e in 0..n_employees {
            if !eligible(&rules, e, s) {
                continue;
            }
            let var = variables.len();
            let minutes = shift.duration_minutes();
            variables.push(Variable {
                employee: e,
                shift: s,
                minutes,
                labor_cost: rules.employee(e).hourly_cost * minutes as f64 / 60.0,
            });
            shift_vars[s].push(var);
            employee_vars[e].push(var);
            lookup.insert((e, s), var);
        }
    }
    debug!(
        variables = variables.len(),
        theoretical = n_employees * n_shifts,
        "pre-filtered decision variables"
    );

    let mut clauses = Vec::new();
    let mut preconditions = Vec::new();
    let mut targets = Vec::with_capacity(n_shifts);
    for (s, vars) in shift_vars.iter().enumerate() {
        let shift = rules.shift(s);
        let pool = vars.len() as u32;
        let target = shift.headcount.min(pool);
        if pool < shift.headcount {
            preconditions.push(CoveragePrecondition {
                shift: shift.id.clone(),
                eligible: pool,
                required: shift.headcount,
            });
        }
        targets.push(target);
        clauses.push(Clause::Headcount { shift: s, target });
    }

    for (e, vars) in employee_vars.iter().enumerate() {
        let rest = rules.rest_minutes(e);
        for (idx, &a) in vars.iter().enumerate() {
            let first = rules.shift(variables[a].shift);
            for &b in vars.iter().skip(idx + 1) {
                let second = rules.shift(variables[b].shift);
                let reason = if first.overlaps(second) {
                    Some(Exclusion::Overlap)
                } else {
                    rest.filter(|&r| first.rest_before(second) < r)
                        .map(|_| Exclusion::Rest)
                };
                if let Some(reason) = reason {
                    clauses.push(Clause::Exclusive { a, b, reason });
                }
            }
        }

        let limit = rules.max_minutes(e);
        let mut by_week: BTreeMap<_, Vec<VarId>> = BTreeMap::new();
        for &v in vars {
            by_week
                .entry(rules.shift(variables[v].shift).iso_week())
                .or_default()
                .push(v);
        }
        for (week, week_vars) in by_week {
            let total: i64 = week_vars.iter().map(|&v| variables[v].minutes).sum();
            if total > limit {
                clauses.push(Clause::MaxMinutes {
                    employee: e,
                    week,
                    vars: week_vars,
                    limit,
                });
            }
        }

        if let Some(limit) = rules.max_consecutive(e) {
            clauses.push(Clause::MaxConsecutiveDays { employee: e, limit });
        }
    }

    let mut linear: BTreeMap<VarId, f64> = BTreeMap::new();
    for &(e, s, strength) in rules.preferences() {
        let var = lookup.get(&(e, s)).copied();
        match strength {
            Strength::Hard => clauses.push(Clause::Fixed {
                employee: rules.employee(e).id.clone(),
                shift: rules.shift(s).id.clone(),
                var,
            }),
            Strength::Soft { weight } => {
                if let Some(var) = var {
                    *linear.entry(var).or_default() -= weight;
                }
            }
        }
    }
    for (s, tag, weight) in rules.qualification_bonus() {
        for &v in &shift_vars[*s] {
            if rules.employee(variables[v].employee).qualifications.contains(tag) {
                *linear.entry(v).or_default() -= weight;
            }
        }
    }
    for (v, variable) in variables.iter().enumerate() {
        let shift = rules.shift(variable.shift);
        for (blackout, weight) in rules.soft_blackouts(variable.employee) {
            if blackout.blocks(shift) {
                *linear.entry(v).or_default() += weight;
            }
        }
        if options.cost_weight > 0.0 {
            *linear.entry(v).or_default() += options.cost_weight * variable.labor_cost;
        }
    }

    let mut terms: Vec<Term> = linear
        .into_iter()
        .filter(|(_, coefficient)| *coefficient != 0.0)
        .map(|(var, coefficient)| Term::Linear { var, coefficient })
        .collect();

    let weeks = rules.weeks();
    for (e, vars) in employee_vars.iter().enumerate() {
        let mut pairs: BTreeMap<(VarId, VarId), f64> = BTreeMap::new();
        for &(minutes, weight) in rules.soft_rest(e) {
            for (idx, &a) in vars.iter().enumerate() {
                let first = rules.shift(variables[a].shift);
                for &b in vars.iter().skip(idx + 1) {
                    let second = rules.shift(variables[b].shift);
                    if !first.overlaps(second) && first.rest_before(second) < minutes {
                        *pairs.entry((a, b)).or_default() += weight;
                    }
                }
            }
        }
        terms.extend(
            pairs
                .into_iter()
                .map(|((a, b), weight)| Term::Pair { a, b, weight }),
        );

        for &(limit, weight) in rules.soft_consecutive(e) {
            terms.push(Term::ConsecutiveExcess {
                employee: e,
                limit,
                weight,
            });
        }

        let min_minutes = i64::from(rules.employee(e).min_hours_per_week) * 60;
        if min_minutes > 0 && options.min_hours_weight > 0.0 {
            for &week in &weeks {
                terms.push(Term::MinMinutes {
                    employee: e,
                    week,
                    minutes: min_minutes,
                    weight: options.min_hours_weight,
                });
            }
        }
    }
    for s in 0..n_shifts {
        terms.push(Term::Shortfall {
            shift: s,
            weight: options.shortfall_weight,
        });
    }
    if rules.fairness_weight() > 0.0 {
        terms.push(Term::Fairness {
            weight: rules.fairness_weight(),
        });
    }

    info!(
        employees = n_employees,
        shifts = n_shifts,
        variables = variables.len(),
        clauses = clauses.len(),
        terms = terms.len(),
        "problem compiled"
    );

    let mut problem = Problem {
        rules,
        variables,
        clauses,
        terms,
        preconditions,
        policy: options.headcount_policy,
        shift_vars,
        employee_vars,
        lookup,
        exclusions: Vec::new(),
        targets,
        week_limits: HashMap::new(),
        consecutive_limits: vec![None; n_employees],
        fixed: vec![Vec::new(); n_shifts],
        unsatisfiable_fixed: Vec::new(),
        coefficients: Vec::new(),
    };
    problem.index();
    problem
}

impl Problem {
    // index de recherche dérivé des clauses et termes
    fn index(&mut self) {
        let mut exclusions = vec![Vec::new(); self.variables.len()];
        for clause in &self.clauses {
            match clause {
                Clause::Headcount { .. } => {}
                Clause::Exclusive { a, b, .. } => {
                    exclusions[*a].push(*b);
                    exclusions[*b].push(*a);
                }
                Clause::MaxMinutes {
                    employee,
                    week,
                    limit,
                    ..
                } => {
                    self.week_limits.insert((*employee, *week), *limit);
                }
                Clause::MaxConsecutiveDays { employee, limit } => {
                    self.consecutive_limits[*employee] = Some(*limit);
                }
                Clause::Fixed {
                    employee,
                    shift,
                    var,
                } => match var {
                    Some(v) => {
                        let s = self.variables[*v].shift;
                        if !self.fixed[s].contains(v) {
                            self.fixed[s].push(*v);
                        }
                    }
                    None => self
                        .unsatisfiable_fixed
                        .push((employee.clone(), shift.clone())),
                },
            }
        }
        self.exclusions = exclusions;

        let mut coefficients = vec![0.0; self.variables.len()];
        for term in &self.terms {
            if let Term::Linear { var, coefficient } = term {
                coefficients[*var] += coefficient;
            }
        }
        self.coefficients = coefficients;
    }

    pub fn employees(&self) -> &[Employee] {
        self.rules.employees()
    }

    pub fn shifts(&self) -> &[Shift] {
        self.rules.shifts()
    }

    pub fn var(&self, employee: usize, shift: usize) -> Option<VarId> {
        self.lookup.get(&(employee, shift)).copied()
    }

    pub fn shift_vars(&self, shift: usize) -> &[VarId] {
        &self.shift_vars[shift]
    }

    pub fn employee_vars(&self, employee: usize) -> &[VarId] {
        &self.employee_vars[employee]
    }

    /// Effectif visé par le créneau (borné par le nombre d'éligibles).
    pub fn target(&self, shift: usize) -> u32 {
        self.targets[shift]
    }

    /// Projection d'un jeu d'affectations sur les variables ; les paires hors problème sont ignorées.
    pub fn selection_of(&self, set: &AssignmentSet) -> Result<Vec<bool>, BuilderError> {
        let mut selected = vec![false; self.variables.len()];
        for assignment in set {
            let (e, s) = self.rules.resolve(assignment)?;
            if let Some(v) = self.var(e, s) {
                selected[v] = true;
            }
        }
        Ok(selected)
    }

    /// Construit une affectation pour une variable du problème.
    pub fn assignment_for(&self, var: VarId) -> Assignment {
        let variable = &self.variables[var];
        Assignment::for_requirement(
            self.rules.employee(variable.employee),
            &self.rules.shift(variable.shift).id,
            self.rules.requirement(variable.shift),
            AssignmentStatus::Proposed,
        )
        .unwrap_or_else(|err| panic!("variable {var} escaped the qualification pre-filter: {err}"))
    }

    /// Décode une sélection en jeu ordonné (début du créneau, puis id employé).
    pub fn decode(&self, selected: &[VarId]) -> AssignmentSet {
        let mut vars = selected.to_vec();
        vars.sort_by_key(|&v| (self.variables[v].shift, self.variables[v].employee));
        let mut set: AssignmentSet = vars.into_iter().map(|v| self.assignment_for(v)).collect();
        let last_end = self.shifts().iter().map(|s| s.end).max();
        if let (Some(first), Some(end)) = (self.shifts().first(), last_end) {
            set = set.with_horizon(first.day(), end.date_naive());
        }
        set
    }
}
