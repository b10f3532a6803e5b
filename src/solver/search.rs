//! Branch-and-bound sur pile explicite.
//!
//! Une « place » (slot) est une unité d'effectif d'un créneau. Les créneaux sont parcourus du plus
//! contraint au moins contraint ; au sein d'un créneau les employés sont choisis par indice
//! croissant, ce qui énumère chaque combinaison une seule fois.

use super::objective::{self, Breakdown};
use crate::builder::{Problem, VarId};
use chrono::{IsoWeek, NaiveDate};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

const EPSILON: f64 = 1e-9;
const DEADLINE_CHECK_MASK: u64 = 0x3f;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    /// Chaque créneau reçoit exactement son effectif visé.
    Strict,
    /// Une place peut rester vide ; le manque est pénalisé par l'objectif.
    Relaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Take(VarId),
    Skip,
}

struct Frame {
    slot: usize,
    options: Vec<Choice>,
    next: usize,
    applied: Option<Choice>,
}

/// Meilleure solution complète rencontrée.
#[derive(Debug, Clone)]
pub(super) struct Incumbent {
    pub vars: Vec<VarId>,
    pub breakdown: Breakdown,
    pub score: f64,
    pub filled: u32,
    pub cost: f64,
    key: Vec<(usize, usize)>,
}

impl Incumbent {
    // score, puis couverture, puis coût, puis ordre lexicographique des paires (créneau, employé)
    fn is_better_than(&self, other: &Incumbent) -> bool {
        if (self.score - other.score).abs() > EPSILON {
            return self.score < other.score;
        }
        if self.filled != other.filled {
            return self.filled > other.filled;
        }
        if (self.cost - other.cost).abs() > EPSILON {
            return self.cost < other.cost;
        }
        self.key < other.key
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct SearchStats {
    pub exhausted: bool,
    pub expansions: u64,
}

struct State {
    selected: Vec<bool>,
    chosen: Vec<VarId>,
    week_minutes: Vec<BTreeMap<IsoWeek, i64>>,
    total_minutes: Vec<i64>,
    days: Vec<BTreeMap<NaiveDate, u32>>,
    filled: Vec<u32>,
    skipped: Vec<u32>,
    decided: Vec<bool>,
}

impl State {
    fn new(problem: &Problem) -> Self {
        let n_employees = problem.employees().len();
        let n_shifts = problem.shifts().len();
        Self {
            selected: vec![false; problem.variables.len()],
            chosen: Vec::new(),
            week_minutes: vec![BTreeMap::new(); n_employees],
            total_minutes: vec![0; n_employees],
            days: vec![BTreeMap::new(); n_employees],
            filled: vec![0; n_shifts],
            skipped: vec![0; n_shifts],
            decided: vec![false; n_shifts],
        }
    }
}

pub(super) struct Search<'p> {
    problem: &'p Problem,
    mode: Mode,
    slots: Vec<usize>,
    slot_rank: Vec<usize>,
    last_slot: Vec<Option<usize>>,
    hints: &'p HashSet<VarId>,
    deadline: Instant,
    hard_deadline: Instant,
}

impl<'p> Search<'p> {
    /// `hard_deadline` ne sert qu'au mode relâché tant qu'aucune solution n'existe.
    pub(super) fn new(
        problem: &'p Problem,
        mode: Mode,
        hints: &'p HashSet<VarId>,
        deadline: Instant,
        hard_deadline: Instant,
    ) -> Self {
        let mut order: Vec<usize> = (0..problem.shifts().len())
            .filter(|&s| problem.target(s) > 0)
            .collect();
        order.sort_by_key(|&s| (problem.shift_vars(s).len(), s));

        let mut slots = Vec::new();
        let mut slot_rank = Vec::new();
        let mut last_slot = vec![None; problem.shifts().len()];
        for s in order {
            for rank in 0..problem.target(s) as usize {
                slots.push(s);
                slot_rank.push(rank);
            }
            last_slot[s] = Some(slots.len() - 1);
        }

        Self {
            problem,
            mode,
            slots,
            slot_rank,
            last_slot,
            hints,
            deadline,
            hard_deadline,
        }
    }

    /// Explore l'arbre ; `incumbent` est l'accumulateur propre à cet appel.
    pub(super) fn run(&self, incumbent: &mut Option<Incumbent>) -> SearchStats {
        let mut state = State::new(self.problem);
        for (s, last) in self.last_slot.iter().enumerate() {
            if last.is_none() {
                state.decided[s] = true;
            }
        }
        let mut stats = SearchStats::default();

        if self.slots.is_empty() {
            self.record(&state, incumbent);
            stats.exhausted = true;
            return stats;
        }

        let mut stack = vec![Frame {
            slot: 0,
            options: self.options_for(0, &state),
            next: 0,
            applied: None,
        }];

        while let Some(frame) = stack.last_mut() {
            if let Some(choice) = frame.applied.take() {
                self.undo(&mut state, frame.slot, choice);
            }
            if frame.next >= frame.options.len() {
                stack.pop();
                continue;
            }

            stats.expansions += 1;
            if stats.expansions & DEADLINE_CHECK_MASK == 0 && self.expired(incumbent) {
                return stats;
            }

            let choice = frame.options[frame.next];
            frame.next += 1;
            let slot = frame.slot;
            self.apply(&mut state, slot, choice);
            frame.applied = Some(choice);

            if self.should_prune(&state, incumbent) {
                continue;
            }
            if slot + 1 == self.slots.len() {
                self.record(&state, incumbent);
                continue;
            }
            let options = self.options_for(slot + 1, &state);
            if options.is_empty() {
                continue;
            }
            stack.push(Frame {
                slot: slot + 1,
                options,
                next: 0,
                applied: None,
            });
        }

        stats.exhausted = true;
        stats
    }

    fn expired(&self, incumbent: &Option<Incumbent>) -> bool {
        let now = Instant::now();
        match (self.mode, incumbent) {
            (Mode::Relaxed, None) => now >= self.hard_deadline,
            _ => now >= self.deadline,
        }
    }

    fn options_for(&self, slot: usize, state: &State) -> Vec<Choice> {
        let s = self.slots[slot];
        if state.skipped[s] > 0 {
            return vec![Choice::Skip];
        }

        let forced = &self.problem.fixed[s];
        let rank = self.slot_rank[slot];
        if rank < forced.len() {
            let v = forced[rank];
            return if self.admissible(state, v) {
                vec![Choice::Take(v)]
            } else {
                Vec::new()
            };
        }

        let floor = self
            .problem
            .shift_vars(s)
            .iter()
            .filter(|&&v| state.selected[v] && !forced.contains(&v))
            .map(|&v| self.problem.variables[v].employee)
            .max();
        let mut candidates: Vec<VarId> = self
            .problem
            .shift_vars(s)
            .iter()
            .copied()
            .filter(|v| !forced.contains(v))
            .filter(|&v| floor.map_or(true, |f| self.problem.variables[v].employee > f))
            .filter(|&v| self.admissible(state, v))
            .collect();
        candidates.sort_by(|&a, &b| self.compare_candidates(state, a, b));

        let mut options: Vec<Choice> = candidates.into_iter().map(Choice::Take).collect();
        if self.mode == Mode::Relaxed {
            options.push(Choice::Skip);
        }
        options
    }

    // indice chaud d'abord, puis meilleur coefficient, puis charge la plus faible, puis id
    fn compare_candidates(&self, state: &State, a: VarId, b: VarId) -> Ordering {
        let hinted = |v: VarId| !self.hints.contains(&v);
        let load = |v: VarId| state.total_minutes[self.problem.variables[v].employee];
        let coefficients = &self.problem.coefficients;
        hinted(a)
            .cmp(&hinted(b))
            .then(coefficients[a].total_cmp(&coefficients[b]))
            .then(load(a).cmp(&load(b)))
            .then(self.problem.variables[a].employee.cmp(&self.problem.variables[b].employee))
    }

    fn admissible(&self, state: &State, v: VarId) -> bool {
        if state.selected[v] {
            return false;
        }
        if self.problem.exclusions[v].iter().any(|&o| state.selected[o]) {
            return false;
        }
        let variable = &self.problem.variables[v];
        let e = variable.employee;
        let shift = &self.problem.shifts()[variable.shift];
        let week = shift.iso_week();
        if let Some(limit) = self.problem.week_limits.get(&(e, week)) {
            let used = state.week_minutes[e].get(&week).copied().unwrap_or(0);
            if used + variable.minutes > *limit {
                return false;
            }
        }
        if let Some(limit) = self.problem.consecutive_limits[e] {
            if run_with(&state.days[e], shift.day()) > limit {
                return false;
            }
        }
        true
    }

    fn apply(&self, state: &mut State, slot: usize, choice: Choice) {
        let s = self.slots[slot];
        match choice {
            Choice::Take(v) => {
                let variable = &self.problem.variables[v];
                let shift = &self.problem.shifts()[variable.shift];
                let e = variable.employee;
                state.selected[v] = true;
                state.chosen.push(v);
                *state.week_minutes[e].entry(shift.iso_week()).or_insert(0) += variable.minutes;
                state.total_minutes[e] += variable.minutes;
                *state.days[e].entry(shift.day()).or_insert(0) += 1;
                state.filled[s] += 1;
            }
            Choice::Skip => state.skipped[s] += 1,
        }
        if self.last_slot[s] == Some(slot) {
            state.decided[s] = true;
        }
    }

    fn undo(&self, state: &mut State, slot: usize, choice: Choice) {
        let s = self.slots[slot];
        if self.last_slot[s] == Some(slot) {
            state.decided[s] = false;
        }
        match choice {
            Choice::Take(v) => {
                let variable = &self.problem.variables[v];
                let shift = &self.problem.shifts()[variable.shift];
                let e = variable.employee;
                state.selected[v] = false;
                let popped = state.chosen.pop();
                debug_assert_eq!(popped, Some(v), "undo out of order");
                if let Some(minutes) = state.week_minutes[e].get_mut(&shift.iso_week()) {
                    *minutes -= variable.minutes;
                }
                state.total_minutes[e] -= variable.minutes;
                let day = shift.day();
                if let Some(count) = state.days[e].get_mut(&day) {
                    *count -= 1;
                    if *count == 0 {
                        state.days[e].remove(&day);
                    }
                }
                state.filled[s] -= 1;
            }
            Choice::Skip => state.skipped[s] -= 1,
        }
    }

    fn should_prune(&self, state: &State, incumbent: &Option<Incumbent>) -> bool {
        if let Some(best) = incumbent {
            let bound = objective::lower_bound(self.problem, &state.selected, &state.decided);
            if bound > best.score + EPSILON {
                return true;
            }
        }
        !self.propagate(state)
    }

    // vérification en avant : préférences dures encore possibles, et en mode strict
    // assez de candidats admissibles pour chaque créneau non tranché
    fn propagate(&self, state: &State) -> bool {
        for s in 0..self.problem.shifts().len() {
            if state.decided[s] {
                continue;
            }
            if self.problem.fixed[s]
                .iter()
                .any(|&v| !state.selected[v] && !self.admissible(state, v))
            {
                return false;
            }
            if self.mode == Mode::Relaxed {
                continue;
            }
            let need = self.problem.target(s).saturating_sub(state.filled[s]) as usize;
            if need == 0 {
                continue;
            }
            let available = self
                .problem
                .shift_vars(s)
                .iter()
                .filter(|&&v| self.admissible(state, v))
                .take(need)
                .count();
            if available < need {
                return false;
            }
        }
        true
    }

    fn record(&self, state: &State, incumbent: &mut Option<Incumbent>) {
        let breakdown = objective::evaluate(self.problem, &state.selected);
        let mut vars = state.chosen.clone();
        vars.sort_by_key(|&v| {
            let variable = &self.problem.variables[v];
            (variable.shift, variable.employee)
        });
        let key = vars
            .iter()
            .map(|&v| {
                let variable = &self.problem.variables[v];
                (variable.shift, variable.employee)
            })
            .collect();
        let cost = vars
            .iter()
            .map(|&v| self.problem.variables[v].labor_cost)
            .sum();
        let candidate = Incumbent {
            filled: vars.len() as u32,
            score: breakdown.total(),
            breakdown,
            cost,
            key,
            vars,
        };
        if incumbent
            .as_ref()
            .map_or(true, |best| candidate.is_better_than(best))
        {
            *incumbent = Some(candidate);
        }
    }
}

// longueur de la série de jours travaillés contenant `day` si on l'ajoute
fn run_with(days: &BTreeMap<NaiveDate, u32>, day: NaiveDate) -> u32 {
    if days.contains_key(&day) {
        return 0;
    }
    let mut run = 1;
    let mut cursor = day.pred_opt();
    while let Some(d) = cursor.filter(|d| days.contains_key(d)) {
        run += 1;
        cursor = d.pred_opt();
    }
    let mut cursor = day.succ_opt();
    while let Some(d) = cursor.filter(|d| days.contains_key(d)) {
        run += 1;
        cursor = d.succ_opt();
    }
    run
}
