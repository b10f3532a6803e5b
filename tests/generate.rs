#![forbid(unsafe_code)]
use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use horaire::{
    Constraint, ConstraintKind, Employee, EmployeeId, Engine, EngineOptions, HeadcountPolicy,
    Shift, ShiftId, SolveStatus,
};
use std::time::Duration;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    // octobre 2025 : le 6 est un lundi
    Utc.with_ymd_and_hms(2025, 10, day, hour, minute, 0).unwrap()
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn staff(id: &str, tag: &str, day: Weekday) -> Employee {
    Employee::new(id)
        .with_qualification(tag)
        .with_availability(day, hm(8, 0), hm(16, 0))
        .unwrap()
}

fn cafe() -> Vec<Employee> {
    vec![
        staff("A", "barista", Weekday::Mon),
        staff("B", "barista", Weekday::Mon),
        staff("C", "cashier", Weekday::Mon),
    ]
}

fn morning(headcount: u32) -> Shift {
    Shift::new("s1", "bar", at(6, 9, 0), at(6, 13, 0), headcount)
        .unwrap()
        .requiring("barista")
}

#[test]
fn single_barista_shift_is_optimal() {
    let engine = Engine::default();
    let outcome = engine.generate(&cafe(), &[morning(1)], &[], None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert_eq!(outcome.assignment_set.len(), 1);
    let assigned = outcome.assignment_set.iter().next().unwrap();
    assert_eq!(assigned.employee(), &EmployeeId::new("A"));
    assert_eq!(assigned.shift(), &ShiftId::new("s1"));
    assert!(outcome.conflicts.is_empty());
    assert!(outcome.preconditions.is_empty());
}

#[test]
fn headcount_two_takes_both_baristas() {
    let engine = Engine::default();
    let employees = cafe();
    let shifts = [morning(2)];
    let outcome = engine.generate(&employees, &shifts, &[], None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    let mut names: Vec<_> = outcome
        .assignment_set
        .iter()
        .map(|a| a.employee().as_str().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["A", "B"]);

    let report = engine
        .validate(&outcome.assignment_set, &employees, &shifts, &[])
        .unwrap();
    assert!(report.is_valid);
    assert!(report.conflicts.is_empty());
    assert_eq!(report.coverage.coverage_percentage, 100.0);
    assert_eq!(report.coverage.unique_employees, 2);
}

#[test]
fn too_few_eligible_reports_precondition_and_shortfall() {
    let engine = Engine::default();
    let employees = vec![staff("A", "barista", Weekday::Mon)];
    let outcome = engine.generate(&employees, &[morning(2)], &[], None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Feasible);
    assert_eq!(outcome.assignment_set.len(), 1);
    assert_eq!(outcome.preconditions.len(), 1);
    assert_eq!(outcome.preconditions[0].eligible, 1);
    assert_eq!(outcome.preconditions[0].required, 2);
    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(outcome.conflicts[0].kind, horaire::ConflictKind::CoverageShortfall);
    assert_eq!(outcome.coverage.coverage_percentage, 50.0);
}

#[test]
fn overlapping_demand_relaxes_headcount_once() {
    let engine = Engine::default();
    let employees = vec![staff("A", "barista", Weekday::Mon)];
    let shifts = [
        Shift::new("early", "bar", at(6, 9, 0), at(6, 12, 0), 1)
            .unwrap()
            .requiring("barista"),
        Shift::new("late", "bar", at(6, 11, 0), at(6, 14, 0), 1)
            .unwrap()
            .requiring("barista"),
    ];
    let outcome = engine.generate(&employees, &shifts, &[], None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Feasible);
    assert!(outcome.relaxed);
    assert_eq!(outcome.assignment_set.len(), 1);
    assert_eq!(
        outcome.assignment_set.iter().next().unwrap().shift(),
        &ShiftId::new("early")
    );
    let shortfall: Vec<_> = outcome
        .conflicts
        .iter()
        .filter(|c| c.kind == horaire::ConflictKind::CoverageShortfall)
        .collect();
    assert_eq!(shortfall.len(), 1);
    assert_eq!(shortfall[0].shift, ShiftId::new("late"));
}

#[test]
fn strict_policy_stays_infeasible() {
    let options = EngineOptions {
        headcount_policy: HeadcountPolicy::Strict,
        ..EngineOptions::default()
    };
    let engine = Engine::new(options);
    let employees = vec![staff("A", "barista", Weekday::Mon)];
    let shifts = [
        Shift::new("early", "bar", at(6, 9, 0), at(6, 12, 0), 1)
            .unwrap()
            .requiring("barista"),
        Shift::new("late", "bar", at(6, 11, 0), at(6, 14, 0), 1)
            .unwrap()
            .requiring("barista"),
    ];
    let outcome = engine.generate(&employees, &shifts, &[], None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Infeasible);
    assert!(outcome.assignment_set.is_empty());
}

#[test]
fn hard_preference_on_ineligible_pair_is_infeasible() {
    let engine = Engine::default();
    let rules = [Constraint::hard(ConstraintKind::PreferredShift {
        employee: EmployeeId::new("C"),
        shift: ShiftId::new("s1"),
    })];
    let outcome = engine.generate(&cafe(), &[morning(1)], &rules, None).unwrap();
    assert_eq!(outcome.status, SolveStatus::Infeasible);
}

#[test]
fn preferences_steer_the_choice() {
    let engine = Engine::default();
    let rules = [Constraint::soft(
        ConstraintKind::PreferredShift {
            employee: EmployeeId::new("B"),
            shift: ShiftId::new("s1"),
        },
        5.0,
    )];
    let outcome = engine.generate(&cafe(), &[morning(1)], &rules, None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    let assigned = outcome.assignment_set.iter().next().unwrap();
    assert_eq!(assigned.employee(), &EmployeeId::new("B"));
    assert_eq!(outcome.objective_score, -5.0);
}

#[test]
fn hard_rest_rule_splits_back_to_back_shifts() {
    let engine = Engine::default();
    let employees = vec![
        Employee::new("A")
            .with_availability(Weekday::Mon, hm(14, 0), hm(0, 0))
            .unwrap()
            .with_availability(Weekday::Tue, hm(0, 0), hm(12, 0))
            .unwrap(),
        Employee::new("B")
            .with_availability(Weekday::Mon, hm(14, 0), hm(0, 0))
            .unwrap()
            .with_availability(Weekday::Tue, hm(0, 0), hm(12, 0))
            .unwrap(),
    ];
    let shifts = [
        Shift::new("close", "floor", at(6, 16, 0), at(7, 0, 0), 1).unwrap(),
        Shift::new("open", "floor", at(7, 6, 0), at(7, 10, 0), 1).unwrap(),
    ];
    let rules = [
        Constraint::hard(ConstraintKind::MinRestHours {
            employee: EmployeeId::new("A"),
            hours: 11,
        }),
        Constraint::hard(ConstraintKind::MinRestHours {
            employee: EmployeeId::new("B"),
            hours: 11,
        }),
    ];
    let outcome = engine.generate(&employees, &shifts, &rules, None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert_eq!(outcome.assignment_set.len(), 2);
    let employee_a = EmployeeId::new("A");
    let a: Vec<_> = outcome
        .assignment_set
        .for_employee(&employee_a)
        .collect();
    assert_eq!(a.len(), 1);
    assert!(outcome.conflicts.is_empty());
}

#[test]
fn overnight_shift_uses_chained_windows() {
    let engine = Engine::default();
    let night = Employee::new("N")
        .with_availability(Weekday::Mon, hm(22, 0), hm(0, 0))
        .unwrap()
        .with_availability(Weekday::Tue, hm(0, 0), hm(6, 0))
        .unwrap();
    let day_only = staff("D", "any", Weekday::Mon);
    let shift = Shift::new("night", "guard", at(6, 22, 0), at(7, 6, 0), 1).unwrap();

    let outcome = engine
        .generate(&[night, day_only], &[shift], &[], None)
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    let assigned = outcome.assignment_set.iter().next().unwrap();
    assert_eq!(assigned.employee(), &EmployeeId::new("N"));
}

#[test]
fn generated_pairs_always_pass_the_qualification_filter() {
    let engine = Engine::default();
    let employees = cafe();
    let shifts = [
        morning(2),
        Shift::new("till", "till", at(6, 10, 0), at(6, 14, 0), 2)
            .unwrap()
            .requiring("cashier"),
    ];
    let outcome = engine.generate(&employees, &shifts, &[], None).unwrap();

    for assignment in &outcome.assignment_set {
        let employee = employees
            .iter()
            .find(|e| &e.id == assignment.employee())
            .unwrap();
        let shift = shifts.iter().find(|s| &s.id == assignment.shift()).unwrap();
        assert!(employee.is_qualified_for(&shift.required_qualifications));
        assert!(!assignment.is_override());
    }
}

fn week() -> (Vec<Employee>, Vec<Shift>, Vec<Constraint>) {
    let mut employees = Vec::new();
    for id in ["E1", "E2", "E3", "E4"] {
        let mut e = Employee::new(id).with_qualification("floor");
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            e = e.with_availability(day, hm(7, 0), hm(20, 0)).unwrap();
        }
        employees.push(e);
    }
    let mut shifts = Vec::new();
    for (offset, day) in (6..=10).enumerate() {
        let headcount = if offset % 2 == 0 { 2 } else { 1 };
        shifts.push(
            Shift::new(format!("d{day}"), "floor", at(day, 8, 0), at(day, 16, 0), headcount)
                .unwrap()
                .requiring("floor"),
        );
    }
    let rules = vec![
        Constraint::soft(ConstraintKind::FairnessTarget, 1.0),
        Constraint::hard(ConstraintKind::MaxConsecutiveDays {
            employee: EmployeeId::new("E1"),
            days: 2,
        }),
    ];
    (employees, shifts, rules)
}

#[test]
fn generate_is_deterministic() {
    let engine = Engine::default();
    let (employees, shifts, rules) = week();
    let budget = Some(Duration::from_secs(5));

    let first = engine.generate(&employees, &shifts, &rules, budget).unwrap();
    let second = engine.generate(&employees, &shifts, &rules, budget).unwrap();
    assert_eq!(first.status, second.status);
    assert_eq!(first.assignment_set, second.assignment_set);
    assert_eq!(first.objective_score, second.objective_score);

    let mut reversed = employees.clone();
    reversed.reverse();
    let third = engine.generate(&reversed, &shifts, &rules, budget).unwrap();
    assert_eq!(first.assignment_set, third.assignment_set);
}

#[test]
fn generated_week_is_valid_and_balanced() {
    let engine = Engine::default();
    let (employees, shifts, rules) = week();
    let outcome = engine
        .generate(&employees, &shifts, &rules, Some(Duration::from_secs(5)))
        .unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert_eq!(outcome.assignment_set.len(), 8);
    let report = engine
        .validate(&outcome.assignment_set, &employees, &shifts, &rules)
        .unwrap();
    assert!(report.is_valid);
    for employee in &employees {
        let count = outcome.assignment_set.for_employee(&employee.id).count();
        assert_eq!(count, 2, "{} should work two days", employee.id);
    }
}

#[test]
fn warm_start_does_not_change_the_optimum() {
    let engine = Engine::default();
    let employees = cafe();
    let shifts = [morning(1)];
    let cold = engine.generate(&employees, &shifts, &[], None).unwrap();

    let hint = horaire::AssignmentSet::from_iter([horaire::Assignment::new(
        &employees[1],
        &shifts[0],
        horaire::AssignmentStatus::Confirmed,
    )
    .unwrap()]);
    let warm = engine
        .generate_with_hint(&employees, &shifts, &[], None, Some(&hint))
        .unwrap();
    assert_eq!(cold.assignment_set, warm.assignment_set);
    assert_eq!(warm.status, SolveStatus::Optimal);
}

#[test]
fn malformed_input_is_rejected_before_solving() {
    let engine = Engine::default();
    let mut employees = cafe();
    employees.push(staff("A", "barista", Weekday::Tue));
    let err = engine
        .generate(&employees, &[morning(1)], &[], None)
        .unwrap_err();
    assert_eq!(err, horaire::BuilderError::DuplicateEmployee("A".into()));

    let rules = [Constraint::hard(ConstraintKind::MinRestHours {
        employee: EmployeeId::new("Z"),
        hours: 11,
    })];
    let err = engine.generate(&cafe(), &[morning(1)], &rules, None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "min_rest_hours rule: unknown employee Z"
    );
}

#[test]
fn negative_penalty_weights_are_rejected() {
    let engine = Engine::default();
    let employees = vec![staff("A", "any", Weekday::Mon), staff("B", "any", Weekday::Mon)];
    let shifts = [
        Shift::new("s1", "floor", at(6, 8, 0), at(6, 10, 0), 1).unwrap(),
        Shift::new("s2", "floor", at(6, 11, 0), at(6, 13, 0), 1).unwrap(),
    ];
    let rules = [
        Constraint::soft(
            ConstraintKind::PreferredShift {
                employee: EmployeeId::new("B"),
                shift: ShiftId::new("s1"),
            },
            1.0,
        ),
        Constraint::soft(
            ConstraintKind::MinRestHours {
                employee: EmployeeId::new("A"),
                hours: 5,
            },
            -100.0,
        ),
    ];
    let err = engine.generate(&employees, &shifts, &rules, None).unwrap_err();
    assert_eq!(
        err,
        horaire::BuilderError::InvalidWeight {
            context: "min_rest_hours rule",
            weight: -100.0,
        }
    );

    let rules = [Constraint::soft(ConstraintKind::FairnessTarget, -1.0)];
    let err = engine.generate(&employees, &shifts, &rules, None).unwrap_err();
    assert!(matches!(err, horaire::BuilderError::InvalidWeight { .. }));

    let rules = [Constraint::soft(
        ConstraintKind::MaxConsecutiveDays {
            employee: EmployeeId::new("A"),
            days: 1,
        },
        -2.0,
    )];
    let err = engine.generate(&employees, &shifts, &rules, None).unwrap_err();
    assert!(matches!(err, horaire::BuilderError::InvalidWeight { .. }));
}

#[test]
fn negative_preference_is_an_avoidance() {
    let engine = Engine::default();
    let rules = [Constraint::soft(
        ConstraintKind::PreferredShift {
            employee: EmployeeId::new("A"),
            shift: ShiftId::new("s1"),
        },
        -3.0,
    )];
    let outcome = engine.generate(&cafe(), &[morning(1)], &rules, None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    let assigned = outcome.assignment_set.iter().next().unwrap();
    assert_eq!(assigned.employee(), &EmployeeId::new("B"));
    assert_eq!(outcome.objective_score, 0.0);
}

#[test]
fn hard_weekly_maximum_caps_each_employee() {
    let engine = Engine::default();
    let everyday = |id: &str| {
        let mut e = Employee::new(id);
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed] {
            e = e.with_availability(day, hm(8, 0), hm(16, 0)).unwrap();
        }
        e
    };
    let employees = vec![everyday("A").with_weekly_hours(0, 8), everyday("B")];
    let shifts: Vec<Shift> = (6..=8)
        .map(|day| {
            Shift::new(format!("d{day}"), "floor", at(day, 8, 0), at(day, 12, 0), 1).unwrap()
        })
        .collect();
    let outcome = engine.generate(&employees, &shifts, &[], None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert_eq!(outcome.assignment_set.len(), 3);
    let a = outcome
        .assignment_set
        .for_employee(&EmployeeId::new("A"))
        .count();
    let b = outcome
        .assignment_set
        .for_employee(&EmployeeId::new("B"))
        .count();
    assert_eq!(a, 2);
    assert_eq!(b, 1);
    assert!(outcome.conflicts.is_empty());
}

#[test]
fn equal_scores_prefer_the_cheaper_employee() {
    let engine = Engine::default();
    let employees = vec![
        staff("A", "barista", Weekday::Mon).with_hourly_cost(20.0),
        staff("B", "barista", Weekday::Mon).with_hourly_cost(12.0),
    ];
    let outcome = engine.generate(&employees, &[morning(1)], &[], None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert_eq!(outcome.objective_score, 0.0);
    let assigned = outcome.assignment_set.iter().next().unwrap();
    assert_eq!(assigned.employee(), &EmployeeId::new("B"));
}

#[test]
fn best_effort_policy_relaxes_from_the_start() {
    let options = EngineOptions {
        headcount_policy: HeadcountPolicy::BestEffort,
        ..EngineOptions::default()
    };
    let engine = Engine::new(options);
    let employees = vec![staff("A", "barista", Weekday::Mon)];
    let shifts = [
        Shift::new("early", "bar", at(6, 9, 0), at(6, 12, 0), 1)
            .unwrap()
            .requiring("barista"),
        Shift::new("late", "bar", at(6, 11, 0), at(6, 14, 0), 1)
            .unwrap()
            .requiring("barista"),
    ];
    let outcome = engine.generate(&employees, &shifts, &[], None).unwrap();

    assert_eq!(outcome.status, SolveStatus::Feasible);
    assert!(outcome.relaxed);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.assignment_set.len(), 1);
    assert_eq!(outcome.coverage.coverage_percentage, 50.0);
    assert_eq!(
        outcome.conflicts[0].kind,
        horaire::ConflictKind::CoverageShortfall
    );
}

#[test]
fn tiny_budget_stops_the_search_early() {
    let options = EngineOptions {
        headcount_policy: HeadcountPolicy::Strict,
        ..EngineOptions::default()
    };
    let engine = Engine::new(options);
    let days = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];
    let employees: Vec<Employee> = (0..12)
        .map(|i| {
            let mut e = Employee::new(format!("E{i:02}"));
            for day in days {
                e = e.with_availability(day, hm(6, 0), hm(22, 0)).unwrap();
            }
            e
        })
        .collect();
    let mut shifts = Vec::new();
    for day in 6..=10 {
        for (slot, hour) in [6, 10, 14, 18].into_iter().enumerate() {
            shifts.push(
                Shift::new(
                    format!("d{day}-{slot}"),
                    "floor",
                    at(day, hour, 0),
                    at(day, hour + 4, 0),
                    2,
                )
                .unwrap(),
            );
        }
    }
    let rules = [Constraint::soft(ConstraintKind::FairnessTarget, 1.0)];

    let started = std::time::Instant::now();
    let outcome = engine
        .generate(&employees, &shifts, &rules, Some(Duration::from_millis(1)))
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(outcome.timed_out);
    assert!(matches!(
        outcome.status,
        SolveStatus::Feasible | SolveStatus::TimeoutWithPartial
    ));
}
