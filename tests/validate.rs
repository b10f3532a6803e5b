#![forbid(unsafe_code)]
use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use horaire::{
    validate, Assignment, AssignmentSet, AssignmentStatus, BuilderError, ConflictKind, Constraint,
    ConstraintKind, DayOrDate, Employee, EmployeeId, EngineOptions, Severity, Shift, ShiftId,
};

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, day, hour, minute, 0).unwrap()
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn available_monday(id: &str) -> Employee {
    Employee::new(id)
        .with_availability(Weekday::Mon, hm(8, 0), hm(16, 0))
        .unwrap()
}

fn proposed(employee: &Employee, shift: &Shift) -> Assignment {
    Assignment::new(employee, shift, AssignmentStatus::Proposed).unwrap()
}

#[test]
fn overlapping_shifts_give_exactly_one_double_booking() {
    let d = available_monday("D");
    let first = Shift::new("s1", "desk", at(6, 10, 0), at(6, 11, 0), 1).unwrap();
    let second = Shift::new("s2", "desk", at(6, 10, 30), at(6, 11, 30), 1).unwrap();
    let set: AssignmentSet = [proposed(&d, &first), proposed(&d, &second)]
        .into_iter()
        .collect();

    let report = validate(
        &set,
        &[d],
        &[first, second],
        &[],
        &EngineOptions::default(),
    )
    .unwrap();

    assert!(!report.is_valid);
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::DoubleBooking);
    assert_eq!(conflict.severity, Severity::High);
    assert_eq!(conflict.employee, Some(EmployeeId::new("D")));
    let pairs: Vec<_> = conflict
        .assignments
        .iter()
        .map(|a| a.shift().as_str())
        .collect();
    assert_eq!(pairs, ["s1", "s2"]);
    insta::assert_snapshot!(conflict.message.as_str(), @"employee D is booked on overlapping shifts s1 (2025-10-06 10:00-11:00) and s2 (2025-10-06 10:30-11:30)");
    assert_eq!(report.coverage.coverage_percentage, 100.0);
}

#[test]
fn every_check_runs_and_results_are_ordered() {
    let e = available_monday("E");
    let f = available_monday("F");
    let open = Shift::new("open", "desk", at(6, 7, 0), at(6, 9, 0), 1).unwrap();
    let noon = Shift::new("noon", "desk", at(6, 12, 0), at(6, 14, 0), 2)
        .unwrap()
        .legally_mandatory();
    let later = Shift::new("later", "desk", at(6, 15, 0), at(6, 16, 0), 1).unwrap();
    let set: AssignmentSet = [
        proposed(&e, &open),
        proposed(&e, &noon),
        proposed(&f, &later),
    ]
    .into_iter()
    .collect();
    let rules = [Constraint::hard(ConstraintKind::MinRestHours {
        employee: EmployeeId::new("E"),
        hours: 4,
    })];

    let report = validate(
        &set,
        &[e, f],
        &[open, noon, later],
        &rules,
        &EngineOptions::default(),
    )
    .unwrap();

    let summary: Vec<_> = report
        .conflicts
        .iter()
        .map(|c| (c.severity, c.kind, c.shift.as_str()))
        .collect();
    assert_eq!(
        summary,
        [
            (Severity::High, ConflictKind::CoverageShortfall, "noon"),
            (Severity::Medium, ConflictKind::AvailabilityViolation, "open"),
            (Severity::Medium, ConflictKind::RestViolation, "open"),
        ]
    );
    assert!(!report.is_valid);
    assert_eq!(report.coverage.total_shifts, 3);
    assert_eq!(report.coverage.covered_shifts, 2);
    assert_eq!(report.coverage.required_slots, 4);
    assert_eq!(report.coverage.assigned_slots, 3);
    assert_eq!(report.coverage.coverage_percentage, 75.0);
    assert_eq!(report.coverage.unique_employees, 2);
}

#[test]
fn rest_violation_explains_the_gap() {
    let e = Employee::new("E")
        .with_availability(Weekday::Mon, hm(16, 0), hm(0, 0))
        .unwrap()
        .with_availability(Weekday::Tue, hm(6, 0), hm(10, 0))
        .unwrap();
    let close = Shift::new("close", "floor", at(6, 16, 0), at(7, 0, 0), 1).unwrap();
    let open = Shift::new("open", "floor", at(7, 6, 0), at(7, 10, 0), 1).unwrap();
    let set: AssignmentSet = [proposed(&e, &close), proposed(&e, &open)]
        .into_iter()
        .collect();
    let options = EngineOptions {
        default_min_rest_hours: Some(11),
        ..EngineOptions::default()
    };

    let report = validate(&set, &[e], &[close, open], &[], &options).unwrap();
    assert!(report.is_valid);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].kind, ConflictKind::RestViolation);
    insta::assert_snapshot!(report.conflicts[0].message.as_str(), @"employee E rests 6h00 between close and open (minimum 11h)");
}

#[test]
fn rule_driven_requirement_is_checked() {
    let g = available_monday("G");
    let shift = Shift::new("aid", "desk", at(6, 9, 0), at(6, 12, 0), 1).unwrap();
    let set: AssignmentSet = [proposed(&g, &shift)].into_iter().collect();
    let rules = [Constraint::hard(ConstraintKind::RequiredQualification {
        shift: ShiftId::new("aid"),
        tag: "first_aid".into(),
    })];

    let report = validate(
        &set,
        &[g.clone()],
        &[shift.clone()],
        &rules,
        &EngineOptions::default(),
    )
    .unwrap();
    assert_eq!(report.count(ConflictKind::QualificationMismatch), 1);
    assert!(!report.is_valid);
    insta::assert_snapshot!(report.conflicts[0].message.as_str(), @"employee G lacks a qualification for shift aid (requires one of: first_aid)");

    let overridden: AssignmentSet = [Assignment::overridden(
        &g.id,
        &shift.id,
        AssignmentStatus::Confirmed,
    )]
    .into_iter()
    .collect();
    let report = validate(&overridden, &[g], &[shift], &rules, &EngineOptions::default()).unwrap();
    assert!(report.is_valid);
    assert!(report.conflicts.is_empty());
}

#[test]
fn hard_unavailability_is_an_availability_violation() {
    let h = available_monday("H");
    let shift = Shift::new("s", "desk", at(6, 9, 0), at(6, 12, 0), 1).unwrap();
    let set: AssignmentSet = [proposed(&h, &shift)].into_iter().collect();
    let rules = [Constraint::hard(ConstraintKind::Unavailable {
        employee: EmployeeId::new("H"),
        on: DayOrDate::Date(at(6, 0, 0).date_naive()),
        interval: None,
    })];

    let report = validate(&set, &[h], &[shift], &rules, &EngineOptions::default()).unwrap();
    assert!(report.is_valid);
    assert_eq!(report.count(ConflictKind::AvailabilityViolation), 1);
    assert!(report.conflicts[0].message.ends_with("during a declared unavailability"));
}

#[test]
fn empty_inputs_are_fully_covered() {
    let report = validate(
        &AssignmentSet::new(),
        &[],
        &[],
        &[],
        &EngineOptions::default(),
    )
    .unwrap();
    assert!(report.is_valid);
    assert_eq!(report.coverage.coverage_percentage, 100.0);
}

#[test]
fn unknown_ids_in_the_set_are_rejected() {
    let d = available_monday("D");
    let shift = Shift::new("s1", "desk", at(6, 10, 0), at(6, 11, 0), 1).unwrap();
    let set: AssignmentSet = [proposed(&d, &shift)].into_iter().collect();

    let err = validate(&set, &[], &[shift], &[], &EngineOptions::default()).unwrap_err();
    assert_eq!(
        err,
        BuilderError::UnknownEmployee {
            context: "assignment set",
            employee: "D".into(),
        }
    );
}

#[test]
fn assignments_require_a_shared_qualification() {
    let plain = Employee::new("P");
    let shift = Shift::new("s", "bar", at(6, 9, 0), at(6, 12, 0), 1)
        .unwrap()
        .requiring("barista");
    let err = Assignment::new(&plain, &shift, AssignmentStatus::Proposed).unwrap_err();
    assert_eq!(
        err.to_string(),
        "employee P holds none of the qualifications required by shift s"
    );
}

#[test]
fn reloaded_set_is_checked_for_qualifications() {
    let h = available_monday("H").with_qualification("cashier");
    let shift = Shift::new("bar", "bar", at(6, 9, 0), at(6, 12, 0), 1)
        .unwrap()
        .requiring("barista");
    // relu depuis l'espace de travail, sans passer par Assignment::new
    let set: AssignmentSet = serde_json::from_str(
        r#"{"assignments": [{"employee": "H", "shift": "bar", "status": "confirmed"}]}"#,
    )
    .unwrap();
    assert!(!set.iter().next().unwrap().is_override());

    let report = validate(&set, &[h], &[shift], &[], &EngineOptions::default()).unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.count(ConflictKind::QualificationMismatch), 1);
    assert_eq!(report.conflicts[0].severity, Severity::High);
}
