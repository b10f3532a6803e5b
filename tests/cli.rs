#![forbid(unsafe_code)]
use assert_cmd::Command;
use chrono::{NaiveTime, TimeZone, Utc, Weekday};
use horaire::{Assignment, AssignmentSet, AssignmentStatus, Employee, JsonWorkspace, Shift, Workspace};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn cli(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("horaire-cli").unwrap();
    cmd.arg("--workspace").arg(workspace);
    cmd
}

#[test]
fn import_generate_validate_list() {
    let dir = tempdir().unwrap();
    let ws = dir.path().join("horaire.json");
    let employees = dir.path().join("employees.csv");
    let shifts = dir.path().join("shifts.csv");
    fs::write(
        &employees,
        "id,display_name,qualifications,availability\n\
         A,Alice,barista,Mon 08:00-16:00\n\
         B,Bob,barista,Mon 08:00-16:00\n\
         C,Chloe,cashier,Mon 08:00-16:00\n",
    )
    .unwrap();
    fs::write(
        &shifts,
        "id,position,qualifications,start,end,headcount\n\
         s1,bar,barista,2025-10-06T09:00:00Z,2025-10-06T13:00:00Z,2\n",
    )
    .unwrap();

    cli(&ws)
        .args(["import-employees", "--csv"])
        .arg(&employees)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 3 employee(s)"));
    cli(&ws)
        .args(["import-shifts", "--csv"])
        .arg(&shifts)
        .assert()
        .success();

    let out = dir.path().join("schedule.csv");
    cli(&ws)
        .arg("generate")
        .arg("--out-csv")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("status: optimal"))
        .stdout(predicate::str::contains("coverage: 100.0%"));
    let csv = fs::read_to_string(&out).unwrap();
    assert_eq!(csv.lines().count(), 3);

    cli(&ws)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: schedule is valid"));

    cli(&ws)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("s1 |").and(predicate::str::contains("| A")));
}

#[test]
fn validate_without_schedule_fails() {
    let dir = tempdir().unwrap();
    cli(&dir.path().join("horaire.json"))
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("run `generate` first"));
}

#[test]
fn invalid_schedule_exits_with_code_two() {
    let dir = tempdir().unwrap();
    let ws = dir.path().join("horaire.json");
    let d = Employee::new("D")
        .with_availability(
            Weekday::Mon,
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
        .unwrap();
    let first = Shift::new(
        "s1",
        "desk",
        Utc.with_ymd_and_hms(2025, 10, 6, 10, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 10, 6, 11, 0, 0).unwrap(),
        1,
    )
    .unwrap();
    let second = Shift::new(
        "s2",
        "desk",
        Utc.with_ymd_and_hms(2025, 10, 6, 10, 30, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 10, 6, 11, 30, 0).unwrap(),
        1,
    )
    .unwrap();
    let schedule: AssignmentSet = [
        Assignment::new(&d, &first, AssignmentStatus::Confirmed).unwrap(),
        Assignment::new(&d, &second, AssignmentStatus::Confirmed).unwrap(),
    ]
    .into_iter()
    .collect();
    JsonWorkspace::open(&ws)
        .save(&Workspace {
            employees: vec![d],
            shifts: vec![first, second],
            constraints: Vec::new(),
            schedule: Some(schedule),
        })
        .unwrap();

    let report = dir.path().join("conflicts.csv");
    cli(&ws)
        .arg("validate")
        .arg("--report")
        .arg(&report)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("[high] double_booking"));
    assert!(fs::read_to_string(&report)
        .unwrap()
        .contains("high,double_booking,s1"));

    cli(&ws)
        .arg("optimize")
        .assert()
        .success()
        .stdout(predicate::str::contains("[remove] drop D from shift s1"));
}
