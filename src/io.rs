use crate::conflicts::Conflict;
use crate::model::{
    AssignmentSet, AssignmentStatus, AvailabilityWindow, Employee, EmployeeId, Shift, ShiftId,
    TimeInterval,
};
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Import d'employés depuis CSV :
/// header `id,display_name[,qualifications][,availability][,max_hours][,min_hours][,hourly_cost]`.
///
/// `qualifications` : liste séparée par `;`. `availability` : `Mon 08:00-16:00;Tue 22:00-24:00`.
/// Un id vide est remplacé par un identifiant aléatoire.
pub fn import_employees_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Employee>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let id = rec.get(0).context("missing id")?.trim();
        let display = rec.get(1).context("missing display_name")?.trim();
        if display.is_empty() {
            bail!("invalid employee row (empty display_name)");
        }
        let mut employee = if id.is_empty() {
            Employee::new(EmployeeId::random().as_str())
        } else {
            Employee::new(id)
        };
        employee.display_name = display.to_string();
        employee.qualifications = split_list(rec.get(2)).collect();
        if let Some(raw) = non_empty(rec.get(3)) {
            employee.availability = parse_availability(raw)
                .with_context(|| format!("invalid availability for employee {}", employee.id))?;
        }
        if let Some(raw) = non_empty(rec.get(4)) {
            employee.max_hours_per_week = raw
                .parse()
                .with_context(|| format!("invalid max_hours for employee {}", employee.id))?;
        }
        if let Some(raw) = non_empty(rec.get(5)) {
            employee.min_hours_per_week = raw
                .parse()
                .with_context(|| format!("invalid min_hours for employee {}", employee.id))?;
        }
        if let Some(raw) = non_empty(rec.get(6)) {
            employee.hourly_cost = raw
                .parse()
                .with_context(|| format!("invalid hourly_cost for employee {}", employee.id))?;
        }
        out.push(employee);
    }
    Ok(out)
}

fn non_empty(field: Option<&str>) -> Option<&str> {
    field.map(str::trim).filter(|s| !s.is_empty())
}

fn split_list(field: Option<&str>) -> impl Iterator<Item = String> + '_ {
    field
        .unwrap_or("")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_availability(raw: &str) -> anyhow::Result<Vec<AvailabilityWindow>> {
    raw.split(';')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let (day, range) = chunk
                .split_once(char::is_whitespace)
                .with_context(|| format!("expected `Day HH:MM-HH:MM`, got {chunk}"))?;
            let day: Weekday = day
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid weekday: {day}"))?;
            let (start, end) = range
                .trim()
                .split_once('-')
                .with_context(|| format!("expected HH:MM-HH:MM, got {range}"))?;
            let interval = TimeInterval::new(parse_time(start)?, parse_time(end)?)?;
            Ok(AvailabilityWindow { day, interval })
        })
        .collect()
}

// `24:00` est accepté comme fin de journée
fn parse_time(raw: &str) -> anyhow::Result<NaiveTime> {
    let raw = raw.trim();
    if raw == "24:00" {
        return Ok(NaiveTime::MIN);
    }
    NaiveTime::parse_from_str(raw, "%H:%M").with_context(|| format!("invalid time: {raw}"))
}

fn parse_bool(s: &str) -> anyhow::Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "oui" => Ok(true),
        "false" | "0" | "no" | "n" | "non" => Ok(false),
        _ => bail!("expected boolean"),
    }
}

/// Import de créneaux : header `id,position,qualifications,start,end[,headcount][,mandatory]`
/// (dates RFC3339 UTC).
pub fn import_shifts_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Shift>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let id = rec.get(0).context("missing id")?.trim();
        let id = if id.is_empty() {
            ShiftId::random().as_str().to_string()
        } else {
            id.to_string()
        };
        let position = rec.get(1).context("missing position")?.trim().to_string();
        let start = rec.get(3).context("missing start")?.trim();
        let end = rec.get(4).context("missing end")?.trim();
        let start: DateTime<Utc> = start.parse().context("start RFC3339")?;
        let end: DateTime<Utc> = end.parse().context("end RFC3339")?;
        let headcount = match non_empty(rec.get(5)) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid headcount for shift {id}"))?,
            None => 1,
        };
        let mut shift = Shift::new(&id, position, start, end, headcount)?;
        shift.required_qualifications = split_list(rec.get(2)).collect();
        if let Some(raw) = non_empty(rec.get(6)) {
            shift.mandatory =
                parse_bool(raw).with_context(|| format!("invalid mandatory flag for shift {id}"))?;
        }
        out.push(shift);
    }
    Ok(out)
}

/// Export JSON (jolie mise en forme) de n'importe quel rapport sérialisable.
pub fn export_json<P: AsRef<Path>, T: serde::Serialize>(path: P, value: &T) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s)?;
    Ok(())
}

/// Export CSV du planning : header `employee,shift,position,start,end,minutes,status`
pub fn export_schedule_csv<P: AsRef<Path>>(
    path: P,
    set: &AssignmentSet,
    shifts: &[Shift],
) -> anyhow::Result<()> {
    let by_id: HashMap<&ShiftId, &Shift> = shifts.iter().map(|s| (&s.id, s)).collect();
    let mut w = WriterBuilder::new().has_headers(true).from_path(path)?;
    w.write_record(["employee", "shift", "position", "start", "end", "minutes", "status"])?;
    let mut minutes = itoa::Buffer::new();
    for a in set {
        let shift = by_id
            .get(a.shift())
            .with_context(|| format!("unknown shift in schedule: {}", a.shift()))?;
        let start = shift.start.to_rfc3339();
        let end = shift.end.to_rfc3339();
        let status = match a.status() {
            AssignmentStatus::Proposed => "proposed",
            AssignmentStatus::Confirmed => "confirmed",
        };
        w.write_record([
            a.employee().as_str(),
            a.shift().as_str(),
            shift.position.as_str(),
            start.as_str(),
            end.as_str(),
            minutes.format(shift.duration_minutes()),
            status,
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Export CSV des conflits : header `severity,kind,shift,start,employee,message`
pub fn export_conflicts_csv<P: AsRef<Path>>(path: P, conflicts: &[Conflict]) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_path(path)?;
    w.write_record(["severity", "kind", "shift", "start", "employee", "message"])?;
    for c in conflicts {
        let start = c.shift_start.to_rfc3339();
        w.write_record([
            c.severity.as_str(),
            c.kind.as_str(),
            c.shift.as_str(),
            start.as_str(),
            c.employee.as_ref().map(|e| e.as_str()).unwrap_or(""),
            c.message.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}
