//! Read-only views over a sheet.

use serde::Serialize;

use super::assessments::read_zone;
use super::roster::{Roll, RosterIndex};
use super::sessions::{read_sessions, SessionColumn, SessionDate, Status};
use super::sheet::Sheet;
use super::summary::snapshot;
use super::zones::{self, FINAL_RESULT};
use super::LedgerError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowAttendance {
    pub roll: Roll,
    pub name: String,
    pub percentage: f64,
}

impl LowAttendance {
    pub fn line(&self) -> String {
        format!("{} ({:.2}%)", self.name, self.percentage)
    }
}

/// Students whose attendance is strictly below `threshold` percent, or `None`
/// when the sheet has no summary block yet.
pub fn low_attendance(
    sheet: &Sheet,
    threshold: f64,
) -> Result<Option<Vec<LowAttendance>>, LedgerError> {
    if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
        return Err(LedgerError::validation(
            "Percentage must be between 0 and 100.",
        ));
    }
    let layout = zones::locate(sheet)?;
    if !layout.is_established() {
        return Ok(None);
    }
    let roster = RosterIndex::read(sheet);
    let rows = snapshot(sheet, &layout)?;

    Ok(Some(
        roster
            .students()
            .iter()
            .zip(rows)
            .filter(|(s, r)| !s.name.is_empty() && r.percentage_present < threshold)
            .map(|(s, r)| LowAttendance {
                roll: s.roll,
                name: s.name.clone(),
                percentage: r.percentage_present,
            })
            .collect(),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateReport {
    pub date: String,
    pub hours: i64,
    pub present: usize,
    pub absent: usize,
}

/// One text block per requested date, in request order.
pub fn by_date(
    subject: &str,
    sheet: &Sheet,
    dates: &[String],
) -> Result<Vec<String>, LedgerError> {
    if dates.is_empty() {
        return Ok(vec!["Please select at least one date.".to_string()]);
    }
    let layout = zones::locate(sheet)?;
    let roster = RosterIndex::read(sheet);
    let sessions = read_sessions(sheet, &layout, &roster)?;

    Ok(dates
        .iter()
        .map(|wanted| {
            let wanted = wanted.trim();
            match find_session(&sessions, wanted) {
                None => format!("Date '{}' not found.", wanted),
                Some(s) => {
                    let report = DateReport {
                        date: s.date.clone(),
                        hours: s.hours,
                        present: s
                            .statuses
                            .iter()
                            .filter(|st| **st == Some(Status::Present))
                            .count(),
                        absent: s
                            .statuses
                            .iter()
                            .filter(|st| **st == Some(Status::Absent))
                            .count(),
                    };
                    let total = report.present + report.absent;
                    format!(
                        "Subject: {}\nReport for {} (Session Hours: {}):\n  - Present: {} / {}\n  - Absent: {} / {}",
                        subject, report.date, report.hours, report.present, total, report.absent, total
                    )
                }
            }
        })
        .collect())
}

/// Dates compare by calendar day, so `1-1-2025` finds `01-01-2025`.
fn find_session<'a>(sessions: &'a [SessionColumn], wanted: &str) -> Option<&'a SessionColumn> {
    let day = SessionDate::parse(wanted).ok();
    sessions.iter().find(|s| {
        s.date == wanted
            || day.is_some_and(|d| SessionDate::parse(&s.date).is_ok_and(|sd| sd == d))
    })
}

/// Attendance and marks for each named student, in request order.
pub fn by_student(
    subject: &str,
    sheet: &Sheet,
    names: &[String],
) -> Result<Vec<String>, LedgerError> {
    let layout = zones::locate(sheet)?;
    let roster = RosterIndex::read(sheet);
    let summary = snapshot(sheet, &layout)?;
    let zone = read_zone(sheet, &layout)?;

    Ok(names
        .iter()
        .map(|name| {
            let Some(student) = roster.find_by_name(name) else {
                return format!("{}:\n  - STUDENT NOT FOUND", name.trim());
            };
            let i = (student.roll.get() - 1) as usize;
            let mut text = format!("{}: In subject ({})", student.name, subject);
            if layout.is_established() {
                if let Some(row) = summary.get(i) {
                    text.push_str(&format!(
                        "\n  - Hours Present: {}\n  - Hours Absent: {}\n  - Percentage: {}%",
                        row.hours_present,
                        row.hours_absent,
                        row.percentage_text()
                    ));
                }
            }
            if !zone.assessments.is_empty() {
                text.push_str("\n  --- Marks ---");
                for a in &zone.assessments {
                    if let Some(mark) = a.marks.get(i).copied().flatten() {
                        text.push_str(&format!("\n  - {}: {}/{}", a.name, mark, a.max_marks));
                    }
                }
            }
            if let Some(value) = zone
                .final_result
                .as_ref()
                .and_then(|f| f.values.get(i).cloned().flatten())
            {
                text.push_str(&format!("\n  - {}: {}", FINAL_RESULT, value));
            }
            text
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::ledger::assessments::{add, set_marks};
    use crate::ledger::sessions::{mark_attendance, AttendanceEntry, RollMode};
    use crate::ledger::testing::roster_sheet;

    fn sample() -> Sheet {
        let cfg = LayoutConfig::default();
        let mut sheet = roster_sheet(3, &cfg);
        for (date, hours, absent) in [("01-01-2025", 2, vec![2]), ("02-01-2025", 1, vec![])] {
            let e = AttendanceEntry::from_rolls(date, hours, &absent, RollMode::Absentees, 3)
                .expect("entry");
            mark_attendance(&mut sheet, &e, false, &cfg).expect("mark");
        }
        add(&mut sheet, "QUIZ1", "10", false, &cfg).expect("add");
        set_marks(&mut sheet, "QUIZ1", &[Some(8), None, Some(10)]).expect("marks");
        sheet
    }

    #[test]
    fn low_attendance_is_strictly_below_threshold() {
        let sheet = sample();
        let low = low_attendance(&sheet, 75.0).expect("report").expect("summary");
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].roll.get(), 2);
        assert_eq!(low[0].line(), "STUDENT 2 (33.33%)");

        let none = low_attendance(&sheet, 33.33).expect("report").expect("summary");
        assert!(none.is_empty());
        assert!(low_attendance(&sheet, 101.0).is_err());
        assert_eq!(low_attendance(&Sheet::new(), 50.0).expect("report"), None);
    }

    #[test]
    fn date_report_counts_statuses() {
        let sheet = sample();
        let lines = by_date(
            "MATHS",
            &sheet,
            &["01-01-2025".to_string(), "09-09-2025".to_string()],
        )
        .expect("report");
        assert!(lines[0].contains("Session Hours: 2"));
        assert!(lines[0].contains("Present: 2 / 3"));
        assert!(lines[0].contains("Absent: 1 / 3"));
        assert_eq!(lines[1], "Date '09-09-2025' not found.");
    }

    #[test]
    fn date_report_matches_unpadded_dates() {
        let sheet = sample();
        let lines = by_date("MATHS", &sheet, &[" 1-1-2025 ".to_string(), "1-13-2025".to_string()])
            .expect("report");
        assert!(lines[0].starts_with("Subject: MATHS\nReport for 01-01-2025"));
        assert!(lines[0].contains("Present: 2 / 3"));
        assert_eq!(lines[1], "Date '1-13-2025' not found.");
    }

    #[test]
    fn student_report_lists_attendance_and_marks() {
        let sheet = sample();
        let lines = by_student(
            "MATHS",
            &sheet,
            &["student 1".to_string(), "student 2".to_string(), "nobody".to_string()],
        )
        .expect("report");
        assert!(lines[0].contains("Percentage: 100.00%"));
        assert!(lines[0].contains("QUIZ1: 8/10"));
        assert!(lines[1].contains("Hours Absent: 2"));
        assert!(!lines[1].contains("QUIZ1:"));
        assert_eq!(lines[2], "nobody:\n  - STUDENT NOT FOUND");
    }
}
