//! Assessment zone: named mark columns with a declared maximum, optionally
//! followed by one weighted FINAL RESULT column.

use std::collections::BTreeMap;

use serde::Serialize;

use super::roster::RosterIndex;
use super::sheet::{CellStyle, Sheet, DATE_ROW, HEADER_ROW, HOURS_ROW};
use super::zones::{self, Layout, Zone, FINAL_RESULT, RESERVED_NAMES, SUMMARY_WIDTH};
use super::{relocate, LedgerError, Outcome};
use crate::config::LayoutConfig;

const OUT_OF_PREFIX: &str = "Out of:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub col: u32,
    pub name: String,
    pub max_marks: i64,
    /// Indexed by roll - 1.
    pub marks: Vec<Option<i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub col: u32,
    /// `None` when the recorded weights cannot be read back.
    pub weights: Option<BTreeMap<String, f64>>,
    pub values: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentZone {
    pub assessments: Vec<Assessment>,
    pub final_result: Option<FinalResult>,
}

impl AssessmentZone {
    pub fn find(&self, name: &str) -> Option<&Assessment> {
        let name = name.trim();
        self.assessments
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    fn require(&self, name: &str) -> Result<&Assessment, LedgerError> {
        self.find(name).ok_or_else(|| {
            LedgerError::structural(format!(
                "Could not find the assessment '{}'.",
                name.trim()
            ))
        })
    }
}

fn parse_out_of(text: &str) -> Option<i64> {
    let rest = text.trim();
    let rest = match rest.get(..OUT_OF_PREFIX.len()) {
        Some(p) if p.eq_ignore_ascii_case(OUT_OF_PREFIX) => &rest[OUT_OF_PREFIX.len()..],
        _ => rest,
    };
    rest.trim().parse::<i64>().ok().filter(|n| *n > 0)
}

/// Read every assessment column and the final result, if any.
pub fn read_zone(sheet: &Sheet, layout: &Layout) -> Result<AssessmentZone, LedgerError> {
    let mut zone = AssessmentZone::default();
    if !layout.is_established() {
        return Ok(zone);
    }
    let roster = RosterIndex::read(sheet);

    for col in layout.assessments.cols() {
        let Some(header) = sheet.text(HEADER_ROW, col) else {
            continue;
        };

        if header.eq_ignore_ascii_case(FINAL_RESULT) {
            if zone.final_result.is_some() {
                return Err(LedgerError::structural(
                    "More than one FINAL RESULT column was found.",
                ));
            }
            zone.final_result = Some(FinalResult {
                col,
                weights: sheet
                    .text(DATE_ROW, col)
                    .and_then(|raw| serde_json::from_str(&raw).ok()),
                values: roster.rows().map(|row| sheet.text(row, col)).collect(),
            });
            continue;
        }

        let max_marks = sheet
            .text(HOURS_ROW, col)
            .as_deref()
            .and_then(parse_out_of)
            .ok_or_else(|| {
                LedgerError::structural(format!(
                    "Assessment '{}' has no valid maximum marks.",
                    header
                ))
            })?;
        let mut marks = Vec::with_capacity(roster.len());
        for row in roster.rows() {
            if sheet.is_blank(row, col) {
                marks.push(None);
                continue;
            }
            let mark = sheet.int(row, col).ok_or_else(|| {
                LedgerError::structural(format!(
                    "Assessment '{}' has a non-numeric mark in row {}.",
                    header, row
                ))
            })?;
            marks.push(Some(mark));
        }
        zone.assessments.push(Assessment {
            col,
            name: header,
            max_marks,
            marks,
        });
    }
    Ok(zone)
}

fn load(sheet: &Sheet) -> Result<(Layout, AssessmentZone), LedgerError> {
    let layout = zones::locate(sheet)?;
    let zone = read_zone(sheet, &layout)?;
    Ok((layout, zone))
}

pub fn list(sheet: &Sheet) -> Result<Vec<String>, LedgerError> {
    let (_, zone) = load(sheet)?;
    Ok(zone.assessments.into_iter().map(|a| a.name).collect())
}

pub fn max_marks(sheet: &Sheet, name: &str) -> Result<i64, LedgerError> {
    let (_, zone) = load(sheet)?;
    Ok(zone.require(name)?.max_marks)
}

pub fn marks(sheet: &Sheet, name: &str) -> Result<Vec<Option<i64>>, LedgerError> {
    let (_, zone) = load(sheet)?;
    Ok(zone.require(name)?.marks.clone())
}

pub fn final_result(sheet: &Sheet) -> Result<Option<FinalResult>, LedgerError> {
    let (_, zone) = load(sheet)?;
    Ok(zone.final_result)
}

fn require_assessment_zone(layout: &Layout, a: &Assessment) -> Result<(), LedgerError> {
    match layout.zone_of(a.col) {
        Some(Zone::Assessment) => Ok(()),
        other => Err(LedgerError::structural(format!(
            "Column {} of '{}' lies in the {:?} zone, not the assessment zone.",
            a.col, a.name, other
        ))),
    }
}

fn normalize_name(raw: &str) -> Result<String, LedgerError> {
    let name = raw.trim().to_uppercase();
    if name.is_empty() {
        return Err(LedgerError::validation("Assessment name is required."));
    }
    if RESERVED_NAMES.contains(&name.as_str()) {
        return Err(LedgerError::validation(format!(
            "'{}' is a reserved column name.",
            name
        )));
    }
    Ok(name)
}

/// Append a new assessment column.
///
/// An existing final result is removed first, but only with `drop_stale`;
/// without it the call is declined and nothing changes.
pub fn add(
    sheet: &mut Sheet,
    name: &str,
    max_raw: &str,
    drop_stale: bool,
    cfg: &LayoutConfig,
) -> Result<Outcome, LedgerError> {
    let max: i64 = max_raw
        .trim()
        .parse()
        .map_err(|_| LedgerError::validation("Maximum Marks must be a number."))?;
    if max <= 0 {
        return Err(LedgerError::validation(
            "Maximum Marks must be greater than zero.",
        ));
    }
    let upper = normalize_name(name)?;

    let (layout, zone) = load(sheet)?;
    if zone.find(&upper).is_some() {
        return Err(LedgerError::validation(format!(
            "An assessment named '{}' already exists. Please use a new name.",
            name.trim()
        )));
    }
    if zone.final_result.is_some() && !drop_stale {
        return Ok(Outcome::Declined(
            "A final result column exists and was kept; the assessment was not added."
                .to_string(),
        ));
    }

    let layout = if layout.is_established() {
        layout
    } else {
        relocate::establish(sheet, cfg)?
    };
    if let Some(fr) = &zone.final_result {
        sheet.clear_column(fr.col);
        tracing::info!("outdated final result removed");
    }

    let col = match zone.assessments.last() {
        Some(a) => a.col + 1,
        None => {
            let summary_start = layout
                .summary_start()
                .ok_or_else(|| LedgerError::structural("Summary block is missing."))?;
            summary_start + SUMMARY_WIDTH + cfg.assessment_gap
        }
    };
    sheet.set(HOURS_ROW, col, format!("{} {}", OUT_OF_PREFIX, max), CellStyle::None);
    sheet.set(HEADER_ROW, col, upper.as_str(), CellStyle::Header);

    tracing::info!(name = %upper, max, col, "assessment added");
    Ok(Outcome::Applied(format!(
        "Assessment '{}' added successfully.",
        upper
    )))
}

/// Rescale every recorded mark from `old_max` to `new_max`.
pub fn convert(
    sheet: &mut Sheet,
    name: &str,
    old_max: i64,
    new_max: i64,
) -> Result<Outcome, LedgerError> {
    if old_max <= 0 || new_max <= 0 {
        return Err(LedgerError::validation(
            "Maximum Marks must be greater than zero.",
        ));
    }
    let (layout, zone) = load(sheet)?;
    let a = zone.require(name)?;
    require_assessment_zone(&layout, a)?;
    if a.max_marks != old_max {
        return Err(LedgerError::validation(format!(
            "'{}' is currently out of {}, not {}.",
            a.name, a.max_marks, old_max
        )));
    }

    let roster = RosterIndex::read(sheet);
    for (row, mark) in roster.rows().zip(&a.marks) {
        if let Some(m) = mark {
            let scaled = (*m as f64 / old_max as f64 * new_max as f64).round_ties_even() as i64;
            sheet.set(row, a.col, scaled.clamp(0, new_max), CellStyle::None);
        }
    }
    sheet.set(
        HOURS_ROW,
        a.col,
        format!("{} {}", OUT_OF_PREFIX, new_max),
        CellStyle::None,
    );

    tracing::info!(name = %a.name, old_max, new_max, "marks converted");
    Ok(Outcome::Applied("Marks converted successfully.".to_string()))
}

/// Delete one assessment and close the gap it leaves. An existing final
/// result is always dropped, and only with `drop_stale`.
pub fn remove(
    sheet: &mut Sheet,
    name: &str,
    drop_stale: bool,
    cfg: &LayoutConfig,
) -> Result<Outcome, LedgerError> {
    let (layout, zone) = load(sheet)?;
    let a = zone.require(name)?;
    if zone.final_result.is_some() && !drop_stale {
        return Ok(Outcome::Declined(
            "A final result column exists and was kept; the assessment was not removed."
                .to_string(),
        ));
    }
    let start = layout
        .summary_start()
        .ok_or_else(|| LedgerError::structural("Summary block is missing."))?;
    relocate::rebuild_tail(sheet, &layout, start, Some(a.name.as_str()), false, cfg)?;

    tracing::info!(name = %a.name, "assessment removed");
    Ok(Outcome::Applied(format!("Assessment '{}' removed.", a.name)))
}

/// Replace one assessment's marks. Every value is checked before any is
/// written.
pub fn set_marks(
    sheet: &mut Sheet,
    name: &str,
    values: &[Option<i64>],
) -> Result<Outcome, LedgerError> {
    let (layout, zone) = load(sheet)?;
    let a = zone.require(name)?;
    require_assessment_zone(&layout, a)?;
    let roster = RosterIndex::read(sheet);
    if values.len() != roster.len() {
        return Err(LedgerError::validation(format!(
            "Expected {} marks, one per student, but got {}.",
            roster.len(),
            values.len()
        )));
    }
    for (i, value) in values.iter().enumerate() {
        if let Some(v) = value {
            if !(0..=a.max_marks).contains(v) {
                return Err(LedgerError::validation(format!(
                    "Mark {} for roll {} is outside 0-{}.",
                    v,
                    i + 1,
                    a.max_marks
                )));
            }
        }
    }

    for (row, value) in roster.rows().zip(values) {
        match value {
            Some(v) => sheet.set(row, a.col, *v, CellStyle::None),
            None => {
                sheet.clear(row, a.col);
            }
        }
    }
    tracing::info!(name = %a.name, students = values.len(), "marks saved");
    Ok(Outcome::Applied(format!(
        "Marks for '{}' saved successfully.",
        a.name
    )))
}

/// Write a fresh FINAL RESULT column: for each student the sum over the
/// weighted assessments of `mark / max * weight`, blank marks counting as 0.
pub fn finalize(
    sheet: &mut Sheet,
    weights: &BTreeMap<String, f64>,
) -> Result<Outcome, LedgerError> {
    if weights.is_empty() {
        return Err(LedgerError::validation(
            "At least one assessment weight is required.",
        ));
    }
    if let Some((name, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
        return Err(LedgerError::validation(format!(
            "Weight for '{}' must be a non-negative number, got {}.",
            name, w
        )));
    }

    let (_, zone) = load(sheet)?;
    let mut used: BTreeMap<String, (&Assessment, f64)> = BTreeMap::new();
    for (name, weight) in weights {
        let a = zone.find(name).ok_or_else(|| {
            LedgerError::structural(format!(
                "Could not find data for assessment '{}'.",
                name.trim()
            ))
        })?;
        if used.contains_key(&a.name) {
            return Err(LedgerError::validation(format!(
                "Assessment '{}' is weighted more than once.",
                a.name
            )));
        }
        used.insert(a.name.clone(), (a, *weight));
    }

    if let Some(fr) = &zone.final_result {
        sheet.clear_column(fr.col);
    }
    let col = zone
        .assessments
        .last()
        .map(|a| a.col + 1)
        .ok_or_else(|| LedgerError::structural("No assessments to combine."))?;

    let recorded: BTreeMap<&str, f64> = used.iter().map(|(k, (_, w))| (k.as_str(), *w)).collect();
    let recorded = serde_json::to_string(&recorded)
        .map_err(|e| LedgerError::structural(format!("Could not record weights: {e}")))?;

    let roster = RosterIndex::read(sheet);
    sheet.set(DATE_ROW, col, recorded, CellStyle::None);
    sheet.set(HEADER_ROW, col, FINAL_RESULT, CellStyle::Header);
    for (i, row) in roster.rows().enumerate() {
        let score: f64 = used
            .values()
            .map(|(a, w)| {
                let mark = a.marks.get(i).copied().flatten().unwrap_or(0);
                mark as f64 / a.max_marks as f64 * w
            })
            .sum();
        sheet.set(row, col, format!("{:.2}", score), CellStyle::None);
    }

    tracing::info!(weights = used.len(), col, "final result calculated");
    Ok(Outcome::Applied(
        "Final result calculated successfully.".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testing::roster_sheet;
    use proptest::prelude::*;

    fn cfg() -> LayoutConfig {
        LayoutConfig::default()
    }

    fn final_values(sheet: &Sheet) -> Vec<Option<String>> {
        let layout = zones::locate(sheet).expect("layout");
        read_zone(sheet, &layout)
            .expect("zone")
            .final_result
            .expect("final result")
            .values
    }

    #[test]
    fn quiz_scenario_produces_weighted_final_result() {
        let mut sheet = roster_sheet(3, &cfg());
        add(&mut sheet, "QUIZ1", "10", false, &cfg()).expect("add");
        set_marks(&mut sheet, "QUIZ1", &[Some(8), None, Some(10)]).expect("marks");
        let weights = BTreeMap::from([("QUIZ1".to_string(), 100.0)]);
        finalize(&mut sheet, &weights).expect("finalize");

        let values = final_values(&sheet);
        assert_eq!(
            values,
            vec![
                Some("80.00".to_string()),
                Some("0.00".to_string()),
                Some("100.00".to_string())
            ]
        );
    }

    #[test]
    fn names_collide_case_insensitively() {
        let mut sheet = roster_sheet(2, &cfg());
        add(&mut sheet, "QUIZ1", "10", false, &cfg()).expect("add");
        let err = add(&mut sheet, "quiz1", "20", false, &cfg()).expect_err("duplicate");
        assert_eq!(err.code(), "validation_failed");
        assert!(err.to_string().contains("already exists"));
        assert_eq!(list(&sheet).expect("list"), vec!["QUIZ1"]);
    }

    #[test]
    fn add_validates_max_and_name() {
        let mut sheet = roster_sheet(2, &cfg());
        let err = add(&mut sheet, "A1", "ten", false, &cfg()).expect_err("nan");
        assert_eq!(err.to_string(), "Maximum Marks must be a number.");
        assert!(add(&mut sheet, "A1", "0", false, &cfg()).is_err());
        assert!(add(&mut sheet, "  ", "10", false, &cfg()).is_err());
        assert!(add(&mut sheet, "percentage", "10", false, &cfg()).is_err());
    }

    #[test]
    fn assessments_sit_after_summary_and_gap() {
        let c = LayoutConfig {
            spare_session_columns: 2,
            assessment_gap: 3,
        };
        let mut sheet = roster_sheet(1, &c);
        add(&mut sheet, "t1", "5", false, &c).expect("add");
        add(&mut sheet, "t2", "5", false, &c).expect("add");
        let layout = zones::locate(&sheet).expect("layout");
        let zone = read_zone(&sheet, &layout).expect("zone");
        let start = layout.summary_start().expect("summary");
        assert_eq!(zone.assessments[0].col, start + SUMMARY_WIDTH + 3);
        assert_eq!(zone.assessments[1].col, start + SUMMARY_WIDTH + 4);
        assert_eq!(sheet.text(HOURS_ROW, zone.assessments[0].col).as_deref(), Some("Out of: 5"));
    }

    #[test]
    fn adding_after_final_result_needs_confirmation() {
        let mut sheet = roster_sheet(2, &cfg());
        add(&mut sheet, "QUIZ1", "10", false, &cfg()).expect("add");
        finalize(&mut sheet, &BTreeMap::from([("quiz1".to_string(), 50.0)])).expect("finalize");

        let before = sheet.clone();
        let outcome = add(&mut sheet, "QUIZ2", "10", false, &cfg()).expect("declined");
        assert!(matches!(outcome, Outcome::Declined(_)));
        assert_eq!(sheet, before);

        let outcome = add(&mut sheet, "QUIZ2", "10", true, &cfg()).expect("added");
        assert!(matches!(outcome, Outcome::Applied(_)));
        let layout = zones::locate(&sheet).expect("layout");
        let zone = read_zone(&sheet, &layout).expect("zone");
        assert!(zone.final_result.is_none());
        assert_eq!(zone.assessments.len(), 2);
    }

    #[test]
    fn set_marks_rejects_whole_batch_on_bad_value() {
        let mut sheet = roster_sheet(3, &cfg());
        add(&mut sheet, "LAB", "10", false, &cfg()).expect("add");
        set_marks(&mut sheet, "LAB", &[Some(1), Some(2), Some(3)]).expect("marks");
        let before = sheet.clone();

        let err = set_marks(&mut sheet, "LAB", &[Some(4), Some(11), Some(5)]).expect_err("range");
        assert_eq!(err.code(), "validation_failed");
        assert_eq!(sheet, before);
        assert!(set_marks(&mut sheet, "LAB", &[Some(4)]).is_err());
        assert!(set_marks(&mut sheet, "LAB", &[Some(-1), None, None]).is_err());
        let err = set_marks(&mut sheet, "NOPE", &[None, None, None]).expect_err("missing");
        assert_eq!(err.code(), "structural_error");
    }

    #[test]
    fn convert_rescales_and_updates_header() {
        let mut sheet = roster_sheet(3, &cfg());
        add(&mut sheet, "MID", "50", false, &cfg()).expect("add");
        set_marks(&mut sheet, "MID", &[Some(25), None, Some(33)]).expect("marks");
        assert!(convert(&mut sheet, "MID", 40, 100).is_err());
        convert(&mut sheet, "mid", 50, 100).expect("convert");
        assert_eq!(max_marks(&sheet, "MID").expect("max"), 100);
        assert_eq!(marks(&sheet, "MID").expect("marks"), vec![Some(50), None, Some(66)]);
    }

    #[test]
    fn convert_rounds_halves_to_even() {
        let mut sheet = roster_sheet(2, &cfg());
        add(&mut sheet, "T", "4", false, &cfg()).expect("add");
        set_marks(&mut sheet, "T", &[Some(1), Some(3)]).expect("marks");
        convert(&mut sheet, "T", 4, 10).expect("convert");
        assert_eq!(marks(&sheet, "T").expect("marks"), vec![Some(2), Some(8)]);
    }

    #[test]
    fn finalize_rejects_weights_naming_one_assessment_twice() {
        let mut sheet = roster_sheet(1, &cfg());
        add(&mut sheet, "QUIZ1", "10", false, &cfg()).expect("add");
        set_marks(&mut sheet, "QUIZ1", &[Some(5)]).expect("marks");
        let before = sheet.clone();

        let weights = BTreeMap::from([
            ("quiz1".to_string(), 40.0),
            ("QUIZ1".to_string(), 60.0),
        ]);
        let err = finalize(&mut sheet, &weights).expect_err("duplicate");
        assert_eq!(err.code(), "validation_failed");
        assert_eq!(err.to_string(), "Assessment 'QUIZ1' is weighted more than once.");
        assert_eq!(sheet, before);
    }

    #[test]
    fn finalize_needs_known_assessments_and_sane_weights() {
        let mut sheet = roster_sheet(2, &cfg());
        add(&mut sheet, "A", "10", false, &cfg()).expect("add");
        let err = finalize(&mut sheet, &BTreeMap::from([("B".to_string(), 10.0)]))
            .expect_err("missing");
        assert_eq!(err.to_string(), "Could not find data for assessment 'B'.");
        assert!(finalize(&mut sheet, &BTreeMap::new()).is_err());
        assert!(finalize(&mut sheet, &BTreeMap::from([("A".to_string(), -1.0)])).is_err());

        finalize(&mut sheet, &BTreeMap::from([("A".to_string(), 30.0)])).expect("first");
        finalize(&mut sheet, &BTreeMap::from([("A".to_string(), 60.0)])).expect("again");
        let layout = zones::locate(&sheet).expect("layout");
        let zone = read_zone(&sheet, &layout).expect("zone");
        let fr = zone.final_result.expect("final");
        assert_eq!(fr.weights, Some(BTreeMap::from([("A".to_string(), 60.0)])));
        assert_eq!(fr.col, zone.assessments[0].col + 1);
    }

    #[test]
    fn remove_compacts_and_drops_final_result_on_confirmation() {
        let mut sheet = roster_sheet(2, &cfg());
        for n in ["A", "B", "C"] {
            add(&mut sheet, n, "10", false, &cfg()).expect("add");
        }
        set_marks(&mut sheet, "C", &[Some(9), Some(1)]).expect("marks");
        finalize(&mut sheet, &BTreeMap::from([("C".to_string(), 100.0)])).expect("finalize");

        let outcome = remove(&mut sheet, "B", false, &cfg()).expect("declined");
        assert!(matches!(outcome, Outcome::Declined(_)));

        remove(&mut sheet, "b", true, &cfg()).expect("remove");
        let layout = zones::locate(&sheet).expect("layout");
        let zone = read_zone(&sheet, &layout).expect("zone");
        assert!(zone.final_result.is_none());
        let names: Vec<&str> = zone.assessments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(zone.assessments[1].col, zone.assessments[0].col + 1);
        assert_eq!(zone.assessments[1].marks, vec![Some(9), Some(1)]);
    }

    #[test]
    fn out_of_header_parsing() {
        assert_eq!(parse_out_of("Out of: 25"), Some(25));
        assert_eq!(parse_out_of("out of:7"), Some(7));
        assert_eq!(parse_out_of("12"), Some(12));
        assert_eq!(parse_out_of("Out of: 0"), None);
        assert_eq!(parse_out_of("Out of: x"), None);
    }

    proptest! {
        #[test]
        fn conversion_round_trip_stays_close(
            a in 1i64..=200,
            b in 1i64..=200,
            raw in prop::collection::vec(0u32..=1000, 4),
        ) {
            let mut sheet = roster_sheet(4, &cfg());
            add(&mut sheet, "T", &a.to_string(), false, &cfg()).expect("add");
            let original: Vec<Option<i64>> = raw.iter().map(|r| Some(*r as i64 % (a + 1))).collect();
            set_marks(&mut sheet, "T", &original).expect("marks");

            convert(&mut sheet, "T", a, b).expect("forward");
            for m in marks(&sheet, "T").expect("marks").into_iter().flatten() {
                prop_assert!((0..=b).contains(&m));
            }
            convert(&mut sheet, "T", b, a).expect("back");
            let back = marks(&sheet, "T").expect("marks");
            for (o, r) in original.iter().zip(&back) {
                let (o, r) = (o.unwrap_or_default(), r.unwrap_or_default());
                prop_assert!((0..=a).contains(&r));
                if b >= a {
                    prop_assert!((o - r).abs() <= 1, "{} -> {} -> {}", o, b, r);
                }
            }
        }
    }
}
