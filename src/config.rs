use crate::db;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Layout,
    Roster,
    Reports,
}

impl SetupSection {
    pub const ALL: [SetupSection; 3] = [Self::Layout, Self::Roster, Self::Reports];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "layout" => Some(Self::Layout),
            "roster" => Some(Self::Roster),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::Roster => "roster",
            Self::Reports => "reports",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Layout => "setup.layout",
            Self::Roster => "setup.roster",
            Self::Reports => "setup.reports",
        }
    }

    fn defaults(self) -> Value {
        match self {
            Self::Layout => json!({
                "spareSessionColumns": 5,
                "assessmentGap": 2
            }),
            Self::Roster => json!({
                "maxStudents": 300
            }),
            Self::Reports => json!({
                "lowAttendanceThreshold": 75
            }),
        }
    }
}

/// Column budgeting for the session zone and the assessment zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Empty session columns reserved ahead of the summary block whenever the
    /// layout is created or grown.
    pub spare_session_columns: u32,
    /// Empty columns between the summary block and the first assessment.
    pub assessment_gap: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            spare_session_columns: 5,
            assessment_gap: 2,
        }
    }
}

impl LayoutConfig {
    /// Columns added to the session zone when it runs out of room.
    pub fn growth_step(&self) -> u32 {
        self.spare_session_columns.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterConfig {
    pub max_students: usize,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self { max_students: 300 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportsConfig {
    pub low_attendance_threshold: f64,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            low_attendance_threshold: 75.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerConfig {
    pub layout: LayoutConfig,
    pub roster: RosterConfig,
    pub reports: ReportsConfig,
}

impl LedgerConfig {
    pub fn load(conn: &rusqlite::Connection) -> anyhow::Result<Self> {
        Ok(Self {
            layout: serde_json::from_value(load_section(conn, SetupSection::Layout)?)?,
            roster: serde_json::from_value(load_section(conn, SetupSection::Roster)?)?,
            reports: serde_json::from_value(load_section(conn, SetupSection::Reports)?)?,
        })
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Layout => match k.as_str() {
                "spareSessionColumns" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 60)?));
                }
                "assessmentGap" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 8)?));
                }
                _ => return Err(format!("unknown layout field: {}", k)),
            },
            SetupSection::Roster => match k.as_str() {
                "maxStudents" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 2000)?));
                }
                _ => return Err(format!("unknown roster field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "lowAttendanceThreshold" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 100.0)?));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = section.defaults();
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults rather than blocking.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), %msg, "ignoring saved setup values");
                current = section.defaults();
            }
        }
    }
    Ok(current)
}

pub fn update_section(
    conn: &rusqlite::Connection,
    section: SetupSection,
    patch: &Map<String, Value>,
) -> anyhow::Result<Result<Value, String>> {
    let mut current = load_section(conn, section)?;
    if let Err(msg) = merge_section_patch(section, &mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, section.key(), &current)?;
    Ok(Ok(current))
}
