//! The model's output files.
//!
//! * `header`: one `name,value` row per parameter, plus the name of the detail file.
//! * `detail`: one row per locale per simulated day.
//! * `cases`: one row per case when it recovers (optional).
use serde_derive::Serialize;
use serde_json::Value;

use crate::case::{Case, CaseKind};
use crate::context::Context;
use crate::define_report;
use crate::error::BranchingError;
use crate::locale::Locale;
use crate::parameters::{ContextParametersExt, Params};
use crate::report::ContextReportExt;

pub const HEADER_REPORT: &str = "header";
pub const DETAIL_REPORT: &str = "detail";
pub const CASES_REPORT: &str = "cases";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ParameterRecord {
    pub name: String,
    pub value: String,
}
define_report!(ParameterRecord);

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LocaleDayRecord {
    pub ticks: u64,
    pub locale_id: usize,
    pub locale_name: String,
    pub pop0: u64,
    pub susceptible: u64,
    pub cumulative_cases: u64,
    pub cumulative_infected: u64,
    pub cumulative_recovered: u64,
    pub new_cases: u64,
    pub new_infected: u64,
    pub new_recovered: u64,
    pub new_tests: u64,
    pub alert_level: u8,
    pub new_positives: u64,
    pub positivity: f64,
    pub control: f64,
    pub alert_changes: u32,
}
define_report!(LocaleDayRecord);

impl LocaleDayRecord {
    #[must_use]
    pub fn new(ticks: u64, locale: &Locale) -> LocaleDayRecord {
        let counts = &locale.counts;
        LocaleDayRecord {
            ticks,
            locale_id: locale.id.0,
            locale_name: locale.name.clone(),
            pop0: locale.pop0,
            susceptible: locale.susceptible,
            cumulative_cases: counts.cumulative_cases,
            cumulative_infected: counts.cumulative_infected,
            cumulative_recovered: counts.cumulative_recovered,
            new_cases: counts.new_cases,
            new_infected: counts.new_infected,
            new_recovered: counts.new_recovered,
            new_tests: counts.new_tests,
            alert_level: locale.alert_level,
            new_positives: counts.new_positives,
            positivity: locale.positivity_rate(),
            control: locale.control,
            alert_changes: locale.alert_changes,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: CaseKind,
    pub locale: usize,
    pub offspring: u32,
    pub base_r: f64,
    pub t0: f64,
    pub recovery: f64,
    pub predecessor: Option<u64>,
    pub onset: f64,
    pub isolation: Option<f64>,
    pub hospital_admitted: Option<f64>,
    pub hospital_discharged: Option<f64>,
}
define_report!(CaseRecord);

impl From<&Case> for CaseRecord {
    fn from(case: &Case) -> Self {
        CaseRecord {
            id: case.serial,
            kind: case.kind,
            locale: case.locale.0,
            offspring: case.offspring,
            base_r: case.base_r,
            t0: case.t0,
            recovery: case.recovery,
            predecessor: case.predecessor,
            onset: case.onset,
            isolation: case.isolation,
            hospital_admitted: case.hospitalization.map(|h| h.admitted),
            hospital_discharged: case.hospitalization.map(|h| h.discharged),
        }
    }
}

fn flatten(prefix: &str, value: &Value, records: &mut Vec<ParameterRecord>) {
    let key = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        }
    };
    match value {
        Value::Object(map) => {
            for (name, inner) in map {
                flatten(&key(name), inner, records);
            }
        }
        Value::Array(items) => {
            for (index, inner) in items.iter().enumerate() {
                flatten(&key(&index.to_string()), inner, records);
            }
        }
        Value::String(text) => records.push(ParameterRecord {
            name: prefix.to_string(),
            value: text.clone(),
        }),
        Value::Null => records.push(ParameterRecord {
            name: prefix.to_string(),
            value: String::new(),
        }),
        other => records.push(ParameterRecord {
            name: prefix.to_string(),
            value: other.to_string(),
        }),
    }
}

/// The header rows for a run: every parameter under its dotted path, then
/// the seed actually used and the name of the paired detail file.
///
/// # Errors
///
/// Returns `JsonError` if the parameters cannot be serialized.
pub fn parameter_records(
    params: &Params,
    seed: u64,
    detail_file: &str,
) -> Result<Vec<ParameterRecord>, BranchingError> {
    let value = serde_json::to_value(params)?;
    let mut records = Vec::new();
    flatten("", &value, &mut records);
    records.retain(|record| record.name != "seed");
    records.push(ParameterRecord {
        name: "seed".to_string(),
        value: seed.to_string(),
    });
    records.push(ParameterRecord {
        name: "detail_file".to_string(),
        value: detail_file.to_string(),
    });
    Ok(records)
}

/// Opens the model's reports and writes the header.
///
/// # Errors
///
/// Returns a `BranchingError` if a report file cannot be created.
pub fn add_model_reports(
    context: &mut Context,
    seed: u64,
    cases_report: bool,
) -> Result<(), BranchingError> {
    let detail_file = context.report_options().file_name(DETAIL_REPORT);
    context.add_report::<ParameterRecord>(HEADER_REPORT)?;
    context.add_report::<LocaleDayRecord>(DETAIL_REPORT)?;
    if cases_report {
        context.add_report::<CaseRecord>(CASES_REPORT)?;
    }
    for record in parameter_records(context.get_params(), seed, &detail_file)? {
        context.send_report(record);
    }
    Ok(())
}
