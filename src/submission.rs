use crate::errors::{AppError, AppResult};
use std::collections::BTreeMap;

pub const EMPTY_SUBMISSION_MESSAGE: &str = "Please enter at least one measurement";

fn parse_value(raw: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Turns raw form input into kind/value pairs.
///
/// Blank, non-numeric, non-finite and non-positive fields are dropped one by
/// one. If nothing survives the whole submission is rejected.
pub fn parse_submission(fields: &BTreeMap<String, String>) -> AppResult<BTreeMap<String, f64>> {
    let mut values = BTreeMap::new();
    for (kind, raw) in fields {
        let kind = kind.trim().to_lowercase();
        if kind.is_empty() || raw.trim().is_empty() {
            continue;
        }
        match parse_value(raw) {
            Some(value) => {
                values.insert(kind, value);
            }
            None => tracing::debug!(kind = %kind, "dropping invalid measurement value"),
        }
    }

    if values.is_empty() {
        return Err(AppError::Validation(EMPTY_SUBMISSION_MESSAGE.to_string()));
    }
    Ok(values)
}
