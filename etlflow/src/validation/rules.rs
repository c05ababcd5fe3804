//! Validation rules and the fail-fast rule set.

use crate::core::Dataset;
use crate::errors::StageError;
use crate::utils::{value_to_timestamp, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Name of the missing-values rule.
pub const NO_MISSING_VALUES: &str = "No missing values";
/// Name of the key uniqueness rule.
pub const UNIQUENESS: &str = "Uniqueness";
/// Name of the future-date rule.
pub const NO_FUTURE_DATES: &str = "No future-dated orders";

/// Source of "now" for time-dependent rules.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

type Predicate = Box<dyn Fn(&Dataset) -> bool + Send + Sync>;

/// A named, stateless predicate over a dataset.
pub struct ValidationRule {
    name: String,
    message: String,
    predicate: Predicate,
}

impl ValidationRule {
    /// Creates a rule.
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        predicate: impl Fn(&Dataset) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            predicate: Box::new(predicate),
        }
    }

    /// The rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The message reported when the rule fails.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the dataset satisfies the rule.
    #[must_use]
    pub fn check(&self, dataset: &Dataset) -> bool {
        (self.predicate)(dataset)
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Result of validating a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether every rule passed.
    pub passed: bool,
    /// The first rule that failed.
    pub failed_rule: Option<String>,
    /// That rule's message.
    pub message: Option<String>,
}

impl ValidationOutcome {
    /// An outcome where all rules passed.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            passed: true,
            failed_rule: None,
            message: None,
        }
    }

    /// An outcome for a failed rule.
    #[must_use]
    pub fn fail(rule: &ValidationRule) -> Self {
        Self {
            passed: false,
            failed_rule: Some(rule.name().to_string()),
            message: Some(rule.message().to_string()),
        }
    }

    /// Converts a failed outcome into a stage error.
    pub fn into_result(self) -> Result<(), StageError> {
        if self.passed {
            return Ok(());
        }
        Err(StageError::Validation {
            rule: self.failed_rule.unwrap_or_default(),
            message: self.message.unwrap_or_default(),
        })
    }
}

/// An ordered list of rules evaluated fail-fast.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<ValidationRule>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard order-data rules: no missing values (in `required`, or in
    /// every column when `required` is empty), unique (`order_id`,
    /// `product_id`), and no `order_date` later than `clock()`.
    #[must_use]
    pub fn standard(required: Vec<String>, clock: Clock) -> Self {
        Self::new()
            .with_rule(no_missing_values(required))
            .with_rule(unique_columns(&["order_id", "product_id"]))
            .with_rule(no_future_dates("order_date", clock))
    }

    /// The standard rules against the wall clock, checking every column.
    #[must_use]
    pub fn standard_now() -> Self {
        Self::standard(Vec::new(), Arc::new(Utc::now))
    }

    /// Appends a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rule names in evaluation order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(ValidationRule::name).collect()
    }

    /// Evaluates rules in order and stops at the first failure.
    #[must_use]
    pub fn validate(&self, dataset: &Dataset) -> ValidationOutcome {
        self.rules
            .iter()
            .find(|rule| !rule.check(dataset))
            .map_or_else(ValidationOutcome::pass, ValidationOutcome::fail)
    }
}

/// Every cell of the `required` columns is non-null; an empty list means all
/// columns. A required column that does not exist fails the rule.
#[must_use]
pub fn no_missing_values(required: Vec<String>) -> ValidationRule {
    ValidationRule::new(
        NO_MISSING_VALUES,
        "Data validation failed: Missing values found",
        move |ds| {
            if required.is_empty() {
                return ds.rows().iter().flatten().all(|v| !v.is_null());
            }
            required.iter().all(|col| {
                ds.column(col)
                    .map(|mut cells| cells.all(|v| !v.is_null()))
                    .unwrap_or(false)
            })
        },
    )
}

/// The combination of `columns` is unique across rows.
#[must_use]
pub fn unique_columns(columns: &[&str]) -> ValidationRule {
    let columns: Vec<String> = columns.iter().map(ToString::to_string).collect();
    let message = format!(
        "Data validation failed: Duplicate {} found",
        columns.join(" and ")
    );
    ValidationRule::new(UNIQUENESS, message, move |ds| {
        let Some(indices) = columns
            .iter()
            .map(|c| ds.column_index(c))
            .collect::<Option<Vec<_>>>()
        else {
            return false;
        };
        let mut seen = HashSet::with_capacity(ds.len());
        ds.rows().iter().all(|row| {
            let key: Vec<String> = indices.iter().map(|&i| row[i].key_repr()).collect();
            seen.insert(key)
        })
    })
}

/// Every value in `column` is a timestamp no later than `clock()` at check time.
/// Null or unparseable values fail the rule.
#[must_use]
pub fn no_future_dates(column: &str, clock: Clock) -> ValidationRule {
    let column = column.to_string();
    let message = format!("Data validation failed: Future dates found in {column}");
    ValidationRule::new(NO_FUTURE_DATES, message, move |ds| {
        let now = clock();
        ds.column(&column).map_or(false, |mut cells| {
            cells.all(|v| value_to_timestamp(v).map_or(false, |ts| ts <= now))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_clock() -> Clock {
        Arc::new(|| Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
    }

    fn merged(rows: Vec<Vec<Value>>) -> Dataset {
        Dataset::from_rows(
            "transformed",
            ["order_id", "product_id", "quantity", "order_date"],
            rows,
        )
        .unwrap()
    }

    fn rules() -> RuleSet {
        RuleSet::standard(Vec::new(), fixed_clock())
    }

    #[test]
    fn test_clean_dataset_passes() {
        let ds = merged(vec![
            vec![1.into(), "p1".into(), 2.into(), "2024-01-10".into()],
            vec![1.into(), "p2".into(), 1.into(), "2024-05-31 23:59:59".into()],
        ]);
        assert_eq!(rules().validate(&ds), ValidationOutcome::pass());
    }

    #[test]
    fn test_missing_value_fails_first_rule() {
        let ds = merged(vec![vec![1.into(), "p1".into(), Value::Null, "2024-01-10".into()]]);
        let outcome = rules().validate(&ds);

        assert!(!outcome.passed);
        assert_eq!(outcome.failed_rule.as_deref(), Some(NO_MISSING_VALUES));
        assert_eq!(
            outcome.message.as_deref(),
            Some("Data validation failed: Missing values found")
        );
    }

    #[test]
    fn test_uniqueness_reported_before_future_dates() {
        let ds = merged(vec![
            vec![1.into(), "p1".into(), 2.into(), "2030-01-01".into()],
            vec![1.into(), "p1".into(), 3.into(), "2030-01-01".into()],
        ]);
        let outcome = rules().validate(&ds);

        assert_eq!(outcome.failed_rule.as_deref(), Some(UNIQUENESS));
        assert_eq!(
            outcome.message.as_deref(),
            Some("Data validation failed: Duplicate order_id and product_id found")
        );
    }

    #[test]
    fn test_future_date_fails() {
        let ds = merged(vec![vec![1.into(), "p1".into(), 2.into(), "2024-06-01T00:00:01Z".into()]]);
        assert_eq!(rules().validate(&ds).failed_rule.as_deref(), Some(NO_FUTURE_DATES));
    }

    #[test]
    fn test_boundary_date_equal_to_now_passes() {
        let ds = merged(vec![vec![1.into(), "p1".into(), 2.into(), "2024-06-01T00:00:00Z".into()]]);
        assert!(rules().validate(&ds).passed);
    }

    #[test]
    fn test_unparseable_date_fails() {
        let ds = merged(vec![vec![1.into(), "p1".into(), 2.into(), "soon".into()]]);
        assert_eq!(rules().validate(&ds).failed_rule.as_deref(), Some(NO_FUTURE_DATES));
    }

    #[test]
    fn test_required_columns_limit_null_check() {
        let ds = Dataset::from_rows(
            "t",
            ["order_id", "product_id", "comment", "order_date"],
            vec![vec![1.into(), "p1".into(), Value::Null, "2024-01-01".into()]],
        )
        .unwrap();

        let lenient = RuleSet::standard(vec!["order_id".into(), "product_id".into()], fixed_clock());
        assert!(lenient.validate(&ds).passed);
        assert_eq!(rules().validate(&ds).failed_rule.as_deref(), Some(NO_MISSING_VALUES));
    }

    #[test]
    fn test_missing_key_column_fails_uniqueness() {
        let ds = Dataset::from_rows("t", ["order_id"], vec![vec![1.into()]]).unwrap();
        assert!(!unique_columns(&["order_id", "product_id"]).check(&ds));
    }

    #[test]
    fn test_outcome_into_stage_error() {
        let ds = merged(vec![vec![1.into(), "p1".into(), Value::Null, "2024-01-10".into()]]);
        let err = rules().validate(&ds).into_result().unwrap_err();
        assert!(matches!(err, StageError::Validation { ref rule, .. } if rule == NO_MISSING_VALUES));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(
            rules().rule_names(),
            vec![NO_MISSING_VALUES, UNIQUENESS, NO_FUTURE_DATES]
        );
    }
}
