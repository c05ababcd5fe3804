//! Validation gate for the merged dataset.
//!
//! Rules run in declaration order and stop at the first failure. A failed
//! outcome becomes a non-retryable stage error, which halts the run before
//! anything is persisted.

mod rules;

pub use rules::{
    no_future_dates, no_missing_values, unique_columns, Clock, RuleSet, ValidationOutcome,
    ValidationRule, NO_FUTURE_DATES, NO_MISSING_VALUES, UNIQUENESS,
};
