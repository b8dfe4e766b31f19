//! Request validators
//!
//! Shape checks a request layer runs before handing work to the engine.
//! The engine itself accepts any input and degrades to a no-recommendation
//! result; these validators are where malformed requests get rejected.

use std::collections::HashSet;

use recommender_types::{Preference, Task, UserPreferences};

use crate::error::{EngineError, Result};

/// Maximum task description length, in characters
pub const MAX_TASK_NAME_CHARS: usize = 500;

/// Maximum number of tasks in one batch
pub const MAX_BATCH_TASKS: usize = 50;

/// Validate that a string is not empty after trimming
pub fn not_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(EngineError::validation(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

/// Validate that a string does not exceed a maximum character count
pub fn max_chars(field: &str, value: &str, max: usize) -> Result<()> {
    let count = value.chars().count();
    if count > max {
        Err(EngineError::validation(format!(
            "{} length ({}) exceeds maximum length ({})",
            field, count, max
        )))
    } else {
        Ok(())
    }
}

pub fn validate_task(task: &Task) -> Result<()> {
    not_blank("task id", &task.id)?;
    not_blank("task name", &task.name)?;
    max_chars("task name", &task.name, MAX_TASK_NAME_CHARS)
}

pub fn validate_preferences(preferences: &UserPreferences) -> Result<()> {
    if let Preference::Set(range) = &preferences.budget_range {
        if !range.is_well_formed() {
            return Err(EngineError::validation(format!(
                "budget range {}..{} must be non-negative and ordered",
                range.min_monthly_usd, range.max_monthly_usd
            )));
        }
    }

    if let Preference::Set(categories) = &preferences.categories {
        for category in categories {
            not_blank("category", category)?;
        }
    }

    Ok(())
}

/// Validate a whole batch: size limits, every task, unique ids and preferences
pub fn validate_batch(tasks: &[Task], preferences: Option<&UserPreferences>) -> Result<()> {
    if tasks.is_empty() {
        return Err(EngineError::validation("batch must contain at least one task"));
    }
    if tasks.len() > MAX_BATCH_TASKS {
        return Err(EngineError::validation(format!(
            "batch size ({}) exceeds maximum ({})",
            tasks.len(),
            MAX_BATCH_TASKS
        )));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        validate_task(task)?;
        if !seen.insert(task.id.as_str()) {
            return Err(EngineError::validation(format!("duplicate task id: {}", task.id)));
        }
    }

    match preferences {
        Some(preferences) => validate_preferences(preferences),
        None => Ok(()),
    }
}
