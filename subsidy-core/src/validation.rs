//! Input validation for program definitions and patches.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::DomainError;
use crate::types::{Eligibility, PayoutRule, Program, ProgramDefinition, ProgramPatch};

/// Validate a new program definition.
pub fn validate_definition(definition: &ProgramDefinition) -> Result<(), DomainError> {
    validate_name(&definition.name)?;
    validate_dates(definition.start_date, definition.end_date)?;
    if definition.creator_id.trim().is_empty() {
        return Err(DomainError::Validation("creator_id is required".to_string()));
    }
    if let Some(eligibility) = &definition.eligibility {
        validate_eligibility(eligibility)?;
    }
    if let Some(rule) = &definition.payout_rule {
        validate_payout_rule(rule)?;
    }
    Ok(())
}

/// Apply a patch to a copy of the program and validate the result.
pub fn apply_patch(program: &Program, patch: ProgramPatch) -> Result<Program, DomainError> {
    let mut updated = program.clone();

    if let Some(name) = patch.name {
        validate_name(&name)?;
        updated.name = name;
    }
    if let Some(description) = patch.description {
        updated.description = description;
    }
    if let Some(program_type) = patch.program_type {
        updated.program_type = program_type;
    }
    if let Some(start) = patch.start_date {
        updated.start_date = start;
    }
    if let Some(end) = patch.end_date {
        updated.end_date = end;
    }
    validate_dates(updated.start_date, updated.end_date)?;

    if let Some(eligibility) = patch.eligibility {
        validate_eligibility(&eligibility)?;
        updated.eligibility = Some(eligibility);
    }
    if let Some(rule) = patch.payout_rule {
        validate_payout_rule(&rule)?;
        updated.payout_rule = Some(rule);
    }

    updated.updated_at = Utc::now();
    Ok(updated)
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::Validation("name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_dates(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), DomainError> {
    if start >= end {
        return Err(DomainError::Validation(format!(
            "start date {start} must be before end date {end}"
        )));
    }
    Ok(())
}

pub fn validate_eligibility(eligibility: &Eligibility) -> Result<(), DomainError> {
    for (label, bound) in [
        ("min_farm_size", eligibility.min_farm_size),
        ("max_farm_size", eligibility.max_farm_size),
    ] {
        if let Some(value) = bound {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::Validation(format!(
                    "{label} must be a non-negative number"
                )));
            }
        }
    }

    if let (Some(min), Some(max)) = (eligibility.min_farm_size, eligibility.max_farm_size) {
        if min > max {
            return Err(DomainError::Validation(format!(
                "min_farm_size {min} exceeds max_farm_size {max}"
            )));
        }
    }
    Ok(())
}

pub fn validate_payout_rule(rule: &PayoutRule) -> Result<(), DomainError> {
    if rule.max_cap <= Decimal::ZERO {
        return Err(DomainError::Validation("max_cap must be positive".to_string()));
    }
    if let Some(amount) = rule.per_claim_amount {
        if amount <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "per_claim_amount must be positive".to_string(),
            ));
        }
        if amount > rule.max_cap {
            return Err(DomainError::Validation(format!(
                "per_claim_amount {amount} exceeds max_cap {}",
                rule.max_cap
            )));
        }
    }
    Ok(())
}

/// Claim amounts must be strictly positive.
pub fn validate_claim_amount(amount: Decimal) -> Result<(), DomainError> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::Validation(format!(
            "claim amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
