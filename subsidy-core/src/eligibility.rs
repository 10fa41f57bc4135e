//! Eligibility evaluation.
//!
//! A pure function of (eligibility rules, farm). Reasons come back in a fixed
//! order: size, state, district, crop, documents. An empty list means eligible.

use serde::{Deserialize, Serialize};

use crate::types::{Eligibility, Farm};

/// Why a farm does not satisfy a program's eligibility rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum IneligibilityReason {
    /// Farm is smaller than the minimum size
    FarmTooSmall { size: f64, min: f64 },
    /// Farm is larger than the maximum size
    FarmTooLarge { size: f64, max: f64 },
    /// Farm size is not a usable number
    InvalidFarmSize { size: f64 },
    /// Farm state is not in the allowed list
    StateNotAllowed { state: String, allowed: Vec<String> },
    /// Farm district is not in the allowed list
    DistrictNotAllowed { district: String, allowed: Vec<String> },
    /// None of the farm's crops are covered
    CropNotCovered { crops: Vec<String>, allowed: Vec<String> },
    /// Required land documents are missing
    MissingDocuments { missing: Vec<String> },
    /// The farmer has no verified farm to evaluate
    NoVerifiedFarm,
}

impl std::fmt::Display for IneligibilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FarmTooSmall { size, min } => {
                write!(f, "Farm size {size} is below the minimum of {min}")
            }
            Self::FarmTooLarge { size, max } => {
                write!(f, "Farm size {size} exceeds the maximum of {max}")
            }
            Self::InvalidFarmSize { size } => {
                write!(f, "Farm size {size} is not a valid area")
            }
            Self::StateNotAllowed { state, allowed } => write!(
                f,
                "Farm state '{state}' is not eligible (allowed: {})",
                allowed.join(", ")
            ),
            Self::DistrictNotAllowed { district, allowed } => write!(
                f,
                "Farm district '{district}' is not eligible (allowed: {})",
                allowed.join(", ")
            ),
            Self::CropNotCovered { allowed, .. } => write!(
                f,
                "Farm grows none of the eligible crops ({})",
                allowed.join(", ")
            ),
            Self::MissingDocuments { missing } => {
                write!(f, "Missing land documents: {}", missing.join(", "))
            }
            Self::NoVerifiedFarm => write!(f, "Farmer has no verified farm"),
        }
    }
}

/// Evaluates farms against eligibility rules.
pub struct EligibilityEvaluator;

impl EligibilityEvaluator {
    /// Evaluate a farm. Returns every unmet requirement.
    pub fn evaluate(eligibility: &Eligibility, farm: &Farm) -> Vec<IneligibilityReason> {
        let mut reasons = Vec::new();

        let size_bounded = eligibility.min_farm_size.is_some() || eligibility.max_farm_size.is_some();
        if size_bounded && (!farm.size.is_finite() || farm.size < 0.0) {
            // NaN compares false against both bounds.
            reasons.push(IneligibilityReason::InvalidFarmSize { size: farm.size });
        } else {
            if let Some(min) = eligibility.min_farm_size {
                if farm.size < min {
                    reasons.push(IneligibilityReason::FarmTooSmall { size: farm.size, min });
                }
            }
            if let Some(max) = eligibility.max_farm_size {
                if farm.size > max {
                    reasons.push(IneligibilityReason::FarmTooLarge { size: farm.size, max });
                }
            }
        }

        if !eligibility.states.is_empty() && !location_matches(&farm.state, &eligibility.states) {
            reasons.push(IneligibilityReason::StateNotAllowed {
                state: farm.state.clone(),
                allowed: eligibility.states.clone(),
            });
        }

        if !eligibility.districts.is_empty()
            && !location_matches(&farm.district, &eligibility.districts)
        {
            reasons.push(IneligibilityReason::DistrictNotAllowed {
                district: farm.district.clone(),
                allowed: eligibility.districts.clone(),
            });
        }

        if !eligibility.crop_types.is_empty() {
            let grows_covered_crop = farm
                .crop_categories
                .iter()
                .any(|crop| contains_normalized(&eligibility.crop_types, crop));
            if !grows_covered_crop {
                reasons.push(IneligibilityReason::CropNotCovered {
                    crops: farm.crop_categories.clone(),
                    allowed: eligibility.crop_types.clone(),
                });
            }
        }

        if !eligibility.land_document_types.is_empty() {
            let mut missing: Vec<String> = Vec::new();
            for required in &eligibility.land_document_types {
                if !contains_normalized(&farm.land_document_types, required)
                    && !contains_normalized(&missing, required)
                {
                    missing.push(required.clone());
                }
            }
            if !missing.is_empty() {
                reasons.push(IneligibilityReason::MissingDocuments { missing });
            }
        }

        reasons
    }

    /// Convenience: whether the farm satisfies every rule.
    pub fn is_eligible(eligibility: &Eligibility, farm: &Farm) -> bool {
        Self::evaluate(eligibility, farm).is_empty()
    }
}

/// Lowercase and drop everything that is not alphanumeric.
fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn contains_normalized(haystack: &[String], needle: &str) -> bool {
    let needle = normalize(needle);
    !needle.is_empty() && haystack.iter().any(|item| normalize(item) == needle)
}

/// Exact normalized match first, then substring either way ("Selangor" vs "SELANGOR, MY").
fn location_matches(actual: &str, allowed: &[String]) -> bool {
    let actual = normalize(actual);
    if actual.is_empty() {
        return false;
    }

    let allowed: Vec<String> = allowed
        .iter()
        .map(|a| normalize(a))
        .filter(|a| !a.is_empty())
        .collect();

    if allowed.iter().any(|a| *a == actual) {
        return true;
    }
    allowed
        .iter()
        .any(|a| a.contains(actual.as_str()) || actual.contains(a.as_str()))
}
