//! Standard concept ids written by the transformers.

pub const GENDER_MALE: i64 = 8507;
pub const GENDER_FEMALE: i64 = 8532;

pub const VISIT_INPATIENT: i64 = 9201;
pub const VISIT_OUTPATIENT: i64 = 9202;
pub const VISIT_EMERGENCY: i64 = 9203;

/// Visit derived from EHR record.
pub const VISIT_TYPE_EHR: i64 = 44818518;
/// EHR.
pub const CONDITION_TYPE_EHR: i64 = 32817;
pub const CONDITION_STATUS_PRIMARY: i64 = 32902;
pub const CONDITION_STATUS_SECONDARY: i64 = 32908;
/// Prescription written.
pub const DRUG_TYPE_PRESCRIPTION: i64 = 38000177;
/// Lab result.
pub const MEASUREMENT_TYPE_LAB: i64 = 44818702;
/// EHR order list entry.
pub const PROCEDURE_TYPE_EHR: i64 = 38000275;
/// Period covering healthcare encounters.
pub const PERIOD_TYPE_EHR: i64 = 44814724;

pub const OPERATOR_LT: i64 = 4171756;
pub const OPERATOR_LE: i64 = 4171754;
pub const OPERATOR_EQ: i64 = 4172703;
pub const OPERATOR_GE: i64 = 4171755;
pub const OPERATOR_GT: i64 = 4172704;

/// Maps a source sex code to a gender concept; unknown values map to 0.
pub fn gender_concept(value: &str) -> i64 {
    match value.trim().to_ascii_uppercase().as_str() {
        "M" | "MALE" => GENDER_MALE,
        "F" | "FEMALE" => GENDER_FEMALE,
        _ => 0,
    }
}

/// Maps a patient class (`I`npatient, `O`utpatient, `E`mergency) to a
/// visit concept; anything else maps to 0.
pub fn visit_concept(patient_class: &str) -> i64 {
    match patient_class.trim().to_ascii_uppercase().as_str() {
        "I" => VISIT_INPATIENT,
        "O" => VISIT_OUTPATIENT,
        "E" => VISIT_EMERGENCY,
        _ => 0,
    }
}

/// Splits a leading comparison operator off a result value.
///
/// Returns the operator concept and the remaining text.
pub fn split_operator(value: &str) -> (Option<i64>, &str) {
    let trimmed = value.trim();
    for (prefix, concept) in [
        ("<=", OPERATOR_LE),
        (">=", OPERATOR_GE),
        ("<", OPERATOR_LT),
        (">", OPERATOR_GT),
        ("=", OPERATOR_EQ),
    ] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return (Some(concept), rest.trim());
        }
    }
    (None, trimmed)
}

/// Diagnosis status codes that mark a primary diagnosis.
pub fn condition_status_concept(value: &str) -> Option<i64> {
    match value.trim().to_ascii_uppercase().as_str() {
        "" => None,
        "1" | "P" | "Y" | "PRIMARY" | "MAIN" => Some(CONDITION_STATUS_PRIMARY),
        _ => Some(CONDITION_STATUS_SECONDARY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_classes() {
        assert_eq!(visit_concept("I"), VISIT_INPATIENT);
        assert_eq!(visit_concept(" o "), VISIT_OUTPATIENT);
        assert_eq!(visit_concept("E"), VISIT_EMERGENCY);
        assert_eq!(visit_concept("H"), 0);
    }

    #[test]
    fn operators_prefer_two_character_forms() {
        assert_eq!(split_operator("<=5.2"), (Some(OPERATOR_LE), "5.2"));
        assert_eq!(split_operator("> 100"), (Some(OPERATOR_GT), "100"));
        assert_eq!(split_operator("7"), (None, "7"));
    }

    #[test]
    fn gender_codes() {
        assert_eq!(gender_concept("m"), GENDER_MALE);
        assert_eq!(gender_concept("F"), GENDER_FEMALE);
        assert_eq!(gender_concept("U"), 0);
    }
}
