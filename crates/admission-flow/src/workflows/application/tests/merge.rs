use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::common::record_with;
use crate::workflows::application::merge::{apply_extraction, should_apply, EnglishTestKind};

fn extracted(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[test]
fn should_apply_requires_empty_current_and_non_empty_extracted() {
    assert!(should_apply(None, &json!("Jane")));
    assert!(should_apply(Some(&Value::Null), &json!("Jane")));
    assert!(should_apply(Some(&json!("  ")), &json!("Jane")));

    assert!(!should_apply(Some(&json!("Jane")), &json!("Jane Q")));
    assert!(!should_apply(None, &Value::Null));
    assert!(!should_apply(None, &json!("")));
}

#[test]
fn merge_never_overwrites_applicant_input() {
    let mut record = record_with(&[("given_name", json!("Jane"))]);
    let report = apply_extraction(
        "personal_details",
        &mut record,
        &extracted(&[
            ("given_name", json!("Jane Q")),
            ("family_name", json!("Doe")),
        ]),
    );

    assert_eq!(record.get("given_name"), Some(&json!("Jane")));
    assert_eq!(record.get("family_name"), Some(&json!("Doe")));
    assert_eq!(report.fields_populated, 1);
    assert_eq!(report.skipped_occupied, 1);
}

#[test]
fn unknown_keys_are_dropped_not_written() {
    let mut record = record_with(&[]);
    let report = apply_extraction(
        "personal_details",
        &mut record,
        &extracted(&[
            ("given_name", json!("Jane")),
            ("mrz_checksum", json!("7f")),
            ("issuing_office", json!("Sydney")),
        ]),
    );

    assert!(!record.contains_key("mrz_checksum"));
    assert!(!record.contains_key("issuing_office"));
    assert_eq!(report.fields_populated, 1);
    assert_eq!(report.dropped_unknown, 2);
}

#[test]
fn sections_without_rules_accept_nothing() {
    let mut record = record_with(&[]);
    let report = apply_extraction(
        "contact_details",
        &mut record,
        &extracted(&[("email", json!("jane@example.com"))]),
    );

    assert!(record.is_empty());
    assert_eq!(report.fields_populated, 0);
    assert_eq!(report.dropped_unknown, 1);
}

#[test]
fn source_candidates_are_tried_in_priority_order() {
    let mut record = record_with(&[]);
    apply_extraction(
        "personal_details",
        &mut record,
        &extracted(&[
            ("dob", json!("01/02/1999")),
            ("birth_date", json!("02/03/1999")),
        ]),
    );

    // `birth_date` outranks `dob` in the candidate list.
    assert_eq!(record.get("date_of_birth"), Some(&json!("1999-03-02")));
}

#[test]
fn gender_codes_normalize_to_labels() {
    let mut record = record_with(&[]);
    apply_extraction(
        "personal_details",
        &mut record,
        &extracted(&[("sex", json!("F"))]),
    );
    assert_eq!(record.get("gender"), Some(&json!("Female")));

    let mut record = record_with(&[]);
    apply_extraction(
        "personal_details",
        &mut record,
        &extracted(&[("gender", json!("1"))]),
    );
    assert_eq!(record.get("gender"), Some(&json!("Male")));
}

#[test]
fn unrecognized_gender_codes_are_not_written() {
    let mut record = record_with(&[]);
    let report = apply_extraction(
        "personal_details",
        &mut record,
        &extracted(&[("gender", json!("Q9"))]),
    );
    assert!(!record.contains_key("gender"));
    assert_eq!(report.fields_populated, 0);
}

#[test]
fn dates_accept_several_formats_and_emit_iso() {
    let mut record = record_with(&[]);
    apply_extraction(
        "personal_details",
        &mut record,
        &extracted(&[
            ("date_of_birth", json!("01/02/1999")),
            ("passport_expiry_date", json!("2031-06-30")),
            ("issue_date", json!("12 Mar 2021")),
        ]),
    );

    assert_eq!(record.get("date_of_birth"), Some(&json!("1999-02-01")));
    assert_eq!(record.get("passport_expiry_date"), Some(&json!("2031-06-30")));
    assert_eq!(record.get("passport_issue_date"), Some(&json!("2021-03-12")));
}

#[test]
fn unparseable_dates_are_skipped() {
    let mut record = record_with(&[]);
    let report = apply_extraction(
        "personal_details",
        &mut record,
        &extracted(&[("date_of_birth", json!("sometime in 1999"))]),
    );
    assert!(!record.contains_key("date_of_birth"));
    assert_eq!(report.fields_populated, 0);
}

#[test]
fn test_types_collapse_to_the_closed_set() {
    assert_eq!(EnglishTestKind::from_raw("IELTS Academic"), EnglishTestKind::Ielts);
    assert_eq!(EnglishTestKind::from_raw("toefl ibt"), EnglishTestKind::ToeflIbt);
    assert_eq!(EnglishTestKind::from_raw("PTE-Academic"), EnglishTestKind::PteAcademic);
    assert_eq!(
        EnglishTestKind::from_raw("Occupational English Test"),
        EnglishTestKind::Other
    );

    let mut record = record_with(&[]);
    apply_extraction(
        "english_proficiency",
        &mut record,
        &extracted(&[
            ("test_name", json!("ielts general training")),
            ("overall", json!(7.5)),
        ]),
    );
    assert_eq!(record.get("test_type"), Some(&json!("IELTS")));
    assert_eq!(record.get("overall_score"), Some(&json!(7.5)));
}

#[test]
fn verbatim_values_are_trimmed() {
    let mut record = record_with(&[]);
    apply_extraction(
        "personal_details",
        &mut record,
        &extracted(&[("passport_number", json!("  P7654321 "))]),
    );
    assert_eq!(record.get("passport_number"), Some(&json!("P7654321")));
}

#[test]
fn empty_extraction_reports_nothing_populated() {
    let mut record = record_with(&[("given_name", json!("Jane"))]);
    let report = apply_extraction("personal_details", &mut record, &extracted(&[]));
    assert_eq!(report.fields_populated, 0);
    assert_eq!(report.skipped_occupied, 0);
    assert_eq!(report.dropped_unknown, 0);
}
