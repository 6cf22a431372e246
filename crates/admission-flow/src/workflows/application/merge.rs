use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde_json::Value;

use super::domain::{is_empty_value, SectionRecord};

/// Auto-fill decision: apply an extracted value only when the applicant left
/// the field empty and the extraction produced something. Strictly additive,
/// never overwriting.
pub fn should_apply(current: Option<&Value>, extracted: &Value) -> bool {
    let occupied = current.map(|value| !is_empty_value(value)).unwrap_or(false);
    !occupied && !is_empty_value(extracted)
}

/// Outcome counters for one merge pass. `fields_populated` distinguishes
/// "nothing new to extract" from "the applicant already filled everything"
/// via the companion `skipped_occupied` count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub fields_populated: usize,
    pub skipped_occupied: usize,
    pub dropped_unknown: usize,
}

/// Canonicalization applied to a raw extracted value before merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Normalizer {
    Verbatim,
    GenderLabel,
    EnglishTestKind,
    IsoDate,
}

/// One known field of an extractable section: the target key, the candidate
/// source keys in priority order, and how the raw value is canonicalized.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldRule {
    pub target: &'static str,
    pub sources: &'static [&'static str],
    pub normalizer: Normalizer,
}

const PERSONAL_DETAILS_RULES: &[FieldRule] = &[
    FieldRule {
        target: "given_name",
        sources: &["given_name", "first_name", "given_names"],
        normalizer: Normalizer::Verbatim,
    },
    FieldRule {
        target: "family_name",
        sources: &["family_name", "surname", "last_name"],
        normalizer: Normalizer::Verbatim,
    },
    FieldRule {
        target: "gender",
        sources: &["gender", "sex"],
        normalizer: Normalizer::GenderLabel,
    },
    FieldRule {
        target: "date_of_birth",
        sources: &["date_of_birth", "birth_date", "dob"],
        normalizer: Normalizer::IsoDate,
    },
    FieldRule {
        target: "nationality",
        sources: &["nationality", "country_of_citizenship"],
        normalizer: Normalizer::Verbatim,
    },
    FieldRule {
        target: "passport_number",
        sources: &["passport_number", "document_number"],
        normalizer: Normalizer::Verbatim,
    },
    FieldRule {
        target: "passport_issue_date",
        sources: &["passport_issue_date", "issue_date", "date_of_issue"],
        normalizer: Normalizer::IsoDate,
    },
    FieldRule {
        target: "passport_expiry_date",
        sources: &["passport_expiry_date", "expiry_date", "date_of_expiry"],
        normalizer: Normalizer::IsoDate,
    },
];

const ENGLISH_PROFICIENCY_RULES: &[FieldRule] = &[
    FieldRule {
        target: "test_type",
        sources: &["test_type", "test_name"],
        normalizer: Normalizer::EnglishTestKind,
    },
    FieldRule {
        target: "test_date",
        sources: &["test_date", "exam_date", "date_of_test"],
        normalizer: Normalizer::IsoDate,
    },
    FieldRule {
        target: "certificate_number",
        sources: &["certificate_number", "report_number", "trf_number"],
        normalizer: Normalizer::Verbatim,
    },
    FieldRule {
        target: "overall_score",
        sources: &["overall_score", "overall", "total_score"],
        normalizer: Normalizer::Verbatim,
    },
    FieldRule {
        target: "listening_score",
        sources: &["listening_score", "listening"],
        normalizer: Normalizer::Verbatim,
    },
    FieldRule {
        target: "reading_score",
        sources: &["reading_score", "reading"],
        normalizer: Normalizer::Verbatim,
    },
    FieldRule {
        target: "writing_score",
        sources: &["writing_score", "writing"],
        normalizer: Normalizer::Verbatim,
    },
    FieldRule {
        target: "speaking_score",
        sources: &["speaking_score", "speaking"],
        normalizer: Normalizer::Verbatim,
    },
];

/// Allow-list of mergeable fields per section key. Sections without an entry
/// accept nothing from extraction.
pub(crate) fn section_rules(section_key: &str) -> &'static [FieldRule] {
    match section_key {
        "personal_details" => PERSONAL_DETAILS_RULES,
        "english_proficiency" => ENGLISH_PROFICIENCY_RULES,
        _ => &[],
    }
}

/// Closed set of recognized English test types, with `Other` as fallback
/// for free-text values the recognizer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnglishTestKind {
    Ielts,
    ToeflIbt,
    PteAcademic,
    Duolingo,
    Cambridge,
    Other,
}

impl EnglishTestKind {
    pub fn from_raw(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.contains("ielts") {
            EnglishTestKind::Ielts
        } else if normalized.contains("toefl") {
            EnglishTestKind::ToeflIbt
        } else if normalized.contains("pte") {
            EnglishTestKind::PteAcademic
        } else if normalized.contains("duolingo") {
            EnglishTestKind::Duolingo
        } else if normalized.contains("cambridge") || normalized.contains("c1 advanced") {
            EnglishTestKind::Cambridge
        } else {
            EnglishTestKind::Other
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EnglishTestKind::Ielts => "IELTS",
            EnglishTestKind::ToeflIbt => "TOEFL iBT",
            EnglishTestKind::PteAcademic => "PTE Academic",
            EnglishTestKind::Duolingo => "Duolingo English Test",
            EnglishTestKind::Cambridge => "Cambridge English",
            EnglishTestKind::Other => "Other",
        }
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d %b %Y", "%d %B %Y"];

fn normalize_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn normalize_gender(raw: &str) -> Option<String> {
    let label = match raw.trim().to_ascii_lowercase().as_str() {
        "m" | "male" | "1" => "Male",
        "f" | "female" | "2" => "Female",
        "x" | "other" | "unspecified" | "3" => "Other",
        _ => return None,
    };
    Some(label.to_string())
}

fn value_as_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(text) => Some(text),
        _ => None,
    }
}

/// Canonicalize a raw extracted value. `None` means the value could not be
/// normalized and must not be written.
pub(crate) fn normalize(normalizer: Normalizer, raw: &Value) -> Option<Value> {
    match normalizer {
        Normalizer::Verbatim => match raw {
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Value::String(trimmed.to_string()))
                }
            }
            other if !is_empty_value(other) => Some(other.clone()),
            _ => None,
        },
        Normalizer::GenderLabel => value_as_text(raw)
            .and_then(normalize_gender)
            .map(Value::String),
        Normalizer::EnglishTestKind => value_as_text(raw)
            .filter(|text| !text.trim().is_empty())
            .map(|text| Value::String(EnglishTestKind::from_raw(text).label().to_string())),
        Normalizer::IsoDate => value_as_text(raw).and_then(normalize_date).map(Value::String),
    }
}

/// Merge extracted fields into a section record under the additive policy.
///
/// Unknown keys are dropped rather than written, occupied targets are left
/// untouched, and every accepted value passes through its normalizer first.
pub fn apply_extraction(
    section_key: &str,
    record: &mut SectionRecord,
    extracted: &BTreeMap<String, Value>,
) -> MergeReport {
    let mut report = MergeReport::default();
    let mut consumed: BTreeSet<&str> = BTreeSet::new();

    for rule in section_rules(section_key) {
        let candidate = rule.sources.iter().find_map(|source| {
            extracted
                .get(*source)
                .filter(|value| !is_empty_value(value))
                .map(|value| (*source, value))
        });

        let Some((source, raw)) = candidate else {
            continue;
        };
        consumed.extend(rule.sources.iter().copied());

        let Some(normalized) = normalize(rule.normalizer, raw) else {
            tracing::debug!(
                section = section_key,
                field = rule.target,
                source,
                "extracted value did not normalize; skipping"
            );
            continue;
        };

        if should_apply(record.get(rule.target), &normalized) {
            record.insert(rule.target.to_string(), normalized);
            report.fields_populated += 1;
        } else {
            report.skipped_occupied += 1;
        }
    }

    report.dropped_unknown = extracted
        .keys()
        .filter(|key| !consumed.contains(key.as_str()))
        .count();

    report
}
