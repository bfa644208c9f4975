use super::models::{ParamValue, UserProfile};

/// Payload keys whose text greets the user by first name.
const FIRST_NAME_KEYS: &[&str] = &[
    "CLOSE_MH_SELF",
    "CLOSE_MH_PROBLEMS",
    "CLOSE_RELATIONSHIPS",
    "CLOSE_GROWING_UP",
    "CLOSE_PUBERTY",
    "CLOSE",
    "CLOSE_STI",
    "CLOSE_PERIOD",
    "CLOSE_PILLS",
    "CLOSE_DMPA",
    "CLOSE_IUD",
    "CLOSE_IMPLANT",
    "CLOSE_CONDOM",
    "CLOSE_PREGNANCY",
    "BC_QUIZ",
];

/// Payload keys answering the gender question.
const GENDER_ADDRESS_KEYS: &[&str] = &[
    "GENDER_MALE",
    "GENDER_FEMALE",
    "GENDER_NONBINARY",
    "GENDER_TRANSGENDER",
    "GENDER_NONE",
];

const AGE_RANGE_KEYS: &[&str] = &["GU_P_REGULAR", "GU_P_REGULAR_19", "GU_P_REGULAR_20", "GU_P_REGULAR_30"];

/// Payload keys that announce the recommended contraceptive method.
const METHOD_LABEL_KEYS: &[&str] = &["Q_FAMILY_PLANNING_NO", "Q_FAMILY_PLANNING_NO_EXTENDED"];

const GENDER_ADDRESS: &[(&str, &str)] = &[
    ("male", "pre"),
    ("female", "sis"),
    ("nonbinary", "lods"),
    ("transgender", "beshie"),
];
const DEFAULT_ADDRESS: &str = "friend";

const PROGESTIN_STATUS: &str = "PROGESTIN";
const PROGESTIN_LABEL: &str = "PROGESTIN-ONLY PILLS";
const PILLS_LABEL: &str = "PILLS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamGroup {
    FirstName,
    GenderAddress,
    AgeRange,
    MethodLabel,
}

fn group_of(payload: &str) -> Option<ParamGroup> {
    let groups = [
        (FIRST_NAME_KEYS, ParamGroup::FirstName),
        (GENDER_ADDRESS_KEYS, ParamGroup::GenderAddress),
        (AGE_RANGE_KEYS, ParamGroup::AgeRange),
        (METHOD_LABEL_KEYS, ParamGroup::MethodLabel),
    ];
    groups
        .iter()
        .find(|(keys, _)| keys.contains(&payload))
        .map(|(_, group)| *group)
}

/// Form of address for a gender value; unknown or missing values get the
/// neutral default.
pub fn gender_address(gender: Option<&str>) -> &'static str {
    gender
        .and_then(|g| GENDER_ADDRESS.iter().find(|(key, _)| *key == g))
        .map(|(_, address)| *address)
        .unwrap_or(DEFAULT_ADDRESS)
}

pub fn method_label(pill_status: Option<&str>) -> &'static str {
    if pill_status == Some(PROGESTIN_STATUS) {
        PROGESTIN_LABEL
    } else {
        PILLS_LABEL
    }
}

/// Stored age as a number when it is one, otherwise the bracket label.
fn age_parameter(age_range: Option<&str>) -> ParamValue {
    let age = age_range.unwrap_or_default().trim();
    match age.parse::<i64>() {
        Ok(years) => ParamValue::from(years),
        Err(_) => age.into(),
    }
}

/// Substitution values for the dialogue authored under `payload`, in
/// placeholder order. Keys outside the table need none.
pub fn compose_parameters(payload: &str, profile: &UserProfile) -> Vec<ParamValue> {
    match group_of(payload) {
        Some(ParamGroup::FirstName) => vec![profile.first_name.as_str().into()],
        Some(ParamGroup::GenderAddress) => vec![gender_address(profile.gender.as_deref()).into()],
        Some(ParamGroup::AgeRange) => vec![age_parameter(profile.age_range.as_deref())],
        Some(ParamGroup::MethodLabel) => vec![method_label(profile.pill_status.as_deref()).into()],
        None => Vec::new(),
    }
}
