use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::domain::Provider;

/// First login or signup for an identity vouched for by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOpening {
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub provider: Option<Provider>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSelection {
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfileUpdate {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub speciality: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSubmission {
    /// A non-array value reads as no answers at all.
    #[serde(default, deserialize_with = "lenient_answers")]
    pub answers: Vec<RawAnswer>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub no_doctor: bool,
    #[serde(default)]
    pub doctor_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorChoice {
    #[serde(default)]
    pub doctor_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorNoteInput {
    #[serde(default)]
    pub follow_up_id: String,
    #[serde(default)]
    pub note: String,
}

/// Trimmed value, or `None` when blank.
pub(crate) fn non_blank<T: AsRef<str>>(value: Option<T>) -> Option<String> {
    value
        .as_ref()
        .map(|value| value.as_ref().trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// One submitted answer as the client sent it.
///
/// Integer-valued numbers (`4`, `4.0`, `1e30`) and numeric strings (`"4"`)
/// read as integers, saturating at the `i64` bounds, so range checks report
/// them. Everything else is kept verbatim for the validation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAnswer {
    Integer(i64),
    Invalid(String),
}

impl RawAnswer {
    fn from_value(value: Value) -> Self {
        match &value {
            Value::Number(number) => match number.as_i64() {
                Some(integer) => Self::Integer(integer),
                None => Self::from_float(number.as_f64(), &value),
            },
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Self::Integer(0);
                }
                match trimmed.parse::<i64>() {
                    Ok(integer) => Self::Integer(integer),
                    Err(_) => Self::from_float(trimmed.parse::<f64>().ok(), &value),
                }
            }
            _ => Self::Invalid(value.to_string()),
        }
    }

    fn from_float(float: Option<f64>, original: &Value) -> Self {
        match float {
            // `as` saturates at the i64 bounds
            Some(float) if float.is_finite() && float.fract() == 0.0 => {
                Self::Integer(float as i64)
            }
            _ => Self::Invalid(original.to_string()),
        }
    }
}

impl Serialize for RawAnswer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Invalid(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for RawAnswer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

fn lenient_answers<'de, D>(deserializer: D) -> Result<Vec<RawAnswer>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(RawAnswer::from_value).collect(),
        _ => Vec::new(),
    })
}
