use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

use crate::errors::AppError;

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 100;
pub const AGE_MIN: u32 = 1;
pub const AGE_MAX: u32 = 120;
pub const DEFAULT_LIMIT: i64 = 10;

// ============ Attributes ============

/// Gender vocabulary shared by stored records and the gender source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(format!("unknown gender '{}'", other)),
        }
    }
}

/// The three attributes filled in by enrichment sources.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Age,
    Gender,
    Nationality,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [Attribute::Age, Attribute::Gender, Attribute::Nationality];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Age => "age",
            Attribute::Gender => "gender",
            Attribute::Nationality => "nationality",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true for an ISO 3166-1 alpha-2 shaped code (two ASCII letters).
pub fn is_country_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}

// ============ Person Records ============

/// A stored person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Person {
    pub id: i32,
    pub name: String,
    pub surname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patronymic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a person or fully replacing one.
///
/// Gender, age and nationality are optional; whatever the caller leaves
/// empty is filled from enrichment sources before the record is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewPerson {
    pub name: String,
    pub surname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patronymic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
}

impl NewPerson {
    /// Validates caller-supplied fields.
    ///
    /// Enrichable fields are validated only when present; an age of zero or
    /// a blank nationality counts as "not supplied".
    pub fn validate(&self) -> Result<(), AppError> {
        validate_name("name", &self.name)?;
        validate_name("surname", &self.surname)?;
        if let Some(ref patronymic) = self.patronymic {
            validate_max_len("patronymic", patronymic)?;
        }
        if let Some(age) = self.age.filter(|a| *a != 0) {
            validate_age(age)?;
        }
        if let Some(ref nationality) = self.nationality {
            if !nationality.trim().is_empty() {
                validate_nationality(nationality)?;
            }
        }
        Ok(())
    }
}

/// Payload for a partial update; only provided fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UpdatePersonRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patronymic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
}

impl UpdatePersonRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(ref name) = self.name {
            validate_name("name", name)?;
        }
        if let Some(ref surname) = self.surname {
            validate_name("surname", surname)?;
        }
        if let Some(ref patronymic) = self.patronymic {
            validate_max_len("patronymic", patronymic)?;
        }
        if let Some(age) = self.age {
            validate_age(age)?;
        }
        if let Some(ref nationality) = self.nationality {
            validate_nationality(nationality)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.surname.is_none()
            && self.patronymic.is_none()
            && self.gender.is_none()
            && self.age.is_none()
            && self.nationality.is_none()
    }
}

fn validate_name(field: &str, value: &str) -> Result<(), AppError> {
    let len = value.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(AppError::BadRequest(format!(
            "{} must be between {} and {} characters",
            field, NAME_MIN_LEN, NAME_MAX_LEN
        )));
    }
    Ok(())
}

fn validate_max_len(field: &str, value: &str) -> Result<(), AppError> {
    if value.chars().count() > NAME_MAX_LEN {
        return Err(AppError::BadRequest(format!(
            "{} must be at most {} characters",
            field, NAME_MAX_LEN
        )));
    }
    Ok(())
}

fn validate_age(age: u32) -> Result<(), AppError> {
    if !(AGE_MIN..=AGE_MAX).contains(&age) {
        return Err(AppError::BadRequest(format!(
            "age must be between {} and {}",
            AGE_MIN, AGE_MAX
        )));
    }
    Ok(())
}

fn validate_nationality(nationality: &str) -> Result<(), AppError> {
    if !is_country_code(nationality) {
        return Err(AppError::BadRequest(
            "nationality must be a two-letter country code".to_string(),
        ));
    }
    Ok(())
}

/// Response for create/replace: the stored person plus the attributes
/// enrichment could not determine.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PersonResponse {
    #[serde(flatten)]
    pub person: Person,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_attributes: Vec<Attribute>,
}

// ============ Listing ============

/// Query string accepted by `GET /api/v1/people`.
///
/// Numeric parameters are kept as strings so that malformed values fall back
/// to defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PersonQuery {
    /// Substring match on name (case-insensitive).
    pub name: Option<String>,
    /// Substring match on surname (case-insensitive).
    pub surname: Option<String>,
    /// Exact gender.
    pub gender: Option<String>,
    /// Minimum age (inclusive).
    pub age_from: Option<String>,
    /// Maximum age (inclusive).
    pub age_to: Option<String>,
    /// Exact nationality code.
    pub nationality: Option<String>,
    /// Page size, default 10.
    pub limit: Option<String>,
    /// Rows to skip, default 0.
    pub offset: Option<String>,
}

/// Parsed listing filter; `None` fields are not constrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonFilter {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub gender: Option<String>,
    pub age_from: Option<i32>,
    pub age_to: Option<i32>,
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PersonQuery {
    pub fn into_parts(self) -> (PersonFilter, Pagination) {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        let filter = PersonFilter {
            name: non_empty(self.name),
            surname: non_empty(self.surname),
            gender: non_empty(self.gender),
            age_from: self.age_from.and_then(|v| v.parse().ok()),
            age_to: self.age_to.and_then(|v| v.parse().ok()),
            nationality: non_empty(self.nationality),
        };

        let limit = self
            .limit
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|l| *l >= 1)
            .unwrap_or(DEFAULT_LIMIT);
        let offset = self
            .offset
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|o| *o >= 0)
            .unwrap_or(0);

        (filter, Pagination { limit, offset })
    }
}

// ============ Errors ============

/// Standard error body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_person() -> NewPerson {
        NewPerson {
            name: "Dmitriy".to_string(),
            surname: "Ushakov".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_person_minimal_is_valid() {
        assert!(new_person().validate().is_ok());
    }

    #[test]
    fn test_new_person_rejects_short_name() {
        let person = NewPerson {
            name: "D".to_string(),
            ..new_person()
        };
        assert!(matches!(person.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_new_person_treats_zero_age_as_unset() {
        let person = NewPerson {
            age: Some(0),
            nationality: Some(String::new()),
            ..new_person()
        };
        assert!(person.validate().is_ok());
    }

    #[test]
    fn test_new_person_rejects_bad_enrichable_fields() {
        let too_old = NewPerson {
            age: Some(121),
            ..new_person()
        };
        assert!(too_old.validate().is_err());

        let bad_code = NewPerson {
            nationality: Some("RUS".to_string()),
            ..new_person()
        };
        assert!(bad_code.validate().is_err());
    }

    #[test]
    fn test_update_request_validation() {
        assert!(UpdatePersonRequest::default().validate().is_ok());
        assert!(UpdatePersonRequest::default().is_empty());

        let req = UpdatePersonRequest {
            age: Some(0),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_gender_deserializes_lowercase() {
        let person: NewPerson = serde_json::from_value(serde_json::json!({
            "name": "Anna",
            "surname": "Petrova",
            "gender": "female"
        }))
        .unwrap();
        assert_eq!(person.gender, Some(Gender::Female));
        assert!("Female".parse::<Gender>().is_err());
    }

    #[test]
    fn test_query_defaults_on_malformed_numbers() {
        let query = PersonQuery {
            name: Some(String::new()),
            age_from: Some("abc".to_string()),
            age_to: Some("40".to_string()),
            limit: Some("0".to_string()),
            offset: Some("-5".to_string()),
            ..Default::default()
        };

        let (filter, page) = query.into_parts();
        assert_eq!(filter.name, None);
        assert_eq!(filter.age_from, None);
        assert_eq!(filter.age_to, Some(40));
        assert_eq!(page, Pagination::default());
    }

    #[test]
    fn test_person_response_flattens_person() {
        let now = Utc::now();
        let response = PersonResponse {
            person: Person {
                id: 1,
                name: "Anna".to_string(),
                surname: "Petrova".to_string(),
                patronymic: None,
                gender: Some(Gender::Female),
                age: None,
                nationality: Some("RU".to_string()),
                created_at: now,
                updated_at: now,
            },
            missing_attributes: vec![Attribute::Age],
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["gender"], "female");
        assert_eq!(value["missing_attributes"], serde_json::json!(["age"]));
        assert!(value.get("age").is_none());
    }
}
