//! Attribute fetchers: one per enrichment source.
//!
//! Each fetcher knows its source's response shape and turns the typed body
//! into a validated attribute value. A fetcher without an endpoint fails with
//! [`FetchError::NotConfigured`] and never touches the network.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::lookup_client::{FetchError, LookupClient};
use crate::models::{is_country_code, Gender, AGE_MAX, AGE_MIN};

/// A lookup client bound to one optional endpoint.
#[derive(Clone)]
struct Source {
    client: LookupClient,
    endpoint: Option<Url>,
}

impl Source {
    async fn lookup<T: DeserializeOwned>(&self, name: &str) -> Result<T, FetchError> {
        let endpoint = self.endpoint.as_ref().ok_or(FetchError::NotConfigured)?;
        self.client.fetch(endpoint, name).await
    }
}

// ============ Age ============

/// `{"age": 35}`
#[derive(Debug, Deserialize)]
struct AgeBody {
    age: f64,
}

/// Fetches an estimated age from an agify-style source.
#[derive(Clone)]
pub struct AgeFetcher {
    source: Source,
}

impl AgeFetcher {
    pub fn new(client: LookupClient, endpoint: Option<Url>) -> Self {
        Self {
            source: Source { client, endpoint },
        }
    }

    pub fn is_configured(&self) -> bool {
        self.source.endpoint.is_some()
    }

    /// Returns the age truncated to a whole number of years. Ages outside
    /// the range accepted from callers are a schema failure.
    pub async fn fetch(&self, name: &str) -> Result<u32, FetchError> {
        let body: AgeBody = self.source.lookup(name).await?;
        age_from_number(body.age)
    }
}

fn age_from_number(age: f64) -> Result<u32, FetchError> {
    let years = age.trunc();
    if !years.is_finite() || years < f64::from(AGE_MIN) || years > f64::from(AGE_MAX) {
        return Err(FetchError::Schema(format!("age out of range: {}", age)));
    }
    Ok(years as u32)
}

// ============ Gender ============

/// `{"gender": "female"}`
#[derive(Debug, Deserialize)]
struct GenderBody {
    gender: String,
}

/// Fetches a gender from a genderize-style source.
#[derive(Clone)]
pub struct GenderFetcher {
    source: Source,
}

impl GenderFetcher {
    pub fn new(client: LookupClient, endpoint: Option<Url>) -> Self {
        Self {
            source: Source { client, endpoint },
        }
    }

    pub fn is_configured(&self) -> bool {
        self.source.endpoint.is_some()
    }

    pub async fn fetch(&self, name: &str) -> Result<Gender, FetchError> {
        let body: GenderBody = self.source.lookup(name).await?;
        body.gender.parse().map_err(FetchError::Schema)
    }
}

// ============ Nationality ============

/// `{"country": [{"country_id": "RU", ...}, ...]}`
#[derive(Debug, Deserialize)]
struct NationalityBody {
    country: Vec<CountryEntry>,
}

#[derive(Debug, Deserialize)]
struct CountryEntry {
    country_id: String,
}

/// Fetches the most likely nationality from a nationalize-style source.
#[derive(Clone)]
pub struct NationalityFetcher {
    source: Source,
}

impl NationalityFetcher {
    pub fn new(client: LookupClient, endpoint: Option<Url>) -> Self {
        Self {
            source: Source { client, endpoint },
        }
    }

    pub fn is_configured(&self) -> bool {
        self.source.endpoint.is_some()
    }

    /// Returns the `country_id` of the first (most probable) country.
    pub async fn fetch(&self, name: &str) -> Result<String, FetchError> {
        let body: NationalityBody = self.source.lookup(name).await?;
        nationality_from_body(body)
    }
}

fn nationality_from_body(body: NationalityBody) -> Result<String, FetchError> {
    let first = body
        .country
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Schema("empty country list".to_string()))?;

    if !is_country_code(&first.country_id) {
        return Err(FetchError::Schema(format!(
            "invalid country_id '{}'",
            first.country_id
        )));
    }

    Ok(first.country_id)
}
