use crate::config::Config;
use crate::db_storage::PersonStorage;
use crate::enrichment::{merge, CallContext, Enricher};
use crate::errors::AppError;
use crate::models::*;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Person record storage.
    pub storage: PersonStorage,
    /// Attribute enricher, built once at startup.
    pub enricher: Arc<Enricher>,
    /// Application configuration.
    pub config: Config,
}

/// Health check endpoint.
///
/// Returns the service status, version, and which enrichment sources are
/// disabled.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-people-api",
            "version": env!("CARGO_PKG_VERSION"),
            "unconfigured_sources": state.enricher.unconfigured(),
        })),
    )
}

fn parse_id(raw: &str) -> Result<i32, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest("Person ID must be an integer".to_string()))
}

/// Attributes still unknown after merging.
fn missing_attributes(record: &NewPerson) -> Vec<Attribute> {
    let mut missing = Vec::new();
    if record.age.is_none() {
        missing.push(Attribute::Age);
    }
    if record.gender.is_none() {
        missing.push(Attribute::Gender);
    }
    if record.nationality.is_none() {
        missing.push(Attribute::Nationality);
    }
    missing
}

/// Enriches `input` and folds the result in. Never fails: whatever the
/// sources could not provide is reported as missing.
async fn enrich_record(
    enricher: &Enricher,
    ctx: &CallContext,
    input: NewPerson,
) -> (NewPerson, Vec<Attribute>) {
    let (enrichment, failures) = enricher.enrich(ctx, &input.name).await;
    if let Some(ref failures) = failures {
        tracing::warn!("Continuing without full enrichment: {}", failures);
    }

    let merged = merge(input, &enrichment);
    let missing = missing_attributes(&merged);
    (merged, missing)
}

/// POST /api/v1/people
///
/// Enriches the person through the external sources and stores the record.
/// Enrichment gaps are listed in `missing_attributes` and never fail the
/// request.
#[utoipa::path(
    post,
    path = "/api/v1/people",
    tag = "people",
    request_body = NewPerson,
    responses(
        (status = 201, description = "Person created", body = PersonResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 500, description = "Database error", body = ErrorResponse)
    )
)]
pub async fn create_person(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewPerson>,
) -> Result<(StatusCode, Json<PersonResponse>), AppError> {
    tracing::info!("POST /people - name: {}", input.name);
    input.validate()?;

    let ctx = CallContext::with_timeout(state.config.request_timeout);
    let (record, missing_attributes) = enrich_record(&state.enricher, &ctx, input).await;

    let person = state.storage.create(&record).await?;
    tracing::info!("Person created successfully: id={}", person.id);

    Ok((
        StatusCode::CREATED,
        Json(PersonResponse {
            person,
            missing_attributes,
        }),
    ))
}

/// GET /api/v1/people
///
/// Lists people with optional filters and pagination.
#[utoipa::path(
    get,
    path = "/api/v1/people",
    tag = "people",
    params(PersonQuery),
    responses(
        (status = 200, description = "Matching people", body = [Person]),
        (status = 500, description = "Database error", body = ErrorResponse)
    )
)]
pub async fn list_people(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PersonQuery>,
) -> Result<Json<Vec<Person>>, AppError> {
    let (filter, page) = query.into_parts();
    tracing::debug!("GET /people - filter: {:?}, page: {:?}", filter, page);

    let people = state.storage.list(&filter, page).await?;
    Ok(Json(people))
}

/// GET /api/v1/people/:id
#[utoipa::path(
    get,
    path = "/api/v1/people/{id}",
    tag = "people",
    params(("id" = i32, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Person found", body = Person),
        (status = 400, description = "Invalid ID", body = ErrorResponse),
        (status = 404, description = "Person not found", body = ErrorResponse)
    )
)]
pub async fn get_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Person>, AppError> {
    let id = parse_id(&id)?;
    tracing::info!("GET /people/{}", id);

    let person = state
        .storage
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Person not found".to_string()))?;

    Ok(Json(person))
}

/// PUT /api/v1/people/:id
///
/// Replaces every field of a person. Enrichable fields left empty are
/// re-enriched from the (possibly new) name.
#[utoipa::path(
    put,
    path = "/api/v1/people/{id}",
    tag = "people",
    params(("id" = i32, Path, description = "Person ID")),
    request_body = NewPerson,
    responses(
        (status = 200, description = "Person updated", body = PersonResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "Person not found", body = ErrorResponse)
    )
)]
pub async fn update_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<NewPerson>,
) -> Result<Json<PersonResponse>, AppError> {
    let id = parse_id(&id)?;
    tracing::info!("PUT /people/{}", id);
    input.validate()?;

    if !state.storage.exists(id).await? {
        return Err(AppError::NotFound("Person not found".to_string()));
    }

    let ctx = CallContext::with_timeout(state.config.request_timeout);
    let (record, missing_attributes) = enrich_record(&state.enricher, &ctx, input).await;

    let person = state
        .storage
        .replace(id, &record)
        .await?
        .ok_or_else(|| AppError::NotFound("Person not found".to_string()))?;

    Ok(Json(PersonResponse {
        person,
        missing_attributes,
    }))
}

/// PATCH /api/v1/people/:id
///
/// Updates only the provided fields; no enrichment is performed.
#[utoipa::path(
    patch,
    path = "/api/v1/people/{id}",
    tag = "people",
    params(("id" = i32, Path, description = "Person ID")),
    request_body = UpdatePersonRequest,
    responses(
        (status = 200, description = "Person updated", body = Person),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "Person not found", body = ErrorResponse)
    )
)]
pub async fn patch_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<UpdatePersonRequest>,
) -> Result<Json<Person>, AppError> {
    let id = parse_id(&id)?;
    tracing::info!("PATCH /people/{}", id);
    input.validate()?;

    let person = state
        .storage
        .patch(id, &input)
        .await?
        .ok_or_else(|| AppError::NotFound("Person not found".to_string()))?;

    Ok(Json(person))
}

/// DELETE /api/v1/people/:id
#[utoipa::path(
    delete,
    path = "/api/v1/people/{id}",
    tag = "people",
    params(("id" = i32, Path, description = "Person ID")),
    responses(
        (status = 204, description = "Person deleted"),
        (status = 400, description = "Invalid ID", body = ErrorResponse),
        (status = 404, description = "Person not found", body = ErrorResponse)
    )
)]
pub async fn delete_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    tracing::info!("DELETE /people/{}", id);

    if !state.storage.delete(id).await? {
        return Err(AppError::NotFound("Person not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::EnricherConfig;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id("abc"), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_enrich_record_keeps_caller_data_when_sources_fail() {
        let enricher = Enricher::new(&EnricherConfig::default()).unwrap();
        let input = NewPerson {
            name: "Ivan".to_string(),
            surname: "Petrov".to_string(),
            age: Some(33),
            ..Default::default()
        };

        let (record, missing) = enrich_record(&enricher, &CallContext::new(), input).await;

        assert_eq!(record.age, Some(33));
        assert_eq!(missing, vec![Attribute::Gender, Attribute::Nationality]);
    }
}
