use utoipa::OpenApi;

use crate::handlers;
use crate::models::{
    Attribute, ErrorResponse, Gender, NewPerson, Person, PersonResponse, UpdatePersonRequest,
};

/// OpenAPI document for the people endpoints, served at
/// `/api-docs/openapi.json` with Swagger UI under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "People API",
        description = "Person records enriched with age, gender and nationality"
    ),
    paths(
        handlers::create_person,
        handlers::list_people,
        handlers::get_person,
        handlers::update_person,
        handlers::patch_person,
        handlers::delete_person
    ),
    components(schemas(
        Person,
        NewPerson,
        UpdatePersonRequest,
        PersonResponse,
        Gender,
        Attribute,
        ErrorResponse
    )),
    tags((name = "people", description = "Person records"))
)]
pub struct ApiDoc;
