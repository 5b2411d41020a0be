use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::errors::{AppError, ResultExt};
use crate::models::{NewPerson, Pagination, Person, PersonFilter, UpdatePersonRequest};

const PERSON_COLUMNS: &str =
    "id, name, surname, patronymic, gender, age, nationality, created_at, updated_at";

/// Raw `people` row as stored in PostgreSQL.
#[derive(Debug, Clone, FromRow)]
struct PersonRow {
    id: i32,
    name: String,
    surname: String,
    patronymic: Option<String>,
    gender: Option<String>,
    age: Option<i32>,
    nationality: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PersonRow> for Person {
    type Error = AppError;

    fn try_from(row: PersonRow) -> Result<Self, Self::Error> {
        let gender = row
            .gender
            .map(|g| g.parse())
            .transpose()
            .map_err(|e| AppError::InternalError(format!("person {}: {}", row.id, e)))?;
        let age = row
            .age
            .map(u32::try_from)
            .transpose()
            .map_err(|_| AppError::InternalError(format!("person {}: negative age", row.id)))?;

        Ok(Person {
            id: row.id,
            name: row.name,
            surname: row.surname,
            patronymic: row.patronymic,
            gender,
            age,
            nationality: row.nationality,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn db_age(age: u32) -> i32 {
    i32::try_from(age).unwrap_or(i32::MAX)
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Builds the filtered, paginated listing query.
pub fn build_list_query(filter: &PersonFilter, page: Pagination) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM people", PERSON_COLUMNS));
    let mut keyword = " WHERE ";

    if let Some(ref name) = filter.name {
        qb.push(keyword)
            .push("name ILIKE ")
            .push_bind(format!("%{}%", escape_like(name)));
        keyword = " AND ";
    }
    if let Some(ref surname) = filter.surname {
        qb.push(keyword)
            .push("surname ILIKE ")
            .push_bind(format!("%{}%", escape_like(surname)));
        keyword = " AND ";
    }
    if let Some(ref gender) = filter.gender {
        qb.push(keyword).push("gender = ").push_bind(gender.clone());
        keyword = " AND ";
    }
    if let Some(ref nationality) = filter.nationality {
        qb.push(keyword)
            .push("nationality = ")
            .push_bind(nationality.clone());
        keyword = " AND ";
    }
    if let Some(age_from) = filter.age_from {
        qb.push(keyword).push("age >= ").push_bind(age_from);
        keyword = " AND ";
    }
    if let Some(age_to) = filter.age_to {
        qb.push(keyword).push("age <= ").push_bind(age_to);
    }

    qb.push(" ORDER BY id LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset);
    qb
}

/// Builds an `UPDATE` that sets only the fields present in `patch`.
pub fn build_patch_query(id: i32, patch: &UpdatePersonRequest) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE people SET ");
    {
        let mut set = qb.separated(", ");
        if let Some(ref name) = patch.name {
            set.push("name = ").push_bind_unseparated(name.clone());
        }
        if let Some(ref surname) = patch.surname {
            set.push("surname = ").push_bind_unseparated(surname.clone());
        }
        if let Some(ref patronymic) = patch.patronymic {
            set.push("patronymic = ")
                .push_bind_unseparated(patronymic.clone());
        }
        if let Some(gender) = patch.gender {
            set.push("gender = ").push_bind_unseparated(gender.as_str());
        }
        if let Some(age) = patch.age {
            set.push("age = ").push_bind_unseparated(db_age(age));
        }
        if let Some(ref nationality) = patch.nationality {
            set.push("nationality = ")
                .push_bind_unseparated(nationality.clone());
        }
        if patch.is_empty() {
            set.push("updated_at = updated_at");
        } else {
            set.push("updated_at = NOW()");
        }
    }
    qb.push(" WHERE id = ")
        .push_bind(id)
        .push(format!(" RETURNING {}", PERSON_COLUMNS));
    qb
}

/// PostgreSQL storage for person records.
#[derive(Clone)]
pub struct PersonStorage {
    pool: PgPool,
}

impl PersonStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, person: &NewPerson) -> Result<Person, AppError> {
        let row = sqlx::query_as::<_, PersonRow>(&format!(
            r#"
            INSERT INTO people (name, surname, patronymic, gender, age, nationality)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PERSON_COLUMNS
        ))
        .bind(&person.name)
        .bind(&person.surname)
        .bind(&person.patronymic)
        .bind(person.gender.map(|g| g.as_str()))
        .bind(person.age.map(db_age))
        .bind(&person.nationality)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create person")?;

        row.try_into()
    }

    pub async fn get(&self, id: i32) -> Result<Option<Person>, AppError> {
        let row = sqlx::query_as::<_, PersonRow>(&format!(
            "SELECT {} FROM people WHERE id = $1",
            PERSON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch person {}", id))?;

        row.map(Person::try_from).transpose()
    }

    pub async fn exists(&self, id: i32) -> Result<bool, AppError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM people WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("Failed to check person {}", id))?;

        Ok(exists)
    }

    pub async fn list(
        &self,
        filter: &PersonFilter,
        page: Pagination,
    ) -> Result<Vec<Person>, AppError> {
        let mut qb = build_list_query(filter, page);
        let rows = qb
            .build_query_as::<PersonRow>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch people")?;

        let mut people = Vec::with_capacity(rows.len());
        for row in rows {
            match Person::try_from(row) {
                Ok(person) => people.push(person),
                Err(e) => tracing::warn!("Skipping unreadable person row: {}", e),
            }
        }
        Ok(people)
    }

    /// Overwrites every column of an existing person.
    ///
    /// Returns `None` when no person has this id.
    pub async fn replace(&self, id: i32, person: &NewPerson) -> Result<Option<Person>, AppError> {
        let row = sqlx::query_as::<_, PersonRow>(&format!(
            r#"
            UPDATE people
            SET name = $1, surname = $2, patronymic = $3, gender = $4, age = $5,
                nationality = $6, updated_at = NOW()
            WHERE id = $7
            RETURNING {}
            "#,
            PERSON_COLUMNS
        ))
        .bind(&person.name)
        .bind(&person.surname)
        .bind(&person.patronymic)
        .bind(person.gender.map(|g| g.as_str()))
        .bind(person.age.map(db_age))
        .bind(&person.nationality)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to update person {}", id))?;

        row.map(Person::try_from).transpose()
    }

    /// Writes only the fields present in `patch`.
    ///
    /// Returns `None` when no person has this id.
    pub async fn patch(
        &self,
        id: i32,
        patch: &UpdatePersonRequest,
    ) -> Result<Option<Person>, AppError> {
        let mut qb = build_patch_query(id, patch);
        let row = qb
            .build_query_as::<PersonRow>()
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to partially update person {}", id))?;

        row.map(Person::try_from).transpose()
    }

    /// Returns `false` when no person has this id.
    pub async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM people WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete person {}", id))?;

        Ok(result.rows_affected() > 0)
    }
}
