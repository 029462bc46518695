//! Tenant-scoped course endpoints.
//!
//! These are deliberately thin: they exist to show how domain handlers use
//! the [`TenantScope`] attached by the resolution middleware. Every storage
//! call goes through `TenantScope::bounded`.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::tenancy::{TenantError, TenantScope};

const COURSES: &str = "courses";

/// `GET /api/courses`: every course of the resolved tenant, ordered by id.
pub async fn list_courses_handler(
    Extension(scope): Extension<TenantScope>,
) -> Result<Json<Vec<Value>>, TenantError> {
    let docs = scope
        .bounded(|conn| async move { conn.load_all(COURSES).await })
        .await?;
    Ok(Json(docs.into_iter().map(|(id, doc)| with_id(&id, doc)).collect()))
}

/// `GET /api/courses/{id}`: 404 when the course does not exist.
pub async fn get_course_handler(
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<String>,
) -> Result<Response, TenantError> {
    let key = id.clone();
    let doc = scope
        .bounded(|conn| async move { conn.load(COURSES, &key).await })
        .await?;
    Ok(match doc {
        Some(doc) => Json(with_id(&id, doc)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

/// `POST /api/courses`: stores a JSON object under a generated id. Returns
/// 201 with the stored course, or 422 for a non-object body.
pub async fn create_course_handler(
    Extension(scope): Extension<TenantScope>,
    Json(body): Json<Value>,
) -> Result<Response, TenantError> {
    let Value::Object(mut doc) = body else {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "course must be a JSON object"})),
        )
            .into_response());
    };
    doc.remove("id");
    let doc = Value::Object(doc);
    let id = uuid::Uuid::new_v4().to_string();

    let (key, stored) = (id.clone(), doc.clone());
    scope
        .bounded(|conn| async move { conn.store(COURSES, &key, &stored).await })
        .await?;

    Ok((StatusCode::CREATED, Json(with_id(&id, doc))).into_response())
}

fn with_id(id: &str, doc: Value) -> Value {
    match doc {
        Value::Object(mut map) => {
            map.insert("id".to_string(), Value::String(id.to_string()));
            Value::Object(map)
        }
        other => json!({"id": id, "value": other}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_id_merges_into_objects() {
        assert_eq!(
            with_id("c1", json!({"title": "Intro"})),
            json!({"id": "c1", "title": "Intro"})
        );
        assert_eq!(with_id("c2", json!(5)), json!({"id": "c2", "value": 5}));
    }
}
