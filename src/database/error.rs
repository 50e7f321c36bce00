use std::{
    collections::BTreeMap,
    convert::Infallible,
    fmt::{self, Display},
};

use serde::Serialize;
use serde_json::{json, Value};
use sqlx::error::ErrorKind;
use thiserror::Error;
use warp::{
    http::StatusCode,
    reject::{Reject, Rejection},
    reply::{self, Reply, Response},
};

/// Field name -> messages, rendered as a flat JSON object.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn check<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed ({0})")]
    Validation(FieldErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            ApiError::Validation(errors) => json!(errors),
            // details of infrastructure failures stay in the log
            ApiError::Internal(_) => detail("A server error occurred."),
            _ => detail(&self.to_string()),
        }
    }

    pub fn not_found() -> Self {
        ApiError::NotFound(String::from("Not found."))
    }

    pub fn unauthenticated() -> Self {
        ApiError::Unauthorized(String::from(
            "Authentication credentials were not provided.",
        ))
    }
}

// `?` into `Rejection` goes through warp's blanket `From<T: Reject>`.
impl Reject for ApiError {}

impl From<FieldErrors> for ApiError {
    fn from(value: FieldErrors) -> Self {
        ApiError::Validation(value)
    }
}

impl From<FieldErrors> for Rejection {
    fn from(value: FieldErrors) -> Self {
        ApiError::from(value).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    UniqueViolation,
    CheckViolation,
    ForeignKeyViolation,
    RowNotFound,
    Other,
}

#[derive(Debug)]
pub struct QueryError {
    kind: QueryErrorKind,
    info: String,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, info: String) -> Self {
        Self { kind, info }
    }

    pub fn kind(&self) -> QueryErrorKind {
        self.kind
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        use QueryErrorKind::Other;

        match value {
            sqlx::Error::Database(e) => {
                let kind = match e.kind() {
                    ErrorKind::UniqueViolation => QueryErrorKind::UniqueViolation,
                    ErrorKind::CheckViolation => QueryErrorKind::CheckViolation,
                    ErrorKind::ForeignKeyViolation => QueryErrorKind::ForeignKeyViolation,
                    _ => Other,
                };
                let info = match e.constraint() {
                    Some(constraint) => format!("{e} ({constraint})"),
                    None => format!("{e}"),
                };
                Self::new(kind, info)
            }
            sqlx::Error::RowNotFound => {
                Self::new(QueryErrorKind::RowNotFound, String::from("RowNotFound"))
            }
            sqlx::Error::Configuration(e) => Self::new(Other, format!("{e}")),
            sqlx::Error::Io(e) => Self::new(Other, format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(Other, format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(Other, e),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(Other, format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(Other, format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(Other, e),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(Other, format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(Other, format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(Other, String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(Other, String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(Other, String::from("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::new(Other, format!("{e}")),
            e => Self::new(Other, format!("{e}")),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(value: QueryError) -> Self {
        match value.kind {
            QueryErrorKind::UniqueViolation => {
                ApiError::Conflict(String::from("Object already exists"))
            }
            QueryErrorKind::CheckViolation => ApiError::Validation(FieldErrors::single(
                "non_field_errors",
                "Value violates a constraint",
            )),
            QueryErrorKind::ForeignKeyViolation | QueryErrorKind::RowNotFound => {
                ApiError::not_found()
            }
            QueryErrorKind::Other => {
                log::error!("Query failed: {}", value.info);
                ApiError::Internal(value.info)
            }
        }
    }
}

/// Malformed query-string parameter.
#[derive(Debug)]
pub struct TypeError {
    field: String,
    info: String,
}

impl TypeError {
    pub fn new(field: &str, info: &str) -> Self {
        Self {
            field: field.to_string(),
            info: info.to_string(),
        }
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.field, self.info)
    }
}

impl std::error::Error for TypeError {}

impl From<TypeError> for ApiError {
    fn from(value: TypeError) -> Self {
        ApiError::Validation(FieldErrors::single(&value.field, value.info))
    }
}

impl From<TypeError> for Rejection {
    fn from(value: TypeError) -> Self {
        ApiError::from(value).into()
    }
}

fn detail(message: &str) -> Value {
    json!({ "detail": message })
}

/// Turns every rejection into a JSON body with a matching status code.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, body) = if let Some(e) = err.find::<ApiError>() {
        (e.status(), e.body())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, detail("Not found."))
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, detail(&e.to_string()))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, detail(&e.to_string()))
    } else if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        (StatusCode::BAD_REQUEST, detail(&e.to_string()))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, detail("Request body is too large."))
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            detail("Unsupported media type."),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, detail("Content length required."))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, detail("Method not allowed."))
    } else {
        log::error!("Unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            detail("A server error occurred."),
        )
    };

    Ok(reply::with_status(reply::json(&body), status).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("name", "This field is required.");
        errors.add("name", "Too long.");
        errors.add("tags", "Empty.");

        assert_eq!(errors.messages("name").len(), 2);
        assert!(errors.contains("tags"));
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!({ "name": ["This field is required.", "Too long."], "tags": ["Empty."] })
        );
    }

    #[test]
    fn empty_field_errors_pass_check() {
        assert_eq!(FieldErrors::new().check(5), Ok(5));
        assert!(FieldErrors::single("amount", "bad").check(5).is_err());
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            ApiError::Validation(FieldErrors::new()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("dup".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::unauthenticated().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("no".into()).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let error = ApiError::Internal("password authentication failed".into());
        assert_eq!(error.body(), json!({ "detail": "A server error occurred." }));
    }

    #[test]
    fn query_error_kinds_map_to_api_errors() {
        let conflict: ApiError =
            QueryError::new(QueryErrorKind::UniqueViolation, "dup".into()).into();
        assert!(matches!(conflict, ApiError::Conflict(_)));

        let missing: ApiError = QueryError::from(sqlx::Error::RowNotFound).into();
        assert!(matches!(missing, ApiError::NotFound(_)));

        let invalid: ApiError =
            QueryError::new(QueryErrorKind::CheckViolation, "check".into()).into();
        assert!(matches!(invalid, ApiError::Validation(_)));
    }

    #[test]
    fn type_errors_become_field_errors() {
        let error: ApiError = TypeError::new("page", "A valid integer is required.").into();
        match error {
            ApiError::Validation(errors) => assert!(errors.contains("page")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn errors_convert_into_rejections() {
        let rejection = Rejection::from(ApiError::not_found());
        assert!(matches!(rejection.find::<ApiError>(), Some(ApiError::NotFound(_))));

        let rejection = Rejection::from(FieldErrors::single("name", "Too long."));
        assert!(matches!(rejection.find::<ApiError>(), Some(ApiError::Validation(_))));

        let rejection = Rejection::from(TypeError::new("page", "Invalid page."));
        assert!(rejection.find::<ApiError>().is_some());
    }

    #[tokio::test]
    async fn rejections_render_as_json() {
        let response = handle_rejection(warp::reject::not_found()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle_rejection(ApiError::Conflict("Recipe is already in favorites".into()).into())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
