use warp::{reject::Rejection, Filter};

use crate::error::ApiError;

use super::jwt::{verify_jwt_session, SessionData, SessionKey};

/// Accepts `Token <t>`, `Bearer <t>` or a bare token.
pub fn parse_authorization(header: &str) -> Option<&str> {
    let header = header.trim();
    let token = match header.split_once(' ') {
        Some((scheme, token))
            if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") =>
        {
            token.trim()
        }
        Some(_) => return None,
        None => header,
    };

    (!token.is_empty()).then_some(token)
}

pub fn with_session(
    key: SessionKey,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let key = key.clone();
        async move {
            let token = match header.as_deref().and_then(parse_authorization) {
                Some(token) => token,
                None => return Err(Rejection::from(ApiError::unauthenticated())),
            };

            verify_jwt_session(token, &key)
                .map(SessionData::from)
                .map_err(Rejection::from)
        }
    })
}

/// Anonymous when the header is missing or the token does not verify.
pub fn with_possible_session(
    key: SessionKey,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").map(move |header: Option<String>| {
        header
            .as_deref()
            .and_then(parse_authorization)
            .and_then(|token| verify_jwt_session(token, &key).ok())
            .map(SessionData::from)
    })
}
