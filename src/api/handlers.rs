mod catalog;
mod recipes;
mod users;

pub use catalog::*;
pub use recipes::*;
pub use users::*;

use serde::Serialize;
use warp::{
    http::StatusCode,
    reply::{self, Reply, Response},
};

fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(value), status).into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
