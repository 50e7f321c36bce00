mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod api {
    pub mod handlers;
    pub mod media;
    pub mod representation;
    pub mod routes;
    pub mod state;
    pub mod validation;
}
pub mod config;
mod constants;

pub use api::*;
pub use authentication::*;
pub use constants::*;
pub use database::*;
pub use routes::routes;
pub use state::AppState;
