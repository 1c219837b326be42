// Library exports for Zuckonit
// This allows integration tests and external code to use Zuckonit modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod graphql;
pub mod routes;
pub mod state;
pub mod store;
pub mod visibility;
