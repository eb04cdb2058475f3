pub mod auth;
pub mod items;
pub mod kato;
pub mod lookups;
pub mod plans;
