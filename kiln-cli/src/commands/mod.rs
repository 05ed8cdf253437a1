//! CLI command implementations

pub mod create;
pub mod inspect;
pub mod ls;
pub mod rm;
pub mod stop;
pub mod use_builder;
