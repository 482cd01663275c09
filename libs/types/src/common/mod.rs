//! Identifier newtypes and their validation errors

pub mod errors;
pub mod identifiers;
