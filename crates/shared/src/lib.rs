//! Types shared between the admin client core and its front-ends: the user
//! entity, the action payloads routed through the dispatcher, and API errors.

pub mod domain;
pub mod error;
pub mod protocol;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
