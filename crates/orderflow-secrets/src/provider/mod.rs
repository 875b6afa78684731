//! Secret provider implementations.

pub mod env;
pub mod r#static;
