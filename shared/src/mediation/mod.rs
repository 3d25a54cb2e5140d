pub mod error;
pub mod expr;
pub mod mediator;
