pub(crate) mod hub;
pub mod runtime;
