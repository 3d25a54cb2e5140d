pub mod component_container;
pub mod component_kinds;
