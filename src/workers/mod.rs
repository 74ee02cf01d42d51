//! Long-lived controller ownership

pub mod registry;

pub use registry::ControllerRegistry;
