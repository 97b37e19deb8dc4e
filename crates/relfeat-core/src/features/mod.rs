pub mod dependency;
pub mod naming;
pub mod registry;
pub mod window;
