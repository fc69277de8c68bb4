pub mod assistant;
pub mod debounce;
pub mod validation;

pub use debounce::Debouncer;
