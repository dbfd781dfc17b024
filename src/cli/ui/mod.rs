pub mod prompts;
pub mod spinner;

pub use spinner::{Spinner, with_spinner};
