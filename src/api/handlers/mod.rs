pub mod private;
pub mod public;
pub mod root;
