pub mod message;

pub use message::MessageResponse;
