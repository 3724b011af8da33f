pub mod client;
pub mod core;

pub use client::{Client, Transport};
pub use self::core::{FragmentStream, Message, Role, StreamError, completion_stream};
