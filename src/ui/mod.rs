pub mod terminal;

pub use terminal::{TerminalNotifier, TerminalRenderer, sanitize};
