pub mod chat;
pub mod cli;
pub mod core;
pub mod input;
pub mod openai;
pub mod ui;
