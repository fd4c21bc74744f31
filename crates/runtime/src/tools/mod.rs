//! Built-in tool implementations.
//!
//! Each tool's name doubles as its capability identifier for the
//! mode policy, so the constants here are the single source of truth
//! for both registration and policy checks.

pub mod fetch;
pub mod file_read;
pub mod file_write;
pub mod shell;

pub use fetch::HttpFetchTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use shell::ShellExecuteTool;

pub const FILE_READ: &str = "file_read";
pub const FILE_WRITE: &str = "file_write";
pub const SHELL_EXECUTE: &str = "shell_execute";
pub const HTTP_FETCH: &str = "http_fetch";
