// Declare all modules as public so they can be used by the binary and tests.
pub mod app;
pub mod config;
pub mod core;
pub mod fs_ops;
pub mod spreadsheet;
pub mod storage;
pub mod utils;
