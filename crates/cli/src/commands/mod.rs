pub mod migrate;
pub mod shell;
