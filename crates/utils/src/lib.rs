pub mod assets;
pub mod envelope;
pub mod log;
