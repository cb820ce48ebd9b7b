pub mod progress;
pub mod transcoder;
