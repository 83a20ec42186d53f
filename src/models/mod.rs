pub mod artifact;
pub mod params;
pub mod run_result;
pub mod timestamp;
