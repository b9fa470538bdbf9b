pub mod error;
pub mod config;
pub mod dataset;
pub mod preprocessing;
pub mod state;
pub mod models;
pub mod inception;
pub mod clip;
pub mod linalg;
pub mod statistics;
pub mod frechet;
pub mod inception_score;
pub mod similarity;
pub mod report;
pub mod evaluation;
pub mod references;

#[cfg(test)]
pub(crate) mod test_support;
