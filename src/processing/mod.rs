pub mod lesions;
pub mod metrics;
