//! ML feature extraction (CIC-IDS-2017 compatible ordering)

pub mod extractor;
pub mod vector;

pub use extractor::FeatureExtractor;
pub use vector::{csv_header, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
