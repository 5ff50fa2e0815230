//! Test data generators for integration tests

mod dataset_generator;

pub use dataset_generator::{DatasetGeneratorConfig, GeneratedDataset, generate_dataset};
