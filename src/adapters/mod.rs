//! Adapters binding the domain ports to external systems

pub mod cluster;

pub use cluster::{connect, load_class_registry, KubeVolumeStore};
