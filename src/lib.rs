//! Webcam companion that notices sustained sadness and offers to talk.

pub mod assistant;
pub mod companion;
pub mod config;
pub mod conversation;
pub mod pause;
pub mod speech;
pub mod tracker;
pub mod vision;


pub use companion::{Collaborators, Companion, CompanionError, CompanionSettings, RunSummary};
pub use config::Config;

#[cfg(test)]
mod tests {
    /// A plain `cargo build` must produce a binary with real devices, not stubs
    #[test]
    fn test_default_features_enable_native_backends() {
        let manifest = include_str!("../Cargo.toml");
        let default = manifest
            .lines()
            .find(|l| l.trim_start().starts_with("default = "))
            .unwrap();
        assert!(default.contains("\"desktop\""));

        let desktop = manifest
            .lines()
            .find(|l| l.trim_start().starts_with("desktop = "))
            .unwrap();
        for feature in ["listen", "camera", "ferplus", "window"] {
            assert!(desktop.contains(&format!("\"{}\"", feature)), "{}", feature);
        }
    }
}
