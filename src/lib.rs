// Library exports for Emotion View - live webcam emotion detection

pub mod analyzer;
pub mod camera;
pub mod config;
pub mod detection;
pub mod error;
pub mod loader;
pub mod models;
pub mod overlay;
pub mod state;
pub mod ui;
pub mod view;
