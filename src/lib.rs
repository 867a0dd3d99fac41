// src/lib.rs
pub mod ports {
    pub mod gateway_box;
    pub mod null_gateway;
}
pub mod config;
pub mod control_bridge;
pub mod gateway;
pub mod models;
pub mod reconciler;
pub mod signals;
pub mod supervisor;
pub mod translator;
pub mod transport;
