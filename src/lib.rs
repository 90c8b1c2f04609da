pub mod ticks;
pub mod window;
pub mod freq_sync;
pub mod phase_sync;
pub mod controller;
pub mod config;
pub mod traits;
pub mod driver;
pub mod status;
pub mod sim;
