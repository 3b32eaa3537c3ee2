pub mod config;
pub mod model;
pub mod replay;
pub mod state;
