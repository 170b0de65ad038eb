pub mod calibration;
pub mod config;
pub mod error;
pub mod gateway;
pub mod modes;
pub mod rooms;
pub mod routes;
pub mod session;
pub mod snowflake;
pub mod state;
pub mod tracking;
