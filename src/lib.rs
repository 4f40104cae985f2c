//! Tiered-horizon linear power flow optimization for home energy networks.
//!
//! A [`config::Config`] declares elements (batteries, grid connections,
//! photovoltaics, loads, nodes) and the links between them. Every cycle the
//! [`controller::Optimizer`] resolves live sensor readings onto a horizon of
//! [`domain::Periods`], compiles the network into one linear program,
//! solves it and publishes a [`optimizer::Solution`].

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod optimizer;
pub mod power_flow;
pub mod telemetry;

pub use error::{NetworkError, NetworkStatus};
