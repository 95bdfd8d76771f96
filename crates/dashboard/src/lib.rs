//! Terminal dashboard over a codeflow sync session.
//!
//! The binary wires environment configuration, the real HTTP and
//! WebSocket transports and a file-writing diagram renderer around a
//! [`DashboardSession`](codeflow_sync::DashboardSession).

pub mod config;
pub mod render;
pub mod results;
pub mod view;
