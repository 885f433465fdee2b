//! Per-request controller lifecycle engine.

mod core;

pub use self::core::{redirect, spawn_controller, Controller, RequestCx};
