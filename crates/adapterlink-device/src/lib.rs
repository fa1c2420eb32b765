//! Device lifecycle for adapterlink serial links.
//!
//! A [`Device`] binds one transport to one caller-supplied [`DeviceHandler`]:
//! read deliveries are reassembled into packets and handed to the handler,
//! sends are chunked into packets and written in order, and every open device
//! is tracked by a [`DeviceRegistry`] for enumeration and bulk teardown.

pub mod config;
pub mod device;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod registry;

pub use config::DeviceConfig;
pub use device::Device;
pub use error::{DeviceError, Result};
pub use handler::{read_handler, DeviceHandler, FnHandler, HandlerError, HandlerResult};
pub use hooks::{EventSource, HookError, HookResult, RegisterHook, RemoveHook, SourceHooks};
pub use registry::{DeviceId, DeviceInfo, DeviceRegistry};
