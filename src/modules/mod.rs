//! Built-in module kinds.
//!
//! | Module          | Disabled by        | Identity label   |
//! |-----------------|--------------------|------------------|
//! | `HttpModule`    | `http.disable`     | bound address    |
//! | `RpcModule`     | `rpc.disable`      | bound address    |
//! | `CronModule`    | `cron.disable`     | given label      |
//! | `CommandModule` | `command.disable`  | command name     |
//!
//! A disabled server keeps the configured address as its label and leaves
//! the port unbound.

pub mod command;
pub mod cron;
pub mod http;
mod listener;
pub mod rpc;

pub use command::CommandModule;
pub use cron::CronModule;
pub use http::HttpModule;
pub use rpc::{RpcError, RpcMethods, RpcModule, RpcRequest, RpcResponse};
