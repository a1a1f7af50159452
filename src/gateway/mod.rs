//! 网关层：任务创建与轮询的 HTTP 表面

pub mod server;

pub use server::{router, serve, GatewayState, StartRequest, StartResponse};
