//! # 候诊队列 HTTP 接口
//!
//! 以 JSON 端点暴露预约、取消、推进和查询操作

pub mod handlers;
pub mod server;

pub use handlers::{ApiError, AppState};
pub use server::{create_router, WebServer};
