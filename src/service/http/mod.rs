//! HTTP 诊断接口
//!
//! 通知服务的健康检查和路由统计。店面的 REST API 是另外的服务，
//! 这里只暴露运维所需的最小面。

use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::notification::RoomBroker;

/// 通用响应信封
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// 健康检查
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "zammer-notify"
    }))
}

/// 路由统计
pub async fn broker_stats(broker: web::Data<Arc<RoomBroker>>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(broker.get_stats()))
}

/// 注册诊断路由
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/api/stats", web::get().to(broker_stats));
}
