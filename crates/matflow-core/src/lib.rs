//! # Matflow Core
//!
//! 資源帳務核心資料模型：庫存視圖、預留、短缺分析、採購建議、三方對帳

pub mod clock;
pub mod config;
pub mod event;
pub mod geometry;
pub mod ports;
pub mod reconciliation;
pub mod reservation;
pub mod resource;
pub mod shortage;
pub mod suggestion;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Re-export 主要類型
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AccountingConfig, ReconciliationThresholds, ShortageThresholds};
pub use event::{DomainEvent, EventSink, NullEventSink, TracingEventSink};
pub use geometry::{Profile, Quantity};
pub use ports::{
    DemandSource, OpenDemand, OrderGateway, OrderRef, PurchaseOrderLine, PurchaseOrderRequest,
    ResourceCatalog,
};
pub use reconciliation::{
    Approval, DeliveryLine, Discrepancy, DiscrepancyType, InvoiceLine, PoLine,
    ReconciliationRecord, ReconciliationStatus, ReconciliationTotals, Severity, Totals,
};
pub use reservation::{CustomSpec, Reservation, ReservationStatus, ResourceSelector};
pub use resource::{MaterialType, Pricing, ResourceKey, ResourceStock, ResourceType, StockUnit};
pub use shortage::{AnalysisStatus, Priority, ShortageAnalysis};
pub use suggestion::{SuggestionGroup, SuggestionStatus};

/// 錯誤所指向的實體
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Resource,
    MaterialType,
    Supplier,
    Reservation,
    ShortageAnalysis,
    SuggestionGroup,
    Reconciliation,
    Order,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Resource => "資源",
            Self::MaterialType => "材質",
            Self::Supplier => "供應商",
            Self::Reservation => "預留",
            Self::ShortageAnalysis => "短缺分析",
            Self::SuggestionGroup => "採購建議",
            Self::Reconciliation => "對帳記錄",
            Self::Order => "訂單",
        };
        f.write_str(label)
    }
}

/// 錯誤分類（供呼叫端決定回應方式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientResource,
    NotFound,
    InvalidState,
    Conflict,
    Validation,
    Upstream,
    Config,
}

/// 資源帳務錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum AccountingError {
    #[error("庫存不足：{name}（{resource}）需要 {required} {unit}，可用 {available} {unit}")]
    InsufficientResource {
        resource: ResourceKey,
        name: String,
        required: Decimal,
        available: Decimal,
        unit: StockUnit,
    },

    #[error("找不到{entity}: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("{entity} {id} 目前狀態為 {status}，不允許{action}")]
    InvalidState {
        entity: EntityKind,
        id: String,
        status: String,
        action: &'static str,
    },

    #[error("{entity} {id} 已被並行修改，請重新讀取後再試")]
    Conflict { entity: EntityKind, id: String },

    #[error("輸入驗證失敗: {0}")]
    Validation(String),

    #[error("外部服務 {collaborator} 失敗: {message}")]
    Upstream {
        collaborator: &'static str,
        message: String,
    },

    #[error("設定錯誤: {0}")]
    Config(String),
}

impl AccountingError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: EntityKind, id: impl ToString) -> Self {
        Self::Conflict {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(
        entity: EntityKind,
        id: impl ToString,
        status: impl ToString,
        action: &'static str,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.to_string(),
            status: status.to_string(),
            action,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upstream(collaborator: &'static str, msg: impl Into<String>) -> Self {
        Self::Upstream {
            collaborator,
            message: msg.into(),
        }
    }

    /// 錯誤分類
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientResource { .. } => ErrorKind::InsufficientResource,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// 轉換為 HTTP 狀態碼
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InsufficientResource | ErrorKind::InvalidState | ErrorKind::Conflict => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 400,
            ErrorKind::Upstream => 502,
            ErrorKind::Config => 500,
        }
    }

    /// 只有並行衝突可在重新讀取後重試
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

pub type Result<T> = std::result::Result<T, AccountingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let insufficient = AccountingError::InsufficientResource {
            resource: ResourceKey::material("PLATE-A"),
            name: "Plate-A".to_string(),
            required: Decimal::from(15),
            available: Decimal::from(5),
            unit: StockUnit::Pieces,
        };
        assert_eq!(insufficient.kind(), ErrorKind::InsufficientResource);
        assert_eq!(insufficient.status_code(), 409);
        assert!(!insufficient.is_retryable());

        let missing = AccountingError::not_found(EntityKind::Reservation, "R-1");
        assert_eq!(missing.status_code(), 404);

        let conflict = AccountingError::conflict(EntityKind::SuggestionGroup, "G-1");
        assert_eq!(conflict.status_code(), 409);
        assert!(conflict.is_retryable());

        assert_eq!(AccountingError::upstream("orders", "timeout").status_code(), 502);
    }

    #[test]
    fn test_insufficient_message_carries_context() {
        let err = AccountingError::InsufficientResource {
            resource: ResourceKey::material("ROD-20"),
            name: "Rod 20".to_string(),
            required: Decimal::new(35, 1),
            available: Decimal::new(12, 1),
            unit: StockUnit::Meters,
        };
        let message = err.to_string();
        assert!(message.contains("material:ROD-20"));
        assert!(message.contains("3.5 m"));
        assert!(message.contains("1.2 m"));
    }
}
