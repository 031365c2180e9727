//! 短缺分析模型

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resource::{ResourceKey, StockUnit};

/// 優先級（由低到高排序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        })
    }
}

/// 分析記錄狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        })
    }
}

/// 單一資源的短缺分析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortageAnalysis {
    /// 分析ID（同一資源重跑時保持不變）
    pub id: Uuid,

    /// 資源鍵
    pub resource: ResourceKey,

    pub resource_name: String,

    pub priority: Priority,

    /// 現有庫存
    pub current_stock: Decimal,

    /// RESERVED 預留總量
    pub reserved_quantity: Decimal,

    /// 可用數量（現有 - 預留）
    pub available_quantity: Decimal,

    /// 在途數量
    pub in_transit_quantity: Decimal,

    /// 最低庫存量
    pub min_quantity: Decimal,

    /// 未覆蓋需求總量
    pub required_quantity: Decimal,

    /// 短缺數量
    pub shortage_quantity: Decimal,

    /// 建議訂購量
    pub suggested_order_quantity: Decimal,

    pub unit: StockUnit,

    /// 每庫存單位有效單價（分析當下快照）
    pub unit_price: Decimal,

    /// 稅率
    pub vat_rate: Decimal,

    /// 首選供應商
    pub preferred_supplier_id: Option<String>,

    /// 最早需求日期
    pub earliest_need_date: Option<NaiveDate>,

    pub analyzed_at: DateTime<Utc>,

    pub status: AnalysisStatus,

    /// 所屬採購建議
    pub suggestion_group_id: Option<Uuid>,
}

impl ShortageAnalysis {
    /// 是否有短缺
    pub fn has_shortage(&self) -> bool {
        self.shortage_quantity > Decimal::ZERO
    }

    /// 短缺金額
    pub fn shortage_value(&self) -> Decimal {
        self.shortage_quantity * self.unit_price
    }
}

/// 可用數量 = 現有庫存 − RESERVED 預留總量
pub fn available_quantity(current_stock: Decimal, reserved: Decimal) -> Decimal {
    current_stock - reserved
}

/// 短缺數量 = max(0, 需求 + 最低庫存 − 可用 − 在途)
pub fn shortage_quantity(
    required: Decimal,
    min_quantity: Decimal,
    available: Decimal,
    in_transit: Decimal,
) -> Decimal {
    (required + min_quantity - available - in_transit).max(Decimal::ZERO)
}
