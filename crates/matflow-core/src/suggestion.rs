//! 採購建議群組模型

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ports::OrderRef;
use crate::resource::ResourceType;
use crate::shortage::Priority;
use crate::{AccountingError, EntityKind, Result};

/// 建議狀態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionStatus {
    Pending,
    /// 已轉為採購單（保留供追溯）
    Ordered { order: OrderRef },
    Dismissed,
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Ordered { .. } => "ORDERED",
            Self::Dismissed => "DISMISSED",
        })
    }
}

/// 依供應商與資源類型分組的採購建議
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionGroup {
    pub id: Uuid,

    pub supplier_id: String,

    pub resource_type: ResourceType,

    /// 成員短缺分析
    pub analysis_ids: Vec<Uuid>,

    pub item_count: usize,

    /// 預估未稅金額
    pub estimated_net: Decimal,

    /// 預估含稅金額
    pub estimated_gross: Decimal,

    /// 供應商提前期（天）
    pub lead_time_days: u32,

    /// 成員中最早的需求日期
    pub earliest_need_date: Option<NaiveDate>,

    /// 建議下單日期 = 最早需求日期 − 提前期
    pub suggested_order_date: NaiveDate,

    pub highest_priority: Priority,

    pub status: SuggestionStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SuggestionGroup {
    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::Pending
    }

    /// 已生成的採購單
    pub fn order_ref(&self) -> Option<&OrderRef> {
        match &self.status {
            SuggestionStatus::Ordered { order } => Some(order),
            _ => None,
        }
    }

    fn ensure_pending(&self, action: &'static str) -> Result<()> {
        if !self.is_pending() {
            return Err(AccountingError::invalid_state(
                EntityKind::SuggestionGroup,
                self.id,
                &self.status,
                action,
            ));
        }
        Ok(())
    }

    /// 檢查是否可轉為採購單
    pub fn ensure_orderable(&self) -> Result<()> {
        self.ensure_pending("轉為採購單")
    }

    /// 標記為已下單
    pub fn mark_ordered(&mut self, order: OrderRef, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending("轉為採購單")?;
        self.status = SuggestionStatus::Ordered { order };
        self.updated_at = now;
        Ok(())
    }

    /// 忽略此建議
    pub fn dismiss(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending("忽略")?;
        self.status = SuggestionStatus::Dismissed;
        self.updated_at = now;
        Ok(())
    }
}
