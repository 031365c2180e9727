//! 預留模型

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Profile, Quantity};
use crate::resource::ResourceKey;
use crate::{AccountingError, EntityKind, Result};

/// 預留狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// 已預留（唯一計入佔用的狀態）
    Reserved,
    /// 已耗用（終態，永久保留供稽核）
    Consumed,
    /// 已取消（終態）
    Cancelled,
}

impl ReservationStatus {
    /// 是否為終態
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Reserved)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Reserved => "RESERVED",
            Self::Consumed => "CONSUMED",
            Self::Cancelled => "CANCELLED",
        })
    }
}

/// 目錄外的自訂材料規格
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSpec {
    pub name: String,
    pub profile: Profile,
    /// 提供密度與每公斤單價的材質
    pub material_type_id: String,
}

impl CustomSpec {
    pub fn new(name: impl Into<String>, profile: Profile, material_type_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile,
            material_type_id: material_type_id.into(),
        }
    }

    /// 規格必須完整
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AccountingError::validation("自訂規格缺少名稱"));
        }
        if self.material_type_id.trim().is_empty() {
            return Err(AccountingError::validation("自訂規格缺少材質"));
        }
        self.profile.validate()
    }
}

/// 預留對象：目錄資源或自訂規格，二者擇一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResourceSelector {
    Catalog { key: ResourceKey },
    Custom { spec: CustomSpec },
}

impl ResourceSelector {
    pub fn catalog(key: ResourceKey) -> Self {
        Self::Catalog { key }
    }

    pub fn custom(spec: CustomSpec) -> Self {
        Self::Custom { spec }
    }

    /// 目錄資源鍵（自訂規格為 None）
    pub fn catalog_key(&self) -> Option<&ResourceKey> {
        match self {
            Self::Catalog { key } => Some(key),
            Self::Custom { .. } => None,
        }
    }
}

/// 預留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// 預留ID
    pub id: Uuid,

    /// 生產工作項目（需求擁有者）
    pub work_item_id: String,

    /// 預留對象
    pub selector: ResourceSelector,

    /// 預留數量
    pub quantity: Quantity,

    /// 建立/更新時計算的重量（kg）
    pub weight_kg: Decimal,

    /// 建立/更新時計算的成本
    pub cost: Decimal,

    /// 狀態
    pub status: ReservationStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// 耗用時間（僅在耗用時設置）
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// 創建新的預留（狀態為 RESERVED）
    pub fn new(
        work_item_id: impl Into<String>,
        selector: ResourceSelector,
        quantity: Quantity,
        weight_kg: Decimal,
        cost: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            work_item_id: work_item_id.into(),
            selector,
            quantity,
            weight_kg,
            cost,
            status: ReservationStatus::Reserved,
            created_at: now,
            updated_at: now,
            consumed_at: None,
        }
    }

    /// 是否計入佔用
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Reserved
    }

    /// 計入佔用的數量
    pub fn held_quantity(&self) -> Decimal {
        if self.is_active() {
            self.quantity.amount()
        } else {
            Decimal::ZERO
        }
    }

    fn ensure_mutable(&self, action: &'static str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AccountingError::invalid_state(
                EntityKind::Reservation,
                self.id,
                self.status,
                action,
            ));
        }
        Ok(())
    }

    /// 更新數量、重量與成本
    pub fn revise(
        &mut self,
        quantity: Quantity,
        weight_kg: Decimal,
        cost: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_mutable("更新數量")?;
        self.quantity = quantity;
        self.weight_kg = weight_kg;
        self.cost = cost;
        self.updated_at = now;
        Ok(())
    }

    /// 取消
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable("取消")?;
        self.status = ReservationStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// 耗用
    pub fn consume(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable("耗用")?;
        self.status = ReservationStatus::Consumed;
        self.updated_at = now;
        self.consumed_at = Some(now);
        Ok(())
    }
}
