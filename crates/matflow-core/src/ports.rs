//! 外部協作介面（目錄、需求、訂單）
//!
//! 實作方回傳的錯誤原樣往上傳遞；建立採購單必須是全有或全無。

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::reconciliation::{DeliveryLine, InvoiceLine, PoLine};
use crate::resource::{MaterialType, ResourceKey, ResourceStock, StockUnit};
use crate::Result;

/// 採購單參照
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRef(pub String);

impl OrderRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 資源目錄（物料 / 刀具 / 配件 / 材質 / 供應商）
pub trait ResourceCatalog: Send + Sync {
    /// 所有需要追蹤的資源
    fn resource_keys(&self) -> Result<Vec<ResourceKey>>;

    /// 讀取資源目前庫存
    fn resource_stock(&self, key: &ResourceKey) -> Result<ResourceStock>;

    /// 讀取材質
    fn material_type(&self, material_type_id: &str) -> Result<MaterialType>;

    /// 材質密度（g/cm³）
    fn material_type_density(&self, material_type_id: &str) -> Result<Decimal> {
        Ok(self.material_type(material_type_id)?.density)
    }

    /// 供應商提前期（天）
    fn supplier_lead_time_days(&self, supplier_id: &str) -> Result<u32>;
}

/// 尚未被預留覆蓋的生產需求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDemand {
    pub work_item_id: String,
    pub quantity: Decimal,
    pub need_date: Option<NaiveDate>,
}

impl OpenDemand {
    pub fn new(work_item_id: impl Into<String>, quantity: Decimal, need_date: Option<NaiveDate>) -> Self {
        Self {
            work_item_id: work_item_id.into(),
            quantity,
            need_date,
        }
    }
}

/// 生產需求來源
pub trait DemandSource: Send + Sync {
    /// 指定資源的未覆蓋需求
    fn open_demand(&self, key: &ResourceKey) -> Result<Vec<OpenDemand>>;
}

/// 建立採購單的明細
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub resource: ResourceKey,
    pub name: String,
    pub quantity: Decimal,
    pub unit: StockUnit,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
}

/// 建立採購單請求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderRequest {
    pub supplier_id: String,
    pub name: String,
    pub notes: Option<String>,
    pub lines: Vec<PurchaseOrderLine>,
}

/// 訂單元件（採購單建立與對帳資料）
pub trait OrderGateway: Send + Sync {
    /// 建立採購單；失敗時不得留下部分訂單
    fn create_purchase_order(&self, request: &PurchaseOrderRequest) -> Result<OrderRef>;

    fn order_lines(&self, order_id: &str) -> Result<Vec<PoLine>>;

    fn delivery_lines(&self, order_id: &str) -> Result<Vec<DeliveryLine>>;

    fn invoice_lines(&self, order_id: &str) -> Result<Vec<InvoiceLine>>;
}
