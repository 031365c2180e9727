//! 資源庫存視圖（由外部目錄提供，核心唯讀）

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::geometry::Profile;

/// 資源類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// 原物料（板材、棒材、管材）
    Material,
    /// 刀具
    Tool,
    /// 配件
    Accessory,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Material => "material",
            Self::Tool => "tool",
            Self::Accessory => "accessory",
        })
    }
}

/// 資源鍵（類型 + 目錄ID）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub resource_type: ResourceType,
    pub id: String,
}

impl ResourceKey {
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type,
            id: id.into(),
        }
    }

    pub fn material(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Material, id)
    }

    pub fn tool(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Tool, id)
    }

    pub fn accessory(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Accessory, id)
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

/// 庫存單位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockUnit {
    /// 件數（板材、刀具、配件）
    Pieces,
    /// 長度（棒材、管材，公尺）
    Meters,
}

impl std::fmt::Display for StockUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pieces => "pcs",
            Self::Meters => "m",
        })
    }
}

/// 計價方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", content = "price", rename_all = "snake_case")]
pub enum Pricing {
    /// 每庫存單位單價
    PerUnit(Decimal),
    /// 每公斤單價
    PerKg(Decimal),
}

/// 材質（提供密度與每公斤單價）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialType {
    pub id: String,
    pub name: String,
    /// 密度（g/cm³）
    pub density: Decimal,
    /// 每公斤單價
    pub price_per_kg: Decimal,
}

impl MaterialType {
    pub fn new(id: impl Into<String>, name: impl Into<String>, density: Decimal, price_per_kg: Decimal) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            density,
            price_per_kg,
        }
    }
}

/// 資源庫存狀態
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStock {
    /// 資源鍵
    pub key: ResourceKey,

    /// 名稱
    pub name: String,

    /// 幾何外形
    pub profile: Profile,

    /// 現有庫存（件數或公尺）
    pub stock: Decimal,

    /// 最低庫存量
    pub min_quantity: Decimal,

    /// 計價方式
    pub pricing: Pricing,

    /// 材質（按重量計價或計算重量時需要）
    pub material_type_id: Option<String>,

    /// 首選供應商
    pub preferred_supplier_id: Option<String>,

    /// 在途數量（已下單未到貨）
    pub in_transit_quantity: Decimal,

    /// 稅率（例如 0.19）
    pub vat_rate: Option<Decimal>,

    /// 包裝單位（訂購量須為其倍數）
    pub packaging_unit: Option<Decimal>,
}

impl ResourceStock {
    /// 創建新的庫存視圖
    pub fn new(
        key: ResourceKey,
        name: impl Into<String>,
        profile: Profile,
        stock: Decimal,
        pricing: Pricing,
    ) -> Self {
        Self {
            key,
            name: name.into(),
            profile,
            stock,
            min_quantity: Decimal::ZERO,
            pricing,
            material_type_id: None,
            preferred_supplier_id: None,
            in_transit_quantity: Decimal::ZERO,
            vat_rate: None,
            packaging_unit: None,
        }
    }

    /// 建構器模式：設置最低庫存量
    pub fn with_min_quantity(mut self, min_quantity: Decimal) -> Self {
        self.min_quantity = min_quantity;
        self
    }

    /// 建構器模式：設置材質
    pub fn with_material_type(mut self, material_type_id: impl Into<String>) -> Self {
        self.material_type_id = Some(material_type_id.into());
        self
    }

    /// 建構器模式：設置首選供應商
    pub fn with_preferred_supplier(mut self, supplier_id: impl Into<String>) -> Self {
        self.preferred_supplier_id = Some(supplier_id.into());
        self
    }

    /// 建構器模式：設置在途數量
    pub fn with_in_transit(mut self, quantity: Decimal) -> Self {
        self.in_transit_quantity = quantity;
        self
    }

    /// 建構器模式：設置稅率
    pub fn with_vat_rate(mut self, rate: Decimal) -> Self {
        self.vat_rate = Some(rate);
        self
    }

    /// 建構器模式：設置包裝單位
    pub fn with_packaging_unit(mut self, unit: Decimal) -> Self {
        self.packaging_unit = Some(unit);
        self
    }

    /// 庫存單位
    pub fn unit(&self) -> StockUnit {
        self.profile.unit()
    }

    /// 每庫存單位的有效單價
    ///
    /// 按重量計價時需要材質密度換算單位重量；缺少密度時視為 0。
    pub fn unit_price(&self, density: Option<Decimal>) -> Decimal {
        match self.pricing {
            Pricing::PerUnit(price) => price,
            Pricing::PerKg(price_per_kg) => {
                let unit_weight = density
                    .map(|d| self.profile.unit_weight_kg(d))
                    .unwrap_or(Decimal::ZERO);
                (unit_weight * price_per_kg).round_dp(4)
            }
        }
    }

    /// 調整訂購量為包裝單位倍數（無條件進位）
    pub fn round_to_packaging(&self, quantity: Decimal) -> Decimal {
        match self.packaging_unit {
            Some(multiple) if multiple > Decimal::ZERO => {
                let remainder = quantity % multiple;
                if remainder > Decimal::ZERO {
                    quantity - remainder + multiple
                } else {
                    quantity
                }
            }
            _ => quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn plate() -> ResourceStock {
        ResourceStock::new(
            ResourceKey::material("PLATE-A"),
            "Plate-A",
            Profile::Flat {
                x: Decimal::from(100),
                y: Decimal::from(200),
                z: Decimal::from(10),
            },
            Decimal::from(20),
            Pricing::PerKg(Decimal::from(2)),
        )
    }

    #[test]
    fn test_resource_key_display() {
        assert_eq!(ResourceKey::tool("T-7").to_string(), "tool:T-7");
        assert_eq!(ResourceKey::material("PLATE-A").to_string(), "material:PLATE-A");
    }

    #[test]
    fn test_unit_price_per_kg_uses_unit_weight() {
        let stock = plate();
        // 100 x 200 x 10 mm = 200000 mm³，7.85 g/cm³ → 1.57 kg/片
        assert_eq!(stock.unit_price(Some(Decimal::new(785, 2))), Decimal::new(314, 2));
        assert_eq!(stock.unit_price(None), Decimal::ZERO);
    }

    #[test]
    fn test_unit_price_per_unit() {
        let stock = ResourceStock::new(
            ResourceKey::tool("DRILL-8"),
            "Drill 8mm",
            Profile::Discrete,
            Decimal::from(4),
            Pricing::PerUnit(Decimal::new(1250, 2)),
        );
        assert_eq!(stock.unit_price(None), Decimal::new(1250, 2));
        assert_eq!(stock.unit(), StockUnit::Pieces);
    }

    #[rstest]
    #[case(Decimal::from(7), Decimal::from(10))]
    #[case(Decimal::from(10), Decimal::from(10))]
    #[case(Decimal::from(11), Decimal::from(20))]
    #[case(Decimal::ZERO, Decimal::ZERO)]
    fn test_round_to_packaging(#[case] quantity: Decimal, #[case] expected: Decimal) {
        let stock = plate().with_packaging_unit(Decimal::from(10));
        assert_eq!(stock.round_to_packaging(quantity), expected);
    }

    #[test]
    fn test_round_without_packaging_unit() {
        assert_eq!(plate().round_to_packaging(Decimal::from(7)), Decimal::from(7));
    }
}
