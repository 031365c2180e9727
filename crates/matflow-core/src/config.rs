//! 資源帳務設定
//!
//! 所有業務門檻（優先級時窗、差異容差、嚴重程度級距）皆為設定值。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountingError, Result};

/// 整體設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    /// 短缺分析門檻
    pub shortage: ShortageThresholds,

    /// 對帳門檻
    pub reconciliation: ReconciliationThresholds,

    /// 資源或訂單行未提供稅率時使用
    pub default_vat_rate: Decimal,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            shortage: ShortageThresholds::default(),
            reconciliation: ReconciliationThresholds::default(),
            default_vat_rate: Decimal::ZERO,
        }
    }
}

impl AccountingConfig {
    /// 從 JSON 載入設定（未提供的欄位使用預設值）
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AccountingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 建構器模式：設置短缺門檻
    pub fn with_shortage(mut self, shortage: ShortageThresholds) -> Self {
        self.shortage = shortage;
        self
    }

    /// 建構器模式：設置對帳門檻
    pub fn with_reconciliation(mut self, reconciliation: ReconciliationThresholds) -> Self {
        self.reconciliation = reconciliation;
        self
    }

    /// 建構器模式：設置預設稅率
    pub fn with_default_vat_rate(mut self, rate: Decimal) -> Self {
        self.default_vat_rate = rate;
        self
    }

    /// 檢查設定一致性
    pub fn validate(&self) -> Result<()> {
        if self.default_vat_rate < Decimal::ZERO {
            return Err(AccountingError::Config("default_vat_rate 不可為負".to_string()));
        }
        self.reconciliation.validate()
    }
}

/// 短缺優先級門檻
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortageThresholds {
    /// 最早需求日期落在今天起此天數內即為 CRITICAL
    pub critical_window_days: u32,

    /// 是否輸出 LOW 優先級（供儀表板顯示）
    pub include_low_priority: bool,
}

impl Default for ShortageThresholds {
    fn default() -> Self {
        Self {
            critical_window_days: 7,
            include_low_priority: false,
        }
    }
}

impl ShortageThresholds {
    /// 建構器模式：設置緊急時窗
    pub fn with_critical_window_days(mut self, days: u32) -> Self {
        self.critical_window_days = days;
        self
    }

    /// 建構器模式：設置是否輸出 LOW
    pub fn with_include_low_priority(mut self, include: bool) -> Self {
        self.include_low_priority = include;
        self
    }
}

/// 對帳容差與嚴重程度級距
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationThresholds {
    /// 數量差異容差（絕對值不超過即視為相符）
    pub quantity_tolerance: Decimal,

    /// 單價差異容差
    pub price_tolerance: Decimal,

    /// |金額差異| 低於此值為 minor
    pub minor_below: Decimal,

    /// |金額差異| 達此值為 major
    pub major_from_amount: Decimal,

    /// |金額差異| 達到貨金額此百分比為 major
    pub major_from_percent: Decimal,
}

impl Default for ReconciliationThresholds {
    fn default() -> Self {
        Self {
            quantity_tolerance: Decimal::ZERO,
            price_tolerance: Decimal::ZERO,
            minor_below: Decimal::TEN,
            major_from_amount: Decimal::ONE_HUNDRED,
            major_from_percent: Decimal::TEN,
        }
    }
}

impl ReconciliationThresholds {
    /// 建構器模式：設置容差
    pub fn with_tolerances(mut self, quantity: Decimal, price: Decimal) -> Self {
        self.quantity_tolerance = quantity;
        self.price_tolerance = price;
        self
    }

    /// 建構器模式：設置嚴重程度級距
    pub fn with_severity_bands(mut self, minor_below: Decimal, major_from_amount: Decimal, major_from_percent: Decimal) -> Self {
        self.minor_below = minor_below;
        self.major_from_amount = major_from_amount;
        self.major_from_percent = major_from_percent;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.quantity_tolerance < Decimal::ZERO || self.price_tolerance < Decimal::ZERO {
            return Err(AccountingError::Config("容差不可為負".to_string()));
        }
        if self.minor_below > self.major_from_amount {
            return Err(AccountingError::Config(format!(
                "minor_below ({}) 不可大於 major_from_amount ({})",
                self.minor_below, self.major_from_amount
            )));
        }
        if self.major_from_percent <= Decimal::ZERO {
            return Err(AccountingError::Config("major_from_percent 必須大於 0".to_string()));
        }
        Ok(())
    }
}
