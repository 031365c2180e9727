//! 三方對帳模型（採購單 / 到貨 / 發票）

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AccountingError, EntityKind, Result};

/// 採購單明細
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoLine {
    /// 訂單行參照
    pub line_ref: String,
    pub item_name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Option<Decimal>,
}

impl PoLine {
    pub fn new(line_ref: impl Into<String>, item_name: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            line_ref: line_ref.into(),
            item_name: item_name.into(),
            quantity,
            unit_price,
            vat_rate: None,
        }
    }

    /// 建構器模式：設置稅率
    pub fn with_vat_rate(mut self, rate: Decimal) -> Self {
        self.vat_rate = Some(rate);
        self
    }
}

/// 到貨明細
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLine {
    pub line_ref: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl DeliveryLine {
    pub fn new(line_ref: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            line_ref: line_ref.into(),
            quantity,
            unit_price,
        }
    }
}

/// 發票明細
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_ref: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Option<Decimal>,
}

impl InvoiceLine {
    pub fn new(line_ref: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            line_ref: line_ref.into(),
            quantity,
            unit_price,
            vat_rate: None,
        }
    }

    /// 建構器模式：設置稅率
    pub fn with_vat_rate(mut self, rate: Decimal) -> Self {
        self.vat_rate = Some(rate);
        self
    }
}

/// 未稅 / 稅額 / 含稅合計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub net: Decimal,
    pub vat: Decimal,
    pub gross: Decimal,
}

impl Totals {
    /// 累加一行
    pub fn add_line(&mut self, net: Decimal, vat_rate: Decimal) {
        let vat = (net * vat_rate).round_dp(2);
        self.net += net;
        self.vat += vat;
        self.gross += net + vat;
    }
}

/// 三方各自獨立加總
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTotals {
    pub purchase_order: Totals,
    pub delivery: Totals,
    pub invoice: Totals,
}

/// 差異類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyType {
    Quantity,
    Price,
    Both,
}

/// 嚴重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
}

/// 單行差異
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub line_ref: String,
    pub item_name: String,
    pub po_quantity: Decimal,
    pub po_unit_price: Decimal,
    pub delivery_quantity: Decimal,
    pub delivery_unit_price: Decimal,
    pub invoice_quantity: Decimal,
    pub invoice_unit_price: Decimal,
    /// 發票數量 − 到貨數量
    pub quantity_difference: Decimal,
    /// 發票單價 − 到貨單價
    pub price_difference: Decimal,
    /// 發票金額 − 到貨金額
    pub amount_difference: Decimal,
    pub discrepancy_type: DiscrepancyType,
    pub severity: Severity,
}

/// 核准資訊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approver: String,
    pub approved_at: DateTime<Utc>,
    pub justification: Option<String>,
}

/// 對帳狀態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Matched,
    DiscrepancyPending,
    /// 核准必定帶有核准人與日期
    DiscrepancyApproved(Approval),
}

impl std::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Matched => "matched",
            Self::DiscrepancyPending => "discrepancy_pending",
            Self::DiscrepancyApproved(_) => "discrepancy_approved",
        })
    }
}

/// 訂單對帳記錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub id: Uuid,
    pub order_id: String,
    pub reconciled_at: DateTime<Utc>,
    pub status: ReconciliationStatus,
    pub totals: ReconciliationTotals,
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationRecord {
    /// 創建新的對帳記錄，狀態由差異清單決定
    pub fn new(
        order_id: impl Into<String>,
        totals: ReconciliationTotals,
        discrepancies: Vec<Discrepancy>,
        now: DateTime<Utc>,
    ) -> Self {
        let status = Self::status_for(&discrepancies);
        Self {
            id: Uuid::new_v4(),
            order_id: order_id.into(),
            reconciled_at: now,
            status,
            totals,
            discrepancies,
        }
    }

    fn status_for(discrepancies: &[Discrepancy]) -> ReconciliationStatus {
        if discrepancies.is_empty() {
            ReconciliationStatus::Matched
        } else {
            ReconciliationStatus::DiscrepancyPending
        }
    }

    /// 以重新計算的結果取代差異與合計
    ///
    /// 差異清單未變動時保留既有核准。
    pub fn replace_results(
        &mut self,
        totals: ReconciliationTotals,
        discrepancies: Vec<Discrepancy>,
        now: DateTime<Utc>,
    ) {
        let keep_approval = matches!(self.status, ReconciliationStatus::DiscrepancyApproved(_))
            && self.discrepancies == discrepancies;
        if !keep_approval {
            self.status = Self::status_for(&discrepancies);
        }
        self.totals = totals;
        self.discrepancies = discrepancies;
        self.reconciled_at = now;
    }

    pub fn is_matched(&self) -> bool {
        self.status == ReconciliationStatus::Matched
    }

    /// 最高嚴重程度
    pub fn max_severity(&self) -> Option<Severity> {
        self.discrepancies.iter().map(|d| d.severity).max()
    }

    pub fn approval(&self) -> Option<&Approval> {
        match &self.status {
            ReconciliationStatus::DiscrepancyApproved(approval) => Some(approval),
            _ => None,
        }
    }

    /// 核准差異
    ///
    /// 只允許 discrepancy_pending；含 major 差異時必須填寫說明。
    pub fn approve(
        &mut self,
        approver: impl Into<String>,
        justification: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != ReconciliationStatus::DiscrepancyPending {
            return Err(AccountingError::invalid_state(
                EntityKind::Reconciliation,
                self.id,
                &self.status,
                "核准",
            ));
        }

        let approver = approver.into();
        if approver.trim().is_empty() {
            return Err(AccountingError::validation("核准人不可為空"));
        }

        let justification = justification.filter(|j| !j.trim().is_empty());
        if self.max_severity() == Some(Severity::Major) && justification.is_none() {
            return Err(AccountingError::validation("存在重大差異，核准時必須填寫說明"));
        }

        self.status = ReconciliationStatus::DiscrepancyApproved(Approval {
            approver,
            approved_at: now,
            justification,
        });
        Ok(())
    }
}
