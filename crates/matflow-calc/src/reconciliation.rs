//! 三方對帳（採購單 / 到貨 / 發票）
//!
//! 明細以訂單行參照比對，依參照排序處理，相同輸入必得相同結果。

use std::collections::BTreeMap;
use std::sync::Arc;

use matflow_core::{
    AccountingConfig, AccountingError, Clock, DeliveryLine, Discrepancy, DiscrepancyType,
    DomainEvent, EntityKind, EventSink, InvoiceLine, OrderGateway, PoLine, ReconciliationRecord,
    ReconciliationStatus, ReconciliationThresholds, ReconciliationTotals, Result, Severity,
};
use matflow_store::{KeyedLocks, Store};
use rust_decimal::Decimal;
use uuid::Uuid;

/// 同一參照的合併明細
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MergedLine {
    quantity: Decimal,
    unit_price: Decimal,
}

impl MergedLine {
    /// 同參照多行時數量相加，單價取金額加權平均
    fn merge(lines: &[(Decimal, Decimal)]) -> Option<Self> {
        let (first_quantity, first_price) = *lines.first()?;
        if lines.len() == 1 {
            return Some(Self {
                quantity: first_quantity,
                unit_price: first_price,
            });
        }

        let quantity: Decimal = lines.iter().map(|(q, _)| *q).sum();
        let amount: Decimal = lines.iter().map(|(q, p)| *q * *p).sum();
        let unit_price = if quantity.is_zero() {
            first_price
        } else {
            (amount / quantity).round_dp(4)
        };
        Some(Self { quantity, unit_price })
    }

    fn amount(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

/// 單一參照的三方比對輸入
struct LineTriple {
    item_name: String,
    po: MergedLine,
    delivery: MergedLine,
    invoice: MergedLine,
    vat_rate: Decimal,
    /// 發票行自帶稅率，否則同採購單
    invoice_vat_rate: Decimal,
}

/// 對帳計算結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub totals: ReconciliationTotals,
    pub discrepancies: Vec<Discrepancy>,
}

/// 依金額差異判定嚴重程度（先判定 major）
pub fn classify_severity(
    amount_difference: Decimal,
    delivery_value: Decimal,
    thresholds: &ReconciliationThresholds,
) -> Severity {
    let magnitude = amount_difference.abs();
    if magnitude.is_zero() {
        return Severity::Minor;
    }

    let percent_of_value = if delivery_value.is_zero() {
        None
    } else {
        Some(magnitude / delivery_value.abs() * Decimal::ONE_HUNDRED)
    };
    let major = magnitude >= thresholds.major_from_amount
        || percent_of_value.map_or(true, |p| p >= thresholds.major_from_percent);

    if major {
        Severity::Major
    } else if magnitude < thresholds.minor_below {
        Severity::Minor
    } else {
        Severity::Moderate
    }
}

/// 比對三方明細，回傳合計與差異清單
pub fn compare(
    po_lines: &[PoLine],
    delivery_lines: &[DeliveryLine],
    invoice_lines: &[InvoiceLine],
    config: &AccountingConfig,
) -> Comparison {
    let thresholds = &config.reconciliation;
    let mut totals = ReconciliationTotals::default();
    let mut discrepancies = Vec::new();

    for (line_ref, line) in match_lines(po_lines, delivery_lines, invoice_lines, config.default_vat_rate) {
        totals.purchase_order.add_line(line.po.amount(), line.vat_rate);
        totals.delivery.add_line(line.delivery.amount(), line.vat_rate);
        totals.invoice.add_line(line.invoice.amount(), line.invoice_vat_rate);

        let quantity_difference = line.invoice.quantity - line.delivery.quantity;
        let price_difference = line.invoice.unit_price - line.delivery.unit_price;
        let amount_difference = (line.invoice.amount() - line.delivery.amount()).round_dp(2);

        let quantity_off = quantity_difference.abs() > thresholds.quantity_tolerance;
        let price_off = price_difference.abs() > thresholds.price_tolerance;
        let discrepancy_type = match (quantity_off, price_off) {
            (true, true) => DiscrepancyType::Both,
            (true, false) => DiscrepancyType::Quantity,
            (false, true) => DiscrepancyType::Price,
            (false, false) => continue,
        };

        let severity = classify_severity(amount_difference, line.delivery.amount(), thresholds);
        tracing::debug!(
            line_ref = %line_ref,
            %quantity_difference,
            %price_difference,
            %amount_difference,
            ?severity,
            "對帳差異"
        );

        discrepancies.push(Discrepancy {
            line_ref,
            item_name: line.item_name,
            po_quantity: line.po.quantity,
            po_unit_price: line.po.unit_price,
            delivery_quantity: line.delivery.quantity,
            delivery_unit_price: line.delivery.unit_price,
            invoice_quantity: line.invoice.quantity,
            invoice_unit_price: line.invoice.unit_price,
            quantity_difference,
            price_difference,
            amount_difference,
            discrepancy_type,
            severity,
        });
    }

    Comparison {
        totals,
        discrepancies,
    }
}

/// 以訂單行參照配對三方明細
///
/// 缺少到貨行時視為數量 0、單價沿用採購單；缺少發票行時視為數量 0、單價沿用到貨；
/// 沒有採購單行時採購數量為 0、單價沿用到貨或發票。
/// 稅率取採購單行，未設定時用預設稅率；發票合計優先使用發票行自帶的稅率。
fn match_lines(
    po_lines: &[PoLine],
    delivery_lines: &[DeliveryLine],
    invoice_lines: &[InvoiceLine],
    default_vat_rate: Decimal,
) -> BTreeMap<String, LineTriple> {
    let mut po: BTreeMap<&str, Vec<&PoLine>> = BTreeMap::new();
    for line in po_lines {
        po.entry(line.line_ref.as_str()).or_default().push(line);
    }
    let mut delivery: BTreeMap<&str, Vec<(Decimal, Decimal)>> = BTreeMap::new();
    for line in delivery_lines {
        delivery
            .entry(line.line_ref.as_str())
            .or_default()
            .push((line.quantity, line.unit_price));
    }
    let mut invoice: BTreeMap<&str, Vec<&InvoiceLine>> = BTreeMap::new();
    for line in invoice_lines {
        invoice.entry(line.line_ref.as_str()).or_default().push(line);
    }

    let mut refs: Vec<&str> = po
        .keys()
        .chain(delivery.keys())
        .chain(invoice.keys())
        .copied()
        .collect();
    refs.sort_unstable();
    refs.dedup();

    let mut matched = BTreeMap::new();
    for line_ref in refs {
        let po_group = po.get(line_ref);
        let invoice_group = invoice.get(line_ref);

        let po_merged = po_group.and_then(|lines| {
            let pairs: Vec<_> = lines.iter().map(|l| (l.quantity, l.unit_price)).collect();
            MergedLine::merge(&pairs)
        });
        let delivery_merged = delivery.get(line_ref).and_then(|pairs| MergedLine::merge(pairs));
        let invoice_merged = invoice_group.and_then(|lines| {
            let pairs: Vec<_> = lines.iter().map(|l| (l.quantity, l.unit_price)).collect();
            MergedLine::merge(&pairs)
        });

        let fallback_price = po_merged
            .or(delivery_merged)
            .or(invoice_merged)
            .map(|l| l.unit_price)
            .unwrap_or(Decimal::ZERO);
        let delivery_line = delivery_merged.unwrap_or(MergedLine {
            quantity: Decimal::ZERO,
            unit_price: fallback_price,
        });
        let invoice_line = invoice_merged.unwrap_or(MergedLine {
            quantity: Decimal::ZERO,
            unit_price: delivery_line.unit_price,
        });
        let po_line = po_merged.unwrap_or(MergedLine {
            quantity: Decimal::ZERO,
            unit_price: delivery_merged.map_or(invoice_line.unit_price, |d| d.unit_price),
        });

        let item_name = po_group
            .and_then(|lines| lines.first())
            .map(|l| l.item_name.clone())
            .unwrap_or_else(|| line_ref.to_string());
        let vat_rate = po_group
            .and_then(|lines| lines.iter().find_map(|l| l.vat_rate))
            .unwrap_or(default_vat_rate);
        let invoice_vat_rate = invoice_group
            .and_then(|lines| lines.iter().find_map(|l| l.vat_rate))
            .unwrap_or(vat_rate);

        matched.insert(
            line_ref.to_string(),
            LineTriple {
                item_name,
                po: po_line,
                delivery: delivery_line,
                invoice: invoice_line,
                vat_rate,
                invoice_vat_rate,
            },
        );
    }
    matched
}

/// 對帳引擎
pub struct ReconciliationEngine {
    orders: Arc<dyn OrderGateway>,
    store: Arc<Store>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: AccountingConfig,
    /// 同一訂單的對帳串行執行
    locks: KeyedLocks<String>,
}

impl ReconciliationEngine {
    /// 創建新的對帳引擎
    pub fn new(
        orders: Arc<dyn OrderGateway>,
        store: Arc<Store>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: &AccountingConfig,
    ) -> Self {
        Self {
            orders,
            store,
            events,
            clock,
            config: config.clone(),
            locks: KeyedLocks::new(),
        }
    }

    /// 對帳指定訂單；既有記錄就地更新並保留 ID
    pub fn reconcile(&self, order_id: &str) -> Result<ReconciliationRecord> {
        let lock = self.locks.handle(&order_id.to_string());
        let _guard = lock.lock();

        let po_lines = self.orders.order_lines(order_id)?;
        let delivery_lines = self.orders.delivery_lines(order_id)?;
        let invoice_lines = self.orders.invoice_lines(order_id)?;
        tracing::debug!(
            order_id,
            po = po_lines.len(),
            delivery = delivery_lines.len(),
            invoice = invoice_lines.len(),
            "載入對帳明細"
        );
        // 尚未開立發票的訂單不建立對帳記錄
        if invoice_lines.is_empty() {
            tracing::warn!(order_id, "訂單尚無發票明細，略過對帳");
            return Err(AccountingError::invalid_state(
                EntityKind::Order,
                order_id,
                "not_invoiced",
                "對帳",
            ));
        }

        let Comparison {
            totals,
            discrepancies,
        } = compare(&po_lines, &delivery_lines, &invoice_lines, &self.config);
        let now = self.clock.now();

        let record = match self.store.reconciliations.find(|r| r.order_id == order_id) {
            Some(existing) => self.store.reconciliations.update(&existing.record.id, |record| {
                record.replace_results(totals, discrepancies, now);
                Ok(record.clone())
            })?,
            None => {
                let record = ReconciliationRecord::new(order_id, totals, discrepancies, now);
                self.store.reconciliations.insert(record.id, record.clone())?;
                record
            }
        };

        tracing::info!(
            order_id,
            reconciliation_id = %record.id,
            status = %record.status,
            discrepancies = record.discrepancies.len(),
            "對帳完成"
        );

        if record.status == ReconciliationStatus::DiscrepancyPending {
            if let Some(max_severity) = record.max_severity() {
                self.events.publish(DomainEvent::ReconciliationDiscrepancyFound {
                    reconciliation_id: record.id,
                    order_id: record.order_id.clone(),
                    discrepancy_count: record.discrepancies.len(),
                    max_severity,
                });
            }
        }

        Ok(record)
    }

    /// 核准差異；版本不符（並行核准）時回傳衝突
    pub fn approve(
        &self,
        reconciliation_id: Uuid,
        approver: &str,
        justification: Option<String>,
    ) -> Result<ReconciliationRecord> {
        let current = self.store.reconciliations.get(&reconciliation_id)?;
        let mut approved = current.record;
        approved.approve(approver, justification, self.clock.now())?;
        self.store
            .reconciliations
            .compare_and_swap(&reconciliation_id, current.version, approved.clone())?;

        tracing::info!(
            reconciliation_id = %reconciliation_id,
            order_id = %approved.order_id,
            approver,
            "核准對帳差異"
        );
        self.events.publish(DomainEvent::ReconciliationApproved {
            reconciliation_id,
            order_id: approved.order_id.clone(),
            approver: approver.to_string(),
        });

        Ok(approved)
    }

    /// 讀取對帳記錄
    pub fn get(&self, reconciliation_id: Uuid) -> Result<ReconciliationRecord> {
        self.store.reconciliations.record(&reconciliation_id)
    }

    /// 訂單的對帳記錄
    pub fn for_order(&self, order_id: &str) -> Option<ReconciliationRecord> {
        self.store
            .reconciliations
            .find(|r| r.order_id == order_id)
            .map(|v| v.record)
    }
}
