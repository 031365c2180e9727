//! 領域事件（由外部通知元件消費）

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ports::OrderRef;
use crate::reconciliation::Severity;
use crate::resource::{ResourceKey, StockUnit};

/// 領域事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ReservationCreated {
        reservation_id: Uuid,
        work_item_id: String,
        /// 自訂規格為 None
        resource: Option<ResourceKey>,
        quantity: Decimal,
        unit: StockUnit,
    },
    ReservationUpdated {
        reservation_id: Uuid,
        quantity: Decimal,
    },
    ReservationCancelled {
        reservation_id: Uuid,
    },
    ReservationConsumed {
        reservation_id: Uuid,
    },
    ShortageCritical {
        analysis_id: Uuid,
        resource: ResourceKey,
        shortage_quantity: Decimal,
        earliest_need_date: Option<NaiveDate>,
    },
    SuggestionOrdered {
        group_id: Uuid,
        supplier_id: String,
        order: OrderRef,
    },
    ReconciliationDiscrepancyFound {
        reconciliation_id: Uuid,
        order_id: String,
        discrepancy_count: usize,
        max_severity: Severity,
    },
    ReconciliationApproved {
        reconciliation_id: Uuid,
        order_id: String,
        approver: String,
    },
}

impl DomainEvent {
    /// 事件名稱
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReservationCreated { .. } => "reservation_created",
            Self::ReservationUpdated { .. } => "reservation_updated",
            Self::ReservationCancelled { .. } => "reservation_cancelled",
            Self::ReservationConsumed { .. } => "reservation_consumed",
            Self::ShortageCritical { .. } => "shortage_critical",
            Self::SuggestionOrdered { .. } => "suggestion_ordered",
            Self::ReconciliationDiscrepancyFound { .. } => "reconciliation_discrepancy_found",
            Self::ReconciliationApproved { .. } => "reconciliation_approved",
        }
    }
}

/// 事件出口
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// 以 tracing 輸出 JSON 事件
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: DomainEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(event = event.name(), %payload, "領域事件"),
            Err(e) => tracing::warn!(event = event.name(), error = %e, "事件序列化失敗"),
        }
    }
}

/// 丟棄所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: DomainEvent) {}
}
