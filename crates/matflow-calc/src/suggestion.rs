//! 採購建議分組與轉單
//!
//! 依 (首選供應商, 資源類型) 分組；轉單在群組鎖內完成檢查、建立與寫回。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use matflow_core::{
    AccountingError, AnalysisStatus, Clock, DomainEvent, EntityKind, ErrorKind, EventSink,
    OrderGateway, OrderRef, Priority, PurchaseOrderLine, PurchaseOrderRequest, ResourceCatalog, ResourceType,
    Result, ShortageAnalysis, SuggestionGroup, SuggestionStatus,
};
use matflow_store::{KeyedLocks, Store};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::lead_time::LeadTimeCalculator;

/// 分組結果
#[derive(Debug, Clone, Default)]
pub struct GroupingOutcome {
    /// 新建或更新的 PENDING 群組
    pub groups: Vec<SuggestionGroup>,
    /// 沒有首選供應商、無法下單的短缺
    pub unassignable: Vec<ShortageAnalysis>,
    /// 成員已全部結案而自動忽略的 PENDING 群組
    pub retired: Vec<SuggestionGroup>,
}

/// 分析仍屬於群組的待訂購項目：未結案、有建議量且供應商與類型相符
fn is_active_member(group: &SuggestionGroup, analysis: &ShortageAnalysis) -> bool {
    analysis.status != AnalysisStatus::Resolved
        && analysis.suggested_order_quantity > Decimal::ZERO
        && analysis.preferred_supplier_id.as_deref() == Some(group.supplier_id.as_str())
        && analysis.resource.resource_type == group.resource_type
}

/// 由成員分析計算群組內容
pub fn build_group(
    supplier_id: &str,
    resource_type: ResourceType,
    members: &[&ShortageAnalysis],
    lead_time_days: u32,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> SuggestionGroup {
    let mut net = Decimal::ZERO;
    let mut gross = Decimal::ZERO;
    for member in members {
        let line_net = member.suggested_order_quantity * member.unit_price;
        net += line_net;
        gross += line_net + line_net * member.vat_rate;
    }

    // 無需求日期的成員不影響下單日期
    let earliest_need_date = members.iter().filter_map(|m| m.earliest_need_date).min();
    let suggested_order_date = earliest_need_date
        .map(|date| LeadTimeCalculator::calculate_order_date(date, lead_time_days))
        .unwrap_or(today);

    SuggestionGroup {
        id: Uuid::new_v4(),
        supplier_id: supplier_id.to_string(),
        resource_type,
        analysis_ids: members.iter().map(|m| m.id).collect(),
        item_count: members.len(),
        estimated_net: net.round_dp(2),
        estimated_gross: gross.round_dp(2),
        lead_time_days,
        earliest_need_date,
        suggested_order_date,
        highest_priority: members
            .iter()
            .map(|m| m.priority)
            .max()
            .unwrap_or(Priority::Low),
        status: SuggestionStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

/// 採購建議分組器
pub struct SuggestionGrouper {
    catalog: Arc<dyn ResourceCatalog>,
    orders: Arc<dyn OrderGateway>,
    store: Arc<Store>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<Uuid>,
}

impl SuggestionGrouper {
    /// 創建新的分組器
    pub fn new(
        catalog: Arc<dyn ResourceCatalog>,
        orders: Arc<dyn OrderGateway>,
        store: Arc<Store>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            orders,
            store,
            events,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    /// 將有短缺的分析依供應商與資源類型分組
    ///
    /// 同鍵已有 PENDING 群組時就地更新；已下單或已忽略的群組不受影響。
    /// 本輪未涉及、且記錄表中已無有效成員的 PENDING 群組會被忽略。
    pub fn group(&self, analyses: &[ShortageAnalysis]) -> Result<GroupingOutcome> {
        let mut outcome = GroupingOutcome::default();
        let mut partitions: BTreeMap<(String, ResourceType), Vec<&ShortageAnalysis>> =
            BTreeMap::new();

        for analysis in analyses.iter().filter(|a| a.has_shortage()) {
            match &analysis.preferred_supplier_id {
                Some(supplier_id) => partitions
                    .entry((supplier_id.clone(), analysis.resource.resource_type))
                    .or_default()
                    .push(analysis),
                None => {
                    tracing::debug!(resource = %analysis.resource, "沒有首選供應商，無法分組");
                    outcome.unassignable.push(analysis.clone());
                }
            }
        }

        let today = self.clock.today();
        let now = self.clock.now();
        for ((supplier_id, resource_type), members) in partitions {
            let lead_time_days = self.catalog.supplier_lead_time_days(&supplier_id)?;
            let draft = build_group(&supplier_id, resource_type, &members, lead_time_days, today, now);
            let group = self.store_group(draft)?;
            self.link_members(&group)?;

            tracing::debug!(
                group_id = %group.id,
                supplier = %group.supplier_id,
                items = group.item_count,
                net = %group.estimated_net,
                "採購建議"
            );
            outcome.groups.push(group);
        }

        let touched: Vec<Uuid> = outcome.groups.iter().map(|g| g.id).collect();
        outcome.retired = self.retire_stale(&touched, now)?;

        tracing::info!(
            "採購建議分組完成：群組 {} 個，無供應商短缺 {} 筆，自動忽略 {} 個",
            outcome.groups.len(),
            outcome.unassignable.len(),
            outcome.retired.len()
        );
        Ok(outcome)
    }

    /// 忽略成員已全部結案的 PENDING 群組，避免舊建議被重複下單
    fn retire_stale(&self, touched: &[Uuid], now: DateTime<Utc>) -> Result<Vec<SuggestionGroup>> {
        let candidates = self
            .store
            .suggestions
            .filter(|g| g.is_pending() && !touched.contains(&g.id));

        let mut retired = Vec::new();
        for candidate in candidates {
            if self.has_active_member(&candidate) {
                continue;
            }

            let lock = self.locks.handle(&candidate.id);
            // 正在轉單的群組留給轉單流程處理
            let Some(_guard) = lock.try_lock() else {
                continue;
            };
            let dismissed = self.store.suggestions.update(&candidate.id, |group| {
                group.dismiss(now)?;
                Ok(group.clone())
            });
            match dismissed {
                Ok(group) => {
                    tracing::info!(group_id = %group.id, supplier = %group.supplier_id, "採購建議已無待訂購項目，自動忽略");
                    retired.push(group);
                }
                Err(e) if e.kind() == ErrorKind::InvalidState => {}
                Err(e) => return Err(e),
            }
        }
        Ok(retired)
    }

    fn has_active_member(&self, group: &SuggestionGroup) -> bool {
        group.analysis_ids.iter().any(|id| {
            self.store
                .analyses
                .record(id)
                .is_ok_and(|analysis| is_active_member(group, &analysis))
        })
    }

    /// 新增群組，或就地更新同鍵的 PENDING 群組（保留 ID 與建立時間）
    fn store_group(&self, draft: SuggestionGroup) -> Result<SuggestionGroup> {
        let existing = self.store.suggestions.find(|g| {
            g.is_pending() && g.supplier_id == draft.supplier_id && g.resource_type == draft.resource_type
        });

        if let Some(existing) = existing {
            let id = existing.record.id;
            let lock = self.locks.handle(&id);
            let _guard = lock.lock();

            let refreshed = self.store.suggestions.update(&id, |group| {
                group.ensure_orderable()?;
                *group = SuggestionGroup {
                    id,
                    created_at: group.created_at,
                    ..draft.clone()
                };
                Ok(group.clone())
            });
            match refreshed {
                Ok(group) => return Ok(group),
                // 等待鎖期間已被轉單或忽略
                Err(e) if e.kind() == ErrorKind::InvalidState => {}
                Err(e) => return Err(e),
            }
        }

        self.store.suggestions.insert(draft.id, draft.clone())?;
        Ok(draft)
    }

    fn link_members(&self, group: &SuggestionGroup) -> Result<()> {
        for analysis_id in &group.analysis_ids {
            let linked = self.store.analyses.update(analysis_id, |analysis| {
                analysis.suggestion_group_id = Some(group.id);
                Ok(())
            });
            match linked {
                Ok(()) => {}
                // 呼叫端自行組成、未寫入記錄表的分析
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// 將 PENDING 群組轉為採購單
    ///
    /// 建立失敗時群組維持 PENDING，錯誤原樣回傳。
    pub fn materialize(
        &self,
        group_id: Uuid,
        supplier_id: &str,
        order_name: &str,
        notes: Option<String>,
    ) -> Result<OrderRef> {
        if supplier_id.trim().is_empty() {
            return Err(AccountingError::validation("轉單必須指定供應商"));
        }

        let lock = self.locks.handle(&group_id);
        let Some(_guard) = lock.try_lock() else {
            tracing::warn!(group_id = %group_id, "採購建議正在轉單中");
            return Err(AccountingError::conflict(EntityKind::SuggestionGroup, group_id));
        };

        let group = self.store.suggestions.record(&group_id)?;
        group.ensure_orderable()?;

        let mut lines = Vec::with_capacity(group.analysis_ids.len());
        for analysis_id in &group.analysis_ids {
            let analysis = self.store.analyses.record(analysis_id)?;
            if !is_active_member(&group, &analysis) {
                tracing::debug!(group_id = %group_id, resource = %analysis.resource, "項目已結案，不列入採購單");
                continue;
            }
            lines.push(PurchaseOrderLine {
                resource: analysis.resource.clone(),
                name: analysis.resource_name.clone(),
                quantity: analysis.suggested_order_quantity,
                unit: analysis.unit,
                unit_price: analysis.unit_price,
                vat_rate: analysis.vat_rate,
            });
        }
        if lines.is_empty() {
            return Err(AccountingError::validation(format!(
                "採購建議 {group_id} 沒有需要訂購的項目"
            )));
        }

        let request = PurchaseOrderRequest {
            supplier_id: supplier_id.to_string(),
            name: order_name.to_string(),
            notes,
            lines,
        };
        let order = self.orders.create_purchase_order(&request).map_err(|e| {
            tracing::warn!(group_id = %group_id, error = %e, "建立採購單失敗，建議維持 PENDING");
            e
        })?;

        let now = self.clock.now();
        self.store
            .suggestions
            .update(&group_id, |group| group.mark_ordered(order.clone(), now))?;

        let expected_delivery =
            LeadTimeCalculator::calculate_delivery_date(now.date_naive(), group.lead_time_days);
        tracing::info!(
            group_id = %group_id,
            supplier = supplier_id,
            order = %order,
            lines = request.lines.len(),
            %expected_delivery,
            "採購建議已轉為採購單"
        );
        self.events.publish(DomainEvent::SuggestionOrdered {
            group_id,
            supplier_id: supplier_id.to_string(),
            order: order.clone(),
        });

        Ok(order)
    }

    /// 忽略 PENDING 群組
    pub fn dismiss(&self, group_id: Uuid) -> Result<SuggestionGroup> {
        let lock = self.locks.handle(&group_id);
        let Some(_guard) = lock.try_lock() else {
            return Err(AccountingError::conflict(EntityKind::SuggestionGroup, group_id));
        };

        let now = self.clock.now();
        let dismissed = self.store.suggestions.update(&group_id, |group| {
            group.dismiss(now)?;
            Ok(group.clone())
        })?;

        tracing::info!(group_id = %group_id, "忽略採購建議");
        Ok(dismissed)
    }

    /// 讀取群組
    pub fn get(&self, group_id: Uuid) -> Result<SuggestionGroup> {
        self.store.suggestions.record(&group_id)
    }

    /// 所有 PENDING 群組（依建議下單日期排序）
    pub fn pending(&self) -> Vec<SuggestionGroup> {
        let mut groups = self.store.suggestions.filter(|g| g.is_pending());
        groups.sort_by(|a, b| {
            a.suggested_order_date
                .cmp(&b.suggested_order_date)
                .then_with(|| a.supplier_id.cmp(&b.supplier_id))
        });
        groups
    }
}
