//! 短缺分析
//!
//! 以單次預留總量快照逐資源計算可用量與短缺，並以資源鍵 upsert 分析記錄。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use matflow_core::shortage::{available_quantity, shortage_quantity};
use matflow_core::{
    AccountingConfig, AccountingError, AnalysisStatus, Clock, DemandSource, DomainEvent,
    EntityKind, EventSink, Priority, ResourceCatalog, ResourceKey, ResourceType, Result,
    ShortageAnalysis, ShortageThresholds,
};
use matflow_store::Store;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::lead_time::LeadTimeCalculator;
use crate::{AnalysisReport, AnalysisWarning};

/// 依短缺、可用量與需求日期判定優先級
pub fn classify(
    shortage: Decimal,
    available: Decimal,
    min_quantity: Decimal,
    earliest_need_date: Option<NaiveDate>,
    today: NaiveDate,
    thresholds: &ShortageThresholds,
) -> Priority {
    if shortage > Decimal::ZERO {
        let imminent = earliest_need_date.is_some_and(|date| {
            LeadTimeCalculator::days_until(today, date) <= i64::from(thresholds.critical_window_days)
        });
        if available <= Decimal::ZERO || imminent {
            Priority::Critical
        } else {
            Priority::High
        }
    } else if available < min_quantity {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// 單一資源的計算結果
struct Evaluation {
    key: ResourceKey,
    /// None 表示不需輸出
    analysis: Option<ShortageAnalysis>,
    warnings: Vec<AnalysisWarning>,
}

/// 儀表板摘要（最新分析集合的純聚合）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub open: usize,
    pub acknowledged: usize,
    pub by_priority: BTreeMap<Priority, usize>,
    pub by_resource_type: BTreeMap<ResourceType, usize>,
    /// Σ 短缺數量 × 單價
    pub total_shortage_value: Decimal,
    /// CRITICAL 記錄的短缺金額
    pub critical_shortage_value: Decimal,
}

impl DashboardSummary {
    pub fn from_analyses(analyses: &[ShortageAnalysis]) -> Self {
        let mut summary = Self::default();
        for analysis in analyses {
            summary.total += 1;
            match analysis.status {
                AnalysisStatus::Open => summary.open += 1,
                AnalysisStatus::Acknowledged => summary.acknowledged += 1,
                AnalysisStatus::Resolved => {}
            }
            *summary.by_priority.entry(analysis.priority).or_insert(0) += 1;
            *summary
                .by_resource_type
                .entry(analysis.resource.resource_type)
                .or_insert(0) += 1;

            let value = analysis.shortage_value();
            summary.total_shortage_value += value;
            if analysis.priority == Priority::Critical {
                summary.critical_shortage_value += value;
            }
        }
        summary.total_shortage_value = summary.total_shortage_value.round_dp(2);
        summary.critical_shortage_value = summary.critical_shortage_value.round_dp(2);
        summary
    }
}

/// 短缺分析器
pub struct ShortageAnalyzer {
    catalog: Arc<dyn ResourceCatalog>,
    demand: Arc<dyn DemandSource>,
    store: Arc<Store>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    thresholds: ShortageThresholds,
    default_vat_rate: Decimal,
    /// 同時只允許一次分析寫入記錄
    run_lock: Mutex<()>,
    /// 最新分析集合：各資源最近一次分析輸出的記錄
    latest: RwLock<HashMap<ResourceKey, Uuid>>,
}

impl ShortageAnalyzer {
    /// 創建新的短缺分析器
    pub fn new(
        catalog: Arc<dyn ResourceCatalog>,
        demand: Arc<dyn DemandSource>,
        store: Arc<Store>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: &AccountingConfig,
    ) -> Self {
        Self {
            catalog,
            demand,
            store,
            events,
            clock,
            thresholds: config.shortage.clone(),
            default_vat_rate: config.default_vat_rate,
            run_lock: Mutex::new(()),
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// 分析所有追蹤中的資源
    pub fn analyze(&self) -> Result<AnalysisReport> {
        let _run = self.run_lock.lock();
        self.store.reservations.dirty().clear();

        let keys = self.catalog.resource_keys()?;
        tracing::info!("開始短缺分析：資源 {} 項", keys.len());

        // 目錄中已不存在的資源也一併結案
        self.run(&keys, |_| true)
    }

    /// 只重新分析預留有變動的資源
    pub fn analyze_changed(&self) -> Result<AnalysisReport> {
        let _run = self.run_lock.lock();
        let dirty: HashSet<ResourceKey> = self.store.reservations.dirty().drain().into_iter().collect();
        if dirty.is_empty() {
            tracing::debug!("沒有變動的資源，略過分析");
            return Ok(AnalysisReport::empty());
        }

        let tracked: HashSet<ResourceKey> = self.catalog.resource_keys()?.into_iter().collect();
        let mut keys: Vec<ResourceKey> = dirty.intersection(&tracked).cloned().collect();
        keys.sort();
        tracing::info!("開始增量短缺分析：變動資源 {} 項", dirty.len());

        self.run(&keys, |key| dirty.contains(key))
    }

    fn run(&self, keys: &[ResourceKey], in_scope: impl Fn(&ResourceKey) -> bool) -> Result<AnalysisReport> {
        let start_time = Instant::now();
        let today = self.clock.today();

        // 單次讀取預留總量，避免同一輪中重複計算已取消的預留
        let reserved = self.store.reservations.reserved_sums();

        let evaluations: Vec<Evaluation> = keys
            .par_iter()
            .map(|key| {
                let reserved = reserved.get(key).copied().unwrap_or(Decimal::ZERO);
                self.evaluate(key, reserved, today)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut report = AnalysisReport::empty();
        let mut emitted = HashMap::new();
        for evaluation in evaluations {
            report.warnings.extend(evaluation.warnings);
            if let Some(fresh) = evaluation.analysis {
                let stored = self.upsert(fresh)?;
                emitted.insert(evaluation.key, stored.id);
                report.analyses.push(stored);
            }
        }

        let resolved = self.resolve_absent(|key| in_scope(key) && !emitted.contains_key(key))?;
        {
            let mut latest = self.latest.write();
            latest.retain(|key, _| !in_scope(key));
            latest.extend(emitted);
        }

        report
            .analyses
            .sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.resource.cmp(&b.resource)));
        report.calculation_time_ms = Some(start_time.elapsed().as_millis());

        tracing::info!(
            "短缺分析完成，耗時 {:?}：輸出 {} 筆，短缺 {} 筆，結案 {} 筆",
            start_time.elapsed(),
            report.analyses.len(),
            report.shortages().count(),
            resolved
        );

        Ok(report)
    }

    fn evaluate(&self, key: &ResourceKey, reserved: Decimal, today: NaiveDate) -> Result<Evaluation> {
        let stock = self.catalog.resource_stock(key)?;
        let demand = self.demand.open_demand(key)?;

        let required: Decimal = demand.iter().map(|d| d.quantity).sum();
        let earliest_need_date = demand.iter().filter_map(|d| d.need_date).min();

        let available = available_quantity(stock.stock, reserved);
        let mut warnings = Vec::new();
        if available < Decimal::ZERO {
            warnings.push(AnalysisWarning::warning(
                key.clone(),
                format!("預留總量 {} 超過現有庫存 {}", reserved, stock.stock),
            ));
        }

        let shortage = shortage_quantity(
            required,
            stock.min_quantity,
            available,
            stock.in_transit_quantity,
        );
        let priority = classify(
            shortage,
            available,
            stock.min_quantity,
            earliest_need_date,
            today,
            &self.thresholds,
        );

        tracing::debug!(
            resource = %key,
            %available,
            %required,
            %shortage,
            %priority,
            "資源分析"
        );

        if shortage > Decimal::ZERO && stock.preferred_supplier_id.is_none() {
            warnings.push(AnalysisWarning::info(
                key.clone(),
                format!("短缺 {} 但沒有首選供應商，無法產生採購建議", shortage),
            ));
        }

        if priority == Priority::Low && !self.thresholds.include_low_priority {
            return Ok(Evaluation {
                key: key.clone(),
                analysis: None,
                warnings,
            });
        }

        let density = match &stock.material_type_id {
            Some(id) => Some(self.catalog.material_type_density(id)?),
            None => None,
        };
        let suggested_order_quantity = if shortage > Decimal::ZERO {
            stock.round_to_packaging(shortage + stock.min_quantity)
        } else {
            Decimal::ZERO
        };

        let analysis = ShortageAnalysis {
            id: Uuid::new_v4(),
            resource: key.clone(),
            resource_name: stock.name.clone(),
            priority,
            current_stock: stock.stock,
            reserved_quantity: reserved,
            available_quantity: available,
            in_transit_quantity: stock.in_transit_quantity,
            min_quantity: stock.min_quantity,
            required_quantity: required,
            shortage_quantity: shortage,
            suggested_order_quantity,
            unit: stock.unit(),
            unit_price: stock.unit_price(density),
            vat_rate: stock.vat_rate.unwrap_or(self.default_vat_rate),
            preferred_supplier_id: stock.preferred_supplier_id.clone(),
            earliest_need_date,
            analyzed_at: self.clock.now(),
            status: if shortage > Decimal::ZERO {
                AnalysisStatus::Open
            } else {
                AnalysisStatus::Resolved
            },
            suggestion_group_id: None,
        };

        Ok(Evaluation {
            key: key.clone(),
            analysis: Some(analysis),
            warnings,
        })
    }

    /// 以資源鍵寫入：保留既有 ID 與建議群組連結
    fn upsert(&self, fresh: ShortageAnalysis) -> Result<ShortageAnalysis> {
        let existing = self.store.analyses.find(|a| a.resource == fresh.resource);

        let (stored, became_critical) = match existing {
            None => {
                let became_critical = fresh.priority == Priority::Critical;
                self.store.analyses.insert(fresh.id, fresh.clone())?;
                (fresh, became_critical)
            }
            Some(existing) => {
                let id = existing.record.id;
                self.store.analyses.update(&id, |row| {
                    let was_critical =
                        row.priority == Priority::Critical && row.status != AnalysisStatus::Resolved;
                    let status = match (fresh.has_shortage(), row.status) {
                        (false, _) => AnalysisStatus::Resolved,
                        (true, AnalysisStatus::Resolved) => AnalysisStatus::Open,
                        (true, current) => current,
                    };

                    *row = ShortageAnalysis {
                        id,
                        status,
                        suggestion_group_id: row.suggestion_group_id,
                        ..fresh
                    };
                    Ok((row.clone(), row.priority == Priority::Critical && !was_critical))
                })?
            }
        };

        if became_critical {
            tracing::warn!(
                resource = %stored.resource,
                shortage = %stored.shortage_quantity,
                "資源短缺進入 CRITICAL"
            );
            self.events.publish(DomainEvent::ShortageCritical {
                analysis_id: stored.id,
                resource: stored.resource.clone(),
                shortage_quantity: stored.shortage_quantity,
                earliest_need_date: stored.earliest_need_date,
            });
        }

        Ok(stored)
    }

    /// 將範圍內、本輪未輸出的記錄結案並清除建議訂購量，回傳結案筆數
    fn resolve_absent(&self, should_resolve: impl Fn(&ResourceKey) -> bool) -> Result<usize> {
        let stale: Vec<Uuid> = self
            .store
            .analyses
            .filter(|a| a.status != AnalysisStatus::Resolved && should_resolve(&a.resource))
            .into_iter()
            .map(|a| a.id)
            .collect();

        let now = self.clock.now();
        for id in &stale {
            self.store.analyses.update(id, |row| {
                row.status = AnalysisStatus::Resolved;
                row.suggested_order_quantity = Decimal::ZERO;
                row.analyzed_at = now;
                Ok(())
            })?;
        }
        Ok(stale.len())
    }

    /// 確認短缺（OPEN → ACKNOWLEDGED）
    pub fn acknowledge(&self, analysis_id: Uuid) -> Result<ShortageAnalysis> {
        let acknowledged = self.store.analyses.update(&analysis_id, |row| {
            if row.status != AnalysisStatus::Open {
                return Err(AccountingError::invalid_state(
                    EntityKind::ShortageAnalysis,
                    analysis_id,
                    row.status,
                    "確認",
                ));
            }
            row.status = AnalysisStatus::Acknowledged;
            Ok(row.clone())
        })?;

        tracing::info!(analysis_id = %analysis_id, resource = %acknowledged.resource, "確認短缺");
        Ok(acknowledged)
    }

    /// 最新分析集合（各資源最近一次分析輸出的記錄，依優先級由高到低）
    ///
    /// 包含沒有短缺的 MEDIUM / LOW 記錄；本輪未輸出的資源不在其中。
    pub fn latest(&self) -> Vec<ShortageAnalysis> {
        let ids: HashSet<Uuid> = self.latest.read().values().copied().collect();
        let mut analyses = self.store.analyses.filter(|a| ids.contains(&a.id));
        analyses.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.resource.cmp(&b.resource)));
        analyses
    }

    /// 最新分析集合的儀表板摘要
    pub fn dashboard(&self) -> DashboardSummary {
        DashboardSummary::from_analyses(&self.latest())
    }

    /// 在背景執行緒定期分析，直到回傳的控制代碼停止或釋放
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> PeriodicAnalysis {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let analyzer = Arc::clone(self);

        let handle = std::thread::spawn(move || {
            tracing::info!("定期短缺分析啟動，間隔 {:?}", interval);
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = analyzer.analyze() {
                            tracing::warn!(error = %e, "定期短缺分析失敗");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::info!("定期短缺分析停止");
        });

        PeriodicAnalysis {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// 定期分析控制代碼
pub struct PeriodicAnalysis {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicAnalysis {
    /// 停止並等待背景執行緒結束
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("定期短缺分析執行緒異常結束");
            }
        }
    }
}

impl Drop for PeriodicAnalysis {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use matflow_core::{
        ErrorKind, FixedClock, OpenDemand, Pricing, Profile, Quantity, Reservation,
        ResourceSelector, ResourceStock,
    };
    use matflow_store::{InMemoryCatalog, InMemoryDemand, RecordingEventSink};
    use rstest::rstest;

    use crate::WarningSeverity;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
    }

    fn days_from_today(days: u64) -> NaiveDate {
        today() + chrono::Days::new(days)
    }

    struct Fixture {
        catalog: Arc<InMemoryCatalog>,
        demand: Arc<InMemoryDemand>,
        store: Arc<Store>,
        events: Arc<RecordingEventSink>,
        analyzer: Arc<ShortageAnalyzer>,
    }

    fn fixture_with(config: AccountingConfig) -> Fixture {
        let catalog = Arc::new(InMemoryCatalog::new());
        let demand = Arc::new(InMemoryDemand::new());
        let store = Arc::new(Store::new());
        let events = Arc::new(RecordingEventSink::new());
        let analyzer = Arc::new(ShortageAnalyzer::new(
            catalog.clone(),
            demand.clone(),
            store.clone(),
            events.clone(),
            Arc::new(FixedClock::on(today())),
            &config,
        ));
        Fixture {
            catalog,
            demand,
            store,
            events,
            analyzer,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(AccountingConfig::default())
    }

    fn drill(id: &str, stock: i64, min: i64) -> ResourceStock {
        ResourceStock::new(
            ResourceKey::tool(id),
            format!("Drill {id}"),
            Profile::Discrete,
            Decimal::from(stock),
            Pricing::PerUnit(Decimal::from(10)),
        )
        .with_min_quantity(Decimal::from(min))
        .with_preferred_supplier("SUP-1")
    }

    fn reserve(store: &Store, key: &ResourceKey, pieces: u32) -> Reservation {
        let reservation = Reservation::new(
            "WI-1",
            ResourceSelector::catalog(key.clone()),
            Quantity::Pieces(pieces),
            Decimal::ZERO,
            Decimal::ZERO,
            Utc::now(),
        );
        store.reservations.insert(reservation.clone()).unwrap();
        reservation
    }

    #[test]
    fn test_reference_shortage() {
        let f = fixture();
        let key = ResourceKey::tool("T-1");
        f.catalog.upsert_resource(drill("T-1", 10, 5));
        reserve(&f.store, &key, 4);
        f.demand
            .add_demand(key.clone(), OpenDemand::new("WI-2", Decimal::from(8), Some(days_from_today(30))));

        let report = f.analyzer.analyze().unwrap();
        assert_eq!(report.analyses.len(), 1);
        let analysis = &report.analyses[0];
        assert_eq!(analysis.available_quantity, Decimal::from(6));
        assert_eq!(analysis.shortage_quantity, Decimal::from(7));
        assert_eq!(analysis.suggested_order_quantity, Decimal::from(12));
        assert_eq!(analysis.priority, Priority::High);
        assert_eq!(analysis.status, AnalysisStatus::Open);
        assert!(f.events.names().is_empty());
    }

    #[rstest]
    #[case(Decimal::from(5), Decimal::ZERO, Some(30), Priority::Critical)]
    #[case(Decimal::from(5), Decimal::from(3), Some(7), Priority::Critical)]
    #[case(Decimal::from(5), Decimal::from(3), Some(8), Priority::High)]
    #[case(Decimal::from(5), Decimal::from(3), None, Priority::High)]
    #[case(Decimal::ZERO, Decimal::from(3), None, Priority::Medium)]
    #[case(Decimal::ZERO, Decimal::from(6), None, Priority::Low)]
    fn test_classify(
        #[case] shortage: Decimal,
        #[case] available: Decimal,
        #[case] need_in_days: Option<u64>,
        #[case] expected: Priority,
    ) {
        let priority = classify(
            shortage,
            available,
            Decimal::from(5),
            need_in_days.map(days_from_today),
            today(),
            &ShortageThresholds::default(),
        );
        assert_eq!(priority, expected);
    }

    #[test]
    fn test_overdue_need_date_is_critical() {
        let overdue = today() - chrono::Days::new(2);
        let priority = classify(
            Decimal::ONE,
            Decimal::from(4),
            Decimal::ZERO,
            Some(overdue),
            today(),
            &ShortageThresholds::default(),
        );
        assert_eq!(priority, Priority::Critical);
    }

    #[test]
    fn test_low_priority_only_when_enabled() {
        let f = fixture();
        f.catalog.upsert_resource(drill("T-1", 10, 2));
        assert!(f.analyzer.analyze().unwrap().analyses.is_empty());

        let f = fixture_with(
            AccountingConfig::default()
                .with_shortage(ShortageThresholds::default().with_include_low_priority(true)),
        );
        f.catalog.upsert_resource(drill("T-1", 10, 2));
        let report = f.analyzer.analyze().unwrap();
        assert_eq!(report.analyses.len(), 1);
        assert_eq!(report.analyses[0].priority, Priority::Low);
    }

    #[test]
    fn test_rows_sorted_by_priority_then_key() {
        let f = fixture();
        f.catalog.upsert_resource(drill("T-B", 10, 5));
        f.catalog.upsert_resource(drill("T-A", 3, 5));
        f.catalog.upsert_resource(drill("T-C", 0, 1));
        f.demand
            .add_demand(ResourceKey::tool("T-B"), OpenDemand::new("WI-1", Decimal::from(20), None));
        f.demand
            .add_demand(ResourceKey::tool("T-A"), OpenDemand::new("WI-1", Decimal::from(5), None));

        let report = f.analyzer.analyze().unwrap();
        let order: Vec<(&str, Priority)> = report
            .analyses
            .iter()
            .map(|a| (a.resource.id.as_str(), a.priority))
            .collect();
        assert_eq!(
            order,
            vec![
                ("T-C", Priority::Critical),
                ("T-A", Priority::High),
                ("T-B", Priority::High),
            ]
        );
        assert_eq!(f.events.names(), vec!["shortage_critical"]);
    }

    #[test]
    fn test_packaging_unit_rounds_suggestion() {
        let f = fixture();
        f.catalog
            .upsert_resource(drill("T-1", 0, 2).with_packaging_unit(Decimal::from(10)));
        f.demand
            .add_demand(ResourceKey::tool("T-1"), OpenDemand::new("WI-1", Decimal::from(3), None));

        let report = f.analyzer.analyze().unwrap();
        // 短缺 5 + 最低 2 = 7 → 10
        assert_eq!(report.analyses[0].suggested_order_quantity, Decimal::from(10));
    }

    #[test]
    fn test_rerun_keeps_id_and_resolves() {
        let f = fixture();
        let key = ResourceKey::tool("T-1");
        f.catalog.upsert_resource(drill("T-1", 2, 0));
        f.demand
            .add_demand(key.clone(), OpenDemand::new("WI-1", Decimal::from(5), None));

        let first = f.analyzer.analyze().unwrap().analyses[0].clone();
        let second = f.analyzer.analyze().unwrap().analyses[0].clone();
        assert_eq!(first.id, second.id);
        assert_eq!(f.store.analyses.len(), 1);

        f.catalog.set_stock(&key, Decimal::from(50)).unwrap();
        let report = f.analyzer.analyze().unwrap();
        assert!(report.analyses.is_empty());
        assert_eq!(
            f.store.analyses.record(&first.id).unwrap().status,
            AnalysisStatus::Resolved
        );
        assert!(f.analyzer.latest().is_empty());

        f.catalog.set_stock(&key, Decimal::ONE).unwrap();
        let reopened = f.analyzer.analyze().unwrap().analyses[0].clone();
        assert_eq!(reopened.id, first.id);
        assert_eq!(reopened.status, AnalysisStatus::Open);
    }

    #[test]
    fn test_acknowledge_survives_rerun() {
        let f = fixture();
        let key = ResourceKey::tool("T-1");
        f.catalog.upsert_resource(drill("T-1", 2, 0));
        f.demand
            .add_demand(key.clone(), OpenDemand::new("WI-1", Decimal::from(5), None));
        let analysis = f.analyzer.analyze().unwrap().analyses[0].clone();

        let acknowledged = f.analyzer.acknowledge(analysis.id).unwrap();
        assert_eq!(acknowledged.status, AnalysisStatus::Acknowledged);
        assert_eq!(
            f.analyzer.acknowledge(analysis.id).unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        let rerun = f.analyzer.analyze().unwrap().analyses[0].clone();
        assert_eq!(rerun.status, AnalysisStatus::Acknowledged);
        assert_eq!(
            f.analyzer.acknowledge(Uuid::new_v4()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_critical_event_only_on_transition() {
        let f = fixture();
        let key = ResourceKey::tool("T-1");
        f.catalog.upsert_resource(drill("T-1", 0, 0));
        f.demand
            .add_demand(key.clone(), OpenDemand::new("WI-1", Decimal::from(5), None));

        f.analyzer.analyze().unwrap();
        f.analyzer.analyze().unwrap();
        assert_eq!(f.events.names(), vec!["shortage_critical"]);
    }

    #[test]
    fn test_analyze_changed_only_touches_dirty_resources() {
        let f = fixture();
        let a = ResourceKey::tool("T-A");
        let b = ResourceKey::tool("T-B");
        f.catalog.upsert_resource(drill("T-A", 10, 0));
        f.catalog.upsert_resource(drill("T-B", 10, 0));
        f.demand
            .add_demand(a.clone(), OpenDemand::new("WI-1", Decimal::from(8), None));
        f.demand
            .add_demand(b.clone(), OpenDemand::new("WI-1", Decimal::from(8), None));

        assert!(f.analyzer.analyze().unwrap().analyses.is_empty());
        assert!(f.analyzer.analyze_changed().unwrap().analyses.is_empty());

        reserve(&f.store, &a, 5);
        let report = f.analyzer.analyze_changed().unwrap();
        assert_eq!(report.analyses.len(), 1);
        assert_eq!(report.analyses[0].resource, a);
        assert_eq!(report.analyses[0].shortage_quantity, Decimal::from(3));
        assert!(f.store.reservations.dirty().drain().is_empty());
    }

    #[test]
    fn test_over_reserved_stock_warns() {
        let f = fixture();
        let key = ResourceKey::tool("T-1");
        f.catalog.upsert_resource(drill("T-1", 10, 0));
        reserve(&f.store, &key, 8);
        f.catalog.set_stock(&key, Decimal::from(5)).unwrap();

        let report = f.analyzer.analyze().unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.analyses[0].available_quantity, Decimal::from(-3));
        assert_eq!(report.analyses[0].shortage_quantity, Decimal::from(3));
        assert_eq!(report.analyses[0].priority, Priority::Critical);
    }

    #[test]
    fn test_catalog_failure_propagates() {
        let f = fixture();
        f.catalog.upsert_resource(
            ResourceStock::new(
                ResourceKey::material("PLATE-X"),
                "Plate X",
                Profile::Flat {
                    x: Decimal::ONE,
                    y: Decimal::ONE,
                    z: Decimal::ONE,
                },
                Decimal::ZERO,
                Pricing::PerKg(Decimal::ONE),
            )
            .with_material_type("MISSING"),
        );
        f.demand.add_demand(
            ResourceKey::material("PLATE-X"),
            OpenDemand::new("WI-1", Decimal::ONE, None),
        );

        assert_eq!(f.analyzer.analyze().unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_dashboard_summary() {
        let f = fixture();
        f.catalog.upsert_resource(drill("T-A", 0, 0));
        f.catalog.upsert_resource(drill("T-B", 4, 2));
        f.catalog.upsert_resource(drill("T-C", 1, 5));
        f.demand
            .add_demand(ResourceKey::tool("T-A"), OpenDemand::new("WI-1", Decimal::from(3), None));
        f.demand
            .add_demand(ResourceKey::tool("T-B"), OpenDemand::new("WI-1", Decimal::from(4), None));

        f.analyzer.analyze().unwrap();
        let summary = f.analyzer.dashboard();

        // T-A 短缺 3（CRITICAL），T-B 短缺 2（HIGH），T-C 短缺 4（HIGH）
        assert_eq!(summary.total, 3);
        assert_eq!(summary.open, 3);
        assert_eq!(summary.by_priority.get(&Priority::Critical), Some(&1));
        assert_eq!(summary.by_priority.get(&Priority::High), Some(&2));
        assert_eq!(summary.by_resource_type.get(&ResourceType::Tool), Some(&3));
        assert_eq!(summary.total_shortage_value, Decimal::from(90));
        assert_eq!(summary.critical_shortage_value, Decimal::from(30));
    }

    #[test]
    fn test_dashboard_counts_medium_and_low_rows() {
        let f = fixture_with(
            AccountingConfig::default()
                .with_shortage(ShortageThresholds::default().with_include_low_priority(true)),
        );
        // 低於最低庫存但在途足夠：MEDIUM，沒有短缺
        f.catalog
            .upsert_resource(drill("T-M", 3, 5).with_in_transit(Decimal::from(10)));
        f.catalog.upsert_resource(drill("T-L", 10, 2));

        let report = f.analyzer.analyze().unwrap();
        assert_eq!(report.analyses.len(), 2);
        assert_eq!(report.shortages().count(), 0);

        let latest = f.analyzer.latest();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].resource.id, "T-M");
        assert_eq!(latest[0].priority, Priority::Medium);

        let summary = f.analyzer.dashboard();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.open, 0);
        assert_eq!(summary.by_priority.get(&Priority::Medium), Some(&1));
        assert_eq!(summary.by_priority.get(&Priority::Low), Some(&1));
        assert_eq!(summary.total_shortage_value, Decimal::ZERO);

        // 資源移出目錄後不再出現在最新集合
        f.catalog.remove_resource(&ResourceKey::tool("T-L"));
        f.analyzer.analyze().unwrap();
        let summary = f.analyzer.dashboard();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.by_priority.get(&Priority::Low), None);
    }

    #[test]
    fn test_absent_resource_clears_suggestion() {
        let f = fixture();
        let key = ResourceKey::tool("T-1");
        f.catalog.upsert_resource(drill("T-1", 0, 2));
        f.demand
            .add_demand(key.clone(), OpenDemand::new("WI-1", Decimal::from(3), None));
        let analysis = f.analyzer.analyze().unwrap().analyses[0].clone();
        assert_eq!(analysis.suggested_order_quantity, Decimal::from(5));

        f.catalog.remove_resource(&key);
        assert!(f.analyzer.analyze().unwrap().analyses.is_empty());

        let row = f.store.analyses.record(&analysis.id).unwrap();
        assert_eq!(row.status, AnalysisStatus::Resolved);
        assert_eq!(row.suggested_order_quantity, Decimal::ZERO);
        assert!(f.analyzer.latest().is_empty());
    }

    #[test]
    fn test_shortage_without_supplier_reports_info() {
        let f = fixture();
        let key = ResourceKey::tool("T-X");
        f.catalog.upsert_resource(
            ResourceStock::new(
                key.clone(),
                "Drill T-X",
                Profile::Discrete,
                Decimal::ZERO,
                Pricing::PerUnit(Decimal::from(10)),
            )
            .with_min_quantity(Decimal::ONE),
        );
        f.demand
            .add_demand(key.clone(), OpenDemand::new("WI-1", Decimal::from(2), None));

        let report = f.analyzer.analyze().unwrap();
        assert_eq!(report.analyses.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].severity, WarningSeverity::Info);
        assert_eq!(report.warnings[0].resource, key);
        assert!(report.warnings[0].message.contains("首選供應商"));
    }

    #[test]
    fn test_periodic_analysis_runs_until_stopped() {
        let f = fixture();
        f.catalog.upsert_resource(drill("T-1", 0, 0));
        f.demand
            .add_demand(ResourceKey::tool("T-1"), OpenDemand::new("WI-1", Decimal::ONE, None));

        let periodic = f.analyzer.spawn_periodic(Duration::from_millis(5));
        let deadline = Instant::now() + Duration::from_secs(5);
        while f.store.analyses.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        periodic.stop();

        assert_eq!(f.store.analyses.len(), 1);
    }
}
