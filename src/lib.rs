//! # Matflow
//!
//! 製造資源帳務核心：預留、短缺分析、採購建議與三方對帳
//!
//! ## 使用範例
//!
//! ```
//! use std::sync::Arc;
//! use matflow::{AccountingConfig, AccountingCore, Collaborators};
//! use matflow::store::{InMemoryCatalog, InMemoryDemand, InMemoryOrders};
//!
//! let core = AccountingCore::new(
//!     AccountingConfig::default(),
//!     Collaborators::new(
//!         Arc::new(InMemoryCatalog::new()),
//!         Arc::new(InMemoryDemand::new()),
//!         Arc::new(InMemoryOrders::new()),
//!     ),
//! )
//! .unwrap();
//!
//! let report = core.shortages().analyze().unwrap();
//! assert!(report.analyses.is_empty());
//! ```

pub mod telemetry;

use std::sync::{Arc, OnceLock};

pub use matflow_calc as calc;
pub use matflow_core as model;
pub use matflow_store as store;

pub use matflow_calc::{
    AnalysisReport, Availability, DashboardSummary, GroupingOutcome, PeriodicAnalysis,
    ReconciliationEngine, ReservationManager, ShortageAnalyzer, SuggestionGrouper,
};
pub use matflow_core::{AccountingConfig, AccountingError, ErrorKind, Result};

use matflow_core::{
    Clock, DemandSource, EventSink, OrderGateway, ResourceCatalog, SystemClock, TracingEventSink,
};
use matflow_store::Store;

/// 外部協作元件
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn ResourceCatalog>,
    pub demand: Arc<dyn DemandSource>,
    pub orders: Arc<dyn OrderGateway>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// 事件輸出至 tracing，時間取系統時間
    pub fn new(
        catalog: Arc<dyn ResourceCatalog>,
        demand: Arc<dyn DemandSource>,
        orders: Arc<dyn OrderGateway>,
    ) -> Self {
        Self {
            catalog,
            demand,
            orders,
            events: Arc::new(TracingEventSink),
            clock: Arc::new(SystemClock),
        }
    }

    /// 建構器模式：設置事件出口
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// 建構器模式：設置時間來源
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// 帳務核心：記錄表與四個引擎
///
/// 於啟動時建立一次，各引擎共用同一組記錄表。
pub struct AccountingCore {
    config: AccountingConfig,
    store: Arc<Store>,
    reservations: ReservationManager,
    shortages: Arc<ShortageAnalyzer>,
    suggestions: SuggestionGrouper,
    reconciliation: ReconciliationEngine,
}

static GLOBAL: OnceLock<Arc<AccountingCore>> = OnceLock::new();

impl AccountingCore {
    /// 檢查設定並建立所有引擎
    pub fn new(config: AccountingConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let Collaborators {
            catalog,
            demand,
            orders,
            events,
            clock,
        } = collaborators;
        let store = Arc::new(Store::new());

        let reservations = ReservationManager::new(
            catalog.clone(),
            store.clone(),
            events.clone(),
            clock.clone(),
        );
        let shortages = Arc::new(ShortageAnalyzer::new(
            catalog.clone(),
            demand,
            store.clone(),
            events.clone(),
            clock.clone(),
            &config,
        ));
        let suggestions = SuggestionGrouper::new(
            catalog,
            orders.clone(),
            store.clone(),
            events.clone(),
            clock.clone(),
        );
        let reconciliation = ReconciliationEngine::new(orders, store.clone(), events, clock, &config);

        tracing::info!(
            critical_window_days = config.shortage.critical_window_days,
            default_vat_rate = %config.default_vat_rate,
            "帳務核心初始化完成"
        );

        Ok(Self {
            config,
            store,
            reservations,
            shortages,
            suggestions,
            reconciliation,
        })
    }

    /// 取得行程共用的核心；尚未建立時以傳入參數建立
    ///
    /// 已存在時忽略參數並回傳既有實例。
    pub fn ensure_global(config: AccountingConfig, collaborators: Collaborators) -> Result<Arc<Self>> {
        if let Some(core) = GLOBAL.get() {
            return Ok(core.clone());
        }
        let core = Arc::new(Self::new(config, collaborators)?);
        Ok(GLOBAL.get_or_init(|| core).clone())
    }

    /// 行程共用的核心（尚未建立時為 None）
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    pub fn config(&self) -> &AccountingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    pub fn shortages(&self) -> &Arc<ShortageAnalyzer> {
        &self.shortages
    }

    pub fn suggestions(&self) -> &SuggestionGrouper {
        &self.suggestions
    }

    pub fn reconciliation(&self) -> &ReconciliationEngine {
        &self.reconciliation
    }

    /// 執行完整短缺分析並將短缺分組為採購建議
    pub fn analyze_and_group(&self) -> Result<(AnalysisReport, GroupingOutcome)> {
        let report = self.shortages.analyze()?;
        let outcome = self.suggestions.group(&report.analyses)?;
        Ok((report, outcome))
    }
}
