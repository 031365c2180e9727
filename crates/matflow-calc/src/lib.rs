//! # Matflow Calculation Engine
//!
//! 預留管理、短缺分析、採購建議分組與三方對帳

pub mod lead_time;
pub mod reconciliation;
pub mod reservation;
pub mod shortage;
pub mod suggestion;

use matflow_core::{ResourceKey, ShortageAnalysis};

// Re-export 主要類型
pub use lead_time::LeadTimeCalculator;
pub use reconciliation::ReconciliationEngine;
pub use reservation::{Availability, ReservationManager};
pub use shortage::{DashboardSummary, PeriodicAnalysis, ShortageAnalyzer};
pub use suggestion::{GroupingOutcome, SuggestionGrouper};

/// 短缺分析結果
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// 本次分析輸出的記錄（依優先級由高到低）
    pub analyses: Vec<ShortageAnalysis>,

    /// 警告信息
    pub warnings: Vec<AnalysisWarning>,

    /// 計算耗時（毫秒）
    pub calculation_time_ms: Option<u128>,
}

impl AnalysisReport {
    /// 創建空的分析結果
    pub fn empty() -> Self {
        Self {
            analyses: Vec::new(),
            warnings: Vec::new(),
            calculation_time_ms: None,
        }
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: AnalysisWarning) {
        self.warnings.push(warning);
    }

    /// 有短缺的記錄
    pub fn shortages(&self) -> impl Iterator<Item = &ShortageAnalysis> {
        self.analyses.iter().filter(|a| a.has_shortage())
    }
}

/// 分析警告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisWarning {
    pub resource: ResourceKey,
    pub message: String,
    pub severity: WarningSeverity,
}

impl AnalysisWarning {
    pub fn new(resource: ResourceKey, message: String, severity: WarningSeverity) -> Self {
        Self {
            resource,
            message,
            severity,
        }
    }

    pub fn info(resource: ResourceKey, message: String) -> Self {
        Self::new(resource, message, WarningSeverity::Info)
    }

    pub fn warning(resource: ResourceKey, message: String) -> Self {
        Self::new(resource, message, WarningSeverity::Warning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Info,
    Warning,
}
