//! 交期計算（日曆天）

use chrono::{Days, NaiveDate};

/// 交期計算器
pub struct LeadTimeCalculator;

impl LeadTimeCalculator {
    /// 計算下單日期（向後推算提前期）
    pub fn calculate_order_date(need_date: NaiveDate, lead_time_days: u32) -> NaiveDate {
        need_date - Days::new(u64::from(lead_time_days))
    }

    /// 計算到貨日期（向前推算提前期）
    pub fn calculate_delivery_date(order_date: NaiveDate, lead_time_days: u32) -> NaiveDate {
        order_date + Days::new(u64::from(lead_time_days))
    }

    /// 距離指定日期的天數（過去日期為負）
    pub fn days_until(today: NaiveDate, date: NaiveDate) -> i64 {
        (date - today).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_date_round_trip() {
        let need_date = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        let order_date = LeadTimeCalculator::calculate_order_date(need_date, 5);

        assert_eq!(order_date, NaiveDate::from_ymd_opt(2025, 10, 27).unwrap());
        assert_eq!(LeadTimeCalculator::calculate_delivery_date(order_date, 5), need_date);
    }

    #[test]
    fn test_zero_lead_time() {
        let need_date = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        assert_eq!(LeadTimeCalculator::calculate_order_date(need_date, 0), need_date);
    }

    #[test]
    fn test_days_until() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        assert_eq!(
            LeadTimeCalculator::days_until(today, NaiveDate::from_ymd_opt(2025, 11, 8).unwrap()),
            7
        );
        assert_eq!(
            LeadTimeCalculator::days_until(today, NaiveDate::from_ymd_opt(2025, 10, 30).unwrap()),
            -2
        );
    }
}
