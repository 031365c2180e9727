//! 幾何外形與重量計算
//!
//! 截面與板材尺寸單位為 mm，棒/管材長度單位為 m，密度單位為 g/cm³，重量單位為 kg。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::resource::StockUnit;
use crate::{AccountingError, Result};

/// mm³ × g/cm³ → kg 的換算除數
const MM3_GCM3_PER_KG: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// 每公尺的 mm 數
const MM_PER_METER: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);

/// 幾何外形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Profile {
    /// 板材（x · y · z，按片計）
    Flat { x: Decimal, y: Decimal, z: Decimal },
    /// 實心棒材（按長度計）
    Rod { diameter: Decimal },
    /// 管材（按長度計）
    Tube {
        outer_diameter: Decimal,
        inner_diameter: Decimal,
    },
    /// 無幾何資料的離散品項（刀具、配件）
    Discrete,
}

impl Profile {
    /// 此外形使用的庫存單位
    pub fn unit(&self) -> StockUnit {
        match self {
            Self::Flat { .. } | Self::Discrete => StockUnit::Pieces,
            Self::Rod { .. } | Self::Tube { .. } => StockUnit::Meters,
        }
    }

    /// 檢查尺寸是否合理
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: Decimal| {
            if value > Decimal::ZERO {
                Ok(())
            } else {
                Err(AccountingError::validation(format!("{name} 必須大於 0，實際為 {value}")))
            }
        };

        match *self {
            Self::Flat { x, y, z } => {
                positive("x", x)?;
                positive("y", y)?;
                positive("z", z)
            }
            Self::Rod { diameter } => positive("diameter", diameter),
            Self::Tube {
                outer_diameter,
                inner_diameter,
            } => {
                positive("outer_diameter", outer_diameter)?;
                if inner_diameter < Decimal::ZERO || inner_diameter >= outer_diameter {
                    return Err(AccountingError::validation(format!(
                        "管材內徑 {inner_diameter} 必須介於 0 與外徑 {outer_diameter} 之間"
                    )));
                }
                Ok(())
            }
            Self::Discrete => Ok(()),
        }
    }

    /// 單位數量的體積（mm³）：板材為一片，棒/管材為一公尺
    pub fn unit_volume_mm3(&self) -> Decimal {
        let two = Decimal::TWO;
        match *self {
            Self::Flat { x, y, z } => x * y * z,
            Self::Rod { diameter } => {
                let radius = diameter / two;
                Decimal::PI * radius * radius * MM_PER_METER
            }
            Self::Tube {
                outer_diameter,
                inner_diameter,
            } => {
                let outer = outer_diameter / two;
                let inner = inner_diameter / two;
                Decimal::PI * (outer * outer - inner * inner) * MM_PER_METER
            }
            Self::Discrete => Decimal::ZERO,
        }
    }

    /// 單位數量的重量（kg）
    pub fn unit_weight_kg(&self, density: Decimal) -> Decimal {
        self.unit_volume_mm3() * density / MM3_GCM3_PER_KG
    }

    /// 指定數量的重量（kg，取三位小數）
    pub fn weight_kg(&self, quantity: &Quantity, density: Decimal) -> Decimal {
        (self.unit_volume_mm3() * quantity.amount() * density / MM3_GCM3_PER_KG).round_dp(3)
    }
}

/// 預留數量：件數或長度，依外形擇一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Quantity {
    /// 件數
    Pieces(u32),
    /// 長度（公尺）
    Length(Decimal),
}

impl Quantity {
    /// 數量值
    pub fn amount(&self) -> Decimal {
        match *self {
            Self::Pieces(count) => Decimal::from(count),
            Self::Length(length) => length,
        }
    }

    /// 數量單位
    pub fn unit(&self) -> StockUnit {
        match self {
            Self::Pieces(_) => StockUnit::Pieces,
            Self::Length(_) => StockUnit::Meters,
        }
    }

    /// 檢查數量是否與外形相符且非負
    pub fn validate_for(&self, profile: &Profile) -> Result<()> {
        if let Self::Length(length) = self {
            if *length < Decimal::ZERO {
                return Err(AccountingError::validation(format!("長度不可為負：{length}")));
            }
        }
        if self.unit() != profile.unit() {
            return Err(AccountingError::validation(format!(
                "外形要求以 {} 計量，收到 {}",
                profile.unit(),
                self.unit()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount(), self.unit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn steel() -> Decimal {
        Decimal::new(785, 2)
    }

    #[test]
    fn test_flat_weight() {
        let plate = Profile::Flat {
            x: Decimal::from(100),
            y: Decimal::from(200),
            z: Decimal::from(10),
        };
        // 200000 mm³ × 7.85 / 1e6 = 1.57 kg/片
        assert_eq!(plate.weight_kg(&Quantity::Pieces(3), steel()), Decimal::new(471, 2));
    }

    #[test]
    fn test_rod_weight() {
        let rod = Profile::Rod {
            diameter: Decimal::from(20),
        };
        // π × 10² × 1000 mm³/m × 7.85 / 1e6 ≈ 2.46615 kg/m
        assert_eq!(rod.weight_kg(&Quantity::Length(Decimal::from(2)), steel()), Decimal::new(4932, 3));
    }

    #[test]
    fn test_tube_lighter_than_rod() {
        let rod = Profile::Rod {
            diameter: Decimal::from(40),
        };
        let tube = Profile::Tube {
            outer_diameter: Decimal::from(40),
            inner_diameter: Decimal::from(30),
        };
        let length = Quantity::Length(Decimal::ONE);
        assert!(tube.weight_kg(&length, steel()) < rod.weight_kg(&length, steel()));
        // π × (20² − 15²) × 1000 × 7.85 / 1e6 ≈ 4.316 kg/m
        assert_eq!(tube.weight_kg(&length, steel()), Decimal::new(4316, 3));
    }

    #[test]
    fn test_discrete_has_no_weight() {
        assert_eq!(Profile::Discrete.weight_kg(&Quantity::Pieces(5), steel()), Decimal::ZERO);
    }

    #[rstest]
    #[case(Profile::Rod { diameter: Decimal::ZERO })]
    #[case(Profile::Tube { outer_diameter: Decimal::from(20), inner_diameter: Decimal::from(20) })]
    #[case(Profile::Tube { outer_diameter: Decimal::from(20), inner_diameter: Decimal::from(-1) })]
    #[case(Profile::Flat { x: Decimal::from(10), y: Decimal::from(-10), z: Decimal::ONE })]
    fn test_invalid_profiles(#[case] profile: Profile) {
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_quantity_must_match_profile() {
        let rod = Profile::Rod {
            diameter: Decimal::from(20),
        };
        assert!(Quantity::Length(Decimal::new(15, 1)).validate_for(&rod).is_ok());
        assert!(Quantity::Pieces(2).validate_for(&rod).is_err());
        assert!(Quantity::Length(Decimal::from(-1)).validate_for(&rod).is_err());
        assert!(Quantity::Pieces(2).validate_for(&Profile::Discrete).is_ok());
    }
}
