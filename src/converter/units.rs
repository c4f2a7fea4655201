//! 单位表
//!
//! 每种物理量类型对应一组单位。线性单位记录“换算到基准单位”的乘数，
//! 温度单位只记录刻度种类，不折算成乘数。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::converter::errors::ConvertError;

/// 物理量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityType {
    Length,
    Weight,
    Time,
    Temperature,
}

/// 温度刻度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureScale {
    Celsius,
    Fahrenheit,
    Kelvin,
}

/// 单位换算方式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    /// 线性单位：1 个该单位 = factor 个基准单位
    Linear(f64),
    /// 温度（仿射换算）
    Temperature(TemperatureScale),
}

/// 单位定义
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDef {
    pub code: &'static str,
    pub label: &'static str,
    pub scale: Scale,
}

const fn linear(code: &'static str, label: &'static str, factor: f64) -> UnitDef {
    UnitDef {
        code,
        label,
        scale: Scale::Linear(factor),
    }
}

const fn temperature(code: &'static str, label: &'static str, t: TemperatureScale) -> UnitDef {
    UnitDef {
        code,
        label,
        scale: Scale::Temperature(t),
    }
}

// 基准单位：米
const LENGTH_UNITS: &[UnitDef] = &[
    linear("mm", "Millimeters", 0.001),
    linear("cm", "Centimeters", 0.01),
    linear("m", "Meters", 1.0),
    linear("km", "Kilometers", 1000.0),
    linear("mi", "Miles", 1609.34),
];

// 基准单位：克
const WEIGHT_UNITS: &[UnitDef] = &[
    linear("mg", "Milligrams", 0.001),
    linear("g", "Grams", 1.0),
    linear("kg", "Kilograms", 1000.0),
    linear("lb", "Pounds", 453.592),
    linear("oz", "Ounces", 28.3495),
];

// 基准单位：秒
const TIME_UNITS: &[UnitDef] = &[
    linear("ms", "Milliseconds", 0.001),
    linear("s", "Seconds", 1.0),
    linear("min", "Minutes", 60.0),
    linear("h", "Hours", 3600.0),
    linear("d", "Days", 86400.0),
];

const TEMPERATURE_UNITS: &[UnitDef] = &[
    temperature("C", "Celsius", TemperatureScale::Celsius),
    temperature("F", "Fahrenheit", TemperatureScale::Fahrenheit),
    temperature("K", "Kelvin", TemperatureScale::Kelvin),
];

impl QuantityType {
    /// 所有物理量类型（UI 展示顺序）
    pub const ALL: [QuantityType; 4] = [
        QuantityType::Length,
        QuantityType::Weight,
        QuantityType::Time,
        QuantityType::Temperature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuantityType::Length => "length",
            QuantityType::Weight => "weight",
            QuantityType::Time => "time",
            QuantityType::Temperature => "temperature",
        }
    }

    /// 该类型的单位列表（保持表内顺序）
    pub fn units(&self) -> &'static [UnitDef] {
        match self {
            QuantityType::Length => LENGTH_UNITS,
            QuantityType::Weight => WEIGHT_UNITS,
            QuantityType::Time => TIME_UNITS,
            QuantityType::Temperature => TEMPERATURE_UNITS,
        }
    }

    /// 按单位代码查找
    pub fn unit(&self, code: &str) -> Option<&'static UnitDef> {
        self.units().iter().find(|u| u.code == code)
    }

    /// 查找单位，不存在时返回 `ConvertError::InvalidUnit`
    pub fn require_unit(&self, code: &str) -> Result<&'static UnitDef, ConvertError> {
        self.unit(code).ok_or_else(|| ConvertError::InvalidUnit {
            quantity: self.as_str().to_string(),
            unit: code.to_string(),
        })
    }

    /// 切换类型时 UI 默认选中的 (from, to)：表中前两个单位
    pub fn default_units(&self) -> (&'static str, &'static str) {
        let units = self.units();
        (units[0].code, units[1].code)
    }
}

impl fmt::Display for QuantityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuantityType {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuantityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConvertError::InvalidInput(format!("未知的物理量类型: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_linear_table_has_exactly_one_base_unit() {
        for ty in QuantityType::ALL {
            if ty == QuantityType::Temperature {
                continue;
            }
            let bases = ty
                .units()
                .iter()
                .filter(|u| u.scale == Scale::Linear(1.0))
                .count();
            assert_eq!(bases, 1, "{} 应有唯一基准单位", ty);
            for u in ty.units() {
                match u.scale {
                    Scale::Linear(f) => assert!(f > 0.0),
                    Scale::Temperature(_) => panic!("线性类型中出现温度单位: {}", u.code),
                }
            }
        }
    }

    #[test]
    fn temperature_units_carry_no_factor() {
        assert!(QuantityType::Temperature
            .units()
            .iter()
            .all(|u| matches!(u.scale, Scale::Temperature(_))));
    }

    #[test]
    fn lookup_and_defaults() {
        assert_eq!(QuantityType::Length.default_units(), ("mm", "cm"));
        assert_eq!(QuantityType::Temperature.default_units(), ("C", "F"));
        assert_eq!(QuantityType::Weight.unit("lb").map(|u| u.label), Some("Pounds"));
        assert!(QuantityType::Time.unit("km").is_none());
        assert!(matches!(
            QuantityType::Time.require_unit("km"),
            Err(ConvertError::InvalidUnit { .. })
        ));
    }

    #[test]
    fn quantity_type_parses_and_serializes_lowercase() {
        assert_eq!("Temperature".parse::<QuantityType>(), Ok(QuantityType::Temperature));
        assert!("volume".parse::<QuantityType>().is_err());
        assert_eq!(
            serde_json::to_string(&QuantityType::Weight).unwrap(),
            "\"weight\""
        );
    }
}
