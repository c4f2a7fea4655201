//! 单位换算函数
//!
//! 纯函数，无副作用。输出为未舍入的精确值，展示时再用 [`format_result`]
//! 保留两位小数。

use tracing::debug;

use crate::converter::errors::ConvertError;
use crate::converter::units::{QuantityType, Scale, TemperatureScale};

/// 将 `value` 从 `from` 单位换算为 `to` 单位
///
/// - 线性类型：`value * factor[from] / factor[to]`
/// - 温度：先换算为摄氏度，再从摄氏度换算为目标刻度
pub fn convert(value: f64, ty: QuantityType, from: &str, to: &str) -> Result<f64, ConvertError> {
    if !value.is_finite() {
        return Err(ConvertError::InvalidInput(value.to_string()));
    }

    let from_unit = ty.require_unit(from)?;
    let to_unit = ty.require_unit(to)?;

    if from_unit.code == to_unit.code {
        return Ok(value);
    }

    let result = match (from_unit.scale, to_unit.scale) {
        (Scale::Linear(f), Scale::Linear(t)) => value * f / t,
        (Scale::Temperature(f), Scale::Temperature(t)) => from_celsius(to_celsius(value, f), t),
        _ => {
            // 单位表保证同一类型内刻度种类一致
            return Err(ConvertError::InvalidUnit {
                quantity: ty.as_str().to_string(),
                unit: to.to_string(),
            });
        }
    };

    debug!("[Convert] {} {} -> {} {} ({})", value, from, result, to, ty);
    Ok(result)
}

fn to_celsius(value: f64, scale: TemperatureScale) -> f64 {
    match scale {
        TemperatureScale::Celsius => value,
        TemperatureScale::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        TemperatureScale::Kelvin => value - 273.15,
    }
}

fn from_celsius(celsius: f64, scale: TemperatureScale) -> f64 {
    match scale {
        TemperatureScale::Celsius => celsius,
        TemperatureScale::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        TemperatureScale::Kelvin => celsius + 273.15,
    }
}

/// 解析用户输入
///
/// 允许首尾空白；没有 `.` 时把 `,` 当作小数点（俄语/哈萨克语键盘）。
/// 空串、非数字、`inf`/`NaN` 均返回 `InvalidInput`，与合法的 0 区分开。
pub fn parse_input(input: &str) -> Result<f64, ConvertError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConvertError::InvalidInput(input.to_string()));
    }

    let normalized = if !trimmed.contains('.') && trimmed.matches(',').count() == 1 {
        trimmed.replacen(',', ".", 1)
    } else {
        trimmed.to_string()
    };

    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ConvertError::InvalidInput(input.to_string())),
    }
}

/// 解析输入并换算
pub fn convert_input(
    input: &str,
    ty: QuantityType,
    from: &str,
    to: &str,
) -> Result<f64, ConvertError> {
    let value = parse_input(input)?;
    convert(value, ty, from, to)
}

/// 展示用格式化：保留两位小数，四舍五入（远离零）
///
/// 基于最短十进制表示做进位，避免 `1.005 * 100` 这类二进制误差
/// 导致的舍入方向错误。
pub fn format_result(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let repr = format!("{}", value.abs());
    let (int_part, frac_part) = match repr.split_once('.') {
        Some((i, f)) => (i, f),
        None => (repr.as_str(), ""),
    };

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().chain(std::iter::repeat(b'0')).take(2))
        .map(|b| b - b'0')
        .collect();

    let round_up = frac_part.as_bytes().get(2).map_or(false, |d| *d >= b'5');
    if round_up {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let split = digits.len() - 2;
    let int_str: String = digits[..split].iter().map(|d| char::from(b'0' + d)).collect();
    let frac_str: String = digits[split..].iter().map(|d| char::from(b'0' + d)).collect();
    let is_zero = digits.iter().all(|d| *d == 0);

    if value < 0.0 && !is_zero {
        format!("-{}.{}", int_str, frac_str)
    } else {
        format!("{}.{}", int_str, frac_str)
    }
}
