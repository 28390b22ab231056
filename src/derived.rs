//! Defensive numeric coercion and the metrics derived from it.
//!
//! Scraped values arrive as free text ("650 €", "70 m²", "3 pièces"). Every
//! coercion strips what cannot be part of the number and yields `None` rather
//! than an error when nothing parseable is left.

/// Keeps ASCII digits and `.` then parses as `f64`.
pub fn coerce_f64(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Keeps ASCII digits then parses as `i64`.
pub fn coerce_i64(value: &str) -> Option<i64> {
    let cleaned: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<i64>().ok()
}

/// `round(price / size, 2)`, only when both are known and the size is positive.
pub fn price_per_m2(price_eur: Option<f64>, size_m2: Option<f64>) -> Option<f64> {
    match (price_eur, size_m2) {
        (Some(price), Some(size)) if size > 0.0 => Some(round2(price / size)),
        _ => None,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_units_and_separators() {
        assert_eq!(coerce_f64("650 €"), Some(650.0));
        assert_eq!(coerce_f64("70 m²"), Some(70.0));
        assert_eq!(coerce_f64("1 250.50"), Some(1250.5));
        assert_eq!(coerce_i64("3 pièces"), Some(3));
        assert_eq!(coerce_i64("T2"), Some(2));
    }

    #[test]
    fn unparseable_values_are_absent() {
        assert_eq!(coerce_f64(""), None);
        assert_eq!(coerce_f64("Studio"), None);
        assert_eq!(coerce_f64("1.2.3"), None);
        assert_eq!(coerce_f64("."), None);
        assert_eq!(coerce_i64("n/a"), None);
        assert_eq!(coerce_i64("99999999999999999999999"), None);
    }

    #[test]
    fn minus_sign_is_dropped() {
        assert_eq!(coerce_f64("-450"), Some(450.0));
        assert_eq!(coerce_i64("-2"), Some(2));
    }

    #[test]
    fn price_per_m2_requires_positive_size() {
        assert_eq!(price_per_m2(Some(1000.0), Some(40.0)), Some(25.0));
        assert_eq!(price_per_m2(Some(1000.0), Some(30.0)), Some(33.33));
        assert_eq!(price_per_m2(Some(1000.0), Some(0.0)), None);
        assert_eq!(price_per_m2(Some(1000.0), None), None);
        assert_eq!(price_per_m2(None, Some(40.0)), None);
    }
}
