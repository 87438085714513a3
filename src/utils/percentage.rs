use std::{fmt::Display, ops::Deref};

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. || !value.is_finite() {
            None
        } else {
            Some(Percentage(value))
        }
    }

    /// Rounds to two decimal places, which is the precision efficiency is reported with.
    pub fn rounded(self) -> Percentage {
        Percentage((self.0 * 100.).round() / 100.)
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `value` in `whole`. `None` when `whole` is zero.
pub fn ratio_percentage(value: f64, whole: f64) -> Option<Percentage> {
    if whole == 0. {
        return None;
    }
    Percentage::new_opt(value / whole * 100.)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_zero_whole() {
        assert_eq!(ratio_percentage(10., 0.), None);
    }

    #[test]
    fn test_rounding() {
        let value = ratio_percentage(1., 3.).unwrap().rounded();
        assert_eq!(*value, 33.33);
        assert_eq!(value.to_string(), "33.33%");
    }

    #[test]
    fn test_negative_rejected() {
        assert_eq!(Percentage::new_opt(-0.5), None);
    }
}
