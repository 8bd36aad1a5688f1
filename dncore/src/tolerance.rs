//! Tolerances around a mass or m/z, either absolute (Da/Th) or relative (ppm).

use std::{fmt::Display, str::FromStr};

use context_error::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DeNovoError, DeNovoErrorKind},
    system::{Mass, MassOverCharge, Ratio, da, mz, ppm},
};

/// A quantity a tolerance can be placed around
pub trait TolerancedQuantity: Copy {
    /// Create the quantity from its value in the base unit (Da or Th)
    fn from_base(value: f64) -> Self;
    /// The value in the base unit (Da or Th)
    fn base(self) -> f64;
}

impl TolerancedQuantity for Mass {
    fn from_base(value: f64) -> Self {
        da(value)
    }
    fn base(self) -> f64 {
        self.value
    }
}

impl TolerancedQuantity for MassOverCharge {
    fn from_base(value: f64) -> Self {
        mz(value)
    }
    fn base(self) -> f64 {
        self.value
    }
}

/// A tolerance around a mass or m/z value. Relative tolerances are written as ppm in JSON.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, PartialOrd, Serialize)]
pub enum Tolerance<T = MassOverCharge> {
    /// An absolute tolerance in Dalton (or Thomson for m/z values)
    Absolute(T),
    /// A relative tolerance
    Relative(#[serde(with = "as_ppm")] Ratio),
}

impl<T: TolerancedQuantity> Tolerance<T> {
    /// Create a new absolute tolerance in Da (or Th)
    pub fn new_absolute(value: f64) -> Self {
        Self::Absolute(T::from_base(value))
    }

    /// Create a new relative tolerance in ppm
    pub fn new_ppm(value: f64) -> Self {
        Self::Relative(Ratio::new::<ppm>(value))
    }

    /// The absolute deviation allowed around the given value
    pub fn absolute_at(self, value: T) -> T {
        match self {
            Self::Absolute(deviation) => deviation,
            Self::Relative(ratio) => T::from_base(value.base().abs() * ratio.value),
        }
    }

    /// The inclusive bounds around the given value
    pub fn bounds(self, value: T) -> (T, T) {
        let deviation = self.absolute_at(value).base();
        (
            T::from_base(value.base() - deviation),
            T::from_base(value.base() + deviation),
        )
    }

    /// Check if the experimental value is within this tolerance of the theoretical value
    pub fn within(self, theoretical: T, experimental: T) -> bool {
        (theoretical.base() - experimental.base()).abs() <= self.absolute_at(theoretical).base()
    }

    /// Use the same tolerance for another quantity, absolute tolerances keep their value (an m/z
    /// tolerance in Th becomes a mass tolerance in Da)
    pub fn cast<O: TolerancedQuantity>(self) -> Tolerance<O> {
        match self {
            Self::Absolute(deviation) => Tolerance::Absolute(O::from_base(deviation.base())),
            Self::Relative(ratio) => Tolerance::Relative(ratio),
        }
    }
}

impl<T: TolerancedQuantity> Default for Tolerance<T> {
    fn default() -> Self {
        Self::new_absolute(0.5)
    }
}

impl<T: TolerancedQuantity> Display for Tolerance<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute(deviation) => write!(f, "{} Da", deviation.base()),
            Self::Relative(ratio) => write!(f, "{} ppm", ratio.get::<ppm>()),
        }
    }
}

impl<T: TolerancedQuantity> FromStr for Tolerance<T> {
    type Err = DeNovoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        let (number, absolute) = if let Some(number) = lower.strip_suffix("ppm") {
            (number, false)
        } else if let Some(number) = lower
            .strip_suffix("da")
            .or_else(|| lower.strip_suffix("th"))
        {
            (number, true)
        } else {
            (lower.as_str(), true)
        };
        let value = number.trim().parse::<f64>().map_err(|_| {
            DeNovoError::small(
                DeNovoErrorKind::Configuration,
                "Invalid tolerance",
                format!("The tolerance '{trimmed}' should be a number followed by 'Da' or 'ppm'"),
            )
        })?;
        if value < 0.0 || !value.is_finite() {
            return Err(DeNovoError::small(
                DeNovoErrorKind::Configuration,
                "Invalid tolerance",
                format!("The tolerance '{trimmed}' has to be a positive finite number"),
            ));
        }
        Ok(if absolute {
            Self::new_absolute(value)
        } else {
            Self::new_ppm(value)
        })
    }
}

/// Relative tolerances are stored as ppm so parameter files stay readable
mod as_ppm {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::system::{Ratio, ppm};

    pub(super) fn serialize<S: Serializer>(ratio: &Ratio, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(ratio.get::<ppm>())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Ratio, D::Error> {
        f64::deserialize(deserializer).map(Ratio::new::<ppm>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!(
            "0.5 Da".parse::<Tolerance>().unwrap(),
            Tolerance::new_absolute(0.5)
        );
        assert_eq!(
            "10ppm".parse::<Tolerance>().unwrap(),
            Tolerance::new_ppm(10.0)
        );
        assert_eq!(
            "0.02".parse::<Tolerance<Mass>>().unwrap(),
            Tolerance::Absolute(da(0.02))
        );
        assert_eq!(
            "0.02 Th".parse::<Tolerance>().unwrap(),
            Tolerance::Absolute(mz(0.02))
        );
        assert!("-1 Da".parse::<Tolerance>().is_err());
        assert!("wide".parse::<Tolerance>().is_err());
    }

    #[test]
    fn within() {
        let absolute = Tolerance::<MassOverCharge>::new_absolute(0.5);
        assert!(absolute.within(mz(500.0), mz(500.4)));
        assert!(!absolute.within(mz(500.0), mz(500.6)));
        let relative = Tolerance::<Mass>::new_ppm(10.0);
        assert!(relative.within(da(1000.0), da(1000.009)));
        assert!(!relative.within(da(1000.0), da(1000.011)));
        let (low, high) = relative.bounds(da(1000.0));
        assert!((low.value - 999.99).abs() < 1e-9);
        assert!((high.value - 1000.01).abs() < 1e-9);
    }

    #[test]
    fn json_in_ppm() {
        let tolerance: Tolerance = serde_json::from_str(r#"{"Relative": 20.0}"#).unwrap();
        assert_eq!(tolerance, Tolerance::new_ppm(20.0));
        assert_eq!(Tolerance::<Mass>::new_absolute(0.5).to_string(), "0.5 Da");
        assert_eq!(
            serde_json::to_string(&Tolerance::<Mass>::new_absolute(0.5)).unwrap(),
            r#"{"Absolute":0.5}"#
        );
        let mass: Tolerance<Mass> = Tolerance::<MassOverCharge>::new_absolute(0.02).cast();
        assert_eq!(mass, Tolerance::Absolute(da(0.02)));
    }
}
