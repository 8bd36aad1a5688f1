//! The measurement system used in this crate. Masses are stored in dalton, m/z values in thomson,
//! charges in elementary charges, and ratios as fractions.
#![allow(clippy::non_canonical_clone_impl)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::suspicious_arithmetic_impl)]
#![allow(clippy::suspicious_op_assign_impl)]
#![allow(clippy::unnecessary_cast)]
#![allow(missing_docs)]

use std::marker::PhantomData;

/// The mass quantity in dalton
#[macro_use]
pub mod mass {
    quantity! {
        /// Mass (base unit dalton, Da)
        quantity: Mass; "mass";
        /// Mass dimension
        dimension: Q<P1, Z0, Z0>;
        units {
            @dalton: 1.0; "Da", "dalton", "daltons";
        }
    }
}

/// The charge quantity in elementary charges
#[macro_use]
pub mod charge {
    quantity! {
        /// Charge (base unit electron charge, e)
        quantity: Charge; "charge";
        /// Charge dimension
        dimension: Q<Z0, P1, Z0>;
        units {
            @e: 1.0; "e", "electron charge", "electron charges";
        }
    }
}

/// The time quantity in seconds
#[macro_use]
pub mod time {
    quantity! {
        /// Time (base unit second, s)
        quantity: Time; "time";
        /// Time dimension
        dimension: Q<Z0, Z0, P1>;
        units {
            @s: 1.0; "s", "second", "seconds";
            @min: 60.0; "min", "minute", "minutes";
        }
    }
}

/// The mass over charge quantity in thomson
#[macro_use]
pub mod mass_over_charge {
    quantity! {
        /// Mass over charge (base unit thomson, Th)
        quantity: MassOverCharge; "mass over charge";
        /// Mass over charge dimension
        dimension: Q<P1, N1, Z0>;
        units {
            @thomson: 1.0; "Th", "thomson", "thomson";
        }
    }
}

/// The dimensionless ratio quantity
#[macro_use]
pub mod ratio {
    quantity! {
        /// Ratio (base unit fraction)
        quantity: Ratio; "ratio";
        /// Ratio dimension
        dimension: Q<Z0, Z0, Z0>;
        units {
            @fraction: 1.0; "⅟", "fraction", "fraction";
            @percent: 1e-2; "%", "percent", "percent";
            @ppm: 1e-6; "ppm", "part per million", "parts per million";
        }
    }
}

system! {
    /// Quantities
    #[doc(hidden)]
    quantities: Q {
        mass: dalton, M;
        charge: e, C;
        time: s, T;
    }
    /// Units
    units: U {
        mod mass::Mass,
        mod charge::Charge,
        mod time::Time,
        mod mass_over_charge::MassOverCharge,
        mod ratio::Ratio,
    }
}

/// The whole system with f64 as storage type
#[allow(unused_imports)]
pub mod f64 {
    mod mks {
        pub use super::super::*;
    }
    Q!(self::mks, f64);
    pub use super::charge::e;
    pub use super::mass::dalton;
    pub use super::mass_over_charge::thomson;
    pub use super::ratio::{fraction, ppm};
    pub use super::time::{min, s};
}

pub use self::f64::*;

/// A mass in dalton, usable in constants
pub const fn da(value: f64) -> Mass {
    Mass {
        dimension: PhantomData,
        units: PhantomData,
        value,
    }
}

/// An m/z value in thomson, usable in constants
pub const fn mz(value: f64) -> MassOverCharge {
    MassOverCharge {
        dimension: PhantomData,
        units: PhantomData,
        value,
    }
}

/// A charge in elementary charges
pub fn charge(value: usize) -> Charge {
    Charge::new::<e>(value as f64)
}

/// Sum masses, an empty iterator gives zero
pub fn sum_masses(masses: impl IntoIterator<Item = Mass>) -> Mass {
    masses.into_iter().fold(da(0.0), |total, mass| total + mass)
}
