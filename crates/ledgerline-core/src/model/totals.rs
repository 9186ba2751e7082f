use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

use super::entity::LineData;

/// Aggregate financial figures for a Group row or a whole scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub nominal_value: f64,
    pub accumulated_fringe_contribution: f64,
    pub accumulated_markup_contribution: f64,
    pub markup_contribution: f64,
    pub actual: f64,
}

impl Totals {
    /// Figures contributed by one line item.
    #[must_use]
    pub const fn of_line(data: &LineData) -> Self {
        Self {
            nominal_value: data.nominal_value,
            accumulated_fringe_contribution: data.accumulated_fringe_contribution,
            accumulated_markup_contribution: data.accumulated_markup_contribution,
            markup_contribution: data.markup_contribution,
            actual: data.actual,
        }
    }

    #[must_use]
    pub fn estimated(&self) -> f64 {
        self.nominal_value
            + self.accumulated_fringe_contribution
            + self.accumulated_markup_contribution
            + self.markup_contribution
    }

    #[must_use]
    pub fn variance(&self) -> f64 {
        self.estimated() - self.actual
    }
}

impl Add for Totals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            nominal_value: self.nominal_value + rhs.nominal_value,
            accumulated_fringe_contribution: self.accumulated_fringe_contribution
                + rhs.accumulated_fringe_contribution,
            accumulated_markup_contribution: self.accumulated_markup_contribution
                + rhs.accumulated_markup_contribution,
            markup_contribution: self.markup_contribution + rhs.markup_contribution,
            actual: self.actual + rhs.actual,
        }
    }
}

impl AddAssign for Totals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Totals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
