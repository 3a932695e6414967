//! Forward-mode automatic differentiation with dual numbers.
//!
//! A [`Dual`] carries a value together with its partial derivatives with respect to a fixed set of input
//! variables. Arithmetic on dual numbers propagates the partial derivatives with the chain rule, so any
//! composition of the supported operations yields both the value and the exact derivative of the composed
//! expression.
//!
//! A dual number with no partial derivatives at all is a *constant*. Constants may be freely mixed with
//! dual numbers that carry any number of partials.
use nalgebra::DVector;
use num::{One, Zero};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

mod tensor;

pub use tensor::*;

/// A value together with its partial derivatives.
///
/// # Examples
///
/// ```
/// use weakform::dual::Dual;
///
/// let x = Dual::variable(2.0, 0, 2);
/// let y = Dual::variable(3.0, 1, 2);
/// let f = &x * &y + x.exp();
/// assert_eq!(f.value(), 6.0 + 2.0f64.exp());
/// assert_eq!(f.partial(0), 3.0 + 2.0f64.exp());
/// assert_eq!(f.partial(1), 2.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Dual {
    value: f64,
    partials: DVector<f64>,
}

impl Dual {
    /// A dual number with vanishing derivatives.
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            partials: DVector::zeros(0),
        }
    }

    /// The `index`-th of `count` independent variables, with the given value.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    pub fn variable(value: f64, index: usize, count: usize) -> Self {
        assert!(index < count, "Variable index out of bounds");
        let mut partials = DVector::zeros(count);
        partials[index] = 1.0;
        Self { value, partials }
    }

    pub fn from_parts(value: f64, partials: DVector<f64>) -> Self {
        Self { value, partials }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn partials(&self) -> &DVector<f64> {
        &self.partials
    }

    /// The partial derivative with respect to the `index`-th variable.
    ///
    /// Returns zero for constants and for indices beyond the stored partials.
    pub fn partial(&self, index: usize) -> f64 {
        self.partials.get(index).copied().unwrap_or(0.0)
    }

    pub fn is_constant(&self) -> bool {
        self.partials.is_empty()
    }

    pub fn num_partials(&self) -> usize {
        self.partials.len()
    }

    /// Applies the chain rule for a scalar function `g` with `g(x) = value` and `g'(x) = derivative`.
    pub fn chain(&self, value: f64, derivative: f64) -> Self {
        Self {
            value,
            partials: &self.partials * derivative,
        }
    }

    pub fn exp(&self) -> Self {
        let e = self.value.exp();
        self.chain(e, e)
    }

    pub fn ln(&self) -> Self {
        self.chain(self.value.ln(), 1.0 / self.value)
    }

    pub fn sqrt(&self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, 0.5 / s)
    }

    pub fn powi(&self, n: i32) -> Self {
        // x^0 = 1 everywhere, including at x = 0 where 0 * 0^-1 would give NaN
        if n == 0 {
            return self.chain(1.0, 0.0);
        }
        self.chain(self.value.powi(n), n as f64 * self.value.powi(n - 1))
    }

    pub fn powf(&self, p: f64) -> Self {
        self.chain(self.value.powf(p), p * self.value.powf(p - 1.0))
    }

    pub fn sin(&self) -> Self {
        self.chain(self.value.sin(), self.value.cos())
    }

    pub fn cos(&self) -> Self {
        self.chain(self.value.cos(), -self.value.sin())
    }

    /// The absolute value. At zero, the derivative of the positive branch is used.
    pub fn abs(&self) -> Self {
        let sign = if self.value < 0.0 { -1.0 } else { 1.0 };
        self.chain(self.value.abs(), sign)
    }

    pub fn recip(&self) -> Self {
        self.chain(1.0 / self.value, -1.0 / (self.value * self.value))
    }
}

/// Computes `a * da + b * db`, where empty partials are treated as zero.
fn linear_combination(a: f64, da: &DVector<f64>, b: f64, db: &DVector<f64>) -> DVector<f64> {
    match (da.is_empty(), db.is_empty()) {
        (true, true) => DVector::zeros(0),
        (false, true) => da * a,
        (true, false) => db * b,
        (false, false) => {
            assert_eq!(da.len(), db.len(), "Dual numbers have different numbers of partials");
            let mut result = da * a;
            result.axpy(b, db, 1.0);
            result
        }
    }
}

fn dual_add(x: &Dual, y: &Dual) -> Dual {
    Dual {
        value: x.value + y.value,
        partials: linear_combination(1.0, &x.partials, 1.0, &y.partials),
    }
}

fn dual_sub(x: &Dual, y: &Dual) -> Dual {
    Dual {
        value: x.value - y.value,
        partials: linear_combination(1.0, &x.partials, -1.0, &y.partials),
    }
}

fn dual_mul(x: &Dual, y: &Dual) -> Dual {
    Dual {
        value: x.value * y.value,
        partials: linear_combination(y.value, &x.partials, x.value, &y.partials),
    }
}

fn dual_div(x: &Dual, y: &Dual) -> Dual {
    let inv = 1.0 / y.value;
    Dual {
        value: x.value * inv,
        partials: linear_combination(inv, &x.partials, -x.value * inv * inv, &y.partials),
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $kernel:ident) => {
        impl<'a, 'b> $trait<&'b Dual> for &'a Dual {
            type Output = Dual;

            fn $method(self, rhs: &'b Dual) -> Dual {
                $kernel(self, rhs)
            }
        }

        impl<'b> $trait<&'b Dual> for Dual {
            type Output = Dual;

            fn $method(self, rhs: &'b Dual) -> Dual {
                $kernel(&self, rhs)
            }
        }

        impl<'a> $trait<Dual> for &'a Dual {
            type Output = Dual;

            fn $method(self, rhs: Dual) -> Dual {
                $kernel(self, &rhs)
            }
        }

        impl $trait<Dual> for Dual {
            type Output = Dual;

            fn $method(self, rhs: Dual) -> Dual {
                $kernel(&self, &rhs)
            }
        }

        impl $trait<f64> for Dual {
            type Output = Dual;

            fn $method(self, rhs: f64) -> Dual {
                $kernel(&self, &Dual::constant(rhs))
            }
        }

        impl<'a> $trait<f64> for &'a Dual {
            type Output = Dual;

            fn $method(self, rhs: f64) -> Dual {
                $kernel(self, &Dual::constant(rhs))
            }
        }

        impl $trait<Dual> for f64 {
            type Output = Dual;

            fn $method(self, rhs: Dual) -> Dual {
                $kernel(&Dual::constant(self), &rhs)
            }
        }

        impl<'b> $trait<&'b Dual> for f64 {
            type Output = Dual;

            fn $method(self, rhs: &'b Dual) -> Dual {
                $kernel(&Dual::constant(self), rhs)
            }
        }

        impl $assign_trait<Dual> for Dual {
            fn $assign_method(&mut self, rhs: Dual) {
                *self = $kernel(self, &rhs);
            }
        }

        impl<'b> $assign_trait<&'b Dual> for Dual {
            fn $assign_method(&mut self, rhs: &'b Dual) {
                *self = $kernel(self, rhs);
            }
        }

        impl $assign_trait<f64> for Dual {
            fn $assign_method(&mut self, rhs: f64) {
                *self = $kernel(self, &Dual::constant(rhs));
            }
        }
    };
}

impl_binary_op!(Add, add, AddAssign, add_assign, dual_add);
impl_binary_op!(Sub, sub, SubAssign, sub_assign, dual_sub);
impl_binary_op!(Mul, mul, MulAssign, mul_assign, dual_mul);
impl_binary_op!(Div, div, DivAssign, div_assign, dual_div);

impl Neg for Dual {
    type Output = Dual;

    fn neg(self) -> Dual {
        Dual {
            value: -self.value,
            partials: -self.partials,
        }
    }
}

impl<'a> Neg for &'a Dual {
    type Output = Dual;

    fn neg(self) -> Dual {
        Dual {
            value: -self.value,
            partials: -&self.partials,
        }
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn is_zero(&self) -> bool {
        self.value == 0.0 && self.partials.iter().all(|p| *p == 0.0)
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl From<f64> for Dual {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl Sum for Dual {
    fn sum<I: Iterator<Item = Dual>>(iter: I) -> Self {
        iter.fold(Dual::zero(), |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Dual> for Dual {
    fn sum<I: Iterator<Item = &'a Dual>>(iter: I) -> Self {
        iter.fold(Dual::zero(), |acc, x| acc + x)
    }
}
