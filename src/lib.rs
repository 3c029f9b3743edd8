extern crate nalgebra as na;
extern crate num_traits;
extern crate simba;

use na::{base::Scalar, ComplexField, RealField, SimdRealField};
use num_traits::{FromPrimitive, NumAssign};
use simba::scalar::{SubsetOf, SupersetOf};

pub mod features;
pub mod io;
pub mod matching;
pub mod numerics;
pub mod robust;
pub mod sensors;
pub mod sfm;
pub mod tracks;

macro_rules! define_float {
    ($f:tt) => {
        pub use std::$f as float;
        pub type Float = $f;
    }
}

define_float!(f64);

pub trait GenericFloat:
    num_traits::float::Float
    + Scalar
    + NumAssign
    + FromPrimitive
    + SimdRealField
    + ComplexField
    + RealField
    + SubsetOf<Float>
    + SupersetOf<Float>
{
}

impl<T> GenericFloat for T where
    T: num_traits::float::Float
        + Scalar
        + NumAssign
        + FromPrimitive
        + SimdRealField
        + ComplexField
        + RealField
        + SubsetOf<Float>
        + SupersetOf<Float>
{
}
