use std::sync::Arc;

use diffsol::{
    ConstantOp, LinearOp, NonLinearOp, NonLinearOpJacobian, OdeEquations, OdeEquationsRef, Op,
};
use nalgebra::DVector;

use super::derivative::Derivative;

type T = f64;
type V = nalgebra::DVector<f64>;
type M = nalgebra::DMatrix<f64>;

pub struct RhsOp<'a> {
    nstates: usize,
    nparams: usize,
    rhs: &'a dyn Derivative,
    p: &'a V,
}

impl<'a> Op for RhsOp<'a> {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

pub struct UnitMass {
    nstates: usize,
    nparams: usize,
}

impl Op for UnitMass {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

pub struct InitialState {
    nstates: usize,
    nparams: usize,
    init: V,
}

impl Op for InitialState {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

pub struct NoRoot {
    nstates: usize,
    nparams: usize,
}

impl Op for NoRoot {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        0
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

pub struct NoOut {
    nstates: usize,
    nparams: usize,
}

impl Op for NoOut {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl<'a> NonLinearOp for RhsOp<'a> {
    fn call_inplace(&self, x: &Self::V, t: Self::T, y: &mut Self::V) {
        self.rhs
            .evaluate(t, x.as_slice(), self.p.as_slice(), y.as_mut_slice());
    }
}

impl<'a> NonLinearOpJacobian for RhsOp<'a> {
    // forward difference along v: J v ~ (f(x + h v) - f(x)) / h
    fn jac_mul_inplace(&self, x: &Self::V, t: Self::T, v: &Self::V, y: &mut Self::V) {
        let vnorm = v.amax();
        if vnorm == 0.0 {
            y.fill(0.0);
            return;
        }
        let h = f64::EPSILON.sqrt() * (1.0 + x.amax()) / vnorm;
        let mut shifted = x.clone();
        shifted.axpy(h, v, 1.0);
        let mut base = DVector::zeros(self.nstates);
        self.rhs
            .evaluate(t, x.as_slice(), self.p.as_slice(), base.as_mut_slice());
        self.rhs
            .evaluate(t, shifted.as_slice(), self.p.as_slice(), y.as_mut_slice());
        y.axpy(-1.0 / h, &base, 1.0 / h);
    }
}

impl LinearOp for UnitMass {
    fn gemv_inplace(&self, _x: &Self::V, _t: Self::T, _beta: Self::T, _y: &mut Self::V) {}
}

impl ConstantOp for InitialState {
    fn call_inplace(&self, _t: Self::T, y: &mut Self::V) {
        y.copy_from(&self.init);
    }
}

impl NonLinearOp for NoRoot {
    fn call_inplace(&self, _x: &Self::V, _t: Self::T, _y: &mut Self::V) {}
}

impl NonLinearOp for NoOut {
    fn call_inplace(&self, _x: &Self::V, _t: Self::T, _y: &mut Self::V) {}
}

/// The reaction network as a diffsol problem: `dy/dt = f(t, y, p)` from `y0`.
pub struct ReactionProblem {
    rhs: Arc<dyn Derivative>,
    nstates: usize,
    nparams: usize,
    p: V,
    init: V,
}

impl ReactionProblem {
    pub fn new(rhs: Arc<dyn Derivative>, p: &[f64], init: &[f64]) -> Self {
        Self {
            rhs,
            nstates: init.len(),
            nparams: p.len(),
            p: DVector::from_column_slice(p),
            init: DVector::from_column_slice(init),
        }
    }
}

impl Op for ReactionProblem {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl<'b> OdeEquationsRef<'b> for ReactionProblem {
    type Rhs = RhsOp<'b>;
    type Mass = UnitMass;
    type Init = InitialState;
    type Root = NoRoot;
    type Out = NoOut;
}

impl OdeEquations for ReactionProblem {
    fn rhs(&self) -> RhsOp<'_> {
        RhsOp {
            nstates: self.nstates,
            nparams: self.nparams,
            rhs: self.rhs.as_ref(),
            p: &self.p,
        }
    }

    fn mass(&self) -> Option<UnitMass> {
        None
    }

    fn init(&self) -> InitialState {
        InitialState {
            nstates: self.nstates,
            nparams: self.nparams,
            init: self.init.clone(),
        }
    }

    fn get_params(&self, p: &mut V) {
        p.copy_from(&self.p);
    }

    fn root(&self) -> Option<NoRoot> {
        None
    }

    fn out(&self) -> Option<NoOut> {
        None
    }

    fn set_params(&mut self, p: &V) {
        self.p.copy_from(p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::derivative::Backend;
    use approx::assert_relative_eq;

    struct Quadratic;

    impl Derivative for Quadratic {
        fn evaluate(&self, _t: f64, y: &[f64], p: &[f64], ydot: &mut [f64]) {
            ydot[0] = -p[0] * y[0] * y[0];
            ydot[1] = y[0] - y[1];
        }

        fn backend(&self) -> Backend {
            Backend::Interpreted
        }
    }

    #[test]
    fn test_rhs_and_jacobian_product() {
        let problem = ReactionProblem::new(Arc::new(Quadratic), &[2.0], &[1.0, 0.0]);
        let rhs = problem.rhs();
        let x = DVector::from_vec(vec![3.0, 1.0]);
        let mut y = DVector::zeros(2);
        rhs.call_inplace(&x, 0.0, &mut y);
        assert_relative_eq!(y[0], -18.0);
        assert_relative_eq!(y[1], 2.0);

        // J = [[-2 p x0, 0], [1, -1]]
        let v = DVector::from_vec(vec![1.0, 2.0]);
        rhs.jac_mul_inplace(&x, 0.0, &v, &mut y);
        assert_relative_eq!(y[0], -12.0, max_relative = 1e-5);
        assert_relative_eq!(y[1], -1.0, max_relative = 1e-5);
    }

    #[test]
    fn test_init_and_params() {
        let mut problem = ReactionProblem::new(Arc::new(Quadratic), &[2.0], &[1.0, 0.5]);
        let mut y0 = DVector::zeros(2);
        problem.init().call_inplace(0.0, &mut y0);
        assert_eq!(y0.as_slice(), &[1.0, 0.5]);

        problem.set_params(&DVector::from_vec(vec![4.0]));
        let mut p = DVector::zeros(1);
        problem.get_params(&mut p);
        assert_eq!(p[0], 4.0);
    }
}
