/// Which implementation evaluates the right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Native,
    Interpreted,
}

/// The ODE right-hand side `ydot = f(t, y, p)`.
///
/// Implementations assume `y` and `ydot` hold one entry per species and `p` one
/// entry per parameter; callers check the lengths.
pub trait Derivative: Send + Sync {
    fn evaluate(&self, t: f64, y: &[f64], p: &[f64], ydot: &mut [f64]);

    fn backend(&self) -> Backend;
}
