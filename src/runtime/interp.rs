//! Tree-walking evaluation of the equation text.

use super::derivative::{Backend, Derivative};
use super::error::RuntimeError;
use super::expr::{parse_assignments, BinOp, Expr, Function};

#[derive(Debug, Clone)]
enum Node {
    Const(f64),
    State(usize),
    Param(usize),
    Time,
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

impl Node {
    #[inline]
    fn eval(&self, t: f64, y: &[f64], p: &[f64]) -> f64 {
        match self {
            Node::Const(v) => *v,
            Node::State(i) => y[*i],
            Node::Param(j) => p[*j],
            Node::Time => t,
            Node::Neg(inner) => -inner.eval(t, y, p),
            Node::Binary(op, lhs, rhs) => op.apply(lhs.eval(t, y, p), rhs.eval(t, y, p)),
            Node::Call(func, args) => {
                let a = args[0].eval(t, y, p);
                let b = match args.get(1) {
                    Some(arg) => arg.eval(t, y, p),
                    None => 0.0,
                };
                func.apply(a, b)
            }
        }
    }
}

/// Right-hand side evaluated from `ydot[i] = ...;` statements.
#[derive(Debug, Clone)]
pub struct InterpretedRhs {
    equations: Vec<Node>,
    num_parameters: usize,
}

impl InterpretedRhs {
    /// Parse the equation text, checking every slot against the model shape.
    ///
    /// Each `ydot[i]` must be assigned exactly once. Expressions may only
    /// reference `y[i]` with `i < num_species`, `p[j]` with `j < num_parameters`,
    /// `t` and the builtin functions.
    pub fn parse(
        code: &str,
        num_species: usize,
        num_parameters: usize,
    ) -> Result<Self, RuntimeError> {
        let mut slots: Vec<Option<Node>> = vec![None; num_species];
        for stmt in parse_assignments(code)? {
            if stmt.array != "ydot" {
                return Err(RuntimeError::Equation(format!(
                    "cannot assign to '{}', only ydot",
                    stmt.array
                )));
            }
            let slot = slots.get_mut(stmt.index).ok_or_else(|| {
                RuntimeError::Equation(format!(
                    "ydot[{}] is out of range for {} species",
                    stmt.index, num_species
                ))
            })?;
            if slot.is_some() {
                return Err(RuntimeError::Equation(format!(
                    "ydot[{}] is assigned twice",
                    stmt.index
                )));
            }
            *slot = Some(lower(&stmt.value, num_species, num_parameters)?);
        }

        let mut equations = Vec::with_capacity(num_species);
        for (i, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(node) => equations.push(node),
                None => {
                    return Err(RuntimeError::Equation(format!(
                        "ydot[{}] is never assigned",
                        i
                    )))
                }
            }
        }
        Ok(Self {
            equations,
            num_parameters,
        })
    }

    pub fn num_species(&self) -> usize {
        self.equations.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.num_parameters
    }
}

fn lower(expr: &Expr, num_species: usize, num_parameters: usize) -> Result<Node, RuntimeError> {
    let slot = |kind: &str, index: usize, len: usize| {
        if index < len {
            Ok(index)
        } else {
            Err(RuntimeError::Equation(format!(
                "{}[{}] is out of range (length {})",
                kind, index, len
            )))
        }
    };
    let node = match expr {
        Expr::Number(v) => Node::Const(*v),
        Expr::State(i) => Node::State(slot("y", *i, num_species)?),
        Expr::Param(j) => Node::Param(slot("p", *j, num_parameters)?),
        Expr::Time => Node::Time,
        Expr::Index { array, index } => match array.as_str() {
            "y" => Node::State(slot("y", *index, num_species)?),
            "p" => Node::Param(slot("p", *index, num_parameters)?),
            other => {
                return Err(RuntimeError::Equation(format!(
                    "unknown array '{}'",
                    other
                )))
            }
        },
        Expr::Ident(name) if name == "t" => Node::Time,
        Expr::Ident(name) => {
            return Err(RuntimeError::Equation(format!(
                "unknown symbol '{}'",
                name
            )))
        }
        Expr::Species(i) => {
            return Err(RuntimeError::Equation(format!(
                "untranslated species marker __s{}",
                i
            )))
        }
        Expr::Neg(inner) => Node::Neg(Box::new(lower(inner, num_species, num_parameters)?)),
        Expr::Binary { op, lhs, rhs } => Node::Binary(
            *op,
            Box::new(lower(lhs, num_species, num_parameters)?),
            Box::new(lower(rhs, num_species, num_parameters)?),
        ),
        Expr::Call { name, args } => {
            let func = Function::from_name(name).ok_or_else(|| {
                RuntimeError::Equation(format!("unknown function '{}'", name))
            })?;
            if func.arity() != args.len() {
                return Err(RuntimeError::Equation(format!(
                    "{} takes {} argument(s), got {}",
                    name,
                    func.arity(),
                    args.len()
                )));
            }
            let args = args
                .iter()
                .map(|arg| lower(arg, num_species, num_parameters))
                .collect::<Result<Vec<_>, _>>()?;
            Node::Call(func, args)
        }
    };
    Ok(node)
}

impl Derivative for InterpretedRhs {
    fn evaluate(&self, t: f64, y: &[f64], p: &[f64], ydot: &mut [f64]) {
        for (out, node) in ydot.iter_mut().zip(&self.equations) {
            *out = node.eval(t, y, p);
        }
    }

    fn backend(&self) -> Backend {
        Backend::Interpreted
    }
}
