//! Declarative description of a Bayesian model as a graph of named nodes.
//!
//! A node is either stochastic (a distribution whose parameters are
//! expressions over other nodes and data) or deterministic (an expression).
//! Dependency edges are the names an expression refers to. Samplers read the
//! graph as data: they evaluate expressions against an environment of
//! current values instead of hard-coding the model.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use ndarray::{Array1, Array2};
use statrs::function::gamma::ln_gamma;
use thiserror::Error;

use crate::config::PriorConfig;

/// Errors in building or evaluating a model graph.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    /// A name that is neither a node nor a data entry.
    #[error("Reference to unknown node or data entry '{0}'.")]
    UnknownReference(String),
    /// Two nodes share a name.
    #[error("Node '{0}' is defined more than once.")]
    DuplicateNode(String),
    /// A plate that is not a declared scalar.
    #[error("Plate '{plate}' of node '{node}' is not a scalar data entry.")]
    InvalidPlate {
        /// Node carrying the plate.
        node: String,
        /// Name of the plate.
        plate: String,
    },
    /// A node depends on itself.
    #[error("The model graph has a cycle through node '{0}'.")]
    Cycle(String),
    /// Operands of incompatible shapes.
    #[error("Shape mismatch while evaluating '{0}'.")]
    ShapeMismatch(String),
    /// Distribution parameters of the wrong length.
    #[error("Distribution parameters for '{0}' must evaluate to scalars or match the value's length.")]
    ParameterShape(String),
}

/// A value bound to a name during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single number.
    Scalar(f64),
    /// A vector.
    Vector(Array1<f64>),
    /// A matrix.
    Matrix(Array2<f64>),
}

impl Value {
    /// The scalar, if this is one.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Element values as a flat vector; scalars become length-one vectors.
    pub fn to_flat(&self) -> Vec<f64> {
        match self {
            Value::Scalar(v) => vec![*v],
            Value::Vector(v) => v.to_vec(),
            Value::Matrix(m) => m.iter().copied().collect(),
        }
    }

    /// Element `i` of a vector, or the scalar itself.
    fn element(&self, i: usize) -> f64 {
        match self {
            Value::Scalar(v) => *v,
            Value::Vector(v) => v[i],
            Value::Matrix(m) => m.as_slice().map(|s| s[i]).unwrap_or(f64::NAN),
        }
    }

    fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(v) => v.len(),
            Value::Matrix(m) => m.len(),
        }
    }
}

/// Names mapped to their current values.
pub type Env = HashMap<String, Value>;

/// Arithmetic expression over named values.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal.
    Const(f64),
    /// A node or data entry, by name.
    Ref(String),
    /// Elementwise sum.
    Add(Box<Expr>, Box<Expr>),
    /// Elementwise difference.
    Sub(Box<Expr>, Box<Expr>),
    /// Elementwise product.
    Mul(Box<Expr>, Box<Expr>),
    /// Elementwise quotient.
    Div(Box<Expr>, Box<Expr>),
    /// Elementwise power.
    Pow(Box<Expr>, f64),
    /// Elementwise square root.
    Sqrt(Box<Expr>),
    /// `design[i, ] · coef` for every row `i` of a data matrix.
    RowDot(String, String),
    /// Inner product of two vectors.
    Dot(String, String),
}

impl Expr {
    /// Reference to `name`.
    pub fn var(name: &str) -> Self {
        Expr::Ref(name.to_string())
    }

    /// `self ^ exponent`.
    pub fn pow(self, exponent: f64) -> Self {
        Expr::Pow(Box::new(self), exponent)
    }

    /// `sqrt(self)`.
    pub fn sqrt(self) -> Self {
        Expr::Sqrt(Box::new(self))
    }

    /// Names this expression depends on, in first-use order.
    pub fn references(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut Vec<String>) {
        match self {
            Expr::Const(_) => {}
            Expr::Ref(name) => push_unique(out, name),
            Expr::RowDot(a, b) | Expr::Dot(a, b) => {
                push_unique(out, a);
                push_unique(out, b);
            }
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.collect_refs(out);
                b.collect_refs(out);
            }
            Expr::Pow(a, _) | Expr::Sqrt(a) => a.collect_refs(out),
        }
    }

    /// Evaluates the expression. Scalars broadcast against vectors.
    pub fn eval(&self, env: &Env) -> Result<Value, ModelError> {
        match self {
            Expr::Const(v) => Ok(Value::Scalar(*v)),
            Expr::Ref(name) => lookup(env, name).cloned(),
            Expr::Add(a, b) => binary(a.eval(env)?, b.eval(env)?, |x, y| x + y, self),
            Expr::Sub(a, b) => binary(a.eval(env)?, b.eval(env)?, |x, y| x - y, self),
            Expr::Mul(a, b) => binary(a.eval(env)?, b.eval(env)?, |x, y| x * y, self),
            Expr::Div(a, b) => binary(a.eval(env)?, b.eval(env)?, |x, y| x / y, self),
            Expr::Pow(a, e) => unary(a.eval(env)?, |x| x.powf(*e), self),
            Expr::Sqrt(a) => unary(a.eval(env)?, f64::sqrt, self),
            Expr::RowDot(design, coef) => match (lookup(env, design)?, lookup(env, coef)?) {
                (Value::Matrix(m), Value::Vector(v)) if m.ncols() == v.len() => {
                    Ok(Value::Vector(m.dot(v)))
                }
                _ => Err(ModelError::ShapeMismatch(self.to_string())),
            },
            Expr::Dot(a, b) => match (lookup(env, a)?, lookup(env, b)?) {
                (Value::Vector(u), Value::Vector(v)) if u.len() == v.len() => {
                    Ok(Value::Scalar(u.dot(v)))
                }
                _ => Err(ModelError::ShapeMismatch(self.to_string())),
            },
        }
    }

    /// Renders the expression in JAGS syntax; names for which `indexed`
    /// returns true get the loop index appended.
    fn render(&self, index: &str, indexed: &dyn Fn(&str) -> bool) -> String {
        let leaf = |name: &str| {
            if indexed(name) {
                format!("{name}[{index}]")
            } else {
                name.to_string()
            }
        };
        let wrap = |e: &Expr| match e {
            Expr::Add(..) | Expr::Sub(..) => format!("({})", e.render(index, indexed)),
            _ => e.render(index, indexed),
        };
        match self {
            Expr::Const(v) => format_number(*v),
            Expr::Ref(name) => leaf(name),
            Expr::Add(a, b) => format!(
                "{} + {}",
                a.render(index, indexed),
                b.render(index, indexed)
            ),
            Expr::Sub(a, b) => format!("{} - {}", a.render(index, indexed), wrap(b)),
            Expr::Mul(a, b) => format!("{} * {}", wrap(a), wrap(b)),
            Expr::Div(a, b) => match **b {
                Expr::Mul(..) | Expr::Div(..) => {
                    format!("{} / ({})", wrap(a), b.render(index, indexed))
                }
                _ => format!("{} / {}", wrap(a), wrap(b)),
            },
            Expr::Pow(a, e) => format!("pow({}, {})", a.render(index, indexed), format_number(*e)),
            Expr::Sqrt(a) => format!("sqrt({})", a.render(index, indexed)),
            Expr::RowDot(design, coef) => format!("inprod({design}[{index},], {coef})"),
            Expr::Dot(a, b) => format!("inprod({a}, {b})"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render("i", &|_| false))
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

fn lookup<'a>(env: &'a Env, name: &str) -> Result<&'a Value, ModelError> {
    env.get(name)
        .ok_or_else(|| ModelError::UnknownReference(name.to_string()))
}

fn format_number(v: f64) -> String {
    if v != 0.0 && (v.abs() < 1e-3 || v.abs() >= 1e6) {
        format!("{v:e}")
    } else {
        format!("{v}")
    }
}

fn binary(
    a: Value,
    b: Value,
    op: impl Fn(f64, f64) -> f64,
    expr: &Expr,
) -> Result<Value, ModelError> {
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => Ok(Value::Scalar(op(x, y))),
        (Value::Scalar(x), Value::Vector(v)) => Ok(Value::Vector(v.mapv(|y| op(x, y)))),
        (Value::Vector(v), Value::Scalar(y)) => Ok(Value::Vector(v.mapv(|x| op(x, y)))),
        (Value::Vector(u), Value::Vector(v)) if u.len() == v.len() => Ok(Value::Vector(
            Array1::from_shape_fn(u.len(), |i| op(u[i], v[i])),
        )),
        _ => Err(ModelError::ShapeMismatch(expr.to_string())),
    }
}

fn unary(a: Value, op: impl Fn(f64) -> f64, expr: &Expr) -> Result<Value, ModelError> {
    match a {
        Value::Scalar(x) => Ok(Value::Scalar(op(x))),
        Value::Vector(v) => Ok(Value::Vector(v.mapv(op))),
        Value::Matrix(_) => Err(ModelError::ShapeMismatch(expr.to_string())),
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Const(v)
    }
}

macro_rules! impl_expr_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<T: Into<Expr>> $trait<T> for Expr {
            type Output = Expr;
            fn $method(self, rhs: T) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

impl_expr_op!(Add, add, Add);
impl_expr_op!(Sub, sub, Sub);
impl_expr_op!(Mul, mul, Mul);
impl_expr_op!(Div, div, Div);

/// Distribution families a stochastic node may follow. Normal distributions
/// are parameterized by precision and Gamma distributions by rate, as in
/// BUGS/JAGS.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// `dnorm(mean, precision)`.
    Normal {
        /// Mean.
        mean: Expr,
        /// Inverse variance.
        precision: Expr,
    },
    /// `dgamma(shape, rate)`.
    Gamma {
        /// Shape.
        shape: Expr,
        /// Rate.
        rate: Expr,
    },
    /// `dexp(rate)`.
    Exponential {
        /// Rate.
        rate: Expr,
    },
}

impl Distribution {
    /// Parameter expressions in declaration order.
    pub fn parameters(&self) -> Vec<&Expr> {
        match self {
            Distribution::Normal { mean, precision } => vec![mean, precision],
            Distribution::Gamma { shape, rate } => vec![shape, rate],
            Distribution::Exponential { rate } => vec![rate],
        }
    }

    fn jags_name(&self) -> &'static str {
        match self {
            Distribution::Normal { .. } => "dnorm",
            Distribution::Gamma { .. } => "dgamma",
            Distribution::Exponential { .. } => "dexp",
        }
    }

    /// Log density of `value` (summed over elements), with the parameters
    /// evaluated in `env`.
    pub fn log_density(&self, value: &Value, env: &Env, node: &str) -> Result<f64, ModelError> {
        let params = self
            .parameters()
            .into_iter()
            .map(|p| p.eval(env))
            .collect::<Result<Vec<_>, _>>()?;
        let n = value.len();
        if params
            .iter()
            .any(|p| !matches!(p, Value::Scalar(_)) && p.len() != n)
        {
            return Err(ModelError::ParameterShape(node.to_string()));
        }

        let mut total = 0.0;
        for i in 0..n {
            let x = value.element(i);
            let p: Vec<f64> = params.iter().map(|v| v.element(i)).collect();
            total += match self {
                Distribution::Normal { .. } => {
                    let (mean, precision) = (p[0], p[1]);
                    0.5 * (precision / (2.0 * std::f64::consts::PI)).ln()
                        - 0.5 * precision * (x - mean).powi(2)
                }
                Distribution::Gamma { .. } => {
                    let (shape, rate) = (p[0], p[1]);
                    if x <= 0.0 {
                        return Ok(f64::NEG_INFINITY);
                    }
                    shape * rate.ln() - ln_gamma(shape) + (shape - 1.0) * x.ln() - rate * x
                }
                Distribution::Exponential { .. } => {
                    let rate = p[0];
                    if x < 0.0 {
                        return Ok(f64::NEG_INFINITY);
                    }
                    rate.ln() - rate * x
                }
            };
        }
        Ok(total)
    }
}

/// How a node gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Drawn from a distribution.
    Stochastic {
        /// Prior or likelihood.
        distribution: Distribution,
        /// Whether the value is supplied as data.
        observed: bool,
    },
    /// Computed from other nodes.
    Deterministic(Expr),
}

/// A named quantity of the model; `plate` names the data scalar giving its
/// length when it is a vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique node name.
    pub name: String,
    /// Data scalar giving the length, for vector nodes.
    pub plate: Option<String>,
    /// Stochastic or deterministic definition.
    pub kind: NodeKind,
}

impl Node {
    /// A latent node with the given prior.
    pub fn stochastic(name: &str, plate: Option<&str>, distribution: Distribution) -> Self {
        Self {
            name: name.to_string(),
            plate: plate.map(str::to_string),
            kind: NodeKind::Stochastic {
                distribution,
                observed: false,
            },
        }
    }

    /// A node whose value is supplied as data.
    pub fn observed(name: &str, plate: Option<&str>, distribution: Distribution) -> Self {
        Self {
            name: name.to_string(),
            plate: plate.map(str::to_string),
            kind: NodeKind::Stochastic {
                distribution,
                observed: true,
            },
        }
    }

    /// A node defined by an expression.
    pub fn deterministic(name: &str, plate: Option<&str>, expr: Expr) -> Self {
        Self {
            name: name.to_string(),
            plate: plate.map(str::to_string),
            kind: NodeKind::Deterministic(expr),
        }
    }

    /// Whether this is an observed stochastic node.
    pub fn is_observed(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { observed: true, .. })
    }

    /// The distribution of a stochastic node.
    pub fn distribution(&self) -> Option<&Distribution> {
        match &self.kind {
            NodeKind::Stochastic { distribution, .. } => Some(distribution),
            NodeKind::Deterministic(_) => None,
        }
    }

    /// Every name the node's definition refers to.
    pub fn references(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let exprs: Vec<&Expr> = match &self.kind {
            NodeKind::Stochastic { distribution, .. } => distribution.parameters(),
            NodeKind::Deterministic(expr) => vec![expr],
        };
        for expr in exprs {
            for name in expr.references() {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        out
    }
}

/// Shape of a data entry the model expects to be supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum DataShape {
    /// A single number.
    Scalar,
    /// A vector whose length is the named scalar.
    Vector(String),
    /// A matrix whose dimensions are the named scalars.
    Matrix(String, String),
}

/// A data entry the model reads.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDecl {
    /// Name used in expressions.
    pub name: String,
    /// Expected shape.
    pub shape: DataShape,
}

impl DataDecl {
    fn new(name: &str, shape: DataShape) -> Self {
        Self {
            name: name.to_string(),
            shape,
        }
    }
}

/// Data declarations plus the node graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Data the model expects.
    pub data: Vec<DataDecl>,
    /// Nodes in declaration order.
    pub nodes: Vec<Node>,
}

impl ModelSpec {
    /// Linear regression with the Generalized Double Pareto shrinkage prior,
    /// written as its Normal / Exponential / Gamma scale mixture:
    ///
    /// ```text
    /// y[i]    ~ Normal(x[i,]·beta + alpha, phi)
    /// beta[j] ~ Normal(0, sqrt(n_train - 1) * phi / tau[j])
    /// tau[j]  ~ Exponential(lambda^2 / 2)
    /// lambda  ~ Gamma(1, 1),  phi ~ Gamma(1e-6, 1e-6),  alpha ~ Normal(0, 1e-10)
    /// ```
    ///
    /// Predictions for the test rows (`mu_pred`) and the coefficients on the
    /// original covariate scale (`beta_orig`, `beta0`) are deterministic nodes.
    pub fn gdp(priors: &PriorConfig) -> Self {
        use DataShape::{Matrix, Scalar, Vector};
        let data = vec![
            DataDecl::new("n_train", Scalar),
            DataDecl::new("n_test", Scalar),
            DataDecl::new("p", Scalar),
            DataDecl::new("x", Matrix("n_train".into(), "p".into())),
            DataDecl::new("x_test", Matrix("n_test".into(), "p".into())),
            DataDecl::new("x_center", Vector("p".into())),
            DataDecl::new("x_scale", Vector("p".into())),
        ];

        let nodes = vec![
            Node::deterministic(
                "mu",
                Some("n_train"),
                Expr::RowDot("x".into(), "beta".into()) + Expr::var("alpha"),
            ),
            Node::observed(
                "y",
                Some("n_train"),
                Distribution::Normal {
                    mean: Expr::var("mu"),
                    precision: Expr::var("phi"),
                },
            ),
            Node::deterministic(
                "mu_pred",
                Some("n_test"),
                Expr::RowDot("x_test".into(), "beta".into()) + Expr::var("alpha"),
            ),
            Node::stochastic(
                "phi",
                None,
                Distribution::Gamma {
                    shape: Expr::Const(priors.phi_shape),
                    rate: Expr::Const(priors.phi_rate),
                },
            ),
            Node::deterministic("sigma", None, Expr::var("phi").pow(-0.5)),
            Node::stochastic(
                "alpha",
                None,
                Distribution::Normal {
                    mean: Expr::Const(0.0),
                    precision: Expr::Const(priors.alpha_precision),
                },
            ),
            Node::stochastic(
                "beta",
                Some("p"),
                Distribution::Normal {
                    mean: Expr::Const(0.0),
                    precision: (Expr::var("n_train") - 1.0).sqrt() * Expr::var("phi")
                        / Expr::var("tau"),
                },
            ),
            Node::stochastic(
                "tau",
                Some("p"),
                Distribution::Exponential {
                    rate: Expr::var("lambda").pow(2.0) / 2.0,
                },
            ),
            Node::stochastic(
                "lambda",
                None,
                Distribution::Gamma {
                    shape: Expr::Const(priors.lambda_shape),
                    rate: Expr::Const(priors.lambda_rate),
                },
            ),
            Node::deterministic(
                "beta_orig",
                Some("p"),
                Expr::var("beta") / Expr::var("x_scale"),
            ),
            Node::deterministic(
                "beta0",
                None,
                Expr::var("alpha") - Expr::Dot("beta_orig".into(), "x_center".into()),
            ),
        ];

        Self { data, nodes }
    }

    /// The node called `name`.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn data_decl(&self, name: &str) -> Option<&DataDecl> {
        self.data.iter().find(|d| d.name == name)
    }

    /// Nodes the given node depends on directly.
    pub fn parents(&self, name: &str) -> Result<Vec<String>, ModelError> {
        let node = self
            .node(name)
            .ok_or_else(|| ModelError::UnknownReference(name.to_string()))?;
        Ok(node
            .references()
            .into_iter()
            .filter(|r| self.node(r).is_some())
            .collect())
    }

    /// Checks names, references, plates and acyclicity.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(ModelError::DuplicateNode(node.name.clone()));
            }
        }
        for node in &self.nodes {
            for name in node.references() {
                if self.node(&name).is_none() && self.data_decl(&name).is_none() {
                    return Err(ModelError::UnknownReference(name));
                }
            }
            if let Some(plate) = &node.plate {
                match self.data_decl(plate) {
                    Some(DataDecl {
                        shape: DataShape::Scalar,
                        ..
                    }) => {}
                    _ => {
                        return Err(ModelError::InvalidPlate {
                            node: node.name.clone(),
                            plate: plate.clone(),
                        })
                    }
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Node names ordered so that every node follows its parents.
    pub fn topological_order(&self) -> Result<Vec<String>, ModelError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            spec: &ModelSpec,
            name: &str,
            marks: &mut HashMap<String, Mark>,
            order: &mut Vec<String>,
        ) -> Result<(), ModelError> {
            match marks.get(name).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => return Ok(()),
                Mark::InProgress => return Err(ModelError::Cycle(name.to_string())),
                Mark::Unvisited => {}
            }
            marks.insert(name.to_string(), Mark::InProgress);
            for parent in spec.parents(name)? {
                visit(spec, &parent, marks, order)?;
            }
            marks.insert(name.to_string(), Mark::Done);
            order.push(name.to_string());
            Ok(())
        }

        let mut marks = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            visit(self, &node.name, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    /// `name` and every node it transitively depends on.
    pub fn ancestors(&self, name: &str) -> Result<HashSet<String>, ModelError> {
        let mut out = HashSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if out.insert(current.clone()) {
                stack.extend(self.parents(&current)?);
            }
        }
        Ok(out)
    }

    fn is_plated(&self, name: &str, plate: &str) -> bool {
        if let Some(node) = self.node(name) {
            return node.plate.as_deref() == Some(plate);
        }
        matches!(
            self.data_decl(name),
            Some(DataDecl { shape: DataShape::Vector(p), .. }) if p == plate
        )
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "model {{")?;
        let index = "i";
        for node in &self.nodes {
            let (lhs, indent) = match &node.plate {
                Some(plate) => {
                    writeln!(f, "  for ({index} in 1:{plate}) {{")?;
                    (format!("{}[{index}]", node.name), "    ")
                }
                None => (node.name.clone(), "  "),
            };
            let indexed = |name: &str| {
                node.plate
                    .as_deref()
                    .map(|plate| self.is_plated(name, plate))
                    .unwrap_or(false)
            };
            let rhs = match &node.kind {
                NodeKind::Stochastic { distribution, .. } => {
                    let params: Vec<String> = distribution
                        .parameters()
                        .iter()
                        .map(|p| p.render(index, &indexed))
                        .collect();
                    format!("~ {}({})", distribution.jags_name(), params.join(", "))
                }
                NodeKind::Deterministic(expr) => format!("<- {}", expr.render(index, &indexed)),
            };
            writeln!(f, "{indent}{lhs} {rhs}")?;
            if node.plate.is_some() {
                writeln!(f, "  }}")?;
            }
        }
        write!(f, "}}")
    }
}
