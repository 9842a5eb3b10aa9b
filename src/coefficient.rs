//! Coefficient functions: composable expression trees evaluated at integration points.
//!
//! A [`Coefficient`] is an immutable, shareable tree of a closed set of node kinds
//! (constants, coordinates, material lookups, arithmetic, basis-function proxies and a
//! custom-callback escape hatch), dispatched explicitly over the node tag. Evaluation
//! is pure given a [`PointContext`]: the element, its mapped integration point and,
//! during assembly, the active trial/test basis slots.
//!
//! Values are scalars, vectors or matrices of dimension at most three, held in
//! fixed-size storage ([`Value`]) so that evaluation never allocates.

use crate::error::Error;
use crate::mesh::ElementId;
use crate::transformation::MappedPoint;
use crate::Real;
use nalgebra::{DMatrix, Matrix3, Point3, Vector3};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

/// The shape of a coefficient value: scalars are `1 x 1`, column vectors `n x 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
}

impl Shape {
    pub const SCALAR: Shape = Shape { rows: 1, cols: 1 };

    pub fn vector(dim: usize) -> Self {
        Shape { rows: dim, cols: 1 }
    }

    pub fn is_scalar(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// A coefficient value in fixed-size storage.
#[derive(Debug, Clone, Copy)]
pub enum Value<T: Real> {
    Scalar(T),
    Vector { data: Vector3<T>, dim: usize },
    Matrix { data: Matrix3<T>, shape: Shape },
}

impl<T: Real> Value<T> {
    pub fn shape(&self) -> Shape {
        match self {
            Self::Scalar(_) => Shape::SCALAR,
            Self::Vector { dim, .. } => Shape::vector(*dim),
            Self::Matrix { shape, .. } => *shape,
        }
    }

    /// Extracts a scalar, failing with a shape mismatch otherwise.
    pub fn into_scalar(self) -> Result<T, Error> {
        match self {
            Self::Scalar(value) => Ok(value),
            other => Err(Error::ShapeMismatch {
                operation: "scalar extraction",
                lhs: other.shape(),
                rhs: Shape::SCALAR,
            }),
        }
    }

    fn zero_vector(dim: usize) -> Self {
        Self::Vector {
            data: Vector3::zeros(),
            dim,
        }
    }

    fn map(self, f: impl Fn(T) -> T) -> Self {
        match self {
            Self::Scalar(v) => Self::Scalar(f(v)),
            Self::Vector { data, dim } => Self::Vector {
                data: data.map(|v| f(v)),
                dim,
            },
            Self::Matrix { data, shape } => Self::Matrix {
                data: data.map(|v| f(v)),
                shape,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Abs,
    Sin,
    Cos,
    Exp,
    Log,
    Sqrt,
}

impl UnaryOp {
    fn name(&self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Abs => "abs",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sqrt => "sqrt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    /// Scaling: one operand must be scalar.
    Mul,
    /// Division by a scalar.
    Div,
    /// Componentwise (Frobenius) inner product of equally shaped operands.
    Inner,
}

impl BinaryOp {
    fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Inner => "inner",
        }
    }
}

/// Which differential operator a basis-function proxy carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Value,
    Gradient,
}

/// Whether a proxy stands for the trial or the test function of a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Trial,
    Test,
}

/// The context for evaluating a coefficient at a single integration point.
pub struct PointContext<'a, T: Real> {
    pub element: ElementId,
    /// The marker of the element (material index or boundary tag).
    pub material: usize,
    pub mesh_dimension: usize,
    pub reference: Point3<T>,
    pub mapped: &'a MappedPoint<T>,
    /// The active trial basis function, present during bilinear-form assembly.
    pub trial: Option<BasisSlot<T>>,
    /// The active test basis function, present during assembly.
    pub test: Option<BasisSlot<T>>,
}

/// Value and physical gradient of one basis function at the evaluation point.
#[derive(Debug, Clone, Copy)]
pub struct BasisSlot<T: Real> {
    pub value: T,
    pub gradient: Vector3<T>,
}

type CustomFn<T> = dyn Fn(&PointContext<T>) -> Value<T> + Send + Sync;

enum Node<T: Real> {
    Constant(DMatrix<T>),
    /// The physical coordinate along the given axis.
    Coordinate(usize),
    /// A per-material scalar table, looked up by the element marker.
    MaterialConstant(Vec<T>),
    /// A vector of zeros of the mesh dimension (the gradient of a constant).
    ZeroVector,
    Unary {
        op: UnaryOp,
        arg: Coefficient<T>,
    },
    Binary {
        op: BinaryOp,
        lhs: Coefficient<T>,
        rhs: Coefficient<T>,
    },
    Proxy {
        kind: ProxyKind,
        diff: DiffOp,
    },
    Custom {
        shape: Shape,
        f: Arc<CustomFn<T>>,
    },
}

impl<T: Real> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(c) => write!(f, "Constant({}x{})", c.nrows(), c.ncols()),
            Self::Coordinate(axis) => write!(f, "Coordinate({})", axis),
            Self::MaterialConstant(values) => write!(f, "MaterialConstant({} entries)", values.len()),
            Self::ZeroVector => write!(f, "ZeroVector"),
            Self::Unary { op, arg } => write!(f, "Unary({}, {:?})", op.name(), arg),
            Self::Binary { op, lhs, rhs } => {
                write!(f, "Binary({}, {:?}, {:?})", op.name(), lhs, rhs)
            }
            Self::Proxy { kind, diff } => write!(f, "Proxy({:?}, {:?})", kind, diff),
            Self::Custom { shape, .. } => write!(f, "Custom({})", shape),
        }
    }
}

/// A coefficient function: a shareable, immutable expression tree.
///
/// Cloning is cheap (the tree is reference-counted) and trees may be shared freely
/// between forms and threads.
#[derive(Debug, Clone)]
pub struct Coefficient<T: Real>(Arc<Node<T>>);

impl<T: Real> Coefficient<T> {
    fn from_node(node: Node<T>) -> Self {
        Self(Arc::new(node))
    }

    /// A scalar constant.
    pub fn constant(value: T) -> Self {
        Self::from_node(Node::Constant(DMatrix::from_element(1, 1, value)))
    }

    /// A constant column vector (dimension at most 3).
    pub fn vector(values: &[T]) -> Self {
        assert!(
            (1..=3).contains(&values.len()),
            "constant vectors have dimension 1 to 3"
        );
        Self::from_node(Node::Constant(DMatrix::from_column_slice(
            values.len(),
            1,
            values,
        )))
    }

    /// A constant matrix (at most `3 x 3`).
    pub fn matrix(values: DMatrix<T>) -> Self {
        assert!(
            values.nrows() <= 3 && values.ncols() <= 3 && values.nrows() >= 1 && values.ncols() >= 1,
            "constant matrices have at most 3 rows and columns"
        );
        Self::from_node(Node::Constant(values))
    }

    /// The physical coordinate along the given axis (0 = x, 1 = y, 2 = z).
    pub fn coordinate(axis: usize) -> Self {
        assert!(axis < 3, "coordinate axis must be 0, 1 or 2");
        Self::from_node(Node::Coordinate(axis))
    }

    /// A piecewise constant looked up by element material index.
    pub fn material_constants(values: Vec<T>) -> Self {
        Self::from_node(Node::MaterialConstant(values))
    }

    /// The trial-function proxy of a bilinear form.
    pub fn trial() -> Self {
        Self::from_node(Node::Proxy {
            kind: ProxyKind::Trial,
            diff: DiffOp::Value,
        })
    }

    /// The test-function proxy of a form.
    pub fn test() -> Self {
        Self::from_node(Node::Proxy {
            kind: ProxyKind::Test,
            diff: DiffOp::Value,
        })
    }

    /// An arbitrary callback evaluated with the full point context.
    ///
    /// The callback must return values of the declared shape; this is checked with a
    /// debug assertion during evaluation.
    pub fn custom(
        shape: Shape,
        f: impl Fn(&PointContext<T>) -> Value<T> + Send + Sync + 'static,
    ) -> Self {
        Self::from_node(Node::Custom { shape, f: Arc::new(f) })
    }

    /// A scalar function of the physical coordinates.
    pub fn from_fn(f: impl Fn(&Point3<T>) -> T + Send + Sync + 'static) -> Self {
        Self::custom(Shape::SCALAR, move |ctx| Value::Scalar(f(&ctx.mapped.point)))
    }

    fn unary(self, op: UnaryOp) -> Self {
        Self::from_node(Node::Unary { op, arg: self })
    }

    fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::from_node(Node::Binary { op, lhs, rhs })
    }

    pub fn abs(self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    pub fn sin(self) -> Self {
        self.unary(UnaryOp::Sin)
    }

    pub fn cos(self) -> Self {
        self.unary(UnaryOp::Cos)
    }

    pub fn exp(self) -> Self {
        self.unary(UnaryOp::Exp)
    }

    pub fn log(self) -> Self {
        self.unary(UnaryOp::Log)
    }

    pub fn sqrt(self) -> Self {
        self.unary(UnaryOp::Sqrt)
    }

    /// The componentwise inner product of two equally shaped coefficients.
    pub fn inner(self, other: Self) -> Self {
        Self::binary(BinaryOp::Inner, self, other)
    }

    /// Whether the tree contains a proxy of the given kind.
    pub fn references_proxy(&self, kind: ProxyKind) -> bool {
        match &*self.0 {
            Node::Proxy { kind: k, .. } => *k == kind,
            Node::Unary { arg, .. } => arg.references_proxy(kind),
            Node::Binary { lhs, rhs, .. } => {
                lhs.references_proxy(kind) || rhs.references_proxy(kind)
            }
            _ => false,
        }
    }

    /// The shape of the coefficient's values, given the mesh dimension.
    ///
    /// Fails with a shape mismatch if the tree combines incompatible operands.
    pub fn shape(&self, mesh_dimension: usize) -> Result<Shape, Error> {
        match &*self.0 {
            Node::Constant(c) => Ok(Shape {
                rows: c.nrows(),
                cols: c.ncols(),
            }),
            Node::Coordinate(_) | Node::MaterialConstant(_) => Ok(Shape::SCALAR),
            Node::ZeroVector => Ok(Shape::vector(mesh_dimension)),
            Node::Unary { op, arg } => {
                let shape = arg.shape(mesh_dimension)?;
                match op {
                    UnaryOp::Neg | UnaryOp::Abs => Ok(shape),
                    _ if shape.is_scalar() => Ok(shape),
                    _ => Err(Error::ShapeMismatch {
                        operation: op.name(),
                        lhs: shape,
                        rhs: Shape::SCALAR,
                    }),
                }
            }
            Node::Binary { op, lhs, rhs } => {
                let lhs = lhs.shape(mesh_dimension)?;
                let rhs = rhs.shape(mesh_dimension)?;
                binary_shape(*op, lhs, rhs)
            }
            Node::Proxy { diff, .. } => match diff {
                DiffOp::Value => Ok(Shape::SCALAR),
                DiffOp::Gradient => Ok(Shape::vector(mesh_dimension)),
            },
            Node::Custom { shape, .. } => Ok(*shape),
        }
    }

    /// Evaluates the coefficient at a single integration point.
    ///
    /// Evaluation is pure: the same context always produces the same value, and no
    /// state is mutated.
    pub fn evaluate(&self, ctx: &PointContext<T>) -> Result<Value<T>, Error> {
        match &*self.0 {
            Node::Constant(c) => Ok(constant_value(c)),
            Node::Coordinate(axis) => Ok(Value::Scalar(ctx.mapped.point[*axis])),
            Node::MaterialConstant(values) => values
                .get(ctx.material)
                .map(|&v| Value::Scalar(v))
                .ok_or_else(|| {
                    Error::configuration(
                        "materials",
                        format!("no coefficient value for material index {}", ctx.material),
                    )
                }),
            Node::ZeroVector => Ok(Value::zero_vector(ctx.mesh_dimension)),
            Node::Unary { op, arg } => {
                let value = arg.evaluate(ctx)?;
                apply_unary(*op, value)
            }
            Node::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate(ctx)?;
                let rhs = rhs.evaluate(ctx)?;
                apply_binary(*op, lhs, rhs)
            }
            Node::Proxy { kind, diff } => {
                let slot = match kind {
                    ProxyKind::Trial => ctx.trial.as_ref(),
                    ProxyKind::Test => ctx.test.as_ref(),
                }
                .ok_or_else(|| {
                    Error::unsupported(
                        "evaluate",
                        "trial/test proxies can only be evaluated during form assembly",
                    )
                })?;
                match diff {
                    DiffOp::Value => Ok(Value::Scalar(slot.value)),
                    DiffOp::Gradient => Ok(Value::Vector {
                        data: slot.gradient,
                        dim: ctx.mesh_dimension,
                    }),
                }
            }
            Node::Custom { shape, f } => {
                let value = f(ctx);
                debug_assert_eq!(value.shape(), *shape, "custom coefficient shape mismatch");
                Ok(value)
            }
        }
    }
}

/// The gradient of a coefficient.
///
/// Defined for basis-function proxies (symbolically, by switching the proxy to its
/// gradient) and for constants (the well-defined zero). Anything else, in particular
/// piecewise-constant material lookups whose derivative across element boundaries is
/// undefined, fails with an unsupported-operation error rather than silently returning
/// zero.
pub fn grad<T: Real>(coefficient: &Coefficient<T>) -> Result<Coefficient<T>, Error> {
    match &*coefficient.0 {
        Node::Proxy { kind, diff: DiffOp::Value } => Ok(Coefficient::from_node(Node::Proxy {
            kind: *kind,
            diff: DiffOp::Gradient,
        })),
        Node::Proxy { diff: DiffOp::Gradient, .. } => Err(Error::unsupported(
            "grad",
            "second derivatives of basis functions are not available",
        )),
        Node::Constant(c) if c.nrows() == 1 && c.ncols() == 1 => {
            Ok(Coefficient::from_node(Node::ZeroVector))
        }
        Node::MaterialConstant(_) => Err(Error::unsupported(
            "grad",
            "piecewise material constants are discontinuous across element boundaries",
        )),
        _ => Err(Error::unsupported(
            "grad",
            "gradients are only defined for basis-function proxies and scalar constants",
        )),
    }
}

/// The divergence of a vector-valued coefficient.
pub fn div<T: Real>(coefficient: &Coefficient<T>) -> Result<Coefficient<T>, Error> {
    match &*coefficient.0 {
        Node::Constant(c) if c.ncols() == 1 && c.nrows() > 1 => Ok(Coefficient::constant(T::zero())),
        Node::ZeroVector => Ok(Coefficient::constant(T::zero())),
        Node::Proxy { diff: DiffOp::Gradient, .. } => Err(Error::unsupported(
            "div",
            "second derivatives of basis functions are not available",
        )),
        _ => Err(Error::unsupported(
            "div",
            "divergence is only defined for differentiable vector-valued nodes",
        )),
    }
}

/// The curl of a three-dimensional vector-valued coefficient.
pub fn curl<T: Real>(coefficient: &Coefficient<T>) -> Result<Coefficient<T>, Error> {
    match &*coefficient.0 {
        Node::Constant(c) if c.ncols() == 1 && c.nrows() == 3 => {
            Ok(Coefficient::vector(&[T::zero(), T::zero(), T::zero()]))
        }
        Node::ZeroVector => Ok(Coefficient::from_node(Node::ZeroVector)),
        Node::Proxy { diff: DiffOp::Gradient, .. } => Err(Error::unsupported(
            "curl",
            "second derivatives of basis functions are not available",
        )),
        _ => Err(Error::unsupported(
            "curl",
            "curl is only defined for differentiable three-dimensional vector nodes",
        )),
    }
}

fn constant_value<T: Real>(c: &DMatrix<T>) -> Value<T> {
    let (rows, cols) = c.shape();
    if rows == 1 && cols == 1 {
        Value::Scalar(c[(0, 0)])
    } else if cols == 1 {
        let mut data = Vector3::zeros();
        for r in 0..rows {
            data[r] = c[(r, 0)];
        }
        Value::Vector { data, dim: rows }
    } else {
        let mut data = Matrix3::zeros();
        for r in 0..rows {
            for s in 0..cols {
                data[(r, s)] = c[(r, s)];
            }
        }
        Value::Matrix {
            data,
            shape: Shape { rows, cols },
        }
    }
}

fn apply_unary<T: Real>(op: UnaryOp, value: Value<T>) -> Result<Value<T>, Error> {
    match op {
        UnaryOp::Neg => Ok(value.map(|v| -v)),
        UnaryOp::Abs => Ok(value.map(|v| v.abs())),
        UnaryOp::Sin | UnaryOp::Cos | UnaryOp::Exp | UnaryOp::Log | UnaryOp::Sqrt => {
            let v = value.into_scalar().map_err(|_| Error::ShapeMismatch {
                operation: op.name(),
                lhs: value.shape(),
                rhs: Shape::SCALAR,
            })?;
            let result = match op {
                UnaryOp::Sin => v.sin(),
                UnaryOp::Cos => v.cos(),
                UnaryOp::Exp => v.exp(),
                UnaryOp::Log => v.ln(),
                UnaryOp::Sqrt => v.sqrt(),
                _ => unreachable!(),
            };
            Ok(Value::Scalar(result))
        }
    }
}

fn binary_shape(op: BinaryOp, lhs: Shape, rhs: Shape) -> Result<Shape, Error> {
    let mismatch = || Error::ShapeMismatch {
        operation: op.name(),
        lhs,
        rhs,
    };
    match op {
        BinaryOp::Add | BinaryOp::Sub => (lhs == rhs).then_some(lhs).ok_or_else(mismatch),
        BinaryOp::Mul => {
            if lhs.is_scalar() {
                Ok(rhs)
            } else if rhs.is_scalar() {
                Ok(lhs)
            } else {
                Err(mismatch())
            }
        }
        BinaryOp::Div => rhs.is_scalar().then_some(lhs).ok_or_else(mismatch),
        BinaryOp::Inner => (lhs == rhs).then_some(Shape::SCALAR).ok_or_else(mismatch),
    }
}

fn apply_binary<T: Real>(op: BinaryOp, lhs: Value<T>, rhs: Value<T>) -> Result<Value<T>, Error> {
    let mismatch = || Error::ShapeMismatch {
        operation: op.name(),
        lhs: lhs.shape(),
        rhs: rhs.shape(),
    };
    match op {
        BinaryOp::Add | BinaryOp::Sub => {
            if lhs.shape() != rhs.shape() {
                return Err(mismatch());
            }
            let sign = if op == BinaryOp::Sub { -T::one() } else { T::one() };
            Ok(match (lhs, rhs) {
                (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(a + sign * b),
                (Value::Vector { data: a, dim }, Value::Vector { data: b, .. }) => Value::Vector {
                    data: a + b * sign,
                    dim,
                },
                (Value::Matrix { data: a, shape }, Value::Matrix { data: b, .. }) => {
                    Value::Matrix {
                        data: a + b * sign,
                        shape,
                    }
                }
                _ => unreachable!("shapes were checked above"),
            })
        }
        BinaryOp::Mul => match (lhs, rhs) {
            (Value::Scalar(a), other) => Ok(other.map(|v| a * v)),
            (other, Value::Scalar(b)) => Ok(other.map(|v| v * b)),
            _ => Err(mismatch()),
        },
        BinaryOp::Div => match rhs {
            Value::Scalar(b) => Ok(lhs.map(|v| v / b)),
            _ => Err(mismatch()),
        },
        BinaryOp::Inner => {
            if lhs.shape() != rhs.shape() {
                return Err(mismatch());
            }
            Ok(match (lhs, rhs) {
                (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(a * b),
                (Value::Vector { data: a, .. }, Value::Vector { data: b, .. }) => {
                    Value::Scalar(a.dot(&b))
                }
                (Value::Matrix { data: a, .. }, Value::Matrix { data: b, .. }) => {
                    Value::Scalar(a.dot(&b))
                }
                _ => unreachable!("shapes were checked above"),
            })
        }
    }
}

impl<T: Real> Add for Coefficient<T> {
    type Output = Coefficient<T>;

    fn add(self, rhs: Self) -> Self::Output {
        Coefficient::binary(BinaryOp::Add, self, rhs)
    }
}

impl<T: Real> Sub for Coefficient<T> {
    type Output = Coefficient<T>;

    fn sub(self, rhs: Self) -> Self::Output {
        Coefficient::binary(BinaryOp::Sub, self, rhs)
    }
}

impl<T: Real> Mul for Coefficient<T> {
    type Output = Coefficient<T>;

    fn mul(self, rhs: Self) -> Self::Output {
        Coefficient::binary(BinaryOp::Mul, self, rhs)
    }
}

impl<T: Real> Neg for Coefficient<T> {
    type Output = Coefficient<T>;

    fn neg(self) -> Self::Output {
        self.unary(UnaryOp::Neg)
    }
}
