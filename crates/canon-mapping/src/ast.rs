//! Expression tree produced by the parser

use serde_json::Value;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Concat,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    /// Binding power; higher binds tighter
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual => 3,
            BinaryOp::Concat => 4,
            BinaryOp::Add | BinaryOp::Subtract => 5,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 6,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Concat => "&",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal JSON value
    Literal(Value),
    /// Field lookup on the current context
    Field(String),
    /// `$`: the current context value
    Context,
    /// `$$`: the input document
    Root,
    /// Path navigation: each step is evaluated against every result of the previous one
    Path(Vec<Expr>),
    /// `base[predicate]`: index or filter
    Filter {
        base: Box<Expr>,
        predicate: Box<Expr>,
    },
    /// Object constructor
    Object(Vec<(Expr, Expr)>),
    /// Array constructor
    Array(Vec<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Negate(Box<Expr>),
    /// `condition ? then : otherwise`
    Condition {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// `$name(args...)`
    Call { name: String, args: Vec<Expr> },
    /// `(a; b; c)`: evaluates each, yields the last
    Block(Vec<Expr>),
}

impl Expr {
    /// Names of every function the expression calls, in first-use order
    #[must_use]
    pub fn called_functions(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_calls(&mut names);
        names
    }

    fn collect_calls(&self, names: &mut Vec<String>) {
        match self {
            Expr::Literal(_) | Expr::Field(_) | Expr::Context | Expr::Root => {}
            Expr::Path(steps) | Expr::Array(steps) | Expr::Block(steps) => {
                for step in steps {
                    step.collect_calls(names);
                }
            }
            Expr::Filter { base, predicate } => {
                base.collect_calls(names);
                predicate.collect_calls(names);
            }
            Expr::Object(pairs) => {
                for (key, value) in pairs {
                    key.collect_calls(names);
                    value.collect_calls(names);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_calls(names);
                rhs.collect_calls(names);
            }
            Expr::Negate(inner) => inner.collect_calls(names),
            Expr::Condition {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_calls(names);
                then.collect_calls(names);
                if let Some(otherwise) = otherwise {
                    otherwise.collect_calls(names);
                }
            }
            Expr::Call { name, args } => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
                for arg in args {
                    arg.collect_calls(names);
                }
            }
        }
    }
}
