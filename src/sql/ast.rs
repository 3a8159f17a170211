//! Internal AST types
//!
//! Covers the MySQL subset the engine executes: single-table DML, table and
//! database DDL, account management, SET and SHOW.

use std::fmt;

use crate::catalog::{DataType, Privilege};

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // String
    Like,
    NotLike,
}

impl BinaryOp {
    fn as_sql(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Scope of a system variable reference or assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    Global,
    Session,
    /// Unqualified: session value, falling back to the global one
    Default,
}

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference (optionally qualified with table name)
    Column { table: Option<String>, name: String },
    Literal(Literal),
    /// `@@[scope.]name`
    SystemVariable { scope: VariableScope, name: String },
    /// `@name`
    UserVariable(String),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    UnaryOp { op: UnaryOp, expr: Box<Expr> },
    /// Function call; name is upper-cased
    Function { name: String, args: Vec<Expr> },
    /// COUNT(*)
    CountStar,
    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// IN (list)
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// BETWEEN low AND high
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// True if the expression contains an aggregate
    pub fn is_aggregate(&self) -> bool {
        match self {
            Expr::CountStar => true,
            Expr::Function { name, .. } => name == "COUNT",
            _ => false,
        }
    }
}

/// Renders the expression the way MySQL names an unaliased result column
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column { table: Some(t), name } => write!(f, "{}.{}", t, name),
            Expr::Column { table: None, name } => write!(f, "{}", name),
            Expr::Literal(Literal::Null) => write!(f, "NULL"),
            Expr::Literal(Literal::Boolean(b)) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Expr::Literal(Literal::Integer(i)) => write!(f, "{}", i),
            Expr::Literal(Literal::Float(v)) => write!(f, "{}", v),
            Expr::Literal(Literal::String(s)) => write!(f, "{}", s),
            Expr::SystemVariable { scope, name } => match scope {
                VariableScope::Global => write!(f, "@@GLOBAL.{}", name),
                VariableScope::Session => write!(f, "@@SESSION.{}", name),
                VariableScope::Default => write!(f, "@@{}", name),
            },
            Expr::UserVariable(name) => write!(f, "@{}", name),
            Expr::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op.as_sql(), right),
            Expr::UnaryOp {
                op: UnaryOp::Not,
                expr,
            } => write!(f, "NOT {}", expr),
            Expr::UnaryOp {
                op: UnaryOp::Neg,
                expr,
            } => write!(f, "-{}", expr),
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::CountStar => write!(f, "COUNT(*)"),
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "{} {}IN (", expr, if *negated { "NOT " } else { "" })?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                expr,
                if *negated { "NOT " } else { "" },
                low,
                high
            ),
        }
    }
}

/// Possibly database-qualified table name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub database: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        TableName {
            database: None,
            name: name.into(),
        }
    }
}

/// SELECT item (column in SELECT list)
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// Expression with optional alias
    Expr { expr: Expr, alias: Option<String> },
    /// Wildcard (*)
    Wildcard,
}

/// ORDER BY item
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub columns: Vec<SelectItem>,
    pub from: Option<TableName>,
    pub filter: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Column definition as written in CREATE TABLE
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    /// `Some(false)` for NOT NULL, `Some(true)` for explicit NULL
    pub nullable: Option<bool>,
    pub default: Option<Expr>,
    pub auto_increment: bool,
    pub primary_key: bool,
    pub unique: bool,
}

/// Table-level constraint in CREATE TABLE
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    PrimaryKey(Vec<String>),
    Unique {
        name: Option<String>,
        columns: Vec<String>,
    },
}

/// `'name'@'host'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub name: String,
    pub host: String,
}

impl fmt::Display for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'@'{}'", self.name, self.host)
    }
}

/// Object of a GRANT; `None` database means the current one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantObject {
    /// `*.*`
    Global,
    /// `db.*` or `*`
    Database(Option<String>),
    /// `db.table` or `table`
    Table {
        database: Option<String>,
        table: String,
    },
}

/// One `[GLOBAL|SESSION] name = value` or `@name = value`
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    System {
        scope: VariableScope,
        name: String,
        value: Expr,
    },
    User { name: String, value: Expr },
}

/// Parsed SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert {
        table: TableName,
        columns: Vec<String>,
        rows: Vec<Vec<Expr>>,
    },
    Update {
        table: TableName,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        table: TableName,
        filter: Option<Expr>,
    },
    CreateDatabase {
        name: String,
        if_not_exists: bool,
    },
    DropDatabase {
        name: String,
        if_exists: bool,
    },
    Use(String),
    CreateTable {
        table: TableName,
        columns: Vec<ColumnSpec>,
        constraints: Vec<TableConstraint>,
        if_not_exists: bool,
    },
    DropTable {
        tables: Vec<TableName>,
        if_exists: bool,
    },
    Truncate(TableName),
    ShowTables,
    ShowDatabases,
    Set(Vec<Assignment>),
    /// SET NAMES charset [COLLATE collation]
    SetNames {
        charset: String,
        collation: Option<String>,
    },
    CreateUser {
        user: UserSpec,
        password: String,
        if_not_exists: bool,
    },
    DropUser {
        user: UserSpec,
        if_exists: bool,
    },
    Grant {
        privileges: Vec<Privilege>,
        object: GrantObject,
        users: Vec<UserSpec>,
    },
}
