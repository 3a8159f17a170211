//! Expression evaluation

use std::cmp::Ordering;

use super::datum::Datum;
use super::engine::Engine;
use super::error::{codes, states, EngineError, EngineResult};
use super::session::Session;
use crate::catalog::TableDef;
use crate::sql::{BinaryOp, Expr, UnaryOp};

/// The row an expression is evaluated against
pub struct RowContext<'a> {
    pub table: &'a TableDef,
    /// Values with TIMESTAMP columns already in session time
    pub values: &'a [Datum],
}

/// Evaluates expressions for one statement
pub struct Evaluator<'a> {
    pub engine: &'a Engine,
    pub session: &'a Session,
    /// Clause name used in "Unknown column" errors
    pub clause: &'static str,
}

impl<'a> Evaluator<'a> {
    pub fn new(engine: &'a Engine, session: &'a Session, clause: &'static str) -> Self {
        Evaluator {
            engine,
            session,
            clause,
        }
    }

    pub fn eval(&self, expr: &Expr, row: Option<&RowContext<'_>>) -> EngineResult<Datum> {
        match expr {
            Expr::Literal(lit) => Ok(Datum::from_literal(lit)),

            Expr::Column { table, name } => self.column(table.as_deref(), name, row),

            Expr::SystemVariable { scope, name } => {
                self.engine.system_variable(self.session, *scope, name)
            }

            Expr::UserVariable(name) => Ok(self
                .session
                .user_variables
                .get(&name.to_lowercase())
                .cloned()
                .unwrap_or(Datum::Null)),

            Expr::BinaryOp { left, op, right } => {
                let l = self.eval(left, row)?;
                // Short-circuit on a decided AND/OR
                match (op, l.truthy()) {
                    (BinaryOp::And, Some(false)) => return Ok(Datum::Int(0)),
                    (BinaryOp::Or, Some(true)) => return Ok(Datum::Int(1)),
                    _ => {}
                }
                let r = self.eval(right, row)?;
                binary_op(*op, &l, &r)
            }

            Expr::UnaryOp { op, expr } => {
                let v = self.eval(expr, row)?;
                Ok(match op {
                    UnaryOp::Not => Datum::from_bool(v.truthy().map(|b| !b)),
                    UnaryOp::Neg => match v {
                        Datum::Null => Datum::Null,
                        Datum::Int(i) => match i.checked_neg() {
                            Some(n) => Datum::Int(n),
                            None => return Err(EngineError::out_of_range(&format!("-({})", i))),
                        },
                        other => other.as_f64().map(|f| Datum::Double(-f)).unwrap_or(Datum::Null),
                    },
                })
            }

            Expr::IsNull { expr, negated } => {
                let v = self.eval(expr, row)?;
                Ok(Datum::Int(i64::from(v.is_null() != *negated)))
            }

            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let v = self.eval(expr, row)?;
                if v.is_null() {
                    return Ok(Datum::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let candidate = self.eval(item, row)?;
                    match v.sql_cmp(&candidate) {
                        Some(Ordering::Equal) => return Ok(Datum::Int(i64::from(!*negated))),
                        None => saw_null = true,
                        _ => {}
                    }
                }
                if saw_null {
                    Ok(Datum::Null)
                } else {
                    Ok(Datum::Int(i64::from(*negated)))
                }
            }

            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let v = self.eval(expr, row)?;
                let low = self.eval(low, row)?;
                let high = self.eval(high, row)?;
                let inside = match (v.sql_cmp(&low), v.sql_cmp(&high)) {
                    (Some(a), Some(b)) => Some(a != Ordering::Less && b != Ordering::Greater),
                    _ => None,
                };
                Ok(Datum::from_bool(inside.map(|b| b != *negated)))
            }

            Expr::Function { name, args } => self.function(name, args, row),

            Expr::CountStar => Err(EngineError::new(
                codes::ER_UNKNOWN_ERROR,
                states::GENERAL_ERROR,
                "Invalid use of group function",
            )),
        }
    }

    /// Evaluate a predicate; NULL counts as false
    pub fn matches(&self, expr: &Expr, row: &RowContext<'_>) -> EngineResult<bool> {
        Ok(self.eval(expr, Some(row))?.truthy().unwrap_or(false))
    }

    fn column(
        &self,
        table: Option<&str>,
        name: &str,
        row: Option<&RowContext<'_>>,
    ) -> EngineResult<Datum> {
        let qualified = || match table {
            Some(t) => format!("{}.{}", t, name),
            None => name.to_string(),
        };
        let row = row.ok_or_else(|| EngineError::unknown_column(&qualified(), self.clause))?;
        if table.is_some_and(|t| t != row.table.name) {
            return Err(EngineError::unknown_column(&qualified(), self.clause));
        }
        let idx = row
            .table
            .column_index(name)
            .ok_or_else(|| EngineError::unknown_column(&qualified(), self.clause))?;
        Ok(row.values.get(idx).cloned().unwrap_or(Datum::Null))
    }

    fn function(
        &self,
        name: &str,
        args: &[Expr],
        row: Option<&RowContext<'_>>,
    ) -> EngineResult<Datum> {
        let values = args
            .iter()
            .map(|a| self.eval(a, row))
            .collect::<EngineResult<Vec<_>>>()?;

        let arity = |n: usize| {
            if values.len() == n {
                Ok(())
            } else {
                Err(EngineError::new(
                    1582,
                    states::SYNTAX_ERROR,
                    format!("Incorrect parameter count in the call to native function '{}'", name),
                ))
            }
        };

        match name {
            "NOW" | "CURRENT_TIMESTAMP" | "LOCALTIMESTAMP" | "SYSDATE" => {
                Ok(Datum::DateTime(self.session.time_zone.now()))
            }
            "UTC_TIMESTAMP" => Ok(Datum::DateTime(chrono::Utc::now().naive_utc())),
            "CURDATE" => {
                let now = self.session.time_zone.now();
                Ok(Datum::DateTime(now.date().and_time(chrono::NaiveTime::MIN)))
            }
            "DATABASE" | "SCHEMA" => {
                arity(0)?;
                Ok(self
                    .session
                    .database
                    .clone()
                    .map(Datum::String)
                    .unwrap_or(Datum::Null))
            }
            "USER" | "SESSION_USER" | "SYSTEM_USER" => Ok(Datum::String(format!(
                "{}@{}",
                self.session.user, self.session.host
            ))),
            "CURRENT_USER" => Ok(Datum::String(format!(
                "{}@{}",
                self.session.user, self.session.account_host
            ))),
            "VERSION" => {
                arity(0)?;
                Ok(Datum::String(self.engine.server_version().to_string()))
            }
            "CONNECTION_ID" => {
                arity(0)?;
                Ok(Datum::Int(i64::from(self.session.connection_id)))
            }
            "LAST_INSERT_ID" => {
                arity(0)?;
                Ok(Datum::Int(self.session.last_insert_id as i64))
            }
            "UPPER" | "UCASE" => {
                arity(1)?;
                Ok(map_string(&values[0], |s| s.to_uppercase()))
            }
            "LOWER" | "LCASE" => {
                arity(1)?;
                Ok(map_string(&values[0], |s| s.to_lowercase()))
            }
            "LENGTH" | "CHAR_LENGTH" => {
                arity(1)?;
                Ok(match values[0].to_text(None) {
                    Some(s) if name == "LENGTH" => Datum::Int(s.len() as i64),
                    Some(s) => Datum::Int(s.chars().count() as i64),
                    None => Datum::Null,
                })
            }
            "CONCAT" => {
                let mut out = String::new();
                for v in &values {
                    match v.to_text(None) {
                        Some(s) => out.push_str(&s),
                        None => return Ok(Datum::Null),
                    }
                }
                Ok(Datum::String(out))
            }
            "COALESCE" => Ok(values
                .into_iter()
                .find(|v| !v.is_null())
                .unwrap_or(Datum::Null)),
            "IFNULL" => {
                arity(2)?;
                let mut values = values;
                let fallback = values.pop().unwrap_or_default();
                let first = values.pop().unwrap_or_default();
                Ok(if first.is_null() { fallback } else { first })
            }
            "COUNT" => Err(EngineError::new(
                codes::ER_UNKNOWN_ERROR,
                states::GENERAL_ERROR,
                "Invalid use of group function",
            )),
            _ => Err(EngineError::new(
                1305,
                states::SYNTAX_ERROR,
                format!("FUNCTION {} does not exist", name),
            )),
        }
    }
}

fn map_string(v: &Datum, f: impl FnOnce(&str) -> String) -> Datum {
    match v.to_text(None) {
        Some(s) => Datum::String(f(&s)),
        None => Datum::Null,
    }
}

fn binary_op(op: BinaryOp, l: &Datum, r: &Datum) -> EngineResult<Datum> {
    let cmp = |pred: fn(Ordering) -> bool| Datum::from_bool(l.sql_cmp(r).map(pred));

    Ok(match op {
        BinaryOp::Eq => cmp(|o| o == Ordering::Equal),
        BinaryOp::NotEq => cmp(|o| o != Ordering::Equal),
        BinaryOp::Lt => cmp(|o| o == Ordering::Less),
        BinaryOp::LtEq => cmp(|o| o != Ordering::Greater),
        BinaryOp::Gt => cmp(|o| o == Ordering::Greater),
        BinaryOp::GtEq => cmp(|o| o != Ordering::Less),
        BinaryOp::And => match (l.truthy(), r.truthy()) {
            (Some(false), _) | (_, Some(false)) => Datum::Int(0),
            (Some(true), Some(true)) => Datum::Int(1),
            _ => Datum::Null,
        },
        BinaryOp::Or => match (l.truthy(), r.truthy()) {
            (Some(true), _) | (_, Some(true)) => Datum::Int(1),
            (Some(false), Some(false)) => Datum::Int(0),
            _ => Datum::Null,
        },
        BinaryOp::Like => Datum::from_bool(l.like(r)),
        BinaryOp::NotLike => Datum::from_bool(l.like(r).map(|b| !b)),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, l, r)?
        }
    })
}

fn arithmetic(op: BinaryOp, l: &Datum, r: &Datum) -> EngineResult<Datum> {
    if l.is_null() || r.is_null() {
        return Ok(Datum::Null);
    }

    if let (Datum::Int(a), Datum::Int(b)) = (l, r) {
        let checked = match op {
            BinaryOp::Add => Some((a.checked_add(*b), "+")),
            BinaryOp::Sub => Some((a.checked_sub(*b), "-")),
            BinaryOp::Mul => Some((a.checked_mul(*b), "*")),
            BinaryOp::Mod if *b == 0 => return Ok(Datum::Null),
            // only i64::MIN % -1 overflows, and its remainder is 0
            BinaryOp::Mod => return Ok(Datum::Int(a.checked_rem(*b).unwrap_or(0))),
            // Division always produces a decimal result
            _ => None,
        };
        if let Some((result, symbol)) = checked {
            return result
                .map(Datum::Int)
                .ok_or_else(|| EngineError::out_of_range(&format!("({} {} {})", a, symbol, b)));
        }
    }

    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Ok(Datum::Null);
    };
    Ok(match op {
        BinaryOp::Add => Datum::Double(a + b),
        BinaryOp::Sub => Datum::Double(a - b),
        BinaryOp::Mul => Datum::Double(a * b),
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => Datum::Null,
        BinaryOp::Div => Datum::Double(a / b),
        BinaryOp::Mod => Datum::Double(a % b),
        _ => Datum::Null,
    })
}
