use serde_json::{Map, Value};
use std::time::{Duration, Instant};

use super::ast::{BinOp, Expr, UnOp};
use super::parser::parse;
use super::ExprError;
use crate::template::canonical_string;

/// Resolve a dotted path like `a.b.c` against a JSON value.
pub fn lookup_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = root;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Parse and evaluate `src` against `env` under a deadline.
pub fn evaluate(
    src: &str,
    env: &Map<String, Value>,
    timeout: Duration,
) -> Result<Value, ExprError> {
    let expr = parse(src)?;
    let evaluator = Evaluator::new(env, Instant::now() + timeout);
    evaluator.eval(&expr)
}

/// Tree-walking evaluator bound to one environment and one deadline.
///
/// The deadline is checked on entry to every node, so even a deeply nested
/// expression observes expiry within one node's work.
pub struct Evaluator<'a> {
    env: &'a Map<String, Value>,
    deadline: Instant,
}

impl<'a> Evaluator<'a> {
    /// New evaluator over `env` expiring at `deadline`.
    pub fn new(env: &'a Map<String, Value>, deadline: Instant) -> Self {
        Self { env, deadline }
    }

    /// Evaluate a parsed expression.
    pub fn eval(&self, expr: &Expr) -> Result<Value, ExprError> {
        if Instant::now() >= self.deadline {
            return Err(ExprError::Timeout);
        }
        match expr {
            Expr::Lit(v) => Ok(v.clone()),
            Expr::Ident(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::MissingKey(name.clone())),
            Expr::Unary(UnOp::Neg, operand) => match self.eval(operand)? {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(Value::from(-i))
                    } else {
                        Ok(Value::from(-n.as_f64().unwrap_or(0.0)))
                    }
                }
                other => Err(ExprError::Type(format!("cannot negate {}", type_name(&other)))),
            },
            Expr::Binary(op, lhs, rhs) => self.eval_binary(*op, lhs, rhs),
            Expr::Member(object, name) => {
                let value = self.eval(object)?;
                match value {
                    Value::Object(map) => map
                        .get(name)
                        .cloned()
                        .ok_or_else(|| ExprError::MissingKey(name.clone())),
                    other => Err(ExprError::Type(format!(
                        "member access '.{}' on {}",
                        name,
                        type_name(&other)
                    ))),
                }
            }
            Expr::Index(object, index) => {
                let value = self.eval(object)?;
                let index = self.eval(index)?;
                match (&value, &index) {
                    (Value::Object(map), Value::String(key)) => map
                        .get(key)
                        .cloned()
                        .ok_or_else(|| ExprError::MissingKey(key.clone())),
                    (Value::Array(items), Value::Number(n)) => {
                        let i = n
                            .as_u64()
                            .ok_or_else(|| ExprError::Type("negative index".to_string()))?;
                        items
                            .get(i as usize)
                            .cloned()
                            .ok_or_else(|| ExprError::MissingKey(format!("index {}", i)))
                    }
                    (v, i) => Err(ExprError::Type(format!(
                        "cannot index {} with {}",
                        type_name(v),
                        type_name(i)
                    ))),
                }
            }
            Expr::Call(callee, args) => self.eval_call(callee, args),
        }
    }

    fn eval_binary(&self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Value, ExprError> {
        // Logical operators short-circuit.
        if matches!(op, BinOp::And | BinOp::Or) {
            let left = as_bool(&self.eval(lhs)?)?;
            return match (op, left) {
                (BinOp::And, false) => Ok(Value::Bool(false)),
                (BinOp::Or, true) => Ok(Value::Bool(true)),
                _ => Ok(Value::Bool(as_bool(&self.eval(rhs)?)?)),
            };
        }

        let left = self.eval(lhs)?;
        let right = self.eval(rhs)?;
        match op {
            BinOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
            BinOp::Ne => Ok(Value::Bool(!loose_eq(&left, &right))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = compare(&left, &right)?;
                Ok(Value::Bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinOp::In => membership(&left, &right),
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
                arithmetic(op, &left, &right)
            }
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_call(&self, callee: &Expr, args: &[Expr]) -> Result<Value, ExprError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }

        match callee {
            Expr::Ident(name) => self.call_builtin(name, &values),
            // `json.path(...)` style helpers resolve against the
            // environment's `body`.
            Expr::Member(object, method) if matches!(**object, Expr::Ident(ref n) if n == "json") => {
                self.call_json_helper(method, &values)
            }
            _ => Err(ExprError::Type("expression is not callable".to_string())),
        }
    }

    fn call_builtin(&self, name: &str, args: &[Value]) -> Result<Value, ExprError> {
        match name {
            "len" => {
                let [v] = arity::<1>(name, args)?;
                match v {
                    Value::String(s) => Ok(Value::from(s.chars().count() as i64)),
                    Value::Array(items) => Ok(Value::from(items.len() as i64)),
                    Value::Object(map) => Ok(Value::from(map.len() as i64)),
                    other => Err(ExprError::Type(format!("len of {}", type_name(other)))),
                }
            }
            "contains" => {
                let [hay, needle] = arity::<2>(name, args)?;
                membership(needle, hay)
            }
            "has" => {
                let [path] = arity::<1>(name, args)?;
                let path = as_str(path)?;
                let root = Value::Object(self.env.clone());
                Ok(Value::Bool(lookup_path(&root, path).is_some()))
            }
            "string" => {
                let [v] = arity::<1>(name, args)?;
                Ok(Value::from(canonical_string(v)))
            }
            "int" => {
                let [v] = arity::<1>(name, args)?;
                match v {
                    Value::Number(n) => n
                        .as_i64()
                        .or_else(|| n.as_f64().map(|f| f as i64))
                        .map(Value::from)
                        .ok_or_else(|| ExprError::Type("int out of range".to_string())),
                    Value::String(s) => s
                        .trim()
                        .parse::<i64>()
                        .map(Value::from)
                        .map_err(|_| ExprError::Type(format!("int of {:?}", s))),
                    Value::Bool(b) => Ok(Value::from(*b as i64)),
                    other => Err(ExprError::Type(format!("int of {}", type_name(other)))),
                }
            }
            other => Err(ExprError::Type(format!("unknown function {:?}", other))),
        }
    }

    fn call_json_helper(&self, method: &str, args: &[Value]) -> Result<Value, ExprError> {
        let body = self.env.get("body").unwrap_or(&Value::Null);
        match method {
            "path" => {
                let [path] = arity::<1>("json.path", args)?;
                Ok(lookup_path(body, as_str(path)?).cloned().unwrap_or(Value::Null))
            }
            "has" => {
                let [path] = arity::<1>("json.has", args)?;
                Ok(Value::Bool(lookup_path(body, as_str(path)?).is_some()))
            }
            "string" => {
                let [path] = arity::<1>("json.string", args)?;
                Ok(match lookup_path(body, as_str(path)?) {
                    Some(v) => Value::from(canonical_string(v)),
                    None => Value::Null,
                })
            }
            "number" => {
                let [path] = arity::<1>("json.number", args)?;
                Ok(match lookup_path(body, as_str(path)?).and_then(Value::as_f64) {
                    Some(n) => Value::from(n),
                    None => Value::Null,
                })
            }
            other => Err(ExprError::Type(format!("unknown helper json.{}", other))),
        }
    }
}

fn arity<'v, const N: usize>(name: &str, args: &'v [Value]) -> Result<&'v [Value; N], ExprError> {
    args.try_into()
        .map_err(|_| ExprError::Type(format!("{} takes {} argument(s), got {}", name, N, args.len())))
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn as_bool(v: &Value) -> Result<bool, ExprError> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(ExprError::Type(format!(
            "expected bool, got {}",
            type_name(other)
        ))),
    }
}

fn as_str(v: &Value) -> Result<&str, ExprError> {
    match v {
        Value::String(s) => Ok(s),
        other => Err(ExprError::Type(format!(
            "expected string, got {}",
            type_name(other)
        ))),
    }
}

// Numeric equality is loose across int/float; everything else is strict.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, ExprError> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            let (x, y) = (
                a.as_f64().unwrap_or(f64::NAN),
                b.as_f64().unwrap_or(f64::NAN),
            );
            x.partial_cmp(&y)
                .ok_or_else(|| ExprError::Type("NaN comparison".to_string()))
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (x, y) => Err(ExprError::Type(format!(
            "cannot order {} and {}",
            type_name(x),
            type_name(y)
        ))),
    }
}

// `needle in hay`: key test on objects, element test on arrays, substring
// test on strings.
fn membership(needle: &Value, hay: &Value) -> Result<Value, ExprError> {
    match hay {
        Value::Object(map) => {
            let key = as_str(needle)?;
            Ok(Value::Bool(map.contains_key(key)))
        }
        Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| loose_eq(item, needle)))),
        Value::String(s) => {
            let sub = as_str(needle)?;
            Ok(Value::Bool(s.contains(sub)))
        }
        other => Err(ExprError::Type(format!(
            "'in' needs an object, array or string, got {}",
            type_name(other)
        ))),
    }
}

fn arithmetic(op: BinOp, a: &Value, b: &Value) -> Result<Value, ExprError> {
    // String concatenation rides on `+`.
    if let (BinOp::Add, Value::String(x), Value::String(y)) = (op, a, b) {
        return Ok(Value::from(format!("{}{}", x, y)));
    }

    let (x, y) = match (a, b) {
        (Value::Number(x), Value::Number(y)) => (x, y),
        (x, y) => {
            return Err(ExprError::Type(format!(
                "arithmetic on {} and {}",
                type_name(x),
                type_name(y)
            )))
        }
    };

    if let (Some(i), Some(j)) = (x.as_i64(), y.as_i64()) {
        let result = match op {
            BinOp::Add => i.checked_add(j),
            BinOp::Sub => i.checked_sub(j),
            BinOp::Mul => i.checked_mul(j),
            BinOp::Div => i.checked_div(j),
            BinOp::Rem => i.checked_rem(j),
            _ => unreachable!(),
        };
        return result
            .map(Value::from)
            .ok_or_else(|| ExprError::Type("integer overflow or division by zero".to_string()));
    }

    let (f, g) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
    let result = match op {
        BinOp::Add => f + g,
        BinOp::Sub => f - g,
        BinOp::Mul => f * g,
        BinOp::Div => f / g,
        BinOp::Rem => f % g,
        _ => unreachable!(),
    };
    if result.is_finite() {
        Ok(Value::from(result))
    } else {
        Err(ExprError::Type("non-finite arithmetic result".to_string()))
    }
}
