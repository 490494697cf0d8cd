use crate::ast::*;
use crate::context::Context;
use crate::error::{EvaluatorError, ExprError};
use crate::location::SourceLocation;
use crate::value::Value;
use std::collections::BTreeMap;

/// Renders a parsed template against a context.
pub struct Evaluator {
    context: Context,
}

impl Evaluator {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub fn render(&self, template: &[Node]) -> Result<String, EvaluatorError> {
        let mut output = String::new();
        for node in template {
            match node {
                Node::Plain(s) => output.push_str(s),
                Node::Expression { expr, location } => {
                    let val = self.eval(expr, location)?;
                    output.push_str(&val.to_string());
                }
                Node::For {
                    variable,
                    iterable,
                    body,
                    location,
                } => {
                    // Anything that is not an array is a loop with no iterations.
                    if let Value::Array(items) = self.eval(iterable, location)? {
                        for item in items {
                            let scope = Evaluator::new(self.context.child(variable.as_str(), item));
                            output.push_str(&scope.render(body)?);
                        }
                    }
                }
                Node::If {
                    condition,
                    body,
                    else_ifs,
                    else_body,
                    location,
                } => {
                    if let Some(branch) = self.select_branch(condition, body, else_ifs, location)? {
                        output.push_str(&self.render(branch)?);
                    } else if let Some(body) = else_body {
                        output.push_str(&self.render(body)?);
                    }
                }
            }
        }
        Ok(output)
    }

    fn select_branch<'n>(
        &self,
        condition: &Expression,
        body: &'n [Node],
        else_ifs: &'n [ElseIf],
        location: &SourceLocation,
    ) -> Result<Option<&'n [Node]>, EvaluatorError> {
        if self.eval(condition, location)?.is_truthy() {
            return Ok(Some(body));
        }
        for branch in else_ifs {
            if self.eval(&branch.condition, &branch.location)?.is_truthy() {
                return Ok(Some(&branch.body));
            }
        }
        Ok(None)
    }

    fn eval(&self, expr: &Expression, location: &SourceLocation) -> Result<Value, EvaluatorError> {
        evaluate_expression(expr, &self.context).map_err(|fault| EvaluatorError::new(fault, location))
    }
}

/// Render `nodes` against `context`.
pub fn evaluate(nodes: &[Node], context: &Context) -> Result<String, EvaluatorError> {
    Evaluator::new(context.clone()).render(nodes)
}

/// Evaluate a compiled expression; compile faults are reported here.
pub fn evaluate_expression(expr: &Expression, context: &Context) -> Result<Value, ExprError> {
    match expr.expr() {
        Ok(e) => eval_expr(e, context),
        Err(fault) => Err(fault.clone()),
    }
}

fn eval_expr(expr: &Expr, ctx: &Context) -> Result<Value, ExprError> {
    match expr {
        Expr::NullLit => Ok(Value::Null),
        Expr::BoolLit(b) => Ok(Value::Bool(*b)),
        Expr::NumberLit(n) => Ok(Value::Number(*n)),
        Expr::StringLit(s) => Ok(Value::String(s.clone())),
        Expr::ArrayLit(items) => items
            .iter()
            .map(|e| eval_expr(e, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::ObjectLit(entries) => {
            let mut map = BTreeMap::new();
            for (key, e) in entries {
                map.insert(key.clone(), eval_expr(e, ctx)?);
            }
            Ok(Value::Map(map))
        }
        Expr::Var(name) => ctx
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::Reference(name.clone())),
        Expr::Attribute(obj, attr) => {
            let val = eval_expr(obj, ctx)?;
            member(&val, attr)
        }
        Expr::Index(obj, idx) => {
            let val = eval_expr(obj, ctx)?;
            let idx_val = eval_expr(idx, ctx)?;
            index(&val, &idx_val)
        }
        Expr::Call(callee, args) => call(callee, args, ctx),
        Expr::Unary(op, operand) => {
            let v = eval_expr(operand, ctx)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!v.is_truthy()),
                UnaryOp::Neg => Value::Number(-numeric(&v)),
                UnaryOp::Plus => Value::Number(numeric(&v)),
            })
        }
        Expr::BinOp(lhs, op, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            // Short-circuit: the deciding operand is the result.
            match op {
                BinOp::And if !l.is_truthy() => return Ok(l),
                BinOp::Or if l.is_truthy() => return Ok(l),
                BinOp::And | BinOp::Or => return eval_expr(rhs, ctx),
                _ => {}
            }
            let r = eval_expr(rhs, ctx)?;
            Ok(binary(*op, l, r))
        }
        Expr::Ternary(cond, then, otherwise) => {
            if eval_expr(cond, ctx)?.is_truthy() {
                eval_expr(then, ctx)
            } else {
                eval_expr(otherwise, ctx)
            }
        }
    }
}

fn member(val: &Value, attr: &str) -> Result<Value, ExprError> {
    match val {
        Value::Map(m) => Ok(m.get(attr).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if attr == "length" => Ok(Value::from(items.len())),
        Value::String(s) if attr == "length" => Ok(Value::from(s.chars().count())),
        Value::Null => Err(ExprError::Type(format!(
            "cannot read property '{}' of null",
            attr
        ))),
        _ => Ok(Value::Null),
    }
}

fn index(val: &Value, idx: &Value) -> Result<Value, ExprError> {
    match (val, idx) {
        (Value::Array(items), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::String(s), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        _ => member(val, &idx.to_string()),
    }
}

fn position(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 {
        Some(n as usize)
    } else {
        None
    }
}

fn call(callee: &Expr, args: &[Expr], ctx: &Context) -> Result<Value, ExprError> {
    let eval_args = || {
        args.iter()
            .map(|e| eval_expr(e, ctx))
            .collect::<Result<Vec<_>, _>>()
    };

    // `obj.method(...)`: a function stored on a map, else a built-in method.
    if let Expr::Attribute(obj, name) = callee {
        let receiver = eval_expr(obj, ctx)?;
        let args = eval_args()?;
        if let Value::Function(f) = member(&receiver, name)? {
            return invoke(&f, &args);
        }
        return match builtin_method(&receiver, name, &args) {
            Some(result) => result,
            None => Err(not_a_function(callee)),
        };
    }

    match eval_expr(callee, ctx)? {
        Value::Function(f) => invoke(&f, &eval_args()?),
        _ => Err(not_a_function(callee)),
    }
}

fn invoke(f: &crate::value::Function, args: &[Value]) -> Result<Value, ExprError> {
    f.call(args).map_err(|message| ExprError::Function {
        name: f.name().to_string(),
        message,
    })
}

fn not_a_function(callee: &Expr) -> ExprError {
    ExprError::Type(format!("{} is not a function", describe(callee)))
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Var(name) => name.clone(),
        Expr::Attribute(obj, attr) => format!("{}.{}", describe(obj), attr),
        Expr::Index(obj, _) => format!("{}[...]", describe(obj)),
        Expr::Call(callee, _) => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

/// Pure methods available on strings and arrays without any host help.
fn builtin_method(receiver: &Value, name: &str, args: &[Value]) -> Option<Result<Value, ExprError>> {
    let arg_str = |i: usize| args.get(i).map(|v| v.to_string()).unwrap_or_default();
    let value = match (receiver, name) {
        (Value::String(s), "toUpperCase") => Value::String(s.to_uppercase()),
        (Value::String(s), "toLowerCase") => Value::String(s.to_lowercase()),
        (Value::String(s), "trim") => Value::String(s.trim().to_string()),
        (Value::String(s), "includes") => Value::Bool(s.contains(arg_str(0).as_str())),
        (Value::String(s), "startsWith") => Value::Bool(s.starts_with(arg_str(0).as_str())),
        (Value::String(s), "endsWith") => Value::Bool(s.ends_with(arg_str(0).as_str())),
        (Value::Array(items), "join") => {
            let sep = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(v) => v.to_string(),
            };
            Value::String(
                items
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        (Value::Array(items), "includes") => {
            let needle = args.first().cloned().unwrap_or(Value::Null);
            Value::Bool(items.iter().any(|item| strict_eq(item, &needle)))
        }
        _ => return None,
    };
    Some(Ok(value))
}

fn numeric(v: &Value) -> f64 {
    match v {
        Value::Null => 0.0,
        _ => v.to_number().unwrap_or(f64::NAN),
    }
}

fn binary(op: BinOp, l: Value, r: Value) -> Value {
    match op {
        BinOp::Add => match (&l, &r) {
            (
                Value::Number(_) | Value::Bool(_) | Value::Null,
                Value::Number(_) | Value::Bool(_) | Value::Null,
            ) => Value::Number(numeric(&l) + numeric(&r)),
            _ => Value::String(format!("{}{}", l, r)),
        },
        BinOp::Sub => Value::Number(numeric(&l) - numeric(&r)),
        BinOp::Mul => Value::Number(numeric(&l) * numeric(&r)),
        BinOp::Div => Value::Number(numeric(&l) / numeric(&r)),
        BinOp::Rem => Value::Number(numeric(&l) % numeric(&r)),
        BinOp::StrictEq => Value::Bool(strict_eq(&l, &r)),
        BinOp::StrictNotEq => Value::Bool(!strict_eq(&l, &r)),
        BinOp::Eq => Value::Bool(loose_eq(&l, &r)),
        BinOp::NotEq => Value::Bool(!loose_eq(&l, &r)),
        BinOp::Lt => Value::Bool(compare(&l, &r).map_or(false, |o| o.is_lt())),
        BinOp::Le => Value::Bool(compare(&l, &r).map_or(false, |o| o.is_le())),
        BinOp::Gt => Value::Bool(compare(&l, &r).map_or(false, |o| o.is_gt())),
        BinOp::Ge => Value::Bool(compare(&l, &r).map_or(false, |o| o.is_ge())),
        BinOp::And => {
            if l.is_truthy() {
                r
            } else {
                l
            }
        }
        BinOp::Or => {
            if l.is_truthy() {
                l
            } else {
                r
            }
        }
    }
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    l == r
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_) | Value::Bool(_), Value::String(_) | Value::Bool(_) | Value::Number(_))
        | (Value::String(_), Value::Number(_) | Value::Bool(_)) => {
            match (l.to_number(), r.to_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => strict_eq(l, r),
    }
}

fn compare(l: &Value, r: &Value) -> Option<std::cmp::Ordering> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => numeric(l).partial_cmp(&numeric(r)),
    }
}
