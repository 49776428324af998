//! Aggregation expression evaluation.
//!
//! `Ok(None)` means the expression resolved to a missing value, which is
//! distinct from an explicit `null`: missing fields are dropped from
//! projected documents while nulls are kept.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

use super::ordering::{as_f64, as_i64, compare_missing, get_path, get_value_path};
use crate::error::{Error, Result};

/// Evaluation context: the current document plus `$let`-bound variables.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    root: &'a Document,
    vars: Vec<(String, Bson)>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Document) -> Self {
        Self {
            root,
            vars: Vec::new(),
        }
    }

    fn with_vars(&self, bound: Vec<(String, Bson)>) -> Self {
        let mut vars = self.vars.clone();
        vars.extend(bound);
        Self {
            root: self.root,
            vars,
        }
    }

    fn variable(&self, reference: &str) -> Result<Option<Bson>> {
        let (name, path) = reference.split_once('.').unwrap_or((reference, ""));
        let base = match name {
            "ROOT" | "CURRENT" => Bson::Document(self.root.clone()),
            _ => self
                .vars
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Error::Evaluation(format!("undefined variable: $${}", name)))?,
        };
        Ok(get_value_path(&base, path).cloned())
    }
}

fn eval_error(message: impl Into<String>) -> Error {
    Error::Evaluation(message.into())
}

/// Operator arguments: an array is spread, anything else is one argument.
fn arguments(operand: &Bson) -> Vec<&Bson> {
    match operand {
        Bson::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn exact_args<'b>(op: &str, operand: &'b Bson, count: usize) -> Result<Vec<&'b Bson>> {
    let args = arguments(operand);
    if args.len() != count {
        return Err(eval_error(format!(
            "{} takes {} arguments, got {}",
            op,
            count,
            args.len()
        )));
    }
    Ok(args)
}

fn is_nullish(value: &Option<Bson>) -> bool {
    matches!(value, None | Some(Bson::Null) | Some(Bson::Undefined))
}

fn truthy(value: &Option<Bson>) -> bool {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => false,
        Some(Bson::Boolean(b)) => *b,
        Some(v) => as_f64(v).map(|n| n != 0.0).unwrap_or(true),
    }
}

/// Narrow to Int32 when the value fits.
pub fn integer(n: i64) -> Bson {
    i32::try_from(n).map(Bson::Int32).unwrap_or(Bson::Int64(n))
}

/// Round half to even at `places` decimal digits.
pub fn round_half_even(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(places);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round_ties_even() / factor
}

pub fn evaluate(expr: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    match expr {
        Bson::String(s) if s.starts_with("$$") => scope.variable(&s[2..]),
        Bson::String(s) if s.starts_with('$') => Ok(get_path(scope.root, &s[1..]).cloned()),
        Bson::Document(d) => {
            let mut entries = d.iter();
            match (entries.next(), entries.next()) {
                (Some((op, operand)), None) if op.starts_with('$') => {
                    evaluate_operator(op, operand, scope)
                }
                _ => evaluate_object(d, scope).map(|o| Some(Bson::Document(o))),
            }
        }
        Bson::Array(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, scope).map(|v| v.unwrap_or(Bson::Null)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(Bson::Array(values)))
        }
        literal => Ok(Some(literal.clone())),
    }
}

/// Evaluate each field of an expression object; missing values are left out.
pub fn evaluate_object(object: &Document, scope: &Scope<'_>) -> Result<Document> {
    let mut out = Document::new();
    for (key, expr) in object {
        if let Some(value) = evaluate(expr, scope)? {
            out.insert(key.clone(), value);
        }
    }
    Ok(out)
}

fn evaluate_operator(op: &str, operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    match op {
        "$round" => round(operand, scope),
        "$multiply" => multiply(operand, scope),
        "$divide" => divide(operand, scope),
        "$gt" => greater_than(operand, scope),
        "$switch" => switch(operand, scope),
        "$let" => let_in(operand, scope),
        "$arrayElemAt" => array_elem_at(operand, scope),
        "$toInt" => to_int(operand, scope),
        "$substr" => substr(operand, scope),
        other => Err(eval_error(format!("unsupported expression operator: {}", other))),
    }
}

fn round(operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    let args = arguments(operand);
    let (value, places) = match args.as_slice() {
        [value] => (evaluate(value, scope)?, 0),
        [value, places] => {
            let places = evaluate(places, scope)?
                .as_ref()
                .and_then(as_i64)
                .ok_or_else(|| eval_error("$round place must be an integer"))?;
            (evaluate(value, scope)?, places)
        }
        _ => return Err(eval_error("$round takes 1 or 2 arguments")),
    };

    if is_nullish(&value) {
        return Ok(Some(Bson::Null));
    }
    let places = i32::try_from(places)
        .ok()
        .filter(|p| (-20..=100).contains(p))
        .ok_or_else(|| eval_error("$round place out of range"))?;

    match value {
        Some(Bson::Double(n)) => Ok(Some(Bson::Double(round_half_even(n, places)))),
        Some(v @ (Bson::Int32(_) | Bson::Int64(_))) if places >= 0 => Ok(Some(v)),
        Some(v @ (Bson::Int32(_) | Bson::Int64(_))) => {
            let n = as_f64(&v).unwrap_or_default();
            Ok(Some(integer(round_half_even(n, places) as i64)))
        }
        _ => Err(eval_error("$round only supports numeric types")),
    }
}

fn multiply(operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    let mut int_product: Option<i64> = Some(1);
    let mut float_product = 1.0;

    for arg in arguments(operand) {
        let value = evaluate(arg, scope)?;
        if is_nullish(&value) {
            return Ok(Some(Bson::Null));
        }
        let value = value.unwrap_or(Bson::Null);
        let n = as_f64(&value).ok_or_else(|| eval_error("$multiply only supports numeric types"))?;
        float_product *= n;
        int_product = match (int_product, as_i64(&value)) {
            (Some(acc), Some(i)) => acc.checked_mul(i),
            _ => None,
        };
    }

    Ok(Some(match int_product {
        Some(n) => integer(n),
        None => Bson::Double(float_product),
    }))
}

fn divide(operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    let args = exact_args("$divide", operand, 2)?;
    let dividend = evaluate(args[0], scope)?;
    let divisor = evaluate(args[1], scope)?;
    if is_nullish(&dividend) || is_nullish(&divisor) {
        return Ok(Some(Bson::Null));
    }

    let numbers = dividend
        .as_ref()
        .and_then(as_f64)
        .zip(divisor.as_ref().and_then(as_f64));
    match numbers {
        Some((_, d)) if d == 0.0 => Err(eval_error("can't $divide by zero")),
        Some((n, d)) => Ok(Some(Bson::Double(n / d))),
        None => Err(eval_error("$divide only supports numeric types")),
    }
}

fn greater_than(operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    let args = exact_args("$gt", operand, 2)?;
    let left = evaluate(args[0], scope)?;
    let right = evaluate(args[1], scope)?;
    let ord = compare_missing(left.as_ref(), right.as_ref());
    Ok(Some(Bson::Boolean(ord == Ordering::Greater)))
}

fn switch(operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    let spec = operand
        .as_document()
        .ok_or_else(|| eval_error("$switch needs a document"))?;
    let branches = spec
        .get_array("branches")
        .map_err(|_| eval_error("$switch needs a branches array"))?;

    for branch in branches {
        let branch = branch
            .as_document()
            .ok_or_else(|| eval_error("$switch branch must be a document"))?;
        let case = branch
            .get("case")
            .ok_or_else(|| eval_error("$switch branch needs a case"))?;
        if truthy(&evaluate(case, scope)?) {
            let then = branch
                .get("then")
                .ok_or_else(|| eval_error("$switch branch needs a then"))?;
            return evaluate(then, scope);
        }
    }

    match spec.get("default") {
        Some(default) => evaluate(default, scope),
        None => Err(eval_error("$switch found no matching branch and has no default")),
    }
}

fn let_in(operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    let spec = operand
        .as_document()
        .ok_or_else(|| eval_error("$let needs a document"))?;
    let vars = spec
        .get_document("vars")
        .map_err(|_| eval_error("$let needs a vars document"))?;
    let body = spec
        .get("in")
        .ok_or_else(|| eval_error("$let needs an in expression"))?;

    let mut bound = Vec::with_capacity(vars.len());
    for (name, expr) in vars {
        let value = evaluate(expr, scope)?.unwrap_or(Bson::Null);
        bound.push((name.clone(), value));
    }
    evaluate(body, &scope.with_vars(bound))
}

fn array_elem_at(operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    let args = exact_args("$arrayElemAt", operand, 2)?;
    let array = evaluate(args[0], scope)?;
    let index = evaluate(args[1], scope)?;
    if is_nullish(&array) || is_nullish(&index) {
        return Ok(Some(Bson::Null));
    }

    let items = match &array {
        Some(Bson::Array(items)) => items,
        _ => return Err(eval_error("$arrayElemAt's first argument must be an array")),
    };
    let index = match index.unwrap_or(Bson::Null) {
        Bson::Double(f) if f.fract() == 0.0 => f as i64,
        other => as_i64(&other)
            .ok_or_else(|| eval_error("$arrayElemAt's index must be an integer"))?,
    };

    let position = if index < 0 {
        items.len() as i64 + index
    } else {
        index
    };
    Ok(usize::try_from(position)
        .ok()
        .and_then(|p| items.get(p))
        .cloned())
}

fn to_int(operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    let args = exact_args("$toInt", operand, 1)?;
    let value = evaluate(args[0], scope)?;

    let converted = match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => Bson::Null,
        Some(Bson::Int32(n)) => Bson::Int32(n),
        Some(Bson::Int64(n)) => i32::try_from(n)
            .map(Bson::Int32)
            .map_err(|_| eval_error(format!("$toInt: {} overflows int", n)))?,
        Some(Bson::Double(f)) => {
            let t = f.trunc();
            if !t.is_finite() || t < i32::MIN as f64 || t > i32::MAX as f64 {
                return Err(eval_error(format!("$toInt: {} overflows int", f)));
            }
            Bson::Int32(t as i32)
        }
        Some(Bson::Boolean(b)) => Bson::Int32(b as i32),
        Some(Bson::String(s)) => s
            .parse::<i32>()
            .map(Bson::Int32)
            .map_err(|_| eval_error(format!("$toInt: failed to parse \"{}\"", s)))?,
        Some(other) => {
            return Err(eval_error(format!(
                "$toInt: unsupported conversion from {:?}",
                other.element_type()
            )))
        }
    };
    Ok(Some(converted))
}

fn substr(operand: &Bson, scope: &Scope<'_>) -> Result<Option<Bson>> {
    let args = exact_args("$substr", operand, 3)?;
    let text = match evaluate(args[0], scope)? {
        None | Some(Bson::Null) | Some(Bson::Undefined) => String::new(),
        Some(Bson::String(s)) => s,
        Some(Bson::Int32(n)) => n.to_string(),
        Some(Bson::Int64(n)) => n.to_string(),
        Some(Bson::Double(f)) => f.to_string(),
        Some(other) => {
            return Err(eval_error(format!(
                "$substr: cannot take a substring of {:?}",
                other.element_type()
            )))
        }
    };

    let int_arg = |v: Option<Bson>, what: &str| -> Result<i64> {
        v.as_ref()
            .and_then(|b| as_i64(b).or_else(|| as_f64(b).map(|f| f as i64)))
            .ok_or_else(|| eval_error(format!("$substr: {} must be numeric", what)))
    };
    let start = int_arg(evaluate(args[1], scope)?, "starting index")?;
    let length = int_arg(evaluate(args[2], scope)?, "length")?;

    let start = usize::try_from(start)
        .map_err(|_| eval_error("$substr: starting index must be non-negative"))?;
    if start >= text.len() {
        return Ok(Some(Bson::String(String::new())));
    }
    let end = usize::try_from(length)
        .map(|len| start.saturating_add(len).min(text.len()))
        .unwrap_or(text.len());

    text.get(start..end)
        .map(|s| Some(Bson::String(s.to_string())))
        .ok_or_else(|| eval_error("$substr: range splits a UTF-8 character"))
}
