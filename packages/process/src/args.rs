//! Type-coerced argument accessors.
//!
//! Every accessor returns its default when the slot is missing or null,
//! casts directly when the variant already matches, and otherwise coerces
//! through one canonical rule. A failed coercion yields the default; the
//! handler decides whether that default is acceptable.

use std::collections::BTreeMap;

use crate::{Exception, Process, Value};

/// Query parameters: every key maps to one or more values.
pub type QueryParams = BTreeMap<String, Vec<String>>;

/// Canonical string form of a value.
pub fn to_string(value: &Value) -> String {
    match value {
        Value::Null | Value::Foreign(_) => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Array(_) | Value::Map(_) => value.to_json().to_string(),
    }
}

/// Canonical boolean coercion: `true`/`1` (any case) are true.
pub fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Integer(i) => Some(*i == 1),
        Value::Float(f) => Some(*f == 1.0),
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            Some(s == "true" || s == "1")
        }
        _ => None,
    }
}

/// Canonical integer coercion: strings via integer parsing (falling back
/// to float truncation), floats truncated.
pub fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) => Some(f.trunc() as i64),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn parse_query(query: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for (k, v) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
        params.entry(k.into_owned()).or_default().push(v.into_owned());
    }
    params
}

fn map_to_query(map: &BTreeMap<String, Value>) -> QueryParams {
    map.iter()
        .map(|(k, v)| {
            let values = match v {
                Value::Array(items) => items.iter().map(to_string).collect(),
                other => vec![to_string(other)],
            };
            (k.clone(), values)
        })
        .collect()
}

impl Process {
    /// The argument at `i`, or `None` when missing or null.
    pub fn arg(&self, i: usize) -> Option<&Value> {
        self.args.get(i).filter(|v| !v.is_null())
    }

    /// Fail with `BadRequest` when fewer than `n` arguments were passed.
    pub fn validate_arg_nums(&self, n: usize) -> Result<(), Exception> {
        if self.args.len() < n {
            return Err(Exception::bad_request(format!(
                "{}: requires {} arguments, got {}",
                self.name,
                n,
                self.args.len()
            )));
        }
        Ok(())
    }

    /// Fail with `BadRequest` when slot `i` is missing or null.
    pub fn args_not_null(&self, i: usize) -> Result<(), Exception> {
        if self.arg(i).is_none() {
            return Err(Exception::bad_request(format!(
                "{}: argument {} is required",
                self.name, i
            )));
        }
        Ok(())
    }

    pub fn args_string(&self, i: usize) -> String {
        self.args_string_or(i, "")
    }

    /// An empty string is a valid value and is returned as-is.
    pub fn args_string_or(&self, i: usize, default: &str) -> String {
        match self.arg(i) {
            None | Some(Value::Foreign(_)) => default.to_string(),
            Some(v) => to_string(v),
        }
    }

    pub fn args_int(&self, i: usize) -> i64 {
        self.args_int_or(i, 0)
    }

    /// An empty string means "use the default".
    pub fn args_int_or(&self, i: usize, default: i64) -> i64 {
        self.arg(i).and_then(to_i64).unwrap_or(default)
    }

    pub fn args_uint32(&self, i: usize) -> u32 {
        self.args_uint32_or(i, 0)
    }

    pub fn args_uint32_or(&self, i: usize, default: u32) -> u32 {
        self.arg(i)
            .and_then(to_i64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(default)
    }

    pub fn args_bool(&self, i: usize) -> bool {
        self.args_bool_or(i, false)
    }

    pub fn args_bool_or(&self, i: usize, default: bool) -> bool {
        self.arg(i).and_then(to_bool).unwrap_or(default)
    }

    pub fn args_map(&self, i: usize) -> BTreeMap<String, Value> {
        self.args_map_or(i, BTreeMap::new())
    }

    /// Maps pass through; JSON object strings are decoded.
    pub fn args_map_or(
        &self,
        i: usize,
        default: BTreeMap<String, Value>,
    ) -> BTreeMap<String, Value> {
        match self.arg(i) {
            Some(Value::Map(m)) => m.clone(),
            Some(Value::String(s)) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(json @ serde_json::Value::Object(_)) => match Value::from(json) {
                    Value::Map(m) => m,
                    _ => default,
                },
                _ => default,
            },
            _ => default,
        }
    }

    /// Arrays pass through; a scalar becomes a one-element array.
    pub fn args_array(&self, i: usize) -> Vec<Value> {
        match self.arg(i) {
            None => Vec::new(),
            Some(Value::Array(a)) => a.clone(),
            Some(Value::String(s)) if s.trim_start().starts_with('[') => {
                match serde_json::from_str::<serde_json::Value>(s) {
                    Ok(json) => match Value::from(json) {
                        Value::Array(a) => a,
                        other => vec![other],
                    },
                    Err(_) => vec![Value::String(s.clone())],
                }
            }
            Some(other) => vec![other.clone()],
        }
    }

    pub fn args_strings(&self, i: usize) -> Vec<String> {
        self.args_array(i).iter().map(to_string).collect()
    }

    /// Every map element of the array at `i`; other elements are skipped.
    pub fn args_records(&self, i: usize) -> Vec<BTreeMap<String, Value>> {
        self.args_array(i)
            .into_iter()
            .filter_map(|v| match v {
                Value::Map(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn args_query_params(&self, i: usize) -> QueryParams {
        self.args_query_params_or(i, QueryParams::new())
    }

    /// Accepts a query string (`a=1&b=2`) or a mapping.
    pub fn args_query_params_or(&self, i: usize, default: QueryParams) -> QueryParams {
        match self.arg(i) {
            Some(Value::String(s)) => parse_query(s),
            Some(Value::Map(m)) => map_to_query(m),
            _ => default,
        }
    }

    /// The first value of `key` in the query string or mapping at `i`.
    pub fn args_url_value(&self, i: usize, key: &str, default: &str) -> String {
        self.args_query_params(i)
            .get(key)
            .and_then(|values| values.first().cloned())
            .unwrap_or_else(|| default.to_string())
    }
}
