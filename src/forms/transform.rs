//! Conversion between form data and call arguments, in both directions.
//!
//! `parse_input` turns what a user typed (strings, nested objects and arrays)
//! into a chain-agnostic [`CallValue`] tree; `format_output` turns values a
//! contract returned back into a [`DisplayValue`]. Both walk the parameter
//! tree the same way the mapping engine does, and both report failures per
//! field path instead of stopping at the first one.

use alloy::primitives::{I256, U256};
use serde_json::{Map, Value};

use super::field::VariantKind;
use super::kind::{self, ParamKind};
use super::mapping::{field_name, variant_kind, variant_payload, FieldOverrides};
use crate::error::{FieldError, TransformErrors};
use crate::ethereum::utils;
use crate::schema::{ContractFunction, Ecosystem, FunctionParameter};

/// Chain-agnostic call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallValue {
    /// Explicitly absent optional value.
    Absent,
    Bool(bool),
    Uint(U256),
    Int(I256),
    Address(String),
    Bytes(Vec<u8>),
    String(String),
    Tuple(Vec<CallValue>),
    Array(Vec<CallValue>),
    Map(Vec<(CallValue, CallValue)>),
    Enum { tag: String, values: Vec<CallValue> },
}

impl CallValue {
    pub fn to_json(&self) -> Value {
        match self {
            CallValue::Absent => Value::Null,
            CallValue::Bool(b) => Value::Bool(*b),
            CallValue::Uint(n) => Value::String(n.to_string()),
            CallValue::Int(n) => Value::String(n.to_string()),
            CallValue::Address(a) => Value::String(a.clone()),
            CallValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
            CallValue::String(s) => Value::String(s.clone()),
            CallValue::Tuple(items) | CallValue::Array(items) => {
                Value::Array(items.iter().map(CallValue::to_json).collect())
            }
            CallValue::Map(entries) => Value::Array(
                entries
                    .iter()
                    .map(|(k, v)| serde_json::json!({ "key": k.to_json(), "value": v.to_json() }))
                    .collect(),
            ),
            CallValue::Enum { tag, values } => {
                let mut obj = Map::new();
                obj.insert("tag".to_string(), Value::String(tag.clone()));
                if !values.is_empty() {
                    obj.insert(
                        "values".to_string(),
                        Value::Array(values.iter().map(CallValue::to_json).collect()),
                    );
                }
                Value::Object(obj)
            }
        }
    }
}

/// Value ready for display, produced from a contract's return data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayValue {
    Empty,
    Text(String),
    Record(Vec<(String, DisplayValue)>),
    List(Vec<DisplayValue>),
    Entries(Vec<(DisplayValue, DisplayValue)>),
    Variant { tag: String, values: Vec<DisplayValue> },
}

impl DisplayValue {
    /// The same value in the shape a form submits it.
    pub fn to_form_value(&self) -> Value {
        match self {
            DisplayValue::Empty => Value::String(String::new()),
            DisplayValue::Text(s) => Value::String(s.clone()),
            DisplayValue::Record(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_form_value()))
                    .collect(),
            ),
            DisplayValue::List(items) => {
                Value::Array(items.iter().map(DisplayValue::to_form_value).collect())
            }
            DisplayValue::Entries(entries) => Value::Array(
                entries
                    .iter()
                    .map(|(k, v)| {
                        serde_json::json!({ "key": k.to_form_value(), "value": v.to_form_value() })
                    })
                    .collect(),
            ),
            DisplayValue::Variant { tag, values } => {
                let mut obj = Map::new();
                obj.insert("tag".to_string(), Value::String(tag.clone()));
                if !values.is_empty() {
                    obj.insert(
                        "values".to_string(),
                        Value::Array(values.iter().map(DisplayValue::to_form_value).collect()),
                    );
                }
                Value::Object(obj)
            }
        }
    }
}

pub fn parse_input(
    param: &FunctionParameter,
    raw: &Value,
    ecosystem: Ecosystem,
) -> Result<CallValue, TransformErrors> {
    let path = field_name(param, 0);
    let overrides = FieldOverrides::default();
    let mut parser = Parser::new(ecosystem, &overrides);
    let value = parser.parse_at(param, raw, &path, &path);
    match value {
        Some(value) if parser.errors.is_empty() => Ok(value),
        _ => Err(parser.errors),
    }
}

/// Parses every input of `function` from submitted form values.
///
/// `values` is either an object keyed by field name or an array in input
/// order. Hardcoded override values take precedence over submitted ones at
/// every level of the field tree. All invalid fields are reported together.
pub fn parse_inputs(
    function: &ContractFunction,
    values: &Value,
    ecosystem: Ecosystem,
    overrides: &FieldOverrides,
) -> Result<Vec<CallValue>, TransformErrors> {
    if let Value::Array(items) = values {
        if items.len() != function.inputs.len() {
            return Err(TransformErrors::single(
                function.name.clone(),
                format!(
                    "expected {} arguments, got {}",
                    function.inputs.len(),
                    items.len()
                ),
            ));
        }
    } else if !values.is_object() && !values.is_null() {
        return Err(TransformErrors::single(
            function.name.clone(),
            "arguments must be an object keyed by parameter name or an array",
        ));
    }

    let mut parser = Parser::new(ecosystem, overrides);
    let mut parsed = Vec::with_capacity(function.inputs.len());
    for (index, param) in function.inputs.iter().enumerate() {
        let name = field_name(param, index);
        let raw = match values {
            Value::Array(items) => items.get(index),
            Value::Object(obj) => obj.get(&name),
            _ => None,
        };
        if let Some(value) = parser.parse_member(param, raw, &name, &name) {
            parsed.push(value);
        }
    }

    if parser.errors.is_empty() {
        Ok(parsed)
    } else {
        Err(parser.errors)
    }
}

fn is_optional(param: &FunctionParameter) -> bool {
    matches!(kind::classify(&param.ty), ParamKind::Optional(_))
}

/// Walks a parameter tree, tracking two coordinates per node: `path` names
/// the concrete position for error reports (`orders[2].amount`) and `id`
/// is the field id overrides are keyed by (`orders[].amount`).
struct Parser<'a> {
    ecosystem: Ecosystem,
    overrides: &'a FieldOverrides,
    errors: TransformErrors,
}

impl<'a> Parser<'a> {
    fn new(ecosystem: Ecosystem, overrides: &'a FieldOverrides) -> Self {
        Self {
            ecosystem,
            overrides,
            errors: TransformErrors::default(),
        }
    }

    fn fail(&mut self, path: &str, message: impl Into<String>) -> Option<CallValue> {
        self.errors.0.push(FieldError::new(path, message));
        None
    }

    /// Parses a value that may be missing from its container.
    fn parse_member(
        &mut self,
        param: &FunctionParameter,
        raw: Option<&Value>,
        path: &str,
        id: &str,
    ) -> Option<CallValue> {
        let overrides = self.overrides;
        match raw.or_else(|| overrides.hardcoded(id)) {
            Some(raw) => self.parse_at(param, raw, path, id),
            None if is_optional(param) => Some(CallValue::Absent),
            None => self.fail(path, "missing value"),
        }
    }

    fn parse_at(
        &mut self,
        param: &FunctionParameter,
        raw: &Value,
        path: &str,
        id: &str,
    ) -> Option<CallValue> {
        let overrides = self.overrides;
        let raw = overrides.hardcoded(id).unwrap_or(raw);

        match kind::classify(&param.ty) {
            ParamKind::Optional(_) => {
                if is_blank(raw) {
                    return Some(CallValue::Absent);
                }
                let inner = kind::optional_inner(param);
                self.parse_at(&inner, raw, path, id)
            }
            ParamKind::Primitive(ty) => match parse_primitive(&ty, raw, self.ecosystem) {
                Ok(value) => Some(value),
                Err(message) => self.fail(path, message),
            },
            ParamKind::Tuple => {
                let raw = match decode_text_json(raw) {
                    Ok(raw) => raw,
                    Err(message) => return self.fail(path, message),
                };
                let components = param.components();
                let mut items = Vec::with_capacity(components.len());
                let mut ok = true;
                match &raw {
                    Value::Object(obj) => {
                        for (i, member) in components.iter().enumerate() {
                            let member_name = field_name(member, i);
                            let member_path = format!("{}.{}", path, member_name);
                            let member_id = format!("{}.{}", id, member_name);
                            match self.parse_member(
                                member,
                                obj.get(&member_name),
                                &member_path,
                                &member_id,
                            ) {
                                Some(v) => items.push(v),
                                None => ok = false,
                            }
                        }
                    }
                    Value::Array(values) => {
                        if values.len() != components.len() {
                            return self.fail(
                                path,
                                format!(
                                    "expected {} values, got {}",
                                    components.len(),
                                    values.len()
                                ),
                            );
                        }
                        for (i, (member, v)) in components.iter().zip(values).enumerate() {
                            let member_name = field_name(member, i);
                            let member_path = format!("{}.{}", path, member_name);
                            let member_id = format!("{}.{}", id, member_name);
                            match self.parse_at(member, v, &member_path, &member_id) {
                                Some(v) => items.push(v),
                                None => ok = false,
                            }
                        }
                    }
                    _ => return self.fail(path, "expected an object or an array of member values"),
                }
                ok.then_some(CallValue::Tuple(items))
            }
            ParamKind::Array { len, .. } => {
                let raw = match decode_text_json(raw) {
                    Ok(Value::String(s)) if s.trim().is_empty() => Value::Array(Vec::new()),
                    Ok(raw) => raw,
                    Err(message) => return self.fail(path, message),
                };
                let Value::Array(values) = raw else {
                    return self.fail(path, "expected an array");
                };
                if let Some(len) = len {
                    if values.len() != len {
                        return self.fail(
                            path,
                            format!("expected exactly {} elements, got {}", len, values.len()),
                        );
                    }
                }
                let element = kind::array_element(param);
                let element_id = format!("{}[]", id);
                let mut items = Vec::with_capacity(values.len());
                let mut ok = true;
                for (i, v) in values.iter().enumerate() {
                    match self.parse_at(&element, v, &format!("{}[{}]", path, i), &element_id) {
                        Some(v) => items.push(v),
                        None => ok = false,
                    }
                }
                ok.then_some(CallValue::Array(items))
            }
            ParamKind::Map { .. } => {
                let raw = match decode_text_json(raw) {
                    Ok(raw) => raw,
                    Err(message) => return self.fail(path, message),
                };
                let (key_param, value_param) = kind::map_entry(param);
                let pairs: Vec<(Value, Value)> = match raw {
                    Value::Array(entries) => {
                        let mut pairs = Vec::with_capacity(entries.len());
                        for (i, entry) in entries.into_iter().enumerate() {
                            match entry {
                                Value::Object(mut obj) if obj.contains_key("key") => {
                                    let key = obj.remove("key").unwrap_or(Value::Null);
                                    let value = obj.remove("value").unwrap_or(Value::Null);
                                    pairs.push((key, value));
                                }
                                _ => {
                                    return self.fail(
                                        &format!("{}[{}]", path, i),
                                        "map entries must be objects with 'key' and 'value'",
                                    );
                                }
                            }
                        }
                        pairs
                    }
                    Value::Object(obj) => {
                        obj.into_iter().map(|(k, v)| (Value::String(k), v)).collect()
                    }
                    _ => return self.fail(path, "expected a list of {key, value} entries"),
                };
                let key_id = format!("{}.key", id);
                let value_id = format!("{}.value", id);
                let mut entries: Vec<(CallValue, CallValue)> = Vec::with_capacity(pairs.len());
                let mut ok = true;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    let entry_path = format!("{}[{}]", path, i);
                    let key_path = format!("{}.key", entry_path);
                    let key = self.parse_at(&key_param, k, &key_path, &key_id);
                    let value =
                        self.parse_at(&value_param, v, &format!("{}.value", entry_path), &value_id);
                    match (key, value) {
                        (Some(key), Some(value)) => {
                            if entries.iter().any(|(existing, _)| *existing == key) {
                                self.fail(
                                    &key_path,
                                    format!("duplicate map key {}", key.to_json()),
                                );
                                ok = false;
                            } else {
                                entries.push((key, value));
                            }
                        }
                        _ => ok = false,
                    }
                }
                ok.then_some(CallValue::Map(entries))
            }
            ParamKind::Enum => self.parse_enum(param, raw, path, id),
        }
    }

    fn parse_enum(
        &mut self,
        param: &FunctionParameter,
        raw: &Value,
        path: &str,
        id: &str,
    ) -> Option<CallValue> {
        let (tag, payload) = match raw {
            Value::String(tag) => (tag.trim().to_string(), Vec::new()),
            Value::Object(obj) => {
                let Some(tag) = obj.get("tag").and_then(Value::as_str) else {
                    return self.fail(path, "enum value requires a 'tag'");
                };
                let payload = match obj.get("values") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(values)) => values.clone(),
                    Some(single) => vec![single.clone()],
                };
                (tag.to_string(), payload)
            }
            _ => return self.fail(path, "expected an enum value {tag, values?}"),
        };

        let Some(variant) = param.components().iter().find(|v| v.name == tag) else {
            let known: Vec<&str> = param.components().iter().map(|v| v.name.as_str()).collect();
            return self.fail(
                path,
                format!("unknown variant '{}'; expected one of: {}", tag, known.join(", ")),
            );
        };

        match variant_kind(variant) {
            VariantKind::Void | VariantKind::Integer => {
                if !payload.is_empty() {
                    return self.fail(path, format!("variant '{}' takes no values", tag));
                }
                Some(CallValue::Enum {
                    tag,
                    values: Vec::new(),
                })
            }
            VariantKind::Tuple => {
                let payload_params = variant_payload(variant);
                if payload.len() != payload_params.len() {
                    return self.fail(
                        path,
                        format!(
                            "variant '{}' expects {} values, got {}",
                            tag,
                            payload_params.len(),
                            payload.len()
                        ),
                    );
                }
                let mut values = Vec::with_capacity(payload.len());
                let mut ok = true;
                for (i, (p, v)) in payload_params.iter().zip(&payload).enumerate() {
                    let at = format!("{}.{}.{}", path, tag, i);
                    let payload_id = format!("{}.{}.{}", id, tag, i);
                    match self.parse_at(p, v, &at, &payload_id) {
                        Some(v) => values.push(v),
                        None => ok = false,
                    }
                }
                ok.then_some(CallValue::Enum { tag, values })
            }
        }
    }
}

fn is_address_type(ty: &str) -> bool {
    matches!(
        ty,
        "address" | "address payable" | "Address" | "publicKey" | "pubkey"
    )
}

/// Whether a scalar value has the shape `parse_primitive` produces for `ty`.
fn matches_scalar(ty: &str, value: &CallValue) -> bool {
    if let Some((signed, _)) = kind::integer_bits(ty) {
        return matches!(
            (signed, value),
            (false, CallValue::Uint(_)) | (true, CallValue::Int(_))
        );
    }
    if kind::fixed_bytes_len(ty).is_some() || kind::is_dynamic_bytes(ty) {
        return matches!(value, CallValue::Bytes(_));
    }
    if matches!(ty, "bool" | "Bool") {
        return matches!(value, CallValue::Bool(_));
    }
    if is_address_type(ty) {
        return matches!(value, CallValue::Address(_));
    }
    matches!(value, CallValue::String(_))
}

fn scalar_expectation(ty: &str) -> &'static str {
    match kind::integer_bits(ty) {
        Some((true, _)) => "a signed integer",
        Some((false, _)) => "an unsigned integer",
        None if kind::fixed_bytes_len(ty).is_some() || kind::is_dynamic_bytes(ty) => "bytes",
        None if matches!(ty, "bool" | "Bool") => "a boolean",
        None if is_address_type(ty) => "an address",
        None => "text",
    }
}

fn is_blank(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Composite fields may arrive as JSON text typed into a single input.
fn decode_text_json(raw: &Value) -> Result<Value, String> {
    match raw {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(trimmed).map_err(|e| format!("invalid JSON: {}", e))
            } else {
                Ok(raw.clone())
            }
        }
        other => Ok(other.clone()),
    }
}

fn parse_primitive(ty: &str, raw: &Value, ecosystem: Ecosystem) -> Result<CallValue, String> {
    if let Some((signed, bits)) = kind::integer_bits(ty) {
        return parse_integer(raw, signed, bits);
    }
    if let Some(len) = kind::fixed_bytes_len(ty) {
        let bytes = parse_hex_bytes(raw)?;
        if bytes.len() != len {
            return Err(format!("expected {} bytes, got {}", len, bytes.len()));
        }
        return Ok(CallValue::Bytes(bytes));
    }
    if kind::is_dynamic_bytes(ty) {
        return parse_hex_bytes(raw).map(CallValue::Bytes);
    }

    match (ecosystem, ty) {
        (_, "bool" | "Bool") => parse_bool(raw).map(CallValue::Bool),
        (Ecosystem::Evm, "address" | "address payable") => {
            let s = required_str(raw)?;
            let address = utils::validate_address(s).map_err(|e| e.to_string())?;
            Ok(CallValue::Address(address.to_checksum(None)))
        }
        (Ecosystem::Stellar, "Address") => {
            let s = required_str(raw)?;
            validate_stellar_address(s)?;
            Ok(CallValue::Address(s.trim().to_string()))
        }
        (_, ty) if is_address_type(ty) => {
            Ok(CallValue::Address(required_str(raw)?.trim().to_string()))
        }
        _ => match raw {
            Value::String(s) => Ok(CallValue::String(s.clone())),
            Value::Number(n) => Ok(CallValue::String(n.to_string())),
            Value::Bool(b) => Ok(CallValue::String(b.to_string())),
            Value::Null => Err("value is required".to_string()),
            _ => Err("expected a text value".to_string()),
        },
    }
}

fn required_str(raw: &Value) -> Result<&str, String> {
    match raw {
        Value::String(s) if !s.trim().is_empty() => Ok(s.as_str()),
        Value::String(_) | Value::Null => Err("value is required".to_string()),
        _ => Err("expected a string".to_string()),
    }
}

fn parse_bool(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            "" => Err("value is required".to_string()),
            other => Err(format!("'{}' is not a boolean", other)),
        },
        Value::Null => Err("value is required".to_string()),
        _ => Err("expected true or false".to_string()),
    }
}

fn parse_hex_bytes(raw: &Value) -> Result<Vec<u8>, String> {
    let s = match raw {
        Value::String(s) => s.trim(),
        Value::Null => return Err("value is required".to_string()),
        _ => return Err("expected a 0x-prefixed hex string".to_string()),
    };
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| format!("'{}' must start with 0x", s))?;
    if digits.len() % 2 != 0 {
        return Err("hex string must have an even number of digits".to_string());
    }
    hex::decode(digits).map_err(|_| format!("'{}' is not valid hex", s))
}

/// Integer literal parsing that never goes through floating point.
fn parse_integer(raw: &Value, signed: bool, bits: usize) -> Result<CallValue, String> {
    let literal = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u.to_string()
            } else if let Some(i) = n.as_i64() {
                i.to_string()
            } else {
                return Err(format!(
                    "{} is not an integer; enter large values as text",
                    n
                ));
            }
        }
        Value::Null => return Err("value is required".to_string()),
        _ => return Err("expected an integer".to_string()),
    };
    if literal.is_empty() {
        return Err("value is required".to_string());
    }

    let (negative, body) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal.as_str()),
    };
    let hex_digits = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X"));
    let magnitude = match hex_digits {
        Some(h) if !h.is_empty() && h.chars().all(|c| c.is_ascii_hexdigit()) => {
            U256::from_str_radix(h, 16).map_err(|_| format!("'{}' is out of range", literal))?
        }
        None if !body.is_empty() && body.chars().all(|c| c.is_ascii_digit()) => {
            U256::from_str_radix(body, 10).map_err(|_| format!("'{}' is out of range", literal))?
        }
        _ => return Err(format!("'{}' is not an integer literal", literal)),
    };

    if !signed {
        if negative && !magnitude.is_zero() {
            return Err(format!("'{}' must not be negative", literal));
        }
        if magnitude.bit_len() > bits {
            return Err(format!("'{}' does not fit in {} bits", literal, bits));
        }
        return Ok(CallValue::Uint(magnitude));
    }

    let limit = U256::from(1u8) << (bits - 1);
    let fits = if negative {
        magnitude <= limit
    } else {
        magnitude < limit
    };
    if !fits {
        return Err(format!("'{}' does not fit in a signed {}-bit integer", literal, bits));
    }
    let value = I256::from_raw(magnitude);
    Ok(CallValue::Int(if negative { value.wrapping_neg() } else { value }))
}

pub fn validate_stellar_address(address: &str) -> Result<(), String> {
    let address = address.trim();
    let valid = address.len() == 56
        && (address.starts_with('G') || address.starts_with('C'))
        && address
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c));
    if valid {
        Ok(())
    } else {
        Err(format!(
            "'{}' is not a Stellar account (G...) or contract (C...) address",
            address
        ))
    }
}

/// Formats a read call's return values for display.
///
/// A single unnamed output renders directly; named or multiple outputs
/// render as a record in declaration order.
pub fn format_output(
    values: &[CallValue],
    function: &ContractFunction,
) -> Result<DisplayValue, TransformErrors> {
    let outputs = &function.outputs;
    if outputs.is_empty() && values.is_empty() {
        return Ok(DisplayValue::Empty);
    }
    if values.len() != outputs.len() {
        return Err(TransformErrors::single(
            function.name.clone(),
            format!(
                "expected {} return values, got {}",
                outputs.len(),
                values.len()
            ),
        ));
    }

    let mut errors = TransformErrors::default();
    if outputs.len() == 1 && outputs[0].name.trim().is_empty() {
        let path = field_name(&outputs[0], 0);
        return match format_at(&outputs[0], &values[0], &path, &mut errors) {
            Some(display) if errors.is_empty() => Ok(display),
            _ => Err(errors),
        };
    }

    let mut fields = Vec::with_capacity(outputs.len());
    for (i, (param, value)) in outputs.iter().zip(values).enumerate() {
        let name = field_name(param, i);
        if let Some(display) = format_at(param, value, &name, &mut errors) {
            fields.push((name, display));
        }
    }
    if errors.is_empty() {
        Ok(DisplayValue::Record(fields))
    } else {
        Err(errors)
    }
}

/// Formats one value against its declared parameter.
pub fn format_value(
    param: &FunctionParameter,
    value: &CallValue,
) -> Result<DisplayValue, TransformErrors> {
    let mut errors = TransformErrors::default();
    match format_at(param, value, &field_name(param, 0), &mut errors) {
        Some(display) if errors.is_empty() => Ok(display),
        _ => Err(errors),
    }
}

fn format_at(
    param: &FunctionParameter,
    value: &CallValue,
    path: &str,
    errors: &mut TransformErrors,
) -> Option<DisplayValue> {
    let mismatch = |errors: &mut TransformErrors, expected: &str| {
        errors.0.push(FieldError::new(
            path,
            format!("expected {} for type '{}', got {}", expected, param.ty, value.to_json()),
        ));
        None
    };

    match kind::classify(&param.ty) {
        ParamKind::Optional(_) => match value {
            CallValue::Absent => Some(DisplayValue::Empty),
            _ => format_at(&kind::optional_inner(param), value, path, errors),
        },
        ParamKind::Primitive(ty) => match value {
            CallValue::Absent => Some(DisplayValue::Empty),
            v if !matches_scalar(&ty, v) => mismatch(errors, scalar_expectation(&ty)),
            CallValue::Bool(b) => Some(DisplayValue::Text(b.to_string())),
            CallValue::Uint(n) => Some(DisplayValue::Text(n.to_string())),
            CallValue::Int(n) => Some(DisplayValue::Text(n.to_string())),
            CallValue::Address(a) => Some(DisplayValue::Text(a.clone())),
            CallValue::Bytes(b) => Some(DisplayValue::Text(format!("0x{}", hex::encode(b)))),
            CallValue::String(s) => Some(DisplayValue::Text(s.clone())),
            _ => mismatch(errors, "a single value"),
        },
        ParamKind::Tuple => {
            let CallValue::Tuple(items) = value else {
                return mismatch(errors, "a tuple");
            };
            let components = param.components();
            if items.len() != components.len() {
                errors.0.push(FieldError::new(
                    path,
                    format!("expected {} members, got {}", components.len(), items.len()),
                ));
                return None;
            }
            let mut fields = Vec::with_capacity(items.len());
            let mut ok = true;
            for (i, (member, item)) in components.iter().zip(items).enumerate() {
                let name = field_name(member, i);
                match format_at(member, item, &format!("{}.{}", path, name), errors) {
                    Some(display) => fields.push((name, display)),
                    None => ok = false,
                }
            }
            ok.then_some(DisplayValue::Record(fields))
        }
        ParamKind::Array { len, .. } => {
            let CallValue::Array(items) = value else {
                return mismatch(errors, "an array");
            };
            if let Some(len) = len {
                if items.len() != len {
                    errors.0.push(FieldError::new(
                        path,
                        format!("expected {} elements, got {}", len, items.len()),
                    ));
                    return None;
                }
            }
            let element = kind::array_element(param);
            let mut list = Vec::with_capacity(items.len());
            let mut ok = true;
            for (i, item) in items.iter().enumerate() {
                match format_at(&element, item, &format!("{}[{}]", path, i), errors) {
                    Some(display) => list.push(display),
                    None => ok = false,
                }
            }
            ok.then_some(DisplayValue::List(list))
        }
        ParamKind::Map { .. } => {
            let CallValue::Map(entries) = value else {
                return mismatch(errors, "a map");
            };
            let (key_param, value_param) = kind::map_entry(param);
            let mut out = Vec::with_capacity(entries.len());
            let mut ok = true;
            for (i, (k, v)) in entries.iter().enumerate() {
                let entry_path = format!("{}[{}]", path, i);
                let key = format_at(&key_param, k, &format!("{}.key", entry_path), errors);
                let val = format_at(&value_param, v, &format!("{}.value", entry_path), errors);
                match (key, val) {
                    (Some(key), Some(val)) => out.push((key, val)),
                    _ => ok = false,
                }
            }
            ok.then_some(DisplayValue::Entries(out))
        }
        ParamKind::Enum => {
            let CallValue::Enum { tag, values } = value else {
                return mismatch(errors, "an enum value");
            };
            let Some(variant) = param.components().iter().find(|v| &v.name == tag) else {
                errors
                    .0
                    .push(FieldError::new(path, format!("unknown variant '{}'", tag)));
                return None;
            };
            if variant_kind(variant) != VariantKind::Tuple {
                return Some(DisplayValue::Variant {
                    tag: tag.clone(),
                    values: Vec::new(),
                });
            }
            let payload = variant_payload(variant);
            if payload.len() != values.len() {
                errors.0.push(FieldError::new(
                    path,
                    format!(
                        "variant '{}' expects {} values, got {}",
                        tag,
                        payload.len(),
                        values.len()
                    ),
                ));
                return None;
            }
            let mut out = Vec::with_capacity(values.len());
            let mut ok = true;
            for (i, (p, v)) in payload.iter().zip(values).enumerate() {
                match format_at(p, v, &format!("{}.{}.{}", path, tag, i), errors) {
                    Some(display) => out.push(display),
                    None => ok = false,
                }
            }
            ok.then_some(DisplayValue::Variant {
                tag: tag.clone(),
                values: out,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StateMutability;
    use serde_json::json;

    fn function(inputs: Vec<FunctionParameter>, outputs: Vec<FunctionParameter>) -> ContractFunction {
        ContractFunction {
            id: "f".to_string(),
            name: "f".to_string(),
            display_name: "F".to_string(),
            inputs,
            outputs,
            state_mutability: StateMutability::View,
            modifies_state: false,
            description: None,
        }
    }

    fn sample_enum() -> FunctionParameter {
        FunctionParameter::new("choice", "enum").with_components(vec![
            FunctionParameter::new("A", "void"),
            FunctionParameter::new("B", "tuple").with_components(vec![
                FunctionParameter::new("", "U32"),
                FunctionParameter::new("", "Symbol"),
            ]),
        ])
    }

    #[test]
    fn test_wide_integer_is_exact() {
        let param = FunctionParameter::new("amount", "uint256");
        let parsed = parse_input(&param, &json!("123456789012345678901234567890"), Ecosystem::Evm)
            .unwrap();
        assert_eq!(
            parsed,
            CallValue::Uint(U256::from_str_radix("123456789012345678901234567890", 10).unwrap())
        );
        let f = function(vec![], vec![FunctionParameter::new("", "uint256")]);
        let shown = format_output(&[parsed], &f).unwrap();
        assert_eq!(
            shown,
            DisplayValue::Text("123456789012345678901234567890".to_string())
        );
    }

    #[test]
    fn test_wide_integer_rejects_non_literals() {
        let param = FunctionParameter::new("amount", "uint256");
        for bad in ["1e18", "1.5", "12abc", "", " - 4"] {
            let err = parse_input(&param, &json!(bad), Ecosystem::Evm).unwrap_err();
            assert_eq!(err.0[0].path, "amount", "input {:?}", bad);
        }
        assert!(parse_input(&param, &json!(1.5), Ecosystem::Evm).is_err());
        assert!(parse_input(&param, &json!("-1"), Ecosystem::Evm).is_err());
        assert_eq!(
            parse_input(&param, &json!("0xff"), Ecosystem::Evm).unwrap(),
            CallValue::Uint(U256::from(255u64))
        );
    }

    #[test]
    fn test_integer_ranges() {
        let small = FunctionParameter::new("n", "uint8");
        assert!(parse_input(&small, &json!(255), Ecosystem::Evm).is_ok());
        assert!(parse_input(&small, &json!("256"), Ecosystem::Evm).is_err());

        let signed = FunctionParameter::new("d", "int8");
        assert_eq!(
            parse_input(&signed, &json!("-128"), Ecosystem::Evm).unwrap(),
            CallValue::Int(I256::try_from(-128i64).unwrap())
        );
        assert!(parse_input(&signed, &json!("128"), Ecosystem::Evm).is_err());
        assert!(parse_input(&signed, &json!(-129), Ecosystem::Evm).is_err());
    }

    #[test]
    fn test_struct_in_component_order() {
        let param = FunctionParameter::new("Range", "tuple").with_components(vec![
            FunctionParameter::new("min", "uint32"),
            FunctionParameter::new("max", "uint32"),
        ]);
        let parsed = parse_input(&param, &json!({"max": "10", "min": "1"}), Ecosystem::Evm).unwrap();
        assert_eq!(
            parsed,
            CallValue::Tuple(vec![
                CallValue::Uint(U256::from(1u64)),
                CallValue::Uint(U256::from(10u64)),
            ])
        );

        let err = parse_input(&param, &json!(["1"]), Ecosystem::Evm).unwrap_err();
        assert_eq!(err.0[0].path, "Range");
        assert!(err.0[0].message.contains("expected 2 values"));
    }

    #[test]
    fn test_nested_errors_carry_paths() {
        let param = FunctionParameter::new("orders", "tuple[]").with_components(vec![
            FunctionParameter::new("maker", "address"),
            FunctionParameter::new("price", "uint256"),
        ]);
        let raw = json!([
            {"maker": "0x0000000000000000000000000000000000000001", "price": "5"},
            {"maker": "nope", "price": "1e3"},
        ]);
        let err = parse_input(&param, &raw, Ecosystem::Evm).unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.for_path("orders[1].maker").is_some());
        assert!(err.for_path("orders[1].price").is_some());
    }

    #[test]
    fn test_enum_validation() {
        let param = FunctionParameter::new("choice", "enum").with_components(vec![
            FunctionParameter::new("A", "void"),
            FunctionParameter::new("B", "void"),
        ]);
        let err = parse_input(&param, &json!({"tag": "Unknown"}), Ecosystem::Stellar).unwrap_err();
        assert!(err.0[0].message.contains("unknown variant 'Unknown'"));

        let ok = parse_input(&param, &json!({"tag": "A"}), Ecosystem::Stellar).unwrap();
        assert_eq!(
            ok,
            CallValue::Enum {
                tag: "A".to_string(),
                values: vec![]
            }
        );
    }

    #[test]
    fn test_enum_payload() {
        let param = sample_enum();
        let parsed = parse_input(
            &param,
            &json!({"tag": "B", "values": ["7", "hello"]}),
            Ecosystem::Stellar,
        )
        .unwrap();
        assert_eq!(
            parsed,
            CallValue::Enum {
                tag: "B".to_string(),
                values: vec![
                    CallValue::Uint(U256::from(7u64)),
                    CallValue::String("hello".to_string())
                ],
            }
        );
        assert!(parse_input(&param, &json!({"tag": "B", "values": ["7"]}), Ecosystem::Stellar).is_err());
        assert!(parse_input(&param, &json!({"tag": "A", "values": ["7"]}), Ecosystem::Stellar).is_err());
    }

    #[test]
    fn test_optional_empty_is_absent() {
        let param = FunctionParameter::new("memo", "Option<U64>");
        assert_eq!(
            parse_input(&param, &json!(""), Ecosystem::Stellar).unwrap(),
            CallValue::Absent
        );
        assert_eq!(
            parse_input(&param, &json!("9"), Ecosystem::Stellar).unwrap(),
            CallValue::Uint(U256::from(9u64))
        );
    }

    #[test]
    fn test_map_entries_and_duplicates() {
        let param = FunctionParameter::new("limits", "Map<Symbol, U32>");
        let parsed = parse_input(
            &param,
            &json!([{"key": "daily", "value": "5"}, {"key": "weekly", "value": 20}]),
            Ecosystem::Stellar,
        )
        .unwrap();
        assert_eq!(
            parsed,
            CallValue::Map(vec![
                (CallValue::String("daily".into()), CallValue::Uint(U256::from(5u64))),
                (CallValue::String("weekly".into()), CallValue::Uint(U256::from(20u64))),
            ])
        );

        let err = parse_input(
            &param,
            &json!([{"key": "daily", "value": "5"}, {"key": "daily", "value": "6"}]),
            Ecosystem::Stellar,
        )
        .unwrap_err();
        assert!(err.for_path("limits[1].key").is_some());
    }

    #[test]
    fn test_bytes_and_addresses() {
        let fixed = FunctionParameter::new("hash", "bytes4");
        assert_eq!(
            parse_input(&fixed, &json!("0xdeadbeef"), Ecosystem::Evm).unwrap(),
            CallValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert!(parse_input(&fixed, &json!("0xdead"), Ecosystem::Evm).is_err());
        assert!(parse_input(&fixed, &json!("deadbeef"), Ecosystem::Evm).is_err());

        let addr = FunctionParameter::new("to", "address");
        assert_eq!(
            parse_input(&addr, &json!("0x742d35cc6435c9c1c72c5e7b18bab7e1db7a5d6e"), Ecosystem::Evm)
                .unwrap(),
            CallValue::Address("0x742D35cc6435C9c1c72C5e7b18bAb7E1DB7A5D6E".to_string())
        );

        let stellar = FunctionParameter::new("to", "Address");
        let account = format!("G{}", "A".repeat(55));
        assert!(parse_input(&stellar, &json!(account), Ecosystem::Stellar).is_ok());
        assert!(parse_input(&stellar, &json!("0xabc"), Ecosystem::Stellar).is_err());
    }

    #[test]
    fn test_parse_inputs_collects_all_errors() {
        let f = function(
            vec![
                FunctionParameter::new("to", "address"),
                FunctionParameter::new("amount", "uint256"),
                FunctionParameter::new("memo", "string"),
            ],
            vec![],
        );
        let err = parse_inputs(
            &f,
            &json!({"to": "bad", "amount": "x"}),
            Ecosystem::Evm,
            &FieldOverrides::default(),
        )
        .unwrap_err();
        assert_eq!(err.len(), 3);
        assert_eq!(err.0[2].path, "memo");
        assert_eq!(err.0[2].message, "missing value");
    }

    #[test]
    fn test_parse_inputs_uses_hardcoded_values() {
        use crate::forms::mapping::FieldOverride;

        let f = function(vec![FunctionParameter::new("amount", "uint256")], vec![]);
        let mut overrides = FieldOverrides::default();
        overrides.0.insert(
            "amount".to_string(),
            FieldOverride {
                hidden: true,
                hardcoded_value: Some(json!("42")),
                ..Default::default()
            },
        );
        let parsed = parse_inputs(&f, &json!({"amount": "1"}), Ecosystem::Evm, &overrides).unwrap();
        assert_eq!(parsed, vec![CallValue::Uint(U256::from(42u64))]);
    }

    fn hardcode(overrides: &mut FieldOverrides, id: &str, value: Value) {
        use crate::forms::mapping::FieldOverride;

        overrides.0.insert(
            id.to_string(),
            FieldOverride {
                hardcoded_value: Some(value),
                ..Default::default()
            },
        );
    }

    #[test]
    fn test_nested_hardcoded_member_replaces_submission() {
        use crate::forms::mapping::map_function;

        let range = FunctionParameter::new("range", "tuple").with_components(vec![
            FunctionParameter::new("min", "uint32"),
            FunctionParameter::new("max", "uint32"),
        ]);
        let f = function(vec![range], vec![]);
        let mut overrides = FieldOverrides::default();
        hardcode(&mut overrides, "range.min", json!("5"));

        let fields = map_function(&f, Ecosystem::Evm, &overrides);
        let min = &fields[0].components.as_ref().unwrap()[0];
        assert!(min.is_hardcoded);

        let expected = vec![CallValue::Tuple(vec![
            CallValue::Uint(U256::from(5u64)),
            CallValue::Uint(U256::from(10u64)),
        ])];
        let submitted = json!({"range": {"min": "1", "max": "10"}});
        assert_eq!(
            parse_inputs(&f, &submitted, Ecosystem::Evm, &overrides).unwrap(),
            expected
        );
        let omitted = json!({"range": {"max": "10"}});
        assert_eq!(
            parse_inputs(&f, &omitted, Ecosystem::Evm, &overrides).unwrap(),
            expected
        );
    }

    #[test]
    fn test_hardcoded_array_member_applies_to_every_element() {
        let orders = FunctionParameter::new("orders", "tuple[]").with_components(vec![
            FunctionParameter::new("maker", "address"),
            FunctionParameter::new("amount", "uint256"),
        ]);
        let f = function(vec![orders], vec![]);
        let mut overrides = FieldOverrides::default();
        hardcode(&mut overrides, "orders[].amount", json!("7"));

        let maker = "0x742D35cc6435C9c1c72C5e7b18bAb7E1DB7A5D6E";
        let submitted = json!({"orders": [{"maker": maker}, {"maker": maker, "amount": "99"}]});
        let parsed = parse_inputs(&f, &submitted, Ecosystem::Evm, &overrides).unwrap();
        let order = CallValue::Tuple(vec![
            CallValue::Address(maker.to_string()),
            CallValue::Uint(U256::from(7u64)),
        ]);
        assert_eq!(parsed, vec![CallValue::Array(vec![order.clone(), order])]);
    }

    #[test]
    fn test_format_rejects_mismatched_scalars() {
        let amount = FunctionParameter::new("amount", "uint256");
        let err = format_value(&amount, &CallValue::String("10".to_string())).unwrap_err();
        assert_eq!(err.0[0].path, "amount");
        assert!(err.0[0].message.contains("an unsigned integer"));

        let signed = FunctionParameter::new("delta", "int64");
        assert!(format_value(&signed, &CallValue::Uint(U256::from(1u64))).is_err());

        let owner = FunctionParameter::new("owner", "address");
        assert!(format_value(&owner, &CallValue::Bytes(vec![0; 20])).is_err());
        assert_eq!(
            format_value(&owner, &CallValue::Address("0xabc".to_string())).unwrap(),
            DisplayValue::Text("0xabc".to_string())
        );
    }

    #[test]
    fn test_format_named_outputs() {
        let f = function(
            vec![],
            vec![
                FunctionParameter::new("reserve0", "uint112"),
                FunctionParameter::new("reserve1", "uint112"),
                FunctionParameter::new("", "uint32"),
            ],
        );
        let shown = format_output(
            &[
                CallValue::Uint(U256::from(10u64)),
                CallValue::Uint(U256::from(20u64)),
                CallValue::Uint(U256::from(3u64)),
            ],
            &f,
        )
        .unwrap();
        assert_eq!(
            shown.to_form_value(),
            json!({"reserve0": "10", "reserve1": "20", "arg2": "3"})
        );

        let err = format_output(&[CallValue::Uint(U256::from(1u64))], &f).unwrap_err();
        assert!(err.0[0].message.contains("expected 3 return values"));
    }

    #[test]
    fn test_format_shape_mismatch_is_field_scoped() {
        let param = FunctionParameter::new("range", "tuple").with_components(vec![
            FunctionParameter::new("min", "uint32"),
            FunctionParameter::new("max", "uint32"),
        ]);
        let err = format_value(&param, &CallValue::Tuple(vec![CallValue::Bool(true)])).unwrap_err();
        assert_eq!(err.0[0].path, "range");
    }

    #[test]
    fn test_round_trip_through_display() {
        let cases = vec![
            (sample_enum(), json!({"tag": "B", "values": ["7", "hello"]})),
            (sample_enum(), json!({"tag": "A"})),
            (
                FunctionParameter::new("limits", "Map<Symbol, U32>"),
                json!([{"key": "daily", "value": "5"}]),
            ),
            (FunctionParameter::new("memo", "Option<String>"), json!("")),
            (FunctionParameter::new("ids", "Vec<U128>"), json!(["1", "340282366920938463463374607431768211455"])),
        ];
        for (param, raw) in cases {
            let parsed = parse_input(&param, &raw, Ecosystem::Stellar).unwrap();
            let shown = format_value(&param, &parsed).unwrap();
            assert_eq!(shown.to_form_value(), raw, "type {}", param.ty);
        }
    }
}
