//! Structural classification of parameter type strings.
//!
//! Both EVM ABI syntax (`uint256[]`, `tuple[3]`) and Soroban spec syntax
//! (`Vec<U32>`, `Map<Symbol, I128>`, `Option<Address>`) are recognised.

use crate::schema::FunctionParameter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Primitive(String),
    Tuple,
    Array { element: String, len: Option<usize> },
    Map { key: String, value: String },
    Enum,
    Optional(String),
}

pub fn classify(ty: &str) -> ParamKind {
    let ty = ty.trim();

    if ty.ends_with(']') {
        if let Some(open) = ty.rfind('[') {
            let element = ty[..open].trim().to_string();
            let size = ty[open + 1..ty.len() - 1].trim();
            let len = if size.is_empty() {
                None
            } else {
                match size.parse::<usize>() {
                    Ok(n) => Some(n),
                    Err(_) => return ParamKind::Primitive(ty.to_string()),
                }
            };
            if !element.is_empty() {
                return ParamKind::Array { element, len };
            }
        }
    }

    if let Some(inner) = generic_args(ty, "Vec") {
        return ParamKind::Array {
            element: inner.trim().to_string(),
            len: None,
        };
    }

    if let Some(inner) = generic_args(ty, "Option") {
        return ParamKind::Optional(inner.trim().to_string());
    }

    if let Some(inner) = generic_args(ty, "Map") {
        let parts = split_top_level(inner);
        if parts.len() == 2 {
            return ParamKind::Map {
                key: parts[0].trim().to_string(),
                value: parts[1].trim().to_string(),
            };
        }
        return ParamKind::Primitive(ty.to_string());
    }

    match ty {
        "tuple" | "struct" | "Tuple" | "Struct" => ParamKind::Tuple,
        "enum" | "Enum" => ParamKind::Enum,
        _ if ty.starts_with('(') && ty.ends_with(')') => ParamKind::Tuple,
        _ => ParamKind::Primitive(ty.to_string()),
    }
}

/// Returns the text between `Name<` and the matching closing `>`.
fn generic_args<'a>(ty: &'a str, name: &str) -> Option<&'a str> {
    let rest = ty.strip_prefix(name)?.trim_start();
    let rest = rest.strip_prefix('<')?;
    let inner = rest.strip_suffix('>')?;
    Some(inner)
}

/// Splits on commas that are not nested inside `<>` or `()`.
pub fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' | '(' => depth += 1,
            '>' | ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !s[start..].trim().is_empty() || !parts.is_empty() {
        parts.push(&s[start..]);
    }
    parts
}

pub fn is_composite(ty: &str) -> bool {
    !matches!(classify(ty), ParamKind::Primitive(_))
}

/// Parameter describing one element of an array parameter.
pub fn array_element(param: &FunctionParameter) -> FunctionParameter {
    let element = match classify(&param.ty) {
        ParamKind::Array { element, .. } => element,
        _ => param.ty.clone(),
    };
    FunctionParameter {
        name: String::new(),
        ty: element,
        display_name: None,
        description: None,
        components: param.components.clone(),
        discriminant: None,
    }
}

/// Key and value parameters of a map. Explicit `key`/`value` components win
/// over the type string so composite keys and values keep their members.
pub fn map_entry(param: &FunctionParameter) -> (FunctionParameter, FunctionParameter) {
    let (key_ty, value_ty) = match classify(&param.ty) {
        ParamKind::Map { key, value } => (key, value),
        _ => ("string".to_string(), "string".to_string()),
    };
    let components = param.components();
    let key = components
        .iter()
        .find(|c| c.name == "key")
        .cloned()
        .unwrap_or_else(|| FunctionParameter::new("key", key_ty));
    let value = components
        .iter()
        .find(|c| c.name == "value")
        .cloned()
        .unwrap_or_else(|| FunctionParameter::new("value", value_ty));
    (key, value)
}

pub fn optional_inner(param: &FunctionParameter) -> FunctionParameter {
    let inner = match classify(&param.ty) {
        ParamKind::Optional(inner) => inner,
        _ => param.ty.clone(),
    };
    FunctionParameter {
        name: param.name.clone(),
        ty: inner,
        display_name: param.display_name.clone(),
        description: param.description.clone(),
        components: param.components.clone(),
        discriminant: None,
    }
}

/// Signedness and width of an integer type, e.g. `uint64` -> `(false, 64)`.
pub fn integer_bits(ty: &str) -> Option<(bool, usize)> {
    match ty {
        "uint" => return Some((false, 256)),
        "int" => return Some((true, 256)),
        "Timepoint" | "Duration" => return Some((false, 64)),
        _ => {}
    }
    let (signed, digits) = if let Some(rest) = ty.strip_prefix("uint") {
        (false, rest)
    } else if let Some(rest) = ty.strip_prefix("int") {
        (true, rest)
    } else if let Some(rest) = ty.strip_prefix('U').or_else(|| ty.strip_prefix('u')) {
        (false, rest)
    } else if let Some(rest) = ty.strip_prefix('I').or_else(|| ty.strip_prefix('i')) {
        (true, rest)
    } else {
        return None;
    };
    let bits: usize = digits.parse().ok()?;
    if bits == 0 || bits > 256 || bits % 8 != 0 {
        return None;
    }
    Some((signed, bits))
}

/// Byte length of a fixed-size bytes type (`bytes32`, `BytesN<32>`).
pub fn fixed_bytes_len(ty: &str) -> Option<usize> {
    if let Some(n) = ty.strip_prefix("bytes") {
        let len: usize = n.parse().ok()?;
        return (1..=32).contains(&len).then_some(len);
    }
    if let Some(inner) = generic_args(ty, "BytesN") {
        return inner.trim().parse().ok();
    }
    None
}

pub fn is_dynamic_bytes(ty: &str) -> bool {
    matches!(ty, "bytes" | "Bytes")
}
