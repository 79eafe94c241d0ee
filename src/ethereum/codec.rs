//! ABI encoding of [`CallValue`] trees.
//!
//! Encoding is driven by the declared parameter tree rather than by the
//! value, so a value that does not fit its parameter fails with the path of
//! the offending field.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::{keccak256, Address, Bytes, B256},
};

use crate::error::{FieldError, TransformErrors};
use crate::forms::kind::{self, ParamKind};
use crate::forms::mapping::field_name;
use crate::forms::CallValue;
use crate::schema::{ContractFunction, FunctionParameter};

/// Canonical ABI type of a parameter, with tuples expanded.
pub fn canonical_type(param: &FunctionParameter) -> String {
    match param.ty.strip_prefix("tuple") {
        Some(suffix) => {
            let members: Vec<String> = param.components().iter().map(canonical_type).collect();
            format!("({}){}", members.join(","), suffix)
        }
        None => param.ty.clone(),
    }
}

pub fn canonical_signature(name: &str, inputs: &[FunctionParameter]) -> String {
    let types: Vec<String> = inputs.iter().map(canonical_type).collect();
    format!("{}({})", name, types.join(","))
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn sol_type(param: &FunctionParameter) -> Result<DynSolType, String> {
    let ty = canonical_type(param);
    DynSolType::parse(&ty).map_err(|e| format!("unsupported ABI type '{}': {}", ty, e))
}

/// Encodes a full call: selector followed by the ABI-encoded arguments.
pub fn encode_call(
    function: &ContractFunction,
    values: &[CallValue],
) -> Result<Bytes, TransformErrors> {
    if values.len() != function.inputs.len() {
        return Err(TransformErrors::single(
            function.name.clone(),
            format!(
                "expected {} arguments, got {}",
                function.inputs.len(),
                values.len()
            ),
        ));
    }

    let mut errors = TransformErrors::default();
    let mut encoded = Vec::with_capacity(values.len());
    for (i, (param, value)) in function.inputs.iter().zip(values).enumerate() {
        if let Some(v) = to_dyn(param, value, &field_name(param, i), &mut errors) {
            encoded.push(v);
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let signature = canonical_signature(&function.name, &function.inputs);
    let mut data = selector(&signature).to_vec();
    data.extend(DynSolValue::Tuple(encoded).abi_encode_params());
    Ok(data.into())
}

/// Decodes return data against the function's declared outputs.
pub fn decode_output(
    function: &ContractFunction,
    data: &[u8],
) -> Result<Vec<CallValue>, TransformErrors> {
    if function.outputs.is_empty() {
        return Ok(Vec::new());
    }

    let mut types = Vec::with_capacity(function.outputs.len());
    for (i, param) in function.outputs.iter().enumerate() {
        match sol_type(param) {
            Ok(ty) => types.push(ty),
            Err(e) => return Err(TransformErrors::single(field_name(param, i), e)),
        }
    }

    let decoded = DynSolType::Tuple(types)
        .abi_decode_params(data)
        .map_err(|e| {
            TransformErrors::single(
                function.name.clone(),
                format!("failed to decode return data: {}", e),
            )
        })?;

    let items = match decoded {
        DynSolValue::Tuple(items) => items,
        single => vec![single],
    };

    let mut errors = TransformErrors::default();
    let mut values = Vec::with_capacity(items.len());
    for (i, (param, item)) in function.outputs.iter().zip(items).enumerate() {
        if let Some(v) = from_dyn(param, item, &field_name(param, i), &mut errors) {
            values.push(v);
        }
    }
    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

fn to_dyn(
    param: &FunctionParameter,
    value: &CallValue,
    path: &str,
    errors: &mut TransformErrors,
) -> Option<DynSolValue> {
    match (kind::classify(&param.ty), value) {
        (_, CallValue::Absent | CallValue::Map(_) | CallValue::Enum { .. }) => fail(
            errors,
            path,
            format!("value {} cannot be ABI encoded as '{}'", value.to_json(), param.ty),
        ),
        (ParamKind::Array { len, .. }, CallValue::Array(items)) => {
            if let Some(len) = len {
                if items.len() != len {
                    return fail(
                        errors,
                        path,
                        format!("expected {} elements, got {}", len, items.len()),
                    );
                }
            }
            let element = kind::array_element(param);
            let mut out = Vec::with_capacity(items.len());
            let mut ok = true;
            for (i, item) in items.iter().enumerate() {
                match to_dyn(&element, item, &format!("{}[{}]", path, i), errors) {
                    Some(v) => out.push(v),
                    None => ok = false,
                }
            }
            if !ok {
                return None;
            }
            Some(match len {
                Some(_) => DynSolValue::FixedArray(out),
                None => DynSolValue::Array(out),
            })
        }
        (ParamKind::Tuple, CallValue::Tuple(items)) => {
            let components = param.components();
            if components.len() != items.len() {
                return fail(
                    errors,
                    path,
                    format!("expected {} members, got {}", components.len(), items.len()),
                );
            }
            let mut out = Vec::with_capacity(items.len());
            let mut ok = true;
            for (i, (member, item)) in components.iter().zip(items).enumerate() {
                let member_path = format!("{}.{}", path, field_name(member, i));
                match to_dyn(member, item, &member_path, errors) {
                    Some(v) => out.push(v),
                    None => ok = false,
                }
            }
            ok.then_some(DynSolValue::Tuple(out))
        }
        (ParamKind::Primitive(ty), primitive) => match primitive_to_dyn(&ty, primitive) {
            Ok(v) => Some(v),
            Err(e) => fail(errors, path, e),
        },
        (_, other) => fail(
            errors,
            path,
            format!("value {} does not match type '{}'", other.to_json(), param.ty),
        ),
    }
}

fn fail<T>(errors: &mut TransformErrors, path: &str, message: String) -> Option<T> {
    errors.0.push(FieldError::new(path, message));
    None
}

fn primitive_to_dyn(ty: &str, value: &CallValue) -> Result<DynSolValue, String> {
    let mismatch = || format!("value {} does not match type '{}'", value.to_json(), ty);
    match value {
        CallValue::Bool(b) if ty == "bool" => Ok(DynSolValue::Bool(*b)),
        CallValue::Uint(n) => match kind::integer_bits(ty) {
            Some((false, bits)) => Ok(DynSolValue::Uint(*n, bits)),
            _ => Err(mismatch()),
        },
        CallValue::Int(n) => match kind::integer_bits(ty) {
            Some((true, bits)) => Ok(DynSolValue::Int(*n, bits)),
            _ => Err(mismatch()),
        },
        CallValue::Address(a) if ty == "address" => a
            .parse::<Address>()
            .map(DynSolValue::Address)
            .map_err(|e| format!("invalid address '{}': {}", a, e)),
        CallValue::Bytes(b) => match kind::fixed_bytes_len(ty) {
            Some(n) if b.len() == n => {
                let mut word = [0u8; 32];
                word[..n].copy_from_slice(b);
                Ok(DynSolValue::FixedBytes(B256::from(word), n))
            }
            Some(n) => Err(format!("expected {} bytes, got {}", n, b.len())),
            None if kind::is_dynamic_bytes(ty) => Ok(DynSolValue::Bytes(b.clone())),
            None => Err(mismatch()),
        },
        CallValue::String(s) if ty == "string" => Ok(DynSolValue::String(s.clone())),
        _ => Err(mismatch()),
    }
}

fn from_dyn(
    param: &FunctionParameter,
    value: DynSolValue,
    path: &str,
    errors: &mut TransformErrors,
) -> Option<CallValue> {
    match value {
        DynSolValue::Bool(b) => Some(CallValue::Bool(b)),
        DynSolValue::Uint(n, _) => Some(CallValue::Uint(n)),
        DynSolValue::Int(n, _) => Some(CallValue::Int(n)),
        DynSolValue::Address(a) => Some(CallValue::Address(a.to_checksum(None))),
        DynSolValue::FixedBytes(word, n) => Some(CallValue::Bytes(word[..n].to_vec())),
        DynSolValue::Bytes(b) => Some(CallValue::Bytes(b)),
        DynSolValue::String(s) => Some(CallValue::String(s)),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            let element = kind::array_element(param);
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(from_dyn(&element, item, &format!("{}[{}]", path, i), errors)?);
            }
            Some(CallValue::Array(out))
        }
        DynSolValue::Tuple(items) => {
            let components = param.components();
            if components.len() != items.len() {
                return fail(
                    errors,
                    path,
                    format!("expected {} members, got {}", components.len(), items.len()),
                );
            }
            let mut out = Vec::with_capacity(items.len());
            for (i, (member, item)) in components.iter().zip(items).enumerate() {
                let member_path = format!("{}.{}", path, field_name(member, i));
                out.push(from_dyn(member, item, &member_path, errors)?);
            }
            Some(CallValue::Tuple(out))
        }
        other => fail(errors, path, format!("unsupported return value {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StateMutability;
    use alloy::primitives::U256;

    fn function(
        name: &str,
        inputs: Vec<FunctionParameter>,
        outputs: Vec<FunctionParameter>,
    ) -> ContractFunction {
        ContractFunction {
            id: canonical_signature(name, &inputs),
            name: name.to_string(),
            display_name: name.to_string(),
            inputs,
            outputs,
            state_mutability: StateMutability::Nonpayable,
            modifies_state: true,
            description: None,
        }
    }

    #[test]
    fn test_transfer_selector() {
        let transfer = function(
            "transfer",
            vec![
                FunctionParameter::new("to", "address"),
                FunctionParameter::new("amount", "uint256"),
            ],
            vec![],
        );
        assert_eq!(transfer.id, "transfer(address,uint256)");
        assert_eq!(hex::encode(selector(&transfer.id)), "a9059cbb");

        let data = encode_call(
            &transfer,
            &[
                CallValue::Address("0x742D35cc6435C9c1c72C5e7b18bAb7E1DB7A5D6E".to_string()),
                CallValue::Uint(U256::from(1000u64)),
            ],
        )
        .unwrap();
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data[data.len() - 1], 0xe8);
    }

    #[test]
    fn test_tuple_signature() {
        let order = FunctionParameter::new("order", "tuple[]").with_components(vec![
            FunctionParameter::new("maker", "address"),
            FunctionParameter::new("amounts", "uint256[2]"),
        ]);
        assert_eq!(
            canonical_signature("fill", &[order]),
            "fill((address,uint256[2])[])"
        );
    }

    #[test]
    fn test_encode_errors_are_field_scoped() {
        let f = function(
            "set",
            vec![
                FunctionParameter::new("flag", "bool"),
                FunctionParameter::new("key", "bytes32"),
            ],
            vec![],
        );
        let err = encode_call(
            &f,
            &[
                CallValue::Enum {
                    tag: "A".to_string(),
                    values: vec![],
                },
                CallValue::Bytes(vec![1, 2, 3]),
            ],
        )
        .unwrap_err();
        assert!(err.for_path("flag").is_some());
        assert!(err.for_path("key").unwrap().message.contains("32 bytes"));
    }

    #[test]
    fn test_decode_named_tuple_output() {
        let f = function(
            "position",
            vec![],
            vec![
                FunctionParameter::new("owner", "address"),
                FunctionParameter::new("info", "tuple").with_components(vec![
                    FunctionParameter::new("size", "uint128"),
                    FunctionParameter::new("tag", "bytes4"),
                ]),
            ],
        );
        let raw = DynSolValue::Tuple(vec![
            DynSolValue::Address(Address::repeat_byte(0x11)),
            DynSolValue::Tuple(vec![
                DynSolValue::Uint(U256::from(7u64), 128),
                DynSolValue::FixedBytes(B256::ZERO, 4),
            ]),
        ])
        .abi_encode_params();

        let values = decode_output(&f, &raw).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(
            values[0],
            CallValue::Address(Address::repeat_byte(0x11).to_checksum(None))
        );
        assert_eq!(
            values[1],
            CallValue::Tuple(vec![
                CallValue::Uint(U256::from(7u64)),
                CallValue::Bytes(vec![0, 0, 0, 0]),
            ])
        );
    }

    #[test]
    fn test_form_values_survive_encode_and_decode() {
        use crate::forms::{format_output, parse_inputs, FieldOverrides};
        use crate::schema::Ecosystem;
        use serde_json::json;

        let params = vec![
            FunctionParameter::new("amount", "uint256"),
            FunctionParameter::new("order", "tuple").with_components(vec![
                FunctionParameter::new("maker", "address"),
                FunctionParameter::new("terms", "tuple").with_components(vec![
                    FunctionParameter::new("deadline", "uint64"),
                    FunctionParameter::new("delta", "int128"),
                ]),
            ]),
            FunctionParameter::new("key", "bytes32"),
            FunctionParameter::new("recipients", "address[]"),
        ];
        let echo = function("echo", params.clone(), params);

        let maker = "0x742D35cc6435C9c1c72C5e7b18bAb7E1DB7A5D6E";
        let other = Address::repeat_byte(0x11).to_checksum(None);
        let form = json!({
            "amount": "115792089237316195423570985008687907853269984665640564039457584007913129639935",
            "order": {
                "maker": maker,
                "terms": {"deadline": "9007199254740993", "delta": "-42"}
            },
            "key": format!("0x{}", "ab".repeat(32)),
            "recipients": [maker, other]
        });

        let args = parse_inputs(&echo, &form, Ecosystem::Evm, &FieldOverrides::default()).unwrap();
        let data = encode_call(&echo, &args).unwrap();
        assert_eq!(&data[..4], &selector(&echo.id));

        let decoded = decode_output(&echo, &data[4..]).unwrap();
        assert_eq!(decoded, args);
        let shown = format_output(&decoded, &echo).unwrap();
        assert_eq!(shown.to_form_value(), form);
    }

    #[test]
    fn test_decode_rejects_short_data() {
        let f = function(
            "balanceOf",
            vec![FunctionParameter::new("owner", "address")],
            vec![FunctionParameter::new("", "uint256")],
        );
        assert!(decode_output(&f, &[0u8; 3]).is_err());
    }
}
