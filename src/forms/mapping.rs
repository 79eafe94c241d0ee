//! Parameter type → field descriptor mapping.
//!
//! Mapping never fails: type strings missing from the ecosystem's table fall
//! back to a text field so partially understood contracts stay usable.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use super::field::{
    EnumMetadata, EnumVariant, FieldDescriptor, FieldType, FieldValidation, VariantKind,
};
use super::kind::{self, ParamKind};
use crate::error::AdapterError;
use crate::schema::{ContractFunction, Ecosystem, FunctionParameter};

const EVM_ADDRESS_PATTERN: &str = "^0x[a-fA-F0-9]{40}$";
const STELLAR_ADDRESS_PATTERN: &str = "^[GC][A-Z2-7]{55}$";
const UNSIGNED_INTEGER_PATTERN: &str = "^(0x[0-9a-fA-F]+|[0-9]+)$";
const SIGNED_INTEGER_PATTERN: &str = "^-?[0-9]+$";
const HEX_BYTES_PATTERN: &str = "^0x([0-9a-fA-F]{2})*$";

/// Widest integer a plain number field may carry without precision loss.
const NARROW_INTEGER_BITS: usize = 32;

/// User customizations for one field, keyed by field id in [`FieldOverrides`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOverride {
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub hardcoded_value: Option<serde_json::Value>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub field_type: Option<FieldType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldOverrides(pub HashMap<String, FieldOverride>);

impl FieldOverrides {
    pub fn get(&self, id: &str) -> Option<&FieldOverride> {
        self.0.get(id)
    }

    pub fn hardcoded(&self, id: &str) -> Option<&serde_json::Value> {
        self.0.get(id).and_then(|o| o.hardcoded_value.as_ref())
    }
}

/// Static lookup from a primitive type string to its field type.
pub fn primitive_field_type(ty: &str, ecosystem: Ecosystem) -> Option<FieldType> {
    if let Some((_, bits)) = kind::integer_bits(ty) {
        return Some(if bits <= NARROW_INTEGER_BITS {
            FieldType::Number
        } else {
            FieldType::Bigint
        });
    }
    if kind::fixed_bytes_len(ty).is_some() || kind::is_dynamic_bytes(ty) {
        return Some(FieldType::Bytes);
    }
    let field_type = match ecosystem {
        Ecosystem::Evm => match ty {
            "address" | "address payable" => FieldType::Address,
            "bool" => FieldType::Boolean,
            "string" => FieldType::Text,
            "function" => FieldType::Bytes,
            _ => return None,
        },
        Ecosystem::Stellar => match ty {
            "Address" => FieldType::Address,
            "Bool" | "bool" => FieldType::Boolean,
            "String" | "Symbol" => FieldType::Text,
            _ => return None,
        },
        Ecosystem::Solana | Ecosystem::Midnight => match ty {
            "bool" | "Bool" => FieldType::Boolean,
            "string" | "String" => FieldType::Text,
            "publicKey" | "pubkey" | "Address" | "address" => FieldType::Address,
            _ => return None,
        },
    };
    Some(field_type)
}

/// Field types a user may switch a parameter's field to.
pub fn compatible_field_types(ty: &str, ecosystem: Ecosystem) -> Vec<FieldType> {
    match classify_field_type(ty, ecosystem) {
        Some(FieldType::Number) => vec![FieldType::Number, FieldType::Amount, FieldType::Text],
        Some(FieldType::Bigint) => vec![
            FieldType::Bigint,
            FieldType::Number,
            FieldType::Amount,
            FieldType::Text,
        ],
        Some(FieldType::Address) => vec![FieldType::Address, FieldType::Text],
        Some(FieldType::Boolean) => vec![FieldType::Boolean, FieldType::Select, FieldType::Radio],
        Some(FieldType::Text) => vec![FieldType::Text, FieldType::Textarea, FieldType::Url],
        Some(FieldType::Bytes) => vec![FieldType::Bytes, FieldType::Textarea, FieldType::Text],
        Some(other) => vec![other],
        None => vec![FieldType::Text, FieldType::Textarea],
    }
}

fn classify_field_type(ty: &str, ecosystem: Ecosystem) -> Option<FieldType> {
    match kind::classify(ty) {
        ParamKind::Primitive(p) => primitive_field_type(&p, ecosystem),
        ParamKind::Tuple => Some(FieldType::Object),
        ParamKind::Array { element, .. } => Some(if kind::is_composite(&element) {
            FieldType::ArrayObject
        } else {
            FieldType::Array
        }),
        ParamKind::Map { .. } => Some(FieldType::Map),
        ParamKind::Enum => Some(FieldType::Enum),
        ParamKind::Optional(inner) => classify_field_type(&inner, ecosystem),
    }
}

/// Field name for a parameter, falling back to `arg{index}` when unnamed.
pub fn field_name(param: &FunctionParameter, index: usize) -> String {
    if param.name.trim().is_empty() {
        format!("arg{}", index)
    } else {
        param.name.clone()
    }
}

/// Human label from an identifier: `amountIn` -> `Amount In`.
pub fn humanize(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .into_iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn map_parameter(param: &FunctionParameter, ecosystem: Ecosystem) -> FieldDescriptor {
    let name = field_name(param, 0);
    map_at(param, ecosystem, &name, &name, true)
}

/// Maps every input of `function`, then applies user overrides.
pub fn map_function(
    function: &ContractFunction,
    ecosystem: Ecosystem,
    overrides: &FieldOverrides,
) -> Vec<FieldDescriptor> {
    function
        .inputs
        .iter()
        .enumerate()
        .map(|(index, param)| {
            let name = field_name(param, index);
            let mut field = map_at(param, ecosystem, &name, &name, true);
            apply_overrides(&mut field, ecosystem, overrides);
            field
        })
        .collect()
}

fn map_at(
    param: &FunctionParameter,
    ecosystem: Ecosystem,
    id: &str,
    name: &str,
    required: bool,
) -> FieldDescriptor {
    let label = param
        .display_name
        .clone()
        .unwrap_or_else(|| humanize(name));
    let mut field = FieldDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        label,
        field_type: FieldType::Text,
        validation: FieldValidation {
            required,
            ..Default::default()
        },
        components: None,
        element_type: None,
        element_field_config: None,
        key_field_config: None,
        value_field_config: None,
        enum_metadata: None,
        original_parameter_type: param.ty.clone(),
        helper_text: param.description.clone(),
        placeholder: None,
        is_hidden: false,
        is_hardcoded: false,
        hardcoded_value: None,
    };

    match kind::classify(&param.ty) {
        ParamKind::Primitive(ty) => map_primitive(&mut field, &ty, ecosystem),
        ParamKind::Tuple => {
            field.field_type = FieldType::Object;
            field.components = Some(
                param
                    .components()
                    .iter()
                    .enumerate()
                    .map(|(i, member)| {
                        let member_name = field_name(member, i);
                        map_at(
                            member,
                            ecosystem,
                            &format!("{}.{}", id, member_name),
                            &member_name,
                            true,
                        )
                    })
                    .collect(),
            );
        }
        ParamKind::Array { element, len } => {
            let element_param = kind::array_element(param);
            let element_field = map_at(
                &element_param,
                ecosystem,
                &format!("{}[]", id),
                &format!("{}_element", name),
                true,
            );
            if kind::is_composite(&element) {
                field.field_type = FieldType::ArrayObject;
            } else {
                field.field_type = FieldType::Array;
                field.element_type = Some(element_field.field_type);
            }
            if let Some(len) = len {
                field.validation.min = Some(len.to_string());
                field.validation.max = Some(len.to_string());
            }
            field.element_field_config = Some(Box::new(element_field));
        }
        ParamKind::Map { .. } => {
            field.field_type = FieldType::Map;
            let (key, value) = kind::map_entry(param);
            field.key_field_config = Some(Box::new(map_at(
                &key,
                ecosystem,
                &format!("{}.key", id),
                "key",
                true,
            )));
            field.value_field_config = Some(Box::new(map_at(
                &value,
                ecosystem,
                &format!("{}.value", id),
                "value",
                true,
            )));
        }
        ParamKind::Enum => {
            field.field_type = FieldType::Enum;
            field.enum_metadata = Some(enum_metadata(param, ecosystem, id, name));
        }
        ParamKind::Optional(_) => {
            let inner = kind::optional_inner(param);
            let mut inner_field = map_at(&inner, ecosystem, id, name, false);
            inner_field.original_parameter_type = param.ty.clone();
            return inner_field;
        }
    }
    field
}

fn map_primitive(field: &mut FieldDescriptor, ty: &str, ecosystem: Ecosystem) {
    let Some(field_type) = primitive_field_type(ty, ecosystem) else {
        warn!(
            "{}; falling back to a text field",
            AdapterError::UnsupportedParameterType(ty.to_string())
        );
        field.field_type = FieldType::Text;
        return;
    };
    field.field_type = field_type;

    match field_type {
        FieldType::Number | FieldType::Bigint => {
            if let Some((signed, bits)) = kind::integer_bits(ty) {
                let (min, max) = integer_bounds(signed, bits);
                field.validation.min = Some(min);
                field.validation.max = Some(max);
                if field_type == FieldType::Bigint {
                    field.validation.pattern = Some(
                        if signed {
                            SIGNED_INTEGER_PATTERN
                        } else {
                            UNSIGNED_INTEGER_PATTERN
                        }
                        .to_string(),
                    );
                    field.placeholder = Some("0".to_string());
                }
            }
        }
        FieldType::Address => {
            let pattern = match ecosystem {
                Ecosystem::Stellar => STELLAR_ADDRESS_PATTERN,
                _ => EVM_ADDRESS_PATTERN,
            };
            field.validation.pattern = Some(pattern.to_string());
            field.placeholder = Some(match ecosystem {
                Ecosystem::Stellar => "G...".to_string(),
                _ => "0x...".to_string(),
            });
        }
        FieldType::Bytes => match kind::fixed_bytes_len(ty) {
            Some(len) => {
                field.validation.max_length = Some(2 + 2 * len);
                field.validation.pattern = Some(format!("^0x[0-9a-fA-F]{{{}}}$", 2 * len));
                field.placeholder = Some(format!("0x{}", "00".repeat(len.min(4))));
            }
            None => {
                field.validation.pattern = Some(HEX_BYTES_PATTERN.to_string());
                field.placeholder = Some("0x".to_string());
            }
        },
        _ => {}
    }
}

/// Inclusive decimal bounds for an integer of the given width.
fn integer_bounds(signed: bool, bits: usize) -> (String, String) {
    if signed {
        let magnitude = U256::from(1u8) << (bits - 1);
        let max = magnitude - U256::from(1u8);
        (format!("-{}", magnitude), max.to_string())
    } else {
        let max = if bits >= 256 {
            U256::MAX
        } else {
            (U256::from(1u8) << bits) - U256::from(1u8)
        };
        ("0".to_string(), max.to_string())
    }
}

fn enum_metadata(
    param: &FunctionParameter,
    ecosystem: Ecosystem,
    id: &str,
    name: &str,
) -> EnumMetadata {
    let variants: Vec<EnumVariant> = param
        .components()
        .iter()
        .map(|variant| {
            let variant_id = format!("{}.{}", id, variant.name);
            match variant_kind(variant) {
                VariantKind::Void => EnumVariant {
                    name: variant.name.clone(),
                    kind: VariantKind::Void,
                    value: None,
                    payload_types: Vec::new(),
                    payload_components: Vec::new(),
                },
                VariantKind::Integer => EnumVariant {
                    name: variant.name.clone(),
                    kind: VariantKind::Integer,
                    value: variant.discriminant,
                    payload_types: Vec::new(),
                    payload_components: Vec::new(),
                },
                VariantKind::Tuple => {
                    let payload = variant_payload(variant);
                    EnumVariant {
                        name: variant.name.clone(),
                        kind: VariantKind::Tuple,
                        value: None,
                        payload_types: payload.iter().map(|p| p.ty.clone()).collect(),
                        payload_components: payload
                            .iter()
                            .enumerate()
                            .map(|(i, p)| {
                                map_at(
                                    p,
                                    ecosystem,
                                    &format!("{}.{}", variant_id, i),
                                    &field_name(p, i),
                                    true,
                                )
                            })
                            .collect(),
                    }
                }
            }
        })
        .collect();
    let is_unit_only = variants.iter().all(|v| v.kind != VariantKind::Tuple);
    EnumMetadata {
        name: param.display_name.clone().unwrap_or_else(|| name.to_string()),
        variants,
        is_unit_only,
    }
}

pub fn variant_kind(variant: &FunctionParameter) -> VariantKind {
    let ty = variant.ty.trim();
    if ty.is_empty() || ty == "void" || ty == "()" {
        VariantKind::Void
    } else if variant.discriminant.is_some() {
        VariantKind::Integer
    } else {
        VariantKind::Tuple
    }
}

/// Ordered payload types of a tuple variant. A non-tuple type is a
/// single-element payload.
pub fn variant_payload(variant: &FunctionParameter) -> Vec<FunctionParameter> {
    match kind::classify(&variant.ty) {
        ParamKind::Tuple => variant.components().to_vec(),
        _ => vec![FunctionParameter {
            name: String::new(),
            ty: variant.ty.clone(),
            display_name: None,
            description: None,
            components: variant.components.clone(),
            discriminant: None,
        }],
    }
}

fn apply_overrides(field: &mut FieldDescriptor, ecosystem: Ecosystem, overrides: &FieldOverrides) {
    if let Some(o) = overrides.get(&field.id) {
        field.is_hidden = o.hidden;
        if let Some(label) = &o.label {
            field.label = label.clone();
        }
        if let Some(value) = &o.hardcoded_value {
            field.is_hardcoded = true;
            field.hardcoded_value = Some(value.clone());
        }
        if let Some(requested) = o.field_type {
            let allowed = compatible_field_types(&field.original_parameter_type, ecosystem);
            if allowed.contains(&requested) {
                field.field_type = requested;
            } else {
                warn!(
                    "Ignoring field type override {:?} for '{}' ({}): not compatible",
                    requested, field.id, field.original_parameter_type
                );
            }
        }
    }

    if let Some(components) = field.components.as_mut() {
        for child in components {
            apply_overrides(child, ecosystem, overrides);
        }
    }
    for child in [
        field.element_field_config.as_deref_mut(),
        field.key_field_config.as_deref_mut(),
        field.value_field_config.as_deref_mut(),
    ]
    .into_iter()
    .flatten()
    {
        apply_overrides(child, ecosystem, overrides);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StateMutability;

    fn evm(param: &FunctionParameter) -> FieldDescriptor {
        map_parameter(param, Ecosystem::Evm)
    }

    #[test]
    fn test_primitive_table() {
        assert_eq!(evm(&FunctionParameter::new("to", "address")).field_type, FieldType::Address);
        assert_eq!(evm(&FunctionParameter::new("ok", "bool")).field_type, FieldType::Boolean);
        assert_eq!(evm(&FunctionParameter::new("s", "string")).field_type, FieldType::Text);
        assert_eq!(evm(&FunctionParameter::new("b", "bytes")).field_type, FieldType::Bytes);
        assert_eq!(evm(&FunctionParameter::new("h", "bytes32")).field_type, FieldType::Bytes);
        assert_eq!(evm(&FunctionParameter::new("n", "uint8")).field_type, FieldType::Number);
        assert_eq!(evm(&FunctionParameter::new("n", "int32")).field_type, FieldType::Number);
    }

    #[test]
    fn test_wide_integers_are_string_backed() {
        let field = evm(&FunctionParameter::new("amount", "uint256"));
        assert_eq!(field.field_type, FieldType::Bigint);
        assert_eq!(field.original_parameter_type, "uint256");
        assert_eq!(field.validation.pattern.as_deref(), Some(UNSIGNED_INTEGER_PATTERN));
        assert_eq!(field.validation.min.as_deref(), Some("0"));
        assert_eq!(
            field.validation.max.as_deref(),
            Some("115792089237316195423570985008687907853269984665640564039457584007913129639935")
        );

        let signed = evm(&FunctionParameter::new("delta", "int64"));
        assert_eq!(signed.field_type, FieldType::Bigint);
        assert_eq!(signed.validation.min.as_deref(), Some("-9223372036854775808"));
        assert_eq!(signed.validation.max.as_deref(), Some("9223372036854775807"));
    }

    #[test]
    fn test_narrow_integer_bounds() {
        let field = evm(&FunctionParameter::new("decimals", "uint8"));
        assert_eq!(field.validation.min.as_deref(), Some("0"));
        assert_eq!(field.validation.max.as_deref(), Some("255"));
        assert_eq!(field.label, "Decimals");
    }

    #[test]
    fn test_unknown_type_falls_back_to_text() {
        let field = evm(&FunctionParameter::new("x", "fixed128x18"));
        assert_eq!(field.field_type, FieldType::Text);
        assert_eq!(field.original_parameter_type, "fixed128x18");

        let stellar = map_parameter(&FunctionParameter::new("x", "Weird<Thing>"), Ecosystem::Stellar);
        assert_eq!(stellar.field_type, FieldType::Text);
    }

    #[test]
    fn test_tuple_maps_each_member() {
        let param = FunctionParameter::new("range", "tuple").with_components(vec![
            FunctionParameter::new("min", "uint32"),
            FunctionParameter::new("max", "uint32"),
        ]);
        let field = evm(&param);
        assert_eq!(field.field_type, FieldType::Object);
        let components = field.components.as_ref().unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].id, "range.min");
        assert_eq!(components[1].name, "max");
        assert_eq!(components[1].field_type, FieldType::Number);
    }

    #[test]
    fn test_arrays() {
        let field = evm(&FunctionParameter::new("recipients", "address[]"));
        assert_eq!(field.field_type, FieldType::Array);
        assert_eq!(field.element_type, Some(FieldType::Address));

        let fixed = evm(&FunctionParameter::new("pair", "uint256[2]"));
        assert_eq!(fixed.validation.min.as_deref(), Some("2"));
        assert_eq!(fixed.validation.max.as_deref(), Some("2"));

        let orders = FunctionParameter::new("orders", "tuple[]").with_components(vec![
            FunctionParameter::new("maker", "address"),
            FunctionParameter::new("amount", "uint256"),
        ]);
        let field = evm(&orders);
        assert_eq!(field.field_type, FieldType::ArrayObject);
        assert!(field.element_type.is_none());
        let element = field.element_field_config.as_ref().unwrap();
        assert_eq!(element.field_type, FieldType::Object);
        assert_eq!(element.components.as_ref().unwrap()[1].id, "orders[].amount");
    }

    #[test]
    fn test_map_exposes_key_and_value() {
        let field = map_parameter(
            &FunctionParameter::new("balances", "Map<Address, I128>"),
            Ecosystem::Stellar,
        );
        assert_eq!(field.field_type, FieldType::Map);
        assert_eq!(field.key_field_config.as_ref().unwrap().field_type, FieldType::Address);
        assert_eq!(field.value_field_config.as_ref().unwrap().field_type, FieldType::Bigint);
    }

    #[test]
    fn test_enum_metadata() {
        let param = FunctionParameter::new("action", "enum").with_components(vec![
            FunctionParameter::new("None", "void"),
            FunctionParameter::new("Level", "U32").with_discriminant(7),
            FunctionParameter::new("Transfer", "tuple").with_components(vec![
                FunctionParameter::new("", "Address"),
                FunctionParameter::new("", "I128"),
            ]),
        ]);
        let field = map_parameter(&param, Ecosystem::Stellar);
        assert_eq!(field.field_type, FieldType::Enum);
        let meta = field.enum_metadata.as_ref().unwrap();
        assert!(!meta.is_unit_only);
        assert_eq!(meta.variants[0].kind, VariantKind::Void);
        assert_eq!(meta.variants[1].kind, VariantKind::Integer);
        assert_eq!(meta.variants[1].value, Some(7));
        let transfer = meta.variant("Transfer").unwrap();
        assert_eq!(transfer.payload_types, vec!["Address", "I128"]);
        assert_eq!(transfer.payload_components[1].field_type, FieldType::Bigint);
    }

    #[test]
    fn test_optional_is_not_required() {
        let field = map_parameter(&FunctionParameter::new("memo", "Option<String>"), Ecosystem::Stellar);
        assert_eq!(field.field_type, FieldType::Text);
        assert!(!field.validation.required);
        assert_eq!(field.original_parameter_type, "Option<String>");
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let param = FunctionParameter::new("orders", "tuple[]").with_components(vec![
            FunctionParameter::new("maker", "address"),
            FunctionParameter::new("legs", "tuple[]")
                .with_components(vec![FunctionParameter::new("price", "uint256")]),
        ]);
        assert_eq!(evm(&param), evm(&param));
    }

    #[test]
    fn test_overrides() {
        let function = ContractFunction {
            id: "mint(address,uint256)".to_string(),
            name: "mint".to_string(),
            display_name: "Mint".to_string(),
            inputs: vec![
                FunctionParameter::new("to", "address"),
                FunctionParameter::new("amount", "uint256"),
            ],
            outputs: vec![],
            state_mutability: StateMutability::Nonpayable,
            modifies_state: true,
            description: None,
        };
        let mut overrides = FieldOverrides::default();
        overrides.0.insert(
            "to".to_string(),
            FieldOverride {
                hidden: true,
                hardcoded_value: Some(serde_json::json!(
                    "0x0000000000000000000000000000000000000001"
                )),
                ..Default::default()
            },
        );
        overrides.0.insert(
            "amount".to_string(),
            FieldOverride {
                field_type: Some(FieldType::Amount),
                label: Some("Tokens".to_string()),
                ..Default::default()
            },
        );
        let fields = map_function(&function, Ecosystem::Evm, &overrides);
        assert!(fields[0].is_hidden && fields[0].is_hardcoded);
        assert_eq!(fields[1].field_type, FieldType::Amount);
        assert_eq!(fields[1].label, "Tokens");

        overrides.0.get_mut("amount").unwrap().field_type = Some(FieldType::Boolean);
        let fields = map_function(&function, Ecosystem::Evm, &overrides);
        assert_eq!(fields[1].field_type, FieldType::Bigint);
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("amountIn"), "Amount In");
        assert_eq!(humanize("_to"), "To");
        assert_eq!(humanize("token_id"), "Token Id");
        assert_eq!(humanize("arg0"), "Arg0");
    }

    #[test]
    fn test_unnamed_inputs_get_positional_names() {
        let function = ContractFunction {
            id: "f(uint8,bool)".to_string(),
            name: "f".to_string(),
            display_name: "F".to_string(),
            inputs: vec![FunctionParameter::new("", "uint8"), FunctionParameter::new("", "bool")],
            outputs: vec![],
            state_mutability: StateMutability::View,
            modifies_state: false,
            description: None,
        };
        let fields = map_function(&function, Ecosystem::Evm, &FieldOverrides::default());
        assert_eq!(fields[0].id, "arg0");
        assert_eq!(fields[1].id, "arg1");
    }
}
