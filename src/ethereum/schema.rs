//! Normalization of JSON ABIs into [`ContractSchema`].

use alloy::json_abi::{self, EventParam, JsonAbi, Param};
use serde_json::Value;

use super::codec::canonical_signature;
use crate::error::{AdapterError, AdapterResult};
use crate::forms::mapping::humanize;
use crate::schema::{
    ContractEvent, ContractFunction, ContractSchema, Ecosystem, EventParameter, FunctionParameter,
    StateMutability,
};

/// Parses definition text: a bare ABI array or an artifact object with an
/// `abi` member.
pub fn parse_definition(text: &str) -> AdapterResult<JsonAbi> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| AdapterError::InvalidDefinition(format!("not valid JSON: {}", e)))?;

    let abi = match value {
        Value::Array(_) => value,
        Value::Object(mut obj) => match obj.remove("abi") {
            Some(Value::String(inner)) => serde_json::from_str(&inner).map_err(|e| {
                AdapterError::InvalidDefinition(format!("embedded ABI is not valid JSON: {}", e))
            })?,
            Some(abi @ Value::Array(_)) => abi,
            _ => {
                return Err(AdapterError::InvalidDefinition(
                    "expected a JSON ABI array or an object with an 'abi' array".to_string(),
                ))
            }
        },
        _ => {
            return Err(AdapterError::InvalidDefinition(
                "expected a JSON ABI array".to_string(),
            ))
        }
    };

    serde_json::from_value(abi)
        .map_err(|e| AdapterError::InvalidDefinition(format!("malformed ABI entry: {}", e)))
}

fn parameter(param: &Param) -> FunctionParameter {
    let p = FunctionParameter::new(param.name.clone(), param.ty.clone());
    if param.components.is_empty() {
        p
    } else {
        p.with_components(param.components.iter().map(parameter).collect())
    }
}

fn event_parameter(param: &EventParam) -> EventParameter {
    EventParameter {
        name: param.name.clone(),
        ty: param.ty.clone(),
        indexed: param.indexed,
        components: (!param.components.is_empty())
            .then(|| param.components.iter().map(parameter).collect()),
    }
}

fn state_mutability(m: json_abi::StateMutability) -> StateMutability {
    match m {
        json_abi::StateMutability::Pure => StateMutability::Pure,
        json_abi::StateMutability::View => StateMutability::View,
        json_abi::StateMutability::NonPayable => StateMutability::Nonpayable,
        json_abi::StateMutability::Payable => StateMutability::Payable,
    }
}

pub fn function(f: &json_abi::Function) -> ContractFunction {
    let inputs: Vec<FunctionParameter> = f.inputs.iter().map(parameter).collect();
    let mutability = state_mutability(f.state_mutability);
    ContractFunction {
        id: canonical_signature(&f.name, &inputs),
        name: f.name.clone(),
        display_name: humanize(&f.name),
        inputs,
        outputs: f.outputs.iter().map(parameter).collect(),
        state_mutability: mutability,
        modifies_state: mutability.modifies_state(),
        description: None,
    }
}

pub fn event(e: &json_abi::Event) -> ContractEvent {
    let inputs: Vec<EventParameter> = e.inputs.iter().map(event_parameter).collect();
    let types: Vec<FunctionParameter> = inputs
        .iter()
        .map(|p| FunctionParameter {
            components: p.components.clone(),
            ..FunctionParameter::new(p.name.clone(), p.ty.clone())
        })
        .collect();
    ContractEvent {
        id: canonical_signature(&e.name, &types),
        name: e.name.clone(),
        inputs,
        anonymous: e.anonymous,
    }
}

pub fn to_schema(abi: &JsonAbi, name: Option<String>, address: Option<String>) -> ContractSchema {
    let events: Vec<ContractEvent> = abi.events().map(event).collect();
    ContractSchema {
        name,
        ecosystem: Ecosystem::Evm,
        address,
        functions: abi.functions().map(function).collect(),
        events: (!events.is_empty()).then_some(events),
    }
}

/// Implementation entries first, then proxy-only entries whose id does not
/// collide. The proxy's address is kept.
pub fn merge(proxy: &ContractSchema, implementation: &ContractSchema) -> ContractSchema {
    let mut functions = implementation.functions.clone();
    for f in &proxy.functions {
        if !functions.iter().any(|existing| existing.id == f.id) {
            functions.push(f.clone());
        }
    }

    let mut events = implementation.events.clone().unwrap_or_default();
    for e in proxy.events.iter().flatten() {
        if !events.iter().any(|existing| existing.id == e.id) {
            events.push(e.clone());
        }
    }

    ContractSchema {
        name: implementation.name.clone().or_else(|| proxy.name.clone()),
        ecosystem: proxy.ecosystem,
        address: proxy.address.clone(),
        functions,
        events: (!events.is_empty()).then_some(events),
    }
}
