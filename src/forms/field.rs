use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Bigint,
    Amount,
    Boolean,
    Select,
    Radio,
    Bytes,
    Address,
    Url,
    Date,
    Object,
    Array,
    ArrayObject,
    Map,
    Enum,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidation {
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Void,
    Integer,
    Tuple,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumVariant {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariantKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload_components: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumMetadata {
    pub name: String,
    pub variants: Vec<EnumVariant>,
    pub is_unit_only: bool,
}

impl EnumMetadata {
    pub fn variant(&self, tag: &str) -> Option<&EnumVariant> {
        self.variants.iter().find(|v| v.name == tag)
    }
}

/// Renderable projection of one `FunctionParameter`; mirrors its nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub id: String,
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub validation: FieldValidation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<FieldDescriptor>>,
    /// Field type of each element for `array` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<FieldType>,
    /// Materialized element descriptor for `array` and `array-object`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_field_config: Option<Box<FieldDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field_config: Option<Box<FieldDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_field_config: Option<Box<FieldDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_metadata: Option<EnumMetadata>,
    pub original_parameter_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub is_hardcoded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardcoded_value: Option<serde_json::Value>,
}
