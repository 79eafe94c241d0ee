pub mod field;
pub mod kind;
pub mod mapping;
pub mod transform;

pub use field::{EnumMetadata, EnumVariant, FieldDescriptor, FieldType, FieldValidation, VariantKind};
pub use mapping::{compatible_field_types, map_function, map_parameter, FieldOverride, FieldOverrides};
pub use transform::{format_output, format_value, parse_input, parse_inputs, CallValue, DisplayValue};
