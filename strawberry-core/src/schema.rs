// Parameter schemas: what a command accepts and how each input is checked

use serde::{Deserialize, Serialize};

use crate::validators;
use crate::value::ParamValue;

/// Declared type of a parameter (or of a sequence element).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Boolean,
    /// Arbitrary structured value.
    Any,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Any => "any",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamAction {
    #[default]
    Store,
    /// Presence alone means `true`; absence means `false`.
    StoreTrue,
}

/// Validation rule attached to a parameter. Built-in rules are inspectable
/// by name so they can be shown by `/describe`.
#[derive(Debug, Clone, Copy)]
pub enum Validator {
    AliasFormat,
    OptionKey,
    SpecletOptions,
    Custom {
        name: &'static str,
        check: fn(&ParamValue) -> Result<(), String>,
    },
}

impl Validator {
    pub fn name(&self) -> &'static str {
        match self {
            Validator::AliasFormat => "alias_format",
            Validator::OptionKey => "option_key",
            Validator::SpecletOptions => "speclet_options",
            Validator::Custom { name, .. } => name,
        }
    }

    pub fn validate(&self, value: &ParamValue) -> Result<(), String> {
        match self {
            Validator::AliasFormat => validators::validate_alias(value),
            Validator::OptionKey => validators::validate_option_key(value),
            Validator::SpecletOptions => validators::validate_speclet_options(value),
            Validator::Custom { check, .. } => check(value),
        }
    }
}

/// Transformation applied after validation; its output is what handlers see.
#[derive(Debug, Clone, Copy)]
pub enum Transformer {
    AttributeFilter,
    Custom {
        name: &'static str,
        apply: fn(ParamValue) -> ParamValue,
    },
}

impl Transformer {
    pub fn name(&self) -> &'static str {
        match self {
            Transformer::AttributeFilter => "attribute_filter",
            Transformer::Custom { name, .. } => name,
        }
    }

    pub fn apply(&self, value: ParamValue) -> ParamValue {
        match self {
            Transformer::AttributeFilter => validators::transform_attributes(value),
            Transformer::Custom { apply, .. } => apply(value),
        }
    }
}

/// Element description of a sequence parameter.
#[derive(Debug, Clone, Copy)]
pub struct ElementSchema {
    pub name: &'static str,
    pub param_type: ParamType,
    pub description: &'static str,
}

/// One named input of a command.
#[derive(Debug, Clone, Copy)]
pub struct ParameterSchema {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub param_type: ParamType,
    pub required: bool,
    pub action: ParamAction,
    pub description: &'static str,
    /// Environment variable the value may be read from when the request omits it.
    pub env_var: Option<&'static str>,
    pub validator: Option<Validator>,
    pub transformer: Option<Transformer>,
    pub element: Option<ElementSchema>,
}

impl ParameterSchema {
    pub const fn new(name: &'static str, param_type: ParamType) -> Self {
        Self {
            name,
            aliases: &[],
            param_type,
            required: false,
            action: ParamAction::Store,
            description: "",
            env_var: None,
            validator: None,
            transformer: None,
            element: None,
        }
    }

    /// A `StoreTrue` boolean flag.
    pub const fn flag(name: &'static str) -> Self {
        let mut schema = Self::new(name, ParamType::Boolean);
        schema.action = ParamAction::StoreTrue;
        schema
    }

    pub const fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn env_var(mut self, env_var: &'static str) -> Self {
        self.env_var = Some(env_var);
        self
    }

    pub const fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub const fn transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub const fn elements(
        mut self,
        name: &'static str,
        param_type: ParamType,
        description: &'static str,
    ) -> Self {
        self.element = Some(ElementSchema {
            name,
            param_type,
            description,
        });
        self
    }

    /// Same parameter without the environment binding; used by commands
    /// where the alias must always be spelled out.
    pub const fn as_explicit(mut self) -> Self {
        self.env_var = None;
        self
    }

    pub fn is_flag(&self) -> bool {
        self.action == ParamAction::StoreTrue
    }

    /// Whether `key` is the canonical name or one of the aliases.
    pub fn answers_to(&self, key: &str) -> bool {
        self.name == key || self.aliases.contains(&key)
    }

    /// Canonical name first, then aliases in declaration order.
    pub fn spellings(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }

    pub fn describe(&self) -> ParameterDescription {
        ParameterDescription {
            name: self.name.to_string(),
            aliases: self.aliases.iter().map(|a| a.to_string()).collect(),
            param_type: self.param_type,
            required: self.required,
            action: self.action,
            description: self.description.to_string(),
            env_variable: self.env_var.map(str::to_string),
            element_name: self.element.map(|e| e.name.to_string()),
            element_type: self.element.map(|e| e.param_type),
            element_description: self.element.map(|e| e.description.to_string()),
            validator: self.validator.map(|v| v.name().to_string()),
            transformer: self.transformer.map(|t| t.name().to_string()),
        }
    }
}

/// Serializable view of a [`ParameterSchema`], served by `/describe` and
/// consumed by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescription {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub action: ParamAction,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<ParamType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<String>,
}

/// Serializable view of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescription {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDescription>,
}

/// Checks that names and aliases within one parameter list do not collide.
pub fn check_unique_spellings(params: &[ParameterSchema]) -> Result<(), String> {
    let mut seen: Vec<&str> = Vec::new();
    for spelling in params.iter().flat_map(ParameterSchema::spellings) {
        if seen.contains(&spelling) {
            return Err(format!("parameter spelling {:?} is declared twice", spelling));
        }
        seen.push(spelling);
    }
    Ok(())
}
