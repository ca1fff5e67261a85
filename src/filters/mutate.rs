// src/filters/mutate.rs
use crate::error::ConfigError;
use crate::event::{Event, Value};
use crate::pipeline::stage::{Flow, Stage};
use indexmap::IndexMap;
use serde::Deserialize;

/// Mutate stage options. Which operand is read depends on `action`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutateConfig {
    pub action: String,
    /// remove_field, uppercase, lowercase
    #[serde(default)]
    pub fields: Vec<String>,
    /// add_field: field -> literal value
    #[serde(default)]
    pub values: IndexMap<String, Value>,
    /// rename_field: old name -> new name
    #[serde(default)]
    pub rename: IndexMap<String, String>,
    /// add_tag, remove_tag
    #[serde(default)]
    pub tags: Vec<String>,
    /// convert: field -> integer | float | string | boolean
    #[serde(default)]
    pub convert: IndexMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Integer,
    Float,
    String,
    Boolean,
}

impl Conversion {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "integer" | "int" => Some(Conversion::Integer),
            "float" => Some(Conversion::Float),
            "string" => Some(Conversion::String),
            "boolean" | "bool" => Some(Conversion::Boolean),
            _ => None,
        }
    }

    fn apply(self, value: &Value) -> Option<Value> {
        let text = value.to_string();
        match self {
            Conversion::Integer => match value {
                Value::Integer(_) => Some(value.clone()),
                Value::Float(x) => Some(Value::Integer(x.trunc() as i64)),
                Value::Bool(b) => Some(Value::Integer(*b as i64)),
                _ => text.trim().parse::<i64>().ok().map(Value::Integer),
            },
            Conversion::Float => match value {
                Value::Float(_) => Some(value.clone()),
                Value::Integer(i) => Some(Value::Float(*i as f64)),
                _ => text.trim().parse::<f64>().ok().map(Value::Float),
            },
            Conversion::String => Some(Value::Text(text)),
            Conversion::Boolean => match value {
                Value::Bool(_) => Some(value.clone()),
                _ => match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "yes" | "y" | "1" => Some(Value::Bool(true)),
                    "false" | "f" | "no" | "n" | "0" => Some(Value::Bool(false)),
                    _ => None,
                },
            },
        }
    }
}

/// A validated mutate action with its operands.
#[derive(Debug, Clone, PartialEq)]
pub enum MutateAction {
    RemoveField(Vec<String>),
    AddField(IndexMap<String, Value>),
    RenameField(IndexMap<String, String>),
    AddTag(Vec<String>),
    RemoveTag(Vec<String>),
    Uppercase(Vec<String>),
    Lowercase(Vec<String>),
    Convert(Vec<(String, Conversion)>),
}

fn require<T>(operand: &[T], option: &'static str) -> Result<(), ConfigError> {
    if operand.is_empty() {
        return Err(ConfigError::MissingOption {
            stage: "mutate",
            option,
        });
    }
    Ok(())
}

fn require_map<K, V>(operand: &IndexMap<K, V>, option: &'static str) -> Result<(), ConfigError> {
    if operand.is_empty() {
        return Err(ConfigError::MissingOption {
            stage: "mutate",
            option,
        });
    }
    Ok(())
}

impl MutateAction {
    pub fn from_config(config: &MutateConfig) -> Result<Self, ConfigError> {
        let action = match config.action.as_str() {
            "remove_field" => {
                require(&config.fields, "fields")?;
                MutateAction::RemoveField(config.fields.clone())
            }
            "add_field" => {
                require_map(&config.values, "values")?;
                MutateAction::AddField(config.values.clone())
            }
            "rename_field" => {
                require_map(&config.rename, "rename")?;
                MutateAction::RenameField(config.rename.clone())
            }
            "add_tag" => {
                require(&config.tags, "tags")?;
                MutateAction::AddTag(config.tags.clone())
            }
            "remove_tag" => {
                require(&config.tags, "tags")?;
                MutateAction::RemoveTag(config.tags.clone())
            }
            "uppercase" => {
                require(&config.fields, "fields")?;
                MutateAction::Uppercase(config.fields.clone())
            }
            "lowercase" => {
                require(&config.fields, "fields")?;
                MutateAction::Lowercase(config.fields.clone())
            }
            "convert" => {
                require_map(&config.convert, "convert")?;
                let conversions = config
                    .convert
                    .iter()
                    .map(|(field, kind)| {
                        Conversion::parse(kind)
                            .map(|c| (field.clone(), c))
                            .ok_or_else(|| ConfigError::InvalidOption {
                                stage: "mutate",
                                option: "convert",
                                message: format!(
                                    "unknown type '{}' for field '{}': use integer, float, string or boolean",
                                    kind, field
                                ),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                MutateAction::Convert(conversions)
            }
            other => return Err(ConfigError::UnknownAction(other.to_string())),
        };

        // Each action reads exactly one operand
        let operands = [
            ("fields", config.fields.is_empty()),
            ("values", config.values.is_empty()),
            ("rename", config.rename.is_empty()),
            ("tags", config.tags.is_empty()),
            ("convert", config.convert.is_empty()),
        ];
        let used = action.operand();
        if let Some((option, _)) = operands
            .into_iter()
            .find(|(option, empty)| !empty && *option != used)
        {
            return Err(ConfigError::InvalidOption {
                stage: "mutate",
                option,
                message: format!("not used by action '{}'", config.action),
            });
        }
        Ok(action)
    }

    /// The config option this action takes its operands from.
    fn operand(&self) -> &'static str {
        match self {
            MutateAction::RemoveField(_) | MutateAction::Uppercase(_) | MutateAction::Lowercase(_) => {
                "fields"
            }
            MutateAction::AddField(_) => "values",
            MutateAction::RenameField(_) => "rename",
            MutateAction::AddTag(_) | MutateAction::RemoveTag(_) => "tags",
            MutateAction::Convert(_) => "convert",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MutateAction::RemoveField(_) => "remove_field",
            MutateAction::AddField(_) => "add_field",
            MutateAction::RenameField(_) => "rename_field",
            MutateAction::AddTag(_) => "add_tag",
            MutateAction::RemoveTag(_) => "remove_tag",
            MutateAction::Uppercase(_) => "uppercase",
            MutateAction::Lowercase(_) => "lowercase",
            MutateAction::Convert(_) => "convert",
        }
    }

    /// Apply to an event. Operands naming absent fields are skipped.
    pub fn apply(&self, event: &mut Event) {
        match self {
            MutateAction::RemoveField(fields) => {
                for field in fields {
                    event.remove(field);
                }
            }
            MutateAction::AddField(values) => {
                for (field, value) in values {
                    event.insert(field.clone(), value.clone());
                }
            }
            MutateAction::RenameField(renames) => {
                for (from, to) in renames {
                    if let Some(value) = event.remove(from) {
                        event.insert(to.clone(), value);
                    }
                }
            }
            MutateAction::AddTag(tags) => {
                for tag in tags {
                    event.add_tag(tag.clone());
                }
            }
            MutateAction::RemoveTag(tags) => {
                for tag in tags {
                    event.remove_tag(tag);
                }
            }
            MutateAction::Uppercase(fields) => {
                for field in fields {
                    if let Some(Value::Text(s)) = event.fields.get_mut(field) {
                        *s = s.to_uppercase();
                    }
                }
            }
            MutateAction::Lowercase(fields) => {
                for field in fields {
                    if let Some(Value::Text(s)) = event.fields.get_mut(field) {
                        *s = s.to_lowercase();
                    }
                }
            }
            MutateAction::Convert(conversions) => {
                for (field, conversion) in conversions {
                    let Some(value) = event.fields.get_mut(field) else {
                        continue;
                    };
                    match conversion.apply(value) {
                        Some(converted) => *value = converted,
                        None => {
                            tracing::debug!(field = %field, conversion = ?conversion, "conversion failed, value kept")
                        }
                    }
                }
            }
        }
    }
}

/// Applies one [`MutateAction`] to every event.
pub struct MutateStage {
    name: String,
    action: MutateAction,
}

impl MutateStage {
    pub fn new(config: &MutateConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_action(MutateAction::from_config(config)?))
    }

    pub fn with_action(action: MutateAction) -> Self {
        MutateStage {
            name: format!("mutate:{}", action.name()),
            action,
        }
    }

    pub fn action(&self) -> &MutateAction {
        &self.action
    }
}

impl Stage for MutateStage {
    fn process(&self, mut event: Event) -> Flow {
        self.action.apply(&mut event);
        Flow::Continue(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
