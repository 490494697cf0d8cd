//! Run configuration: tag delimiters, repeat specs and the settings the
//! command-line tool reads from `gelatorc.json`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// The six delimiters recognised by the tokenizer.
///
/// Built once per run and shared by reference; none of the delimiters may be
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TagSettings", into = "TagSettings")]
pub struct TagConfig {
    expression_start: String,
    expression_end: String,
    control_start: String,
    control_end: String,
    include_start: String,
    include_end: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            expression_start: "[[".to_string(),
            expression_end: "]]".to_string(),
            control_start: "[!".to_string(),
            control_end: "!]".to_string(),
            include_start: "[@".to_string(),
            include_end: "@]".to_string(),
        }
    }
}

impl TagConfig {
    pub fn new(
        expression: (&str, &str),
        control: (&str, &str),
        include: (&str, &str),
    ) -> Result<Self, ConfigError> {
        TagSettings {
            expression_start_tag: Some(expression.0.to_string()),
            expression_end_tag: Some(expression.1.to_string()),
            control_start_tag: Some(control.0.to_string()),
            control_end_tag: Some(control.1.to_string()),
            include_start_tag: Some(include.0.to_string()),
            include_end_tag: Some(include.1.to_string()),
        }
        .try_into()
    }

    pub fn expression_start(&self) -> &str {
        &self.expression_start
    }

    pub fn expression_end(&self) -> &str {
        &self.expression_end
    }

    pub fn control_start(&self) -> &str {
        &self.control_start
    }

    pub fn control_end(&self) -> &str {
        &self.control_end
    }

    pub fn include_start(&self) -> &str {
        &self.include_start
    }

    pub fn include_end(&self) -> &str {
        &self.include_end
    }
}

/// Loose form of [`TagConfig`] as written in config files and on the
/// command line: any tag may be missing and falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_start_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_end_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_start_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_end_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_start_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_end_tag: Option<String>,
}

impl TagSettings {
    /// Settings in `other` win over the ones in `self`.
    pub fn merge(self, other: TagSettings) -> TagSettings {
        TagSettings {
            expression_start_tag: other.expression_start_tag.or(self.expression_start_tag),
            expression_end_tag: other.expression_end_tag.or(self.expression_end_tag),
            control_start_tag: other.control_start_tag.or(self.control_start_tag),
            control_end_tag: other.control_end_tag.or(self.control_end_tag),
            include_start_tag: other.include_start_tag.or(self.include_start_tag),
            include_end_tag: other.include_end_tag.or(self.include_end_tag),
        }
    }
}

impl TryFrom<TagSettings> for TagConfig {
    type Error = ConfigError;

    fn try_from(settings: TagSettings) -> Result<Self, Self::Error> {
        fn pick(
            value: Option<String>,
            default: String,
            name: &'static str,
        ) -> Result<String, ConfigError> {
            match value {
                Some(v) if v.is_empty() => Err(ConfigError::EmptyTag(name)),
                Some(v) => Ok(v),
                None => Ok(default),
            }
        }

        let defaults = TagConfig::default();
        Ok(TagConfig {
            expression_start: pick(
                settings.expression_start_tag,
                defaults.expression_start,
                "expressionStartTag",
            )?,
            expression_end: pick(
                settings.expression_end_tag,
                defaults.expression_end,
                "expressionEndTag",
            )?,
            control_start: pick(
                settings.control_start_tag,
                defaults.control_start,
                "controlStartTag",
            )?,
            control_end: pick(
                settings.control_end_tag,
                defaults.control_end,
                "controlEndTag",
            )?,
            include_start: pick(
                settings.include_start_tag,
                defaults.include_start,
                "includeStartTag",
            )?,
            include_end: pick(
                settings.include_end_tag,
                defaults.include_end,
                "includeEndTag",
            )?,
        })
    }
}

impl From<TagConfig> for TagSettings {
    fn from(tags: TagConfig) -> Self {
        TagSettings {
            expression_start_tag: Some(tags.expression_start),
            expression_end_tag: Some(tags.expression_end),
            control_start_tag: Some(tags.control_start),
            control_end_tag: Some(tags.control_end),
            include_start_tag: Some(tags.include_start),
            include_end_tag: Some(tags.include_end),
        }
    }
}

/// Renders one template into many files, one per element of `iterable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatSpec {
    /// Expression evaluated in the base context; must yield an array.
    #[serde(rename = "array", alias = "iterable")]
    pub iterable: String,
    /// Name bound to each element.
    pub variable: String,
    /// Template for the output file name, relative to the template's
    /// directory.
    pub filename: String,
}

impl RepeatSpec {
    pub fn new(
        iterable: impl Into<String>,
        variable: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            iterable: iterable.into(),
            variable: variable.into(),
            filename: filename.into(),
        }
    }
}

pub const DEFAULT_SRC: &str = "**/[!_]*.gel";
pub const DEFAULT_DEST: &str = "build";
pub const DEFAULT_CONFIG_FILE: &str = "gelatorc.json";

/// Everything one run of the command-line tool needs, as read from a config
/// file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub src: Vec<String>,
    pub dest: String,
    pub context: serde_json::Map<String, serde_json::Value>,
    pub repeat: BTreeMap<String, RepeatSpec>,
    #[serde(flatten)]
    pub tags: TagSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            src: vec![DEFAULT_SRC.to_string()],
            dest: DEFAULT_DEST.to_string(),
            context: serde_json::Map::new(),
            repeat: BTreeMap::new(),
            tags: TagSettings::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json(path: &str, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_json(&display, &text)
    }

    pub fn tag_config(&self) -> Result<TagConfig, ConfigError> {
        self.tags.clone().try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tags() {
        let tags = TagConfig::default();
        assert_eq!((tags.expression_start(), tags.expression_end()), ("[[", "]]"));
        assert_eq!((tags.control_start(), tags.control_end()), ("[!", "!]"));
        assert_eq!((tags.include_start(), tags.include_end()), ("[@", "@]"));
    }

    #[test]
    fn empty_tag_in_config_file_is_rejected() {
        let err = RunConfig::from_json("gelatorc.json", r#"{ "includeEndTag": "" }"#)
            .unwrap()
            .tag_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTag("includeEndTag")));
    }

    #[test]
    fn empty_tag_is_rejected() {
        let err = TagConfig::new(("", "]]"), ("[!", "!]"), ("[@", "@]")).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTag("expressionStartTag")));
    }

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let settings = TagSettings {
            expression_start_tag: Some("{{".to_string()),
            ..TagSettings::default()
        };
        let tags = TagConfig::try_from(settings).unwrap();
        assert_eq!(tags.expression_start(), "{{");
        assert_eq!(tags.expression_end(), "]]");
    }

    #[test]
    fn later_settings_win_when_merged() {
        let file = TagSettings {
            control_start_tag: Some("<%".to_string()),
            control_end_tag: Some("%>".to_string()),
            ..TagSettings::default()
        };
        let cli = TagSettings {
            control_end_tag: Some("}}".to_string()),
            ..TagSettings::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.control_start_tag.as_deref(), Some("<%"));
        assert_eq!(merged.control_end_tag.as_deref(), Some("}}"));
    }

    #[test]
    fn run_config_reads_camel_case_keys() {
        let json = r#"{
            "dest": "out",
            "context": { "name": "Mark" },
            "repeat": {
                "php/model.php.gel": {
                    "variable": "model",
                    "array": "models",
                    "filename": "[[ model.name ]].php.gel"
                }
            },
            "expressionStartTag": "{{",
            "expressionEndTag": "}}"
        }"#;
        let config = RunConfig::from_json("gelatorc.json", json).unwrap();
        assert_eq!(config.src, vec![DEFAULT_SRC.to_string()]);
        assert_eq!(config.dest, "out");
        assert_eq!(config.context["name"], "Mark");
        let spec = &config.repeat["php/model.php.gel"];
        assert_eq!(spec.iterable, "models");
        assert_eq!(spec.variable, "model");
        let tags = config.tag_config().unwrap();
        assert_eq!(tags.expression_start(), "{{");
        assert_eq!(tags.control_start(), "[!");
    }

    #[test]
    fn malformed_json_names_the_file() {
        let err = RunConfig::from_json("gelatorc.json", r#"{ "dest": 3 }"#).unwrap_err();
        assert!(err.to_string().starts_with("invalid config file 'gelatorc.json'"));
    }

    #[test]
    fn tag_config_round_trips_through_serde() {
        let tags = TagConfig::new(("{{", "}}"), ("{%", "%}"), ("{>", "<}")).unwrap();
        let json = serde_json::to_string(&tags).unwrap();
        let back: TagConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tags);
    }
}
