//! Parameter annotation tags
//!
//! Each entry-function parameter carries annotation strings naming its role
//! (`InputData`, `OutputTrigger`, ...) and optionally a value type
//! (`Type:real`) and a details payload (`Details:{...}`). Unknown tags are
//! ignored so newer toolchains stay loadable.

use crate::ModuleError;

/// The six parameter roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    InputData,
    OutputData,
    InputEvent,
    OutputEvent,
    OutputTrigger,
    InstanceData,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::InputData => "InputData",
            Role::OutputData => "OutputData",
            Role::InputEvent => "InputEvent",
            Role::OutputEvent => "OutputEvent",
            Role::OutputTrigger => "OutputTrigger",
            Role::InstanceData => "InstanceData",
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Role::InputData | Role::InputEvent)
    }

    /// Roles whose parameters the implementation writes through, so they
    /// must be declared by pointer
    pub fn requires_pointer(&self) -> bool {
        matches!(
            self,
            Role::OutputData | Role::OutputEvent | Role::OutputTrigger | Role::InstanceData
        )
    }
}

/// A parsed annotation string
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Role(Role),
    /// `Type:<typename>`; `Type:void` declares an explicitly untyped port.
    Type(Option<String>),
    /// `Details:<json object>`
    Details(serde_json::Value),
}

impl Annotation {
    /// Parse one annotation string. Unknown tags yield `None` and are
    /// skipped; a malformed payload on a known tag is an error.
    pub fn parse(raw: &str, module: &str) -> Result<Option<Annotation>, ModuleError> {
        let role = match raw {
            "InputData" => Some(Role::InputData),
            "OutputData" => Some(Role::OutputData),
            "InputEvent" => Some(Role::InputEvent),
            "OutputEvent" => Some(Role::OutputEvent),
            "OutputTrigger" => Some(Role::OutputTrigger),
            "InstanceData" => Some(Role::InstanceData),
            _ => None,
        };
        if let Some(role) = role {
            return Ok(Some(Annotation::Role(role)));
        }

        if let Some(type_name) = raw.strip_prefix("Type:") {
            let type_name = type_name.trim();
            if type_name.is_empty() {
                return Err(ModuleError::Malformed {
                    module: module.to_string(),
                    reason: "empty Type: annotation".to_string(),
                });
            }
            return Ok(Some(Annotation::Type(if type_name == "void" {
                None
            } else {
                Some(type_name.to_string())
            })));
        }

        if let Some(payload) = raw.strip_prefix("Details:") {
            if payload.trim().is_empty() {
                return Ok(None);
            }
            let value: serde_json::Value =
                serde_json::from_str(payload).map_err(|e| ModuleError::Malformed {
                    module: module.to_string(),
                    reason: format!("couldn't parse Details payload `{}`: {}", payload, e),
                })?;
            if !value.is_object() {
                return Err(ModuleError::Malformed {
                    module: module.to_string(),
                    reason: format!("Details payload is not a JSON object: `{}`", payload),
                });
            }
            return Ok(Some(Annotation::Details(value)));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tags() {
        assert_eq!(
            Annotation::parse("InputData", "m").unwrap(),
            Some(Annotation::Role(Role::InputData))
        );
        assert_eq!(
            Annotation::parse("OutputTrigger", "m").unwrap(),
            Some(Annotation::Role(Role::OutputTrigger))
        );
    }

    #[test]
    fn test_type_tag() {
        assert_eq!(
            Annotation::parse("Type:list.real", "m").unwrap(),
            Some(Annotation::Type(Some("list.real".to_string())))
        );
        assert_eq!(
            Annotation::parse("Type:void", "m").unwrap(),
            Some(Annotation::Type(None))
        );
        assert!(Annotation::parse("Type:", "m").is_err());
    }

    #[test]
    fn test_details_tag() {
        let parsed = Annotation::parse(r#"Details:{"default": 1.0}"#, "m").unwrap();
        match parsed {
            Some(Annotation::Details(v)) => assert_eq!(v["default"], 1.0),
            other => panic!("unexpected: {:?}", other),
        }

        assert!(Annotation::parse("Details:not json", "m").is_err());
        assert!(Annotation::parse("Details:[1,2]", "m").is_err());
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        assert_eq!(Annotation::parse("FutureTag", "m").unwrap(), None);
        assert_eq!(Annotation::parse("FutureTag:payload", "m").unwrap(), None);
    }
}
