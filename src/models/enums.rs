use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Backend {
    Gemini => "gemini",
    Openai => "openai",
});

impl Backend {
    /// The other backend of the pair.
    pub fn other(&self) -> Backend {
        match self {
            Backend::Gemini => Backend::Openai,
            Backend::Openai => Backend::Gemini,
        }
    }
}

str_enum!(TemplateStatus {
    Draft => "draft",
    DetectingFields => "detecting_fields",
    EditingFields => "editing_fields",
    Complete => "complete",
});

impl TemplateStatus {
    /// Position in the lifecycle. Status only ever advances.
    pub fn rank(&self) -> u8 {
        match self {
            TemplateStatus::Draft => 0,
            TemplateStatus::DetectingFields => 1,
            TemplateStatus::EditingFields => 2,
            TemplateStatus::Complete => 3,
        }
    }

    /// Monotonic advance: returns the later of the two statuses.
    pub fn advanced_to(self, next: TemplateStatus) -> TemplateStatus {
        if next.rank() >= self.rank() {
            next
        } else {
            self
        }
    }
}

str_enum!(ResultStatus {
    Processing => "processing",
    Complete => "complete",
    Failed => "failed",
});

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResultStatus::Complete | ResultStatus::Failed)
    }
}

str_enum!(FieldType {
    Text => "text",
    Number => "number",
    Date => "date",
    Email => "email",
    Phone => "phone",
    Checkbox => "checkbox",
    Radio => "radio",
    Select => "select",
    Textarea => "textarea",
});

impl FieldType {
    /// Lenient parse for AI-produced field definitions.
    ///
    /// Models regularly emit the HTML input spelling `tel`; anything else
    /// unrecognized falls back to `text` rather than dropping the field.
    pub fn parse_lenient(s: &str) -> FieldType {
        match s.trim().to_ascii_lowercase().as_str() {
            "tel" => FieldType::Phone,
            other => other.parse().unwrap_or(FieldType::Text),
        }
    }
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_round_trips_through_str() {
        assert_eq!(Backend::Gemini.as_str(), "gemini");
        assert_eq!("openai".parse::<Backend>().unwrap(), Backend::Openai);
        assert!("claude".parse::<Backend>().is_err());
    }

    #[test]
    fn backend_other_flips() {
        assert_eq!(Backend::Gemini.other(), Backend::Openai);
        assert_eq!(Backend::Openai.other(), Backend::Gemini);
    }

    #[test]
    fn backend_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Backend::Gemini).unwrap(), r#""gemini""#);
    }

    #[test]
    fn template_status_never_regresses() {
        assert_eq!(
            TemplateStatus::Complete.advanced_to(TemplateStatus::Draft),
            TemplateStatus::Complete
        );
        assert_eq!(
            TemplateStatus::Draft.advanced_to(TemplateStatus::DetectingFields),
            TemplateStatus::DetectingFields
        );
        assert_eq!(
            TemplateStatus::EditingFields.advanced_to(TemplateStatus::EditingFields),
            TemplateStatus::EditingFields
        );
    }

    #[test]
    fn result_status_terminal_states() {
        assert!(!ResultStatus::Processing.is_terminal());
        assert!(ResultStatus::Complete.is_terminal());
        assert!(ResultStatus::Failed.is_terminal());
    }

    #[test]
    fn field_type_lenient_accepts_tel() {
        assert_eq!(FieldType::parse_lenient("tel"), FieldType::Phone);
        assert_eq!(FieldType::parse_lenient("phone"), FieldType::Phone);
        assert_eq!(FieldType::parse_lenient("EMAIL"), FieldType::Email);
    }

    #[test]
    fn field_type_lenient_falls_back_to_text() {
        assert_eq!(FieldType::parse_lenient("barcode"), FieldType::Text);
        assert_eq!(FieldType::parse_lenient(""), FieldType::Text);
    }

    #[test]
    fn field_type_strict_rejects_tel() {
        assert!("tel".parse::<FieldType>().is_err());
    }
}
