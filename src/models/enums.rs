use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    /// Declared shape of the value a monitor tracks.
    FactType {
        Number => "number",
        String => "string",
        Boolean => "boolean",
        Object => "object",
    }
);

str_enum!(
    /// How change detection treats a monitor. `Change` monitors compare by deep equality only.
    MonitorKind {
        State => "state",
        Change => "change",
    }
);

str_enum!(
    EvaluationPhase {
        Started => "started",
        Completed => "completed",
        Failed => "failed",
    }
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn fact_type_round_trips_through_str() {
        for ft in [FactType::Number, FactType::String, FactType::Boolean, FactType::Object] {
            assert_eq!(FactType::from_str(ft.as_str()).unwrap(), ft);
        }
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = FactType::from_str("decimal").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&MonitorKind::Change).unwrap(), "\"change\"");
        let parsed: FactType = serde_json::from_str("\"boolean\"").unwrap();
        assert_eq!(parsed, FactType::Boolean);
    }
}
