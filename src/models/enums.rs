use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        $(#[$meta])*
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
    /// What the user wants done with their input.
    EditIntent {
        NliEdit => "NLI_EDIT",
        FormEditStructured => "FORM_EDIT_STRUCTURED",
        FormEditRaw => "FORM_EDIT_RAW",
        NoEdit => "NO_EDIT",
    }
);

str_enum!(PatchOpKind {
    Add => "add",
    Remove => "remove",
    Replace => "replace",
});

str_enum!(MetricType {
    Noael => "NOAEL",
    Dap => "DAP",
});

str_enum!(
    /// Which metric kinds a raw correction form carries.
    ExtractionTask {
        Noael => "noael",
        Dap => "dap",
        Both => "both",
        Unknown => "unknown",
    }
);

impl ExtractionTask {
    pub fn from_flags(has_noael: bool, has_dap: bool) -> Self {
        match (has_noael, has_dap) {
            (true, true) => Self::Both,
            (true, false) => Self::Noael,
            (false, true) => Self::Dap,
            (false, false) => Self::Unknown,
        }
    }

    pub fn wants_noael(&self) -> bool {
        matches!(self, Self::Noael | Self::Both)
    }

    pub fn wants_dap(&self) -> bool {
        matches!(self, Self::Dap | Self::Both)
    }
}
