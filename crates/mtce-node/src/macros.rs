//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---

/// Declares a fieldless enum with its wire text, raw index conversion,
/// `Display`/`FromStr`, and string-based serde.
macro_rules! mtce_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            serde_with::SerializeDisplay,
            serde_with::DeserializeFromStr,
        )]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            /// Decode a raw discriminant. Out-of-range values yield `None`.
            pub fn from_raw(raw: u8) -> Option<Self> {
                Self::ALL.get(raw as usize).copied()
            }

            pub fn raw(&self) -> u8 {
                *self as u8
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = mtce_common::UnknownValue;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(mtce_common::UnknownValue::new($kind, other)),
                }
            }
        }
    };
}

/// Declares a handler stage enum and binds it to its storage in [`crate::stage::Stages`].
macro_rules! stage_enum {
    (@common $name:ident, $fsm:ident, $start:ident, $term:ident, { $( $variant:ident => $text:literal ),+ }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(<$name as $crate::stage::Stage>::as_str(self))
            }
        }
    };
    (@trait $name:ident, $fsm:ident, $start:ident, $term:ident, { $( $variant:ident => $text:literal ),+ }) => {
        const FSM: $crate::stage::FsmKind = $crate::stage::FsmKind::$fsm;
        const START: Self = $name::$start;
        const TERMINAL: Self = $name::$term;

        fn as_str(&self) -> &'static str {
            match self {
                $( $name::$variant => $text ),+
            }
        }

        fn from_raw(raw: u8) -> Option<Self> {
            $name::ALL.get(raw as usize).copied()
        }
    };
    (
        $(#[$meta:meta])*
        $name:ident ($fsm:ident, start = $start:ident, terminal = $term:ident, action) {
            $( $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        stage_enum!(@common $name, $fsm, $start, $term, { $( $variant => $text ),+ });

        impl $crate::stage::Stage for $name {
            stage_enum!(@trait $name, $fsm, $start, $term, { $( $variant => $text ),+ });

            fn current(stages: &$crate::stage::Stages) -> Option<Self> {
                match stages.action {
                    $crate::stage::ActionFsm::$fsm(stage) => Some(stage),
                    _ => None,
                }
            }

            fn store(stages: &mut $crate::stage::Stages, next: Self) {
                stages.action = $crate::stage::ActionFsm::$fsm(next);
            }
        }

        impl From<$name> for $crate::stage::ActionFsm {
            fn from(stage: $name) -> Self {
                $crate::stage::ActionFsm::$fsm(stage)
            }
        }
    };
    (
        $(#[$meta:meta])*
        $name:ident ($fsm:ident, start = $start:ident, terminal = $term:ident, background = $field:ident) {
            $( $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        stage_enum!(@common $name, $fsm, $start, $term, { $( $variant => $text ),+ });

        impl $crate::stage::Stage for $name {
            stage_enum!(@trait $name, $fsm, $start, $term, { $( $variant => $text ),+ });

            fn current(stages: &$crate::stage::Stages) -> Option<Self> {
                Some(stages.$field)
            }

            fn store(stages: &mut $crate::stage::Stages, next: Self) {
                stages.$field = next;
            }
        }
    };
}
