//! AT command table.
//!
//! The set of commands the driver can transmit is closed at build time: the
//! [`at_command_set!`] macro turns the configured name lists into the
//! [`AtCmd`] / [`UnsolicitedMsg`] enums and their name tables. The engine
//! itself attaches no meaning to any command; it only needs the name string
//! to format the outbound prefix and to match extended-response lines.

use alloc::string::String;

/// How a command is transmitted, i.e. which suffix follows the command name.
///
/// | type | suffix |
/// |------|--------|
/// | `Exec` | (none) |
/// | `Write` | `=` (payload follows) |
/// | `Read` | `?` |
/// | `Test` | `=?` |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtCmdType {
    Exec,
    Write,
    Read,
    Test,
}

impl AtCmdType {
    const fn suffix(self) -> &'static str {
        match self {
            AtCmdType::Exec => "",
            AtCmdType::Write => "=",
            AtCmdType::Read => "?",
            AtCmdType::Test => "=?",
        }
    }
}

/// Builds the transmit prefix for a command: `AT`, a `+` for extended
/// commands, the command name, and the type suffix. The write payload and
/// the CR-LF terminator are appended by the engine, not here.
pub fn format_prefix(command: AtCmd, command_type: AtCmdType) -> String {
    let name = command.name();
    let suffix = command_type.suffix();

    let mut prefix = String::with_capacity(3 + name.len() + suffix.len());
    prefix.push_str("AT");
    if command.is_extended() {
        prefix.push('+');
    }
    prefix.push_str(name);
    prefix.push_str(suffix);
    prefix
}

/// Generates the closed command and unsolicited-message sets.
///
/// Identifiers are laid out the way the tables expect them: the bare `AT`
/// command first (empty name), then the basic commands, then the extended
/// ones. `AtCmd::is_extended` is a plain index comparison against that
/// layout. Name strings must be uppercase, exactly as the peripheral echoes
/// them.
macro_rules! at_command_set {
    (
        basic { $($basic:ident => $basic_name:literal,)* }
        extended { $($ext:ident => $ext_name:literal,)* }
        messages { $($msg:ident => $msg_name:literal,)* }
    ) => {
        /// A command the driver can transmit.
        ///
        /// `At` is the bare `AT` probe. Basic commands are transmitted as
        /// `AT<name>`, extended ones as `AT+<name>`.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum AtCmd {
            At,
            $($basic,)*
            $($ext,)*
        }

        impl AtCmd {
            /// Number of basic commands, the bare `AT` included.
            pub const BASIC_COUNT: usize = 1 + [$($basic_name),*].len();

            /// Total number of commands. Basic commands occupy indexes
            /// `[0, BASIC_COUNT)`, extended ones `[BASIC_COUNT, COUNT)`.
            pub const COUNT: usize = Self::BASIC_COUNT + [$($ext_name),*].len();

            /// Uppercase command name without the `AT`/`AT+` prefix.
            pub const fn name(self) -> &'static str {
                match self {
                    AtCmd::At => "",
                    $(AtCmd::$basic => $basic_name,)*
                    $(AtCmd::$ext => $ext_name,)*
                }
            }

            /// True when the command lives in the `AT+` namespace.
            pub const fn is_extended(self) -> bool {
                (self as usize) >= Self::BASIC_COUNT
            }
        }

        /// A notification the peripheral emits on its own, without the `+`
        /// namespace prefix (e.g. `RING`).
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum UnsolicitedMsg {
            $($msg,)*
        }

        impl UnsolicitedMsg {
            /// Total number of unsolicited messages.
            pub const COUNT: usize = [$($msg_name),*].len();

            /// The literal the peripheral starts such a line with.
            pub const fn name(self) -> &'static str {
                match self {
                    $(UnsolicitedMsg::$msg => $msg_name,)*
                }
            }
        }
    };
}

at_command_set! {
    basic {
        Echo => "E",
    }
    extended {
        First => "FIRST",
        Second => "SECOND",
        Third => "THIRD",
        Fourth => "FOURTH",
        Fifth => "FIFTH",
        Sixth => "SIXTH",
        Seventh => "SEVENTH",
        Eighth => "EIGHTH",
        Ninth => "NINTH",
        Tenth => "TENTH",
    }
    messages {
        Ring => "RING",
        NoCarrier => "NO CARRIER",
    }
}
