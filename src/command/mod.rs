//! Command strings and validated process invocations.

use std::{borrow::Cow, collections::BTreeMap, fmt};

mod tokenizer;

pub use self::tokenizer::tokenize;

/// Errors that can occur when turning a command string and caller-supplied values
/// into an [`Invocation`].
///
/// All these errors signal a mistake in the calling code rather than a runtime condition,
/// so they are raised before any process is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommandError {
    /// The command string is empty or consists of whitespace only.
    Empty,
    /// A quote was opened and never closed. The enclosed char is the quote delimiter.
    UnclosedQuote(char),
    /// The command string ends with a backslash that has nothing to escape.
    TrailingEscape,
    /// The base command contains chars outside of the `[A-Za-z0-9_.\-/]` set.
    InvalidCommand(String),
    /// An explicit argument is not a scalar value.
    NonScalarArgument {
        /// Zero-based index of the argument among explicit arguments.
        index: usize,
    },
    /// An environment variable value is not a scalar value.
    NonScalarEnvValue {
        /// Name of the environment variable.
        name: String,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => formatter.write_str("command is empty"),
            Self::UnclosedQuote(quote) => {
                write!(formatter, "unclosed quote {quote} in command")
            }
            Self::TrailingEscape => formatter.write_str("command ends with an unfinished escape"),
            Self::InvalidCommand(command) => write!(
                formatter,
                "invalid command `{command}`: only alphanumeric chars, dots, dashes, \
                 underscores and slashes are allowed"
            ),
            Self::NonScalarArgument { index } => {
                write!(formatter, "argument #{index} is not a scalar value")
            }
            Self::NonScalarEnvValue { name } => {
                write!(formatter, "value of env variable `{name}` is not a scalar value")
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Dynamically typed value supplied as a process argument or an environment variable value.
///
/// Only scalar values (booleans, numbers and strings) can be passed to a process;
/// see [`Self::to_arg()`] for the conversion rules.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    Str(String),
    /// List of values.
    List(Vec<Value>),
}

impl Value {
    /// Checks whether this value is scalar.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_)
        )
    }

    /// Converts this value to a string passed to the process. Returns `None` for non-scalar
    /// values.
    ///
    /// | Value | Result |
    /// |-------|--------|
    /// | `true` | `"1"` |
    /// | `false` | `""` |
    /// | integer | decimal representation |
    /// | float | shortest representation that round-trips, e.g. `"1.5"` or `"2"` |
    /// | string | the string itself |
    pub fn to_arg(&self) -> Option<Cow<'_, str>> {
        Some(match self {
            Self::Bool(true) => Cow::Borrowed("1"),
            Self::Bool(false) => Cow::Borrowed(""),
            Self::Int(value) => Cow::Owned(value.to_string()),
            Self::Float(value) => Cow::Owned(value.to_string()),
            Self::Str(value) => Cow::Borrowed(value),
            Self::Null | Self::List(_) => return None,
        })
    }
}

macro_rules! impl_from_int {
    ($($int:ty),+) => {
        $(
        impl From<$int> for Value {
            fn from(value: $int) -> Self {
                Self::Int(value.into())
            }
        }
        )+
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Validated process invocation: base command, arguments and environment variables.
///
/// # Examples
///
/// ```
/// # use proc_harness::{Invocation, Value};
/// let invocation = Invocation::build(
///     "cargo test --workspace",
///     ["--locked", "-q"],
///     [("RUST_BACKTRACE", Value::from(true))],
/// )?;
/// assert_eq!(invocation.program(), "cargo");
/// // Explicit args go before args parsed from the command string.
/// assert_eq!(invocation.args(), ["--locked", "-q", "test", "--workspace"]);
/// assert_eq!(invocation.env()["RUST_BACKTRACE"], "1");
/// # Ok::<_, proc_harness::CommandError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl Invocation {
    /// Checks that `program` consists only of chars from the `[A-Za-z0-9_.\-/]` set.
    fn is_valid_program(program: &str) -> bool {
        let is_allowed = |byte: u8| byte.is_ascii_alphanumeric() || b"_.-/".contains(&byte);
        !program.is_empty() && program.bytes().all(is_allowed)
    }

    /// Creates an invocation of `program` with no args or env variables.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidCommand`] if the program name contains disallowed chars.
    pub fn new(program: impl Into<String>) -> Result<Self, CommandError> {
        let program = program.into();
        if Self::is_valid_program(&program) {
            Ok(Self {
                program,
                args: vec![],
                env: BTreeMap::new(),
            })
        } else {
            Err(CommandError::InvalidCommand(program))
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets an environment variable for the process.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Assembles an invocation from `tokens` produced by [`tokenize()`], explicit arguments
    /// and environment variables.
    ///
    /// The first token is the base command. The resulting arguments are `explicit_args`
    /// (in the provided order) followed by the remaining tokens. This allows to prepend fixed
    /// flags to whatever a reusable command template supplies.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidCommand`] if there are no tokens, or the base command
    ///   contains disallowed chars.
    /// - [`CommandError::NonScalarArgument`] / [`CommandError::NonScalarEnvValue`] if
    ///   an explicit argument / env value is not [scalar](Value::is_scalar()).
    pub fn assemble<A, E, K>(
        tokens: impl IntoIterator<Item = String>,
        explicit_args: A,
        env: E,
    ) -> Result<Self, CommandError>
    where
        A: IntoIterator,
        A::Item: Into<Value>,
        E: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut tokens = tokens.into_iter();
        let program = tokens.next().unwrap_or_default();
        if !Self::is_valid_program(&program) {
            return Err(CommandError::InvalidCommand(program));
        }

        let explicit_args = explicit_args
            .into_iter()
            .enumerate()
            .map(|(index, arg)| {
                arg.into()
                    .to_arg()
                    .map(Cow::into_owned)
                    .ok_or(CommandError::NonScalarArgument { index })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let env = env
            .into_iter()
            .map(|(name, value)| {
                let name = name.into();
                match value.to_arg() {
                    Some(value) => Ok((name, value.into_owned())),
                    None => Err(CommandError::NonScalarEnvValue { name }),
                }
            })
            .collect::<Result<_, _>>()?;

        let mut args = explicit_args;
        args.extend(tokens);
        Ok(Self { program, args, env })
    }

    /// Tokenizes the `command` and assembles an invocation from it, with no explicit arguments
    /// or environment variables.
    ///
    /// # Errors
    ///
    /// Returns errors from [`tokenize()`] and [`Self::assemble()`].
    pub fn parse(command: &str) -> Result<Self, CommandError> {
        Self::assemble(tokenize(command)?, [] as [Value; 0], [] as [(String, Value); 0])
    }

    /// Tokenizes the `command` and assembles an invocation from it together with the explicit
    /// `args` and `env` variables.
    ///
    /// # Errors
    ///
    /// Returns errors from [`tokenize()`] and [`Self::assemble()`].
    pub fn build<A, E, K>(command: &str, args: A, env: E) -> Result<Self, CommandError>
    where
        A: IntoIterator,
        A::Item: Into<Value>,
        E: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::assemble(tokenize(command)?, args, env)
    }

    /// Returns the base command.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns arguments passed to the base command.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns environment variables set for the process in addition to the inherited ones.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }
}

/// Renders the command line. Arguments are quoted so that [`tokenize()`] parses the output back
/// into the same program and args.
impl fmt::Display for Invocation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.program)?;
        for arg in &self.args {
            write!(formatter, " {}", tokenizer::quote(arg))?;
        }
        Ok(())
    }
}
