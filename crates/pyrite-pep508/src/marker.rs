//! PEP 508 environment markers: grammar, AST and evaluation.
//!
//! Markers gate dependencies on the target environment (python version,
//! operating system, architecture, etc.) or on a requested feature, e.g.
//! `importlib-metadata ; python_version < "3.8"` or
//! `itsdangerous (>=1.1.0) ; extra == 'security'`. The grammar has some
//! historical oversights (e.g. <https://github.com/pypa/packaging.python.org/pull/1181>)
//! and the design of comparisons (PEP 440 comparisons with lexicographic
//! fallback) leads to confusing outcomes, so evaluation validates carefully
//! and warns whenever a bogus comparison is made.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use pyrite_normalize::{canonicalize_name, ExtraName, GroupName};
use pyrite_pep440::{PrereleasePolicy, Version, VersionPattern, VersionSpecifier};

use crate::tokenizer::{TokenKind, Tokenizer};
use crate::Pep508Error;

/// Those environment markers whose value is always a PEP 440 version, such
/// as `python_version`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValueVersion {
    /// `implementation_version`
    ImplementationVersion,
    /// `python_full_version`
    PythonFullVersion,
    /// `python_version`
    PythonVersion,
}

impl Display for MarkerValueVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImplementationVersion => f.write_str("implementation_version"),
            Self::PythonFullVersion => f.write_str("python_full_version"),
            Self::PythonVersion => f.write_str("python_version"),
        }
    }
}

/// Those environment markers whose value is an arbitrary string, such as
/// `sys_platform`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValueString {
    /// `implementation_name`
    ImplementationName,
    /// `os_name`
    OsName,
    /// Deprecated `os.name` from <https://peps.python.org/pep-0345/#environment-markers>
    OsNameDeprecated,
    /// `platform_machine`
    PlatformMachine,
    /// Deprecated `platform.machine` from <https://peps.python.org/pep-0345/#environment-markers>
    PlatformMachineDeprecated,
    /// `platform_python_implementation`
    PlatformPythonImplementation,
    /// Deprecated `platform.python_implementation` from <https://peps.python.org/pep-0345/#environment-markers>
    PlatformPythonImplementationDeprecated,
    /// Deprecated `python_implementation` from
    /// <https://github.com/pypa/packaging/issues/72>
    PythonImplementationDeprecated,
    /// `platform_release`; version-shaped in practice, compared as a version
    /// when both sides parse as one
    PlatformRelease,
    /// `platform_system`
    PlatformSystem,
    /// `platform_version`; version-shaped in practice, compared as a version
    /// when both sides parse as one
    PlatformVersion,
    /// Deprecated `platform.version` from <https://peps.python.org/pep-0345/#environment-markers>
    PlatformVersionDeprecated,
    /// `sys_platform`
    SysPlatform,
    /// Deprecated `sys.platform` from <https://peps.python.org/pep-0345/#environment-markers>
    SysPlatformDeprecated,
}

impl Display for MarkerValueString {
    /// Normalizes deprecated names to the proper ones
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImplementationName => f.write_str("implementation_name"),
            Self::OsName | Self::OsNameDeprecated => f.write_str("os_name"),
            Self::PlatformMachine | Self::PlatformMachineDeprecated => {
                f.write_str("platform_machine")
            }
            Self::PlatformPythonImplementation
            | Self::PlatformPythonImplementationDeprecated
            | Self::PythonImplementationDeprecated => {
                f.write_str("platform_python_implementation")
            }
            Self::PlatformRelease => f.write_str("platform_release"),
            Self::PlatformSystem => f.write_str("platform_system"),
            Self::PlatformVersion | Self::PlatformVersionDeprecated => {
                f.write_str("platform_version")
            }
            Self::SysPlatform | Self::SysPlatformDeprecated => f.write_str("sys_platform"),
        }
    }
}

/// One of the predefined environment variable names, or a quoted literal.
///
/// <https://packaging.python.org/en/latest/specifications/dependency-specifiers/#environment-markers>
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValue {
    /// Those environment markers with a PEP 440 version as value such as `python_version`
    MarkerEnvVersion(MarkerValueVersion),
    /// Those environment markers with an arbitrary string as value such as `sys_platform`
    MarkerEnvString(MarkerValueString),
    /// `extra`: the single extra under evaluation; defaults to the empty
    /// string, so `extra == 'x'` is simply false when no extra was requested
    Extra,
    /// `extras`: the list of requested extras, from PEP 751
    Extras,
    /// `dependency_groups`: the list of requested groups, from PEP 751
    DependencyGroups,
    /// Not a constant, but a user given quoted string with a value inside
    /// such as '3.8' or "windows"
    QuotedString(String),
}

impl MarkerValue {
    fn string_value(value: String) -> Self {
        Self::QuotedString(value)
    }

    /// Whether this variable is one of the version-shaped keys, for which
    /// comparisons dispatch to PEP 440 semantics when both sides parse.
    fn is_version_key(&self) -> bool {
        matches!(
            self,
            Self::MarkerEnvVersion(_)
                | Self::MarkerEnvString(
                    MarkerValueString::PlatformRelease
                        | MarkerValueString::PlatformVersion
                        | MarkerValueString::PlatformVersionDeprecated
                )
        )
    }
}

impl FromStr for MarkerValue {
    type Err = String;

    /// This is specifically for the reserved names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "implementation_name" => Self::MarkerEnvString(MarkerValueString::ImplementationName),
            "implementation_version" => {
                Self::MarkerEnvVersion(MarkerValueVersion::ImplementationVersion)
            }
            "os_name" => Self::MarkerEnvString(MarkerValueString::OsName),
            "os.name" => Self::MarkerEnvString(MarkerValueString::OsNameDeprecated),
            "platform_machine" => Self::MarkerEnvString(MarkerValueString::PlatformMachine),
            "platform.machine" => {
                Self::MarkerEnvString(MarkerValueString::PlatformMachineDeprecated)
            }
            "platform_python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PlatformPythonImplementation)
            }
            "platform.python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PlatformPythonImplementationDeprecated)
            }
            "python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PythonImplementationDeprecated)
            }
            "platform_release" => Self::MarkerEnvString(MarkerValueString::PlatformRelease),
            "platform_system" => Self::MarkerEnvString(MarkerValueString::PlatformSystem),
            "platform_version" => Self::MarkerEnvString(MarkerValueString::PlatformVersion),
            "platform.version" => {
                Self::MarkerEnvString(MarkerValueString::PlatformVersionDeprecated)
            }
            "python_full_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonFullVersion),
            "python_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonVersion),
            "sys_platform" => Self::MarkerEnvString(MarkerValueString::SysPlatform),
            "sys.platform" => Self::MarkerEnvString(MarkerValueString::SysPlatformDeprecated),
            "extra" => Self::Extra,
            "extras" => Self::Extras,
            "dependency_groups" => Self::DependencyGroups,
            _ => return Err(format!("Invalid key: {s}")),
        };
        if matches!(
            value,
            Self::MarkerEnvString(
                MarkerValueString::OsNameDeprecated
                    | MarkerValueString::PlatformMachineDeprecated
                    | MarkerValueString::PlatformPythonImplementationDeprecated
                    | MarkerValueString::PythonImplementationDeprecated
                    | MarkerValueString::PlatformVersionDeprecated
                    | MarkerValueString::SysPlatformDeprecated
            )
        ) {
            tracing::warn!("`{s}` is deprecated in favor of `{value}`");
        }
        Ok(value)
    }
}

impl Display for MarkerValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkerEnvVersion(marker_value_version) => marker_value_version.fmt(f),
            Self::MarkerEnvString(marker_value_string) => marker_value_string.fmt(f),
            Self::Extra => f.write_str("extra"),
            Self::Extras => f.write_str("extras"),
            Self::DependencyGroups => f.write_str("dependency_groups"),
            Self::QuotedString(value) => write!(f, "'{value}'"),
        }
    }
}

/// How to compare key and value, such as by `==`, `>` or `not in`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerOperator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessEqual,
    /// `~=`
    TildeEqual,
    /// `===`: always verbatim string equality
    ExactEqual,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

impl MarkerOperator {
    /// The corresponding PEP 440 comparison, `None` for the operators that
    /// have no version semantics.
    fn to_pep440_operator(self) -> Option<pyrite_pep440::Operator> {
        match self {
            Self::Equal => Some(pyrite_pep440::Operator::Equal),
            Self::NotEqual => Some(pyrite_pep440::Operator::NotEqual),
            Self::GreaterThan => Some(pyrite_pep440::Operator::GreaterThan),
            Self::GreaterEqual => Some(pyrite_pep440::Operator::GreaterThanEqual),
            Self::LessThan => Some(pyrite_pep440::Operator::LessThan),
            Self::LessEqual => Some(pyrite_pep440::Operator::LessThanEqual),
            Self::TildeEqual => Some(pyrite_pep440::Operator::TildeEqual),
            Self::ExactEqual | Self::In | Self::NotIn => None,
        }
    }

    /// Whether this is one of `<`, `<=`, `>`, `>=`.
    fn is_ordered(self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::GreaterEqual | Self::LessThan | Self::LessEqual
        )
    }

    fn from_op_token(text: &str) -> Option<Self> {
        Some(match text {
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessEqual,
            "~=" => Self::TildeEqual,
            "===" => Self::ExactEqual,
            _ => return None,
        })
    }
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::TildeEqual => "~=",
            Self::ExactEqual => "===",
            Self::In => "in",
            Self::NotIn => "not in",
        })
    }
}

/// The context a marker is evaluated in, deciding how strict bogus ordered
/// comparisons are.
///
/// Ordered comparisons between values that do not both parse as PEP 440
/// versions raise [`MarkerEvalError::UndefinedComparison`] under `Metadata`
/// and evaluate to `false` (with a warning) under `Requirement` and
/// `LockFile`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MarkerContext {
    /// Validating core-metadata fields: strict.
    Metadata,
    /// Evaluating a lock file entry: lenient.
    LockFile,
    /// Evaluating a dependency specifier: lenient.
    #[default]
    Requirement,
}

/// Marker evaluation failure.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MarkerEvalError {
    /// The marker references a variable the environment does not define.
    #[error("Marker variable `{name}` is not defined in the given environment")]
    UndefinedEnvironmentName {
        /// The canonical name of the missing variable
        name: String,
    },
    /// An ordered comparison between values that are not both versions,
    /// under the strict [`MarkerContext::Metadata`] context.
    #[error("Cannot compare `{left}` and `{right}` as versions in `{expression}`")]
    UndefinedComparison {
        /// Left operand text
        left: String,
        /// Right operand text
        right: String,
        /// The whole offending expression
        expression: String,
    },
}

/// The marker values of a target interpreter.
///
/// This is the closed PEP 508 key set as a struct; it is produced by a
/// platform probe (reading `sysconfig` and friends is the probe's concern,
/// not this crate's) or assembled by hand through the `with_` builders.
/// Every value is a string; keys that were never set are *undefined* and
/// make evaluation fail with [`MarkerEvalError::UndefinedEnvironmentName`],
/// except `extra`, which defaults to the empty string.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MarkerEnvironment {
    implementation_name: Option<String>,
    implementation_version: Option<String>,
    os_name: Option<String>,
    platform_machine: Option<String>,
    platform_python_implementation: Option<String>,
    platform_release: Option<String>,
    platform_system: Option<String>,
    platform_version: Option<String>,
    python_full_version: Option<String>,
    python_version: Option<String>,
    sys_platform: Option<String>,
    extra: Option<String>,
    extras: Vec<ExtraName>,
    dependency_groups: Vec<GroupName>,
}

macro_rules! environment_field {
    ($field:ident, $setter:ident) => {
        /// Set the value of this environment key.
        #[must_use]
        pub fn $setter(mut self, value: impl Into<String>) -> Self {
            self.$field = Some(value.into());
            self
        }

        /// The value of this environment key, if set.
        pub fn $field(&self) -> Option<&str> {
            self.$field.as_deref()
        }
    };
}

impl MarkerEnvironment {
    /// An environment with no keys set (and `extra` at its empty-string
    /// default).
    pub fn new() -> Self {
        Self::default()
    }

    environment_field!(implementation_name, with_implementation_name);
    environment_field!(implementation_version, with_implementation_version);
    environment_field!(os_name, with_os_name);
    environment_field!(platform_machine, with_platform_machine);
    environment_field!(
        platform_python_implementation,
        with_platform_python_implementation
    );
    environment_field!(platform_release, with_platform_release);
    environment_field!(platform_system, with_platform_system);
    environment_field!(platform_version, with_platform_version);
    environment_field!(python_full_version, with_python_full_version);
    environment_field!(python_version, with_python_version);
    environment_field!(sys_platform, with_sys_platform);

    /// The single extra under evaluation. Never undefined: it defaults to
    /// the empty string.
    pub fn extra(&self) -> &str {
        self.extra.as_deref().unwrap_or("")
    }

    /// Set the extra under evaluation.
    #[must_use]
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// The list of requested extras, for the PEP 751 `extras` key.
    pub fn extras(&self) -> &[ExtraName] {
        &self.extras
    }

    /// Set the list of requested extras.
    #[must_use]
    pub fn with_extras(mut self, extras: Vec<ExtraName>) -> Self {
        self.extras = extras;
        self
    }

    /// The list of requested dependency groups, for the PEP 751
    /// `dependency_groups` key.
    pub fn dependency_groups(&self) -> &[GroupName] {
        &self.dependency_groups
    }

    /// Set the list of requested dependency groups.
    #[must_use]
    pub fn with_dependency_groups(mut self, dependency_groups: Vec<GroupName>) -> Self {
        self.dependency_groups = dependency_groups;
        self
    }

    /// The string value of a version-typed key, if set.
    fn get_version(&self, key: MarkerValueVersion) -> Option<&str> {
        match key {
            MarkerValueVersion::ImplementationVersion => self.implementation_version(),
            MarkerValueVersion::PythonFullVersion => self.python_full_version(),
            MarkerValueVersion::PythonVersion => self.python_version(),
        }
    }

    /// The value of a string-typed key, if set.
    fn get_string(&self, key: MarkerValueString) -> Option<&str> {
        match key {
            MarkerValueString::ImplementationName => self.implementation_name(),
            MarkerValueString::OsName | MarkerValueString::OsNameDeprecated => self.os_name(),
            MarkerValueString::PlatformMachine | MarkerValueString::PlatformMachineDeprecated => {
                self.platform_machine()
            }
            MarkerValueString::PlatformPythonImplementation
            | MarkerValueString::PlatformPythonImplementationDeprecated
            | MarkerValueString::PythonImplementationDeprecated => {
                self.platform_python_implementation()
            }
            MarkerValueString::PlatformRelease => self.platform_release(),
            MarkerValueString::PlatformSystem => self.platform_system(),
            MarkerValueString::PlatformVersion | MarkerValueString::PlatformVersionDeprecated => {
                self.platform_version()
            }
            MarkerValueString::SysPlatform | MarkerValueString::SysPlatformDeprecated => {
                self.sys_platform()
            }
        }
    }
}

/// Represents one clause such as `python_version > "3.8"` in the form
/// ```text
/// <a name from the PEP 508 list | a string> <an operator> <a name from the PEP 508 list | a string>
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MarkerExpression {
    /// A name from the PEP 508 list or a string
    pub l_value: MarkerValue,
    /// An operator, such as `>=` or `not in`
    pub operator: MarkerOperator,
    /// A name from the PEP 508 list or a string
    pub r_value: MarkerValue,
}

impl MarkerExpression {
    /// Evaluate a `<marker_value> <marker_op> <marker_value>` expression.
    fn evaluate(
        &self,
        env: &MarkerEnvironment,
        context: MarkerContext,
    ) -> Result<bool, MarkerEvalError> {
        // The list-valued keys only support membership tests.
        match (&self.l_value, &self.r_value) {
            (MarkerValue::QuotedString(literal), MarkerValue::Extras) => {
                return Ok(self.evaluate_membership(
                    ExtraName::from_str(literal)
                        .ok()
                        .map_or(false, |name| env.extras().contains(&name)),
                ));
            }
            (MarkerValue::QuotedString(literal), MarkerValue::DependencyGroups) => {
                return Ok(self.evaluate_membership(
                    GroupName::from_str(literal)
                        .ok()
                        .map_or(false, |name| env.dependency_groups().contains(&name)),
                ));
            }
            (MarkerValue::Extras | MarkerValue::DependencyGroups, _)
            | (_, MarkerValue::Extras | MarkerValue::DependencyGroups) => {
                tracing::warn!(
                    "The list-valued marker keys only support `in` and `not in` \
                     with a quoted string on the left: `{self}`, evaluating to false"
                );
                return Ok(false);
            }
            (MarkerValue::QuotedString(_), MarkerValue::QuotedString(_)) => {
                // Not even pypa/packaging supports this
                // <https://github.com/pypa/packaging/issues/632>
                tracing::warn!(
                    "Comparing two quoted strings with each other doesn't make sense: \
                     `{self}`, evaluating to false"
                );
                return Ok(false);
            }
            (MarkerValue::QuotedString(_), _) | (_, MarkerValue::QuotedString(_)) => {}
            (_, _) => {
                tracing::warn!(
                    "Comparing two environment markers with each other doesn't make sense: \
                     `{self}`, evaluating to false"
                );
                return Ok(false);
            }
        }

        let left = self.resolve(&self.l_value, env)?;
        let right = self.resolve(&self.r_value, env)?;

        match self.operator {
            // `===` never has version semantics
            MarkerOperator::ExactEqual => return Ok(left == right),
            // Substring containment: "the `in` operator is evaluated using
            // Python's membership semantics"
            MarkerOperator::In => return Ok(right.contains(left)),
            MarkerOperator::NotIn => return Ok(!right.contains(left)),
            _ => {}
        }

        if self.l_value.is_version_key() || self.r_value.is_version_key() {
            // The right side is the specifier operand and may carry a
            // trailing `.*`; the left side is the candidate.
            let operand = VersionPattern::from_str(right).ok();
            let candidate = Version::from_str(left).ok();
            match (candidate, operand) {
                (Some(candidate), Some(operand)) => {
                    // In/NotIn/ExactEqual returned above, all remaining
                    // operators have a PEP 440 meaning.
                    let Some(operator) = self.operator.to_pep440_operator() else {
                        return Ok(false);
                    };
                    return match VersionSpecifier::new(operator, operand) {
                        Ok(specifier) => {
                            Ok(specifier.contains_with(&candidate, PrereleasePolicy::Include))
                        }
                        Err(err) => {
                            tracing::warn!(
                                "Invalid operator/version combination in `{self}`, \
                                 evaluating to false: {err}"
                            );
                            Ok(false)
                        }
                    };
                }
                _ => {
                    // A version-shaped key compared against something that is
                    // not a version. Equality falls back to strings; ordered
                    // comparisons are undefined.
                    if self.operator.is_ordered() || self.operator == MarkerOperator::TildeEqual {
                        return self.undefined_comparison(left, right, context);
                    }
                }
            }
        }

        self.compare_strings(left, right, context)
    }

    /// Resolve one side of the expression to its string value.
    fn resolve<'a>(
        &self,
        value: &'a MarkerValue,
        env: &'a MarkerEnvironment,
    ) -> Result<&'a str, MarkerEvalError> {
        match value {
            MarkerValue::QuotedString(literal) => Ok(literal),
            MarkerValue::Extra => Ok(env.extra()),
            MarkerValue::MarkerEnvVersion(key) => {
                env.get_version(*key)
                    .ok_or_else(|| MarkerEvalError::UndefinedEnvironmentName {
                        name: key.to_string(),
                    })
            }
            MarkerValue::MarkerEnvString(key) => {
                env.get_string(*key)
                    .ok_or_else(|| MarkerEvalError::UndefinedEnvironmentName {
                        name: key.to_string(),
                    })
            }
            MarkerValue::Extras | MarkerValue::DependencyGroups => {
                unreachable!("list-valued keys are handled before resolution")
            }
        }
    }

    /// Apply `in`/`not in` polarity to a membership result.
    fn evaluate_membership(&self, contained: bool) -> bool {
        match self.operator {
            MarkerOperator::In => contained,
            MarkerOperator::NotIn => !contained,
            _ => {
                tracing::warn!(
                    "The list-valued marker keys only support `in` and `not in`: \
                     `{self}`, evaluating to false"
                );
                false
            }
        }
    }

    /// Compare two strings by PEP 508 logic, with warnings.
    fn compare_strings(
        &self,
        left: &str,
        right: &str,
        context: MarkerContext,
    ) -> Result<bool, MarkerEvalError> {
        // PEP 685: extra comparisons compare normalized names
        let extra_involved =
            self.l_value == MarkerValue::Extra || self.r_value == MarkerValue::Extra;
        Ok(match self.operator {
            MarkerOperator::Equal if extra_involved => {
                canonicalize_name(left) == canonicalize_name(right)
            }
            MarkerOperator::NotEqual if extra_involved => {
                canonicalize_name(left) != canonicalize_name(right)
            }
            MarkerOperator::Equal => left == right,
            MarkerOperator::NotEqual => left != right,
            MarkerOperator::GreaterThan
            | MarkerOperator::GreaterEqual
            | MarkerOperator::LessThan
            | MarkerOperator::LessEqual => {
                tracing::warn!("Comparing `{left}` and `{right}` lexicographically");
                match self.operator {
                    MarkerOperator::GreaterThan => left > right,
                    MarkerOperator::GreaterEqual => left >= right,
                    MarkerOperator::LessThan => left < right,
                    MarkerOperator::LessEqual => left <= right,
                    _ => unreachable!(),
                }
            }
            MarkerOperator::TildeEqual => {
                return self.undefined_comparison(left, right, context);
            }
            MarkerOperator::ExactEqual | MarkerOperator::In | MarkerOperator::NotIn => {
                unreachable!("handled before string comparison")
            }
        })
    }

    /// An ordered comparison that has no version semantics: an error under
    /// the metadata context, false elsewhere.
    fn undefined_comparison(
        &self,
        left: &str,
        right: &str,
        context: MarkerContext,
    ) -> Result<bool, MarkerEvalError> {
        if context == MarkerContext::Metadata {
            return Err(MarkerEvalError::UndefinedComparison {
                left: left.to_string(),
                right: right.to_string(),
                expression: self.to_string(),
            });
        }
        tracing::warn!("Can't compare `{left}` and `{right}` in `{self}`, evaluating to false");
        Ok(false)
    }
}

impl FromStr for MarkerExpression {
    type Err = Pep508Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokenizer = Tokenizer::new(s);
        let expression = parse_marker_key_op_value(&mut tokenizer)?;
        tokenizer.consume_whitespace();
        if !tokenizer.at_end() {
            return Err(
                tokenizer.raise_syntax_error("Expected end of input".to_string())
            );
        }
        Ok(expression)
    }
}

impl Display for MarkerExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.l_value, self.operator, self.r_value)
    }
}

/// Represents one of the nested marker expressions with and/or/parentheses.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerTree {
    /// A simple expression such as `python_version > "3.8"`
    Expression(MarkerExpression),
    /// An and between nested expressions, such as
    /// `python_version > "3.8" and implementation_name == 'cpython'`
    And(Vec<MarkerTree>),
    /// An or between nested expressions, such as
    /// `python_version > "3.8" or implementation_name == 'cpython'`
    Or(Vec<MarkerTree>),
}

impl FromStr for MarkerTree {
    type Err = Pep508Error;

    fn from_str(markers: &str) -> Result<Self, Self::Err> {
        let mut tokenizer = Tokenizer::new(markers);
        let marker = parse_markers_impl(&mut tokenizer)?;
        tokenizer.consume_whitespace();
        if !tokenizer.at_end() {
            return Err(tokenizer.raise_syntax_error(
                "Unexpected character, expected 'and', 'or' or end of input".to_string(),
            ));
        }
        Ok(marker)
    }
}

impl MarkerTree {
    /// Does this marker apply in the given environment and context?
    ///
    /// `and`/`or` short-circuit, so an undefined name in a pruned branch does
    /// not fail the evaluation.
    pub fn evaluate(
        &self,
        env: &MarkerEnvironment,
        context: MarkerContext,
    ) -> Result<bool, MarkerEvalError> {
        match self {
            Self::Expression(expression) => expression.evaluate(env, context),
            Self::And(expressions) => {
                for expression in expressions {
                    if !expression.evaluate(env, context)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(expressions) => {
                for expression in expressions {
                    if expression.evaluate(env, context)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Evaluate under the lenient requirement context, treating failures
    /// (such as a partial environment) as "does not apply".
    pub fn evaluate_or_false(&self, env: &MarkerEnvironment) -> bool {
        self.evaluate(env, MarkerContext::Requirement)
            .unwrap_or(false)
    }
}

impl Display for MarkerTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let format_inner = |expression: &Self| {
            if matches!(expression, Self::Expression(_)) {
                format!("{expression}")
            } else {
                format!("({expression})")
            }
        };
        match self {
            Self::Expression(expression) => write!(f, "{expression}"),
            Self::And(and_list) => f.write_str(
                &and_list
                    .iter()
                    .map(format_inner)
                    .collect::<Vec<String>>()
                    .join(" and "),
            ),
            Self::Or(or_list) => f.write_str(
                &or_list
                    .iter()
                    .map(format_inner)
                    .collect::<Vec<String>>()
                    .join(" or "),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for MarkerTree {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for MarkerTree {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// ```text
/// marker_var    = quoted string | env variable name
/// ```
fn parse_marker_value(tokenizer: &mut Tokenizer) -> Result<MarkerValue, Pep508Error> {
    tokenizer.consume_whitespace();
    if let Some(token) = tokenizer.consume(TokenKind::QuotedString) {
        // The rule guarantees matching quotes around the value
        let value = token.text[1..token.text.len() - 1].to_string();
        return Ok(MarkerValue::string_value(value));
    }
    if let Some(token) = tokenizer.consume(TokenKind::Variable) {
        return MarkerValue::from_str(token.text)
            .map_err(|err| tokenizer.raise_at(&token, err));
    }
    // For the error message, show the word we found instead
    if let Some(token) = tokenizer.check(TokenKind::Identifier) {
        return Err(tokenizer.raise_at(
            &token,
            format!("Expected a valid marker name, found '{}'", token.text),
        ));
    }
    Err(tokenizer.raise_syntax_error(
        "Expected a marker value (a quoted string or an environment name)".to_string(),
    ))
}

/// ```text
/// version_cmp   = wsp* <'<=' | '<' | '!=' | '==' | '>=' | '>' | '~=' | '==='>
/// marker_op     = version_cmp | (wsp* 'in') | (wsp* 'not' wsp+ 'in')
/// ```
fn parse_marker_operator(tokenizer: &mut Tokenizer) -> Result<MarkerOperator, Pep508Error> {
    tokenizer.consume_whitespace();
    if let Some(token) = tokenizer.consume(TokenKind::Op) {
        return MarkerOperator::from_op_token(token.text).ok_or_else(|| {
            tokenizer.raise_at(
                &token,
                format!("Expected a valid marker operator, found '{}'", token.text),
            )
        });
    }
    if tokenizer.consume(TokenKind::In).is_some() {
        return Ok(MarkerOperator::In);
    }
    if tokenizer.consume(TokenKind::Not).is_some() {
        tokenizer.read(TokenKind::Whitespace, "Expected whitespace after 'not'")?;
        tokenizer.read(TokenKind::In, "Expected 'in' after 'not'")?;
        return Ok(MarkerOperator::NotIn);
    }
    Err(tokenizer.raise_syntax_error(
        "Expected a valid marker operator (such as '>=' or 'not in')".to_string(),
    ))
}

/// ```text
/// marker_var:l marker_op:o marker_var:r
/// ```
fn parse_marker_key_op_value(tokenizer: &mut Tokenizer) -> Result<MarkerExpression, Pep508Error> {
    let l_value = parse_marker_value(tokenizer)?;
    let operator = parse_marker_operator(tokenizer)?;
    let r_value = parse_marker_value(tokenizer)?;
    Ok(MarkerExpression {
        l_value,
        operator,
        r_value,
    })
}

/// ```text
/// marker_expr   = marker_var:l marker_op:o marker_var:r -> (o, l, r)
///               | wsp* '(' marker:m wsp* ')' -> m
/// ```
fn parse_marker_expr(tokenizer: &mut Tokenizer) -> Result<MarkerTree, Pep508Error> {
    tokenizer.consume_whitespace();
    if tokenizer.consume(TokenKind::LeftParenthesis).is_some() {
        let marker = parse_marker_or(tokenizer)?;
        tokenizer.consume_whitespace();
        tokenizer.read(TokenKind::RightParenthesis, "Expected ')'")?;
        Ok(marker)
    } else {
        Ok(MarkerTree::Expression(parse_marker_key_op_value(tokenizer)?))
    }
}

/// ```text
/// marker_and    = marker_expr:l wsp* 'and' marker_expr:r -> ('and', l, r)
///               | marker_expr:m -> m
/// ```
fn parse_marker_and(tokenizer: &mut Tokenizer) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(tokenizer, "and", MarkerTree::And, parse_marker_expr)
}

/// ```text
/// marker_or     = marker_and:l wsp* 'or' marker_and:r -> ('or', l, r)
///               | marker_and:m -> m
/// ```
fn parse_marker_or(tokenizer: &mut Tokenizer) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(tokenizer, "or", MarkerTree::Or, parse_marker_and)
}

/// Parses both `marker_and` and `marker_or`
fn parse_marker_op(
    tokenizer: &mut Tokenizer,
    op: &str,
    op_constructor: fn(Vec<MarkerTree>) -> MarkerTree,
    parse_inner: fn(&mut Tokenizer) -> Result<MarkerTree, Pep508Error>,
) -> Result<MarkerTree, Pep508Error> {
    let first_element = parse_inner(tokenizer)?;
    let mut expressions = vec![first_element];
    loop {
        tokenizer.consume_whitespace();
        match tokenizer.check(TokenKind::BoolOp) {
            Some(token) if token.text == op => {
                tokenizer.consume(TokenKind::BoolOp);
                expressions.push(parse_inner(tokenizer)?);
            }
            _ => {
                // Build minimal trees
                return if expressions.len() == 1 {
                    Ok(expressions.remove(0))
                } else {
                    Ok(op_constructor(expressions))
                };
            }
        }
    }
}

/// ```text
/// marker        = marker_or
/// ```
pub(crate) fn parse_markers_impl(tokenizer: &mut Tokenizer) -> Result<MarkerTree, Pep508Error> {
    parse_marker_or(tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env37() -> MarkerEnvironment {
        MarkerEnvironment::new()
            .with_implementation_name("cpython")
            .with_implementation_version("3.7.13")
            .with_os_name("posix")
            .with_platform_machine("x86_64")
            .with_platform_python_implementation("CPython")
            .with_platform_release("5.15.0")
            .with_platform_system("Linux")
            .with_platform_version("#1 SMP")
            .with_python_full_version("3.7.13")
            .with_python_version("3.7")
            .with_sys_platform("linux")
    }

    fn marker(input: &str) -> MarkerTree {
        MarkerTree::from_str(input).unwrap()
    }

    fn evaluates(input: &str, env: &MarkerEnvironment) -> bool {
        marker(input).evaluate(env, MarkerContext::Requirement).unwrap()
    }

    /// Copied from <https://github.com/pypa/packaging/blob/85ff971a250dc01db188ef9775499c15553a8c95/tests/test_markers.py#L175-L221>
    #[test]
    fn marker_equivalence() {
        let values = [
            (r"python_version == '2.7'", r#"python_version == "2.7""#),
            (r#"python_version == "2.7""#, r#"python_version == "2.7""#),
            (
                r#"python_version == "2.7" and os_name == "posix""#,
                r#"python_version == "2.7" and os_name == "posix""#,
            ),
            (
                r#"python_version == "2.7" or os_name == "posix""#,
                r#"python_version == "2.7" or os_name == "posix""#,
            ),
            (
                r#"python_version == "2.7" and os_name == "posix" or sys_platform == "win32""#,
                r#"python_version == "2.7" and os_name == "posix" or sys_platform == "win32""#,
            ),
            (r#"(python_version == "2.7")"#, r#"python_version == "2.7""#),
            (
                r#"(python_version == "2.7" and sys_platform == "win32")"#,
                r#"python_version == "2.7" and sys_platform == "win32""#,
            ),
            (
                r#"python_version == "2.7" and (sys_platform == "win32" or sys_platform == "linux")"#,
                r#"python_version == "2.7" and (sys_platform == "win32" or sys_platform == "linux")"#,
            ),
        ];
        for (a, b) in values {
            assert_eq!(marker(a).to_string(), marker(b).to_string(), "{a} {b}");
        }
    }

    #[test]
    fn evaluate_version_comparisons() {
        let env = env37();
        assert!(evaluates("python_version > '2'", &env));
        assert!(evaluates("python_version < '3.8'", &env));
        assert!(!evaluates("python_version < '3.7'", &env));
        assert!(evaluates("python_version <= '3.7'", &env));
        assert!(evaluates("python_version == '3.7'", &env));
        assert!(evaluates("python_version ~= '3.7'", &env));
        // Quoted side may be a wildcard pattern
        assert!(evaluates("python_version == '3.*'", &env));
        assert!(!evaluates("python_version == '3.8.*'", &env));
        // The literal may also be on the left
        assert!(evaluates("'3.6' < python_version", &env));
        assert!(!evaluates("'3.8' < python_version", &env));
        // Zero padding applies
        assert!(evaluates("python_full_version >= '3.7'", &env));
    }

    #[test]
    fn evaluate_false_with_older_python() {
        let env = MarkerEnvironment::new().with_python_version("1.5");
        assert!(!evaluates("python_version > '2'", &env));
    }

    #[test]
    fn evaluate_string_comparisons() {
        let env = env37();
        assert!(evaluates("os_name == 'posix'", &env));
        assert!(evaluates("sys_platform != 'win32'", &env));
        assert!(evaluates("'lin' in sys_platform", &env));
        assert!(evaluates("'win' not in sys_platform", &env));
        // Lexicographic ordering on plain string keys, with a warning
        assert!(evaluates("os_name < 'zzz'", &env));
    }

    #[test]
    fn evaluate_extra() {
        let env = env37();
        // `extra` defaults to the empty string, never undefined
        assert!(!evaluates("extra == 'security'", &env));
        assert!(evaluates("extra != 'security'", &env));

        let env = env37().with_extra("Security");
        // PEP 685: compared after normalization
        assert!(evaluates("extra == 'security'", &env));
        assert!(evaluates("'security' == extra", &env));
        assert!(!evaluates("extra == 'tests'", &env));
    }

    #[test]
    fn evaluate_list_valued_keys() {
        let env = env37().with_extras(vec![
            ExtraName::from_str("security").unwrap(),
            ExtraName::from_str("tests").unwrap(),
        ]);
        assert!(evaluates("'security' in extras", &env));
        assert!(evaluates("'docs' not in extras", &env));
        assert!(!evaluates("'docs' in extras", &env));

        let env = env37().with_dependency_groups(vec![GroupName::from_str("dev").unwrap()]);
        assert!(evaluates("'dev' in dependency_groups", &env));
        assert!(!evaluates("'docs' in dependency_groups", &env));
    }

    #[test]
    fn evaluate_platform_release_fallback() {
        // platform_release is version-shaped here, so version semantics apply
        let env = env37();
        assert!(evaluates("platform_release >= '5.0'", &env));
        // ... but falls back cleanly when it is not a version
        let env = env37().with_platform_release("5.15.0-86-generic");
        assert!(!marker("platform_release >= '5.0'").evaluate_or_false(&env));
        // Equality still compares as strings
        assert!(evaluates("platform_release == '5.15.0-86-generic'", &env));
    }

    #[test]
    fn metadata_context_is_strict() {
        let env = env37().with_platform_release("5.15.0-86-generic");
        let tree = marker("platform_release >= '5.0'");
        assert_eq!(
            tree.evaluate(&env, MarkerContext::Metadata),
            Err(MarkerEvalError::UndefinedComparison {
                left: "5.15.0-86-generic".to_string(),
                right: "5.0".to_string(),
                expression: "platform_release >= '5.0'".to_string(),
            })
        );
        assert_eq!(tree.evaluate(&env, MarkerContext::LockFile), Ok(false));
        assert_eq!(tree.evaluate(&env, MarkerContext::Requirement), Ok(false));
    }

    #[test]
    fn undefined_environment_name() {
        let env = MarkerEnvironment::new().with_python_version("3.7");
        assert_eq!(
            marker("os_name == 'posix'").evaluate(&env, MarkerContext::Requirement),
            Err(MarkerEvalError::UndefinedEnvironmentName {
                name: "os_name".to_string(),
            })
        );
        assert!(!marker("os_name == 'posix'").evaluate_or_false(&env));
        // Short-circuiting hides the undefined branch
        assert!(marker("python_version == '3.7' or os_name == 'posix'")
            .evaluate(&env, MarkerContext::Requirement)
            .unwrap());
    }

    #[test]
    fn exact_equal_is_verbatim() {
        let env = env37();
        assert!(evaluates("python_version === '3.7'", &env));
        // No version normalization: `3.7.0` is a different string
        assert!(!evaluates("python_version === '3.7.0'", &env));
    }

    #[test]
    fn deprecated_aliases() {
        let env = env37();
        assert!(evaluates("os.name == 'posix'", &env));
        assert!(evaluates("sys.platform == 'linux'", &env));
        assert!(evaluates("platform.machine == 'x86_64'", &env));
        assert!(evaluates("python_implementation == 'CPython'", &env));
        // Display normalizes to the canonical spelling
        assert_eq!(
            marker("os.name == 'posix'").to_string(),
            "os_name == 'posix'"
        );
    }

    #[test]
    fn bogus_comparisons_evaluate_to_false() {
        let env = env37();
        // marker against marker
        assert!(!evaluates("os_name == sys_platform", &env));
        // literal against literal
        assert!(!evaluates("'a' == 'a'", &env));
        // list key with a scalar operator
        assert!(!evaluates("extras == 'security'", &env));
    }

    #[test]
    fn parse_errors() {
        for (input, expected) in [
            (
                "blah == '3.7'",
                "Expected a valid marker name, found 'blah'",
            ),
            (
                "python_version == ",
                "Expected a marker value (a quoted string or an environment name)",
            ),
            (
                "python_version %% '3.7'",
                "Expected a valid marker operator (such as '>=' or 'not in')",
            ),
            (
                "(python_version == '3.7'",
                "Expected ')'",
            ),
            (
                "python_version == '3.7' junk",
                "Unexpected character, expected 'and', 'or' or end of input",
            ),
        ] {
            let err = MarkerTree::from_str(input).unwrap_err();
            assert!(
                err.to_string().starts_with(expected),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn evaluation_is_pure() {
        let env = env37();
        let tree = marker("python_version >= '3.6' and sys_platform == 'linux'");
        let first = tree.evaluate(&env, MarkerContext::Requirement).unwrap();
        for _ in 0..3 {
            assert_eq!(
                tree.evaluate(&env, MarkerContext::Requirement).unwrap(),
                first
            );
        }
    }

    #[test]
    fn serde_round_trip() {
        let tree = marker("python_version >= '3.6' and sys_platform == 'linux'");
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(
            json,
            r#""python_version >= '3.6' and sys_platform == 'linux'""#
        );
        let back: MarkerTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }
}
