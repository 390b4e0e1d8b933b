//! A library for python [dependency specifiers](https://packaging.python.org/en/latest/specifications/dependency-specifiers/),
//! better known as [PEP 508](https://peps.python.org/pep-0508/).
//!
//! ## Usage
//!
//! ```
//! use std::str::FromStr;
//! use pyrite_pep508::Requirement;
//!
//! let input = r#"requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8""#;
//! let requirement = Requirement::from_str(input).unwrap();
//! assert_eq!(requirement.name, "requests");
//! assert_eq!(
//!     requirement.extras.iter().map(ToString::to_string).collect::<Vec<_>>(),
//!     ["security", "tests"],
//! );
//! ```

#![deny(missing_docs)]

use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use unicode_width::UnicodeWidthStr;
use url::Url;

use pyrite_normalize::{canonicalize_name, ExtraName};
use pyrite_pep440::{VersionSpecifier, VersionSpecifiers};

pub use marker::{
    MarkerContext, MarkerEnvironment, MarkerEvalError, MarkerExpression, MarkerOperator,
    MarkerTree, MarkerValue, MarkerValueString, MarkerValueVersion,
};

use crate::tokenizer::{TokenKind, Tokenizer};

mod marker;
mod tokenizer;

/// Error with a span attached, rendered with the offending input underlined.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pep508Error {
    /// Either an error string from our parser or an upstream error from `url`
    pub message: Pep508ErrorSource,
    /// Span start, a byte index into the input
    pub start: usize,
    /// Span length in bytes
    pub len: usize,
    /// The input string, so we can print it underlined
    pub input: String,
}

/// Either an error string from our parser or an upstream error from `url`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Pep508ErrorSource {
    /// An error from our parser
    String(String),
    /// A url parsing error
    UrlError(url::ParseError),
}

impl From<url::ParseError> for Pep508ErrorSource {
    fn from(err: url::ParseError) -> Self {
        Self::UrlError(err)
    }
}

impl Display for Pep508ErrorSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => string.fmt(f),
            Self::UrlError(parse_err) => parse_err.fmt(f),
        }
    }
}

impl Display for Pep508Error {
    /// Pretty formatting with underline.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let start_offset = self.input[..self.start].width();
        let underline_len = if self.start >= self.input.len() {
            // We also allow going one past the input for end-of-input errors
            1
        } else {
            let end = (self.start + self.len).min(self.input.len());
            self.input[self.start..end].width().max(1)
        };
        write!(
            f,
            "{}\n{}\n{}{}",
            self.message,
            self.input,
            " ".repeat(start_offset),
            "^".repeat(underline_len)
        )
    }
}

/// We need this to allow e.g. anyhow's `.context()`
impl std::error::Error for Pep508Error {}

/// A PEP 508 dependency specification.
#[derive(Clone, Debug)]
pub struct Requirement {
    /// The distribution name such as `numpy` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`,
    /// kept in its display form; equality and hashing normalize it
    pub name: String,
    /// The normalized, sorted and deduplicated extras such as `security`,
    /// `tests` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`
    pub extras: Vec<ExtraName>,
    /// The version specifier such as `>= 2.8.1`, `== 2.8.*` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`,
    /// or a url. A requirement can carry one or the other, never both.
    pub version_or_url: Option<VersionOrUrl>,
    /// The markers such as `python_version > "3.8"` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`.
    /// Those are a nested and/or tree.
    pub marker: Option<MarkerTree>,
}

/// The actual version specifier or url to install.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum VersionOrUrl {
    /// A PEP 440 version specifier set
    VersionSpecifier(VersionSpecifiers),
    /// An installable URL
    Url(Url),
}

impl Requirement {
    /// The PEP 503 normalized name.
    pub fn normalized_name(&self) -> String {
        canonicalize_name(&self.name)
    }

    /// The version specifiers of this requirement; empty when the
    /// requirement is url-bound or carries no constraint.
    pub fn specifiers(&self) -> Option<&VersionSpecifiers> {
        match &self.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => Some(specifiers),
            _ => None,
        }
    }

    /// Whether the markers apply in the given environment and context; a
    /// marker-less requirement always applies.
    pub fn evaluate_markers(
        &self,
        env: &MarkerEnvironment,
        context: MarkerContext,
    ) -> Result<bool, MarkerEvalError> {
        match &self.marker {
            Some(marker) => marker.evaluate(env, context),
            None => Ok(true),
        }
    }

    /// Like [`Requirement::evaluate_markers`] under the lenient requirement
    /// context, treating failures as "does not apply".
    pub fn evaluate_markers_or_false(&self, env: &MarkerEnvironment) -> bool {
        self.evaluate_markers(env, MarkerContext::Requirement)
            .unwrap_or(false)
    }
}

/// Equality and hashing go through the canonical forms: the normalized name,
/// the normalized extras, the canonical specifier set or url, and the
/// canonical marker.
impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_name() == other.normalized_name()
            && self.extras == other.extras
            && self.version_or_url == other.version_or_url
            && self.marker == other.marker
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized_name().hash(state);
        self.extras.hash(state);
        self.version_or_url.hash(state);
        self.marker.hash(state);
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(
                f,
                "[{}]",
                self.extras
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<String>>()
                    .join(",")
            )?;
        }
        if let Some(version_or_url) = &self.version_or_url {
            match version_or_url {
                VersionOrUrl::VersionSpecifier(version_specifier) => {
                    let version_specifier: Vec<String> =
                        version_specifier.iter().map(ToString::to_string).collect();
                    write!(f, " {}", version_specifier.join(", "))?;
                }
                VersionOrUrl::Url(url) => {
                    // We add the space for the marker later if necessary
                    write!(f, " @ {url}")?;
                }
            }
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    /// Parse a [dependency specifier](https://packaging.python.org/en/latest/specifications/dependency-specifiers/).
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_requirement(&mut Tokenizer::new(input))
    }
}

/// <https://github.com/serde-rs/serde/issues/908#issuecomment-298027413>
impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

/// <https://github.com/serde-rs/serde/issues/1316#issue-332908452>
impl Serialize for Requirement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Parse the name and its optional trailing separators check.
fn parse_name<'a>(tokenizer: &mut Tokenizer<'a>) -> Result<&'a str, Pep508Error> {
    // https://peps.python.org/pep-0508/#names
    // ^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$ with re.IGNORECASE
    let token = tokenizer.read(
        TokenKind::Identifier,
        "Expected package name starting with an alphanumeric character",
    )?;
    if let Some(last) = token.text.chars().last() {
        // [-_.] can't be the final character
        if matches!(last, '.' | '-' | '_') {
            return Err(tokenizer.raise_at(
                &token,
                format!("Package name must end with an alphanumeric character, not '{last}'"),
            ));
        }
    }
    Ok(token.text)
}

/// Parses extras in the `[extra1,extra2]` format. Extras are stored
/// normalized, sorted and deduplicated.
fn parse_extras(tokenizer: &mut Tokenizer) -> Result<Vec<ExtraName>, Pep508Error> {
    let Some(bracket) = tokenizer.consume(TokenKind::LeftBracket) else {
        return Ok(Vec::new());
    };
    let mut extras = Vec::new();
    loop {
        // wsp* before the identifier
        tokenizer.consume_whitespace();
        // An empty extras list is allowed by the grammar
        if tokenizer.consume(TokenKind::RightBracket).is_some() {
            break;
        }
        let token = tokenizer.read(
            TokenKind::Identifier,
            "Expected an alphanumeric character starting the extra name",
        )?;
        let extra = ExtraName::from_str(token.text)
            .map_err(|err| tokenizer.raise_at(&token, err.to_string()))?;
        extras.push(extra);
        // wsp* after the identifier
        tokenizer.consume_whitespace();
        // end or next identifier?
        if tokenizer.consume(TokenKind::Comma).is_some() {
            continue;
        }
        if tokenizer.consume(TokenKind::RightBracket).is_some() {
            break;
        }
        return Err(if tokenizer.at_end() {
            Pep508Error {
                message: Pep508ErrorSource::String(
                    "Missing closing bracket (expected ']', found end of dependency specification)"
                        .to_string(),
                ),
                start: bracket.start,
                len: 1,
                input: tokenizer.input().to_string(),
            }
        } else {
            tokenizer.raise_syntax_error(
                "Expected either ',' (separating extras) or ']' (ending the extras section)"
                    .to_string(),
            )
        });
    }
    extras.sort();
    extras.dedup();
    Ok(extras)
}

/// Parse a URL reference, validated for the presence of a scheme but nothing
/// more.
fn parse_url(tokenizer: &mut Tokenizer) -> Result<VersionOrUrl, Pep508Error> {
    // wsp*
    tokenizer.consume_whitespace();
    // <URI_reference>
    let token = tokenizer.read(TokenKind::Url, "Expected URL")?;
    let url = Url::parse(token.text).map_err(|err| Pep508Error {
        message: Pep508ErrorSource::UrlError(err),
        start: token.start,
        len: token.len(),
        input: tokenizer.input().to_string(),
    })?;
    Ok(VersionOrUrl::Url(url))
}

/// Such as `>=1.19,<2.0`, delimited by the end of the specifier, a `)` or a
/// `;` for the marker part.
///
/// ```text
/// version_one (wsp* ',' version_one)*
/// ```
fn parse_version_specifiers(tokenizer: &mut Tokenizer) -> Result<VersionSpecifiers, Pep508Error> {
    let mut specifiers: Vec<VersionSpecifier> = Vec::new();
    loop {
        tokenizer.consume_whitespace();
        let token = tokenizer.read(TokenKind::Specifier, "Expected version specifier")?;
        let specifier = VersionSpecifier::from_str(token.text)
            .map_err(|err| tokenizer.raise_at(&token, err.to_string()))?;
        specifiers.push(specifier);
        tokenizer.consume_whitespace();
        if tokenizer.consume(TokenKind::Comma).is_none() {
            break;
        }
    }
    Ok(specifiers.into_iter().collect())
}

/// Parse a [dependency specifier](https://packaging.python.org/en/latest/specifications/dependency-specifiers).
fn parse_requirement(tokenizer: &mut Tokenizer) -> Result<Requirement, Pep508Error> {
    // Technically, the grammar is:
    // ```text
    // name_req      = name wsp* extras? wsp* versionspec? wsp* quoted_marker?
    // url_req       = name wsp* extras? wsp* urlspec wsp+ quoted_marker?
    // specification = wsp* ( url_req | name_req ) wsp*
    // ```
    // So we can merge this into:
    // ```text
    // specification = wsp* name wsp* extras? wsp* (('@' wsp* url) | ('(' versionspec ')') | (versionspec)) wsp* (';' wsp* marker)? wsp*
    // ```
    // wsp*
    tokenizer.consume_whitespace();
    // name
    let name = parse_name(tokenizer)?.to_string();
    // wsp*
    tokenizer.consume_whitespace();
    // extras?
    let extras = parse_extras(tokenizer)?;
    // wsp*
    tokenizer.consume_whitespace();

    // ( url | version specifiers )?
    let version_or_url = if tokenizer.consume(TokenKind::At).is_some() {
        Some(parse_url(tokenizer)?)
    } else if tokenizer.consume(TokenKind::LeftParenthesis).is_some() {
        let specifiers = parse_version_specifiers(tokenizer)?;
        tokenizer.consume_whitespace();
        tokenizer.read(
            TokenKind::RightParenthesis,
            "Missing closing parenthesis (expected ')')",
        )?;
        Some(VersionOrUrl::VersionSpecifier(specifiers))
    } else if tokenizer.check(TokenKind::Specifier).is_some() {
        Some(VersionOrUrl::VersionSpecifier(parse_version_specifiers(
            tokenizer,
        )?))
    } else {
        None
    };

    // wsp*
    tokenizer.consume_whitespace();
    // quoted_marker?
    let marker = if tokenizer.consume(TokenKind::Semicolon).is_some() {
        Some(marker::parse_markers_impl(tokenizer)?)
    } else {
        None
    };
    // wsp*
    tokenizer.consume_whitespace();

    if !tokenizer.at_end() {
        let message = match (&version_or_url, &marker) {
            (_, Some(_)) => "Expected 'and', 'or' or end of input",
            (Some(VersionOrUrl::VersionSpecifier(_)), None) => {
                "Expected end or semicolon (after version specifier)"
            }
            (Some(VersionOrUrl::Url(_)), None) => {
                "Expected end or semicolon (after URL and whitespace)"
            }
            (None, None) => "Expected end or semicolon (after name and no valid version specifier)",
        };
        return Err(tokenizer.raise_syntax_error(message.to_string()));
    }

    Ok(Requirement {
        name,
        extras,
        version_or_url,
        marker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement(input: &str) -> Requirement {
        Requirement::from_str(input).unwrap()
    }

    fn assert_err(input: &str, expected: &str) {
        assert_eq!(
            Requirement::from_str(input).unwrap_err().to_string(),
            expected,
            "{input}"
        );
    }

    #[test]
    fn full_requirement() {
        let parsed =
            requirement(r#"requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8""#);
        assert_eq!(parsed.name, "requests");
        assert_eq!(
            parsed.extras,
            vec![
                ExtraName::from_str("security").unwrap(),
                ExtraName::from_str("tests").unwrap()
            ]
        );
        let specifiers = parsed.specifiers().unwrap();
        assert_eq!(specifiers.len(), 2);
        assert!(parsed.marker.is_some());
        assert_eq!(
            parsed.to_string(),
            "requests[security,tests] ==2.8.*, >=2.8.1 ; python_version > '3.8'"
        );
    }

    #[test]
    fn extras_are_normalized_and_deduplicated() {
        let parsed = requirement("name[foo,BAR]>=2,<3; python_version>'2.0'");
        assert_eq!(parsed.name, "name");
        assert_eq!(
            parsed.extras,
            vec![
                ExtraName::from_str("bar").unwrap(),
                ExtraName::from_str("foo").unwrap()
            ]
        );
        assert_eq!(parsed.specifiers().unwrap().len(), 2);
        assert!(parsed.marker.is_some());

        let parsed = requirement("name[foo, Foo, FOO]");
        assert_eq!(parsed.extras.len(), 1);
    }

    #[test]
    fn name_only() {
        let parsed = requirement("pip");
        assert_eq!(parsed.name, "pip");
        assert!(parsed.extras.is_empty());
        assert!(parsed.version_or_url.is_none());
        assert!(parsed.marker.is_none());
        assert_eq!(parsed.to_string(), "pip");
    }

    #[test]
    fn empty_extras_brackets() {
        let parsed = requirement("pip[]");
        assert!(parsed.extras.is_empty());
    }

    #[test]
    fn parenthesized_specifiers() {
        let parsed = requirement("numpy (>=1.19, <2.0)");
        assert_eq!(parsed.specifiers().unwrap().to_string(), "<2.0, >=1.19");
    }

    #[test]
    fn url_requirement() {
        let parsed = requirement("pip @ https://github.com/pypa/pip/archive/1.3.1.zip");
        match &parsed.version_or_url {
            Some(VersionOrUrl::Url(url)) => {
                assert_eq!(url.scheme(), "https");
            }
            other => panic!("expected url, got {other:?}"),
        }
        assert_eq!(
            parsed.to_string(),
            "pip @ https://github.com/pypa/pip/archive/1.3.1.zip"
        );

        let parsed = requirement("pip @ file:///localbuilds/pip-1.3.1.zip ; os_name == 'posix'");
        assert!(parsed.marker.is_some());
    }

    #[test]
    fn url_requires_scheme() {
        let err = Requirement::from_str("pip @ pip-1.3.1.zip").unwrap_err();
        assert!(
            matches!(err.message, Pep508ErrorSource::UrlError(_)),
            "{err}"
        );
    }

    #[test]
    fn missing_semicolon_message() {
        assert_err(
            "name >=2 blah == 'x'",
            "Expected end or semicolon (after version specifier)\n\
             name >=2 blah == 'x'\n         ^",
        );
        assert_err(
            "name blah",
            "Expected end or semicolon (after name and no valid version specifier)\n\
             name blah\n     ^",
        );
    }

    #[test]
    fn error_display_underlines_specifier() {
        assert_err(
            "numpy ==1.0.org1",
            "Version specifier `==1.0.org1` doesn't match PEP 440 rules\n\
             numpy ==1.0.org1\n      ^^^^^^^^^^",
        );
    }

    #[test]
    fn error_invalid_name() {
        assert_err(
            "==1.0",
            "Expected package name starting with an alphanumeric character\n==1.0\n^",
        );
        assert_err(
            "name- >=1.0",
            "Package name must end with an alphanumeric character, not '-'\nname- >=1.0\n^^^^^",
        );
    }

    #[test]
    fn error_unclosed_extras() {
        assert_err(
            "name[foo",
            "Missing closing bracket (expected ']', found end of dependency specification)\n\
             name[foo\n    ^",
        );
        assert_err(
            "name[foo!]",
            "Expected either ',' (separating extras) or ']' (ending the extras section)\n\
             name[foo!]\n        ^",
        );
    }

    #[test]
    fn canonical_equality_and_hashing() {
        let left = requirement("Flask-Cors >= 3.0, <4");
        let right = requirement("flask_cors <4, >=3.0");
        assert_eq!(left, right);

        let mut set = std::collections::HashSet::new();
        set.insert(left);
        assert!(set.contains(&right));

        assert_ne!(requirement("flask"), requirement("flask[dotenv]"));
    }

    #[test]
    fn marker_evaluation_through_requirement() {
        let env = MarkerEnvironment::new()
            .with_python_version("3.8")
            .with_sys_platform("linux");
        let parsed = requirement("numpy >=1.19 ; python_version >= '3.7'");
        assert!(parsed.evaluate_markers_or_false(&env));
        let parsed = requirement("numpy >=1.19 ; sys_platform == 'win32'");
        assert!(!parsed.evaluate_markers_or_false(&env));
        let parsed = requirement("numpy >=1.19");
        assert!(parsed.evaluate_markers_or_false(&env));
    }

    #[test]
    fn serde_round_trip() {
        let parsed = requirement("numpy[dev] >=1.19 ; python_version >= '3.7'");
        let json = serde_json::to_string(&parsed).unwrap();
        let back: Requirement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, parsed);
    }
}
