//! Search filter construction.
//!
//! Object-type filters are built from a [`Filter`] tree and rendered in RFC 4515 string form.
//! Selector values are escaped before interpolation; raw caller expressions are parsed (and so
//! syntax-checked) with [`Filter::parse`] instead of being spliced in as text.

use crate::Result;
use dirsrv_core::error::Error;
use std::fmt;

/// Boolean search filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Conjunction.
    And(Vec<Filter>),
    /// Disjunction.
    Or(Vec<Filter>),
    /// Negation.
    Not(Box<Filter>),
    /// Equality assertion; the value is stored unescaped.
    Equality {
        /// Attribute description.
        attribute: String,
        /// Assertion value.
        value: String,
    },
    /// Presence assertion (`attr=*`).
    Present(String),
    /// Substring assertion; components are stored unescaped.
    Substring {
        /// Attribute description.
        attribute: String,
        /// Leading component.
        initial: Option<String>,
        /// Middle components.
        any: Vec<String>,
        /// Trailing component.
        last: Option<String>,
    },
    /// Ordering assertion (`>=` or `<=`).
    Ordering {
        /// Attribute description.
        attribute: String,
        /// `true` for `>=`, `false` for `<=`.
        greater: bool,
        /// Assertion value.
        value: String,
    },
    /// Approximate assertion (`~=`).
    Approx {
        /// Attribute description.
        attribute: String,
        /// Assertion value.
        value: String,
    },
}

impl Filter {
    /// Equality assertion on `attribute`.
    #[must_use]
    pub fn equality(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equality {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Conjunction of `filters`, with nested conjunctions flattened.
    #[must_use]
    pub fn and(filters: Vec<Filter>) -> Self {
        let mut flat = Vec::with_capacity(filters.len());
        for filter in filters {
            match filter {
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Self::And(flat)
    }

    /// Disjunction of `filters`.
    #[must_use]
    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    /// Parses an RFC 4515 filter string.
    ///
    /// A bare `attr=value` item without surrounding parentheses is accepted as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if the string is not a well-formed filter.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "empty filter"));
        }
        let wrapped;
        let source = if trimmed.starts_with('(') {
            trimmed
        } else {
            wrapped = format!("({trimmed})");
            wrapped.as_str()
        };

        let mut parser = Parser {
            input: source,
            chars: source.char_indices().collect(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.chars.len() {
            return Err(invalid(input, "trailing characters"));
        }
        Ok(filter)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Not(filter) => write!(f, "(!{filter})"),
            Self::Equality { attribute, value } => {
                write!(f, "({attribute}={})", escape_filter_value(value))
            }
            Self::Present(attribute) => write!(f, "({attribute}=*)"),
            Self::Substring {
                attribute,
                initial,
                any,
                last,
            } => {
                write!(f, "({attribute}=")?;
                if let Some(initial) = initial {
                    f.write_str(&escape_filter_value(initial))?;
                }
                f.write_str("*")?;
                for component in any {
                    write!(f, "{}*", escape_filter_value(component))?;
                }
                if let Some(last) = last {
                    f.write_str(&escape_filter_value(last))?;
                }
                f.write_str(")")
            }
            Self::Ordering {
                attribute,
                greater,
                value,
            } => {
                let op = if *greater { ">=" } else { "<=" };
                write!(f, "({attribute}{op}{})", escape_filter_value(value))
            }
            Self::Approx { attribute, value } => {
                write!(f, "({attribute}~={})", escape_filter_value(value))
            }
        }
    }
}

/// Conjunction of `(objectclass=c)` terms; `(objectclass=*)` when no class is given.
#[must_use]
pub fn object_class_filter<S: AsRef<str>>(object_classes: &[S]) -> Filter {
    if object_classes.is_empty() {
        return Filter::Present("objectclass".to_string());
    }
    Filter::And(
        object_classes
            .iter()
            .map(|class| Filter::equality("objectclass", class.as_ref()))
            .collect(),
    )
}

/// Builds `(&(objectclass=c)*(|(attr=selector)*))`.
///
/// A single selector value is matched against every filter attribute. Several values are paired
/// positionally with the attributes. An empty selector matches every entry of the type.
///
/// # Errors
///
/// Returns [`Error::ValueError`] if several selector values are given and their count differs
/// from the number of filter attributes, or if a selector is given without filter attributes.
pub fn generate<C, S, A>(object_classes: &[C], selector: &[S], filter_attrs: &[A]) -> Result<Filter>
where
    C: AsRef<str>,
    S: AsRef<str>,
    A: AsRef<str>,
{
    let class_filter = object_class_filter(object_classes);
    if selector.is_empty() {
        return Ok(class_filter);
    }
    if filter_attrs.is_empty() {
        return Err(Error::ValueError(
            "selector given but the object type declares no filter attributes".to_string(),
        ));
    }

    let terms = match selector {
        [value] => filter_attrs
            .iter()
            .map(|attr| Filter::equality(attr.as_ref(), value.as_ref()))
            .collect::<Vec<_>>(),
        values if values.len() == filter_attrs.len() => filter_attrs
            .iter()
            .zip(values)
            .map(|(attr, value)| Filter::equality(attr.as_ref(), value.as_ref()))
            .collect(),
        values => {
            return Err(Error::ValueError(format!(
                "{} selector values cannot be paired with {} filter attributes",
                values.len(),
                filter_attrs.len()
            )))
        }
    };

    Ok(Filter::and(vec![class_filter, Filter::or(terms)]))
}

/// Escapes filter metacharacters (RFC 4515 section 3).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    value
        .chars()
        .flat_map(|ch| match ch {
            '*' => "\\2a".chars().collect::<Vec<_>>(),
            '(' => "\\28".chars().collect(),
            ')' => "\\29".chars().collect(),
            '\\' => "\\5c".chars().collect(),
            '\0' => "\\00".chars().collect(),
            _ => vec![ch],
        })
        .collect::<String>()
}

/// Reverses [`escape_filter_value`] (and any other `\XX` hex escapes).
///
/// # Errors
///
/// Returns [`Error::ValueError`] on a truncated or non-hex escape.
pub fn unescape_filter_value(value: &str) -> Result<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let pair: String = chars.by_ref().take(2).collect();
            let byte = (pair.len() == 2)
                .then(|| u8::from_str_radix(&pair, 16).ok())
                .flatten()
                .ok_or_else(|| invalid(value, "bad escape sequence"))?;
            bytes.push(byte);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }
    String::from_utf8(bytes).map_err(|_| invalid(value, "escape produced invalid UTF-8"))
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::ValueError(format!("invalid filter `{input}`: {reason}"))
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, ch)| *ch)
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.peek() {
            Some(ch) if ch == expected => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(invalid(self.input, &format!("expected `{expected}`"))),
        }
    }

    fn filter(&mut self) -> Result<Filter> {
        self.expect('(')?;
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(invalid(self.input, "unexpected end")),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>> {
        let mut filters = Vec::new();
        while self.peek() == Some('(') {
            filters.push(self.filter()?);
        }
        if filters.is_empty() {
            return Err(invalid(self.input, "empty filter list"));
        }
        Ok(filters)
    }

    fn item(&mut self) -> Result<Filter> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if matches!(ch, '=' | '~' | '>' | '<' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let attribute = self.slice(start, self.pos).trim().to_string();
        if attribute.is_empty() {
            return Err(invalid(self.input, "missing attribute"));
        }

        let operator = match self.peek() {
            Some('=') => {
                self.pos += 1;
                "="
            }
            Some(op @ ('~' | '>' | '<')) => {
                self.pos += 1;
                self.expect('=')?;
                match op {
                    '~' => "~=",
                    '>' => ">=",
                    _ => "<=",
                }
            }
            _ => return Err(invalid(self.input, "missing operator")),
        };

        let value_start = self.pos;
        while let Some(ch) = self.peek() {
            if ch == ')' || ch == '(' {
                break;
            }
            self.pos += 1;
        }
        let raw_value = self.slice(value_start, self.pos);

        match operator {
            "~=" => Ok(Filter::Approx {
                attribute,
                value: unescape_filter_value(raw_value)?,
            }),
            ">=" | "<=" => Ok(Filter::Ordering {
                attribute,
                greater: operator == ">=",
                value: unescape_filter_value(raw_value)?,
            }),
            _ if raw_value == "*" => Ok(Filter::Present(attribute)),
            _ if raw_value.contains('*') => {
                let mut parts = raw_value.split('*').collect::<Vec<_>>();
                let last = parts.pop().filter(|part| !part.is_empty());
                let initial = if parts.is_empty() {
                    None
                } else {
                    Some(parts.remove(0)).filter(|part| !part.is_empty())
                };
                Ok(Filter::Substring {
                    attribute,
                    initial: initial.map(unescape_filter_value).transpose()?,
                    any: parts
                        .into_iter()
                        .filter(|part| !part.is_empty())
                        .map(unescape_filter_value)
                        .collect::<Result<Vec<_>>>()?,
                    last: last.map(unescape_filter_value).transpose()?,
                })
            }
            _ => Ok(Filter::Equality {
                attribute,
                value: unescape_filter_value(raw_value)?,
            }),
        }
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        let begin = self.chars.get(start).map_or(self.input.len(), |(i, _)| *i);
        let finish = self.chars.get(end).map_or(self.input.len(), |(i, _)| *i);
        &self.input[begin..finish]
    }
}
