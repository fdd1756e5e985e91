//! Selector type definitions.

use std::fmt;

/// A comma-separated group of selectors (e.g., "div.Cp, table > tbody").
///
/// An element matches the list if it matches any member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectorList(pub Vec<Selector>);

impl SelectorList {
    /// The selectors in this list.
    pub fn selectors(&self) -> &[Selector] {
        &self.0
    }
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, selector) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", selector)?;
        }
        Ok(())
    }
}

/// A complex selector (e.g., "table.cf > colgroup > col").
///
/// A selector consists of one or more compound parts connected by combinators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    /// Chain of compound parts, leftmost first.
    pub parts: Vec<SelectorPart>,
    /// Combinators between parts (length = parts.len() - 1).
    pub combinators: Vec<Combinator>,
}

impl Selector {
    /// Get the rightmost (subject) selector part.
    pub fn subject(&self) -> Option<&SelectorPart> {
        self.parts.last()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                match &self.combinators[i - 1] {
                    Combinator::Descendant => write!(f, " ")?,
                    Combinator::Child => write!(f, " > ")?,
                    Combinator::AdjacentSibling => write!(f, " + ")?,
                    Combinator::GeneralSibling => write!(f, " ~ ")?,
                }
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// A compound selector (e.g., "tr.zA[id]:not(.bundle)").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SelectorPart {
    /// Tag name or universal.
    pub type_selector: Option<TypeSelector>,
    /// ID selector (#id).
    pub id: Option<String>,
    /// Class selectors (.class).
    pub classes: Vec<String>,
    /// Attribute selectors ([name], [name=value], ...).
    pub attributes: Vec<AttributeSelector>,
    /// Structural pseudo-classes.
    pub pseudo_classes: Vec<PseudoClass>,
}

impl SelectorPart {
    /// Check whether the part has no constraints at all.
    pub fn is_empty(&self) -> bool {
        self.type_selector.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.pseudo_classes.is_empty()
    }
}

impl fmt::Display for SelectorPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_selector {
            Some(TypeSelector::Universal) => write!(f, "*")?,
            Some(TypeSelector::Tag(t)) => write!(f, "{}", t)?,
            None => {}
        }
        if let Some(id) = &self.id {
            write!(f, "#{}", id)?;
        }
        for class in &self.classes {
            write!(f, ".{}", class)?;
        }
        for attribute in &self.attributes {
            write!(f, "{}", attribute)?;
        }
        for pseudo in &self.pseudo_classes {
            write!(f, ":{}", pseudo)?;
        }
        Ok(())
    }
}

/// Type selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSelector {
    /// Universal selector (*).
    Universal,
    /// Lowercase tag name.
    Tag(String),
}

/// Combinator between selector parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    /// Descendant combinator (space): matches any descendant.
    Descendant,
    /// Child combinator (>): matches direct child only.
    Child,
    /// Adjacent sibling (+): matches immediately following sibling.
    AdjacentSibling,
    /// General sibling (~): matches any following sibling.
    GeneralSibling,
}

/// An attribute selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeSelector {
    /// Attribute name, lowercase.
    pub name: String,
    /// Value test; `None` tests presence only.
    pub operation: Option<(AttributeOperator, String)>,
}

impl AttributeSelector {
    /// Test an attribute value against this selector.
    pub fn matches_value(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        let Some((operator, expected)) = &self.operation else {
            return true;
        };
        let expected = expected.as_str();
        match operator {
            AttributeOperator::Equals => value == expected,
            AttributeOperator::Includes => {
                !expected.is_empty() && value.split_ascii_whitespace().any(|word| word == expected)
            }
            AttributeOperator::DashMatch => {
                value == expected
                    || value
                        .strip_prefix(expected)
                        .is_some_and(|rest| rest.starts_with('-'))
            }
            AttributeOperator::Prefix => !expected.is_empty() && value.starts_with(expected),
            AttributeOperator::Suffix => !expected.is_empty() && value.ends_with(expected),
            AttributeOperator::Substring => !expected.is_empty() && value.contains(expected),
        }
    }
}

impl fmt::Display for AttributeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            None => write!(f, "[{}]", self.name),
            Some((operator, value)) => write!(f, "[{}{}\"{}\"]", self.name, operator, value),
        }
    }
}

/// Attribute value operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeOperator {
    /// `=` exact match.
    Equals,
    /// `~=` whitespace-separated word match.
    Includes,
    /// `|=` exact or followed by a hyphen.
    DashMatch,
    /// `^=` prefix.
    Prefix,
    /// `$=` suffix.
    Suffix,
    /// `*=` substring.
    Substring,
}

impl fmt::Display for AttributeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttributeOperator::Equals => "=",
            AttributeOperator::Includes => "~=",
            AttributeOperator::DashMatch => "|=",
            AttributeOperator::Prefix => "^=",
            AttributeOperator::Suffix => "$=",
            AttributeOperator::Substring => "*=",
        })
    }
}

/// Structural pseudo-classes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PseudoClass {
    /// :first-child - first among siblings.
    FirstChild,
    /// :last-child - last among siblings.
    LastChild,
    /// :only-child - only child of parent.
    OnlyChild,
    /// :nth-child(An+B) - position among siblings.
    NthChild(NthExpr),
    /// :empty - has no children.
    Empty,
    /// :not(compound) - negation.
    Not(Box<SelectorPart>),
}

impl fmt::Display for PseudoClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PseudoClass::FirstChild => write!(f, "first-child"),
            PseudoClass::LastChild => write!(f, "last-child"),
            PseudoClass::OnlyChild => write!(f, "only-child"),
            PseudoClass::NthChild(expr) => write!(f, "nth-child({})", expr),
            PseudoClass::Empty => write!(f, "empty"),
            PseudoClass::Not(inner) => write!(f, "not({})", inner),
        }
    }
}

/// Expression for :nth-child (An+B).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NthExpr {
    /// Coefficient (A in An+B).
    pub a: i32,
    /// Offset (B in An+B).
    pub b: i32,
}

impl NthExpr {
    /// Create a new nth expression.
    pub fn new(a: i32, b: i32) -> Self {
        Self { a, b }
    }

    /// Check if a 0-indexed position matches this expression.
    pub fn matches(&self, index: usize) -> bool {
        let n = index as i32 + 1;
        if self.a == 0 {
            n == self.b
        } else {
            let diff = n - self.b;
            if self.a > 0 {
                diff >= 0 && diff % self.a == 0
            } else {
                diff <= 0 && diff % self.a == 0
            }
        }
    }
}

impl fmt::Display for NthExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.a, self.b) {
            (2, 1) => write!(f, "odd"),
            (2, 0) => write!(f, "even"),
            (0, b) => write!(f, "{}", b),
            (a, 0) => write!(f, "{}n", a),
            (a, b) if b > 0 => write!(f, "{}n+{}", a, b),
            (a, b) => write!(f, "{}n{}", a, b),
        }
    }
}
