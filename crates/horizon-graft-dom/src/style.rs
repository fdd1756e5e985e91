//! Inline `style` attribute handling.

use cssparser::{Delimiter, ParseError, Parser, ParserInput, Token};

/// One `name: value` pair of an inline style block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub(crate) name: String,
    /// The value without its priority.
    pub(crate) value: String,
    pub(crate) important: bool,
}

impl Declaration {
    pub(crate) fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            important: false,
        }
    }
}

/// Parse an inline style declaration block (`"width: 50px; color: red"`).
///
/// Malformed declarations are skipped. A property declared twice keeps its
/// last value, in its first position. A trailing `!important` is split off
/// into [`Declaration::important`].
pub(crate) fn parse_declarations(css: &str) -> Vec<Declaration> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut declarations: Vec<Declaration> = Vec::new();

    loop {
        parser.skip_whitespace();
        if parser.is_exhausted() {
            break;
        }

        let declaration: Result<Declaration, ParseError<'_, ()>> =
            parser.parse_until_after(Delimiter::Semicolon, |p| {
                let name = p.expect_ident()?.to_ascii_lowercase();
                p.expect_colon()?;
                let start = p.position();
                p.parse_until_before(Delimiter::Bang, skip_rest)?;
                let value = p.slice_from(start).trim().to_string();
                let important = p
                    .try_parse(|p| {
                        p.expect_delim('!')?;
                        p.expect_ident_matching("important")
                    })
                    .is_ok();
                p.expect_exhausted()?;
                Ok(Declaration {
                    name,
                    value,
                    important,
                })
            });

        match declaration {
            Ok(declaration) if !declaration.value.is_empty() => {
                upsert(&mut declarations, declaration);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::trace!(target: "horizon_graft_dom::document", error = ?e, "skipping malformed style declaration");
            }
        }
    }

    declarations
}

fn skip_rest<'i>(parser: &mut Parser<'i, '_>) -> Result<(), ParseError<'i, ()>> {
    while parser.next().is_ok() {}
    Ok(())
}

/// Serialize declarations back into an inline style string.
pub(crate) fn serialize_declarations(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(|d| {
            let priority = if d.important { " !important" } else { "" };
            format!("{}: {}{};", d.name, d.value, priority)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn upsert(declarations: &mut Vec<Declaration>, declaration: Declaration) {
    match declarations.iter_mut().find(|d| d.name == declaration.name) {
        Some(existing) => *existing = declaration,
        None => declarations.push(declaration),
    }
}

/// Integer part of the number a CSS value starts with.
///
/// The unit, if any, is ignored: `"80px"`, `"80em"` and `"80.9%"` all read
/// as 80. Values that do not start with a number (`"auto"`, `""`) are
/// `None`.
pub fn parse_int_prefix(value: &str) -> Option<i64> {
    let mut input = ParserInput::new(value);
    let mut parser = Parser::new(&mut input);
    let number = match parser.next() {
        Ok(Token::Number { value, .. }) | Ok(Token::Dimension { value, .. }) => *value,
        Ok(Token::Percentage {
            int_value: Some(int),
            ..
        }) => return Some(i64::from(*int)),
        Ok(Token::Percentage { unit_value, .. }) => *unit_value * 100.0,
        _ => return None,
    };
    number.is_finite().then(|| number.trunc() as i64)
}
