//! Selector parsing using the `cssparser` tokenizer.

use cssparser::{ParseError, Parser, ParserInput, Token};

use super::types::{
    AttributeOperator, AttributeSelector, Combinator, NthExpr, PseudoClass, Selector,
    SelectorList, SelectorPart, TypeSelector,
};
use crate::error::{DomError, Result};

type ParseResult<'i, T> = std::result::Result<T, ParseError<'i, String>>;

/// Parse a selector list such as `"div.Cp, table > tbody"`.
pub fn parse_selector_list(input: &str) -> Result<SelectorList> {
    let mut parser_input = ParserInput::new(input);
    let mut parser = Parser::new(&mut parser_input);
    parser
        .parse_comma_separated(parse_complex)
        .map(SelectorList)
        .map_err(|e| DomError::invalid_selector(input, describe(&e)))
}

fn describe(error: &ParseError<'_, String>) -> String {
    let location = error.location;
    let message = match &error.kind {
        cssparser::ParseErrorKind::Custom(message) => message.clone(),
        cssparser::ParseErrorKind::Basic(basic) => format!("{:?}", basic),
    };
    format!("{} (line {}, column {})", message, location.line + 1, location.column)
}

/// Parse one complex selector: compound parts joined by combinators.
fn parse_complex<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, Selector> {
    let mut parts = vec![];
    let mut combinators = vec![];

    loop {
        parts.push(parse_compound(parser)?);

        // Whitespace alone is a descendant combinator; whitespace around an
        // explicit combinator is insignificant.
        let mut saw_whitespace = false;
        let combinator = loop {
            let state = parser.state();
            let token = match parser.next_including_whitespace() {
                Ok(token) => token.clone(),
                Err(_) => break None,
            };
            match token {
                Token::WhiteSpace(_) => saw_whitespace = true,
                Token::Delim('>') => break Some(Combinator::Child),
                Token::Delim('+') => break Some(Combinator::AdjacentSibling),
                Token::Delim('~') => break Some(Combinator::GeneralSibling),
                other => {
                    parser.reset(&state);
                    if saw_whitespace {
                        break Some(Combinator::Descendant);
                    }
                    return Err(parser.new_custom_error(format!("unexpected token {:?}", other)));
                }
            }
        };

        match combinator {
            Some(combinator) => combinators.push(combinator),
            None => break,
        }
    }

    Ok(Selector { parts, combinators })
}

/// Parse a compound selector, stopping before whitespace or a combinator.
fn parse_compound<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, SelectorPart> {
    parser.skip_whitespace();
    let mut part = SelectorPart::default();

    loop {
        let state = parser.state();
        let token = match parser.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::Ident(name) if part.is_empty() => {
                part.type_selector = Some(TypeSelector::Tag(name.to_ascii_lowercase()));
            }
            Token::Delim('*') if part.is_empty() => {
                part.type_selector = Some(TypeSelector::Universal);
            }
            Token::Delim('.') => {
                let class = parser.expect_ident_cloned()?;
                part.classes.push(class.to_string());
            }
            Token::IDHash(id) => {
                if part.id.is_some() {
                    return Err(parser.new_custom_error("duplicate id selector".to_string()));
                }
                part.id = Some(id.to_string());
            }
            Token::SquareBracketBlock => {
                let attribute = parser.parse_nested_block(parse_attribute)?;
                part.attributes.push(attribute);
            }
            Token::Colon => {
                let pseudo = parse_pseudo_class(parser)?;
                part.pseudo_classes.push(pseudo);
            }
            Token::WhiteSpace(_)
            | Token::Delim('>')
            | Token::Delim('+')
            | Token::Delim('~')
            | Token::Comma => {
                parser.reset(&state);
                break;
            }
            other => {
                return Err(parser.new_custom_error(format!("unexpected token {:?}", other)));
            }
        }
    }

    if part.is_empty() {
        return Err(parser.new_custom_error("expected a selector".to_string()));
    }
    Ok(part)
}

/// Parse the inside of `[...]`.
fn parse_attribute<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, AttributeSelector> {
    let name = parser.expect_ident()?.to_ascii_lowercase();

    let token = match parser.next() {
        Ok(token) => token.clone(),
        Err(_) => {
            return Ok(AttributeSelector {
                name,
                operation: None,
            });
        }
    };
    let operator = match token {
        Token::Delim('=') => AttributeOperator::Equals,
        Token::IncludeMatch => AttributeOperator::Includes,
        Token::DashMatch => AttributeOperator::DashMatch,
        Token::PrefixMatch => AttributeOperator::Prefix,
        Token::SuffixMatch => AttributeOperator::Suffix,
        Token::SubstringMatch => AttributeOperator::Substring,
        other => {
            return Err(parser.new_custom_error(format!(
                "unexpected token {:?} in attribute selector",
                other
            )));
        }
    };
    let value = parser.expect_ident_or_string()?.to_string();

    Ok(AttributeSelector {
        name,
        operation: Some((operator, value)),
    })
}

/// Parse a pseudo-class after its leading colon.
fn parse_pseudo_class<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, PseudoClass> {
    let token = parser.next_including_whitespace()?.clone();
    match token {
        Token::Ident(name) => match name.to_ascii_lowercase().as_str() {
            "first-child" => Ok(PseudoClass::FirstChild),
            "last-child" => Ok(PseudoClass::LastChild),
            "only-child" => Ok(PseudoClass::OnlyChild),
            "empty" => Ok(PseudoClass::Empty),
            other => Err(parser.new_custom_error(format!("unknown pseudo-class ':{}'", other))),
        },
        Token::Function(name) => match name.to_ascii_lowercase().as_str() {
            "nth-child" => {
                let expr = parser.parse_nested_block(parse_nth_expr)?;
                Ok(PseudoClass::NthChild(expr))
            }
            "not" => {
                let inner = parser.parse_nested_block(parse_compound)?;
                Ok(PseudoClass::Not(Box::new(inner)))
            }
            other => Err(parser.new_custom_error(format!("unknown pseudo-class ':{}()'", other))),
        },
        other => Err(parser.new_custom_error(format!(
            "expected pseudo-class name, found {:?}",
            other
        ))),
    }
}

/// Parse an nth-child argument (e.g., "odd", "even", "3", "2n+1").
fn parse_nth_expr<'i>(parser: &mut Parser<'i, '_>) -> ParseResult<'i, NthExpr> {
    let (a, b) = cssparser::parse_nth(parser)?;
    Ok(NthExpr::new(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &str) -> Selector {
        let mut list = parse_selector_list(input).unwrap();
        assert_eq!(list.0.len(), 1);
        list.0.remove(0)
    }

    #[test]
    fn parse_compound_selector() {
        let sel = parse_one("div.Cp#main");
        assert_eq!(sel.parts.len(), 1);
        let part = &sel.parts[0];
        assert_eq!(part.type_selector, Some(TypeSelector::Tag("div".into())));
        assert_eq!(part.id.as_deref(), Some("main"));
        assert_eq!(part.classes, vec!["Cp".to_string()]);
    }

    #[test]
    fn parse_combinators() {
        let sel = parse_one("table.cf > colgroup > col");
        assert_eq!(sel.parts.len(), 3);
        assert_eq!(sel.combinators, vec![Combinator::Child, Combinator::Child]);

        let sel = parse_one("div  span+em ~ b");
        assert_eq!(
            sel.combinators,
            vec![
                Combinator::Descendant,
                Combinator::AdjacentSibling,
                Combinator::GeneralSibling
            ]
        );
        assert_eq!(sel.to_string(), "div span + em ~ b");
    }

    #[test]
    fn parse_trailing_whitespace() {
        let sel = parse_one("  td  ");
        assert_eq!(sel.parts.len(), 1);
        assert!(sel.combinators.is_empty());
    }

    #[test]
    fn parse_attributes() {
        let sel = parse_one("[gh=mtb]");
        assert_eq!(
            sel.parts[0].attributes,
            vec![AttributeSelector {
                name: "gh".into(),
                operation: Some((AttributeOperator::Equals, "mtb".into())),
            }]
        );

        let sel = parse_one("tr[id][data-kind^=\"thread\"]");
        assert_eq!(sel.parts[0].attributes.len(), 2);
        assert_eq!(sel.parts[0].attributes[0].operation, None);
        assert_eq!(
            sel.parts[0].attributes[1].operation,
            Some((AttributeOperator::Prefix, "thread".into()))
        );
    }

    #[test]
    fn parse_pseudo_classes() {
        let sel = parse_one("col:first-child");
        assert_eq!(sel.parts[0].pseudo_classes, vec![PseudoClass::FirstChild]);

        let sel = parse_one("tr:nth-child(2n+1)");
        assert_eq!(
            sel.parts[0].pseudo_classes,
            vec![PseudoClass::NthChild(NthExpr::new(2, 1))]
        );

        let sel = parse_one("tr:nth-child(even)");
        assert_eq!(
            sel.parts[0].pseudo_classes,
            vec![PseudoClass::NthChild(NthExpr::new(2, 0))]
        );

        let sel = parse_one("tr:not(.bundle)");
        match &sel.parts[0].pseudo_classes[0] {
            PseudoClass::Not(inner) => assert_eq!(inner.classes, vec!["bundle".to_string()]),
            other => panic!("expected :not, got {:?}", other),
        }
    }

    #[test]
    fn parse_selector_list_with_commas() {
        let list = parse_selector_list("div.Cp, table > tbody").unwrap();
        assert_eq!(list.0.len(), 2);
        assert_eq!(list.to_string(), "div.Cp, table > tbody");
    }

    #[test]
    fn parse_errors() {
        for bad in ["", "div >", "> div", ".", "div:hover", "a,,b", "[=x]", "div:nth-child(x)"] {
            let err = parse_selector_list(bad).unwrap_err();
            assert!(
                matches!(err, DomError::InvalidSelector { .. }),
                "expected InvalidSelector for {:?}, got {:?}",
                bad,
                err
            );
        }
    }
}
