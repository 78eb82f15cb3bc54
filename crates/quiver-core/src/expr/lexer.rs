use super::ExprError;

/// One lexical token of the assertion language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    And,
    Or,
    In,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

/// Tokenize an expression string.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '=' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::EqEq);
                    }
                    _ => return Err(ExprError::Syntax("expected '==' at '='".to_string())),
                }
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::NotEq);
                    }
                    _ => return Err(ExprError::Syntax("expected '!=' at '!'".to_string())),
                }
            }
            '<' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '&')) => {
                        chars.next();
                        tokens.push(Token::And);
                    }
                    _ => return Err(ExprError::Syntax("expected '&&' at '&'".to_string())),
                }
            }
            '|' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '|')) => {
                        chars.next();
                        tokens.push(Token::Or);
                    }
                    _ => return Err(ExprError::Syntax("expected '||' at '|'".to_string())),
                }
            }
            '\'' | '"' => {
                tokens.push(lex_string(&mut chars, c)?);
            }
            c if c.is_ascii_digit() => {
                tokens.push(lex_number(src, &mut chars)?);
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "in" => Token::In,
                    _ => Token::Ident(ident),
                });
            }
            other => {
                return Err(ExprError::Syntax(format!(
                    "unexpected character {:?} at offset {}",
                    other, pos
                )))
            }
        }
    }

    Ok(tokens)
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
) -> Result<Token, ExprError> {
    chars.next(); // opening quote
    let mut out = String::new();
    loop {
        match chars.next() {
            Some((_, c)) if c == quote => return Ok(Token::Str(out)),
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, c)) => out.push(c),
                None => return Err(ExprError::Syntax("unterminated escape".to_string())),
            },
            Some((_, c)) => out.push(c),
            None => return Err(ExprError::Syntax("unterminated string literal".to_string())),
        }
    }
}

fn lex_number(
    src: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<Token, ExprError> {
    let start = chars.peek().map(|&(i, _)| i).unwrap_or(0);
    let mut end = start;
    let mut is_float = false;

    while let Some(&(i, c)) = chars.peek() {
        if c.is_ascii_digit() {
            end = i + c.len_utf8();
            chars.next();
        } else if c == '.' {
            // A digit must follow for this to be a float; otherwise the dot
            // is member access on a number literal and stays untouched.
            let mut lookahead = chars.clone();
            lookahead.next();
            match lookahead.peek() {
                Some(&(_, d)) if d.is_ascii_digit() => {
                    is_float = true;
                    end = i + 1;
                    chars.next();
                }
                _ => break,
            }
        } else {
            break;
        }
    }

    let text = &src[start..end];
    if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ExprError::Syntax(format!("bad float literal {:?}", text)))
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| ExprError::Syntax(format!("bad integer literal {:?}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operators_and_literals() {
        let tokens = tokenize("a.b == 200 && len('x') >= 1.5").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".to_string()),
                Token::Dot,
                Token::Ident("b".to_string()),
                Token::EqEq,
                Token::Int(200),
                Token::And,
                Token::Ident("len".to_string()),
                Token::LParen,
                Token::Str("x".to_string()),
                Token::RParen,
                Token::Ge,
                Token::Float(1.5),
            ]
        );
    }

    #[test]
    fn test_word_operators() {
        let tokens = tokenize("a and b or 'k' in c").unwrap();
        assert!(tokens.contains(&Token::And));
        assert!(tokens.contains(&Token::Or));
        assert!(tokens.contains(&Token::In));
    }

    #[test]
    fn test_double_and_single_quotes() {
        assert_eq!(
            tokenize("\"hi\"").unwrap(),
            vec![Token::Str("hi".to_string())]
        );
        assert_eq!(
            tokenize("'hi'").unwrap(),
            vec![Token::Str("hi".to_string())]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(tokenize("'oops"), Err(ExprError::Syntax(_))));
    }

    #[test]
    fn test_bare_equals_rejected() {
        assert!(matches!(tokenize("a = 1"), Err(ExprError::Syntax(_))));
    }

    #[test]
    fn test_index_brackets() {
        let tokens = tokenize("a['b'][0]").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".to_string()),
                Token::LBracket,
                Token::Str("b".to_string()),
                Token::RBracket,
                Token::LBracket,
                Token::Int(0),
                Token::RBracket,
            ]
        );
    }
}
