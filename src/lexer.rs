// File: src/lexer.rs
//
// Tokenizer for the Myco programming language.
// String escape sequences are processed here, at token construction time.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Number(f64),
    String(String),
    Operator(String),
    Punctuation(char),
    Keyword(String),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

const KEYWORDS: &[&str] = &[
    "let", "fn", "return", "if", "else", "while", "for", "in", "break", "continue", "class",
    "match", "spore", "case", "end", "try", "catch", "finally", "throw", "use", "as", "show",
    "print", "export", "true", "false", "null", "self", "and", "or", "not", "xor",
];

pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line: u32 = 1;
    let mut col: u32 = 1;

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
                col += 1;
            }
            '\n' => {
                chars.next();
                line += 1;
                col = 1;
            }
            '#' => {
                while let Some(&ch) = chars.peek() {
                    chars.next();
                    if ch == '\n' {
                        line += 1;
                        col = 1;
                        break;
                    }
                }
            }
            '"' => {
                let start_col = col;
                chars.next(); // skip opening quote
                col += 1;
                let mut s = String::new();
                while let Some(&ch) = chars.peek() {
                    chars.next();
                    col += 1;
                    if ch == '"' {
                        break;
                    }
                    if ch == '\\' {
                        if let Some(&esc) = chars.peek() {
                            chars.next();
                            col += 1;
                            match esc {
                                'n' => s.push('\n'),
                                't' => s.push('\t'),
                                'r' => s.push('\r'),
                                '\\' => s.push('\\'),
                                '"' => s.push('"'),
                                _ => s.push(esc),
                            }
                        }
                    } else {
                        if ch == '\n' {
                            line += 1;
                            col = 1;
                        }
                        s.push(ch);
                    }
                }
                tokens.push(Token { kind: TokenKind::String(s), line, column: start_col });
            }
            '0'..='9' => {
                let start_col = col;
                let mut num = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        num.push(ch);
                        chars.next();
                        col += 1;
                    } else if ch == '.' {
                        // Distinguish a decimal point from a range operator `..`
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        match lookahead.peek() {
                            Some(&d) if d.is_ascii_digit() => {
                                num.push(ch);
                                chars.next();
                                col += 1;
                            }
                            _ => break,
                        }
                    } else {
                        break;
                    }
                }
                let parsed = num.parse().unwrap_or(0.0);
                tokens.push(Token { kind: TokenKind::Number(parsed), line, column: start_col });
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start_col = col;
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                        col += 1;
                    } else {
                        break;
                    }
                }

                let kind = if KEYWORDS.contains(&ident.as_str()) {
                    TokenKind::Keyword(ident)
                } else {
                    TokenKind::Identifier(ident)
                };

                tokens.push(Token { kind, line, column: start_col });
            }
            '=' | '!' | '<' | '>' | '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '.' => {
                let start_col = col;
                let first = chars.next().unwrap();
                col += 1;
                let mut op = first.to_string();

                // Multi-character operators
                let next = chars.peek().copied();
                match (first, next) {
                    ('=', Some('=')) | ('!', Some('=')) | ('<', Some('=')) | ('>', Some('=')) => {
                        op.push(chars.next().unwrap());
                        col += 1;
                    }
                    ('=', Some('>')) => {
                        op.push(chars.next().unwrap());
                        col += 1;
                    }
                    ('&', Some('&')) | ('|', Some('|')) | ('*', Some('*')) | ('^', Some('^')) => {
                        op.push(chars.next().unwrap());
                        col += 1;
                    }
                    ('<', Some('<')) | ('>', Some('>')) => {
                        op.push(chars.next().unwrap());
                        col += 1;
                    }
                    ('/', Some('/')) => {
                        // Line comment
                        chars.next();
                        while let Some(&ch) = chars.peek() {
                            chars.next();
                            if ch == '\n' {
                                line += 1;
                                col = 1;
                                break;
                            }
                        }
                        continue;
                    }
                    ('.', Some('.')) => {
                        op.push(chars.next().unwrap());
                        col += 1;
                        if chars.peek() == Some(&'=') {
                            op.push(chars.next().unwrap());
                            col += 1;
                        }
                    }
                    _ => {}
                }

                if op == "." {
                    tokens.push(Token { kind: TokenKind::Punctuation('.'), line, column: start_col });
                } else {
                    tokens.push(Token { kind: TokenKind::Operator(op), line, column: start_col });
                }
            }
            '(' | ')' | '{' | '}' | '[' | ']' | ',' | ';' | ':' => {
                tokens.push(Token { kind: TokenKind::Punctuation(c), line, column: col });
                chars.next();
                col += 1;
            }
            _ => {
                // Unknown character: skip it, the parser reports on structure
                chars.next();
                col += 1;
            }
        }
    }

    tokens.push(Token { kind: TokenKind::Eof, line, column: col });

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_string_escapes_processed_at_construction() {
        let toks = kinds(r#""a\nb\tc\\d\"e""#);
        assert_eq!(toks[0], TokenKind::String("a\nb\tc\\d\"e".to_string()));
    }

    #[test]
    fn test_number_followed_by_range_operator() {
        let toks = kinds("0..5");
        assert_eq!(toks[0], TokenKind::Number(0.0));
        assert_eq!(toks[1], TokenKind::Operator("..".to_string()));
        assert_eq!(toks[2], TokenKind::Number(5.0));
    }

    #[test]
    fn test_inclusive_range_operator() {
        let toks = kinds("1..=3");
        assert_eq!(toks[1], TokenKind::Operator("..=".to_string()));
    }

    #[test]
    fn test_float_literal() {
        let toks = kinds("3.25");
        assert_eq!(toks[0], TokenKind::Number(3.25));
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let toks = kinds("let foo = fn_bar");
        assert_eq!(toks[0], TokenKind::Keyword("let".to_string()));
        assert_eq!(toks[1], TokenKind::Identifier("foo".to_string()));
        assert_eq!(toks[2], TokenKind::Operator("=".to_string()));
        assert_eq!(toks[3], TokenKind::Identifier("fn_bar".to_string()));
    }

    #[test]
    fn test_comments_are_skipped() {
        let toks = kinds("1 # comment\n2 // other\n3");
        assert_eq!(
            toks,
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.0),
                TokenKind::Number(3.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_compound_operators() {
        let toks = kinds("a <= b && c ** 2 >> 1");
        assert!(toks.contains(&TokenKind::Operator("<=".to_string())));
        assert!(toks.contains(&TokenKind::Operator("&&".to_string())));
        assert!(toks.contains(&TokenKind::Operator("**".to_string())));
        assert!(toks.contains(&TokenKind::Operator(">>".to_string())));
    }
}
