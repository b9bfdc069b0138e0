//! Just enough SQL scanning for the auto-limit rule and the editability
//! analyzer: comments and string literals must not be mistaken for keywords,
//! and quoted identifiers must come back unescaped. Not a validating parser.

/// One lexical token. Literal content of strings and numbers is irrelevant
/// downstream and is not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare word: keyword or unquoted identifier, original spelling.
    Word(String),
    /// Quoted identifier (`"x"`, `` `x` `` or `[x]`), quoting removed.
    Quoted(String),
    /// String literal.
    Str,
    /// Numeric literal.
    Number,
    /// Any single punctuation character.
    Punct(char),
}

impl Token {
    /// Case-insensitive keyword test; never matches quoted identifiers.
    pub fn is_kw(&self, kw: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(kw))
    }

    /// Identifier content, whether bare or quoted.
    pub fn ident(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w),
            Token::Quoted(q) => Some(q),
            _ => None,
        }
    }
}

pub fn tokenize(sql: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // -- line comment
        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        // /* block comment */ (unterminated swallows the rest)
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() {
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    i += 2;
                    break;
                }
                i += 1;
            }
            continue;
        }

        // 'string', '' escapes a quote
        if c == '\'' {
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            tokens.push(Token::Str);
            continue;
        }

        // "ident" or `ident`, doubled closer escapes
        if c == '"' || c == '`' {
            let closer = c;
            let mut name = String::new();
            i += 1;
            while i < chars.len() {
                if chars[i] == closer {
                    if chars.get(i + 1) == Some(&closer) {
                        name.push(closer);
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                name.push(chars[i]);
                i += 1;
            }
            tokens.push(Token::Quoted(name));
            continue;
        }

        // [ident]
        if c == '[' {
            let mut name = String::new();
            i += 1;
            while i < chars.len() && chars[i] != ']' {
                name.push(chars[i]);
                i += 1;
            }
            if i < chars.len() {
                i += 1;
            }
            tokens.push(Token::Quoted(name));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut word = String::new();
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                word.push(chars[i]);
                i += 1;
            }
            tokens.push(Token::Word(word));
            continue;
        }

        if c.is_ascii_digit() {
            // Good enough for 12, 1.5, 0x1A, 1e5; exponent signs split off
            // harmlessly.
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number);
            continue;
        }

        tokens.push(Token::Punct(c));
        i += 1;
    }

    tokens
}
