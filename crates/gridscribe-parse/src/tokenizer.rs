use std::error::Error;
use std::fmt::{self, Display};

const TOKEN_ENDERS: &str = ",;}) +-*/^&=><%\n\t";

const fn build_token_enders() -> [bool; 256] {
    let mut tbl = [false; 256];
    let bytes = TOKEN_ENDERS.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        tbl[bytes[i] as usize] = true;
        i += 1;
    }
    tbl
}
static TOKEN_ENDERS_TABLE: [bool; 256] = build_token_enders();

#[inline(always)]
fn is_token_ender(c: u8) -> bool {
    TOKEN_ENDERS_TABLE[c as usize]
}

static ERROR_CODES: &[&str] = &[
    "#NULL!",
    "#DIV/0!",
    "#VALUE!",
    "#REF!",
    "#NAME?",
    "#NUM!",
    "#N/A",
    "#SPILL!",
    "#CALC!",
    "#FIELD!",
    "#BLOCKED!",
    "#CONNECT!",
    "#UNKNOWN!",
    "#BUSY!",
    "#GETTING_DATA",
];

/// Lexing failure with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub pos: usize,
}

impl LexError {
    fn at(pos: usize, message: impl Into<String>) -> Self {
        LexError {
            message: message.into(),
            pos,
        }
    }
}

impl Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.pos)
    }
}

impl Error for LexError {}

/// Lexical category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Double-quoted string literal, quotes included.
    Text,
    Number,
    /// `TRUE` / `FALSE`.
    Logical,
    /// `#REF!` and friends, optionally sheet-prefixed.
    Error,
    /// Anything else that stands alone: references, names, structured refs.
    Operand,
    /// Function name including its opening parenthesis (`SUM(`).
    FuncOpen,
    ParenOpen,
    ParenClose,
    ArrayOpen,
    ArrayClose,
    /// `,` between arguments or array items, `;` between array rows.
    Separator,
    Operator,
    Whitespace,
}

/// A token is a kind plus a byte span into the source formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    fn operand(source: &str, start: usize, end: usize) -> Self {
        let text = &source[start..end];
        let kind = if text.starts_with('#') || text.contains("!#") {
            TokenKind::Error
        } else if text.eq_ignore_ascii_case("TRUE") || text.eq_ignore_ascii_case("FALSE") {
            TokenKind::Logical
        } else if looks_numeric(text) {
            TokenKind::Number
        } else {
            TokenKind::Operand
        };
        Token { kind, start, end }
    }
}

/// `f64::from_str` also accepts `inf` and `nan`, which are valid names.
fn looks_numeric(text: &str) -> bool {
    text.as_bytes()
        .first()
        .is_some_and(|b| b.is_ascii_digit() || *b == b'.')
        && text.parse::<f64>().is_ok()
}

/// Strip a single leading `=` if present.
pub fn formula_body(formula: &str) -> (&str, usize) {
    match formula.strip_prefix('=') {
        Some(rest) => (rest, 1),
        None => (formula, 0),
    }
}

/// Tokenize a formula. A leading `=` is optional; spans always index into
/// the string as given.
pub fn tokenize(formula: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(formula);
    lexer.run()?;
    Ok(lexer.tokens)
}

/// Byte-driven formula lexer.
struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    tokens: Vec<Token>,
    /// Open groups, used to classify separators and to detect mismatches.
    stack: Vec<TokenKind>,
    offset: usize,
    token_start: usize,
    token_end: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        let (_, skip) = formula_body(source);
        Lexer {
            source,
            bytes: source.as_bytes(),
            tokens: Vec::with_capacity(source.len() / 2),
            stack: Vec::with_capacity(8),
            offset: skip,
            token_start: skip,
            token_end: skip,
        }
    }

    #[inline]
    fn has_token(&self) -> bool {
        self.token_end > self.token_start
    }

    #[inline]
    fn start_token(&mut self) {
        self.token_start = self.offset;
        self.token_end = self.offset;
    }

    fn save_token(&mut self) {
        if self.has_token() {
            self.tokens
                .push(Token::operand(self.source, self.token_start, self.token_end));
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token { kind, start, end });
    }

    fn run(&mut self) -> Result<(), LexError> {
        while self.offset < self.bytes.len() {
            if self.continues_exponent() {
                self.offset += 1;
                self.token_end = self.offset;
                continue;
            }

            let byte = self.bytes[self.offset];
            if is_token_ender(byte) && self.has_token() {
                self.save_token();
                self.start_token();
            }

            match byte {
                b'"' => self.lex_text()?,
                b'\'' => self.lex_quoted_sheet()?,
                b'[' => self.lex_brackets()?,
                b'#' => self.lex_error_literal()?,
                b' ' | b'\n' | b'\t' | b'\r' => self.lex_whitespace(),
                b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'>' | b'<' | b'%' => {
                    self.lex_operator()
                }
                b'(' | b'{' => self.lex_opener(),
                b')' | b'}' => self.lex_closer()?,
                b',' | b';' => self.lex_separator(),
                _ => {
                    if !self.has_token() {
                        self.start_token();
                    }
                    self.offset += 1;
                    self.token_end = self.offset;
                }
            }
        }

        self.save_token();

        if !self.stack.is_empty() {
            return Err(LexError::at(
                self.offset,
                "unmatched opening parenthesis or brace",
            ));
        }
        Ok(())
    }

    /// A `+`/`-` directly after `1.5E` belongs to the number.
    fn continues_exponent(&self) -> bool {
        let Some(&byte) = self.bytes.get(self.offset) else {
            return false;
        };
        if !(byte == b'+' || byte == b'-') || !self.has_token() {
            return false;
        }
        let slice = &self.bytes[self.token_start..self.token_end];
        if slice.len() < 2 || !slice[0].is_ascii_digit() {
            return false;
        }
        let (last, middle) = (slice[slice.len() - 1], &slice[1..slice.len() - 1]);
        if !matches!(last, b'E' | b'e') {
            return false;
        }
        let mut dot_seen = false;
        middle.iter().all(|&b| match b {
            b'0'..=b'9' => true,
            b'.' if !dot_seen => {
                dot_seen = true;
                true
            }
            _ => false,
        })
    }

    /// Finds the end of a quoted run starting at `self.offset`, honouring
    /// doubled delimiters as escapes.
    fn scan_quoted(&self, delim: u8) -> Option<usize> {
        let mut i = self.offset + 1;
        while i < self.bytes.len() {
            if self.bytes[i] == delim {
                if self.bytes.get(i + 1) == Some(&delim) {
                    i += 2;
                    continue;
                }
                return Some(i + 1);
            }
            i += 1;
        }
        None
    }

    fn lex_text(&mut self) -> Result<(), LexError> {
        self.save_token();
        let start = self.offset;
        let end = self
            .scan_quoted(b'"')
            .ok_or_else(|| LexError::at(self.bytes.len(), "unterminated string literal"))?;
        self.push(TokenKind::Text, start, end);
        self.offset = end;
        self.start_token();
        Ok(())
    }

    /// Quoted sheet names stay glued to the operand they prefix.
    fn lex_quoted_sheet(&mut self) -> Result<(), LexError> {
        if self.has_token() && self.bytes[self.token_end - 1] != b':' {
            self.save_token();
            self.start_token();
        }
        if !self.has_token() {
            self.start_token();
        }
        let end = self
            .scan_quoted(b'\'')
            .ok_or_else(|| LexError::at(self.bytes.len(), "unterminated quoted sheet name"))?;
        self.offset = end;
        self.token_end = end;
        Ok(())
    }

    fn lex_brackets(&mut self) -> Result<(), LexError> {
        if !self.has_token() {
            self.start_token();
        }
        let mut depth = 0usize;
        while self.offset < self.bytes.len() {
            match self.bytes[self.offset] {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        self.offset += 1;
                        self.token_end = self.offset;
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.offset += 1;
        }
        Err(LexError::at(self.offset, "unmatched '['"))
    }

    fn lex_error_literal(&mut self) -> Result<(), LexError> {
        // `Sheet1!#REF!` keeps its prefix.
        if self.has_token() && self.bytes[self.token_end - 1] != b'!' {
            self.save_token();
            self.start_token();
        }
        let start = if self.has_token() {
            self.token_start
        } else {
            self.offset
        };
        let rest = &self.bytes[self.offset..];
        let code = ERROR_CODES.iter().find(|code| {
            rest.len() >= code.len() && rest[..code.len()].eq_ignore_ascii_case(code.as_bytes())
        });
        match code {
            Some(code) => {
                let end = self.offset + code.len();
                self.push(TokenKind::Error, start, end);
                self.offset = end;
                self.start_token();
                Ok(())
            }
            None => Err(LexError::at(self.offset, "invalid error literal")),
        }
    }

    fn lex_whitespace(&mut self) {
        self.save_token();
        let start = self.offset;
        while self
            .bytes
            .get(self.offset)
            .is_some_and(|b| matches!(b, b' ' | b'\n' | b'\t' | b'\r'))
        {
            self.offset += 1;
        }
        self.push(TokenKind::Whitespace, start, self.offset);
        self.start_token();
    }

    fn lex_operator(&mut self) {
        self.save_token();
        let start = self.offset;
        let width = match self.bytes.get(start..start + 2) {
            Some(b">=") | Some(b"<=") | Some(b"<>") => 2,
            _ => 1,
        };
        self.offset += width;
        self.push(TokenKind::Operator, start, self.offset);
        self.start_token();
    }

    fn lex_opener(&mut self) {
        let byte = self.bytes[self.offset];
        let kind = if byte == b'{' {
            self.save_token();
            self.push(TokenKind::ArrayOpen, self.offset, self.offset + 1);
            TokenKind::ArrayOpen
        } else if self.has_token() {
            self.push(TokenKind::FuncOpen, self.token_start, self.offset + 1);
            TokenKind::FuncOpen
        } else {
            self.push(TokenKind::ParenOpen, self.offset, self.offset + 1);
            TokenKind::ParenOpen
        };
        self.stack.push(kind);
        self.offset += 1;
        self.start_token();
    }

    fn lex_closer(&mut self) -> Result<(), LexError> {
        self.save_token();
        let byte = self.bytes[self.offset];
        let kind = match (self.stack.pop(), byte) {
            (Some(TokenKind::ArrayOpen), b'}') => TokenKind::ArrayClose,
            (Some(TokenKind::FuncOpen | TokenKind::ParenOpen), b')') => TokenKind::ParenClose,
            (Some(_), _) => return Err(LexError::at(self.offset, "mismatched ( and { pair")),
            (None, _) => return Err(LexError::at(self.offset, "closer without matching opener")),
        };
        self.push(kind, self.offset, self.offset + 1);
        self.offset += 1;
        self.start_token();
        Ok(())
    }

    fn lex_separator(&mut self) {
        self.save_token();
        // A comma outside a call or array is the union operator.
        let kind = match (self.bytes[self.offset], self.stack.last()) {
            (b';', _) => TokenKind::Separator,
            (_, Some(TokenKind::FuncOpen | TokenKind::ArrayOpen)) => TokenKind::Separator,
            _ => TokenKind::Operator,
        };
        self.push(kind, self.offset, self.offset + 1);
        self.offset += 1;
        self.start_token();
    }
}
