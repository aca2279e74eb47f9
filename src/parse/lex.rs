//! Tokenizing assembly source.
//!
//! Tokenizing happens in two layers:
//! 1. [`Token`] recognizes single lexemes (a register, a label definition, a run of spaces, etc.).
//! 2. Each lexeme is classified by its [`TokenType`] and handed to that type's scan rule,
//!    which decides how the lexeme changes the symbol list (see [`tokenize`]).
//!
//! Scan rules are what enforce the layout of the source:
//! - tokens must be separated by spaces, new lines, or comments,
//!   except for the comma-joined operands of a parameter group (e.g., `$2,R0`),
//! - a parameter group cannot be interrupted by whitespace after a comma,
//! - label definitions must start a line.
//!
//! The output of this module is a list of [`Symbol`]s, which the parser turns into a program.

use std::num::IntErrorKind;
use std::ops::Range;

use logos::{Lexer, Logos};

/// A single lexeme of assembly source.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(error = LexErrKind)]
pub enum Token {
    // Numeric regexes span over lexemes that are technically invalid
    // (e.g., `3Q` matches for a number).
    // The validator function then reports what is wrong with the lexeme.

    /// A run of spaces or tabs.
    #[regex(r"[ \t]+")]
    Space,

    /// A new line.
    #[regex(r"\r?\n")]
    NewLine,

    /// A comment, which starts with a semicolon and spans the remaining part of the line.
    #[regex(r";.*")]
    Comment,

    /// A section directive (e.g., `.data`, `.code`).
    #[regex(r"\.[A-Za-z_]\w*", |lx| lx.slice()[1..].to_string())]
    Section(String),

    /// A label definition (e.g., `start:`).
    #[regex(r"[A-Za-z_]\w*:", |lx| lx.slice().trim_end_matches(':').to_string())]
    LabelDef(String),

    /// An identifier, which names an instruction (e.g., `MOV`).
    #[regex(r"[A-Za-z_]\w*", |lx| lx.slice().to_string())]
    Ident(String),

    /// A register (e.g., `R0`).
    #[regex(r"[Rr]\d+", lex_reg)]
    Reg(u8),

    /// An immediate value (e.g., `$2`, `$0x1F`).
    #[regex(r"\$\w*", lex_imm)]
    Imm(u16),

    /// A bare numeric literal, used in data blocks (e.g., `9`, `0x10`).
    #[regex(r"\d\w*", lex_num)]
    Num(u64),

    /// The address of a label (e.g., `&text`).
    #[regex(r"&[A-Za-z_]\w*", |lx| lx.slice()[1..].to_string())]
    AddrOf(String),

    /// The length of a data block in words (e.g., `len(text)`).
    #[regex(r"len\([A-Za-z_]\w*\)", |lx| { let s = lx.slice(); s[4..s.len() - 1].to_string() })]
    LenOf(String),

    /// A string literal (e.g., `"Hello!"`).
    #[token(r#"""#, lex_str_literal)]
    Str(String),

    /// A comma, which joins the operands of a parameter group.
    #[token(",")]
    Comma,
}
impl Token {
    /// The type of this token, which determines the scan rule applied to it.
    pub fn token_type(&self) -> TokenType {
        match self {
            Token::Space      => TokenType::Space,
            Token::NewLine    => TokenType::NewLine,
            Token::Comment    => TokenType::Comment,
            Token::Section(_) => TokenType::Symbol,
            Token::LabelDef(_) => TokenType::Label,
            Token::Ident(_)   => TokenType::Opcode,
            Token::Reg(_)
            | Token::Imm(_)
            | Token::Num(_)
            | Token::AddrOf(_)
            | Token::LenOf(_)
            | Token::Str(_)
            | Token::Comma    => TokenType::Parameter,
        }
    }
}

/// Classes of tokens, each of which has its own scan rule.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum TokenType {
    /// A section directive.
    Symbol,
    /// A label definition.
    Label,
    /// An instruction mnemonic.
    Opcode,
    /// An operand or the comma joining operands.
    Parameter,
    /// Spaces and tabs.
    Space,
    /// A line break.
    NewLine,
    /// A comment.
    Comment,
}
impl TokenType {
    /// Whether this type separates two tokens.
    pub fn is_separator(self) -> bool {
        matches!(self, TokenType::Space | TokenType::NewLine | TokenType::Comment)
    }

    fn rule(self) -> ScanRule {
        match self {
            TokenType::Symbol    => scan_section,
            TokenType::Label     => scan_label,
            TokenType::Opcode    => scan_opcode,
            TokenType::Parameter => scan_param,
            TokenType::Space     => scan_space,
            TokenType::NewLine   => scan_newline,
            TokenType::Comment   => scan_comment,
        }
    }
}
impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Symbol    => f.write_str("section directive"),
            TokenType::Label     => f.write_str("label"),
            TokenType::Opcode    => f.write_str("opcode"),
            TokenType::Parameter => f.write_str("parameter"),
            TokenType::Space     => f.write_str("space"),
            TokenType::NewLine   => f.write_str("new line"),
            TokenType::Comment   => f.write_str("comment"),
        }
    }
}

/// A single operand of a parameter group.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
#[allow(missing_docs)]
pub enum Param {
    Reg(u8),
    Imm(u16),
    Num(u64),
    AddrOf(String),
    LenOf(String),
    Str(String),
}

/// The kinds of completed symbols produced by [`tokenize`].
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum SymbolKind {
    /// A section directive (e.g., `.data`), without the dot.
    Section(String),
    /// A label definition, without the colon.
    Label(String),
    /// An instruction mnemonic.
    Opcode(String),
    /// A comma-joined group of operands.
    Params(Vec<Param>),
    /// The end of a line.
    NewLine,
}

/// A completed symbol, with its span in the source.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Symbol {
    /// The symbol.
    pub kind: SymbolKind,
    /// The range of source this symbol covers.
    pub span: Range<usize>
}

/// Kinds of errors that can occur while tokenizing.
///
/// See [`LexErr`] for this error type with span information included.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum LexErrKind {
    /// Immediate value cannot fit within the range of a u16.
    DoesNotFitU16,
    /// Numeric literal cannot fit within the range of a u64.
    DoesNotFitU64,
    /// Hex literal (starting with 0x) has invalid hex digits.
    InvalidHex,
    /// Numeric literal could not be parsed as a decimal literal because it has invalid digits (i.e., not 0-9).
    InvalidNumeric,
    /// Hex literal (starting with 0x) doesn't have digits after it.
    InvalidHexEmpty,
    /// Immediate (starting with $) doesn't have digits after it.
    InvalidDecEmpty,
    /// Int parsing failed but the reason why is unknown.
    UnknownIntErr,
    /// String literal is missing an end quotation mark.
    UnclosedStrLit,
    /// String literal is too long.
    StrLitTooBig,
    /// Token had the format R\d, but \d doesn't fit in a byte.
    InvalidReg,
    /// Whitespace appeared after a comma, inside a parameter group.
    UnexpectedSpace,
    /// Two tokens appeared next to each other without a separator.
    MissingSeparator,
    /// A label definition did not start its line.
    MisplacedLabel,
    /// A comma did not follow an operand.
    UnexpectedComma,
    /// The source ended after a comma.
    UnexpectedEof,
    /// A symbol was used which does not start any token.
    #[default]
    InvalidSymbol
}
impl LexErrKind {
    /// Whether this error is a malformed token
    /// (a token in a place where it is not allowed, or an unrecognized symbol),
    /// as opposed to an invalid literal.
    pub fn is_malformed_token(self) -> bool {
        matches!(self,
            LexErrKind::UnexpectedSpace
            | LexErrKind::MissingSeparator
            | LexErrKind::MisplacedLabel
            | LexErrKind::UnexpectedComma
            | LexErrKind::UnexpectedEof
            | LexErrKind::InvalidSymbol
        )
    }
}
impl std::fmt::Display for LexErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErrKind::DoesNotFitU16    => f.write_str("immediate does not fit 16-bit unsigned integer"),
            LexErrKind::DoesNotFitU64    => f.write_str("numeric token does not fit 64-bit unsigned integer"),
            LexErrKind::InvalidHex       => f.write_str("invalid hex literal"),
            LexErrKind::InvalidNumeric   => f.write_str("invalid decimal literal"),
            LexErrKind::InvalidHexEmpty  => f.write_str("invalid hex literal"),
            LexErrKind::InvalidDecEmpty  => f.write_str("invalid immediate"),
            LexErrKind::UnknownIntErr    => f.write_str("could not parse integer"),
            LexErrKind::UnclosedStrLit   => f.write_str("unclosed string literal"),
            LexErrKind::StrLitTooBig     => f.write_str("string literal is too large"),
            LexErrKind::InvalidReg       => f.write_str("invalid register"),
            LexErrKind::UnexpectedSpace  => f.write_str("unexpected whitespace in parameter list"),
            LexErrKind::MissingSeparator => f.write_str("missing whitespace between tokens"),
            LexErrKind::MisplacedLabel   => f.write_str("label definition must start a line"),
            LexErrKind::UnexpectedComma  => f.write_str("unexpected comma"),
            LexErrKind::UnexpectedEof    => f.write_str("unexpected end of file"),
            LexErrKind::InvalidSymbol    => f.write_str("unrecognized symbol"),
        }
    }
}
impl LexErrKind {
    pub(crate) fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErrKind::DoesNotFitU16    => Some(format!("the range for a 16-bit unsigned integer is [{}, {}]", u16::MIN, u16::MAX).into()),
            LexErrKind::DoesNotFitU64    => Some(format!("the range for a 64-bit unsigned integer is [{}, {}]", u64::MIN, u64::MAX).into()),
            LexErrKind::InvalidHex       => Some("a hex literal starts with '0x' and consists of 0-9, A-F".into()),
            LexErrKind::InvalidNumeric   => Some("a decimal literal only consists of digits 0-9".into()),
            LexErrKind::InvalidHexEmpty  => Some("there should be hex digits (0-9, A-F) here".into()),
            LexErrKind::InvalidDecEmpty  => Some("there should be digits (0-9) after '$'".into()),
            LexErrKind::UnknownIntErr    => None,
            LexErrKind::UnclosedStrLit   => Some("add a quote to the end of the string literal".into()),
            LexErrKind::StrLitTooBig     => Some(format!("string literals are limited to at most {} characters", u16::MAX - 1).into()),
            LexErrKind::InvalidReg       => Some(format!("this must be R0-R{}", u8::MAX).into()),
            LexErrKind::UnexpectedSpace  => Some("operands are separated by a comma with no whitespace (e.g., $2,R0)".into()),
            LexErrKind::MissingSeparator => Some("add a space between these tokens".into()),
            LexErrKind::MisplacedLabel   => Some("move the label to the start of the line".into()),
            LexErrKind::UnexpectedComma  => Some("a comma must directly follow an operand".into()),
            LexErrKind::UnexpectedEof    => Some("add an operand after the comma".into()),
            LexErrKind::InvalidSymbol    => Some("this char does not occur in any token".into()),
        }
    }
}

/// An error that occurred while tokenizing.
///
/// Tokenizing stops at the first error.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct LexErr {
    /// The kind of error.
    pub kind: LexErrKind,
    /// The offending range of source.
    pub span: Range<usize>,
    /// The type of the token that preceded the error, if any.
    pub in_progress: Option<TokenType>
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        Some(self.span.clone().into())
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        self.kind.help()
    }
}

/// Helper that converts an int error kind to its corresponding LexErrKind, based on the provided inputs.
fn convert_int_error(
    e: &IntErrorKind,
    invalid_digits_err: LexErrKind,
    empty_err: LexErrKind,
    overflow_err: LexErrKind,
) -> LexErrKind {
    match e {
        IntErrorKind::Empty        => empty_err,
        IntErrorKind::InvalidDigit => invalid_digits_err,
        IntErrorKind::PosOverflow  => overflow_err,
        _ => LexErrKind::UnknownIntErr,
    }
}
fn lex_num(lx: &Lexer<'_, Token>) -> Result<u64, LexErrKind> {
    let string = lx.slice();
    match string.strip_prefix("0x").or_else(|| string.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)
            .map_err(|e| convert_int_error(e.kind(), LexErrKind::InvalidHex, LexErrKind::InvalidHexEmpty, LexErrKind::DoesNotFitU64)),
        None => string.parse::<u64>()
            .map_err(|e| convert_int_error(e.kind(), LexErrKind::InvalidNumeric, LexErrKind::InvalidNumeric, LexErrKind::DoesNotFitU64)),
    }
}
fn lex_imm(lx: &Lexer<'_, Token>) -> Result<u16, LexErrKind> {
    let string = &lx.slice()[1..];
    match string.strip_prefix("0x").or_else(|| string.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16)
            .map_err(|e| convert_int_error(e.kind(), LexErrKind::InvalidHex, LexErrKind::InvalidHexEmpty, LexErrKind::DoesNotFitU16)),
        None => string.parse::<u16>()
            .map_err(|e| convert_int_error(e.kind(), LexErrKind::InvalidNumeric, LexErrKind::InvalidDecEmpty, LexErrKind::DoesNotFitU16)),
    }
}
fn lex_reg(lx: &Lexer<'_, Token>) -> Result<u8, LexErrKind> {
    lx.slice()[1..].parse::<u8>()
        .map_err(|_| LexErrKind::InvalidReg)
}
fn lex_str_literal(lx: &mut Lexer<'_, Token>) -> Result<String, LexErrKind> {
    let rem = lx.remainder()
        .lines()
        .next()
        .unwrap_or("");

    // find the closing quote, skipping over escaped characters
    let mut escaped = false;
    let mlen = rem.char_indices()
        .find(|&(_, c)| {
            let closing = !escaped && c == '"';
            escaped = !escaped && c == '\\';
            closing
        })
        .map(|(n, _)| n);

    match mlen {
        Some(len) => lx.bump(len + 1),
        None => {
            lx.bump(rem.len());
            return Err(LexErrKind::UnclosedStrLit);
        }
    }

    // get the string inside quotes:
    let mut remaining = &lx.slice()[1..(lx.slice().len() - 1)];
    let mut buf = String::with_capacity(remaining.len());

    while let Some((left, right)) = remaining.split_once('\\') {
        buf.push_str(left);

        let mut chars = right.chars();
        match chars.next() {
            Some('n')  => buf.push('\n'),
            Some('r')  => buf.push('\r'),
            Some('t')  => buf.push('\t'),
            Some('\\') => buf.push('\\'),
            Some('0')  => buf.push('\0'),
            Some('"')  => buf.push('"'),
            Some(c) => {
                buf.push('\\');
                buf.push(c);
            },
            // the closing quote always follows, so a trailing backslash cannot occur
            None => buf.push('\\'),
        }

        remaining = chars.as_str();
    }
    buf.push_str(remaining);

    match buf.len() < usize::from(u16::MAX) {
        true  => Ok(buf),
        false => Err(LexErrKind::StrLitTooBig),
    }
}

/// A parameter group that is still being accumulated.
#[derive(Debug, PartialEq, Eq, Clone)]
struct Pending {
    params: Vec<Param>,
    span: Range<usize>,
    /// Whether the group ended with a comma (and so expects another operand).
    open: bool
}
impl Pending {
    fn finish(self) -> Symbol {
        Symbol { kind: SymbolKind::Params(self.params), span: self.span }
    }
}

/// How the driver should apply a scanned token to the symbol list.
#[derive(Debug, PartialEq, Eq, Clone)]
enum Step {
    /// The token produces no symbol.
    Skip,
    /// The token is a completed symbol.
    Emit(SymbolKind),
    /// The token starts a new parameter group.
    Begin(Param),
    /// The token is a comma continuing the pending parameter group.
    Join,
    /// The token is an operand completing the pending parameter group's comma.
    Extend(Param),
}

/// The result of a scan rule.
#[derive(Debug, PartialEq, Eq, Clone)]
struct Scan {
    ty: TokenType,
    step: Step
}
impl Scan {
    fn new(ty: TokenType, step: Step) -> Self {
        Self { ty, step }
    }
}

/// A scan rule.
///
/// A rule receives the completed symbols so far, the pending parameter group (if any),
/// the type of the previous token (if any), and the current token.
/// It either rejects the token or reports its type and how it changes the symbol list.
type ScanRule = fn(&[Symbol], Option<&Pending>, Option<TokenType>, Token) -> Result<Scan, LexErrKind>;

fn check_separated(current: Option<TokenType>) -> Result<(), LexErrKind> {
    match current {
        Some(t) if !t.is_separator() => Err(LexErrKind::MissingSeparator),
        _ => Ok(())
    }
}
fn check_not_open(pending: Option<&Pending>) -> Result<(), LexErrKind> {
    match pending {
        Some(p) if p.open => Err(LexErrKind::UnexpectedSpace),
        _ => Ok(())
    }
}

fn scan_space(_: &[Symbol], pending: Option<&Pending>, _: Option<TokenType>, _: Token) -> Result<Scan, LexErrKind> {
    check_not_open(pending)?;
    Ok(Scan::new(TokenType::Space, Step::Skip))
}
fn scan_newline(_: &[Symbol], pending: Option<&Pending>, _: Option<TokenType>, _: Token) -> Result<Scan, LexErrKind> {
    check_not_open(pending)?;
    Ok(Scan::new(TokenType::NewLine, Step::Emit(SymbolKind::NewLine)))
}
fn scan_comment(_: &[Symbol], pending: Option<&Pending>, _: Option<TokenType>, _: Token) -> Result<Scan, LexErrKind> {
    check_not_open(pending)?;
    Ok(Scan::new(TokenType::Comment, Step::Skip))
}
fn scan_section(_: &[Symbol], _: Option<&Pending>, current: Option<TokenType>, token: Token) -> Result<Scan, LexErrKind> {
    check_separated(current)?;
    let Token::Section(name) = token else { return Err(LexErrKind::InvalidSymbol) };
    Ok(Scan::new(TokenType::Symbol, Step::Emit(SymbolKind::Section(name))))
}
fn scan_label(symbols: &[Symbol], _: Option<&Pending>, current: Option<TokenType>, token: Token) -> Result<Scan, LexErrKind> {
    check_separated(current)?;
    if !matches!(symbols.last(), None | Some(Symbol { kind: SymbolKind::NewLine, .. })) {
        return Err(LexErrKind::MisplacedLabel);
    }
    let Token::LabelDef(name) = token else { return Err(LexErrKind::InvalidSymbol) };
    Ok(Scan::new(TokenType::Label, Step::Emit(SymbolKind::Label(name))))
}
fn scan_opcode(_: &[Symbol], _: Option<&Pending>, current: Option<TokenType>, token: Token) -> Result<Scan, LexErrKind> {
    check_separated(current)?;
    let Token::Ident(name) = token else { return Err(LexErrKind::InvalidSymbol) };
    Ok(Scan::new(TokenType::Opcode, Step::Emit(SymbolKind::Opcode(name))))
}
fn scan_param(_: &[Symbol], pending: Option<&Pending>, current: Option<TokenType>, token: Token) -> Result<Scan, LexErrKind> {
    let param = match token {
        Token::Reg(r)    => Param::Reg(r),
        Token::Imm(n)    => Param::Imm(n),
        Token::Num(n)    => Param::Num(n),
        Token::AddrOf(l) => Param::AddrOf(l),
        Token::LenOf(l)  => Param::LenOf(l),
        Token::Str(s)    => Param::Str(s),
        Token::Comma => {
            return match (current, pending) {
                (Some(TokenType::Parameter), Some(p)) if !p.open => Ok(Scan::new(TokenType::Parameter, Step::Join)),
                _ => Err(LexErrKind::UnexpectedComma),
            };
        }
        _ => return Err(LexErrKind::InvalidSymbol),
    };

    let step = match (current, pending) {
        (Some(TokenType::Parameter), Some(p)) if p.open => Step::Extend(param),
        _ => {
            check_separated(current)?;
            Step::Begin(param)
        }
    };
    Ok(Scan::new(TokenType::Parameter, step))
}

/// Tokenizes assembly source into a list of symbols.
///
/// # Example
/// ```
/// use svm_ensemble::parse::lex::{tokenize, Param, SymbolKind};
///
/// let symbols = tokenize("start: MOV $2,R0 ; comment").unwrap();
/// let kinds: Vec<_> = symbols.into_iter().map(|s| s.kind).collect();
/// assert_eq!(kinds, vec![
///     SymbolKind::Label("start".to_string()),
///     SymbolKind::Opcode("MOV".to_string()),
///     SymbolKind::Params(vec![Param::Imm(2), Param::Reg(0)]),
/// ]);
///
/// // whitespace after a comma
/// assert!(tokenize("MOV $2, R0").is_err());
/// ```
pub fn tokenize(src: &str) -> Result<Vec<Symbol>, LexErr> {
    let mut symbols = vec![];
    let mut pending: Option<Pending> = None;
    let mut current: Option<TokenType> = None;

    let mut lexer = Token::lexer(src);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let err = |kind| LexErr { kind, span: span.clone(), in_progress: current };

        let token = result.map_err(err)?;
        let rule = token.token_type().rule();
        let scan = rule(&symbols, pending.as_ref(), current, token).map_err(err)?;

        if scan.ty.is_separator() {
            symbols.extend(pending.take().map(Pending::finish));
        }
        match scan.step {
            Step::Skip => {},
            Step::Emit(kind) => symbols.push(Symbol { kind, span }),
            Step::Begin(param) => {
                pending.replace(Pending { params: vec![param], span, open: false });
            },
            Step::Join => if let Some(p) = &mut pending {
                p.span.end = span.end;
                p.open = true;
            },
            Step::Extend(param) => if let Some(p) = &mut pending {
                p.params.push(param);
                p.span.end = span.end;
                p.open = false;
            },
        }
        current = Some(scan.ty);
    }

    if let Some(p) = pending.take() {
        if p.open {
            return Err(LexErr { kind: LexErrKind::UnexpectedEof, span: src.len()..src.len(), in_progress: current });
        }
        symbols.push(p.finish());
    }

    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use logos::Logos;

    use super::{
        scan_comment, scan_label, scan_newline, scan_opcode, scan_param, scan_section, scan_space, tokenize,
        LexErr, LexErrKind, Param, Pending, Scan, Step, Symbol, SymbolKind, Token, TokenType,
    };

    fn sym(kind: SymbolKind, span: std::ops::Range<usize>) -> Symbol {
        Symbol { kind, span }
    }
    fn kinds(src: &str) -> Vec<SymbolKind> {
        tokenize(src).unwrap()
            .into_iter()
            .map(|s| s.kind)
            .collect()
    }
    fn lex_err(src: &str) -> LexErrKind {
        tokenize(src).unwrap_err().kind
    }
    fn open_group() -> Pending {
        Pending { params: vec![Param::Imm(2)], span: 4..7, open: true }
    }
    fn closed_group() -> Pending {
        Pending { params: vec![Param::Imm(2)], span: 4..6, open: false }
    }

    #[test]
    fn test_tokens() {
        let tokens: Result<Vec<_>, _> = Token::lexer(".data text: \"hi\" R3 $7 42 &text len(text) MOV, ;c\n").collect();
        assert_eq!(tokens, Ok(vec![
            Token::Section("data".to_string()),
            Token::Space,
            Token::LabelDef("text".to_string()),
            Token::Space,
            Token::Str("hi".to_string()),
            Token::Space,
            Token::Reg(3),
            Token::Space,
            Token::Imm(7),
            Token::Space,
            Token::Num(42),
            Token::Space,
            Token::AddrOf("text".to_string()),
            Token::Space,
            Token::LenOf("text".to_string()),
            Token::Space,
            Token::Ident("MOV".to_string()),
            Token::Comma,
            Token::Space,
            Token::Comment,
            Token::NewLine,
        ]));

        // these are identifiers, not registers or length queries
        assert_eq!(Token::lexer("Rx").next(), Some(Ok(Token::Ident("Rx".to_string()))));
        assert_eq!(Token::lexer("R1a").next(), Some(Ok(Token::Ident("R1a".to_string()))));
        assert_eq!(Token::lexer("len").next(), Some(Ok(Token::Ident("len".to_string()))));
    }

    #[test]
    fn test_numeric() {
        let mut tokens = Token::lexer("0 123 0x10 0XfF $2 $0x1F $65535");
        assert_eq!(tokens.next(), Some(Ok(Token::Num(0))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Num(123))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Num(0x10))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Num(0xFF))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Imm(2))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Imm(0x1F))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Imm(65535))));
        assert_eq!(tokens.next(), None);

        assert_eq!(Token::lexer("$65536").next(), Some(Err(LexErrKind::DoesNotFitU16)));
        assert_eq!(Token::lexer("$").next(), Some(Err(LexErrKind::InvalidDecEmpty)));
        assert_eq!(Token::lexer("$0x").next(), Some(Err(LexErrKind::InvalidHexEmpty)));
        assert_eq!(Token::lexer("$Q").next(), Some(Err(LexErrKind::InvalidNumeric)));
        assert_eq!(Token::lexer("3Q").next(), Some(Err(LexErrKind::InvalidNumeric)));
        assert_eq!(Token::lexer("0xZZ").next(), Some(Err(LexErrKind::InvalidHex)));
        assert_eq!(Token::lexer("99999999999999999999999").next(), Some(Err(LexErrKind::DoesNotFitU64)));
    }

    #[test]
    fn test_regs() {
        let mut tokens = Token::lexer("R0 r7 R255");
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(0))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(7))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Reg(255))));
        assert_eq!(tokens.next(), None);

        assert_eq!(Token::lexer("R256").next(), Some(Err(LexErrKind::InvalidReg)));
    }

    #[test]
    fn test_str() {
        let mut tokens = Token::lexer(r#""abc\n" "" "a\"b" "back\\slash""#);
        assert_eq!(tokens.next(), Some(Ok(Token::Str("abc\n".to_string()))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Str(String::new()))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Str("a\"b".to_string()))));
        assert_eq!(tokens.next(), Some(Ok(Token::Space)));
        assert_eq!(tokens.next(), Some(Ok(Token::Str("back\\slash".to_string()))));
        assert_eq!(tokens.next(), None);

        assert_eq!(Token::lexer(r#""unclosed"#).next(), Some(Err(LexErrKind::UnclosedStrLit)));
        assert_eq!(Token::lexer("\"line\nbreak\"").next(), Some(Err(LexErrKind::UnclosedStrLit)));
    }

    #[test]
    fn test_space_rule() {
        // consecutive spaces collapse: no symbol is produced
        assert_eq!(scan_space(&[], None, Some(TokenType::Space), Token::Space), Ok(Scan::new(TokenType::Space, Step::Skip)));
        assert_eq!(scan_space(&[], Some(&closed_group()), Some(TokenType::Parameter), Token::Space), Ok(Scan::new(TokenType::Space, Step::Skip)));
        assert_eq!(scan_space(&[], Some(&open_group()), Some(TokenType::Parameter), Token::Space), Err(LexErrKind::UnexpectedSpace));
    }

    #[test]
    fn test_newline_comment_rules() {
        assert_eq!(scan_newline(&[], None, None, Token::NewLine), Ok(Scan::new(TokenType::NewLine, Step::Emit(SymbolKind::NewLine))));
        assert_eq!(scan_newline(&[], Some(&open_group()), Some(TokenType::Parameter), Token::NewLine), Err(LexErrKind::UnexpectedSpace));
        assert_eq!(scan_comment(&[], None, Some(TokenType::Space), Token::Comment), Ok(Scan::new(TokenType::Comment, Step::Skip)));
        assert_eq!(scan_comment(&[], Some(&open_group()), Some(TokenType::Parameter), Token::Comment), Err(LexErrKind::UnexpectedSpace));
    }

    #[test]
    fn test_label_rule() {
        let label = || Token::LabelDef("L".to_string());
        let emitted = Ok(Scan::new(TokenType::Label, Step::Emit(SymbolKind::Label("L".to_string()))));

        assert_eq!(scan_label(&[], None, None, label()), emitted);
        assert_eq!(scan_label(&[sym(SymbolKind::NewLine, 0..1)], None, Some(TokenType::Space), label()), emitted);
        assert_eq!(
            scan_label(&[sym(SymbolKind::Opcode("NOP".to_string()), 0..3)], None, Some(TokenType::Space), label()),
            Err(LexErrKind::MisplacedLabel)
        );
        assert_eq!(scan_label(&[], None, Some(TokenType::Opcode), label()), Err(LexErrKind::MissingSeparator));
    }

    #[test]
    fn test_section_opcode_rules() {
        assert_eq!(
            scan_section(&[], None, Some(TokenType::NewLine), Token::Section("code".to_string())),
            Ok(Scan::new(TokenType::Symbol, Step::Emit(SymbolKind::Section("code".to_string()))))
        );
        assert_eq!(
            scan_opcode(&[], None, Some(TokenType::Space), Token::Ident("NOP".to_string())),
            Ok(Scan::new(TokenType::Opcode, Step::Emit(SymbolKind::Opcode("NOP".to_string()))))
        );
        assert_eq!(scan_opcode(&[], None, Some(TokenType::Symbol), Token::Ident("NOP".to_string())), Err(LexErrKind::MissingSeparator));
        assert_eq!(scan_section(&[], None, Some(TokenType::Label), Token::Section("x".to_string())), Err(LexErrKind::MissingSeparator));
    }

    #[test]
    fn test_param_rule() {
        let begun = Ok(Scan::new(TokenType::Parameter, Step::Begin(Param::Reg(0))));
        assert_eq!(scan_param(&[], None, Some(TokenType::Space), Token::Reg(0)), begun);
        assert_eq!(scan_param(&[], None, Some(TokenType::Opcode), Token::Reg(0)), Err(LexErrKind::MissingSeparator));

        // comma
        assert_eq!(
            scan_param(&[], Some(&closed_group()), Some(TokenType::Parameter), Token::Comma),
            Ok(Scan::new(TokenType::Parameter, Step::Join))
        );
        assert_eq!(scan_param(&[], Some(&open_group()), Some(TokenType::Parameter), Token::Comma), Err(LexErrKind::UnexpectedComma));
        assert_eq!(scan_param(&[], None, Some(TokenType::Space), Token::Comma), Err(LexErrKind::UnexpectedComma));

        // operand after comma
        assert_eq!(
            scan_param(&[], Some(&open_group()), Some(TokenType::Parameter), Token::Reg(0)),
            Ok(Scan::new(TokenType::Parameter, Step::Extend(Param::Reg(0))))
        );
        // operand directly after operand
        assert_eq!(scan_param(&[], Some(&closed_group()), Some(TokenType::Parameter), Token::Reg(0)), Err(LexErrKind::MissingSeparator));
    }

    #[test]
    fn test_tokenize() {
        let src = ".data\ntext1: \"abc\\n\"\n.code\n  MOV &text1,R2 ; load address\n  INT 1";
        assert_eq!(kinds(src), vec![
            SymbolKind::Section("data".to_string()),
            SymbolKind::NewLine,
            SymbolKind::Label("text1".to_string()),
            SymbolKind::Params(vec![Param::Str("abc\n".to_string())]),
            SymbolKind::NewLine,
            SymbolKind::Section("code".to_string()),
            SymbolKind::NewLine,
            SymbolKind::Opcode("MOV".to_string()),
            SymbolKind::Params(vec![Param::AddrOf("text1".to_string()), Param::Reg(2)]),
            SymbolKind::NewLine,
            SymbolKind::Opcode("INT".to_string()),
            SymbolKind::Params(vec![Param::Num(1)]),
        ]);

        // spans
        let symbols = tokenize("MOV $2,R0").unwrap();
        assert_eq!(symbols[1].span, 4..9);

        assert!(kinds("").is_empty());
        assert!(kinds("  ; only a comment").is_empty());
    }

    #[test]
    fn test_tokenize_errors() {
        assert_eq!(lex_err("MOV $2, R0"), LexErrKind::UnexpectedSpace);
        assert_eq!(lex_err("MOV $2,\nR0"), LexErrKind::UnexpectedSpace);
        assert_eq!(lex_err("MOV $2,"), LexErrKind::UnexpectedEof);
        assert_eq!(lex_err("MOV $2 ,R0"), LexErrKind::UnexpectedComma);
        assert_eq!(lex_err("MOV,R0"), LexErrKind::UnexpectedComma);
        assert_eq!(lex_err("NOP L:"), LexErrKind::MisplacedLabel);
        assert_eq!(lex_err("L:NOP"), LexErrKind::MissingSeparator);
        assert_eq!(lex_err("MOV $2,R0 @"), LexErrKind::InvalidSymbol);

        assert_eq!(tokenize("NOP\n  MOV $2, R0"), Err(LexErr {
            kind: LexErrKind::UnexpectedSpace,
            span: 13..14,
            in_progress: Some(TokenType::Parameter)
        }));

        assert!(LexErrKind::MisplacedLabel.is_malformed_token());
        assert!(!LexErrKind::InvalidHex.is_malformed_token());
    }
}
