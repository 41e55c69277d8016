// Copyright 2023 ToyCC contributors

//! Token model and the process-wide kind registry.
//!
//! `TokenKind` is a closed enumeration covering the C/C++ punctuators and
//! keywords plus the literal classes the lexer can produce. Each kind is
//! declared exactly once in the table below together with its map key: the
//! concrete spelling for keywords and punctuators, or a reserved
//! `--_..._--`-style key for the synthetic classes. The string-keyed map is
//! built lazily once and is immutable afterwards.

use lazy_static::lazy_static;
use std::collections::HashMap;

macro_rules! token_kinds {
    ( $( $variant:ident => $key:expr, )+ ) => {
        /// Lexical class of a token.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum TokenKind {
            $( $variant, )+
        }

        impl TokenKind {
            const ALL: &'static [TokenKind] = &[ $( TokenKind::$variant, )+ ];

            /// Spelling used in the string-keyed registry.
            pub fn map_key(self) -> &'static str {
                match self {
                    $( TokenKind::$variant => $key, )+
                }
            }

            /// Enum variant name, used by the token dump.
            pub fn name(self) -> &'static str {
                match self {
                    $( TokenKind::$variant => stringify!($variant), )+
                }
            }

            /// Inverse of `kind as u32`; used by the parser-table store.
            pub fn from_u32(value: u32) -> Option<TokenKind> {
                TokenKind::ALL.get(value as usize).copied()
            }
        }

        lazy_static! {
            static ref TOKEN_KIND_MAP: HashMap<&'static str, TokenKind> = {
                let mut map = HashMap::new();
                $( map.insert($key, TokenKind::$variant); )+
                map
            };
        }
    };
}

token_kinds! {
    // punctuators
    LSquare => "[",
    RSquare => "]",
    LParen => "(",
    RParen => ")",
    LBrace => "{",
    RBrace => "}",
    Period => ".",
    Ellipsis => "...",
    Amp => "&",
    AmpAmp => "&&",
    AmpEqual => "&=",
    Star => "*",
    StarEqual => "*=",
    Plus => "+",
    PlusPlus => "++",
    PlusEqual => "+=",
    Minus => "-",
    Arrow => "->",
    MinusMinus => "--",
    MinusEqual => "-=",
    Tilde => "~",
    Exclaim => "!",
    ExclaimEqual => "!=",
    Slash => "/",
    SlashEqual => "/=",
    Percent => "%",
    PercentEqual => "%=",
    Less => "<",
    LessLess => "<<",
    LessEqual => "<=",
    LessLessEqual => "<<=",
    Spaceship => "<=>",
    Greater => ">",
    GreaterGreater => ">>",
    GreaterEqual => ">=",
    GreaterGreaterEqual => ">>=",
    Caret => "^",
    CaretEqual => "^=",
    Pipe => "|",
    PipePipe => "||",
    PipeEqual => "|=",
    Question => "?",
    Colon => ":",
    Semi => ";",
    Equal => "=",
    EqualEqual => "==",
    Comma => ",",
    Hash => "#",
    HashHash => "##",
    HashAt => "#@",
    PeriodStar => ".*",
    ArrowStar => "->*",
    ColonColon => "::",
    At => "@",
    LessLessLess => "<<<",
    GreaterGreaterGreater => ">>>",
    CaretCaret => "^^",
    // C keywords
    KwAuto => "auto",
    KwBreak => "break",
    KwCase => "case",
    KwChar => "char",
    KwConst => "const",
    KwContinue => "continue",
    KwDefault => "default",
    KwDo => "do",
    KwDouble => "double",
    KwElse => "else",
    KwEnum => "enum",
    KwExtern => "extern",
    KwFloat => "float",
    KwFor => "for",
    KwGoto => "goto",
    KwIf => "if",
    KwInline => "inline",
    KwInt => "int",
    KwLong => "long",
    KwRegister => "register",
    KwRestrict => "restrict",
    KwReturn => "return",
    KwShort => "short",
    KwSigned => "signed",
    KwSizeof => "sizeof",
    KwStatic => "static",
    KwStruct => "struct",
    KwSwitch => "switch",
    KwTypedef => "typedef",
    KwUnion => "union",
    KwUnsigned => "unsigned",
    KwVoid => "void",
    KwVolatile => "volatile",
    KwWhile => "while",
    // C++ keywords kept so C++ sources still tokenize sensibly
    KwAsm => "asm",
    KwBool => "bool",
    KwCatch => "catch",
    KwClass => "class",
    KwConstCast => "const_cast",
    KwDelete => "delete",
    KwDynamicCast => "dynamic_cast",
    KwExplicit => "explicit",
    KwExport => "export",
    KwFalse => "false",
    KwFriend => "friend",
    KwMutable => "mutable",
    KwNamespace => "namespace",
    KwNew => "new",
    KwOperator => "operator",
    KwPrivate => "private",
    KwProtected => "protected",
    KwPublic => "public",
    KwReinterpretCast => "reinterpret_cast",
    KwStaticCast => "static_cast",
    KwTemplate => "template",
    KwThis => "this",
    KwThrow => "throw",
    KwTrue => "true",
    KwTry => "try",
    KwTypename => "typename",
    KwTypeid => "typeid",
    KwUsing => "using",
    KwVirtual => "virtual",
    KwWcharT => "wchar_t",
    // synthetic classes
    Identifier => "--_identifier_",
    Unknown => "--_unknown_",
    NumericConstant => "--_numeric_constant_",
    CharConstant => "--_char_constant_",
    StringLiteral => "--_string_literal_",
    Eof => "--_eof_",
    SingleLineComment => "--_single_line_comment_",
    MultiLineComment => "--_multi_line_comment_",
}

impl TokenKind {
    /// Resolve a registry key (a keyword/punctuator spelling or one of the
    /// reserved class keys) to its kind.
    pub fn lookup(key: &str) -> Option<TokenKind> {
        TOKEN_KIND_MAP.get(key).copied()
    }

    pub fn is_comment(self) -> bool {
        self == TokenKind::SingleLineComment || self == TokenKind::MultiLineComment
    }
}

impl Default for TokenKind {
    fn default() -> Self {
        TokenKind::Unknown
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One lexeme with its 1-based source position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Token {
    pub content: String,
    pub row: usize,
    pub col: usize,
    pub kind: TokenKind,
}

impl Token {
    pub fn new(content: String, row: usize, col: usize, kind: TokenKind) -> Self {
        Self {
            content,
            row,
            col,
            kind,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({}, {}) {}", self.row, self.col, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_and_punctuators_resolve() {
        assert_eq!(TokenKind::lookup("while"), Some(TokenKind::KwWhile));
        assert_eq!(TokenKind::lookup(">>="), Some(TokenKind::GreaterGreaterEqual));
        assert_eq!(TokenKind::lookup("--_eof_"), Some(TokenKind::Eof));
        assert_eq!(TokenKind::lookup("not-a-key"), None);
    }

    #[test]
    fn u32_round_trip() {
        for &kind in &[TokenKind::LSquare, TokenKind::KwInt, TokenKind::Eof] {
            assert_eq!(TokenKind::from_u32(kind as u32), Some(kind));
        }
        assert_eq!(TokenKind::from_u32(u32::max_value()), None);
    }

    #[test]
    fn map_keys_are_unique() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for &kind in TokenKind::ALL {
            assert!(seen.insert(kind.map_key()), "duplicate key {}", kind.map_key());
        }
    }
}
