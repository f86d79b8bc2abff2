use std::fmt::Write;

use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

/// Prints lexer output one token per line as `[line:col] KIND token`.
pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints the source spelling instead of `Debug`
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";
    const BLU: &'static str = "\x1b[34m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        print!("{}", self.render(tokens));
    }

    pub fn render(&self, tokens: &[Spanned]) -> String {
        let mut out = String::new();
        for s in tokens {
            self.render_one(&mut out, s);
        }
        out
    }

    fn render_one(&self, out: &mut String, s: &Spanned) {
        let line = s.span.line;
        let col = s.span.col;

        let kind = kind(&s.token);
        let colr = if self.color { color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        let _ = if self.show_debug_repr {
            writeln!(out, "[{:02}:{:02}] {}{:<8} {:?}{}", line, col, colr, kind, s.token, reset)
        } else {
            writeln!(out, "[{:02}:{:02}] {}{:<8} {}{}", line, col, colr, kind, s.token, reset)
        };
    }
}

fn kind(t: &Token) -> &'static str {
    use Token::*;
    match t {
        Eof => "EOF",

        // literals
        Int(_) => "INT",
        String(_) => "STRING",
        True | False => "BOOL",

        // names
        Ident(_) => "IDENT",

        // structure
        LParen | RParen => "PAREN",
        LBracket | RBracket => "BRACKET",
        LBrace | RBrace => "BRACE",
        Comma | Semicolon | Colon => "DELIM",

        // ops / comparisons
        Assign | Plus | Minus | Bang | Asterisk | Slash => "OP",
        Eq | NotEq | Lt | Gt => "CMP",

        Function | Let | If | Else | Return => "KEYWORD",
    }
}

fn color(t: &Token) -> &'static str {
    use Token::*;
    match t {
        Eof => TokenDumper::DIM,
        String(_) => TokenDumper::GRN,
        Int(_) | True | False => TokenDumper::CYN,
        Ident(_) => TokenDumper::YEL,
        Assign | Plus | Minus | Bang | Asterisk | Slash => TokenDumper::MAG,
        Eq | NotEq | Lt | Gt => TokenDumper::MAG,
        Function | Let | If | Else | Return => TokenDumper::BLU,
        _ => TokenDumper::RESET,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    #[test]
    fn test_render_plain() {
        let tokens = Lexer::new("let x = 5;").tokenize().unwrap();
        let out = TokenDumper::new().no_color().render(&tokens);

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "[01:01] KEYWORD  Let");
        assert_eq!(lines[1], "[01:05] IDENT    Ident(\"x\")");
        assert_eq!(lines[3], "[01:09] INT      Int(5)");
        assert_eq!(lines[5], "[01:11] EOF      Eof");
    }

    #[test]
    fn test_render_pretty_uses_source_spelling() {
        let tokens = Lexer::new("a != \"b\"").tokenize().unwrap();
        let out = TokenDumper::new().no_color().pretty().render(&tokens);

        assert!(out.contains("CMP      !="));
        assert!(out.contains("STRING   \"b\""));
        assert!(out.contains("EOF      end of input"));
    }

    #[test]
    fn test_color_codes() {
        let tokens = Lexer::new("1").tokenize().unwrap();
        let out = TokenDumper::new().render(&tokens);
        assert!(out.starts_with("[01:01] \x1b[36mINT"));
        assert!(out.contains("\x1b[0m"));
    }
}
