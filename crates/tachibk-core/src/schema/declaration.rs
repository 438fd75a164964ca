//! Locates class declarations and their constructor parameter lists.

use regex::Regex;
use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::LazyLock;
use tracing::trace;

/// `[data] class Name(` at the start of a line
static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:data\s+)?class\s+(\w+)\s*\(").expect("Invalid class header regex")
});

/// A class declaration with the raw text between its outermost parentheses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration<'a> {
    /// Class name
    pub name: &'a str,
    /// Constructor parameter text, parentheses excluded
    pub parameters: &'a str,
}

/// Lazy iterator over the declarations of a source file
#[derive(Debug, Clone)]
pub struct Declarations<'a> {
    text: &'a str,
    position: usize,
}

/// Iterates over every top-level `[data] class Name( ... )` in `text`.
///
/// Declarations whose parentheses never balance are skipped.
pub fn declarations(text: &str) -> Declarations<'_> {
    Declarations { text, position: 0 }
}

impl<'a> Iterator for Declarations<'a> {
    type Item = Declaration<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.text.len() {
            let captures = HEADER.captures_at(self.text, self.position)?;
            let header = captures.get(0)?;
            let name = captures.get(1)?.as_str();
            let open = header.end() - 1;

            match find_closing(self.text, open) {
                Some(close) => {
                    self.position = close + 1;
                    return Some(Declaration {
                        name,
                        parameters: &self.text[open + 1..close],
                    });
                }
                None => {
                    trace!("Skipping unbalanced declaration of {}", name);
                    self.position = header.end();
                }
            }
        }
        None
    }
}

/// Finds the parenthesis closing the one at byte offset `open`.
pub(crate) fn find_closing(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in CodeChars::new(&text[open..]) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Characters of Kotlin source outside comments and literals.
///
/// String and char literals vanish entirely, quotes included. Each comment
/// collapses into one space so neighbouring tokens stay apart.
pub(crate) struct CodeChars<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> CodeChars<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
        }
    }

    fn next_is(&mut self, expected: char) -> bool {
        self.chars.peek().is_some_and(|&(_, c)| c == expected)
    }

    fn skip_line(&mut self) {
        while self.chars.next_if(|&(_, c)| c != '\n').is_some() {}
    }

    fn skip_block_comment(&mut self) {
        while let Some((_, c)) = self.chars.next() {
            if c == '*' && self.next_is('/') {
                self.chars.next();
                return;
            }
        }
    }

    fn skip_quoted(&mut self, quote: char) {
        while let Some((_, c)) = self.chars.next() {
            match c {
                '\\' => {
                    self.chars.next();
                }
                c if c == quote => return,
                _ => {}
            }
        }
    }

    fn skip_raw_string(&mut self) {
        // Opening quotes two and three
        self.chars.next();
        self.chars.next();
        while let Some((i, c)) = self.chars.next() {
            if c == '"' && self.text[i..].starts_with(r#"""""#) {
                self.chars.next();
                self.chars.next();
                return;
            }
        }
    }
}

impl Iterator for CodeChars<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (i, c) = self.chars.next()?;
            match c {
                '/' if self.next_is('/') => {
                    self.skip_line();
                    return Some((i, ' '));
                }
                '/' if self.next_is('*') => {
                    self.chars.next();
                    self.skip_block_comment();
                    return Some((i, ' '));
                }
                '"' if self.text[i..].starts_with(r#"""""#) => self.skip_raw_string(),
                '"' | '\'' => self.skip_quoted(c),
                _ => return Some((i, c)),
            }
        }
    }
}
