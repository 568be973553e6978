use super::types::{Span, Statement};

/// Single/double quote and backslash state for a left-to-right scan.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QuoteState {
    single: bool,
    double: bool,
    escaped: bool,
}

impl QuoteState {
    /// Consume `c`. Returns true when `c` is live shell syntax: outside
    /// quotes, not escaped, and not itself a quote or escape character.
    pub(crate) fn advance(&mut self, c: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        if c == '\\' && !self.single {
            self.escaped = true;
            return false;
        }
        if c == '\'' && !self.double {
            self.single = !self.single;
            return false;
        }
        if c == '"' && !self.single {
            self.double = !self.double;
            return false;
        }
        !(self.single || self.double)
    }

    /// True when the next character may open an expansion (`$(`, `${`, backtick).
    fn expansions_live(&self) -> bool {
        !self.single && !self.escaped
    }

    pub(crate) fn is_quoted(&self) -> bool {
        self.single || self.double
    }
}

/// Characters of a text together with their byte offsets.
struct Scan {
    chars: Vec<char>,
    offsets: Vec<usize>,
}

impl Scan {
    fn new(text: &str) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut offsets = Vec::with_capacity(text.len() + 1);
        for (i, c) in text.char_indices() {
            chars.push(c);
            offsets.push(i);
        }
        offsets.push(text.len());
        Self { chars, offsets }
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    fn get(&self, i: usize) -> Option<char> {
        self.chars.get(i).copied()
    }

    fn byte(&self, i: usize) -> usize {
        self.offsets[i.min(self.chars.len())]
    }
}

/// If an expansion (`$(...)`, `${...}` or a backtick span) starts at `i`,
/// return the char index just past its end. Unterminated expansions run to
/// the end of the text.
fn expansion_end(scan: &Scan, i: usize) -> Option<usize> {
    match (scan.get(i)?, scan.get(i + 1)) {
        ('$', Some('(')) => Some(closing(scan, i + 2, '(', ')')),
        ('$', Some('{')) => Some(closing(scan, i + 2, '{', '}')),
        ('`', _) => {
            let mut j = i + 1;
            while j < scan.len() && scan.chars[j] != '`' {
                if scan.chars[j] == '\\' {
                    j += 1;
                }
                j += 1;
            }
            Some((j + 1).min(scan.len()))
        }
        _ => None,
    }
}

/// Find the char index just past the `close` that balances an already
/// consumed `open`, scanning from `start`. Nested expansions carry their
/// own quoting.
fn closing(scan: &Scan, start: usize, open: char, close: char) -> usize {
    let mut depth: u32 = 1;
    let mut quote = QuoteState::default();
    let mut j = start;
    while j < scan.len() {
        let c = scan.chars[j];
        if quote.expansions_live()
            && (c == '$' || c == '`')
            && let Some(end) = expansion_end(scan, j)
        {
            j = end;
            continue;
        }
        if quote.advance(c) {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    return j + 1;
                }
            }
        }
        j += 1;
    }
    scan.len()
}

/// Iterator over the char indices of live syntax characters: unquoted,
/// unescaped and outside any `$(...)`, `${...}` or backtick expansion.
struct LiveChars<'a> {
    scan: &'a Scan,
    i: usize,
    quote: QuoteState,
}

impl<'a> LiveChars<'a> {
    fn new(scan: &'a Scan) -> Self {
        Self {
            scan,
            i: 0,
            quote: QuoteState::default(),
        }
    }
}

impl Iterator for LiveChars<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.i < self.scan.len() {
            let i = self.i;
            let c = self.scan.chars[i];
            if self.quote.expansions_live()
                && (c == '$' || c == '`')
                && let Some(end) = expansion_end(self.scan, i)
            {
                self.i = end;
                continue;
            }
            self.i += 1;
            if self.quote.advance(c) {
                return Some(i);
            }
        }
        None
    }
}

/// A `#` only starts a comment at the beginning of a word.
fn starts_word(scan: &Scan, i: usize) -> bool {
    match i.checked_sub(1).and_then(|p| scan.get(p)) {
        None => true,
        Some(prev) => prev.is_whitespace() || matches!(prev, ';' | '&' | '|' | '(' | ')'),
    }
}

/// Split a line into statements at unquoted `;`, `;;`, `&&`, `||`, `|`,
/// `|&` and `&`, stopping at the first comment.
///
/// Separators inside quotes or inside `$(...)` are not split on, and
/// redirections such as `2>&1` or `&>` are not mistaken for `&`.
pub fn split_statements(line: &str) -> Vec<Statement> {
    let scan = Scan::new(line);
    let mut statements = Vec::new();
    let mut start = 0;
    let mut end = scan.len();

    let push = |statements: &mut Vec<Statement>, from: usize, to: usize| {
        let raw = &line[scan.byte(from)..scan.byte(to)];
        let text = raw.trim();
        if !text.is_empty() {
            let lead = raw.len() - raw.trim_start().len();
            statements.push(Statement {
                text: text.to_string(),
                offset: scan.byte(from) + lead,
            });
        }
    };

    let mut live = LiveChars::new(&scan);
    while let Some(i) = live.next() {
        let c = scan.chars[i];
        let next = scan.get(i + 1);
        match c {
            '#' if starts_word(&scan, i) => {
                end = i;
                break;
            }
            ';' => {
                push(&mut statements, start, i);
                if next == Some(';') {
                    live.next();
                }
                start = live.i;
            }
            '|' => {
                push(&mut statements, start, i);
                if matches!(next, Some('|') | Some('&')) {
                    live.next();
                }
                start = live.i;
            }
            '&' => {
                if next == Some('&') {
                    push(&mut statements, start, i);
                    live.next();
                    start = live.i;
                    continue;
                }
                let prev = i.checked_sub(1).and_then(|p| scan.get(p));
                if next == Some('>') || matches!(prev, Some('>') | Some('<')) {
                    continue;
                }
                push(&mut statements, start, i);
                start = live.i;
            }
            _ => {}
        }
    }
    push(&mut statements, start, end);
    statements
}

/// Split a statement into words at unquoted whitespace.
///
/// Quoted strings, expansions and parenthesized groups stay inside one
/// word, so `arr=(a b)` and `"$(dirname "$0")"` are single words.
pub fn split_words(text: &str) -> Vec<Span> {
    let scan = Scan::new(text);
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth: u32 = 0;
    let mut quote = QuoteState::default();
    let mut i = 0;

    while i < scan.len() {
        let c = scan.chars[i];
        if quote.expansions_live()
            && (c == '$' || c == '`')
            && let Some(end) = expansion_end(&scan, i)
        {
            start.get_or_insert(i);
            i = end;
            continue;
        }
        let live = quote.advance(c);
        if live && c.is_whitespace() && depth == 0 {
            if let Some(s) = start.take() {
                words.push(Span::new(scan.byte(s), scan.byte(i)));
            }
        } else {
            start.get_or_insert(i);
            if live && c == '(' {
                depth += 1;
            } else if live && c == ')' {
                depth = depth.saturating_sub(1);
            }
        }
        i += 1;
    }
    if let Some(s) = start {
        words.push(Span::new(scan.byte(s), scan.byte(scan.len())));
    }
    words
}

/// Net change in `{`/`}` nesting contributed by a line, ignoring braces in
/// quotes, comments and parameter expansions.
pub fn brace_delta(line: &str) -> i32 {
    let scan = Scan::new(line);
    let mut delta = 0;
    for i in LiveChars::new(&scan) {
        match scan.chars[i] {
            '#' if starts_word(&scan, i) => break,
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Byte spans of the top-level `$(...)` substitutions in `text`, each
/// covering the `$(` through the closing `)`. Single-quoted text is skipped.
pub fn find_substitutions(text: &str) -> Vec<Span> {
    let scan = Scan::new(text);
    let mut spans = Vec::new();
    let mut quote = QuoteState::default();
    let mut i = 0;

    while i < scan.len() {
        let c = scan.chars[i];
        if quote.expansions_live()
            && (c == '$' || c == '`')
            && let Some(end) = expansion_end(&scan, i)
        {
            if c == '$' && scan.get(i + 1) == Some('(') {
                spans.push(Span::new(scan.byte(i), scan.byte(end)));
            }
            i = end;
            continue;
        }
        quote.advance(c);
        i += 1;
    }
    spans
}

/// True when `text` ends inside an open quote. Quotes inside a trailing
/// comment do not count.
pub fn has_unterminated_quote(text: &str) -> bool {
    let scan = Scan::new(text);
    let mut live = LiveChars::new(&scan);
    while let Some(i) = live.next() {
        if scan.chars[i] == '#' && starts_word(&scan, i) {
            return false;
        }
    }
    live.quote.is_quoted()
}

/// Tracks string literals that span several lines.
///
/// The line that opens such a literal is classified normally; the lines
/// that continue and close it are not statements of their own.
#[derive(Debug, Default)]
pub struct MultilineQuotes {
    pending: String,
}

impl MultilineQuotes {
    /// Feed the next line. Returns true when the line belongs to a string
    /// literal opened on an earlier line.
    pub fn absorb(&mut self, line: &str) -> bool {
        let continued = !self.pending.is_empty();
        if continued || has_unterminated_quote(line) {
            self.pending.push_str(line);
            self.pending.push('\n');
        }
        if continued && !has_unterminated_quote(&self.pending) {
            self.pending.clear();
        }
        continued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &str) -> Vec<String> {
        split_statements(line).into_iter().map(|s| s.text).collect()
    }

    fn words(text: &str) -> Vec<&str> {
        split_words(text).into_iter().map(|s| s.slice(text)).collect()
    }

    #[test]
    fn split_simple() {
        assert_eq!(texts("cd /tmp"), vec!["cd /tmp"]);
    }

    #[test]
    fn split_semicolon_and_operators() {
        assert_eq!(
            texts("cd /a; source b.sh && echo ok || exit 1"),
            vec!["cd /a", "source b.sh", "echo ok", "exit 1"]
        );
    }

    #[test]
    fn split_keeps_offsets() {
        let line = "echo hi;   cd /etc";
        let stmts = split_statements(line);
        assert_eq!(stmts[1].offset, 11);
        assert_eq!(&line[stmts[1].offset..], "cd /etc");
    }

    #[test]
    fn split_quoted_separator() {
        assert_eq!(texts("echo 'a; b' && echo \"c # d\""), vec![
            "echo 'a; b'",
            "echo \"c # d\""
        ]);
    }

    #[test]
    fn split_stops_at_comment() {
        assert_eq!(texts("VAR=value # cd /nowhere"), vec!["VAR=value"]);
        assert!(texts("# cd /home").is_empty());
    }

    #[test]
    fn split_hash_inside_word_is_not_comment() {
        assert_eq!(texts("echo a#b ${#arr} $#"), vec!["echo a#b ${#arr} $#"]);
    }

    #[test]
    fn split_ignores_separators_in_substitution() {
        assert_eq!(
            texts("DIR=\"$(cd \"$(dirname \"$0\")\" && pwd)\"; echo $DIR"),
            vec!["DIR=\"$(cd \"$(dirname \"$0\")\" && pwd)\"", "echo $DIR"]
        );
    }

    #[test]
    fn split_redirections_are_not_background() {
        assert_eq!(texts("cmd 2>&1 >&2 &> out"), vec!["cmd 2>&1 >&2 &> out"]);
        assert_eq!(texts("sleep 1 & wait"), vec!["sleep 1", "wait"]);
    }

    #[test]
    fn split_case_terminator() {
        assert_eq!(texts("a) echo a ;; b) echo b"), vec!["a) echo a", "b) echo b"]);
    }

    #[test]
    fn words_keep_groups_together() {
        assert_eq!(words("arr=( a b ) x"), vec!["arr=( a b )", "x"]);
        assert_eq!(words("cd \"$(dirname \"$0\")\" x"), vec![
            "cd",
            "\"$(dirname \"$0\")\"",
            "x"
        ]);
        assert_eq!(words("cd /with\\ spaces"), vec!["cd", "/with\\ spaces"]);
    }

    #[test]
    fn brace_counting() {
        assert_eq!(brace_delta("main() {"), 1);
        assert_eq!(brace_delta("}"), -1);
        assert_eq!(brace_delta("echo \"${HOME}\" '{' # {"), 0);
        assert_eq!(brace_delta("f() { echo hi; }"), 0);
    }

    #[test]
    fn substitutions_found_at_top_level_only() {
        let text = "\"$(dirname \"$(realpath x)\")\"/lib '$(no)'";
        let spans = find_substitutions(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].slice(text), "$(dirname \"$(realpath x)\")");
    }

    #[test]
    fn unterminated_quote() {
        assert!(has_unterminated_quote("echo \"open"));
        assert!(!has_unterminated_quote("echo \"closed\""));
        assert!(!has_unterminated_quote("# don't count this"));
    }

    #[test]
    fn multiline_string_lines_are_absorbed() {
        let mut quotes = MultilineQuotes::default();
        assert!(!quotes.absorb("MSG=\"first"));
        assert!(quotes.absorb("cd /not/a/command"));
        assert!(quotes.absorb("last\""));
        assert!(!quotes.absorb("cd /tmp"));
    }
}
