use super::shell::split_words;
use super::types::{AssignOp, Assignment, Command, SetOptions, Span};

/// Words that may precede a command without changing what it is.
const LEADING_KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "do", "while", "until", "!", "{",
];

/// Builtins that bind the assignments that follow them.
const DECLARATION_BUILTINS: &[&str] = &["export", "local", "declare", "typeset", "readonly"];

/// Tokenize a command into words using shlex (POSIX word splitting).
pub fn tokenize(command: &str) -> Vec<String> {
    shlex::split(command).unwrap_or_else(|| {
        // unbalanced quotes
        command.split_whitespace().map(String::from).collect()
    })
}

/// Strip one layer of quotes from the start and end of a word, and
/// quotes that hug a path separator (`"$DIR"/lib` → `$DIR/lib`).
pub fn strip_quotes(word: &str) -> String {
    let trimmed = word.trim();
    let inner = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let inner = inner.strip_suffix(['"', '\'']).unwrap_or(inner);
    inner.replace("\"/", "/").replace("/\"", "/")
}

/// Remove shell quoting from a word. Falls back to [`strip_quotes`] when
/// the text is not exactly one well-formed shell word.
pub fn unquote(word: &str) -> String {
    match shlex::split(word) {
        Some(words) if words.len() == 1 => words.into_iter().next().unwrap_or_default(),
        _ => strip_quotes(word),
    }
}

/// True for a valid shell variable name.
pub fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse one `NAME=value` / `NAME+=value` word starting at `start` in the
/// statement text.
fn assignment(word: &str, start: usize) -> Option<Assignment> {
    let eq = word.find('=')?;
    let (name, operator) = match word[..eq].strip_suffix('+') {
        Some(name) => (name, AssignOp::Append),
        None => (&word[..eq], AssignOp::Assign),
    };
    if !is_name(name) {
        return None;
    }
    Some(Assignment {
        name: name.to_string(),
        operator,
        value: word[eq + 1..].to_string(),
        value_span: Span::new(start + eq + 1, start + word.len()),
    })
}

/// Skip leading compound-command keywords. Returns the byte offset of the
/// first real command word within `text`.
fn command_start(text: &str) -> usize {
    let mut offset = 0;
    loop {
        let rest = &text[offset..];
        let trimmed = rest.trim_start();
        let lead = rest.len() - trimmed.len();
        // `{` and `!` need not be followed by whitespace; `(` opens a
        // subshell whose state changes do not escape, so it is not skipped
        if let Some(after) = trimmed.strip_prefix(['{', '!'])
            && !after.starts_with(['(', '{', '='])
        {
            offset += lead + 1;
            continue;
        }
        let word_len = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let word = &trimmed[..word_len];
        if word_len < trimmed.len() && LEADING_KEYWORDS.contains(&word) {
            offset += lead + word_len;
            continue;
        }
        return offset + lead;
    }
}

/// First operand of `cd`, past `-L`/`-P`/`-e`/`-@` flags and `--`.
/// A lone `-` is an operand.
fn cd_operand<'a>(text: &str, args: &'a [Span]) -> Option<&'a Span> {
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        let word = arg.slice(text);
        if word == "--" {
            return args.next();
        }
        match word.strip_prefix('-') {
            Some(flags) if !flags.is_empty() && flags.chars().all(|c| "LPe@".contains(c)) => {}
            _ => return Some(arg),
        }
    }
    None
}

/// Parse the arguments of a `set` builtin into options.
pub fn parse_set_options(args: &[String]) -> SetOptions {
    let mut options = SetOptions::default();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "-" || arg == "--" {
            break;
        }
        let (enable, letters) = if let Some(l) = arg.strip_prefix('-') {
            (true, l)
        } else if let Some(l) = arg.strip_prefix('+') {
            (false, l)
        } else {
            // positional parameters start here
            break;
        };
        let mut takes_name = false;
        for c in letters.chars() {
            if c == 'o' {
                takes_name = true;
            } else if enable {
                options.letters.insert(c);
            }
        }
        if takes_name {
            let name = iter.next_if(|next| !next.starts_with(['-', '+']));
            match name {
                Some(name) if enable && !options.long.contains(name) => {
                    options.long.push(name.clone())
                }
                Some(_) => {}
                None if enable => options.bare_o = true,
                None => {}
            }
        }
    }
    options
}

/// Classify one statement.
///
/// Quoted or commented statements never match: a statement whose first
/// word is a string literal is just an expression, not a `cd`/`source`.
pub fn classify(text: &str) -> Command {
    let base = command_start(text);
    let body = &text[base..];
    let words: Vec<Span> = split_words(body)
        .into_iter()
        .map(|w| w.shifted(base))
        .collect();
    let Some(first) = words.first() else {
        return Command::Other;
    };
    let head = first.slice(text);

    match head {
        "cd" => {
            let operand = cd_operand(text, &words[1..]);
            let argument = operand.map(|w| w.slice(text).to_string());
            let end = operand.map_or(first.end, |w| w.end);
            Command::Cd {
                argument,
                span: Span::new(first.start, end),
            }
        }
        "source" | "." => match words.get(1) {
            Some(arg) => Command::Source {
                argument: arg.slice(text).to_string(),
                keyword: *first,
                span: Span::new(first.start, arg.end),
            },
            None => Command::Other,
        },
        "set" => {
            let args: Vec<String> = words[1..]
                .iter()
                .flat_map(|w| tokenize(w.slice(text)))
                .collect();
            Command::Set(parse_set_options(&args))
        }
        "function" => match words.get(1) {
            Some(name) => Command::FunctionDef {
                name: name.slice(text).trim_end_matches("()").to_string(),
            },
            None => Command::Other,
        },
        _ if DECLARATION_BUILTINS.contains(&head) => {
            let bindings: Vec<Assignment> = words[1..]
                .iter()
                .filter(|w| !w.slice(text).starts_with(['-', '+']))
                .filter_map(|w| assignment(w.slice(text), w.start))
                .collect();
            if bindings.is_empty() {
                Command::Other
            } else {
                Command::Assign(bindings)
            }
        }
        _ => {
            if let Some(name) = head.strip_suffix("()")
                && is_name(name)
            {
                return Command::FunctionDef {
                    name: name.to_string(),
                };
            }
            if is_name(head) && words.get(1).is_some_and(|w| w.slice(text).starts_with("()")) {
                return Command::FunctionDef {
                    name: head.to_string(),
                };
            }
            // Only a statement made entirely of assignments binds variables;
            // `NAME=value cmd` scopes NAME to cmd.
            let bindings: Option<Vec<Assignment>> = words
                .iter()
                .map(|w| assignment(w.slice(text), w.start))
                .collect();
            match bindings {
                Some(bindings) => Command::Assign(bindings),
                None => Command::Other,
            }
        }
    }
}
