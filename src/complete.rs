//! Shell completion over a declarative model of the command line.
//!
//! The shell invokes the tool as `<tool> --_complete <index> <argv0>
//! <word>...`, passing its own word split. The model describes, per
//! (sub)command, how many values each positional and keyword argument
//! consumes; completion walks the words left to right and finally matches the
//! partial word against the remaining keyword names.

use std::collections::BTreeMap;

/// The option the shell completion function passes the current command line
/// through.
pub const COMPLETE_OPTION: &str = "--_complete";

/// Marker for an unbounded number of argument values.
pub const ANY: usize = usize::MAX;

/// Bounds on the number of values an argument consumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Argument {
    pub min: usize,
    pub max: usize,
}

impl Argument {
    pub const fn new(min: usize, max: usize) -> Self {
        Argument { min, max }
    }

    fn decrement(self) -> Self {
        Argument {
            min: self.min.saturating_sub(1),
            max: self.max.saturating_sub(1),
        }
    }
}

/// What a keyword stands for: a flag or option consuming values, or a whole
/// subcommand with arguments of its own.
#[derive(Clone, Debug)]
pub enum Keyword {
    Option(Argument),
    Subcommand(Arguments),
}

/// The arguments of one (sub)command.
#[derive(Clone, Debug, Default)]
pub struct Arguments {
    pub positionals: Vec<Argument>,
    pub keywords: BTreeMap<String, Keyword>,
}

/// `nargs` shapes as accepted by argument parsers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Nargs {
    /// `"?"`: zero or one value.
    Optional,
    /// `"*"`: any number of values.
    Any,
    /// `"+"`: at least one value.
    AtLeastOne,
    /// An exact count.
    Exactly(usize),
}

pub fn decode_nargs(nargs: Nargs) -> Argument {
    match nargs {
        Nargs::Optional => Argument::new(0, 1),
        Nargs::Any => Argument::new(0, ANY),
        Nargs::AtLeastOne => Argument::new(1, ANY),
        Nargs::Exactly(count) => Argument::new(count, count),
    }
}

/// Store-like argument actions and their value counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Store,
    StoreConst,
    StoreTrue,
    StoreFalse,
    Append,
    AppendConst,
    Count,
    Help,
    Version,
}

pub fn decode_action(action: Action) -> Argument {
    match action {
        Action::Store | Action::Append => decode_nargs(Nargs::Exactly(1)),
        Action::StoreConst
        | Action::StoreTrue
        | Action::StoreFalse
        | Action::AppendConst
        | Action::Count
        | Action::Help
        | Action::Version => decode_nargs(Nargs::Exactly(0)),
    }
}

/// Escape `--` as `\--` in all words from `index` on.
///
/// A `--` at or after the completion marker is a legitimate prefix of a word
/// to complete, not an end-of-options marker; escaping keeps the argument
/// parser from swallowing it. [`unescape_double_dash`] is the exact inverse.
pub fn escape_double_dash(words: &[String], index: usize) -> Vec<String> {
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i < index {
                word.clone()
            } else {
                word.replace("--", r"\--")
            }
        })
        .collect()
}

/// Undo [`escape_double_dash`].
pub fn unescape_double_dash(words: &[String]) -> Vec<String> {
    words.iter().map(|word| word.replace(r"\--", "--")).collect()
}

/// Complete the last word against the model, given all words before it.
///
/// Keyword matches take precedence and consume up to `max` following values;
/// unconsumed values advance the command-level positional cursor. Candidates
/// are only offered while no keyword-level values are still required.
pub fn complete(mut arguments: &Arguments, words: &[String]) -> Vec<String> {
    let Some((to_complete, words)) = words.split_last() else {
        return Vec::new();
    };
    // The cursor into the command-level positional arguments.
    let mut pos_idx = 0;
    let mut pos = arguments
        .positionals
        .get(pos_idx)
        .copied()
        .unwrap_or_default();
    // The values still consumed by the most recent keyword.
    let mut key = Argument::default();

    for word in words {
        if let Some(keyword) = arguments.keywords.get(word) {
            key = Argument::default();
            match keyword {
                Keyword::Subcommand(sub) => arguments = sub,
                Keyword::Option(argument) => key = *argument,
            }
        } else if key.max > 0 {
            key = key.decrement();
        } else if pos.max > 0 {
            pos = pos.decrement();
        } else {
            let mut matched = false;
            for idx in (pos_idx + 1)..arguments.positionals.len() {
                pos_idx = idx;
                pos = arguments.positionals[idx];
                if pos.max > 0 {
                    pos = pos.decrement();
                    matched = true;
                    break;
                }
            }
            if !matched {
                // The word fits nowhere; nothing sensible to offer.
                return Vec::new();
            }
        }
    }

    if key.min == 0 {
        arguments
            .keywords
            .keys()
            .filter(|keyword| keyword.starts_with(to_complete.as_str()))
            .cloned()
            .collect()
    } else {
        Vec::new()
    }
}
