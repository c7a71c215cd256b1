//! Field annotations: the static descriptor the derive emits for every field,
//! and the small parsers that turn its raw strings into typed values.
//!
//! Every annotation is kept as the raw string written in the attribute and
//! parsed on demand. Parsing is cheap and allocation-light: [`ConfOptions`]
//! borrows from the descriptor, [`Source`] is a hand-written matcher for the
//! `$(name)` function-reference form.

use std::fmt;

use crate::types::Stage;

/// Static metadata for one struct field, generated by `#[derive(Tagged)]`.
///
/// Empty strings mean "no annotation". All fields are public so that the
/// derive (and hand-written [`Tagged`](crate::Tagged) impls) can build the
/// table in a `static`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    /// `true` when the field is declared `pub`.
    pub exported: bool,
    pub env: &'static str,
    pub default: &'static str,
    pub test: &'static str,
    /// Flat flag-set binding: `name[,s]`.
    pub flag: &'static str,
    /// Command-tree binding: `name[,s]`, always paired with `cmd`.
    pub cflag: &'static str,
    /// Command the `cflag` belongs to: `command[,persistent]`.
    pub cmd: &'static str,
    pub usage: &'static str,
    /// Generic options, `key[=value]` separated by commas.
    pub conf: &'static str,
}

impl FieldDescriptor {
    /// A descriptor with no annotations at all.
    pub const fn bare(name: &'static str, exported: bool) -> Self {
        Self {
            name,
            exported,
            env: "",
            default: "",
            test: "",
            flag: "",
            cflag: "",
            cmd: "",
            usage: "",
            conf: "",
        }
    }

    /// Whether any substitution or validation annotation is present.
    pub fn is_annotated(&self) -> bool {
        !(self.env.is_empty()
            && self.default.is_empty()
            && self.test.is_empty()
            && self.flag.is_empty()
            && self.cflag.is_empty()
            && self.cmd.is_empty())
    }

    /// The first stage, in default order, that acts on this field.
    pub fn annotated_stage(&self) -> Option<Stage> {
        if !self.default.is_empty() {
            Some(Stage::Defaults)
        } else if !self.env.is_empty() {
            Some(Stage::Env)
        } else if !(self.flag.is_empty() && self.cflag.is_empty() && self.cmd.is_empty()) {
            Some(Stage::Flags)
        } else if !self.test.is_empty() {
            Some(Stage::Test)
        } else {
            None
        }
    }

    pub fn conf(&self) -> ConfOptions<'static> {
        ConfOptions::parse(self.conf)
    }
}

/// Parsed `conf` options.
///
/// Keys are matched exactly; values are optional (`key=value`). Unknown keys
/// are kept and can be queried with [`get`](Self::get) but have no effect on
/// the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfOptions<'a> {
    entries: Vec<(&'a str, Option<&'a str>)>,
}

impl<'a> ConfOptions<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let entries = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (entry, None),
            })
            .collect();
        Self { entries }
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// The value of `key=value`. Returns `None` both for a missing key and
    /// for a key given without a value.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| *v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Excluded from every pass.
    pub fn skip(&self) -> bool {
        self.has("skip")
    }

    /// Leave a `None` optional field alone instead of allocating it.
    pub fn skip_nil(&self) -> bool {
        self.has("skipnil")
    }

    /// Run the default pass on a `None` field even when `skipnil` is set.
    pub fn nil_default(&self) -> bool {
        self.has("nildefault")
    }

    /// Don't evaluate the test annotation while the field is zero.
    pub fn skip_zero(&self) -> bool {
        self.has("skipzero")
    }

    pub fn must_env(&self) -> bool {
        self.has("mustenv")
    }

    pub fn env_skip(&self) -> bool {
        self.has("envskip")
    }

    pub fn default_skip(&self) -> bool {
        self.has("defaultskip")
    }

    pub fn test_skip(&self) -> bool {
        self.has("testskip")
    }

    /// Environment always wins over an existing value. This is the normal
    /// behaviour; the option exists for explicitness.
    pub fn prefer_env(&self) -> bool {
        self.has("preferenv")
    }

    /// Environment only fills a field that still holds its zero value.
    pub fn backup_env(&self) -> bool {
        self.has("backupenv") && !self.prefer_env()
    }

    /// A failing test only warns.
    pub fn test_warn(&self) -> bool {
        self.has("testwarn")
    }
}

/// A `default` or test clause operand: either literal text or a reference to
/// a registered function, written `$(name)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    Literal(&'a str),
    Func(&'a str),
}

impl<'a> Source<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match func_name(raw) {
            Some(name) => Source::Func(name),
            None => Source::Literal(raw),
        }
    }
}

/// Matches `\s*$(ident)\s*` and returns the identifier.
pub(crate) fn func_name(raw: &str) -> Option<&str> {
    let inner = raw.trim().strip_prefix("$(")?.strip_suffix(')')?;
    let mut chars = inner.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(inner)
    } else {
        None
    }
}

/// `flag = "name[,s]"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagName<'a> {
    pub name: &'a str,
    pub short: Option<char>,
}

impl<'a> FlagName<'a> {
    /// Returns `None` for an empty annotation.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (name, short) = match raw.split_once(',') {
            Some((name, short)) => (name.trim(), short.trim()),
            None => (raw.trim(), ""),
        };
        if name.is_empty() {
            return None;
        }
        let mut chars = short.chars();
        let short = match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        };
        Some(Self { name, short })
    }
}

impl fmt::Display for FlagName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.short {
            Some(short) => write!(f, "--{} (-{short})", self.name),
            None => write!(f, "--{}", self.name),
        }
    }
}

/// `cmd = "command[,persistent]"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandRef {
    pub name: String,
    /// Inherited by every subcommand of `name`.
    pub persistent: bool,
}

impl CommandRef {
    /// Returns `None` for an empty annotation, `Err` with the offending
    /// modifier when it is anything other than `persistent`.
    pub fn parse(raw: &str) -> Option<Result<Self, String>> {
        let mut parts = raw.split(',').map(str::trim);
        let name = parts.next().filter(|name| !name.is_empty())?;
        let mut persistent = false;
        for modifier in parts {
            match modifier {
                "persistent" => persistent = true,
                "" => {}
                other => return Some(Err(other.to_string())),
            }
        }
        Some(Ok(Self {
            name: name.to_string(),
            persistent,
        }))
    }
}
