//! Clap back-ends for the flag protocol.
//!
//! Compiled only with the `clap` Cargo feature (on by default). Two
//! [`FlagSurface`]s are provided:
//!
//! - [`ClapFlagSet`]: one flat [`clap::Command`], the target of `flag`
//!   annotations.
//! - [`CommandTree`]: a tree of named commands, the target of `cflag` +
//!   `cmd` annotations. A `persistent` flag becomes a clap global arg and is
//!   visible to every subcommand of its owner.
//!
//! A flag counts as supplied only when clap reports
//! [`ValueSource::CommandLine`] for it; values coming from clap defaults are
//! ignored so they never overwrite configuration from other sources.

use std::collections::BTreeMap;
use std::ffi::OsString;

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use crate::error::TagfigError;
use crate::flags::{FlagDef, FlagSurface};
use crate::value::{PrimitiveKind, Value};

/// A flat flag set on a single clap command.
#[derive(Debug, Clone)]
pub struct ClapFlagSet {
    command: Command,
    matches: Option<ArgMatches>,
}

impl ClapFlagSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_command(Command::new(name.into()))
    }

    /// Start from an existing command, keeping its own args.
    pub fn from_command(command: Command) -> Self {
        Self {
            command,
            matches: None,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn matches(&self) -> Option<&ArgMatches> {
        self.matches.as_ref()
    }
}

impl FlagSurface for ClapFlagSet {
    fn define(&mut self, def: &FlagDef) -> Result<(), TagfigError> {
        check_free(&self.command, def)?;
        let command = std::mem::take(&mut self.command);
        self.command = command.arg(build_arg(def));
        Ok(())
    }

    fn is_defined(&self, def: &FlagDef) -> bool {
        has_arg(&self.command, def)
    }

    fn is_parsed(&self) -> bool {
        self.matches.is_some()
    }

    fn parse(&mut self, args: Vec<OsString>) -> Result<(), TagfigError> {
        let matches = self.command.clone().try_get_matches_from(args)?;
        self.matches = Some(matches);
        Ok(())
    }

    fn supplied(&self, def: &FlagDef) -> Option<Value> {
        read_value(self.matches.as_ref()?, def)
    }
}

#[derive(Debug, Clone)]
struct CommandNode {
    command: Command,
    parent: Option<String>,
    children: Vec<String>,
}

/// Named clap commands linked parent to child.
///
/// Commands are addressed by their clap name, so names must be unique
/// across the whole tree.
#[derive(Debug, Clone)]
pub struct CommandTree {
    root: String,
    nodes: BTreeMap<String, CommandNode>,
    matches: Option<ArgMatches>,
}

impl CommandTree {
    pub fn new(root: Command) -> Self {
        let name = root.get_name().to_string();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            name.clone(),
            CommandNode {
                command: root,
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            root: name,
            nodes,
            matches: None,
        }
    }

    /// Register `command` as a subcommand of `parent`. The name must not be
    /// taken anywhere in the tree.
    pub fn register_subcommand(
        &mut self,
        parent: &str,
        command: Command,
    ) -> Result<&mut Self, TagfigError> {
        let name = command.get_name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(TagfigError::DuplicateCommand { command: name });
        }
        let Some(node) = self.nodes.get_mut(parent) else {
            return Err(TagfigError::CommandNotRegistered {
                path: name,
                command: parent.to_string(),
            });
        };
        node.children.push(name.clone());
        tracing::debug!(command = %name, parent, "command registered");
        self.nodes.insert(
            name,
            CommandNode {
                command,
                parent: Some(parent.to_string()),
                children: Vec::new(),
            },
        );
        Ok(self)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn matches(&self) -> Option<&ArgMatches> {
        self.matches.as_ref()
    }

    /// Names of the invoked commands, root first. Empty before parsing.
    pub fn invoked(&self) -> Vec<&str> {
        let Some(mut current) = self.matches.as_ref() else {
            return Vec::new();
        };
        let mut chain = vec![self.root.as_str()];
        while let Some((name, sub)) = current.subcommand() {
            chain.push(name);
            current = sub;
        }
        chain
    }

    /// The fully assembled clap command, subcommands included.
    pub fn command(&self) -> Command {
        self.assemble(&self.root)
    }

    fn assemble(&self, name: &str) -> Command {
        let Some(node) = self.nodes.get(name) else {
            return Command::new(name.to_string());
        };
        node.children
            .iter()
            .fold(node.command.clone(), |command, child| {
                command.subcommand(self.assemble(child))
            })
    }

    /// Command names from the root down to `name`.
    fn lineage(&self, name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get_key_value(name);
        while let Some((key, node)) = current {
            chain.push(key.as_str());
            current = node
                .parent
                .as_deref()
                .and_then(|parent| self.nodes.get_key_value(parent));
        }
        chain.reverse();
        chain
    }
}

impl FlagSurface for CommandTree {
    fn define(&mut self, def: &FlagDef) -> Result<(), TagfigError> {
        let owner = def
            .command
            .as_ref()
            .map_or(self.root.as_str(), |c| c.name.as_str())
            .to_string();
        let Some(node) = self.nodes.get_mut(&owner) else {
            return Err(TagfigError::CommandNotRegistered {
                path: def.name.clone(),
                command: owner,
            });
        };
        check_free(&node.command, def)?;
        let persistent = def.command.as_ref().is_some_and(|c| c.persistent);
        let command = std::mem::take(&mut node.command);
        node.command = command.arg(build_arg(def).global(persistent));
        Ok(())
    }

    fn is_defined(&self, def: &FlagDef) -> bool {
        let owner = def
            .command
            .as_ref()
            .map_or(self.root.as_str(), |c| c.name.as_str());
        self.nodes
            .get(owner)
            .is_some_and(|node| has_arg(&node.command, def))
    }

    fn has_command(&self, command: &str) -> bool {
        self.nodes.contains_key(command)
    }

    fn is_parsed(&self) -> bool {
        self.matches.is_some()
    }

    fn parse(&mut self, args: Vec<OsString>) -> Result<(), TagfigError> {
        let matches = self.command().try_get_matches_from(args)?;
        self.matches = Some(matches);
        Ok(())
    }

    fn supplied(&self, def: &FlagDef) -> Option<Value> {
        let mut current = self.matches.as_ref()?;
        let owner = def
            .command
            .as_ref()
            .map_or(self.root.as_str(), |c| c.name.as_str());
        for name in self.lineage(owner).into_iter().skip(1) {
            match current.subcommand() {
                Some((invoked, sub)) if invoked == name => current = sub,
                _ => return None,
            }
        }

        let persistent = def.command.as_ref().is_some_and(|c| c.persistent);
        loop {
            if let Some(value) = read_value(current, def) {
                return Some(value);
            }
            if !persistent {
                return None;
            }
            current = current.subcommand()?.1;
        }
    }
}

fn has_arg(command: &Command, def: &FlagDef) -> bool {
    command
        .get_arguments()
        .any(|arg| arg.get_id() == def.name.as_str())
}

fn check_free(command: &Command, def: &FlagDef) -> Result<(), TagfigError> {
    let conflict = |reason: String| TagfigError::FlagConflict {
        flag: def.name.clone(),
        reason,
    };
    if def.name == "help" || def.short == Some('h') {
        return Err(conflict("reserved for help".into()));
    }
    for arg in command.get_arguments() {
        if arg.get_id() == def.name.as_str() || arg.get_long() == Some(def.name.as_str()) {
            return Err(conflict(format!("already defined on '{}'", command.get_name())));
        }
        if def.short.is_some() && arg.get_short() == def.short {
            return Err(conflict(format!(
                "short -{} already used by '{}'",
                arg.get_short().unwrap_or_default(),
                arg.get_id()
            )));
        }
    }
    Ok(())
}

fn build_arg(def: &FlagDef) -> Arg {
    let mut arg = Arg::new(def.name.clone()).long(def.name.clone());
    if let Some(short) = def.short {
        arg = arg.short(short);
    }
    if !def.usage.is_empty() {
        arg = arg.help(def.usage.clone());
    }
    match def.kind {
        PrimitiveKind::Bool => arg.action(ArgAction::SetTrue),
        PrimitiveKind::Str => arg.action(ArgAction::Set).value_parser(value_parser!(String)),
        PrimitiveKind::Int => arg
            .action(ArgAction::Set)
            .value_parser(value_parser!(i64))
            .allow_negative_numbers(true),
        PrimitiveKind::Uint => arg.action(ArgAction::Set).value_parser(value_parser!(u64)),
        PrimitiveKind::Float => arg
            .action(ArgAction::Set)
            .value_parser(value_parser!(f64))
            .allow_negative_numbers(true),
    }
}

/// The value of `def` if it came from the command line.
fn read_value(matches: &ArgMatches, def: &FlagDef) -> Option<Value> {
    let id = def.name.as_str();
    let value = match def.kind {
        PrimitiveKind::Bool => matches.try_get_one::<bool>(id).ok()?.copied().map(Value::Bool),
        PrimitiveKind::Str => matches.try_get_one::<String>(id).ok()?.cloned().map(Value::Str),
        PrimitiveKind::Int => matches.try_get_one::<i64>(id).ok()?.copied().map(Value::Int),
        PrimitiveKind::Uint => matches.try_get_one::<u64>(id).ok()?.copied().map(Value::Uint),
        PrimitiveKind::Float => matches.try_get_one::<f64>(id).ok()?.copied().map(Value::Float),
    }?;
    (matches.value_source(id) == Some(ValueSource::CommandLine)).then_some(value)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::annotation::CommandRef;

    fn def(name: &str, short: Option<char>, kind: PrimitiveKind) -> FlagDef {
        FlagDef {
            name: name.into(),
            short,
            usage: format!("set {name}"),
            kind,
            command: None,
        }
    }

    fn on(mut def: FlagDef, command: &str, persistent: bool) -> FlagDef {
        def.command = Some(CommandRef {
            name: command.into(),
            persistent,
        });
        def
    }

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    fn flat() -> ClapFlagSet {
        let mut set = ClapFlagSet::new("app");
        for d in [
            def("verbose", Some('v'), PrimitiveKind::Bool),
            def("name", None, PrimitiveKind::Str),
            def("offset", None, PrimitiveKind::Int),
            def("port", Some('p'), PrimitiveKind::Uint),
            def("ratio", None, PrimitiveKind::Float),
        ] {
            set.define(&d).unwrap();
        }
        set
    }

    #[rstest]
    #[case("verbose", PrimitiveKind::Bool, &["app", "-v"], Value::Bool(true))]
    #[case("name", PrimitiveKind::Str, &["app", "--name", "api"], Value::Str("api".into()))]
    #[case("offset", PrimitiveKind::Int, &["app", "--offset", "-5"], Value::Int(-5))]
    #[case("port", PrimitiveKind::Uint, &["app", "-p", "8080"], Value::Uint(8080))]
    #[case("ratio", PrimitiveKind::Float, &["app", "--ratio=-0.25"], Value::Float(-0.25))]
    fn supplied_values_by_kind(
        #[case] name: &str,
        #[case] kind: PrimitiveKind,
        #[case] argv: &[&str],
        #[case] expected: Value,
    ) {
        let mut set = flat();
        set.parse(args(argv)).unwrap();
        assert_eq!(set.supplied(&def(name, None, kind)), Some(expected));
    }

    #[test]
    fn omitted_flags_are_not_supplied() {
        let mut set = flat();
        assert!(!set.is_parsed());
        set.parse(args(&["app", "--name", "x"])).unwrap();
        assert!(set.is_parsed());
        assert_eq!(set.supplied(&def("verbose", Some('v'), PrimitiveKind::Bool)), None);
        assert_eq!(set.supplied(&def("port", Some('p'), PrimitiveKind::Uint)), None);
    }

    #[test]
    fn clap_defaults_are_not_supplied() {
        let command = Command::new("app").arg(
            Arg::new("level")
                .long("level")
                .value_parser(value_parser!(i64))
                .default_value("3"),
        );
        let mut set = ClapFlagSet::from_command(command);
        set.parse(args(&["app"])).unwrap();
        assert_eq!(set.supplied(&def("level", None, PrimitiveKind::Int)), None);
    }

    #[test]
    fn usage_becomes_help() {
        let set = flat();
        let port = set
            .command()
            .get_arguments()
            .find(|a| a.get_id() == "port")
            .unwrap();
        assert_eq!(port.get_help().map(ToString::to_string), Some("set port".into()));
        assert_eq!(port.get_short(), Some('p'));
    }

    #[rstest]
    #[case(def("verbose", None, PrimitiveKind::Bool))]
    #[case(def("other", Some('v'), PrimitiveKind::Bool))]
    #[case(def("help", None, PrimitiveKind::Bool))]
    fn conflicting_definitions(#[case] clash: FlagDef) {
        let mut set = flat();
        let err = set.define(&clash).unwrap_err();
        assert!(matches!(err, TagfigError::FlagConflict { .. }));
    }

    #[test]
    fn bad_value_is_a_parse_error() {
        let mut set = flat();
        let err = set.parse(args(&["app", "--port", "eighty"])).unwrap_err();
        assert!(matches!(err, TagfigError::FlagParse(_)));
    }

    fn tree() -> CommandTree {
        let mut tree = CommandTree::new(Command::new("app"));
        tree.register_subcommand("app", Command::new("serve"))
            .unwrap()
            .register_subcommand("serve", Command::new("worker"))
            .unwrap();
        tree.register_subcommand("app", Command::new("check")).unwrap();
        tree
    }

    #[test]
    fn tree_knows_its_commands() {
        let tree = tree();
        assert!(tree.has_command("worker"));
        assert!(!tree.has_command("deploy"));
        let sub: Vec<_> = tree.command().get_subcommands().map(|c| c.get_name().to_string()).collect();
        assert_eq!(sub, vec!["serve", "check"]);
    }

    #[test]
    fn duplicate_command_is_rejected() {
        let mut tree = tree();
        let err = tree
            .register_subcommand("app", Command::new("serve"))
            .unwrap_err();
        assert!(matches!(err, TagfigError::DuplicateCommand { ref command } if command == "serve"));
        let err = tree
            .register_subcommand("check", Command::new("worker"))
            .unwrap_err();
        assert!(matches!(err, TagfigError::DuplicateCommand { ref command } if command == "worker"));

        tree.parse(args(&["app", "serve"])).unwrap();
        assert_eq!(tree.invoked(), vec!["app", "serve"]);
    }

    #[test]
    fn definitions_are_tracked_per_command() {
        let port = on(def("port", None, PrimitiveKind::Uint), "serve", false);
        let mut tree = tree();
        assert!(!tree.is_defined(&port));
        tree.define(&port).unwrap();
        assert!(tree.is_defined(&port));
        assert!(!tree.is_defined(&on(def("port", None, PrimitiveKind::Uint), "check", false)));

        let set = flat();
        assert!(set.is_defined(&def("ratio", None, PrimitiveKind::Float)));
        assert!(!ClapFlagSet::new("app").is_defined(&def("ratio", None, PrimitiveKind::Float)));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut tree = tree();
        let err = tree
            .register_subcommand("deploy", Command::new("canary"))
            .unwrap_err();
        assert!(matches!(err, TagfigError::CommandNotRegistered { ref command, .. } if command == "deploy"));
    }

    #[test]
    fn local_flag_belongs_to_its_command() {
        let port = on(def("port", None, PrimitiveKind::Uint), "serve", false);
        let mut tree = tree();
        tree.define(&port).unwrap();

        tree.parse(args(&["app", "serve", "--port", "9000"])).unwrap();
        assert_eq!(tree.supplied(&port), Some(Value::Uint(9000)));
        assert_eq!(tree.invoked(), vec!["app", "serve"]);

        let mut tree = self::tree();
        tree.define(&port).unwrap();
        tree.parse(args(&["app", "check"])).unwrap();
        assert_eq!(tree.supplied(&port), None);
    }

    #[test]
    fn local_flag_is_not_inherited() {
        let port = on(def("port", None, PrimitiveKind::Uint), "serve", false);
        let mut tree = tree();
        tree.define(&port).unwrap();
        assert!(tree.parse(args(&["app", "serve", "worker", "--port", "1"])).is_err());
    }

    #[test]
    fn persistent_flag_reaches_subcommands() {
        let debug = on(def("debug", Some('d'), PrimitiveKind::Bool), "app", true);
        let mut tree = tree();
        tree.define(&debug).unwrap();

        tree.parse(args(&["app", "serve", "worker", "-d"])).unwrap();
        assert_eq!(tree.supplied(&debug), Some(Value::Bool(true)));
        assert_eq!(tree.invoked(), vec!["app", "serve", "worker"]);
    }

    #[test]
    fn persistent_flag_omitted() {
        let debug = on(def("debug", Some('d'), PrimitiveKind::Bool), "app", true);
        let mut tree = tree();
        tree.define(&debug).unwrap();
        tree.parse(args(&["app", "serve"])).unwrap();
        assert_eq!(tree.supplied(&debug), None);
    }

    #[test]
    fn define_on_unknown_command() {
        let mut tree = tree();
        let err = tree
            .define(&on(def("x", None, PrimitiveKind::Bool), "deploy", false))
            .unwrap_err();
        assert!(matches!(err, TagfigError::CommandNotRegistered { .. }));
    }
}
