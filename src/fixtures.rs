#[cfg(test)]
pub mod test {
    use std::collections::HashMap;
    use std::ffi::OsString;
    use std::time::Duration;

    use serde::Deserialize;
    use tagfig_derive::Tagged;

    use crate::error::TagfigError;
    use crate::flags::{FlagDef, FlagSurface};
    use crate::value::{PrimitiveKind, Value};

    // -- Substitution fixtures ----------------------------------------------------

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct Outer {
        #[tagfig(default = "app", env = "APP_NAME")]
        pub name: String,

        #[tagfig(default = "8888", env = "APP_PORT", test = ">=1024,<65537")]
        pub port: u16,

        #[tagfig(default = "0.5")]
        pub ratio: f64,

        #[tagfig(default = "x", conf = "skip")]
        pub ignored: String,

        #[tagfig(default = "7", conf = "defaultskip")]
        pub not_defaulted: i32,

        #[tagfig(nested)]
        pub inner: Inner,

        #[tagfig(nested)]
        pub inner_ptr: Option<Inner>,

        #[tagfig(nested, conf = "skipnil")]
        pub maybe: Option<Inner>,

        #[tagfig(nested)]
        pub list: Vec<Inner>,
    }

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct Inner {
        #[tagfig(default = "inner", env = "INNER_LABEL")]
        pub label: String,

        #[tagfig(default = "3", test = "<100")]
        pub count: i64,
    }

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct Pointers {
        #[tagfig(default = "42")]
        pub with_default: Option<i32>,

        pub without_default: Option<i32>,

        #[tagfig(default = "7", conf = "skipnil")]
        pub nil_skipped: Option<u8>,

        #[tagfig(default = "forced", conf = "skipnil,nildefault")]
        pub nil_defaulted: Option<String>,
    }

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct NilStructs {
        #[tagfig(nested, conf = "skipnil,nildefault")]
        pub forced: Option<Inner>,

        #[tagfig(nested, conf = "skipnil")]
        pub left: Option<Inner>,
    }

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct Lists {
        #[tagfig(default = "a,b,c", env = "HOSTS")]
        pub hosts: Vec<String>,

        #[tagfig(default = "80,443")]
        pub ports: Vec<u16>,

        pub empty: Vec<i32>,
    }

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct Funcs {
        #[tagfig(default = "$(hostname)")]
        pub host: String,

        #[tagfig(nested, default = "$(servers)")]
        pub servers: Vec<Inner>,

        #[tagfig(nested, default = "$(extra)")]
        pub extra: Option<Inner>,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct SkipZeroDefault {
        #[tagfig(default = "1", conf = "skipzero")]
        pub level: i32,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct BadDefault {
        #[tagfig(default = "eighty")]
        pub port: u16,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct WithDuration {
        #[tagfig(default = "5s")]
        pub timeout: Duration,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct Private {
        #[tagfig(default = "x", env = "SECRET")]
        secret: String,

        pub visible: String,
    }

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct EnvFlavours {
        #[tagfig(env = "REQUIRED", conf = "mustenv")]
        pub required: String,

        #[tagfig(env = "VERBOSE")]
        pub verbose: bool,

        #[tagfig(env = "RETRIES")]
        pub retries: u32,

        #[tagfig(env = "TIMEOUT_MS")]
        pub timeout_ms: Option<u64>,

        #[tagfig(env = "REGION", conf = "backupenv")]
        pub region: String,

        #[tagfig(env = "SKIPPED", conf = "envskip")]
        pub skipped: String,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct EnvOnStruct {
        #[tagfig(nested, env = "NESTED")]
        pub nested: Inner,
    }

    // -- Test-pass fixtures -------------------------------------------------------

    #[derive(Tagged, Debug, Default)]
    pub struct Checks {
        #[tagfig(test = "~^https://", conf = "skipzero")]
        pub webhook: String,

        #[tagfig(test = "<10", conf = "skipzero")]
        pub retries: u32,

        #[tagfig(nested, test = "$(sane_limits)")]
        pub limits: Limits,

        #[tagfig(test = "$(short)")]
        pub timeout: Duration,
    }

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct Limits {
        #[tagfig(test = "<3")]
        pub low: i32,

        pub high: i32,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct ListCompare {
        #[tagfig(test = "=a")]
        pub tags: Vec<String>,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct Warned {
        #[tagfig(test = "<5", conf = "testwarn")]
        pub level: i32,

        #[tagfig(test = "<5")]
        pub strict: i32,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct Skipped {
        #[tagfig(test = ">1000", conf = "testskip")]
        pub port: u16,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct BadTest {
        #[tagfig(test = "!1")]
        pub x: i32,
    }

    // -- Pipeline fixture ---------------------------------------------------------

    #[derive(Tagged, Deserialize, Debug, Default, Clone, PartialEq)]
    #[serde(default)]
    pub struct Server {
        #[tagfig(
            default = "8888",
            env = "APP_PORT",
            test = ">=1024,<65537",
            flag = "port,p",
            usage = "port to listen on"
        )]
        pub port: u16,

        #[tagfig(default = "localhost", flag = "host")]
        pub host: String,

        #[tagfig(flag = "verbose,v")]
        pub verbose: bool,
    }

    // -- Flag fixtures ------------------------------------------------------------

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct FlagFields {
        #[tagfig(flag = "verbose,v")]
        pub verbose: bool,

        #[tagfig(flag = "port,p", usage = "listen port")]
        pub port: u16,

        #[tagfig(flag = "name")]
        pub name: String,

        #[tagfig(flag = "port")]
        pub backup_port: u16,

        #[tagfig(flag = "timeout")]
        pub timeout: Option<u64>,

        #[tagfig(flag = "limit", conf = "skipnil")]
        pub limit: Option<i32>,

        #[tagfig(nested)]
        pub sub: Option<FlagInner>,
    }

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct FlagInner {
        #[tagfig(flag = "level")]
        pub level: i32,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct FlagConflicting {
        #[tagfig(flag = "x")]
        pub a: u16,

        #[tagfig(flag = "x")]
        pub b: String,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct FlagOnStruct {
        #[tagfig(nested, flag = "inner")]
        pub inner: FlagInner,
    }

    #[derive(Tagged, Debug, Default, Clone, PartialEq)]
    pub struct TreeFields {
        #[tagfig(cflag = "debug,d", cmd = "root,persistent")]
        pub debug: bool,

        #[tagfig(cflag = "count", cmd = "run")]
        pub count: u32,

        #[tagfig(flag = "flat")]
        pub flat: String,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct TreeMismatch {
        #[tagfig(cflag = "orphan")]
        pub orphan: bool,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct CmdWithoutFlag {
        #[tagfig(cmd = "root")]
        pub stray: bool,
    }

    #[derive(Tagged, Debug, Default)]
    pub struct PrivateFlag {
        #[tagfig(flag = "hidden")]
        hidden: bool,

        pub shown: bool,
    }

    /// A [`FlagSurface`] that records definitions and serves values from a
    /// map instead of parsing.
    #[derive(Debug, Default)]
    pub struct FakeSurface {
        pub defined: Vec<FlagDef>,
        pub commands: Vec<String>,
        pub given: HashMap<String, Value>,
        pub parsed: bool,
    }

    impl FakeSurface {
        pub fn with_commands(commands: &[&str]) -> Self {
            Self {
                commands: commands.iter().map(|c| c.to_string()).collect(),
                ..Self::default()
            }
        }

        /// Pretend `--name value` was on the command line.
        pub fn give(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
            self.given.insert(name.to_string(), value.into());
            self.parsed = true;
            self
        }
    }

    impl FlagSurface for FakeSurface {
        fn define(&mut self, def: &FlagDef) -> Result<(), TagfigError> {
            let command = def.command.as_ref().map(|c| &c.name);
            if self
                .defined
                .iter()
                .any(|d| d.name == def.name && d.command.as_ref().map(|c| &c.name) == command)
            {
                return Err(TagfigError::FlagConflict {
                    flag: def.name.clone(),
                    reason: "already defined".into(),
                });
            }
            self.defined.push(def.clone());
            Ok(())
        }

        fn is_defined(&self, def: &FlagDef) -> bool {
            self.defined.contains(def)
        }

        fn has_command(&self, command: &str) -> bool {
            self.commands.iter().any(|c| c == command)
        }

        fn is_parsed(&self) -> bool {
            self.parsed
        }

        /// Understands `--name` and `--name=value` only.
        fn parse(&mut self, args: Vec<OsString>) -> Result<(), TagfigError> {
            for arg in args.iter().skip(1) {
                let arg = arg.to_string_lossy();
                let Some(flag) = arg.strip_prefix("--") else {
                    continue;
                };
                let (name, raw) = match flag.split_once('=') {
                    Some((name, raw)) => (name, Some(raw)),
                    None => (flag, None),
                };
                let Some(def) = self.defined.iter().find(|d| d.name == name) else {
                    continue;
                };
                let raw = raw.unwrap_or("true");
                let value = match def.kind {
                    PrimitiveKind::Bool => Some(Value::Bool(raw != "false")),
                    PrimitiveKind::Str => Some(Value::Str(raw.to_string())),
                    PrimitiveKind::Int => raw.parse().ok().map(Value::Int),
                    PrimitiveKind::Uint => raw.parse().ok().map(Value::Uint),
                    PrimitiveKind::Float => raw.parse().ok().map(Value::Float),
                };
                if let Some(value) = value {
                    self.given.insert(name.to_string(), value);
                }
            }
            self.parsed = true;
            Ok(())
        }

        fn supplied(&self, def: &FlagDef) -> Option<Value> {
            self.given.get(&def.name).cloned()
        }
    }

    #[test]
    fn fake_surface_parses_long_flags() {
        use crate::{FlagBinding, FlagStrategy};

        let mut config = FlagFields::default();
        let mut surface = FakeSurface::default();
        let mut binding = FlagBinding::new(FlagStrategy::FlagSet);
        binding.register(&mut config, &mut surface).unwrap();

        surface
            .parse(vec!["app".into(), "--verbose".into(), "--port=81".into(), "stray".into()])
            .unwrap();
        assert!(surface.is_parsed());
        binding.finalize(&mut config, &surface).unwrap();
        assert!(config.verbose);
        assert_eq!(config.port, 81);
        assert_eq!(config.backup_port, 81);
    }

    #[test]
    fn hand_written_and_derived_descriptors_agree() {
        use crate::Tagged;

        let mut server = Server::default();
        let fields = server.fields();
        let port = fields[0].descriptor;
        assert_eq!(port.name, "port");
        assert!(port.exported);
        assert_eq!(port.flag, "port,p");
        assert_eq!(port.test, ">=1024,<65537");

        let mut private = Private::default();
        let fields = private.fields();
        assert!(!fields[0].descriptor.exported);
        assert!(fields[1].descriptor.exported);
        assert!(!fields[1].descriptor.is_annotated());
    }
}
