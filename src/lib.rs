//! Annotation-driven defaults, environment overrides, command-line flags and
//! validation for plain Rust config structs.
//!
//! Annotate the fields once, derive [`Tagged`], and run the pipeline:
//!
//! ```ignore
//! use tagfig::{ProcessOptions, Tagfig, Tagged};
//!
//! #[derive(Tagged, Default)]
//! struct Server {
//!     #[tagfig(default = "8080", env = "SERVER_PORT", flag = "port,p", test = ">=1024")]
//!     pub port: u16,
//!     #[tagfig(default = "localhost", env = "SERVER_HOST", flag = "host")]
//!     pub host: String,
//! }
//!
//! let mut server = Server::default();
//! let mut flags = tagfig::ClapFlagSet::new("server");
//! Tagfig::new().process(&mut server, ProcessOptions::new().flags(&mut flags))?;
//! ```
//!
//! That call fills zero fields from `default`, overrides them from the
//! environment, registers `--port`/`-p` and `--host` on a clap command,
//! parses `std::env::args_os()`, copies every flag that was actually given
//! into its field, and finally checks `port >= 1024`.
//!
//! # Stages
//!
//! | stage | annotation | effect |
//! |---|---|---|
//! | [`Stage::Defaults`] | `default` | fills zero values, never overwrites |
//! | [`Stage::Env`] | `env` | overrides from the environment snapshot |
//! | [`Stage::Flags`] | `flag`, `cflag` + `cmd` | overrides from flags given on the command line |
//! | [`Stage::Test`] | `test` | validates, first failure wins |
//!
//! The order is configurable ([`ProcessOptions::order`]), any stage can be
//! skipped, and every stage is also available on its own
//! ([`Tagfig::apply_defaults`], [`Tagfig::apply_env`],
//! [`Tagfig::register_flags`] / [`Tagfig::finalize_flags`],
//! [`Tagfig::run_tests`]). The [`Report`] lists the dotted paths each stage
//! actually touched.
//!
//! # Field shapes
//!
//! The engine walks fields through [`Slot`]s, never through concrete types.
//! Supported shapes are primitives ([`Primitive`]: strings, integers, floats
//! and `bool`), `Option<P>`, `Vec<P>`, and nested structs marked `nested`:
//! `S`, `Box<S>`, `Option<S>`, `Option<Box<S>>` and `Vec<S>`. Any other type
//! is carried along untouched unless it is annotated, in which case the
//! stage reports [`TagfigError::UnsupportedFieldKind`]. The one exception is
//! a `test = "$(name)"` predicate, which can check a field of any type.
//!
//! A field without `pub` may not carry annotations; doing so is
//! [`TagfigError::UnexportedFieldTagged`].
//!
//! # Annotations
//!
//! ```text
//! #[tagfig(
//!     default = "8080",           // literal, CSV for Vec<P>, or $(func)
//!     env = "PORT",               // CSV for Vec<P>
//!     flag = "port,p",            // flat flag set, optional short alias
//!     cflag = "port,p",           // command-tree flag ...
//!     cmd = "serve,persistent",   // ... owned by this command
//!     usage = "port to listen on",
//!     test = ">=1024,<65536",     // or "~regex", or "$(predicate)"
//!     conf = "skipnil,testwarn",  // per-field options
//!     nested,                     // the field is itself a Tagged struct
//! )]
//! ```
//!
//! `conf` options: `skip`, `skipnil`, `nildefault`, `skipzero`, `mustenv`,
//! `envskip`, `backupenv`, `preferenv`, `defaultskip`, `testskip`,
//! `testwarn`.
//!
//! # Functions
//!
//! `$(name)` in a `default` or `test` refers to a function registered on the
//! [`Tagfig`] context ([`Tagfig::register_default_func`],
//! [`Tagfig::register_test_func`]). Contexts share nothing: each owns its
//! registry and its flag bindings.
//!
//! # Flags
//!
//! The flag stage is two-phase: flags are defined on a [`FlagSurface`]
//! before parsing and copied into fields afterwards. Only flags that were
//! given on the command line touch their fields, so a flag never clobbers a
//! value that came from a file or the environment with its own default.
//! Several fields may share one flag name. The `clap` feature (on by
//! default) provides two surfaces: [`ClapFlagSet`], a single command, and
//! [`CommandTree`], a tree of subcommands where `cmd = "name,persistent"`
//! flags are inherited by every descendant.
//!
//! # Files
//!
//! The [`file`] module deserializes the starting instance from TOML with
//! serde; the pipeline then layers defaults, environment and flags on top.
//!
//! # Logging
//!
//! Every stage logs through `tracing` (`debug` per touched field, `warn` for
//! downgraded test failures). The library never installs a subscriber.

extern crate self as tagfig;

pub mod error;
pub mod env;
pub mod file;
pub mod types;

mod annotation;
mod binder;
mod builder;
#[cfg(feature = "clap")]
mod cli;
mod defaults;
mod expr;
mod flags;
mod path;
mod registry;
mod slot;
mod validate;
mod value;
mod walk;

#[cfg(test)]
mod fixtures;

pub use annotation::{CommandRef, ConfOptions, FieldDescriptor, FlagName, Source};
pub use builder::{ProcessOptions, Report, Tagfig, TestOptions};
#[cfg(feature = "clap")]
pub use cli::{ClapFlagSet, CommandTree};
pub use error::{CoerceError, TagfigError};
pub use flags::{BindingState, FlagBinding, FlagDef, FlagSurface, Retriever};
pub use registry::{DefaultFunc, FunctionRegistry, TestFunc};
pub use slot::{
    Field, OptionalPrimitiveSlot, OptionalStructSlot, Primitive, PrimitiveListSlot, PrimitiveSlot,
    Slot, StructListSlot, Tagged,
};
pub use tagfig_derive::Tagged;
pub use types::{FlagStrategy, Stage};
pub use validate::{WarnFn, log_warning};
pub use value::{DefaultValue, FieldValue, PrimitiveKind, Value};
