//! Two-phase flag binding.
//!
//! Flags have to be defined on the parsing surface before the command line
//! is parsed, but their values only exist afterwards. [`FlagBinding`] walks
//! an instance once to define one flag per name (a [`Retriever`]), then,
//! after parsing, walks it again and copies each supplied value into every
//! field that declared that flag. A flag that was not given on the command
//! line never touches its fields.
//!
//! The surface itself is abstract ([`FlagSurface`]); the clap back-ends live
//! in [`crate::cli`].

use std::collections::BTreeMap;
use std::ffi::OsString;

use crate::annotation::{CommandRef, FieldDescriptor, FlagName};
use crate::error::TagfigError;
use crate::path::FieldPath;
use crate::slot::{
    OptionalPrimitiveSlot, OptionalStructSlot, PrimitiveListSlot, PrimitiveSlot, StructListSlot,
    Tagged,
};
use crate::types::{FlagStrategy, Stage};
use crate::value::{PrimitiveKind, Value};
use crate::walk::{self, FieldCx, Visitor};

/// One flag as handed to a [`FlagSurface`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlagDef {
    pub name: String,
    pub short: Option<char>,
    pub usage: String,
    pub kind: PrimitiveKind,
    /// Owning command, for command-tree surfaces.
    pub command: Option<CommandRef>,
}

/// A command-line parser the engine can define flags on and read them back
/// from.
pub trait FlagSurface {
    /// Define a flag. Defining a name the surface already knows is a
    /// [`TagfigError::FlagConflict`].
    fn define(&mut self, def: &FlagDef) -> Result<(), TagfigError>;

    /// Whether `def` was already defined here, on its own command.
    fn is_defined(&self, def: &FlagDef) -> bool;

    /// Whether `command` is known. Flat surfaces have no commands.
    fn has_command(&self, _command: &str) -> bool {
        false
    }

    fn is_parsed(&self) -> bool;

    /// Parse a full argument vector, program name first.
    fn parse(&mut self, args: Vec<OsString>) -> Result<(), TagfigError>;

    /// The value given on the command line, or `None` when the flag was
    /// omitted (defaults do not count).
    fn supplied(&self, def: &FlagDef) -> Option<Value>;
}

/// Lifecycle of a [`FlagBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unregistered,
    Registered,
    Finalized,
}

/// `(command, flag name)`.
type RetrieverKey = (Option<String>, String);

/// One defined flag and the fields that share it.
#[derive(Debug, Clone)]
pub struct Retriever {
    def: FlagDef,
    staged: Option<Value>,
    setters: Vec<String>,
}

impl Retriever {
    pub fn def(&self) -> &FlagDef {
        &self.def
    }

    /// True once the last capture found the flag on the command line.
    pub fn is_touched(&self) -> bool {
        self.staged.is_some()
    }

    pub fn staged(&self) -> Option<&Value> {
        self.staged.as_ref()
    }

    /// Paths of every field bound to this flag.
    pub fn setters(&self) -> &[String] {
        &self.setters
    }
}

/// Flag state for one struct instance.
#[derive(Debug, Clone)]
pub struct FlagBinding {
    state: BindingState,
    strategy: FlagStrategy,
    retrievers: BTreeMap<RetrieverKey, Retriever>,
    fields_touched: Vec<String>,
}

impl FlagBinding {
    pub fn new(strategy: FlagStrategy) -> Self {
        Self {
            state: BindingState::Unregistered,
            strategy,
            retrievers: BTreeMap::new(),
            fields_touched: Vec::new(),
        }
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn strategy(&self) -> FlagStrategy {
        self.strategy
    }

    /// Names of the flags this instance defined.
    pub fn flags_found(&self) -> Vec<&str> {
        self.retrievers.values().map(|r| r.def.name.as_str()).collect()
    }

    /// Fields written by the last finalize.
    pub fn fields_touched(&self) -> &[String] {
        &self.fields_touched
    }

    pub fn retrievers(&self) -> impl Iterator<Item = &Retriever> {
        self.retrievers.values()
    }

    /// Define a flag on `surface` for every flag-annotated field of
    /// `target`.
    ///
    /// A no-op once registered, as long as `surface` still holds every flag
    /// of the binding. A surface that lacks them (a fresh one, or another
    /// instance that reused this address) gets a full registration. The
    /// whole instance is resolved before anything is defined, so a field
    /// that fails to resolve leaves the surface untouched.
    pub fn register(
        &mut self,
        target: &mut dyn Tagged,
        surface: &mut dyn FlagSurface,
    ) -> Result<(), TagfigError> {
        if self.state != BindingState::Unregistered {
            if self.retrievers.values().all(|r| surface.is_defined(&r.def)) {
                tracing::debug!(target_type = target.type_name(), "flags already registered");
                return Ok(());
            }
            tracing::debug!(target_type = target.type_name(), "surface lacks the flags, registering again");
            self.reset();
        }

        let mut order = Vec::new();
        let mut pass = FlagPass {
            strategy: self.strategy,
            mode: Mode::Register {
                surface: &*surface,
                retrievers: &mut self.retrievers,
                order: &mut order,
            },
            touched: Vec::new(),
        };
        let walked = walk::walk_struct(&mut pass, &FieldPath::root(), target);
        if let Err(err) = walked.and_then(|()| self.define_all(surface, &order)) {
            self.retrievers.clear();
            return Err(err);
        }
        tracing::debug!(
            target_type = target.type_name(),
            flags = self.retrievers.len(),
            "flags registered"
        );
        self.state = BindingState::Registered;
        Ok(())
    }

    fn define_all(&self, surface: &mut dyn FlagSurface, order: &[RetrieverKey]) -> Result<(), TagfigError> {
        for retriever in order.iter().filter_map(|key| self.retrievers.get(key)) {
            surface.define(&retriever.def)?;
            tracing::debug!(flag = %retriever.def.name, "flag defined");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = BindingState::Unregistered;
        self.retrievers.clear();
        self.fields_touched.clear();
    }

    /// Copy every supplied flag into its fields. May run again after a
    /// re-parse.
    pub fn finalize(
        &mut self,
        target: &mut dyn Tagged,
        surface: &dyn FlagSurface,
    ) -> Result<Vec<String>, TagfigError> {
        if self.state == BindingState::Unregistered {
            return Err(TagfigError::FlagsNotRegistered {
                type_name: target.type_name(),
            });
        }
        self.capture(surface);

        let mut pass = FlagPass {
            strategy: self.strategy,
            mode: Mode::Apply {
                retrievers: &self.retrievers,
            },
            touched: Vec::new(),
        };
        walk::walk_struct(&mut pass, &FieldPath::root(), target)?;
        let touched = pass.touched;

        self.fields_touched = touched.clone();
        self.state = BindingState::Finalized;
        Ok(touched)
    }

    fn capture(&mut self, surface: &dyn FlagSurface) {
        for retriever in self.retrievers.values_mut() {
            retriever.staged = surface.supplied(&retriever.def);
            if let Some(value) = &retriever.staged {
                tracing::trace!(flag = %retriever.def.name, %value, "flag supplied");
            }
        }
    }
}

enum Mode<'s> {
    Register {
        surface: &'s dyn FlagSurface,
        retrievers: &'s mut BTreeMap<RetrieverKey, Retriever>,
        order: &'s mut Vec<RetrieverKey>,
    },
    Apply {
        retrievers: &'s BTreeMap<RetrieverKey, Retriever>,
    },
}

struct FlagPass<'s> {
    strategy: FlagStrategy,
    mode: Mode<'s>,
    touched: Vec<String>,
}

impl FlagPass<'_> {
    fn flag_annotation(&self, desc: &'static FieldDescriptor) -> &'static str {
        match self.strategy {
            FlagStrategy::FlagSet => desc.flag,
            FlagStrategy::CommandTree => desc.cflag,
        }
    }

    fn resolve(
        &self,
        cx: &FieldCx,
    ) -> Result<Option<(FlagName<'static>, Option<CommandRef>)>, TagfigError> {
        let Some(flag) = FlagName::parse(self.flag_annotation(cx.desc)) else {
            return Ok(None);
        };
        let command = match self.strategy {
            FlagStrategy::FlagSet => None,
            FlagStrategy::CommandTree => match CommandRef::parse(cx.desc.cmd) {
                Some(Ok(command)) => Some(command),
                Some(Err(modifier)) => {
                    return Err(TagfigError::InvalidCommandModifier {
                        path: cx.path(),
                        modifier,
                    });
                }
                None => return Err(TagfigError::FlagAndCommandTagMismatch { path: cx.path() }),
            },
        };
        Ok(Some((flag, command)))
    }

    fn register(&mut self, cx: &FieldCx, kind: PrimitiveKind) -> Result<(), TagfigError> {
        let Some((flag, command)) = self.resolve(cx)? else {
            return Ok(());
        };
        let Mode::Register {
            surface,
            retrievers,
            order,
        } = &mut self.mode
        else {
            return Ok(());
        };

        let key = (command.as_ref().map(|c| c.name.clone()), flag.name.to_string());
        if let Some(existing) = retrievers.get_mut(&key) {
            if existing.def.kind != kind {
                return Err(TagfigError::FlagConflict {
                    flag: flag.name.to_string(),
                    reason: format!(
                        "field {} is {kind} but the flag is already {}",
                        cx.path, existing.def.kind
                    ),
                });
            }
            tracing::debug!(field = %cx.path, %flag, "flag shared");
            existing.setters.push(cx.path());
            return Ok(());
        }

        if let Some(command) = &command {
            if !surface.has_command(&command.name) {
                return Err(TagfigError::CommandNotRegistered {
                    path: cx.path(),
                    command: command.name.clone(),
                });
            }
        }
        let def = FlagDef {
            name: flag.name.to_string(),
            short: flag.short,
            usage: cx.desc.usage.to_string(),
            kind,
            command,
        };
        tracing::debug!(field = %cx.path, %flag, "flag resolved");
        order.push(key.clone());
        retrievers.insert(
            key,
            Retriever {
                def,
                staged: None,
                setters: vec![cx.path()],
            },
        );
        Ok(())
    }

    fn staged(&self, cx: &FieldCx) -> Result<Option<Value>, TagfigError> {
        let Mode::Apply { retrievers } = &self.mode else {
            return Ok(None);
        };
        let Some((flag, command)) = self.resolve(cx)? else {
            return Ok(None);
        };
        let key = (command.map(|c| c.name), flag.name.to_string());
        Ok(retrievers.get(&key).and_then(|r| r.staged.clone()))
    }

    fn set(&mut self, cx: &FieldCx, slot: &mut dyn PrimitiveSlot, value: &Value) -> Result<(), TagfigError> {
        if !slot.set_value(value) {
            return Err(TagfigError::NotANumber {
                path: cx.path(),
                raw: value.to_string(),
            });
        }
        tracing::debug!(field = %cx.path, %value, "flag applied");
        self.touched.push(cx.path());
        Ok(())
    }

    fn registering(&self) -> bool {
        matches!(self.mode, Mode::Register { .. })
    }
}

impl Visitor for FlagPass<'_> {
    fn stage(&self) -> Stage {
        Stage::Flags
    }

    fn annotated(&self, desc: &FieldDescriptor) -> bool {
        match self.strategy {
            FlagStrategy::FlagSet => !desc.flag.is_empty(),
            FlagStrategy::CommandTree => !desc.cflag.is_empty() || !desc.cmd.is_empty(),
        }
    }

    fn inspect(&mut self, cx: &FieldCx) -> Result<(), TagfigError> {
        if self.strategy == FlagStrategy::CommandTree
            && cx.desc.cflag.is_empty() != cx.desc.cmd.is_empty()
        {
            return Err(TagfigError::FlagAndCommandTagMismatch { path: cx.path() });
        }
        Ok(())
    }

    fn primitive(&mut self, cx: &FieldCx, slot: &mut dyn PrimitiveSlot) -> Result<(), TagfigError> {
        if !self.annotated(cx.desc) {
            return Ok(());
        }
        if self.registering() {
            return self.register(cx, slot.kind());
        }
        match self.staged(cx)? {
            Some(value) => self.set(cx, slot, &value),
            None => Ok(()),
        }
    }

    fn optional_primitive(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalPrimitiveSlot,
    ) -> Result<(), TagfigError> {
        if !self.annotated(cx.desc) {
            return Ok(());
        }
        if slot.get().is_none() && cx.opts.skip_nil() {
            return Ok(());
        }
        if self.registering() {
            return self.register(cx, slot.kind());
        }
        match self.staged(cx)? {
            Some(value) => self.set(cx, slot.allocate(), &value),
            None => Ok(()),
        }
    }

    fn nested(&mut self, cx: &FieldCx, value: &mut dyn Tagged) -> Result<(), TagfigError> {
        if self.annotated(cx.desc) {
            return Err(cx.unsupported(Stage::Flags, value.type_name()));
        }
        walk::walk_struct(self, &cx.path, value)
    }

    fn optional_nested(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalStructSlot,
    ) -> Result<(), TagfigError> {
        if self.annotated(cx.desc) {
            return Err(cx.unsupported(Stage::Flags, slot.type_name()));
        }
        if slot.get().is_none() {
            if cx.opts.skip_nil() {
                return Ok(());
            }
            slot.allocate();
        }
        match slot.get_mut() {
            Some(inner) => walk::walk_struct(self, &cx.path, inner),
            None => Ok(()),
        }
    }

    fn primitive_list(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn PrimitiveListSlot,
    ) -> Result<(), TagfigError> {
        if self.annotated(cx.desc) {
            return Err(cx.unsupported(Stage::Flags, slot.type_name()));
        }
        Ok(())
    }

    fn nested_list(&mut self, cx: &FieldCx, slot: &mut dyn StructListSlot) -> Result<(), TagfigError> {
        if self.annotated(cx.desc) {
            return Err(cx.unsupported(Stage::Flags, slot.type_name()));
        }
        walk::walk_list(self, &cx.path, slot)
    }
}
