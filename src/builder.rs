use std::any::TypeId;
use std::collections::HashMap;
use std::ffi::OsString;

use crate::defaults::DefaultPass;
use crate::env::{self, EnvPass};
use crate::error::TagfigError;
use crate::flags::{BindingState, FlagBinding, FlagSurface};
use crate::path::FieldPath;
use crate::registry::FunctionRegistry;
use crate::slot::Tagged;
use crate::types::{FlagStrategy, Stage};
use crate::validate::{self, TestPass, WarnFn};
use crate::value::{DefaultValue, FieldValue};
use crate::walk;

/// Identity of one struct instance: its address and its type.
type InstanceKey = (usize, TypeId);

fn instance_key<T: Tagged>(target: &T) -> InstanceKey {
    (target as *const T as usize, TypeId::of::<T>())
}

/// The engine context.
///
/// Owns the function registry and the flag bindings of every instance
/// registered through it. Separate contexts share nothing.
#[derive(Debug, Default)]
pub struct Tagfig {
    registry: FunctionRegistry,
    bindings: HashMap<InstanceKey, FlagBinding>,
    command_tree_used: bool,
}

impl Tagfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Register a `$(name)` default provider. It receives the field name.
    pub fn register_default_func<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&str) -> DefaultValue + Send + Sync + 'static,
    {
        self.registry.register_default_func(name, f);
        self
    }

    /// Register a `$(name)` test predicate. It receives the field value and
    /// the field name.
    pub fn register_test_func<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: for<'a> Fn(&FieldValue<'a>, &str) -> bool + Send + Sync + 'static,
    {
        self.registry.register_test_func(name, f);
        self
    }

    /// Forget every registered function and flag binding.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.bindings.clear();
        self.command_tree_used = false;
    }

    /// Fill zero-valued fields from `default` annotations.
    pub fn apply_defaults<T: Tagged>(&self, target: &mut T) -> Result<Vec<String>, TagfigError> {
        let mut pass = DefaultPass::new(&self.registry);
        walk::walk_struct(&mut pass, &FieldPath::root(), target)?;
        Ok(pass.touched)
    }

    /// Override fields from `env` annotations found in `vars`. With `strict`
    /// every annotated variable must be present.
    pub fn apply_env<T: Tagged>(
        &self,
        target: &mut T,
        vars: &HashMap<String, String>,
        strict: bool,
    ) -> Result<Vec<String>, TagfigError> {
        let mut pass = EnvPass::new(vars, strict);
        walk::walk_struct(&mut pass, &FieldPath::root(), target)?;
        Ok(pass.touched)
    }

    /// Define the flags of `target` on `surface`. Registering the same
    /// instance on the same surface twice is a no-op; a surface that does
    /// not hold the instance's flags yet gets them defined again.
    pub fn register_flags<T: Tagged>(
        &mut self,
        target: &mut T,
        surface: &mut dyn FlagSurface,
        strategy: FlagStrategy,
    ) -> Result<(), TagfigError> {
        let key = instance_key(target);
        let binding = self
            .bindings
            .entry(key)
            .or_insert_with(|| FlagBinding::new(strategy));
        if binding.strategy() != strategy {
            *binding = FlagBinding::new(strategy);
        }
        let result = binding.register(target, surface);
        if result.is_err() && binding.state() == BindingState::Unregistered {
            self.bindings.remove(&key);
            return result;
        }
        if strategy == FlagStrategy::CommandTree {
            self.command_tree_used = true;
        }
        result
    }

    /// Copy the flags `surface` parsed into `target`.
    pub fn finalize_flags<T: Tagged>(
        &mut self,
        target: &mut T,
        surface: &dyn FlagSurface,
    ) -> Result<Vec<String>, TagfigError> {
        let Some(binding) = self.bindings.get_mut(&instance_key(target)) else {
            return Err(TagfigError::FlagsNotRegistered {
                type_name: target.type_name(),
            });
        };
        binding.finalize(target, surface)
    }

    /// Evaluate every `test` annotation.
    pub fn run_tests<T: Tagged>(
        &self,
        target: &mut T,
        options: &TestOptions<'_>,
    ) -> Result<Vec<String>, TagfigError> {
        let warn = options.on_warning.unwrap_or(&validate::log_warning);
        let mut pass = TestPass::new(&self.registry, options.warn_only, warn);
        walk::walk_struct(&mut pass, &FieldPath::root(), target)?;
        Ok(pass.touched)
    }

    /// Flag state of `target`, if it was ever registered.
    pub fn flag_binding<T: Tagged>(&self, target: &T) -> Option<&FlagBinding> {
        self.bindings.get(&instance_key(target))
    }

    /// Run the enabled stages over `target` in order, stopping at the first
    /// error. Earlier stages are not rolled back.
    pub fn process<T: Tagged>(
        &mut self,
        target: &mut T,
        mut options: ProcessOptions<'_>,
    ) -> Result<Report, TagfigError> {
        let mut report = Report::default();
        let order = std::mem::take(&mut options.order);
        for stage in order {
            if options.skipped.contains(&stage) {
                tracing::debug!(%stage, "stage skipped");
                continue;
            }
            let touched = match stage {
                Stage::Defaults => self.apply_defaults(target)?,
                Stage::Env => match &options.env_vars {
                    Some(vars) => self.apply_env(target, vars, options.strict_env)?,
                    None => self.apply_env(target, &env::snapshot(), options.strict_env)?,
                },
                Stage::Flags => match self.flag_stage(target, &mut options)? {
                    Some(touched) => touched,
                    None => continue,
                },
                Stage::Test => self.run_tests(target, &options.tests)?,
            };
            tracing::debug!(%stage, touched = touched.len(), "stage complete");
            report.stages.push((stage, touched));
        }
        Ok(report)
    }

    fn flag_stage<T: Tagged>(
        &mut self,
        target: &mut T,
        options: &mut ProcessOptions<'_>,
    ) -> Result<Option<Vec<String>>, TagfigError> {
        let strategy = options.strategy.unwrap_or(if self.command_tree_used {
            FlagStrategy::CommandTree
        } else {
            FlagStrategy::FlagSet
        });
        let Some(surface) = options.flags.as_deref_mut() else {
            tracing::debug!("no flag surface, stage skipped");
            return Ok(None);
        };
        let args = options.args.take();

        match strategy {
            FlagStrategy::FlagSet => {
                self.register_flags(target, surface, FlagStrategy::FlagSet)?;
                parse_once(surface, args)?;
            }
            FlagStrategy::CommandTree => {
                parse_once(surface, args)?;
                if self.flag_binding(target).is_none() {
                    tracing::debug!(
                        target_type = target.type_name(),
                        "instance has no command flags"
                    );
                    return Ok(Some(Vec::new()));
                }
            }
        }
        self.finalize_flags(target, surface).map(Some)
    }
}

fn parse_once(surface: &mut dyn FlagSurface, args: Option<Vec<OsString>>) -> Result<(), TagfigError> {
    if surface.is_parsed() {
        return Ok(());
    }
    let args = args.unwrap_or_else(|| std::env::args_os().collect());
    surface.parse(args)
}

/// Settings for the test stage.
#[derive(Clone, Copy, Default)]
pub struct TestOptions<'w> {
    /// Report every failing test instead of stopping, as if each field
    /// carried `testwarn`.
    pub warn_only: bool,
    /// Receives downgraded failures. Defaults to a `tracing` warning.
    pub on_warning: Option<WarnFn<'w>>,
}

impl std::fmt::Debug for TestOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestOptions")
            .field("warn_only", &self.warn_only)
            .field("on_warning", &self.on_warning.is_some())
            .finish()
    }
}

/// Options for [`Tagfig::process`].
///
/// ```ignore
/// let report = tagfig.process(
///     &mut config,
///     ProcessOptions::new()
///         .skip(Stage::Env)
///         .flags(&mut flag_set)
///         .args(["myapp", "--port", "8080"]),
/// )?;
/// ```
pub struct ProcessOptions<'a> {
    order: Vec<Stage>,
    skipped: Vec<Stage>,
    strict_env: bool,
    env_vars: Option<HashMap<String, String>>,
    tests: TestOptions<'a>,
    flags: Option<&'a mut dyn FlagSurface>,
    strategy: Option<FlagStrategy>,
    args: Option<Vec<OsString>>,
}

impl Default for ProcessOptions<'_> {
    fn default() -> Self {
        Self {
            order: Stage::DEFAULT_ORDER.to_vec(),
            skipped: Vec::new(),
            strict_env: false,
            env_vars: None,
            tests: TestOptions::default(),
            flags: None,
            strategy: None,
            args: None,
        }
    }
}

impl<'a> ProcessOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stage order. A stage left out does not run.
    pub fn order(mut self, order: Vec<Stage>) -> Self {
        self.order = order;
        self
    }

    pub fn skip(mut self, stage: Stage) -> Self {
        self.skipped.push(stage);
        self
    }

    /// Treat every missing `env` variable as an error.
    pub fn strict_env(mut self, strict: bool) -> Self {
        self.strict_env = strict;
        self
    }

    /// Use these variables instead of the process environment.
    pub fn env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn warn_only(mut self, warn_only: bool) -> Self {
        self.tests.warn_only = warn_only;
        self
    }

    pub fn on_warning(mut self, callback: WarnFn<'a>) -> Self {
        self.tests.on_warning = Some(callback);
        self
    }

    /// Bind `flag` annotations to a flat flag set.
    pub fn flags(mut self, surface: &'a mut dyn FlagSurface) -> Self {
        self.flags = Some(surface);
        self
    }

    /// Finalize `cflag` annotations registered ahead of time against a
    /// command tree.
    pub fn command_tree(mut self, surface: &'a mut dyn FlagSurface) -> Self {
        self.flags = Some(surface);
        self.strategy = Some(FlagStrategy::CommandTree);
        self
    }

    pub fn strategy(mut self, strategy: FlagStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Arguments to parse, program name first. Defaults to the process
    /// arguments. Ignored when the surface was already parsed.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }
}

/// Paths touched by each stage, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    stages: Vec<(Stage, Vec<String>)>,
}

impl Report {
    /// Stages that ran, in order.
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.stages.iter().map(|(stage, _)| *stage)
    }

    pub fn ran(&self, stage: Stage) -> bool {
        self.stages.iter().any(|(s, _)| *s == stage)
    }

    /// Paths the stage touched; empty when it did not run.
    pub fn touched(&self, stage: Stage) -> &[String] {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map_or(&[], |(_, touched)| touched.as_slice())
    }
}
