use std::fmt;

/// One pass of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Fill zero-valued fields from `default` annotations.
    Defaults,
    /// Override fields from `env` annotations.
    Env,
    /// Bind `flag` / `cflag` annotations to a flag surface.
    Flags,
    /// Evaluate `test` annotations.
    Test,
}

impl Stage {
    /// The order used when none is given.
    pub const DEFAULT_ORDER: [Stage; 4] = [Stage::Defaults, Stage::Env, Stage::Flags, Stage::Test];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Defaults => "default",
            Stage::Env => "env",
            Stage::Flags => "flag",
            Stage::Test => "test",
        })
    }
}

/// How the flag stage finds its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagStrategy {
    /// Register against a flat flag set, parse, finalize.
    #[default]
    FlagSet,
    /// Flags were registered per command ahead of time; parse the command
    /// tree and finalize.
    CommandTree,
}
