//! CLI invocation assembly.
//!
//! Building an invocation is a pure function of its parameter list: the
//! same parameters always produce the same program and argument order.

use std::fmt;

/// One entry of an invocation's parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param<'a> {
    /// Always appended.
    Always(&'a str),
    /// Appended only when the condition holds.
    When(&'a str, bool),
}

/// A program and its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    /// Start building an invocation of `program`.
    pub fn builder(program: impl Into<String>) -> InvocationBuilder {
        let program = program.into();
        debug_assert!(!program.is_empty(), "invocation needs a program");
        InvocationBuilder {
            program,
            args: Vec::new(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Accumulates parameters for an [`Invocation`].
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    program: String,
    args: Vec<String>,
}

impl InvocationBuilder {
    /// Append a bare parameter.
    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.args.push(param.into());
        self
    }

    /// Append `flag` only when `enabled` is true.
    pub fn flag(self, flag: &str, enabled: bool) -> Self {
        if enabled {
            self.param(flag)
        } else {
            self
        }
    }

    /// Append every element of `params` in order.
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Invocation {
        Invocation {
            program: self.program,
            args: self.args,
        }
    }
}

/// Assemble an invocation of `base` from an ordered parameter list.
pub fn assemble(base: &str, params: &[Param<'_>]) -> Invocation {
    params
        .iter()
        .fold(Invocation::builder(base), |builder, param| match *param {
            Param::Always(p) => builder.param(p),
            Param::When(flag, enabled) => builder.flag(flag, enabled),
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn android_launch_command_line() {
        let inv = assemble(
            "tns",
            &[
                Param::Always("debug"),
                Param::Always("android"),
                Param::When("--emulator", false),
                Param::When("--debug-brk", true),
                Param::Always("--no-client"),
            ],
        );
        assert_eq!(inv.to_string(), "tns debug android --debug-brk --no-client");
        assert_eq!(inv.program(), "tns");
        assert_eq!(inv.args(), ["debug", "android", "--debug-brk", "--no-client"]);
    }

    #[test]
    fn ios_attach_on_emulator() {
        let inv = Invocation::builder("tns")
            .param("debug")
            .param("ios")
            .flag("--emulator", true)
            .flag("--start", true)
            .flag("--debug-brk", false)
            .param("--no-client")
            .build();
        assert_eq!(inv.to_string(), "tns debug ios --emulator --start --no-client");
    }

    #[test]
    fn assembly_is_deterministic() {
        let params = [Param::Always("debug"), Param::When("--get-port", true)];
        assert_eq!(assemble("tns", &params), assemble("tns", &params));
    }

    #[test]
    fn no_params_is_just_the_program() {
        assert_eq!(assemble("tns", &[]).to_string(), "tns");
    }

    #[test]
    fn extra_params_keep_their_order() {
        let inv = Invocation::builder("tns")
            .param("debug")
            .params(["--log", "trace"])
            .build();
        assert_eq!(inv.args(), ["debug", "--log", "trace"]);
    }
}
