//! The pass command surface: named passes with positional and
//! `-key value` parameters, registered once and dispatched by name.

use anyhow::{anyhow, bail, Result};
use ashlar_common::database::Design;
use std::collections::HashMap;

/// Parsed pass arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassParams {
    positional: Vec<String>,
    named: HashMap<String, String>,
}

impl PassParams {
    /// Parse a raw argument list: `-key value` pairs plus free-standing
    /// positionals, in any order.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut params = PassParams::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let arg = arg.as_ref();
            if let Some(key) = arg.strip_prefix('-') {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("named parameter -{} is missing its value", key))?;
                params
                    .named
                    .insert(key.to_owned(), value.as_ref().to_owned());
            } else {
                params.positional.push(arg.to_owned());
            }
        }
        Ok(params)
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn named(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    /// Named parameter that the pass cannot run without.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.named(key)
            .ok_or_else(|| anyhow!("required named parameter -{} is missing", key))
    }
}

/// A registered command. `init` runs exactly once, at registration.
pub trait Pass: Send {
    fn name(&self) -> &'static str;

    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, design: &mut Design, params: &PassParams) -> Result<()>;

    fn help(&self) -> String;

    fn short_help(&self) -> String;
}

#[derive(Default)]
pub struct PassManager {
    passes: HashMap<&'static str, Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mut pass: Box<dyn Pass>) -> Result<()> {
        let name = pass.name();
        if self.passes.contains_key(name) {
            bail!("pass {:?} is already registered", name);
        }
        pass.init()?;
        self.passes.insert(name, pass);
        Ok(())
    }

    /// Dispatch by name. Unknown passes are an error, as are parameter
    /// errors raised by the pass itself.
    pub fn run<S: AsRef<str>>(
        &mut self,
        design: &mut Design,
        name: &str,
        args: &[S],
    ) -> Result<()> {
        let pass = self
            .passes
            .get_mut(name)
            .ok_or_else(|| anyhow!("unknown pass {:?}", name))?;
        let params = PassParams::parse(args)?;
        pass.execute(design, &params)
    }

    /// One `name - short help` line per pass, sorted by name.
    pub fn short_help(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .passes
            .values()
            .map(|p| format!("{} - {}", p.name(), p.short_help()))
            .collect();
        lines.sort();
        lines
    }

    pub fn help(&self, name: &str) -> Option<String> {
        self.passes.get(name).map(|p| p.help())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingPass {
        runs: usize,
        inits: usize,
        last_target: Option<String>,
    }

    impl Pass for RecordingPass {
        fn name(&self) -> &'static str {
            "record"
        }

        fn init(&mut self) -> Result<()> {
            self.inits += 1;
            Ok(())
        }

        fn execute(&mut self, _design: &mut Design, params: &PassParams) -> Result<()> {
            self.runs += 1;
            self.last_target = Some(params.require("target")?.to_owned());
            Ok(())
        }

        fn help(&self) -> String {
            "record -target <name> [extras...]".into()
        }

        fn short_help(&self) -> String {
            "records its parameters".into()
        }
    }

    #[test]
    fn parse_mixes_named_and_positional() {
        let params = PassParams::parse(&["a.v", "-top", "chip", "b.v"]).unwrap();
        assert_eq!(params.positional(), &["a.v", "b.v"]);
        assert_eq!(params.named("top"), Some("chip"));
        assert_eq!(params.named("missing"), None);
    }

    #[test]
    fn named_parameter_requires_a_value() {
        assert!(PassParams::parse(&["-top"]).is_err());
    }

    #[test]
    fn unknown_pass_is_an_error() {
        let mut manager = PassManager::new();
        let mut design = Design::new();
        let err = manager
            .run::<&str>(&mut design, "nope", &[])
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn missing_required_parameter_fails_the_pass() {
        let mut manager = PassManager::new();
        manager.register(Box::new(RecordingPass::default())).unwrap();
        let mut design = Design::new();

        assert!(manager.run::<&str>(&mut design, "record", &[]).is_err());
        assert!(manager
            .run(&mut design, "record", &["-target", "x"])
            .is_ok());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut manager = PassManager::new();
        manager.register(Box::new(RecordingPass::default())).unwrap();
        assert!(manager
            .register(Box::new(RecordingPass::default()))
            .is_err());
    }
}
