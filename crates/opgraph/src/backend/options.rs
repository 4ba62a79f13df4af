//! Pass-manager options.
//!
//! Options are given as a command-line style string, for example
//! `--op-fusion=false --verify-each --max-fusion-rounds=2`. A bare boolean flag means `true`.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassManagerOptions {
    /// Run the broadcast fusion pass before lowering.
    pub op_fusion: bool,
    /// Log the textual module after every stage.
    pub print_ir_after_all: bool,
    /// Verify after every pass, not only at the two pipeline checkpoints.
    pub verify_each: bool,
    /// Upper bound on fusion iterations before moving on.
    pub max_fusion_rounds: usize,
}

impl Default for PassManagerOptions {
    fn default() -> Self {
        Self {
            op_fusion: true,
            print_ir_after_all: false,
            verify_each: false,
            max_fusion_rounds: 4,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("unknown pass-manager option '{0}'")]
    UnknownFlag(String),
    #[error("invalid value '{value}' for pass-manager option '{flag}'")]
    InvalidValue { flag: String, value: String },
    #[error("pass-manager option '{0}' requires a value")]
    MissingValue(String),
}

impl PassManagerOptions {
    pub fn parse(src: &str) -> Result<Self, InitError> {
        let mut options = PassManagerOptions::default();
        for token in src.split_whitespace() {
            let Some(body) = token.strip_prefix("--") else {
                return Err(InitError::UnknownFlag(token.to_string()));
            };
            let (flag, value) = match body.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (body, None),
            };
            match flag {
                "op-fusion" => options.op_fusion = bool_value(flag, value)?,
                "print-ir-after-all" => options.print_ir_after_all = bool_value(flag, value)?,
                "verify-each" => options.verify_each = bool_value(flag, value)?,
                "max-fusion-rounds" => {
                    let value = value.ok_or_else(|| InitError::MissingValue(flag.to_string()))?;
                    options.max_fusion_rounds = value
                        .parse::<usize>()
                        .ok()
                        .filter(|rounds| *rounds > 0)
                        .ok_or_else(|| InitError::InvalidValue {
                            flag: flag.to_string(),
                            value: value.to_string(),
                        })?;
                }
                _ => return Err(InitError::UnknownFlag(flag.to_string())),
            }
        }
        Ok(options)
    }
}

fn bool_value(flag: &str, value: Option<&str>) -> Result<bool, InitError> {
    let Some(value) = value else {
        return Ok(true);
    };
    parse_bool(value).ok_or_else(|| InitError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl fmt::Display for PassManagerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "--op-fusion={} --print-ir-after-all={} --verify-each={} --max-fusion-rounds={}",
            self.op_fusion, self.print_ir_after_all, self.verify_each, self.max_fusion_rounds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_yields_defaults() {
        assert_eq!(PassManagerOptions::parse("").unwrap(), PassManagerOptions::default());
        assert_eq!(PassManagerOptions::parse("   ").unwrap(), PassManagerOptions::default());
    }

    #[test]
    fn bare_flag_enables_and_explicit_value_disables() {
        let options = PassManagerOptions::parse("--verify-each --op-fusion=off").unwrap();
        assert!(options.verify_each);
        assert!(!options.op_fusion);
        assert!(!options.print_ir_after_all);
    }

    #[test]
    fn display_round_trips() {
        let options = PassManagerOptions::parse("--print-ir-after-all --max-fusion-rounds=7").unwrap();
        assert_eq!(PassManagerOptions::parse(&options.to_string()).unwrap(), options);
    }

    #[test]
    fn malformed_options_are_rejected() {
        assert_eq!(
            PassManagerOptions::parse("--fast-math"),
            Err(InitError::UnknownFlag("fast-math".into()))
        );
        assert_eq!(
            PassManagerOptions::parse("verify-each"),
            Err(InitError::UnknownFlag("verify-each".into()))
        );
        assert_eq!(
            PassManagerOptions::parse("--max-fusion-rounds"),
            Err(InitError::MissingValue("max-fusion-rounds".into()))
        );
        assert!(matches!(
            PassManagerOptions::parse("--max-fusion-rounds=0"),
            Err(InitError::InvalidValue { .. })
        ));
        assert!(matches!(
            PassManagerOptions::parse("--op-fusion=maybe"),
            Err(InitError::InvalidValue { .. })
        ));
    }
}
