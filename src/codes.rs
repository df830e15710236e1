//! Human-readable correlation codes
//!
//! Short random identifiers shown to users and support staff.
//! Collisions are not detected; 32 random bits per code.

use chrono::Utc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeKind {
    Transfer,
    Dispute,
    Withdrawal,
    Deposit,
}

impl CodeKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            CodeKind::Transfer => "TRF",
            CodeKind::Dispute => "DSP",
            CodeKind::Withdrawal => "WDR",
            CodeKind::Deposit => "DEP",
        }
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

pub trait CodeGenerator: Send + Sync {
    fn generate(&self, kind: CodeKind) -> String;
}

/// Default generator backed by the thread-local CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, kind: CodeKind) -> String {
        match kind {
            // Deposits correlate with an external payment reference, so they get
            // a timestamp and a wider random part.
            CodeKind::Deposit => {
                let bytes: [u8; 8] = rand::random();
                format!(
                    "{}-{}-{}",
                    kind.prefix(),
                    Utc::now().timestamp(),
                    hex::encode(bytes)
                )
            }
            _ => {
                let bytes: [u8; 4] = rand::random();
                format!("{}-{}", kind.prefix(), hex::encode(bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_code_format() {
        let generator = RandomCodeGenerator;
        for kind in [CodeKind::Transfer, CodeKind::Dispute, CodeKind::Withdrawal] {
            let code = generator.generate(kind);
            let (prefix, body) = code.split_once('-').unwrap();
            assert_eq!(prefix, kind.prefix());
            assert_eq!(body.len(), 8);
            assert!(body.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_deposit_code_format() {
        let code = RandomCodeGenerator.generate(CodeKind::Deposit);
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "DEP");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 16);
    }

    #[test]
    fn test_codes_differ() {
        let generator = RandomCodeGenerator;
        let a = generator.generate(CodeKind::Transfer);
        let b = generator.generate(CodeKind::Transfer);
        assert_ne!(a, b);
    }
}
