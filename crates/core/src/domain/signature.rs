// Agent Signatures - ordered matcher list, first match wins

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{DomainError, Result};

/// Matcher kind as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatcherKind {
    Regex,
    ExePrefix,
    ExeSuffix,
}

/// Signature as it appears in configuration (uncompiled)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSpec {
    pub kind: MatcherKind,
    pub pattern: String,
    pub label: String,
}

impl SignatureSpec {
    pub fn new(kind: MatcherKind, pattern: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
            label: label.into(),
        }
    }
}

/// Compiled matcher
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Regex over the full command line
    Regex(Regex),
    /// Prefix of the executable basename
    ExePrefix(String),
    /// Suffix of the executable basename
    ExeSuffix(String),
}

impl Matcher {
    pub fn matches(&self, exe_path: &str, command_line: &str) -> bool {
        match self {
            Matcher::Regex(re) => re.is_match(command_line),
            Matcher::ExePrefix(prefix) => exe_basename(exe_path).starts_with(prefix.as_str()),
            Matcher::ExeSuffix(suffix) => exe_basename(exe_path).ends_with(suffix.as_str()),
        }
    }
}

/// Compiled agent signature
#[derive(Debug, Clone)]
pub struct AgentSignature {
    pub matcher: Matcher,
    pub label: String,
}

impl AgentSignature {
    pub fn compile(spec: &SignatureSpec) -> Result<Self> {
        if spec.pattern.is_empty() {
            return Err(DomainError::InvalidSignature {
                pattern: spec.pattern.clone(),
                reason: "pattern is empty".to_string(),
            });
        }
        if spec.label.trim().is_empty() {
            return Err(DomainError::InvalidSignature {
                pattern: spec.pattern.clone(),
                reason: "label is empty".to_string(),
            });
        }

        let matcher = match spec.kind {
            MatcherKind::Regex => {
                let re = Regex::new(&spec.pattern).map_err(|e| DomainError::InvalidSignature {
                    pattern: spec.pattern.clone(),
                    reason: e.to_string(),
                })?;
                Matcher::Regex(re)
            }
            MatcherKind::ExePrefix => Matcher::ExePrefix(spec.pattern.clone()),
            MatcherKind::ExeSuffix => Matcher::ExeSuffix(spec.pattern.clone()),
        };

        Ok(Self {
            matcher,
            label: spec.label.clone(),
        })
    }
}

/// Ordered signature list
#[derive(Debug, Clone, Default)]
pub struct SignatureSet {
    signatures: Vec<AgentSignature>,
}

impl SignatureSet {
    pub fn compile(specs: &[SignatureSpec]) -> Result<Self> {
        let signatures = specs
            .iter()
            .map(AgentSignature::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { signatures })
    }

    /// Label of the first signature that matches, in list order
    pub fn match_label(&self, exe_path: &str, command_line: &str) -> Option<&str> {
        self.signatures
            .iter()
            .find(|sig| sig.matcher.matches(exe_path, command_line))
            .map(|sig| sig.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

fn exe_basename(exe_path: &str) -> &str {
    Path::new(exe_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(exe_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(specs: &[SignatureSpec]) -> SignatureSet {
        SignatureSet::compile(specs).unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let signatures = set(&[
            SignatureSpec::new(MatcherKind::Regex, r"claude-code", "claude-node"),
            SignatureSpec::new(MatcherKind::ExePrefix, "node", "node"),
        ]);

        let label = signatures.match_label(
            "/usr/bin/node",
            "/usr/bin/node /usr/lib/node_modules/@anthropic-ai/claude-code/cli.js",
        );
        assert_eq!(label, Some("claude-node"));

        let label = signatures.match_label("/usr/bin/node", "/usr/bin/node server.js");
        assert_eq!(label, Some("node"));
    }

    #[test]
    fn test_exe_prefix_and_suffix_use_basename() {
        let signatures = set(&[
            SignatureSpec::new(MatcherKind::ExePrefix, "codex", "codex"),
            SignatureSpec::new(MatcherKind::ExeSuffix, "-agent", "cursor"),
        ]);

        assert_eq!(signatures.match_label("/opt/bin/codex-x86", "codex-x86"), Some("codex"));
        assert_eq!(signatures.match_label("/opt/codex/bin/other", "other"), None);
        assert_eq!(signatures.match_label("/usr/local/bin/cursor-agent", "cursor-agent"), Some("cursor"));
    }

    #[test]
    fn test_unmatched_returns_none() {
        let signatures = set(&[SignatureSpec::new(MatcherKind::ExePrefix, "aider", "aider")]);
        assert_eq!(signatures.match_label("/bin/bash", "bash -l"), None);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let result = SignatureSet::compile(&[SignatureSpec::new(MatcherKind::Regex, "(", "broken")]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid agent signature"));
    }

    #[test]
    fn test_kind_deserializes_kebab_case() {
        let spec: SignatureSpec =
            serde_json::from_str(r#"{"kind":"exe-suffix","pattern":"gemini","label":"gemini"}"#).unwrap();
        assert_eq!(spec.kind, MatcherKind::ExeSuffix);
    }
}
